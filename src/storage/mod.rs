mod models;
/// The SQLite implementation of the storage traits.
pub mod sqlite;

use async_trait::async_trait;
use mockall::automock;
pub use models::*;
use teloxide::types::ChatId;
use thiserror::Error;

use crate::github::{BranchDescriptor, RepoDescriptor, UserProfile};

/// Failures of the SQLite store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A query failed.
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
    /// The schema could not be brought up to date.
    #[error("Failed to migrate database: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    /// A write would break an invariant of the stored data.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),
}

/// Result of storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Users, repositories, branches and chat sessions.
#[automock]
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Create or update the user identified by the profile's GitHub id and
    /// bind it to `chat_id`.
    async fn upsert_user(
        &self,
        profile: &UserProfile,
        chat_id: ChatId,
        access_token: &str,
    ) -> StorageResult<User>;

    /// Get the user bound to a chat.
    async fn user_by_chat(&self, chat_id: ChatId) -> StorageResult<Option<User>>;

    /// Forget the access token of the user bound to a chat.
    async fn clear_access_token(&self, chat_id: ChatId) -> StorageResult<bool>;

    /// Insert new repositories and refresh known ones, together with their
    /// license and permissions. Repositories missing from `repos` are kept.
    async fn upsert_repositories(
        &self,
        user: &User,
        repos: &[RepoDescriptor],
    ) -> StorageResult<Vec<Repository>>;

    /// Get a user's repositories, most recently updated on GitHub first.
    async fn repositories_for_user(&self, user: &User) -> StorageResult<Vec<Repository>>;

    /// Get a repository by its local id.
    async fn repository(&self, id: i64) -> StorageResult<Option<Repository>>;

    /// Make the stored branches of a repository match `branches`: stale
    /// branches are deleted, known ones updated and new ones inserted.
    async fn replace_branches(
        &self,
        repository: &Repository,
        branches: &[BranchDescriptor],
    ) -> StorageResult<Vec<Branch>>;

    /// Make the stored topics of a repository match `topics` without clearing
    /// the ones that stay.
    async fn replace_topics(
        &self,
        repository: &Repository,
        topics: &[String],
    ) -> StorageResult<Vec<String>>;

    /// Get the topics of a repository ordered by name.
    async fn topics(&self, repository: &Repository) -> StorageResult<Vec<String>>;

    /// Get the owner's permissions on a repository, if GitHub reported them.
    async fn permissions(
        &self,
        repository: &Repository,
    ) -> StorageResult<Option<RepositoryPermissions>>;

    /// Get the branches of a repository ordered by name.
    async fn branches_for_repository(&self, repository: &Repository) -> StorageResult<Vec<Branch>>;

    /// Get a branch by its local id.
    async fn branch(&self, id: i64) -> StorageResult<Option<Branch>>;

    /// Get the selection state of a chat. Chats without state get an empty
    /// session.
    async fn session(&self, chat_id: ChatId) -> StorageResult<ChatSession>;

    /// Select a repository and clear the current branch.
    async fn set_selected_repository(
        &self,
        chat_id: ChatId,
        repository: &Repository,
    ) -> StorageResult<()>;

    /// Point the session at a branch (and its repository).
    async fn set_current_branch(&self, chat_id: ChatId, branch: &Branch) -> StorageResult<()>;
}

/// Append-only store of code snapshots.
#[automock]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get the head of a branch: the snapshot most recently created or
    /// marked by [`SnapshotStore::mark_head`].
    async fn latest_code_state(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> StorageResult<Option<CodeState>>;

    /// Get the snapshot of a branch at `commit_sha`, if one was captured.
    async fn code_state_for_commit(
        &self,
        repository: &Repository,
        branch: &Branch,
        commit_sha: &str,
    ) -> StorageResult<Option<CodeState>>;

    /// Make an existing snapshot the head of its branch again.
    async fn mark_head(&self, code_state: &CodeState) -> StorageResult<()>;

    /// Create a snapshot row. If one already exists for the same repository,
    /// branch and commit, that row is returned instead.
    async fn create_code_state(&self, code_state: NewCodeState) -> StorageResult<CodeState>;

    /// Write the files of a snapshot in a single transaction. Snapshots that
    /// already hold files are immutable and reject the write.
    async fn bulk_write_files(
        &self,
        code_state: &CodeState,
        files: Vec<NewRepositoryFile>,
    ) -> StorageResult<()>;

    /// Create a snapshot together with its files in one transaction and make
    /// it the head of its branch. When the snapshot already exists it becomes
    /// the head, keeps its files and `files` are discarded.
    async fn create_snapshot(
        &self,
        code_state: NewCodeState,
        files: Vec<NewRepositoryFile>,
    ) -> StorageResult<CodeState>;

    /// Get every snapshot of a branch, oldest first.
    async fn code_states(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> StorageResult<Vec<CodeState>>;

    /// Get the files of a snapshot ordered by path.
    async fn files(&self, code_state: &CodeState) -> StorageResult<Vec<RepositoryFile>>;
}
