#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use teloxide::types::ChatId;
use thiserror::Error;

use crate::{
    github::{GithubClient, GithubError},
    pagination::Paginated,
    preview::{PreviewBundle, PreviewError, PreviewService},
    storage::{AccountStorage, Branch, CodeState, Repository, StorageError, User},
    sync::{SyncError, Synchronizer},
};

/// Failures of selection operations.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The chat has no user, or the user logged out.
    #[error("No GitHub account is linked to this chat")]
    NotLinked,
    /// Unknown id, or a repository of another user.
    #[error("Repository {0} not found")]
    RepositoryNotFound(i64),
    /// Unknown id, or a branch deleted by a refresh.
    #[error("Branch {0} not found")]
    BranchNotFound(i64),
    /// The operation needs a selected repository.
    #[error("No repository selected")]
    NoRepositorySelected,
    /// The operation needs a current branch.
    #[error("No branch selected")]
    NoBranchSelected,
    /// The current branch was never captured.
    #[error("The selected branch has no synchronized snapshot")]
    NotSynchronized,
    /// Refreshing branches failed.
    #[error("GitHub request failed: {0}")]
    Github(#[from] GithubError),
    /// Capturing the branch failed.
    #[error("Synchronization failed: {0}")]
    Sync(#[from] SyncError),
    /// Materializing the preview failed.
    #[error("Failed to build preview: {0}")]
    Preview(#[from] PreviewError),
    /// The account storage failed.
    #[error("Failed to access storage: {0}")]
    Storage(#[from] StorageError),
}

type Result<T> = std::result::Result<T, SelectionError>;

/// What a chat currently has selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    /// Selected repository.
    pub repository: Option<Repository>,
    /// Current branch of the selected repository.
    pub branch: Option<Branch>,
}

/// A branch that was just synchronized and made current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedBranch {
    /// Repository of the branch.
    pub repository: Repository,
    /// The branch, now current.
    pub branch: Branch,
    /// The branch's head snapshot.
    pub code_state: CodeState,
}

/// Per-chat repository and branch selection.
#[automock]
#[async_trait]
pub trait SelectionService: Send + Sync {
    /// Get the chat's user if it still holds an access token.
    async fn linked_user(&self, chat_id: ChatId) -> Result<User>;

    /// List one page of the chat user's repositories.
    async fn list_repositories(&self, chat_id: ChatId, page: usize)
    -> Result<Paginated<Repository>>;

    /// Select a repository, refresh its branches and topics from GitHub and
    /// clear the current branch.
    async fn select_repository(
        &self,
        chat_id: ChatId,
        repository_id: i64,
    ) -> Result<(Repository, Vec<Branch>)>;

    /// Synchronize a branch to its last known commit and make it current. The
    /// session is left untouched when synchronization fails.
    async fn select_branch(&self, chat_id: ChatId, branch_id: i64) -> Result<SyncedBranch>;

    /// Get the chat's selected repository and current branch.
    async fn current_selection(&self, chat_id: ChatId) -> Result<Selection>;

    /// Materialize the current branch at its latest snapshot.
    async fn preview(&self, chat_id: ChatId) -> Result<PreviewBundle>;
}

/// [`SelectionService`] over the account storage, GitHub and the
/// synchronizer.
pub struct DefaultSelectionService {
    storage: Arc<dyn AccountStorage>,
    github_client: Arc<dyn GithubClient>,
    synchronizer: Arc<dyn Synchronizer>,
    preview_service: Arc<dyn PreviewService>,
    page_size: usize,
}

impl DefaultSelectionService {
    /// Creates a selection service listing `page_size` repositories per page.
    pub fn new(
        storage: Arc<dyn AccountStorage>,
        github_client: Arc<dyn GithubClient>,
        synchronizer: Arc<dyn Synchronizer>,
        preview_service: Arc<dyn PreviewService>,
        page_size: usize,
    ) -> Self {
        Self { storage, github_client, synchronizer, preview_service, page_size }
    }

    /// Get a repository owned by `user`. Other users' repositories are
    /// reported as missing.
    async fn owned_repository(&self, user: &User, repository_id: i64) -> Result<Repository> {
        self.storage
            .repository(repository_id)
            .await?
            .filter(|repo| repo.user_id == user.id)
            .ok_or(SelectionError::RepositoryNotFound(repository_id))
    }
}

#[async_trait]
impl SelectionService for DefaultSelectionService {
    async fn linked_user(&self, chat_id: ChatId) -> Result<User> {
        self.storage
            .user_by_chat(chat_id)
            .await?
            .filter(User::is_linked)
            .ok_or(SelectionError::NotLinked)
    }

    async fn list_repositories(
        &self,
        chat_id: ChatId,
        page: usize,
    ) -> Result<Paginated<Repository>> {
        let user = self.linked_user(chat_id).await?;
        let repositories = self.storage.repositories_for_user(&user).await?;
        Ok(Paginated::new(repositories, page, self.page_size))
    }

    async fn select_repository(
        &self,
        chat_id: ChatId,
        repository_id: i64,
    ) -> Result<(Repository, Vec<Branch>)> {
        let user = self.linked_user(chat_id).await?;
        let repository = self.owned_repository(&user, repository_id).await?;

        let descriptors =
            self.github_client.fetch_branches(&user.access_token, &repository.full_name).await?;
        let branches = self.storage.replace_branches(&repository, &descriptors).await?;

        // Topics are informational; stale ones are kept when GitHub fails.
        match self.github_client.fetch_topics(&user.access_token, &repository.full_name).await {
            Ok(topics) => {
                self.storage.replace_topics(&repository, &topics).await?;
            }
            Err(e) => tracing::warn!("Failed to refresh topics of {repository}: {e}"),
        }

        self.storage.set_selected_repository(chat_id, &repository).await?;

        Ok((repository, branches))
    }

    async fn select_branch(&self, chat_id: ChatId, branch_id: i64) -> Result<SyncedBranch> {
        let user = self.linked_user(chat_id).await?;
        let branch =
            self.storage.branch(branch_id).await?.ok_or(SelectionError::BranchNotFound(branch_id))?;
        let repository = self.owned_repository(&user, branch.repository_id).await?;

        let code_state = self
            .synchronizer
            .synchronize(&user, &repository, &branch, &branch.last_commit_sha, &user.access_token)
            .await
            .inspect_err(|e| {
                tracing::error!("Failed to synchronize {repository}@{}: {e}", branch.name);
            })?;

        self.storage.set_current_branch(chat_id, &branch).await?;
        Ok(SyncedBranch { repository, branch, code_state })
    }

    async fn current_selection(&self, chat_id: ChatId) -> Result<Selection> {
        let session = self.storage.session(chat_id).await?;

        let repository = match session.repository_id {
            Some(id) => self.storage.repository(id).await?,
            None => None,
        };
        let branch = match session.branch_id {
            Some(id) => self.storage.branch(id).await?,
            None => None,
        };

        Ok(Selection { repository, branch })
    }

    async fn preview(&self, chat_id: ChatId) -> Result<PreviewBundle> {
        let selection = self.current_selection(chat_id).await?;
        let repository = selection.repository.ok_or(SelectionError::NoRepositorySelected)?;
        let branch = selection.branch.ok_or(SelectionError::NoBranchSelected)?;

        self.preview_service
            .materialize(&repository, &branch)
            .await?
            .ok_or(SelectionError::NotSynchronized)
    }
}
