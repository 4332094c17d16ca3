
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use mockall::automock;
use thiserror::Error;

use crate::{
    github::{ChangedFileDescriptor, FileStatus, GithubClient, GithubError},
    storage::{
        Branch, ChangeType, CodeState, NewCodeState, NewRepositoryFile, Repository, SnapshotStore,
        StorageError, User,
    },
};

/// Failures that abort a synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The tree or the diff could not be fetched.
    #[error("Failed to fetch repository data from GitHub: {0}")]
    Github(#[from] GithubError),
    /// The snapshot store failed.
    #[error("Failed to access snapshot storage: {0}")]
    Storage(#[from] StorageError),
    /// The repository belongs to another user.
    #[error("Repository {repository} is not owned by {user}")]
    NotOwner {
        /// GitHub login of the requesting user.
        user: String,
        /// `owner/name` of the repository.
        repository: String,
    },
    /// The branch belongs to another repository.
    #[error("Branch {branch} does not belong to repository {repository}")]
    BranchMismatch {
        /// Branch name.
        branch: String,
        /// `owner/name` of the repository.
        repository: String,
    },
}

type Result<T> = std::result::Result<T, SyncError>;

/// Brings the stored snapshots of a branch up to a given commit.
#[automock]
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Capture `branch` at `target_commit_sha` and return the resulting
    /// snapshot, which becomes the head of the branch. Synchronizing an
    /// already captured commit returns the existing snapshot without touching
    /// GitHub.
    async fn synchronize(
        &self,
        user: &User,
        repository: &Repository,
        branch: &Branch,
        target_commit_sha: &str,
        token: &str,
    ) -> Result<CodeState>;
}

/// What has to happen to reach the target commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncPlan {
    /// The head of the branch already points at the target.
    UpToDate(CodeState),
    /// The target was captured before but the branch moved away from it.
    Revisit(CodeState),
    /// No snapshot exists yet: fetch the whole tree.
    Initial,
    /// Diff the head's commit against the target.
    Incremental { base: CodeState },
}

impl SyncPlan {
    /// `captured` is the snapshot of the target commit, `head` the snapshot
    /// the branch currently points at.
    pub(crate) fn for_target(captured: Option<CodeState>, head: Option<CodeState>) -> Self {
        match (captured, head) {
            (Some(state), Some(head)) if state.id == head.id => SyncPlan::UpToDate(state),
            (Some(state), _) => SyncPlan::Revisit(state),
            (None, None) => SyncPlan::Initial,
            (None, Some(base)) => SyncPlan::Incremental { base },
        }
    }
}

/// Splits a diff into the paths whose new content has to be fetched and the
/// paths that were removed. Unchanged entries are dropped. A rename removes
/// its previous path.
pub(crate) fn partition_changes(
    changes: Vec<ChangedFileDescriptor>,
) -> (Vec<(String, ChangeType)>, Vec<String>) {
    let mut to_fetch = Vec::new();
    let mut removed = Vec::new();

    for ChangedFileDescriptor { path, status, previous_filename } in changes {
        if let Some(previous) = previous_filename.filter(|previous| *previous != path) {
            removed.push(previous);
        }

        if status.needs_content() {
            to_fetch.push((path, ChangeType::from(status)));
        } else if status == FileStatus::Removed {
            removed.push(path);
        }
    }

    // A path vacated by a rename may be filled again in the same diff.
    removed.retain(|path| !to_fetch.iter().any(|(fetched, _)| fetched == path));
    removed.sort();
    removed.dedup();

    (to_fetch, removed)
}

/// A [`Synchronizer`] that stores full snapshots for a branch's first commit
/// and diff snapshots for every later one.
#[derive(Clone)]
pub struct SnapshotSynchronizer {
    github_client: Arc<dyn GithubClient>,
    store: Arc<dyn SnapshotStore>,
    // The maximum number of concurrent content requests to GitHub.
    max_concurrency: usize,
}

impl SnapshotSynchronizer {
    /// Creates a synchronizer keeping at most `max_concurrency` content
    /// requests in flight. A bound of zero is treated as one.
    pub fn new(
        github_client: Arc<dyn GithubClient>,
        store: Arc<dyn SnapshotStore>,
        max_concurrency: usize,
    ) -> Self {
        Self { github_client, store, max_concurrency }
    }

    async fn initial_files(
        &self,
        token: &str,
        repository: &Repository,
        target_commit_sha: &str,
    ) -> Result<Vec<NewRepositoryFile>> {
        let tree = self
            .github_client
            .fetch_recursive_tree(token, &repository.full_name, target_commit_sha)
            .await?;
        tracing::debug!("Tree of {} has {} blobs", repository.full_name, tree.len());

        let targets = tree.into_iter().map(|entry| (entry.path, ChangeType::Added)).collect();
        Ok(self.fetch_files(token, repository, target_commit_sha, targets).await)
    }

    async fn incremental_files(
        &self,
        token: &str,
        repository: &Repository,
        base: &CodeState,
        target_commit_sha: &str,
    ) -> Result<Vec<NewRepositoryFile>> {
        let changes = self
            .github_client
            .fetch_diff(token, &repository.full_name, &base.commit_sha, target_commit_sha)
            .await?;
        let (to_fetch, removed) = partition_changes(changes);
        tracing::debug!(
            "{} {}...{}: {} files to fetch, {} removed",
            repository.full_name,
            base.short_sha(),
            target_commit_sha,
            to_fetch.len(),
            removed.len()
        );

        let mut files = self.fetch_files(token, repository, target_commit_sha, to_fetch).await;
        files.extend(removed.iter().map(|path| NewRepositoryFile::removed(path)));
        Ok(files)
    }

    /// Fetches the content of every target at `git_ref`, keeping at most
    /// `max_concurrency` requests in flight.
    async fn fetch_files(
        &self,
        token: &str,
        repository: &Repository,
        git_ref: &str,
        targets: Vec<(String, ChangeType)>,
    ) -> Vec<NewRepositoryFile> {
        let full_name = repository.full_name.as_str();
        let tasks = targets.into_iter().map(|(path, change_type)| {
            let github_client = self.github_client.clone();
            async move {
                let content =
                    github_client.fetch_file_content(token, full_name, &path, git_ref).await;
                NewRepositoryFile::fetched(&path, content, change_type)
            }
        });

        stream::iter(tasks).buffer_unordered(self.max_concurrency.max(1)).collect().await
    }
}

#[async_trait]
impl Synchronizer for SnapshotSynchronizer {
    async fn synchronize(
        &self,
        user: &User,
        repository: &Repository,
        branch: &Branch,
        target_commit_sha: &str,
        token: &str,
    ) -> Result<CodeState> {
        if repository.user_id != user.id {
            return Err(SyncError::NotOwner {
                user: user.github_login.clone(),
                repository: repository.full_name.clone(),
            });
        }
        if branch.repository_id != repository.id {
            return Err(SyncError::BranchMismatch {
                branch: branch.name.clone(),
                repository: repository.full_name.clone(),
            });
        }

        let captured =
            self.store.code_state_for_commit(repository, branch, target_commit_sha).await?;
        let head = self.store.latest_code_state(repository, branch).await?;

        let (new_state, files) = match SyncPlan::for_target(captured, head) {
            SyncPlan::UpToDate(state) => {
                tracing::debug!(
                    "{}@{} is already at {}",
                    repository.full_name,
                    branch.name,
                    state.short_sha()
                );
                return Ok(state);
            }
            SyncPlan::Revisit(state) => {
                tracing::debug!(
                    "{}@{} moved back to {}",
                    repository.full_name,
                    branch.name,
                    state.short_sha()
                );
                self.store.mark_head(&state).await?;
                return Ok(state);
            }
            SyncPlan::Initial => {
                let files = self.initial_files(token, repository, target_commit_sha).await;
                (NewCodeState::initial(repository, branch, target_commit_sha), files)
            }
            SyncPlan::Incremental { base } => {
                match self.incremental_files(token, repository, &base, target_commit_sha).await {
                    Err(SyncError::Github(e @ GithubError::DiffTooLarge { .. })) => {
                        tracing::warn!("{e}, capturing the full tree instead");
                        let files = self.initial_files(token, repository, target_commit_sha).await;
                        (NewCodeState::initial(repository, branch, target_commit_sha), files)
                    }
                    files => (
                        NewCodeState::incremental(repository, branch, &base, target_commit_sha),
                        files,
                    ),
                }
            }
        };

        let files = files.inspect_err(|e| {
            tracing::error!(
                "Aborting synchronization of {}@{} to {target_commit_sha}: {e}",
                repository.full_name,
                branch.name
            );
        })?;

        let file_count = files.len();
        let state = self.store.create_snapshot(new_state, files).await?;
        tracing::info!(
            "Synchronized {}@{} to {} ({} files, initial: {})",
            repository.full_name,
            branch.name,
            state.short_sha(),
            file_count,
            state.is_initial
        );

        Ok(state)
    }
}
