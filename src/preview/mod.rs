#[cfg(test)]
mod tests;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::storage::{
    Branch, ChangeType, CodeState, FileType, Repository, RepositoryFile, SnapshotStore,
    StorageError,
};

/// Failures while building a preview.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The snapshot store failed.
    #[error("Failed to read snapshots: {0}")]
    Storage(#[from] StorageError),
}

type Result<T> = std::result::Result<T, PreviewError>;

/// A file as it exists at the head of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFile {
    /// Repository-root relative path.
    pub path: String,
    /// Kind detected from the extension.
    pub file_type: FileType,
    /// `None` for binary files.
    pub content: Option<String>,
    /// Whether the content is not valid UTF-8.
    pub is_binary: bool,
}

impl From<RepositoryFile> for PreviewFile {
    fn from(file: RepositoryFile) -> Self {
        Self {
            path: file.path,
            file_type: file.file_type,
            content: if file.is_binary { None } else { file.content },
            is_binary: file.is_binary,
        }
    }
}

/// The full file set of a branch at its head snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBundle {
    /// GitHub identifier of the repository.
    pub repo_id: i64,
    /// Commit of the head snapshot.
    pub commit_sha: String,
    /// Files keyed by path.
    pub files: BTreeMap<String, PreviewFile>,
}

impl PreviewBundle {
    /// Returns the URL the preview server renders this bundle at.
    pub fn preview_url(&self, base_url: &str) -> String {
        format!("{}/preview/{}/{}", base_url.trim_end_matches('/'), self.repo_id, self.commit_sha)
    }

    /// The page a preview opens on: `index.html` at the root, or else the
    /// first HTML file by path.
    pub fn entry_point(&self) -> Option<&str> {
        if self.files.contains_key("index.html") {
            return Some("index.html");
        }
        self.files
            .values()
            .find(|file| file.file_type == FileType::Html)
            .map(|file| file.path.as_str())
    }

    /// Number of files with text content.
    pub fn text_file_count(&self) -> usize {
        self.files.values().filter(|file| !file.is_binary).count()
    }
}

/// Walks from `head` through the snapshots each diff was taken against, back
/// to the full snapshot the chain starts from. Returns the chain oldest first.
pub(crate) fn lineage(head: CodeState, states: &HashMap<i64, CodeState>) -> Vec<CodeState> {
    let mut chain = vec![head];

    while let Some(current) = chain.last() {
        if current.is_initial {
            break;
        }
        let Some(base) = current.base_id.and_then(|id| states.get(&id)) else {
            tracing::warn!("Snapshot {} has no base to replay from", current.id);
            break;
        };
        // Bases are always older rows.
        if base.id >= current.id {
            tracing::warn!("Snapshot {} points at newer base {}", current.id, base.id);
            break;
        }
        chain.push(base.clone());
    }

    chain.reverse();
    chain
}

/// Replays a chain of snapshots, oldest first, into the file set of the last
/// one. Replay starts at the most recent initial snapshot since it carries the
/// full tree; later snapshots only carry their diffs.
pub(crate) fn fold_snapshots(
    chain: Vec<(CodeState, Vec<RepositoryFile>)>,
) -> BTreeMap<String, PreviewFile> {
    let start = chain.iter().rposition(|(state, _)| state.is_initial).unwrap_or(0);
    let mut files = BTreeMap::new();

    for (_, snapshot_files) in chain.into_iter().skip(start) {
        for file in snapshot_files {
            match file.change_type {
                ChangeType::Added | ChangeType::Modified => {
                    files.insert(file.path.clone(), PreviewFile::from(file));
                }
                ChangeType::Removed => {
                    files.remove(&file.path);
                }
                ChangeType::Unchanged => {}
            }
        }
    }

    files
}

/// Builds previews from stored snapshots.
#[automock]
#[async_trait]
pub trait PreviewService: Send + Sync {
    /// Build the preview of a branch at its head snapshot, or `None` if it was
    /// never synchronized.
    async fn materialize(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> Result<Option<PreviewBundle>>;
}

/// [`PreviewService`] over a [`SnapshotStore`].
pub struct DefaultPreviewService {
    store: Arc<dyn SnapshotStore>,
}

impl DefaultPreviewService {
    /// Creates a preview service reading from `store`.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PreviewService for DefaultPreviewService {
    async fn materialize(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> Result<Option<PreviewBundle>> {
        let Some(head) = self.store.latest_code_state(repository, branch).await? else {
            tracing::debug!("No snapshots for {}@{}", repository.full_name, branch.name);
            return Ok(None);
        };
        let head_sha = head.commit_sha.clone();

        let states: HashMap<i64, CodeState> = self
            .store
            .code_states(repository, branch)
            .await?
            .into_iter()
            .map(|state| (state.id, state))
            .collect();

        let lineage = lineage(head, &states);
        let mut chain = Vec::with_capacity(lineage.len());
        for state in lineage {
            let files = self.store.files(&state).await?;
            chain.push((state, files));
        }

        let files = fold_snapshots(chain);
        tracing::debug!(
            "Materialized {}@{} at {head_sha} with {} files",
            repository.full_name,
            branch.name,
            files.len()
        );

        Ok(Some(PreviewBundle { repo_id: repository.repo_id, commit_sha: head_sha, files }))
    }
}
