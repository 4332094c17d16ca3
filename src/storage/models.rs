use std::{fmt, path::Path};

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::github::{FileContent, FileStatus};

/// A GitHub account linked to a Telegram chat.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    /// Local identifier.
    pub id: i64,
    /// Stable GitHub identifier.
    pub github_id: i64,
    /// GitHub handle at the last login.
    pub github_login: String,
    /// The chat the account is linked to. A chat links at most one account.
    pub chat_id: Option<i64>,
    /// OAuth token, empty after logout.
    pub access_token: String,
}

impl User {
    /// Whether the user still holds an access token.
    pub fn is_linked(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// A remote repository owned by a local user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct Repository {
    /// Local identifier.
    pub id: i64,
    /// Owning [`User`].
    pub user_id: i64,
    /// Stable GitHub identifier.
    pub repo_id: i64,
    /// Repository name without the owner.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Branch GitHub shows by default.
    pub default_branch: String,
    /// Whether only invited users can see the repository.
    pub private: bool,
    /// Short description shown on GitHub.
    pub description: Option<String>,
    /// RFC 3339 time of the last push.
    pub pushed_at: Option<String>,
    /// RFC 3339 time GitHub last reported a change. Listings are ordered by it.
    pub remote_updated_at: Option<String>,
    /// SPDX identifier or name of the detected license.
    pub license: Option<String>,
}

impl Repository {
    /// Returns the URL of the repository on GitHub.
    pub fn url(&self) -> String {
        format!("https://github.com/{}", self.full_name)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// What the owner of a repository may do with it on GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct RepositoryPermissions {
    /// The [`Repository`] these permissions apply to.
    pub repository_id: i64,
    /// Full control.
    pub admin: bool,
    /// Manage without destructive actions.
    pub maintain: bool,
    /// Write access.
    pub push: bool,
    /// Manage issues and pull requests.
    pub triage: bool,
    /// Read access.
    pub pull: bool,
}

/// A branch of a [`Repository`] as last seen on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct Branch {
    /// Local identifier.
    pub id: i64,
    /// Owning [`Repository`].
    pub repository_id: i64,
    /// Unique within the repository.
    pub name: String,
    /// Whether branch protection rules apply.
    pub protected: bool,
    /// Head commit at the last refresh.
    pub last_commit_sha: String,
}

/// An immutable capture of a repository branch at one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeState {
    /// Local identifier.
    pub id: i64,
    /// Captured [`Repository`].
    pub repository_id: i64,
    /// Cleared when the branch is deleted; the snapshot itself survives.
    pub branch_id: Option<i64>,
    /// The captured commit.
    pub commit_sha: String,
    /// Set only for full-tree snapshots.
    pub is_initial: bool,
    /// The snapshot an incremental snapshot's diff was taken against.
    pub base_id: Option<i64>,
    /// When the snapshot row was written.
    pub created_at: DateTime<Utc>,
}

impl CodeState {
    /// The first eight characters of the commit SHA.
    pub fn short_sha(&self) -> &str {
        self.commit_sha.get(..8).unwrap_or(&self.commit_sha)
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CodeStateRow {
    pub id: i64,
    pub repository_id: i64,
    pub branch_id: Option<i64>,
    pub commit_sha: String,
    pub is_initial: bool,
    pub base_id: Option<i64>,
    pub created_at: i64,
}

impl From<CodeStateRow> for CodeState {
    fn from(row: CodeStateRow) -> Self {
        Self {
            id: row.id,
            repository_id: row.repository_id,
            branch_id: row.branch_id,
            commit_sha: row.commit_sha,
            is_initial: row.is_initial,
            base_id: row.base_id,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
        }
    }
}

/// The values needed to create a [`CodeState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCodeState {
    /// Captured repository.
    pub repository_id: i64,
    /// Captured branch.
    pub branch_id: i64,
    /// Target commit.
    pub commit_sha: String,
    /// Whether the snapshot holds the full tree.
    pub is_initial: bool,
    /// Set for incremental snapshots only.
    pub base_id: Option<i64>,
}

impl NewCodeState {
    /// A full-tree snapshot of `branch` at `commit_sha`.
    pub fn initial(repository: &Repository, branch: &Branch, commit_sha: &str) -> Self {
        Self {
            repository_id: repository.id,
            branch_id: branch.id,
            commit_sha: commit_sha.to_string(),
            is_initial: true,
            base_id: None,
        }
    }

    /// A snapshot holding the diff from `base` to `commit_sha`.
    pub fn incremental(
        repository: &Repository,
        branch: &Branch,
        base: &CodeState,
        commit_sha: &str,
    ) -> Self {
        Self {
            is_initial: false,
            base_id: Some(base.id),
            ..Self::initial(repository, branch, commit_sha)
        }
    }
}

/// How a stored file changed relative to the snapshot's base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum ChangeType {
    /// New at this snapshot.
    Added,
    /// Content replaced at this snapshot.
    Modified,
    /// Carries no content.
    Removed,
    /// Listed without changes.
    Unchanged,
}

impl From<FileStatus> for ChangeType {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::Added => ChangeType::Added,
            FileStatus::Modified => ChangeType::Modified,
            FileStatus::Removed => ChangeType::Removed,
            FileStatus::Unchanged => ChangeType::Unchanged,
        }
    }
}

/// Coarse file kind used by the preview renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum FileType {
    /// `.html` and `.htm`.
    Html,
    /// `.css`.
    Css,
    /// `.js` and `.jsx`.
    Js,
    /// Anything else.
    Other,
}

impl FileType {
    /// Classifies a path by its extension, ignoring case.
    pub fn from_path(path: &str) -> Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "html" | "htm" => FileType::Html,
            "css" => FileType::Css,
            "js" | "jsx" => FileType::Js,
            _ => FileType::Other,
        }
    }
}

/// A file captured in a [`CodeState`].
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RepositoryFile {
    /// Local identifier.
    pub id: i64,
    /// Owning [`CodeState`].
    pub code_state_id: i64,
    /// Repository-root relative, forward slashes, no leading slash.
    pub path: String,
    /// Kind detected from the extension.
    pub file_type: FileType,
    /// `None` for binary files and removals.
    pub content: Option<String>,
    /// Whether the content is not valid UTF-8.
    pub is_binary: bool,
    /// How the file changed in this snapshot.
    pub change_type: ChangeType,
    /// Decoded size in bytes.
    pub size_bytes: i64,
}

/// A file row waiting to be written with its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepositoryFile {
    /// Normalized path.
    pub path: String,
    /// Kind detected from the extension.
    pub file_type: FileType,
    /// `None` for binary files and removals.
    pub content: Option<String>,
    /// Whether the content is not valid UTF-8.
    pub is_binary: bool,
    /// How the file changed.
    pub change_type: ChangeType,
    /// Decoded size in bytes.
    pub size_bytes: i64,
}

impl NewRepositoryFile {
    /// A file whose content was fetched from GitHub.
    pub fn fetched(path: &str, content: FileContent, change_type: ChangeType) -> Self {
        let path = normalize_path(path);
        let content_text = if content.is_binary { None } else { content.content };

        Self {
            file_type: FileType::from_path(&path),
            path,
            content: content_text,
            is_binary: content.is_binary,
            change_type,
            size_bytes: content.size as i64,
        }
    }

    /// The deletion record of a path; carries no content.
    pub fn removed(path: &str) -> Self {
        let path = normalize_path(path);
        Self {
            file_type: FileType::from_path(&path),
            path,
            content: None,
            is_binary: false,
            change_type: ChangeType::Removed,
            size_bytes: 0,
        }
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Per-chat selection state.
#[derive(Debug, Clone, PartialEq, Eq, Default, FromRow)]
pub struct ChatSession {
    /// Telegram chat id.
    pub chat_id: i64,
    /// Selected [`Repository`].
    pub repository_id: Option<i64>,
    /// Current [`Branch`]. Only set once it was synchronized.
    pub branch_id: Option<i64>,
}
