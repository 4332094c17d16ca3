use serde::Deserialize;

/// The authenticated GitHub user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    /// Stable GitHub identifier.
    pub id: i64,
    /// The user's handle.
    pub login: String,
    /// Display name, if set.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar image URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// What the token's owner may do with a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RepoPermissions {
    /// Full control over the repository.
    #[serde(default)]
    pub admin: bool,
    /// Manage the repository without access to destructive actions.
    #[serde(default)]
    pub maintain: bool,
    /// Write access.
    #[serde(default)]
    pub push: bool,
    /// Manage issues and pull requests.
    #[serde(default)]
    pub triage: bool,
    /// Read access. Assumed when GitHub leaves it out.
    #[serde(default = "default_pull")]
    pub pull: bool,
}

fn default_pull() -> bool {
    true
}

/// The license GitHub detected for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LicenseDescriptor {
    /// Lowercase license key, e.g. `mit`.
    #[serde(default)]
    pub key: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// SPDX identifier; GitHub reports `NOASSERTION` for unknown licenses.
    #[serde(default)]
    pub spdx_id: Option<String>,
}

impl LicenseDescriptor {
    /// The SPDX identifier when GitHub knows it, the license name otherwise.
    pub fn label(&self) -> Option<String> {
        match self.spdx_id.as_deref() {
            Some(spdx) if !spdx.is_empty() && spdx != "NOASSERTION" => Some(spdx.to_string()),
            _ if !self.name.is_empty() => Some(self.name.clone()),
            _ => None,
        }
    }
}

/// A repository as listed by `GET /user/repos`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoDescriptor {
    /// Stable remote identifier.
    pub id: i64,
    /// Repository name without the owner.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Branch GitHub shows by default.
    pub default_branch: String,
    /// Whether only invited users can see the repository.
    #[serde(default)]
    pub private: bool,
    /// Short description shown on GitHub.
    #[serde(default)]
    pub description: Option<String>,
    /// RFC 3339 time of the last push.
    #[serde(default)]
    pub pushed_at: Option<String>,
    /// RFC 3339 time of the last change; the listing is sorted by it.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Absent for tokens without access to the repository settings.
    #[serde(default)]
    pub permissions: Option<RepoPermissions>,
    /// Detected license, `None` when GitHub found none.
    #[serde(default)]
    pub license: Option<LicenseDescriptor>,
}

/// The commit a branch points at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchCommit {
    /// Commit SHA.
    pub sha: String,
}

/// A branch as listed by `GET /repos/{owner}/{repo}/branches`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchDescriptor {
    /// Branch name.
    pub name: String,
    /// Whether branch protection rules apply.
    #[serde(default)]
    pub protected: bool,
    /// Head commit of the branch.
    pub commit: BranchCommit,
}

impl BranchDescriptor {
    /// The SHA of the branch's head commit.
    pub fn commit_sha(&self) -> &str {
        &self.commit.sha
    }
}

/// A blob in a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repository-root relative path.
    pub path: String,
    /// Blob SHA.
    pub sha: String,
    /// Size in bytes, when GitHub reports it.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TreeEntryKind {
    Blob,
    Tree,
    Commit,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeResponse {
    #[serde(default)]
    pub tree: Vec<RawTreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

impl TreeResponse {
    /// Keeps blobs only; subtrees and submodule commits carry no content.
    pub(crate) fn into_blobs(self) -> Vec<TreeEntry> {
        self.tree
            .into_iter()
            .filter(|entry| entry.kind == TreeEntryKind::Blob)
            .map(|entry| TreeEntry { path: entry.path, sha: entry.sha, size: entry.size })
            .collect()
    }
}

/// How a file changed between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// New file, or a copy of another one.
    #[serde(alias = "copied")]
    Added,
    /// Content changed. Renames also land here.
    #[serde(alias = "renamed", alias = "changed")]
    Modified,
    /// Deleted at the newer commit.
    Removed,
    /// Listed by GitHub without changes.
    Unchanged,
}

impl FileStatus {
    /// Whether the new revision of the file has content worth fetching.
    pub fn needs_content(&self) -> bool {
        matches!(self, FileStatus::Added | FileStatus::Modified)
    }
}

/// A file entry of a compare result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFileDescriptor {
    /// Path at the newer commit.
    #[serde(rename = "filename")]
    pub path: String,
    /// How the file changed.
    pub status: FileStatus,
    /// Path at the older commit, set for renames only.
    #[serde(default)]
    pub previous_filename: Option<String>,
}

impl ChangedFileDescriptor {
    /// A change without a previous path.
    pub fn new(path: &str, status: FileStatus) -> Self {
        Self { path: path.to_string(), status, previous_filename: None }
    }

    /// A rename from `previous` to `path`.
    pub fn renamed(previous: &str, path: &str) -> Self {
        Self {
            path: path.to_string(),
            status: FileStatus::Modified,
            previous_filename: Some(previous.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompareResponse {
    #[serde(default)]
    pub files: Vec<ChangedFileDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TopicsResponse {
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentPayload {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// The outcome of fetching a single file's content.
///
/// Fetch failures are folded into this value instead of being returned as
/// errors: a file that could not be fetched or decoded as UTF-8 is reported as
/// binary with no content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileContent {
    /// Decoded text, `None` for binary files.
    pub content: Option<String>,
    /// Whether the file is not valid UTF-8.
    pub is_binary: bool,
    /// Decoded size in bytes, zero when the fetch degraded.
    pub size: u64,
}

impl FileContent {
    /// A UTF-8 file.
    pub fn text(content: String) -> Self {
        let size = content.len() as u64;
        Self { content: Some(content), is_binary: false, size }
    }

    /// A file that is not valid UTF-8.
    pub fn binary(size: u64) -> Self {
        Self { content: None, is_binary: true, size }
    }

    /// The value used when the content could not be fetched at all.
    pub fn degraded() -> Self {
        Self::binary(0)
    }
}
