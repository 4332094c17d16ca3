mod types;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mockall::automock;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::de::DeserializeOwned;
use thiserror::Error;
pub use types::*;
use url::Url;

/// Page size used for every paginated listing.
pub const PAGE_SIZE: usize = 100;

/// The most files the compare endpoint lists for one comparison.
pub const COMPARE_FILE_LIMIT: usize = 300;

/// Failures talking to the GitHub REST API.
#[derive(Debug, Error)]
pub enum GithubError {
    /// HTTP 401.
    #[error("GitHub rejected the access token")]
    Unauthorized,
    /// HTTP 429, or 403 once the rate limit is used up.
    #[error("GitHub rate limit exceeded")]
    RateLimited,
    /// Any other non-2xx response.
    #[error("GitHub returned HTTP {status} for {url}")]
    Upstream {
        /// Response status.
        status: StatusCode,
        /// Requested URL.
        url: String,
    },
    /// The recursive tree was too large for GitHub to list in full.
    #[error("GitHub truncated the tree of {full_name} at {commit_sha}")]
    TruncatedTree {
        /// Repository the tree belongs to.
        full_name: String,
        /// Commit the tree was requested for.
        commit_sha: String,
    },
    /// The comparison changed more files than the compare endpoint lists.
    #[error("Comparison {base}...{head} of {full_name} lists {files} files, the most GitHub returns")]
    DiffTooLarge {
        /// Repository being compared.
        full_name: String,
        /// Older commit.
        base: String,
        /// Newer commit.
        head: String,
        /// Number of files GitHub listed.
        files: usize,
    },
    /// Network failure or timeout.
    #[error("Request to GitHub failed: {source}")]
    RequestError {
        /// Underlying client error.
        #[from]
        source: reqwest::Error,
    },
    /// The response body did not match the expected shape.
    #[error("Failed to parse GitHub response from {url}: {source}")]
    SerializationError {
        /// Requested URL.
        url: String,
        /// Underlying decoding error.
        source: reqwest::Error,
    },
    /// The configured API URL cannot be used as a base.
    #[error("Invalid GitHub API URL: {0}")]
    InvalidUrl(String),
}

type Result<T> = std::result::Result<T, GithubError>;

/// Read-only access to the GitHub REST API on behalf of a user.
///
/// Every method takes the user's OAuth token, so a single client is shared by
/// all users.
#[automock]
#[async_trait]
pub trait GithubClient: Send + Sync {
    /// Fetch the profile of the token's owner.
    async fn fetch_user(&self, token: &str) -> Result<UserProfile>;

    /// Fetch every repository visible to the token, most recently updated
    /// first. A failing page ends the listing with what was gathered so far.
    async fn fetch_all_repositories(&self, token: &str) -> Vec<RepoDescriptor>;

    /// Fetch all branches of `full_name`.
    async fn fetch_branches(&self, token: &str, full_name: &str) -> Result<Vec<BranchDescriptor>>;

    /// Fetch the topics of `full_name`.
    async fn fetch_topics(&self, token: &str, full_name: &str) -> Result<Vec<String>>;

    /// Fetch every blob reachable from `commit_sha`. Fails with
    /// [`GithubError::TruncatedTree`] when GitHub cannot list the whole tree.
    async fn fetch_recursive_tree(
        &self,
        token: &str,
        full_name: &str,
        commit_sha: &str,
    ) -> Result<Vec<TreeEntry>>;

    /// Fetch the files changed between `old_sha` and `new_sha`. Fails with
    /// [`GithubError::DiffTooLarge`] when the listing may be cut off.
    async fn fetch_diff(
        &self,
        token: &str,
        full_name: &str,
        old_sha: &str,
        new_sha: &str,
    ) -> Result<Vec<ChangedFileDescriptor>>;

    /// Fetch and decode a single file. Never fails: errors degrade to a binary
    /// file without content.
    async fn fetch_file_content(
        &self,
        token: &str,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> FileContent;
}

/// [`GithubClient`] over `reqwest`.
#[derive(Clone)]
pub struct DefaultGithubClient {
    client: Client,
    api_url: Url,
}

impl DefaultGithubClient {
    /// Creates a client for the API rooted at `api_url`. Every request gives up
    /// after `timeout`.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let api_url = Url::parse(api_url).map_err(|e| GithubError::InvalidUrl(e.to_string()))?;
        if api_url.cannot_be_a_base() {
            return Err(GithubError::InvalidUrl(api_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-preview-bot"));

        let client = Client::builder().default_headers(headers).timeout(timeout).build()?;
        tracing::debug!("HTTP client built successfully.");

        Ok(Self { client, api_url })
    }

    /// Builds an API URL from raw path segments, percent-encoding each one.
    fn endpoint<'a, I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| GithubError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_endpoint<'a, I>(&self, full_name: &'a str, rest: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.endpoint(["repos"].into_iter().chain(full_name.split('/')).chain(rest))
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, url: Url) -> Result<T> {
        tracing::debug!("GET {url}");
        let resp = self.client.get(url.clone()).bearer_auth(token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let rate_limited = resp
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
            tracing::warn!("GitHub returned HTTP {status} for {url}");

            return Err(match status {
                StatusCode::UNAUTHORIZED => GithubError::Unauthorized,
                StatusCode::TOO_MANY_REQUESTS => GithubError::RateLimited,
                StatusCode::FORBIDDEN if rate_limited => GithubError::RateLimited,
                _ => GithubError::Upstream { status, url: url.to_string() },
            });
        }

        resp.json::<T>()
            .await
            .map_err(|source| GithubError::SerializationError { url: url.to_string(), source })
    }

    async fn fetch_repositories_page(&self, token: &str, page: u32) -> Result<Vec<RepoDescriptor>> {
        let mut url = self.endpoint(["user", "repos"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &PAGE_SIZE.to_string())
            .append_pair("sort", "updated");
        self.get_json(token, url).await
    }

    async fn fetch_branches_page(
        &self,
        token: &str,
        full_name: &str,
        page: u32,
    ) -> Result<Vec<BranchDescriptor>> {
        let mut url = self.repo_endpoint(full_name, ["branches"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &PAGE_SIZE.to_string());
        self.get_json(token, url).await
    }

    async fn try_fetch_file_content(
        &self,
        token: &str,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent> {
        let mut url = self.repo_endpoint(full_name, ["contents"])?;
        url.path_segments_mut()
            .map_err(|_| GithubError::InvalidUrl(self.api_url.to_string()))?
            .extend(path.split('/').filter(|s| !s.is_empty()));
        url.query_pairs_mut().append_pair("ref", git_ref);

        let payload: ContentPayload = self.get_json(token, url).await?;
        Ok(decode_content(path, payload))
    }
}

/// Decodes a contents API payload. Anything that is not valid base64-encoded
/// UTF-8 is classified as binary.
pub(crate) fn decode_content(path: &str, payload: ContentPayload) -> FileContent {
    if payload.encoding.as_deref() != Some("base64") {
        tracing::debug!("Content of {path} is not base64 encoded, treating as binary");
        return FileContent::degraded();
    }

    // GitHub wraps the encoded payload at 60 columns.
    let encoded: String = payload.content.split_whitespace().collect();
    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to decode base64 content of {path}: {e}");
            return FileContent::degraded();
        }
    };

    let size = bytes.len() as u64;
    match String::from_utf8(bytes) {
        Ok(text) => FileContent::text(text),
        Err(_) => FileContent::binary(size),
    }
}

/// Walks a paginated listing page by page, starting at page 1, until a page
/// comes back shorter than `page_size`. A failing page stops the walk and the
/// items gathered so far are returned.
pub(crate) async fn collect_pages<T, F, Fut>(page_size: usize, mut fetch_page: F) -> Vec<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        match fetch_page(page).await {
            Ok(batch) => {
                let batch_len = batch.len();
                items.extend(batch);
                if batch_len < page_size {
                    break;
                }
                page += 1;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to fetch page {page}: {e}. Returning {} items gathered so far.",
                    items.len()
                );
                break;
            }
        }
    }

    items
}

#[async_trait]
impl GithubClient for DefaultGithubClient {
    async fn fetch_user(&self, token: &str) -> Result<UserProfile> {
        let url = self.endpoint(["user"])?;
        self.get_json(token, url).await
    }

    async fn fetch_all_repositories(&self, token: &str) -> Vec<RepoDescriptor> {
        collect_pages(PAGE_SIZE, |page| self.fetch_repositories_page(token, page)).await
    }

    async fn fetch_branches(&self, token: &str, full_name: &str) -> Result<Vec<BranchDescriptor>> {
        tracing::debug!("Fetching branches for {full_name}");
        let mut branches = Vec::new();
        let mut page = 1;

        // Unlike the repository listing, a failing branch page is an error:
        // a partial branch list would delete the missing branches locally.
        loop {
            let batch = self.fetch_branches_page(token, full_name, page).await?;
            let batch_len = batch.len();
            branches.extend(batch);
            if batch_len < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(branches)
    }

    async fn fetch_topics(&self, token: &str, full_name: &str) -> Result<Vec<String>> {
        tracing::debug!("Fetching topics for {full_name}");
        let url = self.repo_endpoint(full_name, ["topics"])?;
        let topics: TopicsResponse = self.get_json(token, url).await?;
        Ok(topics.names)
    }

    async fn fetch_recursive_tree(
        &self,
        token: &str,
        full_name: &str,
        commit_sha: &str,
    ) -> Result<Vec<TreeEntry>> {
        tracing::debug!("Fetching tree of {full_name} at {commit_sha}");
        let mut url = self.repo_endpoint(full_name, ["git", "trees", commit_sha])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: TreeResponse = self.get_json(token, url).await?;
        if tree.truncated {
            tracing::warn!("Tree of {full_name} at {commit_sha} was truncated by GitHub");
            return Err(GithubError::TruncatedTree {
                full_name: full_name.to_string(),
                commit_sha: commit_sha.to_string(),
            });
        }

        Ok(tree.into_blobs())
    }

    async fn fetch_diff(
        &self,
        token: &str,
        full_name: &str,
        old_sha: &str,
        new_sha: &str,
    ) -> Result<Vec<ChangedFileDescriptor>> {
        tracing::debug!("Comparing {full_name} {old_sha}...{new_sha}");
        let range = format!("{old_sha}...{new_sha}");
        let url = self.repo_endpoint(full_name, ["compare", range.as_str()])?;

        // Paging a comparison only pages its commits; the file list is capped.
        let compare: CompareResponse = self.get_json(token, url).await?;
        if compare.files.len() >= COMPARE_FILE_LIMIT {
            tracing::warn!(
                "Comparison {range} of {full_name} hit the {COMPARE_FILE_LIMIT} file limit"
            );
            return Err(GithubError::DiffTooLarge {
                full_name: full_name.to_string(),
                base: old_sha.to_string(),
                head: new_sha.to_string(),
                files: compare.files.len(),
            });
        }

        Ok(compare.files)
    }

    async fn fetch_file_content(
        &self,
        token: &str,
        full_name: &str,
        path: &str,
        git_ref: &str,
    ) -> FileContent {
        match self.try_fetch_file_content(token, full_name, path, git_ref).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to fetch content for {path} in {full_name}: {e}");
                FileContent::degraded()
            }
        }
    }
}
