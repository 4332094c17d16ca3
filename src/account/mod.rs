
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use teloxide::types::ChatId;
use thiserror::Error;
use url::Url;

use crate::{
    github::{GithubClient, GithubError},
    storage::{AccountStorage, Repository, StorageError, User},
};

/// Errors raised while linking accounts.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The GitHub API rejected a request.
    #[error("GitHub request failed: {0}")]
    Github(#[from] GithubError),
    /// Reading or writing the database failed.
    #[error("Failed to access storage: {0}")]
    Storage(#[from] StorageError),
    /// The configured authorization URL does not parse.
    #[error("Invalid OAuth URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

type Result<T> = std::result::Result<T, AccountError>;

/// The GitHub OAuth application the bot authenticates users through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    /// OAuth application client id.
    pub client_id: String,
    /// Authorization endpoint the login link points at.
    pub authorize_url: String,
    /// Where GitHub sends the user after authorizing.
    pub redirect_uri: String,
}

/// A user linked to GitHub together with the repositories imported for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    /// The stored user.
    pub user: User,
    /// Repositories imported at link time.
    pub repositories: Vec<Repository>,
}

/// Linking and unlinking GitHub accounts.
#[automock]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Build the GitHub authorization URL for a chat. The chat id travels as
    /// the OAuth `state` so the callback knows which chat to link.
    fn login_url(&self, chat_id: ChatId) -> Result<Url>;

    /// Link the owner of `access_token` to a chat and import their
    /// repositories.
    async fn link_account(&self, chat_id: ChatId, access_token: &str) -> Result<LinkedAccount>;

    /// Forget the access token of the chat's user. Returns whether a linked
    /// account was found.
    async fn logout(&self, chat_id: ChatId) -> Result<bool>;
}

/// [`AccountService`] backed by GitHub and the account storage.
pub struct DefaultAccountService {
    storage: Arc<dyn AccountStorage>,
    github_client: Arc<dyn GithubClient>,
    oauth: OAuthSettings,
}

impl DefaultAccountService {
    /// Creates a new `DefaultAccountService`.
    pub fn new(
        storage: Arc<dyn AccountStorage>,
        github_client: Arc<dyn GithubClient>,
        oauth: OAuthSettings,
    ) -> Self {
        Self { storage, github_client, oauth }
    }
}

#[async_trait]
impl AccountService for DefaultAccountService {
    fn login_url(&self, chat_id: ChatId) -> Result<Url> {
        let mut url = Url::parse(&self.oauth.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.oauth.client_id)
            .append_pair("redirect_uri", &self.oauth.redirect_uri)
            .append_pair("scope", "repo")
            .append_pair("state", &chat_id.0.to_string());
        Ok(url)
    }

    async fn link_account(&self, chat_id: ChatId, access_token: &str) -> Result<LinkedAccount> {
        let profile = self.github_client.fetch_user(access_token).await?;
        tracing::debug!("Linking GitHub user {} to chat {chat_id}", profile.login);
        let user = self.storage.upsert_user(&profile, chat_id, access_token).await?;

        let descriptors = self.github_client.fetch_all_repositories(access_token).await;
        let repositories = self.storage.upsert_repositories(&user, &descriptors).await?;
        tracing::info!(
            "Linked {} to chat {chat_id} with {} repositories",
            user.github_login,
            repositories.len()
        );

        Ok(LinkedAccount { user, repositories })
    }

    async fn logout(&self, chat_id: ChatId) -> Result<bool> {
        Ok(self.storage.clear_access_token(chat_id).await?)
    }
}
