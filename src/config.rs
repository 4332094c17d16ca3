use std::{
    env::{self, VarError},
    time::Duration,
};

use crate::pagination::DEFAULT_PAGE_SIZE;

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_OAUTH_URL: &str = "https://github.com/login/oauth/authorize";
const DEFAULT_OAUTH_REDIRECT_URI: &str = "http://localhost:8000/api/auth/github/callback";
const DEFAULT_PREVIEW_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_DATABASE_URL: &str = "sqlite:data/data.db";
const DEFAULT_MAX_CONCURRENCY: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Represents the application configuration.
#[derive(Debug)]
pub struct Config {
    /// The Telegram bot token.
    pub telegram_bot_token: String,
    /// The client id of the GitHub OAuth application.
    pub github_client_id: String,
    /// The base URL of the GitHub REST API.
    pub github_api_url: String,
    /// The GitHub OAuth authorization endpoint.
    pub github_oauth_url: String,
    /// Where GitHub sends the user back after authorization.
    pub oauth_redirect_uri: String,
    /// The base URL previews are served from.
    pub preview_base_url: String,
    /// The URL of the database.
    pub database_url: String,
    /// The maximum number of concurrent file content requests to GitHub.
    pub max_concurrency: usize,
    /// The timeout applied to every GitHub request.
    pub request_timeout: Duration,
    /// The number of repositories shown per keyboard page.
    pub repos_page_size: usize,
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    pub fn from_env() -> Result<Self, VarError> {
        Ok(Self {
            telegram_bot_token: env::var("TELOXIDE_TOKEN")?,
            github_client_id: env::var("GITHUB_CLIENT_ID")?,
            github_api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            github_oauth_url: env::var("GITHUB_OAUTH_URL")
                .unwrap_or_else(|_| DEFAULT_GITHUB_OAUTH_URL.to_string()),
            oauth_redirect_uri: env::var("OAUTH_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_OAUTH_REDIRECT_URI.to_string()),
            preview_base_url: env::var("PREVIEW_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PREVIEW_BASE_URL.to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_concurrency: env::var("MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            repos_page_size: env::var("REPOS_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use temp_env::with_vars;

    use super::*;

    #[test]
    fn test_from_env() {
        with_vars(
            [
                ("TELOXIDE_TOKEN", Some("test telegram bot token")),
                ("GITHUB_CLIENT_ID", Some("test client id")),
                ("GITHUB_API_URL", Some("http://localhost:1234")),
                ("GITHUB_OAUTH_URL", Some("http://localhost:1234/authorize")),
                ("OAUTH_REDIRECT_URI", Some("https://bot.example.com/callback")),
                ("PREVIEW_BASE_URL", Some("https://bot.example.com")),
                ("DATABASE_URL", Some("sqlite:test/test.db")),
                ("MAX_CONCURRENCY", Some("4")),
                ("REQUEST_TIMEOUT", Some("30")),
                ("REPOS_PAGE_SIZE", Some("5")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.telegram_bot_token, "test telegram bot token");
                assert_eq!(config.github_client_id, "test client id");
                assert_eq!(config.github_api_url, "http://localhost:1234");
                assert_eq!(config.github_oauth_url, "http://localhost:1234/authorize");
                assert_eq!(config.oauth_redirect_uri, "https://bot.example.com/callback");
                assert_eq!(config.preview_base_url, "https://bot.example.com");
                assert_eq!(config.database_url, "sqlite:test/test.db");
                assert_eq!(config.max_concurrency, 4);
                assert_eq!(config.request_timeout, Duration::from_secs(30));
                assert_eq!(config.repos_page_size, 5);
            },
        );
    }

    #[test]
    fn test_missing_telegram_bot_token_error() {
        with_vars(
            [("GITHUB_CLIENT_ID", Some("test client id")), ("TELOXIDE_TOKEN", None)],
            || {
                let config = Config::from_env();
                assert!(config.is_err());
            },
        );
    }

    #[test]
    fn test_missing_github_client_id_error() {
        with_vars(
            [("TELOXIDE_TOKEN", Some("test telegram bot token")), ("GITHUB_CLIENT_ID", None)],
            || {
                let config = Config::from_env();
                assert!(config.is_err());
            },
        );
    }

    #[test]
    fn test_missing_optional_values_default() {
        with_vars(
            [
                ("TELOXIDE_TOKEN", Some("test telegram bot token")),
                ("GITHUB_CLIENT_ID", Some("test client id")),
                ("GITHUB_API_URL", None),
                ("GITHUB_OAUTH_URL", None),
                ("OAUTH_REDIRECT_URI", None),
                ("PREVIEW_BASE_URL", None),
                ("DATABASE_URL", None),
                ("MAX_CONCURRENCY", None),
                ("REQUEST_TIMEOUT", None),
                ("REPOS_PAGE_SIZE", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
                assert_eq!(config.github_oauth_url, DEFAULT_GITHUB_OAUTH_URL);
                assert_eq!(config.oauth_redirect_uri, DEFAULT_OAUTH_REDIRECT_URI);
                assert_eq!(config.preview_base_url, DEFAULT_PREVIEW_BASE_URL);
                assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
                assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
                assert_eq!(
                    config.request_timeout,
                    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
                );
                assert_eq!(config.repos_page_size, DEFAULT_PAGE_SIZE);
            },
        );
    }

    #[test]
    fn test_invalid_numbers_default() {
        with_vars(
            [
                ("TELOXIDE_TOKEN", Some("test telegram bot token")),
                ("GITHUB_CLIENT_ID", Some("test client id")),
                ("MAX_CONCURRENCY", Some("many")),
                ("REQUEST_TIMEOUT", Some("-5")),
                ("REPOS_PAGE_SIZE", Some("")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
                assert_eq!(
                    config.request_timeout,
                    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
                );
                assert_eq!(config.repos_page_size, DEFAULT_PAGE_SIZE);
            },
        );
    }
}
