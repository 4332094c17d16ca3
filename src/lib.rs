#![warn(missing_docs)]
//! A Telegram bot for previewing static sites hosted in GitHub repositories.
//!
//! Users link their GitHub account, pick a repository and a branch, and the
//! bot captures the branch as an immutable snapshot. Later selections only
//! fetch what changed since the previous snapshot. The latest snapshot of a
//! branch can then be materialized into a preview.

/// Linking GitHub accounts to chats.
pub mod account;
/// The main handler for the bot's logic.
pub mod bot_handler;
/// The configuration for the application.
pub mod config;
/// The dispatcher for routing updates to the correct handlers.
pub mod dispatcher;
/// The client for interacting with the GitHub API.
pub mod github;
/// The service for sending messages to the user.
pub mod messaging;
/// A utility for paginating data.
pub mod pagination;
/// Materializing branch snapshots into previews.
pub mod preview;
/// Per-chat repository and branch selection.
pub mod selection;
/// The storage layer for persisting data.
pub mod storage;
/// Capturing branches as snapshots.
pub mod sync;

use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    account::{DefaultAccountService, OAuthSettings},
    bot_handler::BotHandler,
    config::Config,
    github::DefaultGithubClient,
    messaging::TelegramMessagingService,
    preview::DefaultPreviewService,
    selection::DefaultSelectionService,
    storage::sqlite::SqliteStorage,
    sync::SnapshotSynchronizer,
};

/// Runs the bot.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let storage = Arc::new(SqliteStorage::new(&config.database_url).await?);
    let bot = Bot::new(config.telegram_bot_token.clone());
    let github_client =
        Arc::new(DefaultGithubClient::new(&config.github_api_url, config.request_timeout)?);

    let synchronizer = Arc::new(SnapshotSynchronizer::new(
        github_client.clone(),
        storage.clone(),
        config.max_concurrency,
    ));
    let preview_service = Arc::new(DefaultPreviewService::new(storage.clone()));

    let account_service = Arc::new(DefaultAccountService::new(
        storage.clone(),
        github_client.clone(),
        OAuthSettings {
            client_id: config.github_client_id.clone(),
            authorize_url: config.github_oauth_url.clone(),
            redirect_uri: config.oauth_redirect_uri.clone(),
        },
    ));
    let selection_service = Arc::new(DefaultSelectionService::new(
        storage,
        github_client,
        synchronizer,
        preview_service,
        config.repos_page_size,
    ));

    let messaging_service = Arc::new(TelegramMessagingService::new(bot.clone()));
    let handler = Arc::new(BotHandler::new(
        messaging_service,
        account_service,
        selection_service,
        config.preview_base_url.clone(),
    ));

    let mut dispatcher = dispatcher::BotDispatcher::new(handler).build(bot);
    tracing::debug!("Dispatcher built successfully.");

    dispatcher.dispatch().await;

    Ok(())
}
