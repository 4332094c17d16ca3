mod callback_actions;
mod callbacks;
mod commands;
#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

pub use callback_actions::CallbackAction;
use teloxide::{prelude::*, types::Message, utils::command::BotCommands};
use thiserror::Error;

use crate::{
    account::{AccountError, AccountService},
    github::GithubError,
    messaging::{MessagingError, MessagingService},
    selection::{SelectionError, SelectionService},
};

/// Commands the bot understands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum Command {
    /// `/start`
    #[command(description = "Start the bot and show welcome message.")]
    Start,
    /// `/help`
    #[command(description = "Show this help text.")]
    Help,
    /// `/menu`
    #[command(description = "Show the main menu.")]
    Menu,
    /// `/login [token]`
    #[command(
        description = "Connect your GitHub account. Pass a personal access token to link it \
                       directly."
    )]
    Login(String),
    /// `/logout`
    #[command(description = "Disconnect your GitHub account.")]
    Logout,
    /// `/select_repo`
    #[command(description = "Pick a repository and a branch.")]
    SelectRepo,
    /// `/current_repo`
    #[command(description = "Show the current repository and branch.")]
    CurrentRepo,
    /// `/preview`
    #[command(description = "Open a preview of the current branch.")]
    Preview,
}

/// Errors raised by command and callback handlers.
#[derive(Error, Debug)]
pub enum BotHandlerError {
    /// The user sent something the handler cannot act on.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linking or unlinking the account failed.
    #[error("Account error: {0}")]
    AccountError(#[from] AccountError),

    /// Selecting, syncing or previewing failed.
    #[error("Selection error: {0}")]
    SelectionError(#[from] SelectionError),

    /// Telegram rejected a reply.
    #[error("Failed to send message: {0}")]
    SendMessageError(#[from] MessagingError),
}

/// Result alias used by every handler.
pub type BotHandlerResult<T> = Result<T, BotHandlerError>;

impl BotHandlerError {
    /// The text shown to the user when a handler fails.
    pub fn user_message(&self) -> String {
        match self {
            BotHandlerError::InvalidInput(msg) => msg.clone(),
            BotHandlerError::AccountError(AccountError::Github(e))
            | BotHandlerError::SelectionError(SelectionError::Github(e)) => github_message(e),
            BotHandlerError::AccountError(_) => {
                "Failed to link your GitHub account, try again.".to_string()
            }
            BotHandlerError::SelectionError(e) => match e {
                SelectionError::NotLinked => {
                    "No GitHub account is linked to this chat. Use /login first.".to_string()
                }
                SelectionError::RepositoryNotFound(_) => {
                    "This repository is no longer available. Use /select_repo again.".to_string()
                }
                SelectionError::BranchNotFound(_) => {
                    "This branch is no longer available. Use /select_repo again.".to_string()
                }
                SelectionError::NoRepositorySelected => {
                    "Select a repository first with /select_repo.".to_string()
                }
                SelectionError::NoBranchSelected => {
                    "Select a branch first with /select_repo.".to_string()
                }
                SelectionError::NotSynchronized => {
                    "The selected branch is not synchronized yet. Select it again.".to_string()
                }
                SelectionError::Sync(_) => "Failed to sync, try again.".to_string(),
                _ => "Something went wrong, try again.".to_string(),
            },
            BotHandlerError::SendMessageError(_) => "Something went wrong, try again.".to_string(),
        }
    }
}

fn github_message(error: &GithubError) -> String {
    match error {
        GithubError::Unauthorized => {
            "GitHub rejected your access token. Use /login to connect again.".to_string()
        }
        GithubError::RateLimited => "GitHub rate limit reached, try again later.".to_string(),
        _ => "GitHub request failed, try again.".to_string(),
    }
}

/// Context groups the data needed by all command and callback handlers.
pub struct Context<'a> {
    /// The handler owning the services.
    pub handler: &'a BotHandler,
    /// The message being answered.
    pub message: &'a Message,
    /// The callback query, for keyboard presses.
    pub query: Option<&'a CallbackQuery>,
}

/// Routes commands and keyboard callbacks to the account and selection
/// services.
pub struct BotHandler {
    messaging_service: Arc<dyn MessagingService>,
    account_service: Arc<dyn AccountService>,
    selection_service: Arc<dyn SelectionService>,
    preview_base_url: String,
}

impl BotHandler {
    /// Creates a new `BotHandler` instance.
    pub fn new(
        messaging_service: Arc<dyn MessagingService>,
        account_service: Arc<dyn AccountService>,
        selection_service: Arc<dyn SelectionService>,
        preview_base_url: String,
    ) -> Self {
        Self { messaging_service, account_service, selection_service, preview_base_url }
    }

    /// Dispatches the incoming command to the appropriate handler.
    pub async fn handle_commands(&self, msg: &Message, cmd: Command) -> BotHandlerResult<()> {
        let ctx = Context { handler: self, message: msg, query: None };

        let result = match cmd {
            Command::Start => commands::start::handle(ctx).await,
            Command::Help => commands::help::handle(ctx).await,
            Command::Menu => commands::menu::handle(ctx).await,
            Command::Login(token) => commands::login::handle(ctx, &token).await,
            Command::Logout => commands::logout::handle(ctx).await,
            Command::SelectRepo => commands::select_repo::handle(ctx).await,
            Command::CurrentRepo => commands::current_repo::handle(ctx).await,
            Command::Preview => commands::preview::handle(ctx).await,
        };

        self.report_error(msg.chat.id, result).await
    }

    /// Handles a press on an inline keyboard button.
    pub async fn handle_callback_query(&self, query: &CallbackQuery) -> BotHandlerResult<()> {
        // Answer the callback query to clear the spinner.
        self.messaging_service.answer_callback_query(&query.id).await?;

        let Some(message) = query.message.as_ref().and_then(|m| m.regular_message()) else {
            tracing::warn!("Callback query {} has no accessible message", query.id);
            return Ok(());
        };

        let result = match query.data.as_deref().map(serde_json::from_str::<CallbackAction>) {
            Some(Ok(action)) => self.dispatch_action(message, query, action).await,
            Some(Err(e)) => Err(BotHandlerError::InvalidInput(format!("Unknown action: {e}"))),
            None => Err(BotHandlerError::InvalidInput("Callback data is missing".to_string())),
        };

        self.report_error(message.chat.id, result).await
    }

    /// Replies to a message that is not a known command.
    pub async fn handle_unknown(&self, msg: &Message) -> BotHandlerResult<()> {
        self.messaging_service
            .send_error_msg(msg.chat.id, "Unknown command. Use /help to see what I can do.")
            .await?;
        Ok(())
    }

    async fn dispatch_action(
        &self,
        message: &Message,
        query: &CallbackQuery,
        action: CallbackAction,
    ) -> BotHandlerResult<()> {
        let ctx = Context { handler: self, message, query: Some(query) };

        match action {
            CallbackAction::CmdHelp => commands::help::handle(ctx).await,
            CallbackAction::CmdMenu => commands::menu::handle(ctx).await,
            CallbackAction::CmdSelectRepo => commands::select_repo::handle(ctx).await,
            CallbackAction::CmdCurrentRepo => commands::current_repo::handle(ctx).await,
            CallbackAction::CmdPreview => commands::preview::handle(ctx).await,
            CallbackAction::ReposPage(page) => callbacks::repos_page::handle(ctx, page).await,
            CallbackAction::SelectRepo(id) => callbacks::select_repo::handle(ctx, id).await,
            CallbackAction::SelectBranch(id) => callbacks::select_branch::handle(ctx, id).await,
        }
    }

    /// Turns a failed handler into an error reply. Only failures to talk to
    /// Telegram are propagated to the dispatcher.
    async fn report_error(
        &self,
        chat_id: ChatId,
        result: BotHandlerResult<()>,
    ) -> BotHandlerResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e @ BotHandlerError::SendMessageError(_)) => Err(e),
            Err(e) => {
                tracing::warn!("Handler failed for chat {chat_id}: {e}");
                self.messaging_service.send_error_msg(chat_id, &e.user_message()).await?;
                Ok(())
            }
        }
    }
}
