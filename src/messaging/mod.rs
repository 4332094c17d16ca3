mod keyboards;
pub(crate) mod utils;

use async_trait::async_trait;
use mockall::automock;
use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode},
    utils::{command::BotCommands, html},
};
use thiserror::Error;
use url::Url;

use crate::{
    account::LinkedAccount,
    bot_handler::Command,
    pagination::Paginated,
    preview::PreviewBundle,
    selection::{Selection, SyncedBranch},
    storage::{Branch, Repository},
};

/// Errors raised while talking to Telegram.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A Bot API request failed.
    #[error("Teloxide API request failed: {0}")]
    TeloxideRequest(#[from] teloxide::RequestError),
}

type Result<T> = std::result::Result<T, MessagingError>;

/// Trait for sending messages to the user.
#[automock]
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Sends a text message to the provided chat with a keyboard. If no
    /// keyboard is provided, the default command keyboard is used.
    async fn send_response_with_keyboard(
        &self,
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()>;

    /// Sends an error message to the provided chat.
    async fn send_error_msg(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Sends the welcome message.
    async fn send_start_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Sends the command list.
    async fn send_help_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Sends the command keyboard.
    async fn send_menu_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Sends the GitHub authorization link.
    async fn send_login_msg(&self, chat_id: ChatId, login_url: &Url) -> Result<()>;

    /// Confirms a linked account and how many repositories were imported.
    async fn send_account_linked_msg(&self, chat_id: ChatId, account: &LinkedAccount)
    -> Result<()>;

    /// Confirms a logout, or says nothing was linked.
    async fn send_logout_msg(&self, chat_id: ChatId, logged_out: bool) -> Result<()>;

    /// Sends a message to the user that they have no repositories.
    async fn send_list_empty_msg(&self, chat_id: ChatId) -> Result<()>;

    /// Sends a page of repositories with one selection button per repository.
    async fn send_repo_list_msg(&self, chat_id: ChatId, repos: Paginated<Repository>)
    -> Result<()>;

    /// Replaces the keyboard message with another page of repositories.
    async fn edit_repo_list_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        repos: Paginated<Repository>,
    ) -> Result<()>;

    /// Replaces the keyboard message with the branches of a freshly selected
    /// repository.
    async fn edit_branch_list_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        repository: &Repository,
        branches: &[Branch],
    ) -> Result<()>;

    /// Replaces the keyboard message with the outcome of a branch selection.
    async fn edit_branch_selected_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        synced: &SyncedBranch,
    ) -> Result<()>;

    /// Describes the chat's repository and branch.
    async fn send_current_selection_msg(&self, chat_id: ChatId, selection: &Selection)
    -> Result<()>;

    /// Sends the preview summary with a link to open it.
    async fn send_preview_msg(
        &self,
        chat_id: ChatId,
        bundle: &PreviewBundle,
        preview_url: &str,
    ) -> Result<()>;

    /// Answers a callback query to clear the button spinner.
    async fn answer_callback_query(&self, query_id: &str) -> Result<()>;

    /// Deletes a message the bot sent.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;
}

/// Telegram messaging service.
pub struct TelegramMessagingService {
    bot: Bot,
}

impl TelegramMessagingService {
    /// Creates a new `TelegramMessagingService`.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Formats the header of a paginated listing.
    pub(crate) fn format_paginated_message_text<T>(
        title: &str,
        paginated: &Paginated<T>,
        item_name: &str,
    ) -> String {
        if paginated.total_items == 0 {
            return format!("{title}\n\nNo {item_name} found.");
        }

        format!(
            "{title} (Page {} of {})\nTotal {item_name}: {}",
            paginated.page, paginated.total_pages, paginated.total_items
        )
    }

    async fn edit_with_keyboard(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<()> {
        self.bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }
}

#[async_trait]
impl MessagingService for TelegramMessagingService {
    async fn send_response_with_keyboard(
        &self,
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        // If no keyboard is provided, use the default command keyboard.
        let keyboard = keyboard.unwrap_or_else(|| keyboards::COMMAND_KEYBOARD.clone());

        self.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn send_error_msg(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.send_response_with_keyboard(chat_id, format!("❌ {}", html::escape(text)), None).await
    }

    async fn send_start_msg(&self, chat_id: ChatId) -> Result<()> {
        let start_text = "👋 Welcome! Link your GitHub account with /login, pick a repository and \
                          a branch, then open a live preview of its static files.";
        self.send_response_with_keyboard(chat_id, start_text.to_string(), None).await
    }

    async fn send_help_msg(&self, chat_id: ChatId) -> Result<()> {
        let help_text = Command::descriptions().to_string();
        self.send_response_with_keyboard(chat_id, html::escape(&help_text), None).await
    }

    async fn send_menu_msg(&self, chat_id: ChatId) -> Result<()> {
        self.send_response_with_keyboard(chat_id, "📋 Main menu:".to_string(), None).await
    }

    async fn send_login_msg(&self, chat_id: ChatId, login_url: &Url) -> Result<()> {
        let text = format!(
            "🔑 Open this link in your browser to connect your GitHub account:\n{}",
            html::escape(login_url.as_str())
        );
        self.send_response_with_keyboard(chat_id, text, None).await
    }

    async fn send_account_linked_msg(
        &self,
        chat_id: ChatId,
        account: &LinkedAccount,
    ) -> Result<()> {
        let text = format!(
            "✅ Linked GitHub account <b>{}</b> with {} repositories. Use /select_repo to pick \
             one.",
            html::escape(&account.user.github_login),
            account.repositories.len()
        );
        self.send_response_with_keyboard(chat_id, text, None).await
    }

    async fn send_logout_msg(&self, chat_id: ChatId, logged_out: bool) -> Result<()> {
        let text = if logged_out {
            "👋 Your GitHub account has been disconnected."
        } else {
            "⚠️ No GitHub account is linked to this chat."
        };
        self.send_response_with_keyboard(chat_id, text.to_string(), None).await
    }

    async fn send_list_empty_msg(&self, chat_id: ChatId) -> Result<()> {
        self.send_response_with_keyboard(
            chat_id,
            "No repositories found for your account.".to_string(),
            None,
        )
        .await
    }

    async fn send_repo_list_msg(
        &self,
        chat_id: ChatId,
        repos: Paginated<Repository>,
    ) -> Result<()> {
        let text = Self::format_paginated_message_text(
            "📦 Select a repository",
            &repos,
            "repositories",
        );
        let keyboard = keyboards::build_repo_list_keyboard(&repos);
        self.send_response_with_keyboard(chat_id, text, Some(keyboard)).await
    }

    async fn edit_repo_list_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        repos: Paginated<Repository>,
    ) -> Result<()> {
        let text = Self::format_paginated_message_text(
            "📦 Select a repository",
            &repos,
            "repositories",
        );
        let keyboard = keyboards::build_repo_list_keyboard(&repos);
        self.edit_with_keyboard(chat_id, message_id, text, keyboard).await
    }

    async fn edit_branch_list_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        repository: &Repository,
        branches: &[Branch],
    ) -> Result<()> {
        let text = if branches.is_empty() {
            format!("⚠️ <b>{}</b> has no branches.", html::escape(&repository.full_name))
        } else {
            format!("🌿 Select a branch of <b>{}</b>:", html::escape(&repository.full_name))
        };
        let keyboard = keyboards::build_branch_list_keyboard(branches);
        self.edit_with_keyboard(chat_id, message_id, text, keyboard).await
    }

    async fn edit_branch_selected_msg(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        synced: &SyncedBranch,
    ) -> Result<()> {
        let text = format!(
            "✅ <b>{}</b> @ <code>{}</code> synchronized at commit <code>{}</code>.",
            html::escape(&synced.repository.full_name),
            html::escape(&synced.branch.name),
            synced.code_state.short_sha()
        );
        let keyboard = keyboards::build_branch_selected_keyboard(&synced.repository);
        self.edit_with_keyboard(chat_id, message_id, text, keyboard).await
    }

    async fn send_current_selection_msg(
        &self,
        chat_id: ChatId,
        selection: &Selection,
    ) -> Result<()> {
        self.send_response_with_keyboard(chat_id, utils::format_selection(selection), None).await
    }

    async fn send_preview_msg(
        &self,
        chat_id: ChatId,
        bundle: &PreviewBundle,
        preview_url: &str,
    ) -> Result<()> {
        let text = utils::format_preview(bundle, preview_url);
        self.send_response_with_keyboard(chat_id, text, None).await
    }

    async fn answer_callback_query(&self, query_id: &str) -> Result<()> {
        self.bot
            .answer_callback_query(query_id)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.bot
            .delete_message(chat_id, message_id)
            .await
            .map(|_| ())
            .map_err(MessagingError::TeloxideRequest)
    }
}
