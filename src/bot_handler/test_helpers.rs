use std::sync::Arc;

use chrono::Utc;
use teloxide::types::{
    CallbackQuery, Chat, ChatId, ChatKind, ChatPrivate, MaybeInaccessibleMessage, MediaKind,
    MediaText, Message, MessageCommon, MessageId, MessageKind, User, UserId,
};

use crate::{
    account::MockAccountService,
    bot_handler::{BotHandler, BotHandlerError, CallbackAction, Command},
    messaging::MockMessagingService,
    selection::MockSelectionService,
};

pub const CHAT_ID: ChatId = ChatId(123);
pub const MESSAGE_ID: MessageId = MessageId(1);
pub const PREVIEW_BASE_URL: &str = "https://preview.example.com";

// Test harness to encapsulate common test setup and actions.
pub struct TestHarness {
    bot_handler: BotHandler,
}

impl TestHarness {
    // Creates a new TestHarness with mock services.
    pub fn new(
        mock_messaging: MockMessagingService,
        mock_account: MockAccountService,
        mock_selection: MockSelectionService,
    ) -> Self {
        let bot_handler = BotHandler::new(
            Arc::new(mock_messaging),
            Arc::new(mock_account),
            Arc::new(mock_selection),
            PREVIEW_BASE_URL.to_string(),
        );

        Self { bot_handler }
    }

    // Simulates handling a command message.
    pub async fn handle_command(&self, text: &str, command: Command) -> Result<(), BotHandlerError> {
        let msg = mock_message(CHAT_ID, text);
        self.bot_handler.handle_commands(&msg, command).await
    }

    // Simulates a press on a keyboard button.
    pub async fn handle_callback(&self, action: &CallbackAction) -> Result<(), BotHandlerError> {
        let query = mock_callback_query(CHAT_ID, Some(serde_json::to_string(action).unwrap()));
        self.bot_handler.handle_callback_query(&query).await
    }

    // Simulates a press on a button carrying arbitrary data.
    pub async fn handle_raw_callback(&self, data: Option<&str>) -> Result<(), BotHandlerError> {
        let query = mock_callback_query(CHAT_ID, data.map(String::from));
        self.bot_handler.handle_callback_query(&query).await
    }

    pub async fn handle_unknown(&self, text: &str) -> Result<(), BotHandlerError> {
        let msg = mock_message(CHAT_ID, text);
        self.bot_handler.handle_unknown(&msg).await
    }
}

// Helper to create a mock teloxide message to reduce boilerplate in tests
pub fn mock_message(chat_id: ChatId, text: &str) -> Message {
    Message {
        id: MESSAGE_ID,
        date: Utc::now(),
        chat: Chat {
            id: chat_id,
            kind: ChatKind::Private(ChatPrivate {
                username: Some("test".to_string()),
                first_name: Some("Test".to_string()),
                last_name: None,
            }),
        },
        kind: MessageKind::Common(MessageCommon {
            media_kind: MediaKind::Text(MediaText {
                text: text.to_string(),
                entities: vec![],
                link_preview_options: None,
            }),
            reply_to_message: None,
            reply_markup: None,
            edit_date: None,
            author_signature: None,
            has_protected_content: false,
            is_automatic_forward: false,
            effect_id: None,
            forward_origin: None,
            external_reply: None,
            quote: None,
            reply_to_story: None,
            sender_boost_count: None,
            is_from_offline: false,
            business_connection_id: None,
        }),
        from: None,
        is_topic_message: false,
        sender_business_bot: None,
        sender_chat: None,
        thread_id: None,
        via_bot: None,
    }
}

// Helper to create a mock callback query attached to a keyboard message
pub fn mock_callback_query(chat_id: ChatId, data: Option<String>) -> CallbackQuery {
    let msg = mock_message(chat_id, "This is a message with a keyboard.");
    CallbackQuery {
        id: "test_callback_id".to_string(),
        from: User {
            id: UserId(1),
            is_bot: false,
            first_name: "Test".to_string(),
            last_name: None,
            username: Some("testuser".to_string()),
            language_code: None,
            is_premium: false,
            added_to_attachment_menu: false,
        },
        message: Some(MaybeInaccessibleMessage::Regular(Box::new(msg))),
        inline_message_id: None,
        chat_instance: "test_instance".to_string(),
        data,
        game_short_name: None,
    }
}
