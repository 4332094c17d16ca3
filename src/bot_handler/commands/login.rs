use crate::bot_handler::{BotHandlerResult, Context};

/// Without arguments, sends the OAuth authorization link. With a token,
/// links the token's owner to the chat directly.
pub async fn handle(ctx: Context<'_>, token: &str) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let token = token.trim();

    if token.is_empty() {
        let login_url = ctx.handler.account_service.login_url(chat_id)?;
        ctx.handler.messaging_service.send_login_msg(chat_id, &login_url).await?;
        return Ok(());
    }

    // The token must not stay in the chat history.
    if let Err(e) = ctx.handler.messaging_service.delete_message(chat_id, ctx.message.id).await {
        tracing::warn!("Failed to delete login message in chat {chat_id}: {e}");
    }

    let account = ctx.handler.account_service.link_account(chat_id, token).await?;
    ctx.handler.messaging_service.send_account_linked_msg(chat_id, &account).await?;

    Ok(())
}
