use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let bundle = ctx.handler.selection_service.preview(chat_id).await?;
    let preview_url = bundle.preview_url(&ctx.handler.preview_base_url);

    tracing::debug!("Preview for chat {chat_id}: {preview_url}");

    ctx.handler.messaging_service.send_preview_msg(chat_id, &bundle, &preview_url).await?;
    Ok(())
}
