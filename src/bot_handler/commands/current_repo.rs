use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let selection = ctx.handler.selection_service.current_selection(chat_id).await?;
    ctx.handler.messaging_service.send_current_selection_msg(chat_id, &selection).await?;
    Ok(())
}
