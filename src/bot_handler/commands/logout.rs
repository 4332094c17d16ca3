use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let logged_out = ctx.handler.account_service.logout(chat_id).await?;
    ctx.handler.messaging_service.send_logout_msg(chat_id, logged_out).await?;
    Ok(())
}
