use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let repos = ctx.handler.selection_service.list_repositories(chat_id, 1).await?;

    if repos.items.is_empty() {
        ctx.handler.messaging_service.send_list_empty_msg(chat_id).await?;
        return Ok(());
    }

    ctx.handler.messaging_service.send_repo_list_msg(chat_id, repos).await?;
    Ok(())
}
