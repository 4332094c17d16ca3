use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>, repository_id: i64) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;

    // Refreshes the branch list from GitHub before showing it.
    let (repository, branches) =
        ctx.handler.selection_service.select_repository(chat_id, repository_id).await?;

    ctx.handler
        .messaging_service
        .edit_branch_list_msg(chat_id, ctx.message.id, &repository, &branches)
        .await?;

    Ok(())
}
