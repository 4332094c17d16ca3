use crate::bot_handler::{BotHandlerResult, Context};

pub async fn handle(ctx: Context<'_>, branch_id: i64) -> BotHandlerResult<()> {
    let chat_id = ctx.message.chat.id;
    let synced = ctx.handler.selection_service.select_branch(chat_id, branch_id).await?;

    tracing::info!(
        "Chat {chat_id} switched to {}@{} ({})",
        synced.repository,
        synced.branch.name,
        synced.code_state.short_sha()
    );

    ctx.handler
        .messaging_service
        .edit_branch_selected_msg(chat_id, ctx.message.id, &synced)
        .await?;

    Ok(())
}
