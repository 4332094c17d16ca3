use lazy_static::lazy_static;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use super::utils;
use crate::{
    bot_handler::CallbackAction,
    pagination::Paginated,
    storage::{Branch, Repository},
};

pub fn build_repo_list_keyboard(repos: &Paginated<Repository>) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<InlineKeyboardButton>> = repos
        .get_page_items()
        .iter()
        .map(|repo| {
            let action = utils::serialize_action(&CallbackAction::SelectRepo(repo.id));
            let label = if repo.private {
                format!("🔒 {}", repo.full_name)
            } else {
                repo.full_name.clone()
            };

            vec![InlineKeyboardButton::callback(label, action)]
        })
        .collect();

    let mut nav_row = Vec::new();
    if repos.has_prev() {
        nav_row.push(InlineKeyboardButton::callback(
            "◀️ Previous",
            utils::serialize_action(&CallbackAction::ReposPage(repos.page - 1)),
        ));
    }
    if repos.has_next() {
        nav_row.push(InlineKeyboardButton::callback(
            "Next ▶️",
            utils::serialize_action(&CallbackAction::ReposPage(repos.page + 1)),
        ));
    }
    if !nav_row.is_empty() {
        buttons.push(nav_row);
    }

    buttons.push(vec![InlineKeyboardButton::callback(
        "🔙 Menu",
        utils::serialize_action(&CallbackAction::CmdMenu),
    )]);

    InlineKeyboardMarkup::new(buttons)
}

pub fn build_branch_list_keyboard(branches: &[Branch]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<InlineKeyboardButton>> = branches
        .iter()
        .map(|branch| {
            let action = utils::serialize_action(&CallbackAction::SelectBranch(branch.id));
            vec![InlineKeyboardButton::callback(utils::branch_label(branch), action)]
        })
        .collect();

    // Back to the first page of repositories
    buttons.push(vec![InlineKeyboardButton::callback(
        "🔙 Repositories",
        utils::serialize_action(&CallbackAction::ReposPage(1)),
    )]);

    InlineKeyboardMarkup::new(buttons)
}

pub fn build_branch_selected_keyboard(repository: &Repository) -> InlineKeyboardMarkup {
    let mut buttons = vec![vec![InlineKeyboardButton::callback(
        "👀 Preview",
        utils::serialize_action(&CallbackAction::CmdPreview),
    )]];

    if let Ok(url) = Url::parse(&repository.url()) {
        buttons.push(vec![InlineKeyboardButton::url("🔗 Open on GitHub", url)]);
    }

    buttons.push(vec![InlineKeyboardButton::callback(
        "🔙 Menu",
        utils::serialize_action(&CallbackAction::CmdMenu),
    )]);

    InlineKeyboardMarkup::new(buttons)
}

lazy_static! {
    pub static ref COMMAND_KEYBOARD: InlineKeyboardMarkup = InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "ℹ️ Help",
            utils::serialize_action(&CallbackAction::CmdHelp)
        ),],
        vec![InlineKeyboardButton::callback(
            "📦 Select repository",
            utils::serialize_action(&CallbackAction::CmdSelectRepo)
        ),],
        vec![InlineKeyboardButton::callback(
            "📍 Current selection",
            utils::serialize_action(&CallbackAction::CmdCurrentRepo)
        ),],
        vec![InlineKeyboardButton::callback(
            "👀 Preview",
            utils::serialize_action(&CallbackAction::CmdPreview)
        ),],
    ]);
}
