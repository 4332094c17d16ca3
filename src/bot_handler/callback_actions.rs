use serde::{Deserialize, Serialize};

/// Payload of an inline keyboard button. Serialized as JSON into the
/// callback data, which Telegram caps at 64 bytes, so actions carry ids
/// rather than names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallbackAction {
    /// Same as `/help`.
    CmdHelp,
    /// Same as `/menu`.
    CmdMenu,
    /// Same as `/select_repo`.
    CmdSelectRepo,
    /// Same as `/current_repo`.
    CmdCurrentRepo,
    /// Same as `/preview`.
    CmdPreview,
    /// Show another page of the repository list.
    ReposPage(usize),
    /// Local repository id.
    SelectRepo(i64),
    /// Local branch id.
    SelectBranch(i64),
}
