use teloxide::utils::html;

use crate::{
    bot_handler::CallbackAction,
    preview::PreviewBundle,
    selection::Selection,
    storage::Branch,
};

/// Serializes a `CallbackAction` to a JSON string. Used for keyboard buttons.
/// expect is ok because inputs are simple and controlled.
pub fn serialize_action(action: &CallbackAction) -> String {
    serde_json::to_string(action).expect("Failed to serialize action")
}

/// Button label of a branch, marking protected ones.
pub fn branch_label(branch: &Branch) -> String {
    if branch.protected { format!("🛡 {}", branch.name) } else { branch.name.clone() }
}

pub fn format_selection(selection: &Selection) -> String {
    match (&selection.repository, &selection.branch) {
        (None, _) => "📍 No repository selected. Use /select_repo to pick one.".to_string(),
        (Some(repo), None) => format!(
            "📍 Repository: <b>{}</b>\nNo branch selected.",
            html::escape(&repo.full_name)
        ),
        (Some(repo), Some(branch)) => format!(
            "📍 Repository: <b>{}</b>\nBranch: <code>{}</code>\nLast commit: <code>{}</code>",
            html::escape(&repo.full_name),
            html::escape(&branch.name),
            html::escape(&branch.last_commit_sha)
        ),
    }
}

pub fn format_preview(bundle: &PreviewBundle, preview_url: &str) -> String {
    let mut text = format!(
        "👀 Preview of commit <code>{}</code>\n{} files ({} text)\n",
        html::escape(&bundle.commit_sha),
        bundle.files.len(),
        bundle.text_file_count()
    );

    match bundle.entry_point() {
        Some(entry) => text.push_str(&format!("Entry point: <code>{}</code>\n", html::escape(entry))),
        None => text.push_str("⚠️ No HTML page found in this branch.\n"),
    }

    text.push_str(&html::escape(preview_url));
    text
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        preview::PreviewFile,
        storage::{FileType, Repository},
    };

    fn repository() -> Repository {
        Repository {
            id: 1,
            user_id: 1,
            repo_id: 100,
            name: "site".to_string(),
            full_name: "octocat/site".to_string(),
            default_branch: "main".to_string(),
            private: false,
            description: None,
            pushed_at: None,
            remote_updated_at: None,
            license: None,
        }
    }

    fn branch(protected: bool) -> Branch {
        Branch {
            id: 10,
            repository_id: 1,
            name: "main".to_string(),
            protected,
            last_commit_sha: "abc123".to_string(),
        }
    }

    fn file(path: &str, is_binary: bool) -> PreviewFile {
        PreviewFile {
            path: path.to_string(),
            file_type: FileType::from_path(path),
            content: if is_binary { None } else { Some(String::new()) },
            is_binary,
        }
    }

    #[test]
    fn test_serialize_action() {
        let action = CallbackAction::CmdHelp;
        let serialized = serialize_action(&action);
        assert_eq!(serialized, r#""cmd-help""#);
    }

    #[test]
    fn test_serialize_action_with_id() {
        let serialized = serialize_action(&CallbackAction::SelectBranch(42));
        assert_eq!(serialized, r#"{"select-branch":42}"#);
    }

    #[test]
    fn test_branch_label() {
        assert_eq!(branch_label(&branch(true)), "🛡 main");
        assert_eq!(branch_label(&branch(false)), "main");
    }

    #[test]
    fn test_format_selection() {
        let empty = format_selection(&Selection::default());
        assert!(empty.contains("No repository selected"));

        let repo_only =
            format_selection(&Selection { repository: Some(repository()), branch: None });
        assert!(repo_only.contains("octocat/site"));
        assert!(repo_only.contains("No branch selected"));

        let full = format_selection(&Selection {
            repository: Some(repository()),
            branch: Some(branch(false)),
        });
        assert!(full.contains("<code>main</code>"));
        assert!(full.contains("<code>abc123</code>"));
    }

    #[test]
    fn test_format_preview() {
        let files: BTreeMap<_, _> = [file("index.html", false), file("logo.png", true)]
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect();
        let bundle = PreviewBundle { repo_id: 100, commit_sha: "abc123".to_string(), files };

        let text = format_preview(&bundle, "http://localhost:8000/preview/100/abc123");

        assert!(text.contains("2 files (1 text)"));
        assert!(text.contains("Entry point: <code>index.html</code>"));
        assert!(text.ends_with("http://localhost:8000/preview/100/abc123"));
    }

    #[test]
    fn test_format_preview_without_html() {
        let files: BTreeMap<_, _> =
            [file("style.css", false)].into_iter().map(|f| (f.path.clone(), f)).collect();
        let bundle = PreviewBundle { repo_id: 100, commit_sha: "abc123".to_string(), files };

        let text = format_preview(&bundle, "http://localhost:8000/preview/100/abc123");

        assert!(text.contains("No HTML page found"));
    }
}
