use chrono::Utc;
use mockall::predicate::*;

use super::*;
use crate::storage::MockSnapshotStore;

fn repository() -> Repository {
    Repository {
        id: 1,
        user_id: 1,
        repo_id: 555,
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

fn branch() -> Branch {
    Branch {
        id: 1,
        repository_id: 1,
        name: "main".to_string(),
        protected: false,
        last_commit_sha: "c3".to_string(),
    }
}

fn state(id: i64, commit_sha: &str, is_initial: bool) -> CodeState {
    CodeState {
        id,
        repository_id: 1,
        branch_id: Some(1),
        commit_sha: commit_sha.to_string(),
        is_initial,
        base_id: None,
        created_at: Utc::now(),
    }
}

fn diff_state(id: i64, commit_sha: &str, base_id: i64) -> CodeState {
    CodeState { base_id: Some(base_id), ..state(id, commit_sha, false) }
}

fn by_id(states: &[CodeState]) -> HashMap<i64, CodeState> {
    states.iter().map(|state| (state.id, state.clone())).collect()
}

fn ids(chain: &[CodeState]) -> Vec<i64> {
    chain.iter().map(|state| state.id).collect()
}

fn file(code_state_id: i64, path: &str, content: Option<&str>, change_type: ChangeType) -> RepositoryFile {
    RepositoryFile {
        id: 0,
        code_state_id,
        path: path.to_string(),
        file_type: FileType::from_path(path),
        content: content.map(str::to_string),
        is_binary: false,
        change_type,
        size_bytes: content.map_or(0, |c| c.len() as i64),
    }
}

fn contents(files: &BTreeMap<String, PreviewFile>) -> Vec<(&str, Option<&str>)> {
    files.values().map(|f| (f.path.as_str(), f.content.as_deref())).collect()
}

#[test]
fn test_fold_applies_diffs_in_order() {
    let chain = vec![
        (
            state(1, "c1", true),
            vec![
                file(1, "index.html", Some("v1"), ChangeType::Added),
                file(1, "old.css", Some("a"), ChangeType::Added),
            ],
        ),
        (
            state(2, "c2", false),
            vec![
                file(2, "index.html", Some("v2"), ChangeType::Modified),
                file(2, "old.css", None, ChangeType::Removed),
                file(2, "app.js", Some("js"), ChangeType::Added),
            ],
        ),
        (state(3, "c3", false), vec![file(3, "index.html", Some("v3"), ChangeType::Modified)]),
    ];

    let files = fold_snapshots(chain);

    assert_eq!(contents(&files), vec![("app.js", Some("js")), ("index.html", Some("v3"))]);
}

#[test]
fn test_fold_starts_at_latest_initial_snapshot() {
    let chain = vec![
        (state(1, "c1", true), vec![file(1, "stale.txt", Some("x"), ChangeType::Added)]),
        (state(2, "c2", true), vec![file(2, "fresh.txt", Some("y"), ChangeType::Added)]),
    ];

    let files = fold_snapshots(chain);

    assert_eq!(contents(&files), vec![("fresh.txt", Some("y"))]);
}

#[test]
fn test_binary_files_have_no_content() {
    let mut logo = file(1, "logo.png", Some("garbage"), ChangeType::Added);
    logo.is_binary = true;

    let files = fold_snapshots(vec![(state(1, "c1", true), vec![logo])]);

    let logo = &files["logo.png"];
    assert!(logo.is_binary);
    assert_eq!(logo.content, None);
}

#[test]
fn test_preview_url_and_entry_point() {
    let mut files = BTreeMap::new();
    for path in ["about.html", "docs/index.html"] {
        files.insert(path.to_string(), PreviewFile::from(file(1, path, Some(""), ChangeType::Added)));
    }
    let bundle = PreviewBundle { repo_id: 555, commit_sha: "abc".to_string(), files };

    assert_eq!(bundle.preview_url("http://localhost:8000/"), "http://localhost:8000/preview/555/abc");
    assert_eq!(bundle.entry_point(), Some("about.html"));
}

#[test]
fn test_lineage_follows_bases_not_creation_order() {
    // c1 <- c2 <- c3, then the branch went back to c2 and moved on to c4.
    let states = [
        state(1, "c1", true),
        diff_state(2, "c2", 1),
        diff_state(3, "c3", 2),
        diff_state(4, "c4", 2),
    ];

    assert_eq!(ids(&lineage(states[3].clone(), &by_id(&states))), vec![1, 2, 4]);
    assert_eq!(ids(&lineage(states[1].clone(), &by_id(&states))), vec![1, 2]);
    assert_eq!(ids(&lineage(states[0].clone(), &by_id(&states))), vec![1]);
}

#[test]
fn test_lineage_stops_at_full_snapshot() {
    let states = [state(1, "c1", true), diff_state(2, "c2", 1), state(3, "c3", true)];

    assert_eq!(ids(&lineage(states[2].clone(), &by_id(&states))), vec![3]);
}

#[test]
fn test_lineage_with_missing_base() {
    let states = [diff_state(5, "c5", 4)];

    assert_eq!(ids(&lineage(states[0].clone(), &by_id(&states))), vec![5]);
}

#[tokio::test]
async fn test_materialize_without_snapshots() {
    let mut mock_store = MockSnapshotStore::new();
    mock_store.expect_latest_code_state().times(1).returning(|_, _| Ok(None));
    mock_store.expect_code_states().never();
    mock_store.expect_files().never();

    let service = DefaultPreviewService::new(Arc::new(mock_store));
    let bundle = service.materialize(&repository(), &branch()).await.unwrap();

    assert!(bundle.is_none());
}

#[tokio::test]
async fn test_materialize_reads_chain_from_initial_snapshot() {
    let mut mock_store = MockSnapshotStore::new();
    mock_store
        .expect_latest_code_state()
        .with(eq(repository()), eq(branch()))
        .returning(|_, _| Ok(Some(diff_state(3, "c3", 2))));
    mock_store.expect_code_states().with(eq(repository()), eq(branch())).returning(|_, _| {
        Ok(vec![state(1, "c1", true), state(2, "c2", true), diff_state(3, "c3", 2)])
    });
    // The first snapshot is superseded by the second full one and never read.
    mock_store.expect_files().times(2).returning(|state| {
        Ok(match state.id {
            2 => vec![file(2, "index.html", Some("<h1>2</h1>"), ChangeType::Added)],
            3 => vec![file(3, "index.html", Some("<h1>3</h1>"), ChangeType::Modified)],
            id => panic!("unexpected snapshot {id}"),
        })
    });

    let service = DefaultPreviewService::new(Arc::new(mock_store));
    let bundle = service.materialize(&repository(), &branch()).await.unwrap().unwrap();

    assert_eq!(bundle.commit_sha, "c3");
    assert_eq!(bundle.repo_id, 555);
    assert_eq!(contents(&bundle.files), vec![("index.html", Some("<h1>3</h1>"))]);
    assert_eq!(bundle.text_file_count(), 1);
}

#[tokio::test]
async fn test_materialize_at_earlier_head() {
    let mut mock_store = MockSnapshotStore::new();
    // The branch moved from c1 to c2 and back to c1.
    mock_store.expect_latest_code_state().returning(|_, _| Ok(Some(state(1, "c1", true))));
    mock_store
        .expect_code_states()
        .returning(|_, _| Ok(vec![state(1, "c1", true), diff_state(2, "c2", 1)]));
    mock_store.expect_files().times(1).returning(|state| {
        Ok(match state.id {
            1 => vec![file(1, "index.html", Some("one"), ChangeType::Added)],
            id => panic!("unexpected snapshot {id}"),
        })
    });

    let service = DefaultPreviewService::new(Arc::new(mock_store));
    let bundle = service.materialize(&repository(), &branch()).await.unwrap().unwrap();

    assert_eq!(bundle.commit_sha, "c1");
    assert_eq!(contents(&bundle.files), vec![("index.html", Some("one"))]);
}

#[test]
fn test_fold_rename_drops_previous_path() {
    let chain = vec![
        (state(1, "c1", true), vec![file(1, "old.html", Some("page"), ChangeType::Added)]),
        (
            diff_state(2, "c2", 1),
            vec![
                file(2, "new.html", Some("page"), ChangeType::Modified),
                file(2, "old.html", None, ChangeType::Removed),
            ],
        ),
    ];

    let files = fold_snapshots(chain);

    assert_eq!(contents(&files), vec![("new.html", Some("page"))]);
}
