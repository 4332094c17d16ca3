use std::collections::BTreeMap;

use chrono::Utc;
use mockall::predicate::*;
use reqwest::StatusCode;

use super::*;
use crate::{
    github::{BranchCommit, BranchDescriptor, MockGithubClient},
    preview::MockPreviewService,
    storage::{ChatSession, MockAccountStorage},
    sync::MockSynchronizer,
};

const CHAT_ID: ChatId = ChatId(42);
const TOKEN: &str = "gho_token";
const PAGE_SIZE: usize = 2;

fn user() -> User {
    User {
        id: 1,
        github_id: 9,
        github_login: "octocat".to_string(),
        chat_id: Some(CHAT_ID.0),
        access_token: TOKEN.to_string(),
    }
}

fn repository(id: i64) -> Repository {
    Repository {
        id,
        user_id: 1,
        repo_id: id * 100,
        name: format!("repo-{id}"),
        full_name: format!("octocat/repo-{id}"),
        default_branch: "main".to_string(),
        private: false,
        description: None,
        pushed_at: None,
        remote_updated_at: None,
        license: None,
    }
}

fn branch(id: i64, repository_id: i64) -> Branch {
    Branch {
        id,
        repository_id,
        name: format!("branch-{id}"),
        protected: false,
        last_commit_sha: format!("sha-{id}"),
    }
}

fn code_state(branch: &Branch) -> CodeState {
    CodeState {
        id: 7,
        repository_id: branch.repository_id,
        branch_id: Some(branch.id),
        commit_sha: branch.last_commit_sha.clone(),
        is_initial: true,
        base_id: None,
        created_at: Utc::now(),
    }
}

struct Mocks {
    storage: MockAccountStorage,
    github_client: MockGithubClient,
    synchronizer: MockSynchronizer,
    preview_service: MockPreviewService,
}

impl Mocks {
    fn new() -> Self {
        Self {
            storage: MockAccountStorage::new(),
            github_client: MockGithubClient::new(),
            synchronizer: MockSynchronizer::new(),
            preview_service: MockPreviewService::new(),
        }
    }

    fn with_linked_user(mut self) -> Self {
        self.storage.expect_user_by_chat().with(eq(CHAT_ID)).returning(|_| Ok(Some(user())));
        self
    }

    fn into_service(self) -> DefaultSelectionService {
        DefaultSelectionService::new(
            Arc::new(self.storage),
            Arc::new(self.github_client),
            Arc::new(self.synchronizer),
            Arc::new(self.preview_service),
            PAGE_SIZE,
        )
    }
}

#[tokio::test]
async fn test_linked_user_requires_token() {
    let mut mocks = Mocks::new();
    mocks
        .storage
        .expect_user_by_chat()
        .returning(|_| Ok(Some(User { access_token: String::new(), ..user() })));

    let result = mocks.into_service().linked_user(CHAT_ID).await;

    assert!(matches!(result, Err(SelectionError::NotLinked)));
}

#[tokio::test]
async fn test_linked_user_unknown_chat() {
    let mut mocks = Mocks::new();
    mocks.storage.expect_user_by_chat().returning(|_| Ok(None));

    let result = mocks.into_service().linked_user(CHAT_ID).await;

    assert!(matches!(result, Err(SelectionError::NotLinked)));
}

#[tokio::test]
async fn test_list_repositories_paginates() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks
        .storage
        .expect_repositories_for_user()
        .returning(|_| Ok((1..=5).map(repository).collect()));

    let page = mocks.into_service().list_repositories(CHAT_ID, 2).await.unwrap();

    assert_eq!(page.total_pages, 3);
    let ids: Vec<_> = page.get_page_items().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 4]);
}

#[tokio::test]
async fn test_select_repository_refreshes_branches() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_repository().with(eq(3_i64)).returning(|id| Ok(Some(repository(id))));
    mocks
        .github_client
        .expect_fetch_branches()
        .with(eq(TOKEN), eq("octocat/repo-3"))
        .times(1)
        .returning(|_, _| {
            Ok(vec![BranchDescriptor {
                name: "main".to_string(),
                protected: true,
                commit: BranchCommit { sha: "abc".to_string() },
            }])
        });
    mocks
        .storage
        .expect_replace_branches()
        .withf(|repo, branches| repo.id == 3 && branches.len() == 1)
        .times(1)
        .returning(|repo, _| Ok(vec![branch(30, repo.id)]));
    mocks
        .github_client
        .expect_fetch_topics()
        .with(eq(TOKEN), eq("octocat/repo-3"))
        .times(1)
        .returning(|_, _| Ok(vec!["web".to_string()]));
    mocks
        .storage
        .expect_replace_topics()
        .withf(|repo, topics| repo.id == 3 && topics == ["web".to_string()])
        .times(1)
        .returning(|_, topics| Ok(topics.to_vec()));
    mocks
        .storage
        .expect_set_selected_repository()
        .with(eq(CHAT_ID), eq(repository(3)))
        .times(1)
        .returning(|_, _| Ok(()));

    let (repo, branches) = mocks.into_service().select_repository(CHAT_ID, 3).await.unwrap();

    assert_eq!(repo.id, 3);
    assert_eq!(branches, vec![branch(30, 3)]);
}

#[tokio::test]
async fn test_select_repository_topic_fetch_failure_is_tolerated() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.github_client.expect_fetch_branches().returning(|_, _| Ok(vec![]));
    mocks.storage.expect_replace_branches().returning(|_, _| Ok(vec![]));
    mocks.github_client.expect_fetch_topics().returning(|_, _| Err(GithubError::RateLimited));
    mocks.storage.expect_replace_topics().never();
    mocks.storage.expect_set_selected_repository().times(1).returning(|_, _| Ok(()));

    let (repo, branches) = mocks.into_service().select_repository(CHAT_ID, 3).await.unwrap();

    assert_eq!(repo.id, 3);
    assert!(branches.is_empty());
}

#[tokio::test]
async fn test_select_repository_of_another_user() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks
        .storage
        .expect_repository()
        .returning(|id| Ok(Some(Repository { user_id: 99, ..repository(id) })));
    mocks.github_client.expect_fetch_branches().never();
    mocks.storage.expect_set_selected_repository().never();

    let result = mocks.into_service().select_repository(CHAT_ID, 3).await;

    assert!(matches!(result, Err(SelectionError::RepositoryNotFound(3))));
}

#[tokio::test]
async fn test_select_repository_branch_fetch_fails() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.github_client.expect_fetch_branches().returning(|_, _| {
        Err(GithubError::Upstream { status: StatusCode::NOT_FOUND, url: "url".to_string() })
    });
    mocks.storage.expect_replace_branches().never();
    mocks.storage.expect_set_selected_repository().never();

    let result = mocks.into_service().select_repository(CHAT_ID, 3).await;

    assert!(matches!(result, Err(SelectionError::Github(_))));
}

#[tokio::test]
async fn test_select_branch_synchronizes_then_updates_session() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_branch().with(eq(30_i64)).returning(|id| Ok(Some(branch(id, 3))));
    mocks.storage.expect_repository().with(eq(3_i64)).returning(|id| Ok(Some(repository(id))));
    mocks
        .synchronizer
        .expect_synchronize()
        .with(eq(user()), eq(repository(3)), eq(branch(30, 3)), eq("sha-30"), eq(TOKEN))
        .times(1)
        .returning(|_, _, branch, _, _| Ok(code_state(branch)));
    mocks
        .storage
        .expect_set_current_branch()
        .with(eq(CHAT_ID), eq(branch(30, 3)))
        .times(1)
        .returning(|_, _| Ok(()));

    let synced = mocks.into_service().select_branch(CHAT_ID, 30).await.unwrap();

    assert_eq!(synced.branch.id, 30);
    assert_eq!(synced.code_state.commit_sha, "sha-30");
}

#[tokio::test]
async fn test_select_branch_failed_sync_keeps_session() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_branch().returning(|id| Ok(Some(branch(id, 3))));
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks
        .synchronizer
        .expect_synchronize()
        .returning(|_, _, _, _, _| Err(SyncError::Github(GithubError::RateLimited)));
    mocks.storage.expect_set_current_branch().never();

    let result = mocks.into_service().select_branch(CHAT_ID, 30).await;

    assert!(matches!(result, Err(SelectionError::Sync(SyncError::Github(_)))));
}

#[tokio::test]
async fn test_select_unknown_branch() {
    let mut mocks = Mocks::new().with_linked_user();
    mocks.storage.expect_branch().returning(|_| Ok(None));
    mocks.synchronizer.expect_synchronize().never();

    let result = mocks.into_service().select_branch(CHAT_ID, 30).await;

    assert!(matches!(result, Err(SelectionError::BranchNotFound(30))));
}

#[tokio::test]
async fn test_current_selection() {
    let mut mocks = Mocks::new();
    mocks.storage.expect_session().returning(|chat_id| {
        Ok(ChatSession { chat_id: chat_id.0, repository_id: Some(3), branch_id: None })
    });
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.storage.expect_branch().never();

    let selection = mocks.into_service().current_selection(CHAT_ID).await.unwrap();

    assert_eq!(selection, Selection { repository: Some(repository(3)), branch: None });
}

#[tokio::test]
async fn test_preview_requires_branch() {
    let mut mocks = Mocks::new();
    mocks.storage.expect_session().returning(|chat_id| {
        Ok(ChatSession { chat_id: chat_id.0, repository_id: Some(3), branch_id: None })
    });
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.preview_service.expect_materialize().never();

    let result = mocks.into_service().preview(CHAT_ID).await;

    assert!(matches!(result, Err(SelectionError::NoBranchSelected)));
}

#[tokio::test]
async fn test_preview() {
    let mut mocks = Mocks::new();
    mocks.storage.expect_session().returning(|chat_id| {
        Ok(ChatSession { chat_id: chat_id.0, repository_id: Some(3), branch_id: Some(30) })
    });
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.storage.expect_branch().returning(|id| Ok(Some(branch(id, 3))));
    mocks
        .preview_service
        .expect_materialize()
        .with(eq(repository(3)), eq(branch(30, 3)))
        .returning(|repo, branch| {
            Ok(Some(PreviewBundle {
                repo_id: repo.repo_id,
                commit_sha: branch.last_commit_sha.clone(),
                files: BTreeMap::new(),
            }))
        });

    let bundle = mocks.into_service().preview(CHAT_ID).await.unwrap();

    assert_eq!(bundle.repo_id, 300);
    assert_eq!(bundle.commit_sha, "sha-30");
}

#[tokio::test]
async fn test_preview_not_synchronized() {
    let mut mocks = Mocks::new();
    mocks.storage.expect_session().returning(|chat_id| {
        Ok(ChatSession { chat_id: chat_id.0, repository_id: Some(3), branch_id: Some(30) })
    });
    mocks.storage.expect_repository().returning(|id| Ok(Some(repository(id))));
    mocks.storage.expect_branch().returning(|id| Ok(Some(branch(id, 3))));
    mocks.preview_service.expect_materialize().returning(|_, _| Ok(None));

    let result = mocks.into_service().preview(CHAT_ID).await;

    assert!(matches!(result, Err(SelectionError::NotSynchronized)));
}
