use std::{collections::HashSet, str::FromStr};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    Pool, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, migrate,
    sqlite::SqliteConnectOptions,
};
use teloxide::types::ChatId;

use super::{
    AccountStorage, Branch, ChatSession, CodeState, CodeStateRow, NewCodeState, NewRepositoryFile,
    Repository, RepositoryFile, RepositoryPermissions, SnapshotStore, StorageError, StorageResult,
    User,
};
use crate::github::{BranchDescriptor, RepoDescriptor, UserProfile};

// 7 bound parameters per file row keeps each chunk well under SQLite's
// variable limit.
const FILE_INSERT_CHUNK: usize = 100;

const USER_COLUMNS: &str = "id, github_id, github_login, chat_id, access_token";
const REPOSITORY_COLUMNS: &str = "id, user_id, repo_id, name, full_name, default_branch, private, \
     description, pushed_at, remote_updated_at, license";
const BRANCH_COLUMNS: &str = "id, repository_id, name, protected, last_commit_sha";
const CODE_STATE_COLUMNS: &str =
    "id, repository_id, branch_id, commit_sha, is_initial, base_id, created_at";
const FILE_COLUMNS: &str =
    "id, code_state_id, path, file_type, content, is_binary, change_type, size_bytes";

/// Account storage and snapshot store backed by one SQLite database.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Connects to `database_url`, creating the database file if needed, and
    /// applies pending migrations.
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        tracing::debug!("Connecting to SQLite database: {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        migrate!("./migrations").run(&pool).await?;
        tracing::debug!("SQLite database migrated");

        Ok(Self { pool })
    }

    async fn next_sync_order(conn: &mut SqliteConnection) -> StorageResult<i64> {
        let order: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sync_order), 0) + 1 FROM code_states")
                .fetch_one(&mut *conn)
                .await?;
        Ok(order)
    }

    async fn set_head(conn: &mut SqliteConnection, code_state_id: i64) -> StorageResult<()> {
        let order = Self::next_sync_order(&mut *conn).await?;
        sqlx::query("UPDATE code_states SET sync_order = ? WHERE id = ?")
            .bind(order)
            .bind(code_state_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Inserts a code state unless the (repository, branch, commit) triple is
    /// already taken. Returns the stored row and whether it was created.
    async fn insert_code_state(
        conn: &mut SqliteConnection,
        code_state: &NewCodeState,
    ) -> StorageResult<(CodeState, bool)> {
        let created_at = Utc::now().timestamp_millis();
        let sync_order = Self::next_sync_order(&mut *conn).await?;

        let result = sqlx::query(
            "INSERT INTO code_states
             (repository_id, branch_id, commit_sha, is_initial, base_id, sync_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (repository_id, branch_id, commit_sha) DO NOTHING",
        )
        .bind(code_state.repository_id)
        .bind(code_state.branch_id)
        .bind(&code_state.commit_sha)
        .bind(code_state.is_initial)
        .bind(code_state.base_id)
        .bind(sync_order)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

        let row: CodeStateRow = sqlx::query_as(&format!(
            "SELECT {CODE_STATE_COLUMNS} FROM code_states
             WHERE repository_id = ? AND branch_id = ? AND commit_sha = ?"
        ))
        .bind(code_state.repository_id)
        .bind(code_state.branch_id)
        .bind(&code_state.commit_sha)
        .fetch_one(&mut *conn)
        .await?;

        Ok((row.into(), result.rows_affected() > 0))
    }

    async fn insert_files(
        conn: &mut SqliteConnection,
        code_state_id: i64,
        files: &[NewRepositoryFile],
    ) -> StorageResult<()> {
        for chunk in files.chunks(FILE_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO repository_files
                 (code_state_id, path, file_type, content, is_binary, change_type, size_bytes) ",
            );
            builder.push_values(chunk, |mut row, file| {
                row.push_bind(code_state_id)
                    .push_bind(&file.path)
                    .push_bind(file.file_type)
                    .push_bind(&file.content)
                    .push_bind(file.is_binary)
                    .push_bind(file.change_type)
                    .push_bind(file.size_bytes);
            });
            // Stored files are never rewritten; a repeated path keeps its first row.
            builder.push(" ON CONFLICT (code_state_id, path) DO NOTHING");
            builder.build().execute(&mut *conn).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl AccountStorage for SqliteStorage {
    async fn upsert_user(
        &self,
        profile: &UserProfile,
        chat_id: ChatId,
        access_token: &str,
    ) -> StorageResult<User> {
        tracing::debug!("Upserting user {} for chat {}", profile.login, chat_id);
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // A chat is bound to at most one GitHub account.
        sqlx::query("UPDATE users SET chat_id = NULL WHERE chat_id = ? AND github_id <> ?")
            .bind(chat_id.0)
            .bind(profile.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO users (github_id, github_login, chat_id, access_token, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (github_id) DO UPDATE SET
                github_login = excluded.github_login,
                chat_id = excluded.chat_id,
                access_token = excluded.access_token,
                updated_at = excluded.updated_at",
        )
        .bind(profile.id)
        .bind(&profile.login)
        .bind(chat_id.0)
        .bind(access_token)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let user: User =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE github_id = ?"))
                .bind(profile.id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn user_by_chat(&self, chat_id: ChatId) -> StorageResult<Option<User>> {
        tracing::debug!("Getting user for chat: {}", chat_id);
        let user = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?"))
            .bind(chat_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn clear_access_token(&self, chat_id: ChatId) -> StorageResult<bool> {
        tracing::debug!("Clearing access token for chat: {}", chat_id);
        let result = sqlx::query(
            "UPDATE users SET access_token = '', updated_at = ?
             WHERE chat_id = ? AND access_token <> ''",
        )
        .bind(Utc::now().timestamp())
        .bind(chat_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_repositories(
        &self,
        user: &User,
        repos: &[RepoDescriptor],
    ) -> StorageResult<Vec<Repository>> {
        tracing::debug!("Upserting {} repositories for {}", repos.len(), user.github_login);
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for repo in repos {
            sqlx::query(
                "INSERT INTO repositories
                 (user_id, repo_id, name, full_name, default_branch, private, description,
                  pushed_at, remote_updated_at, license, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, repo_id) DO UPDATE SET
                    name = excluded.name,
                    full_name = excluded.full_name,
                    default_branch = excluded.default_branch,
                    private = excluded.private,
                    description = excluded.description,
                    pushed_at = excluded.pushed_at,
                    remote_updated_at = excluded.remote_updated_at,
                    license = excluded.license,
                    updated_at = excluded.updated_at",
            )
            .bind(user.id)
            .bind(repo.id)
            .bind(&repo.name)
            .bind(&repo.full_name)
            .bind(&repo.default_branch)
            .bind(repo.private)
            .bind(&repo.description)
            .bind(&repo.pushed_at)
            .bind(&repo.updated_at)
            .bind(repo.license.as_ref().and_then(|license| license.label()))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            // Permissions GitHub left out are kept as stored.
            let Some(permissions) = repo.permissions else {
                continue;
            };
            let repository_id: i64 =
                sqlx::query_scalar("SELECT id FROM repositories WHERE user_id = ? AND repo_id = ?")
                    .bind(user.id)
                    .bind(repo.id)
                    .fetch_one(&mut *tx)
                    .await?;
            sqlx::query(
                "INSERT INTO repository_permissions
                 (repository_id, admin, maintain, push, triage, pull)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (repository_id) DO UPDATE SET
                    admin = excluded.admin,
                    maintain = excluded.maintain,
                    push = excluded.push,
                    triage = excluded.triage,
                    pull = excluded.pull",
            )
            .bind(repository_id)
            .bind(permissions.admin)
            .bind(permissions.maintain)
            .bind(permissions.push)
            .bind(permissions.triage)
            .bind(permissions.pull)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.repositories_for_user(user).await
    }

    async fn repositories_for_user(&self, user: &User) -> StorageResult<Vec<Repository>> {
        tracing::debug!("Getting repositories for user: {}", user.github_login);
        let repos = sqlx::query_as(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE user_id = ?
             ORDER BY remote_updated_at IS NULL, remote_updated_at DESC, id"
        ))
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(repos)
    }

    async fn repository(&self, id: i64) -> StorageResult<Option<Repository>> {
        let repo =
            sqlx::query_as(&format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(repo)
    }

    async fn replace_branches(
        &self,
        repository: &Repository,
        branches: &[BranchDescriptor],
    ) -> StorageResult<Vec<Branch>> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM branches WHERE repository_id = ?")
                .bind(repository.id)
                .fetch_all(&mut *tx)
                .await?;
        let existing: HashSet<String> = existing.into_iter().collect();
        let current: HashSet<&str> = branches.iter().map(|b| b.name.as_str()).collect();

        let stale: Vec<&String> =
            existing.iter().filter(|name| !current.contains(name.as_str())).collect();
        for name in &stale {
            sqlx::query("DELETE FROM branches WHERE repository_id = ? AND name = ?")
                .bind(repository.id)
                .bind(name.as_str())
                .execute(&mut *tx)
                .await?;
        }

        for branch in branches {
            sqlx::query(
                "INSERT INTO branches (repository_id, name, protected, last_commit_sha)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (repository_id, name) DO UPDATE SET
                    protected = excluded.protected,
                    last_commit_sha = excluded.last_commit_sha",
            )
            .bind(repository.id)
            .bind(&branch.name)
            .bind(branch.protected)
            .bind(branch.commit_sha())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let added = current.iter().filter(|name| !existing.contains(**name)).count();
        tracing::debug!(
            "Refreshed branches of {}: {} added, {} removed, {} total",
            repository.full_name,
            added,
            stale.len(),
            current.len()
        );

        self.branches_for_repository(repository).await
    }

    async fn replace_topics(
        &self,
        repository: &Repository,
        topics: &[String],
    ) -> StorageResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM repository_topics WHERE repository_id = ?")
                .bind(repository.id)
                .fetch_all(&mut *tx)
                .await?;
        let existing: HashSet<String> = existing.into_iter().collect();
        let current: HashSet<&str> = topics.iter().map(String::as_str).collect();

        let stale: Vec<&String> =
            existing.iter().filter(|name| !current.contains(name.as_str())).collect();
        for name in &stale {
            sqlx::query("DELETE FROM repository_topics WHERE repository_id = ? AND name = ?")
                .bind(repository.id)
                .bind(name.as_str())
                .execute(&mut *tx)
                .await?;
        }

        let added: Vec<&str> =
            current.iter().copied().filter(|name| !existing.contains(*name)).collect();
        for name in &added {
            sqlx::query("INSERT INTO repository_topics (repository_id, name) VALUES (?, ?)")
                .bind(repository.id)
                .bind(*name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            "Refreshed topics of {}: {} added, {} removed",
            repository.full_name,
            added.len(),
            stale.len()
        );

        self.topics(repository).await
    }

    async fn topics(&self, repository: &Repository) -> StorageResult<Vec<String>> {
        let topics = sqlx::query_scalar(
            "SELECT name FROM repository_topics WHERE repository_id = ? ORDER BY name",
        )
        .bind(repository.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    async fn permissions(
        &self,
        repository: &Repository,
    ) -> StorageResult<Option<RepositoryPermissions>> {
        let permissions = sqlx::query_as(
            "SELECT repository_id, admin, maintain, push, triage, pull
             FROM repository_permissions WHERE repository_id = ?",
        )
        .bind(repository.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn branches_for_repository(&self, repository: &Repository) -> StorageResult<Vec<Branch>> {
        let branches = sqlx::query_as(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE repository_id = ? ORDER BY name"
        ))
        .bind(repository.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(branches)
    }

    async fn branch(&self, id: i64) -> StorageResult<Option<Branch>> {
        let branch = sqlx::query_as(&format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(branch)
    }

    async fn session(&self, chat_id: ChatId) -> StorageResult<ChatSession> {
        let session: Option<ChatSession> = sqlx::query_as(
            "SELECT chat_id, repository_id, branch_id FROM chat_sessions WHERE chat_id = ?",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session.unwrap_or(ChatSession { chat_id: chat_id.0, ..Default::default() }))
    }

    async fn set_selected_repository(
        &self,
        chat_id: ChatId,
        repository: &Repository,
    ) -> StorageResult<()> {
        tracing::debug!("Selecting repository {} for chat {}", repository.full_name, chat_id);
        sqlx::query(
            "INSERT INTO chat_sessions (chat_id, repository_id, branch_id) VALUES (?, ?, NULL)
             ON CONFLICT (chat_id) DO UPDATE SET
                repository_id = excluded.repository_id,
                branch_id = NULL",
        )
        .bind(chat_id.0)
        .bind(repository.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_current_branch(&self, chat_id: ChatId, branch: &Branch) -> StorageResult<()> {
        tracing::debug!("Selecting branch {} for chat {}", branch.name, chat_id);
        sqlx::query(
            "INSERT INTO chat_sessions (chat_id, repository_id, branch_id) VALUES (?, ?, ?)
             ON CONFLICT (chat_id) DO UPDATE SET
                repository_id = excluded.repository_id,
                branch_id = excluded.branch_id",
        )
        .bind(chat_id.0)
        .bind(branch.repository_id)
        .bind(branch.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStorage {
    async fn latest_code_state(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> StorageResult<Option<CodeState>> {
        tracing::debug!("Getting latest code state of {}@{}", repository.full_name, branch.name);
        let row: Option<CodeStateRow> = sqlx::query_as(&format!(
            "SELECT {CODE_STATE_COLUMNS} FROM code_states
             WHERE repository_id = ? AND branch_id = ?
             ORDER BY sync_order DESC, id DESC LIMIT 1"
        ))
        .bind(repository.id)
        .bind(branch.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CodeState::from))
    }

    async fn code_state_for_commit(
        &self,
        repository: &Repository,
        branch: &Branch,
        commit_sha: &str,
    ) -> StorageResult<Option<CodeState>> {
        let row: Option<CodeStateRow> = sqlx::query_as(&format!(
            "SELECT {CODE_STATE_COLUMNS} FROM code_states
             WHERE repository_id = ? AND branch_id = ? AND commit_sha = ?"
        ))
        .bind(repository.id)
        .bind(branch.id)
        .bind(commit_sha)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CodeState::from))
    }

    async fn mark_head(&self, code_state: &CodeState) -> StorageResult<()> {
        tracing::debug!("Marking code state {} as head", code_state.id);
        let mut tx = self.pool.begin().await?;
        Self::set_head(&mut *tx, code_state.id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_code_state(&self, code_state: NewCodeState) -> StorageResult<CodeState> {
        let mut tx = self.pool.begin().await?;
        let (stored, created) = Self::insert_code_state(&mut *tx, &code_state).await?;
        tx.commit().await?;

        if !created {
            tracing::debug!("Code state for commit {} already exists", code_state.commit_sha);
        }
        Ok(stored)
    }

    async fn bulk_write_files(
        &self,
        code_state: &CodeState,
        files: Vec<NewRepositoryFile>,
    ) -> StorageResult<()> {
        tracing::debug!("Writing {} files for code state {}", files.len(), code_state.id);
        let mut tx = self.pool.begin().await?;

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM repository_files WHERE code_state_id = ?")
                .bind(code_state.id)
                .fetch_one(&mut *tx)
                .await?;
        if stored > 0 {
            return Err(StorageError::DataIntegrityError(format!(
                "code state {} already holds {stored} files",
                code_state.id
            )));
        }

        Self::insert_files(&mut *tx, code_state.id, &files).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        code_state: NewCodeState,
        files: Vec<NewRepositoryFile>,
    ) -> StorageResult<CodeState> {
        let mut tx = self.pool.begin().await?;
        let (stored, created) = Self::insert_code_state(&mut *tx, &code_state).await?;

        if !created {
            tracing::debug!(
                "Code state for commit {} already exists, discarding {} files",
                code_state.commit_sha,
                files.len()
            );
            Self::set_head(&mut *tx, stored.id).await?;
            tx.commit().await?;
            return Ok(stored);
        }

        Self::insert_files(&mut *tx, stored.id, &files).await?;
        tx.commit().await?;
        tracing::debug!("Created code state {} with {} files", stored.id, files.len());

        Ok(stored)
    }

    async fn code_states(
        &self,
        repository: &Repository,
        branch: &Branch,
    ) -> StorageResult<Vec<CodeState>> {
        let rows: Vec<CodeStateRow> = sqlx::query_as(&format!(
            "SELECT {CODE_STATE_COLUMNS} FROM code_states
             WHERE repository_id = ? AND branch_id = ?
             ORDER BY id"
        ))
        .bind(repository.id)
        .bind(branch.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CodeState::from).collect())
    }

    async fn files(&self, code_state: &CodeState) -> StorageResult<Vec<RepositoryFile>> {
        let files = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM repository_files WHERE code_state_id = ? ORDER BY path"
        ))
        .bind(code_state.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }
}
