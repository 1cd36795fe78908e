//! Database-backed job repository with an atomic claim.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{DataError, Result};
use crate::job::{Job, JobStatus, JobUpdate, NewJob};

const SELECT_COLUMNS: &str = "id, status, created_at, updated_at, attempts, progress, \
     input_path, original_filename, target_lang, result_json, error";

const CLAIM_SELECT: &str = "SELECT id, status, created_at, updated_at, attempts, progress, \
     input_path, original_filename, target_lang, result_json, error \
     FROM jobs WHERE status = 'queued' ORDER BY created_at ASC, id ASC LIMIT 1";

const CLAIM_UPDATE: &str =
    "UPDATE jobs SET status = 'running', progress = 10, updated_at = ? \
     WHERE id = ? AND status = 'queued'";

const INSERT_JOB: &str = "INSERT INTO jobs \
     (id, status, created_at, updated_at, attempts, progress, input_path, \
      original_filename, target_lang, result_json, error) \
     VALUES (?, 'queued', ?, ?, 0, 0, ?, ?, ?, NULL, NULL)";

/// Optional filters for [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Restrict to a single status.
    pub status: Option<JobStatus>,
    /// Lower bound (inclusive) on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of rows returned.
    pub limit: Option<i64>,
}

/// Database-backed repository for jobs.
///
/// All claims in a process serialize through one shared handle; the claim
/// mutex plus the guarded `status = 'queued'` update give at-most-one-worker
/// semantics for every job.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
    claim_lock: Arc<Mutex<()>>,
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    attempts: i64,
    progress: i64,
    input_path: String,
    original_filename: Option<String>,
    target_lang: Option<String>,
    result_json: Option<String>,
    error: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = DataError;

    fn try_from(row: JobRow) -> Result<Self> {
        let status =
            JobStatus::from_str(&row.status).map_err(|value| DataError::UnknownStatus {
                id: row.id.clone(),
                value,
            })?;
        Ok(Self {
            id: row.id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            attempts: row.attempts,
            progress: row.progress,
            input_path: row.input_path,
            original_filename: row.original_filename,
            target_lang: row.target_lang,
            result_json: row.result_json,
            error: row.error,
        })
    }
}

impl JobStore {
    /// Open the store at `url`, creating the database file if needed and
    /// applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| DataError::database("store.connect", source))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|source| DataError::database("store.connect", source))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| DataError::Migrate { source })?;

        Ok(Self {
            pool,
            claim_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Insert a new job in state `queued`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including duplicate ids).
    pub async fn create(&self, job: &NewJob) -> Result<Job> {
        let now = Utc::now();
        sqlx::query(INSERT_JOB)
            .bind(&job.id)
            .bind(now)
            .bind(now)
            .bind(&job.input_path)
            .bind(&job.original_filename)
            .bind(&job.target_lang)
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::database("store.create", source))?;

        Ok(Job {
            id: job.id.clone(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            attempts: 0,
            progress: 0,
            input_path: job.input_path.clone(),
            original_filename: job.original_filename.clone(),
            target_lang: job.target_lang.clone(),
            result_json: None,
            error: None,
        })
    }

    /// Fetch a job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| DataError::database("store.get", source))?;
        row.map(Job::try_from).transpose()
    }

    /// List jobs ordered by `created_at` descending, applying the filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {SELECT_COLUMNS} FROM jobs"));
        let mut has_where = false;
        if let Some(status) = filter.status {
            builder.push(" WHERE status = ");
            builder.push_bind(status.as_str());
            has_where = true;
        }
        if let Some(since) = filter.since {
            builder.push(if has_where { " AND " } else { " WHERE " });
            builder.push("created_at >= ");
            builder.push_bind(since);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let rows = builder
            .build_query_as::<JobRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataError::database("store.list", source))?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Atomically claim the oldest `queued` job, transitioning it to
    /// `running` with progress 10 before any other worker can observe it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let _guard = self.claim_lock.lock().await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| DataError::database("store.claim_next", source))?;

        let Some(row) = sqlx::query_as::<_, JobRow>(CLAIM_SELECT)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|source| DataError::database("store.claim_next", source))?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        let updated = sqlx::query(CLAIM_UPDATE)
            .bind(now)
            .bind(&row.id)
            .execute(&mut *tx)
            .await
            .map_err(|source| DataError::database("store.claim_next", source))?;
        if updated.rows_affected() != 1 {
            // Lost the race to another process; treat the queue as empty.
            return Ok(None);
        }
        tx.commit()
            .await
            .map_err(|source| DataError::database("store.claim_next", source))?;

        let mut job = Job::try_from(row)?;
        job.status = JobStatus::Running;
        job.progress = 10;
        job.updated_at = now;
        Ok(Some(job))
    }

    /// Apply a partial update to a job, refreshing `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update(&self, id: &str, update: &JobUpdate) -> Result<()> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE jobs SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(status) = update.status {
            builder.push(", status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(progress) = update.progress {
            builder.push(", progress = ");
            builder.push_bind(progress);
        }
        if let Some(attempts) = update.attempts {
            builder.push(", attempts = ");
            builder.push_bind(attempts);
        }
        if let Some(error) = &update.error {
            builder.push(", error = ");
            builder.push_bind(error.clone());
        }
        if let Some(result_json) = &update.result_json {
            builder.push(", result_json = ");
            builder.push_bind(result_json.clone());
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::database("store.update", source))?;
        Ok(())
    }

    /// Delete jobs by id and remove their artifacts under `storage_root`.
    ///
    /// Symlinked artifacts whose targets resolve outside the storage root are
    /// left in place. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a row deletion or artifact removal fails.
    pub async fn delete(&self, ids: &[String], storage_root: &Path) -> Result<u64> {
        let deleted = self.delete_ids(ids).await?;
        for id in ids {
            remove_artifacts(storage_root, id)?;
        }
        Ok(deleted)
    }

    /// Delete job rows only, returning the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a deletion fails.
    pub async fn delete_ids(&self, ids: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|source| DataError::database("store.delete", source))?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    /// Ids of terminal jobs whose timestamp is older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn terminal_ids_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM jobs \
             WHERE status IN ('succeeded', 'failed') AND updated_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| DataError::database("store.terminal_ids_older_than", source))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// All job ids currently in the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn known_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataError::database("store.known_ids", source))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Job counts grouped by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|source| DataError::database("store.count_by_status", source))
    }

    /// Run `PRAGMA optimize` and `VACUUM` to compact the database, typically
    /// after a large purge.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("PRAGMA optimize")
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::database("store.vacuum", source))?;
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::database("store.vacuum", source))?;
        Ok(())
    }
}

/// Remove on-disk artifacts named `<id>` or `<id>.<ext>` directly under the
/// storage root, refusing to touch symlinks that resolve outside it.
fn remove_artifacts(storage_root: &Path, id: &str) -> Result<()> {
    let entries = match std::fs::read_dir(storage_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(DataError::ArtifactIo {
                path: storage_root.to_path_buf(),
                source,
            });
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !artifact_matches_id(name, id) {
            continue;
        }
        let path = entry.path();
        if path.is_symlink() && !symlink_stays_inside(&path, storage_root) {
            warn!(path = %path.display(), "refusing to delete symlink escaping storage root");
            continue;
        }
        std::fs::remove_file(&path).map_err(|source| DataError::ArtifactIo { path, source })?;
    }
    Ok(())
}

fn artifact_matches_id(name: &str, id: &str) -> bool {
    name == id
        || name
            .strip_prefix(id)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn symlink_stays_inside(path: &Path, root: &Path) -> bool {
    let (Ok(target), Ok(root)) = (std::fs::canonicalize(path), std::fs::canonicalize(root)) else {
        return false;
    };
    target.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, JobStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("jobs.sqlite").display());
        let store = JobStore::connect(&url).await.expect("connect store");
        (dir, store)
    }

    fn new_job(id: &str) -> NewJob {
        NewJob {
            id: id.to_string(),
            input_path: format!("storage/{id}.wav"),
            original_filename: Some("clip.wav".to_string()),
            target_lang: None,
        }
    }

    #[tokio::test]
    async fn create_get_round_trips() {
        let (_dir, store) = temp_store().await;
        let created = store.create(&new_job("node-a-1")).await.expect("create");
        assert_eq!(created.status, JobStatus::Queued);

        let fetched = store
            .get("node-a-1")
            .await
            .expect("get")
            .expect("job exists");
        assert_eq!(fetched.id, "node-a-1");
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.progress, 0);
        assert_eq!(fetched.original_filename.as_deref(), Some("clip.wav"));
        assert!(store.get("node-a-404").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn claim_takes_oldest_and_marks_running() {
        let (_dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");
        store.create(&new_job("node-a-2")).await.expect("create");

        let first = store.claim_next().await.expect("claim").expect("job");
        assert_eq!(first.id, "node-a-1");
        assert_eq!(first.status, JobStatus::Running);
        assert_eq!(first.progress, 10);

        let second = store.claim_next().await.expect("claim").expect("job");
        assert_eq!(second.id, "node-a-2");

        assert!(store.claim_next().await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn claimed_job_is_not_visible_to_other_claims() {
        let (_dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");

        let mut claimed = Vec::new();
        for _ in 0..4 {
            if let Some(job) = store.claim_next().await.expect("claim") {
                claimed.push(job.id);
            }
        }
        assert_eq!(claimed, vec!["node-a-1".to_string()]);
    }

    #[tokio::test]
    async fn update_transitions_and_refreshes_updated_at() {
        let (_dir, store) = temp_store().await;
        let created = store.create(&new_job("node-a-1")).await.expect("create");
        store.claim_next().await.expect("claim").expect("job");

        store
            .update(
                "node-a-1",
                &JobUpdate {
                    status: Some(JobStatus::Succeeded),
                    progress: Some(100),
                    result_json: Some(r#"{"language":"en"}"#.to_string()),
                    ..JobUpdate::default()
                },
            )
            .await
            .expect("update");

        let job = store.get("node-a-1").await.expect("get").expect("job");
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_json.as_deref(), Some(r#"{"language":"en"}"#));
        assert!(job.updated_at >= created.created_at);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_orders_descending() {
        let (_dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");
        store.create(&new_job("node-a-2")).await.expect("create");
        store.claim_next().await.expect("claim");

        let queued = store
            .list(&JobFilter {
                status: Some(JobStatus::Queued),
                ..JobFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, "node-a-2");

        let all = store.list(&JobFilter::default()).await.expect("list");
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);

        let limited = store
            .list(&JobFilter {
                limit: Some(1),
                ..JobFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_rows_and_artifacts() {
        let (dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");
        let artifact = dir.path().join("node-a-1.wav");
        std::fs::write(&artifact, b"riff").expect("write artifact");
        let unrelated = dir.path().join("node-a-10.wav");
        std::fs::write(&unrelated, b"riff").expect("write artifact");

        let deleted = store
            .delete(&["node-a-1".to_string()], dir.path())
            .await
            .expect("delete");
        assert_eq!(deleted, 1);
        assert!(!artifact.exists());
        assert!(unrelated.exists(), "prefix match must not span job ids");
        assert!(store.get("node-a-1").await.expect("get").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_refuses_symlinks_escaping_the_root() {
        let (dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");

        let outside = tempfile::NamedTempFile::new().expect("outside file");
        let link = dir.path().join("node-a-1.wav");
        std::os::unix::fs::symlink(outside.path(), &link).expect("symlink");

        store
            .delete(&["node-a-1".to_string()], dir.path())
            .await
            .expect("delete");
        assert!(outside.path().exists(), "symlink target must survive");
        assert!(link.exists(), "escaping symlink is left in place");
    }

    #[tokio::test]
    async fn count_by_status_groups_rows() {
        let (_dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");
        store.create(&new_job("node-a-2")).await.expect("create");
        store.claim_next().await.expect("claim");

        let counts = store.count_by_status().await.expect("counts");
        let lookup: std::collections::HashMap<_, _> = counts.into_iter().collect();
        assert_eq!(lookup.get("queued"), Some(&1));
        assert_eq!(lookup.get("running"), Some(&1));
    }

    #[tokio::test]
    async fn vacuum_runs_after_deletions() {
        let (dir, store) = temp_store().await;
        store.create(&new_job("node-a-1")).await.expect("create");
        store
            .delete(&["node-a-1".to_string()], dir.path())
            .await
            .expect("delete");
        store.vacuum().await.expect("vacuum");
        assert!(store.get("node-a-1").await.expect("get").is_none());
    }

    #[test]
    fn artifact_name_matching_is_exact_or_dotted() {
        assert!(artifact_matches_id("node-a-1", "node-a-1"));
        assert!(artifact_matches_id("node-a-1.wav", "node-a-1"));
        assert!(!artifact_matches_id("node-a-10.wav", "node-a-1"));
        assert!(!artifact_matches_id("other", "node-a-1"));
    }
}
