//! Retention maintenance: purge old terminal jobs and sweep orphaned
//! storage artifacts.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use parlance_config::Settings;
use parlance_data::JobStore;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Arguments of the `purge` subcommand.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Keep jobs newer than this many days.
    #[arg(long, default_value_t = 30)]
    pub keep_days: i64,
    /// Delete rows in batches of this size.
    #[arg(long, default_value_t = 2000)]
    pub batch: usize,
    /// Also remove orphaned or expired files from the storage root.
    #[arg(long)]
    pub purge_files: bool,
    /// Run `PRAGMA optimize` and `VACUUM` after the purge.
    #[arg(long)]
    pub vacuum: bool,
}

/// Run the purge against the configured store and storage root.
///
/// # Errors
///
/// Returns an error if configuration loading or a store operation fails.
pub async fn run(args: &PurgeArgs) -> AppResult<()> {
    let settings =
        Settings::from_env().map_err(|err| AppError::config("settings.from_env", err))?;
    let store = JobStore::connect(&settings.db_url)
        .await
        .map_err(|err| AppError::data("store.connect", err))?;

    let (jobs_deleted, files_removed) =
        purge_once(&store, &settings.storage_dir, args).await?;

    info!(jobs_deleted, files_removed, "purge complete");
    println!("Deleted jobs: {jobs_deleted}");
    println!("Deleted files: {files_removed}");
    Ok(())
}

/// Delete terminal jobs older than the cutoff in batches, then optionally
/// sweep the storage root. Returns `(jobs_deleted, files_removed)`.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn purge_once(
    store: &JobStore,
    storage_root: &Path,
    args: &PurgeArgs,
) -> AppResult<(u64, u64)> {
    let cutoff = Utc::now() - Duration::days(args.keep_days);

    let ids = store
        .terminal_ids_older_than(cutoff)
        .await
        .map_err(|err| AppError::data("store.terminal_ids_older_than", err))?;

    let mut jobs_deleted = 0;
    for batch in ids.chunks(args.batch.max(1)) {
        jobs_deleted += store
            .delete_ids(batch)
            .await
            .map_err(|err| AppError::data("store.delete_ids", err))?;
    }

    let mut files_removed = 0;
    if args.purge_files {
        let known: HashSet<String> = store
            .known_ids()
            .await
            .map_err(|err| AppError::data("store.known_ids", err))?
            .into_iter()
            .collect();
        files_removed = sweep_storage(storage_root, &known, cutoff);
    }

    if args.vacuum {
        store
            .vacuum()
            .await
            .map_err(|err| AppError::data("store.vacuum", err))?;
    }

    Ok((jobs_deleted, files_removed))
}

/// Remove files that map to no job id or are older than the cutoff.
fn sweep_storage(storage_root: &Path, known_ids: &HashSet<String>, cutoff: DateTime<Utc>) -> u64 {
    let Ok(entries) = std::fs::read_dir(storage_root) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let job_id = name.split('.').next().unwrap_or(name);

        let expired = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map(|mtime| DateTime::<Utc>::from(mtime) < cutoff)
            .unwrap_or(true);

        if !known_ids.contains(job_id) || expired {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove file"),
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_data::{JobStatus, JobUpdate, NewJob};
    use parlance_test_support::temp_job_store;

    async fn seed_job(store: &JobStore, id: &str, status: JobStatus) {
        store
            .create(&NewJob {
                id: id.to_string(),
                input_path: format!("storage/{id}.wav"),
                original_filename: None,
                target_lang: None,
            })
            .await
            .expect("create");
        if status != JobStatus::Queued {
            store
                .update(
                    id,
                    &JobUpdate {
                        status: Some(status),
                        ..JobUpdate::default()
                    },
                )
                .await
                .expect("update");
        }
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_jobs() {
        let (dir, store) = temp_job_store().await;
        seed_job(&store, "node-a-done", JobStatus::Succeeded).await;
        seed_job(&store, "node-a-dead", JobStatus::Failed).await;
        seed_job(&store, "node-a-waiting", JobStatus::Queued).await;

        // Give the terminal rows a moment to age past the zero-day cutoff.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let args = PurgeArgs {
            keep_days: 0,
            batch: 1,
            purge_files: false,
            vacuum: false,
        };
        let (jobs_deleted, files_removed) = purge_once(&store, dir.path(), &args)
            .await
            .expect("purge");
        assert_eq!(jobs_deleted, 2);
        assert_eq!(files_removed, 0);

        assert!(store.get("node-a-done").await.expect("get").is_none());
        assert!(store.get("node-a-waiting").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn vacuum_flag_compacts_after_the_purge() {
        let (dir, store) = temp_job_store().await;
        seed_job(&store, "node-a-done", JobStatus::Succeeded).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let args = PurgeArgs {
            keep_days: 0,
            batch: 100,
            purge_files: false,
            vacuum: true,
        };
        let (jobs_deleted, _) = purge_once(&store, dir.path(), &args).await.expect("purge");
        assert_eq!(jobs_deleted, 1);
        assert!(store.get("node-a-done").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn file_sweep_removes_orphans_and_keeps_live_artifacts() {
        let (dir, store) = temp_job_store().await;
        seed_job(&store, "node-a-live", JobStatus::Queued).await;

        let storage = dir.path().join("media");
        std::fs::create_dir(&storage).expect("storage dir");
        std::fs::write(storage.join("node-a-live.wav"), b"riff").expect("live artifact");
        std::fs::write(storage.join("node-a-orphan.wav"), b"riff").expect("orphan artifact");

        let args = PurgeArgs {
            keep_days: 30,
            batch: 100,
            purge_files: true,
            vacuum: false,
        };
        let (_, files_removed) = purge_once(&store, &storage, &args).await.expect("purge");

        assert_eq!(files_removed, 1);
        assert!(storage.join("node-a-live.wav").exists());
        assert!(!storage.join("node-a-orphan.wav").exists());
    }
}
