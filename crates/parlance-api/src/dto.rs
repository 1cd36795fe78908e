//! Wire shapes for the job endpoints.

use chrono::{DateTime, Utc};
use parlance_data::Job;
use serde::{Deserialize, Serialize};

/// Response to a successful job submission.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// Identifier of the created job.
    pub job_id: String,
    /// Always `queued`.
    pub status: &'static str,
}

/// Job status as returned by the read endpoints.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: String,
    /// Lifecycle state label.
    pub status: String,
    /// Advisory progress, 0–100.
    pub progress: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: i64,
    /// Client-supplied filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    /// Detected language, when the job has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Detection probability, when present in the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Last error message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        let result: Option<serde_json::Value> = job
            .result_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        let language = result
            .as_ref()
            .and_then(|value| value.get("language"))
            .and_then(|value| value.as_str())
            .map(ToString::to_string);
        let probability = result
            .as_ref()
            .and_then(|value| value.get("probability"))
            .and_then(serde_json::Value::as_f64);

        Self {
            job_id: job.id.clone(),
            status: job.status.as_str().to_string(),
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            attempts: job.attempts,
            original_filename: job.original_filename.clone(),
            language,
            probability,
            error: job.error.clone(),
        }
    }
}

/// Listing wrapper for job collections.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    /// Jobs, newest first.
    pub jobs: Vec<JobStatusResponse>,
}

/// Body of `POST /jobs/by-url`.
#[derive(Debug, Deserialize)]
pub struct SubmitByUrl {
    /// URL the audio is fetched from.
    pub url: String,
}

/// Body of `DELETE /jobs`.
#[derive(Debug, Deserialize)]
pub struct DeleteJobsRequest {
    /// Ids of the jobs to delete.
    pub job_ids: Vec<String>,
}

/// Response of the delete endpoints.
#[derive(Debug, Serialize)]
pub struct DeleteJobsResponse {
    /// Always `ok`.
    pub status: &'static str,
    /// Number of rows removed.
    pub deleted_count: u64,
}
