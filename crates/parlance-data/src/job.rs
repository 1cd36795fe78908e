//! Job model and status automaton.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a job.
///
/// Valid transitions: `queued → running`, and from `running` to `succeeded`,
/// `failed`, or back to `queued` for a retry. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed by a worker.
    Queued,
    /// Claimed by exactly one worker.
    Running,
    /// Finished with a populated result.
    Succeeded,
    /// Finished after exhausting retries or on a non-retryable error.
    Failed,
}

impl JobStatus {
    /// Wire and database label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// A persisted job row.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Identifier of the form `<owner_node>-<opaque_suffix>`.
    pub id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Time of the most recent state transition (UTC).
    pub updated_at: DateTime<Utc>,
    /// Count of failed attempts so far.
    pub attempts: i64,
    /// Advisory progress, 0–100.
    pub progress: i64,
    /// Location of the persisted audio artifact.
    pub input_path: String,
    /// Client-supplied filename, kept for MIME guessing on playback.
    pub original_filename: Option<String>,
    /// Requested translation target, if any.
    pub target_lang: Option<String>,
    /// Pipeline output as an opaque JSON string; set iff `succeeded`.
    pub result_json: Option<String>,
    /// Last error message, if any.
    pub error: Option<String>,
}

/// Fields required to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Identifier of the form `<owner_node>-<opaque_suffix>`.
    pub id: String,
    /// Location of the persisted audio artifact.
    pub input_path: String,
    /// Client-supplied filename.
    pub original_filename: Option<String>,
    /// Requested translation target, if any.
    pub target_lang: Option<String>,
}

/// Partial update applied to a job row. `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// New lifecycle state.
    pub status: Option<JobStatus>,
    /// New advisory progress.
    pub progress: Option<i64>,
    /// New failed-attempt count.
    pub attempts: Option<i64>,
    /// New error message.
    pub error: Option<String>,
    /// New result payload.
    pub result_json: Option<String>,
}
