//! API error wrapper mapping the failure taxonomy onto status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parlance_cluster::ClusterError;
use parlance_data::DataError;
use serde_json::json;
use tracing::error;

/// Structured API error. Owner-routing failures carry their own wire shape;
/// everything else renders as `{"error", "detail"}`.
#[derive(Debug)]
pub enum ApiError {
    /// Generic problem with a status code and machine-readable kind.
    Problem {
        /// HTTP status to return.
        status: StatusCode,
        /// Stable error kind label.
        kind: &'static str,
        /// Human-readable detail.
        detail: String,
    },
    /// The job's owner node could not be reached (or is unknown).
    OwnerUnreachable {
        /// Owner parsed from the job id.
        owner: String,
        /// Extra context (e.g. `unknown_node`).
        detail: Option<&'static str>,
    },
}

impl ApiError {
    /// 400 with the `bad_request` kind.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::Problem {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            detail: detail.into(),
        }
    }

    /// 404 with the `not_found` kind.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::Problem {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            detail: detail.into(),
        }
    }

    /// 409 with the `conflict` kind.
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Problem {
            status: StatusCode::CONFLICT,
            kind: "conflict",
            detail: detail.into(),
        }
    }

    /// 413 with the `payload_too_large` kind.
    pub fn payload_too_large(detail: impl Into<String>) -> Self {
        Self::Problem {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            kind: "payload_too_large",
            detail: detail.into(),
        }
    }

    /// 500 with the `internal` kind.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Problem {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            detail: detail.into(),
        }
    }

    /// 503 for an unreachable owner node.
    pub fn owner_unreachable(owner: impl Into<String>) -> Self {
        Self::OwnerUnreachable {
            owner: owner.into(),
            detail: None,
        }
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        error!(error = %err, "store operation failed");
        Self::internal("store operation failed")
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Unreachable { owner } => Self::OwnerUnreachable {
                owner,
                detail: None,
            },
            ClusterError::UnknownOwner { owner } => Self::OwnerUnreachable {
                owner,
                detail: Some("unknown_node"),
            },
            ClusterError::InvalidJobId { job_id } => {
                Self::bad_request(format!("invalid job id {job_id:?}"))
            }
            ClusterError::ClientBuild { source } => {
                error!(error = %source, "cluster client construction failed");
                Self::internal("cluster client unavailable")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Problem {
                status,
                kind,
                detail,
            } => (status, Json(json!({ "error": kind, "detail": detail }))).into_response(),
            Self::OwnerUnreachable { owner, detail } => {
                let mut body = json!({ "error": "owner_node_unreachable", "owner": owner });
                if let Some(detail) = detail {
                    body["detail"] = json!(detail);
                }
                (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_errors_map_to_owner_unreachable() {
        let err: ApiError = ClusterError::Unreachable {
            owner: "node-b".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            ApiError::OwnerUnreachable { ref owner, detail: None } if owner == "node-b"
        ));

        let err: ApiError = ClusterError::UnknownOwner {
            owner: "ghost".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            ApiError::OwnerUnreachable {
                detail: Some("unknown_node"),
                ..
            }
        ));
    }
}
