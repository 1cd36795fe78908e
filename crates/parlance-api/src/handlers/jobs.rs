//! Upload ingress and job endpoints.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Json, body::Body};
use parlance_cluster::{ClusterError, is_local};
use parlance_data::{JobFilter, JobStatus, NewJob};
use parlance_gate::GateError;
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dto::{
    DeleteJobsRequest, DeleteJobsResponse, EnqueueResponse, JobListResponse, JobStatusResponse,
    SubmitByUrl,
};
use crate::error::ApiError;
use crate::handlers::relay_peer_response;
use crate::state::ApiState;

/// `POST /jobs` — multipart upload, round-robin distributed unless the
/// recursion guard (`internal=1`) is present.
pub async fn submit_job(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let target_lang = validated_target_lang(&state, &query)?;

    let mut filename = None;
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("malformed multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(ToString::to_string);
            data = Some(field.bytes().await.map_err(|err| {
                ApiError::bad_request(format!("failed to read upload body: {err}"))
            })?);
            break;
        }
    }
    let Some(data) = data else {
        return Err(ApiError::bad_request("missing multipart field 'file'"));
    };
    let filename = filename.unwrap_or_default();

    validate_upload(&state, &filename, data.len() as u64)?;

    dispatch_upload(
        &state,
        &filename,
        data.to_vec(),
        target_lang,
        is_internal(&query),
    )
    .await
}

/// `POST /jobs/by-url` — fetch the audio, then behave like `POST /jobs`.
pub async fn submit_by_url(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<SubmitByUrl>,
) -> Result<Response, ApiError> {
    let target_lang = validated_target_lang(&state, &query)?;

    let response = state
        .proxy
        .http()
        .get(&body.url)
        .send()
        .await
        .map_err(|err| ApiError::bad_request(format!("failed to fetch url: {err}")))?;
    if !response.status().is_success() {
        return Err(ApiError::bad_request(format!(
            "failed to fetch url: upstream returned {}",
            response.status()
        )));
    }
    let data = response
        .bytes()
        .await
        .map_err(|err| ApiError::bad_request(format!("failed to fetch url: {err}")))?;

    let filename = filename_from_url(&body.url);
    validate_upload(&state, &filename, data.len() as u64)?;

    dispatch_upload(
        &state,
        &filename,
        data.to_vec(),
        target_lang,
        is_internal(&query),
    )
    .await
}

/// `GET /jobs` — node-local job list.
pub async fn list_jobs(State(state): State<Arc<ApiState>>) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.store.list(&JobFilter::default()).await?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(JobStatusResponse::from).collect(),
    }))
}

/// `GET /admin/jobs` — node-local list with `status` / `since` filters.
pub async fn admin_jobs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<JobListResponse>, ApiError> {
    let status = query
        .get("status")
        .map(|raw| {
            raw.parse::<JobStatus>()
                .map_err(|value| ApiError::bad_request(format!("unknown status {value:?}")))
        })
        .transpose()?;
    let since = query
        .get("since")
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|parsed| parsed.with_timezone(&chrono::Utc))
                .map_err(|err| ApiError::bad_request(format!("invalid since timestamp: {err}")))
        })
        .transpose()?;

    let jobs = state
        .store
        .list(&JobFilter {
            status,
            since,
            limit: None,
        })
        .await?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(JobStatusResponse::from).collect(),
    }))
}

/// `GET /jobs/{id}` — status, proxied to the owner for non-local ids.
pub async fn get_job(
    State(state): State<Arc<ApiState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if let Some(response) = maybe_proxy(&state, &id, Method::GET, "", &query).await? {
        return Ok(response);
    }
    let job = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id:?} not found")))?;
    Ok(Json(JobStatusResponse::from(&job)).into_response())
}

/// `GET /jobs/{id}/result` — 409 until the job has succeeded.
pub async fn get_result(
    State(state): State<Arc<ApiState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if let Some(response) = maybe_proxy(&state, &id, Method::GET, "/result", &query).await? {
        return Ok(response);
    }
    let job = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id:?} not found")))?;
    if job.status != JobStatus::Succeeded {
        return Err(ApiError::conflict(format!(
            "job {id:?} is {}; result not available",
            job.status
        )));
    }

    let mut result: serde_json::Value = job
        .result_json
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or_else(|| ApiError::internal("succeeded job carries unparseable result"))?;
    result["job_id"] = json!(job.id);
    if let Some(original) = &job.original_filename {
        result["original_filename"] = json!(original);
    }
    Ok(Json(result).into_response())
}

/// `GET /jobs/{id}/audio` — serve the stored artifact inline.
pub async fn get_audio(
    State(state): State<Arc<ApiState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if let Some(response) = maybe_proxy(&state, &id, Method::GET, "/audio", &query).await? {
        return Ok(response);
    }
    let job = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {id:?} not found")))?;

    let path = Path::new(&job.input_path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ApiError::not_found(format!("audio artifact for {id:?} is missing")))?;

    let mime = job
        .original_filename
        .as_deref()
        .map_or("application/octet-stream", audio_mime_for);
    Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_DISPOSITION, "inline")
        .body(Body::from(bytes))
        .map_err(|_| ApiError::internal("failed to build audio response"))
}

/// `DELETE /jobs/{id}` — remove one job, proxied to the owner when remote.
pub async fn delete_job(
    State(state): State<Arc<ApiState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if let Some(response) = maybe_proxy(&state, &id, Method::DELETE, "", &query).await? {
        return Ok(response);
    }
    if state.store.get(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("job {id:?} not found")));
    }
    let deleted = state
        .store
        .delete(&[id], &state.settings.storage_dir)
        .await?;
    Ok(Json(DeleteJobsResponse {
        status: "ok",
        deleted_count: deleted,
    })
    .into_response())
}

/// `DELETE /jobs` — bulk removal of rows and artifacts.
pub async fn delete_jobs(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<DeleteJobsRequest>,
) -> Result<Json<DeleteJobsResponse>, ApiError> {
    let deleted = state
        .store
        .delete(&request.job_ids, &state.settings.storage_dir)
        .await?;
    Ok(Json(DeleteJobsResponse {
        status: "ok",
        deleted_count: deleted,
    }))
}

/// Forward a job-scoped request when the id belongs to another node.
async fn maybe_proxy(
    state: &ApiState,
    id: &str,
    method: Method,
    suffix: &str,
    query: &HashMap<String, String>,
) -> Result<Option<Response>, ApiError> {
    if is_local(id, &state.cluster) {
        return Ok(None);
    }
    let pairs: Vec<(String, String)> = query
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let peer = state
        .proxy
        .forward_to_owner(id, method, suffix, &pairs)
        .await?;
    relay_peer_response(peer).map(Some)
}

fn is_internal(query: &HashMap<String, String>) -> bool {
    query.get("internal").map(String::as_str) == Some("1")
}

fn validated_target_lang(
    state: &ApiState,
    query: &HashMap<String, String>,
) -> Result<Option<String>, ApiError> {
    match query.get("target_lang") {
        None => Ok(None),
        Some(raw) => {
            let lang = raw.trim().to_ascii_lowercase();
            if state.settings.allowed_langs.contains(&lang) {
                Ok(Some(lang))
            } else {
                Err(ApiError::bad_request(format!(
                    "unsupported language {raw:?}"
                )))
            }
        }
    }
}

fn validate_upload(state: &ApiState, filename: &str, size: u64) -> Result<(), ApiError> {
    if size > state.settings.max_upload_bytes() {
        return Err(ApiError::payload_too_large(format!(
            "file too large: {size} bytes (limit {})",
            state.settings.max_upload_bytes()
        )));
    }
    let ext = extension_of(filename);
    if !state.settings.extension_allowed(&ext) {
        return Err(ApiError::bad_request(format!(
            "unsupported extension {ext:?}"
        )));
    }
    Ok(())
}

/// Route an upload: honor the recursion guard, walk the round-robin targets,
/// and fall back to local creation when every peer refuses.
async fn dispatch_upload(
    state: &ApiState,
    filename: &str,
    data: Vec<u8>,
    target_lang: Option<String>,
    internal: bool,
) -> Result<Response, ApiError> {
    if internal || !state.cluster.enable_round_robin {
        let response = create_local(state, filename, &data, target_lang).await?;
        return Ok(Json(response).into_response());
    }

    let attempts = state.cluster.nodes.len().max(1);
    for _ in 0..attempts {
        let target = state.scheduler.next_target().await;
        if state.cluster.is_self(&target) {
            let response = create_local(state, filename, &data, target_lang).await?;
            state
                .metrics
                .inc_jobs_submitted(state.self_name(), &target);
            return Ok(Json(response).into_response());
        }

        match state
            .proxy
            .submit_job(&target, filename, data.clone(), target_lang.as_deref())
            .await
        {
            Ok(peer) if peer.is_success() => {
                state
                    .metrics
                    .inc_jobs_submitted(state.self_name(), &target);
                return relay_peer_response(peer);
            }
            Ok(peer) if peer.status == 503 => {
                warn!(target = %target, "target refused with 503; trying next node");
            }
            Ok(peer) => return relay_peer_response(peer),
            Err(ClusterError::Unreachable { owner } | ClusterError::UnknownOwner { owner }) => {
                state.health.record_probe(&owner, false);
                warn!(target = %owner, "target unreachable; trying next node");
            }
            Err(other) => return Err(other.into()),
        }
    }

    // Every dispatch attempt failed; keep the upload by owning it locally.
    let response = create_local(state, filename, &data, target_lang).await?;
    state
        .metrics
        .inc_jobs_submitted(state.self_name(), state.self_name());
    Ok(Json(response).into_response())
}

/// Persist the upload and create the local job row.
async fn create_local(
    state: &ApiState,
    filename: &str,
    data: &[u8],
    target_lang: Option<String>,
) -> Result<EnqueueResponse, ApiError> {
    let id = format!("{}-{}", state.self_name(), Uuid::new_v4());
    let suffix = stored_suffix(state, filename);
    let stored_path = state.settings.storage_dir.join(format!("{id}{suffix}"));

    tokio::fs::write(&stored_path, data)
        .await
        .map_err(|err| ApiError::internal(format!("failed to persist upload: {err}")))?;

    if state.settings.enfr_strict_reject
        && let Err(err) = strict_validate(state, &stored_path).await
    {
        let _ = tokio::fs::remove_file(&stored_path).await;
        return Err(err);
    }

    let job = state
        .store
        .create(&NewJob {
            id: id.clone(),
            input_path: stored_path.to_string_lossy().into_owned(),
            original_filename: (!filename.is_empty()).then(|| filename.to_string()),
            target_lang,
        })
        .await?;
    state.metrics.inc_jobs_owned(state.self_name());
    info!(job_id = %job.id, "job created locally");

    Ok(EnqueueResponse {
        job_id: job.id,
        status: "queued",
    })
}

async fn strict_validate(state: &ApiState, path: &Path) -> Result<(), ApiError> {
    let audio = state.decoder.decode(path).await.map_err(|err| match err {
        parlance_asr::DecodeError::InvalidAudio { .. } => ApiError::bad_request(err.to_string()),
        other => ApiError::internal(other.to_string()),
    })?;
    state.gate.validate_strict(&audio).await.map_err(|err| match err {
        GateError::StrictReject { detail } => ApiError::bad_request(detail),
        GateError::Asr(asr) => ApiError::internal(asr.to_string()),
    })
}

/// Suffix for the stored artifact: the original filename's extension when it
/// is on the allow-list, empty otherwise.
fn stored_suffix(state: &ApiState, filename: &str) -> String {
    let ext = extension_of(filename);
    if state.settings.extension_allowed(&ext) {
        ext
    } else {
        String::new()
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn filename_from_url(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        "download".to_string()
    } else {
        name.to_string()
    }
}

fn audio_mime_for(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        ".wav" | ".wave" => "audio/wav",
        ".mp3" => "audio/mpeg",
        ".m4a" => "audio/mp4",
        ".aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}
