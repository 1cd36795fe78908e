//! Route handlers.

pub mod cluster;
pub mod jobs;
pub mod metrics;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use parlance_cluster::PeerResponse;

use crate::error::ApiError;

/// Relay a peer's response to the original caller verbatim.
pub(crate) fn relay_peer_response(peer: PeerResponse) -> Result<Response, ApiError> {
    let status =
        StatusCode::from_u16(peer.status).map_err(|_| ApiError::internal("bad peer status"))?;
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = peer.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(peer.body))
        .map_err(|_| ApiError::internal("failed to build relayed response"))
}
