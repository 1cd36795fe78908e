#![forbid(unsafe_code)]

//! HTTP surface for the Parlance service: upload ingress with round-robin
//! distribution, job status and results, cluster views, and metrics.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::ApiServer;
pub use state::ApiState;
