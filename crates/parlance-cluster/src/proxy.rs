//! Node-to-node request relay.

use std::sync::Arc;
use std::time::Duration;

use parlance_config::ClusterConfig;
use reqwest::{Client, Method};
use tracing::warn;

use crate::error::ClusterError;
use crate::owner::parse_job_owner;

/// A peer's response, relayed verbatim to the original caller.
#[derive(Debug, Clone)]
pub struct PeerResponse {
    /// HTTP status code returned by the peer.
    pub status: u16,
    /// Content type of the peer's body, when present.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl PeerResponse {
    /// Whether the peer answered with a success status (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// HTTP client for owner-bound proxying and peer submission.
#[derive(Clone)]
pub struct ProxyClient {
    http: Client,
    config: Arc<ClusterConfig>,
}

impl ProxyClient {
    /// Build a client with the cluster request timeout applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(config: Arc<ClusterConfig>) -> Result<Self, ClusterError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.internal_request_timeout_seconds))
            .build()
            .map_err(|source| ClusterError::ClientBuild { source })?;
        Ok(Self { http, config })
    }

    /// The underlying HTTP client, shared with the health and aggregation
    /// loops so the process keeps one connection pool.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    /// Forward a job-scoped request to the id's owner node, appending
    /// `internal=1` so the receiver does not re-distribute.
    ///
    /// `path_suffix` is the part after `/jobs/{id}` (for example `/result`),
    /// empty for the job resource itself.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownOwner`] for unrecognized owners and
    /// [`ClusterError::Unreachable`] on connection errors or timeouts.
    pub async fn forward_to_owner(
        &self,
        job_id: &str,
        method: Method,
        path_suffix: &str,
        query: &[(String, String)],
    ) -> Result<PeerResponse, ClusterError> {
        let (owner, _) = parse_job_owner(job_id, &self.config)?;
        let Some(base_url) = self.config.node_url(&owner) else {
            return Err(ClusterError::UnknownOwner { owner });
        };

        let url = format!(
            "{}/jobs/{job_id}{path_suffix}",
            base_url.trim_end_matches('/')
        );
        let mut params: Vec<(String, String)> = query
            .iter()
            .filter(|(name, _)| name != "internal")
            .cloned()
            .collect();
        params.push(("internal".to_string(), "1".to_string()));

        let response = self
            .http
            .request(method, &url)
            .query(&params)
            .send()
            .await
            .map_err(|err| {
                warn!(owner = %owner, url = %url, error = %err, "owner proxy failed");
                ClusterError::Unreachable {
                    owner: owner.clone(),
                }
            })?;

        Self::relay(response, &owner).await
    }

    /// Submit an upload to another node with the recursion-guard flag set.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::UnknownOwner`] for unrecognized targets and
    /// [`ClusterError::Unreachable`] on connection errors or timeouts.
    pub async fn submit_job(
        &self,
        target: &str,
        filename: &str,
        bytes: Vec<u8>,
        target_lang: Option<&str>,
    ) -> Result<PeerResponse, ClusterError> {
        let Some(base_url) = self.config.node_url(target) else {
            return Err(ClusterError::UnknownOwner {
                owner: target.to_string(),
            });
        };

        let url = format!("{}/jobs", base_url.trim_end_matches('/'));
        let mut params = vec![("internal".to_string(), "1".to_string())];
        if let Some(lang) = target_lang {
            params.push(("target_lang".to_string(), lang.to_string()));
        }

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .query(&params)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                warn!(target = %target, url = %url, error = %err, "job submission proxy failed");
                ClusterError::Unreachable {
                    owner: target.to_string(),
                }
            })?;

        Self::relay(response, target).await
    }

    async fn relay(response: reqwest::Response, owner: &str) -> Result<PeerResponse, ClusterError> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| {
                warn!(owner = %owner, error = %err, "failed to read peer response body");
                ClusterError::Unreachable {
                    owner: owner.to_string(),
                }
            })?
            .to_vec();
        Ok(PeerResponse {
            status,
            content_type,
            body,
        })
    }
}
