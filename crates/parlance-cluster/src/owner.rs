//! Job-owner parsing.
//!
//! The owner prefix of a job id is authoritative for routing. Node names may
//! themselves contain `-`, so known-node prefixes are matched longest-first;
//! splitting on the first dash is only a fallback for unrecognized prefixes.

use parlance_config::ClusterConfig;

use crate::error::ClusterError;

/// Split a job id into `(owner, bare_id)`.
///
/// # Errors
///
/// Returns [`ClusterError::InvalidJobId`] when the id has no dash at all and
/// matches no known node.
pub fn parse_job_owner<'a>(
    job_id: &'a str,
    config: &ClusterConfig,
) -> Result<(String, &'a str), ClusterError> {
    let mut names: Vec<&String> = config.nodes.keys().collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    for name in names {
        if let Some(rest) = job_id.strip_prefix(name.as_str())
            && let Some(bare) = rest.strip_prefix('-')
        {
            return Ok((name.clone(), bare));
        }
    }

    job_id
        .split_once('-')
        .map(|(owner, bare)| (owner.to_string(), bare))
        .ok_or_else(|| ClusterError::InvalidJobId {
            job_id: job_id.to_string(),
        })
}

/// Whether the job id belongs to this node.
#[must_use]
pub fn is_local(job_id: &str, config: &ClusterConfig) -> bool {
    parse_job_owner(job_id, config)
        .map(|(owner, _)| config.is_self(&owner))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(self_name: &str, names: &[&str]) -> ClusterConfig {
        let mut nodes = BTreeMap::new();
        for name in names {
            nodes.insert((*name).to_string(), format!("http://{name}:8000"));
        }
        ClusterConfig {
            self_name: self_name.to_string(),
            nodes,
            health_check_interval_seconds: 5,
            internal_request_timeout_seconds: 5,
            enable_round_robin: true,
            rr_state_file: None,
        }
    }

    #[test]
    fn known_prefix_wins_longest_match() {
        let config = config_with("node-a", &["node-a", "node-a-east"]);
        let (owner, bare) = parse_job_owner("node-a-east-1234", &config).expect("parse");
        assert_eq!(owner, "node-a-east");
        assert_eq!(bare, "1234");

        let (owner, bare) = parse_job_owner("node-a-1234", &config).expect("parse");
        assert_eq!(owner, "node-a");
        assert_eq!(bare, "1234");
    }

    #[test]
    fn unknown_prefix_falls_back_to_first_dash() {
        let config = config_with("node-a", &["node-a"]);
        let (owner, bare) = parse_job_owner("mystery-5678", &config).expect("parse");
        assert_eq!(owner, "mystery");
        assert_eq!(bare, "5678");
    }

    #[test]
    fn dashless_unknown_id_is_invalid() {
        let config = config_with("node-a", &["node-a"]);
        let err = parse_job_owner("nodash", &config).expect_err("invalid");
        assert!(matches!(err, ClusterError::InvalidJobId { .. }));
    }

    #[test]
    fn is_local_checks_the_self_name() {
        let config = config_with("node-a", &["node-a", "node-b"]);
        assert!(is_local("node-a-1", &config));
        assert!(!is_local("node-b-1", &config));
        assert!(!is_local("garbage", &config));
    }
}
