use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::ProbeResult;

/// Longest `error_message` kept in checks and statuses
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Convert an instant to the stored Unix-millisecond representation
pub fn timestamp_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert a stored Unix-millisecond value back to an instant
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn truncate_error(message: String) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        message
    } else {
        message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
    }
}

/// Project model - a group of related networks (e.g. one chain's mainnet and testnets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Option<i64>,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(slug: String, name: String) -> Self {
        Self { id: None, slug, name, created_at: Utc::now() }
    }
}

/// Network model - one chain, identified on-chain by `chain_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: Option<i64>,
    pub project_id: i64,
    pub slug: String,
    pub name: String,
    pub chain_id: String,
    /// `mainnet` / `testnet`
    pub network_type: String,
    pub created_at: DateTime<Utc>,
}

impl Network {
    pub fn new(project_id: i64, slug: String, name: String, chain_id: String, network_type: String) -> Self {
        Self { id: None, project_id, slug, name, chain_id, network_type, created_at: Utc::now() }
    }
}

/// Endpoint model - an RPC or REST API URL exposed by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Option<i64>,
    pub network_id: i64,
    pub name: String,
    /// `rpc` / `api`; other values are kept as given
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(network_id: i64, name: String, kind: String, url: String, enabled: bool) -> Self {
        Self { id: None, network_id, name, kind, url, enabled, created_at: Utc::now() }
    }
}

/// Check model - one probe execution, append-only history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub id: Option<i64>,
    pub endpoint_id: i64,
    pub is_available: bool,
    pub status_code: Option<u16>,
    pub block_delay_ms: Option<u64>,
    pub last_block_height: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Check {
    /// Create a new check row from a probe result
    pub fn from_probe(endpoint_id: i64, result: &ProbeResult, checked_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            endpoint_id,
            is_available: result.is_available(),
            status_code: result.status_code,
            block_delay_ms: result.block_delay_ms,
            last_block_height: result.block_height.clone(),
            error_message: result.error_message().map(truncate_error),
            checked_at,
        }
    }
}

/// EndpointStatus model - the latest known state of an endpoint, one row per endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub id: Option<i64>,
    pub endpoint_id: i64,
    pub is_available: bool,
    pub status_code: Option<u16>,
    pub block_delay_ms: Option<u64>,
    pub last_block_height: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<&Check> for EndpointStatus {
    fn from(check: &Check) -> Self {
        Self {
            id: None,
            endpoint_id: check.endpoint_id,
            is_available: check.is_available,
            status_code: check.status_code,
            block_delay_ms: check.block_delay_ms,
            last_block_height: check.last_block_height.clone(),
            error_message: check.error_message.clone(),
            checked_at: check.checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ProbeError;

    #[test]
    fn test_check_from_probe_copies_fields() {
        let now = Utc::now();
        let result = ProbeResult::failure(ProbeError::ChainIdMismatch {
            expected: "cosmoshub-4".into(),
            got: "cosmoshub-3".into(),
        })
        .with_status(200)
        .with_freshness(Some(1500), Some("42".into()));

        let check = Check::from_probe(7, &result, now);

        assert_eq!(check.endpoint_id, 7);
        assert!(!check.is_available);
        assert_eq!(check.status_code, Some(200));
        assert_eq!(check.block_delay_ms, Some(1500));
        assert_eq!(check.last_block_height.as_deref(), Some("42"));
        assert_eq!(
            check.error_message.as_deref(),
            Some("CHAIN_ID_MISMATCH: expected=cosmoshub-4, got=cosmoshub-3")
        );
        assert_eq!(check.checked_at, now);
    }

    #[test]
    fn test_long_error_messages_are_bounded() {
        let result = ProbeResult::failure(ProbeError::InvalidJson("y".repeat(2000)));
        let check = Check::from_probe(1, &result, Utc::now());
        assert_eq!(check.error_message.unwrap().chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }

    #[test]
    fn test_millis_round_trip_keeps_millisecond_precision() {
        let now = Utc::now();
        let restored = millis_to_timestamp(timestamp_to_millis(now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
