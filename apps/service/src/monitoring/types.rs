use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest exception text kept in an `EXCEPTION: ...` error code.
pub const MAX_EXCEPTION_CHARS: usize = 400;

/// Kind of endpoint being probed, parsed from the stored `type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Tendermint/CometBFT RPC, probed through `/status`
    Rpc,
    /// Cosmos SDK REST API, probed through the block endpoints
    Api,
    /// Anything else; probed like an API endpoint without chain id checking
    Other,
}

impl EndpointKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "rpc" => EndpointKind::Rpc,
            "api" => EndpointKind::Api,
            _ => EndpointKind::Other,
        }
    }
}

/// Classified failure of a single probe.
///
/// The `Display` output is the exact code string persisted in `error_message`, so
/// stored history stays comparable across releases. Do not reword these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("HTTP_STATUS_{0}")]
    HttpStatus(u16),

    #[error("INVALID_JSON: {0}")]
    InvalidJson(String),

    #[error("CHAIN_ID_MISMATCH: expected={expected}, got={got}")]
    ChainIdMismatch { expected: String, got: String },

    #[error("INVALID_BLOCK_TIME")]
    InvalidBlockTime,

    #[error("TLS_HANDSHAKE_TIMEOUT")]
    TlsHandshakeTimeout,

    #[error("DNS_RESOLUTION_FAILED")]
    DnsResolutionFailed,

    #[error("CONNECTION_REFUSED")]
    ConnectionRefused,

    #[error("REQUEST_TIMEOUT")]
    RequestTimeout,

    #[error("EXCEPTION: {0}")]
    Exception(String),
}

impl ProbeError {
    /// Generic fallback, keeping at most [`MAX_EXCEPTION_CHARS`] characters of the message
    pub fn exception(message: impl AsRef<str>) -> Self {
        ProbeError::Exception(message.as_ref().chars().take(MAX_EXCEPTION_CHARS).collect())
    }
}

/// Outcome of probing one endpoint.
///
/// Availability is not stored separately: an endpoint is available exactly when the
/// probe produced no error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// HTTP status of the response that decided the outcome
    pub status_code: Option<u16>,

    /// Milliseconds since the latest block was produced
    pub block_delay_ms: Option<u64>,

    /// Latest block height as reported by the node, kept as opaque text
    pub block_height: Option<String>,

    /// Classified error, `None` when the endpoint is healthy
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ProbeError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ProbeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

impl ProbeResult {
    /// A healthy response with the given HTTP status
    pub fn available(status_code: u16) -> Self {
        Self { status_code: Some(status_code), ..Self::default() }
    }

    /// A failed probe
    pub fn failure(error: ProbeError) -> Self {
        Self { error: Some(error), ..Self::default() }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attach freshness data read from the node
    pub fn with_freshness(mut self, block_delay_ms: Option<u64>, block_height: Option<String>) -> Self {
        self.block_delay_ms = block_delay_ms;
        self.block_height = block_height;
        self
    }

    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }

    /// The persisted error code string
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// An enabled endpoint selected for a batch, joined with its network's expected chain id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTarget {
    pub endpoint_id: i64,
    pub name: String,
    /// Raw `type` column, kept for logging
    pub kind: String,
    pub url: String,
    pub expected_chain_id: Option<String>,
}

impl EndpointTarget {
    pub fn endpoint_kind(&self) -> EndpointKind {
        EndpointKind::parse(&self.kind)
    }
}
