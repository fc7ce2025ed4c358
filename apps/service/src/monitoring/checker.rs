use anyhow::Result;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::block_time::block_delay_ms;
use super::classify::{classify_request_failure, most_informative};
use super::types::{ProbeError, ProbeResult};

/// Cosmos SDK >= 0.47 block endpoint, then the legacy one
pub const REST_BLOCK_PATHS: [&str; 2] = ["/cosmos/base/tendermint/v1beta1/blocks/latest", "/blocks/latest"];

/// Probe strategy for one endpoint type
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe `base_url`. Expected failures are reported in the result, never as a panic or error.
    async fn check(&self, base_url: &str, expected_chain_id: Option<&str>) -> ProbeResult;
}

/// HTTP client shared by the checkers, with the connect budget its failures are judged by
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl ProbeClient {
    async fn classify(&self, error: &reqwest::Error) -> ProbeError {
        classify_request_failure(error, self.connect_timeout).await
    }
}

/// Build the HTTP client shared by the checkers.
///
/// `timeout` bounds the connect phase (TCP plus TLS); the whole exchange, body
/// included, gets twice that. Redirects are not followed: a 3xx answer is
/// reported as `HTTP_STATUS_3xx`.
pub fn build_client(timeout: Duration) -> Result<ProbeClient> {
    let http = reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout.saturating_mul(2))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    Ok(ProbeClient { http, connect_timeout: timeout })
}

/// Tendermint/CometBFT RPC checker, reads `GET {base}/status`
pub struct RpcChecker {
    client: ProbeClient,
}

impl RpcChecker {
    pub fn new(client: ProbeClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checker for RpcChecker {
    async fn check(&self, base_url: &str, expected_chain_id: Option<&str>) -> ProbeResult {
        let url = format!("{}/status", trim_base(base_url));

        match fetch_document(&self.client.http, &url).await {
            Ok(document) => document.evaluate(|status, body| {
                let result = &body["result"];
                let node_info = &result["node_info"];
                let sync_info = &result["sync_info"];

                evaluate_block(
                    status,
                    BlockReport {
                        chain_id: node_info["network"].as_str(),
                        height: height_text(&sync_info["latest_block_height"]),
                        time: sync_info["latest_block_time"].as_str(),
                    },
                    expected_chain_id,
                )
            }),
            Err(error) => ProbeResult::failure(self.client.classify(&error).await),
        }
    }
}

/// Cosmos SDK REST checker with path fallbacks.
///
/// Tries the current block endpoint, the legacy block endpoint, and finally a bare
/// liveness GET. The first attempt that gets an answer decides the outcome, except
/// that a 404 on a block path only means "not served by this node version" and
/// moves on to the next attempt.
pub struct ApiChecker {
    client: ProbeClient,
}

impl ApiChecker {
    pub fn new(client: ProbeClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checker for ApiChecker {
    async fn check(&self, base_url: &str, expected_chain_id: Option<&str>) -> ProbeResult {
        let base = trim_base(base_url);
        let mut transport_errors = Vec::with_capacity(REST_BLOCK_PATHS.len() + 1);
        let mut not_found = None;

        for path in REST_BLOCK_PATHS {
            let url = format!("{base}{path}");

            match fetch_document(&self.client.http, &url).await {
                Ok(Document::Rejected(status)) if status == StatusCode::NOT_FOUND => {
                    debug!("{} answered 404, trying next path", url);
                    not_found.get_or_insert_with(|| {
                        ProbeResult::failure(ProbeError::HttpStatus(404)).with_status(404)
                    });
                }
                Ok(document) => {
                    return document.evaluate(|status, body| {
                        let header = &body["block"]["header"];

                        evaluate_block(
                            status,
                            BlockReport {
                                chain_id: header["chain_id"].as_str(),
                                height: height_text(&header["height"]),
                                time: header["time"].as_str(),
                            },
                            expected_chain_id,
                        )
                    });
                }
                Err(error) => {
                    let classified = self.client.classify(&error).await;
                    debug!("{} failed: {}", url, classified);
                    transport_errors.push(classified);
                }
            }
        }

        match self.client.http.get(base).send().await {
            Ok(response) => {
                let status = response.status();
                return if status.is_success() {
                    ProbeResult::available(status.as_u16())
                } else {
                    ProbeResult::failure(ProbeError::HttpStatus(status.as_u16())).with_status(status.as_u16())
                };
            }
            Err(error) => transport_errors.push(self.client.classify(&error).await),
        }

        if let Some(result) = not_found {
            return result;
        }

        let error = most_informative(&transport_errors)
            .unwrap_or_else(|| ProbeError::exception("no probe attempt was made"));
        ProbeResult::failure(error)
    }
}

/// What came back from a block endpoint
enum Document {
    /// Non-2xx status, body not read
    Rejected(StatusCode),
    /// 2xx with a body that is not JSON
    Malformed { status: u16, detail: String },
    Json { status: u16, body: Value },
}

impl Document {
    fn evaluate(self, on_json: impl FnOnce(u16, &Value) -> ProbeResult) -> ProbeResult {
        match self {
            Document::Rejected(status) => {
                ProbeResult::failure(ProbeError::HttpStatus(status.as_u16())).with_status(status.as_u16())
            }
            Document::Malformed { status, detail } => {
                ProbeResult::failure(ProbeError::InvalidJson(detail)).with_status(status)
            }
            Document::Json { status, body } => on_json(status, &body),
        }
    }
}

/// GET `url` and decode a 2xx body as JSON. Transport failures, including a body
/// that cannot be read, are returned as errors.
async fn fetch_document(client: &reqwest::Client, url: &str) -> Result<Document, reqwest::Error> {
    let response = client.get(url).send().await?;
    let status = response.status();

    if !status.is_success() {
        return Ok(Document::Rejected(status));
    }

    let bytes = response.bytes().await?;
    Ok(match serde_json::from_slice::<Value>(&bytes) {
        Ok(body) => Document::Json { status: status.as_u16(), body },
        Err(error) => Document::Malformed { status: status.as_u16(), detail: error.to_string() },
    })
}

/// Block fields read from either response shape
struct BlockReport<'a> {
    chain_id: Option<&'a str>,
    height: Option<String>,
    time: Option<&'a str>,
}

/// Shared rules for both response shapes.
///
/// A chain id mismatch makes the endpoint unavailable but still reports whatever
/// freshness data the response carried. Otherwise an unusable block time is an
/// `INVALID_BLOCK_TIME` failure.
fn evaluate_block(status: u16, block: BlockReport<'_>, expected_chain_id: Option<&str>) -> ProbeResult {
    let delay = block_delay_ms(block.time, Utc::now());
    let expected = expected_chain_id.filter(|id| !id.is_empty());
    let observed = block.chain_id.filter(|id| !id.is_empty());

    if let (Some(expected), Some(observed)) = (expected, observed) {
        if expected != observed {
            let mismatch = ProbeError::ChainIdMismatch { expected: expected.to_string(), got: observed.to_string() };
            return ProbeResult::failure(mismatch).with_status(status).with_freshness(delay, block.height);
        }
    }

    match delay {
        Some(delay) => ProbeResult::available(status).with_freshness(Some(delay), block.height),
        None => ProbeResult::failure(ProbeError::InvalidBlockTime)
            .with_status(status)
            .with_freshness(None, block.height),
    }
}

/// Heights arrive as strings from Tendermint but some gateways send numbers
fn height_text(value: &Value) -> Option<String> {
    match value {
        Value::String(height) => Some(height.clone()),
        Value::Number(height) => Some(height.to_string()),
        _ => None,
    }
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}
