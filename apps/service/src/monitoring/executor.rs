use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::checker::{ApiChecker, Checker, RpcChecker, build_client};
use super::types::{EndpointKind, EndpointTarget, ProbeResult};

/// Probe executor - routes each endpoint to the checker for its type
pub struct ProbeExecutor {
    rpc_checker: Arc<dyn Checker>,
    api_checker: Arc<dyn Checker>,
}

impl ProbeExecutor {
    /// Create an executor whose checkers share one client with `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = build_client(request_timeout)?;

        Ok(Self::with_checkers(
            Arc::new(RpcChecker::new(client.clone())),
            Arc::new(ApiChecker::new(client)),
        ))
    }

    pub fn with_checkers(rpc_checker: Arc<dyn Checker>, api_checker: Arc<dyn Checker>) -> Self {
        Self { rpc_checker, api_checker }
    }

    /// Probe one endpoint.
    ///
    /// Unknown endpoint types go through the API checker without chain id comparison.
    pub async fn execute(&self, target: &EndpointTarget) -> ProbeResult {
        let expected_chain_id = target.expected_chain_id.as_deref();

        match target.endpoint_kind() {
            EndpointKind::Rpc => self.rpc_checker.check(&target.url, expected_chain_id).await,
            EndpointKind::Api => self.api_checker.check(&target.url, expected_chain_id).await,
            EndpointKind::Other => self.api_checker.check(&target.url, None).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ProbeError;
    use std::sync::Mutex;

    /// Records the calls it receives and answers with a fixed error
    struct Recorder {
        label: &'static str,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Recorder {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self { label, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait::async_trait]
    impl Checker for Recorder {
        async fn check(&self, base_url: &str, expected_chain_id: Option<&str>) -> ProbeResult {
            self.calls
                .lock()
                .unwrap()
                .push((base_url.to_string(), expected_chain_id.map(str::to_string)));
            ProbeResult::failure(ProbeError::exception(self.label))
        }
    }

    fn target(kind: &str) -> EndpointTarget {
        EndpointTarget {
            endpoint_id: 1,
            name: "node".into(),
            kind: kind.into(),
            url: format!("https://{kind}.example.com"),
            expected_chain_id: Some("cosmoshub-4".into()),
        }
    }

    #[tokio::test]
    async fn test_routing_by_endpoint_type() {
        let rpc = Recorder::new("rpc");
        let api = Recorder::new("api");
        let executor = ProbeExecutor::with_checkers(rpc.clone(), api.clone());

        let result = executor.execute(&target("rpc")).await;
        assert_eq!(result.error, Some(ProbeError::exception("rpc")));

        let result = executor.execute(&target("api")).await;
        assert_eq!(result.error, Some(ProbeError::exception("api")));

        assert_eq!(
            rpc.calls.lock().unwrap().as_slice(),
            &[("https://rpc.example.com".to_string(), Some("cosmoshub-4".to_string()))]
        );
        assert_eq!(
            api.calls.lock().unwrap().as_slice(),
            &[("https://api.example.com".to_string(), Some("cosmoshub-4".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_uses_api_checker_without_chain_id() {
        let rpc = Recorder::new("rpc");
        let api = Recorder::new("api");
        let executor = ProbeExecutor::with_checkers(rpc.clone(), api.clone());

        executor.execute(&target("grpc")).await;

        assert!(rpc.calls.lock().unwrap().is_empty());
        assert_eq!(
            api.calls.lock().unwrap().as_slice(),
            &[("https://grpc.example.com".to_string(), None)]
        );
    }
}
