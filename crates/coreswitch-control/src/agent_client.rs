//! Remote agent RPC client.
//!
//! The control plane talks to agents through the [`AgentClient`] trait so
//! the switch orchestrator can be exercised against fakes in tests.
//! [`HttpAgentClient`] is the production implementation: JSON over HTTP(S)
//! with a bearer token, a request timeout and TCP keepalive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coreswitch_core::{ConfigHash, CoreEngine, InstanceId, SwitchLogId};
use coreswitch_store::{AgentHost, AgentTlsConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ControlConfig;

/// Errors from an agent call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The agent could not be reached.
    #[error("agent unreachable: {0}")]
    Transport(String),

    /// The call did not finish within the timeout.
    #[error("remote call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The agent answered with an error status.
    #[error("agent rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the agent.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The agent answered with a body that could not be decoded.
    #[error("invalid agent response: {0}")]
    InvalidResponse(String),

    /// The client could not be configured.
    #[error("invalid agent endpoint: {0}")]
    Endpoint(String),
}

/// A core engine installed on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreInfo {
    /// Engine kind.
    pub core_type: CoreEngine,
    /// Installed version.
    #[serde(default)]
    pub version: Option<String>,
    /// Capabilities the agent reports for this engine.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Build tags of the engine binary.
    #[serde(default)]
    pub build_tags: Vec<String>,
    /// Whether an instance of this engine is running.
    #[serde(default)]
    pub running: bool,
}

/// Body of a switch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcSwitchRequest {
    /// Correlation ID; equals the audit row ID.
    pub switch_id: SwitchLogId,
    /// Instance to stop, if any.
    #[serde(default)]
    pub from_instance_id: Option<InstanceId>,
    /// Instance to start.
    pub to_instance_id: InstanceId,
    /// Engine of the new instance.
    pub core_type: CoreEngine,
    /// Exact configuration text to apply.
    pub config: String,
    /// Hash of `config`.
    pub config_hash: ConfigHash,
}

/// Result of a switch call that reached the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcSwitchResponse {
    /// Whether the agent applied the configuration.
    pub success: bool,
    /// Informational message.
    #[serde(default)]
    pub message: String,
    /// Failure reason when `success` is false.
    #[serde(default)]
    pub error: String,
    /// Ports the new instance listens on.
    #[serde(default)]
    pub listen_ports: Vec<u16>,
    /// Version of the engine now running, when the agent reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_version: Option<String>,
}

/// Operations an agent exposes to the control plane.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// List the engines installed on the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    async fn get_cores(&self) -> Result<Vec<CoreInfo>, RpcError>;

    /// Ask the agent to apply a configuration.
    ///
    /// An application-level failure is a successful call with
    /// `success == false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call itself fails.
    async fn switch_core(&self, request: &RpcSwitchRequest) -> Result<RpcSwitchResponse, RpcError>;

    /// Stop and remove an instance on the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the agent refuses.
    async fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), RpcError>;
}

/// Connection settings for one agent, resolved once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    /// Base URL of the agent RPC server.
    pub address: String,
    /// Bearer token.
    pub token: String,
    /// TLS settings.
    pub tls: Option<AgentTlsConfig>,
    /// Request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// TCP keepalive interval.
    pub keepalive: Duration,
}

impl AgentEndpoint {
    /// Endpoint of a registered host with the configured timeouts.
    #[must_use]
    pub fn for_host(host: &AgentHost, config: &ControlConfig) -> Self {
        Self {
            address: host.address.clone(),
            token: host.token.clone(),
            tls: host.tls.clone(),
            timeout: config.rpc_timeout(),
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds),
            keepalive: Duration::from_secs(config.keepalive_seconds),
        }
    }
}

/// Builds a client for an endpoint.
pub trait AgentClientFactory: Send + Sync {
    /// Create a client for the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Endpoint` if the endpoint settings are unusable.
    fn connect(&self, endpoint: &AgentEndpoint) -> Result<Arc<dyn AgentClient>, RpcError>;
}

/// Factory producing [`HttpAgentClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAgentClientFactory;

impl AgentClientFactory for HttpAgentClientFactory {
    fn connect(&self, endpoint: &AgentEndpoint) -> Result<Arc<dyn AgentClient>, RpcError> {
        Ok(Arc::new(HttpAgentClient::new(endpoint)?))
    }
}

/// HTTP client for the agent RPC API.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

/// Request body for deleting an instance.
#[derive(Debug, Serialize)]
struct DeleteInstanceBody<'a> {
    instance_id: &'a InstanceId,
}

/// Error response from an agent.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl HttpAgentClient {
    /// Create a client for an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Endpoint` if the address is empty, the CA
    /// certificate cannot be parsed, or the client cannot be built.
    pub fn new(endpoint: &AgentEndpoint) -> Result<Self, RpcError> {
        let base_url = endpoint.address.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RpcError::Endpoint("agent address is empty".to_string()));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .connect_timeout(endpoint.connect_timeout)
            .tcp_keepalive(endpoint.keepalive);

        if let Some(tls) = &endpoint.tls {
            if let Some(pem) = &tls.ca_cert_pem {
                let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                    .map_err(|e| RpcError::Endpoint(format!("invalid CA certificate: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        let client = builder
            .build()
            .map_err(|e| RpcError::Endpoint(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: endpoint.token.clone(),
            timeout: endpoint.timeout,
        })
    }

    /// Get the base URL of the agent.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rpc/v1/{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, self.url(path));
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout(self.timeout)
        } else {
            RpcError::Transport(e.to_string())
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RpcError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.json::<ErrorResponse>().await.unwrap_or_default();
        let message = [body.error, body.message]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| format!("agent returned status {status}"));

        tracing::debug!(
            agent = %self.base_url,
            status = %status,
            error = %message,
            "Agent rejected request"
        );

        Err(RpcError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RpcError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(self.timeout)
            } else {
                RpcError::InvalidResponse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn get_cores(&self) -> Result<Vec<CoreInfo>, RpcError> {
        #[derive(Deserialize)]
        struct CoresResponse {
            #[serde(default)]
            cores: Vec<CoreInfo>,
        }

        let response = self.send(self.request(reqwest::Method::GET, "cores")).await?;
        let body: CoresResponse = self.decode(response).await?;
        tracing::debug!(agent = %self.base_url, cores = body.cores.len(), "Fetched agent cores");
        Ok(body.cores)
    }

    async fn switch_core(&self, request: &RpcSwitchRequest) -> Result<RpcSwitchResponse, RpcError> {
        tracing::debug!(
            agent = %self.base_url,
            switch_log_id = %request.switch_id,
            to_instance_id = %request.to_instance_id,
            core_type = %request.core_type,
            "Sending switch request"
        );
        let response = self
            .send(self.request(reqwest::Method::POST, "switch").json(request))
            .await?;
        self.decode(response).await
    }

    async fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), RpcError> {
        self.send(
            self.request(reqwest::Method::POST, "instances/delete")
                .json(&DeleteInstanceBody { instance_id }),
        )
        .await?;
        tracing::debug!(agent = %self.base_url, instance_id = %instance_id, "Deleted instance on agent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(address: &str) -> AgentEndpoint {
        AgentEndpoint {
            address: address.to_string(),
            token: "secret-token".to_string(),
            tls: None,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            keepalive: Duration::from_secs(60),
        }
    }

    fn switch_request() -> RpcSwitchRequest {
        RpcSwitchRequest {
            switch_id: SwitchLogId::generate(),
            from_instance_id: None,
            to_instance_id: InstanceId::new("node-1").unwrap(),
            core_type: CoreEngine::SingBox,
            config: "{}".to_string(),
            config_hash: ConfigHash::of(b"{}"),
        }
    }

    #[test]
    fn client_rejects_empty_address() {
        assert!(matches!(
            HttpAgentClient::new(&endpoint("  ")),
            Err(RpcError::Endpoint(_))
        ));
        let client = HttpAgentClient::new(&endpoint("http://agent:7443/")).unwrap();
        assert_eq!(client.base_url(), "http://agent:7443");
    }

    #[tokio::test]
    async fn get_cores_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rpc/v1/cores"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cores": [
                    {"core_type": "xray", "version": "1.8.4", "running": true},
                    {"core_type": "sing-box", "version": "1.8.0", "build_tags": ["with_quic"]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(&endpoint(&server.uri())).unwrap();
        let cores = client.get_cores().await.unwrap();
        assert_eq!(cores.len(), 2);
        assert!(cores[0].running);
        assert_eq!(cores[1].core_type, CoreEngine::SingBox);
        assert_eq!(cores[1].build_tags, vec!["with_quic"]);
    }

    #[tokio::test]
    async fn switch_core_posts_request_and_reads_outcome() {
        let server = MockServer::start().await;
        let request = switch_request();
        Mock::given(method("POST"))
            .and(path("/rpc/v1/switch"))
            .and(body_partial_json(serde_json::json!({
                "to_instance_id": "node-1",
                "core_type": "sing-box",
                "config": "{}"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "port 443 already in use"
            })))
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(&endpoint(&server.uri())).unwrap();
        let response = client.switch_core(&request).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error, "port 443 already in use");
    }

    #[tokio::test]
    async fn error_status_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/v1/instances/delete"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "no such instance"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rpc/v1/cores"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(&endpoint(&server.uri())).unwrap();
        let err = client
            .delete_instance(&InstanceId::new("gone").unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Rejected {
                status: 404,
                message: "no such instance".to_string()
            }
        );

        let err = client.get_cores().await.unwrap_err();
        assert!(matches!(err, RpcError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/v1/switch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut endpoint = endpoint(&server.uri());
        endpoint.timeout = Duration::from_millis(200);
        let client = HttpAgentClient::new(&endpoint).unwrap();
        let err = client.switch_core(&switch_request()).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rpc/v1/cores"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = HttpAgentClient::new(&endpoint(&server.uri())).unwrap();
        assert!(matches!(
            client.get_cores().await,
            Err(RpcError::InvalidResponse(_))
        ));
    }
}
