//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use coreswitch_control::CorePlane;

use crate::handlers::{agents, convert, health, instances, switch_logs, templates};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Agent hosts
/// - `GET /v1/agents` - List hosts
/// - `POST /v1/agents` - Register or update a host
/// - `GET /v1/agents/{agent_host_id}` - Get host
/// - `GET /v1/agents/{agent_host_id}/cores` - Engines installed on the agent
///
/// ## Instances
/// - `GET /v1/agents/{agent_host_id}/instances` - List instances
/// - `POST /v1/agents/{agent_host_id}/instances` - Create instance
/// - `DELETE /v1/agents/{agent_host_id}/instances/{instance_id}` - Delete instance
/// - `POST /v1/agents/{agent_host_id}/switch` - Switch to a new instance
///
/// ## Switch logs
/// - `GET /v1/switch-logs` - Query the audit trail
/// - `GET /v1/switch-logs/{switch_log_id}` - Get one row
///
/// ## Templates
/// - `GET|POST /v1/templates`
/// - `GET|PUT|DELETE /v1/templates/{template_id}`
/// - `POST /v1/templates/validate`
/// - `POST /v1/templates/preview`
/// - `PUT /v1/agents/{agent_host_id}/template` - Assign
/// - `GET /v1/agents/{agent_host_id}/template/compatibility?template_id=`
/// - `GET /v1/agents/{agent_host_id}/config` - Render the assigned template
///
/// ## Misc
/// - `GET /health`
/// - `POST /v1/convert`
pub fn create_router<C>(state: GatewayState<C>) -> Router
where
    C: CorePlane + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health::<C>))
        // Agent hosts
        .route(
            "/v1/agents",
            get(agents::list_agent_hosts::<C>).post(agents::register_agent_host::<C>),
        )
        .route("/v1/agents/{agent_host_id}", get(agents::get_agent_host::<C>))
        .route("/v1/agents/{agent_host_id}/cores", get(agents::get_cores::<C>))
        // Instances
        .route(
            "/v1/agents/{agent_host_id}/instances",
            get(instances::list_instances::<C>).post(instances::create_instance::<C>),
        )
        .route(
            "/v1/agents/{agent_host_id}/instances/{instance_id}",
            axum::routing::delete(instances::delete_instance::<C>),
        )
        .route(
            "/v1/agents/{agent_host_id}/switch",
            post(instances::switch_core::<C>),
        )
        // Templates on hosts
        .route(
            "/v1/agents/{agent_host_id}/template",
            put(agents::assign_template::<C>),
        )
        .route(
            "/v1/agents/{agent_host_id}/template/compatibility",
            get(agents::check_compatibility::<C>),
        )
        .route(
            "/v1/agents/{agent_host_id}/config",
            get(agents::generate_config::<C>),
        )
        // Switch logs
        .route("/v1/switch-logs", get(switch_logs::list_switch_logs::<C>))
        .route(
            "/v1/switch-logs/{switch_log_id}",
            get(switch_logs::get_switch_log::<C>),
        )
        // Templates
        .route(
            "/v1/templates",
            get(templates::list_templates::<C>).post(templates::create_template::<C>),
        )
        .route(
            "/v1/templates/validate",
            post(templates::validate_template::<C>),
        )
        .route(
            "/v1/templates/preview",
            post(templates::preview_template::<C>),
        )
        .route(
            "/v1/templates/{template_id}",
            get(templates::get_template::<C>)
                .put(templates::update_template::<C>)
                .delete(templates::delete_template::<C>),
        )
        .route("/v1/convert", post(convert::convert_config::<C>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use coreswitch_control::testing::{FakeAgentFactory, FakeBehavior};
    use coreswitch_control::{ControlConfig, CorePlaneService, NodeProfile};
    use coreswitch_store::RocksStore;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::config::GatewayConfig;

    const PROFILE: &str = r#"{
        "inbounds": [{"type": "trojan", "tag": "trojan-in", "listen_port": 443}],
        "users": [{"name": "alice", "password": "pw"}]
    }"#;

    struct Harness {
        server: TestServer,
        fake: FakeAgentFactory,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let fake = FakeAgentFactory::succeeding();
        let control = CorePlaneService::new(
            store,
            Arc::new(fake.clone()),
            Arc::new(NodeProfile::from_json(PROFILE).unwrap()),
            ControlConfig::default(),
        );
        let state = GatewayState::new(Arc::new(control), GatewayConfig::default());
        let server = TestServer::new(create_router(state)).unwrap();
        Harness {
            server,
            fake,
            _dir: dir,
        }
    }

    async fn register(server: &TestServer, version: &str) -> String {
        let response = server
            .post("/v1/agents")
            .json(&json!({
                "name": "edge-1",
                "address": "http://edge-1:7443",
                "token": "secret",
                "core_type": "sing-box",
                "core_version": version,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["has_token"], json!(true));
        assert!(body.get("token").is_none());
        body["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn health_reports_store_reachability() {
        let h = harness();
        let response = h.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], json!("ok"));
    }

    #[tokio::test]
    async fn unknown_host_uses_error_envelope() {
        let h = harness();
        let response = h
            .server
            .get("/v1/agents/00000000-0000-0000-0000-000000000000")
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body = response.json::<Value>();
        assert!(body["error"]["code"].is_string());
        assert!(body["error"]["message"].is_string());

        let response = h.server.get("/v1/agents/not-a-uuid").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], json!("bad_request"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let h = harness();
        let response = h
            .server
            .post("/v1/agents")
            .json(&json!({"name": "edge-1"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"]["code"], json!("bad_request"));
    }

    #[tokio::test]
    async fn create_switch_and_audit_over_http() {
        let h = harness();
        let host = register(&h.server, "1.8.0").await;

        let response = h
            .server
            .post(&format!("/v1/agents/{host}/instances"))
            .json(&json!({
                "instance_id": "node-1",
                "core_type": "sing-box",
                "config": {"inbounds": []},
                "operator_id": "ops",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>()["status"], json!("running"));

        let response = h
            .server
            .post(&format!("/v1/agents/{host}/instances"))
            .json(&json!({"instance_id": "node-1", "core_type": "sing-box", "config": "{}"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = h
            .server
            .post(&format!("/v1/agents/{host}/switch"))
            .json(&json!({
                "from_instance_id": "node-1",
                "to_instance_id": "node-2",
                "to_core_type": "sing-box",
                "config": "{}",
            }))
            .await;
        response.assert_status_ok();
        let result = response.json::<Value>();
        assert_eq!(result["success"], json!(true));
        let log_id = result["switch_log_id"].as_str().unwrap().to_string();

        let instances = h
            .server
            .get(&format!("/v1/agents/{host}/instances"))
            .await
            .json::<Value>();
        assert_eq!(instances["instances"].as_array().unwrap().len(), 2);

        let logs = h
            .server
            .get("/v1/switch-logs")
            .add_query_param("agent_host_id", &host)
            .add_query_param("status", "completed")
            .await
            .json::<Value>();
        assert_eq!(logs["total"], json!(2));

        let log = h
            .server
            .get(&format!("/v1/switch-logs/{log_id}"))
            .await
            .json::<Value>();
        assert_eq!(log["from_instance_id"], json!("node-1"));
        assert_eq!(log["to_instance_id"], json!("node-2"));
        assert_eq!(h.fake.switches().len(), 2);
    }

    #[tokio::test]
    async fn rejected_switch_is_reported_in_the_body() {
        let h = harness();
        let host = register(&h.server, "1.8.0").await;
        h.server
            .post(&format!("/v1/agents/{host}/instances"))
            .json(&json!({"instance_id": "node-1", "core_type": "sing-box", "config": "{}"}))
            .await
            .assert_status(StatusCode::CREATED);

        h.fake.set_behavior(FakeBehavior::Reject("port in use".to_string()));
        let response = h
            .server
            .post(&format!("/v1/agents/{host}/switch"))
            .json(&json!({
                "from_instance_id": "node-1",
                "to_instance_id": "node-2",
                "to_core_type": "sing-box",
                "config": "{}",
            }))
            .await;
        response.assert_status_ok();
        let result = response.json::<Value>();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"], json!("port in use"));

        let failed = h
            .server
            .get("/v1/switch-logs")
            .add_query_param("status", "failed")
            .await
            .json::<Value>();
        assert_eq!(failed["total"], json!(1));
    }

    #[tokio::test]
    async fn delete_instance_returns_no_content() {
        let h = harness();
        let host = register(&h.server, "1.8.0").await;
        h.server
            .post(&format!("/v1/agents/{host}/instances"))
            .json(&json!({"instance_id": "node-1", "core_type": "sing-box", "config": "{}"}))
            .await
            .assert_status(StatusCode::CREATED);

        h.server
            .delete(&format!("/v1/agents/{host}/instances/node-1"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        h.server
            .delete(&format!("/v1/agents/{host}/instances/node-1"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn template_lifecycle_over_http() {
        let h = harness();
        let host = register(&h.server, "1.6.0").await;

        let response = h
            .server
            .post("/v1/templates")
            .json(&json!({
                "name": "reality",
                "core_type": "sing-box",
                "content": r#"{"inbounds": {{inbounds}}}"#,
                "min_version": "1.8.0",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let template = response.json::<Value>();
        assert_eq!(template["is_valid"], json!(true));
        let template_id = template["id"].as_str().unwrap().to_string();

        let listed = h.server.get("/v1/templates").await.json::<Value>();
        assert_eq!(listed["templates"][0]["id"], json!(template_id));

        let compat = h
            .server
            .get(&format!("/v1/agents/{host}/template/compatibility"))
            .add_query_param("template_id", &template_id)
            .await
            .json::<Value>();
        assert_eq!(compat["compatible"], json!(false));

        // Assignment is advisory.
        let response = h
            .server
            .put(&format!("/v1/agents/{host}/template"))
            .json(&json!({"template_id": template_id}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["compatible"], json!(false));

        h.server
            .get(&format!("/v1/agents/{host}/config"))
            .await
            .assert_status(StatusCode::CONFLICT);

        h.server
            .delete(&format!("/v1/templates/{template_id}"))
            .await
            .assert_status(StatusCode::CONFLICT);

        h.server
            .put(&format!("/v1/agents/{host}/template"))
            .json(&json!({"template_id": null}))
            .await
            .assert_status_ok();
        h.server
            .get(&format!("/v1/agents/{host}/config"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        h.server
            .delete(&format!("/v1/templates/{template_id}"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn generate_config_renders_the_assigned_template() {
        let h = harness();
        let host = register(&h.server, "1.8.0").await;
        let template_id = h
            .server
            .post("/v1/templates")
            .json(&json!({
                "name": "base",
                "core_type": "sing-box",
                "content": r#"{"inbounds": {{inbounds}}}"#,
            }))
            .await
            .json::<Value>()["id"]
            .as_str()
            .unwrap()
            .to_string();
        h.server
            .put(&format!("/v1/agents/{host}/template"))
            .json(&json!({"template_id": template_id}))
            .await
            .assert_status_ok();

        let generated = h
            .server
            .get(&format!("/v1/agents/{host}/config"))
            .await
            .json::<Value>();
        assert_eq!(generated["template_id"], json!(template_id));
        let raw: Value = serde_json::from_str(generated["raw"].as_str().unwrap()).unwrap();
        assert_eq!(raw["inbounds"][0]["tag"], json!("trojan-in"));
    }

    #[tokio::test]
    async fn validate_and_preview_templates() {
        let h = harness();
        let report = h
            .server
            .post("/v1/templates/validate")
            .json(&json!({"content": "{{ unclosed", "core_type": "xray"}))
            .await
            .json::<Value>();
        assert_eq!(report["valid"], json!(false));

        let response = h
            .server
            .post("/v1/templates/preview")
            .json(&json!({"content": r#"{"inbounds": {{inbounds}}}"#, "core_type": "sing-box"}))
            .await;
        response.assert_status_ok();
        let rendered = response.json::<Value>()["rendered"].as_str().unwrap().to_string();
        assert!(serde_json::from_str::<Value>(&rendered).is_ok());
    }

    #[tokio::test]
    async fn convert_reports_unknown_engines() {
        let h = harness();
        h.server
            .post("/v1/convert")
            .json(&json!({"source": "xray", "target": "nginx", "config": {}}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let response = h
            .server
            .post("/v1/convert")
            .json(&json!({"source": "sing-box", "target": "xray", "config": {"inbounds": []}}))
            .await;
        response.assert_status_ok();
        assert!(response.json::<Value>()["raw"].is_string());
    }
}
