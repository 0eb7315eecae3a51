//! Built-in sample context for previews and authoring-time validation.
//!
//! Never contains live agent or user data.

use coreswitch_codec::{
    Handshake, Inbound, Protocol, Reality, Tls, Transport, TransportKind, User,
};
use coreswitch_core::{AgentCapabilities, CoreEngine};
use serde_json::{json, Value};

use crate::context::{AgentInfo, ConfigContext, ServerInfo};
use crate::engine::Template;
use crate::error::Result;

const SAMPLE_UUID: &str = "00000000-0000-4000-8000-000000000001";

fn sample_users() -> Vec<User> {
    vec![
        User {
            name: "alice@example.com".to_string(),
            uuid: SAMPLE_UUID.to_string(),
            password: "sample-password-1".to_string(),
            flow: "xtls-rprx-vision".to_string(),
        },
        User {
            name: "bob@example.com".to_string(),
            uuid: "00000000-0000-4000-8000-000000000002".to_string(),
            password: "sample-password-2".to_string(),
            flow: String::new(),
        },
    ]
}

fn sample_inbounds(users: &[User]) -> Vec<Inbound> {
    let mut reality = Inbound::new(Protocol::Vless, "vless-reality", 443);
    reality.listen = "0.0.0.0".to_string();
    reality.users = users.to_vec();
    reality.tls = Some(Tls {
        enabled: true,
        server_name: "www.example.com".to_string(),
        alpn: Vec::new(),
        reality: Some(Reality {
            enabled: true,
            short_ids: vec!["0123456789abcdef".to_string()],
            server_name: "www.example.com".to_string(),
            private_key: "sample-private-key".to_string(),
            handshake: Some(Handshake {
                server: "www.example.com".to_string(),
                server_port: 443,
            }),
            ..Reality::default()
        }),
    });

    let mut ws = Inbound::new(Protocol::Vmess, "vmess-ws", 8080);
    ws.listen = "0.0.0.0".to_string();
    ws.users = users
        .iter()
        .map(|u| User {
            flow: String::new(),
            ..u.clone()
        })
        .collect();
    ws.transport = Some(Transport {
        path: "/ws".to_string(),
        host: "cdn.example.com".to_string(),
        ..Transport::new(TransportKind::Ws)
    });

    let mut ss = Inbound::new(Protocol::Shadowsocks, "shadowsocks", 8388);
    ss.listen = "0.0.0.0".to_string();
    ss.method = "2022-blake3-aes-128-gcm".to_string();
    ss.password = "c2FtcGxlLXNlcnZlci1rZXk=".to_string();

    vec![reality, ws, ss]
        .into_iter()
        .map(Inbound::with_derived_capabilities)
        .collect()
}

fn sample_outbounds(engine: CoreEngine) -> Vec<Value> {
    match engine {
        CoreEngine::Xray => vec![
            json!({"protocol": "freedom", "tag": "direct"}),
            json!({"protocol": "blackhole", "tag": "block"}),
        ],
        CoreEngine::SingBox => vec![
            json!({"type": "direct", "tag": "direct"}),
            json!({"type": "block", "tag": "block"}),
        ],
    }
}

/// The fixed sample context for an engine.
#[must_use]
pub fn sample_context(engine: CoreEngine) -> ConfigContext {
    let version = match engine {
        CoreEngine::Xray => "1.8.4",
        CoreEngine::SingBox => "1.8.0",
    };
    let caps = AgentCapabilities::new(engine, version);
    let users = sample_users();

    ConfigContext {
        inbounds: sample_inbounds(&users),
        outbounds: sample_outbounds(engine),
        users,
        agent: AgentInfo::new("00000000-0000-0000-0000-000000000000", "sample-agent", &caps),
        server: ServerInfo {
            name: "sample-server".to_string(),
            domain: "node.example.com".to_string(),
            log_level: "warning".to_string(),
        },
    }
}

/// Render template text against the sample context.
///
/// # Errors
///
/// Returns any compile or render error.
pub fn preview_render(content: &str, engine: CoreEngine) -> Result<String> {
    let template = Template::compile(content)?;
    let context = sample_context(engine).to_render_value(engine)?;
    template.render(&context.value)
}
