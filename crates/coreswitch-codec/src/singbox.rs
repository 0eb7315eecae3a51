//! sing-box configuration codec.
//!
//! sing-box listeners are flat objects keyed by `type`, with `users`, `tls`,
//! `transport` and `multiplex` blocks. Reality inbounds on sing-box carry no
//! client fingerprint or public key; those fields are dropped with a warning.

use std::collections::BTreeMap;

use coreswitch_core::CoreEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{
    first_non_empty, inbound_values, one_or_many, raw_tag, score_array, score_top_level,
    to_value, Codec, Native, Parsed,
};
use crate::error::{CodecError, Result};
use crate::inbound::{
    Brutal, Handshake, Inbound, Multiplex, Protocol, Reality, Tls, Transport, TransportKind,
    User,
};

/// Codec for sing-box JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingBoxCodec;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxInbound {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    listen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    listen_port: Option<u16>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    users: Vec<SingBoxUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tls: Option<SingBoxTls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transport: Option<SingBoxTransport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    multiplex: Option<SingBoxMultiplex>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxUser {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    flow: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxTls {
    #[serde(default)]
    enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    server_name: String,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    alpn: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reality: Option<SingBoxReality>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxReality {
    #[serde(default)]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handshake: Option<SingBoxHandshake>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    private_key: String,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    short_id: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxHandshake {
    #[serde(default)]
    server: String,
    #[serde(default)]
    server_port: u16,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxTransport {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxMultiplex {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    padding: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brutal: Option<SingBoxBrutal>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SingBoxBrutal {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    up_mbps: u32,
    #[serde(default)]
    down_mbps: u32,
}

impl Codec for SingBoxCodec {
    fn engine(&self) -> CoreEngine {
        CoreEngine::SingBox
    }

    fn detect(&self, doc: &Value) -> u32 {
        let weights = [
            ("type", 2),
            ("listen_port", 2),
            ("server_port", 1),
            ("users", 1),
            ("multiplex", 1),
        ];
        score_array(doc, "inbounds", &weights)
            + score_array(doc, "outbounds", &weights)
            + score_top_level(doc, &["route", "experimental", "endpoints", "ntp"])
    }

    fn parse(&self, doc: &Value) -> Result<Parsed> {
        let mut parsed = Parsed::default();

        for (index, value) in inbound_values(doc)?.iter().enumerate() {
            let tag = raw_tag(value);
            let fail = |reason: String| CodecError::inbound(index, tag, reason);

            let name = value
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| fail("missing \"type\"".to_string()))?;
            let Some(protocol) = Protocol::from_name(name) else {
                parsed.warnings.push(format!(
                    "inbound #{index} ({tag}): type {name:?} is not a supported listener, skipped"
                ));
                continue;
            };

            let raw: SingBoxInbound =
                serde_json::from_value(value.clone()).map_err(|e| fail(e.to_string()))?;

            let mut inbound = Inbound::new(protocol, raw.tag, raw.listen_port.unwrap_or(0));
            inbound.listen = raw.listen;
            inbound.method = raw.method;
            inbound.password = raw.password;
            inbound.users = raw.users.into_iter().map(canonical_user).collect();
            inbound.tls = raw.tls.map(canonical_tls);
            inbound.transport = raw
                .transport
                .map(canonical_transport)
                .transpose()
                .map_err(fail)?;
            inbound.multiplex = raw.multiplex.map(|m| Multiplex {
                enabled: m.enabled,
                padding: m.padding,
                brutal: m.brutal.map(|b| Brutal {
                    enabled: b.enabled,
                    up_mbps: b.up_mbps,
                    down_mbps: b.down_mbps,
                }),
            });

            inbound.derive_required_capabilities();
            parsed.inbounds.push(inbound);
        }

        Ok(parsed)
    }

    fn to_native(&self, inbounds: &[Inbound]) -> Result<Native> {
        let mut native = Native::default();

        for inbound in inbounds {
            let tag = inbound.display_tag();
            let raw = SingBoxInbound {
                kind: inbound.protocol.as_str().to_string(),
                tag: inbound.tag.clone(),
                listen: if inbound.listen.is_empty() {
                    "::".to_string()
                } else {
                    inbound.listen.clone()
                },
                listen_port: Some(inbound.listen_port),
                method: inbound.method.clone(),
                password: inbound.password.clone(),
                users: inbound
                    .users
                    .iter()
                    .map(|u| native_user(inbound.protocol, u))
                    .collect(),
                tls: inbound
                    .tls
                    .as_ref()
                    .filter(|t| t.enabled)
                    .map(|t| native_tls(tag, t, &mut native.warnings)),
                transport: inbound.transport.as_ref().map(native_transport),
                multiplex: inbound.multiplex.as_ref().filter(|m| m.enabled).map(|m| {
                    SingBoxMultiplex {
                        enabled: true,
                        padding: m.padding,
                        brutal: m.brutal.as_ref().filter(|b| b.enabled).map(|b| SingBoxBrutal {
                            enabled: true,
                            up_mbps: b.up_mbps,
                            down_mbps: b.down_mbps,
                        }),
                    }
                }),
            };
            native.inbounds.push(to_value(&raw)?);
        }

        Ok(native)
    }
}

fn canonical_user(user: SingBoxUser) -> User {
    User {
        name: if user.name.is_empty() {
            user.username
        } else {
            user.name
        },
        uuid: user.uuid,
        password: user.password,
        flow: user.flow,
    }
}

fn canonical_tls(tls: SingBoxTls) -> Tls {
    let reality = tls.reality.map(|r| Reality {
        enabled: r.enabled,
        short_ids: r.short_id,
        server_name: tls.server_name.clone(),
        fingerprint: String::new(),
        public_key: String::new(),
        private_key: r.private_key,
        handshake: r.handshake.map(|h| Handshake {
            server: h.server,
            server_port: h.server_port,
        }),
    });
    Tls {
        enabled: tls.enabled,
        server_name: tls.server_name,
        alpn: tls.alpn,
        reality,
    }
}

fn canonical_transport(transport: SingBoxTransport) -> std::result::Result<Transport, String> {
    let kind = match transport.kind.to_ascii_lowercase().as_str() {
        "ws" => TransportKind::Ws,
        "grpc" => TransportKind::Grpc,
        "httpupgrade" => TransportKind::HttpUpgrade,
        "http" => TransportKind::Http,
        other => return Err(format!("transport type {other:?} is not supported")),
    };

    let host = match &transport.host {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => return Err(format!("transport host must be a string, got {other}")),
    };
    let host = if host.is_empty() {
        header_host(&transport.headers)
    } else {
        host
    };

    Ok(Transport {
        kind,
        path: transport.path,
        host,
        service_name: transport.service_name,
    })
}

/// The `Host` header value; sing-box allows a string or a list.
fn header_host(headers: &BTreeMap<String, Value>) -> String {
    let Some(value) = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v)
    else {
        return String::new();
    };
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let hosts: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            first_non_empty(&hosts)
        }
        _ => String::new(),
    }
}

fn native_user(protocol: Protocol, user: &User) -> SingBoxUser {
    match protocol {
        Protocol::Socks | Protocol::Http | Protocol::Mixed => SingBoxUser {
            username: user.name.clone(),
            password: user.password.clone(),
            ..SingBoxUser::default()
        },
        Protocol::Vless => SingBoxUser {
            name: user.name.clone(),
            uuid: user.uuid.clone(),
            flow: user.flow.clone(),
            ..SingBoxUser::default()
        },
        Protocol::Vmess => SingBoxUser {
            name: user.name.clone(),
            uuid: user.uuid.clone(),
            ..SingBoxUser::default()
        },
        Protocol::Tuic => SingBoxUser {
            name: user.name.clone(),
            uuid: user.uuid.clone(),
            password: user.password.clone(),
            ..SingBoxUser::default()
        },
        Protocol::Trojan | Protocol::Shadowsocks | Protocol::Hysteria2 => SingBoxUser {
            name: user.name.clone(),
            password: user.password.clone(),
            ..SingBoxUser::default()
        },
    }
}

fn native_tls(tag: &str, tls: &Tls, warnings: &mut Vec<String>) -> SingBoxTls {
    let reality = tls.reality.as_ref().filter(|r| r.enabled).map(|r| {
        if !r.fingerprint.is_empty() || !r.public_key.is_empty() {
            warnings.push(format!(
                "{tag}: sing-box reality inbounds have no fingerprint or public_key, dropped"
            ));
        }
        SingBoxReality {
            enabled: true,
            handshake: r.handshake.as_ref().map(|h| SingBoxHandshake {
                server: h.server.clone(),
                server_port: h.server_port,
            }),
            private_key: r.private_key.clone(),
            short_id: r.short_ids.clone(),
        }
    });

    let server_name = match tls.reality.as_ref() {
        Some(r) if tls.server_name.is_empty() => r.server_name.clone(),
        _ => tls.server_name.clone(),
    };

    SingBoxTls {
        enabled: true,
        server_name,
        alpn: tls.alpn.clone(),
        reality,
    }
}

fn native_transport(transport: &Transport) -> SingBoxTransport {
    let mut native = SingBoxTransport {
        kind: transport.kind.as_str().to_string(),
        path: transport.path.clone(),
        ..SingBoxTransport::default()
    };
    match transport.kind {
        TransportKind::Ws => {
            if !transport.host.is_empty() {
                native
                    .headers
                    .insert("Host".to_string(), Value::from(transport.host.clone()));
            }
        }
        TransportKind::Grpc => {
            native.path.clear();
            native.service_name.clone_from(&transport.service_name);
        }
        TransportKind::HttpUpgrade => {
            if !transport.host.is_empty() {
                native.host = Some(Value::from(transport.host.clone()));
            }
        }
        TransportKind::Http => {
            if !transport.host.is_empty() {
                native.host = Some(Value::from(vec![transport.host.clone()]));
            }
        }
    }
    native
}
