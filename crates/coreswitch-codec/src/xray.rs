//! Xray-core configuration codec.
//!
//! Xray listeners carry a `protocol`, a protocol-specific `settings` object
//! and an optional `streamSettings` object holding transport and security.
//! Xray has no server-side multiplexing, Brutal, Hysteria2, TUIC or `mixed`
//! listener; serializing those drops them with a warning.

use std::collections::BTreeMap;

use coreswitch_core::CoreEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{
    first_non_empty, inbound_values, raw_tag, score_array, score_top_level, to_value, Codec,
    Native, Parsed,
};
use crate::error::{CodecError, Result};
use crate::inbound::{
    Handshake, Inbound, Protocol, Reality, Tls, Transport, TransportKind, User,
};

/// Codec for Xray-core JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct XrayCodec;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayInbound {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    listen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<Value>,
    protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stream_settings: Option<XrayStream>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XraySettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    clients: Vec<XrayClient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    decryption: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    accounts: Vec<XrayAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    udp: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XrayClient {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    flow: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XrayAccount {
    #[serde(default)]
    user: String,
    #[serde(default)]
    pass: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayStream {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    network: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    security: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tls_settings: Option<XrayTls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reality_settings: Option<XrayReality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ws_settings: Option<XrayWs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grpc_settings: Option<XrayGrpc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    httpupgrade_settings: Option<XrayHttpUpgrade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_settings: Option<XrayHttp>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayTls {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    server_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    alpn: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayReality {
    #[serde(default)]
    show: bool,
    #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
    dest: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    server_names: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    private_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    short_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    fingerprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    public_key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XrayWs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    host: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XrayGrpc {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    service_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XrayHttpUpgrade {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    host: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XrayHttp {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    host: Vec<String>,
}

const SUPPORTED: [Protocol; 6] = [
    Protocol::Vless,
    Protocol::Vmess,
    Protocol::Trojan,
    Protocol::Shadowsocks,
    Protocol::Socks,
    Protocol::Http,
];

impl Codec for XrayCodec {
    fn engine(&self) -> CoreEngine {
        CoreEngine::Xray
    }

    fn detect(&self, doc: &Value) -> u32 {
        let weights = [("protocol", 2), ("streamSettings", 2), ("port", 1), ("settings", 1)];
        score_array(doc, "inbounds", &weights)
            + score_array(doc, "outbounds", &weights)
            + score_top_level(doc, &["routing", "policy", "api", "stats", "reverse"])
    }

    fn parse(&self, doc: &Value) -> Result<Parsed> {
        let mut parsed = Parsed::default();

        for (index, value) in inbound_values(doc)?.iter().enumerate() {
            let tag = raw_tag(value);
            let fail = |reason: String| CodecError::inbound(index, tag, reason);

            let name = value
                .get("protocol")
                .and_then(Value::as_str)
                .ok_or_else(|| fail("missing \"protocol\"".to_string()))?;
            let Some(protocol) = Protocol::from_name(name).filter(|p| SUPPORTED.contains(p))
            else {
                parsed.warnings.push(format!(
                    "inbound #{index} ({tag}): protocol {name:?} is not a supported listener, skipped"
                ));
                continue;
            };

            let raw: XrayInbound =
                serde_json::from_value(value.clone()).map_err(|e| fail(e.to_string()))?;

            let mut inbound = Inbound::new(protocol, raw.tag.clone(), 0);
            inbound.listen.clone_from(&raw.listen);
            inbound.listen_port = match &raw.port {
                None => {
                    parsed
                        .warnings
                        .push(format!("inbound #{index} ({tag}): no port set"));
                    0
                }
                Some(port) => parse_port(port).map_err(fail)?,
            };

            let settings: XraySettings = match &raw.settings {
                None | Some(Value::Null) => XraySettings::default(),
                Some(v) => serde_json::from_value(v.clone())
                    .map_err(|e| fail(format!("settings: {e}")))?,
            };
            apply_settings(&mut inbound, settings);

            if let Some(stream) = raw.stream_settings {
                let stream_warnings = apply_stream(&mut inbound, stream).map_err(fail)?;
                parsed.warnings.extend(
                    stream_warnings
                        .into_iter()
                        .map(|w| format!("inbound #{index} ({tag}): {w}")),
                );
            }

            inbound.derive_required_capabilities();
            parsed.inbounds.push(inbound);
        }

        Ok(parsed)
    }

    fn to_native(&self, inbounds: &[Inbound]) -> Result<Native> {
        let mut native = Native::default();

        for inbound in inbounds {
            let tag = inbound.display_tag();
            if !SUPPORTED.contains(&inbound.protocol) {
                native.warnings.push(format!(
                    "{tag}: xray has no {} inbound, dropped",
                    inbound.protocol
                ));
                continue;
            }
            if let Some(multiplex) = inbound.multiplex.as_ref().filter(|m| m.enabled) {
                native
                    .warnings
                    .push(format!("{tag}: xray has no inbound multiplex, dropped"));
                if multiplex.brutal.as_ref().is_some_and(|b| b.enabled) {
                    native
                        .warnings
                        .push(format!("{tag}: xray has no brutal congestion control, dropped"));
                }
            }

            let raw = XrayInbound {
                tag: inbound.tag.clone(),
                listen: inbound.listen.clone(),
                port: Some(Value::from(inbound.listen_port)),
                protocol: inbound.protocol.as_str().to_string(),
                settings: Some(to_value(&native_settings(inbound))?),
                stream_settings: native_stream(inbound),
            };
            native.inbounds.push(to_value(&raw)?);
        }

        Ok(native)
    }
}

fn parse_port(value: &Value) -> std::result::Result<u16, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| format!("port {n} is out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("port {s:?} is not a single port number")),
        other => Err(format!("port must be a number, got {other}")),
    }
}

fn apply_settings(inbound: &mut Inbound, settings: XraySettings) {
    match inbound.protocol {
        Protocol::Socks | Protocol::Http => {
            inbound.users = settings
                .accounts
                .into_iter()
                .map(|a| User {
                    name: a.user,
                    password: a.pass,
                    ..User::default()
                })
                .collect();
        }
        protocol => {
            if protocol == Protocol::Shadowsocks {
                inbound.method = settings.method;
                inbound.password = settings.password;
            }
            inbound.users = settings
                .clients
                .into_iter()
                .map(|c| User {
                    name: c.email,
                    uuid: c.id,
                    password: c.password,
                    flow: c.flow,
                })
                .collect();
        }
    }
}

fn apply_stream(
    inbound: &mut Inbound,
    stream: XrayStream,
) -> std::result::Result<Vec<String>, String> {
    let mut warnings = Vec::new();

    inbound.transport = match stream.network.to_ascii_lowercase().as_str() {
        "" | "tcp" | "raw" => None,
        "ws" | "websocket" => {
            let ws = stream.ws_settings.unwrap_or_default();
            let host = if ws.host.is_empty() {
                ws.headers.get("Host").cloned().unwrap_or_default()
            } else {
                ws.host
            };
            Some(Transport {
                path: ws.path,
                host,
                ..Transport::new(TransportKind::Ws)
            })
        }
        "grpc" | "gun" => Some(Transport {
            service_name: stream.grpc_settings.unwrap_or_default().service_name,
            ..Transport::new(TransportKind::Grpc)
        }),
        "httpupgrade" => {
            let hu = stream.httpupgrade_settings.unwrap_or_default();
            Some(Transport {
                path: hu.path,
                host: hu.host,
                ..Transport::new(TransportKind::HttpUpgrade)
            })
        }
        "http" | "h2" => {
            let http = stream.http_settings.unwrap_or_default();
            Some(Transport {
                path: http.path,
                host: first_non_empty(&http.host),
                ..Transport::new(TransportKind::Http)
            })
        }
        other => {
            warnings.push(format!("transport {other:?} is not supported, treated as tcp"));
            None
        }
    };

    inbound.tls = match stream.security.to_ascii_lowercase().as_str() {
        "" | "none" => None,
        "tls" => {
            let tls = stream.tls_settings.unwrap_or_default();
            Some(Tls {
                enabled: true,
                server_name: tls.server_name,
                alpn: tls.alpn,
                reality: None,
            })
        }
        "reality" => {
            let reality = stream
                .reality_settings
                .ok_or_else(|| "security is reality but realitySettings is missing".to_string())?;
            let server_name = first_non_empty(&reality.server_names);
            Some(Tls {
                enabled: true,
                server_name: server_name.clone(),
                alpn: Vec::new(),
                reality: Some(Reality {
                    enabled: true,
                    short_ids: reality.short_ids,
                    server_name,
                    fingerprint: reality.fingerprint,
                    public_key: reality.public_key,
                    private_key: reality.private_key,
                    handshake: reality.dest.as_ref().map(parse_dest).transpose()?,
                }),
            })
        }
        other => {
            warnings.push(format!("security {other:?} is not supported, ignored"));
            None
        }
    };

    Ok(warnings)
}

/// Parse a Reality `dest`: `host:port`, or a bare port on localhost.
fn parse_dest(value: &Value) -> std::result::Result<Handshake, String> {
    let invalid = || format!("realitySettings.dest {value} is not host:port");
    match value {
        Value::Number(_) => Ok(Handshake {
            server: "127.0.0.1".to_string(),
            server_port: parse_port(value)?,
        }),
        Value::String(s) => {
            let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
            let port = port.parse().map_err(|_| invalid())?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Ok(Handshake {
                server: host.to_string(),
                server_port: port,
            })
        }
        _ => Err(invalid()),
    }
}

fn native_settings(inbound: &Inbound) -> XraySettings {
    let clients = || {
        inbound
            .users
            .iter()
            .map(|u| XrayClient {
                id: u.uuid.clone(),
                password: u.password.clone(),
                email: u.name.clone(),
                flow: u.flow.clone(),
            })
            .collect()
    };

    match inbound.protocol {
        Protocol::Vless => XraySettings {
            clients: clients(),
            decryption: Some("none".to_string()),
            ..XraySettings::default()
        },
        Protocol::Shadowsocks => XraySettings {
            clients: clients(),
            method: inbound.method.clone(),
            password: inbound.password.clone(),
            network: Some("tcp,udp".to_string()),
            ..XraySettings::default()
        },
        Protocol::Socks | Protocol::Http => {
            let accounts: Vec<_> = inbound
                .users
                .iter()
                .map(|u| XrayAccount {
                    user: u.name.clone(),
                    pass: u.password.clone(),
                })
                .collect();
            let auth = (inbound.protocol == Protocol::Socks).then(|| {
                if accounts.is_empty() { "noauth" } else { "password" }.to_string()
            });
            XraySettings {
                udp: auth.as_ref().map(|_| true),
                auth,
                accounts,
                ..XraySettings::default()
            }
        }
        _ => XraySettings {
            clients: clients(),
            ..XraySettings::default()
        },
    }
}

fn native_stream(inbound: &Inbound) -> Option<XrayStream> {
    let tls = inbound.tls.as_ref().filter(|t| t.enabled);
    if inbound.transport.is_none() && tls.is_none() {
        return None;
    }

    let mut stream = XrayStream {
        network: inbound
            .transport
            .as_ref()
            .map_or("tcp", |t| t.kind.as_str())
            .to_string(),
        security: "none".to_string(),
        ..XrayStream::default()
    };

    if let Some(transport) = &inbound.transport {
        match transport.kind {
            TransportKind::Ws => {
                let mut headers = BTreeMap::new();
                if !transport.host.is_empty() {
                    headers.insert("Host".to_string(), transport.host.clone());
                }
                stream.ws_settings = Some(XrayWs {
                    path: transport.path.clone(),
                    host: String::new(),
                    headers,
                });
            }
            TransportKind::Grpc => {
                stream.grpc_settings = Some(XrayGrpc {
                    service_name: transport.service_name.clone(),
                });
            }
            TransportKind::HttpUpgrade => {
                stream.httpupgrade_settings = Some(XrayHttpUpgrade {
                    path: transport.path.clone(),
                    host: transport.host.clone(),
                });
            }
            TransportKind::Http => {
                stream.http_settings = Some(XrayHttp {
                    path: transport.path.clone(),
                    host: if transport.host.is_empty() {
                        Vec::new()
                    } else {
                        vec![transport.host.clone()]
                    },
                });
            }
        }
    }

    if let Some(tls) = tls {
        match tls.reality.as_ref().filter(|r| r.enabled) {
            Some(reality) => {
                let server_name = if reality.server_name.is_empty() {
                    tls.server_name.clone()
                } else {
                    reality.server_name.clone()
                };
                stream.security = "reality".to_string();
                stream.reality_settings = Some(XrayReality {
                    show: false,
                    dest: reality
                        .handshake
                        .as_ref()
                        .map(|h| Value::from(format!("{}:{}", h.server, h.server_port))),
                    server_names: if server_name.is_empty() {
                        Vec::new()
                    } else {
                        vec![server_name]
                    },
                    private_key: reality.private_key.clone(),
                    short_ids: reality.short_ids.clone(),
                    fingerprint: reality.fingerprint.clone(),
                    public_key: reality.public_key.clone(),
                });
            }
            None => {
                stream.security = "tls".to_string();
                stream.tls_settings = Some(XrayTls {
                    server_name: tls.server_name.clone(),
                    alpn: tls.alpn.clone(),
                });
            }
        }
    }

    Some(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::{Brutal, Multiplex};
    use serde_json::json;

    const REALITY_CONFIG: &str = r#"{
        "log": {"loglevel": "warning"},
        "inbounds": [
            {
                "tag": "vless-reality",
                "listen": "0.0.0.0",
                "port": 443,
                "protocol": "vless",
                "settings": {
                    "clients": [{"id": "b831381d-6324-4d53-ad4f-8cda48b30811", "flow": "xtls-rprx-vision", "email": "alice"}],
                    "decryption": "none"
                },
                "streamSettings": {
                    "network": "tcp",
                    "security": "reality",
                    "realitySettings": {
                        "show": false,
                        "dest": "www.microsoft.com:443",
                        "serverNames": ["www.microsoft.com"],
                        "privateKey": "yBaw532IIUNuQWDTncozoBaLJmcd1JZzvsHUgVPxMk8",
                        "shortIds": ["", "0123abcd"]
                    }
                }
            },
            {
                "tag": "api",
                "port": 10085,
                "protocol": "dokodemo-door",
                "settings": {"address": "127.0.0.1"}
            }
        ],
        "routing": {"rules": []}
    }"#;

    fn doc(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn parses_vless_reality() {
        let parsed = XrayCodec.parse(&doc(REALITY_CONFIG)).unwrap();
        assert_eq!(parsed.inbounds.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("dokodemo-door"));

        let inbound = &parsed.inbounds[0];
        assert_eq!(inbound.protocol, Protocol::Vless);
        assert_eq!(inbound.listen_port, 443);
        assert_eq!(inbound.users[0].name, "alice");
        assert_eq!(inbound.users[0].flow, "xtls-rprx-vision");

        let reality = inbound.reality().unwrap();
        assert_eq!(reality.server_name, "www.microsoft.com");
        assert_eq!(reality.short_ids, vec!["", "0123abcd"]);
        let handshake = reality.handshake.as_ref().unwrap();
        assert_eq!(handshake.server, "www.microsoft.com");
        assert_eq!(handshake.server_port, 443);

        let caps: Vec<_> = inbound
            .required_capabilities
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(caps, vec!["reality"]);
    }

    #[test]
    fn missing_optional_user_fields_are_empty() {
        let raw = json!({"inbounds": [{
            "protocol": "trojan", "port": "8443",
            "settings": {"clients": [{"password": "p"}]}
        }]});
        let parsed = XrayCodec.parse(&raw).unwrap();
        let user = &parsed.inbounds[0].users[0];
        assert_eq!(user.password, "p");
        assert_eq!(user.name, "");
        assert_eq!(user.flow, "");
        assert_eq!(parsed.inbounds[0].listen_port, 8443);
    }

    #[test]
    fn shadowsocks_and_socks_users() {
        let raw = json!({"inbounds": [
            {"protocol": "shadowsocks", "port": 8388,
             "settings": {"method": "2022-blake3-aes-128-gcm", "password": "server", "clients": [{"password": "u1", "email": "bob"}]}},
            {"protocol": "socks", "port": 1080,
             "settings": {"auth": "password", "accounts": [{"user": "carol", "pass": "pw"}]}}
        ]});
        let parsed = XrayCodec.parse(&raw).unwrap();
        let ss = &parsed.inbounds[0];
        assert_eq!(ss.method, "2022-blake3-aes-128-gcm");
        assert_eq!(ss.password, "server");
        assert_eq!(ss.users[0].name, "bob");
        let socks = &parsed.inbounds[1];
        assert_eq!(socks.users[0].name, "carol");
        assert_eq!(socks.users[0].password, "pw");
    }

    #[test]
    fn malformed_settings_are_errors() {
        let raw = json!({"inbounds": [
            {"tag": "broken", "protocol": "vless", "port": 443, "settings": {"clients": "oops"}}
        ]});
        let err = XrayCodec.parse(&raw).unwrap_err();
        match err {
            CodecError::InvalidInbound { index, tag, reason } => {
                assert_eq!(index, 0);
                assert_eq!(tag, "broken");
                assert!(reason.starts_with("settings"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reality_without_settings_is_error() {
        let raw = json!({"inbounds": [
            {"protocol": "vless", "port": 443, "streamSettings": {"security": "reality"}}
        ]});
        assert!(matches!(
            XrayCodec.parse(&raw),
            Err(CodecError::InvalidInbound { .. })
        ));
    }

    #[test]
    fn bad_port_is_error() {
        let raw = json!({"inbounds": [{"protocol": "vmess", "port": "1000-2000"}]});
        assert!(XrayCodec.parse(&raw).is_err());
        let raw = json!({"inbounds": [{"protocol": "vmess", "port": 70000}]});
        assert!(XrayCodec.parse(&raw).is_err());
    }

    #[test]
    fn transports_parse() {
        let raw = json!({"inbounds": [
            {"protocol": "vmess", "port": 1, "streamSettings": {"network": "ws", "wsSettings": {"path": "/ws", "headers": {"Host": "cdn.example.com"}}}},
            {"protocol": "vless", "port": 2, "streamSettings": {"network": "grpc", "grpcSettings": {"serviceName": "svc"}}},
            {"protocol": "vless", "port": 3, "streamSettings": {"network": "kcp"}}
        ]});
        let parsed = XrayCodec.parse(&raw).unwrap();
        let ws = parsed.inbounds[0].transport.as_ref().unwrap();
        assert_eq!(ws.kind, TransportKind::Ws);
        assert_eq!(ws.host, "cdn.example.com");
        assert_eq!(
            parsed.inbounds[1].transport.as_ref().unwrap().service_name,
            "svc"
        );
        assert!(parsed.inbounds[2].transport.is_none());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn serialize_drops_unsupported_with_warnings() {
        let mut mux = Inbound::new(Protocol::Trojan, "mux", 443);
        mux.multiplex = Some(Multiplex {
            enabled: true,
            padding: false,
            brutal: Some(Brutal {
                enabled: true,
                up_mbps: 10,
                down_mbps: 10,
            }),
        });
        let hy2 = Inbound::new(Protocol::Hysteria2, "hy2", 8443);

        let native = XrayCodec.to_native(&[mux, hy2]).unwrap();
        assert_eq!(native.inbounds.len(), 1);
        assert_eq!(native.warnings.len(), 3);
        assert!(native.inbounds[0].get("multiplex").is_none());
    }

    #[test]
    fn serialize_reality_shape() {
        let parsed = XrayCodec.parse(&doc(REALITY_CONFIG)).unwrap();
        let native = XrayCodec.to_native(&parsed.inbounds).unwrap();
        let out = &native.inbounds[0];
        assert_eq!(out["protocol"], "vless");
        assert_eq!(out["port"], 443);
        assert_eq!(out["settings"]["decryption"], "none");
        assert_eq!(out["settings"]["clients"][0]["flow"], "xtls-rprx-vision");
        let stream = &out["streamSettings"];
        assert_eq!(stream["security"], "reality");
        assert_eq!(stream["realitySettings"]["dest"], "www.microsoft.com:443");
        assert_eq!(stream["realitySettings"]["serverNames"][0], "www.microsoft.com");
    }

    #[test]
    fn detect_prefers_xray_documents() {
        let score = XrayCodec.detect(&doc(REALITY_CONFIG));
        assert!(score > 0);
        assert_eq!(
            XrayCodec.detect(&json!({"inbounds": [{"type": "vless", "listen_port": 1}]})),
            0
        );
    }
}
