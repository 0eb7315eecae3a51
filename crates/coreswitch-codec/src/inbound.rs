//! Canonical, engine-neutral listener model.
//!
//! Every codec parses its native inbound objects into [`Inbound`] and
//! serializes [`Inbound`] back out. Fields a codec does not know stay at
//! their defaults (empty strings, `None`).

use std::fmt;

use coreswitch_core::{caps, Capability};
use serde::{Deserialize, Serialize};

/// Listener protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// VLESS.
    Vless,
    /// VMess.
    Vmess,
    /// Trojan.
    Trojan,
    /// Shadowsocks.
    Shadowsocks,
    /// SOCKS5.
    Socks,
    /// HTTP proxy.
    Http,
    /// Combined SOCKS and HTTP proxy.
    Mixed,
    /// Hysteria2.
    Hysteria2,
    /// TUIC.
    Tuic,
}

impl Protocol {
    /// Lowercase protocol name as used by both engines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vless => "vless",
            Self::Vmess => "vmess",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "shadowsocks",
            Self::Socks => "socks",
            Self::Http => "http",
            Self::Mixed => "mixed",
            Self::Hysteria2 => "hysteria2",
            Self::Tuic => "tuic",
        }
    }

    /// Look up a protocol by name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "vless" => Self::Vless,
            "vmess" => Self::Vmess,
            "trojan" => Self::Trojan,
            "shadowsocks" | "ss" => Self::Shadowsocks,
            "socks" | "socks5" => Self::Socks,
            "http" => Self::Http,
            "mixed" => Self::Mixed,
            "hysteria2" | "hy2" => Self::Hysteria2,
            "tuic" => Self::Tuic,
            _ => return None,
        })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport kind. Plain TCP has no transport block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// WebSocket.
    Ws,
    /// gRPC.
    Grpc,
    /// HTTPUpgrade.
    HttpUpgrade,
    /// HTTP/2.
    Http,
}

impl TransportKind {
    /// Lowercase transport name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Grpc => "grpc",
            Self::HttpUpgrade => "httpupgrade",
            Self::Http => "http",
        }
    }
}

/// Transport settings; fields unused by the kind stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Transport kind.
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Request path (ws, httpupgrade, http).
    #[serde(default)]
    pub path: String,
    /// Host header (ws, httpupgrade, http).
    #[serde(default)]
    pub host: String,
    /// gRPC service name.
    #[serde(default)]
    pub service_name: String,
}

impl Transport {
    /// A transport of the given kind with empty settings.
    #[must_use]
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            path: String::new(),
            host: String::new(),
            service_name: String::new(),
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tls {
    /// Whether TLS is enabled.
    pub enabled: bool,
    /// SNI served by the listener.
    #[serde(default)]
    pub server_name: String,
    /// ALPN protocols.
    #[serde(default)]
    pub alpn: Vec<String>,
    /// Reality camouflage, if configured.
    #[serde(default)]
    pub reality: Option<Reality>,
}

/// Reality camouflage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reality {
    /// Whether Reality is enabled.
    pub enabled: bool,
    /// Accepted short IDs.
    #[serde(default)]
    pub short_ids: Vec<String>,
    /// Server name borrowed from the handshake target.
    #[serde(default)]
    pub server_name: String,
    /// uTLS fingerprint.
    #[serde(default)]
    pub fingerprint: String,
    /// X25519 public key.
    #[serde(default)]
    pub public_key: String,
    /// X25519 private key.
    #[serde(default)]
    pub private_key: String,
    /// Handshake target server.
    #[serde(default)]
    pub handshake: Option<Handshake>,
}

/// Reality handshake target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Target host.
    pub server: String,
    /// Target port.
    pub server_port: u16,
}

/// Connection multiplexing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiplex {
    /// Whether multiplexing is enabled.
    pub enabled: bool,
    /// Whether padding is required.
    #[serde(default)]
    pub padding: bool,
    /// Brutal congestion control.
    #[serde(default)]
    pub brutal: Option<Brutal>,
}

/// Brutal congestion control settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brutal {
    /// Whether Brutal is enabled.
    pub enabled: bool,
    /// Upload bandwidth in Mbps.
    #[serde(default)]
    pub up_mbps: u32,
    /// Download bandwidth in Mbps.
    #[serde(default)]
    pub down_mbps: u32,
}

/// One listener user; missing optional fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name, email or username.
    #[serde(default)]
    pub name: String,
    /// UUID credential (vless, vmess, tuic).
    #[serde(default)]
    pub uuid: String,
    /// Password credential.
    #[serde(default)]
    pub password: String,
    /// Flow control, e.g. `xtls-rprx-vision`.
    #[serde(default)]
    pub flow: String,
}

/// A canonical proxy listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    /// Listener protocol.
    #[serde(rename = "type")]
    pub protocol: Protocol,
    /// Listener tag.
    #[serde(default)]
    pub tag: String,
    /// Listen address.
    #[serde(default)]
    pub listen: String,
    /// Listen port.
    #[serde(default)]
    pub listen_port: u16,
    /// Transport; `None` is plain TCP.
    #[serde(default)]
    pub transport: Option<Transport>,
    /// TLS settings.
    #[serde(default)]
    pub tls: Option<Tls>,
    /// Multiplex settings.
    #[serde(default)]
    pub multiplex: Option<Multiplex>,
    /// Listener users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Shadowsocks cipher.
    #[serde(default)]
    pub method: String,
    /// Shadowsocks server password.
    #[serde(default)]
    pub password: String,
    /// Capabilities exercised by the populated sub-structures.
    #[serde(default)]
    pub required_capabilities: Vec<Capability>,
}

impl Inbound {
    /// A listener with no optional blocks.
    #[must_use]
    pub fn new(protocol: Protocol, tag: impl Into<String>, listen_port: u16) -> Self {
        Self {
            protocol,
            tag: tag.into(),
            listen: String::new(),
            listen_port,
            transport: None,
            tls: None,
            multiplex: None,
            users: Vec::new(),
            method: String::new(),
            password: String::new(),
            required_capabilities: Vec::new(),
        }
    }

    /// Enabled Reality block, if any.
    #[must_use]
    pub fn reality(&self) -> Option<&Reality> {
        self.tls
            .as_ref()
            .and_then(|tls| tls.reality.as_ref())
            .filter(|r| r.enabled)
    }

    /// Enabled Brutal block, if multiplexing is also enabled.
    #[must_use]
    pub fn brutal(&self) -> Option<&Brutal> {
        self.multiplex
            .as_ref()
            .filter(|m| m.enabled)
            .and_then(|m| m.brutal.as_ref())
            .filter(|b| b.enabled)
    }

    /// Recompute `required_capabilities` from the populated sub-structures.
    pub fn derive_required_capabilities(&mut self) {
        let mut required = Vec::new();
        if self.reality().is_some() {
            required.push(Capability::new(caps::REALITY));
        }
        if self.multiplex.as_ref().is_some_and(|m| m.enabled) {
            required.push(Capability::new(caps::MULTIPLEX));
        }
        if self.brutal().is_some() {
            required.push(Capability::new(caps::BRUTAL));
        }
        self.required_capabilities = required;
    }

    /// Builder-style variant of [`Inbound::derive_required_capabilities`].
    #[must_use]
    pub fn with_derived_capabilities(mut self) -> Self {
        self.derive_required_capabilities();
        self
    }

    /// Tag for messages, falling back to the protocol name.
    #[must_use]
    pub fn display_tag(&self) -> &str {
        if self.tag.is_empty() {
            self.protocol.as_str()
        } else {
            &self.tag
        }
    }
}
