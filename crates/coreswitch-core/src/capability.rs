//! Capability model for agent core engines.
//!
//! An agent either self-reports the optional features its core build supports,
//! or only reports its engine and version. In the latter case the capability
//! set is derived from a static, versioned table. The table is immutable data
//! compiled into the binary.
//!
//! Derivation fails closed: a missing or unparsable version yields the empty
//! set, never "everything".

use std::collections::BTreeSet;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::engine::CoreEngine;

/// Well-known capability tokens.
pub mod caps {
    /// Reality TLS camouflage.
    pub const REALITY: &str = "reality";
    /// Inbound connection multiplexing.
    pub const MULTIPLEX: &str = "multiplex";
    /// Brutal congestion control on multiplexed connections.
    pub const BRUTAL: &str = "brutal";
    /// XTLS Vision flow.
    pub const VISION: &str = "vision";
    /// VLESS protocol.
    pub const VLESS: &str = "vless";
    /// VMess protocol.
    pub const VMESS: &str = "vmess";
    /// Trojan protocol.
    pub const TROJAN: &str = "trojan";
    /// Shadowsocks protocol.
    pub const SHADOWSOCKS: &str = "shadowsocks";
    /// Hysteria2 protocol.
    pub const HYSTERIA2: &str = "hysteria2";
    /// TUIC protocol.
    pub const TUIC: &str = "tuic";
    /// WebSocket transport.
    pub const WS: &str = "ws";
    /// gRPC transport.
    pub const GRPC: &str = "grpc";
    /// HTTPUpgrade transport.
    pub const HTTPUPGRADE: &str = "httpupgrade";
}

/// A named optional feature of a core engine build.
///
/// Tokens are normalized on construction: surrounding whitespace is trimmed,
/// ASCII is lowercased, and `-` or spaces become `_`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Create a normalized capability token.
    #[must_use]
    pub fn new(token: &str) -> Self {
        let normalized = token
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self(normalized)
    }

    /// Return the normalized token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.0
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from parsing a core version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The version string is empty.
    #[error("version is empty")]
    Empty,

    /// The version string is not a semantic version.
    #[error("invalid version {input:?}: {reason}")]
    Invalid {
        /// The rejected input.
        input: String,
        /// Parser message.
        reason: String,
    },
}

/// Parse a core version leniently.
///
/// Accepts a leading `v` and pads one- or two-component versions, so `v1.8`
/// parses as `1.8.0`. Pre-release suffixes are kept and order below the
/// release.
///
/// # Errors
///
/// Returns `VersionError` if the input is empty or not a version.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(VersionError::Empty);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (numeric, suffix) = trimmed.split_at(split);
    let padded = match numeric.split('.').count() {
        1 => format!("{numeric}.0.0{suffix}"),
        2 => format!("{numeric}.0{suffix}"),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|e| VersionError::Invalid {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// One row of the static capability table.
#[derive(Debug)]
struct CapabilityRule {
    engine: CoreEngine,
    since: Version,
    capability: &'static str,
    build_tag: Option<&'static str>,
}

const fn rule(
    engine: CoreEngine,
    since: (u64, u64, u64),
    capability: &'static str,
    build_tag: Option<&'static str>,
) -> CapabilityRule {
    CapabilityRule {
        engine,
        since: Version::new(since.0, since.1, since.2),
        capability,
        build_tag,
    }
}

const TAG_REALITY_SERVER: Option<&str> = Some("with_reality_server");
const TAG_QUIC: Option<&str> = Some("with_quic");

static CAPABILITY_TABLE: [CapabilityRule; 22] = [
    rule(CoreEngine::Xray, (1, 0, 0), caps::VLESS, None),
    rule(CoreEngine::Xray, (1, 0, 0), caps::VMESS, None),
    rule(CoreEngine::Xray, (1, 0, 0), caps::TROJAN, None),
    rule(CoreEngine::Xray, (1, 0, 0), caps::SHADOWSOCKS, None),
    rule(CoreEngine::Xray, (1, 0, 0), caps::WS, None),
    rule(CoreEngine::Xray, (1, 0, 0), caps::GRPC, None),
    rule(CoreEngine::Xray, (1, 8, 0), caps::REALITY, None),
    rule(CoreEngine::Xray, (1, 8, 0), caps::VISION, None),
    rule(CoreEngine::Xray, (1, 8, 4), caps::HTTPUPGRADE, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::VLESS, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::VMESS, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::TROJAN, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::SHADOWSOCKS, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::WS, None),
    rule(CoreEngine::SingBox, (1, 0, 0), caps::GRPC, None),
    rule(CoreEngine::SingBox, (1, 2, 0), caps::REALITY, TAG_REALITY_SERVER),
    rule(CoreEngine::SingBox, (1, 2, 0), caps::VISION, None),
    rule(CoreEngine::SingBox, (1, 3, 0), caps::MULTIPLEX, None),
    rule(CoreEngine::SingBox, (1, 3, 0), caps::TUIC, TAG_QUIC),
    rule(CoreEngine::SingBox, (1, 5, 0), caps::HYSTERIA2, TAG_QUIC),
    rule(CoreEngine::SingBox, (1, 7, 0), caps::BRUTAL, None),
    rule(CoreEngine::SingBox, (1, 7, 0), caps::HTTPUPGRADE, None),
];

/// Derive the capability set of an engine build from its version.
///
/// When `build_tags` is empty the build is assumed to be an official full
/// build and tag requirements are ignored. An unparsable version yields the
/// empty set.
#[must_use]
pub fn derive_capabilities(
    engine: CoreEngine,
    version: &str,
    build_tags: &[String],
) -> BTreeSet<Capability> {
    let Ok(version) = parse_version(version) else {
        return BTreeSet::new();
    };

    CAPABILITY_TABLE
        .iter()
        .filter(|r| r.engine == engine && version >= r.since)
        .filter(|r| match r.build_tag {
            Some(tag) if !build_tags.is_empty() => build_tags.iter().any(|t| t == tag),
            _ => true,
        })
        .map(|r| Capability::new(r.capability))
        .collect()
}

/// Outcome of comparing an agent version against a minimum requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSupport {
    /// No minimum is required, or the agent meets it.
    Supported,
    /// The agent reports a version below the minimum.
    TooOld {
        /// The minimum version required.
        required: String,
        /// The version the agent reports.
        actual: String,
    },
    /// The agent did not report a usable version.
    Unknown {
        /// The minimum version required.
        required: String,
    },
}

/// Result of checking a template's requirements against an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    /// Whether the template may be rendered for the agent.
    pub compatible: bool,
    /// Soft findings (missing optional capabilities, unknown version).
    pub warnings: Vec<String>,
    /// Hard findings that make the template incompatible.
    pub errors: Vec<String>,
}

/// What a running agent's core engine supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Engine running on the agent.
    pub core_type: CoreEngine,
    /// Reported engine version, if any.
    #[serde(default)]
    pub core_version: Option<String>,
    /// Self-reported capability set.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Build tags of the engine binary.
    #[serde(default)]
    pub build_tags: Vec<String>,
}

impl AgentCapabilities {
    /// Capabilities for an engine with a known version and no self-report.
    #[must_use]
    pub fn new(core_type: CoreEngine, core_version: impl Into<String>) -> Self {
        Self {
            core_type,
            core_version: Some(core_version.into()),
            capabilities: BTreeSet::new(),
            build_tags: Vec::new(),
        }
    }

    /// The capability set used for every compatibility decision.
    ///
    /// An empty self-report with a known version is replaced by the derived
    /// set; an empty self-report without a version stays empty.
    #[must_use]
    pub fn effective(&self) -> BTreeSet<Capability> {
        if !self.capabilities.is_empty() {
            return self.capabilities.clone();
        }
        match self.core_version.as_deref() {
            Some(version) if !version.trim().is_empty() => {
                derive_capabilities(self.core_type, version, &self.build_tags)
            }
            _ => BTreeSet::new(),
        }
    }

    /// Return a copy whose `capabilities` holds the effective set.
    #[must_use]
    pub fn resolved(&self) -> Self {
        Self {
            capabilities: self.effective(),
            ..self.clone()
        }
    }

    /// Check whether the agent supports a capability token.
    #[must_use]
    pub fn supports_capability(&self, capability: &str) -> bool {
        self.effective().contains(&Capability::new(capability))
    }

    /// Compare the agent version against a minimum version.
    ///
    /// An empty `min_version` is always supported.
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if `min_version` itself is not a version.
    pub fn version_support(&self, min_version: &str) -> Result<VersionSupport, VersionError> {
        if min_version.trim().is_empty() {
            return Ok(VersionSupport::Supported);
        }
        let required = parse_version(min_version)?;

        let actual = self
            .core_version
            .as_deref()
            .and_then(|v| parse_version(v).ok().map(|parsed| (v, parsed)));

        Ok(match actual {
            None => VersionSupport::Unknown {
                required: required.to_string(),
            },
            Some((_, parsed)) if parsed >= required => VersionSupport::Supported,
            Some((raw, _)) => VersionSupport::TooOld {
                required: required.to_string(),
                actual: raw.to_string(),
            },
        })
    }

    /// Check whether the agent satisfies a minimum version.
    ///
    /// Unknown agent versions never satisfy a non-empty minimum, and neither
    /// does an unparsable minimum.
    #[must_use]
    pub fn supports_version(&self, min_version: &str) -> bool {
        matches!(
            self.version_support(min_version),
            Ok(VersionSupport::Supported)
        )
    }

    /// Check a template's declared minimum version and capability list.
    ///
    /// A version that is too old, an unknown agent version, or an invalid
    /// minimum makes the template incompatible. Missing capabilities are
    /// only warnings, because the capability filter degrades those features.
    #[must_use]
    pub fn check_template_compatibility(
        &self,
        min_version: &str,
        required: &[Capability],
    ) -> Compatibility {
        let mut result = Compatibility {
            compatible: true,
            ..Compatibility::default()
        };

        match self.version_support(min_version) {
            Ok(VersionSupport::Supported) => {}
            Ok(VersionSupport::TooOld { required, actual }) => {
                result.compatible = false;
                result.errors.push(format!(
                    "version mismatch: template requires {} >= {required}, agent runs {actual}",
                    self.core_type
                ));
            }
            Ok(VersionSupport::Unknown { required }) => {
                result.compatible = false;
                result.warnings.push(format!(
                    "compatibility unknown: agent has not reported a {} version, template requires >= {required}",
                    self.core_type
                ));
            }
            Err(e) => {
                result.compatible = false;
                result
                    .errors
                    .push(format!("template minimum version is invalid: {e}"));
            }
        }

        let effective = self.effective();
        for capability in required {
            if !effective.contains(capability) {
                result.warnings.push(format!(
                    "agent does not support capability {capability:?}; the feature will be disabled"
                ));
            }
        }

        result
    }
}
