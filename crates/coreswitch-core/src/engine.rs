//! Supported proxy core engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A proxy-server runtime with its own native JSON configuration schema.
///
/// Codecs and capability tables match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoreEngine {
    /// Xray-core.
    Xray,
    /// sing-box.
    SingBox,
}

impl CoreEngine {
    /// All supported engines.
    pub const ALL: [Self; 2] = [Self::Xray, Self::SingBox];

    /// Canonical lowercase name of the engine.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Xray => "xray",
            Self::SingBox => "sing-box",
        }
    }
}

impl fmt::Display for CoreEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreEngine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xray" | "xray-core" | "xray_core" => Ok(Self::Xray),
            "sing-box" | "singbox" | "sing_box" => Ok(Self::SingBox),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}

/// Returned when an engine name does not match any supported engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown core engine: {0:?}")]
pub struct UnknownEngine(pub String);
