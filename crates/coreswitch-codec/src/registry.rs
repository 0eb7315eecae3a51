//! Engine-name dispatch and cross-engine conversion.

use coreswitch_core::CoreEngine;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{Codec, Native, Parsed};
use crate::error::{CodecError, Result};
use crate::inbound::Inbound;
use crate::singbox::SingBoxCodec;
use crate::xray::XrayCodec;

/// Output of a conversion: native configuration text plus dropped-field warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Converted {
    /// Pretty-printed native JSON.
    pub raw: String,
    /// Listeners or fields that had no equivalent in the target engine.
    pub warnings: Vec<String>,
}

/// The codec for an engine.
#[must_use]
pub fn codec(engine: CoreEngine) -> &'static dyn Codec {
    match engine {
        CoreEngine::Xray => &XrayCodec,
        CoreEngine::SingBox => &SingBoxCodec,
    }
}

/// Resolve a caller-supplied engine name.
///
/// # Errors
///
/// Returns `MissingEngine` for a blank name and `UnknownEngine` for an
/// unsupported one.
pub fn engine_from_name(name: &str, role: &'static str) -> Result<CoreEngine> {
    if name.trim().is_empty() {
        return Err(CodecError::MissingEngine(role));
    }
    Ok(name.parse()?)
}

fn decode(raw: &[u8]) -> Result<Value> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::EmptyInput);
    }
    serde_json::from_slice(raw).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Parse native configuration bytes of the given engine.
///
/// # Errors
///
/// Returns an error for empty input, invalid JSON, or a malformed listener.
pub fn parse(raw: &[u8], engine: CoreEngine) -> Result<Parsed> {
    let doc = decode(raw)?;
    let parsed = codec(engine).parse(&doc)?;
    tracing::debug!(
        engine = %engine,
        inbounds = parsed.inbounds.len(),
        warnings = parsed.warnings.len(),
        "Parsed configuration"
    );
    Ok(parsed)
}

/// Parse a named configuration file; errors carry the file name.
///
/// # Errors
///
/// Same as [`parse`], wrapped in `CodecError::InFile`.
pub fn parse_file(file: &str, raw: &[u8], engine: CoreEngine) -> Result<Parsed> {
    parse(raw, engine).map_err(|e| CodecError::InFile {
        file: file.to_string(),
        source: Box::new(e),
    })
}

/// Render canonical listeners as native inbound objects.
///
/// # Errors
///
/// Returns an error if a listener cannot be encoded.
pub fn to_native(inbounds: &[Inbound], engine: CoreEngine) -> Result<Native> {
    codec(engine).to_native(inbounds)
}

/// Serialize canonical listeners into a native configuration document.
///
/// Conversion is lossy: anything the target cannot express is dropped and
/// reported in the warnings.
///
/// # Errors
///
/// Returns an error if the output cannot be encoded.
pub fn convert(inbounds: &[Inbound], engine: CoreEngine) -> Result<Converted> {
    let native = to_native(inbounds, engine)?;
    let doc = serde_json::json!({ "inbounds": native.inbounds });
    let raw =
        serde_json::to_string_pretty(&doc).map_err(|e| CodecError::Serialization(e.to_string()))?;
    Ok(Converted {
        raw,
        warnings: native.warnings,
    })
}

/// Convert a configuration between engines by name.
///
/// Parse warnings come first, followed by conversion warnings.
///
/// # Errors
///
/// Returns an error if either engine name is blank or unknown, the input is
/// empty, or parsing fails.
pub fn convert_config(source: &str, target: &str, raw: &[u8]) -> Result<Converted> {
    let source = engine_from_name(source, "source")?;
    let target = engine_from_name(target, "target")?;
    let parsed = parse(raw, source)?;
    let mut converted = convert(&parsed.inbounds, target)?;

    let mut warnings = parsed.warnings;
    warnings.append(&mut converted.warnings);
    converted.warnings = warnings;

    tracing::info!(
        source = %source,
        target = %target,
        warnings = converted.warnings.len(),
        "Converted configuration"
    );
    Ok(converted)
}

/// Guess the engine of a configuration document.
///
/// Returns `None` when neither codec recognizes it or the scores tie.
#[must_use]
pub fn detect_engine(raw: &[u8]) -> Option<CoreEngine> {
    let doc = decode(raw).ok()?;
    let mut scores: Vec<_> = CoreEngine::ALL
        .iter()
        .map(|&engine| (codec(engine).detect(&doc), engine))
        .filter(|(score, _)| *score > 0)
        .collect();
    scores.sort_by(|a, b| b.0.cmp(&a.0));

    match scores.as_slice() {
        [] => None,
        [(_, only)] => Some(*only),
        [(best, engine), (second, _), ..] => (best > second).then_some(*engine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::Protocol;

    const SINGBOX_MUX: &str = r#"{
        "inbounds": [{
            "type": "trojan", "tag": "trojan-in", "listen_port": 443,
            "users": [{"name": "a", "password": "p"}],
            "tls": {"enabled": true, "server_name": "example.com"},
            "multiplex": {"enabled": true, "brutal": {"enabled": true, "up_mbps": 50, "down_mbps": 50}}
        }]
    }"#;

    const XRAY_WS: &str = r#"{
        "inbounds": [{
            "tag": "vmess-ws", "port": 8080, "protocol": "vmess",
            "settings": {"clients": [{"id": "b831381d-6324-4d53-ad4f-8cda48b30811", "email": "x"}]},
            "streamSettings": {"network": "ws", "wsSettings": {"path": "/v"}}
        }],
        "routing": {}
    }"#;

    #[test]
    fn convert_config_requires_input_and_engines() {
        assert_eq!(
            convert_config("xray", "sing-box", b"  "),
            Err(CodecError::EmptyInput)
        );
        assert_eq!(
            convert_config("", "sing-box", b"{}"),
            Err(CodecError::MissingEngine("source"))
        );
        assert!(matches!(
            convert_config("xray", "clash", b"{}"),
            Err(CodecError::UnknownEngine(_))
        ));
        assert!(matches!(
            convert_config("xray", "sing-box", b"{not json"),
            Err(CodecError::InvalidJson(_))
        ));
    }

    #[test]
    fn engine_names_are_case_insensitive() {
        let converted = convert_config("XRAY", "SingBox", XRAY_WS.as_bytes()).unwrap();
        let doc: Value = serde_json::from_str(&converted.raw).unwrap();
        assert_eq!(doc["inbounds"][0]["type"], "vmess");
        assert_eq!(doc["inbounds"][0]["transport"]["path"], "/v");
    }

    #[test]
    fn lossy_round_trip_warns_and_drops() {
        let to_xray = convert_config("sing-box", "xray", SINGBOX_MUX.as_bytes()).unwrap();
        assert!(to_xray.warnings.iter().any(|w| w.contains("multiplex")));
        assert!(to_xray.warnings.iter().any(|w| w.contains("brutal")));

        let back = parse(to_xray.raw.as_bytes(), CoreEngine::Xray).unwrap();
        let inbound = &back.inbounds[0];
        assert_eq!(inbound.protocol, Protocol::Trojan);
        assert!(inbound.multiplex.is_none());
        assert!(inbound.required_capabilities.is_empty());
        assert_eq!(inbound.tls.as_ref().unwrap().server_name, "example.com");
        assert_eq!(inbound.users[0].password, "p");
    }

    #[test]
    fn parse_file_names_the_file() {
        let err = parse_file("edge.json", b"[]", CoreEngine::Xray).unwrap_err();
        assert!(err.to_string().starts_with("edge.json: "));
        assert!(err.is_validation());
    }

    #[test]
    fn detects_engines() {
        assert_eq!(detect_engine(XRAY_WS.as_bytes()), Some(CoreEngine::Xray));
        assert_eq!(detect_engine(SINGBOX_MUX.as_bytes()), Some(CoreEngine::SingBox));
        assert_eq!(detect_engine(b"{}"), None);
        assert_eq!(detect_engine(b"not json"), None);
    }
}
