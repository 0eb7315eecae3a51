//! Authoring-time and render-time configuration checks.

use std::collections::{BTreeMap, HashSet};

use coreswitch_core::CoreEngine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::Template;
use crate::sample::sample_context;

/// sing-box listener types that do not bind a port.
const PORTLESS_SINGBOX_TYPES: &[&str] = &["tun"];

/// Outcome of checking template content in isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when `errors` is empty.
    pub valid: bool,
    /// Everything that makes the template unusable.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// The first error joined with a count of the rest, for persisting.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        match self.errors.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            [first, rest @ ..] => Some(format!("{first} (and {} more)", rest.len())),
        }
    }
}

/// Outcome of checking a fully rendered configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalConfigReport {
    /// True when `errors` is empty.
    pub valid: bool,
    /// Problems the engine would reject.
    pub errors: Vec<String>,
    /// Suspicious but loadable content.
    pub warnings: Vec<String>,
}

/// Check template content for an engine.
///
/// The template is compiled, rendered against the built-in sample context,
/// and the output is run through [`validate_final_config`]. Only errors are
/// reported; warnings from the sample render are not the template's fault.
#[must_use]
pub fn validate_template(content: &str, engine: CoreEngine) -> ValidationReport {
    let errors = template_errors(content, engine);
    tracing::debug!(
        engine = %engine,
        errors = errors.len(),
        "Validated template"
    );
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn template_errors(content: &str, engine: CoreEngine) -> Vec<String> {
    if content.trim().is_empty() {
        return vec!["template content is empty".to_string()];
    }

    let template = match Template::compile(content) {
        Ok(template) => template,
        Err(e) => return vec![e.to_string()],
    };

    let rendered = sample_context(engine)
        .to_render_value(engine)
        .and_then(|ctx| template.render(&ctx.value));
    match rendered {
        Ok(text) => validate_final_config(&text, engine).errors,
        Err(e) => vec![format!("render with sample data failed: {e}")],
    }
}

/// Check rendered configuration text against the engine's structure.
///
/// This is the last gate before a configuration is sent to an agent.
#[must_use]
pub fn validate_final_config(rendered: &str, engine: CoreEngine) -> FinalConfigReport {
    let mut report = FinalConfigReport::default();
    check_document(rendered, engine, &mut report);
    report.valid = report.errors.is_empty();
    report
}

fn check_document(rendered: &str, engine: CoreEngine, report: &mut FinalConfigReport) {
    let doc: Value = match serde_json::from_str(rendered) {
        Ok(doc) => doc,
        Err(e) => {
            report.errors.push(format!("rendered config is not valid JSON: {e}"));
            return;
        }
    };
    let Some(root) = doc.as_object() else {
        report
            .errors
            .push("top level must be a JSON object".to_string());
        return;
    };

    match root.get("inbounds") {
        None => report
            .errors
            .push("missing required key \"inbounds\"".to_string()),
        Some(Value::Array(items)) => check_inbounds(items, engine, report),
        Some(_) => report.errors.push("\"inbounds\" must be an array".to_string()),
    }

    match root.get("outbounds") {
        None => report
            .warnings
            .push("no \"outbounds\" defined; engine defaults apply".to_string()),
        Some(Value::Array(items)) => check_outbounds(items, engine, report),
        Some(_) => report
            .errors
            .push("\"outbounds\" must be an array".to_string()),
    }

    // Structural errors above already cover what the codec would report.
    if report.errors.is_empty() {
        match coreswitch_codec::parse(rendered.as_bytes(), engine) {
            Ok(parsed) => report.warnings.extend(parsed.warnings),
            Err(e) => report.errors.push(e.to_string()),
        }
    }
}

fn kind_key(engine: CoreEngine) -> &'static str {
    match engine {
        CoreEngine::Xray => "protocol",
        CoreEngine::SingBox => "type",
    }
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn check_port(label: &str, value: &Value) -> Result<u16, String> {
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match port.and_then(|p| u16::try_from(p).ok()) {
        Some(p) if p > 0 => Ok(p),
        _ => Err(format!("{label}: port {value} is not in 1..=65535")),
    }
}

fn check_inbounds(items: &[Value], engine: CoreEngine, report: &mut FinalConfigReport) {
    let kind_key = kind_key(engine);
    let port_key = match engine {
        CoreEngine::Xray => "port",
        CoreEngine::SingBox => "listen_port",
    };

    let mut tags = HashSet::new();
    let mut bindings: BTreeMap<(String, u16), Vec<String>> = BTreeMap::new();

    for (index, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            report
                .errors
                .push(format!("inbounds[{index}] must be an object"));
            continue;
        };
        let tag = non_empty_str(object, "tag").unwrap_or_default();
        let label = if tag.is_empty() {
            format!("inbounds[{index}]")
        } else {
            format!("inbounds[{index}] ({tag})")
        };

        let Some(kind) = non_empty_str(object, kind_key) else {
            report.errors.push(format!("{label}: missing \"{kind_key}\""));
            continue;
        };

        if !tag.is_empty() && !tags.insert(tag.to_string()) {
            report.errors.push(format!("{label}: duplicate tag {tag:?}"));
        }

        let needs_port =
            engine == CoreEngine::Xray || !PORTLESS_SINGBOX_TYPES.contains(&kind);
        match object.get(port_key) {
            None if needs_port => report
                .errors
                .push(format!("{label}: missing \"{port_key}\"")),
            None => {}
            Some(value) => match check_port(&label, value) {
                Ok(port) => {
                    let listen = non_empty_str(object, "listen").unwrap_or("*");
                    bindings
                        .entry((listen.to_string(), port))
                        .or_default()
                        .push(label);
                }
                Err(e) => report.errors.push(e),
            },
        }
    }

    for ((listen, port), users) in bindings {
        if users.len() > 1 {
            report.warnings.push(format!(
                "{} share {listen}:{port}; only distinct transports can coexist",
                users.join(", ")
            ));
        }
    }
}

fn check_outbounds(items: &[Value], engine: CoreEngine, report: &mut FinalConfigReport) {
    let kind_key = kind_key(engine);
    for (index, item) in items.iter().enumerate() {
        match item.as_object() {
            None => report
                .errors
                .push(format!("outbounds[{index}] must be an object")),
            Some(object) if non_empty_str(object, kind_key).is_none() => report
                .errors
                .push(format!("outbounds[{index}]: missing \"{kind_key}\"")),
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGBOX_TEMPLATE: &str = r#"{
  "log": {"level": {{server.log_level}}},
  "inbounds": {{inbounds}},
  "outbounds": {{outbounds}}
}"#;

    const XRAY_TEMPLATE: &str = r#"{
  "log": {"loglevel": {{server.log_level}}},
  "inbounds": [
{{#each inbounds}}{{#unless @first}},{{/unless}}    {{this}}
{{/each}}  ],
  "outbounds": {{outbounds}}
}"#;

    #[test]
    fn well_formed_templates_validate() {
        let report = validate_template(SINGBOX_TEMPLATE, CoreEngine::SingBox);
        assert!(report.valid, "{:?}", report.errors);
        let report = validate_template(XRAY_TEMPLATE, CoreEngine::Xray);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.summary(), None);
    }

    #[test]
    fn template_errors_are_reported() {
        let report = validate_template("  ", CoreEngine::Xray);
        assert!(!report.valid);

        let report = validate_template("{{#each inbounds}}", CoreEngine::Xray);
        assert!(report.errors[0].contains("never closed"));

        let report = validate_template(r#"{"inbounds": {{agent.region}}}"#, CoreEngine::Xray);
        assert!(report.errors[0].contains("agent.region"));

        let report = validate_template(r#"{"outbounds": []}"#, CoreEngine::SingBox);
        assert!(!report.valid);
        assert!(report.errors[0].contains("inbounds"));
    }

    #[test]
    fn summary_counts_additional_errors() {
        let report = ValidationReport {
            valid: false,
            errors: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(report.summary().as_deref(), Some("a (and 2 more)"));
    }

    #[test]
    fn final_config_rejects_non_documents() {
        let report = validate_final_config("{not json", CoreEngine::Xray);
        assert!(!report.valid);
        assert!(report.errors[0].contains("not valid JSON"));

        let report = validate_final_config("[]", CoreEngine::Xray);
        assert_eq!(report.errors, vec!["top level must be a JSON object"]);

        let report = validate_final_config(r#"{"inbounds": {}}"#, CoreEngine::SingBox);
        assert_eq!(report.errors, vec!["\"inbounds\" must be an array"]);
    }

    #[test]
    fn xray_inbounds_need_protocol_and_port() {
        let report = validate_final_config(
            r#"{"inbounds": [{"tag": "a", "port": 443}, {"tag": "b", "protocol": "vless"}, 7],
                "outbounds": [{"protocol": "freedom"}]}"#,
            CoreEngine::Xray,
        );
        assert_eq!(
            report.errors,
            vec![
                "inbounds[0] (a): missing \"protocol\"",
                "inbounds[1] (b): missing \"port\"",
                "inbounds[2] must be an object",
            ]
        );
    }

    #[test]
    fn ports_must_be_in_range() {
        let report = validate_final_config(
            r#"{"inbounds": [
                {"type": "trojan", "tag": "zero", "listen_port": 0},
                {"type": "trojan", "tag": "big", "listen_port": 70000},
                {"type": "tun", "tag": "tun-in"}
            ], "outbounds": [{"type": "direct"}]}"#,
            CoreEngine::SingBox,
        );
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("zero"));
        assert!(report.errors[1].contains("big"));
    }

    #[test]
    fn duplicate_tags_fail_and_shared_ports_warn() {
        let report = validate_final_config(
            r#"{"inbounds": [
                {"type": "trojan", "tag": "a", "listen_port": 443},
                {"type": "hysteria2", "tag": "a", "listen_port": 8443},
                {"type": "hysteria2", "tag": "c", "listen_port": 443}
            ], "outbounds": [{"type": "direct"}]}"#,
            CoreEngine::SingBox,
        );
        assert_eq!(report.errors, vec!["inbounds[1] (a): duplicate tag \"a\""]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("*:443"));
    }

    #[test]
    fn outbounds_are_checked() {
        let report = validate_final_config(
            r#"{"inbounds": [], "outbounds": [{"tag": "x"}, "direct"]}"#,
            CoreEngine::SingBox,
        );
        assert_eq!(
            report.errors,
            vec![
                "outbounds[0]: missing \"type\"",
                "outbounds[1] must be an object",
            ]
        );

        let report = validate_final_config(r#"{"inbounds": []}"#, CoreEngine::Xray);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn codec_findings_are_merged() {
        let report = validate_final_config(
            r#"{"inbounds": [{"type": "trojan", "tag": "bad", "listen_port": 443, "tls": "yes"}],
                "outbounds": [{"type": "direct"}]}"#,
            CoreEngine::SingBox,
        );
        assert!(!report.valid);
        assert!(report.errors[0].contains("bad"));

        let report = validate_final_config(
            r#"{"inbounds": [{"protocol": "dokodemo-door", "tag": "api", "port": 10085}],
                "outbounds": [{"protocol": "freedom"}]}"#,
            CoreEngine::Xray,
        );
        assert!(report.valid);
        assert!(report.warnings[0].contains("dokodemo-door"));
    }
}
