//! Template management and per-agent configuration generation.
//!
//! Validation results are computed when a template's content or engine
//! changes and persisted with it; reads never revalidate.

use std::collections::BTreeSet;

use chrono::Utc;
use coreswitch_core::{
    parse_version, AgentCapabilities, AgentHostId, Compatibility, ConfigHash, CoreEngine,
    CoreError, TemplateId,
};
use coreswitch_store::{AgentHost, ConfigTemplate, Store, StoreError};
use coreswitch_template::{filter_context, validate_final_config, validate_template, AgentInfo};

use crate::context::ContextProvider;
use crate::error::{ControlError, Result};
use crate::types::{CreateTemplateRequest, GeneratedConfig, UpdateTemplateRequest};

fn check_min_version(min_version: &str) -> Result<()> {
    if !min_version.trim().is_empty() {
        parse_version(min_version).map_err(CoreError::from)?;
    }
    Ok(())
}

fn revalidate(template: &mut ConfigTemplate) {
    let report = validate_template(&template.content, template.core_type);
    template.is_valid = report.valid;
    template.validation_error = report.summary();
    if !report.valid {
        tracing::warn!(
            template_id = %template.id,
            errors = report.errors.len(),
            "Template failed validation"
        );
    }
}

/// Get a template by ID.
///
/// # Errors
///
/// Returns `ControlError::TemplateNotFound` if it doesn't exist.
pub fn get_template<S: Store>(store: &S, id: &TemplateId) -> Result<ConfigTemplate> {
    store
        .get_template(id)?
        .ok_or(ControlError::TemplateNotFound(*id))
}

/// Create a template and persist its validation result.
///
/// # Errors
///
/// Returns a validation error for a blank name or an unparsable minimum
/// version. Invalid content is stored with `is_valid == false`.
pub fn create_template<S: Store>(store: &S, request: CreateTemplateRequest) -> Result<ConfigTemplate> {
    if request.name.trim().is_empty() {
        return Err(ControlError::Validation("template name is required".to_string()));
    }
    check_min_version(&request.min_version)?;

    let now = Utc::now();
    let mut template = ConfigTemplate {
        id: TemplateId::generate(),
        name: request.name,
        core_type: request.core_type,
        content: request.content,
        min_version: request.min_version.trim().to_string(),
        capabilities: request.capabilities,
        schema_version: request.schema_version,
        is_valid: false,
        validation_error: None,
        created_at: now,
        updated_at: now,
    };
    revalidate(&mut template);
    store.put_template(&template)?;

    tracing::info!(
        template_id = %template.id,
        core_type = %template.core_type,
        is_valid = template.is_valid,
        "Created template"
    );

    Ok(template)
}

/// Apply a partial update to a template.
///
/// Validation is recomputed only when the content or engine changes.
///
/// # Errors
///
/// Returns `ControlError::TemplateNotFound` if it doesn't exist, or a
/// validation error for a blank name or an unparsable minimum version.
pub fn update_template<S: Store>(
    store: &S,
    id: &TemplateId,
    request: UpdateTemplateRequest,
) -> Result<ConfigTemplate> {
    let mut template = get_template(store, id)?;
    let mut revalidate_needed = false;

    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(ControlError::Validation("template name is required".to_string()));
        }
        template.name = name;
    }
    if let Some(min_version) = request.min_version {
        check_min_version(&min_version)?;
        template.min_version = min_version.trim().to_string();
    }
    if let Some(core_type) = request.core_type {
        revalidate_needed |= core_type != template.core_type;
        template.core_type = core_type;
    }
    if let Some(content) = request.content {
        revalidate_needed |= content != template.content;
        template.content = content;
    }
    if let Some(capabilities) = request.capabilities {
        template.capabilities = capabilities;
    }
    if let Some(schema_version) = request.schema_version {
        template.schema_version = schema_version;
    }

    if revalidate_needed {
        revalidate(&mut template);
    }
    template.updated_at = Utc::now();
    store.put_template(&template)?;

    tracing::info!(
        template_id = %template.id,
        revalidated = revalidate_needed,
        is_valid = template.is_valid,
        "Updated template"
    );

    Ok(template)
}

/// Delete a template that no host has assigned.
///
/// # Errors
///
/// Returns `ControlError::TemplateInUse` while a host has it assigned and
/// `ControlError::TemplateNotFound` if it doesn't exist.
pub fn delete_template<S: Store>(store: &S, id: &TemplateId) -> Result<()> {
    if let Some(host) = store
        .list_agent_hosts()?
        .into_iter()
        .find(|h| h.config_template_id == Some(*id))
    {
        return Err(ControlError::TemplateInUse {
            template_id: *id,
            agent_host_id: host.id,
        });
    }

    store.delete_template(id).map_err(|e| match e {
        StoreError::NotFound => ControlError::TemplateNotFound(*id),
        other => other.into(),
    })?;

    tracing::info!(template_id = %id, "Deleted template");
    Ok(())
}

/// The capability view used to render a configuration for an engine.
///
/// A host's reported version and capabilities describe the engine it runs;
/// for any other engine nothing is known and the view fails closed.
#[must_use]
pub fn capabilities_for(host: &AgentHost, engine: CoreEngine) -> AgentCapabilities {
    if host.core_type == engine {
        host.agent_capabilities()
    } else {
        AgentCapabilities {
            core_type: engine,
            core_version: None,
            capabilities: BTreeSet::new(),
            build_tags: Vec::new(),
        }
    }
}

/// Check a template against an agent's capabilities.
///
/// An engine mismatch is a hard incompatibility.
#[must_use]
pub fn check_compatibility(agent: &AgentCapabilities, template: &ConfigTemplate) -> Compatibility {
    let mut result = agent.check_template_compatibility(&template.min_version, &template.capabilities);
    if agent.core_type != template.core_type {
        result.compatible = false;
        result.errors.insert(
            0,
            format!(
                "template targets {} but the agent runs {}",
                template.core_type, agent.core_type
            ),
        );
    }
    result
}

fn incompatible(template_id: TemplateId, compatibility: Compatibility) -> ControlError {
    let reasons = if compatibility.errors.is_empty() {
        compatibility.warnings
    } else {
        compatibility.errors
    };
    ControlError::Incompatible {
        template_id,
        reasons,
    }
}

fn get_host<S: Store>(store: &S, id: &AgentHostId) -> Result<AgentHost> {
    store
        .get_agent_host(id)?
        .ok_or(ControlError::AgentHostNotFound(*id))
}

/// Check a stored template against a registered host.
///
/// # Errors
///
/// Returns a not-found error for an unknown host or template.
pub fn check_template_compatibility<S: Store>(
    store: &S,
    host_id: &AgentHostId,
    template_id: &TemplateId,
) -> Result<Compatibility> {
    let host = get_host(store, host_id)?;
    let template = get_template(store, template_id)?;
    Ok(check_compatibility(&host.agent_capabilities(), &template))
}

/// Assign a template to a host, or clear the assignment with `None`.
///
/// Assignment is advisory: an incompatible template is still assigned, the
/// findings are logged and returned.
///
/// # Errors
///
/// Returns a not-found error for an unknown host or template.
pub fn assign_template<S: Store>(
    store: &S,
    host_id: &AgentHostId,
    template_id: Option<TemplateId>,
) -> Result<Compatibility> {
    let host = get_host(store, host_id)?;

    let compatibility = match template_id {
        Some(id) => {
            let template = get_template(store, &id)?;
            check_compatibility(&host.agent_capabilities(), &template)
        }
        None => Compatibility {
            compatible: true,
            ..Compatibility::default()
        },
    };

    store.set_agent_host_template(host_id, template_id)?;

    if compatibility.compatible && compatibility.warnings.is_empty() {
        tracing::info!(agent_host_id = %host_id, template_id = ?template_id, "Assigned template");
    } else {
        tracing::warn!(
            agent_host_id = %host_id,
            template_id = ?template_id,
            compatible = compatibility.compatible,
            errors = ?compatibility.errors,
            warnings = ?compatibility.warnings,
            "Assigned template with compatibility findings"
        );
    }

    Ok(compatibility)
}

/// Render a template for a host with a given capability view.
///
/// The node context is filtered to the agent's capabilities, rendered, and
/// checked by the final-config validator.
///
/// # Errors
///
/// Returns an error if the template is invalid or incompatible, rendering
/// fails, or the rendered configuration fails validation.
pub fn render_for_agent(
    contexts: &dyn ContextProvider,
    host: &AgentHost,
    agent: &AgentCapabilities,
    template: &ConfigTemplate,
) -> Result<GeneratedConfig> {
    if !template.is_valid {
        return Err(ControlError::InvalidTemplate {
            template_id: template.id,
            reason: template.validation_error.clone().unwrap_or_default(),
        });
    }

    let compatibility = check_compatibility(agent, template);
    if !compatibility.compatible {
        return Err(incompatible(template.id, compatibility));
    }

    let mut context = contexts.context_for(host)?;
    context.agent = AgentInfo::new(host.id.to_string(), &host.name, agent);

    let mut warnings = compatibility.warnings;
    let (filtered, filter_warnings) = filter_context(agent, &context);
    warnings.extend(filter_warnings);

    let render_context = filtered.to_render_value(template.core_type)?;
    warnings.extend(render_context.warnings);

    let raw = coreswitch_template::render(&template.content, &render_context.value)?;
    let report = validate_final_config(&raw, template.core_type);
    if !report.valid {
        return Err(ControlError::InvalidConfig(report.errors));
    }
    warnings.extend(report.warnings);

    tracing::debug!(
        agent_host_id = %host.id,
        template_id = %template.id,
        warnings = warnings.len(),
        "Rendered configuration"
    );

    Ok(GeneratedConfig {
        template_id: template.id,
        core_type: template.core_type,
        config_hash: ConfigHash::of(raw.as_bytes()),
        raw,
        warnings,
    })
}

/// Render the configuration of a host's assigned template.
///
/// Returns `None` when no template is assigned; the agent keeps its local
/// configuration.
///
/// # Errors
///
/// Returns a not-found error for an unknown host or a dangling template
/// assignment, and the errors of [`render_for_agent`].
pub fn generate_config<S: Store>(
    store: &S,
    contexts: &dyn ContextProvider,
    host_id: &AgentHostId,
) -> Result<Option<GeneratedConfig>> {
    let host = get_host(store, host_id)?;
    let Some(template_id) = host.config_template_id else {
        return Ok(None);
    };
    let template = get_template(store, &template_id)?;
    render_for_agent(contexts, &host, &host.agent_capabilities(), &template).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeProfile;
    use coreswitch_codec::{Brutal, Inbound, Multiplex, Protocol, Tls, User};
    use coreswitch_core::Capability;
    use coreswitch_store::RocksStore;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const SINGBOX_TEMPLATE: &str =
        r#"{"log": {"level": "warn"}, "inbounds": {{inbounds}}, "outbounds": {{outbounds}}}"#;

    fn setup() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn put_host(store: &RocksStore, engine: CoreEngine, version: &str) -> AgentHost {
        let host = AgentHost {
            id: AgentHostId::generate(),
            name: "edge-1".to_string(),
            address: "http://edge-1:7443".to_string(),
            token: String::new(),
            tls: None,
            core_type: engine,
            core_version: Some(version.to_string()),
            capabilities: BTreeSet::new(),
            build_tags: Vec::new(),
            config_template_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.put_agent_host(&host).unwrap();
        host
    }

    fn profile() -> NodeProfile {
        let mut trojan = Inbound::new(Protocol::Trojan, "trojan-in", 443);
        trojan.tls = Some(Tls {
            enabled: true,
            server_name: "node.example.com".to_string(),
            ..Tls::default()
        });
        trojan.multiplex = Some(Multiplex {
            enabled: true,
            padding: false,
            brutal: Some(Brutal {
                enabled: true,
                up_mbps: 100,
                down_mbps: 100,
            }),
        });
        NodeProfile {
            inbounds: vec![trojan],
            outbounds: vec![json!({"type": "direct", "tag": "direct"})],
            users: vec![User {
                name: "alice".to_string(),
                password: "pw".to_string(),
                ..User::default()
            }],
            ..NodeProfile::default()
        }
    }

    #[test]
    fn create_persists_validation_result() {
        let (store, _dir) = setup();

        let valid = create_template(
            &store,
            CreateTemplateRequest::new("ok", CoreEngine::SingBox, SINGBOX_TEMPLATE),
        )
        .unwrap();
        assert!(valid.is_valid);
        assert!(valid.validation_error.is_none());

        let broken = create_template(
            &store,
            CreateTemplateRequest::new("broken", CoreEngine::SingBox, "{{#each inbounds}}"),
        )
        .unwrap();
        assert!(!broken.is_valid);
        assert!(broken
            .validation_error
            .as_deref()
            .unwrap()
            .contains("never closed"));

        let stored = get_template(&store, &broken.id).unwrap();
        assert!(!stored.is_valid);
    }

    #[test]
    fn create_rejects_bad_metadata() {
        let (store, _dir) = setup();

        let mut request = CreateTemplateRequest::new(" ", CoreEngine::Xray, "{}");
        assert!(matches!(
            create_template(&store, request.clone()),
            Err(ControlError::Validation(_))
        ));

        request.name = "t".to_string();
        request.min_version = "one.two".to_string();
        assert!(matches!(
            create_template(&store, request),
            Err(ControlError::Core(CoreError::InvalidVersion(_)))
        ));
    }

    #[test]
    fn update_revalidates_only_on_content_or_engine_change() {
        let (store, _dir) = setup();
        let mut template = create_template(
            &store,
            CreateTemplateRequest::new("t", CoreEngine::SingBox, SINGBOX_TEMPLATE),
        )
        .unwrap();

        // Pretend an older validator rejected it; a rename keeps the stored result.
        template.is_valid = false;
        template.validation_error = Some("stale".to_string());
        store.put_template(&template).unwrap();

        let renamed = update_template(
            &store,
            &template.id,
            UpdateTemplateRequest {
                name: Some("renamed".to_string()),
                ..UpdateTemplateRequest::default()
            },
        )
        .unwrap();
        assert_eq!(renamed.name, "renamed");
        assert!(!renamed.is_valid);

        let retyped = update_template(
            &store,
            &template.id,
            UpdateTemplateRequest {
                core_type: Some(CoreEngine::Xray),
                ..UpdateTemplateRequest::default()
            },
        )
        .unwrap();
        assert!(retyped.is_valid);

        let broken = update_template(
            &store,
            &template.id,
            UpdateTemplateRequest {
                content: Some("{{".to_string()),
                ..UpdateTemplateRequest::default()
            },
        )
        .unwrap();
        assert!(!broken.is_valid);
    }

    #[test]
    fn delete_is_refused_while_assigned() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::SingBox, "1.8.0");
        let template = create_template(
            &store,
            CreateTemplateRequest::new("t", CoreEngine::SingBox, SINGBOX_TEMPLATE),
        )
        .unwrap();
        assign_template(&store, &host.id, Some(template.id)).unwrap();

        assert!(matches!(
            delete_template(&store, &template.id),
            Err(ControlError::TemplateInUse { agent_host_id, .. }) if agent_host_id == host.id
        ));

        assign_template(&store, &host.id, None).unwrap();
        delete_template(&store, &template.id).unwrap();
        assert!(matches!(
            delete_template(&store, &template.id),
            Err(ControlError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn old_agent_scenario() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::SingBox, "1.6.0");
        let mut request = CreateTemplateRequest::new("reality", CoreEngine::SingBox, SINGBOX_TEMPLATE);
        request.min_version = "1.8.0".to_string();
        request.capabilities = vec![Capability::new("reality")];
        let template = create_template(&store, request).unwrap();

        let compatibility = check_template_compatibility(&store, &host.id, &template.id).unwrap();
        assert!(!compatibility.compatible);
        assert!(compatibility.errors[0].contains("version mismatch"));

        // Assignment is advisory.
        let assigned = assign_template(&store, &host.id, Some(template.id)).unwrap();
        assert!(!assigned.compatible);
        let stored = store.get_agent_host(&host.id).unwrap().unwrap();
        assert_eq!(stored.config_template_id, Some(template.id));

        let err = generate_config(&store, &profile(), &host.id).unwrap_err();
        assert!(matches!(err, ControlError::Incompatible { .. }));
        assert_eq!(err.http_status_code(), 409);
    }

    #[test]
    fn unknown_version_blocks_generation() {
        let (store, _dir) = setup();
        let mut host = put_host(&store, CoreEngine::SingBox, "1.8.0");
        host.core_version = None;
        store.put_agent_host(&host).unwrap();

        let mut request = CreateTemplateRequest::new("t", CoreEngine::SingBox, SINGBOX_TEMPLATE);
        request.min_version = "1.5".to_string();
        let template = create_template(&store, request).unwrap();
        assign_template(&store, &host.id, Some(template.id)).unwrap();

        match generate_config(&store, &profile(), &host.id) {
            Err(ControlError::Incompatible { reasons, .. }) => {
                assert!(reasons[0].contains("compatibility unknown"));
            }
            other => panic!("expected incompatibility, got {other:?}"),
        }
    }

    #[test]
    fn engine_mismatch_is_incompatible() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::Xray, "1.8.4");
        let template = create_template(
            &store,
            CreateTemplateRequest::new("t", CoreEngine::SingBox, SINGBOX_TEMPLATE),
        )
        .unwrap();

        let compatibility = check_template_compatibility(&store, &host.id, &template.id).unwrap();
        assert!(!compatibility.compatible);
        assert!(compatibility.errors[0].contains("targets sing-box"));
    }

    #[test]
    fn generate_without_assignment_is_none() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::SingBox, "1.8.0");
        assert!(generate_config(&store, &profile(), &host.id).unwrap().is_none());
        assert!(matches!(
            generate_config(&store, &profile(), &AgentHostId::generate()),
            Err(ControlError::AgentHostNotFound(_))
        ));
    }

    #[test]
    fn generate_degrades_unsupported_features() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::SingBox, "1.6.0");
        let template = create_template(
            &store,
            CreateTemplateRequest::new("t", CoreEngine::SingBox, SINGBOX_TEMPLATE),
        )
        .unwrap();
        assign_template(&store, &host.id, Some(template.id)).unwrap();

        let generated = generate_config(&store, &profile(), &host.id)
            .unwrap()
            .unwrap();
        assert!(generated.warnings.iter().any(|w| w.contains("brutal")));
        assert_eq!(generated.config_hash, ConfigHash::of(generated.raw.as_bytes()));

        let doc: Value = serde_json::from_str(&generated.raw).unwrap();
        let inbound = &doc["inbounds"][0];
        assert_eq!(inbound["type"], "trojan");
        assert_eq!(inbound["users"][0]["name"], "alice");
        assert_eq!(inbound["multiplex"]["enabled"], true);
        assert!(inbound["multiplex"].get("brutal").is_none());
    }

    #[test]
    fn invalid_template_is_not_rendered() {
        let (store, _dir) = setup();
        let host = put_host(&store, CoreEngine::SingBox, "1.8.0");
        let template = create_template(
            &store,
            CreateTemplateRequest::new("t", CoreEngine::SingBox, "{{oops"),
        )
        .unwrap();
        assign_template(&store, &host.id, Some(template.id)).unwrap();

        assert!(matches!(
            generate_config(&store, &profile(), &host.id),
            Err(ControlError::InvalidTemplate { .. })
        ));
    }
}
