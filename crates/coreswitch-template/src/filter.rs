//! Capability filter.
//!
//! Degrades listeners to what an agent can run: a feature block whose
//! capability the agent lacks is removed and a warning is recorded. The
//! listener itself is always kept; validation downstream decides whether
//! what is left is usable.

use coreswitch_codec::Inbound;
use coreswitch_core::{caps, AgentCapabilities, Capability};

use crate::context::ConfigContext;

/// Strip unsupported feature blocks from every inbound of a context.
///
/// Required capabilities are recomputed before and after filtering, so the
/// result never claims a capability that is not backed by a populated block,
/// nor one the agent lacks.
#[must_use]
pub fn filter_context(
    agent: &AgentCapabilities,
    ctx: &ConfigContext,
) -> (ConfigContext, Vec<String>) {
    let mut filtered = ctx.clone();
    let mut warnings = Vec::new();
    for inbound in &mut filtered.inbounds {
        warnings.extend(filter_inbound(agent, inbound));
    }
    (filtered, warnings)
}

/// Filter one inbound in place and return the warnings.
pub fn filter_inbound(agent: &AgentCapabilities, inbound: &mut Inbound) -> Vec<String> {
    let supported = agent.effective();
    let mut warnings = Vec::new();

    inbound.derive_required_capabilities();
    let missing: Vec<Capability> = inbound
        .required_capabilities
        .iter()
        .filter(|cap| !supported.contains(*cap))
        .cloned()
        .collect();

    for cap in missing {
        let removed = match cap.as_str() {
            caps::REALITY => inbound
                .tls
                .as_mut()
                .and_then(|tls| tls.reality.take())
                .is_some(),
            caps::MULTIPLEX => inbound.multiplex.take().is_some(),
            caps::BRUTAL => inbound
                .multiplex
                .as_mut()
                .and_then(|m| m.brutal.take())
                .is_some(),
            _ => false,
        };
        if removed {
            tracing::warn!(
                inbound = inbound.display_tag(),
                capability = %cap,
                core_type = %agent.core_type,
                "Disabling unsupported feature"
            );
            warnings.push(format!(
                "{}: agent {} does not support {cap}; disabled",
                inbound.display_tag(),
                agent.core_type
            ));
        }
    }

    inbound.derive_required_capabilities();
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentInfo, ServerInfo};
    use coreswitch_codec::{Brutal, Multiplex, Protocol, Reality, Tls};
    use coreswitch_core::CoreEngine;
    use std::collections::BTreeSet;

    fn full_inbound() -> Inbound {
        let mut inbound = Inbound::new(Protocol::Vless, "full", 443);
        inbound.tls = Some(Tls {
            enabled: true,
            server_name: "example.com".to_string(),
            reality: Some(Reality {
                enabled: true,
                ..Reality::default()
            }),
            ..Tls::default()
        });
        inbound.multiplex = Some(Multiplex {
            enabled: true,
            padding: true,
            brutal: Some(Brutal {
                enabled: true,
                up_mbps: 100,
                down_mbps: 100,
            }),
        });
        inbound.with_derived_capabilities()
    }

    fn context(agent: &AgentCapabilities, inbounds: Vec<Inbound>) -> ConfigContext {
        ConfigContext {
            inbounds,
            outbounds: Vec::new(),
            users: Vec::new(),
            agent: AgentInfo::new("a", "a", agent),
            server: ServerInfo::default(),
        }
    }

    fn tokens(inbound: &Inbound) -> Vec<&str> {
        inbound
            .required_capabilities
            .iter()
            .map(Capability::as_str)
            .collect()
    }

    #[test]
    fn fully_capable_agent_keeps_everything() {
        let agent = AgentCapabilities::new(CoreEngine::SingBox, "1.8.0");
        let ctx = context(&agent, vec![full_inbound()]);
        let (filtered, warnings) = filter_context(&agent, &ctx);
        assert!(warnings.is_empty());
        assert_eq!(filtered, ctx);
    }

    #[test]
    fn old_agent_loses_brutal_only() {
        let agent = AgentCapabilities::new(CoreEngine::SingBox, "1.6.0");
        let ctx = context(&agent, vec![full_inbound()]);
        let (filtered, warnings) = filter_context(&agent, &ctx);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("brutal"));
        let inbound = &filtered.inbounds[0];
        assert!(inbound.multiplex.as_ref().unwrap().brutal.is_none());
        assert_eq!(tokens(inbound), vec!["reality", "multiplex"]);
    }

    #[test]
    fn xray_agent_loses_multiplex_keeps_inbound() {
        let agent = AgentCapabilities::new(CoreEngine::Xray, "1.8.4");
        let ctx = context(&agent, vec![full_inbound()]);
        let (filtered, warnings) = filter_context(&agent, &ctx);

        assert_eq!(filtered.inbounds.len(), 1);
        let inbound = &filtered.inbounds[0];
        assert!(inbound.multiplex.is_none());
        assert!(inbound.reality().is_some());
        assert_eq!(tokens(inbound), vec!["reality"]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unknown_version_strips_everything() {
        let agent = AgentCapabilities {
            core_type: CoreEngine::SingBox,
            core_version: None,
            capabilities: BTreeSet::new(),
            build_tags: Vec::new(),
        };
        let ctx = context(&agent, vec![full_inbound()]);
        let (filtered, warnings) = filter_context(&agent, &ctx);

        let inbound = &filtered.inbounds[0];
        assert!(inbound.required_capabilities.is_empty());
        assert!(inbound.tls.as_ref().unwrap().enabled);
        assert!(inbound.tls.as_ref().unwrap().reality.is_none());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn stale_capability_lists_are_recomputed() {
        let agent = AgentCapabilities::new(CoreEngine::Xray, "1.7.0");
        let mut inbound = full_inbound();
        inbound.multiplex = None;
        inbound.required_capabilities.clear();

        let ctx = context(&agent, vec![inbound]);
        let (filtered, warnings) = filter_context(&agent, &ctx);
        assert!(filtered.inbounds[0].reality().is_none());
        assert!(filtered.inbounds[0].required_capabilities.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn filter_is_monotonic() {
        let agent = AgentCapabilities::new(CoreEngine::SingBox, "1.4.0");
        let plain = Inbound::new(Protocol::Shadowsocks, "ss", 8388).with_derived_capabilities();
        let ctx = context(&agent, vec![plain, full_inbound()]);
        let (filtered, _) = filter_context(&agent, &ctx);

        let supported = agent.effective();
        for (before, after) in ctx.inbounds.iter().zip(&filtered.inbounds) {
            for cap in &after.required_capabilities {
                assert!(before.required_capabilities.contains(cap));
                assert!(supported.contains(cap));
            }
        }
    }
}
