//! Key encoding utilities for `RocksDB`.
//!
//! All composite keys start with the 16 agent host ID bytes so that per-host
//! records can be listed with a prefix scan.

use chrono::{DateTime, Utc};
use coreswitch_core::{AgentHostId, InstanceId, SwitchLogId, TemplateId};

const ID_LEN: usize = 16;

/// Encode an agent host key (just the ID bytes).
#[must_use]
pub fn agent_host_key(id: &AgentHostId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a template key (just the ID bytes).
#[must_use]
pub fn template_key(id: &TemplateId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode an instance key: `agent_host_id || instance_id`.
#[must_use]
pub fn instance_key(host: &AgentHostId, instance_id: &InstanceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + instance_id.as_str().len());
    key.extend_from_slice(host.as_bytes());
    key.extend_from_slice(instance_id.as_str().as_bytes());
    key
}

/// Encode a host prefix for scanning every record of one agent host.
#[must_use]
pub fn host_prefix(host: &AgentHostId) -> Vec<u8> {
    host.as_bytes().to_vec()
}

/// Encode a switch log key (just the ID bytes).
#[must_use]
pub fn switch_log_key(id: &SwitchLogId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a host-switch-log index key: `agent_host_id || created_ms || switch_log_id`.
///
/// The timestamp is big-endian so keys of one host sort chronologically.
/// Timestamps before the Unix epoch clamp to zero.
#[must_use]
pub fn host_switch_log_key(
    host: &AgentHostId,
    created_at: &DateTime<Utc>,
    id: &SwitchLogId,
) -> Vec<u8> {
    let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or(0);
    let mut key = Vec::with_capacity(ID_LEN + 8 + ID_LEN);
    key.extend_from_slice(host.as_bytes());
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Extract the switch log ID from a host-switch-log index key.
///
/// Returns `None` if the key is too short.
#[must_use]
pub fn extract_switch_log_id(key: &[u8]) -> Option<SwitchLogId> {
    let start = key.len().checked_sub(ID_LEN)?;
    let bytes: [u8; ID_LEN] = key[start..].try_into().ok()?;
    Some(SwitchLogId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn instance_key_starts_with_host_prefix() {
        let host = AgentHostId::generate();
        let key = instance_key(&host, &InstanceId::new("node-1").unwrap());
        assert!(key.starts_with(&host_prefix(&host)));
        assert!(key.ends_with(b"node-1"));
    }

    #[test]
    fn host_switch_log_key_roundtrip() {
        let host = AgentHostId::generate();
        let id = SwitchLogId::generate();
        let key = host_switch_log_key(&host, &Utc::now(), &id);
        assert_eq!(key.len(), 40);
        assert_eq!(extract_switch_log_id(&key), Some(id));
        assert_eq!(extract_switch_log_id(&[1, 2, 3]), None);
    }

    #[test]
    fn host_switch_log_keys_sort_by_time() {
        let host = AgentHostId::generate();
        let early = Utc.timestamp_millis_opt(1_000).unwrap();
        let late = Utc.timestamp_millis_opt(2_000).unwrap();
        let a = host_switch_log_key(&host, &early, &SwitchLogId::from_bytes([0xff; 16]));
        let b = host_switch_log_key(&host, &late, &SwitchLogId::from_bytes([0x00; 16]));
        assert!(a < b);
    }
}
