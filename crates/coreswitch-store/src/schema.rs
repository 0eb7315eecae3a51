//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Agent host records, keyed by `agent_host_id`.
    pub const AGENT_HOSTS: &str = "agent_hosts";

    /// Configuration templates, keyed by `template_id`.
    pub const TEMPLATES: &str = "templates";

    /// Core instances, keyed by `agent_host_id || instance_id`.
    pub const INSTANCES: &str = "instances";

    /// Switch log records, keyed by `switch_log_id`.
    pub const SWITCH_LOGS: &str = "switch_logs";

    /// Index: switch logs by host, keyed by `agent_host_id || created_ms || switch_log_id`.
    pub const SWITCH_LOGS_BY_HOST: &str = "switch_logs_by_host";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::AGENT_HOSTS,
        cf::TEMPLATES,
        cf::INSTANCES,
        cf::SWITCH_LOGS,
        cf::SWITCH_LOGS_BY_HOST,
    ]
}
