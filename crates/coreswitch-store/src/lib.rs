//! `RocksDB` storage layer for coreswitch.
//!
//! This crate provides persistent storage for agent hosts, configuration
//! templates, core instances and the switch audit trail using `RocksDB` with
//! column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `agent_hosts`: Agent host records, keyed by `agent_host_id`
//! - `templates`: Configuration templates, keyed by `template_id`
//! - `instances`: Core instances, keyed by `agent_host_id || instance_id`
//! - `switch_logs`: Switch audit rows, keyed by `switch_log_id`
//! - `switch_logs_by_host`: Index for listing switch logs by host in time order
//!
//! # Example
//!
//! ```no_run
//! use coreswitch_store::{RocksStore, Store, SwitchLogFilter};
//! use coreswitch_core::AgentHostId;
//!
//! let store = RocksStore::open("/tmp/coreswitch-db").unwrap();
//!
//! // List the switch history of one host
//! let filter = SwitchLogFilter {
//!     agent_host_id: Some(AgentHostId::generate()),
//!     limit: Some(20),
//!     ..SwitchLogFilter::default()
//! };
//! let (logs, total) = store.list_switch_logs(&filter).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, AgentTlsConfig, ConfigTemplate,
    InstanceStatus, SwitchLogFilter, SwitchStatus,
};

use coreswitch_core::{AgentHostId, InstanceId, SwitchLogId, TemplateId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Agent Host Operations
    // =========================================================================

    /// Insert or update an agent host record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent_host(&self, host: &AgentHost) -> Result<()>;

    /// Get an agent host by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent_host(&self, id: &AgentHostId) -> Result<Option<AgentHost>>;

    /// List all agent hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agent_hosts(&self) -> Result<Vec<AgentHost>>;

    /// Set or clear the template assigned to a host.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the host doesn't exist.
    fn set_agent_host_template(
        &self,
        id: &AgentHostId,
        template_id: Option<TemplateId>,
    ) -> Result<()>;

    // =========================================================================
    // Template Operations
    // =========================================================================

    /// Insert or update a template.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_template(&self, template: &ConfigTemplate) -> Result<()>;

    /// Get a template by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_template(&self, id: &TemplateId) -> Result<Option<ConfigTemplate>>;

    /// List all templates.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_templates(&self) -> Result<Vec<ConfigTemplate>>;

    /// Delete a template by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the template doesn't exist.
    fn delete_template(&self, id: &TemplateId) -> Result<()>;

    // =========================================================================
    // Instance Operations
    // =========================================================================

    /// Insert a new instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the `(agent_host_id, instance_id)`
    /// pair already exists.
    fn insert_instance(&self, instance: &AgentCoreInstance) -> Result<()>;

    /// Insert or replace an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_instance(&self, instance: &AgentCoreInstance) -> Result<()>;

    /// Get an instance by host and instance ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_instance(
        &self,
        host: &AgentHostId,
        instance_id: &InstanceId,
    ) -> Result<Option<AgentCoreInstance>>;

    /// List all instances of a host, ordered by instance ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_instances_by_host(&self, host: &AgentHostId) -> Result<Vec<AgentCoreInstance>>;

    /// Update the run state of an instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the instance doesn't exist.
    fn update_instance_status(
        &self,
        host: &AgentHostId,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<()>;

    /// Delete an instance.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the instance doesn't exist.
    fn delete_instance(&self, host: &AgentHostId, instance_id: &InstanceId) -> Result<()>;

    // =========================================================================
    // Switch Log Operations
    // =========================================================================

    /// Insert a new switch log row and its host index entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a row with the same ID exists.
    fn insert_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()>;

    /// Get a switch log by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_switch_log(&self, id: &SwitchLogId) -> Result<Option<AgentCoreSwitchLog>>;

    /// Overwrite an existing switch log row.
    ///
    /// The host and creation time are part of the index key and must not change.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the row doesn't exist.
    fn update_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()>;

    /// List switch logs matching a filter, newest first, with the total
    /// number of matches before paging.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_switch_logs(&self, filter: &SwitchLogFilter)
        -> Result<(Vec<AgentCoreSwitchLog>, usize)>;
}
