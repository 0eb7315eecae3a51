//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use coreswitch_core::{AgentHostId, InstanceId, SwitchLogId, TemplateId};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, ConfigTemplate, InstanceStatus,
    SwitchLogFilter,
};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes check-then-write sequences that enforce uniqueness.
    insert_guard: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            insert_guard: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn key_exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self
            .db
            .get_pinned_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    /// Decode every value in a column family.
    fn scan_all<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Decode every value whose key starts with `prefix`.
    fn scan_prefix<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Collect the switch logs of one host through the time-ordered index.
    fn switch_logs_of_host(&self, host: &AgentHostId) -> Result<Vec<AgentCoreSwitchLog>> {
        let cf_by_host = self.cf(cf::SWITCH_LOGS_BY_HOST)?;
        let prefix = keys::host_prefix(host);

        let mut logs = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_by_host, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let Some(id) = keys::extract_switch_log_id(&key) else {
                tracing::warn!(agent_host_id = %host, "Skipping malformed switch log index key");
                continue;
            };
            if let Some(log) = self.get_switch_log(&id)? {
                logs.push(log);
            }
        }

        Ok(logs)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Agent Host Operations
    // =========================================================================

    fn put_agent_host(&self, host: &AgentHost) -> Result<()> {
        self.put_value(cf::AGENT_HOSTS, &keys::agent_host_key(&host.id), host)
    }

    fn get_agent_host(&self, id: &AgentHostId) -> Result<Option<AgentHost>> {
        self.get_value(cf::AGENT_HOSTS, &keys::agent_host_key(id))
    }

    fn list_agent_hosts(&self) -> Result<Vec<AgentHost>> {
        self.scan_all(cf::AGENT_HOSTS)
    }

    fn set_agent_host_template(
        &self,
        id: &AgentHostId,
        template_id: Option<TemplateId>,
    ) -> Result<()> {
        let mut host = self.get_agent_host(id)?.ok_or(StoreError::NotFound)?;
        host.config_template_id = template_id;
        host.updated_at = chrono::Utc::now();
        self.put_agent_host(&host)
    }

    // =========================================================================
    // Template Operations
    // =========================================================================

    fn put_template(&self, template: &ConfigTemplate) -> Result<()> {
        self.put_value(cf::TEMPLATES, &keys::template_key(&template.id), template)
    }

    fn get_template(&self, id: &TemplateId) -> Result<Option<ConfigTemplate>> {
        self.get_value(cf::TEMPLATES, &keys::template_key(id))
    }

    fn list_templates(&self) -> Result<Vec<ConfigTemplate>> {
        self.scan_all(cf::TEMPLATES)
    }

    fn delete_template(&self, id: &TemplateId) -> Result<()> {
        let key = keys::template_key(id);
        if !self.key_exists(cf::TEMPLATES, &key)? {
            return Err(StoreError::NotFound);
        }
        let cf = self.cf(cf::TEMPLATES)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Instance Operations
    // =========================================================================

    fn insert_instance(&self, instance: &AgentCoreInstance) -> Result<()> {
        let key = keys::instance_key(&instance.agent_host_id, &instance.instance_id);
        let _guard = self.insert_guard.lock();

        if self.key_exists(cf::INSTANCES, &key)? {
            return Err(StoreError::Conflict(format!(
                "instance {} already exists on host {}",
                instance.instance_id, instance.agent_host_id
            )));
        }
        self.put_value(cf::INSTANCES, &key, instance)
    }

    fn put_instance(&self, instance: &AgentCoreInstance) -> Result<()> {
        let key = keys::instance_key(&instance.agent_host_id, &instance.instance_id);
        self.put_value(cf::INSTANCES, &key, instance)
    }

    fn get_instance(
        &self,
        host: &AgentHostId,
        instance_id: &InstanceId,
    ) -> Result<Option<AgentCoreInstance>> {
        self.get_value(cf::INSTANCES, &keys::instance_key(host, instance_id))
    }

    fn list_instances_by_host(&self, host: &AgentHostId) -> Result<Vec<AgentCoreInstance>> {
        self.scan_prefix(cf::INSTANCES, &keys::host_prefix(host))
    }

    fn update_instance_status(
        &self,
        host: &AgentHostId,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<()> {
        let mut instance = self
            .get_instance(host, instance_id)?
            .ok_or(StoreError::NotFound)?;
        instance.status = status;
        instance.updated_at = chrono::Utc::now();
        self.put_instance(&instance)
    }

    fn delete_instance(&self, host: &AgentHostId, instance_id: &InstanceId) -> Result<()> {
        let key = keys::instance_key(host, instance_id);
        if !self.key_exists(cf::INSTANCES, &key)? {
            return Err(StoreError::NotFound);
        }
        let cf = self.cf(cf::INSTANCES)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Switch Log Operations
    // =========================================================================

    fn insert_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()> {
        let cf_logs = self.cf(cf::SWITCH_LOGS)?;
        let cf_by_host = self.cf(cf::SWITCH_LOGS_BY_HOST)?;

        let log_key = keys::switch_log_key(&log.id);
        let index_key = keys::host_switch_log_key(&log.agent_host_id, &log.created_at, &log.id);
        let value = Self::serialize(log)?;

        let _guard = self.insert_guard.lock();
        if self.key_exists(cf::SWITCH_LOGS, &log_key)? {
            return Err(StoreError::Conflict(format!("switch log {} already exists", log.id)));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_logs, &log_key, &value);
        batch.put_cf(&cf_by_host, &index_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_switch_log(&self, id: &SwitchLogId) -> Result<Option<AgentCoreSwitchLog>> {
        self.get_value(cf::SWITCH_LOGS, &keys::switch_log_key(id))
    }

    fn update_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()> {
        let key = keys::switch_log_key(&log.id);
        if !self.key_exists(cf::SWITCH_LOGS, &key)? {
            return Err(StoreError::NotFound);
        }
        self.put_value(cf::SWITCH_LOGS, &key, log)
    }

    fn list_switch_logs(
        &self,
        filter: &SwitchLogFilter,
    ) -> Result<(Vec<AgentCoreSwitchLog>, usize)> {
        let candidates = match &filter.agent_host_id {
            Some(host) => self.switch_logs_of_host(host)?,
            None => self.scan_all(cf::SWITCH_LOGS)?,
        };

        let mut logs: Vec<_> = candidates
            .into_iter()
            .filter(|log| filter.matches(log))
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = logs.len();
        let page = logs
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SwitchStatus, AgentTlsConfig};
    use chrono::{Duration, Utc};
    use coreswitch_core::{ConfigHash, CoreEngine};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_host(name: &str) -> AgentHost {
        AgentHost {
            id: AgentHostId::generate(),
            name: name.to_string(),
            address: "https://127.0.0.1:7443".to_string(),
            token: "secret".to_string(),
            tls: Some(AgentTlsConfig::default()),
            core_type: CoreEngine::SingBox,
            core_version: Some("1.8.0".to_string()),
            capabilities: BTreeSet::new(),
            build_tags: Vec::new(),
            config_template_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_test_instance(host: &AgentHostId, name: &str) -> AgentCoreInstance {
        AgentCoreInstance {
            agent_host_id: *host,
            instance_id: InstanceId::new(name).unwrap(),
            core_type: CoreEngine::SingBox,
            status: InstanceStatus::Running,
            config_template_id: None,
            config_hash: ConfigHash::of(b"{}"),
            listen_ports: vec![443],
            last_heartbeat_at: None,
            error_message: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_test_log(host: &AgentHostId, created_at: chrono::DateTime<Utc>) -> AgentCoreSwitchLog {
        AgentCoreSwitchLog {
            id: SwitchLogId::generate(),
            agent_host_id: *host,
            from_instance_id: None,
            to_instance_id: Some(InstanceId::new("node-1").unwrap()),
            from_core_type: None,
            to_core_type: CoreEngine::Xray,
            status: SwitchStatus::Pending,
            message: String::new(),
            operator_id: Some("admin".to_string()),
            created_at,
            completed_at: None,
        }
    }

    #[test]
    fn agent_host_crud() {
        let (store, _dir) = create_test_store();
        let host = create_test_host("edge-1");

        store.put_agent_host(&host).unwrap();
        let retrieved = store.get_agent_host(&host.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "edge-1");
        assert_eq!(retrieved.core_type, CoreEngine::SingBox);

        let template_id = TemplateId::generate();
        store
            .set_agent_host_template(&host.id, Some(template_id))
            .unwrap();
        let updated = store.get_agent_host(&host.id).unwrap().unwrap();
        assert_eq!(updated.config_template_id, Some(template_id));

        assert_eq!(store.list_agent_hosts().unwrap().len(), 1);

        let missing = store.set_agent_host_template(&AgentHostId::generate(), None);
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn template_crud() {
        let (store, _dir) = create_test_store();
        let template = ConfigTemplate {
            id: TemplateId::generate(),
            name: "default".to_string(),
            core_type: CoreEngine::Xray,
            content: r#"{"inbounds": []}"#.to_string(),
            min_version: "1.8.0".to_string(),
            capabilities: vec!["reality".into()],
            schema_version: 1,
            is_valid: true,
            validation_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        store.put_template(&template).unwrap();
        let retrieved = store.get_template(&template.id).unwrap().unwrap();
        assert_eq!(retrieved.min_version, "1.8.0");
        assert_eq!(retrieved.capabilities.len(), 1);

        store.delete_template(&template.id).unwrap();
        assert!(store.get_template(&template.id).unwrap().is_none());
        assert!(matches!(
            store.delete_template(&template.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn insert_instance_rejects_duplicates() {
        let (store, _dir) = create_test_store();
        let host = AgentHostId::generate();
        let instance = create_test_instance(&host, "node-1");

        store.insert_instance(&instance).unwrap();
        let second = store.insert_instance(&instance);
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        // Same instance name on another host is fine
        let other = create_test_instance(&AgentHostId::generate(), "node-1");
        store.insert_instance(&other).unwrap();
    }

    #[test]
    fn list_instances_by_host_uses_prefix() {
        let (store, _dir) = create_test_store();
        let host1 = AgentHostId::generate();
        let host2 = AgentHostId::generate();

        store.insert_instance(&create_test_instance(&host1, "a")).unwrap();
        store.insert_instance(&create_test_instance(&host1, "b")).unwrap();
        store.insert_instance(&create_test_instance(&host2, "c")).unwrap();

        let listed = store.list_instances_by_host(&host1).unwrap();
        let names: Vec<_> = listed.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.list_instances_by_host(&host2).unwrap().len(), 1);
    }

    #[test]
    fn instance_status_update_and_delete() {
        let (store, _dir) = create_test_store();
        let host = AgentHostId::generate();
        let instance = create_test_instance(&host, "node-1");
        store.insert_instance(&instance).unwrap();

        store
            .update_instance_status(&host, &instance.instance_id, InstanceStatus::Stopped)
            .unwrap();
        let stopped = store
            .get_instance(&host, &instance.instance_id)
            .unwrap()
            .unwrap();
        assert_eq!(stopped.status, InstanceStatus::Stopped);

        store.delete_instance(&host, &instance.instance_id).unwrap();
        assert!(store
            .get_instance(&host, &instance.instance_id)
            .unwrap()
            .is_none());
        assert!(matches!(
            store.update_instance_status(&host, &instance.instance_id, InstanceStatus::Running),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn switch_log_insert_update() {
        let (store, _dir) = create_test_store();
        let host = AgentHostId::generate();
        let mut log = create_test_log(&host, Utc::now());

        store.insert_switch_log(&log).unwrap();
        assert!(matches!(
            store.insert_switch_log(&log),
            Err(StoreError::Conflict(_))
        ));

        log.status = SwitchStatus::Completed;
        log.completed_at = Some(Utc::now());
        store.update_switch_log(&log).unwrap();

        let retrieved = store.get_switch_log(&log.id).unwrap().unwrap();
        assert_eq!(retrieved.status, SwitchStatus::Completed);
        assert!(retrieved.completed_at.is_some());

        let unknown = create_test_log(&host, Utc::now());
        assert!(matches!(
            store.update_switch_log(&unknown),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_switch_logs_filters_and_pages() {
        let (store, _dir) = create_test_store();
        let host1 = AgentHostId::generate();
        let host2 = AgentHostId::generate();
        let base = Utc::now() - Duration::hours(1);

        let mut ids = Vec::new();
        for minute in 0..5 {
            let mut log = create_test_log(&host1, base + Duration::minutes(minute));
            if minute % 2 == 0 {
                log.status = SwitchStatus::Failed;
            }
            ids.push(log.id);
            store.insert_switch_log(&log).unwrap();
        }
        store
            .insert_switch_log(&create_test_log(&host2, base))
            .unwrap();

        let (all, total) = store.list_switch_logs(&SwitchLogFilter::default()).unwrap();
        assert_eq!(total, 6);
        assert_eq!(all.len(), 6);

        let by_host = SwitchLogFilter {
            agent_host_id: Some(host1),
            ..SwitchLogFilter::default()
        };
        let (logs, total) = store.list_switch_logs(&by_host).unwrap();
        assert_eq!(total, 5);
        // Newest first
        assert_eq!(logs[0].id, ids[4]);
        assert_eq!(logs[4].id, ids[0]);

        let failed = SwitchLogFilter {
            agent_host_id: Some(host1),
            status: Some(SwitchStatus::Failed),
            ..SwitchLogFilter::default()
        };
        assert_eq!(store.list_switch_logs(&failed).unwrap().1, 3);

        let window = SwitchLogFilter {
            agent_host_id: Some(host1),
            since: Some(base + Duration::minutes(1)),
            until: Some(base + Duration::minutes(3)),
            ..SwitchLogFilter::default()
        };
        assert_eq!(store.list_switch_logs(&window).unwrap().1, 2);

        let paged = SwitchLogFilter {
            agent_host_id: Some(host1),
            offset: 1,
            limit: Some(2),
            ..SwitchLogFilter::default()
        };
        let (page, total) = store.list_switch_logs(&paged).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[3]);
    }
}
