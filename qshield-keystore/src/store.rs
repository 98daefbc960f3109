//! Repository traits and backends: where keys, threats, configurations, and
//! rotation history live.
//!
//! Implement these for your infrastructure:
//! - in-memory (testing, ephemeral deployments)
//! - file-backed (development)
//! - your database (production)

use crate::error::KeystoreError;
use crate::threat::ThreatIntelligence;
use crate::types::{KeyId, ManagedKey, RotationRecord, RotationStatus, SystemConfiguration};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Backend for persisting managed keys. Keys are superseded, never deleted.
pub trait KeyStore: Send + Sync {
    fn get(&self, id: &KeyId) -> Result<Option<ManagedKey>, KeystoreError>;
    fn put(&self, key: &ManagedKey) -> Result<(), KeystoreError>;
    fn list(&self) -> Result<Vec<ManagedKey>, KeystoreError>;
    fn list_by_organization(&self, organization_id: &str) -> Result<Vec<ManagedKey>, KeystoreError>;
}

/// Backend for threat intelligence. Inserts are first-write-wins: a duplicate
/// id is ignored and reported as `false`.
pub trait ThreatStore: Send + Sync {
    fn insert(&self, threat: &ThreatIntelligence) -> Result<bool, KeystoreError>;
    fn get(&self, id: &str) -> Result<Option<ThreatIntelligence>, KeystoreError>;
    fn list(&self) -> Result<Vec<ThreatIntelligence>, KeystoreError>;
    fn list_active(&self) -> Result<Vec<ThreatIntelligence>, KeystoreError>;
    /// Active threats at or above `min_severity` created within `window` of now.
    fn list_recent_severe(
        &self,
        min_severity: u8,
        window: chrono::Duration,
    ) -> Result<Vec<ThreatIntelligence>, KeystoreError>;
    /// Mark inactive. Returns `false` when the id is unknown.
    fn deactivate(&self, id: &str) -> Result<bool, KeystoreError>;
}

/// Backend for the append-only rotation history. Rows are appended and their
/// status updated in place; nothing is ever removed.
pub trait RotationHistoryStore: Send + Sync {
    fn append(&self, record: &RotationRecord) -> Result<(), KeystoreError>;
    fn update(&self, record: &RotationRecord) -> Result<(), KeystoreError>;
    fn get(&self, id: &str) -> Result<Option<RotationRecord>, KeystoreError>;
    fn list(&self) -> Result<Vec<RotationRecord>, KeystoreError>;
    fn list_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<RotationRecord>, KeystoreError>;
    /// The most recent completed rotation for an organization, if any.
    fn last_completed_for(
        &self,
        organization_id: &str,
    ) -> Result<Option<RotationRecord>, KeystoreError>;
}

/// Backend for per-user system configurations.
pub trait ConfigStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<SystemConfiguration>, KeystoreError>;
    fn put(&self, config: &SystemConfiguration) -> Result<(), KeystoreError>;
    fn list(&self) -> Result<Vec<SystemConfiguration>, KeystoreError>;
    fn list_auto_rotate(&self) -> Result<Vec<SystemConfiguration>, KeystoreError>;
}

// ---------------------------------------------------------------------------
// In-memory backends
// ---------------------------------------------------------------------------

/// In-memory key store (testing and ephemeral use).
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, ManagedKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self { keys: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get(&self, id: &KeyId) -> Result<Option<ManagedKey>, KeystoreError> {
        let keys = self.keys.read().unwrap();
        Ok(keys.get(id.as_str()).cloned())
    }

    fn put(&self, key: &ManagedKey) -> Result<(), KeystoreError> {
        let mut keys = self.keys.write().unwrap();
        keys.insert(key.id.as_str().to_string(), key.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<ManagedKey>, KeystoreError> {
        let keys = self.keys.read().unwrap();
        let mut out: Vec<ManagedKey> = keys.values().cloned().collect();
        out.sort_by_key(|k| k.created_at);
        Ok(out)
    }

    fn list_by_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<ManagedKey>, KeystoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|k| k.organization_id == organization_id)
            .collect())
    }
}

/// In-memory threat store.
pub struct InMemoryThreatStore {
    threats: RwLock<HashMap<String, ThreatIntelligence>>,
}

impl InMemoryThreatStore {
    pub fn new() -> Self {
        Self { threats: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryThreatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreatStore for InMemoryThreatStore {
    fn insert(&self, threat: &ThreatIntelligence) -> Result<bool, KeystoreError> {
        let mut threats = self.threats.write().unwrap();
        if threats.contains_key(&threat.id) {
            return Ok(false);
        }
        threats.insert(threat.id.clone(), threat.clone());
        Ok(true)
    }

    fn get(&self, id: &str) -> Result<Option<ThreatIntelligence>, KeystoreError> {
        Ok(self.threats.read().unwrap().get(id).cloned())
    }

    fn list(&self) -> Result<Vec<ThreatIntelligence>, KeystoreError> {
        let threats = self.threats.read().unwrap();
        let mut out: Vec<ThreatIntelligence> = threats.values().cloned().collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    fn list_active(&self) -> Result<Vec<ThreatIntelligence>, KeystoreError> {
        Ok(self.list()?.into_iter().filter(|t| t.active).collect())
    }

    fn list_recent_severe(
        &self,
        min_severity: u8,
        window: chrono::Duration,
    ) -> Result<Vec<ThreatIntelligence>, KeystoreError> {
        let cutoff: DateTime<Utc> = Utc::now() - window;
        Ok(self
            .list_active()?
            .into_iter()
            .filter(|t| t.severity >= min_severity && t.created_at >= cutoff)
            .collect())
    }

    fn deactivate(&self, id: &str) -> Result<bool, KeystoreError> {
        let mut threats = self.threats.write().unwrap();
        match threats.get_mut(id) {
            Some(t) => {
                t.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory rotation history.
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<RotationRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationHistoryStore for InMemoryHistoryStore {
    fn append(&self, record: &RotationRecord) -> Result<(), KeystoreError> {
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }

    fn update(&self, record: &RotationRecord) -> Result<(), KeystoreError> {
        let mut records = self.records.write().unwrap();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(KeystoreError::HistoryNotFound(record.id.clone())),
        }
    }

    fn get(&self, id: &str) -> Result<Option<RotationRecord>, KeystoreError> {
        Ok(self.records.read().unwrap().iter().find(|r| r.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<RotationRecord>, KeystoreError> {
        Ok(self.records.read().unwrap().clone())
    }

    fn list_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<RotationRecord>, KeystoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.organization_id == organization_id)
            .collect())
    }

    fn last_completed_for(
        &self,
        organization_id: &str,
    ) -> Result<Option<RotationRecord>, KeystoreError> {
        Ok(self
            .list_for_organization(organization_id)?
            .into_iter()
            .filter(|r| r.status == RotationStatus::Completed)
            .max_by_key(|r| r.completed_at))
    }
}

/// In-memory configuration store.
pub struct InMemoryConfigStore {
    configs: RwLock<HashMap<String, SystemConfiguration>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self { configs: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, user_id: &str) -> Result<Option<SystemConfiguration>, KeystoreError> {
        Ok(self.configs.read().unwrap().get(user_id).cloned())
    }

    fn put(&self, config: &SystemConfiguration) -> Result<(), KeystoreError> {
        let mut configs = self.configs.write().unwrap();
        configs.insert(config.user_id.clone(), config.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<SystemConfiguration>, KeystoreError> {
        let configs = self.configs.read().unwrap();
        let mut out: Vec<SystemConfiguration> = configs.values().cloned().collect();
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(out)
    }

    fn list_auto_rotate(&self) -> Result<Vec<SystemConfiguration>, KeystoreError> {
        Ok(self.list()?.into_iter().filter(|c| c.auto_rotate).collect())
    }
}

// ---------------------------------------------------------------------------
// File-backed key store
// ---------------------------------------------------------------------------

/// File-based key store (one JSON file per key).
///
/// Directory layout:
/// ```text
/// keys/
///   {key_id}.json
/// ```
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| KeystoreError::StorageError(format!("create dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn key_path(&self, id: &KeyId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    fn read_key_file(&self, path: &Path) -> Result<ManagedKey, KeystoreError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| KeystoreError::StorageError(format!("read: {}", e)))?;
        serde_json::from_str(&data)
            .map_err(|e| KeystoreError::StorageError(format!("parse: {}", e)))
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, id: &KeyId) -> Result<Option<ManagedKey>, KeystoreError> {
        let path = self.key_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_key_file(&path).map(Some)
    }

    fn put(&self, key: &ManagedKey) -> Result<(), KeystoreError> {
        let path = self.key_path(&key.id);
        let json = serde_json::to_string_pretty(key)
            .map_err(|e| KeystoreError::StorageError(format!("serialize: {}", e)))?;
        // Atomic write: write to temp, then rename
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| KeystoreError::StorageError(format!("write: {}", e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| KeystoreError::StorageError(format!("rename: {}", e)))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<ManagedKey>, KeystoreError> {
        let mut keys = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| KeystoreError::StorageError(format!("readdir: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| KeystoreError::StorageError(format!("entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                keys.push(self.read_key_file(&path)?);
            }
        }
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }

    fn list_by_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<ManagedKey>, KeystoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|k| k.organization_id == organization_id)
            .collect())
    }
}
