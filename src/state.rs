//! On-disk state for a stack
//!
//! Two JSON files live in the state directory: the reconciliation records
//! the engine keeps, and the resources the simulated cloud holds. Both are
//! rewritten atomically (temp file + rename) so an interrupted run never
//! leaves a half-written file behind.

use anyhow::{Context, Result};
use azurekit::{SimResource, SimulatedCloud};
use chrono::{DateTime, Utc};
use converge::{MemoryStore, ReconciliationRecord, ResourceKey, StateStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    stack: String,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    records: Vec<ReconciliationRecord>,
}

/// Reconciliation records persisted to a JSON file.
///
/// Reads and per-key locking come from [`MemoryStore`]; every mutation
/// rewrites the whole file.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    stack: String,
    records: MemoryStore,
    write: Mutex<()>,
}

impl FileStateStore {
    /// Open the state file, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>, stack: &str) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let file: StateFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
            if file.version != STATE_VERSION {
                anyhow::bail!(
                    "State file {} has version {}, expected {STATE_VERSION}",
                    path.display(),
                    file.version
                );
            }
            log::debug!("Loaded {} record(s) from {}", file.records.len(), path.display());
            file.records
        } else {
            log::debug!("State file does not exist, starting empty");
            Vec::new()
        };

        Ok(Self {
            path,
            stack: stack.to_string(),
            records: MemoryStore::from_records(records),
            write: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let file = StateFile {
            version: STATE_VERSION,
            stack: self.stack.clone(),
            last_updated: Utc::now(),
            records: self.records.records_snapshot(),
        };
        let content = serde_json::to_string_pretty(&file).context("Failed to serialize state")?;
        write_atomic(&self.path, &content)
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<ReconciliationRecord>> {
        self.records.get(key)
    }

    fn put(&self, record: ReconciliationRecord) -> Result<()> {
        self.records.put(record)?;
        self.save()
    }

    fn remove(&self, key: &ResourceKey) -> Result<()> {
        self.records.remove(key)?;
        self.save()
    }

    fn records(&self) -> Result<Vec<ReconciliationRecord>> {
        self.records.records()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CloudFile {
    subscription: String,
    #[serde(default)]
    resources: Vec<SimResource>,
}

/// Load the simulated cloud for a stack, empty if nothing was saved yet
pub fn load_cloud(path: &Path, subscription: &str) -> Result<SimulatedCloud> {
    if !path.exists() {
        return Ok(SimulatedCloud::new(subscription));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read cloud file: {}", path.display()))?;
    let file: CloudFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse cloud file: {}", path.display()))?;
    if file.subscription != subscription {
        log::warn!(
            "Cloud file {} belongs to subscription {}, not {subscription}",
            path.display(),
            file.subscription
        );
    }
    Ok(SimulatedCloud::from_resources(file.subscription, file.resources))
}

/// Persist the simulated cloud's resources
pub fn save_cloud(path: &Path, cloud: &SimulatedCloud) -> Result<()> {
    let file = CloudFile {
        subscription: cloud.subscription().to_string(),
        resources: cloud.resources(),
    };
    let content = serde_json::to_string_pretty(&file).context("Failed to serialize cloud")?;
    write_atomic(path, &content)
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, content)
        .with_context(|| format!("Failed to write {}", temp.display()))?;
    fs::rename(&temp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    log::debug!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use azurekit::{ResourceGroupArgs, kind};
    use converge::{PropertyMap, Provider, ResourceSpec};
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(name: &str) -> ReconciliationRecord {
        ReconciliationRecord {
            key: ResourceKey::new("test:Thing", name),
            remote_id: format!("/things/{name}"),
            fingerprint: "abc".into(),
            realized: PropertyMap::new(),
            dependencies: vec![],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("playground.state.json");

        let store = FileStateStore::open(&path, "playground").unwrap();
        store.put(record("a")).unwrap();
        store.put(record("b")).unwrap();
        store.remove(&ResourceKey::new("test:Thing", "a")).unwrap();
        assert!(path.exists());

        let reopened = FileStateStore::open(&path, "playground").unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_id, "/things/b");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.state.json");
        let store = FileStateStore::open(&path, "s").unwrap();
        store.put(record("a")).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["s.state.json".to_string()]);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.state.json");
        fs::write(
            &path,
            r#"{"version": 99, "stack": "s", "last_updated": "2024-01-01T00:00:00Z", "records": []}"#,
        )
        .unwrap();
        let err = FileStateStore::open(&path, "s").unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.state.json");
        fs::write(&path, "not json").unwrap();
        assert!(FileStateStore::open(&path, "s").is_err());
    }

    #[test]
    fn test_cloud_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.cloud.json");
        assert!(load_cloud(&path, "sub").unwrap().is_empty());

        let cloud = SimulatedCloud::new("sub");
        let key = ResourceKey::new(kind::RESOURCE_GROUP, "playground");
        let desired = ResourceGroupArgs::new("westeurope").into_properties().resolve().unwrap();
        cloud.create_or_update(&key, &desired, Duration::from_secs(1)).unwrap();
        save_cloud(&path, &cloud).unwrap();

        let loaded = load_cloud(&path, "sub").unwrap();
        assert_eq!(loaded.resources(), cloud.resources());
    }
}
