//! Inventory cache
//!
//! One JSON snapshot per region, holding every instance record exactly as
//! the gateway reported it. A snapshot is either fully readable or treated
//! as absent; writes go to a temporary file first and are renamed into
//! place, so a crashed write never leaves half a snapshot behind.

use crate::config::ensure_dir;
use crate::selector::InstanceEntry;
use ec2kit_core::{ComputeGateway, Ec2KitError, Instance, Result, StateFilter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name prefix of a region snapshot
pub const SNAPSHOT_PREFIX: &str = "aws.instances.cache.";

/// Label used when there is nothing to select
pub const INSTANCE_LABEL: &str = "EC2";

/// Persisted inventory of one region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "ec2_instances")]
    pub instances: Vec<Instance>,
}

/// Reads and writes region snapshots in a flat directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/aws.instances.cache.<region>.json`
    pub fn path_for(&self, region: &str) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_PREFIX}{region}.json"))
    }

    /// Load the snapshot for `region`
    ///
    /// `Ok(None)` when no snapshot was ever written; a cache error when the
    /// file exists but cannot be read or parsed.
    pub fn load(&self, region: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(region);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| Ec2KitError::cache(region, e))?;
        let snapshot = serde_json::from_str(&content).map_err(|e| {
            Ec2KitError::cache(region, format!("{}: {e}", path.display()))
        })?;

        Ok(Some(snapshot))
    }

    /// Persist the snapshot for `region`, replacing any previous one
    pub fn save(&self, region: &str, snapshot: &Snapshot) -> Result<()> {
        ensure_dir(&self.dir).map_err(|e| Ec2KitError::cache(region, e))?;

        let path = self.path_for(region);
        let tmp = path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(snapshot).map_err(|e| Ec2KitError::cache(region, e))?;

        write_then_rename(&tmp, &path, content.as_bytes())
            .map_err(|e| Ec2KitError::cache(region, e))?;

        debug!(path = %path.display(), count = snapshot.instances.len(), "Snapshot saved");
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, content)?;
    fs::rename(tmp, path)
}

/// Cache-backed source of selectable instances
pub struct InventoryCache {
    store: SnapshotStore,
}

impl InventoryCache {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    /// Load instances of the gateway's region, filter them and sort by name
    ///
    /// Without `force_reload` a readable snapshot is used as-is; otherwise
    /// (or when there is none) the full list is fetched and persisted. A
    /// persistence failure only costs the next run its cache.
    pub async fn load_or_refresh<G: ComputeGateway + ?Sized>(
        &self,
        gateway: &G,
        filter: StateFilter,
        force_reload: bool,
    ) -> Result<Vec<InstanceEntry>> {
        let instances = self.instances(gateway, force_reload).await?;
        let entries = filter_and_sort(&instances, filter);

        if entries.is_empty() {
            debug!(region = gateway.region(), %filter, "No instance matched");
            return Err(Ec2KitError::NothingToSelect(INSTANCE_LABEL.to_string()));
        }

        Ok(entries)
    }

    async fn instances<G: ComputeGateway + ?Sized>(
        &self,
        gateway: &G,
        force_reload: bool,
    ) -> Result<Vec<Instance>> {
        let region = gateway.region();

        if !force_reload {
            match self.store.load(region) {
                Ok(Some(snapshot)) => {
                    debug!(region, count = snapshot.instances.len(), "Using cached inventory");
                    return Ok(snapshot.instances);
                }
                Ok(None) => debug!(region, "No cached inventory"),
                Err(e) => warn!("⚠️  Ignoring unusable inventory cache: {}", e),
            }
        }

        info!("🔍 Fetching instances in {}", region);
        let snapshot = Snapshot {
            instances: gateway.describe_instances().await?,
        };

        if let Err(e) = self.store.save(region, &snapshot) {
            warn!("⚠️  Failed to store inventory cache: {}", e);
        }

        Ok(snapshot.instances)
    }
}

/// Keep instances passing `filter`, stable-sorted by display name
pub fn filter_and_sort(instances: &[Instance], filter: StateFilter) -> Vec<InstanceEntry> {
    let mut entries: Vec<InstanceEntry> = instances
        .iter()
        .filter(|i| filter.matches(&i.state))
        .map(InstanceEntry::from)
        .collect();

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}
