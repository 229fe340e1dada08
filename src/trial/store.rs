//! Subscription persistence seam.

use crate::error::{Error, Result};
use crate::trial::{TrialStatus, TrialSubscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Read/update access to merchant subscription records.
///
/// Implementations must make [`SubscriptionStore::transition`] and
/// [`SubscriptionStore::downgrade`] atomic per record; they are the only guard
/// the processor has against overlapping runs and billing events.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Non-terminal subscriptions whose trial ends at or before `until`.
    async fn trial_candidates(&self, until: DateTime<Utc>) -> Result<Vec<TrialSubscription>>;

    /// Fetch a single subscription.
    async fn get(&self, subscription_id: &str) -> Result<Option<TrialSubscription>>;

    /// Set status to `to` only if it is currently `from`.
    ///
    /// Returns `false` when the record is missing or its status has moved on.
    async fn transition(&self, subscription_id: &str, from: TrialStatus, to: TrialStatus)
        -> Result<bool>;

    /// Write `plan` and set status to `EXPIRED_DOWNGRADED` in one step, only
    /// if the status is currently `from`.
    ///
    /// Returns `false`, leaving the plan untouched, when the record is missing
    /// or its status has moved on.
    async fn downgrade(&self, subscription_id: &str, from: TrialStatus, plan: &str)
        -> Result<bool>;
}

/// In-memory subscription store with JSON snapshot support.
///
/// A store opened with [`MemorySubscriptionStore::open`] rewrites its snapshot
/// after every successful `transition` or `downgrade`, so a crash never loses
/// a recorded warning.
/// Used by the worker binary against an exported snapshot, and by tests.
#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    records: Arc<Mutex<BTreeMap<String, TrialSubscription>>>,
    backing: Option<Arc<SnapshotFile>>,
}

/// File a store writes through to.
struct SnapshotFile {
    path: PathBuf,
    /// Held across snapshot-and-write so the last writer persists the newest state.
    write_lock: Mutex<()>,
}

impl MemorySubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = TrialSubscription>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// Load a JSON array of subscriptions. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No subscription snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let records: Vec<TrialSubscription> = serde_json::from_str(&content)?;
        info!(
            "Loaded {} subscriptions from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records))
    }

    /// Load `path` like [`MemorySubscriptionStore::load`] and keep it as the
    /// backing file for every later write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self::load(path)?;
        store.backing = Some(Arc::new(SnapshotFile {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }));
        Ok(store)
    }

    /// Backing file, if the store was opened with one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_deref().map(|file| file.path.as_path())
    }

    /// Write all records as a JSON array.
    ///
    /// The snapshot goes to a temporary file in the same directory that is
    /// then renamed over `path`, so readers see the old or the new snapshot
    /// and never a partial one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        debug!("Saved subscription snapshot to {}", path.display());
        Ok(())
    }

    /// Insert or replace a record.
    pub fn upsert(&self, record: TrialSubscription) {
        self.records
            .lock()
            .insert(record.subscription_id.clone(), record);
    }

    /// Set a record's status unconditionally, as a billing event would.
    pub fn force_status(&self, subscription_id: &str, status: TrialStatus) {
        if let Some(record) = self.records.lock().get_mut(subscription_id) {
            record.status = status;
        }
    }

    /// All records, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TrialSubscription> {
        self.records.lock().values().cloned().collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Persist to the backing file, if any.
    fn write_through(&self) -> Result<()> {
        match self.backing.as_deref() {
            Some(file) => {
                let _guard = file.write_lock.lock();
                self.save(&file.path)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn trial_candidates(&self, until: DateTime<Utc>) -> Result<Vec<TrialSubscription>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| !record.status.is_terminal() && record.trial_ends_at <= until)
            .cloned()
            .collect())
    }

    async fn get(&self, subscription_id: &str) -> Result<Option<TrialSubscription>> {
        Ok(self.records.lock().get(subscription_id).cloned())
    }

    async fn transition(
        &self,
        subscription_id: &str,
        from: TrialStatus,
        to: TrialStatus,
    ) -> Result<bool> {
        let changed = {
            let mut records = self.records.lock();
            match records.get_mut(subscription_id) {
                Some(record) if record.status == from => {
                    record.status = to;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.write_through()?;
        }
        Ok(changed)
    }

    async fn downgrade(
        &self,
        subscription_id: &str,
        from: TrialStatus,
        plan: &str,
    ) -> Result<bool> {
        let changed = {
            let mut records = self.records.lock();
            match records.get_mut(subscription_id) {
                Some(record) if record.status == from => {
                    record.plan = plan.to_string();
                    record.status = TrialStatus::ExpiredDowngraded;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.write_through()?;
        }
        Ok(changed)
    }
}
