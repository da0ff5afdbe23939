//! Concurrent registry of observed beacons.
//!
//! The registry is the sole owner of all [`DeviceRecord`]s. It is shared
//! between the ingestion path (high-frequency writer) and the reporting cycle
//! (low-frequency reader and bulk deleter), so the map is split into shards
//! and each record sits behind its own mutex: events for distinct identities
//! never contend beyond a brief shard-map access, and a snapshot never holds
//! any lock for the duration of the whole scan.

use crate::device::{DeviceRecord, DeviceView};
use crate::device_id::DeviceId;
use log::debug;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, SystemTime};

const SHARD_COUNT: usize = 16;

type Shard = RwLock<HashMap<DeviceId, Arc<Mutex<DeviceRecord>>>>;

/// Shared handle to a single record.
///
/// Handles are borrowed for the duration of one event's processing and must
/// not be retained across events: the record behind an identity may be
/// evicted and recreated in between.
pub type RecordHandle = Arc<Mutex<DeviceRecord>>;

/// Concurrent map from device identity to device record.
pub struct DeviceRegistry {
    shards: Vec<Shard>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &DeviceId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Return the record for `id`, creating and inserting it first if the
    /// identity has not been observed yet.
    ///
    /// At most one record ever exists per identity, also under concurrent
    /// calls for the same identity: the insert happens under the shard's
    /// write lock, and a racing caller that lost the insert finds the
    /// winner's entry.
    pub fn upsert(&self, id: DeviceId) -> RecordHandle {
        let shard = self.shard(&id);

        if let Some(record) = read_lock(shard).get(&id) {
            return Arc::clone(record);
        }

        let mut map = write_lock(shard);
        Arc::clone(
            map.entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(DeviceRecord::new(id)))),
        )
    }

    /// Number of records currently registered.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| read_lock(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| read_lock(s).is_empty())
    }

    /// Copies of all records seen within `max_age`, most recently seen
    /// first, ties broken by identity.
    ///
    /// The copies do not alias live state; mutations that happen after the
    /// snapshot are not visible in it. Writers are only ever blocked for a
    /// single shard-map access or a single record clone, never for the whole
    /// scan.
    pub fn snapshot(&self, max_age: Duration) -> Vec<DeviceRecord> {
        self.snapshot_at(max_age, SystemTime::now())
    }

    pub fn snapshot_at(&self, max_age: Duration, now: SystemTime) -> Vec<DeviceRecord> {
        let mut records = Vec::new();
        for shard in &self.shards {
            // Collect handles first so the shard lock is released before the
            // per-record locks are taken.
            let handles: Vec<RecordHandle> = read_lock(shard).values().map(Arc::clone).collect();
            for handle in handles {
                let record = lock_record(&handle);
                if record.age(now) <= max_age {
                    records.push(record.clone());
                }
            }
        }
        records.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        records
    }

    /// Full views of all records seen within `max_age`, in snapshot order.
    ///
    /// This is the read-only query surface handed to collaborators outside
    /// the reporting cycle.
    pub fn device_views(&self, max_age: Duration) -> Vec<DeviceView> {
        self.snapshot(max_age)
            .iter()
            .map(DeviceRecord::view_full)
            .collect()
    }

    /// Remove every record whose age exceeds `max_age` and return the number
    /// removed.
    ///
    /// Safe to run concurrently with `upsert` and `snapshot`; a snapshot
    /// taken earlier keeps its copies regardless of removals.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        self.evict_older_than_at(max_age, SystemTime::now())
    }

    pub fn evict_older_than_at(&self, max_age: Duration, now: SystemTime) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut map = write_lock(shard);
            map.retain(|_, handle| {
                let keep = lock_record(handle).age(now) <= max_age;
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        if removed > 0 {
            debug!(
                "evicted {} stale devices older than {:?}, {} remaining",
                removed,
                max_age,
                self.len()
            );
        }
        removed
    }
}

// Lock helpers that recover from poisoning: a panic in another thread must
// not take the registry down with it.

fn read_lock(shard: &Shard) -> std::sync::RwLockReadGuard<'_, HashMap<DeviceId, RecordHandle>> {
    shard.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(shard: &Shard) -> std::sync::RwLockWriteGuard<'_, HashMap<DeviceId, RecordHandle>> {
    shard.write().unwrap_or_else(|e| e.into_inner())
}

/// Lock a record handle, recovering from poisoning.
pub fn lock_record(handle: &RecordHandle) -> MutexGuard<'_, DeviceRecord> {
    handle.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SensorKind;
    use crate::test_utils::TEST_ID;
    use std::time::Duration;

    fn id(last_byte: u8) -> DeviceId {
        DeviceId([0x00, 0x11, 0x22, 0x33, 0x44, last_byte])
    }

    #[test]
    fn test_upsert_creates_then_reuses() {
        let registry = DeviceRegistry::new();
        let first = registry.upsert(TEST_ID);
        lock_record(&first).observe_presence(Some("tag"), -50);

        let second = registry.upsert(TEST_ID);
        assert_eq!(lock_record(&second).display_name.as_deref(), Some("tag"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_upsert_single_record_per_identity() {
        let registry = DeviceRegistry::new();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..100u8 {
                        let handle = registry.upsert(id(i % 4));
                        lock_record(&handle).observe_presence(None, -50);
                    }
                });
            }
        });

        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_snapshot_window_filters_by_age() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence_at(None, -50, now - Duration::from_secs(45));

        assert_eq!(registry.snapshot_at(Duration::from_secs(60), now).len(), 1);
        assert_eq!(registry.snapshot_at(Duration::from_secs(30), now).len(), 0);
    }

    #[test]
    fn test_snapshot_orders_most_recent_first() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        for (device, age) in [(id(1), 30), (id(2), 10), (id(3), 20)] {
            let handle = registry.upsert(device);
            lock_record(&handle).observe_presence_at(None, -50, now - Duration::from_secs(age));
        }

        let snapshot = registry.snapshot_at(Duration::from_secs(60), now);
        let order: Vec<DeviceId> = snapshot.iter().map(|r| r.identity).collect();
        assert_eq!(order, vec![id(2), id(3), id(1)]);
    }

    #[test]
    fn test_snapshot_breaks_ties_by_identity() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();
        let seen = now - Duration::from_secs(5);

        for device in [id(9), id(1), id(5)] {
            let handle = registry.upsert(device);
            lock_record(&handle).observe_presence_at(None, -50, seen);
        }

        let snapshot = registry.snapshot_at(Duration::from_secs(60), now);
        let order: Vec<DeviceId> = snapshot.iter().map(|r| r.identity).collect();
        assert_eq!(order, vec![id(1), id(5), id(9)]);
    }

    #[test]
    fn test_snapshot_copies_do_not_alias_live_state() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence_at(None, -50, now);

        let snapshot = registry.snapshot_at(Duration::from_secs(60), now);
        lock_record(&handle).apply_sensor(SensorKind::Temperature, 25.0);

        assert!(snapshot[0].sensor_readings.is_empty());
    }

    #[test]
    fn test_device_views_match_snapshot_order() {
        let registry = DeviceRegistry::new();
        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence(Some("tag"), -50);

        let views = registry.device_views(Duration::from_secs(60));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].address, "AABBCCDDEEFF");
        assert_eq!(views[0].name.as_deref(), Some("tag"));
    }

    #[test]
    fn test_evict_removes_stale_records() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let stale = registry.upsert(id(1));
        lock_record(&stale).observe_presence_at(None, -50, now - Duration::from_secs(31));
        let fresh = registry.upsert(id(2));
        lock_record(&fresh).observe_presence_at(None, -50, now - Duration::from_secs(5));

        assert_eq!(registry.evict_older_than_at(Duration::from_secs(30), now), 1);
        assert_eq!(registry.len(), 1);

        let snapshot = registry.snapshot_at(Duration::from_secs(60), now);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].identity, id(2));
    }

    #[test]
    fn test_evict_keeps_record_exactly_at_threshold() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence_at(None, -50, now - Duration::from_secs(30));

        assert_eq!(registry.evict_older_than_at(Duration::from_secs(30), now), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_evicted_identity_can_be_recreated() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence_at(None, -50, now - Duration::from_secs(60));
        registry.evict_older_than_at(Duration::from_secs(30), now);
        assert!(registry.is_empty());

        let recreated = registry.upsert(TEST_ID);
        assert_eq!(lock_record(&recreated).signal_strength, None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_survives_concurrent_eviction() {
        let registry = DeviceRegistry::new();
        let now = SystemTime::now();

        let handle = registry.upsert(TEST_ID);
        lock_record(&handle).observe_presence_at(None, -50, now - Duration::from_secs(35));

        let snapshot = registry.snapshot_at(Duration::from_secs(60), now);
        registry.evict_older_than_at(Duration::from_secs(30), now);

        // The already-taken snapshot keeps its copy.
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
