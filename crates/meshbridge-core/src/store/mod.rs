// ── Device registry ──
//
// One record per device address. Lookup-or-insert is serialized per
// address so concurrent announcements of the same device never create two
// records. Every change is republished as a key-ordered device snapshot.

mod collection;
mod record;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use self::collection::EntityCollection;
use crate::model::{Device, DeviceAddress};
use crate::stream::DeviceStream;

pub use record::{DeviceHandle, DeviceRecord, Identity};

/// Registry of every device discovered since startup.
///
/// Records are never removed.
pub struct DeviceRegistry {
    records: DashMap<DeviceAddress, DeviceHandle>,
    locks: DashMap<DeviceAddress, Arc<Mutex<()>>>,
    devices_found: AtomicU64,
    devices: EntityCollection<DeviceAddress, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            locks: DashMap::new(),
            devices_found: AtomicU64::new(0),
            devices: EntityCollection::new(),
        }
    }

    /// Take the entry for `address`, waiting for any other holder of the
    /// same address to finish first.
    pub async fn entry(&self, address: DeviceAddress) -> RegistryEntry<'_> {
        let lock = Arc::clone(self.locks.entry(address).or_default().value());
        let guard = lock.lock_owned().await;

        match self.get(address) {
            Some(record) => RegistryEntry::Occupied(OccupiedEntry {
                registry: self,
                record,
                _guard: guard,
            }),
            None => RegistryEntry::Vacant(VacantEntry {
                registry: self,
                address,
                _guard: guard,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn get(&self, address: DeviceAddress) -> Option<DeviceHandle> {
        self.records.get(&address).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, ordered by address.
    pub fn records(&self) -> Vec<DeviceHandle> {
        let mut records: Vec<DeviceHandle> =
            self.records.iter().map(|r| Arc::clone(r.value())).collect();
        records.sort_by_key(|r| r.address());
        records
    }

    /// Devices created since startup. Never decremented.
    pub fn devices_found(&self) -> u64 {
        self.devices_found.load(Ordering::SeqCst)
    }

    /// Snapshot view of every device.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    /// Subscribe to device list changes.
    pub fn devices(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    /// Number of snapshot publications so far.
    pub fn version(&self) -> u64 {
        self.devices.version()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn store(&self, record: DeviceRecord) -> DeviceHandle {
        let address = record.address();
        let device = record.to_device();
        let handle = Arc::new(record);
        self.records.insert(address, Arc::clone(&handle));
        self.devices.upsert(address, device);
        handle
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Entry API ────────────────────────────────────────────────────────

/// Exclusive view of one address in the registry.
///
/// The per-address guard is held until the entry is dropped.
pub enum RegistryEntry<'a> {
    Occupied(OccupiedEntry<'a>),
    Vacant(VacantEntry<'a>),
}

pub struct OccupiedEntry<'a> {
    registry: &'a DeviceRegistry,
    record: DeviceHandle,
    _guard: OwnedMutexGuard<()>,
}

impl OccupiedEntry<'_> {
    pub fn get(&self) -> &DeviceHandle {
        &self.record
    }

    /// Swap in an updated copy of the record.
    pub fn replace(self, record: DeviceRecord) -> DeviceHandle {
        self.registry.store(record)
    }
}

pub struct VacantEntry<'a> {
    registry: &'a DeviceRegistry,
    address: DeviceAddress,
    _guard: OwnedMutexGuard<()>,
}

impl VacantEntry<'_> {
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Register a new device and count it as found.
    pub fn insert(self, record: DeviceRecord) -> DeviceHandle {
        self.registry.devices_found.fetch_add(1, Ordering::SeqCst);
        self.registry.store(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn record(address: u64) -> DeviceRecord {
        DeviceRecord::new(
            DeviceAddress::new(address),
            &Identity::default(),
            None,
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn vacant_insert_counts_device() {
        let registry = DeviceRegistry::new();
        match registry.entry(DeviceAddress::new(1)).await {
            RegistryEntry::Vacant(entry) => {
                entry.insert(record(1));
            }
            RegistryEntry::Occupied(_) => panic!("expected vacant entry"),
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.devices_found(), 1);

        match registry.entry(DeviceAddress::new(1)).await {
            RegistryEntry::Occupied(entry) => {
                entry.replace(record(1));
            }
            RegistryEntry::Vacant(_) => panic!("expected occupied entry"),
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.devices_found(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_exclusive_per_address() {
        let registry = Arc::new(DeviceRegistry::new());
        let first = registry.entry(DeviceAddress::new(9)).await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                matches!(
                    registry.entry(DeviceAddress::new(9)).await,
                    RegistryEntry::Occupied(_)
                )
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        // Other addresses are not blocked.
        assert!(matches!(
            registry.entry(DeviceAddress::new(10)).await,
            RegistryEntry::Vacant(_)
        ));

        match first {
            RegistryEntry::Vacant(entry) => {
                entry.insert(record(9));
            }
            RegistryEntry::Occupied(_) => panic!("expected vacant entry"),
        }
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn records_are_address_ordered() {
        let registry = DeviceRegistry::new();
        for address in [3, 1, 2] {
            if let RegistryEntry::Vacant(entry) = registry.entry(DeviceAddress::new(address)).await {
                entry.insert(record(address));
            }
        }
        let order: Vec<u64> = registry.records().iter().map(|r| r.address().as_u64()).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(registry.snapshot().len(), 3);
        assert_eq!(registry.version(), 3);
    }
}
