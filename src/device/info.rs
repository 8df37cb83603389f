//! The device info registry.
//!
//! One instance per connected device. Keeps the table rows received in
//! earlier updates so that rows referencing other rows (a MAC entry's
//! logical-switch ref, a locator ref) can be resolved even when the update
//! that needs them does not carry them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::notation::Row;

use super::queue::{DependencyQueue, DependentJob};
use super::{DeviceKey, RowClass};

/// Availability of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceDataStatus {
    /// A mutation has been submitted to the device but not yet confirmed.
    InTransit,
    Unavailable,
    Available,
}

/// One registry record: logical key, optional device-assigned uuid, the row
/// payload, and its availability.
#[derive(Clone, Debug)]
pub struct DeviceData {
    key: DeviceKey,
    uuid: Option<Uuid>,
    payload: Option<Row>,
    status: DeviceDataStatus,
    transit_since_ms: u64,
}

impl DeviceData {
    fn new(
        key: DeviceKey,
        uuid: Option<Uuid>,
        payload: Option<Row>,
        status: DeviceDataStatus,
    ) -> Self {
        let transit_since_ms = if status == DeviceDataStatus::InTransit {
            now_ms()
        } else {
            0
        };
        DeviceData {
            key,
            uuid,
            payload,
            status,
            transit_since_ms,
        }
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn payload(&self) -> Option<&Row> {
        self.payload.as_ref()
    }

    pub fn status(&self) -> DeviceDataStatus {
        self.status
    }

    pub fn is_in_transit(&self) -> bool {
        self.status == DeviceDataStatus::InTransit
    }

    /// An IN_TRANSIT entry older than the expiry belongs to a transaction
    /// presumed lost; dependents may stop waiting on it.
    pub fn is_transit_expired(&self, expiry_ms: u64) -> bool {
        now_ms() > self.transit_since_ms + expiry_ms
    }
}

/// A remote unicast MAC entry; references its locator by key.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteUcastMac {
    pub mac: String,
    pub ip_addr: Option<String>,
    pub locator_ref: DeviceKey,
}

/// A remote multicast MAC entry; references a set of locators.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteMcastMac {
    pub mac: String,
    pub locator_set: Vec<DeviceKey>,
}

#[derive(Default)]
struct Inner {
    config_key_vs_data: HashMap<RowClass, HashMap<DeviceKey, DeviceData>>,
    op_key_vs_data: HashMap<RowClass, HashMap<DeviceKey, DeviceData>>,
    uuid_vs_data: HashMap<RowClass, HashMap<Uuid, Row>>,
    tep_references: HashMap<DeviceKey, HashSet<DeviceKey>>,
    ucasts_by_switch: HashMap<DeviceKey, HashMap<DeviceKey, RemoteUcastMac>>,
    mcasts_by_switch: HashMap<DeviceKey, HashMap<DeviceKey, RemoteMcastMac>>,
    tunnel_to_physical_switch: HashMap<Uuid, Uuid>,
}

/// Per-connection registry of device state.
///
/// All mutating transitions run under one registry mutex, which makes the
/// oper/uuid pair update, the dec-to-zero transit transition, and the bulk
/// clear-except-in-transit atomic. Lookups never fail on missing keys; they
/// return `None` and log at debug.
pub struct DeviceInfo {
    inner: Mutex<Inner>,
    queue: DependencyQueue,
    transit_expiry_ms: u64,
}

impl DeviceInfo {
    pub fn new(transit_expiry_ms: u64, worker_name: &str) -> Arc<DeviceInfo> {
        Arc::new(DeviceInfo {
            inner: Mutex::new(Inner::default()),
            queue: DependencyQueue::new(worker_name),
            transit_expiry_ms,
        })
    }

    pub fn transit_expiry_ms(&self) -> u64 {
        self.transit_expiry_ms
    }

    // === Oper side ===

    /// Records a row the device has confirmed. The key-indexed and
    /// uuid-indexed entries are updated as one atomic pair.
    pub fn update_device_oper_data(
        &self,
        class: RowClass,
        key: &DeviceKey,
        uuid: Uuid,
        payload: Row,
    ) {
        tracing::debug!(%class, %key, "updating device data");
        let mut inner = self.lock();
        inner.op_key_vs_data.entry(class).or_default().insert(
            key.clone(),
            DeviceData::new(
                key.clone(),
                Some(uuid),
                Some(payload.clone()),
                DeviceDataStatus::Available,
            ),
        );
        inner
            .uuid_vs_data
            .entry(class)
            .or_default()
            .insert(uuid, payload);
    }

    /// Flips an entry to IN_TRANSIT with a fresh timestamp, preserving any
    /// current uuid and payload.
    pub fn mark_key_as_in_transit(&self, class: RowClass, key: &DeviceKey) {
        tracing::debug!(%class, %key, "marking device data as in transit");
        let mut inner = self.lock();
        mark_in_transit_locked(&mut inner, class, key);
    }

    /// Reverts an IN_TRANSIT entry: back to AVAILABLE if it still has a
    /// payload, erased entirely otherwise.
    pub fn clear_in_transit(&self, class: RowClass, key: &DeviceKey) {
        let mut inner = self.lock();
        let Some(data) = inner
            .op_key_vs_data
            .get(&class)
            .and_then(|m| m.get(key))
            .cloned()
        else {
            return;
        };
        if !data.is_in_transit() {
            return;
        }
        if data.payload.is_some() {
            inner.op_key_vs_data.entry(class).or_default().insert(
                key.clone(),
                DeviceData::new(
                    key.clone(),
                    data.uuid,
                    data.payload,
                    DeviceDataStatus::Available,
                ),
            );
        } else {
            clear_oper_locked(&mut inner, class, key);
        }
    }

    /// Erases one oper entry; a bound uuid entry goes with it.
    pub fn clear_device_oper_data(&self, class: RowClass, key: &DeviceKey) {
        let mut inner = self.lock();
        clear_oper_locked(&mut inner, class, key);
    }

    /// Bulk erase of a class, keeping entries currently IN_TRANSIT: those
    /// are owned by an in-flight transaction and must not be dropped.
    pub fn clear_device_oper_class(&self, class: RowClass) {
        let mut inner = self.lock();
        let Some(entries) = inner.op_key_vs_data.get_mut(&class) else {
            return;
        };
        let removed: Vec<Uuid> = entries
            .values()
            .filter(|d| !d.is_in_transit())
            .filter_map(|d| d.uuid)
            .collect();
        entries.retain(|_, data| data.is_in_transit());
        if let Some(by_uuid) = inner.uuid_vs_data.get_mut(&class) {
            for uuid in removed {
                by_uuid.remove(&uuid);
            }
        }
    }

    pub fn get_device_oper_data(&self, class: RowClass, key: &DeviceKey) -> Option<DeviceData> {
        self.lock()
            .op_key_vs_data
            .get(&class)
            .and_then(|m| m.get(key))
            .cloned()
    }

    pub fn get_device_oper_data_by_uuid(&self, class: RowClass, uuid: Uuid) -> Option<Row> {
        self.lock()
            .uuid_vs_data
            .get(&class)
            .and_then(|m| m.get(&uuid))
            .cloned()
    }

    /// Snapshot of a class's oper entries.
    pub fn get_device_oper_class(&self, class: RowClass) -> HashMap<DeviceKey, DeviceData> {
        self.lock()
            .op_key_vs_data
            .get(&class)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_uuid(&self, class: RowClass, key: &DeviceKey) -> Option<Uuid> {
        self.lock()
            .op_key_vs_data
            .get(&class)
            .and_then(|m| m.get(key))
            .and_then(|d| d.uuid)
    }

    pub fn is_key_in_transit(&self, class: RowClass, key: &DeviceKey) -> bool {
        self.lock()
            .op_key_vs_data
            .get(&class)
            .and_then(|m| m.get(key))
            .is_some_and(DeviceData::is_in_transit)
    }

    // === Config side ===

    pub fn update_config_data(&self, class: RowClass, key: &DeviceKey, payload: Row) {
        self.lock().config_key_vs_data.entry(class).or_default().insert(
            key.clone(),
            DeviceData::new(key.clone(), None, Some(payload), DeviceDataStatus::Available),
        );
    }

    pub fn get_config_data(&self, class: RowClass, key: &DeviceKey) -> Option<Row> {
        self.lock()
            .config_key_vs_data
            .get(&class)
            .and_then(|m| m.get(key))
            .and_then(|d| d.payload.clone())
    }

    pub fn is_config_data_available(&self, class: RowClass, key: &DeviceKey) -> bool {
        self.lock()
            .config_key_vs_data
            .get(&class)
            .is_some_and(|m| m.contains_key(key))
    }

    pub fn clear_config_data(&self, class: RowClass, key: &DeviceKey) {
        if let Some(entries) = self.lock().config_key_vs_data.get_mut(&class) {
            entries.remove(key);
        }
    }

    // === Termination point reference counting ===

    /// Registers `referrer` as holding a reference on `tep`; the referrer
    /// set is created lazily.
    pub fn inc_ref_count(&self, referrer: &DeviceKey, tep: &DeviceKey) {
        self.lock()
            .tep_references
            .entry(tep.clone())
            .or_default()
            .insert(referrer.clone());
    }

    /// Drops `referrer`'s reference on `tep`. The remove-and-check runs
    /// under the registry mutex so that two concurrent last-reference
    /// removals cannot both observe an empty set: exactly one of them marks
    /// the termination point IN_TRANSIT (it is about to be deleted on the
    /// device).
    pub fn dec_ref_count(&self, referrer: &DeviceKey, tep: &DeviceKey) {
        let mut inner = self.lock();
        dec_ref_locked(&mut inner, referrer, tep);
    }

    pub fn get_ref_count(&self, tep: &DeviceKey) -> usize {
        self.lock()
            .tep_references
            .get(tep)
            .map_or(0, HashSet::len)
    }

    pub fn get_referrers(&self, tep: &DeviceKey) -> HashSet<DeviceKey> {
        self.lock()
            .tep_references
            .get(tep)
            .cloned()
            .unwrap_or_default()
    }

    // === Remote MAC tables ===

    pub fn update_remote_ucast(
        &self,
        logical_switch: &DeviceKey,
        ucast_key: &DeviceKey,
        mac: RemoteUcastMac,
    ) {
        let mut inner = self.lock();
        inner
            .tep_references
            .entry(mac.locator_ref.clone())
            .or_default()
            .insert(ucast_key.clone());
        inner
            .ucasts_by_switch
            .entry(logical_switch.clone())
            .or_default()
            .insert(ucast_key.clone(), mac);
    }

    pub fn update_remote_mcast(
        &self,
        logical_switch: &DeviceKey,
        mcast_key: &DeviceKey,
        mac: RemoteMcastMac,
    ) {
        let mut inner = self.lock();
        for locator in &mac.locator_set {
            inner
                .tep_references
                .entry(locator.clone())
                .or_default()
                .insert(mcast_key.clone());
        }
        inner
            .mcasts_by_switch
            .entry(logical_switch.clone())
            .or_default()
            .insert(mcast_key.clone(), mac);
    }

    pub fn remove_remote_ucast(&self, logical_switch: &DeviceKey, ucast_key: &DeviceKey) {
        let mut inner = self.lock();
        remove_remote_ucast_locked(&mut inner, logical_switch, ucast_key);
    }

    pub fn remove_remote_mcast(&self, logical_switch: &DeviceKey, mcast_key: &DeviceKey) {
        let mut inner = self.lock();
        remove_remote_mcast_locked(&mut inner, logical_switch, mcast_key);
    }

    /// Removes every ucast and mcast entry under a logical switch through
    /// the individual remove paths (releasing their locator references),
    /// then marks the switch itself IN_TRANSIT.
    pub fn clear_logical_switch_refs(&self, logical_switch: &DeviceKey) {
        let mut inner = self.lock();
        let mcast_keys: Vec<DeviceKey> = inner
            .mcasts_by_switch
            .get(logical_switch)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for key in mcast_keys {
            remove_remote_mcast_locked(&mut inner, logical_switch, &key);
        }
        let ucast_keys: Vec<DeviceKey> = inner
            .ucasts_by_switch
            .get(logical_switch)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for key in ucast_keys {
            remove_remote_ucast_locked(&mut inner, logical_switch, &key);
        }
        mark_in_transit_locked(&mut inner, RowClass::LogicalSwitch, logical_switch);
    }

    pub fn get_remote_ucasts(&self, logical_switch: &DeviceKey) -> HashMap<DeviceKey, RemoteUcastMac> {
        self.lock()
            .ucasts_by_switch
            .get(logical_switch)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_remote_mcasts(&self, logical_switch: &DeviceKey) -> HashMap<DeviceKey, RemoteMcastMac> {
        self.lock()
            .mcasts_by_switch
            .get(logical_switch)
            .cloned()
            .unwrap_or_default()
    }

    // === Tunnel bookkeeping ===

    pub fn put_physical_switch_for_tunnel(&self, tunnel: Uuid, physical_switch: Uuid) {
        self.lock()
            .tunnel_to_physical_switch
            .insert(tunnel, physical_switch);
    }

    pub fn get_physical_switch_for_tunnel(&self, tunnel: Uuid) -> Option<Row> {
        let inner = self.lock();
        let physical_switch = inner.tunnel_to_physical_switch.get(&tunnel)?;
        inner
            .uuid_vs_data
            .get(&RowClass::PhysicalSwitch)
            .and_then(|m| m.get(physical_switch))
            .cloned()
    }

    pub fn remove_physical_switch_for_tunnel(&self, tunnel: Uuid) {
        self.lock().tunnel_to_physical_switch.remove(&tunnel);
    }

    // === Dependency queue hooks ===

    /// Queues a job, or runs it right away when everything it waits on is
    /// already present and settled.
    pub fn add_job_to_queue(self: &Arc<Self>, job: DependentJob) {
        self.queue.add_to_queue(self, job);
    }

    pub fn on_config_data_available(self: &Arc<Self>) {
        self.queue.process_ready_jobs_from_config_queue(self);
    }

    pub fn on_oper_data_available(self: &Arc<Self>) {
        self.queue.process_ready_jobs_from_op_queue(self);
    }

    /// Serializes an ordinary dispatch onto the queue worker, so replays
    /// and normal mutations share ordering discipline.
    pub fn schedule_transaction(&self, work: impl FnOnce() + Send + 'static) {
        self.queue.submit(work);
    }

    /// Stops the worker and drains queued jobs without running them.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    /// A dependency is met when its entry exists and is not sitting in a
    /// live (non-expired) IN_TRANSIT state.
    pub(super) fn dependencies_met(&self, job: &DependentJob) -> bool {
        let inner = self.lock();
        for (class, key) in job.config_dependencies() {
            match inner.config_key_vs_data.get(class).and_then(|m| m.get(key)) {
                None => return false,
                Some(data) => {
                    if data.is_in_transit() && !data.is_transit_expired(self.transit_expiry_ms) {
                        return false;
                    }
                }
            }
        }
        for (class, key) in job.op_dependencies() {
            match inner.op_key_vs_data.get(class).and_then(|m| m.get(key)) {
                None => return false,
                Some(data) => {
                    if data.is_in_transit() && !data.is_transit_expired(self.transit_expiry_ms) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("device info lock")
    }
}

fn mark_in_transit_locked(inner: &mut Inner, class: RowClass, key: &DeviceKey) {
    let (uuid, payload) = inner
        .op_key_vs_data
        .get(&class)
        .and_then(|m| m.get(key))
        .map(|d| (d.uuid, d.payload.clone()))
        .unwrap_or((None, None));
    inner.op_key_vs_data.entry(class).or_default().insert(
        key.clone(),
        DeviceData::new(key.clone(), uuid, payload, DeviceDataStatus::InTransit),
    );
}

fn clear_oper_locked(inner: &mut Inner, class: RowClass, key: &DeviceKey) {
    let uuid = inner
        .op_key_vs_data
        .get(&class)
        .and_then(|m| m.get(key))
        .and_then(|d| d.uuid);
    if let Some(uuid) = uuid
        && let Some(by_uuid) = inner.uuid_vs_data.get_mut(&class)
    {
        by_uuid.remove(&uuid);
    }
    if let Some(entries) = inner.op_key_vs_data.get_mut(&class) {
        entries.remove(key);
    }
}

fn dec_ref_locked(inner: &mut Inner, referrer: &DeviceKey, tep: &DeviceKey) {
    let Some(referrers) = inner.tep_references.get_mut(tep) else {
        return;
    };
    let removed = referrers.remove(referrer);
    if removed && referrers.is_empty() {
        tracing::debug!(%tep, "ref count zero, marking termination point as in transit");
        mark_in_transit_locked(inner, RowClass::PhysicalLocator, tep);
    }
}

fn remove_remote_ucast_locked(inner: &mut Inner, logical_switch: &DeviceKey, ucast_key: &DeviceKey) {
    let Some(entries) = inner.ucasts_by_switch.get_mut(logical_switch) else {
        return;
    };
    if let Some(mac) = entries.remove(ucast_key) {
        dec_ref_locked(inner, ucast_key, &mac.locator_ref);
    }
    mark_in_transit_locked(inner, RowClass::RemoteUcastMac, ucast_key);
}

fn remove_remote_mcast_locked(inner: &mut Inner, logical_switch: &DeviceKey, mcast_key: &DeviceKey) {
    let Some(entries) = inner.mcasts_by_switch.get_mut(logical_switch) else {
        return;
    };
    if let Some(mac) = entries.remove(mcast_key) {
        for locator in &mac.locator_set {
            dec_ref_locked(inner, mcast_key, locator);
        }
    }
    mark_in_transit_locked(inner, RowClass::RemoteMcastMac, mcast_key);
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn registry() -> Arc<DeviceInfo> {
        DeviceInfo::new(30_000, "ovsdb-worker-test")
    }

    fn key(s: &str) -> DeviceKey {
        DeviceKey::from(s)
    }

    fn row(name: &str) -> Row {
        Row::new().with("name", name)
    }

    #[test]
    fn oper_update_binds_key_and_uuid() {
        let info = registry();
        let ls = key("ls1");
        let uuid = Uuid::new_v4();
        info.update_device_oper_data(RowClass::LogicalSwitch, &ls, uuid, row("ls1"));

        let data = info.get_device_oper_data(RowClass::LogicalSwitch, &ls).unwrap();
        assert_eq!(data.status(), DeviceDataStatus::Available);
        assert_eq!(data.uuid(), Some(uuid));
        assert_eq!(data.payload(), Some(&row("ls1")));
        assert_eq!(
            info.get_device_oper_data_by_uuid(RowClass::LogicalSwitch, uuid),
            Some(row("ls1"))
        );
        assert_eq!(info.get_uuid(RowClass::LogicalSwitch, &ls), Some(uuid));
    }

    #[test]
    fn clear_oper_data_erases_uuid_entry_too() {
        let info = registry();
        let ls = key("ls1");
        let uuid = Uuid::new_v4();
        info.update_device_oper_data(RowClass::LogicalSwitch, &ls, uuid, row("ls1"));

        info.clear_device_oper_data(RowClass::LogicalSwitch, &ls);
        assert!(info.get_device_oper_data(RowClass::LogicalSwitch, &ls).is_none());
        assert!(
            info.get_device_oper_data_by_uuid(RowClass::LogicalSwitch, uuid)
                .is_none()
        );
    }

    #[test]
    fn mark_in_transit_preserves_payload_and_clear_reverts() {
        let info = registry();
        let ls = key("ls1");
        let uuid = Uuid::new_v4();
        info.update_device_oper_data(RowClass::LogicalSwitch, &ls, uuid, row("ls1"));

        info.mark_key_as_in_transit(RowClass::LogicalSwitch, &ls);
        assert!(info.is_key_in_transit(RowClass::LogicalSwitch, &ls));
        let data = info.get_device_oper_data(RowClass::LogicalSwitch, &ls).unwrap();
        assert_eq!(data.uuid(), Some(uuid));
        assert_eq!(data.payload(), Some(&row("ls1")));

        info.clear_in_transit(RowClass::LogicalSwitch, &ls);
        let data = info.get_device_oper_data(RowClass::LogicalSwitch, &ls).unwrap();
        assert_eq!(data.status(), DeviceDataStatus::Available);
        assert_eq!(data.payload(), Some(&row("ls1")));
    }

    #[test]
    fn clear_in_transit_without_payload_erases_entry() {
        let info = registry();
        let ls = key("ghost");
        info.mark_key_as_in_transit(RowClass::LogicalSwitch, &ls);
        assert!(info.is_key_in_transit(RowClass::LogicalSwitch, &ls));

        info.clear_in_transit(RowClass::LogicalSwitch, &ls);
        assert!(info.get_device_oper_data(RowClass::LogicalSwitch, &ls).is_none());
    }

    #[test]
    fn bulk_clear_keeps_in_transit_entries() {
        let info = registry();
        let a = key("a");
        let b = key("b");
        info.update_device_oper_data(RowClass::LogicalSwitch, &a, Uuid::new_v4(), row("a"));
        info.update_device_oper_data(RowClass::LogicalSwitch, &b, Uuid::new_v4(), row("b"));
        info.mark_key_as_in_transit(RowClass::LogicalSwitch, &b);

        info.clear_device_oper_class(RowClass::LogicalSwitch);
        assert!(info.get_device_oper_data(RowClass::LogicalSwitch, &a).is_none());
        assert!(info.get_device_oper_data(RowClass::LogicalSwitch, &b).is_some());
    }

    #[test]
    fn missing_lookups_are_none_not_errors() {
        let info = registry();
        let nope = key("nope");
        assert!(info.get_device_oper_data(RowClass::Tunnel, &nope).is_none());
        assert!(!info.is_key_in_transit(RowClass::Tunnel, &nope));
        assert!(!info.is_config_data_available(RowClass::Tunnel, &nope));
        assert_eq!(info.get_ref_count(&nope), 0);
        info.dec_ref_count(&nope, &nope);
        info.clear_config_data(RowClass::Tunnel, &nope);
    }

    #[test]
    fn last_reference_marks_tep_in_transit() {
        let info = registry();
        let tep = key("tep-x");
        let u1 = key("ucast-1");
        let u2 = key("ucast-2");
        info.inc_ref_count(&u1, &tep);
        info.inc_ref_count(&u2, &tep);
        assert_eq!(info.get_ref_count(&tep), 2);

        info.dec_ref_count(&u1, &tep);
        assert_eq!(info.get_ref_count(&tep), 1);
        assert!(!info.is_key_in_transit(RowClass::PhysicalLocator, &tep));

        info.dec_ref_count(&u2, &tep);
        assert_eq!(info.get_ref_count(&tep), 0);
        assert!(info.is_key_in_transit(RowClass::PhysicalLocator, &tep));
    }

    #[test]
    fn concurrent_last_references_yield_one_transition() {
        for _ in 0..32 {
            let info = registry();
            let tep = key("tep-x");
            let u1 = key("ucast-1");
            let u2 = key("ucast-2");
            info.inc_ref_count(&u1, &tep);
            info.inc_ref_count(&u2, &tep);

            let (a, b) = (Arc::clone(&info), Arc::clone(&info));
            let (tep_a, tep_b) = (tep.clone(), tep.clone());
            let t1 = thread::spawn(move || a.dec_ref_count(&u1, &tep_a));
            let t2 = thread::spawn(move || b.dec_ref_count(&u2, &tep_b));
            t1.join().unwrap();
            t2.join().unwrap();

            assert_eq!(info.get_ref_count(&tep), 0);
            assert!(info.is_key_in_transit(RowClass::PhysicalLocator, &tep));
        }
    }

    #[test]
    fn ucast_lifecycle_tracks_locator_references() {
        let info = registry();
        let ls = key("ls1");
        let ucast = key("mac-aa");
        let tep = key("tep-x");
        info.update_remote_ucast(
            &ls,
            &ucast,
            RemoteUcastMac {
                mac: "aa:bb:cc:dd:ee:ff".into(),
                ip_addr: None,
                locator_ref: tep.clone(),
            },
        );
        assert_eq!(info.get_ref_count(&tep), 1);
        assert_eq!(info.get_remote_ucasts(&ls).len(), 1);

        info.remove_remote_ucast(&ls, &ucast);
        assert_eq!(info.get_ref_count(&tep), 0);
        assert!(info.get_remote_ucasts(&ls).is_empty());
        assert!(info.is_key_in_transit(RowClass::RemoteUcastMac, &ucast));
        // Dropping the last reference marked the locator too.
        assert!(info.is_key_in_transit(RowClass::PhysicalLocator, &tep));
    }

    #[test]
    fn clear_logical_switch_refs_removes_macs_and_marks_switch() {
        let info = registry();
        let ls = key("ls1");
        let ucast = key("mac-aa");
        let mcast = key("mac-bcast");
        let tep1 = key("tep-1");
        let tep2 = key("tep-2");
        info.update_remote_ucast(
            &ls,
            &ucast,
            RemoteUcastMac {
                mac: "aa:aa:aa:aa:aa:aa".into(),
                ip_addr: Some("10.0.0.1".into()),
                locator_ref: tep1.clone(),
            },
        );
        info.update_remote_mcast(
            &ls,
            &mcast,
            RemoteMcastMac {
                mac: "unknown-dst".into(),
                locator_set: vec![tep1.clone(), tep2.clone()],
            },
        );
        assert_eq!(info.get_ref_count(&tep1), 2);
        assert_eq!(info.get_ref_count(&tep2), 1);

        info.clear_logical_switch_refs(&ls);
        assert!(info.get_remote_ucasts(&ls).is_empty());
        assert!(info.get_remote_mcasts(&ls).is_empty());
        assert_eq!(info.get_ref_count(&tep1), 0);
        assert_eq!(info.get_ref_count(&tep2), 0);
        assert!(info.is_key_in_transit(RowClass::LogicalSwitch, &ls));
    }

    #[test]
    fn tunnel_mirror_resolves_physical_switch() {
        let info = registry();
        let ps_key = key("ps1");
        let ps_uuid = Uuid::new_v4();
        let tunnel = Uuid::new_v4();
        info.update_device_oper_data(RowClass::PhysicalSwitch, &ps_key, ps_uuid, row("ps1"));
        info.put_physical_switch_for_tunnel(tunnel, ps_uuid);

        assert_eq!(info.get_physical_switch_for_tunnel(tunnel), Some(row("ps1")));
        info.remove_physical_switch_for_tunnel(tunnel);
        assert_eq!(info.get_physical_switch_for_tunnel(tunnel), None);
    }

    #[test]
    fn config_side_roundtrip() {
        let info = registry();
        let ls = key("ls1");
        assert!(!info.is_config_data_available(RowClass::LogicalSwitch, &ls));
        info.update_config_data(RowClass::LogicalSwitch, &ls, row("ls1"));
        assert!(info.is_config_data_available(RowClass::LogicalSwitch, &ls));
        assert_eq!(info.get_config_data(RowClass::LogicalSwitch, &ls), Some(row("ls1")));
        info.clear_config_data(RowClass::LogicalSwitch, &ls);
        assert!(!info.is_config_data_available(RowClass::LogicalSwitch, &ls));
    }
}
