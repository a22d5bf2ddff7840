//! The set of known radios and their peer-session rosters.
//!
//! [`DeviceTable`] holds records by identity (serial, public address) and
//! diffs each receipt against the stored copy. [`DiscoveryStore`] runs a
//! table in its own task: entry points enqueue, readers see
//! [`watch`](tokio::sync::watch) snapshots, and changes are published as
//! [`StoreEvent`]s.
//!
//! A receipt only counts as a change when one of these fields differs:
//! status, the four session columns, port, in-use host and address, public
//! address, the four public ports, callsign, model and nickname. Capacity
//! counters and licensing fields update silently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use flexkit_core::error::{Error, Result};
use flexkit_core::{DEFAULT_EVENT_CAPACITY, EventBus};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use uuid::Uuid;

use crate::discovery::{DeviceKey, DeviceRecord, Source};
use crate::roster::{PeerSession, decode_sessions};

/// Read-only view of the table.
pub type DeviceSnapshot = Arc<HashMap<DeviceKey, DeviceRecord>>;

/// Change published by the store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    RecordAdded(DeviceRecord),
    RecordUpdated(DeviceRecord),
    RecordDeleted(DeviceRecord),
    SessionAdded { key: DeviceKey, session: PeerSession },
    SessionRemoved { key: DeviceKey, session: PeerSession },
}

/// Whether `incoming` is a change worth publishing.
pub fn differs(stored: &DeviceRecord, incoming: &DeviceRecord) -> bool {
    stored.status != incoming.status
        || stored.gui_client_programs != incoming.gui_client_programs
        || stored.gui_client_stations != incoming.gui_client_stations
        || stored.gui_client_handles != incoming.gui_client_handles
        || stored.gui_client_ips != incoming.gui_client_ips
        || stored.port != incoming.port
        || stored.inuse_host != incoming.inuse_host
        || stored.inuse_ip != incoming.inuse_ip
        || stored.public_ip != incoming.public_ip
        || stored.public_tls_port != incoming.public_tls_port
        || stored.public_udp_port != incoming.public_udp_port
        || stored.public_upnp_tls_port != incoming.public_upnp_tls_port
        || stored.public_upnp_udp_port != incoming.public_upnp_udp_port
        || stored.callsign != incoming.callsign
        || stored.model != incoming.model
        || stored.nickname != incoming.nickname
}

/// Records by identity.
#[derive(Debug, Default)]
pub struct DeviceTable {
    records: HashMap<DeviceKey, DeviceRecord>,
    own_handle: Option<u32>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our own session handle, used to mark `is_this_client`.
    pub fn set_own_handle(&mut self, handle: Option<u32>) {
        self.own_handle = handle;
        for record in self.records.values_mut() {
            for session in &mut record.sessions {
                session.is_this_client = handle == Some(session.handle);
            }
        }
    }

    /// Merge one receipt.
    pub fn ingest(&mut self, mut incoming: DeviceRecord) -> Vec<StoreEvent> {
        let key = incoming.key();

        let Some(stored) = self.records.get_mut(&key) else {
            incoming.local_id = Uuid::new_v4();
            incoming.sessions = decode_sessions(&incoming.session_columns(), self.own_handle);
            tracing::debug!(
                serial = %key.serial,
                ip = %key.public_ip,
                sessions = incoming.sessions.len(),
                "Radio added"
            );
            self.records.insert(key, incoming.clone());
            return vec![StoreEvent::RecordAdded(incoming)];
        };

        if !differs(stored, &incoming) {
            stored.last_seen = incoming.last_seen;
            return Vec::new();
        }

        incoming.local_id = stored.local_id;
        incoming.sessions = decode_sessions(&incoming.session_columns(), self.own_handle);
        for session in &mut incoming.sessions {
            if let Some(old) = stored.sessions.iter().find(|s| s.handle == session.handle) {
                session.local_ptt = old.local_ptt;
            }
        }

        let old_handles: HashSet<u32> = stored.sessions.iter().map(|s| s.handle).collect();
        let new_handles: HashSet<u32> = incoming.sessions.iter().map(|s| s.handle).collect();

        let removed: Vec<PeerSession> = stored
            .sessions
            .iter()
            .filter(|s| !new_handles.contains(&s.handle))
            .cloned()
            .collect();
        let added: Vec<PeerSession> = incoming
            .sessions
            .iter()
            .filter(|s| !old_handles.contains(&s.handle))
            .cloned()
            .collect();

        tracing::debug!(
            serial = %key.serial,
            status = %incoming.status,
            added = added.len(),
            removed = removed.len(),
            "Radio updated"
        );
        *stored = incoming.clone();

        let mut events = Vec::with_capacity(1 + added.len() + removed.len());
        events.push(StoreEvent::RecordUpdated(incoming));
        events.extend(added.into_iter().map(|session| StoreEvent::SessionAdded {
            key: key.clone(),
            session,
        }));
        events.extend(removed.into_iter().map(|session| StoreEvent::SessionRemoved {
            key: key.clone(),
            session,
        }));
        events
    }

    /// Remove local records last seen before `cutoff`.
    pub fn expire_stale(&mut self, cutoff: Instant) -> Vec<StoreEvent> {
        self.remove_where(|r| r.source == Source::Local && r.last_seen < cutoff)
    }

    pub fn remove(&mut self, key: &DeviceKey) -> Vec<StoreEvent> {
        self.records
            .remove(key)
            .map(StoreEvent::RecordDeleted)
            .into_iter()
            .collect()
    }

    pub fn remove_all(&mut self) -> Vec<StoreEvent> {
        self.remove_where(|_| true)
    }

    pub fn remove_by_source(&mut self, source: Source) -> Vec<StoreEvent> {
        self.remove_where(|r| r.source == source)
    }

    fn remove_where(&mut self, doomed: impl Fn(&DeviceRecord) -> bool) -> Vec<StoreEvent> {
        let keys: Vec<DeviceKey> = self
            .records
            .iter()
            .filter(|(_, r)| doomed(r))
            .map(|(k, _)| k.clone())
            .collect();

        keys.iter()
            .filter_map(|key| self.records.remove(key))
            .inspect(|r| tracing::debug!(serial = %r.serial, ip = %r.public_ip, "Radio removed"))
            .map(StoreEvent::RecordDeleted)
            .collect()
    }

    /// Mark which session of `key` owns local PTT; `None` clears it.
    ///
    /// Returns false when the record is unknown.
    pub fn set_local_ptt(&mut self, key: &DeviceKey, handle: Option<u32>) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        for session in &mut record.sessions {
            session.local_ptt = handle == Some(session.handle);
        }
        true
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&DeviceRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        Arc::new(self.records.clone())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

enum Request {
    Ingest(Box<DeviceRecord>),
    ExpireStale(Instant),
    Remove(DeviceKey),
    RemoveAll,
    RemoveBySource(Source),
    SetOwnHandle(Option<u32>),
    SetLocalPtt { key: DeviceKey, handle: Option<u32> },
    Barrier(oneshot::Sender<()>),
}

/// Handle to a store task. Cheap to clone.
#[derive(Clone)]
pub struct DiscoveryStore {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<DeviceSnapshot>,
    events: EventBus<StoreEvent>,
}

impl DiscoveryStore {
    /// Spawn a store. Must be called within a Tokio runtime.
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let table = DeviceTable::new();
        let (snapshot_tx, snapshot) = watch::channel(table.snapshot());
        let (requests, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(capacity);

        tokio::spawn(run(table, rx, snapshot_tx, events.clone()));

        Self {
            requests,
            snapshot,
            events,
        }
    }

    fn enqueue(&self, request: Request) -> Result<()> {
        self.requests.send(request).map_err(|_| Error::NotConnected)
    }

    /// Merge a discovery record.
    pub fn ingest(&self, record: DeviceRecord) -> Result<()> {
        self.enqueue(Request::Ingest(Box::new(record)))
    }

    /// Remove local records last seen before `cutoff`.
    pub fn expire_stale(&self, cutoff: Instant) -> Result<()> {
        self.enqueue(Request::ExpireStale(cutoff))
    }

    pub fn remove(&self, key: DeviceKey) -> Result<()> {
        self.enqueue(Request::Remove(key))
    }

    pub fn remove_all(&self) -> Result<()> {
        self.enqueue(Request::RemoveAll)
    }

    pub fn remove_by_source(&self, source: Source) -> Result<()> {
        self.enqueue(Request::RemoveBySource(source))
    }

    /// Set our session handle once the radio assigns it.
    pub fn set_own_handle(&self, handle: Option<u32>) -> Result<()> {
        self.enqueue(Request::SetOwnHandle(handle))
    }

    pub fn set_local_ptt(&self, key: DeviceKey, handle: Option<u32>) -> Result<()> {
        self.enqueue(Request::SetLocalPtt { key, handle })
    }

    /// Wait until everything enqueued before this call has been applied.
    pub async fn barrier(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Request::Barrier(reply))?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn get(&self, key: &DeviceKey) -> Option<DeviceRecord> {
        self.snapshot.borrow().get(key).cloned()
    }

    pub fn watch(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

async fn run(
    mut table: DeviceTable,
    mut rx: mpsc::UnboundedReceiver<Request>,
    snapshot: watch::Sender<DeviceSnapshot>,
    events: EventBus<StoreEvent>,
) {
    while let Some(request) = rx.recv().await {
        let changes = match request {
            Request::Ingest(record) => table.ingest(*record),
            Request::ExpireStale(cutoff) => table.expire_stale(cutoff),
            Request::Remove(key) => table.remove(&key),
            Request::RemoveAll => table.remove_all(),
            Request::RemoveBySource(source) => table.remove_by_source(source),
            Request::SetOwnHandle(handle) => {
                table.set_own_handle(handle);
                Vec::new()
            }
            Request::SetLocalPtt { key, handle } => {
                if !table.set_local_ptt(&key, handle) {
                    tracing::warn!(serial = %key.serial, "PTT owner set on unknown radio");
                }
                Vec::new()
            }
            Request::Barrier(reply) => {
                let _ = reply.send(());
                continue;
            }
        };

        snapshot.send_replace(table.snapshot());
        for change in changes {
            events.publish(change);
        }
    }
    tracing::trace!("Discovery store stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;
    use std::time::Duration;

    fn record(payload: &str) -> DeviceRecord {
        DeviceRecord::parse(payload, Source::Local, ParseMode::Strict).unwrap()
    }

    fn relay(payload: &str) -> DeviceRecord {
        DeviceRecord::parse(payload, Source::Relay, ParseMode::Strict).unwrap()
    }

    #[test]
    fn active_standby_repeat() {
        let mut table = DeviceTable::new();

        let events = table.ingest(record("serial=S1 ip=10.0.0.1 status=ACTIVE"));
        assert!(matches!(events.as_slice(), [StoreEvent::RecordAdded(_)]));
        let id = table.iter().next().unwrap().local_id;
        assert!(!id.is_nil());

        let events = table.ingest(record("serial=S1 ip=10.0.0.1 status=STANDBY"));
        match events.as_slice() {
            [StoreEvent::RecordUpdated(r)] => {
                assert_eq!(r.status, "STANDBY");
                assert_eq!(r.local_id, id);
            }
            other => panic!("expected one RecordUpdated, got {other:?}"),
        }

        let repeat = record("serial=S1 ip=10.0.0.1 status=STANDBY");
        let seen = repeat.last_seen;
        assert!(table.ingest(repeat).is_empty());
        let stored = table.iter().next().unwrap();
        assert_eq!(stored.last_seen, seen);
        assert_eq!(stored.local_id, id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn one_record_per_identity() {
        let mut table = DeviceTable::new();
        table.ingest(record("serial=S1 ip=10.0.0.1"));
        table.ingest(record("serial=S1 ip=10.0.0.1 model=FLEX-6400"));
        assert_eq!(table.len(), 1);

        table.ingest(record("serial=S1 ip=10.0.0.2"));
        table.ingest(record("serial=S2 ip=10.0.0.1"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unlisted_fields_update_silently() {
        let mut table = DeviceTable::new();
        table.ingest(record("serial=S1 ip=10.0.0.1 available_slices=4 version=3.5"));
        assert!(
            table
                .ingest(record("serial=S1 ip=10.0.0.1 available_slices=2 version=3.6"))
                .is_empty()
        );
        assert_eq!(table.iter().next().unwrap().available_slices, 4);
    }

    #[test]
    fn first_insert_publishes_only_record() {
        let mut table = DeviceTable::new();
        let events = table.ingest(record(
            "serial=S1 ip=10.0.0.1 gui_client_programs=A,B gui_client_stations=X,Y \
             gui_client_handles=1,2 gui_client_ips=1.1.1.1,2.2.2.2",
        ));
        assert_eq!(events.len(), 1);
        match &events[0] {
            StoreEvent::RecordAdded(r) => assert_eq!(r.sessions.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn session_symmetric_difference() {
        let mut table = DeviceTable::new();
        table.ingest(record(
            "serial=S1 ip=10.0.0.1 gui_client_programs=A,B gui_client_stations=X,Y \
             gui_client_handles=0x1,0x2 gui_client_ips=1.1.1.1,2.2.2.2",
        ));
        let key = table.iter().next().unwrap().key();
        assert!(table.set_local_ptt(&key, Some(2)));

        let events = table.ingest(record(
            "serial=S1 ip=10.0.0.1 gui_client_programs=B,C gui_client_stations=Y,Z \
             gui_client_handles=0x2,0x3 gui_client_ips=2.2.2.2,3.3.3.3",
        ));

        assert!(matches!(events[0], StoreEvent::RecordUpdated(_)));
        let added: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::SessionAdded { session, .. } => Some(session.handle),
                _ => None,
            })
            .collect();
        let removed: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::SessionRemoved { session, .. } => Some(session.handle),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![3]);
        assert_eq!(removed, vec![1]);

        let stored = table.get(&key).unwrap();
        let kept = stored.sessions.iter().find(|s| s.handle == 2).unwrap();
        assert!(kept.local_ptt);
    }

    #[test]
    fn own_handle_marks_session() {
        let mut table = DeviceTable::new();
        table.set_own_handle(Some(0x2A));
        table.ingest(record(
            "serial=S1 ip=10.0.0.1 gui_client_programs=A gui_client_stations=X \
             gui_client_handles=0x2A gui_client_ips=1.1.1.1",
        ));
        assert!(table.iter().next().unwrap().sessions[0].is_this_client);

        table.set_own_handle(None);
        assert!(!table.iter().next().unwrap().sessions[0].is_this_client);
    }

    #[test]
    fn stale_sweep_spares_relay_records() {
        let mut table = DeviceTable::new();
        table.ingest(record("serial=S1 ip=10.0.0.1"));
        table.ingest(relay("serial=S2 public_ip=203.0.113.4"));

        let events = table.expire_stale(Instant::now() + Duration::from_secs(1));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StoreEvent::RecordDeleted(r) if r.serial == "S1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn recent_records_survive_sweep() {
        let mut table = DeviceTable::new();
        let r = record("serial=S1 ip=10.0.0.1");
        let cutoff = r.last_seen;
        table.ingest(r);
        assert!(table.expire_stale(cutoff).is_empty());
    }

    #[test]
    fn explicit_removal() {
        let mut table = DeviceTable::new();
        table.ingest(record("serial=S1 ip=10.0.0.1"));
        table.ingest(relay("serial=S2 public_ip=203.0.113.4"));
        table.ingest(relay("serial=S3 public_ip=203.0.113.5"));

        let key = DeviceKey {
            serial: "S1".into(),
            public_ip: "10.0.0.1".into(),
        };
        assert_eq!(table.remove(&key).len(), 1);
        assert!(table.remove(&key).is_empty());

        assert_eq!(table.remove_by_source(Source::Local).len(), 0);
        assert_eq!(table.remove_all().len(), 2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn store_actor_publishes_and_snapshots() {
        let store = DiscoveryStore::with_capacity(16);
        let mut events = store.subscribe();
        let mut watcher = store.watch();

        store.ingest(record("serial=S1 ip=10.0.0.1 status=Available")).unwrap();
        store.ingest(record("serial=S1 ip=10.0.0.1 status=In_Use")).unwrap();
        store.ingest(record("serial=S1 ip=10.0.0.1 status=In_Use")).unwrap();
        store.barrier().await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), StoreEvent::RecordAdded(_)));
        match events.recv().await.unwrap() {
            StoreEvent::RecordUpdated(r) => assert_eq!(r.status, "In_Use"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(events.try_recv().is_err());

        assert!(watcher.has_changed().unwrap());
        let snapshot = watcher.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);

        let key = snapshot.keys().next().unwrap().clone();
        assert_eq!(store.get(&key).unwrap().status, "In_Use");

        store.remove_by_source(Source::Local).unwrap();
        store.barrier().await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), StoreEvent::RecordDeleted(_)));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn ptt_owner_through_actor() {
        let store = DiscoveryStore::spawn();
        store
            .ingest(record(
                "serial=S1 ip=10.0.0.1 gui_client_programs=A,B gui_client_stations=X,Y \
                 gui_client_handles=1,2 gui_client_ips=1.1.1.1,2.2.2.2",
            ))
            .unwrap();
        let key = DeviceKey {
            serial: "S1".into(),
            public_ip: "10.0.0.1".into(),
        };
        store.set_local_ptt(key.clone(), Some(1)).unwrap();
        store.barrier().await.unwrap();

        let record = store.get(&key).unwrap();
        assert!(record.sessions[0].local_ptt);
        assert!(!record.sessions[1].local_ptt);
    }
}
