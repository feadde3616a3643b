// ============================================================================
// Transaction Registry
// ============================================================================
//
// Ordered collection of captured transactions plus a session-id index.
//
// - Both views live in one `RegistryState` behind a single RwLock, so a
//   reader never sees the collection and the index disagree.
// - Writers also hold the `writer` mutex from the start of a mutation until
//   its notification has been delivered. Notifications therefore go out in
//   mutation order, after the state reflects the change, while listeners are
//   still free to take the read lock.
// - The state is built from persistent `im` structures, so `snapshot()` is
//   O(1) and never blocks the producer for long.
//
// ============================================================================

pub mod change;
pub mod notifier;

pub use change::{ChangeKind, RegistryChange};
pub use notifier::{ChangeListener, ChangeNotifier, ListenerId};

use crate::config::RegistryConfig;
use crate::core::{RecordHandle, RegistryError, Result, SessionId, TransactionRecord};
use change::coalesce_rows;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::broadcast;
use tracing::{Level, event, info_span};

#[derive(Clone, Default)]
struct RegistryState {
    rows: im::Vector<RecordHandle>,
    sessions: im::HashMap<SessionId, RecordHandle>,
}

impl RegistryState {
    fn index_rows(rows: &im::Vector<RecordHandle>) -> im::HashMap<SessionId, RecordHandle> {
        // Later rows overwrite earlier ones: the index keeps the latest.
        rows.iter()
            .map(|record| (record.session_id(), Arc::clone(record)))
            .collect()
    }
}

pub struct TransactionRegistry {
    state: RwLock<RegistryState>,
    /// Next sequence number. Held for the whole of every mutation.
    writer: Mutex<u64>,
    max_records: Option<usize>,
    notifier: ChangeNotifier,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        let config = RegistryConfig::default();
        Self::build(&config)
    }

    /// Create a registry from a validated configuration
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            writer: Mutex::new(1),
            max_records: config.max_records,
            notifier: ChangeNotifier::new(config.feed_capacity),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a captured transaction
    ///
    /// Assigns the next sequence number, appends the record and points the
    /// session index at it. Listeners see `Inserted { row: count() - 1 }`
    /// before this returns. A record that was registered before (even if it
    /// has since been removed) is rejected without side effects.
    ///
    /// # Examples
    ///
    /// ```
    /// use pipetable::{SessionId, TransactionRecord, TransactionRegistry};
    ///
    /// let registry = TransactionRegistry::new();
    /// let record = TransactionRecord::builder(SessionId(9)).host("example.com").build();
    ///
    /// assert_eq!(registry.add(record.clone()).unwrap(), 1);
    /// assert_eq!(registry.count(), 1);
    /// assert!(registry.add(record).is_err());
    /// ```
    pub fn add(&self, record: RecordHandle) -> Result<u64> {
        let span = info_span!(
            "registry.add",
            session = %record.session_id(),
            host = ?record.header("Host")
        );
        let _enter = span.enter();

        let mut next_sequence = self.lock_writer();

        let sequence = *next_sequence;
        if let Err(existing) = record.assign_sequence(sequence) {
            event!(Level::WARN, sequence = existing, "record already registered");
            return Err(RegistryError::DuplicateRecord { sequence: existing });
        }
        *next_sequence += 1;

        // Eviction and append share one critical section so no reader sees
        // the registry between the two.
        let (evicted, row) = {
            let mut state = self.state.write()?;
            let evicted = self.evict_for_insert(&mut state);
            state.rows.push_back(Arc::clone(&record));
            state.sessions.insert(record.session_id(), record);
            (evicted, state.rows.len() - 1)
        };

        if let Some(evicted) = evicted {
            event!(Level::DEBUG, evicted = evicted.len(), "evicted oldest rows");
            self.notifier.notify(RegistryChange::Removed { ranges: vec![evicted] });
        }

        event!(Level::DEBUG, sequence, row, rows = row + 1, "record inserted");
        self.notifier.notify(RegistryChange::Inserted { row, sequence });

        Ok(sequence)
    }

    /// Writer guard. Every mutation is committed before its notification
    /// runs, so a guard poisoned after that point still protects a
    /// consistent state.
    fn lock_writer(&self) -> MutexGuard<'_, u64> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the oldest rows so one more fits under `max_records`.
    fn evict_for_insert(&self, state: &mut RegistryState) -> Option<std::ops::Range<usize>> {
        let max = self.max_records?;

        let excess = (state.rows.len() + 1).saturating_sub(max);
        if excess == 0 {
            return None;
        }

        for _ in 0..excess {
            if let Some(evicted) = state.rows.pop_front() {
                let session = evicted.session_id();
                // Only the latest record of a session is indexed; if that one
                // is the oldest row, no other row belongs to the session.
                if state
                    .sessions
                    .get(&session)
                    .is_some_and(|indexed| Arc::ptr_eq(indexed, &evicted))
                {
                    state.sessions.remove(&session);
                }
            }
        }

        Some(0..excess)
    }

    /// Remove every record in one step and announce a single `Reset`.
    ///
    /// Returns the number of rows dropped. Sequence numbers keep counting
    /// from where they were.
    pub fn remove_all(&self) -> Result<usize> {
        let span = info_span!("registry.remove_all");
        let _enter = span.enter();

        let _writer = self.lock_writer();

        let dropped = {
            let mut state = self.state.write()?;
            let dropped = state.rows.len();
            *state = RegistryState::default();
            dropped
        };

        event!(Level::DEBUG, dropped, "registry reset");
        self.notifier.notify(RegistryChange::Reset);

        Ok(dropped)
    }

    /// Remove every record belonging to one of `sessions`
    ///
    /// Announces one `Removed` event with the coalesced row ranges, or
    /// nothing when no record matched.
    pub fn remove_items<I>(&self, sessions: I) -> Result<usize>
    where
        I: IntoIterator<Item = SessionId>,
    {
        let sessions: HashSet<SessionId> = sessions.into_iter().collect();
        if sessions.is_empty() {
            return Ok(0);
        }
        self.remove_where(|record| sessions.contains(&record.session_id()))
    }

    /// Remove every record matching `predicate`
    ///
    /// The predicate runs under the registry's write lock and must not call
    /// back into the registry. Sessions that lose their latest record fall
    /// back to their latest surviving one.
    pub fn remove_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        let span = info_span!("registry.remove");
        let _enter = span.enter();

        let _writer = self.lock_writer();

        let ranges = {
            let mut state = self.state.write()?;

            let mut kept = im::Vector::new();
            let mut removed_rows = Vec::new();
            for (row, record) in state.rows.iter().enumerate() {
                if predicate(record.as_ref()) {
                    removed_rows.push(row);
                } else {
                    kept.push_back(Arc::clone(record));
                }
            }

            if removed_rows.is_empty() {
                return Ok(0);
            }

            state.sessions = RegistryState::index_rows(&kept);
            state.rows = kept;
            coalesce_rows(removed_rows)
        };

        let removed: usize = ranges.iter().map(|range| range.len()).sum();
        event!(Level::DEBUG, removed, ranges = ranges.len(), "records removed");
        self.notifier.notify(RegistryChange::Removed { ranges });

        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.read_state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Record at a 0-based row, or `None` when the row is out of range.
    pub fn record_at(&self, row: usize) -> Option<RecordHandle> {
        self.read_state().rows.get(row).cloned()
    }

    /// Most recently added record for the session.
    pub fn lookup_by_session(&self, session_id: SessionId) -> Option<RecordHandle> {
        self.read_state().sessions.get(&session_id).cloned()
    }

    /// Sequence number the next successful `add` will assign.
    pub fn next_sequence(&self) -> u64 {
        *self.lock_writer()
    }

    /// Immutable point-in-time view; later mutations do not affect it.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.read_state();
        RegistrySnapshot {
            rows: state.rows.clone(),
            sessions: state.sessions.clone(),
        }
    }

    /// Register a synchronous listener for structural changes
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: ChangeListener + 'static,
    {
        self.notifier.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Async receiver of every change announced after this call
    pub fn feed(&self) -> broadcast::Receiver<RegistryChange> {
        self.notifier.feed()
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("TransactionRegistry")
            .field("rows", &state.rows.len())
            .field("sessions", &state.sessions.len())
            .field("max_records", &self.max_records)
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// Frozen copy of the registry's rows and session index.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    rows: im::Vector<RecordHandle>,
    sessions: im::HashMap<SessionId, RecordHandle>,
}

impl RegistrySnapshot {
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record_at(&self, row: usize) -> Option<RecordHandle> {
        self.rows.get(row).cloned()
    }

    pub fn lookup_by_session(&self, session_id: SessionId) -> Option<RecordHandle> {
        self.sessions.get(&session_id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordHandle> {
        self.rows.iter()
    }
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("rows", &self.rows.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
