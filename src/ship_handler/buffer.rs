//! In-memory buffer of entries awaiting shipment.
//!
//! Every operation runs under one mutex, so adds, drains, restores and resets
//! never interleave. A drain is a single lock acquisition that swaps the map
//! for an empty one: an add that takes the lock first is part of the batch,
//! an add that takes it afterwards lands in the fresh map with a larger tag.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::TransportError;

/// Key identifying an entry and its position in send order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(u64);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One flattened log record as it goes over the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Entry(Map<String, Value>);

impl Entry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Set `key`, replacing any value the record already carried.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Per-tag failures from one send attempt.
pub type FailureMap = BTreeMap<Tag, TransportError>;

/// Snapshot of the buffer taken by a drain.
///
/// Iteration is in ascending tag order. The batch remembers the buffer epoch
/// it was drained in so a restore after a reset can be discarded.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    entries: BTreeMap<Tag, Entry>,
    epoch: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Entry)> {
        self.entries.iter().map(|(tag, entry)| (*tag, entry))
    }

    /// Split into the tags that shipped and the batch of entries that failed.
    pub fn partition(self, failures: &FailureMap) -> (Vec<Tag>, Batch) {
        let epoch = self.epoch;
        let (failed, sent): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .entries
            .into_iter()
            .partition(|(tag, _)| failures.contains_key(tag));
        (
            sent.into_keys().collect(),
            Batch {
                entries: failed,
                epoch,
            },
        )
    }
}

#[derive(Default)]
struct BufferState {
    next_tag: u64,
    entries: BTreeMap<Tag, Entry>,
}

impl BufferState {
    fn insert_fresh(&mut self, entry: Entry) -> Tag {
        let tag = Tag(self.next_tag);
        self.next_tag += 1;
        self.entries.insert(tag, entry);
        tag
    }
}

/// Exclusive-access map from [`Tag`] to [`Entry`].
#[derive(Default)]
pub struct LogBuffer {
    state: Mutex<BufferState>,
    // Written only while `state` is locked; read lock-free by producers.
    epoch: AtomicU64,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under a fresh tag.
    pub fn add(&self, entry: Entry) -> Tag {
        self.state.lock().insert_fresh(entry)
    }

    /// Store `entry` only if no reset happened since `epoch` was observed.
    pub fn add_in_epoch(&self, epoch: u64, entry: Entry) -> Option<Tag> {
        let mut state = self.state.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return None;
        }
        Some(state.insert_fresh(entry))
    }

    /// Take the whole buffer, leaving it empty.
    pub fn drain(&self) -> Batch {
        let mut state = self.state.lock();
        Batch {
            entries: std::mem::take(&mut state.entries),
            epoch: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Merge entries that failed to ship back into the buffer.
    ///
    /// A restored entry replaces anything stored under the same tag. Batches
    /// drained before the last [`reset`](Self::reset) are discarded.
    pub fn restore(&self, failed: Batch) -> usize {
        let mut state = self.state.lock();
        if failed.epoch != self.epoch.load(Ordering::Acquire) {
            return 0;
        }
        let restored = failed.entries.len();
        state.entries.extend(failed.entries);
        restored
    }

    /// Drop every buffered entry and invalidate outstanding batches.
    pub fn reset(&self) {
        self.reset_with(|| {});
    }

    /// Reset, then run `on_reset` before the lock is released.
    ///
    /// No drain can happen between the two, so a batch drained after this
    /// returns only holds entries that `on_reset` did not see. `on_reset`
    /// must not touch this buffer.
    pub fn reset_with(&self, on_reset: impl FnOnce()) {
        let mut state = self.state.lock();
        state.entries.clear();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        on_reset();
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Tags currently buffered, ascending.
    pub fn tags(&self) -> Vec<Tag> {
        self.state.lock().entries.keys().copied().collect()
    }

    pub fn get(&self, tag: Tag) -> Option<Entry> {
        self.state.lock().entries.get(&tag).cloned()
    }

    /// Place `entry` under an explicit tag, bypassing the counter.
    #[cfg(any(test, feature = "test-util"))]
    pub fn insert_with_tag(&self, tag: Tag, entry: Entry) {
        self.state.lock().entries.insert(tag, entry);
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}
