//! In-memory [`LogTransport`] that records every batch it is handed.

use std::{collections::BTreeSet, io, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::ship_handler::{
    Batch, Entry, FailureMap, LogTransport, Serialiser, Tag, TransportError,
};

#[derive(Default)]
struct MockState {
    failing: bool,
    fail_tags: BTreeSet<Tag>,
    batches: Vec<Vec<Tag>>,
    observed: Vec<(Tag, Entry)>,
    cancels: usize,
}

/// Transport double that never touches the network.
///
/// Every entry is passed through the serialiser, as a real transport would.
/// Failures can be injected for all entries or for chosen tags.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    completions: Arc<Mutex<Option<Sender<usize>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every entry while `failing` is true.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Fail only the given tags on subsequent sends.
    pub fn fail_tags(&self, tags: impl IntoIterator<Item = Tag>) {
        self.state.lock().fail_tags = tags.into_iter().collect();
    }

    /// Number of `send_batch` calls so far.
    pub fn send_count(&self) -> usize {
        self.state.lock().batches.len()
    }

    /// Tags of every batch received, in call order.
    pub fn batches(&self) -> Vec<Vec<Tag>> {
        self.state.lock().batches.clone()
    }

    /// Every entry handed to the transport, including failed attempts.
    pub fn observed_entries(&self) -> Vec<(Tag, Entry)> {
        self.state.lock().observed.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }

    /// Receive the batch size each time a send completes.
    pub fn completions(&self) -> Receiver<usize> {
        let (tx, rx) = unbounded();
        *self.completions.lock() = Some(tx);
        rx
    }

    /// Wait until a send completes, returning the batch size.
    pub fn wait_for_send(rx: &Receiver<usize>, timeout: Duration) -> Option<usize> {
        rx.recv_timeout(timeout).ok()
    }
}

impl LogTransport for MockTransport {
    fn send_batch(&self, batch: &Batch, serialise: Serialiser<'_>) -> FailureMap {
        let mut failures = FailureMap::new();
        {
            let mut state = self.state.lock();
            state.batches.push(batch.tags());
            for (tag, entry) in batch.iter() {
                state.observed.push((tag, entry.clone()));
                if let Err(err) = serialise(entry) {
                    failures.insert(tag, err);
                    continue;
                }
                if state.failing || state.fail_tags.contains(&tag) {
                    let err = io::Error::other(format!("mock failure for {tag}"));
                    failures.insert(tag, TransportError::write(err));
                }
            }
        }
        if let Some(tx) = self.completions.lock().as_ref() {
            let _ = tx.send(batch.len());
        }
        failures
    }

    fn cancel(&self) {
        self.state.lock().cancels += 1;
    }
}
