use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

/// Resolves QoS 2 publishes once the broker sends PUBCOMP for them.
///
/// The client assigns packet ids inside its event loop, so waiters are queued in
/// request order and bound to a packet id when the matching outgoing publish is
/// observed. Callers must enqueue and hand the request to the client under one
/// ordering lock for the queue order to match the wire order.
#[derive(Debug, Default)]
pub struct AckTracker {
    inner: Mutex<AckState>,
}

#[derive(Debug, Default)]
struct AckState {
    queued: VecDeque<oneshot::Sender<()>>,
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

impl AckTracker {
    pub fn enqueue(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().queued.push_back(tx);
        rx
    }

    /// Drops the most recent waiter when its request never reached the client.
    pub fn cancel_last(&self) {
        self.lock().queued.pop_back();
    }

    pub fn on_outgoing(&self, pkid: u16) {
        let mut state = self.lock();
        // Retransmissions after a reconnect reuse the packet id.
        if pkid == 0 || state.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(waiter) = state.queued.pop_front() {
            state.in_flight.insert(pkid, waiter);
        }
    }

    pub fn on_complete(&self, pkid: u16) {
        if let Some(waiter) = self.lock().in_flight.remove(&pkid) {
            let _ = waiter.send(());
        }
    }

    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.queued.len() + state.in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, AckState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
