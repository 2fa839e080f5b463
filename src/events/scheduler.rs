//! Event scheduler module
//!
//! Periodic maintenance timers keyed by (owner id, event kind): bucket
//! refresh, publish, republish and expire. Each timer re-arms itself after
//! every firing until its key is deleted.

use crate::kademlia::id::KademliaId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// The kinds of maintenance events a node schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Refresh the bucket with this index by looking up a random id inside it
    BucketRefresh(usize),
    /// Re-push a value this node originated
    Publish,
    /// Re-push a value this node is merely holding
    Republish,
    /// Drop an unpinned value whose lease lapsed
    Expire,
}

/// A scheduled callback; invoked once per firing, on its own task
pub type EventCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Build an [`EventCallback`] from an async closure
pub fn callback<F, Fut>(f: F) -> EventCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

struct TimerHandle {
    reset_tx: watch::Sender<Duration>,
    task: JoinHandle<()>,
}

/// Map from (owner, kind) to a cancellable, resettable periodic timer
///
/// At most one live timer exists per key. Fired callbacks execute
/// independently of one another and of the scheduler's lock; callbacks that
/// touch shared state rely on that state's own locking.
pub struct EventScheduler {
    timers: Mutex<HashMap<(KademliaId, EventKind), TimerHandle>>,
}

impl EventScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arm a periodic timer, cancelling and replacing any existing timer for
    /// the same (owner, kind)
    ///
    /// The timer fires after `interval`, runs `callback` on its own task, and
    /// re-arms itself for another `interval`, indefinitely, until the key is
    /// deleted.
    pub fn insert_event(
        &self,
        owner: KademliaId,
        kind: EventKind,
        interval: Duration,
        callback: EventCallback,
    ) {
        let (reset_tx, mut reset_rx) = watch::channel(interval);
        let task = tokio::spawn(async move {
            loop {
                let sleep = tokio::time::sleep(interval);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        _ = &mut sleep => break,
                        changed = reset_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            // A reset pushes only the pending firing; the
                            // next cycle returns to the insert interval.
                            let d = *reset_rx.borrow_and_update();
                            sleep.as_mut().reset(tokio::time::Instant::now() + d);
                        }
                    }
                }
                trace!("Event fired: {:?}", kind);
                // The callback runs detached so deleting the event never
                // interrupts a callback already executing.
                tokio::spawn((callback)());
            }
        });

        let mut timers = self.timers.lock().expect("event scheduler lock poisoned");
        if let Some(old) = timers.insert((owner, kind), TimerHandle { reset_tx, task }) {
            old.task.abort();
        }
    }

    /// Cancel and remove the timer for (owner, kind); no-op if absent
    pub fn delete_event(&self, owner: KademliaId, kind: EventKind) {
        let mut timers = self.timers.lock().expect("event scheduler lock poisoned");
        if let Some(handle) = timers.remove(&(owner, kind)) {
            handle.task.abort();
        }
    }

    /// Push the pending firing of (owner, kind) to `interval` from now,
    /// preserving its callback; no-op if the key is absent
    pub fn reset_event(&self, owner: KademliaId, kind: EventKind, interval: Duration) {
        let timers = self.timers.lock().expect("event scheduler lock poisoned");
        if let Some(handle) = timers.get(&(owner, kind)) {
            let _ = handle.reset_tx.send(interval);
        }
    }

    /// Whether a timer exists for (owner, kind)
    pub fn contains(&self, owner: KademliaId, kind: EventKind) -> bool {
        let timers = self.timers.lock().expect("event scheduler lock poisoned");
        timers.contains_key(&(owner, kind))
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        let timers = self.timers.lock().expect("event scheduler lock poisoned");
        for handle in timers.values() {
            handle.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn advance_millis(ms: u64) {
        for _ in 0..ms {
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        // Let fired callbacks run
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> EventCallback {
        callback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_firing_and_delete() {
        let scheduler = EventScheduler::new();
        let owner = KademliaId::random();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.insert_event(
            owner,
            EventKind::Publish,
            Duration::from_millis(10),
            counting_callback(counter.clone()),
        );

        advance_millis(35).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.delete_event(owner, EventKind::Publish);
        advance_millis(35).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_replaces_existing_timer() {
        let scheduler = EventScheduler::new();
        let owner = KademliaId::random();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler.insert_event(
            owner,
            EventKind::Republish,
            Duration::from_millis(10),
            counting_callback(first.clone()),
        );
        scheduler.insert_event(
            owner,
            EventKind::Republish,
            Duration::from_millis(10),
            counting_callback(second.clone()),
        );

        advance_millis(25).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pushes_pending_firing() {
        let scheduler = EventScheduler::new();
        let owner = KademliaId::random();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.insert_event(
            owner,
            EventKind::Expire,
            Duration::from_millis(10),
            counting_callback(counter.clone()),
        );

        advance_millis(5).await;
        scheduler.reset_event(owner, EventKind::Expire, Duration::from_millis(20));
        // Without the reset the timer would fire at t=10
        advance_millis(10).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // The pushed firing lands at t=25
        advance_millis(15).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_missing_event_is_noop() {
        let scheduler = EventScheduler::new();
        let owner = KademliaId::random();
        scheduler.reset_event(owner, EventKind::Publish, Duration::from_millis(10));
        scheduler.delete_event(owner, EventKind::Publish);
        assert!(!scheduler.contains(owner, EventKind::Publish));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_keyed_by_owner_and_kind() {
        let scheduler = EventScheduler::new();
        let owner_a = KademliaId::random();
        let owner_b = KademliaId::random();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        scheduler.insert_event(
            owner_a,
            EventKind::Publish,
            Duration::from_millis(10),
            counting_callback(a.clone()),
        );
        scheduler.insert_event(
            owner_b,
            EventKind::Publish,
            Duration::from_millis(10),
            counting_callback(b.clone()),
        );
        scheduler.delete_event(owner_a, EventKind::Publish);

        advance_millis(15).await;
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }
}
