//! Pending one-shot subscriptions keyed by [`Classification`].
//!
//! Each entry owns a oneshot sender and a deadline timer. Whoever removes
//! the entry from the table (a matching publish, the timer, an explicit
//! unsubscribe or `close`) is the only party that completes it, so an entry
//! is resolved exactly once and a late reply after expiry finds nothing.
//! Dropping a [`PendingReply`] before it resolves removes its entry.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use super::classify::{Classification, Classify};

/// Failure of a pending subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("no message for '{classification}' within {timeout:?}")]
    Timeout {
        classification: Classification,
        timeout: Duration,
    },
    #[error("a subscription for '{0}' is already pending")]
    AlreadyPending(Classification),
    #[error("correlation bus closed")]
    Closed,
}

type Completion<M> = oneshot::Sender<Result<M, BusError>>;
type PendingTable<M> = DashMap<Classification, PendingEntry<M>>;

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct PendingEntry<M> {
    registration: u64,
    tx: Completion<M>,
    timer: AbortHandle,
}

// ---------------------------------------------------------------------------
// PendingReply
// ---------------------------------------------------------------------------

/// Future side of a one-shot subscription.
///
/// Resolves with the matched message, `BusError::Timeout` once the deadline
/// passes, or `BusError::Closed` when the bus is shut down. Dropping it
/// unresolved frees the classification for a new subscription.
pub struct PendingReply<M> {
    classification: Classification,
    registration: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Result<M, BusError>>,
    pending: Arc<PendingTable<M>>,
}

impl<M> PendingReply<M> {
    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl<M> fmt::Debug for PendingReply<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("classification", &self.classification)
            .field("registration", &self.registration)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<M> Drop for PendingReply<M> {
    fn drop(&mut self) {
        if remove_registration(&self.pending, &self.classification, self.registration) {
            debug!(
                classification = %self.classification,
                registration = self.registration,
                "abandoned subscription removed"
            );
        }
    }
}

/// Removes the entry under `classification` if it still belongs to
/// `registration`, cancelling its timer. The entry's sender is dropped, so
/// its reply resolves with `BusError::Closed`.
fn remove_registration<M>(pending: &PendingTable<M>, classification: &Classification, registration: u64) -> bool {
    match pending.remove_if(classification, |_, entry| entry.registration == registration) {
        Some((_, entry)) => {
            entry.timer.abort();
            true
        }
        None => false,
    }
}

impl<M> Future for PendingReply<M> {
    type Output = Result<M, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            // Sender dropped without completing: the entry was unsubscribed.
            Err(_) => Err(BusError::Closed),
        })
    }
}

// ---------------------------------------------------------------------------
// CorrelationBus
// ---------------------------------------------------------------------------

/// Table of pending one-shot subscriptions.
///
/// Registration, delivery and expiry may race freely from any task; the
/// table's per-key locking serializes the register/match/remove sequence.
pub struct CorrelationBus<M> {
    pending: Arc<PendingTable<M>>,
    next_registration: AtomicU64,
    closed: AtomicBool,
}

impl<M: Send + 'static> CorrelationBus<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_registration: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a one-shot subscription for `classification` that expires
    /// after `timeout`.
    ///
    /// Must be called from within a Tokio runtime (the deadline is a spawned
    /// timer task).
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyPending` if a subscription for the same
    /// classification has not resolved yet, or `BusError::Closed` after
    /// [`close`](Self::close).
    pub fn subscribe_once(
        &self,
        classification: Classification,
        timeout: Duration,
    ) -> Result<PendingReply<M>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(classification.clone()) {
            Entry::Occupied(_) => return Err(BusError::AlreadyPending(classification)),
            Entry::Vacant(slot) => {
                let timer = self.spawn_timer(classification.clone(), registration, deadline, timeout);
                slot.insert(PendingEntry {
                    registration,
                    tx,
                    timer,
                });
            }
        }

        // close() may have drained the table between the check above and
        // the insert.
        if self.is_closed() {
            remove_registration(&self.pending, &classification, registration);
            return Err(BusError::Closed);
        }

        debug!(%classification, registration, ?timeout, "subscribed");
        Ok(PendingReply {
            classification,
            registration,
            deadline,
            rx,
            pending: Arc::clone(&self.pending),
        })
    }

    fn spawn_timer(
        &self,
        classification: Classification,
        registration: u64,
        deadline: Instant,
        timeout: Duration,
    ) -> AbortHandle {
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some((classification, entry)) =
                pending.remove_if(&classification, |_, entry| entry.registration == registration)
            {
                debug!(%classification, registration, "subscription timed out");
                let _ = entry.tx.send(Err(BusError::Timeout {
                    classification,
                    timeout,
                }));
            }
        })
        .abort_handle()
    }

    /// Delivers `message` to the subscription it classifies to.
    ///
    /// Returns the message back when nothing was pending for it.
    pub fn publish(&self, message: M) -> Option<M>
    where
        M: Classify,
    {
        let Some(classification) = message.classification() else {
            return Some(message);
        };
        let Some((classification, entry)) = self.pending.remove(&classification) else {
            return Some(message);
        };

        entry.timer.abort();
        if entry.tx.send(Ok(message)).is_err() {
            debug!(%classification, "subscriber dropped before delivery");
        }
        None
    }

    /// Removes the subscription behind `reply` if it is still pending.
    ///
    /// A newer registration under the same classification is left alone.
    /// Returns `true` if an entry was removed; the reply then resolves with
    /// `BusError::Closed`.
    pub fn unsubscribe(&self, reply: &PendingReply<M>) -> bool {
        remove_registration(&self.pending, &reply.classification, reply.registration)
    }

    /// Fails every pending subscription with `BusError::Closed` and rejects
    /// later registrations.
    ///
    /// Returns the number of subscriptions that were drained.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);

        let keys: Vec<Classification> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut drained = 0;
        for key in keys {
            if let Some((_, entry)) = self.pending.remove(&key) {
                entry.timer.abort();
                let _ = entry.tx.send(Err(BusError::Closed));
                drained += 1;
            }
        }
        drained
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_pending(&self, classification: &Classification) -> bool {
        self.pending.contains_key(classification)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl<M: Send + 'static> Default for CorrelationBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Reply {
        id: Option<String>,
        body: u32,
    }

    impl Reply {
        fn to(id: &str, body: u32) -> Self {
            Self {
                id: Some(id.to_string()),
                body,
            }
        }
    }

    impl Classify for Reply {
        fn classification(&self) -> Option<Classification> {
            self.id.clone().map(Classification::CorrelationId)
        }
    }

    fn key(id: &str) -> Classification {
        Classification::correlation_id(id)
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn publish_resolves_matching_subscriber() {
        let bus = CorrelationBus::new();
        let reply = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        assert!(bus.is_pending(&key("c1")));

        assert_eq!(bus.publish(Reply::to("c1", 7)), None);
        assert_eq!(reply.await.unwrap().body, 7);
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_message_is_handed_back() {
        let bus: CorrelationBus<Reply> = CorrelationBus::new();
        let _reply = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();

        assert_eq!(bus.publish(Reply::to("other", 1)), Some(Reply::to("other", 1)));
        let anonymous = Reply { id: None, body: 2 };
        assert_eq!(bus.publish(anonymous.clone()), Some(anonymous));
        assert_eq!(bus.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_fails_with_timeout_and_drops_late_reply() {
        let bus = CorrelationBus::new();
        let start = Instant::now();
        let reply = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        assert_eq!(reply.deadline(), start + TIMEOUT);

        let err = reply.await.unwrap_err();
        assert_eq!(
            err,
            BusError::Timeout {
                classification: key("c1"),
                timeout: TIMEOUT
            }
        );
        assert!(start.elapsed() >= TIMEOUT);
        assert_eq!(bus.pending_count(), 0);

        // The late reply is not delivered anywhere.
        assert_eq!(bus.publish(Reply::to("c1", 9)), Some(Reply::to("c1", 9)));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_is_rejected() {
        let bus: CorrelationBus<Reply> = CorrelationBus::new();
        let _first = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        let err = bus.subscribe_once(key("c1"), TIMEOUT).unwrap_err();
        assert_eq!(err, BusError::AlreadyPending(key("c1")));
        assert_eq!(bus.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_reusable_after_resolution() {
        let bus = CorrelationBus::new();
        let first = bus.subscribe_once(key("c1"), TIMEOUT / 2).unwrap();
        bus.publish(Reply::to("c1", 1));
        assert_eq!(first.await.unwrap().body, 1);

        let second = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        // Outlive the first registration's deadline; its timer must not
        // touch the new entry.
        tokio::time::sleep(TIMEOUT * 3 / 4).await;
        assert!(bus.is_pending(&key("c1")));
        bus.publish(Reply::to("c1", 2));
        assert_eq!(second.await.unwrap().body, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_only_removes_own_registration() {
        let bus: CorrelationBus<Reply> = CorrelationBus::new();
        let first = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        assert!(bus.unsubscribe(&first));
        assert_eq!(first.await.unwrap_err(), BusError::Closed);

        let stale = bus.subscribe_once(key("c2"), TIMEOUT).unwrap();
        assert!(bus.unsubscribe(&stale));
        let _fresh = bus.subscribe_once(key("c2"), TIMEOUT).unwrap();
        assert!(!bus.unsubscribe(&stale));
        assert!(bus.is_pending(&key("c2")));
    }

    #[tokio::test(start_paused = true)]
    async fn close_drains_and_rejects_new_subscriptions() {
        let bus: CorrelationBus<Reply> = CorrelationBus::new();
        let a = bus.subscribe_once(key("a"), TIMEOUT).unwrap();
        let b = bus.subscribe_once(key("b"), TIMEOUT).unwrap();

        assert_eq!(bus.close(), 2);
        assert_eq!(a.await.unwrap_err(), BusError::Closed);
        assert_eq!(b.await.unwrap_err(), BusError::Closed);
        assert_eq!(bus.subscribe_once(key("c"), TIMEOUT).unwrap_err(), BusError::Closed);
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_waits_without_expiring() {
        let bus = CorrelationBus::new();
        let start = Instant::now();
        let reply = bus.subscribe_once(key("c1"), Duration::MAX).unwrap();
        assert!(reply.deadline() > start + Duration::from_secs(86_400 * 365));

        tokio::time::advance(Duration::from_secs(86_400 * 7)).await;
        assert!(bus.is_pending(&key("c1")));
        assert_eq!(bus.publish(Reply::to("c1", 3)), None);
        assert_eq!(reply.await.unwrap().body, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_at_deadline_resolves_exactly_once() {
        let bus = CorrelationBus::new();
        let reply = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();

        // The timer is due; publish before yielding to it.
        tokio::time::advance(TIMEOUT).await;
        let unmatched = bus.publish(Reply::to("c1", 4));

        match (unmatched, reply.await) {
            (None, Ok(message)) => assert_eq!(message.body, 4),
            (Some(late), Err(BusError::Timeout { .. })) => assert_eq!(late.body, 4),
            (unmatched, outcome) => panic!("inconsistent resolution: {unmatched:?} / {outcome:?}"),
        }
        tokio::task::yield_now().await;
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_reply_frees_its_classification() {
        let bus: CorrelationBus<Reply> = CorrelationBus::new();
        let abandoned = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        drop(abandoned);
        assert!(!bus.is_pending(&key("c1")));

        let retry = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        assert_eq!(bus.publish(Reply::to("c1", 5)), None);
        assert_eq!(retry.await.unwrap().body, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_resolved_reply_keeps_newer_registration() {
        let bus = CorrelationBus::new();
        let first = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();
        bus.publish(Reply::to("c1", 1));
        let _second = bus.subscribe_once(key("c1"), TIMEOUT).unwrap();

        drop(first);
        assert!(bus.is_pending(&key("c1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribers_each_resolve_once() {
        let bus = Arc::new(CorrelationBus::new());
        let replies: Vec<_> = (0..64u32)
            .map(|i| {
                let reply = bus.subscribe_once(key(&format!("c{i}")), Duration::from_secs(30)).unwrap();
                tokio::spawn(reply)
            })
            .collect();

        let publishers: Vec<_> = (0..64u32)
            .map(|i| {
                let bus = Arc::clone(&bus);
                tokio::spawn(async move { bus.publish(Reply::to(&format!("c{i}"), i)) })
            })
            .collect();
        for publisher in publishers {
            assert_eq!(publisher.await.unwrap(), None);
        }

        let mut seen = HashSet::new();
        for reply in replies {
            assert!(seen.insert(reply.await.unwrap().unwrap().body));
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(bus.pending_count(), 0);
    }
}
