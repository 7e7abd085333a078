//! Delivery of change notifications to application handlers, and the
//! acknowledgement requests they carry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use twinbus_core::messages::Event;
use twinbus_core::{
    Acknowledgement, AcknowledgementLabel, ChangeNotification, EntityId, Headers, Signal, StatusCode,
};

use crate::dispatcher::RequestDispatcher;
use crate::error::ClientError;

// ---------------------------------------------------------------------------
// AcknowledgementRequestHandle
// ---------------------------------------------------------------------------

/// Answer slot for one acknowledgement label the backend requested.
///
/// Consumed by [`acknowledge`](Self::acknowledge), so each requested label
/// is answered at most once per handle.
pub struct AcknowledgementRequestHandle {
    label: AcknowledgementLabel,
    entity_id: EntityId,
    headers: Headers,
    emitter: Arc<RequestDispatcher>,
}

impl AcknowledgementRequestHandle {
    #[must_use]
    pub fn label(&self) -> &AcknowledgementLabel {
        &self.label
    }

    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Emits the acknowledgement, correlated to the originating change.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement cannot be encoded or emitted.
    pub async fn acknowledge(self, status: StatusCode, payload: Option<serde_json::Value>) -> Result<(), ClientError> {
        debug!(label = %self.label, entity_id = %self.entity_id, %status, "acknowledging");
        let ack = Acknowledgement::new(self.label, self.entity_id, status)
            .with_headers(self.headers)
            .with_payload(payload);
        self.emitter.emit(Signal::Acknowledgement(ack)).await
    }
}

// ---------------------------------------------------------------------------
// ChangeNotifier
// ---------------------------------------------------------------------------

/// A change handed to the application together with the means to answer
/// its acknowledgement requests.
#[derive(Clone)]
pub struct ChangeNotifier {
    change: ChangeNotification,
    emitter: Arc<RequestDispatcher>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new(change: ChangeNotification, emitter: Arc<RequestDispatcher>) -> Self {
        Self { change, emitter }
    }

    #[must_use]
    pub fn change(&self) -> &ChangeNotification {
        &self.change
    }

    fn handle_for(&self, label: AcknowledgementLabel) -> AcknowledgementRequestHandle {
        let origin = self.change.headers();
        let headers = Headers::new().with_channel(origin.channel());
        let headers = match origin.correlation_id() {
            Some(id) => headers.with_correlation_id(id),
            None => headers,
        };
        AcknowledgementRequestHandle {
            label,
            entity_id: self.change.entity_id.clone(),
            headers,
            emitter: Arc::clone(&self.emitter),
        }
    }

    /// Passes one handle per requested label, in request order, to
    /// `handler`.
    pub fn handle_acknowledgement_requests<F>(&self, handler: F)
    where
        F: FnOnce(Vec<AcknowledgementRequestHandle>),
    {
        let handles = self
            .change
            .requested_acks()
            .into_iter()
            .map(|label| self.handle_for(label))
            .collect();
        handler(handles);
    }

    /// Passes the handle for `label` to `handler` if that label was
    /// requested. Otherwise `handler` is never called.
    ///
    /// Returns whether `handler` was called.
    pub fn handle_acknowledgement_request<F>(&self, label: &str, handler: F) -> bool
    where
        F: FnOnce(AcknowledgementRequestHandle),
    {
        match self
            .change
            .requested_acks()
            .into_iter()
            .find(|requested| requested == label)
        {
            Some(requested) => {
                handler(self.handle_for(requested));
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeRegistry
// ---------------------------------------------------------------------------

/// Identifier returned by [`ChangeRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

type ChangeHandler = Arc<dyn Fn(ChangeNotifier) + Send + Sync>;

struct Registration {
    id: RegistrationId,
    entity_id: Option<EntityId>,
    handler: ChangeHandler,
}

/// Change handlers in registration order.
pub struct ChangeRegistry {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    emitter: Arc<RequestDispatcher>,
}

impl ChangeRegistry {
    #[must_use]
    pub fn new(emitter: Arc<RequestDispatcher>) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            emitter,
        }
    }

    /// Registers `handler` for changes of every entity.
    pub fn register<F>(&self, handler: F) -> RegistrationId
    where
        F: Fn(ChangeNotifier) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Registers `handler` for changes of `entity_id` only.
    pub fn register_for<F>(&self, entity_id: EntityId, handler: F) -> RegistrationId
    where
        F: Fn(ChangeNotifier) + Send + Sync + 'static,
    {
        self.insert(Some(entity_id), Arc::new(handler))
    }

    fn insert(&self, entity_id: Option<EntityId>, handler: ChangeHandler) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(registration = id.0, entity_id = ?entity_id, "change handler registered");
        self.registrations.write().push(Registration {
            id,
            entity_id,
            handler,
        });
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn deregister(&self, id: RegistrationId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        before != registrations.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Delivers `event` to every matching handler in registration order.
    ///
    /// Handlers run outside the registry lock, so they may register or
    /// deregister. Events that do not describe a change are ignored.
    /// Returns the number of handlers called.
    pub fn dispatch(&self, event: &Event) -> usize {
        let Some(change) = ChangeNotification::from_event(event) else {
            debug!(signal_type = %event.signal_type, "event is not a change");
            return 0;
        };

        let handlers: Vec<ChangeHandler> = self
            .registrations
            .read()
            .iter()
            .filter(|registration| {
                !matches!(&registration.entity_id, Some(entity_id) if *entity_id != change.entity_id)
            })
            .map(|registration| Arc::clone(&registration.handler))
            .collect();

        for handler in &handlers {
            handler(ChangeNotifier::new(change.clone(), Arc::clone(&self.emitter)));
        }
        handlers.len()
    }
}
