use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::ObserverError,
    events::{RawEvent, SessionEvent, validate_raw_event},
};

/// Opaque handle returned by [`EventFanout::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

/// One registered event consumer.
///
/// Observer liveness is managed by the hosting runtime; a delivery may
/// find the endpoint gone at any time.
pub trait SessionEventObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent) -> Result<(), ObserverError>;
}

/// Fans validated events out to registered observers with per-observer
/// failure isolation.
///
/// No capacity limit is enforced here; the hosting runtime owns that.
pub struct EventFanout {
    observers: RwLock<Vec<(ObserverId, Arc<dyn SessionEventObserver>)>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, observer: Arc<dyn SessionEventObserver>) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        self.write_observers().push((id, observer));
        debug!(observers = self.observer_count(), "registered event observer");
        id
    }

    /// Remove a registration; returns `false` if the id was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.write_observers();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.read_observers().len()
    }

    /// Deliver an already-validated event to every registered observer.
    ///
    /// A failure to deliver to one observer is logged and does not prevent
    /// delivery to the remaining observers. Never returns an error.
    pub fn broadcast(&self, event: &SessionEvent) {
        let observers = self.read_observers().clone();
        for (id, observer) in observers {
            if let Err(err) = observer.on_event(event) {
                warn!(observer = ?id, %err, "failed to notify observer");
            }
        }
    }

    /// Validate a raw event from the lower layer, then broadcast it.
    ///
    /// Events carrying enum values outside the known vocabulary are logged
    /// and dropped; the boundary that produced the event already completed
    /// its own work, so the drop must not unwind it.
    pub fn broadcast_raw(&self, raw: RawEvent) {
        match validate_raw_event(raw) {
            Ok(event) => self.broadcast(&event),
            Err(err) => warn!(%err, "dropping event with out-of-vocabulary value"),
        }
    }

    fn read_observers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Vec<(ObserverId, Arc<dyn SessionEventObserver>)>> {
        self.observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_observers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Vec<(ObserverId, Arc<dyn SessionEventObserver>)>> {
        self.observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventFanout {
    fn default() -> Self {
        Self::new()
    }
}
