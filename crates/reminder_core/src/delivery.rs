use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::EventSinkError;
use crate::notifications::DeliveryIntent;

/// Receiver for pushes to the application layer of one foreground session.
pub trait EventSink: Send + Sync {
    fn notification_tapped(&self, payload: &str) -> Result<(), EventSinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Nobody was listening, or the listener refused. The payload is gone.
    Dropped(EventSinkError),
    NoPayload,
}

/// Hands the payload of an activating notification to the foreground
/// application exactly once per activation.
///
/// A cold start stores the launch payload until the application asks for it.
/// A resume pushes it to the attached [`EventSink`]; when no sink is attached
/// the payload is dropped, not queued.
#[derive(Default)]
pub struct PayloadDelivery {
    initial: Mutex<Option<String>>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
}

impl PayloadDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cold_start(launch: Option<&DeliveryIntent>) -> Self {
        let delivery = Self::new();
        if let Some(payload) = launch.and_then(DeliveryIntent::payload) {
            info!(payload, "launched from notification");
            *delivery.initial.lock() = Some(payload.to_string());
        }
        delivery
    }

    /// Returns the launch payload on the first call only.
    pub fn take_initial_payload(&self) -> Option<String> {
        self.initial.lock().take()
    }

    pub fn attach(&self, sink: Arc<dyn EventSink>) {
        debug!("foreground session attached");
        *self.sink.write() = Some(sink);
    }

    pub fn detach(&self) {
        debug!("foreground session detached");
        self.sink.write().take();
    }

    pub fn is_attached(&self) -> bool {
        self.sink.read().is_some()
    }

    pub fn on_new_intent(&self, intent: &DeliveryIntent) -> DeliveryOutcome {
        let Some(payload) = intent.payload() else {
            return DeliveryOutcome::NoPayload;
        };
        let sink = self.sink.read().clone();
        let result = match sink {
            Some(sink) => sink.notification_tapped(payload),
            None => Err(EventSinkError::Detached),
        };
        match result {
            Ok(()) => {
                info!(payload, "notification payload delivered");
                DeliveryOutcome::Delivered
            }
            Err(err) => {
                warn!(payload, %err, "dropping notification payload");
                DeliveryOutcome::Dropped(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        received: Mutex<Vec<String>>,
    }

    impl EventSink for CollectingSink {
        fn notification_tapped(&self, payload: &str) -> Result<(), EventSinkError> {
            self.received.lock().push(payload.to_string());
            Ok(())
        }
    }

    struct RefusingSink;

    impl EventSink for RefusingSink {
        fn notification_tapped(&self, _payload: &str) -> Result<(), EventSinkError> {
            Err(EventSinkError::Rejected("engine shutting down".into()))
        }
    }

    fn tap(payload: &str) -> DeliveryIntent {
        DeliveryIntent::launch("tw.heartsshine.app").with_payload(payload)
    }

    #[test]
    fn cold_start_payload_is_taken_once() {
        let delivery = PayloadDelivery::cold_start(Some(&tap("/daily")));
        assert_eq!(delivery.take_initial_payload().as_deref(), Some("/daily"));
        assert_eq!(delivery.take_initial_payload(), None);
    }

    #[test]
    fn plain_launch_has_no_payload() {
        let plain = DeliveryIntent::launch("tw.heartsshine.app");
        let delivery = PayloadDelivery::cold_start(Some(&plain));
        assert_eq!(delivery.take_initial_payload(), None);
        assert_eq!(PayloadDelivery::cold_start(None).take_initial_payload(), None);
    }

    #[test]
    fn resume_pushes_to_attached_sink() {
        let delivery = PayloadDelivery::new();
        let sink = Arc::new(CollectingSink::default());
        delivery.attach(sink.clone());

        assert_eq!(delivery.on_new_intent(&tap("/daily")), DeliveryOutcome::Delivered);
        assert_eq!(
            delivery.on_new_intent(&DeliveryIntent::launch("tw.heartsshine.app")),
            DeliveryOutcome::NoPayload
        );
        assert_eq!(*sink.received.lock(), vec!["/daily".to_string()]);
    }

    #[test]
    fn detached_session_drops_payload() {
        let delivery = PayloadDelivery::new();
        let sink = Arc::new(CollectingSink::default());
        delivery.attach(sink.clone());
        delivery.detach();
        assert!(!delivery.is_attached());

        assert_eq!(
            delivery.on_new_intent(&tap("/daily")),
            DeliveryOutcome::Dropped(EventSinkError::Detached)
        );

        delivery.attach(sink.clone());
        assert!(sink.received.lock().is_empty());
        assert_eq!(delivery.take_initial_payload(), None);
    }

    #[test]
    fn refusing_sink_is_swallowed() {
        let delivery = PayloadDelivery::new();
        delivery.attach(Arc::new(RefusingSink));
        assert!(matches!(
            delivery.on_new_intent(&tap("/daily")),
            DeliveryOutcome::Dropped(EventSinkError::Rejected(_))
        ));
    }
}
