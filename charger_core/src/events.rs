//! Event publication with duplicate suppression and suspend coalescing.
//!
//! The sink only ever sees a message once per state change: re-notifying
//! the same text is dropped, and while the system is suspended at most the
//! most recent pending event survives until resume.

use charger_traits::{EventKind, EventSink};

/// Default sink when the platform does not subscribe: events only land
/// in the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn deliver(&mut self, kind: EventKind, message: &str) {
        tracing::info!(?kind, message, "unrouted battery event");
    }
}

pub struct EventPublisher {
    sink: Box<dyn EventSink + Send>,
    last_message: Option<String>,
    suspended: bool,
    pending: Option<(EventKind, String)>,
}

impl EventPublisher {
    pub fn new(sink: Box<dyn EventSink + Send>) -> Self {
        Self {
            sink,
            last_message: None,
            suspended: false,
            pending: None,
        }
    }

    /// Publish an event unless its message matches the one already out.
    pub fn notify(&mut self, kind: EventKind, message: &str) {
        if self.suspended {
            let reference = self
                .pending
                .as_ref()
                .map(|(_, m)| m.as_str())
                .or(self.last_message.as_deref());
            if reference == Some(message) {
                return; // status not changed
            }
            self.pending = Some((kind, message.to_string()));
            return;
        }

        if self.last_message.as_deref() == Some(message) {
            return; // status not changed
        }
        self.last_message = Some(message.to_string());
        tracing::info!(?kind, message, "battery event");
        self.sink.deliver(kind, message);
    }

    /// Publish with the event's default message.
    pub fn notify_default(&mut self, kind: EventKind) {
        self.notify(kind, kind.default_message());
    }

    /// Enter or leave the suspended state. Leaving delivers the most
    /// recent coalesced event, if any.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
        if suspended {
            return;
        }
        if let Some((kind, message)) = self.pending.take() {
            self.last_message = Some(message.clone());
            tracing::info!(?kind, message, "battery event (coalesced)");
            self.sink.deliver(kind, &message);
        }
    }
}

impl core::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("last_message", &self.last_message)
            .field("suspended", &self.suspended)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockEventSink;

    #[test]
    fn duplicate_messages_are_suppressed() {
        let sink = MockEventSink::default();
        let mut pubr = EventPublisher::new(Box::new(sink.clone()));
        pubr.notify_default(EventKind::Discharging);
        pubr.notify_default(EventKind::Discharging);
        pubr.notify_default(EventKind::Recharging);
        pubr.notify_default(EventKind::Discharging);
        let delivered = sink.events();
        assert_eq!(
            delivered.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![EventKind::Discharging, EventKind::Recharging, EventKind::Discharging]
        );
    }

    #[test]
    fn suspend_coalesces_to_most_recent() {
        let sink = MockEventSink::default();
        let mut pubr = EventPublisher::new(Box::new(sink.clone()));
        pubr.set_suspended(true);
        pubr.notify_default(EventKind::BatteryFull);
        pubr.notify_default(EventKind::Discharging);
        pubr.notify_default(EventKind::Recharging);
        assert!(sink.events().is_empty(), "nothing delivered while suspended");

        pubr.set_suspended(false);
        let delivered = sink.events();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, EventKind::Recharging);
    }

    #[test]
    fn suspended_duplicate_of_last_delivered_is_dropped() {
        let sink = MockEventSink::default();
        let mut pubr = EventPublisher::new(Box::new(sink.clone()));
        pubr.notify_default(EventKind::Discharging);
        pubr.set_suspended(true);
        pubr.notify_default(EventKind::Discharging);
        pubr.set_suspended(false);
        assert_eq!(sink.events().len(), 1, "no pending event accumulated");
    }

    #[test]
    fn resume_without_pending_is_quiet() {
        let sink = MockEventSink::default();
        let mut pubr = EventPublisher::new(Box::new(sink.clone()));
        pubr.set_suspended(true);
        pubr.set_suspended(false);
        assert!(sink.events().is_empty());
    }
}
