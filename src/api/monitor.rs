//! Purpose: Fan out completed-operation outcomes to monitor subscribers.
//! Exports: `KvMonitor`, `MonitorStream`, `MonitorEvent`, `ActivityMessage`, `OperationOutcome`, `OutcomeHandler`.
//! Role: Decoupled observer relay; never affects the caller's result path.
//! Invariants: Exactly one event variant fires per completed operation.
//! Invariants: Subscriptions observe only activity emitted after they are armed.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use crate::core::command::CommandRecord;
use crate::core::verdict::{FetchOutcome, Verdict};

/// Everything the bridge knows about one completed operation. `response`
/// is absent when the exchange failed before a verdict could be read.
#[derive(Clone, Debug)]
pub struct OperationOutcome {
    pub verdict: Verdict,
    pub command: CommandRecord,
    pub response: Option<FetchOutcome>,
    pub error_detail: Option<Value>,
}

/// Handler invoked synchronously after every completed operation, in
/// registration order. A tagged list, not a dispatch hierarchy.
pub type OutcomeHandler = Box<dyn Fn(&OperationOutcome) + Send + Sync>;

/// Display-oriented unit delivered to observers.
#[derive(Clone, Debug)]
pub struct ActivityMessage {
    pub timestamp: OffsetDateTime,
    pub command: CommandRecord,
    pub response: Option<FetchOutcome>,
}

/// The closed channel set: exactly one variant per completed operation.
#[derive(Clone, Debug)]
pub enum MonitorEvent {
    Success(ActivityMessage),
    Err {
        activity: ActivityMessage,
        error_detail: Option<Value>,
    },
    Unknown {
        activity: ActivityMessage,
        error_detail: Option<Value>,
    },
}

impl MonitorEvent {
    pub fn activity(&self) -> &ActivityMessage {
        match self {
            MonitorEvent::Success(activity) => activity,
            MonitorEvent::Err { activity, .. } | MonitorEvent::Unknown { activity, .. } => activity,
        }
    }
}

/// Operation monitor. Cloning shares the relay; each client is handed its
/// own reference at construction, never a process-wide singleton.
#[derive(Clone, Default)]
pub struct KvMonitor {
    relay: Arc<Mutex<Vec<Sender<MonitorEvent>>>>,
}

impl KvMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome handler that feeds this monitor; register it on the client.
    pub fn listener(&self) -> OutcomeHandler {
        let monitor = self.clone();
        Box::new(move |outcome| monitor.publish(outcome))
    }

    /// Returns a fresh observer stream wired at this moment. Activity
    /// emitted before the call is not replayed.
    pub fn subscribe(&self) -> MonitorStream {
        let (sender, receiver) = mpsc::channel();
        self.senders().push(sender);
        MonitorStream { receiver }
    }

    /// Synchronously delivers one event to every currently-armed stream.
    pub fn publish(&self, outcome: &OperationOutcome) {
        let activity = ActivityMessage {
            timestamp: OffsetDateTime::now_utc(),
            command: outcome.command.clone(),
            response: outcome.response.clone(),
        };
        let event = match outcome.verdict {
            Verdict::Success => MonitorEvent::Success(activity),
            Verdict::Failure => MonitorEvent::Err {
                activity,
                error_detail: outcome.error_detail.clone(),
            },
            Verdict::Indeterminate => MonitorEvent::Unknown {
                activity,
                error_detail: outcome.error_detail.clone(),
            },
        };
        let mut senders = self.senders();
        senders.retain(|sender| match sender.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("dropping disconnected monitor subscriber");
                false
            }
        });
    }

    fn senders(&self) -> std::sync::MutexGuard<'_, Vec<Sender<MonitorEvent>>> {
        self.relay
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// One observer's view of the activity feed.
pub struct MonitorStream {
    receiver: Receiver<MonitorEvent>,
}

impl MonitorStream {
    /// Non-blocking: delivery is synchronous, so events from operations
    /// that already completed are waiting here.
    pub fn try_next(&self) -> Option<MonitorEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<MonitorEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::{KvMonitor, MonitorEvent, OperationOutcome};
    use crate::core::command::{CommandKind, CommandRecord};
    use crate::core::verdict::Verdict;
    use serde_json::json;

    fn outcome(verdict: Verdict) -> OperationOutcome {
        OperationOutcome {
            verdict,
            command: CommandRecord::new(CommandKind::Namespace, "Remove a namespace"),
            response: None,
            error_detail: Some(json!([{"code": 10011, "message": "not found"}])),
        }
    }

    #[test]
    fn each_verdict_maps_to_exactly_one_channel() {
        let monitor = KvMonitor::new();
        let stream = monitor.subscribe();

        monitor.publish(&outcome(Verdict::Success));
        monitor.publish(&outcome(Verdict::Failure));
        monitor.publish(&outcome(Verdict::Indeterminate));

        assert!(matches!(stream.try_next(), Some(MonitorEvent::Success(_))));
        assert!(matches!(stream.try_next(), Some(MonitorEvent::Err { .. })));
        assert!(matches!(stream.try_next(), Some(MonitorEvent::Unknown { .. })));
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn late_subscribers_see_no_replay() {
        let monitor = KvMonitor::new();
        monitor.publish(&outcome(Verdict::Success));

        let stream = monitor.subscribe();
        assert!(stream.try_next().is_none());

        monitor.publish(&outcome(Verdict::Failure));
        assert!(matches!(stream.try_next(), Some(MonitorEvent::Err { .. })));
    }

    #[test]
    fn every_armed_stream_receives_each_event() {
        let monitor = KvMonitor::new();
        let first = monitor.subscribe();
        let second = monitor.subscribe();

        monitor.publish(&outcome(Verdict::Success));

        assert!(matches!(first.try_next(), Some(MonitorEvent::Success(_))));
        assert!(matches!(second.try_next(), Some(MonitorEvent::Success(_))));
    }

    #[test]
    fn dropped_streams_are_pruned_without_disturbing_others() {
        let monitor = KvMonitor::new();
        let kept = monitor.subscribe();
        drop(monitor.subscribe());

        monitor.publish(&outcome(Verdict::Success));
        monitor.publish(&outcome(Verdict::Failure));

        assert!(matches!(kept.try_next(), Some(MonitorEvent::Success(_))));
        assert!(matches!(kept.try_next(), Some(MonitorEvent::Err { .. })));
    }

    #[test]
    fn err_events_carry_the_error_detail() {
        let monitor = KvMonitor::new();
        let stream = monitor.subscribe();
        monitor.publish(&outcome(Verdict::Failure));

        let Some(MonitorEvent::Err { activity, error_detail }) = stream.try_next() else {
            panic!("expected err event");
        };
        assert_eq!(activity.command.name, "Remove a namespace");
        assert_eq!(
            error_detail,
            Some(json!([{"code": 10011, "message": "not found"}]))
        );
    }
}
