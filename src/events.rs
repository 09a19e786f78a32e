//! Lifecycle notifications for observers (status displays, log panes).
//!
//! [`EventBus`] is a thin wrapper around [`tokio::sync::broadcast`]; the
//! daemon publishes, any number of subscribers consume. Publishing with no
//! subscribers is not an error, and slow subscribers lose old events rather
//! than back-pressuring the supervisor.

use tokio::sync::broadcast;

use crate::supervisor::ProcessState;

/// Which stream a forwarded log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Supervisor-generated messages, not engine output.
    Info,
}

/// Everything the supervisor tells the outside world.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The state machine moved. Carries both ends so observers never have
    /// to poll or remember the previous state themselves.
    StateChanged {
        from: ProcessState,
        to: ProcessState,
    },
    /// One line of engine output (or a supervisor info message).
    Log { stream: LogStream, line: String },
    /// A failure that changed state (resolution, spawn, startup, crash).
    Error { message: String },
    /// The engine will hibernate soon unless activity is recorded.
    /// Advisory only; no state change accompanies it.
    HibernateWarning { seconds_remaining: u64 },
}

/// Broadcast channel for [`SupervisorEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SupervisorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Sends an event to all subscribers. Ignored when nobody listens.
    pub fn publish(&self, event: SupervisorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.publish(SupervisorEvent::Log {
            stream: LogStream::Info,
            line: "nobody listening".into(),
        });
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(SupervisorEvent::HibernateWarning {
            seconds_remaining: 60,
        });
        for rx in [&mut a, &mut b] {
            match rx.recv().await {
                Ok(SupervisorEvent::HibernateWarning { seconds_remaining }) => {
                    assert_eq!(seconds_remaining, 60)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
