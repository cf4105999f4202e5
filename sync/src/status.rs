//! Status notifications emitted by the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// How a status message should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    /// The message is a last-sync timestamp
    Date,
    Disable,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Date => write!(f, "date"),
            Severity::Disable => write!(f, "disable"),
        }
    }
}

/// Aggregate state over every target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
}

/// Events sent from the engine to the owning process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    /// Line for the scrolling activity log
    Log { message: String },
    /// Per-target panel update
    Status {
        message: String,
        severity: Severity,
        target: String,
    },
    /// Aggregate health changed
    Health(Health),
}

/// Receiving end drained by the owning process
pub struct StatusChannel {
    receiver: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusChannel {
    pub fn new() -> (StatusReporter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (StatusReporter { sender }, Self { receiver })
    }

    /// Receive the next event, `None` once every reporter is gone
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.receiver.recv().await
    }

    /// Receive an event without waiting
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Sending half handed to the engine.
///
/// Sends never fail the caller; events are dropped once the channel is closed.
#[derive(Clone)]
pub struct StatusReporter {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusReporter {
    pub fn log(&self, message: impl Into<String>) {
        self.send(StatusEvent::Log {
            message: message.into(),
        });
    }

    pub fn status(
        &self,
        message: impl Into<String>,
        severity: Severity,
        target: impl Into<String>,
    ) {
        self.send(StatusEvent::Status {
            message: message.into(),
            severity,
            target: target.into(),
        });
    }

    pub fn health(&self, health: Health) {
        self.send(StatusEvent::Health(health));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn send(&self, event: StatusEvent) {
        if self.sender.send(event).is_err() {
            trace!("Status channel closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (reporter, mut channel) = StatusChannel::new();

        reporter.log("Ready.");
        reporter.status("01/02/2024 10:30", Severity::Date, "Prestamos");
        reporter.health(Health::Degraded);

        assert_eq!(
            channel.recv().await,
            Some(StatusEvent::Log { message: "Ready.".to_string() })
        );
        assert_eq!(
            channel.recv().await,
            Some(StatusEvent::Status {
                message: "01/02/2024 10:30".to_string(),
                severity: Severity::Date,
                target: "Prestamos".to_string(),
            })
        );
        assert_eq!(channel.try_recv(), Some(StatusEvent::Health(Health::Degraded)));
        assert_eq!(channel.try_recv(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_is_silent() {
        let (reporter, mut channel) = StatusChannel::new();
        channel.close();

        reporter.log("dropped");
        assert!(reporter.is_closed());
    }

    #[tokio::test]
    async fn test_channel_ends_when_reporters_drop() {
        let (reporter, mut channel) = StatusChannel::new();
        reporter.log("last");
        drop(reporter);

        assert_eq!(channel.drain().len(), 1);
        assert_eq!(channel.recv().await, None);
    }
}
