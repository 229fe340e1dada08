//! Service event system.

use tokio::sync::broadcast;

/// Events emitted by the worker service.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// Service has started successfully.
    Started,

    /// Service is shutting down.
    ShuttingDown,

    /// The sweeper removed expired login challenges.
    ChallengesSwept {
        /// Number of challenges removed.
        removed: usize,
    },

    /// A warning run finished.
    WarningsSent {
        /// Warnings delivered and recorded.
        sent: usize,
        /// Warnings that failed and stay eligible for retry.
        failed: usize,
    },

    /// An expiry run finished.
    TrialsDowngraded {
        /// Subscriptions downgraded.
        processed: usize,
        /// Subscriptions whose downgrade failed.
        failed: usize,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving service events.
pub type ServiceEventsChannel = broadcast::Receiver<ServiceEvent>;

/// Sender for service events.
pub type ServiceEventsSender = broadcast::Sender<ServiceEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServiceEventsSender, ServiceEventsChannel) {
    broadcast::channel(256)
}
