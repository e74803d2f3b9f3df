//! Event bus port — fan-out of hub events to live subscribers.

use std::future::Future;

use coophub_domain::error::CoopHubError;
use coophub_domain::event::Event;

/// Publishes events to interested real-time subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers of its farm.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), CoopHubError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), CoopHubError>> + Send {
        (**self).publish(event)
    }
}
