//! Command dispatcher — queues device commands and announces them.

use std::future::Future;

use coophub_domain::command::DeviceCommand;
use coophub_domain::error::CoopHubError;
use coophub_domain::event::Event;

use crate::ports::{CommandSink, EventPublisher};

/// [`CommandSink`] that stores each command in an inner sink, then publishes
/// a `command_update` event for the command's farm and coop.
pub struct CommandDispatcher<C, P> {
    sink: C,
    publisher: P,
}

impl<C, P> CommandDispatcher<C, P> {
    /// Create a dispatcher storing into `sink` and announcing on `publisher`.
    pub fn new(sink: C, publisher: P) -> Self {
        Self { sink, publisher }
    }
}

impl<C, P> CommandSink for CommandDispatcher<C, P>
where
    C: CommandSink + Sync,
    P: EventPublisher + Sync,
{
    fn persist(
        &self,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<DeviceCommand, CoopHubError>> + Send {
        async move {
            let stored = self.sink.persist(command).await?;
            // Announcing is best effort: the command is already queued.
            if let Err(err) = self.publisher.publish(Event::command_update(&stored)).await {
                tracing::warn!(command_id = %stored.id, error = %err, "failed to publish command update");
            }
            tracing::debug!(command_id = %stored.id, device_id = %stored.device_id, command_type = %stored.command_type, "command queued");
            Ok(stored)
        }
    }
}
