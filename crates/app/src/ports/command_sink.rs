//! Command sink port — where emitted device commands go.

use std::future::Future;

use coophub_domain::command::DeviceCommand;
use coophub_domain::error::CoopHubError;

/// Accepts device commands for delivery.
pub trait CommandSink {
    /// Queue a command. Returns the stored command.
    fn persist(
        &self,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<DeviceCommand, CoopHubError>> + Send;
}

impl<T: CommandSink + Send + Sync> CommandSink for std::sync::Arc<T> {
    fn persist(
        &self,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<DeviceCommand, CoopHubError>> + Send {
        (**self).persist(command)
    }
}
