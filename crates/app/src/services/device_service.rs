//! Device service — device registration, status reports and manual commands.

use coophub_domain::command::{CommandType, DeviceCommand};
use coophub_domain::device::DeviceInfo;
use coophub_domain::error::{CoopHubError, NotFoundError};
use coophub_domain::event::Event;
use coophub_domain::id::DeviceId;
use coophub_domain::time::now;

use crate::ports::{CommandSink, DeviceDirectory, EventPublisher};

/// A command accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    pub command: DeviceCommand,
    /// Set when the device is offline; the command stays queued.
    pub warning: Option<String>,
}

/// Application service for the device side of the system.
pub struct DeviceService<D, C, P> {
    devices: D,
    commands: C,
    publisher: P,
}

impl<D, C, P> DeviceService<D, C, P>
where
    D: DeviceDirectory,
    C: CommandSink,
    P: EventPublisher,
{
    /// Create a new service backed by the given ports.
    pub fn new(devices: D, commands: C, publisher: P) -> Self {
        Self {
            devices,
            commands,
            publisher,
        }
    }

    /// Add a device to the directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if invariants fail, or a
    /// storage error.
    #[tracing::instrument(skip(self, device), fields(farm_id = %device.farm_id, device_name = %device.name))]
    pub async fn register(&self, device: DeviceInfo) -> Result<DeviceInfo, CoopHubError> {
        device.validate()?;
        self.devices.register(device).await
    }

    /// Look up a device.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown id, or a storage
    /// error.
    pub async fn get(&self, id: DeviceId) -> Result<DeviceInfo, CoopHubError> {
        self.devices.lookup(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Device",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Record a heartbeat or status change and tell the device's farm.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown id, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn report_status(
        &self,
        id: DeviceId,
        is_online: bool,
    ) -> Result<DeviceInfo, CoopHubError> {
        let device = self
            .devices
            .set_online(id, is_online, now())
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Device",
                id: id.to_string(),
            })?;
        if let Err(err) = self.publisher.publish(Event::device_update(&device)).await {
            tracing::warn!(device_id = %id, error = %err, "failed to publish device update");
        }
        Ok(device)
    }

    /// Queue a manual command for a device.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown device,
    /// [`CoopHubError::Validation`] for an invalid command, or a storage
    /// error.
    #[tracing::instrument(skip(self, value))]
    pub async fn send_command(
        &self,
        id: DeviceId,
        command_type: CommandType,
        value: Option<String>,
        duration: Option<u32>,
    ) -> Result<CommandReceipt, CoopHubError> {
        let device = self.get(id).await?;
        let command = DeviceCommand::builder()
            .device_id(device.id)
            .farm_id(device.farm_id)
            .coop_id(device.coop_id)
            .command_type(command_type)
            .command_value(value)
            .duration(duration)
            .build()?;
        let command = self.commands.persist(command).await?;

        let warning = (!device.is_online).then(|| {
            tracing::warn!(device_id = %id, command_id = %command.id, "device offline, command queued");
            "Device is offline. Command will be executed when device comes online.".to_string()
        });
        Ok(CommandReceipt { command, warning })
    }
}
