//! Device command — an instruction queued for delivery to a device.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, CoopHubError, ValidationError};
use crate::id::{CommandId, CoopId, DeviceId, FarmId, ScheduleId};
use crate::time::Timestamp;

/// What the device is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    On,
    Off,
    SetValue,
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
            Self::SetValue => "set_value",
        })
    }
}

impl std::str::FromStr for CommandType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "set_value" => Ok(Self::SetValue),
            _ => Err(ValidationError::InvalidConfiguration(
                ConfigurationError::MissingField("action"),
            )),
        }
    }
}

/// Delivery status reported back by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        })
    }
}

impl std::str::FromStr for CommandStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            other => Err(ValidationError::InvalidId(other.to_string())),
        }
    }
}

/// A command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub id: CommandId,
    pub device_id: DeviceId,
    pub farm_id: FarmId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coop_id: Option<CoopId>,
    /// Set when the command was emitted by a schedule firing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<ScheduleId>,
    pub command_type: CommandType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_value: Option<String>,
    /// Seconds the device should hold the state before reverting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub status: CommandStatus,
    pub issued_at: Timestamp,
}

impl DeviceCommand {
    /// Create a builder for constructing a [`DeviceCommand`].
    #[must_use]
    pub fn builder() -> DeviceCommandBuilder {
        DeviceCommandBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingActionValue`] for a `set_value`
    /// command without a value.
    pub fn validate(&self) -> Result<(), CoopHubError> {
        if self.command_type == CommandType::SetValue && self.command_value.is_none() {
            return Err(ValidationError::from(ConfigurationError::MissingActionValue).into());
        }
        if self.duration == Some(0) {
            return Err(ValidationError::from(ConfigurationError::NonPositiveAutoOff).into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`DeviceCommand`].
#[derive(Debug, Default)]
pub struct DeviceCommandBuilder {
    id: Option<CommandId>,
    device_id: Option<DeviceId>,
    farm_id: Option<FarmId>,
    coop_id: Option<CoopId>,
    schedule_id: Option<ScheduleId>,
    command_type: Option<CommandType>,
    command_value: Option<String>,
    duration: Option<u32>,
    issued_at: Option<Timestamp>,
}

impl DeviceCommandBuilder {
    #[must_use]
    pub fn id(mut self, id: CommandId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn farm_id(mut self, farm_id: FarmId) -> Self {
        self.farm_id = Some(farm_id);
        self
    }

    #[must_use]
    pub fn coop_id(mut self, coop_id: Option<CoopId>) -> Self {
        self.coop_id = coop_id;
        self
    }

    #[must_use]
    pub fn schedule_id(mut self, schedule_id: ScheduleId) -> Self {
        self.schedule_id = Some(schedule_id);
        self
    }

    #[must_use]
    pub fn command_type(mut self, command_type: CommandType) -> Self {
        self.command_type = Some(command_type);
        self
    }

    #[must_use]
    pub fn command_value(mut self, value: Option<String>) -> Self {
        self.command_value = value;
        self
    }

    #[must_use]
    pub fn duration(mut self, seconds: Option<u32>) -> Self {
        self.duration = seconds;
        self
    }

    #[must_use]
    pub fn issued_at(mut self, ts: Timestamp) -> Self {
        self.issued_at = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a pending [`DeviceCommand`].
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if the device, farm or command
    /// type is missing, or if invariants fail.
    pub fn build(self) -> Result<DeviceCommand, CoopHubError> {
        let device_id = self
            .device_id
            .ok_or(ValidationError::from(ConfigurationError::MissingField("device_id")))?;
        let farm_id = self
            .farm_id
            .ok_or(ValidationError::from(ConfigurationError::MissingField("farm_id")))?;
        let command_type = self
            .command_type
            .ok_or(ValidationError::from(ConfigurationError::MissingField("command_type")))?;

        let command = DeviceCommand {
            id: self.id.unwrap_or_default(),
            device_id,
            farm_id,
            coop_id: self.coop_id,
            schedule_id: self.schedule_id,
            command_type,
            command_value: self.command_value,
            duration: self.duration,
            status: CommandStatus::Pending,
            issued_at: self.issued_at.unwrap_or_else(crate::time::now),
        };
        command.validate()?;
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DeviceCommandBuilder {
        DeviceCommand::builder()
            .device_id(DeviceId::new())
            .farm_id(FarmId::new())
    }

    #[test]
    fn should_build_pending_command() {
        let cmd = base().command_type(CommandType::On).build().unwrap();
        assert_eq!(cmd.status, CommandStatus::Pending);
        assert!(cmd.schedule_id.is_none());
    }

    #[test]
    fn should_reject_set_value_without_value() {
        let result = base().command_type(CommandType::SetValue).build();
        assert!(matches!(
            result,
            Err(CoopHubError::Validation(ValidationError::InvalidConfiguration(
                ConfigurationError::MissingActionValue
            )))
        ));
    }

    #[test]
    fn should_reject_missing_command_type() {
        assert!(base().build().is_err());
    }

    #[test]
    fn should_parse_command_type_case_insensitively() {
        assert_eq!("ON".parse::<CommandType>().unwrap(), CommandType::On);
        assert_eq!("set_value".parse::<CommandType>().unwrap(), CommandType::SetValue);
        assert!("toggle".parse::<CommandType>().is_err());
    }

    #[test]
    fn should_omit_empty_optionals_in_json() {
        let cmd = base().command_type(CommandType::Off).build().unwrap();
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command_type"], "off");
        assert_eq!(json["status"], "pending");
        assert!(json.get("coop_id").is_none());
        assert!(json.get("command_value").is_none());
    }
}
