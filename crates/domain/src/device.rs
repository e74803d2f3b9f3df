//! Device — a controllable piece of coop equipment (lights, feeders, fans).

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, CoopHubError, ValidationError};
use crate::id::{CoopId, DeviceId, FarmId};
use crate::time::Timestamp;

/// What the device directory knows about a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub farm_id: FarmId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coop_id: Option<CoopId>,
    pub name: String,
    pub is_online: bool,
    pub last_heartbeat: Option<Timestamp>,
}

impl DeviceInfo {
    /// Create a builder for constructing a [`DeviceInfo`].
    #[must_use]
    pub fn builder() -> DeviceInfoBuilder {
        DeviceInfoBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if `name` is blank.
    pub fn validate(&self) -> Result<(), CoopHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// `true` if the device belongs to `farm_id`.
    #[must_use]
    pub fn belongs_to(&self, farm_id: FarmId) -> bool {
        self.farm_id == farm_id
    }

    /// Record a status report.
    pub fn report_status(&mut self, is_online: bool, at: Timestamp) {
        self.is_online = is_online;
        if is_online {
            self.last_heartbeat = Some(at);
        }
    }
}

/// Step-by-step builder for [`DeviceInfo`].
#[derive(Debug, Default)]
pub struct DeviceInfoBuilder {
    id: Option<DeviceId>,
    farm_id: Option<FarmId>,
    coop_id: Option<CoopId>,
    name: Option<String>,
    is_online: bool,
}

impl DeviceInfoBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
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
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn online(mut self, is_online: bool) -> Self {
        self.is_online = is_online;
        self
    }

    /// Consume the builder, validate, and return a [`DeviceInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if the farm is missing or the
    /// name is blank.
    pub fn build(self) -> Result<DeviceInfo, CoopHubError> {
        let farm_id = self.farm_id.ok_or(ValidationError::InvalidConfiguration(
            ConfigurationError::MissingField("farm_id"),
        ))?;
        let device = DeviceInfo {
            id: self.id.unwrap_or_default(),
            farm_id,
            coop_id: self.coop_id,
            name: self.name.unwrap_or_default(),
            is_online: self.is_online,
            last_heartbeat: None,
        };
        device.validate()?;
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_offline_device_by_default() {
        let device = DeviceInfo::builder()
            .farm_id(FarmId::new())
            .name("Coop 1 lights")
            .build()
            .unwrap();
        assert!(!device.is_online);
        assert!(device.last_heartbeat.is_none());
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = DeviceInfo::builder().farm_id(FarmId::new()).build();
        assert!(matches!(
            result,
            Err(CoopHubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_check_farm_membership() {
        let farm = FarmId::new();
        let device = DeviceInfo::builder().farm_id(farm).name("fan").build().unwrap();
        assert!(device.belongs_to(farm));
        assert!(!device.belongs_to(FarmId::new()));
    }

    #[test]
    fn should_record_heartbeat_only_when_online() {
        let mut device = DeviceInfo::builder()
            .farm_id(FarmId::new())
            .name("feeder")
            .build()
            .unwrap();
        let now = crate::time::now();
        device.report_status(true, now);
        assert!(device.is_online);
        assert_eq!(device.last_heartbeat, Some(now));

        device.report_status(false, crate::time::add_seconds(now, 60));
        assert!(!device.is_online);
        assert_eq!(device.last_heartbeat, Some(now));
    }
}
