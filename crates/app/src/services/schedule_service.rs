//! Schedule service — use-cases for managing schedules and their history.

use coophub_domain::error::{CoopHubError, NotFoundError, ValidationError};
use coophub_domain::execution::{ExecutionRecord, success_rate};
use coophub_domain::id::{DeviceId, FarmId, ScheduleId};
use coophub_domain::schedule::{NewSchedule, SchedulePatch, ScheduleRule};
use coophub_domain::time::now;

use crate::ports::{DeviceDirectory, ExecutionLog, ScheduleRepository};

/// Largest page returned by [`ScheduleService::list`].
pub const MAX_LIST_LIMIT: u32 = 200;
/// Default page of [`ScheduleService::list`].
pub const DEFAULT_LIST_LIMIT: u32 = 50;
/// Default look-back of [`ScheduleService::history`], in days.
pub const DEFAULT_HISTORY_DAYS: u32 = 30;
/// Longest look-back of [`ScheduleService::history`], in days.
pub const MAX_HISTORY_DAYS: u32 = 3650;
/// Default page of [`ScheduleService::history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
/// Largest page returned by [`ScheduleService::history`].
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Execution history of one schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleHistory {
    /// Newest first.
    pub executions: Vec<ExecutionRecord>,
    /// Percentage of `executed` records among `executions`.
    pub success_rate: f64,
}

/// Application service for schedule CRUD and history.
pub struct ScheduleService<S, L, D> {
    schedules: S,
    executions: L,
    devices: D,
}

impl<S, L, D> ScheduleService<S, L, D>
where
    S: ScheduleRepository,
    L: ExecutionLog,
    D: DeviceDirectory,
{
    /// Create a new service backed by the given ports.
    pub fn new(schedules: S, executions: L, devices: D) -> Self {
        Self {
            schedules,
            executions,
            devices,
        }
    }

    /// Create a schedule for a device of `farm_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if the draft is invalid or the
    /// device belongs to another farm, [`CoopHubError::NotFound`] if the
    /// device is unknown, or a storage error.
    #[tracing::instrument(skip(self, draft), fields(device_id = %draft.device_id))]
    pub async fn create(
        &self,
        farm_id: FarmId,
        draft: NewSchedule,
    ) -> Result<ScheduleRule, CoopHubError> {
        let rule = draft.into_rule(farm_id, now())?;
        self.check_device(farm_id, rule.device_id).await?;
        let rule = self.schedules.create(rule).await?;
        tracing::info!(schedule_id = %rule.id, kind = %rule.kind, next_execution = ?rule.next_execution, "schedule created");
        Ok(rule)
    }

    /// Look up a schedule of `farm_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] when no schedule with `id` exists
    /// in that farm, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, farm_id: FarmId, id: ScheduleId) -> Result<ScheduleRule, CoopHubError> {
        self.schedules
            .get_by_id(id)
            .await?
            .filter(|rule| rule.farm_id == farm_id)
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Schedule",
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// Active schedules of a farm, highest priority first.
    ///
    /// `limit` defaults to 50 and is capped at 200.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: Option<u32>,
    ) -> Result<Vec<ScheduleRule>, CoopHubError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.schedules.list_by_farm(farm_id, device_id, limit).await
    }

    /// Apply a partial edit.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown schedule,
    /// [`CoopHubError::Validation`] if the edited rule is invalid, or a
    /// storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(
        &self,
        farm_id: FarmId,
        id: ScheduleId,
        patch: SchedulePatch,
    ) -> Result<ScheduleRule, CoopHubError> {
        let mut rule = self.get(farm_id, id).await?;
        patch.apply(&mut rule, now())?;
        self.schedules.update(rule).await
    }

    /// Retire a schedule. Its history is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown schedule, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn retire(&self, farm_id: FarmId, id: ScheduleId) -> Result<(), CoopHubError> {
        let mut rule = self.get(farm_id, id).await?;
        rule.deactivate(now());
        self.schedules.update(rule).await?;
        tracing::info!(schedule_id = %id, "schedule retired");
        Ok(())
    }

    /// Executions of the last `days` days (default 30, capped at 3650),
    /// newest first, at most `limit` (default 100, capped at 500).
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::NotFound`] for an unknown schedule, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn history(
        &self,
        farm_id: FarmId,
        id: ScheduleId,
        days: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ScheduleHistory, CoopHubError> {
        self.get(farm_id, id).await?;
        let days = days.unwrap_or(DEFAULT_HISTORY_DAYS).min(MAX_HISTORY_DAYS);
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let since = now() - chrono::Duration::days(i64::from(days));

        let executions = self.executions.find_by_schedule(id, since, limit).await?;
        let success_rate = success_rate(&executions);
        Ok(ScheduleHistory {
            executions,
            success_rate,
        })
    }

    async fn check_device(&self, farm_id: FarmId, device_id: DeviceId) -> Result<(), CoopHubError> {
        let device = self.devices.lookup(device_id).await?.ok_or_else(|| NotFoundError {
            entity: "Device",
            id: device_id.to_string(),
        })?;
        if !device.belongs_to(farm_id) {
            return Err(ValidationError::DeviceFarmMismatch {
                device_id: device_id.to_string(),
                farm_id: farm_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
