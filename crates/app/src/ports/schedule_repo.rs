//! Schedule repository port — persistence for schedule rules.

use std::future::Future;

use coophub_domain::error::CoopHubError;
use coophub_domain::id::{DeviceId, FarmId, ScheduleId};
use coophub_domain::schedule::{ScheduleProgress, ScheduleRule};
use coophub_domain::time::Timestamp;

/// Repository for persisting and querying [`ScheduleRule`]s.
pub trait ScheduleRepository {
    /// Create a new schedule in storage.
    fn create(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send;

    /// Get a schedule by its unique identifier, active or not.
    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<ScheduleRule>, CoopHubError>> + Send;

    /// Active schedules of a farm, optionally for one device, ordered by
    /// priority (highest first) then creation time (newest first).
    fn list_by_farm(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send;

    /// Active schedules whose next-fire time is at or before `now`.
    fn get_due(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send;

    /// Replace an existing schedule.
    fn update(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send;

    /// Write firing bookkeeping onto the stored rule, leaving the fields an
    /// editor owns untouched (see [`ScheduleProgress::apply_to`]).
    ///
    /// Resolves to `false` if the rule is missing or no longer active.
    fn record_progress(
        &self,
        progress: ScheduleProgress,
    ) -> impl Future<Output = Result<bool, CoopHubError>> + Send;
}

impl<T: ScheduleRepository + Send + Sync> ScheduleRepository for std::sync::Arc<T> {
    fn create(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send {
        (**self).create(rule)
    }

    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<ScheduleRule>, CoopHubError>> + Send {
        (**self).get_by_id(id)
    }

    fn list_by_farm(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send {
        (**self).list_by_farm(farm_id, device_id, limit)
    }

    fn get_due(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send {
        (**self).get_due(now)
    }

    fn update(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send {
        (**self).update(rule)
    }

    fn record_progress(
        &self,
        progress: ScheduleProgress,
    ) -> impl Future<Output = Result<bool, CoopHubError>> + Send {
        (**self).record_progress(progress)
    }
}
