//! Caller-supplied schedule data: a new rule or a partial edit.

use serde::{Deserialize, Serialize};

use super::{ActionStep, ScheduleKind, ScheduleKindParts, ScheduleRule};
use crate::command::CommandType;
use crate::error::{CoopHubError, ValidationError};
use crate::id::{CoopId, DeviceId, FarmId};
use crate::time::Timestamp;

/// Everything needed to create a schedule, except the farm it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchedule {
    #[serde(default)]
    pub coop_id: Option<CoopId>,
    pub device_id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: ScheduleKindParts,
    pub action: CommandType,
    #[serde(default)]
    pub action_value: Option<String>,
    #[serde(default)]
    pub action_duration: Option<u32>,
    #[serde(default)]
    pub action_sequence: Option<Vec<ActionStep>>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl NewSchedule {
    /// Validate and turn the draft into a rule of `farm_id` created at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if the kind cannot be built or an
    /// invariant fails.
    pub fn into_rule(self, farm_id: FarmId, now: Timestamp) -> Result<ScheduleRule, CoopHubError> {
        let kind = ScheduleKind::try_from(self.kind)?;
        ScheduleRule::builder()
            .farm_id(farm_id)
            .coop_id(self.coop_id)
            .device_id(self.device_id)
            .name(self.name)
            .kind(kind)
            .action(self.action)
            .action_value(self.action_value)
            .action_duration(self.action_duration)
            .action_sequence(self.action_sequence)
            .priority(self.priority.unwrap_or(0))
            .active(self.is_active.unwrap_or(true))
            .created_at(now)
            .build()
    }
}

/// A partial edit of a schedule. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub schedule_type: Option<String>,
    pub cron_expression: Option<String>,
    pub on_duration: Option<i64>,
    pub off_duration: Option<i64>,
    pub condition: Option<serde_json::Value>,
    pub action: Option<CommandType>,
    pub action_value: Option<String>,
    pub action_duration: Option<u32>,
    pub action_sequence: Option<Vec<ActionStep>>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

impl SchedulePatch {
    /// `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn touches_kind(&self) -> bool {
        self.schedule_type.is_some()
            || self.cron_expression.is_some()
            || self.on_duration.is_some()
            || self.off_duration.is_some()
            || self.condition.is_some()
    }

    /// Apply the edit to `rule` at `now`, re-validating it and recomputing
    /// the next-fire time when the timing or the active flag changed.
    ///
    /// On error `rule` may be partially modified and must be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoChanges`] for an empty patch, or any
    /// validation error of the edited rule.
    pub fn apply(self, rule: &mut ScheduleRule, now: Timestamp) -> Result<(), CoopHubError> {
        if self.is_empty() {
            return Err(ValidationError::NoChanges.into());
        }

        let activation_changed = self.is_active.is_some_and(|active| active != rule.is_active);
        let kind_changed = self.touches_kind();

        if kind_changed {
            let mut parts = ScheduleKindParts::from(&rule.kind);
            if let Some(schedule_type) = self.schedule_type {
                parts.schedule_type = schedule_type;
            }
            parts.cron_expression = self.cron_expression.or(parts.cron_expression);
            parts.on_duration = self.on_duration.or(parts.on_duration);
            parts.off_duration = self.off_duration.or(parts.off_duration);
            parts.condition = self.condition.or(parts.condition);

            let kind = ScheduleKind::try_from(parts)?;
            if kind.name() != rule.kind.name() {
                rule.duty_phase = None;
            }
            rule.kind = kind;
        }
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(action) = self.action {
            rule.action = action;
        }
        if self.action_value.is_some() {
            rule.action_value = self.action_value;
        }
        if self.action_duration.is_some() {
            rule.action_duration = self.action_duration;
        }
        if self.action_sequence.is_some() {
            rule.action_sequence = self.action_sequence;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(active) = self.is_active {
            rule.is_active = active;
        }
        rule.validate()?;

        if kind_changed || activation_changed {
            rule.reschedule(now)?;
        } else {
            rule.updated_at = now;
        }
        Ok(())
    }
}
