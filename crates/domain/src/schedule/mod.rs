//! Schedule — a rule that emits a device command at computed times.
//!
//! A schedule targets one device and carries a [`ScheduleKind`] deciding
//! *when* it fires and an action deciding *what* it sends. Schedules are
//! retired by clearing `is_active`, never deleted.
//!
//! The rule owns its own state transitions: [`ScheduleRule::command_for`]
//! builds the command a firing emits, [`ScheduleRule::advance`] records the
//! firing and moves the next-fire time forward, [`ScheduleRule::defer`]
//! pushes a rule that lost a same-device conflict to its next slot.

mod action;
mod draft;
mod kind;

pub use action::ActionStep;
pub use draft::{NewSchedule, SchedulePatch};
pub use kind::{DutyPhase, ScheduleKind, ScheduleKindParts};

use serde::{Deserialize, Serialize};

use crate::command::{CommandType, DeviceCommand};
use crate::cron::CronError;
use crate::error::{ConfigurationError, CoopHubError, ValidationError};
use crate::id::{CoopId, DeviceId, FarmId, ScheduleId};
use crate::time::{Timestamp, add_seconds};

/// How a firing was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// The rule came due on its own cadence.
    Scheduled,
    /// Someone asked for it to run right now.
    Manual,
}

/// A persisted automation rule for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: ScheduleId,
    pub farm_id: FarmId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coop_id: Option<CoopId>,
    pub device_id: DeviceId,
    pub name: String,
    #[serde(flatten)]
    pub kind: ScheduleKind,
    pub action: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_value: Option<String>,
    /// Seconds after which the device reverts on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_sequence: Option<Vec<ActionStep>>,
    /// Higher wins when several rules for one device are due together.
    pub priority: i32,
    pub is_active: bool,
    pub next_execution: Option<Timestamp>,
    pub last_execution: Option<Timestamp>,
    pub execution_count: u64,
    /// Duty-cycle segment started by the last scheduled firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_phase: Option<DutyPhase>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScheduleRule {
    /// Create a builder for constructing a [`ScheduleRule`].
    #[must_use]
    pub fn builder() -> ScheduleRuleBuilder {
        ScheduleRuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] when:
    /// - `name` is blank ([`ValidationError::EmptyName`])
    /// - a duration-based rule has a zero segment
    /// - a condition-based rule has a null condition
    /// - `set_value` is used without a value
    /// - the auto-off duration or a sequence step duration is zero
    /// - the action sequence is present but empty
    pub fn validate(&self) -> Result<(), CoopHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        match &self.kind {
            ScheduleKind::TimeBased { .. } => {}
            ScheduleKind::DurationBased {
                on_duration,
                off_duration,
            } => {
                if *on_duration == 0 || *off_duration == 0 {
                    return Err(invalid(ConfigurationError::NonPositiveDuration));
                }
            }
            ScheduleKind::ConditionBased { condition } => {
                if condition.is_null() {
                    return Err(invalid(ConfigurationError::MissingField("condition")));
                }
            }
        }
        if self.action == CommandType::SetValue && self.action_value.is_none() {
            return Err(invalid(ConfigurationError::MissingActionValue));
        }
        if self.action_duration == Some(0) {
            return Err(invalid(ConfigurationError::NonPositiveAutoOff));
        }
        if let Some(steps) = &self.action_sequence {
            if steps.is_empty() {
                return Err(invalid(ConfigurationError::EmptySequence));
            }
            for (index, step) in steps.iter().enumerate() {
                if step.duration == 0 {
                    return Err(invalid(ConfigurationError::NonPositiveStepDuration(index)));
                }
                if step.action == CommandType::SetValue && step.value.is_none() {
                    return Err(invalid(ConfigurationError::MissingActionValue));
                }
            }
        }
        Ok(())
    }

    /// `true` when the rule is active and its next-fire time has passed.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active && self.next_execution.is_some_and(|next| next <= now)
    }

    /// When the rule should fire next, evaluated from `from`.
    ///
    /// - time-based: the first matching minute strictly after `from`;
    /// - duration-based: the end of the segment started by the last firing,
    ///   or `from` itself if the rule never fired;
    /// - condition-based: never on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidScheduleExpression`] if the cron
    /// expression has no matching minute left.
    pub fn next_execution_after(&self, from: Timestamp) -> Result<Option<Timestamp>, ValidationError> {
        match &self.kind {
            ScheduleKind::TimeBased { cron_expression } => cron_expression
                .next_after(from)
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidScheduleExpression {
                    expression: cron_expression.to_string(),
                    source: CronError::NeverFires,
                }),
            ScheduleKind::DurationBased { .. } => {
                Ok(Some(match (self.last_execution, self.duty_phase) {
                    (Some(last), Some(phase)) => add_seconds(last, self.segment_length(phase)),
                    _ => from,
                }))
            }
            ScheduleKind::ConditionBased { .. } => Ok(None),
        }
    }

    /// The duty-cycle segment the next scheduled firing will start.
    #[must_use]
    pub fn upcoming_phase(&self) -> Option<DutyPhase> {
        match self.kind {
            ScheduleKind::DurationBased { .. } => {
                Some(self.duty_phase.map_or(DutyPhase::On, DutyPhase::flipped))
            }
            _ => None,
        }
    }

    fn segment_length(&self, phase: DutyPhase) -> u32 {
        match (&self.kind, phase) {
            (ScheduleKind::DurationBased { on_duration, .. }, DutyPhase::On) => *on_duration,
            (ScheduleKind::DurationBased { off_duration, .. }, DutyPhase::Off) => *off_duration,
            _ => 0,
        }
    }

    /// Build the single command a firing of this rule emits.
    ///
    /// Manual firings and non duty-cycle rules send the configured action,
    /// or the first step of the action sequence when there is one. A
    /// scheduled duty-cycle firing sends the configured action (`on` if the
    /// configured action is `off`) when starting the on segment, and `off`
    /// when starting the off segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if the resulting command is
    /// invalid.
    pub fn command_for(&self, firing: Firing, issued_at: Timestamp) -> Result<DeviceCommand, CoopHubError> {
        let (command_type, value, duration) = match (firing, self.upcoming_phase()) {
            (Firing::Scheduled, Some(DutyPhase::Off)) => (CommandType::Off, None, None),
            (Firing::Scheduled, Some(DutyPhase::On)) => match self.action {
                CommandType::Off => (CommandType::On, None, None),
                other => (other, self.action_value.clone(), None),
            },
            _ => self.primary_action(),
        };

        DeviceCommand::builder()
            .device_id(self.device_id)
            .farm_id(self.farm_id)
            .coop_id(self.coop_id)
            .schedule_id(self.id)
            .command_type(command_type)
            .command_value(value)
            .duration(duration)
            .issued_at(issued_at)
            .build()
    }

    fn primary_action(&self) -> (CommandType, Option<String>, Option<u32>) {
        match self.action_sequence.as_deref() {
            Some([first, ..]) => (first.action, first.value.clone(), Some(first.duration)),
            _ => (self.action, self.action_value.clone(), self.action_duration),
        }
    }

    /// Record a firing at `fired_at` and move the rule to its next slot.
    ///
    /// The fire count and last-fire time always change. A scheduled firing
    /// also flips the duty phase and recomputes the next-fire time; a manual
    /// one leaves both untouched.
    ///
    /// # Errors
    ///
    /// If the next-fire time cannot be computed the rule is deactivated and
    /// the error returned.
    pub fn advance(&mut self, firing: Firing, fired_at: Timestamp) -> Result<(), ValidationError> {
        self.execution_count += 1;
        self.last_execution = Some(fired_at);
        self.updated_at = fired_at;

        if firing == Firing::Manual {
            return Ok(());
        }
        if let Some(phase) = self.upcoming_phase() {
            self.duty_phase = Some(phase);
        }
        match self.next_execution_after(fired_at) {
            Ok(next) => {
                self.next_execution = next;
                Ok(())
            }
            Err(err) => {
                self.deactivate(fired_at);
                Err(err)
            }
        }
    }

    /// Push a due rule that was not fired to its next eligible slot.
    ///
    /// Time-based rules move to the first matching minute after `now`.
    /// Duty-cycle rules stay due so they run on a later evaluation.
    ///
    /// # Errors
    ///
    /// Same as [`ScheduleRule::advance`].
    pub fn defer(&mut self, now: Timestamp) -> Result<(), ValidationError> {
        if let ScheduleKind::TimeBased { .. } = self.kind {
            match self.next_execution_after(now) {
                Ok(next) => {
                    self.next_execution = next;
                    self.updated_at = now;
                }
                Err(err) => {
                    self.deactivate(now);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Recompute the next-fire time from `now` after the rule was edited.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidScheduleExpression`] if the cron
    /// expression has no matching minute left.
    pub fn reschedule(&mut self, now: Timestamp) -> Result<(), ValidationError> {
        self.next_execution = if self.is_active {
            self.next_execution_after(now)?
        } else {
            None
        };
        self.updated_at = now;
        Ok(())
    }

    /// Retire the rule: it keeps its history but never fires again.
    pub fn deactivate(&mut self, at: Timestamp) {
        self.is_active = false;
        self.next_execution = None;
        self.updated_at = at;
    }

    /// The bookkeeping of this rule after [`ScheduleRule::advance`] with
    /// `Some(firing)`, or after [`ScheduleRule::defer`] with `None`.
    #[must_use]
    pub fn progress(&self, firing: Option<Firing>) -> ScheduleProgress {
        ScheduleProgress {
            id: self.id,
            kind: self.kind.clone(),
            fired: firing.is_some(),
            reschedules: firing != Some(Firing::Manual),
            last_execution: self.last_execution,
            next_execution: self.next_execution,
            duty_phase: self.duty_phase,
            is_active: self.is_active,
            updated_at: self.updated_at,
        }
    }
}

/// Firing bookkeeping written back to a stored rule, leaving every
/// caller-owned field (name, action, priority, kind) as it is in storage.
///
/// A retired rule stays retired. The timing fields only apply while the
/// stored rule still has the kind they were computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleProgress {
    pub id: ScheduleId,
    /// Kind the rule had when it was loaded for firing.
    pub kind: ScheduleKind,
    /// `true` for a firing, `false` for a deferral.
    pub fired: bool,
    /// `false` for a manual firing, which never moves the timing.
    pub reschedules: bool,
    pub last_execution: Option<Timestamp>,
    pub next_execution: Option<Timestamp>,
    pub duty_phase: Option<DutyPhase>,
    /// `false` when the firing could not compute a next slot.
    pub is_active: bool,
    pub updated_at: Timestamp,
}

impl ScheduleProgress {
    /// Apply to `rule` as stored. Returns `false`, leaving `rule` untouched,
    /// if it is another rule or no longer active.
    pub fn apply_to(&self, rule: &mut ScheduleRule) -> bool {
        if rule.id != self.id || !rule.is_active {
            return false;
        }
        if self.fired {
            rule.execution_count += 1;
            rule.last_execution = self.last_execution;
        }
        if self.reschedules && rule.kind == self.kind {
            rule.next_execution = self.next_execution;
            rule.duty_phase = self.duty_phase;
            rule.is_active = self.is_active;
        }
        rule.updated_at = self.updated_at;
        true
    }
}

fn invalid(err: ConfigurationError) -> CoopHubError {
    ValidationError::InvalidConfiguration(err).into()
}

/// Step-by-step builder for [`ScheduleRule`].
#[derive(Debug, Default)]
pub struct ScheduleRuleBuilder {
    id: Option<ScheduleId>,
    farm_id: Option<FarmId>,
    coop_id: Option<CoopId>,
    device_id: Option<DeviceId>,
    name: Option<String>,
    kind: Option<ScheduleKind>,
    action: Option<CommandType>,
    action_value: Option<String>,
    action_duration: Option<u32>,
    action_sequence: Option<Vec<ActionStep>>,
    priority: i32,
    is_active: Option<bool>,
    created_at: Option<Timestamp>,
}

impl ScheduleRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: ScheduleId) -> Self {
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
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ScheduleKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn action(mut self, action: CommandType) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn action_value(mut self, value: Option<String>) -> Self {
        self.action_value = value;
        self
    }

    #[must_use]
    pub fn action_duration(mut self, seconds: Option<u32>) -> Self {
        self.action_duration = seconds;
        self
    }

    #[must_use]
    pub fn action_sequence(mut self, steps: Option<Vec<ActionStep>>) -> Self {
        self.action_sequence = steps;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Consume the builder, validate, compute the first next-fire time and
    /// return a [`ScheduleRule`].
    ///
    /// # Errors
    ///
    /// Returns [`CoopHubError::Validation`] if a required field is missing,
    /// an invariant fails, or the first next-fire time cannot be computed.
    pub fn build(self) -> Result<ScheduleRule, CoopHubError> {
        let farm_id = self.farm_id.ok_or(missing("farm_id"))?;
        let device_id = self.device_id.ok_or(missing("device_id"))?;
        let kind = self.kind.ok_or(missing("schedule_type"))?;
        let created_at = self.created_at.unwrap_or_else(crate::time::now);

        let mut rule = ScheduleRule {
            id: self.id.unwrap_or_default(),
            farm_id,
            coop_id: self.coop_id,
            device_id,
            name: self.name.unwrap_or_default(),
            kind,
            action: self.action.unwrap_or(CommandType::On),
            action_value: self.action_value,
            action_duration: self.action_duration,
            action_sequence: self.action_sequence,
            priority: self.priority,
            is_active: self.is_active.unwrap_or(true),
            next_execution: None,
            last_execution: None,
            execution_count: 0,
            duty_phase: None,
            created_at,
            updated_at: created_at,
        };
        rule.validate()?;
        rule.reschedule(created_at)?;
        Ok(rule)
    }
}

fn missing(field: &'static str) -> ValidationError {
    ValidationError::InvalidConfiguration(ConfigurationError::MissingField(field))
}
