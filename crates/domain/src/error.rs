//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`CoopHubError`]
//! via `#[from]`. Storage adapters box their concrete error type.

use crate::cron::CronError;

/// Top-level error returned by domain validation and application services.
#[derive(Debug, thiserror::Error)]
pub enum CoopHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A domain invariant was violated by caller-supplied data.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid schedule expression {expression:?}")]
    InvalidScheduleExpression {
        expression: String,
        #[source]
        source: CronError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    #[error("schedule {0} is inactive")]
    ScheduleInactive(String),

    #[error("device {device_id} does not belong to farm {farm_id}")]
    DeviceFarmMismatch { device_id: String, farm_id: String },

    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    #[error("unknown schedule type {0:?} (expected time_based, duration_based or condition_based)")]
    UnknownScheduleType(String),

    #[error("unknown duty phase {0:?} (expected on or off)")]
    UnknownDutyPhase(String),

    #[error("no fields to update")]
    NoChanges,
}

/// Missing or out-of-range fields for the declared schedule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("on and off durations must be strictly positive")]
    NonPositiveDuration,

    #[error("{0} is required for this schedule type")]
    MissingField(&'static str),

    #[error("set_value requires a value")]
    MissingActionValue,

    #[error("action sequence must not be empty")]
    EmptySequence,

    #[error("action sequence step {0} must have a positive duration")]
    NonPositiveStepDuration(usize),

    #[error("auto-off duration must be strictly positive")]
    NonPositiveAutoOff,
}

/// A referenced record does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
