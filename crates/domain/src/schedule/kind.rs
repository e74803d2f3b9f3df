//! Schedule kind — what decides when a schedule fires.

use serde::{Deserialize, Serialize};

use crate::cron::CronExpression;
use crate::error::{ConfigurationError, ValidationError};

/// The timing model of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fires on every minute matched by a five-field cron expression.
    TimeBased { cron_expression: CronExpression },
    /// Alternates between an "on" segment and an "off" segment.
    DurationBased {
        /// Length of the on segment, in seconds.
        on_duration: u32,
        /// Length of the off segment, in seconds.
        off_duration: u32,
    },
    /// Fired on demand by whoever evaluates the condition.
    ConditionBased { condition: serde_json::Value },
}

impl ScheduleKind {
    /// Short name used in logs and storage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TimeBased { .. } => "time_based",
            Self::DurationBased { .. } => "duration_based",
            Self::ConditionBased { .. } => "condition_based",
        }
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeBased { cron_expression } => write!(f, "time_based({cron_expression})"),
            Self::DurationBased {
                on_duration,
                off_duration,
            } => write!(f, "duration_based({on_duration}s on, {off_duration}s off)"),
            Self::ConditionBased { .. } => f.write_str("condition_based"),
        }
    }
}

/// Flat form of a [`ScheduleKind`]: one optional field per kind, as found
/// in request bodies and table columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleKindParts {
    #[serde(default)]
    pub schedule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl TryFrom<ScheduleKindParts> for ScheduleKind {
    type Error = ValidationError;

    fn try_from(parts: ScheduleKindParts) -> Result<Self, Self::Error> {
        match parts.schedule_type.as_str() {
            "time_based" => {
                let expression = parts
                    .cron_expression
                    .filter(|e| !e.trim().is_empty())
                    .ok_or(ConfigurationError::MissingField("cron_expression"))?;
                let cron_expression = CronExpression::parse(&expression).map_err(|source| {
                    ValidationError::InvalidScheduleExpression { expression, source }
                })?;
                Ok(Self::TimeBased { cron_expression })
            }
            "duration_based" => {
                let (Some(on), Some(off)) = (parts.on_duration, parts.off_duration) else {
                    return Err(
                        ConfigurationError::MissingField("on_duration and off_duration").into(),
                    );
                };
                Ok(Self::DurationBased {
                    on_duration: positive(on)?,
                    off_duration: positive(off)?,
                })
            }
            "condition_based" => {
                let condition = parts
                    .condition
                    .filter(|c| !c.is_null())
                    .ok_or(ConfigurationError::MissingField("condition"))?;
                Ok(Self::ConditionBased { condition })
            }
            other => Err(ValidationError::UnknownScheduleType(other.to_string())),
        }
    }
}

fn positive(seconds: i64) -> Result<u32, ConfigurationError> {
    u32::try_from(seconds)
        .ok()
        .filter(|s| *s > 0)
        .ok_or(ConfigurationError::NonPositiveDuration)
}

impl From<&ScheduleKind> for ScheduleKindParts {
    fn from(kind: &ScheduleKind) -> Self {
        let mut parts = Self {
            schedule_type: kind.name().to_string(),
            ..Self::default()
        };
        match kind {
            ScheduleKind::TimeBased { cron_expression } => {
                parts.cron_expression = Some(cron_expression.to_string());
            }
            ScheduleKind::DurationBased {
                on_duration,
                off_duration,
            } => {
                parts.on_duration = Some(i64::from(*on_duration));
                parts.off_duration = Some(i64::from(*off_duration));
            }
            ScheduleKind::ConditionBased { condition } => {
                parts.condition = Some(condition.clone());
            }
        }
        parts
    }
}

/// Segment of a duty cycle started by the most recent firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyPhase {
    On,
    Off,
}

impl DutyPhase {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl std::fmt::Display for DutyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
        })
    }
}

impl std::str::FromStr for DutyPhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(ValidationError::UnknownDutyPhase(other.to_string())),
        }
    }
}
