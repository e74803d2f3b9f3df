//! Execution record — append-only history of schedule firings.

use serde::{Deserialize, Serialize};

use crate::id::{CommandId, DeviceId, ExecutionId, ScheduleId};
use crate::time::Timestamp;

/// Outcome of one firing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The command was handed to the command sink.
    Executed,
    /// The command sink rejected the command.
    Failed,
    /// The rule was due but another rule for the same device won.
    Skipped,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(crate::error::ValidationError::InvalidId(other.to_string())),
        }
    }
}

/// One line of a schedule's execution history. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub schedule_id: ScheduleId,
    pub device_id: DeviceId,
    pub scheduled_time: Timestamp,
    pub actual_execution_time: Option<Timestamp>,
    pub status: ExecutionStatus,
    pub execution_duration_ms: Option<u64>,
    pub device_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Command emitted by this firing, if one was built.
    pub command_id: Option<CommandId>,
    pub created_at: Timestamp,
}

impl ExecutionRecord {
    /// The command reached the sink after `duration_ms` milliseconds.
    #[must_use]
    pub fn executed(
        schedule_id: ScheduleId,
        device_id: DeviceId,
        scheduled_time: Timestamp,
        fired_at: Timestamp,
        command_id: CommandId,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            schedule_id,
            device_id,
            scheduled_time,
            actual_execution_time: Some(fired_at),
            status: ExecutionStatus::Executed,
            execution_duration_ms: Some(duration_ms),
            device_response: None,
            error_message: None,
            command_id: Some(command_id),
            created_at: fired_at,
        }
    }

    /// The firing was attempted but the command could not be delivered.
    #[must_use]
    pub fn failed(
        schedule_id: ScheduleId,
        device_id: DeviceId,
        scheduled_time: Timestamp,
        fired_at: Timestamp,
        command_id: Option<CommandId>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            schedule_id,
            device_id,
            scheduled_time,
            actual_execution_time: Some(fired_at),
            status: ExecutionStatus::Failed,
            execution_duration_ms: None,
            device_response: None,
            error_message: Some(error.into()),
            command_id,
            created_at: fired_at,
        }
    }

    /// The rule was due but did not fire. `reason` names why.
    #[must_use]
    pub fn skipped(
        schedule_id: ScheduleId,
        device_id: DeviceId,
        scheduled_time: Timestamp,
        at: Timestamp,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            schedule_id,
            device_id,
            scheduled_time,
            actual_execution_time: None,
            status: ExecutionStatus::Skipped,
            execution_duration_ms: None,
            device_response: None,
            error_message: Some(reason.into()),
            command_id: None,
            created_at: at,
        }
    }
}

/// Percentage of `executed` records, `0.0` for an empty history.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn success_rate(records: &[ExecutionRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let executed = records
        .iter()
        .filter(|r| r.status == ExecutionStatus::Executed)
        .count();
    executed as f64 / records.len() as f64 * 100.0
}
