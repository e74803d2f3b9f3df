//! Action step — one entry of a multi-step action sequence.

use serde::{Deserialize, Serialize};

use crate::command::CommandType;

/// A single step of a schedule's action sequence.
///
/// Only the first step is emitted when the schedule fires; the device is
/// expected to hold it for `duration` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStep {
    pub action: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Seconds to hold this step.
    pub duration: u32,
}

impl std::fmt::Display for ActionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}({value}) for {}s", self.action, self.duration),
            None => write!(f, "{} for {}s", self.action, self.duration),
        }
    }
}
