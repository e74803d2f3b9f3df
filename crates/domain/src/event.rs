//! Event — something real-time subscribers of a farm should hear about.
//!
//! Events are transient: they are fanned out to live connections and never
//! persisted. On the wire every outbound frame is an [`Envelope`]; inbound
//! frames from a subscriber are [`ControlMessage`]s.

use serde::{Deserialize, Serialize};

use crate::command::DeviceCommand;
use crate::device::DeviceInfo;
use crate::id::{CoopId, FarmId};
use crate::time::Timestamp;

/// Category of a hub event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeviceUpdate,
    CommandUpdate,
    Alert,
}

/// A notification scoped to a farm and optionally to one coop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub farm_id: FarmId,
    pub coop_id: Option<CoopId>,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,
}

impl Event {
    #[must_use]
    pub fn new(
        kind: EventKind,
        farm_id: FarmId,
        coop_id: Option<CoopId>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            farm_id,
            coop_id,
            timestamp: crate::time::now(),
            data,
        }
    }

    /// A device came online, went offline, or sent a heartbeat.
    #[must_use]
    pub fn device_update(device: &DeviceInfo) -> Self {
        Self::new(
            EventKind::DeviceUpdate,
            device.farm_id,
            device.coop_id,
            serde_json::json!({
                "device_id": device.id,
                "name": device.name,
                "is_online": device.is_online,
                "last_heartbeat": device.last_heartbeat,
            }),
        )
    }

    /// A command was queued or changed status.
    #[must_use]
    pub fn command_update(command: &DeviceCommand) -> Self {
        Self::new(
            EventKind::CommandUpdate,
            command.farm_id,
            command.coop_id,
            serde_json::json!({
                "command_id": command.id,
                "device_id": command.device_id,
                "schedule_id": command.schedule_id,
                "command_type": command.command_type,
                "command_value": command.command_value,
                "status": command.status,
                "issued_at": command.issued_at,
            }),
        )
    }

    /// A farm-level alert, e.g. a temperature threshold crossed.
    #[must_use]
    pub fn alert(
        farm_id: FarmId,
        coop_id: Option<CoopId>,
        alert_type: &str,
        severity: &str,
        message: &str,
    ) -> Self {
        Self::new(
            EventKind::Alert,
            farm_id,
            coop_id,
            serde_json::json!({
                "alert_type": alert_type,
                "severity": severity,
                "message": message,
            }),
        )
    }

    /// Whether a subscriber scoped to `farm_id` / `coop_id` receives this
    /// event. Subscribers without a coop hear every event of their farm;
    /// farm-wide events reach every coop.
    #[must_use]
    pub fn reaches(&self, farm_id: FarmId, coop_id: Option<CoopId>) -> bool {
        if self.farm_id != farm_id {
            return false;
        }
        match (self.coop_id, coop_id) {
            (Some(event_coop), Some(subscriber_coop)) => event_coop == subscriber_coop,
            _ => true,
        }
    }
}

/// Discriminant of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    DeviceUpdate,
    CommandUpdate,
    Alert,
    Pong,
    Subscribed,
    Unsubscribed,
}

impl From<EventKind> for MessageType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::DeviceUpdate => Self::DeviceUpdate,
            EventKind::CommandUpdate => Self::CommandUpdate,
            EventKind::Alert => Self::Alert,
        }
    }
}

/// JSON frame sent to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: Timestamp,
    pub farm_id: FarmId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coop_id: Option<CoopId>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Acknowledgement of a control message, sent only to its author.
    #[must_use]
    pub fn reply(
        message_type: MessageType,
        farm_id: FarmId,
        coop_id: Option<CoopId>,
        at: Timestamp,
    ) -> Self {
        Self {
            message_type,
            timestamp: at,
            farm_id,
            coop_id,
            data: serde_json::Value::Null,
        }
    }
}

impl From<&Event> for Envelope {
    fn from(event: &Event) -> Self {
        Self {
            message_type: event.kind.into(),
            timestamp: event.timestamp,
            farm_id: event.farm_id,
            coop_id: event.coop_id,
            data: event.data.clone(),
        }
    }
}

/// Inbound frame from a subscriber. Anything unrecognised is [`Self::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Ping,
    SubscribeCoop { coop_id: CoopId },
    UnsubscribeCoop,
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a text frame; malformed JSON yields `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
