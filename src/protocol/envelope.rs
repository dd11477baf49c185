use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{CoordinatorError, Result};

/// Kind of protocol message carried in an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Coordinator → agent: take this task.
    TaskAssignment,
    /// Agent → coordinator: task moved to a new lifecycle status.
    StatusUpdate,
    /// Agent → coordinator: task finished (successfully or not).
    TaskResult,
    Heartbeat,
    QualityGate,
    /// Coordinator → agent: payment for a task landed on the ledger.
    PaymentSettled,
    /// Agent → coordinator: profitability telemetry.
    PnlReport,
    /// Any type this build does not know about. Never serialized by us.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskAssignment => "task_assignment",
            Self::StatusUpdate => "status_update",
            Self::TaskResult => "task_result",
            Self::Heartbeat => "heartbeat",
            Self::QualityGate => "quality_gate",
            Self::PaymentSettled => "payment_settled",
            Self::PnlReport => "pnl_report",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard wrapper for every message exchanged over a topic.
///
/// `sequence_num` is monotonic per sender only. Consumers must not assume global
/// ordering or exactly-once delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender: String,
    /// Empty means broadcast.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    pub sequence_num: u64,
    pub timestamp: DateTime<Utc>,
    /// Type-specific payload, shape keyed by `message_type`.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub payload: JsonValue,
}

impl Envelope {
    pub fn new(message_type: MessageType, sender: impl Into<String>, sequence_num: u64) -> Self {
        Self {
            message_type,
            sender: sender.into(),
            recipient: String::new(),
            task_id: String::new(),
            sequence_num,
            timestamp: Utc::now(),
            payload: JsonValue::Null,
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Decode the payload into the shape expected for this message type.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            CoordinatorError::from(e).context(format!(
                "decode {} payload from {} seq {}",
                self.message_type, self.sender, self.sequence_num
            ))
        })
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_empty()
    }

    /// True when the envelope is addressed to `agent_id` or broadcast.
    pub fn is_for(&self, agent_id: &str) -> bool {
        self.is_broadcast() || self.recipient == agent_id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_identity_fields() {
        let env = Envelope::new(MessageType::StatusUpdate, "inference-001", 42)
            .with_task_id("task-7")
            .with_payload(&json!({"task_id": "task-7", "new_status": "review"}))
            .unwrap();

        let back = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(back.message_type, MessageType::StatusUpdate);
        assert_eq!(back.sender, "inference-001");
        assert_eq!(back.task_id, "task-7");
        assert_eq!(back.sequence_num, 42);
        assert_eq!(back, env);
    }

    #[test]
    fn wire_format_uses_type_key_and_omits_empty_fields() {
        let env = Envelope::new(MessageType::Heartbeat, "coordinator", 1);
        let value: JsonValue = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(value["type"], "heartbeat");
        assert!(value.get("recipient").is_none());
        assert!(value.get("task_id").is_none());
        assert!(value.get("payload").is_none());
        assert_eq!(value["sequence_num"], 1);
    }

    #[test]
    fn serialization_is_deterministic() {
        let env = Envelope::new(MessageType::TaskResult, "defi-001", 3)
            .with_payload(&json!({"z": 1, "a": 2, "m": {"y": 0, "b": 1}}))
            .unwrap();
        assert_eq!(env.to_bytes().unwrap(), env.clone().to_bytes().unwrap());
    }

    #[test]
    fn unknown_message_types_still_decode() {
        let raw = br#"{"type":"future_thing","sender":"x","sequence_num":9,"timestamp":"2026-01-02T03:04:05Z"}"#;
        let env = Envelope::from_bytes(raw).unwrap();
        assert_eq!(env.message_type, MessageType::Unknown);
        assert!(env.is_broadcast());
        assert!(env.payload.is_null());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(Envelope::from_bytes(b"not json").is_err());
        assert!(Envelope::from_bytes(br#"{"type":"heartbeat"}"#).is_err());
    }

    #[test]
    fn addressing() {
        let env = Envelope::new(MessageType::TaskAssignment, "coordinator", 1).with_recipient("a-1");
        assert!(env.is_for("a-1"));
        assert!(!env.is_for("a-2"));
    }

    #[test]
    fn decode_payload_reports_context() {
        let env = Envelope::new(MessageType::StatusUpdate, "a-1", 5)
            .with_payload(&json!({"unexpected": true}))
            .unwrap();
        #[derive(Debug, Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            task_id: String,
        }
        let err = env.decode_payload::<Needs>().unwrap_err();
        assert!(err.to_string().contains("decode status_update payload from a-1 seq 5"));
    }
}
