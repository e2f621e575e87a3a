use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    SystemStatus,
    NodeUpdate,
    FileTransfer,
    Unknown,
}

/// Envelope of a push-channel message: `{ "type": ..., "data": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,
}

impl PushMessage {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        serde_json::from_str(raw).map_err(|e| FeedError::MalformedPush(e.to_string()))
    }

    pub fn push_kind(&self) -> PushKind {
        match self.kind.as_str() {
            "system_status" => PushKind::SystemStatus,
            "node_update" => PushKind::NodeUpdate,
            "file_transfer" => PushKind::FileTransfer,
            _ => PushKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let msg = PushMessage::parse(r#"{"type":"node_update","data":{"node_id":"a"}}"#).unwrap();
        assert_eq!(msg.push_kind(), PushKind::NodeUpdate);
        assert_eq!(msg.data["node_id"], "a");

        let msg = PushMessage::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg.push_kind(), PushKind::Unknown);
        assert!(msg.data.is_null());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            PushMessage::parse("{not json"),
            Err(FeedError::MalformedPush(_))
        ));
        assert!(matches!(
            PushMessage::parse(r#"{"data":{}}"#),
            Err(FeedError::MalformedPush(_))
        ));
    }
}
