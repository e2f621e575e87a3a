use serde::{Deserialize, Serialize};

/// Failure taxonomy of the cluster feed.
///
/// None of these are fatal: `Unreachable` and `UnrecognizedShape` degrade to
/// synthetic (or stale) data and ride along on the snapshot as `fault`;
/// `MalformedPush` drops the offending message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FeedError {
    /// Transport-level failure: network, timeout, non-2xx, undecodable body.
    #[error("cluster feed unreachable: {0}")]
    Unreachable(String),
    /// The payload parsed but matched none of the known node-list shapes.
    #[error("unrecognized node-list shape: {0}")]
    UnrecognizedShape(String),
    /// A push message that is not valid JSON or lacks the envelope.
    #[error("malformed push message: {0}")]
    MalformedPush(String),
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Unreachable(_) => "unreachable",
            FeedError::UnrecognizedShape(_) => "unrecognized_shape",
            FeedError::MalformedPush(_) => "malformed_push",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_kind_tag() {
        let err = FeedError::Unreachable("connection refused".to_string());
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["kind"], "unreachable");
        assert_eq!(v["detail"], "connection refused");
        assert_eq!(err.kind(), "unreachable");
    }
}
