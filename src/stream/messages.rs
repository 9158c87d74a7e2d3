//! Streaming insert message types
//!
//! JSON text frames in both directions, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::api::dto::BatchInsertRequest;
use crate::pipeline::InsertSummary;

/// Messages sent by the client
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One insert batch; `seq` is echoed in the reply
    Batch {
        #[serde(default)]
        seq: Option<u64>,
        #[serde(flatten)]
        request: BatchInsertRequest,
    },
    /// Keepalive
    Ping,
}

/// Messages sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted; `buffer` batches may be in flight
    Ready { buffer: usize },
    /// A batch was processed
    Summary {
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        summary: InsertSummary,
    },
    /// A message or batch was rejected
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        committed: Option<u64>,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(seq: Option<u64>, code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            seq,
            code: code.to_string(),
            message: message.into(),
            committed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_message() {
        let json = r#"{"type":"batch","seq":3,"indexId":"001","records":[{"txId":"a","data":{"speeding":70}}]}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Batch { seq, request } => {
                assert_eq!(seq, Some(3));
                assert_eq!(request.index_id.as_deref(), Some("001"));
                assert_eq!(request.records[0].data["speeding"], "70");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ping() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let msg = ServerMessage::error(Some(1), "INVALID_QUERY", "bad");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["seq"], 1);
        assert!(json.get("committed").is_none());

        let json = serde_json::to_value(ServerMessage::Ready { buffer: 4 }).unwrap();
        assert_eq!(json["type"], "ready");
    }
}
