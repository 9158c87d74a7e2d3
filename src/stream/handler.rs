//! Streaming insert handler
//!
//! One connection runs three loops joined together:
//!
//! ```text
//! socket → recv → [batches: bounded] → worker → [replies: bounded] → send → socket
//! ```
//!
//! The worker commits batches one at a time in arrival order. When the
//! batch channel is full the receive loop stops reading the socket, which
//! pushes back on the client.

use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{ClientMessage, ServerMessage};
use crate::api::dto::BatchInsertRequest;
use crate::api::AppState;
use crate::service::{IndexService, ServiceError};

/// GET /api/index/insert/stream
pub async fn stream_insert_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let service = Arc::clone(&state.service);
    let buffer = state.config.stream_buffer.max(1);

    ws.on_upgrade(move |socket| async move {
        let (sender, receiver) = socket.split();
        serve_connection(sender, receiver, service, buffer).await;
    })
}

/// Drive one streaming connection until the client goes away
pub async fn serve_connection<Tx, Rx, E>(
    sender: Tx,
    mut receiver: Rx,
    service: Arc<IndexService>,
    buffer: usize,
) where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let buffer = buffer.max(1);
    let (batch_tx, mut batch_rx) = mpsc::channel::<(Option<u64>, BatchInsertRequest)>(buffer);
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(buffer);

    if out_tx.send(ServerMessage::Ready { buffer }).await.is_err() {
        return;
    }

    let reply_tx = out_tx.clone();
    let recv = async move {
        while let Some(result) = receiver.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "Stream receive error");
                    break;
                }
            };

            let reply = match message {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Batch { seq, request }) => {
                        if batch_tx.send((seq, request)).await.is_err() {
                            break;
                        }
                        None
                    }
                    Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
                    Err(e) => Some(ServerMessage::error(
                        None,
                        "INVALID_QUERY",
                        format!("Invalid message format: {}", e),
                    )),
                },
                Message::Binary(_) => Some(ServerMessage::error(
                    None,
                    "INVALID_QUERY",
                    "Binary messages not supported",
                )),
                Message::Close(_) => {
                    tracing::debug!("Client closed insert stream");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => None,
            };

            if let Some(reply) = reply {
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    };

    let worker = async move {
        let mut batches = 0u64;
        while let Some((seq, request)) = batch_rx.recv().await {
            let reply = process_batch(&service, seq, request).await;
            batches += 1;
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
        tracing::debug!(batches, "Insert stream worker finished");
    };

    let send = async move {
        let mut sender = sender;
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!("Stream send failed, closing connection");
                break;
            }
        }
        let _ = sender.close().await;
    };

    tokio::join!(recv, worker, send);
}

/// Commit one streamed batch and build its reply
async fn process_batch(
    service: &IndexService,
    seq: Option<u64>,
    request: BatchInsertRequest,
) -> ServerMessage {
    if request.records.is_empty() {
        return ServerMessage::error(seq, "INVALID_QUERY", "Empty batch");
    }

    let batch = match request.into_batch() {
        Ok(batch) => batch,
        Err(message) => return ServerMessage::error(seq, "INVALID_QUERY", message),
    };

    match service.insert_batch(&batch).await {
        Ok(summary) => ServerMessage::Summary { seq, summary },
        Err(e) => {
            let committed = match &e {
                ServiceError::Io { committed, .. } | ServiceError::Timeout { committed, .. } => {
                    *committed
                }
                _ => None,
            };
            ServerMessage::Error {
                seq,
                code: e.code().to_string(),
                message: e.to_string(),
                committed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexDefinition;
    use crate::keys::KeyEncoder;
    use crate::service::{IndexSelector, SearchRequest, ServiceConfig};
    use crate::store::ComparisonOp;
    use tempfile::tempdir;

    async fn service(dir: &tempfile::TempDir) -> Arc<IndexService> {
        let service =
            IndexService::open(ServiceConfig::new(dir.path()), KeyEncoder::with_defaults())
                .unwrap();
        service
            .create_index(
                IndexDefinition::new("001", "speeding", "IndexableData", 64, "hardhat")
                    .with_schema("speeding"),
            )
            .await
            .unwrap();
        Arc::new(service)
    }

    fn batch(seq: u64, txs: &[(&str, u32)]) -> Message {
        let records: Vec<serde_json::Value> = txs
            .iter()
            .map(|(tx, speed)| {
                serde_json::json!({
                    "txId": tx,
                    "data": {"speeding": speed, "obuId": "OBU", "collectionDt": "t"}
                })
            })
            .collect();
        let msg = serde_json::json!({"type": "batch", "seq": seq, "indexId": "001", "records": records});
        Message::Text(msg.to_string())
    }

    fn replies(sent: &[Message]) -> Vec<ServerMessage> {
        sent.iter()
            .filter_map(|m| match m {
                Message::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batches_answered_in_order() {
        let dir = tempdir().unwrap();
        let service = service(&dir).await;

        let incoming = vec![
            Ok::<_, axum::Error>(batch(1, &[("a", 61), ("b", 62)])),
            Ok(batch(2, &[("c", 63)])),
            Ok(batch(3, &[("d", 64), ("e", 65), ("f", 66)])),
        ];
        let mut sent: Vec<Message> = Vec::new();

        serve_connection(&mut sent, futures_util::stream::iter(incoming), Arc::clone(&service), 1)
            .await;

        let replies = replies(&sent);
        assert!(matches!(replies[0], ServerMessage::Ready { buffer: 1 }));

        let seqs: Vec<(u64, u64)> = replies[1..]
            .iter()
            .map(|r| match r {
                ServerMessage::Summary { seq, summary } => (seq.unwrap(), summary.inserted),
                other => panic!("unexpected reply: {:?}", other),
            })
            .collect();
        assert_eq!(seqs, vec![(1, 2), (2, 1), (3, 3)]);

        let request = SearchRequest::new(IndexSelector::new("001"), ComparisonOp::GtEq)
            .value("spd::");
        assert_eq!(service.search(&request).await.unwrap().count, 6);
    }

    #[tokio::test]
    async fn test_bad_messages_keep_connection() {
        let dir = tempdir().unwrap();
        let service = service(&dir).await;

        let incoming = vec![
            Ok::<_, axum::Error>(Message::Text("not json".into())),
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
            Ok(Message::Text(
                r#"{"type":"batch","seq":9,"indexId":"missing","records":[{"txId":"x","data":{}}]}"#
                    .into(),
            )),
            Ok(batch(10, &[("ok", 70)])),
            Ok(batch(11, &[])),
        ];
        let mut sent: Vec<Message> = Vec::new();

        serve_connection(&mut sent, futures_util::stream::iter(incoming), service, 4).await;

        let replies = replies(&sent);
        assert_eq!(replies.len(), 6);
        assert!(replies.iter().any(|r| matches!(r, ServerMessage::Pong)));
        assert!(replies.iter().any(|r| matches!(
            r,
            ServerMessage::Error { seq: None, code, .. } if code == "INVALID_QUERY"
        )));
        assert!(replies.iter().any(|r| matches!(
            r,
            ServerMessage::Error { seq: Some(9), code, .. } if code == "INDEX_NOT_FOUND"
        )));
        assert!(replies.iter().any(|r| matches!(
            r,
            ServerMessage::Summary { seq: Some(10), .. }
        )));
        assert!(replies.iter().any(|r| matches!(
            r,
            ServerMessage::Error { seq: Some(11), code, .. } if code == "INVALID_QUERY"
        )));
    }
}
