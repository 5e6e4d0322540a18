//! Per-connection message channel
//!
//! Outbound messages go through an unbounded queue. The writer task waits for
//! the first message, yields once so writes issued in the same scheduling tick
//! can land, then takes everything queued and sends it as one frame. Order is
//! preserved and at most one frame per tick leaves a connection.

use log::warn;
use shared::protocol::{decode_frame, encode_frame, ClientMessage, Outbound};
use tokio::sync::mpsc;

pub type Outbox = mpsc::UnboundedSender<Outbound>;
pub type OutboxReceiver = mpsc::UnboundedReceiver<Outbound>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// Waits for the next batch of outbound messages
///
/// Returns `None` once every sender is gone and the queue is drained.
pub async fn next_batch(rx: &mut OutboxReceiver) -> Option<Vec<Outbound>> {
    let first = rx.recv().await?;
    tokio::task::yield_now().await;

    let mut batch = vec![first];
    while let Ok(message) = rx.try_recv() {
        batch.push(message);
    }
    Some(batch)
}

pub fn encode_batch(batch: &[Outbound]) -> Result<String, serde_json::Error> {
    encode_frame(batch)
}

/// Decodes an inbound frame, dropping what cannot be understood
pub fn decode_inbound(text: &str) -> Vec<ClientMessage> {
    let elements = match decode_frame::<ClientMessage>(text) {
        Ok(elements) => elements,
        Err(e) => {
            warn!("Ignoring malformed frame: {}", e);
            return Vec::new();
        }
    };

    elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match element {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Ignoring message {} of frame: {}", index, e);
                None
            }
        })
        .collect()
}
