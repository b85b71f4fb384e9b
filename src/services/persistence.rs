//! Persistence service — ordered background writer for chat history.
//!
//! DESIGN
//! ======
//! Delivery never waits on the store. Messages go onto one bounded queue
//! with `try_send` and a single writer task appends them in queue order,
//! so history reads back in the order messages were routed. A full queue
//! drops the write (logged) rather than stalling the websocket loop.
//!
//! ERROR HANDLING
//! ==============
//! Failed appends are retried with linear back-off, then dropped with a
//! warning. The message was already delivered live either way.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::AppState;
use crate::store::{ChatMessage, Store};

const APPEND_RETRIES: usize = 3;
const APPEND_RETRY_BASE_MS: u64 = 20;

/// Spawn the history writer and return its queue sender.
///
/// Must be called inside a Tokio runtime. The task ends once every sender
/// is dropped and the queue is drained.
#[must_use]
pub fn spawn_message_writer(store: Arc<dyn Store>, capacity: usize) -> mpsc::Sender<ChatMessage> {
    let (tx, mut rx) = mpsc::channel::<ChatMessage>(capacity.max(1));
    info!(queue_capacity = capacity, "message persistence worker configured");

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            append_with_retry(store.as_ref(), &message).await;
        }
    });

    tx
}

/// Best-effort, non-blocking enqueue of a routed message.
pub fn enqueue_message(state: &AppState, message: &ChatMessage) -> bool {
    match state.persist_tx.try_send(message.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(id = %message.id, "message persist queue full; dropping write");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!(id = %message.id, "message persist queue closed; dropping write");
            false
        }
    }
}

async fn append_with_retry(store: &dyn Store, message: &ChatMessage) {
    for attempt in 1..=APPEND_RETRIES {
        match store.append(message).await {
            Ok(_) => return,
            Err(e) if attempt < APPEND_RETRIES => {
                warn!(error = %e, attempt, id = %message.id, "message persist failed; retrying");
                tokio::time::sleep(Duration::from_millis(attempt as u64 * APPEND_RETRY_BASE_MS)).await;
            }
            Err(e) => {
                warn!(error = %e, id = %message.id, "message persist failed after retries; dropping");
            }
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
