//! Delivery — connection registry and frame fan-out.
//!
//! DESIGN
//! ======
//! Senders are cloned out of the registry under a read lock, the lock is
//! released, then each frame goes out with `try_send`. A slow client with a
//! full queue loses that frame instead of stalling everyone else.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::state::{AppState, ClientId};

/// Register a live connection's outbound queue.
pub async fn register(state: &AppState, client_id: ClientId, tx: mpsc::Sender<Frame>) {
    state.clients.write().await.insert(client_id, tx);
}

/// Remove a connection. Later sends to it are dropped.
pub async fn unregister(state: &AppState, client_id: ClientId) {
    state.clients.write().await.remove(&client_id);
}

pub async fn is_connected(state: &AppState, client_id: ClientId) -> bool {
    state.clients.read().await.contains_key(&client_id)
}

/// Send to one connection. Returns false if it is gone or its queue is full.
pub async fn send_to(state: &AppState, client_id: ClientId, frame: &Frame) -> bool {
    let tx = state.clients.read().await.get(&client_id).cloned();
    let Some(tx) = tx else {
        debug!(%client_id, syscall = %frame.syscall, "delivery: target connection gone");
        return false;
    };
    try_deliver(client_id, &tx, frame)
}

/// Send to each listed connection once. Duplicate ids are the caller's job.
pub async fn send_to_many(state: &AppState, targets: &[ClientId], frame: &Frame) -> usize {
    let senders: Vec<(ClientId, mpsc::Sender<Frame>)> = {
        let clients = state.clients.read().await;
        targets
            .iter()
            .filter_map(|id| clients.get(id).map(|tx| (*id, tx.clone())))
            .collect()
    };
    senders
        .iter()
        .filter(|(id, tx)| try_deliver(*id, tx, frame))
        .count()
}

/// Send to every live connection, optionally excluding one.
pub async fn broadcast_all(state: &AppState, frame: &Frame, exclude: Option<ClientId>) -> usize {
    let senders: Vec<(ClientId, mpsc::Sender<Frame>)> = {
        let clients = state.clients.read().await;
        clients
            .iter()
            .filter(|(id, _)| exclude != Some(**id))
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    };
    senders
        .iter()
        .filter(|(id, tx)| try_deliver(*id, tx, frame))
        .count()
}

fn try_deliver(client_id: ClientId, tx: &mpsc::Sender<Frame>, frame: &Frame) -> bool {
    match tx.try_send(frame.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%client_id, syscall = %frame.syscall, "delivery: client queue full; dropping frame");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(%client_id, syscall = %frame.syscall, "delivery: client queue closed");
            false
        }
    }
}

#[cfg(test)]
#[path = "delivery_test.rs"]
mod tests;
