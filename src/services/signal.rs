//! Signal relay — opaque offer/answer/candidate pass-through.
//!
//! The payload under `data` is forwarded byte-for-byte as a JSON value; the
//! hub never looks inside it. Delivery is best-effort: a target that has
//! disconnected simply never sees the message, and the peers recover by
//! renegotiating.

use tracing::debug;

use crate::frame::{Data, Frame};
use crate::services::delivery;
use crate::state::{AppState, ClientId};

/// Forward `payload` from `from` to exactly one connection, tagged with the
/// session id and the sender. Returns false if the target was dropped.
pub async fn relay(state: &AppState, session_id: &str, from: ClientId, to: ClientId, payload: serde_json::Value) -> bool {
    let mut data = Data::new();
    data.insert("call_id".into(), serde_json::json!(session_id));
    data.insert("from".into(), serde_json::json!(from));
    data.insert("data".into(), payload);
    let frame = Frame::request("call:signal", data);

    let delivered = delivery::send_to(state, to, &frame).await;
    if !delivered {
        debug!(%from, %to, call_id = %session_id, "signal: target gone; dropped");
    }
    delivered
}

#[cfg(test)]
#[path = "signal_test.rs"]
mod tests;
