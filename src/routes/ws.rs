//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Frames queued by other connections → forward to client
//!
//! Handler functions validate, call into the services, and return an
//! `Outcome`. Services push to other connections themselves; the dispatch
//! layer only decides what the sender gets back.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register queue, send `session:connected`, roster, groups
//! 2. `user:hello` binds a display name; chat and call syscalls need one
//! 3. Client sends frames → dispatch → handler returns Outcome
//! 4. Close → unregister → leave every call → drop presence → drop invites

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status};
use crate::services::{self, chat::Actor};
use crate::state::{AppState, ClientId};
use crate::store::ChatMessage;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. Decides what the sender receives.
enum Outcome {
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
    /// Send nothing back. Used for high-frequency fire-and-forget syscalls.
    Silent,
}

/// Per-connection state owned by the socket task.
pub(crate) struct Connection {
    pub client_id: ClientId,
    pub name: Option<String>,
}

impl Connection {
    pub(crate) fn new(client_id: ClientId) -> Self {
        Self { client_id, name: None }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut conn = Connection::new(Uuid::new_v4());
    let client_id = conn.client_id;

    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_queue_capacity);
    services::delivery::register(&state, client_id, client_tx).await;
    info!(%client_id, "ws: client connected");

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    let roster = services::presence::roster_frame(&services::presence::list(&state).await);
    let groups = services::groups::groups_frame(&services::groups::list(&state).await);
    let mut greeted = true;
    for frame in [welcome, roster, groups] {
        if send_frame(&mut socket, &frame).await.is_err() {
            greeted = false;
            break;
        }
    }

    while greeted {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, &mut conn, &text).await {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    disconnect(&state, client_id).await;
}

/// Tear down everything a connection owned. Calls are left first so peers
/// hear `call:peer-left` before the roster drops the name.
pub(crate) async fn disconnect(state: &AppState, client_id: ClientId) {
    services::delivery::unregister(state, client_id).await;
    let left = services::call::leave_all(state, client_id).await;
    if let Some(offline) = services::presence::remove(state, client_id).await {
        services::handshake::discard_for(state, &offline).await;
    }
    info!(%client_id, calls_left = left, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
pub(crate) async fn process_inbound_text(state: &AppState, conn: &mut Connection, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(client_id = %conn.client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the bound display name as `from`; clients cannot spoof it.
    req.from = conn.name.clone();

    let prefix = req.prefix();
    if is_chatty(&req.syscall) {
        debug!(client_id = %conn.client_id, syscall = %req.syscall, "ws: recv frame");
    } else {
        info!(client_id = %conn.client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    }

    let result = match prefix {
        "user" => handle_user(state, conn, &req).await,
        "chat" => handle_chat(state, conn, &req).await,
        "typing" => handle_typing(state, conn, &req).await,
        "call" => handle_call(state, conn, &req).await,
        _ => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::Silent) => vec![],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// USER HANDLER
// =============================================================================

async fn handle_user(state: &AppState, conn: &mut Connection, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "hello" => {
            let raw = req.str_field("name").unwrap_or("");
            let name = services::presence::set_name(state, conn.client_id, raw).await;
            let previous = conn.name.replace(name.clone());

            // A rename that takes the old name fully offline drops its invites.
            if let Some(previous) = previous.filter(|p| *p != name) {
                if !state.presence.read().await.is_online(&previous) {
                    services::handshake::discard_for(state, &previous).await;
                }
            }

            let mut data = Data::new();
            data.insert("name".into(), serde_json::json!(name));
            Ok(Outcome::Reply(data))
        }
        op => Err(req.error(format!("unknown user op: {op}"))),
    }
}

// =============================================================================
// CHAT HANDLERS
// =============================================================================

async fn handle_chat(state: &AppState, conn: &Connection, req: &Frame) -> Result<Outcome, Frame> {
    let name = require_name(conn, req)?;
    let text = req.str_field("text").unwrap_or("");

    match req.op() {
        "group" => {
            let Some(group_id) = req.str_field("group_id") else {
                return Err(req.error("group_id required"));
            };
            let actor = Actor::User(name.to_owned());
            match services::chat::send_group(state, Some(conn.client_id), group_id, &actor, text).await {
                Ok(Some(message)) => Ok(Outcome::Reply(message_data(&message))),
                Ok(None) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "pm" => {
            let to = req.str_field("to").unwrap_or("");
            match services::chat::send_direct(state, Some(conn.client_id), name, to, text).await {
                Ok(message) => Ok(Outcome::Reply(message_data(&message))),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown chat op: {op}"))),
    }
}

async fn handle_typing(state: &AppState, conn: &Connection, req: &Frame) -> Result<Outcome, Frame> {
    let name = require_name(conn, req)?;
    if req.op() != "update" {
        return Err(req.error(format!("unknown typing op: {}", req.op())));
    }

    let mut data = Data::new();
    match req.str_field("chat_type") {
        Some("group") => {
            let Some(group_id) = req.str_field("group_id") else {
                return Err(req.error("group_id required"));
            };
            data.insert("chat_type".into(), serde_json::json!("group"));
            data.insert("group_id".into(), serde_json::json!(group_id));
        }
        Some("pm") => {
            let Some(with) = req.str_field("with").filter(|w| !w.trim().is_empty()) else {
                return Err(req.error("with required"));
            };
            data.insert("chat_type".into(), serde_json::json!("pm"));
            data.insert("with".into(), serde_json::json!(with));
        }
        _ => return Err(req.error("chat_type must be group or pm")),
    }
    let is_typing = req.data.get("is_typing").and_then(serde_json::Value::as_bool).unwrap_or(false);
    data.insert("is_typing".into(), serde_json::json!(is_typing));

    services::chat::notify_typing(state, Some(conn.client_id), name, &data).await;
    Ok(Outcome::Silent)
}

// =============================================================================
// CALL HANDLERS
// =============================================================================

async fn handle_call(state: &AppState, conn: &Connection, req: &Frame) -> Result<Outcome, Frame> {
    let name = require_name(conn, req)?;
    let Some(call_id) = req.str_field("call_id").filter(|id| !id.is_empty()) else {
        return Err(req.error("call_id required"));
    };

    match req.op() {
        "join" => {
            validate_session(state, call_id, name, req).await?;
            services::handshake::accept(state, call_id, name).await;
            let peers = services::call::join(state, call_id, conn.client_id).await;

            let mut data = Data::new();
            data.insert("call_id".into(), serde_json::json!(call_id));
            data.insert("peers".into(), serde_json::json!(peers));
            Ok(Outcome::Reply(data))
        }
        "leave" => {
            services::call::leave(state, call_id, conn.client_id).await;
            Ok(Outcome::Done)
        }
        "signal" => {
            let Some(to) = req.str_field("to").and_then(|s| s.parse::<Uuid>().ok()) else {
                return Err(req.error("to required"));
            };
            let Some(payload) = req.data.get("data").cloned() else {
                return Err(req.error("data required"));
            };
            services::signal::relay(state, call_id, conn.client_id, to, payload).await;
            Ok(Outcome::Silent)
        }
        "invite" => {
            let to = req.str_field("to").unwrap_or("");
            match services::handshake::start(state, name, to, call_id).await {
                Ok(rang) => {
                    let mut data = Data::new();
                    data.insert("rang".into(), serde_json::json!(rang));
                    Ok(Outcome::Reply(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "reject" => {
            services::handshake::reject(state, call_id, name).await;
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown call op: {op}"))),
    }
}

/// Only existing groups and pair sessions that include `name` can be joined.
async fn validate_session(state: &AppState, call_id: &str, name: &str, req: &Frame) -> Result<(), Frame> {
    if let Some(group_id) = call_id.strip_prefix("group:") {
        if state.groups.read().await.exists(group_id) {
            return Ok(());
        }
    } else if crate::target::is_pair_party(call_id, name) {
        return Ok(());
    }
    Err(req.error_from(&services::chat::ChatError::InvalidTarget(call_id.to_owned())))
}

// =============================================================================
// HELPERS
// =============================================================================

fn require_name<'a>(conn: &'a Connection, req: &Frame) -> Result<&'a str, Frame> {
    conn.name.as_deref().ok_or_else(|| req.error("send user:hello first"))
}

fn message_data(message: &ChatMessage) -> Data {
    let mut data = Data::new();
    data.insert("message".into(), serde_json::json!(message));
    data
}

/// Typing and signal frames are high-frequency; keep them out of info logs.
fn is_chatty(syscall: &str) -> bool {
    matches!(syscall, "typing:update" | "call:signal")
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.str_field("code").unwrap_or("-");
        let message = frame.str_field("message").unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else if !is_chatty(&frame.syscall) {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
