//! Client call state machine — turns hub call events into peer links.
//!
//! DESIGN
//! ======
//! `Idle → Requesting → Active → Ending → Idle`. A call starts by asking
//! for the microphone (`Requesting`); only once audio is granted does the
//! client join the session, and for an outgoing pair call send the invite.
//! Accepting an incoming call takes the same path, so a refused microphone
//! never produces a partial join.
//!
//! The machine itself is synchronous. Negotiation steps (offer, answer,
//! remote description, candidates) are returned as [`Negotiation`] futures
//! for the host to drive, so chat and typing events are never stuck behind
//! a slow peer. Every future carries a [`CallGuard`] snapshot of the call
//! epoch; the epoch moves on every start and end, and a future that finds
//! it moved drops its result instead of signalling a call that is gone.
//!
//! Mesh rule: on `call:join` the joiner creates initiator links toward
//! every existing member and offers; members that see `call:peer-joined`
//! create responder links and wait for the offer. There is at most one
//! link per remote connection, whoever asks first.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::media::{AudioSink, LinkState, LocalAudio, MediaCapability, MediaError, PeerLink, SignalPayload};
use crate::frame::{Data, Frame, Status};
use crate::state::ClientId;
use crate::target::ChatTarget;

/// A pending negotiation step. Drive it to completion; it never fails.
pub type Negotiation = BoxFuture<'static, ()>;

/// Frames headed for the hub.
pub type Outbound = mpsc::UnboundedSender<Frame>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CallError {
    #[error("already in a call")]
    AlreadyInCall,
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("cannot call {0}")]
    InvalidTarget(String),
    #[error("display name not set")]
    NoIdentity,
    #[error("no incoming call")]
    NoIncomingCall,
    #[error("event for a call that is no longer active")]
    StaleSignal,
    #[error("malformed call event")]
    Malformed,
}

impl crate::frame::ErrorCode for CallError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyInCall => "E_ALREADY_IN_CALL",
            Self::PermissionDenied => "E_PERMISSION_DENIED",
            Self::InvalidTarget(_) => "E_INVALID_TARGET",
            Self::NoIdentity => "E_NO_IDENTITY",
            Self::NoIncomingCall => "E_NO_INCOMING_CALL",
            Self::StaleSignal => "E_STALE_SIGNAL",
            Self::Malformed => "E_MALFORMED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Requesting,
    Active,
    Ending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub call_id: String,
    pub from: String,
}

/// What happened to a `call:incoming` notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Shown to the user; awaiting accept or reject.
    Ringing,
    /// Busy: rejected on the spot without surfacing anything.
    AutoRejected,
    /// No identity yet; dropped.
    Ignored,
}

/// Microphone request for a starting call. Await `audio`, then hand the
/// result to [`CallMachine::on_local_audio`] together with `epoch`.
pub struct AudioRequest {
    pub epoch: u64,
    pub target: ChatTarget,
    pub audio: BoxFuture<'static, Result<Arc<dyn LocalAudio>, MediaError>>,
}

/// Snapshot of the call epoch taken when a negotiation step was issued.
#[derive(Clone)]
pub struct CallGuard {
    epoch: Arc<AtomicU64>,
    expected: u64,
}

impl CallGuard {
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.expected
    }
}

struct Call {
    call_id: String,
    target: ChatTarget,
    /// Caller name when this call came from accepting an invite.
    accepted_from: Option<String>,
    audio: Option<Arc<dyn LocalAudio>>,
}

struct PeerEntry {
    link: Arc<dyn PeerLink>,
    sink: Option<Arc<dyn AudioSink>>,
}

pub struct CallMachine {
    media: Arc<dyn MediaCapability>,
    outbound: Outbound,
    me: Option<String>,
    viewing: Option<ChatTarget>,
    phase: CallPhase,
    call: Option<Call>,
    peers: HashMap<ClientId, PeerEntry>,
    incoming: Option<IncomingCall>,
    muted: bool,
    epoch: Arc<AtomicU64>,
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl CallMachine {
    #[must_use]
    pub fn new(media: Arc<dyn MediaCapability>, outbound: Outbound) -> Self {
        Self {
            media,
            outbound,
            me: None,
            viewing: None,
            phase: CallPhase::Idle,
            call: None,
            peers: HashMap::new(),
            incoming: None,
            muted: false,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_identity(&mut self, name: impl Into<String>) {
        self.me = Some(name.into());
    }

    #[must_use]
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.call_id.as_str())
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn incoming(&self) -> Option<&IncomingCall> {
        self.incoming.as_ref()
    }

    /// The chat the user is looking at, as last reported by [`Self::navigate`].
    #[must_use]
    pub fn viewing(&self) -> Option<&ChatTarget> {
        self.viewing.as_ref()
    }

    #[must_use]
    pub fn peer_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.peers.keys().copied().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn has_audio_sink(&self, peer: ClientId) -> bool {
        self.peers.get(&peer).is_some_and(|p| p.sink.is_some())
    }

    fn guard(&self) -> CallGuard {
        CallGuard { epoch: self.epoch.clone(), expected: self.epoch.load(Ordering::SeqCst) }
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// =============================================================================
// STARTING AND ENDING
// =============================================================================

impl CallMachine {
    /// Start a call for `target`. Refused while another call exists.
    ///
    /// # Errors
    ///
    /// [`CallError::AlreadyInCall`], [`CallError::NoIdentity`], or
    /// [`CallError::InvalidTarget`] for a pair that does not include us.
    pub fn start_call(&mut self, target: ChatTarget) -> Result<AudioRequest, CallError> {
        if self.phase != CallPhase::Idle {
            return Err(CallError::AlreadyInCall);
        }
        let me = self.me.as_deref().ok_or(CallError::NoIdentity)?;
        if let ChatTarget::DirectPair { a, b } = &target {
            if a != me && b != me {
                return Err(CallError::InvalidTarget(target.session_id()));
            }
        }
        self.viewing = Some(target.clone());
        Ok(self.begin(target, None))
    }

    /// Accept the ringing call. Switches the view to the caller's pair chat.
    ///
    /// # Errors
    ///
    /// [`CallError::NoIncomingCall`] when nothing rings, [`CallError::InvalidTarget`]
    /// when the call id does not name our pair (the invite is rejected).
    pub fn accept_incoming(&mut self) -> Result<AudioRequest, CallError> {
        let incoming = self.incoming.take().ok_or(CallError::NoIncomingCall)?;
        let me = self.me.as_deref().ok_or(CallError::NoIdentity)?;
        if self.phase != CallPhase::Idle {
            self.send_reject(&incoming.call_id, &incoming.from);
            return Err(CallError::AlreadyInCall);
        }
        let target = ChatTarget::pair(me, incoming.from.as_str());
        if target.session_id() != incoming.call_id {
            self.send_reject(&incoming.call_id, &incoming.from);
            return Err(CallError::InvalidTarget(incoming.call_id));
        }
        self.viewing = Some(target.clone());
        Ok(self.begin(target, Some(incoming.from)))
    }

    /// Decline the ringing call.
    ///
    /// # Errors
    ///
    /// [`CallError::NoIncomingCall`] when nothing rings.
    pub fn reject_incoming(&mut self) -> Result<(), CallError> {
        let incoming = self.incoming.take().ok_or(CallError::NoIncomingCall)?;
        self.send_reject(&incoming.call_id, &incoming.from);
        Ok(())
    }

    fn begin(&mut self, target: ChatTarget, accepted_from: Option<String>) -> AudioRequest {
        let epoch = self.bump_epoch();
        let call_id = target.session_id();
        info!(call_id = %call_id, accepting = accepted_from.is_some(), "call: requesting microphone");
        self.call = Some(Call { call_id, target: target.clone(), accepted_from, audio: None });
        self.phase = CallPhase::Requesting;
        self.muted = false;

        let media = self.media.clone();
        AudioRequest { epoch, target, audio: async move { media.local_audio().await }.boxed() }
    }

    /// Finish a microphone request.
    ///
    /// On success the call becomes active: join the session, then for an
    /// outgoing pair call ring the other side. On failure the attempt is
    /// dropped; an accepted invite is rejected so the caller stops waiting.
    ///
    /// # Errors
    ///
    /// [`CallError::PermissionDenied`] on refusal, [`CallError::StaleSignal`]
    /// if the call was ended while the request was pending.
    pub fn on_local_audio(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn LocalAudio>, MediaError>,
    ) -> Result<(), CallError> {
        if self.phase != CallPhase::Requesting || self.epoch.load(Ordering::SeqCst) != epoch {
            if let Ok(audio) = result {
                audio.stop();
            }
            return Err(CallError::StaleSignal);
        }
        let Some(call) = self.call.as_mut() else {
            return Err(CallError::StaleSignal);
        };

        match result {
            Ok(audio) => {
                call.audio = Some(audio);
                self.phase = CallPhase::Active;
                let call_id = call.call_id.clone();
                let invite_to = match (&call.target, &call.accepted_from, self.me.as_deref()) {
                    (ChatTarget::DirectPair { .. }, None, Some(me)) => call.target.other_party(me).map(str::to_owned),
                    _ => None,
                };

                info!(call_id = %call_id, "call: active");
                self.send("call:join", [("call_id", Value::from(call_id.as_str()))]);
                if let Some(to) = invite_to {
                    self.send("call:invite", [("call_id", Value::from(call_id)), ("to", Value::from(to))]);
                }
                Ok(())
            }
            Err(e) => {
                warn!(call_id = %call.call_id, error = %e, "call: microphone unavailable");
                if let Some(call) = self.call.take() {
                    if let Some(from) = call.accepted_from {
                        self.send_reject(&call.call_id, &from);
                    }
                }
                self.bump_epoch();
                self.phase = CallPhase::Idle;
                Err(CallError::PermissionDenied)
            }
        }
    }

    /// End the current call: leave the session, close every peer link and
    /// sink, stop the microphone, return to `Idle`. No-op when idle.
    pub fn end_call(&mut self) {
        let Some(call) = self.call.take() else {
            return;
        };
        self.phase = CallPhase::Ending;
        self.bump_epoch();

        if call.audio.is_some() {
            self.send("call:leave", [("call_id", Value::from(call.call_id.as_str()))]);
        }
        for (_, peer) in self.peers.drain() {
            close_peer(&peer);
        }
        if let Some(audio) = &call.audio {
            audio.stop();
        }

        self.muted = false;
        self.phase = CallPhase::Idle;
        info!(call_id = %call.call_id, "call: ended");
    }

    /// Record a chat switch. Ends the call if it belongs to another chat.
    pub fn navigate(&mut self, target: ChatTarget) -> bool {
        let leaves_call = self.call.as_ref().is_some_and(|c| c.target != target);
        self.viewing = Some(target);
        if leaves_call {
            self.end_call();
        }
        leaves_call
    }

    /// Gate outbound audio. The peer links are left alone.
    pub fn set_muted(&mut self, muted: bool) -> bool {
        let Some(audio) = self.call.as_ref().and_then(|c| c.audio.as_ref()) else {
            return false;
        };
        audio.set_enabled(!muted);
        self.muted = muted;
        true
    }
}

// =============================================================================
// HANDSHAKE EVENTS
// =============================================================================

impl CallMachine {
    /// Handle `call:incoming`. Busy users auto-reject without ringing.
    pub fn on_incoming(&mut self, call_id: &str, from: &str) -> Incoming {
        if self.me.is_none() {
            return Incoming::Ignored;
        }
        let busy = self.phase != CallPhase::Idle || self.incoming.as_ref().is_some_and(|i| i.call_id != call_id);
        if busy {
            debug!(call_id, from, "call: busy; auto-rejecting");
            self.send_reject(call_id, from);
            return Incoming::AutoRejected;
        }
        self.incoming = Some(IncomingCall { call_id: call_id.to_owned(), from: from.to_owned() });
        Incoming::Ringing
    }

    /// Handle `call:rejected`: the callee declined, end our side.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if `call_id` is not our current call.
    pub fn on_rejected(&mut self, call_id: &str, from: &str) -> Result<(), CallError> {
        if self.call_id() != Some(call_id) {
            return Err(CallError::StaleSignal);
        }
        info!(call_id, from, "call: rejected by callee");
        self.end_call();
        Ok(())
    }

    /// A ringing call from someone who went offline stops ringing.
    pub fn on_roster(&mut self, users: &[String]) {
        if self.incoming.as_ref().is_some_and(|i| !users.contains(&i.from)) {
            self.incoming = None;
        }
    }
}

// =============================================================================
// SESSION AND SIGNAL EVENTS
// =============================================================================

impl CallMachine {
    /// Handle the `call:join` reply: offer to every member already there.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if `call_id` is not the active call.
    pub fn on_joined(&mut self, call_id: &str, peers: &[ClientId]) -> Result<Vec<Negotiation>, CallError> {
        self.ensure_current(call_id)?;
        let mut steps = Vec::new();
        for &peer in peers {
            let (link, created) = self.ensure_link(peer, true)?;
            if created {
                steps.push(self.offer(peer, link));
            }
        }
        Ok(steps)
    }

    /// Handle `call:peer-joined`: prepare to answer the newcomer's offer.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if `call_id` is not the active call.
    pub fn on_peer_joined(&mut self, call_id: &str, peer: ClientId) -> Result<(), CallError> {
        self.ensure_current(call_id)?;
        self.ensure_link(peer, false)?;
        Ok(())
    }

    /// Handle `call:peer-left`.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if `call_id` is not the active call.
    pub fn on_peer_left(&mut self, call_id: &str, peer: ClientId) -> Result<(), CallError> {
        self.ensure_current(call_id)?;
        self.cleanup_peer(peer);
        Ok(())
    }

    /// Handle a relayed negotiation payload from `from`.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] for an inactive call, [`CallError::Malformed`]
    /// for a payload that is not an offer, answer, or candidate.
    pub fn on_signal(&mut self, call_id: &str, from: ClientId, data: &Value) -> Result<Option<Negotiation>, CallError> {
        self.ensure_current(call_id)?;
        let payload: SignalPayload = serde_json::from_value(data.clone()).map_err(|_| CallError::Malformed)?;
        let (link, _) = self.ensure_link(from, false)?;
        let guard = self.guard();

        let step: Negotiation = match payload {
            SignalPayload::Offer { sdp } => {
                let outbound = self.outbound.clone();
                let call_id = call_id.to_owned();
                async move {
                    if let Err(e) = link.set_remote_description(sdp).await {
                        warn!(%from, error = %e, "call: remote offer rejected");
                        return;
                    }
                    match link.create_answer().await {
                        Ok(sdp) if guard.is_current() => {
                            send_signal(&outbound, &call_id, from, &SignalPayload::Answer { sdp });
                        }
                        Ok(_) => debug!(%from, "call: answer for ended call dropped"),
                        Err(e) => warn!(%from, error = %e, "call: answer failed"),
                    }
                }
                .boxed()
            }
            SignalPayload::Answer { sdp } => async move {
                if !guard.is_current() {
                    return;
                }
                if let Err(e) = link.set_remote_description(sdp).await {
                    warn!(%from, error = %e, "call: remote answer rejected");
                }
            }
            .boxed(),
            SignalPayload::Candidate { candidate: Some(candidate) } => async move {
                if !guard.is_current() {
                    return;
                }
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    warn!(%from, error = %e, "call: candidate rejected");
                }
            }
            .boxed(),
            SignalPayload::Candidate { candidate: None } => return Ok(None),
        };
        Ok(Some(step))
    }

    /// Hook: the link to `peer` produced a local ICE candidate.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if there is no such live link.
    pub fn on_local_candidate(&mut self, peer: ClientId, candidate: Value) -> Result<(), CallError> {
        let call_id = self.live_link_call(peer)?;
        send_signal(&self.outbound, &call_id, peer, &SignalPayload::Candidate { candidate: Some(candidate) });
        Ok(())
    }

    /// Hook: remote audio arrived from `peer`. Creates one sink per peer.
    ///
    /// # Errors
    ///
    /// [`CallError::StaleSignal`] if there is no such live link.
    pub fn on_remote_track(&mut self, peer: ClientId) -> Result<(), CallError> {
        self.live_link_call(peer)?;
        let media = self.media.clone();
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.sink.get_or_insert_with(|| media.create_audio_sink(peer));
        }
        Ok(())
    }

    /// Hook: the link to `peer` changed state. Failed, disconnected, or
    /// closed links are torn down; a pair call whose last peer is gone ends.
    /// Returns true if the whole call ended.
    pub fn on_connection_state(&mut self, peer: ClientId, state: LinkState) -> bool {
        if !state.is_terminal() || self.live_link_call(peer).is_err() {
            return false;
        }
        debug!(%peer, ?state, "call: peer link down");
        self.cleanup_peer(peer);

        let pair_call = self.call.as_ref().is_some_and(|c| c.target.is_pair());
        if pair_call && self.peers.is_empty() {
            self.end_call();
            return true;
        }
        false
    }

    /// Route one hub frame to the matching handler. Stale or malformed
    /// events are logged and dropped.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Negotiation> {
        let result = match (frame.syscall.as_str(), frame.status) {
            ("call:join", Status::Done) => field(frame, "call_id").and_then(|call_id| {
                let peers: Vec<ClientId> = frame
                    .data
                    .get("peers")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .ok_or(CallError::Malformed)?;
                self.on_joined(call_id, &peers)
            }),
            ("call:peer-joined", Status::Request) => field(frame, "call_id")
                .and_then(|call_id| Ok((call_id, client_field(frame, "client_id")?)))
                .and_then(|(call_id, peer)| self.on_peer_joined(call_id, peer))
                .map(|()| Vec::new()),
            ("call:peer-left", Status::Request) => field(frame, "call_id")
                .and_then(|call_id| Ok((call_id, client_field(frame, "client_id")?)))
                .and_then(|(call_id, peer)| self.on_peer_left(call_id, peer))
                .map(|()| Vec::new()),
            ("call:signal", Status::Request) => field(frame, "call_id")
                .and_then(|call_id| {
                    let from = client_field(frame, "from")?;
                    let data = frame.data.get("data").ok_or(CallError::Malformed)?;
                    self.on_signal(call_id, from, data)
                })
                .map(|step| step.into_iter().collect::<Vec<_>>()),
            ("call:incoming", Status::Request) => field(frame, "call_id")
                .and_then(|call_id| Ok((call_id, field(frame, "from")?)))
                .map(|(call_id, from)| {
                    self.on_incoming(call_id, from);
                    Vec::new()
                }),
            ("call:rejected", Status::Request) => field(frame, "call_id")
                .and_then(|call_id| Ok((call_id, field(frame, "from")?)))
                .and_then(|(call_id, from)| self.on_rejected(call_id, from))
                .map(|()| Vec::new()),
            ("users:update", Status::Request) => {
                let users: Vec<String> = frame
                    .data
                    .get("users")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                self.on_roster(&users);
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        };

        result.unwrap_or_else(|e| {
            debug!(syscall = %frame.syscall, error = %e, "call: event dropped");
            Vec::new()
        })
    }
}

// =============================================================================
// PEER LINKS
// =============================================================================

impl CallMachine {
    fn ensure_current(&self, call_id: &str) -> Result<(), CallError> {
        if self.phase == CallPhase::Active && self.call_id() == Some(call_id) {
            Ok(())
        } else {
            Err(CallError::StaleSignal)
        }
    }

    /// The active call id, if `peer` has a live link in it.
    fn live_link_call(&self, peer: ClientId) -> Result<String, CallError> {
        match (&self.call, self.phase) {
            (Some(call), CallPhase::Active) if self.peers.contains_key(&peer) => Ok(call.call_id.clone()),
            _ => Err(CallError::StaleSignal),
        }
    }

    /// The link for `peer`, creating it on first use. Never duplicates.
    fn ensure_link(&mut self, peer: ClientId, initiator: bool) -> Result<(Arc<dyn PeerLink>, bool), CallError> {
        if let Some(entry) = self.peers.get(&peer) {
            return Ok((entry.link.clone(), false));
        }
        let Some(audio) = self.call.as_ref().and_then(|c| c.audio.clone()) else {
            return Err(CallError::StaleSignal);
        };
        let link = self.media.create_peer_link(peer, initiator, &audio);
        self.peers.insert(peer, PeerEntry { link: link.clone(), sink: None });
        debug!(%peer, initiator, "call: peer link created");
        Ok((link, true))
    }

    fn cleanup_peer(&mut self, peer: ClientId) -> bool {
        let Some(entry) = self.peers.remove(&peer) else {
            return false;
        };
        close_peer(&entry);
        true
    }

    fn offer(&self, peer: ClientId, link: Arc<dyn PeerLink>) -> Negotiation {
        let guard = self.guard();
        let outbound = self.outbound.clone();
        let call_id = self.call_id().unwrap_or_default().to_owned();
        async move {
            match link.create_offer().await {
                Ok(sdp) if guard.is_current() => send_signal(&outbound, &call_id, peer, &SignalPayload::Offer { sdp }),
                Ok(_) => debug!(%peer, "call: offer for ended call dropped"),
                Err(e) => warn!(%peer, error = %e, "call: offer failed"),
            }
        }
        .boxed()
    }

    fn send_reject(&self, call_id: &str, to: &str) {
        self.send("call:reject", [("call_id", Value::from(call_id)), ("to", Value::from(to))]);
    }

    fn send<const N: usize>(&self, syscall: &str, fields: [(&str, Value); N]) {
        let data: Data = fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
        if self.outbound.send(Frame::request(syscall, data)).is_err() {
            debug!(syscall, "call: hub connection closed; frame dropped");
        }
    }
}

fn close_peer(entry: &PeerEntry) {
    entry.link.close();
    if let Some(sink) = &entry.sink {
        sink.close();
    }
}

fn send_signal(outbound: &Outbound, call_id: &str, to: ClientId, payload: &SignalPayload) {
    let mut data = Data::new();
    data.insert("call_id".into(), Value::from(call_id));
    data.insert("to".into(), Value::from(to.to_string()));
    data.insert("data".into(), serde_json::to_value(payload).unwrap_or(Value::Null));
    if outbound.send(Frame::request("call:signal", data)).is_err() {
        debug!(%to, "call: hub connection closed; signal dropped");
    }
}

fn field<'a>(frame: &'a Frame, key: &str) -> Result<&'a str, CallError> {
    frame.str_field(key).ok_or(CallError::Malformed)
}

fn client_field(frame: &Frame, key: &str) -> Result<ClientId, CallError> {
    field(frame, key)?.parse().map_err(|_| CallError::Malformed)
}

#[cfg(test)]
#[path = "call_test.rs"]
mod tests;
