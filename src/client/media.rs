//! Media capability seam — local audio, peer links, audio sinks.
//!
//! The call machine orchestrates these objects but never implements media
//! transport. A browser binding backs them with `getUserMedia` and
//! `RTCPeerConnection`; tests back them with recording mocks.
//!
//! Events flow the other way through the machine's hook methods: the host
//! reports produced ICE candidates, received remote tracks, and connection
//! state changes by calling `CallMachine::on_local_candidate`,
//! `on_remote_track`, and `on_connection_state`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::ClientId;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("microphone access denied")]
    PermissionDenied,
    #[error("peer link error: {0}")]
    Link(String),
}

/// Connection state reported by a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// States after which the link is torn down.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Negotiation payload carried opaquely by the hub's signal relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    Offer { sdp: Value },
    Answer { sdp: Value },
    Candidate {
        #[serde(default)]
        candidate: Option<Value>,
    },
}

/// Captured microphone stream.
pub trait LocalAudio: Send + Sync {
    /// Gate outbound frames. Never renegotiates.
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

/// One pairwise media connection.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create an offer and apply it as the local description.
    async fn create_offer(&self) -> Result<Value, MediaError>;
    /// Create an answer and apply it as the local description.
    async fn create_answer(&self) -> Result<Value, MediaError>;
    async fn set_remote_description(&self, sdp: Value) -> Result<(), MediaError>;
    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), MediaError>;
    fn close(&self);
}

/// Playback element for one remote peer's audio.
pub trait AudioSink: Send + Sync {
    fn close(&self);
}

#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// Ask for the microphone.
    async fn local_audio(&self) -> Result<Arc<dyn LocalAudio>, MediaError>;

    /// Build a link to `peer` carrying `audio`. `initiator` links make the offer.
    fn create_peer_link(&self, peer: ClientId, initiator: bool, audio: &Arc<dyn LocalAudio>) -> Arc<dyn PeerLink>;

    fn create_audio_sink(&self, peer: ClientId) -> Arc<dyn AudioSink>;
}
