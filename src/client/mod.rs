//! Client-side state for one FriendHub tab.
//!
//! ARCHITECTURE
//! ============
//! The host owns the WebSocket and feeds every inbound frame to both
//! [`chat::ChatView`] and [`call::CallMachine`]. Frames they produce go back
//! out on the same socket. Media objects are reached only through the
//! traits in [`media`], so these machines run unchanged under test mocks.

pub mod call;
pub mod chat;
pub mod media;
pub mod typing;
