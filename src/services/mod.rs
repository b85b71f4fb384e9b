//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the registries and the routing rules so route
//! handlers can stay focused on protocol translation. Every outbound frame
//! goes through `delivery`.

pub mod call;
pub mod chat;
pub mod delivery;
pub mod groups;
pub mod handshake;
pub mod persistence;
pub mod presence;
pub mod signal;
