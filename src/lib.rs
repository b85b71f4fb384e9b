//! FriendHub — real-time presence, chat routing, and call signaling hub.
//!
//! ARCHITECTURE
//! ============
//! The server half (`routes`, `services`, `state`, `store`) tracks who is
//! online, routes chat, and coordinates call sessions over one WebSocket
//! per connection. The `client` half is the browser-side call and chat
//! state machine, written against media traits so it can be driven by any
//! peer-connection implementation.

pub mod client;
pub mod config;
pub mod db;
pub mod frame;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod target;
