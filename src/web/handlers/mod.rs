//! HTTP and WebSocket request handlers.

pub mod conversations;
pub mod health;
pub mod messages;
pub mod users;
pub mod websocket;
