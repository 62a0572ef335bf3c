//! WebSocket chat transport

pub mod hub;

pub use hub::{serve_ws, Hub, WsMessage};
