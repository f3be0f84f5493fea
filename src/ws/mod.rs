//! WebSocket transport between clients and their peers

pub mod handler;
pub mod protocol;
