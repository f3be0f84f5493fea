//! Arena round server
//!
//! Each connected client gets a peer in a named relay room. Peers own their
//! combatants and exchange typed game messages through the relay; whichever
//! peer holds relay authority runs the round coordinator for the room.

pub mod app;
pub mod assets;
pub mod config;
pub mod game;
pub mod http;
pub mod relay;
pub mod rooms;
pub mod util;
pub mod ws;
