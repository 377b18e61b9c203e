//! Realtime party-game room coordinator.
//!
//! Players join a short-lived room via a generated code, take turns
//! receiving a randomly-drawn task, and the group votes on whether the
//! task was completed. State lives entirely in process memory; the only
//! durable artifact a client holds is its reconnect token.

pub mod catalog;
pub mod config;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod telemetry;
