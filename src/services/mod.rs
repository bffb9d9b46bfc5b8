//! Service layer: command handlers, timers, fan-out, health, and docs.

pub mod documentation;
pub mod health_service;
pub mod round_timer;
pub mod session_service;
pub mod websocket_service;
