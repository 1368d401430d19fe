//! Matchpoint relay server library.
//!
//! Exposes the relay server for use in tests and embedding. The server
//! accepts WebSocket connections, pairs players into two-member sessions,
//! and forwards opaque action payloads between them.

pub mod config;
pub mod relay;
pub mod sessions;
