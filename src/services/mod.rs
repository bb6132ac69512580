//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the coordinator logic so the socket handler can stay
//! focused on protocol translation and connection lifecycle. `board` and
//! `voice` expose pure handlers over a locked `BoardRoom` plus async
//! wrappers that run them inside the board's critical section.

pub mod board;
pub mod registry;
pub mod sweep;
pub mod voice;
