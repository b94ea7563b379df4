//! Klemmbrett - clipboard history manager core
//!
//! Dedup history with extend-merge semantics, config-driven pickers,
//! append-only persistence and remote clipboard exchange, wired together
//! as plugins over a single-threaded event loop.

pub mod app;
pub mod clipboard;
pub mod events;
pub mod exchange;
pub mod logging;
pub mod menu;
pub mod models;
pub mod platform;
pub mod storage;
