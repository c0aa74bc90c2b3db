//! # Community HUD Core
//!
//! Storage-agnostic logic for Community HUD: leaderboard models, the
//! snapshot store abstraction, the leaderboard delta engine, and report
//! rendering.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The application crate supplies a SQLite
//! [`store::SnapshotStore`]; tests use [`store::memory::InMemoryStore`].

pub mod delta;
pub mod models;
pub mod render;
pub mod store;
