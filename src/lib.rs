//! # Community HUD
//!
//! Batch analytics for online communities: turns raw JSON captures of
//! member lists and leaderboards into an append-only history, computes
//! leaderboard deltas between capture batches, writes Markdown/JSON
//! reports, and posts digests to Discord.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────┐
//! │ Raw captures │──▶│  Normalize  │──▶│   SQLite   │
//! │ members / lb │   │ batch+merge │   │ history    │
//! └──────────────┘   └─────────────┘   └─────┬──────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                  ┌──────────┐        ┌──────────┐
//!                  │ Reports  │──────▶ │ Discord  │
//!                  │ md/json  │        │ webhooks │
//!                  └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hud init                          # create database
//! hud normalize leaderboard         # ingest newest leaderboard capture
//! hud delta --tenant alley          # write delta reports
//! hud run --no-notify               # full pipeline for every tenant
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Member and leaderboard records |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`raw`] | Raw capture discovery and JSON paths |
//! | [`normalize`] | Members upsert and leaderboard capture batches |
//! | [`daily`] | Daily member snapshots |
//! | [`sqlite_store`] | SQLite snapshot store for the delta engine |
//! | [`reports`] | Delta, KPI, health, and joiner reports |
//! | [`notify`] | Discord webhook notifications |
//! | [`stats`] | Database statistics |
//! | [`runner`] | Multi-tenant daily pipeline |

pub mod config;
pub mod daily;
pub mod db;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod raw;
pub mod reports;
pub mod runner;
pub mod sqlite_store;
pub mod stats;
