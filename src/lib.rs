//! # EmberKV - A Small In-Memory Key-Value Cache Server
//!
//! EmberKV speaks a subset of the Redis protocol (framed RESP arrays plus
//! plain-text inline commands) and keeps binary-safe values in memory with
//! optional per-key expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             EmberKV                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐  ┌───────────────────────┐   │
//! │                     │  Decoder    │  │    StorageEngine      │   │
//! │                     │ RESP+inline │  │  64 RwLock shards     │   │
//! │                     └─────────────┘  └───────────▲───────────┘   │
//! │                                                  │               │
//! │                                      ┌───────────┴───────────┐   │
//! │                                      │    ExpirySweeper      │   │
//! │                                      └───────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
//! use emberkv::commands::CommandHandler;
//! use emberkv::connection::{spawn_session, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let handler = CommandHandler::new(Arc::clone(&storage));
//!
//!     let listener = TcpListener::bind("127.0.0.1:6380").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         spawn_session(stream, addr, handler.clone(), Arc::clone(&stats));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value [NX|XX] [EX seconds|PX milliseconds]`
//! - `DEL key [key ...]`
//! - `PING`
//! - `ECHO message`
//! - `QUIT`
//!
//! ## Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: every read checks the entry's deadline
//! 2. **Active**: a background task periodically removes expired entries
//!
//! Overwriting or deleting a key replaces its deadline, so a stale TTL can
//! never remove a newer value.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandHandler, Compatibility};
pub use config::Config;
pub use connection::{handle_connection, spawn_session, ConnectionStats};
pub use protocol::{Command, Decoder, ParseError, Reply};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port EmberKV listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
