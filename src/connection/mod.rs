//! Connection Module
//!
//! One session per client. The listener in `main.rs` accepts connections
//! and calls [`spawn_session`] for each of them: the session runs on its
//! own task, watched by a second task that logs it if it panics.
//!
//! ```text
//!            TCP Listener (main.rs)
//!                    │ accept()
//!                    ▼
//! ┌───────────────────────────────────────────────────┐
//! │               ConnectionHandler                   │
//! │                                                   │
//! │  ┌─────────┐    ┌─────────────┐    ┌───────────┐  │
//! │  │ Decoder │───>│ Execute cmd │───>│ Send reply│  │
//! │  └─────────┘    └─────────────┘    └───────────┘  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use emberkv::connection::{spawn_session, ConnectionStats};
//! use emberkv::commands::CommandHandler;
//! use emberkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! let (stream, addr) = listener.accept().await?;
//! spawn_session(stream, addr, handler, stats);
//! ```

pub mod handler;

pub use handler::{
    handle_connection, spawn_session, ConnectionError, ConnectionHandler, ConnectionStats,
};
