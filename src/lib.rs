//! # RelayKV
//!
//! An in-memory key-value store with:
//! - A batching Write-Ahead Log (WAL) for durability
//! - Crash recovery by segment replay
//! - Primary/replica log shipping
//! - A line-oriented TCP client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (line shell, one thread per client)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Storage                                │
//! │        (validation, read-only replicas, routing)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │ writes                  │ reads
//!          ▼                         ▼
//!   ┌─────────────┐   apply   ┌─────────────┐
//!   │     WAL     │ ────────► │   Engine    │
//!   │  (batches)  │           │  (RwLock)   │
//!   └──────┬──────┘           └─────────────┘
//!          │
//!          ├──► wal_0000000001.bin, wal_0000000002.bin, ...
//!          │
//!          └──► replication primary ──► replicas
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod logging;

pub mod concurrent;
pub mod protocol;
pub mod engine;
pub mod wal;
pub mod storage;
pub mod replication;
pub mod network;
pub mod node;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DecodeError, RelayError, Result};
pub use config::Config;
pub use engine::Engine;
pub use storage::{Role, Storage};
pub use wal::Wal;
pub use node::Node;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RelayKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
