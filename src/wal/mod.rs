//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through batched, append-only logging.
//!
//! ## Responsibilities
//! - Batch concurrent writes into segments (size or timeout)
//! - Persist each segment before acknowledging its writers
//! - Assign segment IDs 1, 2, 3, ... with no gaps
//! - Replay segments on restart
//! - Serve "segments after ID" to replication
//!
//! ## File Format
//! ```text
//! {data_dir}/wal/wal_0000000001.bin, wal_0000000002.bin, ...
//! ┌─────────────────────────────────────────────┐
//! │ Segment 1                                   │
//! │ ┌────────┬───────────┬────────────────────┐ │
//! │ │ ID (8) │ Count (4) │ Commands ...       │ │
//! │ └────────┴───────────┴────────────────────┘ │
//! ├─────────────────────────────────────────────┤
//! │ Segment 2                                   │
//! │ ┌────────┬───────────┬────────────────────┐ │
//! │ │ ID (8) │ Count (4) │ Commands ...       │ │
//! │ └────────┴───────────┴────────────────────┘ │
//! └─────────────────────────────────────────────┘
//! ```

mod segment;
mod store;
mod reader;
mod recovery;
mod log;

pub use segment::{Segment, SegmentId, SegmentIndex};
pub use store::FileStore;
pub use reader::{SegmentIter, SegmentReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use log::{Applier, Wal};
