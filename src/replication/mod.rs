//! Replication Module
//!
//! Asynchronous log shipping from one primary to read-only replicas.
//!
//! ## Protocol
//! ```text
//! replica                                   primary
//!    │ ── after_id (i64 BE, 8 bytes) ──────────► │
//!    │ ◄── count (u32 BE) + count × Segment ──── │
//! ```
//!
//! A replica persists each received segment under the primary's id, then
//! applies it. Replicas may lag arbitrarily; they never accept client writes.

mod primary;
mod replica;

pub use primary::PrimaryService;
pub use replica::{ReplicaClient, SyncReport};
