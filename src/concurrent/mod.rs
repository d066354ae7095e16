//! Concurrency Module
//!
//! Small building blocks shared by the WAL and the network services:
//! - `Batcher`: background collector that turns single submissions into batches
//! - `Promise` / `Future`: one-shot result handoff per submission
//! - `Semaphore`: counting gate with RAII permits
//! - `Shutdown`: cloneable cancellation signal

mod batch;
mod future;
mod semaphore;
mod shutdown;

pub use batch::Batcher;
pub use future::{promise, Future, Promise};
pub use semaphore::{Permit, Semaphore};
pub use shutdown::Shutdown;
