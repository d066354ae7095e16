//! WAL test suite: file store, segment index, recovery and the batching log

mod store_tests;
mod recovery_tests;
mod log_tests;
