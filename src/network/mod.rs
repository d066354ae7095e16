//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread per listening address
//! - One thread per connection, bounded by `max_connections`
//! - Client requests routed through `Storage`
//! - The replication primary reuses the same acceptor

mod server;
mod connection;
mod client;

pub use server::{Server, ServerOptions, Service};
pub(crate) use server::is_disconnect;
pub use connection::{Connection, ShellService};
pub use client::Client;
