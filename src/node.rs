//! Node wiring
//!
//! Opens storage and starts the services a node runs for its role:
//!
//! ```text
//!              ┌──────────────┐
//! clients ───► │ shell server │ ──► Storage ──► Engine
//!              └──────────────┘        │
//!                                      ▼
//!                                     WAL ◄── replica sync loop (replica)
//!                                      │
//!                                      └────► primary server (primary)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::concurrent::Shutdown;
use crate::config::{Config, ReplicationRole};
use crate::error::{RelayError, Result};
use crate::network::{Server, ServerOptions, ShellService};
use crate::replication::{PrimaryService, ReplicaClient};
use crate::storage::Storage;

/// A running node; services stop when `stop` is called or the node drops
pub struct Node {
    storage: Arc<Storage>,
    shutdown: Shutdown,
    client_addr: SocketAddr,
    replication_addr: Option<SocketAddr>,
    threads: Vec<JoinHandle<()>>,
}

impl Node {
    /// Open storage (replaying the WAL first) and start every service
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let shutdown = Shutdown::new();

        let idle_timeout = Some(config.network.idle_timeout).filter(|t| !t.is_zero());
        let shell = Server::bind(
            "client",
            &config.network.listen_addr,
            ShellService::new(
                Arc::clone(&storage),
                shutdown.clone(),
                config.network.max_line_length,
            ),
            ServerOptions {
                max_connections: config.network.max_connections,
                idle_timeout,
            },
        )?;
        // From here on, an early return drops the node and stops what started
        let mut node = Self {
            storage: Arc::clone(&storage),
            shutdown: shutdown.clone(),
            client_addr: shell.local_addr()?,
            replication_addr: None,
            threads: Vec::new(),
        };
        node.threads
            .push(spawn_server("relaykv-client", shell, shutdown.clone())?);

        if let Some(replication) = &config.replication {
            match &replication.role {
                ReplicationRole::Primary { listen_addr } => {
                    let wal = storage.wal().cloned().ok_or_else(|| {
                        RelayError::Config("replication requires the write-ahead log".into())
                    })?;
                    let server = Server::bind(
                        "replication",
                        listen_addr,
                        PrimaryService::new(wal),
                        ServerOptions {
                            max_connections: config.network.max_connections,
                            idle_timeout,
                        },
                    )?;
                    node.replication_addr = Some(server.local_addr()?);
                    node.threads
                        .push(spawn_server("relaykv-primary", server, shutdown.clone())?);
                }
                ReplicationRole::Replica {
                    primary_addr,
                    sync_interval,
                } => {
                    let mut client = ReplicaClient::new(
                        primary_addr.clone(),
                        Arc::clone(&storage),
                        replication.io_timeout,
                    );
                    let interval = *sync_interval;
                    let signal = shutdown.clone();
                    let handle = thread::Builder::new()
                        .name("relaykv-replica".into())
                        .spawn(move || client.run(interval, &signal))?;
                    node.threads.push(handle);
                }
            }
        }

        tracing::info!(
            client_addr = %node.client_addr,
            role = ?storage.role(),
            durable = storage.wal().is_some(),
            "node started"
        );
        Ok(node)
    }

    /// Block until the shutdown signal fires, then stop
    pub fn run(mut self) -> Result<()> {
        self.shutdown.wait();
        self.stop_inner()
    }

    /// Fire the shutdown signal, join the services and close the WAL
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Handle that stops the node from another thread
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Where replicas connect (primaries only)
    pub fn replication_addr(&self) -> Option<SocketAddr> {
        self.replication_addr
    }

    fn stop_inner(&mut self) -> Result<()> {
        if self.threads.is_empty() {
            return Ok(());
        }

        self.shutdown.trigger();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("node service thread panicked");
            }
        }

        self.storage.close()?;
        tracing::info!("node stopped");
        Ok(())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.stop_inner() {
            tracing::error!(error = %e, "error while stopping node");
        }
    }
}

fn spawn_server<S>(name: &str, server: Server<S>, shutdown: Shutdown) -> Result<JoinHandle<()>>
where
    S: crate::network::Service,
{
    let handle = thread::Builder::new().name(name.into()).spawn(move || {
        if let Err(e) = server.run(&shutdown) {
            tracing::error!(error = %e, "server stopped with error");
        }
    })?;
    Ok(handle)
}
