//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.
//!
//! The same acceptor serves the client line protocol and the replication
//! primary; what happens on a connection is decided by a [`Service`].

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::concurrent::{Semaphore, Shutdown};
use crate::error::{RelayError, Result};

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Per-connection behaviour plugged into a [`Server`]
pub trait Service: Send + Sync + 'static {
    /// Serve one connection until the peer leaves or an error occurs
    fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()>;
}

/// Connection limits applied by the acceptor
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Connections served at once; extra ones are closed on accept
    pub max_connections: usize,

    /// Socket read/write timeout; `None` waits forever
    pub idle_timeout: Option<Duration>,
}

/// Bound TCP server
pub struct Server<S> {
    name: &'static str,
    listener: TcpListener,
    service: Arc<S>,
    options: ServerOptions,
    connections: Semaphore,
}

impl<S: Service> Server<S> {
    /// Bind `addr` (use port 0 for an ephemeral port)
    pub fn bind(name: &'static str, addr: &str, service: S, options: ServerOptions) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| RelayError::Network(format!("{} bind {}: {}", name, addr, e)))?;
        // Polled so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        let connections = Semaphore::new(options.max_connections);
        Ok(Self {
            name,
            listener,
            service: Arc::new(service),
            options,
            connections,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires (blocking)
    ///
    /// Connection threads already running finish on their own; each is
    /// bounded by the idle timeout.
    pub fn run(&self, shutdown: &Shutdown) -> Result<()> {
        tracing::info!(
            server = self.name,
            addr = %self.local_addr()?,
            max_connections = self.options.max_connections,
            "server listening"
        );

        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    shutdown.wait_timeout(ACCEPT_POLL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(server = self.name, error = %e, "accept failed");
                    shutdown.wait_timeout(ACCEPT_POLL);
                }
            }
        }

        tracing::info!(server = self.name, "server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let permit = match self.connections.try_acquire() {
            Some(permit) => permit,
            None => {
                tracing::warn!(server = self.name, %peer, "connection limit reached, rejecting");
                return;
            }
        };

        if let Err(e) = self.configure(&stream) {
            tracing::warn!(server = self.name, %peer, error = %e, "failed to configure socket");
            return;
        }

        let service = Arc::clone(&self.service);
        let name = self.name;
        let spawned = thread::Builder::new()
            .name(format!("{}-conn", name))
            .spawn(move || {
                let _permit = permit;
                tracing::debug!(server = name, %peer, "connection opened");

                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    service.serve(stream, peer)
                }));
                match outcome {
                    Ok(Ok(())) => tracing::debug!(server = name, %peer, "connection closed"),
                    Ok(Err(e)) => tracing::warn!(server = name, %peer, error = %e, "connection failed"),
                    Err(panic) => tracing::error!(
                        server = name,
                        %peer,
                        "connection handler panicked: {}",
                        panic
                            .downcast_ref::<&str>()
                            .copied()
                            .unwrap_or("(non-string panic)")
                    ),
                }
            });

        if let Err(e) = spawned {
            tracing::error!(server = self.name, %peer, error = %e, "failed to spawn connection thread");
        }
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        // Accepted sockets may inherit the listener's non-blocking flag
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.options.idle_timeout)?;
        stream.set_write_timeout(self.options.idle_timeout)?;
        Ok(())
    }
}

/// True for errors that just mean the peer went away or went quiet
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
