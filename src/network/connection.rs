//! Connection Handler
//!
//! Runs the line shell on one client connection: read a line, parse it,
//! execute it on storage, write one reply line.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crate::concurrent::Shutdown;
use crate::error::{RelayError, Result};
use crate::protocol::{parse_line, Response};
use crate::storage::Storage;
use super::server::{is_disconnect, Service};

/// One line read off the socket
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line(String),
    TooLong,
    Eof,
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    storage: Arc<Storage>,

    /// Fired on node shutdown; pending writes give up
    shutdown: Shutdown,

    max_line_length: usize,

    /// Peer address for logging
    peer: SocketAddr,
}

impl Connection {
    /// Set up buffered I/O over the stream
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        storage: Arc<Storage>,
        shutdown: Shutdown,
        max_line_length: usize,
    ) -> Result<Self> {
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            storage,
            shutdown,
            max_line_length,
            peer,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Returns `Ok` when the client disconnects or goes idle past the
    /// socket timeout.
    pub fn handle(&mut self) -> Result<()> {
        while !self.shutdown.is_triggered() {
            let line = match read_line_limited(&mut self.reader, self.max_line_length) {
                Ok(LineRead::Line(line)) => line,
                Ok(LineRead::TooLong) => {
                    let message = format!("line exceeds {} bytes", self.max_line_length);
                    self.reply(&Response::error(&message))?;
                    continue;
                }
                Ok(LineRead::Eof) => {
                    tracing::debug!(peer = %self.peer, "client disconnected");
                    return Ok(());
                }
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!(peer = %self.peer, reason = %e, "closing idle or dropped connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            if line.trim().is_empty() {
                continue;
            }

            tracing::trace!(peer = %self.peer, line = %line, "request");
            let response = self.execute_line(&line);
            self.reply(&response)?;
        }
        Ok(())
    }

    fn execute_line(&self, line: &str) -> Response {
        let result = parse_line(line)
            .and_then(|command| self.storage.execute_until(command, &self.shutdown));

        if let Err(e) = &result {
            if !e.is_user_error() {
                tracing::warn!(peer = %self.peer, error = %e, "command failed");
            }
        }
        Response::from_result(result)
    }

    /// Write one reply line; a vanished client ends the connection quietly
    fn reply(&mut self, response: &Response) -> Result<()> {
        let written = writeln!(self.writer, "{}", response.to_line()).and_then(|_| self.writer.flush());
        match written {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => {
                tracing::debug!(peer = %self.peer, reason = %e, "client gone before reply");
                Err(RelayError::Network(format!("write to {}: {}", self.peer, e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// The client-facing service: one [`Connection`] per accepted socket
pub struct ShellService {
    storage: Arc<Storage>,
    shutdown: Shutdown,
    max_line_length: usize,
}

impl ShellService {
    pub fn new(storage: Arc<Storage>, shutdown: Shutdown, max_line_length: usize) -> Self {
        Self {
            storage,
            shutdown,
            max_line_length,
        }
    }
}

impl Service for ShellService {
    fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut connection = Connection::new(
            stream,
            peer,
            Arc::clone(&self.storage),
            self.shutdown.clone(),
            self.max_line_length,
        )?;
        match connection.handle() {
            // Peer vanished mid-reply; nothing left to serve
            Err(RelayError::Network(_)) => Ok(()),
            other => other,
        }
    }
}

/// Read up to and including `\n`, refusing lines longer than `max` bytes
///
/// An over-long line is consumed through its newline so the next read
/// starts on a fresh request.
fn read_line_limited<R: BufRead>(reader: &mut R, max: usize) -> io::Result<LineRead> {
    let mut buf = Vec::new();
    let limit = max as u64 + 1;
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;

    if read == 0 {
        return Ok(LineRead::Eof);
    }

    if buf.last() != Some(&b'\n') && buf.len() > max {
        skip_line(reader)?;
        return Ok(LineRead::TooLong);
    }

    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    if buf.len() > max {
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line(String::from_utf8_lossy(&buf).into_owned()))
}

/// Discard input up to and including the next newline
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}
