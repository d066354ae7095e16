//! Line protocol client
//!
//! Blocking client used by the CLI and the integration tests.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::protocol::{Response, Status};

/// Connected client; one request in flight at a time
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to a node's client address
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| RelayError::Network(format!("connect: {}", e)))?;
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Bound every read and write; `None` waits forever
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Send one raw request line and return the raw reply line
    pub fn send_line(&mut self, line: &str) -> Result<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(RelayError::Network("server closed the connection".into()));
        }
        Ok(reply.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send a request line and parse the reply
    pub fn request(&mut self, line: &str) -> Result<Response> {
        self.send_line(line).map(|reply| Response::from_line(&reply))
    }

    /// GET; a missing key is `NotFound`
    pub fn get(&mut self, key: &str) -> Result<String> {
        let reply = self.send_line(&format!("GET {}", key))?;
        let response = Response::from_value_line(&reply);
        match response.status {
            Status::Ok => Ok(response
                .payload
                .map(|value| String::from_utf8_lossy(&value).into_owned())
                .unwrap_or_default()),
            Status::NotFound => Err(RelayError::NotFound),
            Status::Error => Err(server_error(response)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let response = self.request(&format!("SET {} {}", key, value))?;
        expect_ok(response)
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        let response = self.request(&format!("DEL {}", key))?;
        expect_ok(response)
    }
}

fn expect_ok(response: Response) -> Result<()> {
    match response.status {
        Status::Ok => Ok(()),
        Status::NotFound => Err(RelayError::NotFound),
        Status::Error => Err(server_error(response)),
    }
}

/// Map an `ERROR` reply back to the closest local error
fn server_error(response: Response) -> RelayError {
    let message = response
        .payload
        .map(|payload| String::from_utf8_lossy(&payload).into_owned())
        .unwrap_or_default();

    if message == RelayError::ReadOnly.to_string() {
        RelayError::ReadOnly
    } else {
        RelayError::Network(message)
    }
}
