//! One-shot result handoff
//!
//! A [`Promise`] is resolved at most once by a producer; the matching
//! [`Future`] yields that single value to the waiting caller.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{RelayError, Result};
use super::Shutdown;

/// Create a connected promise/future pair
pub fn promise<T>() -> (Promise<T>, Future<T>) {
    let (sender, receiver) = channel::bounded(1);
    (Promise { sender }, Future { receiver })
}

/// Producer half; consumed by `resolve`, so a value is delivered at most once
#[derive(Debug)]
pub struct Promise<T> {
    sender: Sender<T>,
}

impl<T> Promise<T> {
    /// Hand the value to the waiter
    ///
    /// Returns false if the waiter has gone away (cancelled or dropped);
    /// the value is then discarded.
    pub fn resolve(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

/// Consumer half
///
/// If the promise is dropped unresolved, waiting fails with `Closed`.
#[derive(Debug)]
pub struct Future<T> {
    receiver: Receiver<T>,
}

impl<T> Future<T> {
    /// Block until the value arrives
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| RelayError::Closed)
    }

    /// Block for at most `timeout`; the future is abandoned on timeout
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(RelayError::Cancelled),
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::Closed),
        }
    }

    /// Block until the value arrives or `shutdown` fires
    ///
    /// A value that is already available wins over the signal.
    pub fn wait_until(self, shutdown: &Shutdown) -> Result<T> {
        match self.receiver.try_recv() {
            Ok(value) => return Ok(value),
            Err(TryRecvError::Disconnected) => return Err(RelayError::Closed),
            Err(TryRecvError::Empty) => {}
        }

        crossbeam::channel::select! {
            recv(self.receiver) -> value => value.map_err(|_| RelayError::Closed),
            recv(shutdown.receiver()) -> _ => Err(RelayError::Cancelled),
        }
    }

    /// Take the value if it is already there
    pub fn try_get(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}
