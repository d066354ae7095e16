//! Batch collector
//!
//! Many callers submit single items; one background thread groups them into
//! batches that close on size or timeout, hands each batch to a handler, and
//! resolves every caller's future with its own result.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{RelayError, Result};
use super::future::{promise, Future, Promise};

/// An item waiting for its batch to be handled
struct Pending<T, R> {
    item: T,
    promise: Promise<R>,
}

/// Groups submitted items into size- or time-bounded batches
///
/// ## Batching rule
/// A batch opens when its first item arrives and closes when it holds
/// `max_size` items or `timeout` has passed since it opened, whichever comes
/// first. Items keep their arrival order inside a batch.
pub struct Batcher<T, R> {
    /// Submission side; `None` once closed
    sender: RwLock<Option<Sender<Pending<T, R>>>>,

    /// Collector thread, joined on close
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T, R> Batcher<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start the collector thread
    ///
    /// `handler` receives each closed batch and must return one result per
    /// item, in the same order.
    pub fn spawn<F>(name: &str, max_size: usize, timeout: Duration, handler: F) -> Result<Self>
    where
        F: FnMut(Vec<T>) -> Vec<R> + Send + 'static,
    {
        let (sender, receiver) = channel::unbounded();
        let max_size = max_size.max(1);

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || collect(receiver, max_size, timeout, handler))?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue an item; the returned future yields its result once the
    /// containing batch has been handled
    pub fn submit(&self, item: T) -> Result<Future<R>> {
        let sender = self.sender.read();
        let sender = sender.as_ref().ok_or(RelayError::Closed)?;

        let (promise, future) = promise();
        sender
            .send(Pending { item, promise })
            .map_err(|_| RelayError::Closed)?;
        Ok(future)
    }

    /// Stop accepting items, flush what is queued, and join the collector
    pub fn close(&self) {
        // Dropping the sender lets the collector drain and exit
        self.sender.write().take();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("batch collector thread panicked");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl<T, R> Drop for Batcher<T, R> {
    fn drop(&mut self) {
        self.sender.get_mut().take();
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}

/// Collector loop: runs until every sender is gone and the queue is empty
fn collect<T, R, F>(receiver: Receiver<Pending<T, R>>, max_size: usize, timeout: Duration, mut handler: F)
where
    F: FnMut(Vec<T>) -> Vec<R>,
{
    let mut disconnected = false;

    while !disconnected {
        let first = match receiver.recv() {
            Ok(pending) => pending,
            Err(_) => break,
        };

        let deadline = Instant::now() + timeout;
        let mut batch = Vec::with_capacity(max_size);
        batch.push(first);

        while batch.len() < max_size {
            match receiver.recv_deadline(deadline) {
                Ok(pending) => batch.push(pending),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    // Flush this batch, then stop
                    disconnected = true;
                    break;
                }
            }
        }

        flush(batch, &mut handler);
    }

    tracing::debug!("batch collector stopped");
}

fn flush<T, R, F>(batch: Vec<Pending<T, R>>, handler: &mut F)
where
    F: FnMut(Vec<T>) -> Vec<R>,
{
    let (items, promises): (Vec<T>, Vec<Promise<R>>) = batch
        .into_iter()
        .map(|pending| (pending.item, pending.promise))
        .unzip();

    let expected = promises.len();
    let results = handler(items);
    if results.len() != expected {
        // Unmatched promises are dropped and their waiters see `Closed`
        tracing::error!(
            expected,
            got = results.len(),
            "batch handler returned the wrong number of results"
        );
    }

    for (promise, result) in promises.into_iter().zip(results) {
        // A false return means that caller was cancelled; nothing to do
        let _ = promise.resolve(result);
    }
}
