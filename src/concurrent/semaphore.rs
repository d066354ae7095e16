//! Counting semaphore
//!
//! Bounds how many callers hold a permit at once. Permits are RAII guards
//! that can move across threads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{RelayError, Result};
use super::Shutdown;

/// How often a blocked `acquire_until` re-checks the shutdown signal
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

struct Inner {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

/// A held permit; dropping it returns the permit
pub struct Permit {
    inner: Arc<Inner>,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                available: Mutex::new(capacity),
                released: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Block until a permit is free
    pub fn acquire(&self) -> Permit {
        let mut available = self.inner.available.lock();
        while *available == 0 {
            self.inner.released.wait(&mut available);
        }
        *available -= 1;
        self.permit()
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut available = self.inner.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(self.permit())
    }

    /// Block until a permit is free or `shutdown` fires
    pub fn acquire_until(&self, shutdown: &Shutdown) -> Result<Permit> {
        let mut available = self.inner.available.lock();
        while *available == 0 {
            if shutdown.is_triggered() {
                return Err(RelayError::Cancelled);
            }
            self.inner.released.wait_for(&mut available, SHUTDOWN_POLL);
        }
        *available -= 1;
        Ok(self.permit())
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        *self.inner.available.lock()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn permit(&self) -> Permit {
        Permit {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        *self.inner.available.lock() += 1;
        self.inner.released.notify_one();
    }
}
