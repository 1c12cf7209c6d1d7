// src/console/mod.rs

//! Console ownership.
//!
//! Sync output and the interactive key reader share one terminal. Whoever
//! holds a [`ConsoleGuard`] owns it: the debouncer for a whole batch, the key
//! reader while it polls for a key and runs the matching action.

pub mod keys;

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

pub use keys::{ActionFuture, KeyController, KeyHandler, KeySource, RawTerminal};

pub type ConsoleWriter = Box<dyn Write + Send>;

/// Shared handle to the output writer.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleWriter>>,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Wait for the console from async code.
    pub async fn acquire(&self) -> ConsoleGuard {
        ConsoleGuard {
            guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Wait for the console from a blocking thread.
    ///
    /// Panics if called from within an async execution context.
    pub fn acquire_blocking(&self) -> ConsoleGuard {
        ConsoleGuard {
            guard: Arc::clone(&self.inner).blocking_lock_owned(),
        }
    }

    pub fn try_acquire(&self) -> Option<ConsoleGuard> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .ok()
            .map(|guard| ConsoleGuard { guard })
    }
}

/// Exclusive access to the console; released on drop.
pub struct ConsoleGuard {
    guard: OwnedMutexGuard<ConsoleWriter>,
}

impl ConsoleGuard {
    /// Write one line and flush.
    pub fn line(&mut self, msg: impl fmt::Display) -> io::Result<()> {
        writeln!(self.guard, "{msg}")?;
        self.guard.flush()
    }
}

impl Write for ConsoleGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}
