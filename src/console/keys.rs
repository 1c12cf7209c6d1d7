// src/console/keys.rs

//! Single-key commands.
//!
//! The reader runs on a blocking thread. Each iteration it takes the console,
//! switches the terminal to raw mode just long enough to poll for one key,
//! and runs the matching action while still holding the console, so key
//! output never interleaves with sync output.

use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::runtime::Handle;
use tracing::debug;

use crate::console::{Console, ConsoleGuard};
use crate::errors::{Result, SyncError};
use crate::lifecycle::{OperationControl, StopReason, Supervisor};

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type KeyAction = Arc<dyn Fn(ConsoleGuard) -> ActionFuture + Send + Sync>;

/// How long one raw-mode poll waits for a key.
pub const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

const ENTER: char = '\r';
const CTRL_C: char = '\x03';

#[derive(Clone)]
pub struct KeyHandler {
    pub keys: Vec<char>,
    /// `None` hides the handler from the help listing.
    pub description: Option<String>,
    pub action: KeyAction,
}

impl std::fmt::Debug for KeyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandler")
            .field("keys", &self.keys)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Where keys come from.
pub trait KeySource: Send {
    /// Wait up to `timeout` for one key press.
    fn read_key(&mut self, timeout: Duration) -> io::Result<Option<char>>;
}

/// Leaves raw mode when dropped, including on early returns.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// The process terminal, read through crossterm.
#[derive(Debug, Default)]
pub struct RawTerminal;

impl KeySource for RawTerminal {
    fn read_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        let _raw = RawModeGuard::enter()?;
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(CTRL_C)
                }
                KeyCode::Enter => Some(ENTER),
                KeyCode::Char(c) => Some(c),
                _ => None,
            }),
            _ => Ok(None),
        }
    }
}

/// Registry of key handlers plus the reader loop.
pub struct KeyController {
    handlers: Vec<KeyHandler>,
    console: Console,
    supervisor: Arc<Supervisor>,
    poll: Duration,
}

impl std::fmt::Debug for KeyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyController")
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl KeyController {
    /// A controller with the built-in keys: help, Enter and Ctrl-C.
    pub fn new(console: Console, supervisor: Arc<Supervisor>) -> Self {
        let mut ctl = Self {
            handlers: Vec::new(),
            console,
            supervisor,
            poll: KEY_POLL_INTERVAL,
        };

        // Bound to the final help text in `finalize_help`.
        ctl.on_key(&['h', '?'], Some("for help"), |_| async { Ok::<(), SyncError>(()) });
        ctl.on_key(&[ENTER], None, |mut out| async move {
            out.line("")?;
            Ok::<(), SyncError>(())
        });
        let sup = Arc::clone(&ctl.supervisor);
        ctl.on_key(&[CTRL_C], None, move |_| {
            let sup = Arc::clone(&sup);
            async move {
                sup.broadcast_stop(StopReason::Interrupt);
                Ok::<(), SyncError>(())
            }
        });
        ctl
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Register an action for one or more keys. Later registrations win for
    /// keys bound twice.
    pub fn on_key<F, Fut>(&mut self, keys: &[char], description: Option<&str>, action: F)
    where
        F: Fn(ConsoleGuard) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action: KeyAction = Arc::new(move |out: ConsoleGuard| -> ActionFuture {
            Box::pin(action(out))
        });
        self.handlers.push(KeyHandler {
            keys: keys.to_vec(),
            description: description.map(str::to_string),
            action,
        });
    }

    pub fn handlers(&self) -> &[KeyHandler] {
        &self.handlers
    }

    /// A blank line followed by one `Press [keys] description` line per
    /// visible handler.
    pub fn help_text(&self) -> String {
        let mut text = String::from("\n");
        for h in &self.handlers {
            let Some(desc) = &h.description else { continue };
            let keys: Vec<String> = h.keys.iter().map(char::to_string).collect();
            text.push_str(&format!("Press [{}] {}\n", keys.join(","), desc));
        }
        text
    }

    fn finalize_help(&mut self) {
        let text = Arc::new(self.help_text());
        let action: KeyAction = Arc::new(move |mut out: ConsoleGuard| -> ActionFuture {
            let text = Arc::clone(&text);
            Box::pin(async move {
                out.write_all(text.as_bytes())?;
                out.flush()?;
                Ok(())
            })
        });
        if let Some(help) = self.handlers.iter_mut().find(|h| h.keys.contains(&'h')) {
            help.action = action;
        }
    }

    fn lookup(&self, key: char) -> Option<&KeyHandler> {
        self.handlers.iter().rev().find(|h| h.keys.contains(&key))
    }

    /// Start the reader loop on a blocking thread under the supervisor.
    pub fn spawn(mut self, mut source: Box<dyn KeySource>) {
        self.finalize_help();
        let control = OperationControl::new("key-reader");
        let runtime = Handle::current();
        let supervisor = Arc::clone(&self.supervisor);
        let loop_control = Arc::clone(&control);
        supervisor.spawn_blocking(control, move || {
            self.run_loop(source.as_mut(), &loop_control, &runtime)
        });
    }

    fn run_loop(
        &self,
        source: &mut dyn KeySource,
        control: &OperationControl,
        runtime: &Handle,
    ) -> Result<()> {
        while control.is_running() {
            let out = self.console.acquire_blocking();
            let Some(key) = source.read_key(self.poll)? else {
                continue;
            };
            let Some(handler) = self.lookup(key) else {
                debug!(key = ?key, "unbound key");
                continue;
            };
            debug!(key = ?key, "running key action");
            runtime.block_on((handler.action)(out))?;
        }
        debug!("key reader stopped");
        Ok(())
    }
}
