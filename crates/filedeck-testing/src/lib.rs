//! Testing utilities for filedeck.
//!
//! - [`Journal`]: a shared, ordered log that doubles write into
//! - [`RecordingCommand`]: a command that logs every execute/undo and can be
//!   told to fail, observed through a [`CommandProbe`] after the invoker has
//!   taken ownership
//! - [`RecordingHandler`]: a sync and async bus handler that logs calls,
//!   optionally sleeping or failing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use filedeck_core::{AsyncEventHandler, Command, Event, EventHandler};

/// Shared, ordered record of what happened.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[derive(Debug, Default)]
struct Counters {
    executes: AtomicUsize,
    undos: AtomicUsize,
}

/// Read-only view of a [`RecordingCommand`] after it has been handed off.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    counters: Arc<Counters>,
}

impl CommandProbe {
    pub fn executes(&self) -> usize {
        self.counters.executes.load(Ordering::SeqCst)
    }

    pub fn undos(&self) -> usize {
        self.counters.undos.load(Ordering::SeqCst)
    }
}

/// A command that writes `execute <name>` / `undo <name>` to a journal.
#[derive(Debug)]
pub struct RecordingCommand {
    name: String,
    journal: Journal,
    counters: Arc<Counters>,
    fail_execute_from: Option<usize>,
    fail_undo: bool,
}

impl RecordingCommand {
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            counters: Arc::default(),
            fail_execute_from: None,
            fail_undo: false,
        }
    }

    /// Fail every execute.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_execute_from = Some(1);
        self
    }

    /// Succeed `n - 1` times, then fail every execute from the `n`th on.
    #[must_use]
    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_execute_from = Some(n);
        self
    }

    /// Fail every undo.
    #[must_use]
    pub fn failing_undo(mut self) -> Self {
        self.fail_undo = true;
        self
    }

    pub fn probe(&self) -> CommandProbe {
        CommandProbe {
            counters: self.counters.clone(),
        }
    }

    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }
}

impl Command for RecordingCommand {
    fn execute(&mut self) -> anyhow::Result<()> {
        let attempt = self.counters.executes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_execute_from.is_some_and(|from| attempt >= from) {
            self.journal.record(format!("execute {} failed", self.name));
            bail!("{} refused to execute", self.name);
        }
        self.journal.record(format!("execute {}", self.name));
        Ok(())
    }

    fn undo(&mut self) -> anyhow::Result<()> {
        self.counters.undos.fetch_add(1, Ordering::SeqCst);
        if self.fail_undo {
            self.journal.record(format!("undo {} failed", self.name));
            bail!("{} refused to undo", self.name);
        }
        self.journal.record(format!("undo {}", self.name));
        Ok(())
    }

    fn description(&self) -> &str {
        &self.name
    }
}

/// A handler that writes `<name>` to a journal each time it runs.
///
/// As an async handler it writes `<name> start` and `<name> end` around an
/// optional sleep, which makes serial versus concurrent dispatch visible.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    name: String,
    journal: Journal,
    delay: Duration,
    fail: bool,
}

impl RecordingHandler {
    pub fn new(name: impl Into<String>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self::build(name.into(), journal))
    }

    pub fn failing(name: impl Into<String>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::build(name.into(), journal)
        })
    }

    pub fn delayed(name: impl Into<String>, journal: &Journal, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::build(name.into(), journal)
        })
    }

    fn build(name: String, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            delay: Duration::ZERO,
            fail: false,
        }
    }
}

impl<E: Event> EventHandler<E> for RecordingHandler {
    fn handle(&self, _event: &E) -> anyhow::Result<()> {
        self.journal.record(self.name.clone());
        if self.fail {
            bail!("{} failed", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Event> AsyncEventHandler<E> for RecordingHandler {
    async fn handle(&self, _event: &E) -> anyhow::Result<()> {
        self.journal.record(format!("{} start", self.name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.journal.record(format!("{} end", self.name));
        if self.fail {
            bail!("{} failed", self.name);
        }
        Ok(())
    }
}
