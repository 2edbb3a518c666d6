//! Bounded undo/redo history.
//!
//! The [`CommandInvoker`] owns every command it has executed. Commands live
//! in two stacks:
//!
//! ```text
//! execute(c4)
//!   undo: [c1, c2, c3, c4]   redo: []
//! undo() x2
//!   undo: [c1, c2]           redo: [c4, c3]
//! execute(c5)                 <- new branch, redo is dropped
//!   undo: [c1, c2, c5]       redo: []
//! ```
//!
//! # Invariants
//!
//! 1. `undo_count() <= max_history_size` after every operation; the oldest
//!    entry is evicted first
//! 2. A successful `execute_command` empties the redo stack
//! 3. A command that fails to execute is never pushed
//! 4. A command that fails to undo or redo is dropped from history, not
//!    restored
//!
//! The invoker has no internal locking. Callers sharing one across threads
//! must serialize access themselves (a single coordinating task, or a
//! mutex around the invoker).

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::command::Command;
use crate::error::{CommandFailed, CommandOperation, FiledeckError, Result};

pub const DEFAULT_MAX_HISTORY_SIZE: usize = 100;

/// History settings, loadable from the application's config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of commands kept for undo.
    pub max_history_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
        }
    }
}

impl HistoryConfig {
    pub fn new(max_history_size: usize) -> Self {
        Self { max_history_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_history_size == 0 {
            return Err(FiledeckError::InvalidArgument(
                "max_history_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Undo/redo counts after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryState {
    pub undo_count: usize,
    pub redo_count: usize,
}

impl HistoryState {
    pub fn can_undo(&self) -> bool {
        self.undo_count > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_count > 0
    }
}

/// A command as shown in a history panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub description: String,
    /// When the command last entered the undo stack.
    pub recorded_at: DateTime<Utc>,
}

struct Recorded {
    command: Box<dyn Command>,
    recorded_at: DateTime<Utc>,
}

impl Recorded {
    fn new(command: Box<dyn Command>) -> Self {
        Self {
            command,
            recorded_at: Utc::now(),
        }
    }

    fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            description: self.command.description().to_string(),
            recorded_at: self.recorded_at,
        }
    }
}

type StateObserver = Box<dyn Fn(HistoryState) + Send + Sync>;

/// Handle returned by [`CommandInvoker::on_state_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Executes commands and tracks them for undo and redo.
pub struct CommandInvoker {
    /// Newest at the back.
    undo_stack: VecDeque<Recorded>,
    /// Newest at the back.
    redo_stack: Vec<Box<dyn Command>>,
    config: HistoryConfig,
    observers: Vec<(ObserverId, StateObserver)>,
    next_observer: u64,
}

impl fmt::Debug for CommandInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvoker")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for CommandInvoker {
    fn default() -> Self {
        Self::with_config(HistoryConfig::default())
    }
}

impl CommandInvoker {
    /// Create an invoker, rejecting a zero-sized history.
    pub fn new(config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(config.max_history_size.min(64)),
            redo_stack: Vec::new(),
            config,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Register a callback run after every operation that can change the
    /// undo/redo counts.
    pub fn on_state_changed<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(HistoryState) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Stop notifying the observer registered as `id`. Returns `false` if it
    /// was already removed.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(registered, _)| *registered != id);
        self.observers.len() != before
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Execute `command` and record it.
    ///
    /// On failure nothing is recorded, the redo stack is kept, and the error
    /// is returned.
    pub fn execute_command(&mut self, mut command: Box<dyn Command>) -> Result<()> {
        if let Err(source) = command.execute() {
            return Err(Self::failed(CommandOperation::Execute, &*command, source));
        }

        debug!(command = command.description(), "executed");
        self.redo_stack.clear();
        self.undo_stack.push_back(Recorded::new(command));
        self.evict_overflow();
        self.notify();
        Ok(())
    }

    /// Undo the most recent command.
    ///
    /// Returns `Ok(None)` when there is nothing to undo, otherwise the
    /// description of the undone command. A command whose undo fails is
    /// dropped from history.
    pub fn undo(&mut self) -> Result<Option<String>> {
        let Some(Recorded { mut command, .. }) = self.undo_stack.pop_back() else {
            return Ok(None);
        };

        if let Err(source) = command.undo() {
            let err = Self::failed(CommandOperation::Undo, &*command, source);
            self.notify();
            return Err(err);
        }

        let description = command.description().to_string();
        debug!(command = %description, "undone");
        self.redo_stack.push(command);
        self.notify();
        Ok(Some(description))
    }

    /// Re-execute the most recently undone command.
    ///
    /// Mirrors [`undo`](Self::undo): `Ok(None)` when there is nothing to
    /// redo, and a command whose execute fails is dropped.
    pub fn redo(&mut self) -> Result<Option<String>> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(None);
        };

        if let Err(source) = command.execute() {
            let err = Self::failed(CommandOperation::Redo, &*command, source);
            self.notify();
            return Err(err);
        }

        let description = command.description().to_string();
        debug!(command = %description, "redone");
        self.undo_stack.push_back(Recorded::new(command));
        self.evict_overflow();
        self.notify();
        Ok(Some(description))
    }

    /// Forget all history without running any command.
    pub fn clear_history(&mut self) {
        let dropped = self.undo_stack.len() + self.redo_stack.len();
        self.undo_stack.clear();
        self.redo_stack.clear();
        info!(dropped, "history cleared");
        self.notify();
    }

    // ========================================================================
    // Info
    // ========================================================================

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn state(&self) -> HistoryState {
        HistoryState {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
        }
    }

    /// Descriptions of undoable commands, most recent first.
    pub fn undo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|recorded| recorded.command.description())
            .collect()
    }

    /// Descriptions of redoable commands, most recent first.
    pub fn redo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.redo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|command| command.description())
            .collect()
    }

    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo_stack
            .back()
            .map(|recorded| recorded.command.description())
    }

    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|command| command.description())
    }

    /// Undo history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.undo_stack.iter().map(Recorded::entry).collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn evict_overflow(&mut self) {
        while self.undo_stack.len() > self.config.max_history_size {
            if let Some(evicted) = self.undo_stack.pop_front() {
                debug!(
                    command = evicted.command.description(),
                    max_history_size = self.config.max_history_size,
                    "evicted oldest history entry"
                );
            }
        }
    }

    fn failed(
        operation: CommandOperation,
        command: &dyn Command,
        source: anyhow::Error,
    ) -> FiledeckError {
        let failed = CommandFailed::new(operation, command.description(), source);
        error!(
            operation = %operation,
            command = command.description(),
            error = %failed,
            "command failed"
        );
        failed.into()
    }

    fn notify(&self) {
        let state = self.state();
        for (_, observer) in &self.observers {
            observer(state);
        }
    }
}
