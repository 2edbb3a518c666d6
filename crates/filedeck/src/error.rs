//! Error types for the event bus and the command history.
//!
//! Failures fall into two camps:
//!
//! - **Isolated**: an event handler returning an error or panicking. The bus
//!   logs a [`FiledeckError::HandlerFailed`] and keeps dispatching; the
//!   publisher never sees it.
//! - **Propagated**: a command failing to execute, undo or redo. The invoker
//!   keeps its own bookkeeping consistent and hands the failure back as
//!   [`FiledeckError::CommandFailed`] so the caller can show a message.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by filedeck.
#[derive(Debug, Error)]
pub enum FiledeckError {
    /// A caller passed a value the core cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command failed during execute, undo or redo.
    #[error(transparent)]
    CommandFailed(#[from] CommandFailed),

    /// An event handler failed. Only ever logged by the bus.
    #[error("handler {subscription_id} for {event_type} failed: {reason}")]
    HandlerFailed {
        event_type: &'static str,
        subscription_id: Uuid,
        reason: String,
    },

    /// The dispatch machinery itself is in an unexpected state.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl FiledeckError {
    /// Returns the command failure, if this is one.
    pub fn as_command_failed(&self) -> Option<&CommandFailed> {
        match self {
            Self::CommandFailed(failed) => Some(failed),
            _ => None,
        }
    }
}

/// Which command capability was being invoked when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOperation {
    Execute,
    Undo,
    Redo,
}

impl fmt::Display for CommandOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Execute => "execute",
            Self::Undo => "undo",
            Self::Redo => "redo",
        };
        f.write_str(name)
    }
}

/// A command's forward or reverse action failed.
///
/// Carries the command's description so the caller can present
/// "Could not undo 'Rename 3 files'" without holding on to the command.
#[derive(Debug, Error)]
#[error("{operation} of '{description}' failed: {source}")]
pub struct CommandFailed {
    pub operation: CommandOperation,
    pub description: String,
    #[source]
    pub source: anyhow::Error,
}

impl CommandFailed {
    pub fn new(
        operation: CommandOperation,
        description: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self {
            operation,
            description: description.into(),
            source,
        }
    }
}

pub type Result<T, E = FiledeckError> = std::result::Result<T, E>;
