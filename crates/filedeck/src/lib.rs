//! # Filedeck core
//!
//! The two coordination primitives behind the filedeck organizer: an
//! in-process event bus and a bounded undo/redo command history.
//!
//! ## Core Concepts
//!
//! Filedeck separates **facts** from **actions**:
//! - [`Event`] = Facts (a file was renamed, a watch folder changed)
//! - [`Command`] = Actions the user can take back (rename, move, delete)
//!
//! Services publish events on the [`EventBus`] and submit commands to the
//! [`CommandInvoker`]. The two do not know about each other; a host that
//! wants history changes on the bus forwards [`HistoryState`] from an
//! invoker observer.
//!
//! ## Architecture
//!
//! ```text
//! Rename / Batch / PDF / Excel services
//!     │                         │
//!     ▼ publish()               ▼ execute_command()
//! EventBus                  CommandInvoker
//!     │                         │
//!     ├─► sync handlers         ├─► undo stack (bounded, oldest evicted)
//!     │   (in order)            │
//!     └─► async handlers        └─► redo stack (dropped on new command)
//!         (serial or fan-out)         │
//!                                     ▼
//!                               on_state_changed(HistoryState)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Handlers are isolated** - A failing handler is logged, the rest still run
//! 2. **Dispatch uses a snapshot** - Concurrent (un)subscribes never disturb a publish
//! 3. **History is bounded** - `undo_count() <= max_history_size`, oldest first out
//! 4. **Commands are all-or-nothing** - A failed execute records nothing
//! 5. **New actions end the redo branch** - Executing clears the redo stack
//!
//! ## Guarantees
//!
//! - **In-memory only**: Nothing is persisted; history dies with the process
//! - **No timeouts**: A slow handler or command holds up its caller
//! - **No retries**: Failures are reported once; retry policy belongs to callers
//!
//! ## Logging
//!
//! Everything is reported through [`tracing`]. Without an installed
//! subscriber the calls are no-ops.
//!
//! ## Example
//!
//! ```ignore
//! use filedeck_core::{async_handler, ActionCommand, CommandInvoker, EventBus, HistoryConfig};
//!
//! #[derive(Debug, Clone)]
//! struct FileRenamed { from: PathBuf, to: PathBuf }
//!
//! let bus = EventBus::new();
//! bus.subscribe_fn(|e: &FileRenamed| {
//!     tracing::info!(from = ?e.from, to = ?e.to, "renamed");
//!     Ok(())
//! });
//! bus.subscribe_async(async_handler(|e: FileRenamed| async move {
//!     search_index.reindex(&e.to).await
//! }));
//!
//! let mut invoker = CommandInvoker::new(HistoryConfig::new(50))?;
//! invoker.execute_command(Box::new(
//!     ActionCommand::new("Rename scan001.pdf", move || rename(&from, &to))
//!         .with_undo(move || rename(&to2, &from2)),
//! ))?;
//! bus.publish(FileRenamed { from, to }).await?;
//!
//! invoker.undo()?;
//! ```

// Core modules
mod bus;
mod command;
mod core;
mod error;
mod handler;
mod history;


// Re-export core types
pub use crate::core::{Event, EventKey, HandlerKind, SubscriptionId};

// Re-export error types
pub use crate::error::{CommandFailed, CommandOperation, FiledeckError, Result};

// Re-export bus types
pub use bus::EventBus;
pub use handler::{async_handler, AsyncEventHandler, AsyncFnHandler, EventHandler};

// Re-export command types
pub use command::{ActionCommand, Command, CompositeCommand};

// Re-export history types
pub use history::{
    CommandInvoker, HistoryConfig, HistoryEntry, HistoryState, ObserverId,
    DEFAULT_MAX_HISTORY_SIZE,
};

// Re-export commonly used external types
pub use async_trait::async_trait;
