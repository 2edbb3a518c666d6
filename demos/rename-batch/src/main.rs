//! # Rename Batch Demo
//!
//! Renames a handful of files as one undoable batch, publishes what
//! happened on the event bus, then undoes and redoes the batch.
//!
//! Run with `RUST_LOG=debug` to see the bus and history internals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use filedeck_core::{
    async_handler, Command, CommandInvoker, CompositeCommand, EventBus, HistoryConfig,
    HistoryState,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ============================================================================
// Events (Facts)
// ============================================================================

#[derive(Debug, Clone)]
struct FileRenamed {
    from: PathBuf,
    to: PathBuf,
}

#[derive(Debug, Clone)]
struct BatchFinished {
    description: String,
    files: usize,
}

// ============================================================================
// Commands (Undoable actions)
// ============================================================================

struct RenameFile {
    from: PathBuf,
    to: PathBuf,
    description: String,
}

impl RenameFile {
    fn new(from: PathBuf, to: PathBuf) -> Self {
        let description = format!("Rename {} to {}", file_name(&from), file_name(&to));
        Self {
            from,
            to,
            description,
        }
    }
}

impl Command for RenameFile {
    fn execute(&mut self) -> Result<()> {
        if self.to.exists() {
            anyhow::bail!("{} already exists", self.to.display());
        }
        std::fs::rename(&self.from, &self.to)
            .with_context(|| format!("renaming {}", self.from.display()))
    }

    fn undo(&mut self) -> Result<()> {
        std::fs::rename(&self.to, &self.from)
            .with_context(|| format!("restoring {}", self.from.display()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let workdir = std::env::temp_dir().join(format!("filedeck-demo-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&workdir)?;
    let originals = ["scan001.pdf", "scan002.pdf", "scan003.pdf"];
    for name in originals {
        std::fs::write(workdir.join(name), name)?;
    }

    // Subscribers
    let bus = EventBus::new();
    bus.subscribe_fn(|event: &FileRenamed| {
        info!(from = %event.from.display(), to = %event.to.display(), "file renamed");
        Ok(())
    });
    bus.subscribe_async(async_handler(|event: BatchFinished| async move {
        // Stand-in for refreshing a search index.
        tokio::time::sleep(Duration::from_millis(20)).await;
        info!(batch = %event.description, files = event.files, "index refreshed");
        anyhow::Ok(())
    }));
    bus.subscribe_fn(|state: &HistoryState| {
        info!(
            can_undo = state.can_undo(),
            can_redo = state.can_redo(),
            "history changed"
        );
        Ok(())
    });

    // History changes are forwarded onto the bus by a relay task.
    let (history_tx, mut history_rx) = mpsc::unbounded_channel();
    let relay_bus = bus.clone();
    let relay = tokio::spawn(async move {
        while let Some(state) = history_rx.recv().await {
            relay_bus.publish::<HistoryState>(state).await?;
        }
        anyhow::Ok(())
    });

    let mut invoker = CommandInvoker::new(HistoryConfig::new(20))?;
    invoker.on_state_changed(move |state| {
        let _ = history_tx.send(state);
    });

    // Build the batch
    let mut renames = Vec::new();
    let mut batch = CompositeCommand::new(format!("Rename {} invoices", originals.len()));
    for (i, name) in originals.iter().enumerate() {
        let from = workdir.join(name);
        let to = workdir.join(format!("invoice-2024-{:02}.pdf", i + 1));
        renames.push(FileRenamed {
            from: from.clone(),
            to: to.clone(),
        });
        batch.push(Box::new(RenameFile::new(from, to)));
    }
    let description = batch.description().to_string();

    invoker.execute_command(Box::new(batch))?;
    for renamed in renames {
        bus.publish(renamed).await?;
    }
    bus.publish_concurrent(BatchFinished {
        description,
        files: originals.len(),
    })
    .await?;

    if let Some(undone) = invoker.undo()? {
        info!(command = %undone, "undone");
    }
    if let Some(redone) = invoker.redo()? {
        info!(command = %redone, "redone");
    }

    for entry in invoker.history() {
        info!(
            command = %entry.description,
            at = %entry.recorded_at,
            "history entry"
        );
    }

    drop(invoker);
    relay.await??;
    std::fs::remove_dir_all(&workdir)?;

    println!("Batch renamed, undone and redone in {}", workdir.display());
    Ok(())
}
