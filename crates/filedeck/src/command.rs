//! Reversible commands.
//!
//! A [`Command`] is an action the invoker can replay and reverse:
//!
//! - `execute()` followed by `undo()` restores the prior state
//! - `execute()` may be called again after `undo()` (redo) and must have the
//!   same observable effect as the first call
//!
//! Two building blocks ship with the crate: [`CompositeCommand`] groups
//! several commands into one history entry, and [`ActionCommand`] wraps a
//! pair of closures.

use std::fmt;

use tracing::warn;

/// A reversible action with a human-readable label.
pub trait Command: Send {
    /// Perform the forward action.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Reverse the effect of the most recent `execute()`.
    fn undo(&mut self) -> anyhow::Result<()>;

    /// Stable label for history display, e.g. "Rename 12 files".
    fn description(&self) -> &str;
}

impl fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("description", &self.description())
            .finish()
    }
}

impl<C: Command + ?Sized> Command for Box<C> {
    fn execute(&mut self) -> anyhow::Result<()> {
        (**self).execute()
    }

    fn undo(&mut self) -> anyhow::Result<()> {
        (**self).undo()
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Several commands executed and undone as a single history entry.
///
/// Children execute in insertion order. If one fails, the children that
/// already ran are undone in reverse order and the failure is returned, so
/// a half-applied batch never reaches the history. Undo always walks every
/// child in reverse order.
pub struct CompositeCommand {
    description: String,
    children: Vec<Box<dyn Command>>,
}

impl fmt::Debug for CompositeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeCommand")
            .field("description", &self.description)
            .field("children", &self.children.len())
            .finish()
    }
}

impl CompositeCommand {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            children: Vec::new(),
        }
    }

    /// Append a child, builder style.
    #[must_use]
    pub fn with(mut self, child: impl Command + 'static) -> Self {
        self.push(Box::new(child));
        self
    }

    pub fn push(&mut self, child: Box<dyn Command>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn rollback(&mut self, executed: usize) {
        for child in self.children[..executed].iter_mut().rev() {
            if let Err(err) = child.undo() {
                let reason = format!("{err:#}");
                warn!(
                    composite = %self.description,
                    child = child.description(),
                    error = %reason,
                    "rollback of child command failed"
                );
            }
        }
    }
}

impl Command for CompositeCommand {
    fn execute(&mut self) -> anyhow::Result<()> {
        for index in 0..self.children.len() {
            if let Err(err) = self.children[index].execute() {
                self.rollback(index);
                return Err(err.context(format!(
                    "step {} of {} ('{}') failed",
                    index + 1,
                    self.children.len(),
                    self.children[index].description()
                )));
            }
        }
        Ok(())
    }

    fn undo(&mut self) -> anyhow::Result<()> {
        for child in self.children.iter_mut().rev() {
            child.undo()?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

type Action = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// A command built from closures.
///
/// Without an undo closure, `undo()` succeeds without doing anything; the
/// entry still occupies one history slot and moves between the stacks like
/// any other command.
pub struct ActionCommand {
    description: String,
    forward: Action,
    reverse: Option<Action>,
}

impl fmt::Debug for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCommand")
            .field("description", &self.description)
            .field("has_undo", &self.reverse.is_some())
            .finish()
    }
}

impl ActionCommand {
    pub fn new<F>(description: impl Into<String>, forward: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            description: description.into(),
            forward: Box::new(forward),
            reverse: None,
        }
    }

    #[must_use]
    pub fn with_undo<F>(mut self, reverse: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.reverse = Some(Box::new(reverse));
        self
    }

    pub fn is_reversible(&self) -> bool {
        self.reverse.is_some()
    }
}

impl Command for ActionCommand {
    fn execute(&mut self) -> anyhow::Result<()> {
        (self.forward)()
    }

    fn undo(&mut self) -> anyhow::Result<()> {
        match self.reverse.as_mut() {
            Some(reverse) => reverse(),
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}
