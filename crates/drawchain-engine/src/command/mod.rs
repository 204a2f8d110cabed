//! The command contract: the seam between this crate and the GPU drawing
//! primitive that actually owns pipelines, buffers, and rasterization.
//!
//! The engine never talks to a GPU. It builds [`Command`]s through a
//! [`CommandFactory`], orders them, and drives them; everything below that
//! line belongs to the embedder.

pub mod software;

use std::rc::Rc;

use crate::compose::Fragment;
use crate::config::ConfigMap;
use crate::error::CommandError;

/// Completion continuation handed to [`Command::run`].
pub type Done = Box<dyn FnOnce(Result<(), CommandError>)>;

/// An executable draw command.
pub trait Command {
    /// Runs the command against the ambient `context` (effective
    /// configuration accumulated by earlier stages in a chain) and the
    /// per-invocation `args`.
    ///
    /// `done` must be invoked exactly once: before `run` returns for a
    /// synchronous command, or later from the embedding scheduler for a
    /// command that defers (e.g. waits on an asynchronous resource).
    fn run(&self, context: &ConfigMap, args: &ConfigMap, done: Done);

    /// The resolved configuration this command was built with, updated by
    /// its most recent invocation.
    ///
    /// The executor reads this after every stage and folds it into the
    /// running context, so configuration declared after an opaque command
    /// can override values that command set.
    fn effective_config(&self) -> ConfigMap;

    /// Composite marker. A command produced by composition reports its
    /// flattened fragment list here so an enclosing composition can splice
    /// it in place; plain commands stay opaque.
    fn fragments(&self) -> Option<&[Fragment]> {
        None
    }
}

/// Builds a [`Command`] from a fully merged configuration map.
///
/// An empty configuration must build a valid no-op command.
pub trait CommandFactory {
    fn build(&self, config: ConfigMap) -> Result<Rc<dyn Command>, CommandError>;
}
