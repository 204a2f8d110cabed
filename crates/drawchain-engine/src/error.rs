use thiserror::Error;

use crate::config::ValueKind;

/// Error type surfaced by external commands and factories.
///
/// The drawing primitive behind [`CommandFactory`](crate::CommandFactory) is
/// a collaborator, not part of this crate, so its failures arrive boxed.
pub type CommandError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Engine errors.
///
/// Composition-time errors (`MalformedFragment`, `CycleDetected`,
/// `RepeatedComposite`, `Factory`) carry the fragment index at which the
/// misuse was observed. Runtime failures (`Stage`) propagate through the
/// executor to the caller or the completion callback; nothing is retried
/// and nothing is swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// A loose fragment value was neither a configuration map nor a command.
    #[error("fragment {index} is neither a configuration map nor a command (found {kind})")]
    MalformedFragment { index: usize, kind: ValueKind },

    /// A composite transitively contained itself.
    #[error("composite at fragment {index} transitively contains itself")]
    CycleDetected { index: usize },

    /// The same composite reference appeared more than once in one
    /// composition. Splicing consumes a reference exactly once, so a repeat
    /// has no meaningful order; it is rejected instead of silently dropped.
    #[error("composite at fragment {index} appears more than once in the composition")]
    RepeatedComposite { index: usize },

    /// The command factory refused an accumulated configuration. The stage
    /// list is left uncached; a later call recompiles from scratch.
    #[error("building the stage flushed at fragment {index} failed: {source}")]
    Factory {
        index: usize,
        #[source]
        source: CommandError,
    },

    /// A stage failed while the chain was executing.
    #[error("stage {index} failed: {source}")]
    Stage {
        index: usize,
        #[source]
        source: CommandError,
    },
}
