//! Stage compilation.
//!
//! One pass over a flattened fragment sequence turns declarative
//! configuration into the minimum number of executable stages. The
//! accumulator is threaded through as a plain value: merged, flushed,
//! reset, never shared.

use std::fmt;
use std::mem;
use std::rc::Rc;

use log::debug;

use crate::command::{Command, CommandFactory};
use crate::config::{merge, ConfigMap};
use crate::compose::{Fragment, MergePolicy};
use crate::error::Error;

/// One executable unit of a compiled chain.
pub enum CompiledStage {
    /// Freshly built from an accumulated configuration merge.
    Concrete(Rc<dyn Command>),
    /// A pre-existing command, executed as-is; its effective configuration
    /// is read back afterward.
    Opaque(Rc<dyn Command>),
}

impl CompiledStage {
    pub fn command(&self) -> &Rc<dyn Command> {
        match self {
            Self::Concrete(c) | Self::Opaque(c) => c,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }
}

impl fmt::Debug for CompiledStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(_) => f.write_str("Concrete(<command>)"),
            Self::Opaque(_) => f.write_str("Opaque(<command>)"),
        }
    }
}

/// Compiles a flattened fragment sequence into an ordered stage list.
///
/// Under [`MergePolicy::Merging`], consecutive configuration fragments
/// collapse into one concrete stage; under [`MergePolicy::Direct`], every
/// fragment becomes its own stage. An empty sequence still produces one
/// concrete no-op stage so the owning handle is always callable.
///
/// A factory failure aborts the whole pass; the caller caches nothing and
/// may retry by calling again.
pub(crate) fn compile(
    factory: &Rc<dyn CommandFactory>,
    policy: MergePolicy,
    fragments: &[Fragment],
) -> Result<Rc<[CompiledStage]>, Error> {
    let mut stages: Vec<CompiledStage> = Vec::new();
    let mut acc = ConfigMap::new();

    for (index, fragment) in fragments.iter().enumerate() {
        match fragment {
            Fragment::Config(config) => match policy {
                MergePolicy::Merging => acc = merge(&acc, config),
                MergePolicy::Direct => {
                    stages.push(build(factory, index, config.clone())?);
                }
            },
            Fragment::Callable(command) => {
                if !acc.is_empty() {
                    stages.push(build(factory, index, mem::take(&mut acc))?);
                }
                stages.push(CompiledStage::Opaque(Rc::clone(command)));
            }
        }
    }

    if !acc.is_empty() {
        stages.push(build(factory, fragments.len(), acc)?);
    }
    if stages.is_empty() {
        stages.push(build(factory, 0, ConfigMap::new())?);
    }

    debug!(
        "compiled {} fragments into {} stages ({:?})",
        fragments.len(),
        stages.len(),
        policy
    );
    Ok(stages.into())
}

fn build(
    factory: &Rc<dyn CommandFactory>,
    index: usize,
    config: ConfigMap,
) -> Result<CompiledStage, Error> {
    let command = factory
        .build(config)
        .map_err(|source| Error::Factory { index, source })?;
    Ok(CompiledStage::Concrete(command))
}
