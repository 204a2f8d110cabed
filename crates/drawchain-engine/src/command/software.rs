//! Software command factory.
//!
//! A deterministic, GPU-free implementation of the [`Command`] contract.
//! Each built command records its build configuration, resolves dynamic
//! values per invocation, and appends to a shared trace. Used by the test
//! suite and by the studio demo; also a reference for what a real backend
//! must provide.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::command::{Command, CommandFactory, Done};
use crate::config::ConfigMap;
use crate::error::CommandError;

/// One entry in the factory's shared trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A command was built. `keys` are the top-level configuration keys.
    Built { id: usize, keys: Vec<String> },
    /// A command ran to completion.
    Ran { id: usize },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built { id, keys } => write!(f, "built #{id} [{}]", keys.join(", ")),
            Self::Ran { id } => write!(f, "ran   #{id}"),
        }
    }
}

/// In-process [`CommandFactory`] that builds [`SoftwareCommand`]s.
#[derive(Default)]
pub struct SoftwareFactory {
    built: Cell<usize>,
    trace: Rc<RefCell<Vec<TraceEvent>>>,
}

impl SoftwareFactory {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of commands built so far. The compile-once guarantee is
    /// observable here: re-invoking a handle must not move this counter.
    pub fn build_count(&self) -> usize {
        self.built.get()
    }

    /// Snapshot of the build/run trace.
    pub fn trace(&self) -> Vec<TraceEvent> {
        self.trace.borrow().clone()
    }
}

impl CommandFactory for SoftwareFactory {
    fn build(&self, config: ConfigMap) -> Result<Rc<dyn Command>, CommandError> {
        let id = self.built.get();
        self.built.set(id + 1);
        let keys = config.iter().map(|(k, _)| k.to_owned()).collect();
        self.trace.borrow_mut().push(TraceEvent::Built { id, keys });
        Ok(Rc::new(SoftwareCommand {
            id,
            config: config.clone(),
            resolved: RefCell::new(config),
            trace: Rc::clone(&self.trace),
        }))
    }
}

/// A recorded, synchronously completing command.
pub struct SoftwareCommand {
    id: usize,
    config: ConfigMap,
    resolved: RefCell<ConfigMap>,
    trace: Rc<RefCell<Vec<TraceEvent>>>,
}

impl Command for SoftwareCommand {
    fn run(&self, context: &ConfigMap, args: &ConfigMap, done: Done) {
        let resolved = self.config.resolve(context, args);
        trace!("software command #{} ran ({} keys)", self.id, resolved.len());
        *self.resolved.borrow_mut() = resolved;
        self.trace.borrow_mut().push(TraceEvent::Ran { id: self.id });
        done(Ok(()));
    }

    fn effective_config(&self) -> ConfigMap {
        self.resolved.borrow().clone()
    }
}
