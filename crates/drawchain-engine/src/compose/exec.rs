//! Trampoline executor.
//!
//! A chain is re-driven every rendering frame, so the executor may not
//! recurse once per stage: ten thousand stages must cost ten thousand loop
//! iterations, not ten thousand stack frames. The driver loop below runs
//! stages in order; each stage receives a boxed continuation, and the loop
//! only advances when that continuation has fired.
//!
//! Synchronous stages fire the continuation before returning, which sets the
//! `advanced` flag and keeps the loop spinning in the same tick. A deferred
//! stage leaves the flag clear; the loop parks, and the continuation — fired
//! later by the embedding scheduler — re-enters [`Execution::drive`] to
//! resume where the chain left off.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::trace;

use crate::command::Done;
use crate::compose::compile::CompiledStage;
use crate::config::{merge, ConfigMap};
use crate::error::Error;

/// Completion callback for one invocation of a composite handle.
///
/// Receives the final effective context, or the first stage failure.
/// Invoked exactly once per invocation.
pub type DoneFn = Box<dyn FnOnce(Result<ConfigMap, Error>)>;

/// Runs `stages` in order, starting from `context`, and fires `done` once.
pub(crate) fn execute(
    stages: Rc<[CompiledStage]>,
    context: ConfigMap,
    args: ConfigMap,
    done: DoneFn,
) {
    let execution = Rc::new(Execution {
        stages,
        args,
        context: RefCell::new(context),
        index: Cell::new(0),
        driving: Cell::new(false),
        advanced: Cell::new(false),
        done: RefCell::new(Some(done)),
    });
    execution.drive();
}

/// Per-invocation state machine. Single-threaded by construction; a handle
/// must not be re-entered while an invocation is in flight (caller's
/// obligation, see the crate docs), but each invocation owns one of these,
/// so overlapping invocations at least cannot corrupt each other.
struct Execution {
    stages: Rc<[CompiledStage]>,
    args: ConfigMap,
    /// Running effective context, grown after every stage completes.
    context: RefCell<ConfigMap>,
    index: Cell<usize>,
    /// True while the driver loop is on the stack.
    driving: Cell<bool>,
    /// Set by a continuation that fired synchronously within the loop.
    advanced: Cell<bool>,
    done: RefCell<Option<DoneFn>>,
}

impl Execution {
    fn drive(self: Rc<Self>) {
        self.driving.set(true);
        loop {
            let index = self.index.get();
            if index >= self.stages.len() {
                let context = self.context.borrow().clone();
                self.finish(Ok(context));
                break;
            }

            self.advanced.set(false);
            let continuation: Done = {
                let execution = Rc::clone(&self);
                Box::new(move |result| execution.complete(index, result))
            };
            let context = self.context.borrow().clone();
            trace!("stage {index} starting");
            self.stages[index].command().run(&context, &self.args, continuation);

            if !self.advanced.get() {
                // Deferred, or failed; in either case the loop is done for
                // this tick. A deferred continuation resumes via drive().
                break;
            }
        }
        self.driving.set(false);
    }

    /// Continuation target for stage `index`.
    fn complete(self: Rc<Self>, index: usize, result: Result<(), crate::error::CommandError>) {
        if let Err(source) = result {
            self.index.set(self.stages.len());
            self.finish(Err(Error::Stage { index, source }));
            return;
        }

        // Context bridge: fold the stage's effective configuration into the
        // running context so later stages observe what this one set.
        let effective = self.stages[index].command().effective_config();
        let folded = merge(&self.context.borrow(), &effective);
        *self.context.borrow_mut() = folded;
        self.index.set(index + 1);

        if self.driving.get() {
            self.advanced.set(true);
        } else {
            trace!("stage {index} completed deferred; resuming chain");
            self.drive();
        }
    }

    fn finish(&self, result: Result<ConfigMap, Error>) {
        if let Some(done) = self.done.borrow_mut().take() {
            done(result);
        }
    }
}
