//! Composition: fragments in, one reusable command out.
//!
//! [`compose_merging`] is the normal entry point; it collapses runs of
//! adjacent configuration fragments into single stages. [`compose_direct`]
//! keeps one stage per fragment for embedders that want the declared
//! structure preserved verbatim.
//!
//! The produced [`CompositeHandle`] implements [`Command`], so a composition
//! is itself a valid fragment of a larger composition. Nesting is resolved
//! by splicing at construction time; nothing recurses at run time.

mod compile;
mod exec;
mod flatten;

pub use compile::CompiledStage;
pub use exec::DoneFn;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::command::{Command, CommandFactory, Done};
use crate::config::{ConfigMap, ConfigValue};
use crate::error::Error;

/// One declared piece of composition input.
#[derive(Clone)]
pub enum Fragment {
    /// A plain configuration map, merged with its neighbors at compile time.
    Config(ConfigMap),
    /// An already-built command, kept opaque — unless it is itself a
    /// composite, in which case it is spliced in place.
    Callable(Rc<dyn Command>),
}

impl Fragment {
    /// Converts a loose value list into fragments, the shape composition
    /// input takes when it arrives from data rather than from code.
    ///
    /// Any element that is not a configuration map fails with
    /// [`Error::MalformedFragment`] naming its index and observed kind;
    /// silently dropping it would surface as a rendering bug with no trail
    /// back to the composition site.
    pub fn try_from_values(values: Vec<ConfigValue>) -> Result<Vec<Fragment>, Error> {
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| match value {
                ConfigValue::Map(map) => Ok(Fragment::Config(map)),
                other => Err(Error::MalformedFragment {
                    index,
                    kind: other.kind(),
                }),
            })
            .collect()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(map) => f.debug_tuple("Config").field(map).finish(),
            Self::Callable(cmd) if cmd.fragments().is_some() => f.write_str("Callable(<composite>)"),
            Self::Callable(_) => f.write_str("Callable(<command>)"),
        }
    }
}

impl From<ConfigMap> for Fragment {
    fn from(map: ConfigMap) -> Self {
        Self::Config(map)
    }
}

impl From<Rc<dyn Command>> for Fragment {
    fn from(command: Rc<dyn Command>) -> Self {
        Self::Callable(command)
    }
}

impl<C: Command + 'static> From<Rc<C>> for Fragment {
    fn from(command: Rc<C>) -> Self {
        Self::Callable(command)
    }
}

/// How configuration fragments map onto stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// One stage per declared fragment, no cross-fragment merging.
    Direct,
    /// Adjacent configuration fragments collapse into one stage.
    Merging,
}

/// Composes `fragments` with one stage per fragment.
pub fn compose_direct(
    factory: Rc<dyn CommandFactory>,
    fragments: Vec<Fragment>,
) -> Result<Rc<CompositeHandle>, Error> {
    CompositeHandle::new(factory, MergePolicy::Direct, fragments)
}

/// Composes `fragments`, merging adjacent configuration fragments into the
/// minimum number of stages.
pub fn compose_merging(
    factory: Rc<dyn CommandFactory>,
    fragments: Vec<Fragment>,
) -> Result<Rc<CompositeHandle>, Error> {
    CompositeHandle::new(factory, MergePolicy::Merging, fragments)
}

/// A composed, reusable draw command.
///
/// Construction flattens nesting eagerly (so cycle and repeat misuse fails
/// at the composition site); the stage list is compiled lazily on first
/// invocation and cached for the handle's lifetime. Once compiled, the stage
/// structure never changes — only runtime arguments vary.
///
/// A handle must not be invoked again while a previous invocation on it is
/// still parked inside a deferred stage; the engine does no locking or
/// queuing on the caller's behalf.
pub struct CompositeHandle {
    factory: Rc<dyn CommandFactory>,
    policy: MergePolicy,
    fragments: Vec<Fragment>,
    stages: RefCell<Option<Rc<[CompiledStage]>>>,
    last_context: Rc<RefCell<ConfigMap>>,
}

impl CompositeHandle {
    fn new(
        factory: Rc<dyn CommandFactory>,
        policy: MergePolicy,
        fragments: Vec<Fragment>,
    ) -> Result<Rc<Self>, Error> {
        let fragments = flatten::flatten(&fragments)?;
        Ok(Rc::new(Self {
            factory,
            policy,
            fragments,
            stages: RefCell::new(None),
            last_context: Rc::new(RefCell::new(ConfigMap::new())),
        }))
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// The flattened fragment sequence this handle was composed from.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The compiled stage list, compiling it now if this is the first use.
    pub fn stages(&self) -> Result<Rc<[CompiledStage]>, Error> {
        if let Some(stages) = self.stages.borrow().as_ref() {
            return Ok(Rc::clone(stages));
        }
        let stages = compile::compile(&self.factory, self.policy, &self.fragments)?;
        *self.stages.borrow_mut() = Some(Rc::clone(&stages));
        Ok(stages)
    }

    pub fn stage_count(&self) -> Result<usize, Error> {
        Ok(self.stages()?.len())
    }

    /// Runs the chain to completion and fires `done` exactly once with the
    /// final effective context (or the first stage failure).
    ///
    /// Returns an error without invoking `done` only if lazy compilation
    /// fails; that is a composition-site problem, not a stage failure.
    pub fn call_with(&self, args: ConfigMap, done: DoneFn) -> Result<(), Error> {
        let stages = self.stages()?;
        let last_context = Rc::clone(&self.last_context);
        exec::execute(
            stages,
            ConfigMap::new(),
            args,
            Box::new(move |result| {
                if let Ok(context) = &result {
                    *last_context.borrow_mut() = context.clone();
                }
                done(result);
            }),
        );
        Ok(())
    }

    /// Convenience wrapper for all-synchronous chains.
    ///
    /// Returns `Some(final_context)` when every stage completed before this
    /// call returned, or `None` when a stage deferred — in which case the
    /// completion is unobservable here and [`call_with`](Self::call_with)
    /// should have been used instead.
    pub fn call(&self, args: ConfigMap) -> Result<Option<ConfigMap>, Error> {
        let outcome = Rc::new(RefCell::new(None));
        let capture = Rc::clone(&outcome);
        self.call_with(args, Box::new(move |result| *capture.borrow_mut() = Some(result)))?;
        match outcome.borrow_mut().take() {
            Some(Ok(context)) => Ok(Some(context)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for CompositeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeHandle")
            .field("policy", &self.policy)
            .field("fragments", &self.fragments)
            .field("compiled", &self.stages.borrow().is_some())
            .finish()
    }
}

impl Command for CompositeHandle {
    fn run(&self, context: &ConfigMap, args: &ConfigMap, done: Done) {
        let stages = match self.stages() {
            Ok(stages) => stages,
            Err(err) => return done(Err(err.into())),
        };
        let last_context = Rc::clone(&self.last_context);
        exec::execute(
            stages,
            context.clone(),
            args.clone(),
            Box::new(move |result| match result {
                Ok(context) => {
                    *last_context.borrow_mut() = context;
                    done(Ok(()));
                }
                Err(err) => done(Err(err.into())),
            }),
        );
    }

    /// Final effective context of the most recent completed invocation.
    fn effective_config(&self) -> ConfigMap {
        self.last_context.borrow().clone()
    }

    fn fragments(&self) -> Option<&[Fragment]> {
        Some(&self.fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::software::{SoftwareFactory, TraceEvent};
    use crate::config::keys;
    use std::cell::Cell;

    fn cfg(key: &str, value: i64) -> Fragment {
        Fragment::Config(ConfigMap::new().with(key, value))
    }

    // ── composition surface ──────────────────────────────────────────────

    #[test]
    fn merging_and_direct_stage_counts() {
        let fragments = || {
            let factory = SoftwareFactory::new();
            let inner = factory.build(ConfigMap::new()).unwrap();
            vec![cfg("a", 1), cfg("b", 2), Fragment::Callable(inner), cfg("c", 3)]
        };

        let merged = compose_merging(SoftwareFactory::new(), fragments()).unwrap();
        assert_eq!(merged.policy(), MergePolicy::Merging);
        assert_eq!(merged.stage_count().unwrap(), 3);

        let direct = compose_direct(SoftwareFactory::new(), fragments()).unwrap();
        assert_eq!(direct.policy(), MergePolicy::Direct);
        assert_eq!(direct.stage_count().unwrap(), 4);
    }

    #[test]
    fn handle_debug_reports_compile_state() {
        let handle = compose_merging(SoftwareFactory::new(), vec![cfg("a", 1)]).unwrap();
        assert!(format!("{handle:?}").contains("compiled: false"));
        handle.call(ConfigMap::new()).unwrap();
        assert!(format!("{handle:?}").contains("compiled: true"));
    }

    #[test]
    fn compile_happens_once() {
        let factory = SoftwareFactory::new();
        let handle = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![cfg("a", 1), cfg("b", 2)],
        )
        .unwrap();

        handle.call(ConfigMap::new()).unwrap();
        let after_first = factory.build_count();
        handle.call(ConfigMap::new()).unwrap();
        handle.call(ConfigMap::new()).unwrap();
        assert_eq!(factory.build_count(), after_first);
    }

    #[test]
    fn empty_composition_is_callable() {
        let handle = compose_merging(SoftwareFactory::new(), vec![]).unwrap();
        assert_eq!(handle.stage_count().unwrap(), 1);
        let context = handle.call(ConfigMap::new()).unwrap().unwrap();
        assert!(context.is_empty());
    }

    #[test]
    fn malformed_loose_value_names_its_index() {
        let values = vec![
            ConfigValue::Map(ConfigMap::new().with("a", 1)),
            ConfigValue::Int(42),
            ConfigValue::Map(ConfigMap::new().with("b", 2)),
        ];
        let err = Fragment::try_from_values(values).unwrap_err();
        match err {
            Error::MalformedFragment { index, kind } => {
                assert_eq!(index, 1);
                assert_eq!(kind, crate::config::ValueKind::Int);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── nesting ──────────────────────────────────────────────────────────

    #[test]
    fn nested_composite_splices_into_parent() {
        let factory = SoftwareFactory::new();
        let camera = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![cfg("view", 1), cfg("projection", 2)],
        )
        .unwrap();

        let scene = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![cfg("model", 3), Fragment::from(camera), cfg("count", 6)],
        )
        .unwrap();

        // All four config fragments are adjacent after splicing.
        assert_eq!(scene.fragments().len(), 4);
        assert_eq!(scene.stage_count().unwrap(), 1);

        let context = scene.call(ConfigMap::new()).unwrap().unwrap();
        assert_eq!(context.get("view").unwrap().as_int(), Some(1));
        assert_eq!(context.get("count").unwrap().as_int(), Some(6));
    }

    #[test]
    fn repeated_nested_handle_is_rejected() {
        let factory = SoftwareFactory::new();
        let shared = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![cfg("s", 1)],
        )
        .unwrap();

        let err = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![
                Fragment::from(Rc::clone(&shared)),
                Fragment::from(shared),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::RepeatedComposite { index: 1 }));
    }

    // ── execution ────────────────────────────────────────────────────────

    #[test]
    fn later_fragments_override_across_an_opaque_stage() {
        let factory = SoftwareFactory::new();
        let opaque = factory
            .build(ConfigMap::new().uniform("color", 1).uniform("scale", 2))
            .unwrap();

        let handle = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![Fragment::Callable(opaque), Fragment::Config(ConfigMap::new().uniform("color", 9))],
        )
        .unwrap();

        let context = handle.call(ConfigMap::new()).unwrap().unwrap();
        let uniforms = context.group(keys::UNIFORMS).unwrap();
        assert_eq!(uniforms.get("color").unwrap().as_int(), Some(9));
        assert_eq!(uniforms.get("scale").unwrap().as_int(), Some(2));
    }

    #[test]
    fn stages_run_in_declaration_order() {
        let factory = SoftwareFactory::new();
        let a = factory.build(ConfigMap::new().with("a", 1)).unwrap();
        let b = factory.build(ConfigMap::new().with("b", 2)).unwrap();
        let handle = compose_merging(
            Rc::clone(&factory) as Rc<dyn CommandFactory>,
            vec![Fragment::Callable(a), cfg("mid", 0), Fragment::Callable(b)],
        )
        .unwrap();
        handle.call(ConfigMap::new()).unwrap().unwrap();

        let ran: Vec<_> = factory
            .trace()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::Ran { id } => Some(id),
                _ => None,
            })
            .collect();
        // opaque a, then the flushed mid stage (built last, id 2), then opaque b
        assert_eq!(ran, vec![0, 2, 1]);
    }

    #[test]
    fn long_synchronous_chain_completes() {
        let fragments: Vec<Fragment> = (0..10_000)
            .map(|i| Fragment::Config(ConfigMap::new().with("i", i)))
            .collect();
        let handle = compose_direct(SoftwareFactory::new(), fragments).unwrap();
        assert_eq!(handle.stage_count().unwrap(), 10_000);
        assert!(handle.call(ConfigMap::new()).unwrap().is_some());
    }

    #[test]
    fn handle_as_command_reports_effective_config() {
        let handle = compose_merging(SoftwareFactory::new(), vec![cfg("a", 1)]).unwrap();
        assert!(handle.effective_config().is_empty());
        handle.call(ConfigMap::new()).unwrap();
        assert_eq!(handle.effective_config().get("a").unwrap().as_int(), Some(1));
    }

    #[test]
    fn done_receives_stage_failure() {
        struct Failing;
        impl Command for Failing {
            fn run(&self, _: &ConfigMap, _: &ConfigMap, done: Done) {
                done(Err("shader miscompiled".into()));
            }
            fn effective_config(&self) -> ConfigMap {
                ConfigMap::new()
            }
        }

        let handle = compose_merging(
            SoftwareFactory::new(),
            vec![Fragment::Callable(Rc::new(Failing))],
        )
        .unwrap();
        let err = handle.call(ConfigMap::new()).unwrap_err();
        assert!(matches!(err, Error::Stage { index: 0, .. }));
    }

    #[test]
    fn dynamic_args_flow_every_invocation() {
        let color = ConfigMap::new().uniform(
            "color",
            ConfigValue::dynamic(|_ctx, args| {
                args.get("color").cloned().unwrap_or(ConfigValue::Int(0))
            }),
        );
        let handle = compose_merging(SoftwareFactory::new(), vec![Fragment::Config(color)]).unwrap();

        let first = handle.call(ConfigMap::new().with("color", 3)).unwrap().unwrap();
        assert_eq!(
            first.group(keys::UNIFORMS).unwrap().get("color").unwrap().as_int(),
            Some(3)
        );
        let second = handle.call(ConfigMap::new().with("color", 5)).unwrap().unwrap();
        assert_eq!(
            second.group(keys::UNIFORMS).unwrap().get("color").unwrap().as_int(),
            Some(5)
        );
    }

    #[test]
    fn deferred_opaque_stage_feeds_later_dynamics() {
        struct ParkedViewport {
            slot: RefCell<Option<Done>>,
        }
        impl Command for ParkedViewport {
            fn run(&self, _: &ConfigMap, _: &ConfigMap, done: Done) {
                *self.slot.borrow_mut() = Some(done);
            }
            fn effective_config(&self) -> ConfigMap {
                ConfigMap::new().context_value("viewportWidth", 640)
            }
        }

        let parked = Rc::new(ParkedViewport {
            slot: RefCell::new(None),
        });
        let width = ConfigMap::new().uniform(
            "width",
            ConfigValue::dynamic(|ctx, _args| {
                ctx.group(keys::CONTEXT)
                    .and_then(|c| c.get("viewportWidth"))
                    .cloned()
                    .unwrap_or(ConfigValue::Int(0))
            }),
        );
        let handle = compose_merging(
            SoftwareFactory::new(),
            vec![
                Fragment::Callable(Rc::clone(&parked) as Rc<dyn Command>),
                Fragment::Config(width),
            ],
        )
        .unwrap();

        let fired = Rc::new(Cell::new(0));
        let seen = Rc::clone(&fired);
        let outcome = Rc::new(RefCell::new(None));
        let capture = Rc::clone(&outcome);
        handle
            .call_with(
                ConfigMap::new(),
                Box::new(move |result| {
                    seen.set(seen.get() + 1);
                    *capture.borrow_mut() = Some(result);
                }),
            )
            .unwrap();

        // Chain parks on the viewport stage; completion has not fired.
        assert_eq!(fired.get(), 0);
        let resume = parked.slot.borrow_mut().take().unwrap();
        resume(Ok(()));

        assert_eq!(fired.get(), 1);
        let context = outcome.borrow_mut().take().unwrap().unwrap();
        let uniforms = context.group(keys::UNIFORMS).unwrap();
        assert_eq!(uniforms.get("width").unwrap().as_int(), Some(640));
    }

    #[test]
    fn done_fires_once_per_invocation() {
        let handle = compose_merging(SoftwareFactory::new(), vec![cfg("a", 1)]).unwrap();
        let fired = Rc::new(Cell::new(0));
        let seen = Rc::clone(&fired);
        handle
            .call_with(
                ConfigMap::new(),
                Box::new(move |result| {
                    result.unwrap();
                    seen.set(seen.get() + 1);
                }),
            )
            .unwrap();
        assert_eq!(fired.get(), 1);
    }
}
