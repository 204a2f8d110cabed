//! drawchain-engine composes many small, declarative fragments of GPU
//! draw-command configuration into one reusable executable command.
//!
//! The engine is a control-flow and configuration-accumulation layer; the
//! drawing primitive that turns a configuration map into something the GPU
//! runs is an external collaborator behind the [`CommandFactory`] trait.
//! Composition does four things:
//!
//! - flattens nested composites into one linear fragment sequence
//! - merges adjacent configuration fragments into the minimum number of
//!   concrete commands
//! - interleaves those with pre-existing opaque commands
//! - drives the resulting chain every frame through a trampoline, so the
//!   native call stack stays flat no matter how long the chain grows
//!
//! ```
//! use drawchain_engine::{compose_merging, ConfigMap, Fragment};
//! use drawchain_engine::command::software::SoftwareFactory;
//!
//! let factory = SoftwareFactory::new();
//! let triangle = compose_merging(factory, vec![
//!     Fragment::Config(ConfigMap::new().frag("void main() { /* ... */ }")),
//!     Fragment::Config(ConfigMap::new().vert("void main() { /* ... */ }")),
//!     Fragment::Config(ConfigMap::new().count(3)),
//! ]).unwrap();
//!
//! // First call compiles; every call drives the cached stage list.
//! let context = triangle.call(ConfigMap::new()).unwrap().unwrap();
//! assert_eq!(context.get("count").unwrap().as_int(), Some(3));
//! ```
//!
//! Everything is single-threaded and cooperative: stages execute in
//! declaration order, suspension happens only when a stage defers to the
//! embedding scheduler, and a handle must not be re-invoked while an
//! invocation on it is still in flight.

pub mod command;
pub mod compose;
pub mod config;
pub mod error;
pub mod logging;

pub use command::{Command, CommandFactory, Done};
pub use compose::{
    compose_direct, compose_merging, CompiledStage, CompositeHandle, DoneFn, Fragment, MergePolicy,
};
pub use config::{merge, ConfigMap, ConfigValue, ValueKind};
pub use error::{CommandError, Error};
