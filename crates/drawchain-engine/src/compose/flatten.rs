//! Composite splicing.
//!
//! Nesting only exists at construction time. A composite referenced inside
//! a fragment list is replaced, in place, by its own (already flat) fragment
//! list, so merging, compilation, and execution all operate on one ordered
//! array and never traverse a tree at run time.

use std::collections::HashSet;

use crate::compose::Fragment;
use crate::error::Error;

/// Pointer identity of a command, used to detect cycles and repeats.
type CommandId = *const ();

/// Splices every nested composite into one flat sequence, preserving order.
///
/// A composite on the current recursion path means the structure contains
/// itself: [`Error::CycleDetected`]. A composite seen twice anywhere in the
/// same composition has no single splice position: [`Error::RepeatedComposite`].
pub(crate) fn flatten(fragments: &[Fragment]) -> Result<Vec<Fragment>, Error> {
    let mut out = Vec::with_capacity(fragments.len());
    let mut seen = HashSet::new();
    let mut path = Vec::new();
    splice(fragments, &mut out, &mut seen, &mut path)?;
    Ok(out)
}

fn splice(
    fragments: &[Fragment],
    out: &mut Vec<Fragment>,
    seen: &mut HashSet<CommandId>,
    path: &mut Vec<CommandId>,
) -> Result<(), Error> {
    for (index, fragment) in fragments.iter().enumerate() {
        let Fragment::Callable(command) = fragment else {
            out.push(fragment.clone());
            continue;
        };
        let Some(inner) = command.fragments() else {
            out.push(fragment.clone());
            continue;
        };

        let id: CommandId = std::rc::Rc::as_ptr(command).cast();
        if path.contains(&id) {
            return Err(Error::CycleDetected { index });
        }
        if !seen.insert(id) {
            return Err(Error::RepeatedComposite { index });
        }
        path.push(id);
        splice(inner, out, seen, path)?;
        path.pop();
    }
    Ok(())
}
