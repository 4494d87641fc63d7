//! Tree-rewriting passes over a function body.
//!
//! Every pass implements [`ILTransform`] and is run by [`crate::pipeline::Decompiler`] in a
//! fixed order. A pass mutates the body in place and reports whether it changed anything.
//! Passes are total: an idiom is either rewritten completely or left exactly as it was, so a
//! pass that rejects a shape never leaves a half-transformed tree behind.
//!
//! # Architecture
//!
//! - [`LoopDetection`] - natural loops into `Loop` containers with `leave` exits
//! - [`SwitchDetection`] - if-cascades and IL switches into `switch` instructions,
//!   driven by [`crate::analysis::SwitchAnalysis`]
//! - [`ConditionDetection`] - single-entry branch targets into `if`/`else` bodies
//! - [`CompoundAssignment`] - load/operate/store sequences into
//!   [`NumericCompoundAssign`](crate::il::InstructionKind::NumericCompoundAssign), gated by
//!   [`is_binary_compatible_with_type`]
//!
//! # Usage
//!
//! ```rust,no_run
//! use cildecomp::il::ILFunction;
//! use cildecomp::settings::DecompilerSettings;
//! use cildecomp::transforms::{ILTransform, SwitchDetection, TransformContext};
//!
//! # fn run(func: &mut ILFunction) -> cildecomp::Result<()> {
//! let settings = DecompilerSettings::default();
//! let ctx = TransformContext::new(&settings);
//! let pass = SwitchDetection;
//! if pass.should_run(&ctx) && pass.run(func, &ctx)? {
//!     println!("{} changed the body", pass.name());
//! }
//! # Ok(())
//! # }
//! ```

mod compound;
mod conditions;
mod loops;
mod switches;

pub use compound::{
    is_binary_compatible_with_type, is_implicit_truncation, pointer_arithmetic_offset,
    CompoundAssignment, PointerOffset,
};
pub use conditions::ConditionDetection;
pub use loops::LoopDetection;
pub use switches::{SwitchDetection, MAX_CASE_LABELS};

use crate::{
    il::{ILFunction, InstrId, OpCode},
    settings::DecompilerSettings,
    Result,
};

/// Shared, read-only state handed to every pass.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    settings: &'a DecompilerSettings,
}

impl<'a> TransformContext<'a> {
    /// Creates a context over `settings`.
    #[must_use]
    pub fn new(settings: &'a DecompilerSettings) -> Self {
        Self { settings }
    }

    /// The settings of the current run.
    #[must_use]
    pub fn settings(&self) -> &'a DecompilerSettings {
        self.settings
    }
}

/// A rewriting pass over one function body.
///
/// Passes are stateless values; anything they learn about a body lives on the stack of
/// [`ILTransform::run`]. All passes must be `Send + Sync` so one pass list can drive
/// bodies on several worker threads.
pub trait ILTransform: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run under the given settings?
    ///
    /// Called before `run`. Override to honour the pass toggles of
    /// [`DecompilerSettings`].
    fn should_run(&self, _ctx: &TransformContext<'_>) -> bool {
        true
    }

    /// Runs the pass over `func`.
    ///
    /// Returns `true` if the body was changed.
    ///
    /// # Arguments
    ///
    /// * `func` - The body to transform, exclusively owned for the duration of the call
    /// * `ctx` - Settings of the current run
    ///
    /// # Errors
    ///
    /// Returns an error only for invariant violations raised by tree edits. Shapes the pass
    /// does not recognise are left unchanged and are not errors.
    fn run(&self, func: &mut ILFunction, ctx: &TransformContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Every connected block container of the body, outermost first.
pub(crate) fn block_containers(func: &ILFunction) -> Vec<InstrId> {
    func.descendants(func.body())
        .into_iter()
        .filter(|&node| func.opcode(node) == OpCode::BlockContainer)
        .collect()
}

/// Returns true if `block` is a non-entry block of `container` reached by exactly one branch.
pub(crate) fn is_single_entry(func: &ILFunction, block: InstrId, container: InstrId) -> bool {
    func.opcode(block) == OpCode::Block
        && func.parent(block) == Some(container)
        && func.entry_block(container) != Some(block)
        && func.incoming_edge_count(block) == 1
}

/// Removes every non-entry block of `container` that no branch targets.
///
/// Removing a block can orphan the blocks it was branching to, so removal repeats until
/// no unreferenced block is left.
///
/// # Errors
///
/// Propagates errors from detaching blocks.
pub fn remove_dead_blocks(func: &mut ILFunction, container: InstrId) -> Result<usize> {
    let mut removed = 0;
    loop {
        let entry = func.entry_block(container);
        let dead: Vec<InstrId> = func
            .children(container)
            .filter(|&block| Some(block) != entry && func.incoming_edge_count(block) == 0)
            .collect();
        if dead.is_empty() {
            return Ok(removed);
        }
        for block in dead {
            func.detach(block)?;
            removed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ContainerKind;

    #[test]
    fn test_remove_dead_blocks_cascades() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let ret = func.ret(None)?;
        let live = func.block(&[ret])?;
        let to_live = func.branch(live);
        let entry = func.block(&[to_live])?;
        let ret_dead = func.ret(None)?;
        let dead_tail = func.block(&[ret_dead])?;
        let to_tail = func.branch(dead_tail);
        let dead = func.block(&[to_tail])?;
        for block in [entry, live, dead, dead_tail] {
            func.add_child(body, block)?;
        }

        assert_eq!(remove_dead_blocks(&mut func, body)?, 2);
        assert_eq!(func.child_list(body), vec![entry, live]);
        func.validate()?;
        Ok(())
    }

    #[test]
    fn test_single_entry_excludes_entry_and_foreign_blocks() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let inner = func.container(ContainerKind::Normal);
        let ret = func.ret(None)?;
        let target = func.block(&[ret])?;
        let to_target = func.branch(target);
        let entry = func.block(&[to_target])?;
        func.add_child(body, entry)?;
        func.add_child(body, target)?;

        assert!(is_single_entry(&func, target, body));
        assert!(!is_single_entry(&func, entry, body));
        assert!(!is_single_entry(&func, target, inner));
        assert_eq!(block_containers(&func), vec![body]);
        Ok(())
    }
}
