//! End-to-end reconstruction of function bodies.
//!
//! The [`Decompiler`] runs the rewriting passes over an IL body in a fixed order, builds the
//! output syntax tree, inserts parentheses and freezes the result:
//!
//! 1. **Loops**: natural loops become `Loop` containers
//! 2. **Switches**: if-cascades and IL switches become `switch` instructions
//! 3. **Conditions**: single-entry branch targets are inlined into `if`/`else`
//! 4. **Compound assignments**: load/operate/store sequences become `x += v` / `x++`
//!
//! Bodies are independent, so [`decompile_all`] processes a batch on the rayon pool. The
//! host may cancel a run through a shared flag; it is checked between passes.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::{
    ast::{build_method, Frozen, InsertParenthesesVisitor, SyntaxTree},
    il::ILFunction,
    settings::DecompilerSettings,
    transforms::{
        CompoundAssignment, ConditionDetection, ILTransform, LoopDetection, SwitchDetection,
        TransformContext,
    },
    Error, Result,
};

/// Drives the passes and the tree construction for one set of settings.
pub struct Decompiler<'s> {
    settings: &'s DecompilerSettings,
    transforms: Vec<Box<dyn ILTransform>>,
}

impl<'s> Decompiler<'s> {
    /// Creates a decompiler with the standard pass order.
    #[must_use]
    pub fn new(settings: &'s DecompilerSettings) -> Self {
        Self::with_transforms(
            settings,
            vec![
                Box::new(LoopDetection),
                Box::new(SwitchDetection),
                Box::new(ConditionDetection),
                Box::new(CompoundAssignment),
            ],
        )
    }

    /// Creates a decompiler with a custom pass list, run in the given order.
    #[must_use]
    pub fn with_transforms(
        settings: &'s DecompilerSettings,
        transforms: Vec<Box<dyn ILTransform>>,
    ) -> Self {
        Self {
            settings,
            transforms,
        }
    }

    /// The settings of this decompiler.
    #[must_use]
    pub fn settings(&self) -> &'s DecompilerSettings {
        self.settings
    }

    /// The passes in execution order.
    pub fn transforms(&self) -> impl Iterator<Item = &dyn ILTransform> {
        self.transforms.iter().map(|t| &**t)
    }

    /// Runs every enabled pass over `func`.
    ///
    /// Returns the names of the passes that changed the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is set before a pass starts, or the first
    /// error a pass reports. The body is left as the last completed pass produced it.
    pub fn run_transforms(
        &self,
        func: &mut ILFunction,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<&'static str>> {
        let ctx = TransformContext::new(self.settings);
        let mut changed = Vec::new();
        for transform in &self.transforms {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                log::warn!("{}: cancelled before {}", func.name(), transform.name());
                return Err(Error::Cancelled);
            }
            if !transform.should_run(&ctx) {
                log::trace!("{}: {} disabled", func.name(), transform.name());
                continue;
            }
            if transform.run(func, &ctx)? {
                log::debug!("{}: {} changed the body", func.name(), transform.name());
                changed.push(transform.name());
            }
        }

        #[cfg(debug_assertions)]
        func.validate()?;

        Ok(changed)
    }

    /// Reconstructs `func` as a frozen method syntax tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] on cancellation, [`Error::NotSupported`] for bodies
    /// with constructs the tree builder does not handle, and any pass error.
    pub fn decompile(
        &self,
        mut func: ILFunction,
        cancel: Option<&AtomicBool>,
    ) -> Result<SyntaxTree<Frozen>> {
        self.run_transforms(&mut func, cancel)?;
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(Error::Cancelled);
        }

        let mut tree = build_method(&func)?;
        let inserted = InsertParenthesesVisitor::from_settings(self.settings).run(&mut tree)?;
        log::debug!(
            "{}: {} syntax nodes, {} parentheses",
            func.name(),
            tree.node_count(),
            inserted
        );
        Ok(tree.freeze())
    }
}

/// Decompiles a batch of bodies in parallel with the standard pass order.
///
/// Results are returned in input order; one failing body does not affect the others.
#[must_use]
pub fn decompile_all(
    settings: &DecompilerSettings,
    functions: Vec<ILFunction>,
    cancel: Option<&AtomicBool>,
) -> Vec<Result<SyntaxTree<Frozen>>> {
    let decompiler = Decompiler::new(settings);
    functions
        .into_par_iter()
        .map(|func| decompiler.decompile(func, cancel))
        .collect()
}
