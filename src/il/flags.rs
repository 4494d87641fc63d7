//! Instruction flags and their composition rules.
//!
//! Flags summarise what evaluating an instruction (including all of its children) may
//! do. They are computed bottom-up and cached on every node; a structural edit clears the
//! cache on the edited node and all of its ancestors.
//!
//! Two composition rules exist:
//!
//! - sequential composition (children evaluated one after another) is a plain union,
//! - branching composition ([`InstructionFlags::combine_branches`]) keeps
//!   [`InstructionFlags::END_POINT_UNREACHABLE`] only when *every* branch has it.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Effects an instruction may have when evaluated.
    pub struct InstructionFlags: u32 {
        /// Evaluation may throw an exception
        const MAY_THROW = 0x0001;
        /// Evaluation may have an observable side effect (memory write, call)
        const SIDE_EFFECT = 0x0002;
        /// Evaluation may transfer control to a branch target
        const MAY_BRANCH = 0x0004;
        /// Control never reaches the end point of the instruction
        const END_POINT_UNREACHABLE = 0x0008;
        /// Evaluation may write a local variable
        const MAY_WRITE_LOCALS = 0x0010;
        /// Evaluation may read a local variable
        const MAY_READ_LOCALS = 0x0020;
        /// The instruction contains structured control flow
        const CONTROL_FLOW = 0x0040;
        /// Evaluation may unwrap a null nullable value
        const MAY_UNWRAP_NULL = 0x0080;
    }
}

impl InstructionFlags {
    /// Combines the flags of two alternative control-flow paths.
    ///
    /// Every effect that either path may have is kept, except that the end point is only
    /// unreachable if it is unreachable on both paths.
    ///
    /// # Arguments
    ///
    /// * `true_flags` - Flags of the first path
    /// * `false_flags` - Flags of the alternative path
    #[must_use]
    pub fn combine_branches(true_flags: Self, false_flags: Self) -> Self {
        (true_flags & false_flags)
            | ((true_flags | false_flags) & !InstructionFlags::END_POINT_UNREACHABLE)
    }

    /// Returns true when evaluating the instruction twice or not at all is unobservable.
    ///
    /// Exceptions are tolerated: a pure expression that throws does so on its first
    /// evaluation either way.
    #[must_use]
    pub fn is_pure(self) -> bool {
        !self.intersects(
            InstructionFlags::SIDE_EFFECT
                | InstructionFlags::MAY_WRITE_LOCALS
                | InstructionFlags::MAY_BRANCH
                | InstructionFlags::END_POINT_UNREACHABLE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_branches_requires_both_unreachable() {
        let throws = InstructionFlags::MAY_THROW | InstructionFlags::END_POINT_UNREACHABLE;
        let falls = InstructionFlags::MAY_READ_LOCALS;

        let combined = InstructionFlags::combine_branches(throws, falls);
        assert!(combined.contains(InstructionFlags::MAY_THROW));
        assert!(combined.contains(InstructionFlags::MAY_READ_LOCALS));
        assert!(!combined.contains(InstructionFlags::END_POINT_UNREACHABLE));

        let both = InstructionFlags::combine_branches(throws, throws);
        assert!(both.contains(InstructionFlags::END_POINT_UNREACHABLE));
    }

    #[test]
    fn test_is_pure() {
        assert!(InstructionFlags::MAY_READ_LOCALS.is_pure());
        assert!(InstructionFlags::MAY_THROW.is_pure());
        assert!(!InstructionFlags::SIDE_EFFECT.is_pure());
        assert!(!(InstructionFlags::MAY_WRITE_LOCALS | InstructionFlags::MAY_READ_LOCALS).is_pure());
    }
}
