#![allow(unused_macros)]

/// Returns `None` from the enclosing function when the expression does not hold.
///
/// Used by the procedural matchers, which report a failed match as `None` and never
/// as an error.
///
/// ```rust, ignore
/// fn match_add(func: &ILFunction, id: InstrId) -> Option<(InstrId, InstrId)> {
///     ensure!(func.opcode(id) == OpCode::BinaryNumeric);
///     Some((func.child(id, 0)?, func.child(id, 1)?))
/// }
/// ```
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            return None;
        }
    };
}

/// Checks a tree invariant in debug builds and converts it into an
/// [`crate::Error::InvariantViolation`] in all builds.
///
/// ```rust, ignore
/// check_invariant!(self.parent(child) == Some(parent), "child {} lost its parent", child);
/// ```
macro_rules! check_invariant {
    ($cond:expr, $($arg:tt)*) => {
        debug_assert!($cond, $($arg)*);
        if !$cond {
            return Err(invariant_error!($($arg)*));
        }
    };
}
