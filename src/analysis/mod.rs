//! Program analyses over instruction trees.
//!
//! The analyses here never modify a body. They answer questions the transforms in
//! [`crate::transforms`] need before committing to a rewrite.
//!
//! # Architecture
//!
//! - [`longset`] - [`LongSet`] / [`LongInterval`], immutable sets of `i64` values with
//!   union, intersection, difference, complement and wrapping offset
//! - [`symbolic`] - [`SymbolicEvaluationContext`], a small abstract interpreter relating
//!   conditions to sets of values of a tracked state, and the exact comparison-to-set
//!   semantics used everywhere else
//! - [`cfg`] - [`BlockGraph`], the block-level control flow graph of one container, with
//!   dominators and natural loops
//! - [`switch`] - [`SwitchAnalysis`], recognition of multi-way branches in `if` cascades
//!   and native `switch` instructions
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::analysis::{make_set_where_comparison_is_true, LongSet};
//! use cildecomp::il::{ComparisonKind, Sign};
//!
//! let below_ten = make_set_where_comparison_is_true(ComparisonKind::LessThan, 10, Sign::Signed);
//! let at_least_ten =
//!     make_set_where_comparison_is_true(ComparisonKind::GreaterThanOrEqual, 10, Sign::Signed);
//! assert_eq!(below_ten.invert(), at_least_ten);
//! assert!(below_ten.union_with(&at_least_ten).is_universe());
//! ```

pub mod cfg;
pub mod longset;
pub mod switch;
pub mod symbolic;

pub use cfg::{detect_loops, BlockGraph, DominatorTree, NaturalLoop};
pub use longset::{LongInterval, LongSet};
pub use switch::{value_domain, SwitchAnalysis};
pub use symbolic::{
    make_set_where_comparison_is_true, make_set_where_comparison_is_true_for, unsigned_range,
    SymbolicEvaluationContext, SymbolicValue,
};
