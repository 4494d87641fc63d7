//! The instruction model.
//!
//! This module is the foundation of the reconstruction pipeline: a tree of typed
//! instructions that every later pass reads, matches and rewrites in place.
//!
//! # Architecture
//!
//! - [`ILFunction`] - Arena owning all nodes and variables of one body, with the tree
//!   editing primitives (`add_child`, `insert_child`, `replace_with`, `detach`,
//!   `clone_subtree`) and derived properties (`flags`, `stack_type`)
//! - [`InstructionKind`] / [`OpCode`] - The closed set of instruction kinds with their
//!   payloads and child slot layouts
//! - [`InstructionFlags`] - Cached effect summary with sequential and branching
//!   composition
//! - [`ILVariable`] - Variables with load/store/address use lists kept in sync with the
//!   connected tree
//! - [`types`] - Stack types, primitive types and the resolved-type oracle
//! - `matching` - `match_*` helpers on [`ILFunction`]
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::il::{ILFunction, ILVariable, IlType, PrimitiveType, VariableKind};
//!
//! let mut func = ILFunction::new("Answer");
//! let body = func.body();
//! let value = func.ldc_i4(42);
//! let ret = func.ret(Some(value))?;
//! let entry = func.block(&[ret])?;
//! func.add_child(body, entry)?;
//! func.validate()?;
//! # Ok::<(), cildecomp::Error>(())
//! ```

mod construct;
mod dump;
mod flags;
mod function;
mod matching;
mod opcode;
pub mod types;
mod variable;

pub use flags::InstructionFlags;
pub use function::{Children, ILFunction, InstrId};
pub use matching::{BinaryMatch, CompMatch};
pub use opcode::{
    BinaryNumericOperator, ComparisonKind, CompoundEvalMode, CompoundTargetKind, ContainerKind,
    InstructionKind, OpCode, SlotLayout,
};
pub use types::{FieldRef, IlType, MethodRef, PrimitiveType, Sign, StackType};
pub use variable::{ILVariable, VarId, VariableKind, VariableUse};
