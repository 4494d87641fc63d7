//! # cildecomp Prelude
//!
//! Re-exports of the types needed to build a body, run the pipeline and read the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cildecomp operations
pub use crate::Error;

/// The result type used throughout cildecomp
pub use crate::Result;

/// Configuration of a run and its presets
pub use crate::settings::DecompilerSettings;

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Instruction arena, node handles and variables
pub use crate::il::{ILFunction, ILVariable, InstrId, VarId, VariableKind};

/// Instruction kinds and their operator payloads
pub use crate::il::{
    BinaryNumericOperator, ComparisonKind, CompoundEvalMode, CompoundTargetKind, ContainerKind,
    InstructionKind, OpCode,
};

/// Type oracle
pub use crate::il::{FieldRef, IlType, MethodRef, PrimitiveType, Sign, StackType};

// ================================================================================================
// Analysis
// ================================================================================================

/// Value sets and switch recognition
pub use crate::analysis::{LongInterval, LongSet, SwitchAnalysis};

// ================================================================================================
// Passes and Pipeline
// ================================================================================================

/// The pass interface and the standard passes
pub use crate::transforms::{
    CompoundAssignment, ConditionDetection, ILTransform, LoopDetection, SwitchDetection,
    TransformContext,
};

/// End-to-end driver
pub use crate::pipeline::{decompile_all, Decompiler};

// ================================================================================================
// Syntax Trees
// ================================================================================================

/// Syntax tree, typestates and node model
pub use crate::ast::{AstId, AstKind, Frozen, Mutable, Role, SyntaxTree};

/// Parenthesization and printing
pub use crate::ast::{
    build_method, get_precedence, print_expression, InsertParenthesesVisitor, PrecedenceLevel,
};
