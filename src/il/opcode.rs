//! Instruction kinds: the closed set of opcodes and their payloads.
//!
//! [`InstructionKind`] is the per-node payload stored in the [`crate::il::ILFunction`]
//! arena. Tree bookkeeping (parent, children, siblings) lives in the arena node, not
//! here; the kind only describes *what* a node is and which child slots it has.
//!
//! # Child slots
//!
//! Every kind has a [`SlotLayout`]: a list of fixed, named slots followed optionally by
//! a variadic tail. `IfInstruction` has exactly `condition`, `true_inst` and
//! `false_inst`; `Call` has only the variadic `arguments`; `Switch` has a fixed `value`
//! followed by any number of `sections`.
//!
//! # Categories
//!
//! - **Structure**: blocks, containers, branches, if/switch, try regions, lock/using
//! - **Locals**: `ldloc`, `ldloca`, `stloc`
//! - **Constants**: integer/float/string/null literals, `default`, `sizeof`
//! - **Memory**: `ldobj`/`stobj` over address expressions (fields, array elements)
//! - **Arithmetic**: binary/unary numeric, comparisons, conversions, compound assignment,
//!   nullable lifting helpers
//! - **Objects**: calls, allocation, casts, dynamic member access

#![allow(missing_docs)]

use crate::{
    analysis::LongSet,
    il::{
        types::{FieldRef, IlType, MethodRef, PrimitiveType, Sign, StackType},
        InstrId, VarId,
    },
};

/// Tag of an instruction kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum OpCode {
    // ========================================================================
    // Structure
    // ========================================================================
    Nop,
    BlockContainer,
    Block,
    Branch,
    Leave,
    IfInstruction,
    Switch,
    SwitchSection,
    Return,
    Throw,
    Rethrow,
    TryCatch,
    TryCatchHandler,
    TryFinally,
    TryFault,
    Lock,
    Using,

    // ========================================================================
    // Locals
    // ========================================================================
    LdLoc,
    LdLoca,
    StLoc,

    // ========================================================================
    // Constants
    // ========================================================================
    LdcI4,
    LdcI8,
    LdcF4,
    LdcF8,
    LdNull,
    LdStr,
    DefaultValue,
    SizeOf,

    // ========================================================================
    // Memory
    // ========================================================================
    LdObj,
    StObj,
    LdFlda,
    LdsFlda,
    LdElema,
    LdLen,

    // ========================================================================
    // Arithmetic
    // ========================================================================
    BinaryNumeric,
    BitNot,
    Comp,
    LogicNot,
    Conv,
    NumericCompoundAssign,
    ThreeValuedBoolAnd,
    ThreeValuedBoolOr,
    NullCoalescing,
    NullableUnwrap,
    NullableRewrap,

    // ========================================================================
    // Objects
    // ========================================================================
    Call,
    CallVirt,
    NewObj,
    NewArr,
    CastClass,
    IsInst,
    Box,
    UnboxAny,
    DynamicGetMember,
    DynamicSetMember,

    // ========================================================================
    // Misc
    // ========================================================================
    InvalidBranch,
    InvalidExpression,
    DebugBreak,
}

/// Binary numeric operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum BinaryNumericOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryNumericOperator {
    /// C# operator token.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryNumericOperator::Add => "+",
            BinaryNumericOperator::Sub => "-",
            BinaryNumericOperator::Mul => "*",
            BinaryNumericOperator::Div => "/",
            BinaryNumericOperator::Rem => "%",
            BinaryNumericOperator::BitAnd => "&",
            BinaryNumericOperator::BitOr => "|",
            BinaryNumericOperator::BitXor => "^",
            BinaryNumericOperator::ShiftLeft => "<<",
            BinaryNumericOperator::ShiftRight => ">>",
        }
    }

    /// Returns true for `<<` and `>>`.
    #[must_use]
    pub fn is_shift(self) -> bool {
        matches!(
            self,
            BinaryNumericOperator::ShiftLeft | BinaryNumericOperator::ShiftRight
        )
    }

    /// Operators whose result depends on the operand sign even without overflow checks.
    #[must_use]
    pub fn is_sign_sensitive(self) -> bool {
        matches!(
            self,
            BinaryNumericOperator::Div | BinaryNumericOperator::Rem | BinaryNumericOperator::ShiftRight
        )
    }
}

/// Relational comparison kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum ComparisonKind {
    Equality,
    Inequality,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonKind {
    /// The comparison that is true exactly when `self` is false.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            ComparisonKind::Equality => ComparisonKind::Inequality,
            ComparisonKind::Inequality => ComparisonKind::Equality,
            ComparisonKind::LessThan => ComparisonKind::GreaterThanOrEqual,
            ComparisonKind::LessThanOrEqual => ComparisonKind::GreaterThan,
            ComparisonKind::GreaterThan => ComparisonKind::LessThanOrEqual,
            ComparisonKind::GreaterThanOrEqual => ComparisonKind::LessThan,
        }
    }

    /// The comparison with its operands swapped (`a < b` is `b > a`).
    #[must_use]
    pub fn swap(self) -> Self {
        match self {
            ComparisonKind::LessThan => ComparisonKind::GreaterThan,
            ComparisonKind::LessThanOrEqual => ComparisonKind::GreaterThanOrEqual,
            ComparisonKind::GreaterThan => ComparisonKind::LessThan,
            ComparisonKind::GreaterThanOrEqual => ComparisonKind::LessThanOrEqual,
            other => other,
        }
    }

    /// Returns true for `==` and `!=`.
    #[must_use]
    pub fn is_equality_or_inequality(self) -> bool {
        matches!(self, ComparisonKind::Equality | ComparisonKind::Inequality)
    }

    /// C# operator token.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonKind::Equality => "==",
            ComparisonKind::Inequality => "!=",
            ComparisonKind::LessThan => "<",
            ComparisonKind::LessThanOrEqual => "<=",
            ComparisonKind::GreaterThan => ">",
            ComparisonKind::GreaterThanOrEqual => ">=",
        }
    }
}

/// Role of a block container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum ContainerKind {
    /// Function body or plain nested region
    #[default]
    Normal,
    /// Loop body: a branch to the entry block is `continue`, a leave is `break`
    Loop,
    /// Switch body: a leave is `break`
    Switch,
}

/// What the target of a compound assignment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CompoundTargetKind {
    /// The target child is an address (`ldloca`, `ldflda`, `ldelema`)
    Address,
    /// The target child is the property getter call
    Property,
    /// The target child is a dynamic member access
    Dynamic,
}

/// Which value a compound assignment evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CompoundEvalMode {
    /// `x++`, `x--`: the value before the update
    EvaluatesToOldValue,
    /// `x += v`, `++x`: the value after the update
    EvaluatesToNewValue,
}

/// Names of the child slots of an instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    /// Fixed, named leading slots
    pub fixed: &'static [&'static str],
    /// Name of the variadic tail, if any
    pub rest: Option<&'static str>,
}

impl SlotLayout {
    const fn fixed(names: &'static [&'static str]) -> Self {
        SlotLayout {
            fixed: names,
            rest: None,
        }
    }

    const fn variadic(fixed: &'static [&'static str], rest: &'static str) -> Self {
        SlotLayout {
            fixed,
            rest: Some(rest),
        }
    }

    /// Returns true if `count` children satisfy the layout.
    #[must_use]
    pub fn accepts_count(&self, count: usize) -> bool {
        match self.rest {
            Some(_) => count >= self.fixed.len(),
            None => count == self.fixed.len(),
        }
    }

    /// Name of the slot at `index`, or `None` if the layout has no such slot.
    #[must_use]
    pub fn slot_name(&self, index: usize) -> Option<&'static str> {
        self.fixed.get(index).copied().or_else(|| {
            if index >= self.fixed.len() {
                self.rest
            } else {
                None
            }
        })
    }
}

/// Payload of an instruction node.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    // ========================================================================
    // Structure
    // ========================================================================
    Nop,
    BlockContainer {
        kind: ContainerKind,
        expected_result_type: StackType,
    },
    /// `incoming_edge_count` counts connected branches targeting this block.
    Block {
        incoming_edge_count: u32,
    },
    Branch {
        target: InstrId,
    },
    Leave {
        target_container: InstrId,
    },
    IfInstruction,
    Switch {
        is_lifted: bool,
    },
    SwitchSection {
        labels: LongSet,
        has_null_label: bool,
    },
    Return,
    Throw,
    Rethrow,
    TryCatch,
    TryCatchHandler {
        variable: VarId,
    },
    TryFinally,
    TryFault,
    Lock,
    Using {
        variable: VarId,
        is_async: bool,
    },

    // ========================================================================
    // Locals
    // ========================================================================
    LdLoc {
        variable: VarId,
    },
    LdLoca {
        variable: VarId,
    },
    StLoc {
        variable: VarId,
    },

    // ========================================================================
    // Constants
    // ========================================================================
    LdcI4 {
        value: i32,
    },
    LdcI8 {
        value: i64,
    },
    LdcF4 {
        value: f32,
    },
    LdcF8 {
        value: f64,
    },
    LdNull,
    LdStr {
        value: String,
    },
    DefaultValue {
        ty: IlType,
    },
    SizeOf {
        ty: IlType,
    },

    // ========================================================================
    // Memory
    // ========================================================================
    LdObj {
        ty: IlType,
    },
    StObj {
        ty: IlType,
    },
    LdFlda {
        field: FieldRef,
    },
    LdsFlda {
        field: FieldRef,
    },
    LdElema {
        ty: IlType,
    },
    LdLen,

    // ========================================================================
    // Arithmetic
    // ========================================================================
    BinaryNumeric {
        operator: BinaryNumericOperator,
        check_for_overflow: bool,
        sign: Sign,
        left_input_type: StackType,
        right_input_type: StackType,
        is_lifted: bool,
    },
    BitNot,
    Comp {
        kind: ComparisonKind,
        sign: Sign,
        input_type: StackType,
        is_lifted: bool,
    },
    LogicNot,
    Conv {
        target_type: PrimitiveType,
        check_for_overflow: bool,
        input_sign: Sign,
    },
    NumericCompoundAssign {
        operator: BinaryNumericOperator,
        check_for_overflow: bool,
        sign: Sign,
        ty: IlType,
        target_kind: CompoundTargetKind,
        eval_mode: CompoundEvalMode,
    },
    ThreeValuedBoolAnd,
    ThreeValuedBoolOr,
    NullCoalescing,
    NullableUnwrap {
        ty: IlType,
    },
    NullableRewrap,

    // ========================================================================
    // Objects
    // ========================================================================
    Call {
        method: MethodRef,
    },
    CallVirt {
        method: MethodRef,
    },
    NewObj {
        method: MethodRef,
    },
    NewArr {
        ty: IlType,
    },
    CastClass {
        ty: IlType,
    },
    IsInst {
        ty: IlType,
    },
    Box {
        ty: IlType,
    },
    UnboxAny {
        ty: IlType,
    },
    DynamicGetMember {
        name: String,
    },
    DynamicSetMember {
        name: String,
    },

    // ========================================================================
    // Misc
    // ========================================================================
    InvalidBranch {
        message: String,
    },
    InvalidExpression {
        message: String,
    },
    DebugBreak,
}

impl InstructionKind {
    /// The tag of this kind.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        match self {
            InstructionKind::Nop => OpCode::Nop,
            InstructionKind::BlockContainer { .. } => OpCode::BlockContainer,
            InstructionKind::Block { .. } => OpCode::Block,
            InstructionKind::Branch { .. } => OpCode::Branch,
            InstructionKind::Leave { .. } => OpCode::Leave,
            InstructionKind::IfInstruction => OpCode::IfInstruction,
            InstructionKind::Switch { .. } => OpCode::Switch,
            InstructionKind::SwitchSection { .. } => OpCode::SwitchSection,
            InstructionKind::Return => OpCode::Return,
            InstructionKind::Throw => OpCode::Throw,
            InstructionKind::Rethrow => OpCode::Rethrow,
            InstructionKind::TryCatch => OpCode::TryCatch,
            InstructionKind::TryCatchHandler { .. } => OpCode::TryCatchHandler,
            InstructionKind::TryFinally => OpCode::TryFinally,
            InstructionKind::TryFault => OpCode::TryFault,
            InstructionKind::Lock => OpCode::Lock,
            InstructionKind::Using { .. } => OpCode::Using,
            InstructionKind::LdLoc { .. } => OpCode::LdLoc,
            InstructionKind::LdLoca { .. } => OpCode::LdLoca,
            InstructionKind::StLoc { .. } => OpCode::StLoc,
            InstructionKind::LdcI4 { .. } => OpCode::LdcI4,
            InstructionKind::LdcI8 { .. } => OpCode::LdcI8,
            InstructionKind::LdcF4 { .. } => OpCode::LdcF4,
            InstructionKind::LdcF8 { .. } => OpCode::LdcF8,
            InstructionKind::LdNull => OpCode::LdNull,
            InstructionKind::LdStr { .. } => OpCode::LdStr,
            InstructionKind::DefaultValue { .. } => OpCode::DefaultValue,
            InstructionKind::SizeOf { .. } => OpCode::SizeOf,
            InstructionKind::LdObj { .. } => OpCode::LdObj,
            InstructionKind::StObj { .. } => OpCode::StObj,
            InstructionKind::LdFlda { .. } => OpCode::LdFlda,
            InstructionKind::LdsFlda { .. } => OpCode::LdsFlda,
            InstructionKind::LdElema { .. } => OpCode::LdElema,
            InstructionKind::LdLen => OpCode::LdLen,
            InstructionKind::BinaryNumeric { .. } => OpCode::BinaryNumeric,
            InstructionKind::BitNot => OpCode::BitNot,
            InstructionKind::Comp { .. } => OpCode::Comp,
            InstructionKind::LogicNot => OpCode::LogicNot,
            InstructionKind::Conv { .. } => OpCode::Conv,
            InstructionKind::NumericCompoundAssign { .. } => OpCode::NumericCompoundAssign,
            InstructionKind::ThreeValuedBoolAnd => OpCode::ThreeValuedBoolAnd,
            InstructionKind::ThreeValuedBoolOr => OpCode::ThreeValuedBoolOr,
            InstructionKind::NullCoalescing => OpCode::NullCoalescing,
            InstructionKind::NullableUnwrap { .. } => OpCode::NullableUnwrap,
            InstructionKind::NullableRewrap => OpCode::NullableRewrap,
            InstructionKind::Call { .. } => OpCode::Call,
            InstructionKind::CallVirt { .. } => OpCode::CallVirt,
            InstructionKind::NewObj { .. } => OpCode::NewObj,
            InstructionKind::NewArr { .. } => OpCode::NewArr,
            InstructionKind::CastClass { .. } => OpCode::CastClass,
            InstructionKind::IsInst { .. } => OpCode::IsInst,
            InstructionKind::Box { .. } => OpCode::Box,
            InstructionKind::UnboxAny { .. } => OpCode::UnboxAny,
            InstructionKind::DynamicGetMember { .. } => OpCode::DynamicGetMember,
            InstructionKind::DynamicSetMember { .. } => OpCode::DynamicSetMember,
            InstructionKind::InvalidBranch { .. } => OpCode::InvalidBranch,
            InstructionKind::InvalidExpression { .. } => OpCode::InvalidExpression,
            InstructionKind::DebugBreak => OpCode::DebugBreak,
        }
    }

    /// Child slots of this kind.
    #[must_use]
    pub fn slot_layout(&self) -> SlotLayout {
        match self {
            InstructionKind::Nop
            | InstructionKind::Branch { .. }
            | InstructionKind::Rethrow
            | InstructionKind::LdLoc { .. }
            | InstructionKind::LdLoca { .. }
            | InstructionKind::LdcI4 { .. }
            | InstructionKind::LdcI8 { .. }
            | InstructionKind::LdcF4 { .. }
            | InstructionKind::LdcF8 { .. }
            | InstructionKind::LdNull
            | InstructionKind::LdStr { .. }
            | InstructionKind::DefaultValue { .. }
            | InstructionKind::SizeOf { .. }
            | InstructionKind::LdsFlda { .. }
            | InstructionKind::InvalidBranch { .. }
            | InstructionKind::InvalidExpression { .. }
            | InstructionKind::DebugBreak => SlotLayout::fixed(&[]),
            InstructionKind::BlockContainer { .. } => SlotLayout::variadic(&[], "blocks"),
            InstructionKind::Block { .. } => SlotLayout::variadic(&[], "instructions"),
            InstructionKind::Leave { .. } | InstructionKind::Return => SlotLayout::fixed(&["value"]),
            InstructionKind::Throw => SlotLayout::fixed(&["argument"]),
            InstructionKind::IfInstruction => {
                SlotLayout::fixed(&["condition", "true_inst", "false_inst"])
            }
            InstructionKind::Switch { .. } => SlotLayout::variadic(&["value"], "sections"),
            InstructionKind::SwitchSection { .. } => SlotLayout::fixed(&["body"]),
            InstructionKind::TryCatch => SlotLayout::variadic(&["try_block"], "handlers"),
            InstructionKind::TryCatchHandler { .. } => SlotLayout::fixed(&["filter", "body"]),
            InstructionKind::TryFinally => SlotLayout::fixed(&["try_block", "finally_block"]),
            InstructionKind::TryFault => SlotLayout::fixed(&["try_block", "fault_block"]),
            InstructionKind::Lock => SlotLayout::fixed(&["on_expression", "body"]),
            InstructionKind::Using { .. } => SlotLayout::fixed(&["resource", "body"]),
            InstructionKind::StLoc { .. } => SlotLayout::fixed(&["value"]),
            InstructionKind::LdObj { .. } | InstructionKind::LdFlda { .. } => {
                SlotLayout::fixed(&["target"])
            }
            InstructionKind::StObj { .. } => SlotLayout::fixed(&["target", "value"]),
            InstructionKind::LdElema { .. } => SlotLayout::variadic(&["array"], "indices"),
            InstructionKind::LdLen => SlotLayout::fixed(&["array"]),
            InstructionKind::BinaryNumeric { .. }
            | InstructionKind::Comp { .. }
            | InstructionKind::ThreeValuedBoolAnd
            | InstructionKind::ThreeValuedBoolOr => SlotLayout::fixed(&["left", "right"]),
            InstructionKind::BitNot
            | InstructionKind::LogicNot
            | InstructionKind::Conv { .. }
            | InstructionKind::NullableUnwrap { .. }
            | InstructionKind::NullableRewrap
            | InstructionKind::CastClass { .. }
            | InstructionKind::IsInst { .. }
            | InstructionKind::Box { .. }
            | InstructionKind::UnboxAny { .. } => SlotLayout::fixed(&["argument"]),
            InstructionKind::NumericCompoundAssign { .. } => SlotLayout::fixed(&["target", "value"]),
            InstructionKind::NullCoalescing => SlotLayout::fixed(&["value", "fallback"]),
            InstructionKind::Call { .. }
            | InstructionKind::CallVirt { .. }
            | InstructionKind::NewObj { .. } => SlotLayout::variadic(&[], "arguments"),
            InstructionKind::NewArr { .. } => SlotLayout::variadic(&[], "indices"),
            InstructionKind::DynamicGetMember { .. } => SlotLayout::fixed(&["target"]),
            InstructionKind::DynamicSetMember { .. } => SlotLayout::fixed(&["target", "value"]),
        }
    }

    /// Opcode required of children in the variadic tail, if the kind restricts it.
    #[must_use]
    pub fn required_rest_opcode(&self) -> Option<OpCode> {
        match self {
            InstructionKind::BlockContainer { .. } => Some(OpCode::Block),
            InstructionKind::Switch { .. } => Some(OpCode::SwitchSection),
            InstructionKind::TryCatch => Some(OpCode::TryCatchHandler),
            _ => None,
        }
    }

    /// The variable referenced by this instruction and how.
    #[must_use]
    pub fn variable_use(&self) -> Option<(VarId, crate::il::VariableUse)> {
        use crate::il::VariableUse;
        match self {
            InstructionKind::LdLoc { variable } => Some((*variable, VariableUse::Load)),
            InstructionKind::LdLoca { variable } => Some((*variable, VariableUse::Address)),
            InstructionKind::StLoc { variable }
            | InstructionKind::TryCatchHandler { variable }
            | InstructionKind::Using { variable, .. } => Some((*variable, VariableUse::Store)),
            _ => None,
        }
    }

    /// Compares the payloads of two kinds, ignoring bookkeeping such as edge counts.
    ///
    /// Branch and leave targets are compared by identity. Float constants are compared
    /// bitwise so that `NaN` matches itself.
    #[must_use]
    pub fn payload_matches(&self, other: &InstructionKind) -> bool {
        match (self, other) {
            (InstructionKind::Block { .. }, InstructionKind::Block { .. }) => true,
            (InstructionKind::LdcF4 { value: a }, InstructionKind::LdcF4 { value: b }) => {
                a.to_bits() == b.to_bits()
            }
            (InstructionKind::LdcF8 { value: a }, InstructionKind::LdcF8 { value: b }) => {
                a.to_bits() == b.to_bits()
            }
            (a, b) => a == b,
        }
    }

    /// Returns true for instructions that end a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionKind::Branch { .. }
                | InstructionKind::Leave { .. }
                | InstructionKind::Return
                | InstructionKind::Throw
                | InstructionKind::Rethrow
                | InstructionKind::InvalidBranch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_comparison_negate_and_swap_are_involutions() {
        for kind in ComparisonKind::iter() {
            assert_eq!(kind.negate().negate(), kind);
            assert_eq!(kind.swap().swap(), kind);
        }
        assert_eq!(ComparisonKind::LessThan.negate(), ComparisonKind::GreaterThanOrEqual);
        assert_eq!(ComparisonKind::LessThan.swap(), ComparisonKind::GreaterThan);
    }

    #[test]
    fn test_slot_layouts() {
        let layout = InstructionKind::IfInstruction.slot_layout();
        assert_eq!(layout.slot_name(1), Some("true_inst"));
        assert!(layout.accepts_count(3));
        assert!(!layout.accepts_count(2));

        let switch = InstructionKind::Switch { is_lifted: false }.slot_layout();
        assert_eq!(switch.slot_name(0), Some("value"));
        assert_eq!(switch.slot_name(7), Some("sections"));
        assert!(!switch.accepts_count(0));
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(OpCode::LdLoc.to_string(), "ld_loc");
        assert_eq!(OpCode::iter().count(), 58);
    }

    #[test]
    fn test_payload_matches_ignores_edge_counts() {
        let a = InstructionKind::Block {
            incoming_edge_count: 1,
        };
        let b = InstructionKind::Block {
            incoming_edge_count: 3,
        };
        assert!(a.payload_matches(&b));
        let nan = InstructionKind::LdcF8 { value: f64::NAN };
        assert!(nan.payload_matches(&nan.clone()));
    }
}
