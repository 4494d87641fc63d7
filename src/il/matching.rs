//! Procedural matchers for common instruction shapes.
//!
//! Every transform recognizes idioms by combining these `match_*` helpers. A helper
//! returns the interesting operands on success and `None` otherwise; it never mutates
//! the tree. For declarative templates with groups and backreferences see
//! [`crate::pattern`].

use crate::{
    il::{
        flags::InstructionFlags,
        function::{ILFunction, InstrId},
        opcode::{BinaryNumericOperator, ComparisonKind, InstructionKind, OpCode},
        types::{IlType, MethodRef, PrimitiveType, Sign},
        variable::VarId,
    },
    pattern::{Match, PatternTree},
};

/// Operands and attributes of a matched binary numeric instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryMatch {
    /// The operator
    pub operator: BinaryNumericOperator,
    /// Whether overflow is checked
    pub check_for_overflow: bool,
    /// Operation sign
    pub sign: Sign,
    /// Left operand
    pub left: InstrId,
    /// Right operand
    pub right: InstrId,
}

/// Operands and attributes of a matched comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompMatch {
    /// The comparison kind
    pub kind: ComparisonKind,
    /// Comparison sign
    pub sign: Sign,
    /// Left operand
    pub left: InstrId,
    /// Right operand
    pub right: InstrId,
}

impl ILFunction {
    fn two_children(&self, id: InstrId) -> Option<(InstrId, InstrId)> {
        let first = self.first_child(id)?;
        let second = self.next_sibling(first)?;
        Some((first, second))
    }

    /// `nop`
    #[must_use]
    pub fn match_nop(&self, id: InstrId) -> bool {
        self.opcode(id) == OpCode::Nop
    }

    /// `ldloc v` for any variable.
    #[must_use]
    pub fn match_ld_loc(&self, id: InstrId) -> Option<VarId> {
        match self.kind(id) {
            InstructionKind::LdLoc { variable } => Some(*variable),
            _ => None,
        }
    }

    /// `ldloc v` for a specific variable.
    #[must_use]
    pub fn match_ld_loc_of(&self, id: InstrId, variable: VarId) -> bool {
        self.match_ld_loc(id) == Some(variable)
    }

    /// `ldloca v`
    #[must_use]
    pub fn match_ld_loca(&self, id: InstrId) -> Option<VarId> {
        match self.kind(id) {
            InstructionKind::LdLoca { variable } => Some(*variable),
            _ => None,
        }
    }

    /// `stloc v(value)`
    #[must_use]
    pub fn match_st_loc(&self, id: InstrId) -> Option<(VarId, InstrId)> {
        match self.kind(id) {
            InstructionKind::StLoc { variable } => Some((*variable, self.first_child(id)?)),
            _ => None,
        }
    }

    /// `ldc.i4 c`
    #[must_use]
    pub fn match_ldc_i4(&self, id: InstrId) -> Option<i32> {
        match self.kind(id) {
            InstructionKind::LdcI4 { value } => Some(*value),
            _ => None,
        }
    }

    /// `ldc.i4 c` for a specific constant.
    #[must_use]
    pub fn match_ldc_i4_value(&self, id: InstrId, expected: i32) -> bool {
        self.match_ldc_i4(id) == Some(expected)
    }

    /// `ldc.i4` or `ldc.i8`, sign-extended to 64 bits.
    #[must_use]
    pub fn match_ldc_i(&self, id: InstrId) -> Option<i64> {
        match self.kind(id) {
            InstructionKind::LdcI4 { value } => Some(i64::from(*value)),
            InstructionKind::LdcI8 { value } => Some(*value),
            InstructionKind::Conv {
                target_type: PrimitiveType::I | PrimitiveType::U | PrimitiveType::I8,
                check_for_overflow: false,
                ..
            } => self.match_ldc_i4(self.first_child(id)?).map(i64::from),
            _ => None,
        }
    }

    /// `ldnull`
    #[must_use]
    pub fn match_ld_null(&self, id: InstrId) -> bool {
        self.opcode(id) == OpCode::LdNull
    }

    /// `br target`
    #[must_use]
    pub fn match_branch(&self, id: InstrId) -> Option<InstrId> {
        match self.kind(id) {
            InstructionKind::Branch { target } => Some(*target),
            _ => None,
        }
    }

    /// `leave container` without a value.
    #[must_use]
    pub fn match_leave(&self, id: InstrId) -> Option<InstrId> {
        match self.kind(id) {
            InstructionKind::Leave { target_container }
                if self.first_child(id).is_some_and(|v| self.match_nop(v)) =>
            {
                Some(*target_container)
            }
            _ => None,
        }
    }

    /// `return value`, with `None` for a void return.
    #[must_use]
    pub fn match_return(&self, id: InstrId) -> Option<Option<InstrId>> {
        match self.kind(id) {
            InstructionKind::Return => {
                let value = self.first_child(id)?;
                Some((!self.match_nop(value)).then_some(value))
            }
            _ => None,
        }
    }

    /// `if (condition) true_inst else false_inst`
    #[must_use]
    pub fn match_if_instruction(&self, id: InstrId) -> Option<(InstrId, InstrId, InstrId)> {
        if self.opcode(id) != OpCode::IfInstruction {
            return None;
        }
        let condition = self.first_child(id)?;
        let true_inst = self.next_sibling(condition)?;
        let false_inst = self.next_sibling(true_inst)?;
        Some((condition, true_inst, false_inst))
    }

    /// `if (condition) true_inst` with an empty false branch.
    #[must_use]
    pub fn match_if_then(&self, id: InstrId) -> Option<(InstrId, InstrId)> {
        let (condition, true_inst, false_inst) = self.match_if_instruction(id)?;
        self.match_nop(false_inst).then_some((condition, true_inst))
    }

    /// A block ending in `if (condition) true_inst; false_inst` where both arms are jumps.
    #[must_use]
    pub fn match_if_at_end_of_block(&self, block: InstrId) -> Option<(InstrId, InstrId, InstrId)> {
        if self.opcode(block) != OpCode::Block {
            return None;
        }
        let false_inst = self.last_child(block)?;
        let if_inst = self.prev_sibling(false_inst)?;
        let (condition, true_inst) = self.match_if_then(if_inst)?;
        let jumps = |id| self.flags(id).contains(InstructionFlags::END_POINT_UNREACHABLE);
        (jumps(true_inst) && jumps(false_inst)).then_some((condition, true_inst, false_inst))
    }

    /// `logic.not(argument)`, also accepting `comp(argument == 0)` on an i4 argument.
    #[must_use]
    pub fn match_logic_not(&self, id: InstrId) -> Option<InstrId> {
        match self.kind(id) {
            InstructionKind::LogicNot => self.first_child(id),
            InstructionKind::Comp {
                kind: ComparisonKind::Equality,
                is_lifted: false,
                ..
            } => {
                let (left, right) = self.two_children(id)?;
                (self.match_ldc_i4_value(right, 0)
                    && self.opcode(left) == OpCode::Comp)
                    .then_some(left)
            }
            _ => None,
        }
    }

    /// Any non-lifted comparison.
    #[must_use]
    pub fn match_comp(&self, id: InstrId) -> Option<CompMatch> {
        match self.kind(id) {
            InstructionKind::Comp {
                kind,
                sign,
                is_lifted: false,
                ..
            } => {
                let (left, right) = self.two_children(id)?;
                Some(CompMatch {
                    kind: *kind,
                    sign: *sign,
                    left,
                    right,
                })
            }
            _ => None,
        }
    }

    /// `comp(left == right)`
    #[must_use]
    pub fn match_comp_equals(&self, id: InstrId) -> Option<(InstrId, InstrId)> {
        self.match_comp(id)
            .filter(|comp| comp.kind == ComparisonKind::Equality)
            .map(|comp| (comp.left, comp.right))
    }

    /// `comp(left != right)`
    #[must_use]
    pub fn match_comp_not_equals(&self, id: InstrId) -> Option<(InstrId, InstrId)> {
        self.match_comp(id)
            .filter(|comp| comp.kind == ComparisonKind::Inequality)
            .map(|comp| (comp.left, comp.right))
    }

    /// Any non-lifted binary numeric instruction.
    #[must_use]
    pub fn match_binary_numeric(&self, id: InstrId) -> Option<BinaryMatch> {
        match self.kind(id) {
            InstructionKind::BinaryNumeric {
                operator,
                check_for_overflow,
                sign,
                is_lifted: false,
                ..
            } => {
                let (left, right) = self.two_children(id)?;
                Some(BinaryMatch {
                    operator: *operator,
                    check_for_overflow: *check_for_overflow,
                    sign: *sign,
                    left,
                    right,
                })
            }
            _ => None,
        }
    }

    /// A binary instruction with a specific operator.
    #[must_use]
    pub fn match_binary_op(
        &self,
        id: InstrId,
        operator: BinaryNumericOperator,
    ) -> Option<(InstrId, InstrId)> {
        self.match_binary_numeric(id)
            .filter(|bin| bin.operator == operator)
            .map(|bin| (bin.left, bin.right))
    }

    /// `ldobj ty(target)`
    #[must_use]
    pub fn match_ld_obj(&self, id: InstrId) -> Option<(InstrId, &IlType)> {
        match self.kind(id) {
            InstructionKind::LdObj { ty } => Some((self.first_child(id)?, ty)),
            _ => None,
        }
    }

    /// `stobj ty(target, value)`
    #[must_use]
    pub fn match_st_obj(&self, id: InstrId) -> Option<(InstrId, InstrId, &IlType)> {
        match self.kind(id) {
            InstructionKind::StObj { ty } => {
                let (target, value) = self.two_children(id)?;
                Some((target, value, ty))
            }
            _ => None,
        }
    }

    /// Unchecked or checked `conv` with its target type.
    #[must_use]
    pub fn match_conv(&self, id: InstrId) -> Option<(InstrId, PrimitiveType)> {
        match self.kind(id) {
            InstructionKind::Conv { target_type, .. } => Some((self.first_child(id)?, *target_type)),
            _ => None,
        }
    }

    /// `call`/`callvirt` with the method and argument list.
    #[must_use]
    pub fn match_call(&self, id: InstrId) -> Option<(&MethodRef, Vec<InstrId>)> {
        match self.kind(id) {
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                Some((method, self.child_list(id)))
            }
            _ => None,
        }
    }

    /// `sizeof(ty)`
    #[must_use]
    pub fn match_size_of(&self, id: InstrId) -> Option<&IlType> {
        match self.kind(id) {
            InstructionKind::SizeOf { ty } => Some(ty),
            _ => None,
        }
    }

    /// Structural match of the subtree `other` against the template subtree `pattern`.
    ///
    /// Payloads are compared exactly (operator, overflow checking, sign, liftedness,
    /// variables, branch targets); on success `other` is recorded under `"root"`. `m` is
    /// left untouched on failure.
    pub fn perform_match(&self, pattern: InstrId, other: InstrId, m: &mut Match<InstrId>) -> bool {
        if self.structurally_equal(pattern, other) {
            m.add("root", other);
            true
        } else {
            false
        }
    }
}

impl PatternTree for ILFunction {
    type Node = InstrId;

    fn pattern_children(&self, node: InstrId) -> Vec<InstrId> {
        self.child_list(node)
    }

    fn payload_equal(&self, a: InstrId, b: InstrId) -> bool {
        self.kind(a).payload_matches(self.kind(b))
    }

    fn identifier(&self, node: InstrId) -> Option<String> {
        match self.kind(node) {
            InstructionKind::LdLoc { variable }
            | InstructionKind::LdLoca { variable }
            | InstructionKind::StLoc { variable } => Some(self.variable(*variable).name.clone()),
            InstructionKind::LdFlda { field } | InstructionKind::LdsFlda { field } => {
                Some(field.name.clone())
            }
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                Some(method.name.clone())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{ILVariable, VariableKind},
        Result,
    };

    #[test]
    fn test_match_store_of_add() -> Result<()> {
        let mut func = ILFunction::new("M");
        let x = func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "x",
        ));
        let load = func.ld_loc(x);
        let one = func.ldc_i4(1);
        let add = func.binary(BinaryNumericOperator::Add, load, one)?;
        let store = func.st_loc(x, add)?;

        let (var, value) = func.match_st_loc(store).ok_or(crate::Error::ForeignNode)?;
        assert_eq!(var, x);
        let bin = func.match_binary_numeric(value).ok_or(crate::Error::ForeignNode)?;
        assert_eq!(bin.operator, BinaryNumericOperator::Add);
        assert!(func.match_ld_loc_of(bin.left, x));
        assert_eq!(func.match_ldc_i(bin.right), Some(1));
        assert!(func.match_binary_op(value, BinaryNumericOperator::Sub).is_none());
        Ok(())
    }

    #[test]
    fn test_match_logic_not_accepts_comp_with_zero() -> Result<()> {
        let mut func = ILFunction::new("M");
        let a = func.ldc_i4(1);
        let b = func.ldc_i4(2);
        let inner = func.comp(ComparisonKind::LessThan, Sign::Signed, a, b)?;
        let zero = func.ldc_i4(0);
        let outer = func.comp(ComparisonKind::Equality, Sign::None, inner, zero)?;
        assert_eq!(func.match_logic_not(outer), Some(inner));

        let plain = func.logic_not(outer)?;
        assert_eq!(func.match_logic_not(plain), Some(outer));
        Ok(())
    }

    #[test]
    fn test_match_if_then_and_return() -> Result<()> {
        let mut func = ILFunction::new("M");
        let cond = func.ldc_i4(1);
        let value = func.ldc_i4(7);
        let ret = func.ret(Some(value))?;
        let if_inst = func.if_then(cond, ret)?;
        assert_eq!(func.match_if_then(if_inst), Some((cond, ret)));
        assert_eq!(func.match_return(ret), Some(Some(value)));

        let void_ret = func.ret(None)?;
        assert_eq!(func.match_return(void_ret), Some(None));
        Ok(())
    }

    #[test]
    fn test_perform_match_compares_payloads() -> Result<()> {
        let mut func = ILFunction::new("M");
        let x = func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "x",
        ));
        let template = {
            let load = func.ld_loc(x);
            let one = func.ldc_i4(1);
            func.binary(BinaryNumericOperator::Add, load, one)?
        };
        let same = func.clone_subtree(template);
        let checked = {
            let load = func.ld_loc(x);
            let one = func.ldc_i4(1);
            func.binary_with(BinaryNumericOperator::Add, load, one, true, Sign::Signed)?
        };

        let mut m = Match::new();
        assert!(func.perform_match(template, same, &mut m));
        assert_eq!(m.first("root"), Some(same));

        let mut m = Match::new();
        assert!(!func.perform_match(template, checked, &mut m));
        assert!(m.is_empty());
        Ok(())
    }
}
