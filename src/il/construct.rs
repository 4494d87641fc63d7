//! Convenience constructors for building instruction trees.
//!
//! These helpers are the construction surface used by the IL reader that feeds this
//! crate, by the transforms when they synthesize new instructions, and by tests. Each
//! helper allocates a node, attaches the given (detached) children in slot order and
//! returns the new, still detached, node.
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::il::{ILFunction, ILVariable, IlType, PrimitiveType, VariableKind, BinaryNumericOperator};
//!
//! let mut func = ILFunction::new("Increment");
//! let x = func.add_variable(ILVariable::new(
//!     VariableKind::Local,
//!     IlType::primitive(PrimitiveType::I4),
//!     "x",
//! ));
//! let load = func.ld_loc(x);
//! let one = func.ldc_i4(1);
//! let add = func.binary(BinaryNumericOperator::Add, load, one)?;
//! let store = func.st_loc(x, add)?;
//! assert_eq!(func.child_count(store), 1);
//! # Ok::<(), cildecomp::Error>(())
//! ```

use crate::{
    analysis::LongSet,
    il::{
        function::{ILFunction, InstrId},
        opcode::{BinaryNumericOperator, ComparisonKind, ContainerKind, InstructionKind},
        types::{FieldRef, IlType, MethodRef, PrimitiveType, Sign, StackType},
        variable::VarId,
    },
    Result,
};

impl ILFunction {
    /// Allocates a node of `kind` and attaches `children` in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any child is already attached.
    pub fn make(&mut self, kind: InstructionKind, children: &[InstrId]) -> Result<InstrId> {
        let id = self.create(kind);
        for &child in children {
            self.add_child(id, child)?;
        }
        Ok(id)
    }

    /// `nop`
    pub fn nop(&mut self) -> InstrId {
        self.create(InstructionKind::Nop)
    }

    /// A block holding `instructions`.
    ///
    /// # Errors
    ///
    /// Returns an error if any instruction is already attached.
    pub fn block(&mut self, instructions: &[InstrId]) -> Result<InstrId> {
        self.make(
            InstructionKind::Block {
                incoming_edge_count: 0,
            },
            instructions,
        )
    }

    /// A detached, empty block container.
    pub fn container(&mut self, kind: ContainerKind) -> InstrId {
        self.create(InstructionKind::BlockContainer {
            kind,
            expected_result_type: StackType::Void,
        })
    }

    /// `br target`
    pub fn branch(&mut self, target: InstrId) -> InstrId {
        self.create(InstructionKind::Branch { target })
    }

    /// `leave container` without a value.
    ///
    /// # Errors
    ///
    /// Propagates attachment errors of the implicit `nop` value.
    pub fn leave(&mut self, target_container: InstrId) -> Result<InstrId> {
        let value = self.nop();
        self.make(InstructionKind::Leave { target_container }, &[value])
    }

    /// `return` with an optional value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is already attached.
    pub fn ret(&mut self, value: Option<InstrId>) -> Result<InstrId> {
        let value = match value {
            Some(value) => value,
            None => self.nop(),
        };
        self.make(InstructionKind::Return, &[value])
    }

    /// `throw argument`
    ///
    /// # Errors
    ///
    /// Returns an error if `argument` is already attached.
    pub fn throw(&mut self, argument: InstrId) -> Result<InstrId> {
        self.make(InstructionKind::Throw, &[argument])
    }

    /// `if (condition) true_inst else false_inst`
    ///
    /// # Errors
    ///
    /// Returns an error if any operand is already attached.
    pub fn if_else(
        &mut self,
        condition: InstrId,
        true_inst: InstrId,
        false_inst: InstrId,
    ) -> Result<InstrId> {
        self.make(
            InstructionKind::IfInstruction,
            &[condition, true_inst, false_inst],
        )
    }

    /// `if (condition) true_inst` with a `nop` false branch.
    ///
    /// # Errors
    ///
    /// Returns an error if any operand is already attached.
    pub fn if_then(&mut self, condition: InstrId, true_inst: InstrId) -> Result<InstrId> {
        let false_inst = self.nop();
        self.if_else(condition, true_inst, false_inst)
    }

    /// A switch over `value` with `(labels, body)` sections.
    ///
    /// # Errors
    ///
    /// Returns an error if any operand is already attached.
    pub fn switch(&mut self, value: InstrId, sections: Vec<(LongSet, InstrId)>) -> Result<InstrId> {
        let switch = self.make(InstructionKind::Switch { is_lifted: false }, &[value])?;
        for (labels, body) in sections {
            let section = self.make(
                InstructionKind::SwitchSection {
                    labels,
                    has_null_label: false,
                },
                &[body],
            )?;
            self.add_child(switch, section)?;
        }
        Ok(switch)
    }

    /// `ldloc variable`
    pub fn ld_loc(&mut self, variable: VarId) -> InstrId {
        self.create(InstructionKind::LdLoc { variable })
    }

    /// `ldloca variable`
    pub fn ld_loca(&mut self, variable: VarId) -> InstrId {
        self.create(InstructionKind::LdLoca { variable })
    }

    /// `stloc variable(value)`
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is already attached.
    pub fn st_loc(&mut self, variable: VarId, value: InstrId) -> Result<InstrId> {
        self.make(InstructionKind::StLoc { variable }, &[value])
    }

    /// `ldc.i4 value`
    pub fn ldc_i4(&mut self, value: i32) -> InstrId {
        self.create(InstructionKind::LdcI4 { value })
    }

    /// `ldc.i8 value`
    pub fn ldc_i8(&mut self, value: i64) -> InstrId {
        self.create(InstructionKind::LdcI8 { value })
    }

    /// `ldc.r8 value`
    pub fn ldc_f8(&mut self, value: f64) -> InstrId {
        self.create(InstructionKind::LdcF8 { value })
    }

    /// `ldnull`
    pub fn ld_null(&mut self) -> InstrId {
        self.create(InstructionKind::LdNull)
    }

    /// `ldstr value`
    pub fn ld_str(&mut self, value: &str) -> InstrId {
        self.create(InstructionKind::LdStr {
            value: value.to_string(),
        })
    }

    /// `ldobj ty(target)`
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is already attached.
    pub fn ld_obj(&mut self, target: InstrId, ty: IlType) -> Result<InstrId> {
        self.make(InstructionKind::LdObj { ty }, &[target])
    }

    /// `stobj ty(target, value)`
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is already attached.
    pub fn st_obj(&mut self, target: InstrId, value: InstrId, ty: IlType) -> Result<InstrId> {
        self.make(InstructionKind::StObj { ty }, &[target, value])
    }

    /// `ldflda field(target)`
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is already attached.
    pub fn ld_flda(&mut self, target: InstrId, field: FieldRef) -> Result<InstrId> {
        self.make(InstructionKind::LdFlda { field }, &[target])
    }

    /// Unchecked, sign-agnostic binary operation.
    ///
    /// Input stack types are taken from the operands.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is already attached.
    pub fn binary(
        &mut self,
        operator: BinaryNumericOperator,
        left: InstrId,
        right: InstrId,
    ) -> Result<InstrId> {
        let sign = if operator.is_sign_sensitive() {
            Sign::Signed
        } else {
            Sign::None
        };
        self.binary_with(operator, left, right, false, sign)
    }

    /// Binary operation with explicit overflow checking and sign.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is already attached.
    pub fn binary_with(
        &mut self,
        operator: BinaryNumericOperator,
        left: InstrId,
        right: InstrId,
        check_for_overflow: bool,
        sign: Sign,
    ) -> Result<InstrId> {
        let left_input_type = self.stack_type(left);
        let right_input_type = self.stack_type(right);
        self.make(
            InstructionKind::BinaryNumeric {
                operator,
                check_for_overflow,
                sign,
                left_input_type,
                right_input_type,
                is_lifted: false,
            },
            &[left, right],
        )
    }

    /// Comparison with the input type taken from the left operand.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is already attached.
    pub fn comp(
        &mut self,
        kind: ComparisonKind,
        sign: Sign,
        left: InstrId,
        right: InstrId,
    ) -> Result<InstrId> {
        let input_type = self.stack_type(left);
        self.make(
            InstructionKind::Comp {
                kind,
                sign,
                input_type,
                is_lifted: false,
            },
            &[left, right],
        )
    }

    /// `logic.not(argument)`
    ///
    /// # Errors
    ///
    /// Returns an error if `argument` is already attached.
    pub fn logic_not(&mut self, argument: InstrId) -> Result<InstrId> {
        self.make(InstructionKind::LogicNot, &[argument])
    }

    /// Unchecked conversion to `target_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if `argument` is already attached.
    pub fn conv(&mut self, argument: InstrId, target_type: PrimitiveType) -> Result<InstrId> {
        self.make(
            InstructionKind::Conv {
                target_type,
                check_for_overflow: false,
                input_sign: Sign::None,
            },
            &[argument],
        )
    }

    /// `call method(arguments...)`
    ///
    /// # Errors
    ///
    /// Returns an error if an argument is already attached.
    pub fn call(&mut self, method: MethodRef, arguments: &[InstrId]) -> Result<InstrId> {
        self.make(InstructionKind::Call { method }, arguments)
    }

    /// `callvirt method(arguments...)`
    ///
    /// # Errors
    ///
    /// Returns an error if an argument is already attached.
    pub fn call_virt(&mut self, method: MethodRef, arguments: &[InstrId]) -> Result<InstrId> {
        self.make(InstructionKind::CallVirt { method }, arguments)
    }

    /// Appends a block to a container and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is already attached.
    pub fn append_block(&mut self, container: InstrId, block: InstrId) -> Result<InstrId> {
        self.add_child(container, block)?;
        Ok(block)
    }
}
