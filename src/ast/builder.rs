//! Conversion of a transformed function body into a method declaration.
//!
//! Structured instructions map onto statements directly:
//!
//! | Instruction                         | Statement                                  |
//! |-------------------------------------|--------------------------------------------|
//! | `Loop` block container              | `while (true) { ... }`                     |
//! | `br` to the entry of the innermost loop | `continue;`                            |
//! | `leave` of the innermost loop       | `break;` (unless a `switch` is in between) |
//! | `leave` of the function body        | `return;`                                  |
//! | any other `br` / `leave`            | `goto` plus a label at the target          |
//! | `if`                                | `if`/`else`, chained as `else if`          |
//! | `switch`                            | `switch` with `case` labels per value      |
//! | `compound.op(addr, 1)`              | `x++` / `++x` / `x--` / `--x`              |
//! | `try.catch` / `try.finally`         | `try { } catch (T e) when (c) { } finally { }` |
//! | `try.fault`                         | `try { } catch { fault; throw; }`          |
//! | `lock` / `using`                    | `lock (e) { }` / `using (T v = e) { }`     |
//!
//! Labels are only emitted for blocks that a `goto` actually targets. A `leave` that ends
//! the last block of its container prints as nothing, since control falls out of the
//! printed block anyway.
//!
//! # Operand signs
//!
//! C# picks signed or unsigned division, remainder, right shift and comparison from the
//! operand types, IL from the instruction. Where the two disagree the operands are cast,
//! e.g. `div.un(a, b)` on two `int`s prints as `(uint)a / (uint)b`. Negative constants in
//! an unsigned operation print as their unsigned value instead. Overflow-checked
//! arithmetic and conversions print inside `checked(...)`, checked compound statements
//! inside `checked { }`.

use rustc_hash::FxHashSet;

use crate::{
    ast::{
        node::{
            AssignmentOperator, AstKind, BinaryOperator, FieldDirection, Literal, Role,
            UnaryOperator,
        },
        tree::{AstId, Mutable, SyntaxTree},
    },
    il::{
        BinaryNumericOperator, ComparisonKind, CompoundEvalMode, CompoundTargetKind,
        ContainerKind, ILFunction, IlType, InstrId, InstructionFlags, InstructionKind, MethodRef,
        OpCode, PrimitiveType, Sign, StackType, VarId, VariableKind,
    },
    transforms::MAX_CASE_LABELS,
    Error, Result,
};

/// Builds the syntax tree of `func`, rooted at a [`AstKind::Method`].
///
/// The tree is returned mutable so that parentheses can still be inserted.
///
/// # Errors
///
/// Returns [`Error::NotSupported`] for filter blocks, invalid instructions and values
/// C# cannot express, and invariant violations for malformed bodies.
pub fn build_method(func: &ILFunction) -> Result<SyntaxTree<Mutable>> {
    AstBuilder::new(func).build()
}

fn binary_operator(operator: BinaryNumericOperator) -> BinaryOperator {
    match operator {
        BinaryNumericOperator::Add => BinaryOperator::Add,
        BinaryNumericOperator::Sub => BinaryOperator::Subtract,
        BinaryNumericOperator::Mul => BinaryOperator::Multiply,
        BinaryNumericOperator::Div => BinaryOperator::Divide,
        BinaryNumericOperator::Rem => BinaryOperator::Modulus,
        BinaryNumericOperator::BitAnd => BinaryOperator::BitwiseAnd,
        BinaryNumericOperator::BitOr => BinaryOperator::BitwiseOr,
        BinaryNumericOperator::BitXor => BinaryOperator::ExclusiveOr,
        BinaryNumericOperator::ShiftLeft => BinaryOperator::ShiftLeft,
        BinaryNumericOperator::ShiftRight => BinaryOperator::ShiftRight,
    }
}

fn assignment_operator(operator: BinaryNumericOperator) -> AssignmentOperator {
    match operator {
        BinaryNumericOperator::Add => AssignmentOperator::Add,
        BinaryNumericOperator::Sub => AssignmentOperator::Subtract,
        BinaryNumericOperator::Mul => AssignmentOperator::Multiply,
        BinaryNumericOperator::Div => AssignmentOperator::Divide,
        BinaryNumericOperator::Rem => AssignmentOperator::Modulus,
        BinaryNumericOperator::BitAnd => AssignmentOperator::BitwiseAnd,
        BinaryNumericOperator::BitOr => AssignmentOperator::BitwiseOr,
        BinaryNumericOperator::BitXor => AssignmentOperator::ExclusiveOr,
        BinaryNumericOperator::ShiftLeft => AssignmentOperator::ShiftLeft,
        BinaryNumericOperator::ShiftRight => AssignmentOperator::ShiftRight,
    }
}

fn comparison_operator(kind: ComparisonKind) -> BinaryOperator {
    match kind {
        ComparisonKind::Equality => BinaryOperator::Equality,
        ComparisonKind::Inequality => BinaryOperator::InEquality,
        ComparisonKind::LessThan => BinaryOperator::LessThan,
        ComparisonKind::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
        ComparisonKind::GreaterThan => BinaryOperator::GreaterThan,
        ComparisonKind::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
    }
}

fn label_name(block: InstrId) -> String {
    format!("label_{}", block.index())
}

fn exit_label_name(container: InstrId) -> String {
    format!("exit_{}", container.index())
}

fn is_loop_container(func: &ILFunction, node: InstrId) -> bool {
    matches!(
        func.kind(node),
        InstructionKind::BlockContainer {
            kind: ContainerKind::Loop,
            ..
        }
    )
}

/// `br target` prints as `continue` when it jumps to the entry of its innermost loop.
fn is_continue(func: &ILFunction, branch: InstrId, target: InstrId) -> bool {
    let Some(container) = func.parent(target) else {
        return false;
    };
    is_loop_container(func, container)
        && func.entry_block(container) == Some(target)
        && func
            .ancestors(branch)
            .into_iter()
            .find(|&a| is_loop_container(func, a))
            == Some(container)
}

/// `leave container` as the last instruction of a plain container's last block.
fn falls_out(func: &ILFunction, leave: InstrId, container: InstrId) -> bool {
    container != func.body()
        && matches!(
            func.kind(container),
            InstructionKind::BlockContainer {
                kind: ContainerKind::Normal,
                ..
            }
        )
        && func.match_leave(leave).is_some()
        && func.parent(leave).is_some_and(|block| {
            func.last_child(block) == Some(leave)
                && func.parent(block) == Some(container)
                && func.last_child(container) == Some(block)
        })
}

/// Sign the operation takes from its operands in C#, `None` when it does not depend on it.
fn operation_sign(operator: BinaryNumericOperator, sign: Sign, check_for_overflow: bool) -> Sign {
    let sensitive = operator.is_sign_sensitive()
        || (check_for_overflow
            && matches!(
                operator,
                BinaryNumericOperator::Add | BinaryNumericOperator::Sub | BinaryNumericOperator::Mul
            ));
    if sensitive {
        sign
    } else {
        Sign::None
    }
}

/// Sign of a value of `ty` after C# promotes it for arithmetic.
fn promoted_sign(ty: &IlType) -> Sign {
    match ty.storage_primitive() {
        Some(prim) if prim.is_small_integer() => Sign::Signed,
        _ => ty.sign(),
    }
}

/// The integer type of `stack` with the given sign.
fn integer_type(stack: StackType, sign: Sign) -> PrimitiveType {
    match (stack, sign == Sign::Unsigned) {
        (StackType::I8, true) => PrimitiveType::U8,
        (StackType::I8, false) => PrimitiveType::I8,
        (StackType::I, true) => PrimitiveType::U,
        (StackType::I, false) => PrimitiveType::I,
        (_, true) => PrimitiveType::U4,
        (_, false) => PrimitiveType::I4,
    }
}

/// `leave loop` prints as `break` when no `switch` or inner loop captures the `break`.
fn is_break(func: &ILFunction, leave: InstrId, container: InstrId) -> bool {
    is_loop_container(func, container)
        && func
            .ancestors(leave)
            .into_iter()
            .find(|&a| is_loop_container(func, a) || func.opcode(a) == OpCode::Switch)
            == Some(container)
}

struct AstBuilder<'f> {
    func: &'f ILFunction,
    tree: SyntaxTree<Mutable>,
    labels: FxHashSet<InstrId>,
    exit_labels: FxHashSet<InstrId>,
    /// Variables declared by a `catch` clause or a `using` statement
    scoped: FxHashSet<VarId>,
}

impl<'f> AstBuilder<'f> {
    fn new(func: &'f ILFunction) -> Self {
        let mut labels = FxHashSet::default();
        let mut exit_labels = FxHashSet::default();
        let mut scoped = FxHashSet::default();
        for node in func.descendants(func.body()) {
            match *func.kind(node) {
                InstructionKind::Branch { target } if !is_continue(func, node, target) => {
                    labels.insert(target);
                }
                InstructionKind::Leave { target_container }
                    if target_container != func.body()
                        && !is_break(func, node, target_container)
                        && !falls_out(func, node, target_container) =>
                {
                    exit_labels.insert(target_container);
                }
                InstructionKind::TryCatchHandler { variable }
                | InstructionKind::Using { variable, .. } => {
                    scoped.insert(variable);
                }
                _ => {}
            }
        }
        Self {
            func,
            tree: SyntaxTree::new(),
            labels,
            exit_labels,
            scoped,
        }
    }

    fn slot(&self, inst: InstrId, index: usize) -> Result<InstrId> {
        self.func
            .child(inst, index)
            .ok_or_else(|| invariant_error!("{} has no child {}", inst, index))
    }

    fn build(mut self) -> Result<SyntaxTree<Mutable>> {
        let func = self.func;
        let has_this = func
            .variables()
            .any(|(_, v)| v.kind == VariableKind::Parameter && v.name == "this");
        let return_type = self.ast_type(func.return_type())?;
        let method = self.tree.make(
            AstKind::Method {
                name: func.name().to_string(),
                is_static: !has_this,
            },
            &[(Role::ReturnType, return_type)],
        )?;

        let mut parameters: Vec<_> = func
            .variables()
            .filter(|(_, v)| v.kind == VariableKind::Parameter && v.name != "this")
            .collect();
        parameters.sort_by_key(|(id, v)| (v.index, *id));
        for (_, variable) in parameters {
            let ty = self.ast_type(&variable.ty)?;
            let parameter = self.tree.make(
                AstKind::Parameter {
                    name: variable.name.clone(),
                },
                &[(Role::Type, ty)],
            )?;
            self.tree.add_child(method, Role::Parameter, parameter)?;
        }

        let mut statements = Vec::new();
        for (id, variable) in func.variables() {
            if variable.kind == VariableKind::Parameter
                || variable.is_unused()
                || self.scoped.contains(&id)
            {
                continue;
            }
            let ty = self.ast_type(&variable.ty)?;
            statements.push(self.tree.make(
                AstKind::VariableDeclaration {
                    name: variable.name.clone(),
                },
                &[(Role::Type, ty)],
            )?);
        }
        self.container_statements(func.body(), &mut statements)?;
        let body = self.tree.block_statement(&statements)?;
        self.tree.add_child(method, Role::Body, body)?;
        self.tree.set_root(method)?;

        log::trace!(
            "{}: built {} syntax nodes",
            func.name(),
            self.tree.node_count()
        );
        Ok(self.tree)
    }

    // ============================================================================================
    // Statements
    // ============================================================================================

    fn container_statements(&mut self, container: InstrId, out: &mut Vec<AstId>) -> Result<()> {
        let func = self.func;
        for block in func.children(container) {
            if self.labels.contains(&block) {
                out.push(self.tree.create(AstKind::Label {
                    label: label_name(block),
                }));
            }
            self.block_statements(block, out)?;
        }
        Ok(())
    }

    fn block_statements(&mut self, block: InstrId, out: &mut Vec<AstId>) -> Result<()> {
        let func = self.func;
        for inst in func.children(block) {
            self.statement(inst, out)?;
        }
        Ok(())
    }

    /// The statements of a container, or of any other instruction, as a block.
    fn container_block(&mut self, inst: InstrId) -> Result<AstId> {
        let mut statements = Vec::new();
        if self.func.opcode(inst) == OpCode::BlockContainer {
            self.container_statements(inst, &mut statements)?;
        } else {
            self.statement(inst, &mut statements)?;
        }
        self.tree.block_statement(&statements)
    }

    fn exit_label(&mut self, container: InstrId, out: &mut Vec<AstId>) {
        if self.exit_labels.contains(&container) {
            out.push(self.tree.create(AstKind::Label {
                label: exit_label_name(container),
            }));
        }
    }

    /// Statements of `inst` wrapped in a block.
    fn embedded(&mut self, inst: InstrId) -> Result<AstId> {
        let mut statements = Vec::new();
        self.statement(inst, &mut statements)?;
        self.tree.block_statement(&statements)
    }

    fn statement(&mut self, inst: InstrId, out: &mut Vec<AstId>) -> Result<()> {
        let func = self.func;
        match func.kind(inst) {
            InstructionKind::Nop => {}
            InstructionKind::Block { .. } => self.block_statements(inst, out)?,
            InstructionKind::BlockContainer { kind, .. } => {
                let mut body = Vec::new();
                self.container_statements(inst, &mut body)?;
                let block = self.tree.block_statement(&body)?;
                if *kind == ContainerKind::Loop {
                    let condition = self.tree.literal(Literal::Bool(true));
                    out.push(self.tree.make(
                        AstKind::While,
                        &[(Role::Condition, condition), (Role::EmbeddedStatement, block)],
                    )?);
                } else {
                    out.push(block);
                }
                self.exit_label(inst, out);
            }
            InstructionKind::IfInstruction => out.push(self.if_statement(inst)?),
            InstructionKind::Switch { .. } => out.push(self.switch_statement(inst)?),
            InstructionKind::Branch { target } => {
                let statement = if is_continue(func, inst, *target) {
                    AstKind::Continue
                } else {
                    AstKind::Goto {
                        label: label_name(*target),
                    }
                };
                out.push(self.tree.create(statement));
            }
            InstructionKind::Leave { target_container } => {
                if !falls_out(func, inst, *target_container) {
                    out.push(self.leave_statement(inst, *target_container)?);
                }
            }
            InstructionKind::Return => {
                let value = self.optional_value(inst)?;
                out.push(self.tree.return_statement(value)?);
            }
            InstructionKind::Throw => {
                let argument = self.slot(inst, 0)?;
                let value = self.expression(argument)?;
                out.push(self.tree.make(AstKind::Throw, &[(Role::Expression, value)])?);
            }
            InstructionKind::Rethrow => out.push(self.tree.create(AstKind::Throw)),
            InstructionKind::NumericCompoundAssign {
                check_for_overflow, ..
            } => {
                let expr = self.compound(inst, true)?;
                let statement = self.tree.expression_statement(expr)?;
                if *check_for_overflow {
                    let body = self.tree.block_statement(&[statement])?;
                    out.push(self.tree.make(AstKind::CheckedStatement, &[(Role::Body, body)])?);
                } else {
                    out.push(statement);
                }
            }
            InstructionKind::TryCatch | InstructionKind::TryFinally | InstructionKind::TryFault => {
                out.push(self.try_statement(inst)?);
                let mut containers = vec![self.slot(inst, 0)?];
                if func.opcode(inst) == OpCode::TryCatch {
                    for handler in func.children(inst).skip(1) {
                        containers.push(self.slot(handler, 1)?);
                    }
                } else {
                    containers.push(self.slot(inst, 1)?);
                }
                for container in containers {
                    self.exit_label(container, out);
                }
            }
            InstructionKind::Lock => {
                let value = self.expression(self.slot(inst, 0)?)?;
                let container = self.slot(inst, 1)?;
                let body = self.container_block(container)?;
                out.push(self.tree.make(
                    AstKind::Lock,
                    &[(Role::Expression, value), (Role::EmbeddedStatement, body)],
                )?);
                self.exit_label(container, out);
            }
            InstructionKind::Using { variable, is_async } => {
                let var = func.variable(*variable);
                let ty = self.ast_type(&var.ty)?;
                let resource = self.expression(self.slot(inst, 0)?)?;
                let declaration = self.tree.variable_declaration(&var.name, ty, Some(resource))?;
                let container = self.slot(inst, 1)?;
                let body = self.container_block(container)?;
                out.push(self.tree.make(
                    AstKind::Using {
                        is_async: *is_async,
                    },
                    &[
                        (Role::ResourceAcquisition, declaration),
                        (Role::EmbeddedStatement, body),
                    ],
                )?);
                self.exit_label(container, out);
            }
            InstructionKind::TryCatchHandler { .. } => {
                return Err(invariant_error!("{} outside of a try.catch", inst));
            }
            InstructionKind::InvalidBranch { message } => {
                return Err(Error::NotSupported(format!("invalid branch: {message}")));
            }
            _ => {
                let expr = self.expression(inst)?;
                out.push(self.tree.expression_statement(expr)?);
            }
        }
        Ok(())
    }

    /// The value slot of a `ret`/`leave`, `None` when it holds a `nop`.
    fn optional_value(&mut self, inst: InstrId) -> Result<Option<AstId>> {
        match self.func.child(inst, 0) {
            Some(value) if !self.func.match_nop(value) => Ok(Some(self.expression(value)?)),
            _ => Ok(None),
        }
    }

    fn leave_statement(&mut self, leave: InstrId, container: InstrId) -> Result<AstId> {
        let func = self.func;
        if container == func.body() {
            let value = self.optional_value(leave)?;
            return self.tree.return_statement(value);
        }
        if self.optional_value(leave)?.is_some() {
            return Err(Error::NotSupported(format!(
                "leave with a value from {} in {}",
                container,
                func.name()
            )));
        }
        if self.exit_labels.contains(&container) {
            Ok(self.tree.create(AstKind::Goto {
                label: exit_label_name(container),
            }))
        } else {
            Ok(self.tree.create(AstKind::Break))
        }
    }

    fn try_statement(&mut self, inst: InstrId) -> Result<AstId> {
        let func = self.func;
        let body = self.container_block(self.slot(inst, 0)?)?;
        match func.kind(inst) {
            InstructionKind::TryCatch => {
                let clauses = func
                    .children(inst)
                    .skip(1)
                    .map(|handler| self.catch_clause(handler))
                    .collect::<Result<Vec<_>>>()?;
                self.tree.try_statement(body, &clauses, None)
            }
            InstructionKind::TryFinally => {
                let finally = self.container_block(self.slot(inst, 1)?)?;
                self.tree.try_statement(body, &[], Some(finally))
            }
            _ => {
                // A fault handler runs only on the exceptional path and rethrows
                let mut statements = Vec::new();
                self.container_statements(self.slot(inst, 1)?, &mut statements)?;
                let ends_in_jump = statements.last().is_some_and(|&last| {
                    matches!(self.tree.kind(last), AstKind::Throw | AstKind::Return)
                });
                if !ends_in_jump {
                    statements.push(self.tree.create(AstKind::Throw));
                }
                let handler = self.tree.block_statement(&statements)?;
                let clause = self
                    .tree
                    .make(AstKind::CatchClause { variable: None }, &[(Role::Body, handler)])?;
                self.tree.try_statement(body, &[clause], None)
            }
        }
    }

    fn catch_clause(&mut self, handler: InstrId) -> Result<AstId> {
        let func = self.func;
        let InstructionKind::TryCatchHandler { variable } = *func.kind(handler) else {
            return Err(invariant_error!("{} is not a catch handler", handler));
        };
        let var = func.variable(variable);
        let is_read = !var.loads().is_empty() || !var.address_uses().is_empty();
        let catches_everything = matches!(var.ty, IlType::Object | IlType::Unknown);

        let clause = self.tree.create(AstKind::CatchClause {
            variable: is_read.then(|| var.name.clone()),
        });
        if is_read || !catches_everything {
            let ty = if catches_everything {
                self.tree.named_type("System.Exception")?
            } else {
                self.ast_type(&var.ty)?
            };
            self.tree.add_child(clause, Role::Type, ty)?;
        }

        let filter = self.slot(handler, 0)?;
        if func.opcode(filter) == OpCode::BlockContainer {
            return Err(Error::NotSupported(format!(
                "filter block {} in {}",
                filter,
                func.name()
            )));
        }
        if !func.match_ldc_i4_value(filter, 1) {
            let condition = self.expression(filter)?;
            self.tree.add_child(clause, Role::Condition, condition)?;
        }

        let body = self.container_block(self.slot(handler, 1)?)?;
        self.tree.add_child(clause, Role::Body, body)?;
        Ok(clause)
    }

    fn if_statement(&mut self, inst: InstrId) -> Result<AstId> {
        let func = self.func;
        let condition = self.expression(self.slot(inst, 0)?)?;
        let then = self.embedded(self.slot(inst, 1)?)?;
        let false_inst = self.slot(inst, 2)?;
        let otherwise = if func.match_nop(false_inst) {
            None
        } else {
            let mut statements = Vec::new();
            self.statement(false_inst, &mut statements)?;
            match statements.as_slice() {
                [single] if *self.tree.kind(*single) == AstKind::IfElse => Some(*single),
                _ => Some(self.tree.block_statement(&statements)?),
            }
        };
        self.tree.if_else(condition, then, otherwise)
    }

    fn switch_statement(&mut self, inst: InstrId) -> Result<AstId> {
        let func = self.func;
        let value = self.expression(self.slot(inst, 0)?)?;
        let switch = self.tree.make(AstKind::Switch, &[(Role::Expression, value)])?;

        let sections: Vec<InstrId> = func.children(inst).skip(1).collect();
        let mut wide = Vec::new();
        for (index, &section) in sections.iter().enumerate() {
            if let InstructionKind::SwitchSection { labels, .. } = func.kind(section) {
                if labels.count() > MAX_CASE_LABELS {
                    wide.push(index);
                }
            }
        }
        if wide.len() > 1 {
            return Err(Error::NotSupported(format!(
                "switch {} in {} has {} sections too wide for case labels",
                inst,
                func.name(),
                wide.len()
            )));
        }
        let default_index = wide.first().copied();

        for (index, &section) in sections.iter().enumerate() {
            let InstructionKind::SwitchSection {
                labels,
                has_null_label,
            } = func.kind(section)
            else {
                return Err(invariant_error!("{} is not a switch section", section));
            };
            let node = self.tree.create(AstKind::SwitchSection);
            if *has_null_label {
                let null = self.tree.literal(Literal::Null);
                let label = self.tree.make(AstKind::CaseLabel, &[(Role::Expression, null)])?;
                self.tree.add_child(node, Role::CaseLabel, label)?;
            }
            if Some(index) == default_index {
                let label = self.tree.create(AstKind::CaseLabel);
                self.tree.add_child(node, Role::CaseLabel, label)?;
            } else {
                for value in labels.values() {
                    let constant = self.tree.literal(Literal::Int(value));
                    let label = self
                        .tree
                        .make(AstKind::CaseLabel, &[(Role::Expression, constant)])?;
                    self.tree.add_child(node, Role::CaseLabel, label)?;
                }
            }
            if self.tree.children(node).is_empty() {
                // No value reaches the section
                continue;
            }

            let body = self.slot(section, 0)?;
            let mut statements = Vec::new();
            self.statement(body, &mut statements)?;
            if !func.flags(body).contains(InstructionFlags::END_POINT_UNREACHABLE) {
                statements.push(self.tree.create(AstKind::Break));
            }
            for statement in statements {
                self.tree.add_child(node, Role::Statement, statement)?;
            }
            self.tree.add_child(switch, Role::SwitchSection, node)?;
        }
        Ok(switch)
    }

    // ============================================================================================
    // Expressions
    // ============================================================================================

    fn variable_ref(&mut self, variable: VarId) -> AstId {
        let var = self.func.variable(variable);
        if var.kind == VariableKind::Parameter && var.name == "this" {
            self.tree.create(AstKind::This)
        } else {
            self.tree.identifier(&var.name)
        }
    }

    fn is_address(&self, inst: InstrId) -> bool {
        matches!(
            self.func.opcode(inst),
            OpCode::LdLoca | OpCode::LdFlda | OpCode::LdsFlda | OpCode::LdElema
        )
    }

    /// The storage location an address points at.
    fn lvalue(&mut self, addr: InstrId) -> Result<AstId> {
        let func = self.func;
        match func.kind(addr) {
            InstructionKind::LdLoca { variable } => Ok(self.variable_ref(*variable)),
            InstructionKind::LdFlda { field } => {
                let target = self.receiver(self.slot(addr, 0)?)?;
                self.tree.member(target, &field.name)
            }
            InstructionKind::LdsFlda { field } => {
                let ty = self.tree.named_type(&field.declaring_type)?;
                let target = self.tree.type_reference(ty)?;
                self.tree.member(target, &field.name)
            }
            InstructionKind::LdElema { .. } => {
                let array = self.expression(self.slot(addr, 0)?)?;
                let indices = func
                    .children(addr)
                    .skip(1)
                    .map(|index| self.expression(index))
                    .collect::<Result<Vec<_>>>()?;
                self.tree.indexer(array, &indices)
            }
            _ => {
                let pointer = self.expression(addr)?;
                self.tree.unary(UnaryOperator::Dereference, pointer)
            }
        }
    }

    /// The object of a member access; value-type receivers are passed by address.
    fn receiver(&mut self, inst: InstrId) -> Result<AstId> {
        if self.is_address(inst) {
            self.lvalue(inst)
        } else {
            self.expression(inst)
        }
    }

    fn argument(&mut self, inst: InstrId) -> Result<AstId> {
        if self.is_address(inst) {
            let location = self.lvalue(inst)?;
            self.tree.direction(FieldDirection::Ref, location)
        } else {
            self.expression(inst)
        }
    }

    fn call_receiver(&mut self, method: &MethodRef, args: &[InstrId]) -> Result<(AstId, usize)> {
        if method.is_static {
            let ty = self.tree.named_type(&method.declaring_type)?;
            return Ok((self.tree.type_reference(ty)?, 0));
        }
        let this = args
            .first()
            .ok_or_else(|| invariant_error!("instance call to {} without a receiver", method))?;
        Ok((self.receiver(*this)?, 1))
    }

    fn call(&mut self, inst: InstrId, method: &MethodRef) -> Result<AstId> {
        let args = self.func.child_list(inst);
        let (receiver, skip) = self.call_receiver(method, &args)?;
        let rest = &args[skip..];
        match (method.getter_property(), method.setter_property(), rest) {
            (Some(property), _, []) => self.tree.member(receiver, property),
            (_, Some(property), [value]) => {
                let target = self.tree.member(receiver, property)?;
                let value = self.expression(*value)?;
                self.tree.assign(target, AssignmentOperator::Assign, value)
            }
            _ => {
                let target = self.tree.member(receiver, &method.name)?;
                let arguments = rest
                    .iter()
                    .map(|&arg| self.argument(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.tree.invocation(target, &arguments)
            }
        }
    }

    fn compound(&mut self, inst: InstrId, as_statement: bool) -> Result<AstId> {
        let func = self.func;
        let InstructionKind::NumericCompoundAssign {
            operator,
            check_for_overflow,
            target_kind,
            eval_mode,
            ..
        } = *func.kind(inst)
        else {
            return Err(invariant_error!("{} is not a compound assignment", inst));
        };
        let target = self.slot(inst, 0)?;
        let value = self.slot(inst, 1)?;

        let lhs = match (target_kind, func.kind(target)) {
            (CompoundTargetKind::Address, _) => self.lvalue(target)?,
            (CompoundTargetKind::Dynamic, InstructionKind::DynamicGetMember { name }) => {
                let object = self.expression(self.slot(target, 0)?)?;
                self.tree.member(object, name)?
            }
            _ => self.expression(target)?,
        };

        let is_step = matches!(operator, BinaryNumericOperator::Add | BinaryNumericOperator::Sub)
            && func.match_ldc_i(value) == Some(1);
        let expr = if is_step {
            let postfix = as_statement || eval_mode == CompoundEvalMode::EvaluatesToOldValue;
            let unary = match (operator == BinaryNumericOperator::Add, postfix) {
                (true, true) => UnaryOperator::PostIncrement,
                (true, false) => UnaryOperator::Increment,
                (false, true) => UnaryOperator::PostDecrement,
                (false, false) => UnaryOperator::Decrement,
            };
            self.tree.unary(unary, lhs)?
        } else if as_statement || eval_mode == CompoundEvalMode::EvaluatesToNewValue {
            let rhs = self.expression(value)?;
            self.tree.assign(lhs, assignment_operator(operator), rhs)?
        } else {
            return Err(Error::NotSupported(format!(
                "old value of {} by more than one in {}",
                operator,
                func.name()
            )));
        };
        if check_for_overflow && !as_statement {
            self.tree.checked(expr)
        } else {
            Ok(expr)
        }
    }

    fn unary_child(&mut self, inst: InstrId, operator: UnaryOperator) -> Result<AstId> {
        let operand = self.expression(self.slot(inst, 0)?)?;
        self.tree.unary(operator, operand)
    }

    fn binary_children(&mut self, inst: InstrId, operator: BinaryOperator) -> Result<AstId> {
        let left = self.expression(self.slot(inst, 0)?)?;
        let right = self.expression(self.slot(inst, 1)?)?;
        self.tree.binary(left, operator, right)
    }

    /// Sign C# gives the value of `inst`, `None` when it is not an integer or not evident.
    fn natural_sign(&self, inst: InstrId) -> Sign {
        let func = self.func;
        match func.kind(inst) {
            InstructionKind::LdLoc { variable } => promoted_sign(&func.variable(*variable).ty),
            InstructionKind::LdObj { ty }
            | InstructionKind::UnboxAny { ty }
            | InstructionKind::NumericCompoundAssign { ty, .. } => promoted_sign(ty),
            InstructionKind::Conv { target_type, .. } => {
                promoted_sign(&IlType::Primitive(*target_type))
            }
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                promoted_sign(&method.return_type)
            }
            InstructionKind::LdcI4 { .. }
            | InstructionKind::LdcI8 { .. }
            | InstructionKind::LdLen
            | InstructionKind::SizeOf { .. } => Sign::Signed,
            InstructionKind::BinaryNumeric {
                operator,
                sign,
                check_for_overflow,
                ..
            } => match operation_sign(*operator, *sign, *check_for_overflow) {
                Sign::None if operator.is_shift() => func
                    .first_child(inst)
                    .map_or(Sign::None, |left| self.natural_sign(left)),
                Sign::None => self.common_sign(inst),
                explicit => explicit,
            },
            InstructionKind::BitNot => self.common_sign(inst),
            _ => Sign::None,
        }
    }

    /// `Unsigned` if all operands are unsigned, `Signed` if all are known.
    fn common_sign(&self, inst: InstrId) -> Sign {
        let mut common = Sign::Unsigned;
        for operand in self.func.children(inst) {
            match self.natural_sign(operand) {
                Sign::None => return Sign::None,
                Sign::Signed => common = Sign::Signed,
                Sign::Unsigned => {}
            }
        }
        common
    }

    /// `inst` as the operand of an operation of sign `required`.
    fn signed_operand(&mut self, inst: InstrId, required: Sign) -> Result<AstId> {
        let func = self.func;
        let stack = func.stack_type(inst);
        if required == Sign::None || !stack.is_integer() {
            return self.expression(inst);
        }
        if let Some(value) = func.match_ldc_i(inst) {
            if required == Sign::Unsigned && value < 0 {
                let unsigned = match stack {
                    StackType::I8 => value as u64,
                    _ => u64::from(value as u32),
                };
                return Ok(self.tree.literal(Literal::UInt(unsigned)));
            }
            return self.expression(inst);
        }
        let natural = self.natural_sign(inst);
        let operand = self.expression(inst)?;
        if natural == Sign::None || natural == required {
            return Ok(operand);
        }
        let ty = self.tree.primitive_type(integer_type(stack, required).keyword());
        self.tree.cast(ty, operand)
    }

    fn binary_numeric(&mut self, inst: InstrId) -> Result<AstId> {
        let InstructionKind::BinaryNumeric {
            operator,
            check_for_overflow,
            sign,
            ..
        } = *self.func.kind(inst)
        else {
            return Err(invariant_error!("{} is not a binary instruction", inst));
        };
        let required = operation_sign(operator, sign, check_for_overflow);
        let left = self.signed_operand(self.slot(inst, 0)?, required)?;
        // The shift count is always an int
        let count_sign = if operator.is_shift() { Sign::None } else { required };
        let right = self.signed_operand(self.slot(inst, 1)?, count_sign)?;
        let expr = self.tree.binary(left, binary_operator(operator), right)?;
        if check_for_overflow {
            self.tree.checked(expr)
        } else {
            Ok(expr)
        }
    }

    fn comparison(&mut self, inst: InstrId) -> Result<AstId> {
        let InstructionKind::Comp {
            kind,
            sign,
            input_type,
            ..
        } = *self.func.kind(inst)
        else {
            return Err(invariant_error!("{} is not a comparison", inst));
        };
        let relational = !matches!(kind, ComparisonKind::Equality | ComparisonKind::Inequality);
        let required = if relational && input_type.is_integer() {
            sign
        } else {
            Sign::None
        };
        let left = self.signed_operand(self.slot(inst, 0)?, required)?;
        let right = self.signed_operand(self.slot(inst, 1)?, required)?;
        self.tree.binary(left, comparison_operator(kind), right)
    }

    fn conversion(&mut self, inst: InstrId) -> Result<AstId> {
        let InstructionKind::Conv {
            target_type,
            check_for_overflow,
            input_sign,
        } = *self.func.kind(inst)
        else {
            return Err(invariant_error!("{} is not a conversion", inst));
        };
        let operand = self.signed_operand(self.slot(inst, 0)?, input_sign)?;
        let ty = self.tree.primitive_type(target_type.keyword());
        let cast = self.tree.cast(ty, operand)?;
        if check_for_overflow {
            self.tree.checked(cast)
        } else {
            Ok(cast)
        }
    }

    fn typed(&mut self, inst: InstrId, kind: AstKind, ty: &IlType) -> Result<AstId> {
        let operand = self.expression(self.slot(inst, 0)?)?;
        let ty = self.ast_type(ty)?;
        match kind {
            AstKind::As => self.tree.as_type(operand, ty),
            _ => self.tree.cast(ty, operand),
        }
    }

    fn expression(&mut self, inst: InstrId) -> Result<AstId> {
        let func = self.func;
        match func.kind(inst) {
            InstructionKind::LdLoc { variable } => Ok(self.variable_ref(*variable)),
            InstructionKind::LdLoca { variable } => {
                let local = self.variable_ref(*variable);
                self.tree.unary(UnaryOperator::AddressOf, local)
            }
            InstructionKind::StLoc { variable } => {
                let target = self.variable_ref(*variable);
                let value = self.expression(self.slot(inst, 0)?)?;
                self.tree.assign(target, AssignmentOperator::Assign, value)
            }
            InstructionKind::LdcI4 { value } => Ok(self.tree.literal(Literal::Int(i64::from(*value)))),
            InstructionKind::LdcI8 { value } => Ok(self.tree.literal(Literal::Int(*value))),
            InstructionKind::LdcF4 { value } => Ok(self.tree.literal(Literal::Float32(*value))),
            InstructionKind::LdcF8 { value } => Ok(self.tree.literal(Literal::Float(*value))),
            InstructionKind::LdNull => Ok(self.tree.literal(Literal::Null)),
            InstructionKind::LdStr { value } => Ok(self.tree.literal(Literal::String(value.clone()))),
            InstructionKind::DefaultValue { ty } => {
                let ty = self.ast_type(ty)?;
                self.tree.make(AstKind::Default, &[(Role::Type, ty)])
            }
            InstructionKind::SizeOf { ty } => {
                let ty = self.ast_type(ty)?;
                self.tree.make(AstKind::SizeOf, &[(Role::Type, ty)])
            }
            InstructionKind::LdObj { .. } => self.lvalue(self.slot(inst, 0)?),
            InstructionKind::StObj { .. } => {
                let target = self.lvalue(self.slot(inst, 0)?)?;
                let value = self.expression(self.slot(inst, 1)?)?;
                self.tree.assign(target, AssignmentOperator::Assign, value)
            }
            InstructionKind::LdFlda { .. }
            | InstructionKind::LdsFlda { .. }
            | InstructionKind::LdElema { .. } => {
                let location = self.lvalue(inst)?;
                self.tree.unary(UnaryOperator::AddressOf, location)
            }
            InstructionKind::LdLen => {
                let array = self.expression(self.slot(inst, 0)?)?;
                self.tree.member(array, "Length")
            }
            InstructionKind::BinaryNumeric { .. } => self.binary_numeric(inst),
            InstructionKind::Comp { .. } => self.comparison(inst),
            InstructionKind::ThreeValuedBoolAnd => self.binary_children(inst, BinaryOperator::BitwiseAnd),
            InstructionKind::ThreeValuedBoolOr => self.binary_children(inst, BinaryOperator::BitwiseOr),
            InstructionKind::NullCoalescing => {
                self.binary_children(inst, BinaryOperator::NullCoalescing)
            }
            InstructionKind::BitNot => self.unary_child(inst, UnaryOperator::BitNot),
            InstructionKind::LogicNot => self.unary_child(inst, UnaryOperator::Not),
            InstructionKind::NullableUnwrap { .. } => {
                self.unary_child(inst, UnaryOperator::NullConditional)
            }
            InstructionKind::NullableRewrap => {
                self.unary_child(inst, UnaryOperator::NullConditionalRewrap)
            }
            InstructionKind::Conv { .. } => self.conversion(inst),
            InstructionKind::CastClass { ty } | InstructionKind::UnboxAny { ty } => {
                self.typed(inst, AstKind::Cast, ty)
            }
            InstructionKind::IsInst { ty } => self.typed(inst, AstKind::As, ty),
            InstructionKind::Box { .. } => self.expression(self.slot(inst, 0)?),
            InstructionKind::NumericCompoundAssign { .. } => self.compound(inst, false),
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                self.call(inst, method)
            }
            InstructionKind::NewObj { method } => {
                let ty = self.tree.named_type(&method.declaring_type)?;
                let arguments = func
                    .children(inst)
                    .map(|arg| self.argument(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.tree.object_create(ty, &arguments)
            }
            InstructionKind::NewArr { ty } => {
                let element = self.ast_type(ty)?;
                let sizes = func
                    .children(inst)
                    .map(|size| self.expression(size))
                    .collect::<Result<Vec<_>>>()?;
                self.tree.array_create(element, &sizes)
            }
            InstructionKind::DynamicGetMember { name } => {
                let object = self.expression(self.slot(inst, 0)?)?;
                self.tree.member(object, name)
            }
            InstructionKind::DynamicSetMember { name } => {
                let object = self.expression(self.slot(inst, 0)?)?;
                let target = self.tree.member(object, name)?;
                let value = self.expression(self.slot(inst, 1)?)?;
                self.tree.assign(target, AssignmentOperator::Assign, value)
            }
            InstructionKind::DebugBreak => {
                let ty = self.tree.named_type("System.Diagnostics.Debugger")?;
                let target = self.tree.type_reference(ty)?;
                let method = self.tree.member(target, "Break")?;
                self.tree.invocation(method, &[])
            }
            InstructionKind::InvalidExpression { message } => {
                Err(Error::NotSupported(format!("invalid expression: {message}")))
            }
            _ => Err(Error::NotSupported(format!(
                "{} in expression position in {}",
                func.opcode(inst),
                func.name()
            ))),
        }
    }

    // ============================================================================================
    // Types
    // ============================================================================================

    fn ast_type(&mut self, ty: &IlType) -> Result<AstId> {
        match ty {
            IlType::Unknown | IlType::Object => Ok(self.tree.primitive_type("object")),
            IlType::Void => Ok(self.tree.primitive_type("void")),
            IlType::Primitive(prim) => Ok(self.tree.primitive_type(prim.keyword())),
            IlType::String => Ok(self.tree.primitive_type("string")),
            IlType::Dynamic => Ok(self.tree.primitive_type("dynamic")),
            IlType::Enum { name, .. } | IlType::Struct { name, .. } | IlType::Class(name) => {
                self.tree.named_type(name)
            }
            IlType::Pointer(inner) => {
                let base = self.ast_type(inner)?;
                self.tree.composed_type(base, 1, 0, false, false)
            }
            IlType::ByRef(inner) => {
                let base = self.ast_type(inner)?;
                self.tree.composed_type(base, 0, 0, false, true)
            }
            IlType::Nullable(inner) => {
                let base = self.ast_type(inner)?;
                self.tree.composed_type(base, 0, 0, true, false)
            }
            IlType::Array(inner) => {
                let base = self.ast_type(inner)?;
                self.tree.composed_type(base, 0, 1, false, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::ILVariable;

    fn int() -> IlType {
        IlType::primitive(PrimitiveType::I4)
    }

    fn parameter(func: &mut ILFunction, name: &str, index: u32) -> VarId {
        let mut variable = ILVariable::new(VariableKind::Parameter, int(), name);
        variable.index = Some(index);
        func.add_variable(variable)
    }

    #[test]
    fn test_static_method_with_return() -> Result<()> {
        let mut func = ILFunction::new("Add");
        func.set_return_type(int());
        let b = parameter(&mut func, "b", 1);
        let a = parameter(&mut func, "a", 0);
        let left = func.ld_loc(a);
        let right = func.ld_loc(b);
        let sum = func.binary(BinaryNumericOperator::Add, left, right)?;
        let ret = func.ret(Some(sum))?;
        let entry = func.block(&[ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        let tree = build_method(&func)?;
        assert_eq!(
            tree.to_text(),
            "static int Add(int a, int b) {\n    return a + b;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_increment_statement_and_locals() -> Result<()> {
        let mut func = ILFunction::new("Bump");
        let x = func.add_variable(ILVariable::new(VariableKind::Local, int(), "x"));
        func.add_variable(ILVariable::new(VariableKind::Local, int(), "unused"));
        let address = func.ld_loca(x);
        let one = func.ldc_i4(1);
        let compound = func.make(
            InstructionKind::NumericCompoundAssign {
                operator: BinaryNumericOperator::Add,
                check_for_overflow: false,
                sign: Sign::None,
                ty: int(),
                target_kind: CompoundTargetKind::Address,
                eval_mode: CompoundEvalMode::EvaluatesToNewValue,
            },
            &[address, one],
        )?;
        let ret = func.ret(None)?;
        let entry = func.block(&[compound, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        let tree = build_method(&func)?;
        assert_eq!(
            tree.to_text(),
            "static void Bump() {\n    int x;\n    x++;\n    return;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_loop_with_break_and_continue() -> Result<()> {
        let mut func = ILFunction::new("Spin");
        let i = parameter(&mut func, "i", 0);
        let body = func.body();

        let loop_container = func.container(ContainerKind::Loop);
        let loop_entry = func.block(&[])?;
        func.add_child(loop_container, loop_entry)?;
        let load = func.ld_loc(i);
        let ten = func.ldc_i4(10);
        let cond = func.comp(ComparisonKind::Equality, Sign::None, load, ten)?;
        let exit = func.leave(loop_container)?;
        let test = func.if_then(cond, exit)?;
        let tick = func.call(MethodRef::static_method("C", "Tick", 0, IlType::Void), &[])?;
        let back = func.branch(loop_entry);
        for inst in [test, tick, back] {
            func.add_child(loop_entry, inst)?;
        }
        let ret = func.ret(None)?;
        let entry = func.block(&[loop_container, ret])?;
        func.add_child(body, entry)?;

        let tree = build_method(&func)?;
        assert_eq!(
            tree.to_text(),
            "static void Spin(int i) {\n    while (true) {\n        if (i == 10) {\n            break;\n        }\n        C.Tick();\n        continue;\n    }\n    return;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_residual_branch_becomes_goto() -> Result<()> {
        let mut func = ILFunction::new("Jump");
        let body = func.body();
        let ret = func.ret(None)?;
        let target = func.block(&[ret])?;
        let to_target = func.branch(target);
        let entry = func.block(&[to_target])?;
        func.add_child(body, entry)?;
        func.add_child(body, target)?;

        let tree = build_method(&func)?;
        let label = label_name(target);
        assert_eq!(
            tree.to_text(),
            format!("static void Jump() {{\n    goto {label};\n    {label}:\n    return;\n}}\n")
        );
        Ok(())
    }

    #[test]
    fn test_instance_property_access() -> Result<()> {
        let mut func = ILFunction::new("Size");
        func.set_return_type(int());
        let this = func.add_variable(ILVariable::new(
            VariableKind::Parameter,
            IlType::Class("List".into()),
            "this",
        ));
        let receiver = func.ld_loc(this);
        let getter = MethodRef::instance("List", "get_Count", 0, int());
        let count = func.call_virt(getter, &[receiver])?;
        let ret = func.ret(Some(count))?;
        let entry = func.block(&[ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        let tree = build_method(&func)?;
        assert_eq!(tree.to_text(), "int Size() {\n    return this.Count;\n}\n");
        Ok(())
    }

    fn call(func: &mut ILFunction, name: &str, arguments: &[InstrId]) -> Result<InstrId> {
        let method = MethodRef::static_method("C", name, arguments.len(), IlType::Void);
        func.call(method, arguments)
    }

    /// `return build(a, b);` in a method with two `int` parameters.
    fn returning<F>(name: &str, return_type: IlType, build: F) -> Result<String>
    where
        F: FnOnce(&mut ILFunction, VarId, VarId) -> Result<InstrId>,
    {
        let mut func = ILFunction::new(name);
        func.set_return_type(return_type);
        let a = parameter(&mut func, "a", 0);
        let b = parameter(&mut func, "b", 1);
        let value = build(&mut func, a, b)?;
        let ret = func.ret(Some(value))?;
        let entry = func.block(&[ret])?;
        let body = func.body();
        func.add_child(body, entry)?;
        Ok(build_method(&func)?.to_text())
    }

    /// A container holding one block of `instructions` followed by a leave of itself.
    fn handler_body(func: &mut ILFunction, instructions: &[InstrId]) -> Result<InstrId> {
        let container = func.container(ContainerKind::Normal);
        let block = func.block(instructions)?;
        let leave = func.leave(container)?;
        func.add_child(block, leave)?;
        func.add_child(container, block)?;
        Ok(container)
    }

    #[test]
    fn test_unsigned_operations_cast_operands() -> Result<()> {
        let unsigned = |operator| {
            move |func: &mut ILFunction, a, b| {
                let (l, r) = (func.ld_loc(a), func.ld_loc(b));
                func.binary_with(operator, l, r, false, Sign::Unsigned)
            }
        };
        assert_eq!(
            returning("Div", int(), unsigned(BinaryNumericOperator::Div))?,
            "static int Div(int a, int b) {\n    return (uint)a / (uint)b;\n}\n"
        );
        assert_eq!(
            returning("Rem", int(), unsigned(BinaryNumericOperator::Rem))?,
            "static int Rem(int a, int b) {\n    return (uint)a % (uint)b;\n}\n"
        );
        assert_eq!(
            returning("Shr", int(), unsigned(BinaryNumericOperator::ShiftRight))?,
            "static int Shr(int a, int b) {\n    return (uint)a >> b;\n}\n"
        );
        assert_eq!(
            returning("Below", IlType::primitive(PrimitiveType::Bool), |func, a, b| {
                let (l, r) = (func.ld_loc(a), func.ld_loc(b));
                func.comp(ComparisonKind::LessThan, Sign::Unsigned, l, r)
            })?,
            "static bool Below(int a, int b) {\n    return (uint)a < (uint)b;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_signed_operations_keep_operands() -> Result<()> {
        assert_eq!(
            returning("Div", int(), |func, a, b| {
                let (l, r) = (func.ld_loc(a), func.ld_loc(b));
                func.binary(BinaryNumericOperator::Div, l, r)
            })?,
            "static int Div(int a, int b) {\n    return a / b;\n}\n"
        );
        assert_eq!(
            returning("Below", IlType::primitive(PrimitiveType::Bool), |func, a, b| {
                let (l, r) = (func.ld_loc(a), func.ld_loc(b));
                func.comp(ComparisonKind::LessThan, Sign::Signed, l, r)
            })?,
            "static bool Below(int a, int b) {\n    return a < b;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_negative_constant_in_unsigned_division() -> Result<()> {
        let text = returning("Halve", int(), |func, a, _| {
            let l = func.ld_loc(a);
            let minus_two = func.ldc_i4(-2);
            func.binary_with(BinaryNumericOperator::Div, l, minus_two, false, Sign::Unsigned)
        })?;
        assert_eq!(
            text,
            "static int Halve(int a, int b) {\n    return (uint)a / 4294967294u;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_checked_arithmetic_and_conversion() -> Result<()> {
        assert_eq!(
            returning("Sum", int(), |func, a, b| {
                let (l, r) = (func.ld_loc(a), func.ld_loc(b));
                func.binary_with(BinaryNumericOperator::Add, l, r, true, Sign::Signed)
            })?,
            "static int Sum(int a, int b) {\n    return checked(a + b);\n}\n"
        );
        let narrowed = returning("Narrow", IlType::primitive(PrimitiveType::I1), |func, a, _| {
            let l = func.ld_loc(a);
            func.make(
                InstructionKind::Conv {
                    target_type: PrimitiveType::I1,
                    check_for_overflow: true,
                    input_sign: Sign::Signed,
                },
                &[l],
            )
        })?;
        assert_eq!(narrowed, "static sbyte Narrow(int a, int b) {\n    return checked((sbyte)a);\n}\n");
        Ok(())
    }

    #[test]
    fn test_checked_compound_statement() -> Result<()> {
        let mut func = ILFunction::new("Grow");
        let x = func.add_variable(ILVariable::new(VariableKind::Local, int(), "x"));
        let address = func.ld_loca(x);
        let five = func.ldc_i4(5);
        let compound = func.make(
            InstructionKind::NumericCompoundAssign {
                operator: BinaryNumericOperator::Add,
                check_for_overflow: true,
                sign: Sign::Signed,
                ty: int(),
                target_kind: CompoundTargetKind::Address,
                eval_mode: CompoundEvalMode::EvaluatesToNewValue,
            },
            &[address, five],
        )?;
        let ret = func.ret(None)?;
        let entry = func.block(&[compound, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert_eq!(
            build_method(&func)?.to_text(),
            "static void Grow() {\n    int x;\n    checked {\n        x += 5;\n    }\n    return;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_old_value_of_a_wide_step_is_rejected() -> Result<()> {
        let mut func = ILFunction::new("Skip");
        func.set_return_type(int());
        let t = func.add_variable(ILVariable::new(VariableKind::Local, int(), "t"));
        let v = func.add_variable(ILVariable::new(VariableKind::Local, int(), "v"));
        let address = func.ld_loca(v);
        let five = func.ldc_i4(5);
        let compound = func.make(
            InstructionKind::NumericCompoundAssign {
                operator: BinaryNumericOperator::Add,
                check_for_overflow: false,
                sign: Sign::None,
                ty: int(),
                target_kind: CompoundTargetKind::Address,
                eval_mode: CompoundEvalMode::EvaluatesToOldValue,
            },
            &[address, five],
        )?;
        let store = func.st_loc(t, compound)?;
        let load = func.ld_loc(t);
        let ret = func.ret(Some(load))?;
        let entry = func.block(&[store, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert!(matches!(build_method(&func), Err(Error::NotSupported(_))));
        Ok(())
    }

    #[test]
    fn test_float_constant_keeps_its_width() -> Result<()> {
        let mut func = ILFunction::new("Tenth");
        func.set_return_type(IlType::primitive(PrimitiveType::R4));
        let tenth = func.create(InstructionKind::LdcF4 { value: 0.1 });
        let ret = func.ret(Some(tenth))?;
        let entry = func.block(&[ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert_eq!(
            build_method(&func)?.to_text(),
            "static float Tenth() {\n    return 0.1f;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_try_with_typed_and_filtered_catches() -> Result<()> {
        let mut func = ILFunction::new("Guarded");
        let boolean = IlType::primitive(PrimitiveType::Bool);
        let mut retry = ILVariable::new(VariableKind::Parameter, boolean, "retry");
        retry.index = Some(0);
        let retry = func.add_variable(retry);
        let error = func.add_variable(ILVariable::new(
            VariableKind::ExceptionLocal,
            IlType::Class("System.IO.IOException".into()),
            "e",
        ));
        let ignored =
            func.add_variable(ILVariable::new(VariableKind::ExceptionLocal, IlType::Object, "ex"));

        let work = call(&mut func, "Work", &[])?;
        let try_body = handler_body(&mut func, &[work])?;

        let always = func.ldc_i4(1);
        let load = func.ld_loc(error);
        let log = call(&mut func, "Log", &[load])?;
        let log_body = handler_body(&mut func, &[log])?;
        let typed = func.make(InstructionKind::TryCatchHandler { variable: error }, &[always, log_body])?;

        let filter = func.ld_loc(retry);
        let empty = handler_body(&mut func, &[])?;
        let filtered = func.make(InstructionKind::TryCatchHandler { variable: ignored }, &[filter, empty])?;

        let try_catch = func.make(InstructionKind::TryCatch, &[try_body, typed, filtered])?;
        let ret = func.ret(None)?;
        let entry = func.block(&[try_catch, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert_eq!(
            build_method(&func)?.to_text(),
            "static void Guarded(bool retry) {\n    try {\n        C.Work();\n    } \
             catch (System.IO.IOException e) {\n        C.Log(e);\n    } \
             catch when (retry) {\n    }\n    return;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_fault_handler_rethrows() -> Result<()> {
        let mut func = ILFunction::new("Faulty");
        let work = call(&mut func, "Work", &[])?;
        let try_body = handler_body(&mut func, &[work])?;
        let undo = call(&mut func, "Undo", &[])?;
        let fault_body = handler_body(&mut func, &[undo])?;
        let try_fault = func.make(InstructionKind::TryFault, &[try_body, fault_body])?;
        let ret = func.ret(None)?;
        let entry = func.block(&[try_fault, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert_eq!(
            build_method(&func)?.to_text(),
            "static void Faulty() {\n    try {\n        C.Work();\n    } catch {\n        \
             C.Undo();\n        throw;\n    }\n    return;\n}\n"
        );
        Ok(())
    }

    #[test]
    fn test_lock_and_using_blocks() -> Result<()> {
        let mut func = ILFunction::new("Locked");
        let mut gate = ILVariable::new(VariableKind::Parameter, IlType::Object, "gate");
        gate.index = Some(0);
        let gate = func.add_variable(gate);
        let stream = func.add_variable(ILVariable::new(
            VariableKind::UsingLocal,
            IlType::Class("System.IO.Stream".into()),
            "s",
        ));

        let target = func.ld_loc(gate);
        let work = call(&mut func, "Work", &[])?;
        let locked = handler_body(&mut func, &[work])?;
        let lock = func.make(InstructionKind::Lock, &[target, locked])?;

        let open = func.call(
            MethodRef::static_method("C", "Open", 0, IlType::Class("System.IO.Stream".into())),
            &[],
        )?;
        let read = call(&mut func, "Read", &[])?;
        let used = handler_body(&mut func, &[read])?;
        let using = func.make(
            InstructionKind::Using {
                variable: stream,
                is_async: false,
            },
            &[open, used],
        )?;
        let ret = func.ret(None)?;
        let entry = func.block(&[lock, using, ret])?;
        let body = func.body();
        func.add_child(body, entry)?;

        assert_eq!(
            build_method(&func)?.to_text(),
            "static void Locked(object gate) {\n    lock (gate) {\n        C.Work();\n    }\n    \
             using (System.IO.Stream s = C.Open()) {\n        C.Read();\n    }\n    return;\n}\n"
        );
        Ok(())
    }
}
