//! Compound assignments and increments.
//!
//! A compound assignment `target op= value` is sugar for loading the target, applying a
//! binary operator and storing the result back. The sugar is only equivalent to the
//! expanded form when the implicit conversions C# inserts around it reproduce exactly what
//! the IL does. [`is_binary_compatible_with_type`] is the admission gate deciding that; every
//! rewrite in this module goes through it, and every rejection leaves the verbose form in
//! place.
//!
//! # Recognised shapes
//!
//! | IL                                                        | Result                         |
//! |-----------------------------------------------------------|--------------------------------|
//! | `stloc v([conv] op(ldloc v, rhs))`                        | `v op= rhs`                    |
//! | `stobj T(addr, [conv] op(ldobj T(addr), rhs))`            | `*addr op= rhs`                |
//! | `call set_P(args.., [conv] op(call get_P(args..), rhs))`  | `P op= rhs`                    |
//! | `stloc t(ldobj T(addr)); stobj T(addr, add(ldloc t, 1))`  | `t = (*addr)++`                |
//! | `stloc t(ldloc v); stloc v(add(ldloc t, 1))`              | `t = v++`                      |
//!
//! The address must be free of side effects, since the compound form evaluates it once
//! where the expanded form evaluates it twice. The first three shapes are [`Pattern`]
//! templates; the address of the second one is tied to the load through a backreference.
//!
//! The post-increment shapes only accept a step of one (one element for pointers). C# has
//! no old-value form of `x += n`, so any other step keeps both statements.
//!
//! # Pointers
//!
//! Pointer arithmetic in IL is in bytes, pointer arithmetic in C# is in elements. For a
//! pointer target the right operand must be a provable multiple of the element size
//! (see [`pointer_arithmetic_offset`]); the compound value is the element count.

use crate::{
    il::{
        BinaryNumericOperator, CompoundEvalMode, CompoundTargetKind, ILFunction, IlType,
        InstrId, InstructionKind, OpCode, PrimitiveType, Sign, StackType, VarId, VariableKind,
    },
    pattern::{Match, Pattern},
    settings::DecompilerSettings,
    transforms::{ILTransform, TransformContext},
    Result,
};

/// Right operand of pointer arithmetic, expressed in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOffset {
    /// A constant byte offset divided by the element size
    Elements(i64),
    /// An expression that is multiplied by the element size in the IL
    Scaled(InstrId),
}

fn reject(reason: &str) -> bool {
    log::trace!("compound assignment rejected: {reason}");
    false
}

/// Decides whether `binary` applied to a value of `target_type` may be written as a
/// compound assignment on a location of that type.
///
/// All of the following must hold:
///
/// - the target type is known;
/// - enums only take `+`, `-`, `&`, `|` and `^`;
/// - pointers only take `+` and `-`, with a right operand that is a provable multiple
///   of the element size;
/// - native integers never take shifts, and need [`DecompilerSettings::native_integers`];
/// - an explicitly signed operation on a small integer type must be `Signed`, on any
///   other type its sign must be the type's natural sign;
/// - the right operand converts to the target type without truncation (shifts excepted,
///   their count is always an `int`).
///
/// Lifted operations are checked against the underlying type of a nullable target.
#[must_use]
pub fn is_binary_compatible_with_type(
    func: &ILFunction,
    binary: InstrId,
    target_type: &IlType,
    settings: &DecompilerSettings,
) -> bool {
    let InstructionKind::BinaryNumeric {
        operator,
        check_for_overflow,
        sign,
        is_lifted,
        ..
    } = *func.kind(binary)
    else {
        return false;
    };
    let Some(right) = func.child(binary, 1) else {
        return false;
    };

    let ty = match (is_lifted, target_type) {
        (false, ty) => ty,
        (true, IlType::Nullable(inner)) => inner.as_ref(),
        (true, _) => return reject("lifted operator on a non-nullable target"),
    };
    if ty.is_unknown() {
        return reject("unknown target type");
    }

    if ty.is_enum() {
        if !matches!(
            operator,
            BinaryNumericOperator::Add
                | BinaryNumericOperator::Sub
                | BinaryNumericOperator::BitAnd
                | BinaryNumericOperator::BitOr
                | BinaryNumericOperator::BitXor
        ) {
            return reject("operator not defined on enums");
        }
    } else if ty.is_pointer() {
        if !matches!(operator, BinaryNumericOperator::Add | BinaryNumericOperator::Sub) {
            return reject("operator not defined on pointers");
        }
        if pointer_arithmetic_offset(func, right, ty, check_for_overflow).is_none() {
            return reject("pointer offset is not a multiple of the element size");
        }
        return true;
    }

    let storage = ty.storage_primitive();
    if storage.is_some_and(PrimitiveType::is_native_integer) {
        if operator.is_shift() {
            return reject("shift on a native integer");
        }
        if !settings.native_integers {
            return reject("native integers are not available");
        }
    }

    if sign != Sign::None {
        if storage.is_some_and(PrimitiveType::is_small_integer) {
            if sign != Sign::Signed {
                return reject("small integers are promoted to signed int");
            }
        } else if ty.sign() != sign {
            return reject("operation sign differs from the target type");
        }
    }

    if !operator.is_shift() && is_implicit_truncation(func, right, ty) {
        return reject("right operand would be truncated");
    }
    true
}

/// Expresses the byte offset `offset` of pointer arithmetic on `pointer_type` in elements.
///
/// Recognises constants that are an exact multiple of the element size and
/// `x * sizeof(T)` / `x * size` products (optionally widened by an unchecked `conv`).
/// For one-byte elements every offset is its own element count. Returns `None` when the
/// offset cannot be proven to be a multiple of the element size.
#[must_use]
pub fn pointer_arithmetic_offset(
    func: &ILFunction,
    offset: InstrId,
    pointer_type: &IlType,
    check_for_overflow: bool,
) -> Option<PointerOffset> {
    let IlType::Pointer(element) = pointer_type else {
        return None;
    };
    let element_size = element.size_of();

    if let Some(bytes) = func.match_ldc_i(offset) {
        let size = i64::from(element_size.filter(|&size| size > 0)?);
        return (bytes % size == 0).then_some(PointerOffset::Elements(bytes / size));
    }
    if element_size == Some(1) {
        return Some(PointerOffset::Scaled(offset));
    }

    let product = match func.kind(offset) {
        InstructionKind::Conv {
            target_type: PrimitiveType::I | PrimitiveType::U | PrimitiveType::I8,
            check_for_overflow: false,
            ..
        } => func.first_child(offset)?,
        _ => offset,
    };
    let mul = func.match_binary_numeric(product)?;
    if mul.operator != BinaryNumericOperator::Mul || mul.check_for_overflow != check_for_overflow {
        return None;
    }
    let is_element_size = |factor: InstrId| {
        func.match_size_of(factor).is_some_and(|ty| ty == element.as_ref())
            || func
                .match_ldc_i(factor)
                .zip(element_size)
                .is_some_and(|(value, size)| value == i64::from(size))
    };
    if is_element_size(mul.right) {
        Some(PointerOffset::Scaled(mul.left))
    } else if is_element_size(mul.left) {
        Some(PointerOffset::Scaled(mul.right))
    } else {
        None
    }
}

/// Primitive type of the value an instruction produces, when its C# type is evident.
fn value_primitive(func: &ILFunction, value: InstrId) -> Option<PrimitiveType> {
    match func.kind(value) {
        InstructionKind::LdLoc { variable } => func.variable(*variable).ty.storage_primitive(),
        InstructionKind::LdObj { ty } | InstructionKind::NumericCompoundAssign { ty, .. } => {
            ty.storage_primitive()
        }
        InstructionKind::Conv { target_type, .. } => Some(*target_type),
        InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
            method.return_type.storage_primitive()
        }
        _ => None,
    }
}

fn is_boolean_valued(func: &ILFunction, value: InstrId) -> bool {
    match func.kind(value) {
        InstructionKind::Comp { .. } | InstructionKind::LogicNot => true,
        InstructionKind::LdcI4 { value } => matches!(value, 0 | 1),
        _ => value_primitive(func, value) == Some(PrimitiveType::Bool),
    }
}

/// Returns true if storing `value` into a location of type `ty` needs a narrowing
/// conversion in C#.
///
/// Constants are checked against the target range. Loads, calls and conversions carry
/// their own type, which must fit into the target range. Other expressions are judged by
/// their operands and by their stack width.
#[must_use]
pub fn is_implicit_truncation(func: &ILFunction, value: InstrId, ty: &IlType) -> bool {
    let Some(target) = ty.storage_primitive() else {
        return false;
    };
    if target == PrimitiveType::Bool {
        return !is_boolean_valued(func, value);
    }
    let Some((min, max)) = target.range() else {
        // Every integer converts to float implicitly; only double narrows to float
        return target == PrimitiveType::R4
            && func.stack_type(value) == StackType::F8
            && !matches!(func.kind(value), InstructionKind::LdcF8 { value } if f64::from(*value as f32) == *value);
    };

    if let Some(constant) = func.match_ldc_i(value) {
        return !(min..=max).contains(&i128::from(constant));
    }
    if let Some(source) = value_primitive(func, value) {
        return match source.range() {
            Some((low, high)) => low < min || high > max,
            None => true,
        };
    }
    if matches!(
        func.kind(value),
        InstructionKind::Comp { .. } | InstructionKind::LogicNot
    ) {
        // C# has no implicit conversion from bool
        return true;
    }

    let target_bits = target.size().map_or(64, |size| size * 8);
    let too_wide = func
        .stack_type(value)
        .integer_bits()
        .map_or(true, |bits| bits > target_bits);
    match func.kind(value) {
        InstructionKind::BinaryNumeric { .. } | InstructionKind::BitNot => {
            too_wide
                || func
                    .children(value)
                    .any(|operand| is_implicit_truncation(func, operand, ty))
        }
        _ => too_wide,
    }
}

// ================================================================================================
// Rewrites
// ================================================================================================

/// Forms compound assignments, increments and decrements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompoundAssignment;

impl ILTransform for CompoundAssignment {
    fn name(&self) -> &'static str {
        "compound-assignment"
    }

    fn should_run(&self, ctx: &TransformContext<'_>) -> bool {
        ctx.settings().compound_assignment
    }

    fn run(&self, func: &mut ILFunction, ctx: &TransformContext<'_>) -> Result<bool> {
        let settings = ctx.settings();
        let blocks: Vec<InstrId> = func
            .descendants(func.body())
            .into_iter()
            .filter(|&node| func.opcode(node) == OpCode::Block)
            .collect();

        let mut changed = false;
        for block in blocks {
            // A rewrite keeps its result in the slot of the rewritten statement
            let mut index = 0;
            while let Some(inst) = func.child(block, index) {
                changed |= transform_post_increment(func, inst, settings)?
                    || transform_local(func, inst, settings)?
                    || transform_address(func, inst, settings)?
                    || transform_property(func, inst, settings)?;
                index += 1;
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Rewrites load/operate/store sequences into compound assignments"
    }
}

/// `[conv] op(<left>, <any>)` where the optional `conv` is the unchecked narrowing IL puts
/// in front of a store to a small location. The binary is captured as `"binary"`.
fn update_value<F>(ty: &IlType, left: F) -> Pattern<ILFunction>
where
    F: Fn() -> Pattern<ILFunction>,
{
    let binary = || {
        Pattern::group(
            "binary",
            Pattern::node(
                |f: &ILFunction, n| f.match_binary_numeric(n).is_some(),
                vec![left(), Pattern::Any],
            ),
        )
    };
    let storage = ty.storage_primitive();
    Pattern::Choice(vec![
        Pattern::node(
            move |f: &ILFunction, n| {
                matches!(
                    f.kind(n),
                    InstructionKind::Conv { target_type, check_for_overflow: false, .. }
                        if Some(*target_type) == storage
                )
            },
            vec![binary()],
        ),
        binary(),
    ])
}

fn load_of(variable: VarId) -> Pattern<ILFunction> {
    Pattern::leaf(move |f: &ILFunction, n| f.match_ld_loc_of(n, variable))
}

/// `stloc v([conv] op(ldloc v, <any>))`
fn local_update_pattern(variable: VarId, ty: &IlType) -> Pattern<ILFunction> {
    Pattern::node(
        move |f: &ILFunction, n| f.match_st_loc(n).is_some_and(|(v, _)| v == variable),
        vec![update_value(ty, move || load_of(variable))],
    )
}

/// `stobj T(addr, [conv] op(ldobj T(addr), <any>))` with a pure `addr` captured as `"addr"`.
fn address_update_pattern(ty: &IlType) -> Pattern<ILFunction> {
    let stored = ty.clone();
    let loaded = ty.clone();
    Pattern::node(
        move |f: &ILFunction, n| f.match_st_obj(n).is_some_and(|(_, _, t)| *t == stored),
        vec![
            Pattern::group("addr", Pattern::leaf(|f: &ILFunction, n| f.flags(n).is_pure())),
            update_value(ty, move || {
                let loaded = loaded.clone();
                Pattern::node(
                    move |f: &ILFunction, n| f.match_ld_obj(n).is_some_and(|(_, t)| *t == loaded),
                    vec![Pattern::Backreference("addr")],
                )
            }),
        ],
    )
}

/// Replaces `replace` with `compound.op(target, value)` taking operator and right operand
/// from `binary`. `target` must be detached.
fn build_compound(
    func: &mut ILFunction,
    replace: InstrId,
    binary: InstrId,
    target: InstrId,
    ty: IlType,
    target_kind: CompoundTargetKind,
    eval_mode: CompoundEvalMode,
) -> Result<InstrId> {
    let InstructionKind::BinaryNumeric {
        operator,
        check_for_overflow,
        sign,
        ..
    } = *func.kind(binary)
    else {
        return Err(invariant_error!("{} is not a binary instruction", binary));
    };
    let right = func
        .child(binary, 1)
        .ok_or_else(|| invariant_error!("{} has no right operand", binary))?;

    let value = match pointer_arithmetic_offset(func, right, &ty, check_for_overflow) {
        Some(PointerOffset::Elements(count)) if ty.is_pointer() => match i32::try_from(count) {
            Ok(count) => func.ldc_i4(count),
            Err(_) => func.ldc_i8(count),
        },
        Some(PointerOffset::Scaled(scaled)) if ty.is_pointer() => {
            func.detach(scaled)?;
            scaled
        }
        _ => {
            func.detach(right)?;
            right
        }
    };

    let compound = func.make(
        InstructionKind::NumericCompoundAssign {
            operator,
            check_for_overflow,
            sign,
            ty,
            target_kind,
            eval_mode,
        },
        &[target, value],
    )?;
    func.replace_with(replace, compound)?;
    Ok(compound)
}

/// `stloc v([conv] op(ldloc v, rhs))`
fn transform_local(
    func: &mut ILFunction,
    inst: InstrId,
    settings: &DecompilerSettings,
) -> Result<bool> {
    let Some((var, _)) = func.match_st_loc(inst) else {
        return Ok(false);
    };
    let ty = func.variable(var).ty.clone();
    let Some(binary) = local_update_pattern(var, &ty)
        .matches(func, inst)
        .and_then(|m| m.first("binary"))
    else {
        return Ok(false);
    };
    if !is_binary_compatible_with_type(func, binary, &ty, settings) {
        return Ok(false);
    }
    let target = func.ld_loca(var);
    build_compound(
        func,
        inst,
        binary,
        target,
        ty,
        CompoundTargetKind::Address,
        CompoundEvalMode::EvaluatesToNewValue,
    )?;
    Ok(true)
}

/// `stobj T(addr, [conv] op(ldobj T(addr), rhs))`
fn transform_address(
    func: &mut ILFunction,
    inst: InstrId,
    settings: &DecompilerSettings,
) -> Result<bool> {
    let Some((_, _, ty)) = func.match_st_obj(inst) else {
        return Ok(false);
    };
    let ty = ty.clone();
    let Some(m) = address_update_pattern(&ty).matches(func, inst) else {
        return Ok(false);
    };
    let (Some(addr), Some(binary)) = (m.first("addr"), m.first("binary")) else {
        return Ok(false);
    };
    if !is_binary_compatible_with_type(func, binary, &ty, settings) {
        return Ok(false);
    }
    func.detach(addr)?;
    build_compound(
        func,
        inst,
        binary,
        addr,
        ty,
        CompoundTargetKind::Address,
        CompoundEvalMode::EvaluatesToNewValue,
    )?;
    Ok(true)
}

/// `call set_P(args.., [conv] op(call get_P(args..), rhs))`
fn transform_property(
    func: &mut ILFunction,
    inst: InstrId,
    settings: &DecompilerSettings,
) -> Result<bool> {
    let Some((setter, setter_args)) = func.match_call(inst) else {
        return Ok(false);
    };
    let setter = setter.clone();
    let Some((&value, object_args)) = setter_args.split_last() else {
        return Ok(false);
    };
    let Some(property) = setter.setter_property() else {
        return Ok(false);
    };

    let Some(getter_call) = func
        .match_binary_numeric(value)
        .map(|bin| bin.left)
        .or_else(|| {
            func.match_conv(value)
                .and_then(|(arg, _)| func.match_binary_numeric(arg))
                .map(|bin| bin.left)
        })
    else {
        return Ok(false);
    };
    let Some((getter, getter_args)) = func.match_call(getter_call) else {
        return Ok(false);
    };
    if getter.getter_property() != Some(property)
        || getter.declaring_type != setter.declaring_type
        || getter.is_static != setter.is_static
        || getter_args.len() != object_args.len()
    {
        return Ok(false);
    }
    let ty = getter.return_type.clone();
    let args_match = object_args.iter().zip(&getter_args).all(|(&set_arg, &get_arg)| {
        func.flags(set_arg).is_pure() && func.perform_match(set_arg, get_arg, &mut Match::new())
    });
    if !args_match {
        return Ok(false);
    }
    let Some(binary) = update_value(&ty, move || Pattern::leaf(move |_: &ILFunction, n| n == getter_call))
        .matches(func, value)
        .and_then(|m| m.first("binary"))
    else {
        return Ok(false);
    };
    if !is_binary_compatible_with_type(func, binary, &ty, settings) {
        return Ok(false);
    }

    func.detach(getter_call)?;
    build_compound(
        func,
        inst,
        binary,
        getter_call,
        ty,
        CompoundTargetKind::Property,
        CompoundEvalMode::EvaluatesToNewValue,
    )?;
    Ok(true)
}

/// `stloc t(load); store(add/sub(ldloc t, 1))` where `load` and `store` access the same
/// location, into `stloc t(compound.old(target, 1))`.
fn transform_post_increment(
    func: &mut ILFunction,
    inst: InstrId,
    settings: &DecompilerSettings,
) -> Result<bool> {
    let Some((tmp, load)) = func.match_st_loc(inst) else {
        return Ok(false);
    };
    let Some(store) = func.next_sibling(inst) else {
        return Ok(false);
    };

    enum Location {
        Local(VarId),
        Address(InstrId),
    }
    let (location, ty, stored) = if let Some((addr, ty)) = func.match_ld_obj(load) {
        let Some((store_addr, stored, store_ty)) = func.match_st_obj(store) else {
            return Ok(false);
        };
        if store_ty != ty
            || !func.flags(addr).is_pure()
            || !func.perform_match(addr, store_addr, &mut Match::new())
        {
            return Ok(false);
        }
        (Location::Address(addr), ty.clone(), stored)
    } else if let Some(var) = func.match_ld_loc(load) {
        let Some((store_var, stored)) = func.match_st_loc(store) else {
            return Ok(false);
        };
        if store_var != var || var == tmp {
            return Ok(false);
        }
        (Location::Local(var), func.variable(var).ty.clone(), stored)
    } else {
        return Ok(false);
    };

    let Some(binary) = update_value(&ty, move || load_of(tmp))
        .matches(func, stored)
        .and_then(|m| m.first("binary"))
    else {
        return Ok(false);
    };
    let Some(bin) = func.match_binary_numeric(binary) else {
        return Ok(false);
    };
    if !matches!(bin.operator, BinaryNumericOperator::Add | BinaryNumericOperator::Sub) {
        return Ok(false);
    }
    let unit_step = if ty.is_pointer() {
        pointer_arithmetic_offset(func, bin.right, &ty, bin.check_for_overflow)
            == Some(PointerOffset::Elements(1))
    } else {
        func.match_ldc_i(bin.right) == Some(1)
    };
    if !unit_step {
        return Ok(reject("post increment by more than one"));
    }
    if !is_binary_compatible_with_type(func, binary, &ty, settings) {
        return Ok(false);
    }

    let target = match location {
        Location::Address(addr) => {
            func.detach(addr)?;
            addr
        }
        Location::Local(var) => func.ld_loca(var),
    };
    let compound = build_compound(
        func,
        load,
        binary,
        target,
        ty,
        CompoundTargetKind::Address,
        CompoundEvalMode::EvaluatesToOldValue,
    )?;
    func.detach(store)?;

    // Without further readers the temporary only existed for the old value
    let tmp_var = func.variable(tmp);
    if tmp_var.loads().is_empty() && tmp_var.kind == VariableKind::StackSlot {
        func.detach(compound)?;
        func.replace_with(inst, compound)?;
    }
    Ok(true)
}
