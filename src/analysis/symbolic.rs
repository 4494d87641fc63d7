//! A tiny abstract interpreter over a tracked integer state.
//!
//! [`SymbolicEvaluationContext::eval`] reduces an instruction to a [`SymbolicValue`]
//! relative to one tracked state: a set of variables (and optionally a field of `this`)
//! that all hold the same integer. Anything outside the recognised language (loads of
//! the state, integer constants, add/sub by a constant, comparisons, logical not)
//! collapses to [`SymbolicValue::Unknown`], which callers treat as "do not transform".
//!
//! The comparison semantics live in [`make_set_where_comparison_is_true`] and its
//! width-aware sibling [`make_set_where_comparison_is_true_for`]. Both are exact over
//! the signed and unsigned integer domains; unsigned ranges that cross the signed
//! midpoint are returned as two intervals by [`unsigned_range`].

use rustc_hash::FxHashSet;

use crate::{
    analysis::longset::{LongInterval, LongSet},
    il::{
        BinaryNumericOperator, ComparisonKind, FieldRef, ILFunction, InstrId, InstructionKind,
        Sign, StackType, VarId,
    },
};

/// Result of symbolic evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolicValue {
    /// Not expressible in terms of the tracked state
    Unknown,
    /// A known integer
    IntegerConstant(i64),
    /// The tracked state plus a constant offset
    State(i64),
    /// The `this` reference
    This,
    /// A boolean that is true exactly when the state is in the set
    StateInSet(LongSet),
}

/// The set of `i64` values whose `bits`-wide unsigned reinterpretation lies in `[lo, hi]`.
///
/// Values are sign-extended from `bits`, so a range that crosses the unsigned midpoint
/// (`2^(bits-1)`) becomes two signed intervals. Returns the empty set when `lo > hi`.
#[must_use]
pub fn unsigned_range(lo: u64, hi: u64, bits: u32) -> LongSet {
    if lo > hi {
        return LongSet::empty();
    }
    let bits = bits.clamp(1, 64);
    let to_signed = |value: u64| -> i64 {
        if bits == 64 {
            value as i64
        } else {
            let shift = 64 - bits;
            ((value << shift) as i64) >> shift
        }
    };
    let (start, end) = (to_signed(lo), to_signed(hi));
    if start <= end {
        LongSet::inclusive(start, end)
    } else {
        let max = if bits == 64 {
            i64::MAX
        } else {
            (1i64 << (bits - 1)) - 1
        };
        let min = if bits == 64 { i64::MIN } else { -(1i64 << (bits - 1)) };
        LongSet::from_intervals([LongInterval::new(start, max), LongInterval::new(min, end)])
    }
}

/// The set of `x` for which `x <kind> val` holds over 64-bit integers.
///
/// `Sign::None` is only meaningful for equality and inequality; relational kinds
/// without a sign are treated as signed.
#[must_use]
pub fn make_set_where_comparison_is_true(kind: ComparisonKind, val: i64, sign: Sign) -> LongSet {
    make_set_for_width(kind, val, sign, 64)
}

/// Like [`make_set_where_comparison_is_true`], for operands of the given stack type.
///
/// For 32-bit operands an unsigned comparison interprets both sides as `u32`, so the
/// resulting set is expressed over sign-extended 32-bit values.
#[must_use]
pub fn make_set_where_comparison_is_true_for(
    kind: ComparisonKind,
    val: i64,
    sign: Sign,
    input_type: StackType,
) -> LongSet {
    make_set_for_width(kind, val, sign, input_type.integer_bits().unwrap_or(64))
}

fn make_set_for_width(kind: ComparisonKind, val: i64, sign: Sign, bits: u32) -> LongSet {
    match kind {
        ComparisonKind::Equality => LongSet::single(val),
        ComparisonKind::Inequality => LongSet::single(val).invert(),
        _ if sign == Sign::Unsigned => {
            let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            let uval = (val as u64) & mask;
            match kind {
                ComparisonKind::LessThan => match uval.checked_sub(1) {
                    Some(hi) => unsigned_range(0, hi, bits),
                    None => LongSet::empty(),
                },
                ComparisonKind::LessThanOrEqual => unsigned_range(0, uval, bits),
                ComparisonKind::GreaterThan if uval == mask => LongSet::empty(),
                ComparisonKind::GreaterThan => unsigned_range(uval + 1, mask, bits),
                _ => unsigned_range(uval, mask, bits),
            }
        }
        ComparisonKind::LessThan => match val.checked_sub(1) {
            Some(end) => LongSet::inclusive(i64::MIN, end),
            None => LongSet::empty(),
        },
        ComparisonKind::LessThanOrEqual => LongSet::inclusive(i64::MIN, val),
        ComparisonKind::GreaterThan => match val.checked_add(1) {
            Some(start) => LongSet::inclusive(start, i64::MAX),
            None => LongSet::empty(),
        },
        ComparisonKind::GreaterThanOrEqual => LongSet::inclusive(val, i64::MAX),
    }
}

/// Evaluates instructions relative to a tracked integer state.
pub struct SymbolicEvaluationContext<'a> {
    func: &'a ILFunction,
    state_field: Option<FieldRef>,
    state_variables: FxHashSet<VarId>,
    this_variable: Option<VarId>,
}

impl<'a> SymbolicEvaluationContext<'a> {
    /// Creates a context tracking `state_field` (if any) of the `this` object.
    #[must_use]
    pub fn new(func: &'a ILFunction, state_field: Option<FieldRef>) -> Self {
        SymbolicEvaluationContext {
            func,
            state_field,
            state_variables: FxHashSet::default(),
            this_variable: None,
        }
    }

    /// Marks `variable` as holding the tracked state.
    pub fn add_state_variable(&mut self, variable: VarId) {
        self.state_variables.insert(variable);
    }

    /// Declares the variable holding `this`.
    pub fn set_this_variable(&mut self, variable: VarId) {
        self.this_variable = Some(variable);
    }

    /// Variables currently known to hold the state.
    pub fn state_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.state_variables.iter().copied()
    }

    /// Evaluates `inst`.
    #[must_use]
    pub fn eval(&self, inst: InstrId) -> SymbolicValue {
        let func = self.func;
        match func.kind(inst) {
            InstructionKind::LdLoc { variable } => {
                if self.state_variables.contains(variable) {
                    SymbolicValue::State(0)
                } else if self.this_variable == Some(*variable) {
                    SymbolicValue::This
                } else {
                    SymbolicValue::Unknown
                }
            }
            InstructionKind::LdcI4 { value } => SymbolicValue::IntegerConstant(i64::from(*value)),
            InstructionKind::LdcI8 { value } => SymbolicValue::IntegerConstant(*value),
            InstructionKind::LdObj { .. } => {
                if self.is_state_field_address(func.first_child(inst)) {
                    SymbolicValue::State(0)
                } else {
                    SymbolicValue::Unknown
                }
            }
            InstructionKind::BinaryNumeric {
                operator,
                check_for_overflow: false,
                ..
            } => {
                let Some(bin) = func.match_binary_numeric(inst) else {
                    return SymbolicValue::Unknown;
                };
                let left = self.eval(bin.left);
                let right = self.eval(bin.right);
                match (operator, left, right) {
                    (
                        BinaryNumericOperator::Add,
                        SymbolicValue::State(offset),
                        SymbolicValue::IntegerConstant(c),
                    )
                    | (
                        BinaryNumericOperator::Add,
                        SymbolicValue::IntegerConstant(c),
                        SymbolicValue::State(offset),
                    ) => SymbolicValue::State(offset.wrapping_add(c)),
                    (
                        BinaryNumericOperator::Sub,
                        SymbolicValue::State(offset),
                        SymbolicValue::IntegerConstant(c),
                    ) => SymbolicValue::State(offset.wrapping_sub(c)),
                    (
                        BinaryNumericOperator::Add,
                        SymbolicValue::IntegerConstant(a),
                        SymbolicValue::IntegerConstant(b),
                    ) => SymbolicValue::IntegerConstant(a.wrapping_add(b)),
                    (
                        BinaryNumericOperator::Sub,
                        SymbolicValue::IntegerConstant(a),
                        SymbolicValue::IntegerConstant(b),
                    ) => SymbolicValue::IntegerConstant(a.wrapping_sub(b)),
                    _ => SymbolicValue::Unknown,
                }
            }
            InstructionKind::Comp {
                kind,
                sign,
                input_type,
                is_lifted: false,
            } => {
                let Some(comp) = func.match_comp(inst) else {
                    return SymbolicValue::Unknown;
                };
                self.eval_comparison(*kind, *sign, *input_type, comp.left, comp.right)
            }
            InstructionKind::LogicNot => match func.first_child(inst).map(|arg| self.eval(arg)) {
                Some(SymbolicValue::StateInSet(set)) => SymbolicValue::StateInSet(set.invert()),
                _ => SymbolicValue::Unknown,
            },
            _ => SymbolicValue::Unknown,
        }
    }

    fn eval_comparison(
        &self,
        kind: ComparisonKind,
        sign: Sign,
        input_type: StackType,
        left: InstrId,
        right: InstrId,
    ) -> SymbolicValue {
        match (self.eval(left), self.eval(right)) {
            (SymbolicValue::State(offset), SymbolicValue::IntegerConstant(c)) => {
                // state + offset <kind> c
                let set = make_set_where_comparison_is_true_for(kind, c, sign, input_type);
                SymbolicValue::StateInSet(set.add_offset(offset.wrapping_neg()))
            }
            (SymbolicValue::IntegerConstant(c), SymbolicValue::State(offset)) => {
                let set = make_set_where_comparison_is_true_for(kind.swap(), c, sign, input_type);
                SymbolicValue::StateInSet(set.add_offset(offset.wrapping_neg()))
            }
            (SymbolicValue::StateInSet(set), SymbolicValue::IntegerConstant(0))
            | (SymbolicValue::IntegerConstant(0), SymbolicValue::StateInSet(set)) => match kind {
                ComparisonKind::Equality => SymbolicValue::StateInSet(set.invert()),
                ComparisonKind::Inequality => SymbolicValue::StateInSet(set),
                _ => SymbolicValue::Unknown,
            },
            _ => SymbolicValue::Unknown,
        }
    }

    fn is_state_field_address(&self, address: Option<InstrId>) -> bool {
        let (Some(address), Some(state_field)) = (address, self.state_field.as_ref()) else {
            return false;
        };
        match self.func.kind(address) {
            InstructionKind::LdFlda { field } if field == state_field => self
                .func
                .first_child(address)
                .is_some_and(|target| self.eval(target) == SymbolicValue::This),
            _ => false,
        }
    }
}
