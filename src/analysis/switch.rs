//! Recognition of multi-way branches.
//!
//! [`SwitchAnalysis`] decides whether the tail of a block, together with the blocks it
//! exclusively controls, is a multi-way branch over one integer variable. Two input
//! shapes are understood and may be mixed:
//!
//! - a tree of `if (cond) br A; br B` blocks whose conditions compare the variable (or
//!   the variable plus or minus a constant) with constants, typically the balanced
//!   binary-search cascade a compiler emits for a sparse `switch`;
//! - native `switch` instructions, whose section labels are shifted by the offset of
//!   the index expression (`switch (x - 5)`).
//!
//! # Algorithm
//!
//! The analysis walks the tree with the set of variable values that can reach the
//! current block. At every conditional tail the condition is reduced to the set of
//! values for which it holds; the true and false branches receive the intersection and
//! the difference with the live set. A branch target is analysed recursively only when
//! it is controlled exclusively by the current tree:
//!
//! - its incoming edge count is 1,
//! - it lives in the same container as the root block and is not the root itself,
//! - it consists of exactly the `if` + `br` pair, or of a lone `switch`.
//!
//! Every other branch ends the walk and becomes a section. Sections that jump to the
//! same block (or leave the same container) are merged.
//!
//! # Unreachable sections
//!
//! A branch whose value set is empty can never execute. With
//! `allow_unreachable_cases == false` such a branch means the idiom was misidentified
//! and the whole analysis fails; with `true` the branch is dropped. Compiler-generated
//! state machines produce such branches legitimately.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut analysis = SwitchAnalysis::new(settings.allow_unreachable_cases);
//! if analysis.analyze_block(&func, block) {
//!     for (values, body) in analysis.sections() {
//!         println!("{values} -> {}", func.dump(*body));
//!     }
//! }
//! ```

use rustc_hash::FxHashMap;

use crate::{
    analysis::{longset::LongSet, symbolic::make_set_where_comparison_is_true_for},
    il::{
        BinaryNumericOperator, ILFunction, InstrId, InstructionKind, OpCode, StackType, VarId,
    },
};

/// Values an integer of the given stack type can hold, as a sign-extended set.
#[must_use]
pub fn value_domain(stack_type: StackType) -> LongSet {
    match stack_type {
        StackType::I4 => LongSet::inclusive(i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => LongSet::universe(),
    }
}

/// Adds `offset` to every member of `set`, wrapping within `bits`-wide integers.
fn shift_set(set: &LongSet, offset: i64, bits: u32) -> LongSet {
    if offset == 0 || bits >= 64 {
        return set.add_offset(offset);
    }
    let domain = value_domain(StackType::I4);
    let modulus = 1i64 << 32;
    let shifted = set.intersect_with(&domain).add_offset(offset);
    let above = shifted
        .intersect_with(&LongSet::inclusive(i64::from(i32::MAX) + 1, i64::MAX))
        .add_offset(-modulus);
    let below = shifted
        .intersect_with(&LongSet::inclusive(i64::MIN, i64::from(i32::MIN) - 1))
        .add_offset(modulus);
    shifted
        .intersect_with(&domain)
        .union_with(&above)
        .union_with(&below)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The block was consumed; its sections were recorded
    Analyzed,
    /// The block is not part of the switch; nothing was recorded
    NotSwitch,
    /// The whole analysis must fail
    Abort,
}

/// Switch recognition over one root block.
#[derive(Debug, Clone)]
pub struct SwitchAnalysis {
    allow_unreachable_cases: bool,
    switch_var: Option<VarId>,
    root_block: Option<InstrId>,
    container: Option<InstrId>,
    sections: Vec<(LongSet, InstrId)>,
    inner_blocks: Vec<InstrId>,
    contains_il_switch: bool,
    target_block_to_section: FxHashMap<InstrId, usize>,
    target_container_to_section: FxHashMap<InstrId, usize>,
}

impl SwitchAnalysis {
    /// Creates an analysis with the given unreachable-section policy.
    #[must_use]
    pub fn new(allow_unreachable_cases: bool) -> Self {
        SwitchAnalysis {
            allow_unreachable_cases,
            switch_var: None,
            root_block: None,
            container: None,
            sections: Vec::new(),
            inner_blocks: Vec::new(),
            contains_il_switch: false,
            target_block_to_section: FxHashMap::default(),
            target_container_to_section: FxHashMap::default(),
        }
    }

    /// Whether empty sections are dropped instead of failing the analysis.
    #[must_use]
    pub fn allow_unreachable_cases(&self) -> bool {
        self.allow_unreachable_cases
    }

    /// The variable being switched on, once bound.
    #[must_use]
    pub fn switch_variable(&self) -> Option<VarId> {
        self.switch_var
    }

    /// Recognised sections: the values of the switch variable and the jump taken.
    #[must_use]
    pub fn sections(&self) -> &[(LongSet, InstrId)] {
        &self.sections
    }

    /// Blocks fully absorbed into the switch.
    ///
    /// They become dead once the caller replaces the root block's tail.
    #[must_use]
    pub fn inner_blocks(&self) -> &[InstrId] {
        &self.inner_blocks
    }

    /// Returns true if a native `switch` instruction was part of the analysed tree.
    #[must_use]
    pub fn contains_il_switch(&self) -> bool {
        self.contains_il_switch
    }

    /// Analyses the tail of `block` over the full domain of the switched variable.
    ///
    /// The domain is the `i32` range for 32-bit variables and every `i64` otherwise.
    /// Returns `false` when the tail is not a multi-way branch; the analysis then holds
    /// no sections.
    pub fn analyze_block(&mut self, func: &ILFunction, block: InstrId) -> bool {
        let domain = tail_variable(func, block).map_or_else(LongSet::universe, |var| {
            value_domain(func.variable(var).stack_type())
        });
        self.analyze_block_with_input(func, block, &domain)
    }

    /// Analyses the tail of `block` assuming the variable holds a value in `input`.
    pub fn analyze_block_with_input(
        &mut self,
        func: &ILFunction,
        block: InstrId,
        input: &LongSet,
    ) -> bool {
        self.reset();
        self.root_block = Some(block);
        self.container = func.parent(block);
        match self.analyze(func, block, input, true) {
            Outcome::Analyzed => true,
            outcome => {
                log::trace!("switch analysis of {block} failed: {outcome:?}");
                self.reset();
                false
            }
        }
    }

    fn reset(&mut self) {
        self.switch_var = None;
        self.root_block = None;
        self.container = None;
        self.sections.clear();
        self.inner_blocks.clear();
        self.contains_il_switch = false;
        self.target_block_to_section.clear();
        self.target_container_to_section.clear();
    }

    fn analyze(&mut self, func: &ILFunction, block: InstrId, input: &LongSet, is_root: bool) -> Outcome {
        let count = func.child_count(block);
        let Some(last) = func.last_child(block) else {
            return Outcome::NotSwitch;
        };
        if func.opcode(last) == OpCode::Switch {
            if !is_root && count != 1 {
                return Outcome::NotSwitch;
            }
            return self.analyze_switch(func, last, input);
        }
        if !is_root && count != 2 {
            return Outcome::NotSwitch;
        }
        let Some((condition, true_inst, false_inst)) = func.match_if_at_end_of_block(block) else {
            return Outcome::NotSwitch;
        };
        let Some(true_values) = self.analyze_condition(func, condition) else {
            return Outcome::NotSwitch;
        };
        let true_values = true_values.intersect_with(input);
        let false_values = input.except_with(&true_values);
        if is_root && (true_values.is_empty() || false_values.is_empty()) {
            // The condition does not split the domain
            return Outcome::NotSwitch;
        }
        if self.analyze_branch(func, true_values, true_inst, true) == Outcome::Abort {
            return Outcome::Abort;
        }
        self.analyze_branch(func, false_values, false_inst, true)
    }

    fn analyze_switch(&mut self, func: &ILFunction, switch: InstrId, input: &LongSet) -> Outcome {
        let Some(value) = func.first_child(switch) else {
            return Outcome::NotSwitch;
        };
        let Some((offset, bits)) = self.match_switch_var(func, value) else {
            return Outcome::NotSwitch;
        };
        self.contains_il_switch = true;
        for section in func.children(switch).skip(1) {
            let InstructionKind::SwitchSection { labels, .. } = func.kind(section) else {
                continue;
            };
            let Some(body) = func.first_child(section) else {
                continue;
            };
            let values = shift_set(labels, offset, bits).intersect_with(input);
            let recurse = values.count() > 1;
            if self.analyze_branch(func, values, body, recurse) == Outcome::Abort {
                return Outcome::Abort;
            }
        }
        Outcome::Analyzed
    }

    fn analyze_branch(
        &mut self,
        func: &ILFunction,
        values: LongSet,
        inst: InstrId,
        allow_recursion: bool,
    ) -> Outcome {
        if values.is_empty() {
            if self.allow_unreachable_cases {
                return Outcome::Analyzed;
            }
            log::trace!("unreachable switch section at {inst}");
            return Outcome::Abort;
        }
        if allow_recursion {
            if let Some(target) = func.match_branch(inst) {
                if self.is_exclusively_controlled(func, target) {
                    match self.analyze(func, target, &values, false) {
                        Outcome::Analyzed => {
                            self.inner_blocks.push(target);
                            return Outcome::Analyzed;
                        }
                        Outcome::Abort => return Outcome::Abort,
                        Outcome::NotSwitch => {}
                    }
                }
            }
        }
        self.add_section(func, values, inst);
        Outcome::Analyzed
    }

    fn is_exclusively_controlled(&self, func: &ILFunction, target: InstrId) -> bool {
        func.incoming_edge_count(target) == 1
            && func.parent(target) == self.container
            && Some(target) != self.root_block
    }

    fn add_section(&mut self, func: &ILFunction, values: LongSet, inst: InstrId) {
        let existing = if let Some(target) = func.match_branch(inst) {
            match self.target_block_to_section.get(&target) {
                Some(&index) => Some(index),
                None => {
                    self.target_block_to_section.insert(target, self.sections.len());
                    None
                }
            }
        } else if let Some(container) = func.match_leave(inst) {
            match self.target_container_to_section.get(&container) {
                Some(&index) => Some(index),
                None => {
                    self.target_container_to_section
                        .insert(container, self.sections.len());
                    None
                }
            }
        } else {
            None
        };
        match existing {
            Some(index) => {
                let merged = self.sections[index].0.union_with(&values);
                self.sections[index].0 = merged;
            }
            None => self.sections.push((values, inst)),
        }
    }

    /// Reduces a condition to the set of switch-variable values for which it holds.
    fn analyze_condition(&mut self, func: &ILFunction, condition: InstrId) -> Option<LongSet> {
        if let Some(argument) = func.match_logic_not(condition) {
            return self
                .analyze_condition(func, argument)
                .map(|set| set.invert());
        }
        let InstructionKind::Comp {
            kind,
            sign,
            input_type,
            is_lifted: false,
        } = func.kind(condition)
        else {
            return None;
        };
        let comp = func.match_comp(condition)?;
        let (kind, value, operand) = if let Some(value) = func.match_ldc_i(comp.right) {
            (*kind, value, comp.left)
        } else {
            (kind.swap(), func.match_ldc_i(comp.left)?, comp.right)
        };
        let (offset, bits) = self.match_switch_var(func, operand)?;
        let set = make_set_where_comparison_is_true_for(kind, value, *sign, *input_type);
        Some(shift_set(&set, offset, bits))
    }

    /// Matches `ldloc v`, `v - k` or `v + k` (unchecked) on the switch variable.
    ///
    /// Binds the variable on first use. Returns the offset that maps a value of the
    /// expression back to the variable, and the width of the arithmetic.
    fn match_switch_var(&mut self, func: &ILFunction, inst: InstrId) -> Option<(i64, u32)> {
        if let Some(var) = func.match_ld_loc(inst) {
            return self.bind(func, var).then_some((0, 64));
        }
        let bin = func.match_binary_numeric(inst)?;
        if bin.check_for_overflow {
            return None;
        }
        let var = func.match_ld_loc(bin.left)?;
        let constant = func.match_ldc_i(bin.right)?;
        let offset = match bin.operator {
            BinaryNumericOperator::Sub => constant,
            BinaryNumericOperator::Add => constant.wrapping_neg(),
            _ => return None,
        };
        let bits = func.stack_type(inst).integer_bits()?;
        self.bind(func, var).then_some((offset, bits))
    }

    fn bind(&mut self, func: &ILFunction, var: VarId) -> bool {
        match self.switch_var {
            Some(bound) => bound == var,
            None if func.variable(var).stack_type().is_integer() => {
                self.switch_var = Some(var);
                true
            }
            None => false,
        }
    }
}

/// The variable a block tail tests, if it has the shape of a switch root.
fn tail_variable(func: &ILFunction, block: InstrId) -> Option<VarId> {
    let last = func.last_child(block)?;
    let operands = if func.opcode(last) == OpCode::Switch {
        vec![func.first_child(last)?]
    } else {
        let (mut condition, _, _) = func.match_if_at_end_of_block(block)?;
        while let Some(argument) = func.match_logic_not(condition) {
            condition = argument;
        }
        let comp = func.match_comp(condition)?;
        vec![comp.left, comp.right]
    };
    operands.into_iter().find_map(|operand| {
        func.match_ld_loc(operand).or_else(|| {
            func.match_binary_numeric(operand)
                .and_then(|bin| func.match_ld_loc(bin.left))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{ComparisonKind, ILVariable, IlType, PrimitiveType, Sign, VariableKind},
        Result,
    };

    struct Body {
        func: ILFunction,
        x: VarId,
    }

    impl Body {
        fn new() -> Self {
            let mut func = ILFunction::new("M");
            let x = func.add_variable(ILVariable::new(
                VariableKind::Parameter,
                IlType::primitive(PrimitiveType::I4),
                "x",
            ));
            Body { func, x }
        }

        fn block(&mut self) -> Result<InstrId> {
            let body = self.func.body();
            let block = self.func.block(&[])?;
            self.func.add_child(body, block)?;
            Ok(block)
        }

        /// Fills `block` with `if (x <kind> value) br then; br otherwise`.
        fn test(
            &mut self,
            block: InstrId,
            kind: ComparisonKind,
            sign: Sign,
            value: i32,
            then: InstrId,
            otherwise: InstrId,
        ) -> Result<()> {
            let load = self.func.ld_loc(self.x);
            let constant = self.func.ldc_i4(value);
            let cond = self.func.comp(kind, sign, load, constant)?;
            let br_then = self.func.branch(then);
            let if_inst = self.func.if_then(cond, br_then)?;
            let br_else = self.func.branch(otherwise);
            self.func.add_child(block, if_inst)?;
            self.func.add_child(block, br_else)?;
            Ok(())
        }

        fn exit(&mut self) -> Result<InstrId> {
            let block = self.block()?;
            let ret = self.func.ret(None)?;
            self.func.add_child(block, ret)?;
            Ok(block)
        }
    }

    fn target(func: &ILFunction, inst: InstrId) -> Option<InstrId> {
        func.match_branch(inst)
    }

    #[test]
    fn test_equality_cascade() -> Result<()> {
        let mut b = Body::new();
        let root = b.block()?;
        let second = b.block()?;
        let third = b.block()?;
        let (a, bb, c, d) = (b.exit()?, b.exit()?, b.exit()?, b.exit()?);
        b.test(root, ComparisonKind::Equality, Sign::None, 1, a, second)?;
        b.test(second, ComparisonKind::Equality, Sign::None, 2, bb, third)?;
        b.test(third, ComparisonKind::Equality, Sign::None, 3, c, d)?;

        let mut analysis = SwitchAnalysis::new(false);
        assert!(analysis.analyze_block(&b.func, root));
        assert_eq!(analysis.switch_variable(), Some(b.x));
        let mut inner = analysis.inner_blocks().to_vec();
        inner.sort();
        assert_eq!(inner, vec![second, third]);
        let sections = analysis.sections();
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].0, LongSet::single(1));
        assert_eq!(target(&b.func, sections[0].1), Some(a));
        assert_eq!(sections[1].0, LongSet::single(2));
        assert_eq!(sections[2].0, LongSet::single(3));
        assert_eq!(target(&b.func, sections[3].1), Some(d));
        let default = LongSet::from_values([1, 2, 3])
            .invert()
            .intersect_with(&value_domain(StackType::I4));
        assert_eq!(sections[3].0, default);
        Ok(())
    }

    #[test]
    fn test_shared_block_not_recursed() -> Result<()> {
        let mut b = Body::new();
        let root = b.block()?;
        let shared = b.block()?;
        let other = b.block()?;
        let (a, d) = (b.exit()?, b.exit()?);
        b.test(root, ComparisonKind::Equality, Sign::None, 1, a, shared)?;
        b.test(shared, ComparisonKind::Equality, Sign::None, 2, a, d)?;
        // A second edge into `shared` makes it ineligible
        let extra = b.func.branch(shared);
        b.func.add_child(other, extra)?;

        let mut analysis = SwitchAnalysis::new(false);
        assert!(analysis.analyze_block(&b.func, root));
        assert_eq!(analysis.sections().len(), 2);
        assert!(analysis.inner_blocks().is_empty());
        Ok(())
    }

    #[test]
    fn test_duplicate_targets_are_merged() -> Result<()> {
        let mut b = Body::new();
        let root = b.block()?;
        let second = b.block()?;
        let (a, d) = (b.exit()?, b.exit()?);
        b.test(root, ComparisonKind::Equality, Sign::None, 1, a, second)?;
        b.test(second, ComparisonKind::Equality, Sign::None, 7, a, d)?;

        let mut analysis = SwitchAnalysis::new(false);
        assert!(analysis.analyze_block(&b.func, root));
        assert_eq!(analysis.sections().len(), 2);
        assert_eq!(analysis.sections()[0].0, LongSet::from_values([1, 7]));
        Ok(())
    }

    #[test]
    fn test_unrelated_condition_is_not_a_switch() -> Result<()> {
        let mut b = Body::new();
        let y = b.func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "y",
        ));
        let root = b.block()?;
        let (a, d) = (b.exit()?, b.exit()?);
        let left = b.func.ld_loc(b.x);
        let right = b.func.ld_loc(y);
        let cond = b.func.comp(ComparisonKind::Equality, Sign::None, left, right)?;
        let br = b.func.branch(a);
        let if_inst = b.func.if_then(cond, br)?;
        let br_else = b.func.branch(d);
        b.func.add_child(root, if_inst)?;
        b.func.add_child(root, br_else)?;

        let mut analysis = SwitchAnalysis::new(false);
        assert!(!analysis.analyze_block(&b.func, root));
        assert!(analysis.sections().is_empty());
        assert_eq!(analysis.switch_variable(), None);
        Ok(())
    }

    #[test]
    fn test_shift_set_wraps_in_32_bits() {
        let min = i64::from(i32::MIN);
        let max = i64::from(i32::MAX);
        let shifted = shift_set(&LongSet::single(max), 1, 32);
        assert_eq!(shifted, LongSet::single(min));
        let shifted = shift_set(&LongSet::inclusive(0, 3), -2, 32);
        assert_eq!(shifted, LongSet::inclusive(-2, 1));
    }
}
