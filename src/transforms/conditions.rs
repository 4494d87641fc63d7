//! Condition detection.
//!
//! Turns the branch structure left by the earlier passes into nested `if`/`else` bodies.
//! All rules move a block that exactly one branch targets into the place of that branch,
//! so every rewrite removes a block from its container and the pass terminates.
//!
//! Rules, tried in order on each block of a container (including blocks already nested
//! inside `if` bodies):
//!
//! 1. `if (c) br T; br F` where `T` and `F` are single-entry and both end in `br X`
//!    becomes `if (c) { T } else { F }; br X`.
//! 2. `if (c) br T; ...` where `T` is single-entry becomes `if (c) { T }; ...`.
//! 3. A block ending in `br F` where `F` is single-entry absorbs the instructions of `F`.
//! 4. Switch sections whose body is `br T` with `T` single-entry take `T` as their body.
//!
//! The entry block of a container is never moved: in a loop it is the `continue` target.

use crate::{
    il::{ILFunction, InstrId, OpCode},
    transforms::{block_containers, is_single_entry, ILTransform, TransformContext},
    Result,
};

/// Nests single-entry blocks into the conditionals that reach them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionDetection;

impl ILTransform for ConditionDetection {
    fn name(&self) -> &'static str {
        "condition-detection"
    }

    fn should_run(&self, ctx: &TransformContext<'_>) -> bool {
        ctx.settings().condition_detection
    }

    fn run(&self, func: &mut ILFunction, _ctx: &TransformContext<'_>) -> Result<bool> {
        let mut changed = false;
        for container in block_containers(func) {
            loop {
                let mut progress = false;
                for block in blocks_of(func, container).into_iter().rev() {
                    if func.is_connected(block) && transform_block(func, container, block)? {
                        progress = true;
                    }
                }
                if !progress {
                    break;
                }
                changed = true;
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Nests single-entry branch targets into if/else and switch bodies"
    }
}

/// Blocks whose closest container is `container`, in pre-order.
fn blocks_of(func: &ILFunction, container: InstrId) -> Vec<InstrId> {
    func.descendants(container)
        .into_iter()
        .filter(|&node| {
            func.opcode(node) == OpCode::Block && func.find_closest_container(node) == Some(container)
        })
        .collect()
}

fn transform_block(func: &mut ILFunction, container: InstrId, block: InstrId) -> Result<bool> {
    Ok(build_if_else(func, container, block)?
        || inline_true_branch(func, container, block)?
        || merge_fallthrough(func, container, block)?
        || inline_switch_sections(func, container, block)?)
}

/// Rule 1: both arms are single-entry and converge on the same block.
fn build_if_else(func: &mut ILFunction, container: InstrId, block: InstrId) -> Result<bool> {
    let Some((_, true_inst, false_inst)) = func.match_if_at_end_of_block(block) else {
        return Ok(false);
    };
    let (Some(then_block), Some(else_block)) =
        (func.match_branch(true_inst), func.match_branch(false_inst))
    else {
        return Ok(false);
    };
    if then_block == else_block
        || !is_single_entry(func, then_block, container)
        || !is_single_entry(func, else_block, container)
    {
        return Ok(false);
    }
    let (Some(then_exit), Some(else_exit)) = (func.last_child(then_block), func.last_child(else_block))
    else {
        return Ok(false);
    };
    let (Some(join), Some(else_join)) = (func.match_branch(then_exit), func.match_branch(else_exit))
    else {
        return Ok(false);
    };
    if join != else_join {
        return Ok(false);
    }
    let if_inst = func
        .prev_sibling(false_inst)
        .ok_or_else(|| invariant_error!("{} has no if before its last branch", block))?;
    let empty_else = func
        .child(if_inst, 2)
        .ok_or_else(|| invariant_error!("{} has no false slot", if_inst))?;

    func.detach(then_block)?;
    func.detach(else_block)?;
    func.detach(then_exit)?;
    func.detach(else_exit)?;
    func.replace_with(true_inst, then_block)?;
    func.replace_with(empty_else, else_block)?;
    func.replace_with(false_inst, then_exit)?;

    log::trace!("{}: if/else at {} joining at {}", func.name(), block, join);
    Ok(true)
}

/// Rule 2: the true arm jumps to a single-entry block.
fn inline_true_branch(func: &mut ILFunction, container: InstrId, block: InstrId) -> Result<bool> {
    let Some((_, true_inst, false_inst)) = func.match_if_at_end_of_block(block) else {
        return Ok(false);
    };
    let Some(target) = func.match_branch(true_inst) else {
        return Ok(false);
    };
    if func.match_branch(false_inst) == Some(target) || !is_single_entry(func, target, container) {
        return Ok(false);
    }
    func.detach(target)?;
    func.replace_with(true_inst, target)?;
    Ok(true)
}

/// Rule 3: the block falls through into a single-entry block.
fn merge_fallthrough(func: &mut ILFunction, container: InstrId, block: InstrId) -> Result<bool> {
    let Some(last) = func.last_child(block) else {
        return Ok(false);
    };
    let Some(target) = func.match_branch(last) else {
        return Ok(false);
    };
    if target == block || !is_single_entry(func, target, container) {
        return Ok(false);
    }
    func.detach(last)?;
    func.detach(target)?;
    for instruction in func.child_list(target) {
        func.detach(instruction)?;
        func.add_child(block, instruction)?;
    }
    Ok(true)
}

/// Rule 4: switch sections jumping to single-entry blocks.
fn inline_switch_sections(
    func: &mut ILFunction,
    container: InstrId,
    block: InstrId,
) -> Result<bool> {
    let Some(switch) = func.last_child(block).filter(|&s| func.opcode(s) == OpCode::Switch) else {
        return Ok(false);
    };
    let mut changed = false;
    for section in func.children(switch).skip(1).collect::<Vec<_>>() {
        let Some(jump) = func.first_child(section) else {
            continue;
        };
        let Some(target) = func.match_branch(jump) else {
            continue;
        };
        if is_single_entry(func, target, container) {
            func.detach(target)?;
            func.replace_with(jump, target)?;
            changed = true;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{ComparisonKind, ILVariable, IlType, MethodRef, PrimitiveType, Sign, VarId, VariableKind},
        settings::DecompilerSettings,
    };

    fn call(func: &mut ILFunction, name: &str) -> Result<InstrId> {
        func.call(MethodRef::static_method("C", name, 0, IlType::Void), &[])
    }

    fn flag(func: &mut ILFunction) -> VarId {
        func.add_variable(ILVariable::new(
            VariableKind::Parameter,
            IlType::primitive(PrimitiveType::I4),
            "flag",
        ))
    }

    fn is_zero(func: &mut ILFunction, var: VarId) -> Result<InstrId> {
        let load = func.ld_loc(var);
        let zero = func.ldc_i4(0);
        func.comp(ComparisonKind::Equality, Sign::None, load, zero)
    }

    fn run(func: &mut ILFunction) -> Result<bool> {
        let settings = DecompilerSettings::default();
        ConditionDetection.run(func, &TransformContext::new(&settings))
    }

    #[test]
    fn test_diamond_becomes_if_else() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let f = flag(&mut func);

        let ret = func.ret(None)?;
        let join = func.block(&[ret])?;
        let a = call(&mut func, "A")?;
        let to_join = func.branch(join);
        let then_block = func.block(&[a, to_join])?;
        let b = call(&mut func, "B")?;
        let to_join = func.branch(join);
        let else_block = func.block(&[b, to_join])?;

        let cond = is_zero(&mut func, f)?;
        let to_then = func.branch(then_block);
        let if_inst = func.if_then(cond, to_then)?;
        let to_else = func.branch(else_block);
        let entry = func.block(&[if_inst, to_else])?;
        for block in [entry, then_block, else_block, join] {
            func.add_child(body, block)?;
        }

        assert!(run(&mut func)?);
        func.validate()?;

        // The join block is single-entry afterwards and gets merged too
        assert_eq!(func.child_list(body), vec![entry]);
        let children = func.child_list(entry);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], if_inst);
        assert_eq!(func.child(if_inst, 1), Some(then_block));
        assert_eq!(func.child(if_inst, 2), Some(else_block));
        assert_eq!(func.child_count(then_block), 1);
        assert_eq!(func.match_return(children[1]), Some(None));
        Ok(())
    }

    #[test]
    fn test_early_return_is_inlined() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let f = flag(&mut func);

        let ret = func.ret(None)?;
        let bail = func.block(&[ret])?;
        let work = call(&mut func, "Work")?;
        let ret = func.ret(None)?;
        let rest = func.block(&[work, ret])?;

        let cond = is_zero(&mut func, f)?;
        let to_bail = func.branch(bail);
        let if_inst = func.if_then(cond, to_bail)?;
        let to_rest = func.branch(rest);
        let entry = func.block(&[if_inst, to_rest])?;
        for block in [entry, bail, rest] {
            func.add_child(body, block)?;
        }

        assert!(run(&mut func)?);
        func.validate()?;
        assert_eq!(func.child_list(body), vec![entry]);
        // if (flag == 0) { return; } Work(); return;
        assert_eq!(func.child_count(entry), 3);
        assert_eq!(func.child(if_inst, 1), Some(bail));
        assert!(func.match_nop(func.child(if_inst, 2).ok_or(crate::Error::ForeignNode)?));
        Ok(())
    }

    #[test]
    fn test_shared_target_is_not_moved() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let f = flag(&mut func);

        let ret = func.ret(None)?;
        let shared = func.block(&[ret])?;
        let to_shared = func.branch(shared);
        let middle = func.block(&[to_shared])?;
        let cond = is_zero(&mut func, f)?;
        let to_shared = func.branch(shared);
        let if_inst = func.if_then(cond, to_shared)?;
        let to_middle = func.branch(middle);
        let entry = func.block(&[if_inst, to_middle])?;
        for block in [entry, middle, shared] {
            func.add_child(body, block)?;
        }

        // Only the fallthrough into `middle` merges; `shared` keeps two predecessors
        assert!(run(&mut func)?);
        func.validate()?;
        assert_eq!(func.child_list(body), vec![entry, shared]);
        assert_eq!(func.incoming_edge_count(shared), 2);
        Ok(())
    }
}
