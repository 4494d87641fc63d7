//! Natural-loop detection.
//!
//! For every natural loop of a container the loop blocks move into a new
//! [`ContainerKind::Loop`] container. The header block stays where it is, so branches from
//! outside the loop keep their target; its instructions move into a fresh block that
//! becomes the loop entry, and back edges are redirected to that entry. When the loop has
//! exactly one exit target, every branch to it becomes `leave loop` and the header ends
//! with `br exit` after the loop container.
//!
//! Loops are processed outermost first. Each new loop container is queued so that loops
//! nested inside it are found on its own block graph.

use rustc_hash::FxHashSet;

use crate::{
    analysis::{detect_loops, BlockGraph, NaturalLoop},
    il::{ContainerKind, ILFunction, InstrId, InstructionKind},
    transforms::{block_containers, ILTransform, TransformContext},
    Result,
};

/// Moves natural loops into `Loop` containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopDetection;

impl ILTransform for LoopDetection {
    fn name(&self) -> &'static str {
        "loop-detection"
    }

    fn should_run(&self, ctx: &TransformContext<'_>) -> bool {
        ctx.settings().loop_detection
    }

    fn run(&self, func: &mut ILFunction, _ctx: &TransformContext<'_>) -> Result<bool> {
        let mut changed = false;
        let mut worklist = block_containers(func);
        worklist.reverse();
        while let Some(container) = worklist.pop() {
            while let Some(new_loop) = detect_outermost_loop(func, container)? {
                worklist.push(new_loop);
                changed = true;
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Moves natural loops into loop containers with leave exits"
    }
}

fn is_loop_container(func: &ILFunction, container: InstrId) -> bool {
    matches!(
        func.kind(container),
        InstructionKind::BlockContainer {
            kind: ContainerKind::Loop,
            ..
        }
    )
}

/// Transforms one outermost loop of `container`, returning the new loop container.
fn detect_outermost_loop(func: &mut ILFunction, container: InstrId) -> Result<Option<InstrId>> {
    if !matches!(func.kind(container), InstructionKind::BlockContainer { .. }) {
        return Ok(None);
    }
    let graph = BlockGraph::new(func, container);
    if graph.is_empty() {
        return Ok(None);
    }
    let dominators = graph.dominators();
    let loops = detect_loops(&graph, &dominators);
    let in_loop_container = is_loop_container(func, container);

    // The entry of a loop container is already the head of the enclosing loop
    let candidates: Vec<&NaturalLoop> = loops
        .iter()
        .filter(|l| !(in_loop_container && l.header == 0))
        .collect();
    let outermost = candidates.iter().find(|l| {
        !candidates
            .iter()
            .any(|other| other.header != l.header && other.contains(l.header))
    });
    let Some(natural) = outermost else {
        return Ok(None);
    };

    let header = graph.block(natural.header);
    let members: Vec<InstrId> = natural
        .sorted_body()
        .into_iter()
        .filter(|&node| node != natural.header)
        .map(|node| graph.block(node))
        .collect();
    let exits: Vec<InstrId> = natural
        .exit_targets(&graph)
        .into_iter()
        .map(|node| graph.block(node))
        .collect();

    log::trace!(
        "{}: loop at {} with {} blocks and {} exits",
        func.name(),
        header,
        members.len() + 1,
        exits.len()
    );

    let loop_container = func.container(ContainerKind::Loop);
    let loop_entry = func.block(&[])?;
    for instruction in func.child_list(header) {
        func.detach(instruction)?;
        func.add_child(loop_entry, instruction)?;
    }
    func.add_child(loop_container, loop_entry)?;
    for block in &members {
        func.detach(*block)?;
        func.add_child(loop_container, *block)?;
    }

    let inside: FxHashSet<InstrId> = func.descendants(loop_container).into_iter().collect();
    let single_exit = match exits.as_slice() {
        [exit] => Some(*exit),
        _ => None,
    };
    for &node in &inside {
        let InstructionKind::Branch { target } = *func.kind(node) else {
            continue;
        };
        if target == header {
            func.set_branch_target(node, loop_entry)?;
        } else if Some(target) == single_exit {
            let leave = func.leave(loop_container)?;
            func.replace_with(node, leave)?;
        }
    }

    func.add_child(header, loop_container)?;
    if let Some(exit) = single_exit {
        let to_exit = func.branch(exit);
        func.add_child(header, to_exit)?;
    }
    Ok(Some(loop_container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{
            BinaryNumericOperator, ComparisonKind, ILVariable, IlType, MethodRef, OpCode,
            PrimitiveType, Sign, VariableKind,
        },
        settings::DecompilerSettings,
    };

    /// `i = 0; while (i < 10) { Tick(); i = i + 1; } return;`
    fn counting_loop() -> Result<(ILFunction, [InstrId; 4])> {
        let mut func = ILFunction::new("Count");
        let body = func.body();
        let i = func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "i",
        ));

        let ret = func.ret(None)?;
        let exit = func.block(&[ret])?;

        let tick = func.call(MethodRef::static_method("C", "Tick", 0, IlType::Void), &[])?;
        let load = func.ld_loc(i);
        let one = func.ldc_i4(1);
        let add = func.binary(BinaryNumericOperator::Add, load, one)?;
        let increment = func.st_loc(i, add)?;
        let latch = func.block(&[tick, increment])?;

        let load = func.ld_loc(i);
        let ten = func.ldc_i4(10);
        let condition = func.comp(ComparisonKind::LessThan, Sign::Signed, load, ten)?;
        let to_latch = func.branch(latch);
        let test = func.if_then(condition, to_latch)?;
        let to_exit = func.branch(exit);
        let head = func.block(&[test, to_exit])?;

        let to_head = func.branch(head);
        func.add_child(latch, to_head)?;
        let zero = func.ldc_i4(0);
        let init = func.st_loc(i, zero)?;
        let to_head = func.branch(head);
        let entry = func.block(&[init, to_head])?;

        for block in [entry, head, latch, exit] {
            func.add_child(body, block)?;
        }
        Ok((func, [entry, head, latch, exit]))
    }

    #[test]
    fn test_while_loop_becomes_loop_container() -> Result<()> {
        let (mut func, [entry, head, latch, exit]) = counting_loop()?;
        let settings = DecompilerSettings::default();
        let ctx = TransformContext::new(&settings);

        assert!(LoopDetection.run(&mut func, &ctx)?);
        func.validate()?;

        assert_eq!(func.child_list(func.body()), vec![entry, head, exit]);
        let head_children = func.child_list(head);
        assert_eq!(head_children.len(), 2);
        let loop_container = head_children[0];
        assert!(is_loop_container(&func, loop_container));
        assert_eq!(func.match_branch(head_children[1]), Some(exit));

        let loop_blocks = func.child_list(loop_container);
        assert_eq!(loop_blocks.len(), 2);
        assert_eq!(loop_blocks[1], latch);
        // The back edge now targets the loop entry, the exit became a leave
        assert_eq!(func.incoming_edge_count(loop_blocks[0]), 1);
        assert_eq!(func.incoming_edge_count(head), 1);
        assert_eq!(func.incoming_edge_count(exit), 1);
        let leaves = func
            .descendants(loop_container)
            .into_iter()
            .filter(|&n| func.opcode(n) == OpCode::Leave)
            .count();
        assert_eq!(leaves, 1);
        Ok(())
    }

    #[test]
    fn test_second_run_finds_nothing() -> Result<()> {
        let (mut func, _) = counting_loop()?;
        let settings = DecompilerSettings::default();
        let ctx = TransformContext::new(&settings);
        assert!(LoopDetection.run(&mut func, &ctx)?);
        assert!(!LoopDetection.run(&mut func, &ctx)?);
        Ok(())
    }

    #[test]
    fn test_acyclic_body_is_untouched() -> Result<()> {
        let mut func = ILFunction::new("M");
        let body = func.body();
        let ret = func.ret(None)?;
        let entry = func.block(&[ret])?;
        func.add_child(body, entry)?;
        let settings = DecompilerSettings::default();
        assert!(!LoopDetection.run(&mut func, &TransformContext::new(&settings))?);
        Ok(())
    }
}
