//! Switch detection.
//!
//! Runs [`SwitchAnalysis`] on the tail of every block. When the analysis succeeds with at
//! least [`DecompilerSettings::min_switch_sections`] sections, the tail (the `if` cascade
//! or the IL switch) is replaced by one `switch` over the tracked variable and the blocks
//! the analysis absorbed are removed.
//!
//! The section with the most values becomes the default section: it is placed last and
//! its label set is widened to every value no other section claims.
//!
//! [`DecompilerSettings::min_switch_sections`]: crate::settings::DecompilerSettings

use crate::{
    analysis::{LongSet, SwitchAnalysis},
    il::{ILFunction, InstrId, OpCode},
    transforms::{block_containers, remove_dead_blocks, ILTransform, TransformContext},
    Result,
};

/// Largest value set a non-default section may carry; every value becomes a `case` label.
pub const MAX_CASE_LABELS: u128 = 64;

/// Replaces multi-way branches with `switch` instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchDetection;

impl ILTransform for SwitchDetection {
    fn name(&self) -> &'static str {
        "switch-detection"
    }

    fn should_run(&self, ctx: &TransformContext<'_>) -> bool {
        ctx.settings().switch_detection
    }

    fn run(&self, func: &mut ILFunction, ctx: &TransformContext<'_>) -> Result<bool> {
        let mut changed = false;
        for container in block_containers(func) {
            for block in func.child_list(container) {
                // Earlier rewrites may have removed the block
                if func.parent(block) != Some(container) {
                    continue;
                }
                changed |= detect_switch(func, container, block, ctx)?;
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Rebuilds switch statements from comparison cascades and IL switches"
    }
}

/// Orders sections so that the largest is last and covers every unclaimed value.
fn with_default_last(mut sections: Vec<(LongSet, InstrId)>) -> Vec<(LongSet, InstrId)> {
    let Some(default_index) = sections
        .iter()
        .enumerate()
        .max_by_key(|(index, (values, _))| (values.count(), std::cmp::Reverse(*index)))
        .map(|(index, _)| index)
    else {
        return sections;
    };
    let (_, default_body) = sections.remove(default_index);
    let claimed = sections
        .iter()
        .fold(LongSet::empty(), |acc, (values, _)| acc.union_with(values));
    sections.push((claimed.invert(), default_body));
    sections
}

fn detect_switch(
    func: &mut ILFunction,
    container: InstrId,
    block: InstrId,
    ctx: &TransformContext<'_>,
) -> Result<bool> {
    let settings = ctx.settings();
    let Some(tail) = func.last_child(block) else {
        return Ok(false);
    };
    let tail_is_switch = func.opcode(tail) == OpCode::Switch;
    if !tail_is_switch && func.match_if_at_end_of_block(block).is_none() {
        return Ok(false);
    }

    let mut analysis = SwitchAnalysis::new(settings.allow_unreachable_cases);
    if !analysis.analyze_block(func, block) {
        return Ok(false);
    }
    let Some(variable) = analysis.switch_variable() else {
        return Ok(false);
    };
    if tail_is_switch && analysis.inner_blocks().is_empty() {
        // Nothing to merge into an existing switch
        return Ok(false);
    }
    if analysis.sections().len() < settings.min_switch_sections {
        log::trace!(
            "{}: {} has only {} sections",
            func.name(),
            block,
            analysis.sections().len()
        );
        return Ok(false);
    }

    let ordered = with_default_last(analysis.sections().to_vec());
    let cases = ordered.split_last().map_or(&[][..], |(_, cases)| cases);
    if cases.iter().any(|(values, _)| values.count() > MAX_CASE_LABELS) {
        log::trace!("{}: {} has a section too wide for case labels", func.name(), block);
        return Ok(false);
    }
    let sections: Vec<(LongSet, InstrId)> = ordered
        .into_iter()
        .map(|(values, jump)| (values, func.clone_subtree(jump)))
        .collect();
    let value = func.ld_loc(variable);
    let switch = func.switch(value, sections)?;

    if !tail_is_switch {
        if let Some(if_inst) = func.prev_sibling(tail) {
            func.detach(if_inst)?;
        }
    }
    func.replace_with(tail, switch)?;
    for &inner in analysis.inner_blocks() {
        func.detach(inner)?;
    }
    let removed = remove_dead_blocks(func, container)?;

    log::debug!(
        "{}: switch over {} in {} ({} sections, {} blocks removed)",
        func.name(),
        func.variable(variable).name,
        block,
        func.child_count(switch) - 1,
        analysis.inner_blocks().len() + removed
    );
    Ok(true)
}
