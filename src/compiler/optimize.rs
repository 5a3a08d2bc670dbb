//! Label and jump clean-up over a flat instruction list.
//!
//! Four passes run until none of them changes anything: jump correction,
//! dead-label removal, dead-jump removal and fallthrough-jump removal.

use std::collections::{HashMap, HashSet};

use crate::isa::{Instruction, LabelId};

/// Runs every pass to a fixed point. Returns the number of rounds that made
/// a change.
pub fn optimize(code: &mut Vec<Instruction>) -> usize {
    let mut rounds = 0;
    loop {
        let mut changed = correct_jumps(code);
        changed |= remove_unused_labels(code);
        changed |= remove_dead_jumps(code);
        changed |= remove_fallthrough_jumps(code);
        if !changed {
            return rounds;
        }
        rounds += 1;
        log::debug!("optimizer round {rounds}: {} instructions", code.len());
    }
}

fn label_positions(code: &[Instruction]) -> HashMap<LabelId, usize> {
    code.iter().enumerate().filter_map(|(i, inst)| inst.as_label().map(|l| (l, i))).collect()
}

/// Where a jump to `target` really ends up: past any run of labels, and
/// through any unconditional jump that follows that run. A cycle leaves the
/// target alone.
fn resolve(code: &[Instruction], positions: &HashMap<LabelId, usize>, target: LabelId) -> LabelId {
    let mut current = target;
    let mut seen = HashSet::new();
    loop {
        if !seen.insert(current) {
            log::warn!("jump cycle through {current}; leaving {target} in place");
            return target;
        }
        let Some(&start) = positions.get(&current) else {
            return current;
        };
        let mut last = start;
        while matches!(code.get(last + 1), Some(Instruction::Label(_))) {
            last += 1;
        }
        let run_end = code[last].as_label().unwrap_or(current);
        match code.get(last + 1) {
            Some(Instruction::Jump(next)) => current = *next,
            _ => return run_end,
        }
    }
}

/// Retargets every jump to its final destination.
pub fn correct_jumps(code: &mut [Instruction]) -> bool {
    let positions = label_positions(code);
    let mut changed = false;
    for i in 0..code.len() {
        let Some(target) = code[i].target() else { continue };
        let resolved = resolve(code, &positions, target);
        if resolved != target {
            code[i].set_target(resolved);
            changed = true;
        }
    }
    changed
}

/// Drops labels no jump refers to.
pub fn remove_unused_labels(code: &mut Vec<Instruction>) -> bool {
    let used: HashSet<LabelId> = code.iter().filter_map(Instruction::target).collect();
    let before = code.len();
    code.retain(|inst| inst.as_label().is_none_or(|l| used.contains(&l)));
    code.len() != before
}

/// Drops an unconditional jump straight after another one; it can never run.
pub fn remove_dead_jumps(code: &mut Vec<Instruction>) -> bool {
    let before = code.len();
    let mut previous_was_jump = false;
    code.retain(|inst| {
        let is_jump = inst.is_unconditional_jump();
        let keep = !(is_jump && previous_was_jump);
        if keep {
            previous_was_jump = is_jump;
        }
        keep
    });
    code.len() != before
}

/// Drops an unconditional jump whose target sits in the run of labels right
/// after it.
pub fn remove_fallthrough_jumps(code: &mut Vec<Instruction>) -> bool {
    let mut doomed = vec![false; code.len()];
    for i in 0..code.len() {
        let Instruction::Jump(target) = code[i] else { continue };
        doomed[i] = code[i + 1..]
            .iter()
            .map_while(Instruction::as_label)
            .any(|l| l == target);
    }
    if !doomed.contains(&true) {
        return false;
    }
    let mut flags = doomed.into_iter();
    code.retain(|_| !flags.next().unwrap_or(false));
    true
}
