//! Dead code elimination pass.
//!
//! Drops instructions a computation no longer needs: anything not reachable
//! from the root, a parameter, or an instruction with side effects. Removal
//! only edits the computation's member list; the module arena is append-only
//! and keeps the storage.

use std::collections::{HashMap, HashSet};

use grebe_hlo::{Computation, Handle, HloModule, Instruction, Opcode};

use crate::Pass;

/// Removes unreachable instructions from computation schedules.
#[derive(Debug)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dce"
    }

    fn run(&self, module: &mut HloModule) -> bool {
        let mut memo: HashMap<Handle<Computation>, bool> = HashMap::new();
        let computations: Vec<_> = module.computations.iter().map(|(h, _)| h).collect();

        let mut changed = false;
        for comp in computations {
            let live = live_set(module, comp, &mut memo);
            let computation = &mut module.computations[comp];
            let before = computation.instructions.len();
            computation.instructions.retain(|h| live.contains(h));
            let removed = before - computation.instructions.len();
            if removed > 0 {
                log::debug!(
                    "dce: removed {removed} instructions from '{}'",
                    computation.name
                );
                changed = true;
            }
        }
        changed
    }
}

fn live_set(
    module: &HloModule,
    comp: Handle<Computation>,
    memo: &mut HashMap<Handle<Computation>, bool>,
) -> HashSet<Handle<Instruction>> {
    let computation = &module.computations[comp];

    // Roots: the computation result, every parameter (they are part of the
    // signature), and everything that touches the outside world.
    let mut worklist = vec![computation.root];
    for &handle in &computation.instructions {
        let instruction = &module.instructions[handle];
        if matches!(instruction.opcode, Opcode::Parameter { .. })
            || instruction_has_effects(module, instruction, memo)
        {
            worklist.push(handle);
        }
    }

    let mut live = HashSet::new();
    while let Some(handle) = worklist.pop() {
        if live.insert(handle) {
            worklist.extend(module.instructions[handle].operands.iter().copied());
        }
    }
    live
}

fn instruction_has_effects(
    module: &HloModule,
    instruction: &Instruction,
    memo: &mut HashMap<Handle<Computation>, bool>,
) -> bool {
    if instruction.opcode.has_side_effects() {
        return true;
    }
    instruction
        .opcode
        .called_computations()
        .into_iter()
        .any(|(_, callee)| computation_has_effects(module, callee, memo))
}

fn computation_has_effects(
    module: &HloModule,
    comp: Handle<Computation>,
    memo: &mut HashMap<Handle<Computation>, bool>,
) -> bool {
    if let Some(&cached) = memo.get(&comp) {
        return cached;
    }
    // Seed the entry so self-recursive chains terminate.
    memo.insert(comp, false);

    let members = module.computations[comp].instructions.clone();
    let result = members
        .iter()
        .any(|&h| instruction_has_effects(module, &module.instructions[h], memo));
    memo.insert(comp, result);
    result
}
