//! Tuple forwarding pass.
//!
//! A `get-tuple-element` whose operand is a `tuple` instruction adds nothing:
//! every user can read the tuple's element directly. This pass rewrites those
//! uses (operand lists and computation roots) one step at a time; chains
//! resolve over the pass manager's fixed-point iteration, and the orphaned
//! bookkeeping nodes are left for dead code elimination.

use std::collections::HashMap;

use grebe_hlo::{Handle, HloModule, Instruction, Opcode};

use crate::Pass;

/// Forwards `get-tuple-element(tuple(..), i)` to the packed element.
#[derive(Debug)]
pub struct TupleSimplification;

impl Pass for TupleSimplification {
    fn name(&self) -> &str {
        "tuple-simplify"
    }

    fn run(&self, module: &mut HloModule) -> bool {
        let mut forward: HashMap<Handle<Instruction>, Handle<Instruction>> = HashMap::new();
        for (handle, instruction) in module.instructions.iter() {
            let Opcode::GetTupleElement { index } = instruction.opcode else {
                continue;
            };
            let Some(&source) = instruction.operands.first() else {
                continue;
            };
            if !matches!(module.instructions[source].opcode, Opcode::Tuple) {
                continue;
            }
            if let Some(&element) = module.instructions[source].operands.get(index) {
                forward.insert(handle, element);
            }
        }
        if forward.is_empty() {
            return false;
        }

        let mut changed = false;
        for (_, instruction) in module.instructions.iter_mut() {
            for operand in &mut instruction.operands {
                if let Some(&element) = forward.get(operand) {
                    *operand = element;
                    changed = true;
                }
            }
        }
        for (_, computation) in module.computations.iter_mut() {
            if let Some(&element) = forward.get(&computation.root) {
                log::debug!(
                    "tuple-simplify: root of '{}' forwarded past a tuple",
                    computation.name
                );
                computation.root = element;
                changed = true;
            }
        }
        changed
    }
}
