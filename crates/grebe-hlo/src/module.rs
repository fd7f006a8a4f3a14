//! Computations and the module that owns them.

use std::collections::{HashMap, HashSet};

use crate::arena::{Arena, Handle};
use crate::error::HloError;
use crate::instr::{Instruction, Opcode};
use crate::shape::Shape;

/// A named instruction sequence in execution order.
///
/// The sequence is already scheduled: every operand appears before its user.
/// Instructions live in the module's arena; a computation only lists them.
#[derive(Clone, Debug)]
pub struct Computation {
    pub name: String,
    /// Members in scheduled order.
    pub instructions: Vec<Handle<Instruction>>,
    /// The instruction producing this computation's result.
    pub root: Handle<Instruction>,
}

impl Computation {
    pub fn new(
        name: impl Into<String>,
        instructions: Vec<Handle<Instruction>>,
        root: Handle<Instruction>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions,
            root,
        }
    }

    /// A placeholder computation with no members. Invalid until instructions
    /// are added and the root is set.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            root: Handle::new(0),
        }
    }
}

/// A whole scheduled graph: instructions, computations, and the entry point.
#[derive(Clone, Debug)]
pub struct HloModule {
    pub name: String,
    /// Every instruction of every computation, in one arena so that handles
    /// are unique module-wide.
    pub instructions: Arena<Instruction>,
    pub computations: Arena<Computation>,
    pub entry: Option<Handle<Computation>>,
}

impl HloModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Arena::new(),
            computations: Arena::new(),
            entry: None,
        }
    }

    pub fn add_instruction(&mut self, instruction: Instruction) -> Handle<Instruction> {
        self.instructions.append(instruction)
    }

    pub fn add_computation(&mut self, computation: Computation) -> Handle<Computation> {
        self.computations.append(computation)
    }

    /// Marks `computation` as the module entry.
    pub fn set_entry(&mut self, computation: Handle<Computation>) {
        self.entry = Some(computation);
    }

    /// The parameter instruction with the given number, if the computation
    /// has one.
    pub fn parameter_of(
        &self,
        computation: Handle<Computation>,
        number: usize,
    ) -> Option<Handle<Instruction>> {
        let computation = self.computations.try_get(computation)?;
        computation
            .instructions
            .iter()
            .copied()
            .find(|&h| match self.instructions.try_get(h) {
                Some(instr) => matches!(instr.opcode, Opcode::Parameter { number: n } if n == number),
                None => false,
            })
    }

    /// Computations reachable from the entry, entry first, each visited once.
    pub fn reachable_computations(&self) -> Vec<Handle<Computation>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let Some(entry) = self.entry else {
            return order;
        };
        let mut worklist = vec![entry];
        while let Some(comp) = worklist.pop() {
            if !seen.insert(comp) {
                continue;
            }
            order.push(comp);
            let Some(computation) = self.computations.try_get(comp) else {
                continue;
            };
            // Queue callees in reverse so they pop in source order.
            let mut callees = Vec::new();
            for &instr in &computation.instructions {
                if let Some(instruction) = self.instructions.try_get(instr) {
                    for (_, callee) in instruction.opcode.called_computations() {
                        callees.push(callee);
                    }
                }
            }
            for callee in callees.into_iter().rev() {
                worklist.push(callee);
            }
        }
        order
    }

    /// Checks the structural invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<(), HloError> {
        if self.entry.is_none() {
            return Err(HloError::MissingEntry);
        }

        let mut names = HashSet::new();
        for (_, instruction) in self.instructions.iter() {
            if !names.insert(instruction.name.as_str()) {
                return Err(HloError::DuplicateName {
                    name: instruction.name.clone(),
                });
            }
        }

        let mut owner: HashSet<Handle<Instruction>> = HashSet::new();
        for (_, computation) in self.computations.iter() {
            if computation.instructions.is_empty() {
                return Err(HloError::EmptyComputation {
                    computation: computation.name.clone(),
                });
            }

            let mut position: HashMap<Handle<Instruction>, usize> = HashMap::new();
            let mut parameters = Vec::new();
            for (pos, &handle) in computation.instructions.iter().enumerate() {
                let Some(instruction) = self.instructions.try_get(handle) else {
                    return Err(HloError::DanglingInstruction {
                        computation: computation.name.clone(),
                        handle: format!("{handle:?}"),
                    });
                };
                if !owner.insert(handle) {
                    return Err(HloError::SharedInstruction {
                        instruction: instruction.name.clone(),
                    });
                }
                position.insert(handle, pos);
                if let Opcode::Parameter { number } = instruction.opcode {
                    parameters.push(number);
                }
                self.check_instruction(handle, instruction, &position, pos)?;
            }

            parameters.sort_unstable();
            if parameters.iter().enumerate().any(|(i, &n)| i != n) {
                return Err(HloError::ParameterNumbering {
                    computation: computation.name.clone(),
                });
            }

            if !position.contains_key(&computation.root) {
                return Err(HloError::RootNotMember {
                    computation: computation.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn check_instruction(
        &self,
        _handle: Handle<Instruction>,
        instruction: &Instruction,
        position: &HashMap<Handle<Instruction>, usize>,
        pos: usize,
    ) -> Result<(), HloError> {
        for &operand in &instruction.operands {
            match position.get(&operand) {
                Some(&operand_pos) if operand_pos < pos => {}
                _ => {
                    let operand_name = self
                        .instructions
                        .try_get(operand)
                        .map(|i| i.name.clone())
                        .unwrap_or_else(|| format!("{operand:?}"));
                    return Err(HloError::OperandNotScheduled {
                        instruction: instruction.name.clone(),
                        operand: operand_name,
                    });
                }
            }
        }

        for (_, callee) in instruction.opcode.called_computations() {
            if self.computations.try_get(callee).is_none() {
                return Err(HloError::DanglingComputation {
                    instruction: instruction.name.clone(),
                    handle: format!("{callee:?}"),
                });
            }
        }

        let expected_arity = match &instruction.opcode {
            Opcode::Unary(_) | Opcode::Convert | Opcode::Copy => Some(1),
            Opcode::Binary(_) | Opcode::Compare { .. } => Some(2),
            Opcode::Select => Some(3),
            Opcode::GetTupleElement { .. } | Opcode::Bitcast | Opcode::AllReduceDone => Some(1),
            Opcode::AddDependency => Some(2),
            Opcode::While { .. } => Some(1),
            Opcode::Parameter { .. }
            | Opcode::Constant { .. }
            | Opcode::ReplicaId
            | Opcode::PartitionId
            | Opcode::RngGetAndUpdateState { .. } => Some(0),
            _ => None,
        };
        if let Some(expected) = expected_arity {
            if instruction.operands.len() != expected {
                return Err(HloError::OperandCount {
                    instruction: instruction.name.clone(),
                    expected,
                    found: instruction.operands.len(),
                });
            }
        }

        // Fusion arity comes from the fused computation's signature.
        if let Opcode::Fusion { fused } = instruction.opcode {
            let expected = self
                .computations
                .try_get(fused)
                .map(|comp| {
                    comp.instructions
                        .iter()
                        .filter(|&&h| {
                            matches!(
                                self.instructions.try_get(h).map(|i| &i.opcode),
                                Some(Opcode::Parameter { .. })
                            )
                        })
                        .count()
                })
                .unwrap_or(0);
            if instruction.operands.len() != expected {
                return Err(HloError::OperandCount {
                    instruction: instruction.name.clone(),
                    expected,
                    found: instruction.operands.len(),
                });
            }
        }

        if let Opcode::GetTupleElement { index } = instruction.opcode {
            let in_range = instruction
                .operands
                .first()
                .and_then(|&op| self.instructions.try_get(op))
                .map(|op| match &op.shape {
                    Shape::Tuple(elements) => index < elements.len(),
                    _ => false,
                })
                .unwrap_or(false);
            if !in_range {
                return Err(HloError::TupleIndexOutOfRange {
                    instruction: instruction.name.clone(),
                    index,
                });
            }
        }

        if let Opcode::Constant { literal } = &instruction.opcode {
            let matches_shape = match &instruction.shape {
                Shape::Array {
                    element_type, dims, ..
                } => *element_type == literal.element_type && *dims == literal.dims,
                _ => false,
            };
            if !matches_shape || !literal.is_consistent() {
                return Err(HloError::InvalidConstant {
                    instruction: instruction.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Rewrites a name into a codegen-legal symbol by replacing `.` and `-`
/// with `_`.
pub fn sanitize_symbol_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect()
}
