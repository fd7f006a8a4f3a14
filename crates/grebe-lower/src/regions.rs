//! Nested computations as operation regions.
//!
//! Two region flavors exist. Math regions carry scalar SSA arithmetic with
//! explicit arguments and a return, and back reduction and comparison
//! computations. Buffer regions have no arguments; their operations read and
//! write the same views as the surrounding function, and control flow
//! re-enters the normal emitter for them. Fusion bodies are a third, mixed
//! form with loads at the boundary in and stores at the boundary out.

use std::collections::HashMap;

use grebe_hlo::{Computation, Handle, HloError, Instruction, Opcode, Shape};
use grebe_lir::{InsertPoint, OpKind, Region, Value};

use crate::emitter::Emitter;
use crate::LowerError;

/// Flattened leaf values per already-lowered instruction of a region body.
type ValueMap = HashMap<Handle<Instruction>, Vec<Handle<Value>>>;

impl Emitter<'_, '_> {
    /// Imports an arithmetic computation as a math region: one typed region
    /// argument per parameter, SSA operations for the body, and a return of
    /// the root's values.
    pub(crate) fn import_math_region(
        &mut self,
        computation: Handle<Computation>,
    ) -> Result<Handle<Region>, LowerError> {
        let hlo = self.hlo;
        let comp = &hlo.computations[computation];
        let region = self.fb.create_region(comp.name.clone());

        // Region arguments in parameter-number order. Math parameters are
        // typed arrays; anything else disqualifies the computation.
        let mut parameters = Vec::new();
        for &handle in &comp.instructions {
            let instr = &hlo.instructions[handle];
            if let Opcode::Parameter { number } = instr.opcode {
                match &instr.shape {
                    Shape::Array { element_type, .. } => {
                        parameters.push((number, handle, *element_type));
                    }
                    _ => {
                        return Err(LowerError::NotArithmetic {
                            computation: comp.name.clone(),
                            instruction: instr.name.clone(),
                            opcode: "non-array parameter".to_string(),
                        })
                    }
                }
            }
        }
        parameters.sort_by_key(|&(number, _, _)| number);

        let mut values = ValueMap::new();
        for (_, handle, element_type) in parameters {
            let arg = self.fb.add_region_arg(region, element_type)?;
            values.insert(handle, vec![arg]);
        }

        let saved = self.fb.insertion_point();
        self.fb.set_insertion_point(InsertPoint::Region(region));
        let result = self.math_body(computation, &mut values).and_then(|()| {
            let root = self.hlo.computations[computation].root;
            let returned = values
                .get(&root)
                .cloned()
                .ok_or_else(|| missing_operand(self.hlo, root, root))?;
            let label = self.hlo.instructions[root].name.clone();
            self.fb.push(OpKind::Return, returned, vec![], 0, &label)?;
            Ok(())
        });
        self.fb.set_insertion_point(saved);
        result?;
        Ok(region)
    }

    /// Lowers a computation's instructions as scalar SSA, without a
    /// trailing return or terminator.
    fn math_body(
        &mut self,
        computation: Handle<Computation>,
        values: &mut ValueMap,
    ) -> Result<(), LowerError> {
        let hlo = self.hlo;
        let comp = &hlo.computations[computation];
        for &handle in &comp.instructions {
            let instr = &hlo.instructions[handle];
            if values.contains_key(&handle) {
                // Parameters were seeded above.
                continue;
            }
            let lowered = match instr.opcode.clone() {
                Opcode::Constant { literal } => {
                    let (_, results) = self.fb.push(
                        OpKind::ConstantScalar { literal },
                        vec![],
                        vec![],
                        1,
                        &instr.name,
                    )?;
                    results
                }
                Opcode::Tuple => concat_operands(hlo, instr, values)?,
                Opcode::GetTupleElement { index } => {
                    tuple_element(hlo, instr, index, values)?
                }
                opcode => {
                    let kind = scalar_op_kind(&opcode).ok_or_else(|| {
                        LowerError::NotArithmetic {
                            computation: comp.name.clone(),
                            instruction: instr.name.clone(),
                            opcode: opcode.mnemonic().to_string(),
                        }
                    })?;
                    let operands = concat_operands(hlo, instr, values)?;
                    let (_, results) =
                        self.fb.push(kind, operands, vec![], 1, &instr.name)?;
                    results
                }
            };
            values.insert(handle, lowered);
        }
        Ok(())
    }

    /// Lowers a control-flow computation as a buffer region: the normal
    /// emitter runs over its instructions with the insertion point moved
    /// inside, followed by a terminator.
    pub(crate) fn lower_buffer_region(
        &mut self,
        computation: Handle<Computation>,
    ) -> Result<Handle<Region>, LowerError> {
        let name = self.hlo.computations[computation].name.clone();
        let region = self.fb.create_region(name.clone());
        let saved = self.fb.insertion_point();
        self.fb.set_insertion_point(InsertPoint::Region(region));
        let result = self
            .emit_computation(computation)
            .and_then(|()| {
                self.fb.push(OpKind::Terminator, vec![], vec![], 0, &name)?;
                Ok(())
            });
        self.fb.set_insertion_point(saved);
        result?;
        Ok(region)
    }

    /// Lowers a fusion instruction: its fused computation becomes one region
    /// whose parameters load from the outer operands' views and whose root
    /// leaves store to the fusion result's views.
    pub(crate) fn emit_fusion(
        &mut self,
        handle: Handle<Instruction>,
        fused: Handle<Computation>,
        label: &str,
    ) -> Result<(), LowerError> {
        let hlo = self.hlo;
        let comp_name = hlo.computations[fused].name.clone();
        let region = self.fb.create_region(comp_name);

        // Parameter loads read the views resolved in the enclosing scope,
        // but the load operations themselves live in the region.
        let operands = hlo.instructions[handle].operands.clone();
        let mut values = ValueMap::new();
        let saved = self.fb.insertion_point();
        self.fb.set_insertion_point(InsertPoint::Region(region));
        let result = self.fusion_body(handle, fused, &operands, &mut values);
        self.fb.set_insertion_point(saved);
        result?;

        self.fb
            .push(OpKind::Fusion, vec![], vec![region], 0, label)?;
        Ok(())
    }

    fn fusion_body(
        &mut self,
        handle: Handle<Instruction>,
        fused: Handle<Computation>,
        operands: &[Handle<Instruction>],
        values: &mut ValueMap,
    ) -> Result<(), LowerError> {
        let hlo = self.hlo;
        let comp = &hlo.computations[fused];

        for &inner in &comp.instructions {
            let instr = &hlo.instructions[inner];
            if let Opcode::Parameter { number } = instr.opcode {
                let outer = operands[number];
                values.insert(inner, self.load_leaves(outer, &instr.name)?);
            }
        }
        self.math_body(fused, values)?;

        // Root leaves persist through stores, then the region terminates.
        let root = comp.root;
        let root_values = values
            .get(&root)
            .cloned()
            .ok_or_else(|| missing_operand(hlo, root, root))?;
        let leaves = hlo.instructions[handle].shape.leaves();
        for ((path, shape), value) in leaves.into_iter().zip(root_values) {
            let Shape::Array {
                element_type,
                dims,
                layout,
            } = shape
            else {
                continue;
            };
            let view =
                self.leaf_view(handle, &path, *element_type, dims.clone(), layout.clone())?;
            self.fb.push(
                OpKind::Store,
                vec![value, view],
                vec![],
                0,
                &hlo.instructions[root].name,
            )?;
        }
        self.fb.push(
            OpKind::Terminator,
            vec![],
            vec![],
            0,
            &hlo.computations[fused].name,
        )?;
        Ok(())
    }

    /// One load per array leaf of `outer`, null per token leaf.
    fn load_leaves(
        &mut self,
        outer: Handle<Instruction>,
        label: &str,
    ) -> Result<Vec<Handle<Value>>, LowerError> {
        let hlo = self.hlo;
        let leaves = hlo.instructions[outer].shape.leaves();
        let mut out = Vec::with_capacity(leaves.len());
        for (path, shape) in leaves {
            match shape {
                Shape::Array {
                    element_type,
                    dims,
                    layout,
                } => {
                    let view = self.leaf_view(
                        outer,
                        &path,
                        *element_type,
                        dims.clone(),
                        layout.clone(),
                    )?;
                    let (_, results) =
                        self.fb.push(OpKind::Load, vec![view], vec![], 1, label)?;
                    out.push(results[0]);
                }
                Shape::Token => out.push(self.fb.null_value()),
                Shape::Tuple(_) => unreachable!("leaves are never tuples"),
            }
        }
        Ok(out)
    }
}

/// Maps an elementwise opcode to its scalar operation kind.
fn scalar_op_kind(opcode: &Opcode) -> Option<OpKind> {
    match opcode.clone() {
        Opcode::Unary(kind) => Some(OpKind::Unary(kind)),
        Opcode::Binary(kind) => Some(OpKind::Binary(kind)),
        Opcode::Compare { direction } => Some(OpKind::Compare { direction }),
        Opcode::Convert => Some(OpKind::Convert),
        Opcode::Copy => Some(OpKind::Copy),
        Opcode::Select => Some(OpKind::Select),
        _ => None,
    }
}

fn concat_operands(
    hlo: &grebe_hlo::HloModule,
    instr: &Instruction,
    values: &ValueMap,
) -> Result<Vec<Handle<Value>>, LowerError> {
    let mut out = Vec::new();
    for &operand in &instr.operands {
        let lowered = values
            .get(&operand)
            .ok_or_else(|| missing_operand_named(hlo, &instr.name, operand))?;
        out.extend(lowered.iter().copied());
    }
    Ok(out)
}

fn tuple_element(
    hlo: &grebe_hlo::HloModule,
    instr: &Instruction,
    index: usize,
    values: &ValueMap,
) -> Result<Vec<Handle<Value>>, LowerError> {
    let operand = instr.operands[0];
    let lowered = values
        .get(&operand)
        .ok_or_else(|| missing_operand_named(hlo, &instr.name, operand))?;
    let Shape::Tuple(elements) = &hlo.instructions[operand].shape else {
        return Err(HloError::TupleIndexOutOfRange {
            instruction: instr.name.clone(),
            index,
        }
        .into());
    };
    let start: usize = elements[..index].iter().map(Shape::leaf_count).sum();
    let len = elements[index].leaf_count();
    Ok(lowered[start..start + len].to_vec())
}

fn missing_operand(
    hlo: &grebe_hlo::HloModule,
    instruction: Handle<Instruction>,
    operand: Handle<Instruction>,
) -> LowerError {
    missing_operand_named(hlo, &hlo.instructions[instruction].name, operand)
}

fn missing_operand_named(
    hlo: &grebe_hlo::HloModule,
    instruction: &str,
    operand: Handle<Instruction>,
) -> LowerError {
    HloError::OperandNotScheduled {
        instruction: instruction.to_string(),
        operand: hlo.instructions[operand].name.clone(),
    }
    .into()
}
