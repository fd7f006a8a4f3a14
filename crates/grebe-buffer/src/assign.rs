//! Reference assigner: one allocation per must-alias class.
//!
//! This assigner only honors aliasing, it performs no liveness analysis and
//! never reuses storage between live ranges. Keys that must share bytes are
//! grouped with a union-find; every group then gets its own allocation, except
//! entry-parameter groups, which pack all leaves of one parameter into a
//! single allocation at aligned offsets.

use std::collections::{HashMap, HashSet};

use grebe_hlo::{
    sanitize_symbol_name, Computation, ComputationRole, Handle, HloModule, Instruction, Opcode,
    ShapeIndex,
};

use crate::{
    Allocation, AllocationKind, AssignError, BufferAssignment, BufferAssignmentBuilder, Slice,
};

/// Leaves packed into a parameter allocation start at multiples of this.
const BUFFER_ALIGN_BYTES: u64 = 64;

/// Builds an assignment for a validated module.
///
/// Covers the entry computation and, transitively, every computation reached
/// through control-flow opcodes. Arithmetic bodies (comparators, reducers,
/// fused computations) own no buffers and are skipped.
pub fn assign_buffers(module: &HloModule) -> Result<BufferAssignment, AssignError> {
    module.validate()?;

    let comps = buffer_computations(module);

    // Every non-token leaf of every instruction is a key.
    let mut keys: Vec<(Handle<Instruction>, ShapeIndex, u64)> = Vec::new();
    let mut key_index: HashMap<(Handle<Instruction>, ShapeIndex), usize> = HashMap::new();
    for &comp in &comps {
        for &instr in &module.computations[comp].instructions {
            for (path, leaf) in module.instructions[instr].shape.leaves() {
                if leaf.is_token() {
                    continue;
                }
                key_index.insert((instr, path.clone()), keys.len());
                keys.push((instr, path, leaf.byte_size()));
            }
        }
    }

    let mut uf = UnionFind::new(keys.len());
    for &comp in &comps {
        record_aliasing(module, comp, &key_index, &mut uf);
    }

    // Group keys into classes, numbered in first-appearance order.
    let mut class_of_key = Vec::with_capacity(keys.len());
    let mut class_members: Vec<Vec<usize>> = Vec::new();
    let mut class_by_root: HashMap<usize, usize> = HashMap::new();
    for i in 0..keys.len() {
        let root = uf.find(i);
        let id = *class_by_root.entry(root).or_insert_with(|| {
            class_members.push(Vec::new());
            class_members.len() - 1
        });
        class_members[id].push(i);
        class_of_key.push(id);
    }

    let entry_params = entry_parameters(module);
    let param_numbers: HashMap<Handle<Instruction>, usize> =
        entry_params.iter().map(|&(n, h)| (h, n)).collect();

    let mut builder = BufferAssignmentBuilder::new();

    // One allocation per entry parameter, leaves at aligned offsets.
    let mut param_allocs: HashMap<usize, Handle<Allocation>> = HashMap::new();
    let mut param_offsets: HashMap<(usize, ShapeIndex), u64> = HashMap::new();
    for &(number, pinstr) in &entry_params {
        let mut offset = 0u64;
        let mut any = false;
        for (path, leaf) in module.instructions[pinstr].shape.leaves() {
            if leaf.is_token() {
                continue;
            }
            offset = align_up(offset, BUFFER_ALIGN_BYTES);
            param_offsets.insert((number, path), offset);
            offset += leaf.byte_size();
            any = true;
        }
        if any {
            let handle = builder.add_allocation(Allocation {
                size: offset.max(1),
                kind: AllocationKind::EntryParameter { number },
            });
            param_allocs.insert(number, handle);
        }
    }

    // Remaining classes become constants or scratch space.
    let mut used_symbols: HashSet<String> = HashSet::new();
    let mut class_slice: Vec<Option<(Handle<Allocation>, u64)>> = vec![None; class_members.len()];
    for (id, members) in class_members.iter().enumerate() {
        let param_member = members.iter().find_map(|&k| {
            let (instr, ref path, _) = keys[k];
            param_numbers.get(&instr).map(|&n| (n, path.clone()))
        });
        if let Some((number, path)) = param_member {
            if let (Some(&alloc), Some(&offset)) = (
                param_allocs.get(&number),
                param_offsets.get(&(number, path)),
            ) {
                class_slice[id] = Some((alloc, offset));
            }
            continue;
        }

        let constant_member = members.iter().find_map(|&k| {
            let instr = keys[k].0;
            match &module.instructions[instr].opcode {
                Opcode::Constant { literal } => Some((instr, literal.clone())),
                _ => None,
            }
        });
        if let Some((instr, literal)) = constant_member {
            let symbol = unique_symbol(
                &sanitize_symbol_name(&module.instructions[instr].name),
                &mut used_symbols,
            );
            let mut data = literal.data;
            if data.is_empty() {
                data.push(0);
            }
            let size = data.len() as u64;
            let handle = builder.add_allocation(Allocation {
                size,
                kind: AllocationKind::Constant { symbol, data },
            });
            class_slice[id] = Some((handle, 0));
            continue;
        }

        let size = members.iter().map(|&k| keys[k].2).max().unwrap_or(0);
        let handle = builder.add_allocation(Allocation {
            size: size.max(1),
            kind: AllocationKind::Temp,
        });
        class_slice[id] = Some((handle, 0));
    }

    for (i, (instr, path, size)) in keys.iter().enumerate() {
        if let Some((allocation, offset)) = class_slice[class_of_key[i]] {
            builder.assign(
                *instr,
                path.clone(),
                Slice {
                    allocation,
                    offset,
                    size: *size,
                },
            )?;
        }
    }

    builder.finish()
}

/// The entry computation plus every body reached through control flow.
fn buffer_computations(module: &HloModule) -> Vec<Handle<Computation>> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let Some(entry) = module.entry else {
        return order;
    };
    let mut worklist = vec![entry];
    while let Some(comp) = worklist.pop() {
        if !seen.insert(comp) {
            continue;
        }
        order.push(comp);
        let mut callees = Vec::new();
        for &instr in &module.computations[comp].instructions {
            for (role, callee) in module.instructions[instr].opcode.called_computations() {
                if role == ComputationRole::ControlFlow {
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

fn entry_parameters(module: &HloModule) -> Vec<(usize, Handle<Instruction>)> {
    let Some(entry) = module.entry else {
        return Vec::new();
    };
    let mut params: Vec<(usize, Handle<Instruction>)> = module.computations[entry]
        .instructions
        .iter()
        .filter_map(|&h| match module.instructions[h].opcode {
            Opcode::Parameter { number } => Some((number, h)),
            _ => None,
        })
        .collect();
    params.sort_by_key(|&(n, _)| n);
    params
}

fn record_aliasing(
    module: &HloModule,
    comp: Handle<Computation>,
    key_index: &HashMap<(Handle<Instruction>, ShapeIndex), usize>,
    uf: &mut UnionFind,
) {
    let union = |uf: &mut UnionFind,
                 a: (Handle<Instruction>, ShapeIndex),
                 b: (Handle<Instruction>, ShapeIndex)| {
        if let (Some(&i), Some(&j)) = (key_index.get(&a), key_index.get(&b)) {
            uf.union(i, j);
        }
    };

    for &ih in &module.computations[comp].instructions {
        let instr = &module.instructions[ih];
        match &instr.opcode {
            Opcode::Tuple => {
                for (element, &op) in instr.operands.iter().enumerate() {
                    for (path, leaf) in module.instructions[op].shape.leaves() {
                        if leaf.is_token() {
                            continue;
                        }
                        let mut outer = vec![element];
                        outer.extend_from_slice(&path.0);
                        union(uf, (ih, ShapeIndex(outer)), (op, path));
                    }
                }
            }
            Opcode::GetTupleElement { index } => {
                let op = instr.operands[0];
                for (path, leaf) in instr.shape.leaves() {
                    if leaf.is_token() {
                        continue;
                    }
                    let mut inner = vec![*index];
                    inner.extend_from_slice(&path.0);
                    union(uf, (ih, path), (op, ShapeIndex(inner)));
                }
            }
            Opcode::Bitcast | Opcode::AllReduceDone | Opcode::AddDependency => {
                let op = instr.operands[0];
                for (path, leaf) in instr.shape.leaves() {
                    if leaf.is_token() {
                        continue;
                    }
                    union(uf, (ih, path.clone()), (op, path));
                }
            }
            Opcode::While {
                condition, body, ..
            } => {
                let init = instr.operands[0];
                let body_param = module.parameter_of(*body, 0);
                let cond_param = module.parameter_of(*condition, 0);
                let body_root = module.computations[*body].root;
                for (path, leaf) in instr.shape.leaves() {
                    if leaf.is_token() {
                        continue;
                    }
                    union(uf, (ih, path.clone()), (init, path.clone()));
                    union(uf, (ih, path.clone()), (body_root, path.clone()));
                    if let Some(bp) = body_param {
                        union(uf, (ih, path.clone()), (bp, path.clone()));
                    }
                    if let Some(cp) = cond_param {
                        union(uf, (ih, path.clone()), (cp, path));
                    }
                }
            }
            Opcode::Case { branches } => {
                for (j, &branch) in branches.iter().enumerate() {
                    if let (Some(bp), Some(&arg)) =
                        (module.parameter_of(branch, 0), instr.operands.get(j + 1))
                    {
                        for (path, leaf) in module.instructions[arg].shape.leaves() {
                            if leaf.is_token() {
                                continue;
                            }
                            union(uf, (bp, path.clone()), (arg, path));
                        }
                    }
                    let branch_root = module.computations[branch].root;
                    for (path, leaf) in instr.shape.leaves() {
                        if leaf.is_token() {
                            continue;
                        }
                        union(uf, (ih, path.clone()), (branch_root, path));
                    }
                }
            }
            _ => {}
        }
    }
}

fn unique_symbol(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower root wins so class order follows key order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grebe_hlo::{BinaryKind, ComparisonDirection, ElementType, Literal, Shape};

    fn f32v(n: i64) -> Shape {
        Shape::array(ElementType::F32, vec![n])
    }

    #[test]
    fn elementwise_gets_params_and_temp() {
        let mut module = HloModule::new("m");
        let p0 = module.add_instruction(Instruction::new(
            "p0",
            Opcode::Parameter { number: 0 },
            f32v(4),
            vec![],
        ));
        let p1 = module.add_instruction(Instruction::new(
            "p1",
            Opcode::Parameter { number: 1 },
            f32v(4),
            vec![],
        ));
        let add = module.add_instruction(Instruction::new(
            "add",
            Opcode::Binary(BinaryKind::Add),
            f32v(4),
            vec![p0, p1],
        ));
        let entry = module.add_computation(Computation::new("main", vec![p0, p1, add], add));
        module.set_entry(entry);

        let assignment = assign_buffers(&module).unwrap();
        assert_eq!(assignment.allocations().len(), 3);

        let s0 = assignment.top_level_slice(p0).unwrap();
        let s1 = assignment.top_level_slice(p1).unwrap();
        let sa = assignment.top_level_slice(add).unwrap();
        assert_ne!(s0.allocation, s1.allocation);
        assert_ne!(s0.allocation, sa.allocation);
        assert!(assignment.allocation(s0.allocation).unwrap().is_entry_parameter());
        assert_eq!(
            assignment.allocation(sa.allocation).unwrap().kind,
            AllocationKind::Temp
        );
        assert_eq!(sa.offset, 0);
        assert_eq!(sa.size, 16);
    }

    #[test]
    fn tuple_forwarding_shares_storage() {
        let mut module = HloModule::new("m");
        let p0 = module.add_instruction(Instruction::new(
            "p0",
            Opcode::Parameter { number: 0 },
            f32v(2),
            vec![],
        ));
        let p1 = module.add_instruction(Instruction::new(
            "p1",
            Opcode::Parameter { number: 1 },
            f32v(2),
            vec![],
        ));
        let t = module.add_instruction(Instruction::new(
            "t",
            Opcode::Tuple,
            Shape::Tuple(vec![f32v(2), f32v(2)]),
            vec![p0, p1],
        ));
        let gte = module.add_instruction(Instruction::new(
            "gte",
            Opcode::GetTupleElement { index: 1 },
            f32v(2),
            vec![t],
        ));
        let entry = module.add_computation(Computation::new("main", vec![p0, p1, t, gte], gte));
        module.set_entry(entry);

        let assignment = assign_buffers(&module).unwrap();
        // Everything aliases the two parameters.
        assert_eq!(assignment.allocations().len(), 2);
        assert_eq!(
            assignment.slice_for(t, &ShapeIndex::from_steps(&[1])),
            assignment.top_level_slice(p1)
        );
        assert_eq!(assignment.top_level_slice(gte), assignment.top_level_slice(p1));
    }

    #[test]
    fn tuple_parameter_leaves_packed_aligned() {
        let mut module = HloModule::new("m");
        let p0 = module.add_instruction(Instruction::new(
            "p0",
            Opcode::Parameter { number: 0 },
            Shape::Tuple(vec![f32v(4), f32v(8)]),
            vec![],
        ));
        let gte = module.add_instruction(Instruction::new(
            "gte",
            Opcode::GetTupleElement { index: 1 },
            f32v(8),
            vec![p0],
        ));
        let entry = module.add_computation(Computation::new("main", vec![p0, gte], gte));
        module.set_entry(entry);

        let assignment = assign_buffers(&module).unwrap();
        assert_eq!(assignment.allocations().len(), 1);
        let leaf0 = assignment.slice_for(p0, &ShapeIndex::from_steps(&[0])).unwrap();
        let leaf1 = assignment.slice_for(p0, &ShapeIndex::from_steps(&[1])).unwrap();
        assert_eq!(leaf0.allocation, leaf1.allocation);
        assert_eq!(leaf0.offset, 0);
        assert_eq!(leaf1.offset, 64);
        assert_eq!(leaf1.size, 32);
        let alloc = assignment.allocation(leaf0.allocation).unwrap();
        assert_eq!(alloc.size, 96);
    }

    #[test]
    fn while_state_is_aliased() {
        let mut module = HloModule::new("m");
        let state = Shape::scalar(ElementType::F32);
        let pred = Shape::scalar(ElementType::Pred);

        let cp = module.add_instruction(Instruction::new(
            "cp",
            Opcode::Parameter { number: 0 },
            state.clone(),
            vec![],
        ));
        let ck = module.add_instruction(Instruction::new(
            "ck",
            Opcode::Constant {
                literal: Literal::scalar_f32(10.0),
            },
            state.clone(),
            vec![],
        ));
        let cc = module.add_instruction(Instruction::new(
            "cc",
            Opcode::Compare {
                direction: ComparisonDirection::Lt,
            },
            pred,
            vec![cp, ck],
        ));
        let cond = module.add_computation(Computation::new("cond", vec![cp, ck, cc], cc));

        let bp = module.add_instruction(Instruction::new(
            "bp",
            Opcode::Parameter { number: 0 },
            state.clone(),
            vec![],
        ));
        let bd = module.add_instruction(Instruction::new(
            "bd",
            Opcode::Binary(BinaryKind::Add),
            state.clone(),
            vec![bp, bp],
        ));
        let body = module.add_computation(Computation::new("body", vec![bp, bd], bd));

        let p0 = module.add_instruction(Instruction::new(
            "p0",
            Opcode::Parameter { number: 0 },
            state.clone(),
            vec![],
        ));
        let w = module.add_instruction(Instruction::new(
            "w",
            Opcode::While {
                condition: cond,
                body,
                trip_count: None,
            },
            state,
            vec![p0],
        ));
        let entry = module.add_computation(Computation::new("main", vec![p0, w], w));
        module.set_entry(entry);

        let assignment = assign_buffers(&module).unwrap();
        let ws = assignment.top_level_slice(w).unwrap();
        assert_eq!(assignment.top_level_slice(p0), Some(ws));
        assert_eq!(assignment.top_level_slice(bp), Some(ws));
        assert_eq!(assignment.top_level_slice(bd), Some(ws));
        assert_eq!(assignment.top_level_slice(cp), Some(ws));
        // The predicate of the condition gets its own scratch buffer.
        let cs = assignment.top_level_slice(cc).unwrap();
        assert_ne!(cs.allocation, ws.allocation);
    }

    #[test]
    fn constants_carry_symbol_and_payload() {
        let mut module = HloModule::new("m");
        let c = module.add_instruction(Instruction::new(
            "equal-to.4",
            Opcode::Constant {
                literal: Literal::from_f32(&[1.5, 2.5], vec![2]),
            },
            f32v(2),
            vec![],
        ));
        let neg = module.add_instruction(Instruction::new(
            "neg",
            Opcode::Unary(grebe_hlo::UnaryKind::Negate),
            f32v(2),
            vec![c],
        ));
        let entry = module.add_computation(Computation::new("main", vec![c, neg], neg));
        module.set_entry(entry);

        let assignment = assign_buffers(&module).unwrap();
        let cs = assignment.top_level_slice(c).unwrap();
        let alloc = assignment.allocation(cs.allocation).unwrap();
        match &alloc.kind {
            AllocationKind::Constant { symbol, data } => {
                assert_eq!(symbol, "equal_to_4");
                assert_eq!(data.len(), 8);
                assert_eq!(&data[..4], &1.5f32.to_le_bytes());
            }
            other => panic!("expected constant allocation, got {other:?}"),
        }
        assert_eq!(cs.offset, 0);
    }
}
