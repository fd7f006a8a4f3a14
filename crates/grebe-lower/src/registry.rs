//! One-time binding of allocations to backing storage.

use std::collections::HashSet;

use grebe_buffer::{Allocation, AllocationKind, BufferAssignment};
use grebe_hlo::Handle;
use grebe_lir::{FuncBuilder, Value};

use crate::LowerError;

/// Maps every allocation of one assignment to its backing storage value.
///
/// Built once per lowered function, before any instruction is processed:
/// entry-parameter allocations bind to the function's arguments in parameter
/// order, constant allocations become module globals carrying their payload,
/// and temp allocations become fresh scratch globals. All storage is an
/// opaque byte buffer; element typing happens at view creation. After
/// initialization the registry is read-only.
#[derive(Debug)]
pub struct AllocationRegistry {
    /// Backing storage per allocation, indexed by allocation handle.
    storage: Vec<Option<Handle<Value>>>,
}

impl AllocationRegistry {
    /// Declares backing storage for every allocation of `assignment` inside
    /// the function under construction.
    pub fn initialize(
        assignment: &BufferAssignment,
        builder: &mut FuncBuilder<'_>,
    ) -> Result<Self, LowerError> {
        let allocations = assignment.allocations();
        let mut storage: Vec<Option<Handle<Value>>> = vec![None; allocations.len()];

        // Entry parameters first, ordered by parameter number, so argument
        // positions match the entry signature.
        let mut parameters: Vec<(usize, Handle<Allocation>)> = allocations
            .iter()
            .filter_map(|(handle, allocation)| match allocation.kind {
                AllocationKind::EntryParameter { number } => Some((number, handle)),
                _ => None,
            })
            .collect();
        parameters.sort_by_key(|&(number, _)| number);

        let mut seen = HashSet::new();
        for (number, handle) in parameters {
            if !seen.insert(number) {
                return Err(LowerError::DuplicateParameter { number });
            }
            let allocation = &allocations[handle];
            check_size(handle, allocation)?;
            let name = format!("p{number}");
            storage[handle.index()] = Some(builder.declare_argument(&name, allocation.size));
        }

        // Then the rest, in allocation order.
        for (handle, allocation) in allocations.iter() {
            if storage[handle.index()].is_some() {
                continue;
            }
            check_size(handle, allocation)?;
            let global = match &allocation.kind {
                AllocationKind::Constant { symbol, data } => {
                    builder.module().declare_constant_global(symbol, data.clone())?
                }
                AllocationKind::Temp => {
                    let name = format!("buf{}", handle.index());
                    builder.module().declare_scratch_global(&name, allocation.size)?
                }
                // Covered by the parameter loop above.
                AllocationKind::EntryParameter { .. } => continue,
            };
            storage[handle.index()] = Some(builder.global_ref(global)?);
        }

        log::debug!(
            "allocation registry: {} allocations, {} entry parameters",
            allocations.len(),
            seen.len()
        );
        Ok(Self { storage })
    }

    /// The backing storage of an allocation. Lookups never insert.
    pub fn storage(&self, allocation: Handle<Allocation>) -> Result<Handle<Value>, LowerError> {
        self.storage
            .get(allocation.index())
            .copied()
            .flatten()
            .ok_or_else(|| LowerError::UnknownAllocation {
                handle: format!("{allocation:?}"),
            })
    }
}

fn check_size(handle: Handle<Allocation>, allocation: &Allocation) -> Result<(), LowerError> {
    if allocation.size == 0 {
        return Err(LowerError::EmptyAllocation {
            allocation: handle.index(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grebe_buffer::BufferAssignmentBuilder;
    use grebe_lir::{GlobalKind, ModuleBuilder};

    fn registry_for(
        assignment: &BufferAssignment,
    ) -> Result<(grebe_lir::Module, usize), LowerError> {
        let mut mb = ModuleBuilder::new("m");
        let mut fb = FuncBuilder::new(&mut mb, "main");
        let registry = AllocationRegistry::initialize(assignment, &mut fb)?;
        let bound = (0..assignment.allocations().len())
            .filter(|&i| registry.storage.get(i).copied().flatten().is_some())
            .count();
        fb.finish();
        Ok((mb.finish(), bound))
    }

    #[test]
    fn binds_parameters_constants_and_scratch() {
        let mut builder = BufferAssignmentBuilder::new();
        builder.add_allocation(Allocation {
            size: 16,
            kind: AllocationKind::Temp,
        });
        builder.add_allocation(Allocation {
            size: 64,
            kind: AllocationKind::EntryParameter { number: 0 },
        });
        builder.add_allocation(Allocation {
            size: 4,
            kind: AllocationKind::Constant {
                symbol: "c_0".into(),
                data: vec![0, 0, 128, 63],
            },
        });
        let assignment = builder.finish().unwrap();

        let (module, bound) = registry_for(&assignment).unwrap();
        assert_eq!(bound, 3);
        assert_eq!(module.functions.iter().next().unwrap().1.args.len(), 1);
        assert_eq!(module.globals.len(), 2);
        let kinds: Vec<_> = module.globals.iter().map(|(_, g)| g.kind.clone()).collect();
        assert!(matches!(kinds[0], GlobalKind::Scratch));
        assert!(matches!(kinds[1], GlobalKind::Constant { .. }));
    }

    #[test]
    fn zero_size_allocation_rejected() {
        let mut builder = BufferAssignmentBuilder::new();
        builder.add_allocation(Allocation {
            size: 0,
            kind: AllocationKind::Temp,
        });
        let assignment = builder.finish().unwrap();
        assert!(matches!(
            registry_for(&assignment),
            Err(LowerError::EmptyAllocation { allocation: 0 })
        ));
    }

    #[test]
    fn duplicate_parameter_number_rejected() {
        let mut builder = BufferAssignmentBuilder::new();
        for _ in 0..2 {
            builder.add_allocation(Allocation {
                size: 8,
                kind: AllocationKind::EntryParameter { number: 0 },
            });
        }
        let assignment = builder.finish().unwrap();
        assert!(matches!(
            registry_for(&assignment),
            Err(LowerError::DuplicateParameter { number: 0 })
        ));
    }
}
