//! Buffer assignment for scheduled modules.
//!
//! An assignment maps every buffer-backed `(instruction, leaf path)` key to a
//! [`Slice`] of an [`Allocation`]. The table is built up front, either by the
//! reference assigner in [`assign`] or by hand through
//! [`BufferAssignmentBuilder`], and is read-only afterwards; the lowering
//! never mutates it.

#![warn(missing_docs)]

pub mod assign;

pub use assign::assign_buffers;

use std::collections::HashMap;

use grebe_hlo::{Arena, Handle, Instruction, ShapeIndex};

/// What backs an [`Allocation`].
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationKind {
    /// Storage passed in by the caller of the entry computation.
    EntryParameter {
        /// Zero-based parameter number in the entry signature.
        number: usize,
    },
    /// Read-only storage initialized with a constant payload.
    Constant {
        /// Codegen-legal symbol the payload is published under.
        symbol: String,
        /// The payload bytes, exactly `size` of them.
        data: Vec<u8>,
    },
    /// Scratch storage owned by the lowered module itself.
    Temp,
}

/// A contiguous block of device memory.
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    /// Total size in bytes.
    pub size: u64,
    /// What the block is backed by.
    pub kind: AllocationKind,
}

impl Allocation {
    /// Returns `true` for entry-parameter allocations.
    pub fn is_entry_parameter(&self) -> bool {
        matches!(self.kind, AllocationKind::EntryParameter { .. })
    }

    /// Returns `true` for constant allocations.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, AllocationKind::Constant { .. })
    }
}

/// A byte range `[offset, offset + size)` of one allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slice {
    /// The allocation this slice carves.
    pub allocation: Handle<Allocation>,
    /// Start of the range, in bytes from the allocation base.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

/// A key of the assignment table: one buffer-backed leaf of one instruction.
pub type SliceKey = (Handle<Instruction>, ShapeIndex);

/// Errors raised while building an assignment.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    /// A slice referenced an allocation handle outside the table.
    #[error("slice references unknown allocation {handle}")]
    UnknownAllocation {
        /// Debug form of the offending handle.
        handle: String,
    },

    /// A slice ran past the end of its allocation.
    #[error("slice [{offset}, {end}) exceeds allocation {allocation} of {capacity} bytes")]
    SliceOutOfBounds {
        /// Index of the allocation being carved.
        allocation: usize,
        /// Slice start.
        offset: u64,
        /// Slice end, exclusive.
        end: u64,
        /// Allocation size.
        capacity: u64,
    },

    /// The same `(instruction, path)` key was assigned twice.
    #[error("duplicate slice for instruction {instruction} at {path}")]
    DuplicateSlice {
        /// Debug form of the instruction handle.
        instruction: String,
        /// Leaf path of the duplicate key.
        path: ShapeIndex,
    },

    /// A constant allocation's payload length disagreed with its size.
    #[error("constant allocation {allocation}: {data} payload bytes for size {size}")]
    ConstantSizeMismatch {
        /// Index of the constant allocation.
        allocation: usize,
        /// Payload length.
        data: usize,
        /// Declared allocation size.
        size: u64,
    },

    /// The module failed structural validation.
    #[error(transparent)]
    Invalid(#[from] grebe_hlo::HloError),
}

/// The finished, read-only assignment.
#[derive(Clone, Debug, Default)]
pub struct BufferAssignment {
    allocations: Arena<Allocation>,
    slices: HashMap<SliceKey, Slice>,
}

impl BufferAssignment {
    /// All allocations, in creation order.
    pub fn allocations(&self) -> &Arena<Allocation> {
        &self.allocations
    }

    /// The allocation behind a handle, if the handle is valid.
    pub fn allocation(&self, handle: Handle<Allocation>) -> Option<&Allocation> {
        self.allocations.try_get(handle)
    }

    /// The slice assigned to `(instruction, path)`, if any.
    pub fn slice_for(&self, instruction: Handle<Instruction>, path: &ShapeIndex) -> Option<Slice> {
        self.slices.get(&(instruction, path.clone())).copied()
    }

    /// The slice assigned to the instruction's root leaf, if any.
    pub fn top_level_slice(&self, instruction: Handle<Instruction>) -> Option<Slice> {
        self.slice_for(instruction, &ShapeIndex::root())
    }

    /// Number of assigned keys.
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }
}

/// Incrementally builds a [`BufferAssignment`], validating as it goes.
#[derive(Debug, Default)]
pub struct BufferAssignmentBuilder {
    allocations: Arena<Allocation>,
    slices: HashMap<SliceKey, Slice>,
}

impl BufferAssignmentBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allocation and returns its handle.
    pub fn add_allocation(&mut self, allocation: Allocation) -> Handle<Allocation> {
        self.allocations.append(allocation)
    }

    /// Assigns a slice to a key, checking the slice against its allocation.
    pub fn assign(
        &mut self,
        instruction: Handle<Instruction>,
        path: ShapeIndex,
        slice: Slice,
    ) -> Result<(), AssignError> {
        let Some(allocation) = self.allocations.try_get(slice.allocation) else {
            return Err(AssignError::UnknownAllocation {
                handle: format!("{:?}", slice.allocation),
            });
        };
        let end = slice.offset.saturating_add(slice.size);
        if end > allocation.size {
            return Err(AssignError::SliceOutOfBounds {
                allocation: slice.allocation.index(),
                offset: slice.offset,
                end,
                capacity: allocation.size,
            });
        }
        let key = (instruction, path);
        if self.slices.contains_key(&key) {
            return Err(AssignError::DuplicateSlice {
                instruction: format!("{instruction:?}"),
                path: key.1,
            });
        }
        self.slices.insert(key, slice);
        Ok(())
    }

    /// Finishes the table, checking constant payload sizes.
    pub fn finish(self) -> Result<BufferAssignment, AssignError> {
        for (handle, allocation) in self.allocations.iter() {
            if let AllocationKind::Constant { data, .. } = &allocation.kind {
                if data.len() as u64 != allocation.size {
                    return Err(AssignError::ConstantSizeMismatch {
                        allocation: handle.index(),
                        data: data.len(),
                        size: allocation.size,
                    });
                }
            }
        }
        Ok(BufferAssignment {
            allocations: self.allocations,
            slices: self.slices,
        })
    }
}
