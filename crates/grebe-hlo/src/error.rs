//! Structural validation errors.

/// An inconsistency found while validating a module.
#[derive(Debug, thiserror::Error)]
pub enum HloError {
    #[error("module has no entry computation")]
    MissingEntry,

    #[error("computation %{computation} has no instructions")]
    EmptyComputation { computation: String },

    #[error("computation %{computation}: root is not one of its instructions")]
    RootNotMember { computation: String },

    #[error("computation %{computation} references an instruction handle {handle} outside the module")]
    DanglingInstruction { computation: String, handle: String },

    #[error("instruction %{instruction} is listed by more than one computation")]
    SharedInstruction { instruction: String },

    #[error("duplicate instruction name %{name}")]
    DuplicateName { name: String },

    #[error("instruction %{instruction}: operand %{operand} is not scheduled before it")]
    OperandNotScheduled { instruction: String, operand: String },

    #[error("instruction %{instruction}: expected {expected} operands, found {found}")]
    OperandCount {
        instruction: String,
        expected: usize,
        found: usize,
    },

    #[error("instruction %{instruction}: tuple element {index} is out of range")]
    TupleIndexOutOfRange { instruction: String, index: usize },

    #[error("computation %{computation}: parameter numbers are not dense from zero")]
    ParameterNumbering { computation: String },

    #[error("instruction %{instruction} calls a computation handle {handle} outside the module")]
    DanglingComputation { instruction: String, handle: String },

    #[error("constant %{instruction}: literal payload does not match its shape")]
    InvalidConstant { instruction: String },
}
