//! The lowering error taxonomy.

use grebe_hlo::ShapeIndex;

/// Everything that can abort a lowering.
///
/// The first error at any nesting depth aborts the whole module conversion;
/// no handler downgrades an error from a nested call, and no partial function
/// is committed to the output module.
#[derive(Debug, thiserror::Error)]
pub enum LowerError {
    /// An allocation declared no storage to back.
    #[error("allocation {allocation} has zero size")]
    EmptyAllocation {
        /// Index of the offending allocation.
        allocation: usize,
    },

    /// Two allocations claimed the same entry parameter.
    #[error("two allocations claim entry parameter {number}")]
    DuplicateParameter {
        /// The parameter number claimed twice.
        number: usize,
    },

    /// A slice named an allocation the registry never saw.
    #[error("no storage registered for allocation {handle}")]
    UnknownAllocation {
        /// Debug form of the offending handle.
        handle: String,
    },

    /// The assignment has no slice for a buffer-backed leaf.
    #[error("no buffer slice for '{instruction}' at {path}")]
    MissingSlice { instruction: String, path: ShapeIndex },

    /// A token leaf was reached under [`TokenMode::FailToLower`].
    ///
    /// [`TokenMode::FailToLower`]: crate::TokenMode::FailToLower
    #[error("token at {path} of '{instruction}' under the fail-to-lower policy")]
    TokenNotLowerable { instruction: String, path: ShapeIndex },

    /// A bitcast whose result and operand live in different slices.
    #[error("bitcast '{instruction}' does not share its operand's slice")]
    BitcastSliceMismatch { instruction: String },

    /// The opcode has no lowering.
    #[error("no lowering for opcode '{opcode}' ('{instruction}')")]
    UnsupportedOpcode { opcode: String, instruction: String },

    /// The skip token mode is reserved but deliberately unimplemented.
    #[error("the skip token mode is reserved and not implemented")]
    SkipTokenMode,

    /// Select-and-scatter cannot express window or base dilation.
    #[error("select-and-scatter '{instruction}' uses window dilation")]
    WindowDilation { instruction: String },

    /// A computation used as a value region contains a non-arithmetic opcode.
    #[error("'{computation}' is no value region: '{instruction}' is a {opcode}")]
    NotArithmetic {
        computation: String,
        instruction: String,
        opcode: String,
    },

    /// A collective-done instruction without a previously emitted start.
    #[error("'{instruction}' completes a collective that was never started")]
    MissingCollectiveStart { instruction: String },

    /// A library-call configuration blob failed to decode.
    #[error("custom call '{target}' has an undecodable backend config")]
    BadBackendConfig {
        target: String,
        #[source]
        source: prost::DecodeError,
    },

    /// A convolution configuration named an unknown activation.
    #[error("custom call '{target}' has unknown activation code {code}")]
    BadActivation { target: String, code: i32 },

    /// A convolution custom call without window or dimension numbers.
    #[error("convolution '{instruction}' is missing its window or dimension numbers")]
    MissingConvAttributes { instruction: String },

    /// The output builder rejected a construction.
    #[error(transparent)]
    Builder(#[from] grebe_lir::BuilderError),

    /// The input module failed structural validation.
    #[error(transparent)]
    Invalid(#[from] grebe_hlo::HloError),
}
