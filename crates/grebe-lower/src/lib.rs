//! Lowering of scheduled modules onto their buffer assignments.
//!
//! The input is a validated module plus a [`BufferAssignment`] covering every
//! buffer-backed value in it; the output is a buffer-level module in which
//! every operation reads and writes views of named storage. The entry
//! computation becomes the single output function, nested computations become
//! regions of the operations that call them, and instructions that only
//! rename storage emit nothing at all.
//!
//! [`lower_module`] is the core conversion; [`optimize_and_lower`] and
//! [`hlo_text_to_lir`] wrap it together with parsing, a platform's pass
//! pipeline, and its buffer assigner.

mod emitter;
mod error;
mod platform;
mod proto;
mod registry;
mod regions;
mod translate;

use grebe_buffer::BufferAssignment;
use grebe_hlo::{sanitize_symbol_name, HloError, HloModule};
use grebe_lir::{Module, ModuleBuilder};

pub use emitter::{
    CollectedOperands, Emitter, TokenMode, BATCH_NORM_GRAD_CALL_TARGET,
    BATCH_NORM_INFERENCE_CALL_TARGET, BATCH_NORM_TRAINING_CALL_TARGET,
    CHOLESKY_CALL_TARGET, CONV_BACKWARD_FILTER_CALL_TARGET, CONV_BACKWARD_INPUT_CALL_TARGET,
    CONV_FORWARD_CALL_TARGET, CONV_FORWARD_FUSED_CALL_TARGET, GEMM_CALL_TARGET,
};
pub use error::LowerError;
pub use platform::{GenericPlatform, Platform, PlatformRegistry};
pub use proto::{
    BatchNormConfig, CholeskyConfig, ConvConfig, DotDimensionNumbersProto, GemmConfig,
};
pub use registry::AllocationRegistry;
pub use translate::{hlo_text_to_lir, optimize_and_lower, TranslateError};

/// Lowers a module's entry computation against an existing assignment.
///
/// The module is validated first. On any error the output contains no
/// partial function; the conversion either commits the whole entry function
/// or nothing.
pub fn lower_module(
    hlo: &HloModule,
    assignment: &BufferAssignment,
) -> Result<Module, LowerError> {
    hlo.validate()?;
    let entry = hlo.entry.ok_or(HloError::MissingEntry)?;
    let name = sanitize_symbol_name(&hlo.computations[entry].name);

    let mut builder = ModuleBuilder::new(hlo.name.clone());
    let mut emitter = Emitter::new(assignment, hlo, &mut builder, &name)?;
    emitter.emit_computation(entry)?;
    let (values, ops) = (emitter.value_count(), emitter.op_count());
    emitter.finish();
    log::info!("lowered module '{}': entry '@{name}', {values} values, {ops} operations", hlo.name);
    Ok(builder.finish())
}
