//! The instruction emitter: views, operand collection, and opcode dispatch.

use std::collections::HashMap;

use grebe_buffer::BufferAssignment;
use grebe_hlo::{
    Handle, HloModule, Instruction, Opcode, Shape, ShapeIndex,
};
use grebe_lir::{BatchNormKind, ConvKind, FuncBuilder, Function, ModuleBuilder, OpKind, Value};

use crate::proto::{decode_config, BatchNormConfig, CholeskyConfig, ConvConfig, GemmConfig};
use crate::registry::AllocationRegistry;
use crate::LowerError;

/// Custom-call target lowered to a Cholesky factorization.
pub const CHOLESKY_CALL_TARGET: &str = "__solver$cholesky";
/// Custom-call target lowered to a GEMM library call.
pub const GEMM_CALL_TARGET: &str = "__blas$gemm";
/// Custom-call target of a forward convolution.
pub const CONV_FORWARD_CALL_TARGET: &str = "__dnn$conv_forward";
/// Custom-call target of a backward-input convolution.
pub const CONV_BACKWARD_INPUT_CALL_TARGET: &str = "__dnn$conv_backward_input";
/// Custom-call target of a backward-filter convolution.
pub const CONV_BACKWARD_FILTER_CALL_TARGET: &str = "__dnn$conv_backward_filter";
/// Custom-call target of a fused forward convolution.
pub const CONV_FORWARD_FUSED_CALL_TARGET: &str = "__dnn$conv_forward_fused";
/// Custom-call target of batch-norm inference.
pub const BATCH_NORM_INFERENCE_CALL_TARGET: &str = "__dnn$batch_norm_inference";
/// Custom-call target of batch-norm training.
pub const BATCH_NORM_TRAINING_CALL_TARGET: &str = "__dnn$batch_norm_training";
/// Custom-call target of the batch-norm gradient.
pub const BATCH_NORM_GRAD_CALL_TARGET: &str = "__dnn$batch_norm_grad";

/// How token-typed values are treated during operand collection.
///
/// Tokens carry ordering only and own no storage, so there is nothing to
/// view; each call site states what it can tolerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenMode {
    /// Fail the lowering when a token is reached.
    FailToLower,
    /// Stand in a null placeholder at the token's position.
    UseNull,
    /// Reserved: drop token positions. Deliberately unimplemented, since
    /// dropping would desynchronize the argument/result split; requesting it
    /// fails fast.
    Skip,
}

/// The flattened value list produced by [`Emitter::collect_operands`].
#[derive(Debug)]
pub struct CollectedOperands {
    /// Operand values first, then result values.
    pub values: Vec<Handle<Value>>,
    /// How many leading `values` are operands.
    pub num_args: usize,
    /// How many trailing `values` are results.
    pub num_results: usize,
}

/// Lowers the instructions of one computation into one output function.
///
/// One emitter owns one function under construction together with its
/// allocation registry, view cache, and collective side table; nested
/// control-flow regions re-enter the same emitter with a moved insertion
/// point. Dropping the emitter on an error path leaves the output module
/// without the partial function.
pub struct Emitter<'a, 'm> {
    pub(crate) hlo: &'a HloModule,
    pub(crate) assignment: &'a BufferAssignment,
    pub(crate) fb: FuncBuilder<'m>,
    pub(crate) registry: AllocationRegistry,
    /// One view per resolved `(instruction, leaf path)`, for the lifetime of
    /// this emitter.
    pub(crate) views: HashMap<(Handle<Instruction>, ShapeIndex), Handle<Value>>,
    /// Token results of emitted collective-start operations, keyed by the
    /// start instruction and consumed by the matching done.
    pub(crate) started_collectives: HashMap<Handle<Instruction>, Handle<Value>>,
}

impl<'a, 'm> Emitter<'a, 'm> {
    /// Opens a function named `name` and initializes its allocation
    /// registry. Must succeed before any instruction is emitted.
    pub fn new(
        assignment: &'a BufferAssignment,
        hlo: &'a HloModule,
        builder: &'m mut ModuleBuilder,
        name: &str,
    ) -> Result<Self, LowerError> {
        let mut fb = FuncBuilder::new(builder, name);
        let registry = AllocationRegistry::initialize(assignment, &mut fb)?;
        Ok(Self {
            hlo,
            assignment,
            fb,
            registry,
            views: HashMap::new(),
            started_collectives: HashMap::new(),
        })
    }

    /// Emits every instruction of `computation` in stored order.
    pub fn emit_computation(
        &mut self,
        computation: Handle<grebe_hlo::Computation>,
    ) -> Result<(), LowerError> {
        let instructions = self.hlo.computations[computation].instructions.clone();
        for instruction in instructions {
            self.emit(instruction)?;
        }
        Ok(())
    }

    /// Commits the finished function to the module.
    pub fn finish(self) -> Handle<Function> {
        self.fb.finish()
    }

    /// Number of values created so far, including cached views.
    pub fn value_count(&self) -> usize {
        self.fb.value_count()
    }

    /// Number of operations created so far.
    pub fn op_count(&self) -> usize {
        self.fb.op_count()
    }

    /// The value behind a handle created by this emitter.
    pub fn value(&self, handle: Handle<Value>) -> &Value {
        self.fb.value(handle)
    }

    /// Resolves the instruction's result at `path` to a value: a cached or
    /// fresh view for array leaves, a tuple of recursively resolved elements
    /// for tuple sub-shapes, and the token policy for tokens.
    pub fn get_or_create_view(
        &mut self,
        instruction: Handle<Instruction>,
        path: &ShapeIndex,
        mode: TokenMode,
    ) -> Result<Handle<Value>, LowerError> {
        let shape = self.sub_shape(instruction, path)?;
        match shape {
            Shape::Tuple(elements) => {
                let mut packed = Vec::with_capacity(elements.len());
                for element in 0..elements.len() {
                    packed.push(self.get_or_create_view(instruction, &path.child(element), mode)?);
                }
                Ok(self.fb.create_tuple(packed)?)
            }
            Shape::Token => self.token_value(instruction, path, mode),
            Shape::Array {
                element_type,
                dims,
                layout,
            } => self.leaf_view(instruction, path, *element_type, dims.clone(), layout.clone()),
        }
    }

    /// Expands the instruction's operands (optionally only the first
    /// `limit`) plus, when `include_result`, its own result, into a flat
    /// leaf-value list, reporting the operand/result split.
    pub fn collect_operands(
        &mut self,
        instruction: Handle<Instruction>,
        limit: Option<usize>,
        include_result: bool,
        mode: TokenMode,
    ) -> Result<CollectedOperands, LowerError> {
        let operands = self.hlo.instructions[instruction].operands.clone();
        let take = limit.unwrap_or(operands.len());

        let mut values = Vec::new();
        for &operand in operands.iter().take(take) {
            self.collect_views(operand, &ShapeIndex::root(), mode, &mut values)?;
        }
        let num_args = values.len();
        if include_result {
            self.collect_views(instruction, &ShapeIndex::root(), mode, &mut values)?;
        }
        let num_results = values.len() - num_args;
        Ok(CollectedOperands {
            values,
            num_args,
            num_results,
        })
    }

    /// Appends one value per leaf of the instruction's sub-shape at `path`.
    pub(crate) fn collect_views(
        &mut self,
        instruction: Handle<Instruction>,
        path: &ShapeIndex,
        mode: TokenMode,
        out: &mut Vec<Handle<Value>>,
    ) -> Result<(), LowerError> {
        let shape = self.sub_shape(instruction, path)?;
        match shape {
            Shape::Tuple(elements) => {
                for element in 0..elements.len() {
                    self.collect_views(instruction, &path.child(element), mode, out)?;
                }
                Ok(())
            }
            Shape::Token => {
                let value = self.token_value(instruction, path, mode)?;
                out.push(value);
                Ok(())
            }
            Shape::Array {
                element_type,
                dims,
                layout,
            } => {
                let view =
                    self.leaf_view(instruction, path, *element_type, dims.clone(), layout.clone())?;
                out.push(view);
                Ok(())
            }
        }
    }

    /// The cached view of one array leaf, created on first reference.
    pub(crate) fn leaf_view(
        &mut self,
        instruction: Handle<Instruction>,
        path: &ShapeIndex,
        element_type: grebe_hlo::ElementType,
        dims: Vec<i64>,
        layout: grebe_hlo::Layout,
    ) -> Result<Handle<Value>, LowerError> {
        let key = (instruction, path.clone());
        if let Some(&view) = self.views.get(&key) {
            return Ok(view);
        }
        let slice = self
            .assignment
            .slice_for(instruction, path)
            .ok_or_else(|| LowerError::MissingSlice {
                instruction: self.hlo.instructions[instruction].name.clone(),
                path: path.clone(),
            })?;
        let storage = self.registry.storage(slice.allocation)?;
        let view = self
            .fb
            .create_view(storage, slice.offset, element_type, dims, layout)?;
        self.views.insert(key, view);
        Ok(view)
    }

    fn token_value(
        &mut self,
        instruction: Handle<Instruction>,
        path: &ShapeIndex,
        mode: TokenMode,
    ) -> Result<Handle<Value>, LowerError> {
        match mode {
            TokenMode::FailToLower => Err(LowerError::TokenNotLowerable {
                instruction: self.hlo.instructions[instruction].name.clone(),
                path: path.clone(),
            }),
            TokenMode::UseNull => Ok(self.fb.null_value()),
            TokenMode::Skip => Err(LowerError::SkipTokenMode),
        }
    }

    fn sub_shape(
        &self,
        instruction: Handle<Instruction>,
        path: &ShapeIndex,
    ) -> Result<&'a Shape, LowerError> {
        let hlo = self.hlo;
        let instr = &hlo.instructions[instruction];
        instr
            .shape
            .sub_shape(path)
            .ok_or_else(|| LowerError::MissingSlice {
                instruction: instr.name.clone(),
                path: path.clone(),
            })
    }

    /// Lowers one instruction, dispatching on its opcode.
    ///
    /// Pass-through opcodes and parameters emit nothing; every other
    /// supported opcode emits exactly one operation.
    pub fn emit(&mut self, handle: Handle<Instruction>) -> Result<(), LowerError> {
        let hlo = self.hlo;
        let instr = &hlo.instructions[handle];
        let label = instr.name.clone();
        match instr.opcode.clone() {
            // Parameters and constants are resolved through the registry
            // when referenced; tuples and their reads are fully described by
            // the assignment; after-all and add-dependency order tokens.
            Opcode::Parameter { .. }
            | Opcode::Constant { .. }
            | Opcode::Tuple
            | Opcode::GetTupleElement { .. }
            | Opcode::AfterAll
            | Opcode::AddDependency => Ok(()),

            Opcode::Bitcast => self.emit_bitcast(handle, &label),

            Opcode::Unary(kind) => self.emit_simple(handle, OpKind::Unary(kind), &label),
            Opcode::Binary(kind) => self.emit_simple(handle, OpKind::Binary(kind), &label),
            Opcode::Compare { direction } => {
                self.emit_simple(handle, OpKind::Compare { direction }, &label)
            }
            Opcode::Convert => self.emit_simple(handle, OpKind::Convert, &label),
            Opcode::Copy => self.emit_simple(handle, OpKind::Copy, &label),
            Opcode::Select => self.emit_simple(handle, OpKind::Select, &label),
            Opcode::ReplicaId => self.emit_simple(handle, OpKind::ReplicaId, &label),
            Opcode::PartitionId => self.emit_simple(handle, OpKind::PartitionId, &label),

            Opcode::Sort {
                dimension,
                is_stable,
                comparator,
            } => {
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let region = self.import_math_region(comparator)?;
                self.fb.push(
                    OpKind::Sort {
                        dimension,
                        is_stable,
                    },
                    collected.values,
                    vec![region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::Fusion { fused } => self.emit_fusion(handle, fused, &label),

            Opcode::Scatter {
                dims,
                indices_are_sorted,
                unique_indices,
                update,
            } => {
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let region = self.import_math_region(update)?;
                self.fb.push(
                    OpKind::Scatter {
                        dims,
                        indices_are_sorted,
                        unique_indices,
                    },
                    collected.values,
                    vec![region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::SelectAndScatter {
                window,
                select,
                scatter,
            } => {
                if window.has_dilation() {
                    return Err(LowerError::WindowDilation { instruction: label });
                }
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let select_region = self.import_math_region(select)?;
                let scatter_region = self.import_math_region(scatter)?;
                self.fb.push(
                    OpKind::SelectAndScatter {
                        window_dimensions: window.sizes(),
                        window_strides: window.strides(),
                        padding_low: window.padding_low(),
                    },
                    collected.values,
                    vec![select_region, scatter_region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::CustomCall {
                target,
                backend_config,
                window,
                conv_dims,
            } => self.emit_custom_call(handle, &target, backend_config, window, conv_dims, &label),

            Opcode::Infeed { config } => {
                // The result is (data, token); only the data half is
                // buffer-backed.
                let mut values = Vec::new();
                self.collect_views(
                    handle,
                    &ShapeIndex::from_steps(&[0]),
                    TokenMode::FailToLower,
                    &mut values,
                )?;
                self.fb.push(OpKind::Infeed { config }, values, vec![], 0, &label)?;
                Ok(())
            }

            Opcode::Outfeed { config } => {
                // Only the fed operand is lowered; the token result is not.
                let collected =
                    self.collect_operands(handle, Some(1), false, TokenMode::FailToLower)?;
                self.fb
                    .push(OpKind::Outfeed { config }, collected.values, vec![], 0, &label)?;
                Ok(())
            }

            Opcode::AllToAll {
                split_dimension,
                replica_groups,
                channel_id,
            } => self.emit_simple(
                handle,
                OpKind::AllToAll {
                    split_dimension,
                    replica_groups,
                    channel_id,
                },
                &label,
            ),

            Opcode::AllGather {
                all_gather_dimension,
                use_global_device_ids,
                replica_groups,
                channel_id,
            } => self.emit_simple(
                handle,
                OpKind::AllGather {
                    all_gather_dimension,
                    use_global_device_ids,
                    replica_groups,
                    channel_id,
                },
                &label,
            ),

            Opcode::AllReduce {
                reduction,
                replica_groups,
                channel_id,
            } => {
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let region = self.import_math_region(reduction)?;
                self.fb.push(
                    OpKind::AllReduce {
                        replica_groups,
                        channel_id,
                    },
                    collected.values,
                    vec![region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::AllReduceStart {
                reduction,
                replica_groups,
                channel_id,
            } => {
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let region = self.import_math_region(reduction)?;
                let (_, results) = self.fb.push(
                    OpKind::AllReduceStart {
                        replica_groups,
                        channel_id,
                    },
                    collected.values,
                    vec![region],
                    1,
                    &label,
                )?;
                self.started_collectives.insert(handle, results[0]);
                Ok(())
            }

            Opcode::AllReduceDone => {
                let start = hlo.instructions[handle].operands[0];
                let token = self.started_collectives.remove(&start).ok_or(
                    LowerError::MissingCollectiveStart {
                        instruction: label.clone(),
                    },
                )?;
                // Token first, then the start's views; the done's outputs
                // alias its inputs, so no result views are added.
                let collected =
                    self.collect_operands(handle, None, false, TokenMode::FailToLower)?;
                let mut values = vec![token];
                values.extend(collected.values);
                self.fb
                    .push(OpKind::AllReduceDone, values, vec![], 0, &label)?;
                Ok(())
            }

            Opcode::ReduceScatter {
                scatter_dimension,
                reduction,
                replica_groups,
                channel_id,
            } => {
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                let region = self.import_math_region(reduction)?;
                self.fb.push(
                    OpKind::ReduceScatter {
                        scatter_dimension,
                        replica_groups,
                        channel_id,
                    },
                    collected.values,
                    vec![region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::CollectivePermute {
                source_target_pairs,
                channel_id,
            } => self.emit_simple(
                handle,
                OpKind::CollectivePermute {
                    source_target_pairs,
                    channel_id,
                },
                &label,
            ),

            Opcode::RngGetAndUpdateState { delta } => {
                self.emit_simple(handle, OpKind::RngGetAndUpdateState { delta }, &label)
            }

            Opcode::Fft {
                fft_type,
                fft_length,
            } => self.emit_simple(
                handle,
                OpKind::Fft {
                    fft_type,
                    fft_length,
                },
                &label,
            ),

            Opcode::TriangularSolve { options } => {
                self.emit_simple(handle, OpKind::TriangularSolve { options }, &label)
            }

            Opcode::While {
                condition,
                body,
                trip_count,
            } => {
                // The loop's single operand is the predicate buffer: the
                // view of the condition computation's root, re-read after
                // every condition run.
                let cond_root = hlo.computations[condition].root;
                let predicate =
                    self.get_or_create_view(cond_root, &ShapeIndex::root(), TokenMode::FailToLower)?;
                let cond_region = self.lower_buffer_region(condition)?;
                let body_region = self.lower_buffer_region(body)?;
                self.fb.push(
                    OpKind::While { trip_count },
                    vec![predicate],
                    vec![cond_region, body_region],
                    0,
                    &label,
                )?;
                Ok(())
            }

            Opcode::Case { branches } => {
                // Only the branch-index operand is resolved here; branch
                // arguments and results are aliased by the assignment.
                let collected =
                    self.collect_operands(handle, Some(1), false, TokenMode::FailToLower)?;
                let mut regions = Vec::with_capacity(branches.len());
                for branch in branches {
                    regions.push(self.lower_buffer_region(branch)?);
                }
                self.fb
                    .push(OpKind::Case, collected.values, regions, 0, &label)?;
                Ok(())
            }

            opcode @ (Opcode::Broadcast { .. }
            | Opcode::Reshape
            | Opcode::Transpose { .. }
            | Opcode::Iota { .. }
            | Opcode::Reduce { .. }) => Err(LowerError::UnsupportedOpcode {
                opcode: opcode.mnemonic().to_string(),
                instruction: label,
            }),
        }
    }

    /// The common path: all operand views, the result views, no attributes
    /// beyond the kind itself.
    fn emit_simple(
        &mut self,
        handle: Handle<Instruction>,
        kind: OpKind,
        label: &str,
    ) -> Result<(), LowerError> {
        let collected = self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
        self.fb.push(kind, collected.values, vec![], 0, label)?;
        Ok(())
    }

    /// A bitcast renames storage: its slice must equal its operand's, and no
    /// operation is emitted.
    fn emit_bitcast(
        &mut self,
        handle: Handle<Instruction>,
        label: &str,
    ) -> Result<(), LowerError> {
        let operand = self.hlo.instructions[handle].operands[0];
        let mine = self.assignment.top_level_slice(handle).ok_or_else(|| {
            LowerError::MissingSlice {
                instruction: label.to_string(),
                path: ShapeIndex::root(),
            }
        })?;
        let theirs = self.assignment.top_level_slice(operand).ok_or_else(|| {
            LowerError::MissingSlice {
                instruction: self.hlo.instructions[operand].name.clone(),
                path: ShapeIndex::root(),
            }
        })?;
        if mine != theirs {
            return Err(LowerError::BitcastSliceMismatch {
                instruction: label.to_string(),
            });
        }
        Ok(())
    }

    fn emit_custom_call(
        &mut self,
        handle: Handle<Instruction>,
        target: &str,
        backend_config: Vec<u8>,
        window: Option<grebe_hlo::Window>,
        conv_dims: Option<grebe_hlo::ConvolutionDimensionNumbers>,
        label: &str,
    ) -> Result<(), LowerError> {
        let conv_kind = match target {
            CONV_FORWARD_CALL_TARGET => Some(ConvKind::Forward),
            CONV_BACKWARD_INPUT_CALL_TARGET => Some(ConvKind::BackwardInput),
            CONV_BACKWARD_FILTER_CALL_TARGET => Some(ConvKind::BackwardFilter),
            CONV_FORWARD_FUSED_CALL_TARGET => Some(ConvKind::ForwardFused),
            _ => None,
        };
        if let Some(kind) = conv_kind {
            let config: ConvConfig = decode_config(target, &backend_config)?;
            let (window, dims) = match (window, conv_dims) {
                (Some(window), Some(dims)) => (window, dims),
                _ => {
                    return Err(LowerError::MissingConvAttributes {
                        instruction: label.to_string(),
                    })
                }
            };
            let activation = grebe_hlo::ActivationMode::from_code(config.activation_mode)
                .ok_or_else(|| LowerError::BadActivation {
                    target: target.to_string(),
                    code: config.activation_mode,
                })?;
            let collected = self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
            self.fb.push(
                OpKind::Conv {
                    kind,
                    window,
                    dims,
                    algorithm: config.algorithm,
                    result_scale: config.conv_result_scale,
                    side_input_scale: config.side_input_scale,
                    activation,
                },
                collected.values,
                vec![],
                0,
                label,
            )?;
            return Ok(());
        }

        let batch_norm_kind = match target {
            BATCH_NORM_INFERENCE_CALL_TARGET => Some(BatchNormKind::Inference),
            BATCH_NORM_TRAINING_CALL_TARGET => Some(BatchNormKind::Training),
            BATCH_NORM_GRAD_CALL_TARGET => Some(BatchNormKind::Grad),
            _ => None,
        };
        if let Some(kind) = batch_norm_kind {
            let config: BatchNormConfig = decode_config(target, &backend_config)?;
            let collected = self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
            self.fb.push(
                OpKind::BatchNorm {
                    kind,
                    epsilon: config.epsilon,
                    feature_index: config.feature_index,
                },
                collected.values,
                vec![],
                0,
                label,
            )?;
            return Ok(());
        }

        match target {
            CHOLESKY_CALL_TARGET => {
                let config: CholeskyConfig = decode_config(target, &backend_config)?;
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                self.fb.push(
                    OpKind::Cholesky {
                        lower: config.lower,
                    },
                    collected.values,
                    vec![],
                    0,
                    label,
                )?;
                Ok(())
            }
            GEMM_CALL_TARGET => {
                let config: GemmConfig = decode_config(target, &backend_config)?;
                let dims = config.dot_dimension_numbers.unwrap_or_default().into();
                let collected =
                    self.collect_operands(handle, None, true, TokenMode::FailToLower)?;
                self.fb.push(
                    OpKind::Gemm {
                        alpha_real: config.alpha_real,
                        alpha_imag: config.alpha_imag,
                        beta: config.beta,
                        dims,
                        algorithm: config.selected_algorithm,
                    },
                    collected.values,
                    vec![],
                    0,
                    label,
                )?;
                Ok(())
            }
            _ => {
                // Unrecognized targets keep their raw config and their
                // argument/result split; tokens become null placeholders.
                let collected = self.collect_operands(handle, None, true, TokenMode::UseNull)?;
                log::debug!(
                    "generic custom call '{target}': {} args, {} results",
                    collected.num_args,
                    collected.num_results
                );
                self.fb.push(
                    OpKind::CustomCall {
                        target: target.to_string(),
                        backend_config,
                        num_args: collected.num_args,
                        num_results: collected.num_results,
                    },
                    collected.values,
                    vec![],
                    0,
                    label,
                )?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grebe_buffer::{
        assign_buffers, Allocation, AllocationKind, BufferAssignmentBuilder, Slice,
    };
    use grebe_hlo::{
        BinaryKind, Computation, ConvolutionDimensionNumbers, ElementType, HloError, Layout,
        Window, WindowDimension,
    };
    use grebe_lir::{BatchNormKind, ConvKind, Function, Module};
    use prost::Message;

    use crate::proto::{BatchNormConfig, CholeskyConfig, ConvConfig, GemmConfig};

    fn parse(text: &str) -> HloModule {
        grebe_parser::parse(text).unwrap()
    }

    fn lowered(text: &str) -> Module {
        let hlo = parse(text);
        let assignment = assign_buffers(&hlo).unwrap();
        crate::lower_module(&hlo, &assignment).unwrap()
    }

    fn lower_err(text: &str) -> LowerError {
        let hlo = parse(text);
        let assignment = assign_buffers(&hlo).unwrap();
        crate::lower_module(&hlo, &assignment).unwrap_err()
    }

    fn find(hlo: &HloModule, name: &str) -> Handle<Instruction> {
        hlo.instructions
            .iter()
            .find(|(_, i)| i.name == name)
            .map(|(h, _)| h)
            .unwrap()
    }

    fn entry_fn(module: &Module) -> &Function {
        module.functions.iter().next().unwrap().1
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    const ADD: &str = "\
HloModule add

ENTRY %main (x: f32[4], y: f32[4]) -> f32[4] {
  %x = f32[4] parameter(0)
  %y = f32[4] parameter(1)
  ROOT %sum = f32[4] add(%x, %y)
}
";

    #[test]
    fn caches_leaf_views() {
        let hlo = parse(ADD);
        let assignment = assign_buffers(&hlo).unwrap();
        let mut mb = ModuleBuilder::new("t");
        let mut e = Emitter::new(&assignment, &hlo, &mut mb, "main").unwrap();

        let x = find(&hlo, "x");
        let first = e
            .get_or_create_view(x, &ShapeIndex::root(), TokenMode::FailToLower)
            .unwrap();
        let count = e.value_count();
        let second = e
            .get_or_create_view(x, &ShapeIndex::root(), TokenMode::FailToLower)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(e.value_count(), count);
        assert!(matches!(e.value(first), Value::View { .. }));
    }

    #[test]
    fn tuple_result_resolves_per_leaf() {
        let text = "\
HloModule tuples

ENTRY %main (a: f32[2], b: f32[2]) -> (f32[2], f32[2]) {
  %a = f32[2] parameter(0)
  %b = f32[2] parameter(1)
  ROOT %t = (f32[2], f32[2]) tuple(%a, %b)
}
";
        let hlo = parse(text);
        let assignment = assign_buffers(&hlo).unwrap();
        let mut mb = ModuleBuilder::new("t");
        let mut e = Emitter::new(&assignment, &hlo, &mut mb, "main").unwrap();

        let t = find(&hlo, "t");
        let packed = e
            .get_or_create_view(t, &ShapeIndex::root(), TokenMode::FailToLower)
            .unwrap();
        let Value::Tuple { elements } = e.value(packed) else {
            panic!("tuple shape must resolve to a tuple value");
        };
        assert_eq!(elements.len(), 2);

        let collected = e
            .collect_operands(t, None, true, TokenMode::FailToLower)
            .unwrap();
        assert_eq!(collected.num_args, 2);
        assert_eq!(collected.num_results, 2);
    }

    #[test]
    fn elementwise_add_emits_one_operation() {
        let module = lowered(ADD);
        let f = entry_fn(&module);
        assert_eq!(f.args.len(), 2);
        assert_eq!(f.body.len(), 1);
        let op = &f.ops[f.body[0]];
        assert!(matches!(op.kind, OpKind::Binary(BinaryKind::Add)));
        assert_eq!(op.operands.len(), 3);
        for &operand in &op.operands {
            assert!(matches!(f.values[operand], Value::View { .. }));
        }
        assert_eq!(op.label, "sum");
    }

    #[test]
    fn forwarding_instructions_emit_nothing() {
        let text = "\
HloModule forwarding

ENTRY %main (p: f32[4]) -> f32[4] {
  %p = f32[4] parameter(0)
  %t2 = (f32[4]) tuple(%p)
  %g = f32[4] get-tuple-element(%t2), index=0
  ROOT %c2 = f32[4] copy(%g)
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 1);
        assert!(matches!(f.ops[f.body[0]].kind, OpKind::Copy));
    }

    #[test]
    fn token_policies() {
        let text = "\
HloModule tokens

ENTRY %main (q: f32[2]) -> f32[2] {
  %q = f32[2] parameter(0)
  %tok = token[] after-all()
  ROOT %r = f32[2] copy(%q)
}
";
        let hlo = parse(text);
        let assignment = assign_buffers(&hlo).unwrap();
        let mut mb = ModuleBuilder::new("t");
        let mut e = Emitter::new(&assignment, &hlo, &mut mb, "main").unwrap();
        let tok = find(&hlo, "tok");

        let mut out = Vec::new();
        let err = e
            .collect_views(tok, &ShapeIndex::root(), TokenMode::FailToLower, &mut out)
            .unwrap_err();
        assert!(matches!(err, LowerError::TokenNotLowerable { .. }));

        e.collect_views(tok, &ShapeIndex::root(), TokenMode::UseNull, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(e.value(out[0]), Value::Null));

        let err = e
            .collect_views(tok, &ShapeIndex::root(), TokenMode::Skip, &mut out)
            .unwrap_err();
        assert!(matches!(err, LowerError::SkipTokenMode));
    }

    #[test]
    fn bitcast_with_shared_slice_is_silent() {
        let text = "\
HloModule bitcasts

ENTRY %main (w: f32[4]) -> s32[4] {
  %w = f32[4] parameter(0)
  ROOT %bc = s32[4] bitcast(%w)
}
";
        let module = lowered(text);
        assert_eq!(entry_fn(&module).body.len(), 0);
    }

    #[test]
    fn bitcast_slice_mismatch_is_rejected() {
        let text = "\
HloModule bitcasts

ENTRY %main (w: f32[4]) -> s32[4] {
  %w = f32[4] parameter(0)
  ROOT %bc = s32[4] bitcast(%w)
}
";
        let hlo = parse(text);
        let mut builder = BufferAssignmentBuilder::new();
        let arg = builder.add_allocation(Allocation {
            size: 16,
            kind: AllocationKind::EntryParameter { number: 0 },
        });
        let tmp = builder.add_allocation(Allocation {
            size: 16,
            kind: AllocationKind::Temp,
        });
        builder
            .assign(
                find(&hlo, "w"),
                ShapeIndex::root(),
                Slice { allocation: arg, offset: 0, size: 16 },
            )
            .unwrap();
        builder
            .assign(
                find(&hlo, "bc"),
                ShapeIndex::root(),
                Slice { allocation: tmp, offset: 0, size: 16 },
            )
            .unwrap();
        let assignment = builder.finish().unwrap();

        let err = crate::lower_module(&hlo, &assignment).unwrap_err();
        assert!(matches!(err, LowerError::BitcastSliceMismatch { .. }));
    }

    #[test]
    fn sort_imports_comparator_region() {
        let text = "\
HloModule sorting

%cmp (sa: f32[], sb: f32[]) -> pred[] {
  %sa = f32[] parameter(0)
  %sb = f32[] parameter(1)
  ROOT %slt = pred[] compare(%sa, %sb), direction=LT
}

ENTRY %main (sv: f32[8]) -> f32[8] {
  %sv = f32[8] parameter(0)
  ROOT %sorted = f32[8] sort(%sv), dimensions={0}, is_stable=true, to_apply=%cmp
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 1);
        let op = &f.ops[f.body[0]];
        assert!(matches!(
            op.kind,
            OpKind::Sort { dimension: 0, is_stable: true }
        ));
        assert_eq!(op.operands.len(), 2);
        assert_eq!(op.regions.len(), 1);

        let region = &f.regions[op.regions[0]];
        assert_eq!(region.args.len(), 2);
        let kinds: Vec<_> = region.body.iter().map(|&h| &f.ops[h].kind).collect();
        assert!(matches!(kinds[0], OpKind::Compare { .. }));
        assert!(matches!(kinds[1], OpKind::Return));
    }

    #[test]
    fn fusion_body_loads_computes_stores() {
        let text = "\
HloModule fused_multiply

%fused (p0: f32[4], p1: f32[4]) -> f32[4] {
  %p0 = f32[4] parameter(0)
  %p1 = f32[4] parameter(1)
  ROOT %m = f32[4] multiply(%p0, %p1)
}

ENTRY %main (a2: f32[4], b2: f32[4]) -> f32[4] {
  %a2 = f32[4] parameter(0)
  %b2 = f32[4] parameter(1)
  ROOT %fus = f32[4] fusion(%a2, %b2), kind=kLoop, calls=%fused
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 1);
        let op = &f.ops[f.body[0]];
        assert!(matches!(op.kind, OpKind::Fusion));
        assert!(op.operands.is_empty());
        assert_eq!(op.regions.len(), 1);

        let region = &f.regions[op.regions[0]];
        assert!(region.args.is_empty());
        let kinds: Vec<_> = region.body.iter().map(|&h| &f.ops[h].kind).collect();
        assert_eq!(kinds.len(), 5);
        assert!(matches!(kinds[0], OpKind::Load));
        assert!(matches!(kinds[1], OpKind::Load));
        assert!(matches!(kinds[2], OpKind::Binary(BinaryKind::Multiply)));
        assert!(matches!(kinds[3], OpKind::Store));
        assert!(matches!(kinds[4], OpKind::Terminator));
    }

    #[test]
    fn fusion_with_missing_operand_is_rejected() {
        // The fused computation expects two parameters but the fusion
        // supplies one; validation must fail before any region is built.
        let text = "\
HloModule short_fusion

%fused2 (q0: f32[4], q1: f32[4]) -> f32[4] {
  %q0 = f32[4] parameter(0)
  %q1 = f32[4] parameter(1)
  ROOT %m2 = f32[4] multiply(%q0, %q1)
}

ENTRY %main (a3: f32[4]) -> f32[4] {
  %a3 = f32[4] parameter(0)
  ROOT %fus2 = f32[4] fusion(%a3), kind=kLoop, calls=%fused2
}
";
        let hlo = parse(text);
        let assignment = BufferAssignmentBuilder::new().finish().unwrap();
        let err = crate::lower_module(&hlo, &assignment).unwrap_err();
        assert!(matches!(
            err,
            LowerError::Invalid(HloError::OperandCount { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn while_loop_carries_two_regions() {
        let text = "\
HloModule loop

%cond (s: f32[]) -> pred[] {
  %s = f32[] parameter(0)
  %z = f32[] constant(0)
  ROOT %lt = pred[] compare(%s, %z), direction=LT
}

%body (s2: f32[]) -> f32[] {
  %s2 = f32[] parameter(0)
  ROOT %dbl = f32[] add(%s2, %s2)
}

ENTRY %main (init: f32[]) -> f32[] {
  %init = f32[] parameter(0)
  ROOT %loop = f32[] while(%init), condition=%cond, body=%body, trip_count=3
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 1);
        let op = &f.ops[f.body[0]];
        assert!(matches!(op.kind, OpKind::While { trip_count: Some(3) }));
        // The only operand is the predicate view of the condition's root.
        assert_eq!(op.operands.len(), 1);
        assert!(matches!(f.values[op.operands[0]], Value::View { .. }));
        assert_eq!(op.regions.len(), 2);

        let cond = &f.regions[op.regions[0]];
        let kinds: Vec<_> = cond.body.iter().map(|&h| &f.ops[h].kind).collect();
        assert!(matches!(kinds[0], OpKind::Compare { .. }));
        assert!(matches!(kinds[1], OpKind::Terminator));
    }

    #[test]
    fn conditional_resolves_only_branch_index() {
        let text = "\
HloModule branches

%b0 (t0: f32[2]) -> f32[2] {
  %t0 = f32[2] parameter(0)
  ROOT %n0 = f32[2] add(%t0, %t0)
}

%b1 (t1: f32[2]) -> f32[2] {
  %t1 = f32[2] parameter(0)
  ROOT %n1 = f32[2] copy(%t1)
}

ENTRY %main (idx: s32[], v: f32[2]) -> f32[2] {
  %idx = s32[] parameter(0)
  %v = f32[2] parameter(1)
  ROOT %sel2 = f32[2] conditional(%idx, %v, %v), branch_computations={%b0, %b1}
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 1);
        let op = &f.ops[f.body[0]];
        assert!(matches!(op.kind, OpKind::Case));
        assert_eq!(op.operands.len(), 1);
        assert_eq!(op.regions.len(), 2);
    }

    #[test]
    fn all_reduce_start_done_pairing() {
        let text = "\
HloModule collectives

%sum2 (ra: f32[], rb: f32[]) -> f32[] {
  %ra = f32[] parameter(0)
  %rb = f32[] parameter(1)
  ROOT %radd = f32[] add(%ra, %rb)
}

ENTRY %main (cx: f32[8]) -> f32[8] {
  %cx = f32[8] parameter(0)
  %start = f32[8] all-reduce-start(%cx), to_apply=%sum2
  ROOT %done = f32[8] all-reduce-done(%start)
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 2);

        let start = &f.ops[f.body[0]];
        assert!(matches!(start.kind, OpKind::AllReduceStart { .. }));
        assert_eq!(start.num_results, 1);
        assert_eq!(start.regions.len(), 1);

        let done = &f.ops[f.body[1]];
        assert!(matches!(done.kind, OpKind::AllReduceDone));
        // Token first, then the start's views.
        assert_eq!(done.operands.len(), 2);
        assert!(matches!(
            f.values[done.operands[0]],
            Value::OpResult { index: 0, .. }
        ));
    }

    #[test]
    fn done_without_start_is_rejected() {
        let text = "\
HloModule orphan

ENTRY %main (ox: f32[4]) -> f32[4] {
  %ox = f32[4] parameter(0)
  ROOT %odone = f32[4] all-reduce-done(%ox)
}
";
        assert!(matches!(
            lower_err(text),
            LowerError::MissingCollectiveStart { .. }
        ));
    }

    #[test]
    fn infeed_uses_data_leaves_only() {
        let text = "\
HloModule feeds

ENTRY %main (d: f32[2]) -> f32[2] {
  %d = f32[2] parameter(0)
  %tok2 = token[] after-all()
  %inf = (f32[2], token[]) infeed(%tok2), infeed_config=\"cfg\"
  %g2 = f32[2] get-tuple-element(%inf), index=0
  ROOT %out = f32[2] add(%d, %g2)
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 2);
        let op = &f.ops[f.body[0]];
        let OpKind::Infeed { config } = &op.kind else {
            panic!("expected an infeed operation");
        };
        assert_eq!(config, "cfg");
        assert_eq!(op.operands.len(), 1);
        assert!(matches!(f.values[op.operands[0]], Value::View { .. }));
    }

    #[test]
    fn outfeed_lowers_fed_operand_only() {
        let text = "\
HloModule feeds_out

ENTRY %main (d2: f32[2]) -> f32[2] {
  %d2 = f32[2] parameter(0)
  %tok3 = token[] after-all()
  %outf = token[] outfeed(%d2, %tok3), outfeed_config=\"ofc\"
  ROOT %res = f32[2] copy(%d2)
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        assert_eq!(f.body.len(), 2);
        let op = &f.ops[f.body[0]];
        let OpKind::Outfeed { config } = &op.kind else {
            panic!("expected an outfeed operation");
        };
        assert_eq!(config, "ofc");
        assert_eq!(op.operands.len(), 1);
    }

    #[test]
    fn gemm_call_decodes_config() {
        let config = GemmConfig {
            alpha_real: 1.0,
            alpha_imag: 0.0,
            beta: 0.5,
            dot_dimension_numbers: Some(crate::proto::DotDimensionNumbersProto {
                lhs_contracting_dimensions: vec![1],
                rhs_contracting_dimensions: vec![0],
                lhs_batch_dimensions: vec![],
                rhs_batch_dimensions: vec![],
            }),
            selected_algorithm: Some(13),
            precision: vec![],
        };
        let text = format!(
            "\
HloModule gemm

ENTRY %main (lhs: f32[2,3], rhs: f32[3,2]) -> f32[2,2] {{
  %lhs = f32[2,3] parameter(0)
  %rhs = f32[3,2] parameter(1)
  ROOT %gm = f32[2,2] custom-call(%lhs, %rhs), custom_call_target=\"__blas$gemm\", backend_config=0x{}
}}
",
            hex(&config.encode_to_vec())
        );
        let module = lowered(&text);
        let f = entry_fn(&module);
        let op = &f.ops[f.body[0]];
        let OpKind::Gemm {
            alpha_real,
            beta,
            dims,
            algorithm,
            ..
        } = &op.kind
        else {
            panic!("expected a gemm operation");
        };
        assert_eq!(*alpha_real, 1.0);
        assert_eq!(*beta, 0.5);
        assert_eq!(dims.lhs_contracting_dimensions, vec![1]);
        assert_eq!(*algorithm, Some(13));
        assert_eq!(op.operands.len(), 3);
    }

    #[test]
    fn cholesky_call_decodes_config() {
        let config = CholeskyConfig { lower: true };
        let text = format!(
            "\
HloModule cholesky

ENTRY %main (mat: f32[4,4]) -> f32[4,4] {{
  %mat = f32[4,4] parameter(0)
  ROOT %ch = f32[4,4] custom-call(%mat), custom_call_target=\"__solver$cholesky\", backend_config=0x{}
}}
",
            hex(&config.encode_to_vec())
        );
        let module = lowered(&text);
        let f = entry_fn(&module);
        assert!(matches!(
            f.ops[f.body[0]].kind,
            OpKind::Cholesky { lower: true }
        ));
    }

    #[test]
    fn batch_norm_call_decodes_config() {
        let config = BatchNormConfig {
            epsilon: 0.001,
            feature_index: 1,
        };
        let text = format!(
            "\
HloModule bn

ENTRY %main (op0: f32[2,4], sc: f32[4], of: f32[4], mn: f32[4], vr: f32[4]) -> f32[2,4] {{
  %op0 = f32[2,4] parameter(0)
  %sc = f32[4] parameter(1)
  %of = f32[4] parameter(2)
  %mn = f32[4] parameter(3)
  %vr = f32[4] parameter(4)
  ROOT %bn1 = f32[2,4] custom-call(%op0, %sc, %of, %mn, %vr), custom_call_target=\"__dnn$batch_norm_inference\", backend_config=0x{}
}}
",
            hex(&config.encode_to_vec())
        );
        let module = lowered(&text);
        let f = entry_fn(&module);
        let OpKind::BatchNorm {
            kind,
            epsilon,
            feature_index,
        } = &f.ops[f.body[0]].kind
        else {
            panic!("expected a batch-norm operation");
        };
        assert_eq!(*kind, BatchNormKind::Inference);
        assert_eq!(*epsilon, 0.001);
        assert_eq!(*feature_index, 1);
    }

    #[test]
    fn generic_custom_call_keeps_argument_split() {
        let text = "\
HloModule opaque

ENTRY %main (d3: f32[2]) -> f32[2] {
  %d3 = f32[2] parameter(0)
  %tok4 = token[] after-all()
  ROOT %cc = f32[2] custom-call(%d3, %tok4), custom_call_target=\"vendor_op\"
}
";
        let module = lowered(text);
        let f = entry_fn(&module);
        let op = &f.ops[f.body[0]];
        let OpKind::CustomCall {
            target,
            num_args,
            num_results,
            ..
        } = &op.kind
        else {
            panic!("expected a custom call");
        };
        assert_eq!(target, "vendor_op");
        assert_eq!(*num_args, 2);
        assert_eq!(*num_results, 1);
        // The token position is a null placeholder.
        assert!(matches!(f.values[op.operands[1]], Value::Null));
    }

    #[test]
    fn undecodable_config_is_rejected() {
        let text = "\
HloModule badconfig

ENTRY %main (m2: f32[4,4]) -> f32[4,4] {
  %m2 = f32[4,4] parameter(0)
  ROOT %ch2 = f32[4,4] custom-call(%m2), custom_call_target=\"__solver$cholesky\", backend_config=0x08
}
";
        assert!(matches!(
            lower_err(text),
            LowerError::BadBackendConfig { .. }
        ));
    }

    fn conv_module(activation_mode: i32) -> HloModule {
        let mut hlo = HloModule::new("conv");
        let shape = |dims: &[i64]| Shape::Array {
            element_type: ElementType::F32,
            dims: dims.to_vec(),
            layout: Layout::descending(dims.len()),
        };
        let input = hlo.instructions.append(Instruction {
            name: "cin".to_string(),
            opcode: Opcode::Parameter { number: 0 },
            shape: shape(&[1, 4, 4, 1]),
            operands: vec![],
        });
        let kernel = hlo.instructions.append(Instruction {
            name: "ker".to_string(),
            opcode: Opcode::Parameter { number: 1 },
            shape: shape(&[2, 2, 1, 1]),
            operands: vec![],
        });
        let config = ConvConfig {
            algorithm: 3,
            conv_result_scale: 1.0,
            side_input_scale: 0.0,
            activation_mode,
        };
        let window = Window {
            dimensions: vec![WindowDimension::default(), WindowDimension::default()],
        };
        let conv = hlo.instructions.append(Instruction {
            name: "cv".to_string(),
            opcode: Opcode::CustomCall {
                target: CONV_FORWARD_CALL_TARGET.to_string(),
                backend_config: config.encode_to_vec(),
                window: Some(window),
                conv_dims: Some(ConvolutionDimensionNumbers::default()),
            },
            shape: shape(&[1, 3, 3, 1]),
            operands: vec![input, kernel],
        });
        let comp = hlo.computations.append(Computation {
            name: "main".to_string(),
            instructions: vec![input, kernel, conv],
            root: conv,
        });
        hlo.entry = Some(comp);
        hlo
    }

    #[test]
    fn conv_call_carries_window_and_dims() {
        let hlo = conv_module(2);
        let assignment = assign_buffers(&hlo).unwrap();
        let module = crate::lower_module(&hlo, &assignment).unwrap();
        let f = entry_fn(&module);
        let OpKind::Conv {
            kind,
            algorithm,
            activation,
            ..
        } = &f.ops[f.body[0]].kind
        else {
            panic!("expected a convolution");
        };
        assert_eq!(*kind, ConvKind::Forward);
        assert_eq!(*algorithm, 3);
        assert_eq!(*activation, grebe_hlo::ActivationMode::Relu);
    }

    #[test]
    fn conv_call_with_bad_activation_is_rejected() {
        let hlo = conv_module(9);
        let assignment = assign_buffers(&hlo).unwrap();
        let err = crate::lower_module(&hlo, &assignment).unwrap_err();
        assert!(matches!(err, LowerError::BadActivation { code: 9, .. }));
    }

    #[test]
    fn conv_call_without_attributes_is_rejected() {
        // Module text cannot carry the window, so a textual conv call is
        // incomplete by construction.
        let text = "\
HloModule convtext

ENTRY %main (ci: f32[1,4,4,1], ck: f32[2,2,1,1]) -> f32[1,3,3,1] {
  %ci = f32[1,4,4,1] parameter(0)
  %ck = f32[2,2,1,1] parameter(1)
  ROOT %cv2 = f32[1,3,3,1] custom-call(%ci, %ck), custom_call_target=\"__dnn$conv_forward\"
}
";
        assert!(matches!(
            lower_err(text),
            LowerError::MissingConvAttributes { .. }
        ));
    }

    #[test]
    fn unsupported_opcode_aborts() {
        let text = "\
HloModule unsupported

ENTRY %main (u: f32[2]) -> f32[2,2] {
  %u = f32[2] parameter(0)
  ROOT %bcast = f32[2,2] broadcast(%u), dimensions={0}
}
";
        let err = lower_err(text);
        let LowerError::UnsupportedOpcode { opcode, .. } = err else {
            panic!("expected an unsupported-opcode error");
        };
        assert_eq!(opcode, "broadcast");
    }

    #[test]
    fn failed_lowering_commits_no_function() {
        let text = "\
HloModule partial

ENTRY %main (u2: f32[2]) -> f32[2,2] {
  %u2 = f32[2] parameter(0)
  ROOT %bcast2 = f32[2,2] broadcast(%u2), dimensions={0}
}
";
        let hlo = parse(text);
        let assignment = assign_buffers(&hlo).unwrap();
        let mut mb = ModuleBuilder::new("t");
        let mut e = Emitter::new(&assignment, &hlo, &mut mb, "main").unwrap();
        let bcast = find(&hlo, "bcast2");
        assert!(e.emit(bcast).is_err());
        drop(e);
        assert_eq!(mb.finish().functions.len(), 0);
    }
}
