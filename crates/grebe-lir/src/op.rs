//! Operations of the buffer IR.

use grebe_hlo::{
    ActivationMode, BinaryKind, ComparisonDirection, ConvolutionDimensionNumbers,
    DotDimensionNumbers, FftType, Handle, Literal, ReplicaGroups, TriangularSolveOptions,
    UnaryKind, Window,
};

use crate::{Region, Value};

/// Which convolution a library call performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvKind {
    Forward,
    BackwardInput,
    BackwardFilter,
    ForwardFused,
}

impl ConvKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Forward => "conv_forward",
            Self::BackwardInput => "conv_backward_input",
            Self::BackwardFilter => "conv_backward_filter",
            Self::ForwardFused => "conv_forward_fused",
        }
    }
}

/// Which batch-norm variant a library call performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchNormKind {
    Inference,
    Training,
    Grad,
}

impl BatchNormKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Inference => "batch_norm_inference",
            Self::Training => "batch_norm_training",
            Self::Grad => "batch_norm_grad",
        }
    }
}

/// The operation kinds of the buffer IR.
///
/// Buffer-level operations take operand views followed by result views and
/// produce no SSA results; the `Load`/`Store`/`Return`/`ConstantScalar`
/// kinds and the elementwise family double as SSA operations inside
/// arithmetic regions.
#[derive(Clone, Debug)]
pub enum OpKind {
    Unary(UnaryKind),
    Binary(BinaryKind),
    Compare { direction: ComparisonDirection },
    Convert,
    Copy,
    Select,
    /// A constant materialized as an SSA value inside an arithmetic region.
    ConstantScalar { literal: Literal },
    /// Reads a view into an SSA value (fusion regions only).
    Load,
    /// Writes an SSA value to a view (fusion regions only).
    Store,
    /// Yields the SSA results of an arithmetic region.
    Return,
    /// Closes a control-flow or fusion region.
    Terminator,
    Sort {
        dimension: i64,
        is_stable: bool,
    },
    Fusion,
    Scatter {
        dims: grebe_hlo::ScatterDimensionNumbers,
        indices_are_sorted: bool,
        unique_indices: bool,
    },
    SelectAndScatter {
        window_dimensions: Vec<i64>,
        window_strides: Vec<i64>,
        padding_low: Vec<i64>,
    },
    CustomCall {
        target: String,
        backend_config: Vec<u8>,
        /// How many leading operands are arguments; the rest are results.
        num_args: usize,
        num_results: usize,
    },
    Cholesky {
        lower: bool,
    },
    Gemm {
        alpha_real: f64,
        alpha_imag: f64,
        beta: f64,
        dims: DotDimensionNumbers,
        algorithm: Option<i64>,
    },
    Conv {
        kind: ConvKind,
        window: Window,
        dims: ConvolutionDimensionNumbers,
        algorithm: i64,
        result_scale: f64,
        side_input_scale: f64,
        activation: ActivationMode,
    },
    BatchNorm {
        kind: BatchNormKind,
        epsilon: f32,
        feature_index: i64,
    },
    Infeed {
        config: String,
    },
    Outfeed {
        config: String,
    },
    AllToAll {
        split_dimension: Option<i64>,
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllGather {
        all_gather_dimension: i64,
        use_global_device_ids: bool,
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllReduce {
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllReduceStart {
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllReduceDone,
    ReduceScatter {
        scatter_dimension: i64,
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    CollectivePermute {
        source_target_pairs: Vec<(i64, i64)>,
        channel_id: Option<i64>,
    },
    RngGetAndUpdateState {
        delta: i64,
    },
    Fft {
        fft_type: FftType,
        fft_length: Vec<i64>,
    },
    TriangularSolve {
        options: TriangularSolveOptions,
    },
    While {
        trip_count: Option<i64>,
    },
    Case,
    ReplicaId,
    PartitionId,
}

impl OpKind {
    /// The name the operation prints under.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Unary(kind) => kind.mnemonic(),
            Self::Binary(kind) => kind.mnemonic(),
            Self::Compare { .. } => "compare",
            Self::Convert => "convert",
            Self::Copy => "copy",
            Self::Select => "select",
            Self::ConstantScalar { .. } => "constant",
            Self::Load => "load",
            Self::Store => "store",
            Self::Return => "return",
            Self::Terminator => "terminator",
            Self::Sort { .. } => "sort",
            Self::Fusion => "fusion",
            Self::Scatter { .. } => "scatter",
            Self::SelectAndScatter { .. } => "select_and_scatter",
            Self::CustomCall { .. } => "custom_call",
            Self::Cholesky { .. } => "cholesky",
            Self::Gemm { .. } => "gemm",
            Self::Conv { kind, .. } => kind.mnemonic(),
            Self::BatchNorm { kind, .. } => kind.mnemonic(),
            Self::Infeed { .. } => "infeed",
            Self::Outfeed { .. } => "outfeed",
            Self::AllToAll { .. } => "all_to_all",
            Self::AllGather { .. } => "all_gather",
            Self::AllReduce { .. } => "all_reduce",
            Self::AllReduceStart { .. } => "all_reduce_start",
            Self::AllReduceDone => "all_reduce_done",
            Self::ReduceScatter { .. } => "reduce_scatter",
            Self::CollectivePermute { .. } => "collective_permute",
            Self::RngGetAndUpdateState { .. } => "rng_get_and_update_state",
            Self::Fft { .. } => "fft",
            Self::TriangularSolve { .. } => "triangular_solve",
            Self::While { .. } => "while",
            Self::Case => "case",
            Self::ReplicaId => "replica_id",
            Self::PartitionId => "partition_id",
        }
    }
}

/// One operation: a kind, operand values, nested regions, and SSA results.
#[derive(Clone, Debug)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<Handle<Value>>,
    pub regions: Vec<Handle<Region>>,
    /// Number of SSA results; zero for buffer-level operations.
    pub num_results: u32,
    /// Name of the source instruction this was lowered from.
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics() {
        assert_eq!(OpKind::Fusion.mnemonic(), "fusion");
        assert_eq!(OpKind::Unary(UnaryKind::Sqrt).mnemonic(), "sqrt");
        assert_eq!(
            OpKind::Conv {
                kind: ConvKind::BackwardInput,
                window: Window::default(),
                dims: Default::default(),
                algorithm: 0,
                result_scale: 1.0,
                side_input_scale: 0.0,
                activation: ActivationMode::None,
            }
            .mnemonic(),
            "conv_backward_input"
        );
        assert_eq!(
            OpKind::BatchNorm {
                kind: BatchNormKind::Grad,
                epsilon: 1e-5,
                feature_index: 1
            }
            .mnemonic(),
            "batch_norm_grad"
        );
    }
}
