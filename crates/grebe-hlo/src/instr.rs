//! Instructions and the opcode payload enum.

use crate::arena::Handle;
use crate::attrs::{
    ComparisonDirection, ConvolutionDimensionNumbers, FftType, ReplicaGroups,
    ScatterDimensionNumbers, TriangularSolveOptions, Window,
};
use crate::literal::Literal;
use crate::module::Computation;
use crate::shape::Shape;

/// Elementwise operations of one operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryKind {
    Abs,
    Ceil,
    Cos,
    Exp,
    Floor,
    Log,
    Negate,
    Not,
    Rsqrt,
    Sign,
    Sin,
    Sqrt,
    Tanh,
}

impl UnaryKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Ceil => "ceil",
            Self::Cos => "cosine",
            Self::Exp => "exponential",
            Self::Floor => "floor",
            Self::Log => "log",
            Self::Negate => "negate",
            Self::Not => "not",
            Self::Rsqrt => "rsqrt",
            Self::Sign => "sign",
            Self::Sin => "sine",
            Self::Sqrt => "sqrt",
            Self::Tanh => "tanh",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "ceil" => Self::Ceil,
            "cosine" => Self::Cos,
            "exponential" => Self::Exp,
            "floor" => Self::Floor,
            "log" => Self::Log,
            "negate" => Self::Negate,
            "not" => Self::Not,
            "rsqrt" => Self::Rsqrt,
            "sign" => Self::Sign,
            "sine" => Self::Sin,
            "sqrt" => Self::Sqrt,
            "tanh" => Self::Tanh,
            _ => return None,
        })
    }
}

/// Elementwise operations of two operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    And,
    Divide,
    Maximum,
    Minimum,
    Multiply,
    Or,
    Power,
    Remainder,
    Subtract,
    Xor,
}

impl BinaryKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::And => "and",
            Self::Divide => "divide",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Multiply => "multiply",
            Self::Or => "or",
            Self::Power => "power",
            Self::Remainder => "remainder",
            Self::Subtract => "subtract",
            Self::Xor => "xor",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Some(match name {
            "add" => Self::Add,
            "and" => Self::And,
            "divide" => Self::Divide,
            "maximum" => Self::Maximum,
            "minimum" => Self::Minimum,
            "multiply" => Self::Multiply,
            "or" => Self::Or,
            "power" => Self::Power,
            "remainder" => Self::Remainder,
            "subtract" => Self::Subtract,
            "xor" => Self::Xor,
            _ => return None,
        })
    }
}

/// How a caller consumes one of its nested computations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputationRole {
    /// Pure arithmetic applied per element or per comparison, e.g. a sort
    /// comparator or a reduction body. Its instructions never own buffers.
    Arithmetic,
    /// A computation whose body reads and writes buffers, i.e. a while
    /// condition/body or a case branch.
    ControlFlow,
    /// The body of a fusion, inlined over the fusion's own operand buffers.
    Fused,
}

/// The opcode of an [`Instruction`], with its attribute payload.
///
/// One variant per source opcode keeps dispatch to a single `match` and lets
/// each handler destructure exactly the attributes it needs.
#[derive(Clone, Debug, PartialEq)]
pub enum Opcode {
    Parameter {
        number: usize,
    },
    Constant {
        literal: Literal,
    },
    Unary(UnaryKind),
    Binary(BinaryKind),
    Compare {
        direction: ComparisonDirection,
    },
    Convert,
    Copy,
    Select,
    Tuple,
    GetTupleElement {
        index: usize,
    },
    Bitcast,
    AfterAll,
    AddDependency,
    ReplicaId,
    PartitionId,
    Sort {
        dimension: i64,
        is_stable: bool,
        comparator: Handle<Computation>,
    },
    Fusion {
        fused: Handle<Computation>,
    },
    Scatter {
        dims: ScatterDimensionNumbers,
        indices_are_sorted: bool,
        unique_indices: bool,
        update: Handle<Computation>,
    },
    SelectAndScatter {
        window: Window,
        select: Handle<Computation>,
        scatter: Handle<Computation>,
    },
    CustomCall {
        target: String,
        backend_config: Vec<u8>,
        window: Option<Window>,
        conv_dims: Option<ConvolutionDimensionNumbers>,
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
        reduction: Handle<Computation>,
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllReduceStart {
        reduction: Handle<Computation>,
        replica_groups: ReplicaGroups,
        channel_id: Option<i64>,
    },
    AllReduceDone,
    ReduceScatter {
        scatter_dimension: i64,
        reduction: Handle<Computation>,
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
        condition: Handle<Computation>,
        body: Handle<Computation>,
        trip_count: Option<i64>,
    },
    Case {
        branches: Vec<Handle<Computation>>,
    },
    // Opcodes below are representable and parseable but have no buffer
    // lowering; they are expected to be fused or rewritten before that point.
    Broadcast {
        dimensions: Vec<i64>,
    },
    Reshape,
    Transpose {
        permutation: Vec<i64>,
    },
    Iota {
        iota_dimension: i64,
    },
    Reduce {
        dimensions: Vec<i64>,
        reduction: Handle<Computation>,
    },
}

impl Opcode {
    /// The opcode keyword, as spelled in module text.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Parameter { .. } => "parameter",
            Self::Constant { .. } => "constant",
            Self::Unary(kind) => kind.mnemonic(),
            Self::Binary(kind) => kind.mnemonic(),
            Self::Compare { .. } => "compare",
            Self::Convert => "convert",
            Self::Copy => "copy",
            Self::Select => "select",
            Self::Tuple => "tuple",
            Self::GetTupleElement { .. } => "get-tuple-element",
            Self::Bitcast => "bitcast",
            Self::AfterAll => "after-all",
            Self::AddDependency => "add-dependency",
            Self::ReplicaId => "replica-id",
            Self::PartitionId => "partition-id",
            Self::Sort { .. } => "sort",
            Self::Fusion { .. } => "fusion",
            Self::Scatter { .. } => "scatter",
            Self::SelectAndScatter { .. } => "select-and-scatter",
            Self::CustomCall { .. } => "custom-call",
            Self::Infeed { .. } => "infeed",
            Self::Outfeed { .. } => "outfeed",
            Self::AllToAll { .. } => "all-to-all",
            Self::AllGather { .. } => "all-gather",
            Self::AllReduce { .. } => "all-reduce",
            Self::AllReduceStart { .. } => "all-reduce-start",
            Self::AllReduceDone => "all-reduce-done",
            Self::ReduceScatter { .. } => "reduce-scatter",
            Self::CollectivePermute { .. } => "collective-permute",
            Self::RngGetAndUpdateState { .. } => "rng-get-and-update-state",
            Self::Fft { .. } => "fft",
            Self::TriangularSolve { .. } => "triangular-solve",
            Self::While { .. } => "while",
            Self::Case { .. } => "conditional",
            Self::Broadcast { .. } => "broadcast",
            Self::Reshape => "reshape",
            Self::Transpose { .. } => "transpose",
            Self::Iota { .. } => "iota",
            Self::Reduce { .. } => "reduce",
        }
    }

    /// Returns `true` for the simple elementwise family, compare and select
    /// included.
    pub fn is_elementwise(&self) -> bool {
        matches!(
            self,
            Self::Unary(_)
                | Self::Binary(_)
                | Self::Compare { .. }
                | Self::Convert
                | Self::Copy
                | Self::Select
        )
    }

    /// Nested computations this opcode calls, each with its role.
    pub fn called_computations(&self) -> Vec<(ComputationRole, Handle<Computation>)> {
        match self {
            Self::Sort { comparator, .. } => vec![(ComputationRole::Arithmetic, *comparator)],
            Self::Fusion { fused } => vec![(ComputationRole::Fused, *fused)],
            Self::Scatter { update, .. } => vec![(ComputationRole::Arithmetic, *update)],
            Self::SelectAndScatter {
                select, scatter, ..
            } => vec![
                (ComputationRole::Arithmetic, *select),
                (ComputationRole::Arithmetic, *scatter),
            ],
            Self::AllReduce { reduction, .. }
            | Self::AllReduceStart { reduction, .. }
            | Self::ReduceScatter { reduction, .. }
            | Self::Reduce { reduction, .. } => {
                vec![(ComputationRole::Arithmetic, *reduction)]
            }
            Self::While {
                condition, body, ..
            } => vec![
                (ComputationRole::ControlFlow, *condition),
                (ComputationRole::ControlFlow, *body),
            ],
            Self::Case { branches } => branches
                .iter()
                .map(|&b| (ComputationRole::ControlFlow, b))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if the opcode itself interacts with the outside world
    /// and must survive dead-code elimination.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Self::Infeed { .. }
                | Self::Outfeed { .. }
                | Self::AllToAll { .. }
                | Self::AllGather { .. }
                | Self::AllReduce { .. }
                | Self::AllReduceStart { .. }
                | Self::AllReduceDone
                | Self::ReduceScatter { .. }
                | Self::CollectivePermute { .. }
                | Self::RngGetAndUpdateState { .. }
                | Self::CustomCall { .. }
        )
    }
}

/// One node of the instruction graph.
#[derive(Clone, Debug)]
pub struct Instruction {
    /// Unique name within the module, e.g. `add.3`.
    pub name: String,
    pub opcode: Opcode,
    /// Result shape.
    pub shape: Shape,
    /// Data operands in source order. Nested computations are attributes of
    /// the opcode, not operands.
    pub operands: Vec<Handle<Instruction>>,
}

impl Instruction {
    pub fn new(
        name: impl Into<String>,
        opcode: Opcode,
        shape: Shape,
        operands: Vec<Handle<Instruction>>,
    ) -> Self {
        Self {
            name: name.into(),
            opcode,
            shape,
            operands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::Tuple.mnemonic(), "tuple");
        assert_eq!(Opcode::Unary(UnaryKind::Rsqrt).mnemonic(), "rsqrt");
        assert_eq!(Opcode::Binary(BinaryKind::Power).mnemonic(), "power");
        assert_eq!(Opcode::AllReduceDone.mnemonic(), "all-reduce-done");
        assert_eq!(UnaryKind::from_mnemonic("cosine"), Some(UnaryKind::Cos));
        assert_eq!(BinaryKind::from_mnemonic("select"), None);
    }

    #[test]
    fn called_computation_roles() {
        let mut comps: Arena<Computation> = Arena::new();
        let cmp = comps.append(Computation::empty("cmp"));
        let body = comps.append(Computation::empty("body"));

        let sort = Opcode::Sort {
            dimension: 0,
            is_stable: false,
            comparator: cmp,
        };
        assert_eq!(
            sort.called_computations(),
            vec![(ComputationRole::Arithmetic, cmp)]
        );

        let case = Opcode::Case {
            branches: vec![cmp, body],
        };
        let called = case.called_computations();
        assert!(called.iter().all(|(role, _)| *role == ComputationRole::ControlFlow));
        assert_eq!(called.len(), 2);

        assert!(Opcode::Tuple.called_computations().is_empty());
    }

    #[test]
    fn side_effect_classification() {
        assert!(Opcode::Infeed {
            config: String::new()
        }
        .has_side_effects());
        assert!(Opcode::AllReduceDone.has_side_effects());
        assert!(!Opcode::Binary(BinaryKind::Add).has_side_effects());
        assert!(!Opcode::Tuple.has_side_effects());
    }

    #[test]
    fn elementwise_family() {
        assert!(Opcode::Select.is_elementwise());
        assert!(Opcode::Compare {
            direction: ComparisonDirection::Lt
        }
        .is_elementwise());
        assert!(!Opcode::Bitcast.is_elementwise());
        assert!(!Opcode::Reshape.is_elementwise());
    }
}
