//! Scheduled instruction-graph representation.
//!
//! A [`HloModule`] holds computations whose instructions are already in
//! execution order, the form the buffer assigner and the lowering consume.
//! Instructions sit in a single module-wide arena, so a
//! [`Handle<Instruction>`](Handle) together with a [`ShapeIndex`] names one
//! buffer-backed leaf anywhere in the module.

pub mod arena;
mod attrs;
mod display;
mod error;
mod instr;
mod literal;
mod module;
mod shape;

pub use arena::{Arena, Handle};
pub use attrs::{
    ActivationMode, ComparisonDirection, ConvolutionDimensionNumbers, DotDimensionNumbers,
    FftType, ReplicaGroups, ScatterDimensionNumbers, Transpose, TriangularSolveOptions, Window,
    WindowDimension,
};
pub use display::dump_module;
pub use error::HloError;
pub use instr::{BinaryKind, ComputationRole, Instruction, Opcode, UnaryKind};
pub use literal::Literal;
pub use module::{sanitize_symbol_name, Computation, HloModule};
pub use shape::{ElementType, Layout, Shape, ShapeIndex};
