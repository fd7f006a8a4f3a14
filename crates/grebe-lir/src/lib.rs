//! Buffer-level IR.
//!
//! Every array value here is a [`Value::View`]: an offset and a typed extent
//! over a byte buffer that is either a function argument or a module global.
//! Operations read and write views in place and produce SSA results only
//! inside arithmetic regions. Modules are produced through
//! [`builder::ModuleBuilder`], which checks view bounds and handle validity
//! at construction time.

pub mod builder;
mod display;
mod op;
mod value;

pub use builder::{BuilderError, FuncBuilder, InsertPoint, ModuleBuilder};
pub use display::dump_module;
pub use op::{BatchNormKind, ConvKind, OpKind, Operation};
pub use value::Value;

use grebe_hlo::{Arena, Handle};

/// What backs a module-level byte buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum GlobalKind {
    /// Uninitialized scratch memory.
    Scratch,
    /// Read-only memory initialized with `data`.
    Constant { data: Vec<u8> },
}

/// A module-level byte buffer with a symbol name.
#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub kind: GlobalKind,
}

/// A byte-buffer argument of a [`Function`].
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// A nested block of operations owned by one operation.
///
/// Control-flow regions have no arguments; arithmetic regions receive typed
/// scalar arguments.
#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    pub args: Vec<Handle<Value>>,
    pub body: Vec<Handle<Operation>>,
}

/// One lowered function.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub args: Vec<Argument>,
    pub values: Arena<Value>,
    pub ops: Arena<Operation>,
    pub regions: Arena<Region>,
    /// Top-level operations in execution order.
    pub body: Vec<Handle<Operation>>,
}

/// A lowered module: globals plus functions.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    pub globals: Arena<Global>,
    pub functions: Arena<Function>,
}
