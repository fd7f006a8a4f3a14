//! Checked construction of modules and functions.

use std::collections::HashSet;

use grebe_hlo::{ElementType, Handle, Layout};

use crate::value::view_byte_size;
use crate::{Argument, Function, Global, GlobalKind, Module, OpKind, Operation, Region, Value};

/// Errors raised by the builders.
///
/// A builder error means the lowering tried to construct something
/// inconsistent; it aborts the lowering that caused it.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("duplicate global symbol '{name}'")]
    DuplicateGlobal { name: String },

    #[error("unknown global handle {handle}")]
    UnknownGlobal { handle: String },

    #[error("unknown value handle {handle}")]
    UnknownValue { handle: String },

    #[error("unknown region handle {handle}")]
    UnknownRegion { handle: String },

    #[error("view base must be an argument or a global, got a {kind}")]
    BadViewBase { kind: &'static str },

    #[error("view [{offset}, {end}) exceeds its {size} byte base")]
    ViewOutOfBounds { offset: u64, end: u64, size: u64 },
}

/// Where a [`FuncBuilder`] currently appends operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    /// The function's top-level body.
    Body,
    /// The body of a nested region.
    Region(Handle<Region>),
}

/// Builds a [`Module`], owning it until [`ModuleBuilder::finish`].
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
    symbols: HashSet<String>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module {
                name: name.into(),
                ..Module::default()
            },
            symbols: HashSet::new(),
        }
    }

    /// Declares an uninitialized module buffer of `size` bytes.
    pub fn declare_scratch_global(
        &mut self,
        name: &str,
        size: u64,
    ) -> Result<Handle<Global>, BuilderError> {
        self.declare_global(name, size, GlobalKind::Scratch)
    }

    /// Declares a read-only module buffer holding `data`.
    pub fn declare_constant_global(
        &mut self,
        name: &str,
        data: Vec<u8>,
    ) -> Result<Handle<Global>, BuilderError> {
        let size = data.len() as u64;
        self.declare_global(name, size, GlobalKind::Constant { data })
    }

    fn declare_global(
        &mut self,
        name: &str,
        size: u64,
        kind: GlobalKind,
    ) -> Result<Handle<Global>, BuilderError> {
        if !self.symbols.insert(name.to_string()) {
            return Err(BuilderError::DuplicateGlobal {
                name: name.to_string(),
            });
        }
        Ok(self.module.globals.append(Global {
            name: name.to_string(),
            size,
            kind,
        }))
    }

    /// The global behind a handle, if valid.
    pub fn global(&self, handle: Handle<Global>) -> Option<&Global> {
        self.module.globals.try_get(handle)
    }

    /// Finishes the module.
    pub fn finish(self) -> Module {
        self.module
    }
}

/// Builds one [`Function`] inside a [`ModuleBuilder`].
///
/// The function is committed to the module only by [`FuncBuilder::finish`];
/// dropping the builder on an error path leaves the module without it.
#[derive(Debug)]
pub struct FuncBuilder<'m> {
    module: &'m mut ModuleBuilder,
    func: Function,
    point: InsertPoint,
}

impl<'m> FuncBuilder<'m> {
    pub fn new(module: &'m mut ModuleBuilder, name: impl Into<String>) -> Self {
        Self {
            module,
            func: Function {
                name: name.into(),
                args: Vec::new(),
                values: grebe_hlo::Arena::new(),
                ops: grebe_hlo::Arena::new(),
                regions: grebe_hlo::Arena::new(),
                body: Vec::new(),
            },
            point: InsertPoint::Body,
        }
    }

    /// Access to the surrounding module builder, for declaring globals
    /// mid-function.
    pub fn module(&mut self) -> &mut ModuleBuilder {
        self.module
    }

    /// Appends a byte-buffer argument and returns its value.
    pub fn declare_argument(&mut self, name: &str, size: u64) -> Handle<Value> {
        let index = self.func.args.len() as u32;
        self.func.args.push(Argument {
            name: name.to_string(),
            size,
        });
        self.func.values.append(Value::Argument { index })
    }

    /// Returns a value referring to a module global.
    pub fn global_ref(&mut self, global: Handle<Global>) -> Result<Handle<Value>, BuilderError> {
        if self.module.global(global).is_none() {
            return Err(BuilderError::UnknownGlobal {
                handle: format!("{global:?}"),
            });
        }
        Ok(self.func.values.append(Value::GlobalRef { global }))
    }

    /// Creates a typed view of plain storage, checking its byte range.
    pub fn create_view(
        &mut self,
        base: Handle<Value>,
        offset: u64,
        element_type: ElementType,
        dims: Vec<i64>,
        layout: Layout,
    ) -> Result<Handle<Value>, BuilderError> {
        let base_size = match self.func.values.try_get(base) {
            None => {
                return Err(BuilderError::UnknownValue {
                    handle: format!("{base:?}"),
                })
            }
            Some(Value::Argument { index }) => self.func.args[*index as usize].size,
            Some(Value::GlobalRef { global }) => match self.module.global(*global) {
                Some(g) => g.size,
                None => {
                    return Err(BuilderError::UnknownGlobal {
                        handle: format!("{global:?}"),
                    })
                }
            },
            Some(other) => {
                return Err(BuilderError::BadViewBase {
                    kind: other.kind_name(),
                })
            }
        };

        let end = offset.saturating_add(view_byte_size(element_type, &dims));
        if end > base_size {
            return Err(BuilderError::ViewOutOfBounds {
                offset,
                end,
                size: base_size,
            });
        }

        Ok(self.func.values.append(Value::View {
            base,
            offset,
            element_type,
            dims,
            layout,
        }))
    }

    /// Packs values into a tuple value.
    pub fn create_tuple(
        &mut self,
        elements: Vec<Handle<Value>>,
    ) -> Result<Handle<Value>, BuilderError> {
        for &element in &elements {
            self.check_value(element)?;
        }
        Ok(self.func.values.append(Value::Tuple { elements }))
    }

    /// The token placeholder.
    pub fn null_value(&mut self) -> Handle<Value> {
        self.func.values.append(Value::Null)
    }

    /// Creates an empty region.
    pub fn create_region(&mut self, name: impl Into<String>) -> Handle<Region> {
        self.func.regions.append(Region {
            name: name.into(),
            args: Vec::new(),
            body: Vec::new(),
        })
    }

    /// Appends a typed argument to an arithmetic region.
    pub fn add_region_arg(
        &mut self,
        region: Handle<Region>,
        element_type: ElementType,
    ) -> Result<Handle<Value>, BuilderError> {
        if self.func.regions.try_get(region).is_none() {
            return Err(BuilderError::UnknownRegion {
                handle: format!("{region:?}"),
            });
        }
        let index = self.func.regions[region].args.len() as u32;
        let value = self.func.values.append(Value::RegionArg {
            region,
            index,
            element_type,
        });
        self.func.regions[region].args.push(value);
        Ok(value)
    }

    /// The current insertion point.
    pub fn insertion_point(&self) -> InsertPoint {
        self.point
    }

    /// Moves the insertion point. Callers save the previous point and
    /// restore it when the nested block is complete.
    pub fn set_insertion_point(&mut self, point: InsertPoint) {
        self.point = point;
    }

    /// Appends an operation at the insertion point and creates its SSA
    /// results.
    pub fn push(
        &mut self,
        kind: OpKind,
        operands: Vec<Handle<Value>>,
        regions: Vec<Handle<Region>>,
        num_results: u32,
        label: &str,
    ) -> Result<(Handle<Operation>, Vec<Handle<Value>>), BuilderError> {
        for &operand in &operands {
            self.check_value(operand)?;
        }
        for &region in &regions {
            if self.func.regions.try_get(region).is_none() {
                return Err(BuilderError::UnknownRegion {
                    handle: format!("{region:?}"),
                });
            }
        }

        let op = self.func.ops.append(Operation {
            kind,
            operands,
            regions,
            num_results,
            label: label.to_string(),
        });
        match self.point {
            InsertPoint::Body => self.func.body.push(op),
            InsertPoint::Region(region) => self.func.regions[region].body.push(op),
        }

        let results = (0..num_results)
            .map(|index| self.func.values.append(Value::OpResult { op, index }))
            .collect();
        Ok((op, results))
    }

    fn check_value(&self, handle: Handle<Value>) -> Result<(), BuilderError> {
        if self.func.values.try_get(handle).is_none() {
            return Err(BuilderError::UnknownValue {
                handle: format!("{handle:?}"),
            });
        }
        Ok(())
    }

    /// The value behind a handle created by this builder.
    pub fn value(&self, handle: Handle<Value>) -> &Value {
        &self.func.values[handle]
    }

    /// Number of values created so far.
    pub fn value_count(&self) -> usize {
        self.func.values.len()
    }

    /// Number of operations created so far.
    pub fn op_count(&self) -> usize {
        self.func.ops.len()
    }

    /// Commits the function to the module.
    pub fn finish(self) -> Handle<Function> {
        self.module.module.functions.append(self.func)
    }
}
