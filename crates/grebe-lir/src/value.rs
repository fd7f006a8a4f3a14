//! Values: views over storage, and the SSA values of arithmetic regions.

use grebe_hlo::{ElementType, Handle, Layout};

use crate::{Global, Operation, Region};

/// A value of a lowered function.
#[derive(Clone, Debug)]
pub enum Value {
    /// The function's byte-buffer argument number `index`.
    Argument { index: u32 },
    /// A reference to a module global.
    GlobalRef { global: Handle<Global> },
    /// A typed window of `base`, starting `offset` bytes in.
    ///
    /// `base` is always plain storage, an [`Value::Argument`] or a
    /// [`Value::GlobalRef`]; views never stack.
    View {
        base: Handle<Value>,
        offset: u64,
        element_type: ElementType,
        dims: Vec<i64>,
        layout: Layout,
    },
    /// An ordered pack of other values, mirroring a tuple shape.
    Tuple { elements: Vec<Handle<Value>> },
    /// The placeholder standing in for a token under the use-null policy.
    Null,
    /// Result `index` of an operation inside an arithmetic region.
    OpResult { op: Handle<Operation>, index: u32 },
    /// Argument `index` of an arithmetic region.
    RegionArg {
        region: Handle<Region>,
        index: u32,
        element_type: ElementType,
    },
}

impl Value {
    /// A short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Argument { .. } => "argument",
            Value::GlobalRef { .. } => "global",
            Value::View { .. } => "view",
            Value::Tuple { .. } => "tuple",
            Value::Null => "null",
            Value::OpResult { .. } => "op result",
            Value::RegionArg { .. } => "region argument",
        }
    }

    /// Returns `true` for the two plain-storage variants views can be based
    /// on.
    pub fn is_storage(&self) -> bool {
        matches!(self, Value::Argument { .. } | Value::GlobalRef { .. })
    }
}

/// Bytes covered by a view of `element_type` with the given dimensions.
pub(crate) fn view_byte_size(element_type: ElementType, dims: &[i64]) -> u64 {
    let count: u64 = dims.iter().map(|&d| d.max(0) as u64).product();
    count * element_type.byte_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_variants() {
        assert!(Value::Argument { index: 0 }.is_storage());
        assert!(!Value::Null.is_storage());
        assert_eq!(Value::Null.kind_name(), "null");
    }

    #[test]
    fn view_sizes() {
        assert_eq!(view_byte_size(ElementType::F32, &[16, 8]), 512);
        assert_eq!(view_byte_size(ElementType::Pred, &[]), 1);
        assert_eq!(view_byte_size(ElementType::S64, &[0]), 0);
    }
}
