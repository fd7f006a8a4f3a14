//! Shapes: element types, layouts, and the array/tuple/token shape tree.

/// Primitive element type of an array shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    /// Boolean predicate, stored one byte per element.
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn byte_size(self) -> u64 {
        match self {
            Self::Pred | Self::S8 | Self::U8 => 1,
            Self::S16 | Self::U16 | Self::F16 | Self::Bf16 => 2,
            Self::S32 | Self::U32 | Self::F32 => 4,
            Self::S64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// The lowercase type keyword, as spelled in module text.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F16 => "f16",
            Self::Bf16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Parses a type keyword. Returns `None` for anything unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "pred" => Self::Pred,
            "s8" => Self::S8,
            "s16" => Self::S16,
            "s32" => Self::S32,
            "s64" => Self::S64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f16" => Self::F16,
            "bf16" => Self::Bf16,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }

    /// Returns `true` for the floating-point types.
    pub fn is_floating(self) -> bool {
        matches!(self, Self::F16 | Self::Bf16 | Self::F32 | Self::F64)
    }
}

/// Physical dimension order of an array, minor dimension first.
///
/// `Layout::descending(2)` is `{1,0}`, the row-major default for rank 2.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub minor_to_major: Vec<i64>,
}

impl Layout {
    /// The default layout for `rank` dimensions: `{rank-1, ..., 1, 0}`.
    pub fn descending(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank as i64).rev().collect(),
        }
    }

    /// Returns `true` if this is the default layout for its rank.
    pub fn is_descending(&self) -> bool {
        *self == Self::descending(self.minor_to_major.len())
    }
}

/// A path from a shape root to one of its sub-shapes.
///
/// Each step selects a tuple element; the empty index names the shape itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeIndex(pub Vec<usize>);

impl ShapeIndex {
    /// The empty index, naming the whole shape.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds an index out of tuple-element steps.
    pub fn from_steps(steps: &[usize]) -> Self {
        Self(steps.to_vec())
    }

    /// Returns `true` if this index names the shape root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy of this index with one more step appended.
    pub fn child(&self, step: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

/// The shape of an instruction result or operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A dense array of `element_type` elements.
    Array {
        element_type: ElementType,
        dims: Vec<i64>,
        layout: Layout,
    },
    /// An ordered product of sub-shapes.
    Tuple(Vec<Shape>),
    /// An ordering token. Tokens occupy no storage.
    Token,
}

impl Shape {
    /// An array shape with the default descending layout.
    pub fn array(element_type: ElementType, dims: Vec<i64>) -> Self {
        let layout = Layout::descending(dims.len());
        Self::Array {
            element_type,
            dims,
            layout,
        }
    }

    /// A rank-0 array.
    pub fn scalar(element_type: ElementType) -> Self {
        Self::array(element_type, Vec::new())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token)
    }

    /// Number of elements of an array shape; zero for tuples and tokens.
    pub fn element_count(&self) -> u64 {
        match self {
            Self::Array { dims, .. } => dims.iter().map(|&d| d.max(0) as u64).product(),
            _ => 0,
        }
    }

    /// Bytes of storage behind this shape. Tuples sum their leaves, tokens
    /// take none.
    pub fn byte_size(&self) -> u64 {
        match self {
            Self::Array { element_type, .. } => element_type.byte_size() * self.element_count(),
            Self::Tuple(elements) => elements.iter().map(Shape::byte_size).sum(),
            Self::Token => 0,
        }
    }

    /// Resolves a [`ShapeIndex`] against this shape.
    pub fn sub_shape(&self, index: &ShapeIndex) -> Option<&Shape> {
        let mut shape = self;
        for &step in &index.0 {
            match shape {
                Self::Tuple(elements) => shape = elements.get(step)?,
                _ => return None,
            }
        }
        Some(shape)
    }

    /// All non-tuple sub-shapes paired with their indices, in tuple order.
    ///
    /// An array or token shape yields itself under the root index.
    pub fn leaves(&self) -> Vec<(ShapeIndex, &Shape)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'s>(
        &'s self,
        prefix: &mut Vec<usize>,
        out: &mut Vec<(ShapeIndex, &'s Shape)>,
    ) {
        match self {
            Self::Tuple(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    prefix.push(i);
                    element.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
            _ => out.push((ShapeIndex(prefix.clone()), self)),
        }
    }

    /// Number of leaves reported by [`Shape::leaves`].
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Tuple(elements) => elements.iter().map(Shape::leaf_count).sum(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes() {
        assert_eq!(ElementType::Pred.byte_size(), 1);
        assert_eq!(ElementType::Bf16.byte_size(), 2);
        assert_eq!(ElementType::F32.byte_size(), 4);
        assert_eq!(ElementType::S64.byte_size(), 8);
    }

    #[test]
    fn element_names_round_trip() {
        for ty in [ElementType::Pred, ElementType::S32, ElementType::F64] {
            assert_eq!(ElementType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(ElementType::from_name("c64"), None);
    }

    #[test]
    fn default_layout_is_descending() {
        let layout = Layout::descending(3);
        assert_eq!(layout.minor_to_major, vec![2, 1, 0]);
        assert!(layout.is_descending());
        let transposed = Layout {
            minor_to_major: vec![0, 1],
        };
        assert!(!transposed.is_descending());
    }

    #[test]
    fn array_byte_size() {
        let shape = Shape::array(ElementType::F32, vec![16, 8]);
        assert_eq!(shape.element_count(), 128);
        assert_eq!(shape.byte_size(), 512);
        assert_eq!(Shape::scalar(ElementType::S64).byte_size(), 8);
        assert_eq!(Shape::Token.byte_size(), 0);
    }

    #[test]
    fn tuple_leaves_in_order() {
        let shape = Shape::Tuple(vec![
            Shape::array(ElementType::F32, vec![4]),
            Shape::Tuple(vec![Shape::array(ElementType::S32, vec![2]), Shape::Token]),
        ]);
        let leaves = shape.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0].0, ShapeIndex::from_steps(&[0]));
        assert_eq!(leaves[1].0, ShapeIndex::from_steps(&[1, 0]));
        assert_eq!(leaves[2].0, ShapeIndex::from_steps(&[1, 1]));
        assert!(leaves[2].1.is_token());
        assert_eq!(shape.leaf_count(), 3);
    }

    #[test]
    fn sub_shape_resolution() {
        let inner = Shape::array(ElementType::U8, vec![3]);
        let shape = Shape::Tuple(vec![Shape::Token, inner.clone()]);
        assert_eq!(shape.sub_shape(&ShapeIndex::from_steps(&[1])), Some(&inner));
        assert_eq!(shape.sub_shape(&ShapeIndex::from_steps(&[2])), None);
        assert_eq!(shape.sub_shape(&ShapeIndex::root()), Some(&shape));
        assert_eq!(inner.sub_shape(&ShapeIndex::from_steps(&[0])), None);
    }
}
