//! Attribute payloads carried by instructions.
//!
//! These mirror the structured attributes of the source graph: windows,
//! dimension-number bundles, replica groups, and the small enums used by
//! compare, FFT, and triangular-solve instructions.

/// One dimension of a sliding [`Window`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowDimension {
    pub size: i64,
    pub stride: i64,
    pub padding_low: i64,
    pub padding_high: i64,
    pub window_dilation: i64,
    pub base_dilation: i64,
}

impl Default for WindowDimension {
    fn default() -> Self {
        Self {
            size: 1,
            stride: 1,
            padding_low: 0,
            padding_high: 0,
            window_dilation: 1,
            base_dilation: 1,
        }
    }
}

/// A sliding window, one [`WindowDimension`] per spatial dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub dimensions: Vec<WindowDimension>,
}

impl Window {
    pub fn sizes(&self) -> Vec<i64> {
        self.dimensions.iter().map(|d| d.size).collect()
    }

    pub fn strides(&self) -> Vec<i64> {
        self.dimensions.iter().map(|d| d.stride).collect()
    }

    pub fn padding_low(&self) -> Vec<i64> {
        self.dimensions.iter().map(|d| d.padding_low).collect()
    }

    /// Returns `true` if any dimension dilates the window or its base.
    pub fn has_dilation(&self) -> bool {
        self.dimensions
            .iter()
            .any(|d| d.window_dilation != 1 || d.base_dilation != 1)
    }
}

/// Dimension numbers of a scatter instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScatterDimensionNumbers {
    pub update_window_dims: Vec<i64>,
    pub inserted_window_dims: Vec<i64>,
    pub scatter_dims_to_operand_dims: Vec<i64>,
    pub index_vector_dim: i64,
}

/// Dimension numbers of a convolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvolutionDimensionNumbers {
    pub input_batch_dimension: i64,
    pub input_feature_dimension: i64,
    pub input_spatial_dimensions: Vec<i64>,
    pub kernel_input_feature_dimension: i64,
    pub kernel_output_feature_dimension: i64,
    pub kernel_spatial_dimensions: Vec<i64>,
    pub output_batch_dimension: i64,
    pub output_feature_dimension: i64,
    pub output_spatial_dimensions: Vec<i64>,
}

/// Contraction and batch dimensions of a matrix product.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DotDimensionNumbers {
    pub lhs_contracting_dimensions: Vec<i64>,
    pub rhs_contracting_dimensions: Vec<i64>,
    pub lhs_batch_dimensions: Vec<i64>,
    pub rhs_batch_dimensions: Vec<i64>,
}

/// Participant grouping of a collective instruction.
///
/// An empty group list means all replicas participate together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaGroups {
    pub groups: Vec<Vec<i64>>,
}

/// Predicate of a compare instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonDirection {
    /// Uppercase spelling used in module text, e.g. `GE`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "EQ" => Self::Eq,
            "NE" => Self::Ne,
            "LT" => Self::Lt,
            "LE" => Self::Le,
            "GT" => Self::Gt,
            "GE" => Self::Ge,
            _ => return None,
        })
    }
}

/// Transform family of an FFT instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FftType {
    Fft,
    Ifft,
    Rfft,
    Irfft,
}

impl FftType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fft => "FFT",
            Self::Ifft => "IFFT",
            Self::Rfft => "RFFT",
            Self::Irfft => "IRFFT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "FFT" => Self::Fft,
            "IFFT" => Self::Ifft,
            "RFFT" => Self::Rfft,
            "IRFFT" => Self::Irfft,
            _ => return None,
        })
    }
}

/// How the `a` matrix of a triangular solve is transposed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transpose {
    #[default]
    NoTranspose,
    Transpose,
    Adjoint,
}

impl Transpose {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoTranspose => "NO_TRANSPOSE",
            Self::Transpose => "TRANSPOSE",
            Self::Adjoint => "ADJOINT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "NO_TRANSPOSE" => Self::NoTranspose,
            "TRANSPOSE" => Self::Transpose,
            "ADJOINT" => Self::Adjoint,
            _ => return None,
        })
    }
}

/// Options of a triangular-solve instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TriangularSolveOptions {
    pub left_side: bool,
    pub lower: bool,
    pub unit_diagonal: bool,
    pub transpose_a: Transpose,
}

/// Activation fused into a forward convolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActivationMode {
    #[default]
    None,
    Sigmoid,
    Relu,
    Relu6,
    Tanh,
}

impl ActivationMode {
    /// Decodes the wire encoding used by convolution backend configs.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Sigmoid,
            2 => Self::Relu,
            3 => Self::Relu6,
            4 => Self::Tanh,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::Relu6 => "relu6",
            Self::Tanh => "tanh",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_defaults_are_identity() {
        let dim = WindowDimension::default();
        assert_eq!(dim.size, 1);
        assert_eq!(dim.stride, 1);
        assert_eq!(dim.window_dilation, 1);
        let window = Window {
            dimensions: vec![dim],
        };
        assert!(!window.has_dilation());
    }

    #[test]
    fn window_projections() {
        let window = Window {
            dimensions: vec![
                WindowDimension {
                    size: 3,
                    stride: 2,
                    padding_low: 1,
                    ..Default::default()
                },
                WindowDimension {
                    size: 3,
                    stride: 2,
                    base_dilation: 2,
                    ..Default::default()
                },
            ],
        };
        assert_eq!(window.sizes(), vec![3, 3]);
        assert_eq!(window.strides(), vec![2, 2]);
        assert_eq!(window.padding_low(), vec![1, 0]);
        assert!(window.has_dilation());
    }

    #[test]
    fn comparison_direction_names() {
        assert_eq!(ComparisonDirection::from_name("GE"), Some(ComparisonDirection::Ge));
        assert_eq!(ComparisonDirection::Lt.name(), "LT");
        assert_eq!(ComparisonDirection::from_name("ge"), None);
    }

    #[test]
    fn activation_codes() {
        assert_eq!(ActivationMode::from_code(0), Some(ActivationMode::None));
        assert_eq!(ActivationMode::from_code(2), Some(ActivationMode::Relu));
        assert_eq!(ActivationMode::from_code(99), None);
    }
}
