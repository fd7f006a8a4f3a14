//! Library-call configuration messages via prost derive.
//!
//! Recognized custom-call targets carry a serialized configuration blob in
//! their backend-config bytes. The message shapes are hand-defined; field
//! tags match the backend's wire format. An empty blob decodes to the
//! message defaults.

use prost::Message;

use crate::LowerError;

/// Configuration of a `__solver$cholesky` call.
#[derive(Clone, PartialEq, Message)]
pub struct CholeskyConfig {
    /// Factor the lower triangle instead of the upper one.
    #[prost(bool, tag = "1")]
    pub lower: bool,
}

/// Contraction and batch dimensions, wire form.
#[derive(Clone, PartialEq, Message)]
pub struct DotDimensionNumbersProto {
    #[prost(int64, repeated, tag = "1")]
    pub lhs_contracting_dimensions: Vec<i64>,
    #[prost(int64, repeated, tag = "2")]
    pub rhs_contracting_dimensions: Vec<i64>,
    #[prost(int64, repeated, tag = "3")]
    pub lhs_batch_dimensions: Vec<i64>,
    #[prost(int64, repeated, tag = "4")]
    pub rhs_batch_dimensions: Vec<i64>,
}

impl From<DotDimensionNumbersProto> for grebe_hlo::DotDimensionNumbers {
    fn from(proto: DotDimensionNumbersProto) -> Self {
        Self {
            lhs_contracting_dimensions: proto.lhs_contracting_dimensions,
            rhs_contracting_dimensions: proto.rhs_contracting_dimensions,
            lhs_batch_dimensions: proto.lhs_batch_dimensions,
            rhs_batch_dimensions: proto.rhs_batch_dimensions,
        }
    }
}

/// Configuration of a `__blas$gemm` call.
#[derive(Clone, PartialEq, Message)]
pub struct GemmConfig {
    #[prost(double, tag = "1")]
    pub alpha_real: f64,
    #[prost(double, tag = "2")]
    pub alpha_imag: f64,
    #[prost(double, tag = "3")]
    pub beta: f64,
    #[prost(message, optional, tag = "4")]
    pub dot_dimension_numbers: Option<DotDimensionNumbersProto>,
    /// Algorithm picked by autotuning, absent if none was selected.
    #[prost(int64, optional, tag = "5")]
    pub selected_algorithm: Option<i64>,
    /// Per-operand precision codes. Decoded for wire compatibility; the
    /// generic platform computes at storage precision.
    #[prost(int32, repeated, tag = "6")]
    pub precision: Vec<i32>,
}

/// Configuration of the `__dnn$conv_*` calls.
#[derive(Clone, PartialEq, Message)]
pub struct ConvConfig {
    #[prost(int64, tag = "1")]
    pub algorithm: i64,
    #[prost(double, tag = "2")]
    pub conv_result_scale: f64,
    #[prost(double, tag = "3")]
    pub side_input_scale: f64,
    /// Wire encoding of [`grebe_hlo::ActivationMode`].
    #[prost(int32, tag = "4")]
    pub activation_mode: i32,
}

/// Configuration of the `__dnn$batch_norm_*` calls.
#[derive(Clone, PartialEq, Message)]
pub struct BatchNormConfig {
    #[prost(float, tag = "1")]
    pub epsilon: f32,
    #[prost(int64, tag = "2")]
    pub feature_index: i64,
}

/// Decodes a configuration blob, naming the target on failure.
pub(crate) fn decode_config<M: Message + Default>(
    target: &str,
    bytes: &[u8],
) -> Result<M, LowerError> {
    M::decode(bytes).map_err(|source| LowerError::BadBackendConfig {
        target: target.to_string(),
        source,
    })
}
