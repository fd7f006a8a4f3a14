//! Constant literals: typed dense payloads stored as little-endian bytes.

use crate::shape::{ElementType, Shape};

/// A dense constant value.
///
/// The payload is stored in the shape's physical order as little-endian
/// bytes, so it can back a module global without conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    pub element_type: ElementType,
    pub dims: Vec<i64>,
    pub data: Vec<u8>,
}

impl Literal {
    /// A literal of `f32` elements.
    pub fn from_f32(values: &[f32], dims: Vec<i64>) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            element_type: ElementType::F32,
            dims,
            data,
        }
    }

    /// A literal of `s32` elements.
    pub fn from_i32(values: &[i32], dims: Vec<i64>) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            element_type: ElementType::S32,
            dims,
            data,
        }
    }

    /// A literal of `s64` elements.
    pub fn from_i64(values: &[i64], dims: Vec<i64>) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            element_type: ElementType::S64,
            dims,
            data,
        }
    }

    /// A literal of predicate elements, one byte each.
    pub fn from_pred(values: &[bool], dims: Vec<i64>) -> Self {
        Self {
            element_type: ElementType::Pred,
            dims,
            data: values.iter().map(|&b| b as u8).collect(),
        }
    }

    /// A rank-0 `f32` literal.
    pub fn scalar_f32(value: f32) -> Self {
        Self::from_f32(&[value], Vec::new())
    }

    /// A rank-0 `s32` literal.
    pub fn scalar_i32(value: i32) -> Self {
        Self::from_i32(&[value], Vec::new())
    }

    /// The array shape this literal populates.
    pub fn shape(&self) -> Shape {
        Shape::array(self.element_type, self.dims.clone())
    }

    /// Total payload size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Number of elements implied by the dimensions.
    pub fn element_count(&self) -> u64 {
        self.dims.iter().map(|&d| d.max(0) as u64).product()
    }

    /// Returns `true` if the payload length matches the shape.
    pub fn is_consistent(&self) -> bool {
        self.byte_size() == self.element_count() * self.element_type.byte_size()
    }

    /// Renders the elements as a flat comma-separated list, for dumps.
    pub fn format_elements(&self) -> String {
        let width = self.element_type.byte_size() as usize;
        let mut parts = Vec::new();
        for chunk in self.data.chunks_exact(width) {
            parts.push(format_element(self.element_type, chunk));
        }
        parts.join(", ")
    }
}

fn format_element(ty: ElementType, raw: &[u8]) -> String {
    // The chunk width is fixed by the caller, so the conversions cannot fail.
    let le8 = |raw: &[u8]| {
        let mut b = [0u8; 8];
        b[..raw.len()].copy_from_slice(raw);
        b
    };
    match ty {
        ElementType::Pred => if raw[0] != 0 { "true" } else { "false" }.to_string(),
        ElementType::S8 => (raw[0] as i8).to_string(),
        ElementType::U8 => raw[0].to_string(),
        ElementType::S16 => i16::from_le_bytes([raw[0], raw[1]]).to_string(),
        ElementType::U16 | ElementType::F16 | ElementType::Bf16 => {
            // Half-width floats are kept as raw bit patterns.
            format!("0x{:04x}", u16::from_le_bytes([raw[0], raw[1]]))
        }
        ElementType::S32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]).to_string(),
        ElementType::U32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]).to_string(),
        ElementType::S64 => i64::from_le_bytes(le8(raw)).to_string(),
        ElementType::U64 => u64::from_le_bytes(le8(raw)).to_string(),
        ElementType::F32 => {
            let v = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            format!("{v}")
        }
        ElementType::F64 => {
            let v = f64::from_le_bytes(le8(raw));
            format!("{v}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_payload_layout() {
        let lit = Literal::from_f32(&[1.0, 2.5], vec![2]);
        assert_eq!(lit.byte_size(), 8);
        assert_eq!(lit.element_count(), 2);
        assert!(lit.is_consistent());
        assert_eq!(lit.shape(), Shape::array(ElementType::F32, vec![2]));
    }

    #[test]
    fn scalar_literals() {
        let lit = Literal::scalar_i32(-7);
        assert_eq!(lit.dims, Vec::<i64>::new());
        assert_eq!(lit.data, (-7i32).to_le_bytes().to_vec());
        assert!(lit.is_consistent());
    }

    #[test]
    fn inconsistent_payload_detected() {
        let mut lit = Literal::from_i32(&[1, 2, 3], vec![3]);
        lit.data.pop();
        assert!(!lit.is_consistent());
    }

    #[test]
    fn element_formatting() {
        assert_eq!(Literal::from_f32(&[1.0, -0.5], vec![2]).format_elements(), "1, -0.5");
        assert_eq!(Literal::from_i32(&[3, -4], vec![2]).format_elements(), "3, -4");
        assert_eq!(
            Literal::from_pred(&[true, false], vec![2]).format_elements(),
            "true, false"
        );
    }
}
