use std::fmt;

use half::{bf16, f16};

pub mod materialize;
pub mod shape;
#[allow(clippy::module_inception)]
pub mod tensor;

pub use shape::Shape;
pub use tensor::Tensor;

/// Element types the IR understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F16,
    BF16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
}

impl ElementType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 | ElementType::Bool => 1,
            ElementType::F16 | ElementType::BF16 | ElementType::I16 | ElementType::U16 => 2,
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::F64 | ElementType::I64 | ElementType::U64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            ElementType::F16 | ElementType::BF16 | ElementType::F32 | ElementType::F64
        )
    }

    pub fn is_integer(self) -> bool {
        !self.is_float() && self != ElementType::Bool
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
            ElementType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Typed tensor of any supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F16(Tensor<f16>),
    BF16(Tensor<bf16>),
    F32(Tensor<f32>),
    F64(Tensor<f64>),
    I8(Tensor<i8>),
    I16(Tensor<i16>),
    I32(Tensor<i32>),
    I64(Tensor<i64>),
    U8(Tensor<u8>),
    U16(Tensor<u16>),
    U32(Tensor<u32>),
    U64(Tensor<u64>),
    Bool(Tensor<bool>),
}

macro_rules! for_each_variant {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            TensorData::F16($t) => $body,
            TensorData::BF16($t) => $body,
            TensorData::F32($t) => $body,
            TensorData::F64($t) => $body,
            TensorData::I8($t) => $body,
            TensorData::I16($t) => $body,
            TensorData::I32($t) => $body,
            TensorData::I64($t) => $body,
            TensorData::U8($t) => $body,
            TensorData::U16($t) => $body,
            TensorData::U32($t) => $body,
            TensorData::U64($t) => $body,
            TensorData::Bool($t) => $body,
        }
    };
}

impl TensorData {
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F16(_) => ElementType::F16,
            TensorData::BF16(_) => ElementType::BF16,
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
            TensorData::I8(_) => ElementType::I8,
            TensorData::I16(_) => ElementType::I16,
            TensorData::I32(_) => ElementType::I32,
            TensorData::I64(_) => ElementType::I64,
            TensorData::U8(_) => ElementType::U8,
            TensorData::U16(_) => ElementType::U16,
            TensorData::U32(_) => ElementType::U32,
            TensorData::U64(_) => ElementType::U64,
            TensorData::Bool(_) => ElementType::Bool,
        }
    }

    pub fn shape(&self) -> &Shape {
        for_each_variant!(self, t => t.shape())
    }

    pub fn len(&self) -> usize {
        self.shape().volume()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values widened to i64, for integer and bool tensors only.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        let values = match self {
            TensorData::I8(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::I16(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::I32(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::I64(t) => t.data().to_vec(),
            TensorData::U8(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::U16(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::U32(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::U64(t) => t.data().iter().map(|&v| v as i64).collect(),
            TensorData::Bool(t) => t.data().iter().map(|&v| v as i64).collect(),
            _ => return None,
        };
        Some(values)
    }

    /// Values converted to f64, for every element type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TensorData::F16(t) => t.data().iter().map(|v| v.to_f64()).collect(),
            TensorData::BF16(t) => t.data().iter().map(|v| v.to_f64()).collect(),
            TensorData::F32(t) => t.data().iter().map(|&v| v as f64).collect(),
            TensorData::F64(t) => t.data().to_vec(),
            other => other
                .to_i64_vec()
                .unwrap_or_default()
                .into_iter()
                .map(|v| v as f64)
                .collect(),
        }
    }
}

impl fmt::Display for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.element_type(), self.shape())
    }
}
