use std::fmt;

use crate::tensor::ElementType;

pub mod attributes;
pub mod builder;
mod intermediate_representation;
pub mod load_onnx;
pub mod op;
pub mod scope;

pub use intermediate_representation::{BasicBlock, Function, ValueDef, ValueRecord};
pub use op::{Instruction, Param, Params};

/// Handle to a value produced by the IR builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

/// One axis of a tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    /// Unknown until run time, optionally tagged with the model's symbolic name.
    Dynamic(Option<String>),
}

impl Dim {
    pub fn dynamic() -> Self {
        Dim::Dynamic(None)
    }

    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dim::Static(v) => Some(*v),
            Dim::Dynamic(_) => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Static(v) => write!(f, "{v}"),
            Dim::Dynamic(Some(name)) => f.write_str(name),
            Dim::Dynamic(None) => f.write_str("?"),
        }
    }
}

/// Tensor type: element type plus shape, where the shape itself may be unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub element_type: ElementType,
    /// `None` when even the rank is unknown.
    pub shape: Option<Vec<Dim>>,
}

impl Type {
    pub fn new(element_type: ElementType, dims: Vec<Dim>) -> Self {
        Self {
            element_type,
            shape: Some(dims),
        }
    }

    pub fn scalar(element_type: ElementType) -> Self {
        Self::new(element_type, vec![])
    }

    pub fn with_static(element_type: ElementType, dims: &[usize]) -> Self {
        Self::new(element_type, dims.iter().map(|&d| Dim::Static(d)).collect())
    }

    pub fn unranked(element_type: ElementType) -> Self {
        Self {
            element_type,
            shape: None,
        }
    }

    /// Known rank with every axis dynamic.
    pub fn with_rank(element_type: ElementType, rank: usize) -> Self {
        Self::new(element_type, vec![Dim::dynamic(); rank])
    }

    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(Vec::len)
    }

    pub fn dims(&self) -> Option<&[Dim]> {
        self.shape.as_deref()
    }

    /// Concrete dimensions when every axis is static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.shape.as_ref()?.iter().map(Dim::as_static).collect()
    }

    pub fn with_element_type(&self, element_type: ElementType) -> Self {
        Self {
            element_type,
            shape: self.shape.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            None => write!(f, "{}[*]", self.element_type),
            Some(dims) => {
                let dims: Vec<String> = dims.iter().map(Dim::to_string).collect();
                write!(f, "{}[{}]", self.element_type, dims.join(","))
            }
        }
    }
}
