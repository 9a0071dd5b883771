use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Represents the shape of a tensor
pub struct Shape {
    pub(crate) dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Shape {
    /// Instantiates a new shape (computes stride values at this point)
    pub fn new(dims: Vec<usize>) -> Self {
        Self {
            strides: compute_strides(&dims),
            dims,
        }
    }

    /// Rank-0 shape holding exactly one element
    pub fn scalar() -> Self {
        Self::new(vec![])
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Compute the number of elements in the tensor
    pub fn volume(&self) -> usize {
        self.dims.iter().product()
    }

    /// Converts a multi-dimensional index to a flat index,
    /// `None` when the index has the wrong rank or is out of bounds
    pub fn flat_index(&self, index: &[usize]) -> Option<usize> {
        if self.dims.len() != index.len() || index.iter().zip(&self.dims).any(|(i, d)| i >= d) {
            return None;
        }
        // dot product
        Some(
            self.strides
                .iter()
                .zip(index.iter())
                .map(|(a, b)| a * b)
                .sum(),
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", dims.join(","))
    }
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}
