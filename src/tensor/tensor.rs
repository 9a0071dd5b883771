use crate::tensor::shape::Shape;

#[derive(Debug, PartialEq, Clone, Default)]
/// Flat representation of an n-dimensional tensor
pub struct Tensor<T> {
    pub(crate) data: Vec<T>,
    pub(crate) shape: Shape,
}

impl<T: Clone> Tensor<T> {
    /// Instantiates a new Tensor,
    /// `None` if the size of data does not match the shape
    pub fn new(data: Vec<T>, shape: Shape) -> Option<Self> {
        (data.len() == shape.volume()).then_some(Self { data, shape })
    }

    /// Tensor of the given shape with every element set to `value`
    pub fn filled(value: T, shape: Shape) -> Self {
        Self {
            data: vec![value; shape.volume()],
            shape,
        }
    }

    /// Returns the value at the given multi-dimensional tensor location
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.data.get(self.shape.flat_index(index)?)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::Tensor;
    use crate::tensor::shape::Shape;

    #[test]
    fn test_tensor_value_retrieval() {
        let a = Tensor::new(vec![1, 2, 3, 4, 5, 6], Shape::new(vec![3, 2])).unwrap();
        assert_eq!(a.get(&[0, 0]), Some(&1));
        assert_eq!(a.get(&[2, 0]), Some(&5));
        assert_eq!(a.get(&[3, 0]), None);
    }

    #[test]
    fn test_tensor_rejects_mismatched_data() {
        assert!(Tensor::new(vec![1, 2, 3], Shape::new(vec![2, 2])).is_none());
        assert_eq!(Tensor::filled(7u8, Shape::new(vec![2])).data(), &[7, 7]);
    }
}
