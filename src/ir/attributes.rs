use std::cell::RefCell;
use std::collections::HashSet;

use crate::error::ConvertError;
use crate::graph::{AttributeBag, AttributeKind, AttributeValue, Graph, WireTensor};

/// A shape an attribute value can be read as.
pub trait FromAttribute<'a>: Sized {
    const KIND: AttributeKind;

    fn from_attribute(value: &'a AttributeValue) -> Option<Self>;
}

macro_rules! from_attribute {
    ($ty:ty, $kind:ident, $value:ident => $conv:expr) => {
        impl<'a> FromAttribute<'a> for $ty {
            const KIND: AttributeKind = AttributeKind::$kind;

            fn from_attribute(value: &'a AttributeValue) -> Option<Self> {
                match value {
                    AttributeValue::$kind($value) => Some($conv),
                    _ => None,
                }
            }
        }
    };
}

from_attribute!(i64, Int, v => *v);
from_attribute!(f32, Float, v => *v);
from_attribute!(String, String, v => v.clone());
from_attribute!(&'a str, String, v => v.as_str());
from_attribute!(Vec<i64>, Ints, v => v.clone());
from_attribute!(Vec<f32>, Floats, v => v.clone());
from_attribute!(Vec<String>, Strings, v => v.clone());
from_attribute!(&'a WireTensor, Tensor, v => v);
from_attribute!(&'a [WireTensor], Tensors, v => v.as_slice());
from_attribute!(&'a Graph, Graph, v => v);
from_attribute!(&'a [Graph], Graphs, v => v.as_slice());

/// Read-only view over one node's attributes that remembers which keys were read.
/// A key stored under another tag than the one requested is a mismatch, never a coercion.
pub struct Attributes<'a> {
    bag: &'a AttributeBag,
    read: RefCell<HashSet<String>>,
}

impl<'a> Attributes<'a> {
    pub fn new(bag: &'a AttributeBag) -> Self {
        Self {
            bag,
            read: RefCell::new(HashSet::new()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bag.contains_key(key)
    }

    /// `Ok(None)` when absent, the value when the stored tag matches `T`.
    pub fn get<T: FromAttribute<'a>>(&self, key: &str) -> Result<Option<T>, ConvertError> {
        let Some((stored_key, value)) = self.bag.get_key_value(key) else {
            return Ok(None);
        };
        self.read.borrow_mut().insert(stored_key.clone());
        T::from_attribute(value)
            .map(Some)
            .ok_or_else(|| ConvertError::AttributeTypeMismatch {
                key: key.to_string(),
                expected: T::KIND,
                actual: value.kind(),
            })
    }

    /// Like [`Attributes::get`] with a documented default for absent keys.
    pub fn get_or<T: FromAttribute<'a>>(&self, key: &str, default: T) -> Result<T, ConvertError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Absent keys are a [`ConvertError::MissingAttribute`].
    pub fn required<T: FromAttribute<'a>>(&self, key: &str) -> Result<T, ConvertError> {
        self.get(key)?.ok_or_else(|| ConvertError::MissingAttribute {
            key: key.to_string(),
        })
    }

    /// Keys present on the node that nothing has read, sorted.
    pub fn unread(&self) -> Vec<&'a str> {
        let read = self.read.borrow();
        let mut keys: Vec<&'a str> = self
            .bag
            .keys()
            .map(String::as_str)
            .filter(|k| !read.contains(*k))
            .collect();
        keys.sort_unstable();
        keys
    }
}
