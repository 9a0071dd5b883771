use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::ConvertError;
use crate::graph::Node;
use crate::ir::attributes::Attributes;
use crate::ir::builder::{IrBuilder, OpSpec};
use crate::ir::{Params, Type, ValueId};
use crate::tensor::TensorData;

mod activation;
mod constant;
mod einsum;
mod elementwise;
pub(crate) mod infer;
mod linalg;
mod nn;
mod reduce;
mod shape;

/// Translates one node into IR, returning one value per produced output.
pub type ConverterFn = fn(&mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError>;

/// What a converter gets to work with for one node.
pub struct ConvertContext<'a> {
    pub node: &'a Node,
    /// Resolved inputs, positionally; `None` for omitted optional inputs.
    pub inputs: &'a [Option<ValueId>],
    pub attrs: &'a Attributes<'a>,
    pub builder: &'a mut dyn IrBuilder,
    /// Default-domain opset of the model being converted.
    pub opset: i64,
}

impl ConvertContext<'_> {
    pub fn op_type(&self) -> &str {
        &self.node.op_type
    }

    /// Checks the declared input count, omitted optional inputs included.
    pub fn check_inputs(&self, min: usize, max: usize) -> Result<(), ConvertError> {
        let actual = self.inputs.len();
        if actual < min || actual > max {
            return Err(ConvertError::arity(self.op_type(), "inputs", min, max, actual));
        }
        Ok(())
    }

    pub fn check_outputs(&self, min: usize, max: usize) -> Result<(), ConvertError> {
        let actual = self.node.outputs.len();
        if actual < min || actual > max {
            return Err(ConvertError::arity(self.op_type(), "outputs", min, max, actual));
        }
        Ok(())
    }

    /// Input that must be present.
    pub fn input(&self, index: usize) -> Result<ValueId, ConvertError> {
        self.optional_input(index).ok_or_else(|| {
            ConvertError::arity(self.op_type(), "inputs", index + 1, usize::MAX, self.present_inputs())
        })
    }

    pub fn optional_input(&self, index: usize) -> Option<ValueId> {
        self.inputs.get(index).copied().flatten()
    }

    fn present_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_some()).count()
    }

    pub fn value_type(&self, value: ValueId) -> Result<Type, ConvertError> {
        self.builder
            .value_type(value)
            .cloned()
            .ok_or_else(|| ConvertError::NameNotFound {
                name: value.to_string(),
            })
    }

    pub fn input_type(&self, index: usize) -> Result<Type, ConvertError> {
        self.value_type(self.input(index)?)
    }

    /// Constant data behind input `index`, if it is a constant.
    pub fn constant_input(&self, index: usize) -> Option<&TensorData> {
        self.builder.constant_data(self.optional_input(index)?)
    }

    /// Integer values of a constant input, used for shape arguments.
    pub fn constant_ints(&self, index: usize) -> Option<Vec<i64>> {
        self.constant_input(index)?.to_i64_vec()
    }

    /// Appends the node as one instruction of its own kind over all its inputs.
    pub fn emit(&mut self, params: Params, result_types: Vec<Type>) -> Vec<ValueId> {
        let op_type = self.node.op_type.clone();
        let operands = self.inputs.to_vec();
        self.emit_op(&op_type, operands, params, result_types)
    }

    pub fn emit_op(
        &mut self,
        op_type: &str,
        operands: Vec<Option<ValueId>>,
        params: Params,
        result_types: Vec<Type>,
    ) -> Vec<ValueId> {
        let op = OpSpec {
            op_type: op_type.to_string(),
            name: self.node.display_name().to_string(),
            operands,
            params,
            result_names: self.node.outputs.clone(),
            result_types,
        };
        self.builder.append(op)
    }
}

/// Operator kind to converter table.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, ConverterFn>,
}

impl ConverterRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in operator kind.
    pub fn with_default_ops() -> Self {
        let mut registry = Self::new();
        activation::register(&mut registry);
        elementwise::register(&mut registry);
        linalg::register(&mut registry);
        einsum::register(&mut registry);
        nn::register(&mut registry);
        shape::register(&mut registry);
        reduce::register(&mut registry);
        constant::register(&mut registry);
        log::debug!("registered {} operator converters", registry.len());
        registry
    }

    /// Process-wide built-in table, built on first use.
    pub fn global() -> &'static ConverterRegistry {
        static REGISTRY: OnceLock<ConverterRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ConverterRegistry::with_default_ops)
    }

    /// Registers `converter` for `op_type`, returning the one it replaces.
    pub fn register(&mut self, op_type: &str, converter: ConverterFn) -> Option<ConverterFn> {
        self.converters.insert(op_type.to_string(), converter)
    }

    pub fn lookup(&self, op_type: &str) -> Result<ConverterFn, ConvertError> {
        self.converters
            .get(op_type)
            .copied()
            .ok_or_else(|| ConvertError::UnsupportedOperator {
                op_type: op_type.to_string(),
            })
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.converters.contains_key(op_type)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Registered operator kinds, sorted.
    pub fn op_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::graph::AttributeValue;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::Function;

    /// Runs the registered converter for `node` over fresh placeholders of `input_types`
    /// (or `constants`, by input position), returning the function and produced values.
    pub(crate) fn run_node(
        node: Node,
        input_types: &[Option<Type>],
        constants: &[(usize, TensorData)],
        opset: i64,
    ) -> Result<(Function, Vec<ValueId>), ConvertError> {
        let mut builder = FunctionBuilder::new("test");
        let inputs: Vec<Option<ValueId>> = input_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                if let Some((_, data)) = constants.iter().find(|(index, _)| *index == i) {
                    return Some(builder.create_constant(&format!("c{i}"), data.clone()));
                }
                ty.clone()
                    .map(|ty| builder.create_placeholder(&format!("in{i}"), ty))
            })
            .collect();
        let attrs = Attributes::new(&node.attributes);
        let converter = ConverterRegistry::global().lookup(&node.op_type)?;
        let outputs = {
            let mut ctx = ConvertContext {
                node: &node,
                inputs: &inputs,
                attrs: &attrs,
                builder: &mut builder,
                opset,
            };
            converter(&mut ctx)?
        };
        Ok((builder.finish(), outputs))
    }

    pub(crate) fn node(op_type: &str, inputs: usize, attrs: &[(&str, AttributeValue)]) -> Node {
        let names: Vec<String> = (0..inputs).map(|i| format!("in{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut node = Node::new(op_type, &names, &["out"]);
        for (key, value) in attrs {
            node = node.with_attr(*key, value.clone());
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_global_registry_covers_catalog() {
        let registry = ConverterRegistry::global();
        for op in ["Relu", "Conv", "Gemm", "Reshape", "Constant", "ReduceMean", "Einsum"] {
            assert!(registry.contains(op), "{op} missing");
        }
        assert!(registry.len() > 100);
        assert!(!registry.contains("Loop"));
    }

    #[test]
    fn test_lookup_unknown_kind() {
        let registry = ConverterRegistry::new();
        assert!(registry.is_empty());
        let err = registry.lookup("Foo").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(
            err,
            ConvertError::UnsupportedOperator {
                op_type: "Foo".into()
            }
        );
    }

    #[test]
    fn test_register_replaces_previous() {
        fn none(_: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
            Ok(vec![])
        }
        let mut registry = ConverterRegistry::new();
        assert!(registry.register("Custom", none).is_none());
        assert!(registry.register("Custom", none).is_some());
        assert_eq!(registry.op_types(), vec!["Custom"]);
    }
}
