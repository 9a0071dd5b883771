use std::collections::HashMap;
use std::fmt;

pub mod decode;

/// Default-domain opset assumed when a model does not declare one.
pub const DEFAULT_OPSET: i64 = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub ir_version: i64,
    /// Version of the default (`""` / `ai.onnx`) operator set.
    pub opset_version: i64,
    pub producer: String,
    pub graph: Graph,
}

impl Model {
    pub fn new(graph: Graph) -> Self {
        Self {
            ir_version: 0,
            opset_version: DEFAULT_OPSET,
            producer: String::new(),
            graph,
        }
    }

    pub fn with_opset(mut self, opset_version: i64) -> Self {
        self.opset_version = opset_version;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub initializers: Vec<WireTensor>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: ValueInfo) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: ValueInfo) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_initializer(mut self, tensor: WireTensor) -> Self {
        self.initializers.push(tensor);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }
}

pub type AttributeBag = HashMap<String, AttributeValue>;

/// One operator application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    /// Empty strings mark omitted optional inputs.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: AttributeBag,
}

impl Node {
    pub fn new(op_type: impl Into<String>, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            op_type: op_type.into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Name used in diagnostics: the node name, or its first output when anonymous.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.outputs
            .iter()
            .find(|o| !o.is_empty())
            .map(String::as_str)
            .unwrap_or("<anonymous>")
    }
}

/// Tagged attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Tensor(WireTensor),
    Graph(Graph),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
    Tensors(Vec<WireTensor>),
    Graphs(Vec<Graph>),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Int(_) => AttributeKind::Int,
            AttributeValue::Float(_) => AttributeKind::Float,
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Tensor(_) => AttributeKind::Tensor,
            AttributeValue::Graph(_) => AttributeKind::Graph,
            AttributeValue::Ints(_) => AttributeKind::Ints,
            AttributeValue::Floats(_) => AttributeKind::Floats,
            AttributeValue::Strings(_) => AttributeKind::Strings,
            AttributeValue::Tensors(_) => AttributeKind::Tensors,
            AttributeValue::Graphs(_) => AttributeKind::Graphs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Int,
    Float,
    String,
    Tensor,
    Graph,
    Ints,
    Floats,
    Strings,
    Tensors,
    Graphs,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Int => "int",
            AttributeKind::Float => "float",
            AttributeKind::String => "string",
            AttributeKind::Tensor => "tensor",
            AttributeKind::Graph => "graph",
            AttributeKind::Ints => "list of ints",
            AttributeKind::Floats => "list of floats",
            AttributeKind::Strings => "list of strings",
            AttributeKind::Tensors => "list of tensors",
            AttributeKind::Graphs => "list of graphs",
        };
        f.write_str(name)
    }
}

/// Declared graph input or output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    /// Wire element type code, `None` when the declaration carries no tensor type.
    pub element_type: Option<i32>,
    /// `None` when the rank itself is unknown.
    pub shape: Option<Vec<WireDim>>,
}

impl ValueInfo {
    pub fn tensor(name: impl Into<String>, element_type: i32, dims: Vec<WireDim>) -> Self {
        Self {
            name: name.into(),
            element_type: Some(element_type),
            shape: Some(dims),
        }
    }

    /// A declaration with only a name, as loop bodies often have.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireDim {
    Value(i64),
    Param(String),
    Unknown,
}

/// Initializer or tensor attribute as it came off the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireTensor {
    pub name: String,
    pub data_type: i32,
    pub dims: Vec<i64>,
    pub payload: TensorPayload,
}

impl WireTensor {
    pub fn new(name: impl Into<String>, data_type: i32, dims: Vec<i64>, payload: TensorPayload) -> Self {
        Self {
            name: name.into(),
            data_type,
            dims,
            payload,
        }
    }
}

/// Where the element values of a [`WireTensor`] live.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TensorPayload {
    /// Little-endian bytes of the declared element type.
    Raw(Vec<u8>),
    Floats(Vec<f32>),
    /// Also carries i8/i16/u8/u16/bool and the bit patterns of f16/bf16.
    Int32s(Vec<i32>),
    Int64s(Vec<i64>),
    Doubles(Vec<f64>),
    /// Carries u32 and u64.
    Uint64s(Vec<u64>),
    Strings(Vec<Vec<u8>>),
    /// Stored outside the model; the location key of the external data entry.
    External(String),
    #[default]
    Empty,
}

/// ONNX `TensorProto.DataType` codes.
pub mod data_type {
    pub const UNDEFINED: i32 = 0;
    pub const FLOAT: i32 = 1;
    pub const UINT8: i32 = 2;
    pub const INT8: i32 = 3;
    pub const UINT16: i32 = 4;
    pub const INT16: i32 = 5;
    pub const INT32: i32 = 6;
    pub const INT64: i32 = 7;
    pub const STRING: i32 = 8;
    pub const BOOL: i32 = 9;
    pub const FLOAT16: i32 = 10;
    pub const DOUBLE: i32 = 11;
    pub const UINT32: i32 = 12;
    pub const UINT64: i32 = 13;
    pub const COMPLEX64: i32 = 14;
    pub const COMPLEX128: i32 = 15;
    pub const BFLOAT16: i32 = 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_first_output() {
        let node = Node::new("Relu", &["x"], &["y"]);
        assert_eq!(node.display_name(), "y");
        assert_eq!(node.clone().named("relu_0").display_name(), "relu_0");
        assert_eq!(Node::new("Foo", &[], &[]).display_name(), "<anonymous>");
    }
}
