use std::path::Path;

use tract_core::internal::tract_itertools::Itertools;
use tract_onnx::pb;
use tract_onnx::prelude::Framework;

use crate::error::ConvertError;
use crate::graph::{
    AttributeBag, AttributeValue, Graph, Model, Node, TensorPayload, ValueInfo, WireDim,
    WireTensor, DEFAULT_OPSET,
};

// `AttributeProto.AttributeType` codes
const ATTR_UNDEFINED: i32 = 0;
const ATTR_FLOAT: i32 = 1;
const ATTR_INT: i32 = 2;
const ATTR_STRING: i32 = 3;
const ATTR_TENSOR: i32 = 4;
const ATTR_GRAPH: i32 = 5;
const ATTR_FLOATS: i32 = 6;
const ATTR_INTS: i32 = 7;
const ATTR_STRINGS: i32 = 8;
const ATTR_TENSORS: i32 = 9;
const ATTR_GRAPHS: i32 = 10;

/// Reads and decodes an ONNX model file into its protobuf message.
pub fn read_model_file(path: &Path) -> Result<pb::ModelProto, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    read_model_bytes(&bytes)
}

/// Decodes a serialized ONNX model held in memory.
pub fn read_model_bytes(bytes: &[u8]) -> Result<pb::ModelProto, ConvertError> {
    let mut reader = bytes;
    tract_onnx::onnx()
        .proto_model_for_read(&mut reader)
        .map_err(|e| ConvertError::Decode(format!("{e:#}")))
}

pub fn decode_model(proto: &pb::ModelProto) -> Result<Model, ConvertError> {
    let graph = proto
        .graph
        .as_ref()
        .ok_or_else(|| ConvertError::Decode("model carries no graph".to_string()))?;

    let opset_version = proto
        .opset_import
        .iter()
        .find(|opset| opset.domain.is_empty() || opset.domain == "ai.onnx")
        .map(|opset| opset.version)
        .unwrap_or(DEFAULT_OPSET);

    Ok(Model {
        ir_version: proto.ir_version,
        opset_version,
        producer: proto.producer_name.clone(),
        graph: decode_graph(graph),
    })
}

pub fn decode_graph(proto: &pb::GraphProto) -> Graph {
    Graph {
        name: proto.name.clone(),
        nodes: proto.node.iter().map(decode_node).collect(),
        inputs: proto.input.iter().map(decode_value_info).collect(),
        outputs: proto.output.iter().map(decode_value_info).collect(),
        initializers: proto.initializer.iter().map(decode_tensor).collect(),
    }
}

fn decode_node(proto: &pb::NodeProto) -> Node {
    let attributes: AttributeBag = proto
        .attribute
        .iter()
        .filter_map(|attr| match decode_attribute(attr) {
            Some(value) => Some((attr.name.clone(), value)),
            None => {
                log::warn!(
                    "node `{}` ({}): dropping attribute `{}` of unsupported type {}",
                    proto.name,
                    proto.op_type,
                    attr.name,
                    attr.r#type
                );
                None
            }
        })
        .collect();

    Node {
        name: proto.name.clone(),
        op_type: proto.op_type.clone(),
        domain: proto.domain.clone(),
        inputs: proto.input.clone(),
        outputs: proto.output.clone(),
        attributes,
    }
}

fn decode_attribute(attr: &pb::AttributeProto) -> Option<AttributeValue> {
    let value = match attr.r#type {
        ATTR_FLOAT => AttributeValue::Float(attr.f),
        ATTR_INT => AttributeValue::Int(attr.i),
        ATTR_STRING => AttributeValue::String(utf8(&attr.s)),
        ATTR_TENSOR => AttributeValue::Tensor(decode_tensor(attr.t.as_ref()?)),
        ATTR_GRAPH => AttributeValue::Graph(decode_graph(attr.g.as_ref()?)),
        ATTR_FLOATS => AttributeValue::Floats(attr.floats.clone()),
        ATTR_INTS => AttributeValue::Ints(attr.ints.clone()),
        ATTR_STRINGS => AttributeValue::Strings(attr.strings.iter().map(|s| utf8(s)).collect()),
        ATTR_TENSORS => AttributeValue::Tensors(attr.tensors.iter().map(decode_tensor).collect()),
        ATTR_GRAPHS => AttributeValue::Graphs(attr.graphs.iter().map(decode_graph).collect()),
        ATTR_UNDEFINED => infer_untagged_attribute(attr),
        _ => return None,
    };
    Some(value)
}

/// Models written before IR version 3 leave the type tag unset; guess from the populated field.
fn infer_untagged_attribute(attr: &pb::AttributeProto) -> AttributeValue {
    if let Some(t) = &attr.t {
        AttributeValue::Tensor(decode_tensor(t))
    } else if let Some(g) = &attr.g {
        AttributeValue::Graph(decode_graph(g))
    } else if !attr.floats.is_empty() {
        AttributeValue::Floats(attr.floats.clone())
    } else if !attr.ints.is_empty() {
        AttributeValue::Ints(attr.ints.clone())
    } else if !attr.strings.is_empty() {
        AttributeValue::Strings(attr.strings.iter().map(|s| utf8(s)).collect())
    } else if !attr.tensors.is_empty() {
        AttributeValue::Tensors(attr.tensors.iter().map(decode_tensor).collect())
    } else if !attr.graphs.is_empty() {
        AttributeValue::Graphs(attr.graphs.iter().map(decode_graph).collect())
    } else if !attr.s.is_empty() {
        AttributeValue::String(utf8(&attr.s))
    } else if attr.f != 0.0 {
        AttributeValue::Float(attr.f)
    } else {
        AttributeValue::Int(attr.i)
    }
}

fn decode_value_info(proto: &pb::ValueInfoProto) -> ValueInfo {
    let tensor_type = proto
        .r#type
        .as_ref()
        .and_then(|ty| ty.value.as_ref())
        .and_then(|value| match value {
            pb::type_proto::Value::TensorType(tensor) => Some(tensor),
            #[allow(unreachable_patterns)]
            _ => None,
        });

    match tensor_type {
        Some(tensor) => ValueInfo {
            name: proto.name.clone(),
            element_type: (tensor.elem_type != 0).then_some(tensor.elem_type),
            shape: tensor
                .shape
                .as_ref()
                .map(|shape| shape.dim.iter().map(decode_dim).collect_vec()),
        },
        None => ValueInfo::untyped(proto.name.clone()),
    }
}

fn decode_dim(dim: &pb::tensor_shape_proto::Dimension) -> WireDim {
    use pb::tensor_shape_proto::dimension::Value;
    match &dim.value {
        Some(Value::DimValue(v)) => WireDim::Value(*v),
        Some(Value::DimParam(p)) if !p.is_empty() => WireDim::Param(p.clone()),
        _ => WireDim::Unknown,
    }
}

fn decode_tensor(proto: &pb::TensorProto) -> WireTensor {
    let external_location = proto
        .external_data
        .iter()
        .find(|entry| entry.key == "location")
        .map(|entry| entry.value.clone());

    let payload = if let Some(location) = external_location {
        TensorPayload::External(location)
    } else if !proto.raw_data.is_empty() {
        TensorPayload::Raw(proto.raw_data.clone())
    } else if !proto.float_data.is_empty() {
        TensorPayload::Floats(proto.float_data.clone())
    } else if !proto.int32_data.is_empty() {
        TensorPayload::Int32s(proto.int32_data.clone())
    } else if !proto.int64_data.is_empty() {
        TensorPayload::Int64s(proto.int64_data.clone())
    } else if !proto.double_data.is_empty() {
        TensorPayload::Doubles(proto.double_data.clone())
    } else if !proto.uint64_data.is_empty() {
        TensorPayload::Uint64s(proto.uint64_data.clone())
    } else if !proto.string_data.is_empty() {
        TensorPayload::Strings(proto.string_data.clone())
    } else {
        TensorPayload::Empty
    };

    WireTensor {
        name: proto.name.clone(),
        data_type: proto.data_type,
        dims: proto.dims.clone(),
        payload,
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::data_type;

    fn tensor_value_info(name: &str, elem_type: i32, dims: &[Option<i64>]) -> pb::ValueInfoProto {
        use pb::tensor_shape_proto::{dimension::Value, Dimension};
        let dim = dims
            .iter()
            .map(|d| Dimension {
                value: Some(match d {
                    Some(v) => Value::DimValue(*v),
                    None => Value::DimParam("batch".to_string()),
                }),
                ..Default::default()
            })
            .collect();
        pb::ValueInfoProto {
            name: name.to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                    elem_type,
                    shape: Some(pb::TensorShapeProto {
                        dim,
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_model_with_attributes_and_initializer() {
        let node = pb::NodeProto {
            name: "softmax".to_string(),
            op_type: "Softmax".to_string(),
            input: vec!["x".to_string()],
            output: vec!["y".to_string()],
            attribute: vec![
                pb::AttributeProto {
                    name: "axis".to_string(),
                    r#type: ATTR_INT,
                    i: -1,
                    ..Default::default()
                },
                pb::AttributeProto {
                    name: "mode".to_string(),
                    r#type: ATTR_STRING,
                    s: b"fast".to_vec(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let weight = pb::TensorProto {
            name: "w".to_string(),
            data_type: data_type::FLOAT,
            dims: vec![2],
            float_data: vec![1.0, 2.0],
            ..Default::default()
        };
        let proto = pb::ModelProto {
            ir_version: 7,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 17,
                ..Default::default()
            }],
            graph: Some(pb::GraphProto {
                name: "main".to_string(),
                node: vec![node],
                initializer: vec![weight],
                input: vec![tensor_value_info("x", data_type::FLOAT, &[None, Some(4)])],
                ..Default::default()
            }),
            ..Default::default()
        };

        let model = decode_model(&proto).unwrap();
        assert_eq!(model.opset_version, 17);
        assert_eq!(model.graph.name, "main");

        let node = &model.graph.nodes[0];
        assert_eq!(node.attributes["axis"], AttributeValue::Int(-1));
        assert_eq!(node.attributes["mode"], AttributeValue::String("fast".into()));

        let input = &model.graph.inputs[0];
        assert_eq!(input.element_type, Some(data_type::FLOAT));
        assert_eq!(
            input.shape,
            Some(vec![WireDim::Param("batch".into()), WireDim::Value(4)])
        );

        assert_eq!(
            model.graph.initializers[0].payload,
            TensorPayload::Floats(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_untagged_attribute_is_inferred_from_populated_field() {
        let attr = pb::AttributeProto {
            name: "perm".to_string(),
            ints: vec![1, 0],
            ..Default::default()
        };
        assert_eq!(decode_attribute(&attr), Some(AttributeValue::Ints(vec![1, 0])));
    }

    #[test]
    fn test_model_without_graph_is_a_decode_error() {
        let err = decode_model(&pb::ModelProto::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = read_model_bytes(&[0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
    }
}
