use std::path::Path;

use tract_onnx::pb;

use crate::config::ConvertOptions;
use crate::error::{ConversionFailed, ConvertError, NodeContext};
use crate::graph::decode::{decode_model, read_model_bytes, read_model_file};
use crate::graph::Model;
use crate::ir::builder::FunctionBuilder;
use crate::ir::load_onnx::GraphConverter;
use crate::ir::Function;

const FUNCTION_NAME: &str = "main";

pub fn convert_files<P: AsRef<Path>>(paths: &[P]) -> Result<Function, ConversionFailed> {
    convert_files_with_options(paths, ConvertOptions::default())
}

pub fn convert_files_with_options<P: AsRef<Path>>(
    paths: &[P],
    options: ConvertOptions,
) -> Result<Function, ConversionFailed> {
    let sources = paths.iter().map(|path| {
        let path = path.as_ref();
        let model = read_model_file(path).and_then(|proto| decode_model(&proto));
        (path.display().to_string(), model)
    });
    convert_sources(sources, options)
}

pub fn convert_buffers(buffers: &[&[u8]]) -> Result<Function, ConversionFailed> {
    convert_buffers_with_options(buffers, ConvertOptions::default())
}

pub fn convert_buffers_with_options(
    buffers: &[&[u8]],
    options: ConvertOptions,
) -> Result<Function, ConversionFailed> {
    let sources = buffers.iter().enumerate().map(|(i, bytes)| {
        let model = read_model_bytes(bytes).and_then(|proto| decode_model(&proto));
        (format!("buffer {i}"), model)
    });
    convert_sources(sources, options)
}

/// Converts a model that was already parsed into its protobuf message.
pub fn convert_model(proto: &pb::ModelProto) -> Result<Function, ConversionFailed> {
    convert_model_with_options(proto, ConvertOptions::default())
}

pub fn convert_model_with_options(
    proto: &pb::ModelProto,
    options: ConvertOptions,
) -> Result<Function, ConversionFailed> {
    let source = proto
        .graph
        .as_ref()
        .map(|graph| graph.name.clone())
        .unwrap_or_default();
    convert_sources(std::iter::once((source, decode_model(proto))), options)
}

/// Converts models already turned into [`Model`] records.
pub fn convert_decoded(models: &[Model], options: ConvertOptions) -> Result<Function, ConversionFailed> {
    let mut converter = GraphConverter::new(FunctionBuilder::new(FUNCTION_NAME)).with_options(options);
    for model in models {
        converter.convert_model(model);
    }
    converter.finish().map(FunctionBuilder::finish)
}

fn convert_sources(
    sources: impl Iterator<Item = (String, Result<Model, ConvertError>)>,
    options: ConvertOptions,
) -> Result<Function, ConversionFailed> {
    let mut converter = GraphConverter::new(FunctionBuilder::new(FUNCTION_NAME)).with_options(options);
    for (source, model) in sources {
        match model {
            Ok(model) => {
                log::debug!("decoded `{source}`");
                converter.convert_model(&model);
            }
            Err(error) => converter.report(NodeContext::model(source), error),
        }
    }
    converter.finish().map(FunctionBuilder::finish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::data_type;

    fn value_info(name: &str, dims: &[i64]) -> pb::ValueInfoProto {
        use pb::tensor_shape_proto::{dimension::Value, Dimension};
        let dim = dims
            .iter()
            .map(|d| Dimension {
                value: Some(Value::DimValue(*d)),
                ..Default::default()
            })
            .collect();
        pb::ValueInfoProto {
            name: name.to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                    elem_type: data_type::FLOAT,
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

    fn relu_model(op_type: &str) -> pb::ModelProto {
        pb::ModelProto {
            ir_version: 8,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 13,
                ..Default::default()
            }],
            graph: Some(pb::GraphProto {
                name: "main".to_string(),
                node: vec![pb::NodeProto {
                    name: "act".to_string(),
                    op_type: op_type.to_string(),
                    input: vec!["x".to_string()],
                    output: vec!["y".to_string()],
                    ..Default::default()
                }],
                input: vec![value_info("x", &[1, 4])],
                output: vec![value_info("y", &[1, 4])],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_convert_model_proto() {
        let function = convert_model(&relu_model("Relu")).unwrap();
        assert_eq!(function.placeholders.len(), 1);
        assert_eq!(function.instruction_count(), 1);
        assert_eq!(function.entry_block().results.len(), 1);
    }

    #[test]
    fn test_unsupported_operator_in_model_proto() {
        let err = convert_model(&relu_model("FancyOp")).unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::UnsupportedOperator]);
        assert_eq!(err.diagnostics[0].context.node, "act");
    }

    #[test]
    fn test_garbage_buffers_report_every_source() {
        let garbage: &[u8] = &[0xff, 0xff, 0xff, 0x01];
        let err = convert_buffers(&[garbage, garbage]).unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::Decode, ErrorKind::Decode]);
        assert_eq!(err.diagnostics[1].context.graph, "buffer 1");
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = convert_files(&["does/not/exist.onnx"]).unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::Io]);
    }

    #[test]
    fn test_decoded_models_share_one_function() {
        let first = decode_model(&relu_model("Relu")).unwrap();
        let mut second = first.clone();
        second.graph.inputs[0].name = "x2".into();
        second.graph.nodes[0].inputs[0] = "x2".into();
        second.graph.nodes[0].outputs[0] = "y2".into();
        second.graph.outputs[0].name = "y2".into();

        let function = convert_decoded(&[first, second], ConvertOptions::default()).unwrap();
        assert_eq!(function.placeholders.len(), 2);
        assert_eq!(function.entry_block().results.len(), 2);
    }

    #[test]
    fn test_opset_below_minimum_is_rejected() {
        let options = ConvertOptions::default().with_min_opset(14);
        let err = convert_model_with_options(&relu_model("Relu"), options).unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::UnsupportedOpset]);
    }
}
