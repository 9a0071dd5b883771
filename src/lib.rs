//! Frontend stage of an ONNX model compiler. See [`cmd`] for the entry points.

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod ir;
pub mod report;
pub mod supported_ops;
pub mod tensor;

pub use cmd::{
    convert_buffers, convert_buffers_with_options, convert_decoded, convert_files,
    convert_files_with_options, convert_model, convert_model_with_options,
};
pub use config::{CancellationToken, ConvertOptions};
pub use error::{ConversionFailed, ConvertError, Diagnostic, ErrorKind, NodeContext};
pub use graph::{AttributeValue, Graph, Model, Node, ValueInfo, WireTensor};
pub use ir::builder::{FunctionBuilder, IrBuilder};
pub use ir::load_onnx::{ConverterState, GraphConverter};
pub use ir::{Dim, Function, Type, ValueId};
pub use report::write_csv_report;
pub use supported_ops::{ConvertContext, ConverterFn, ConverterRegistry};
pub use tensor::{ElementType, TensorData};
