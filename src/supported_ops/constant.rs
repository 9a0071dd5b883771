use crate::error::ConvertError;
use crate::graph::{data_type, WireTensor};
use crate::ir::ValueId;
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::materialize::materialize_tensor;
use crate::tensor::{Shape, Tensor, TensorData};

pub(super) fn register(registry: &mut ConverterRegistry) {
    registry.register("Constant", constant);
}

const VALUE_KEYS: &[&str] = &[
    "value",
    "value_float",
    "value_floats",
    "value_int",
    "value_ints",
    "value_string",
    "value_strings",
];

fn vector<T>(values: Vec<T>) -> Tensor<T> {
    Tensor {
        shape: Shape::new(vec![values.len()]),
        data: values,
    }
}

/// Exactly one of the `value*` attributes must be set.
fn constant(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(0, 0)?;
    ctx.check_outputs(1, 1)?;
    let present: Vec<&str> = VALUE_KEYS.iter().copied().filter(|k| ctx.attrs.contains(k)).collect();
    let key = match present.as_slice() {
        [key] => *key,
        [] => {
            return Err(ConvertError::MissingAttribute {
                key: "value".to_string(),
            })
        }
        _ => {
            return Err(ConvertError::invalid_attribute(
                present[1],
                format!("conflicts with {}", present[0]),
            ))
        }
    };
    let data = match key {
        "value" => materialize_tensor(ctx.attrs.required::<&WireTensor>(key)?)?,
        "value_float" => TensorData::F32(Tensor::filled(ctx.attrs.required::<f32>(key)?, Shape::scalar())),
        "value_floats" => TensorData::F32(vector(ctx.attrs.required::<Vec<f32>>(key)?)),
        "value_int" => TensorData::I64(Tensor::filled(ctx.attrs.required::<i64>(key)?, Shape::scalar())),
        "value_ints" => TensorData::I64(vector(ctx.attrs.required::<Vec<i64>>(key)?)),
        _ => {
            return Err(ConvertError::UnsupportedElementType {
                code: data_type::STRING,
            });
        }
    };
    log::debug!("constant {} = {data}", ctx.node.outputs[0]);
    let value = ctx.builder.create_constant(&ctx.node.outputs[0], data);
    Ok(vec![value])
}
