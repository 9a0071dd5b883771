use half::{bf16, f16};

use crate::error::ConvertError;
use crate::graph::{data_type, TensorPayload, ValueInfo, WireDim, WireTensor};
use crate::ir::{Dim, Type};
use crate::tensor::{ElementType, Shape, Tensor, TensorData};

/// Bytes of raw payload shown in trace logs.
const PAYLOAD_PREVIEW: usize = 16;

pub fn resolve_element_type(code: i32) -> Result<ElementType, ConvertError> {
    let ty = match code {
        data_type::FLOAT => ElementType::F32,
        data_type::UINT8 => ElementType::U8,
        data_type::INT8 => ElementType::I8,
        data_type::UINT16 => ElementType::U16,
        data_type::INT16 => ElementType::I16,
        data_type::INT32 => ElementType::I32,
        data_type::INT64 => ElementType::I64,
        data_type::BOOL => ElementType::Bool,
        data_type::FLOAT16 => ElementType::F16,
        data_type::DOUBLE => ElementType::F64,
        data_type::UINT32 => ElementType::U32,
        data_type::UINT64 => ElementType::U64,
        data_type::BFLOAT16 => ElementType::BF16,
        _ => return Err(ConvertError::UnsupportedElementType { code }),
    };
    Ok(ty)
}

/// Full tensor type of a declared value. Symbolic and unknown axes become
/// [`Dim::Dynamic`]; a missing shape gives an unranked type.
pub fn resolve_value_type(info: &ValueInfo) -> Result<Type, ConvertError> {
    let element_type = resolve_element_type(info.element_type.unwrap_or(data_type::UNDEFINED))?;
    let Some(dims) = &info.shape else {
        return Ok(Type::unranked(element_type));
    };
    let dims = dims
        .iter()
        .map(|dim| match dim {
            WireDim::Value(v) if *v >= 0 => Dim::Static(*v as usize),
            WireDim::Param(name) => Dim::Dynamic(Some(name.clone())),
            _ => Dim::Dynamic(None),
        })
        .collect();
    Ok(Type::new(element_type, dims))
}

/// Decodes a wire tensor into a typed, shape-checked tensor.
pub fn materialize_tensor(tensor: &WireTensor) -> Result<TensorData, ConvertError> {
    let malformed = |reason: String| ConvertError::MalformedTensorPayload {
        tensor: tensor.name.clone(),
        reason,
    };

    let element_type = resolve_element_type(tensor.data_type)?;
    if let Some(d) = tensor.dims.iter().find(|&&d| d < 0) {
        return Err(malformed(format!("negative dimension {d} in {:?}", tensor.dims)));
    }
    let shape = Shape::new(tensor.dims.iter().map(|&d| d as usize).collect());
    let count = shape.volume();

    let data = match &tensor.payload {
        TensorPayload::Raw(bytes) => {
            let expected = count * element_type.size_in_bytes();
            log::trace!(
                "tensor `{}`: {} raw bytes, head {}",
                tensor.name,
                bytes.len(),
                hex::encode(&bytes[..bytes.len().min(PAYLOAD_PREVIEW)])
            );
            if bytes.len() != expected {
                return Err(malformed(format!(
                    "{count} x {element_type} needs {expected} bytes, payload has {}",
                    bytes.len()
                )));
            }
            decode_raw(element_type, bytes)
        }
        TensorPayload::External(location) => {
            return Err(malformed(format!("data stored externally at `{location}` is not loaded")));
        }
        TensorPayload::Strings(_) => {
            return Err(ConvertError::UnsupportedElementType {
                code: data_type::STRING,
            });
        }
        TensorPayload::Empty => {
            if count != 0 {
                return Err(malformed(format!("{count} elements declared, payload is empty")));
            }
            decode_raw(element_type, &[])
        }
        typed => {
            let len = typed_len(typed);
            if len != count {
                return Err(malformed(format!(
                    "{count} elements declared, payload holds {len}"
                )));
            }
            decode_typed(element_type, typed).ok_or_else(|| {
                malformed(format!("{} field cannot hold {element_type} elements", field_name(typed)))
            })?
        }
    };

    into_tensor(data, shape).ok_or_else(|| malformed("element count mismatch".to_string()))
}

/// Flat decoded values before the shape is attached.
enum Values {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
}

fn into_tensor(values: Values, shape: Shape) -> Option<TensorData> {
    Some(match values {
        Values::F16(v) => TensorData::F16(Tensor::new(v, shape)?),
        Values::BF16(v) => TensorData::BF16(Tensor::new(v, shape)?),
        Values::F32(v) => TensorData::F32(Tensor::new(v, shape)?),
        Values::F64(v) => TensorData::F64(Tensor::new(v, shape)?),
        Values::I8(v) => TensorData::I8(Tensor::new(v, shape)?),
        Values::I16(v) => TensorData::I16(Tensor::new(v, shape)?),
        Values::I32(v) => TensorData::I32(Tensor::new(v, shape)?),
        Values::I64(v) => TensorData::I64(Tensor::new(v, shape)?),
        Values::U8(v) => TensorData::U8(Tensor::new(v, shape)?),
        Values::U16(v) => TensorData::U16(Tensor::new(v, shape)?),
        Values::U32(v) => TensorData::U32(Tensor::new(v, shape)?),
        Values::U64(v) => TensorData::U64(Tensor::new(v, shape)?),
        Values::Bool(v) => TensorData::Bool(Tensor::new(v, shape)?),
    })
}

// Raw payloads are little-endian, as is every host we target.
fn read_le<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn decode_raw(element_type: ElementType, bytes: &[u8]) -> Values {
    match element_type {
        ElementType::F16 => Values::F16(read_le(bytes)),
        ElementType::BF16 => Values::BF16(read_le(bytes)),
        ElementType::F32 => Values::F32(read_le(bytes)),
        ElementType::F64 => Values::F64(read_le(bytes)),
        ElementType::I8 => Values::I8(read_le(bytes)),
        ElementType::I16 => Values::I16(read_le(bytes)),
        ElementType::I32 => Values::I32(read_le(bytes)),
        ElementType::I64 => Values::I64(read_le(bytes)),
        ElementType::U8 => Values::U8(bytes.to_vec()),
        ElementType::U16 => Values::U16(read_le(bytes)),
        ElementType::U32 => Values::U32(read_le(bytes)),
        ElementType::U64 => Values::U64(read_le(bytes)),
        ElementType::Bool => Values::Bool(bytes.iter().map(|&b| b != 0).collect()),
    }
}

/// Typed fields follow the ONNX packing rules: narrow integers, bool and the
/// 16-bit floats ride in `int32_data`, u32/u64 in `uint64_data`.
fn decode_typed(element_type: ElementType, payload: &TensorPayload) -> Option<Values> {
    let values = match (element_type, payload) {
        (ElementType::F32, TensorPayload::Floats(v)) => Values::F32(v.clone()),
        (ElementType::F64, TensorPayload::Doubles(v)) => Values::F64(v.clone()),
        (ElementType::I64, TensorPayload::Int64s(v)) => Values::I64(v.clone()),
        (ElementType::I32, TensorPayload::Int32s(v)) => Values::I32(v.clone()),
        (ElementType::I16, TensorPayload::Int32s(v)) => Values::I16(v.iter().map(|&x| x as i16).collect()),
        (ElementType::I8, TensorPayload::Int32s(v)) => Values::I8(v.iter().map(|&x| x as i8).collect()),
        (ElementType::U16, TensorPayload::Int32s(v)) => Values::U16(v.iter().map(|&x| x as u16).collect()),
        (ElementType::U8, TensorPayload::Int32s(v)) => Values::U8(v.iter().map(|&x| x as u8).collect()),
        (ElementType::Bool, TensorPayload::Int32s(v)) => Values::Bool(v.iter().map(|&x| x != 0).collect()),
        (ElementType::F16, TensorPayload::Int32s(v)) => {
            Values::F16(v.iter().map(|&x| f16::from_bits(x as u16)).collect())
        }
        (ElementType::BF16, TensorPayload::Int32s(v)) => {
            Values::BF16(v.iter().map(|&x| bf16::from_bits(x as u16)).collect())
        }
        (ElementType::U32, TensorPayload::Uint64s(v)) => Values::U32(v.iter().map(|&x| x as u32).collect()),
        (ElementType::U64, TensorPayload::Uint64s(v)) => Values::U64(v.clone()),
        _ => return None,
    };
    Some(values)
}

fn typed_len(payload: &TensorPayload) -> usize {
    match payload {
        TensorPayload::Floats(v) => v.len(),
        TensorPayload::Int32s(v) => v.len(),
        TensorPayload::Int64s(v) => v.len(),
        TensorPayload::Doubles(v) => v.len(),
        TensorPayload::Uint64s(v) => v.len(),
        TensorPayload::Strings(v) => v.len(),
        TensorPayload::Raw(v) => v.len(),
        TensorPayload::External(_) | TensorPayload::Empty => 0,
    }
}

fn field_name(payload: &TensorPayload) -> &'static str {
    match payload {
        TensorPayload::Floats(_) => "float_data",
        TensorPayload::Int32s(_) => "int32_data",
        TensorPayload::Int64s(_) => "int64_data",
        TensorPayload::Doubles(_) => "double_data",
        TensorPayload::Uint64s(_) => "uint64_data",
        TensorPayload::Strings(_) => "string_data",
        TensorPayload::Raw(_) => "raw_data",
        TensorPayload::External(_) => "external_data",
        TensorPayload::Empty => "empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rand::Rng;

    const ALL_CODES: [i32; 13] = [
        data_type::FLOAT,
        data_type::UINT8,
        data_type::INT8,
        data_type::UINT16,
        data_type::INT16,
        data_type::INT32,
        data_type::INT64,
        data_type::BOOL,
        data_type::FLOAT16,
        data_type::DOUBLE,
        data_type::UINT32,
        data_type::UINT64,
        data_type::BFLOAT16,
    ];

    #[test]
    fn test_unknown_codes_are_rejected() {
        for code in [data_type::UNDEFINED, data_type::STRING, data_type::COMPLEX64, 99] {
            assert_eq!(
                resolve_element_type(code),
                Err(ConvertError::UnsupportedElementType { code })
            );
        }
    }

    #[test]
    fn test_value_type_keeps_dynamic_axes() {
        let info = ValueInfo::tensor(
            "x",
            data_type::FLOAT,
            vec![WireDim::Param("N".into()), WireDim::Value(3), WireDim::Unknown, WireDim::Value(-1)],
        );
        let ty = resolve_value_type(&info).unwrap();
        assert_eq!(
            ty.shape,
            Some(vec![
                Dim::Dynamic(Some("N".into())),
                Dim::Static(3),
                Dim::dynamic(),
                Dim::dynamic()
            ])
        );

        let unranked = ValueInfo {
            name: "y".into(),
            element_type: Some(data_type::INT64),
            shape: None,
        };
        assert_eq!(resolve_value_type(&unranked).unwrap(), Type::unranked(ElementType::I64));

        assert_eq!(
            resolve_value_type(&ValueInfo::untyped("z")).unwrap_err().kind(),
            ErrorKind::UnsupportedElementType
        );
    }

    #[test]
    fn test_raw_payload_length_matches_count_for_every_type() {
        let mut rng = rand::rng();
        for code in ALL_CODES {
            let element_type = resolve_element_type(code).unwrap();
            for _ in 0..8 {
                let dims: Vec<i64> = (0..rng.random_range(0..4))
                    .map(|_| rng.random_range(0..5))
                    .collect();
                let count: usize = dims.iter().map(|&d| d as usize).product();
                let bytes: Vec<u8> = (0..count * element_type.size_in_bytes())
                    .map(|_| rng.random())
                    .collect();

                let tensor = WireTensor::new("t", code, dims.clone(), TensorPayload::Raw(bytes.clone()));
                let data = materialize_tensor(&tensor).unwrap();
                assert_eq!(data.element_type(), element_type);
                assert_eq!(data.len(), count);
                assert_eq!(data.len() * element_type.size_in_bytes(), bytes.len());

                if !bytes.is_empty() {
                    let truncated = WireTensor::new(
                        "t",
                        code,
                        dims,
                        TensorPayload::Raw(bytes[..bytes.len() - 1].to_vec()),
                    );
                    assert_eq!(
                        materialize_tensor(&truncated).unwrap_err().kind(),
                        ErrorKind::MalformedTensorPayload
                    );
                }
            }
        }
    }

    #[test]
    fn test_raw_values_decode_little_endian() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let tensor = WireTensor::new("w", data_type::FLOAT, vec![2], TensorPayload::Raw(bytes));
        match materialize_tensor(&tensor).unwrap() {
            TensorData::F32(t) => assert_eq!(t.data(), &[1.5, -2.0]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_typed_fields_follow_packing_rules() {
        let half = WireTensor::new(
            "h",
            data_type::FLOAT16,
            vec![1],
            TensorPayload::Int32s(vec![f16::from_f32(0.5).to_bits() as i32]),
        );
        match materialize_tensor(&half).unwrap() {
            TensorData::F16(t) => assert_eq!(t.data()[0].to_f32(), 0.5),
            other => panic!("unexpected {other}"),
        }

        let flags = WireTensor::new("b", data_type::BOOL, vec![3], TensorPayload::Int32s(vec![1, 0, 2]));
        match materialize_tensor(&flags).unwrap() {
            TensorData::Bool(t) => assert_eq!(t.data(), &[true, false, true]),
            other => panic!("unexpected {other}"),
        }

        let wrong_field = WireTensor::new("f", data_type::FLOAT, vec![1], TensorPayload::Int64s(vec![1]));
        assert_eq!(
            materialize_tensor(&wrong_field).unwrap_err().kind(),
            ErrorKind::MalformedTensorPayload
        );
    }

    #[test]
    fn test_scalar_and_empty_tensors() {
        let scalar = WireTensor::new("s", data_type::INT64, vec![], TensorPayload::Int64s(vec![42]));
        let data = materialize_tensor(&scalar).unwrap();
        assert_eq!(data.shape().rank(), 0);
        assert_eq!(data.to_i64_vec(), Some(vec![42]));

        let empty = WireTensor::new("e", data_type::FLOAT, vec![0, 3], TensorPayload::Empty);
        assert!(materialize_tensor(&empty).unwrap().is_empty());

        let missing = WireTensor::new("m", data_type::FLOAT, vec![2], TensorPayload::Empty);
        assert_eq!(
            materialize_tensor(&missing).unwrap_err().kind(),
            ErrorKind::MalformedTensorPayload
        );
    }

    #[test]
    fn test_short_typed_payload_and_external_data_fail() {
        let short = WireTensor::new("s", data_type::INT32, vec![2, 2], TensorPayload::Int32s(vec![1, 2, 3]));
        assert_eq!(
            materialize_tensor(&short).unwrap_err().kind(),
            ErrorKind::MalformedTensorPayload
        );

        let external = WireTensor::new("x", data_type::FLOAT, vec![4], TensorPayload::External("w.bin".into()));
        assert_eq!(
            materialize_tensor(&external).unwrap_err().kind(),
            ErrorKind::MalformedTensorPayload
        );

        let negative = WireTensor::new("n", data_type::FLOAT, vec![-1], TensorPayload::Empty);
        assert_eq!(
            materialize_tensor(&negative).unwrap_err().kind(),
            ErrorKind::MalformedTensorPayload
        );
    }
}
