use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Param, Params, ValueId};
use crate::supported_ops::infer::{broadcast_type, normalize_axis};
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::ElementType;

const UNARY: &[&str] = &[
    "Abs", "Acos", "Acosh", "Asin", "Asinh", "Atan", "Atanh", "Ceil", "Cos", "Cosh", "Erf",
    "Exp", "Floor", "Log", "Neg", "Not", "Reciprocal", "Relu", "Round", "Sigmoid", "Sign", "Sin",
    "Sinh", "Softplus", "Softsign", "Sqrt", "Tan", "Tanh", "HardSwish",
];

pub(super) fn register(registry: &mut ConverterRegistry) {
    for op in UNARY {
        registry.register(op, unary);
    }
    registry.register("IsNaN", is_nan);
    registry.register("Elu", elu);
    registry.register("Celu", celu);
    registry.register("ThresholdedRelu", thresholded_relu);
    registry.register("LeakyRelu", leaky_relu);
    registry.register("HardSigmoid", hard_sigmoid);
    registry.register("Selu", selu);
    registry.register("Gelu", gelu);
    registry.register("PRelu", prelu);
    registry.register("Clip", clip);
    registry.register("Softmax", softmax);
    registry.register("LogSoftmax", softmax);
    registry.register("Hardmax", softmax);
}

/// Single input, single output, result typed like the input.
fn same_type(ctx: &mut ConvertContext<'_>, params: Params) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let ty = ctx.input_type(0)?;
    Ok(ctx.emit(params, vec![ty]))
}

fn unary(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    same_type(ctx, Params::new())
}

fn is_nan(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let ty = ctx.input_type(0)?.with_element_type(ElementType::Bool);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

fn alpha_only(ctx: &mut ConvertContext<'_>, default: f32) -> Result<Vec<ValueId>, ConvertError> {
    let alpha = ctx.attrs.get_or("alpha", default)?;
    same_type(ctx, params([("alpha", Param::Float(alpha))]))
}

fn elu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    alpha_only(ctx, 1.0)
}

fn celu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    alpha_only(ctx, 1.0)
}

fn thresholded_relu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    alpha_only(ctx, 1.0)
}

fn leaky_relu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    alpha_only(ctx, 0.01)
}

fn hard_sigmoid(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    let alpha = ctx.attrs.get_or("alpha", 0.2f32)?;
    let beta = ctx.attrs.get_or("beta", 0.5f32)?;
    same_type(
        ctx,
        params([("alpha", Param::Float(alpha)), ("beta", Param::Float(beta))]),
    )
}

fn selu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    let alpha = ctx.attrs.get_or("alpha", 1.673_263_2f32)?;
    let gamma = ctx.attrs.get_or("gamma", 1.050_701f32)?;
    same_type(
        ctx,
        params([("alpha", Param::Float(alpha)), ("gamma", Param::Float(gamma))]),
    )
}

fn gelu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    let approximate = ctx.attrs.get_or("approximate", "none")?;
    if !matches!(approximate, "none" | "tanh") {
        return Err(ConvertError::invalid_attribute(
            "approximate",
            format!("expected \"none\" or \"tanh\", got {approximate:?}"),
        ));
    }
    same_type(
        ctx,
        params([("approximate", Param::String(approximate.to_string()))]),
    )
}

fn prelu(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let slope = ctx.input_type(1)?;
    let ty = broadcast_type(x.element_type, &[x, slope]);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

/// Bounds are attributes before opset 11 and optional inputs from then on.
fn clip(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    if ctx.opset < 11 {
        ctx.check_inputs(1, 1)?;
        let min = ctx.attrs.get_or("min", f32::MIN)?;
        let max = ctx.attrs.get_or("max", f32::MAX)?;
        let ty = ctx.input_type(0)?;
        return Ok(ctx.emit(
            params([("min", Param::Float(min)), ("max", Param::Float(max))]),
            vec![ty],
        ));
    }
    ctx.check_inputs(1, 3)?;
    let ty = ctx.input_type(0)?;
    let mut p = Params::new();
    // constant bounds are folded into params so lowering need not chase them
    for (index, key) in [(1, "min"), (2, "max")] {
        if let Some(bound) = ctx.constant_input(index).and_then(|t| t.to_f64_vec().first().copied()) {
            p.insert(key.to_string(), Param::Float(bound as f32));
        }
    }
    Ok(ctx.emit(p, vec![ty]))
}

/// Softmax, LogSoftmax and Hardmax. Before opset 13 the input is coerced to
/// 2D around `axis` (default 1); from 13 on the op is per-axis (default -1).
fn softmax(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let legacy = ctx.opset < 13;
    let axis = ctx.attrs.get_or("axis", if legacy { 1 } else { -1 })?;
    let ty = ctx.input_type(0)?;
    let axis = match ty.rank() {
        Some(rank) => normalize_axis("axis", axis, rank)? as i64,
        None => axis,
    };
    let mut p = params([("axis", Param::Int(axis))]);
    if legacy {
        p.insert("coerce_2d".to_string(), Param::Int(1));
    }
    Ok(ctx.emit(p, vec![ty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::AttributeValue;
    use crate::ir::Type;
    use crate::supported_ops::test_utils::{node, run_node};
    use crate::tensor::{Shape, Tensor, TensorData};

    fn f32_type(dims: &[usize]) -> Option<Type> {
        Some(Type::with_static(ElementType::F32, dims))
    }

    #[test]
    fn test_unary_keeps_input_type() {
        let (function, outputs) = run_node(node("Relu", 1, &[]), &[f32_type(&[2, 3])], &[], 13).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(function.value_type(outputs[0]), Some(&Type::with_static(ElementType::F32, &[2, 3])));
        assert_eq!(function.instruction_count(), 1);
    }

    #[test]
    fn test_unary_arity() {
        let err = run_node(node("Sigmoid", 2, &[]), &[f32_type(&[1]), f32_type(&[1])], &[], 13)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeArity);
    }

    #[test]
    fn test_leaky_relu_default_and_explicit_alpha() {
        let (function, outputs) = run_node(node("LeakyRelu", 1, &[]), &[f32_type(&[4])], &[], 13).unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("alpha"), Some(&Param::Float(0.01)));

        let attrs = [("alpha", AttributeValue::Float(0.2))];
        let (function, outputs) = run_node(node("LeakyRelu", 1, &attrs), &[f32_type(&[4])], &[], 13).unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("alpha"), Some(&Param::Float(0.2)));
    }

    #[test]
    fn test_alpha_with_wrong_tag_is_rejected() {
        let attrs = [("alpha", AttributeValue::Int(1))];
        let err = run_node(node("Elu", 1, &attrs), &[f32_type(&[4])], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AttributeTypeMismatch);
    }

    #[test]
    fn test_softmax_default_axis_follows_opset() {
        let (function, outputs) = run_node(node("Softmax", 1, &[]), &[f32_type(&[2, 3, 4])], &[], 13).unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("axis"), Some(&Param::Int(2)));
        assert_eq!(insn.param("coerce_2d"), None);

        let (function, outputs) = run_node(node("Softmax", 1, &[]), &[f32_type(&[2, 3, 4])], &[], 11).unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("axis"), Some(&Param::Int(1)));
        assert_eq!(insn.param("coerce_2d"), Some(&Param::Int(1)));
    }

    #[test]
    fn test_softmax_axis_out_of_range() {
        let attrs = [("axis", AttributeValue::Int(3))];
        let err = run_node(node("Softmax", 1, &attrs), &[f32_type(&[2, 3])], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_clip_bounds_from_attributes_and_inputs() {
        let attrs = [("min", AttributeValue::Float(0.0)), ("max", AttributeValue::Float(6.0))];
        let (function, outputs) = run_node(node("Clip", 1, &attrs), &[f32_type(&[4])], &[], 6).unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("max"), Some(&Param::Float(6.0)));

        let max = TensorData::F32(Tensor::new(vec![6.0], Shape::scalar()).unwrap());
        let (function, outputs) = run_node(
            node("Clip", 3, &[]),
            &[f32_type(&[4]), None, f32_type(&[])],
            &[(2, max)],
            13,
        )
        .unwrap();
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.operands.len(), 3);
        assert_eq!(insn.operands[1], None);
        assert_eq!(insn.param("max"), Some(&Param::Float(6.0)));
        assert_eq!(insn.param("min"), None);
    }

    #[test]
    fn test_is_nan_yields_bool() {
        let (function, outputs) = run_node(node("IsNaN", 1, &[]), &[f32_type(&[3])], &[], 13).unwrap();
        assert_eq!(function.value_type(outputs[0]), Some(&Type::with_static(ElementType::Bool, &[3])));
    }
}
