use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Param, Params, Type, ValueId};
use crate::supported_ops::infer::broadcast_type;
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::ElementType;

const ARITHMETIC: &[&str] = &["Add", "Sub", "Mul", "Div", "Pow", "And", "Or", "Xor"];
const COMPARISON: &[&str] = &["Equal", "Less", "LessOrEqual", "Greater", "GreaterOrEqual"];
const VARIADIC: &[&str] = &["Max", "Min", "Sum", "Mean"];

pub(super) fn register(registry: &mut ConverterRegistry) {
    for op in ARITHMETIC {
        registry.register(op, arithmetic);
    }
    for op in COMPARISON {
        registry.register(op, comparison);
    }
    for op in VARIADIC {
        registry.register(op, variadic);
    }
    registry.register("Mod", modulo);
    registry.register("BitShift", bit_shift);
    registry.register("Where", select);
}

fn operand_types(ctx: &ConvertContext<'_>) -> Result<Vec<Type>, ConvertError> {
    (0..ctx.inputs.len()).map(|i| ctx.input_type(i)).collect()
}

/// Result element type follows the first operand (Pow's exponent may differ).
fn binary(ctx: &mut ConvertContext<'_>, params: Params) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let types = operand_types(ctx)?;
    let ty = broadcast_type(types[0].element_type, &types);
    Ok(ctx.emit(params, vec![ty]))
}

fn arithmetic(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    binary(ctx, Params::new())
}

fn comparison(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let types = operand_types(ctx)?;
    let ty = broadcast_type(ElementType::Bool, &types);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

fn variadic(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, usize::MAX)?;
    ctx.check_outputs(1, 1)?;
    let types = operand_types(ctx)?;
    let ty = broadcast_type(types[0].element_type, &types);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

fn modulo(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    let fmod = ctx.attrs.get_or("fmod", 0i64)?;
    if !matches!(fmod, 0 | 1) {
        return Err(ConvertError::invalid_attribute("fmod", format!("expected 0 or 1, got {fmod}")));
    }
    binary(ctx, params([("fmod", Param::Int(fmod))]))
}

fn bit_shift(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    let direction: &str = ctx.attrs.required("direction")?;
    if !matches!(direction, "LEFT" | "RIGHT") {
        return Err(ConvertError::invalid_attribute(
            "direction",
            format!("expected LEFT or RIGHT, got {direction:?}"),
        ));
    }
    binary(ctx, params([("direction", Param::String(direction.to_string()))]))
}

/// `Where(cond, x, y)`, typed like `x`.
fn select(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(3, 3)?;
    ctx.check_outputs(1, 1)?;
    let types = operand_types(ctx)?;
    let ty = broadcast_type(types[1].element_type, &types);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::AttributeValue;
    use crate::ir::Dim;
    use crate::supported_ops::test_utils::{node, run_node};

    #[test]
    fn test_add_broadcasts() {
        let a = Some(Type::with_static(ElementType::F32, &[8, 1, 6]));
        let b = Some(Type::with_static(ElementType::F32, &[7, 1]));
        let (function, outputs) = run_node(node("Add", 2, &[]), &[a, b], &[], 13).unwrap();
        assert_eq!(
            function.value_type(outputs[0]),
            Some(&Type::with_static(ElementType::F32, &[8, 7, 6]))
        );
    }

    #[test]
    fn test_comparison_yields_bool_and_keeps_dynamic_axes() {
        let a = Some(Type::new(ElementType::I64, vec![Dim::Dynamic(Some("n".into()))]));
        let b = Some(Type::scalar(ElementType::I64));
        let (function, outputs) = run_node(node("Less", 2, &[]), &[a, b], &[], 13).unwrap();
        assert_eq!(
            function.value_type(outputs[0]),
            Some(&Type::new(ElementType::Bool, vec![Dim::Dynamic(Some("n".into()))]))
        );
    }

    #[test]
    fn test_variadic_accepts_many_operands() {
        let t = Some(Type::with_static(ElementType::F32, &[3]));
        let (function, outputs) = run_node(node("Sum", 4, &[]), &[t.clone(), t.clone(), t.clone(), t], &[], 13).unwrap();
        assert_eq!(function.producer(outputs[0]).unwrap().operands.len(), 4);
    }

    #[test]
    fn test_binary_with_one_input_is_arity_error() {
        let t = Some(Type::with_static(ElementType::F32, &[3]));
        let err = run_node(node("Mul", 1, &[]), &[t], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidNodeArity);
    }

    #[test]
    fn test_bit_shift_requires_direction() {
        let t = Some(Type::with_static(ElementType::U8, &[3]));
        let err = run_node(node("BitShift", 2, &[]), &[t.clone(), t.clone()], &[], 13).err().unwrap();
        assert_eq!(
            err,
            ConvertError::MissingAttribute {
                key: "direction".into()
            }
        );

        let attrs = [("direction", AttributeValue::String("UP".into()))];
        let err = run_node(node("BitShift", 2, &attrs), &[t.clone(), t], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_where_typed_like_x() {
        let cond = Some(Type::with_static(ElementType::Bool, &[2, 1]));
        let x = Some(Type::with_static(ElementType::F16, &[1, 5]));
        let y = Some(Type::scalar(ElementType::F16));
        let (function, outputs) = run_node(node("Where", 3, &[]), &[cond, x, y], &[], 13).unwrap();
        assert_eq!(
            function.value_type(outputs[0]),
            Some(&Type::with_static(ElementType::F16, &[2, 5]))
        );
    }
}
