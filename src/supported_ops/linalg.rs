use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Dim, Param, Params, Type, ValueId};
use crate::supported_ops::infer::broadcast;
use crate::supported_ops::{ConvertContext, ConverterRegistry};

pub(super) fn register(registry: &mut ConverterRegistry) {
    registry.register("MatMul", matmul);
    registry.register("Gemm", gemm);
}

/// Numpy matmul shape: 1D operands are promoted and the promoted axis dropped
/// again, leading axes broadcast.
pub(crate) fn matmul_type(a: &Type, b: &Type) -> Type {
    let element_type = a.element_type;
    let (Some(a_dims), Some(b_dims)) = (a.dims(), b.dims()) else {
        return Type::unranked(element_type);
    };
    if a_dims.is_empty() || b_dims.is_empty() {
        return Type::unranked(element_type);
    }
    let mut a_dims = a_dims.to_vec();
    let mut b_dims = b_dims.to_vec();
    let a_vector = a_dims.len() == 1;
    let b_vector = b_dims.len() == 1;
    if a_vector {
        a_dims.insert(0, Dim::Static(1));
    }
    if b_vector {
        b_dims.push(Dim::Static(1));
    }
    let m = a_dims[a_dims.len() - 2].clone();
    let n = b_dims[b_dims.len() - 1].clone();
    let batch_a = Type::new(element_type, a_dims[..a_dims.len() - 2].to_vec());
    let batch_b = Type::new(element_type, b_dims[..b_dims.len() - 2].to_vec());
    let Some(mut dims) = broadcast(&[batch_a, batch_b]) else {
        return Type::unranked(element_type);
    };
    if !a_vector {
        dims.push(m);
    }
    if !b_vector {
        dims.push(n);
    }
    Type::new(element_type, dims)
}

fn matmul(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let ty = matmul_type(&ctx.input_type(0)?, &ctx.input_type(1)?);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

/// `alpha * A' * B' + beta * C` on 2D operands.
fn gemm(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 3)?;
    ctx.check_outputs(1, 1)?;
    let alpha = ctx.attrs.get_or("alpha", 1.0f32)?;
    let beta = ctx.attrs.get_or("beta", 1.0f32)?;
    let trans_a = ctx.attrs.get_or("transA", 0i64)? != 0;
    let trans_b = ctx.attrs.get_or("transB", 0i64)? != 0;

    let a = ctx.input_type(0)?;
    let b = ctx.input_type(1)?;
    let pick = |ty: &Type, transposed: bool, row: bool| -> Dim {
        match ty.dims() {
            Some([first, second]) => {
                if row != transposed {
                    first.clone()
                } else {
                    second.clone()
                }
            }
            _ => Dim::dynamic(),
        }
    };
    let ty = Type::new(a.element_type, vec![pick(&a, trans_a, true), pick(&b, trans_b, false)]);
    let p = params([
        ("alpha", Param::Float(alpha)),
        ("beta", Param::Float(beta)),
        ("transA", Param::Int(trans_a as i64)),
        ("transB", Param::Int(trans_b as i64)),
    ]);
    Ok(ctx.emit(p, vec![ty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AttributeValue;
    use crate::supported_ops::test_utils::{node, run_node};
    use crate::tensor::ElementType;

    fn f32s(dims: &[usize]) -> Type {
        Type::with_static(ElementType::F32, dims)
    }

    #[test]
    fn test_matmul_type() {
        assert_eq!(matmul_type(&f32s(&[2, 3]), &f32s(&[3, 4])), f32s(&[2, 4]));
        assert_eq!(matmul_type(&f32s(&[5, 1, 2, 3]), &f32s(&[7, 3, 4])), f32s(&[5, 7, 2, 4]));
        assert_eq!(matmul_type(&f32s(&[3]), &f32s(&[3, 4])), f32s(&[4]));
        assert_eq!(matmul_type(&f32s(&[2, 3]), &f32s(&[3])), f32s(&[2]));
        assert_eq!(matmul_type(&f32s(&[3]), &f32s(&[3])), f32s(&[]));
        assert_eq!(
            matmul_type(&Type::unranked(ElementType::F32), &f32s(&[3])),
            Type::unranked(ElementType::F32)
        );
    }

    #[test]
    fn test_gemm_transposes() {
        let attrs = [("transB", AttributeValue::Int(1)), ("alpha", AttributeValue::Float(0.5))];
        let (function, outputs) = run_node(
            node("Gemm", 3, &attrs),
            &[Some(f32s(&[2, 3])), Some(f32s(&[4, 3])), Some(f32s(&[4]))],
            &[],
            13,
        )
        .unwrap();
        assert_eq!(function.value_type(outputs[0]), Some(&f32s(&[2, 4])));
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("alpha"), Some(&Param::Float(0.5)));
        assert_eq!(insn.param("beta"), Some(&Param::Float(1.0)));
        assert_eq!(insn.param("transA"), Some(&Param::Int(0)));
        assert_eq!(insn.param("transB"), Some(&Param::Int(1)));
    }
}
