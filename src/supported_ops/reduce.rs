use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Dim, Param, Type, ValueId};
use crate::supported_ops::infer::{normalize_axes, normalize_axis};
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::ElementType;

const REDUCTIONS: &[&str] = &[
    "ReduceMax",
    "ReduceMin",
    "ReduceMean",
    "ReduceSum",
    "ReduceProd",
    "ReduceL2",
];

pub(super) fn register(registry: &mut ConverterRegistry) {
    for op in REDUCTIONS {
        registry.register(op, reduce);
    }
    registry.register("ArgMax", arg_reduce);
    registry.register("ArgMin", arg_reduce);
    registry.register("TopK", top_k);
}

/// Opset from which `axes` moved from attribute to input.
fn axes_input_since(op_type: &str) -> i64 {
    if op_type == "ReduceSum" {
        13
    } else {
        18
    }
}

fn reduced_dims(dims: &[Dim], axes: &[usize], keepdims: bool) -> Vec<Dim> {
    dims.iter()
        .enumerate()
        .filter_map(|(axis, dim)| match (axes.contains(&axis), keepdims) {
            (false, _) => Some(dim.clone()),
            (true, true) => Some(Dim::Static(1)),
            (true, false) => None,
        })
        .collect()
}

fn reduce(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let keepdims = ctx.attrs.get_or("keepdims", 1i64)? != 0;
    let noop_with_empty_axes = ctx.attrs.get_or("noop_with_empty_axes", 0i64)? != 0;
    let axes: Option<Vec<i64>> = if ctx.opset < axes_input_since(ctx.op_type()) {
        ctx.check_inputs(1, 1)?;
        ctx.attrs.get("axes")?
    } else {
        ctx.check_inputs(1, 2)?;
        match ctx.optional_input(1) {
            None => None,
            Some(_) => match ctx.constant_ints(1) {
                Some(axes) => Some(axes),
                // axes only known at run time
                None => {
                    let x = ctx.input_type(0)?;
                    let ty = match (keepdims, x.rank()) {
                        (true, Some(rank)) => Type::with_rank(x.element_type, rank),
                        _ => Type::unranked(x.element_type),
                    };
                    let p = params([("keepdims", Param::Int(keepdims as i64))]);
                    return Ok(ctx.emit(p, vec![ty]));
                }
            },
        }
    };
    let axes = axes.filter(|a| !a.is_empty());
    let x = ctx.input_type(0)?;
    if axes.is_none() && noop_with_empty_axes {
        let p = params([("noop_with_empty_axes", Param::Int(1))]);
        let operands = vec![ctx.optional_input(0)];
        return Ok(ctx.emit_op("Identity", operands, p, vec![x]));
    }
    let mut p = params([("keepdims", Param::Int(keepdims as i64))]);
    let ty = match x.dims() {
        Some(dims) => {
            let axes = match &axes {
                Some(axes) => normalize_axes("axes", axes, dims.len())?,
                None => (0..dims.len()).collect(),
            };
            p.insert(
                "axes".to_string(),
                Param::Ints(axes.iter().map(|&a| a as i64).collect()),
            );
            Type::new(x.element_type, reduced_dims(dims, &axes, keepdims))
        }
        None => {
            if let Some(axes) = axes {
                p.insert("axes".to_string(), Param::Ints(axes));
            }
            Type::unranked(x.element_type)
        }
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn arg_reduce(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let axis = ctx.attrs.get_or("axis", 0i64)?;
    let keepdims = ctx.attrs.get_or("keepdims", 1i64)? != 0;
    let select_last_index = ctx.attrs.get_or("select_last_index", 0i64)?;
    let x = ctx.input_type(0)?;
    let (axis, ty) = match x.dims() {
        Some(dims) => {
            let axis = normalize_axis("axis", axis, dims.len())?;
            (
                axis as i64,
                Type::new(ElementType::I64, reduced_dims(dims, &[axis], keepdims)),
            )
        }
        None => (axis, Type::unranked(ElementType::I64)),
    };
    let p = params([
        ("axis", Param::Int(axis)),
        ("keepdims", Param::Int(keepdims as i64)),
        ("select_last_index", Param::Int(select_last_index)),
    ]);
    Ok(ctx.emit(p, vec![ty]))
}

/// `k` is an attribute before opset 10 and an input afterwards.
fn top_k(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(2, 2)?;
    let k = if ctx.opset < 10 {
        ctx.check_inputs(1, 1)?;
        Some(ctx.attrs.required::<i64>("k")?)
    } else {
        ctx.check_inputs(2, 2)?;
        ctx.input(1)?;
        ctx.constant_ints(1).and_then(|k| k.first().copied())
    };
    let axis = ctx.attrs.get_or("axis", -1i64)?;
    let largest = ctx.attrs.get_or("largest", 1i64)?;
    let sorted = ctx.attrs.get_or("sorted", 1i64)?;
    let x = ctx.input_type(0)?;
    let (axis, dims) = match x.dims() {
        Some(dims) => {
            let axis = normalize_axis("axis", axis, dims.len())?;
            let mut dims = dims.to_vec();
            dims[axis] = match k {
                Some(k) if k >= 0 => Dim::Static(k as usize),
                Some(k) => return Err(ConvertError::invalid_attribute("k", format!("negative k {k}"))),
                None => Dim::dynamic(),
            };
            (axis as i64, Some(dims))
        }
        None => (axis, None),
    };
    let mut p = params([
        ("axis", Param::Int(axis)),
        ("largest", Param::Int(largest)),
        ("sorted", Param::Int(sorted)),
    ]);
    if let Some(k) = k {
        p.insert("k".to_string(), Param::Int(k));
    }
    let values = Type {
        element_type: x.element_type,
        shape: dims.clone(),
    };
    let indices = Type {
        element_type: ElementType::I64,
        shape: dims,
    };
    Ok(ctx.emit(p, vec![values, indices]))
}
