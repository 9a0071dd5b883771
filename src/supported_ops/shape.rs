use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Dim, Param, Params, Type, ValueId};
use crate::supported_ops::infer::{broadcast, normalize_axes, normalize_axis, product, static_dims};
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::materialize::{materialize_tensor, resolve_element_type};
use crate::tensor::{ElementType, Shape, Tensor, TensorData};

pub(super) fn register(registry: &mut ConverterRegistry) {
    registry.register("Reshape", reshape);
    registry.register("Flatten", flatten);
    registry.register("Transpose", transpose);
    registry.register("Squeeze", squeeze);
    registry.register("Unsqueeze", unsqueeze);
    registry.register("Concat", concat);
    registry.register("Split", split);
    registry.register("Slice", slice);
    registry.register("Gather", gather);
    registry.register("GatherElements", gather_elements);
    registry.register("Expand", expand);
    registry.register("Tile", tile);
    registry.register("Pad", pad);
    registry.register("Shape", shape);
    registry.register("Size", size);
    registry.register("Cast", cast);
    registry.register("Identity", identity);
    registry.register("Range", range);
    registry.register("ConstantOfShape", constant_of_shape);
    registry.register("OneHot", one_hot);
    registry.register("Resize", resize);
    registry.register("NonZero", non_zero);
}

fn ints(values: &[usize]) -> Param {
    Param::Ints(values.iter().map(|&v| v as i64).collect())
}

/// Integer list that is an attribute before `since` and a constant input from then on.
fn ints_by_opset(
    ctx: &ConvertContext<'_>,
    key: &str,
    input: usize,
    since: i64,
) -> Result<Option<Vec<i64>>, ConvertError> {
    if ctx.opset < since {
        ctx.attrs.get(key)
    } else {
        Ok(ctx.constant_ints(input))
    }
}

/// Rank of a 1D shape-like input, if its length is static.
fn length_of(ty: &Type) -> Option<usize> {
    match ty.static_dims()?.as_slice() {
        [len] => Some(*len),
        _ => None,
    }
}

fn reshape_dims(input: Option<&[Dim]>, target: &[i64], allowzero: bool) -> Result<Vec<Dim>, ConvertError> {
    let mut inferred = None;
    let mut dims = Vec::with_capacity(target.len());
    for (i, &t) in target.iter().enumerate() {
        let dim = match t {
            0 if allowzero => Dim::Static(0),
            0 => input.and_then(|d| d.get(i)).cloned().unwrap_or_else(Dim::dynamic),
            -1 if inferred.is_some() => {
                return Err(ConvertError::invalid_attribute("shape", "more than one -1"));
            }
            -1 => {
                inferred = Some(i);
                Dim::dynamic()
            }
            t if t < 0 => {
                return Err(ConvertError::invalid_attribute("shape", format!("invalid dimension {t}")));
            }
            t => Dim::Static(t as usize),
        };
        dims.push(dim);
    }
    if let Some(i) = inferred {
        let known: Vec<Dim> = dims.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, d)| d.clone()).collect();
        let total = input.and_then(product);
        if let (Some(total), Some(known)) = (total, product(&known)) {
            if known != 0 && total % known == 0 {
                dims[i] = Dim::Static(total / known);
            }
        }
    }
    Ok(dims)
}

fn reshape(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let allowzero = ctx.attrs.get_or("allowzero", 0i64)? != 0;
    let target = if ctx.opset < 5 {
        ctx.check_inputs(1, 1)?;
        Some(ctx.attrs.required::<Vec<i64>>("shape")?)
    } else {
        ctx.check_inputs(2, 2)?;
        ctx.input(1)?;
        ctx.constant_ints(1)
    };
    let x = ctx.input_type(0)?;
    let mut p = params([("allowzero", Param::Int(allowzero as i64))]);
    let ty = match &target {
        Some(target) => {
            p.insert("shape".to_string(), Param::Ints(target.clone()));
            Type::new(x.element_type, reshape_dims(x.dims(), target, allowzero)?)
        }
        None => match length_of(&ctx.input_type(1)?) {
            Some(rank) => Type::with_rank(x.element_type, rank),
            None => Type::unranked(x.element_type),
        },
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn flatten(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let axis = ctx.attrs.get_or("axis", 1i64)?;
    let x = ctx.input_type(0)?;
    let (axis, ty) = match x.dims() {
        Some(dims) => {
            // axis may equal the rank here
            let axis = normalize_axis("axis", axis, dims.len() + 1)?;
            let outer = product(&dims[..axis]).map(Dim::Static).unwrap_or_else(Dim::dynamic);
            let inner = product(&dims[axis..]).map(Dim::Static).unwrap_or_else(Dim::dynamic);
            (axis as i64, Type::new(x.element_type, vec![outer, inner]))
        }
        None => (axis, Type::with_rank(x.element_type, 2)),
    };
    Ok(ctx.emit(params([("axis", Param::Int(axis))]), vec![ty]))
}

fn transpose(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let perm = ctx.attrs.get::<Vec<i64>>("perm")?;
    let x = ctx.input_type(0)?;
    let Some(dims) = x.dims() else {
        let p = perm.map(|perm| params([("perm", Param::Ints(perm))])).unwrap_or_default();
        let ty = x.clone();
        return Ok(ctx.emit(p, vec![ty]));
    };
    let perm = match perm {
        Some(perm) if perm.len() != dims.len() => {
            return Err(ConvertError::invalid_attribute(
                "perm",
                format!("{} entries for rank {}", perm.len(), dims.len()),
            ));
        }
        Some(perm) => normalize_axes("perm", &perm, dims.len())?,
        None => (0..dims.len()).rev().collect(),
    };
    let ty = Type::new(x.element_type, perm.iter().map(|&a| dims[a].clone()).collect());
    Ok(ctx.emit(params([("perm", ints(&perm))]), vec![ty]))
}

fn squeeze(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, if ctx.opset < 13 { 1 } else { 2 })?;
    ctx.check_outputs(1, 1)?;
    let axes_given = (ctx.opset < 13 && ctx.attrs.contains("axes")) || ctx.optional_input(1).is_some();
    let axes = ints_by_opset(ctx, "axes", 1, 13)?;
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let ty = match (x.dims(), axes) {
        (Some(dims), Some(axes)) => {
            let axes = normalize_axes("axes", &axes, dims.len())?;
            for &axis in &axes {
                if let Some(d) = dims[axis].as_static().filter(|&d| d != 1) {
                    return Err(ConvertError::invalid_attribute(
                        "axes",
                        format!("axis {axis} has size {d}, not 1"),
                    ));
                }
            }
            p.insert("axes".to_string(), ints(&axes));
            let kept = dims
                .iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, d)| d.clone())
                .collect();
            Type::new(x.element_type, kept)
        }
        (Some(dims), None) if !axes_given && dims.iter().all(|d| d.as_static().is_some()) => {
            let axes: Vec<usize> = (0..dims.len()).filter(|&i| dims[i] == Dim::Static(1)).collect();
            p.insert("axes".to_string(), ints(&axes));
            Type::new(x.element_type, dims.iter().filter(|&d| *d != Dim::Static(1)).cloned().collect())
        }
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn unsqueeze(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let axes = if ctx.opset < 13 {
        ctx.check_inputs(1, 1)?;
        Some(ctx.attrs.required::<Vec<i64>>("axes")?)
    } else {
        ctx.check_inputs(2, 2)?;
        ctx.input(1)?;
        ctx.constant_ints(1)
    };
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let ty = match (x.dims(), axes) {
        (Some(dims), Some(axes)) => {
            let rank = dims.len() + axes.len();
            let axes = normalize_axes("axes", &axes, rank)?;
            p.insert("axes".to_string(), ints(&axes));
            let mut source = dims.iter();
            let out = (0..rank)
                .map(|i| {
                    if axes.contains(&i) {
                        Dim::Static(1)
                    } else {
                        source.next().cloned().unwrap_or_else(Dim::dynamic)
                    }
                })
                .collect();
            Type::new(x.element_type, out)
        }
        (None, Some(axes)) => {
            p.insert("axes".to_string(), Param::Ints(axes));
            Type::unranked(x.element_type)
        }
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn concat(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, usize::MAX)?;
    ctx.check_outputs(1, 1)?;
    let axis: i64 = ctx.attrs.required("axis")?;
    let types = (0..ctx.inputs.len())
        .map(|i| ctx.input_type(i))
        .collect::<Result<Vec<_>, _>>()?;
    let element_type = types[0].element_type;
    let ranked: Option<Vec<&[Dim]>> = types.iter().map(Type::dims).collect();
    let (axis, ty) = match ranked {
        Some(shapes) => {
            let rank = shapes[0].len();
            if shapes.iter().any(|s| s.len() != rank) {
                return Err(ConvertError::invalid_attribute("axis", "operands differ in rank"));
            }
            let axis = normalize_axis("axis", axis, rank)?;
            let mut dims = shapes[0].to_vec();
            dims[axis] = shapes
                .iter()
                .map(|s| s[axis].as_static())
                .sum::<Option<usize>>()
                .map(Dim::Static)
                .unwrap_or_else(Dim::dynamic);
            (axis as i64, Type::new(element_type, dims))
        }
        None => (axis, Type::unranked(element_type)),
    };
    Ok(ctx.emit(params([("axis", Param::Int(axis))]), vec![ty]))
}

/// Sizes are an attribute before opset 13, an input from 13 on, and may be
/// replaced by even chunks (the last one smaller) when absent.
fn split(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, if ctx.opset < 13 { 1 } else { 2 })?;
    ctx.check_outputs(1, usize::MAX)?;
    let axis = ctx.attrs.get_or("axis", 0i64)?;
    let num_outputs = ctx.attrs.get::<i64>("num_outputs")?;
    let sizes = ints_by_opset(ctx, "split", 1, 13)?;
    let outputs = ctx.node.outputs.len();
    if let Some(n) = num_outputs.filter(|&n| n as usize != outputs) {
        return Err(ConvertError::invalid_attribute(
            "num_outputs",
            format!("{n} declared, node has {outputs} outputs"),
        ));
    }
    if let Some(sizes) = sizes.as_ref().filter(|s| s.len() != outputs) {
        return Err(ConvertError::invalid_attribute(
            "split",
            format!("{} sizes for {outputs} outputs", sizes.len()),
        ));
    }
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let types = match x.dims() {
        Some(dims) => {
            let axis = normalize_axis("axis", axis, dims.len())?;
            p.insert("axis".to_string(), Param::Int(axis as i64));
            let chunks: Vec<Dim> = match (&sizes, dims[axis].as_static()) {
                (Some(sizes), _) => sizes
                    .iter()
                    .map(|&s| usize::try_from(s).map(Dim::Static).unwrap_or_else(|_| Dim::dynamic()))
                    .collect(),
                (None, Some(len)) => {
                    let chunk = len.div_ceil(outputs);
                    (0..outputs)
                        .map(|i| Dim::Static(len.saturating_sub(chunk * i).min(chunk)))
                        .collect()
                }
                (None, None) => vec![Dim::dynamic(); outputs],
            };
            chunks
                .into_iter()
                .map(|chunk| {
                    let mut out = dims.to_vec();
                    out[axis] = chunk;
                    Type::new(x.element_type, out)
                })
                .collect()
        }
        None => {
            p.insert("axis".to_string(), Param::Int(axis));
            vec![Type::unranked(x.element_type); outputs]
        }
    };
    if let Some(sizes) = sizes {
        p.insert("split".to_string(), Param::Ints(sizes));
    }
    Ok(ctx.emit(p, types))
}

/// Length of `start..end` by `step` on an axis of `len`, clamped as ONNX does.
fn slice_len(len: usize, start: i64, end: i64, step: i64) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as i128;
    let resolve = |v: i64| {
        let v = v as i128;
        if v < 0 {
            v + len
        } else {
            v
        }
    };
    let (start, end, step) = (resolve(start), resolve(end), step as i128);
    let count = if step > 0 {
        let (start, end) = (start.clamp(0, len), end.clamp(0, len));
        (end - start + step - 1) / step
    } else {
        let (start, end) = (start.clamp(0, len - 1), end.clamp(-1, len - 1));
        (start - end - step - 1) / -step
    };
    count.max(0) as usize
}

/// Bounds are attributes before opset 10 and inputs `(starts, ends, axes?, steps?)` from then on.
fn slice(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let (starts, ends, axes, steps) = if ctx.opset < 10 {
        ctx.check_inputs(1, 1)?;
        (
            Some(ctx.attrs.required::<Vec<i64>>("starts")?),
            Some(ctx.attrs.required::<Vec<i64>>("ends")?),
            ctx.attrs.get::<Vec<i64>>("axes")?,
            None,
        )
    } else {
        ctx.check_inputs(3, 5)?;
        ctx.input(1)?;
        ctx.input(2)?;
        (
            ctx.constant_ints(1),
            ctx.constant_ints(2),
            ctx.constant_ints(3),
            ctx.constant_ints(4),
        )
    };
    let axes_known = axes.is_some() || ctx.optional_input(3).is_none();
    let steps_known = steps.is_some() || ctx.optional_input(4).is_none();
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let ty = match (x.dims(), starts, ends) {
        (Some(dims), Some(starts), Some(ends)) if axes_known && steps_known => {
            if starts.len() != ends.len() {
                return Err(ConvertError::invalid_attribute("ends", "starts and ends differ in length"));
            }
            let axes = match axes {
                Some(axes) => normalize_axes("axes", &axes, dims.len())?,
                None if starts.len() > dims.len() => {
                    return Err(ConvertError::invalid_attribute(
                        "starts",
                        format!("{} bounds for rank {}", starts.len(), dims.len()),
                    ));
                }
                None => (0..starts.len()).collect(),
            };
            let steps = steps.unwrap_or_else(|| vec![1; starts.len()]);
            if axes.len() != starts.len() || steps.len() != starts.len() {
                return Err(ConvertError::invalid_attribute("axes", "bound lists differ in length"));
            }
            if steps.contains(&0) {
                return Err(ConvertError::invalid_attribute("steps", "step of 0"));
            }
            let mut out = dims.to_vec();
            for (i, &axis) in axes.iter().enumerate() {
                out[axis] = match dims[axis].as_static() {
                    Some(len) => Dim::Static(slice_len(len, starts[i], ends[i], steps[i])),
                    None => Dim::dynamic(),
                };
            }
            p.insert("starts".to_string(), Param::Ints(starts));
            p.insert("ends".to_string(), Param::Ints(ends));
            p.insert("axes".to_string(), ints(&axes));
            p.insert("steps".to_string(), Param::Ints(steps));
            Type::new(x.element_type, out)
        }
        (Some(dims), _, _) => Type::with_rank(x.element_type, dims.len()),
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn gather(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let axis = ctx.attrs.get_or("axis", 0i64)?;
    let data = ctx.input_type(0)?;
    let indices = ctx.input_type(1)?;
    let (axis, ty) = match (data.dims(), indices.dims()) {
        (Some(dims), Some(index_dims)) => {
            let axis = normalize_axis("axis", axis, dims.len())?;
            let mut out = dims[..axis].to_vec();
            out.extend_from_slice(index_dims);
            out.extend_from_slice(&dims[axis + 1..]);
            (axis as i64, Type::new(data.element_type, out))
        }
        (Some(dims), None) => (normalize_axis("axis", axis, dims.len())? as i64, Type::unranked(data.element_type)),
        _ => (axis, Type::unranked(data.element_type)),
    };
    Ok(ctx.emit(params([("axis", Param::Int(axis))]), vec![ty]))
}

fn gather_elements(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let axis = ctx.attrs.get_or("axis", 0i64)?;
    let data = ctx.input_type(0)?;
    let indices = ctx.input_type(1)?;
    let axis = match data.rank() {
        Some(rank) => normalize_axis("axis", axis, rank)? as i64,
        None => axis,
    };
    let ty = indices.with_element_type(data.element_type);
    Ok(ctx.emit(params([("axis", Param::Int(axis))]), vec![ty]))
}

fn expand(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let ty = match ctx.constant_ints(1) {
        Some(shape) => {
            let target: Vec<Dim> = shape
                .iter()
                .map(|&d| usize::try_from(d).map(Dim::Static).unwrap_or_else(|_| Dim::dynamic()))
                .collect();
            p.insert("shape".to_string(), Param::Ints(shape));
            match broadcast(&[x.clone(), Type::new(x.element_type, target)]) {
                Some(dims) => Type::new(x.element_type, dims),
                None => Type::unranked(x.element_type),
            }
        }
        None => match (x.rank(), length_of(&ctx.input_type(1)?)) {
            (Some(rank), Some(len)) => Type::with_rank(x.element_type, rank.max(len)),
            _ => Type::unranked(x.element_type),
        },
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn tile(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 2)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let mut p = Params::new();
    let ty = match (x.dims(), ctx.constant_ints(1)) {
        (Some(dims), Some(repeats)) => {
            if repeats.len() != dims.len() || repeats.iter().any(|&r| r < 0) {
                return Err(ConvertError::invalid_attribute(
                    "repeats",
                    format!("{repeats:?} does not fit rank {}", dims.len()),
                ));
            }
            let out = dims
                .iter()
                .zip(&repeats)
                .map(|(d, &r)| match d.as_static() {
                    Some(d) => d
                        .checked_mul(r as usize)
                        .map(Dim::Static)
                        .ok_or_else(|| ConvertError::invalid_attribute("repeats", format!("{d} * {r} overflows"))),
                    None if r == 1 => Ok(d.clone()),
                    None => Ok(Dim::dynamic()),
                })
                .collect::<Result<_, _>>()?;
            p.insert("repeats".to_string(), Param::Ints(repeats));
            Type::new(x.element_type, out)
        }
        (Some(dims), None) => Type::with_rank(x.element_type, dims.len()),
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(p, vec![ty]))
}

/// Pads are an attribute (with `value`) before opset 11 and inputs
/// `(pads, constant_value?, axes?)` afterwards.
fn pad(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let mode = ctx.attrs.get_or("mode", "constant")?;
    if !matches!(mode, "constant" | "reflect" | "edge" | "wrap") {
        return Err(ConvertError::invalid_attribute("mode", format!("unknown mode {mode:?}")));
    }
    let mut p = params([("mode", Param::String(mode.to_string()))]);
    let (pads, axes) = if ctx.opset < 11 {
        ctx.check_inputs(1, 1)?;
        let pads = ctx.attrs.required::<Vec<i64>>(if ctx.opset < 2 { "paddings" } else { "pads" })?;
        p.insert("value".to_string(), Param::Float(ctx.attrs.get_or("value", 0.0f32)?));
        (Some(pads), None)
    } else {
        ctx.check_inputs(2, 4)?;
        ctx.input(1)?;
        if let Some(value) = ctx.constant_input(2).and_then(|t| t.to_f64_vec().first().copied()) {
            p.insert("value".to_string(), Param::Float(value as f32));
        }
        (ctx.constant_ints(1), ctx.constant_ints(3))
    };
    let axes_known = axes.is_some() || ctx.optional_input(3).is_none();
    let x = ctx.input_type(0)?;
    let ty = match (x.dims(), pads) {
        (Some(dims), Some(pads)) if axes_known => {
            let axes = match axes {
                Some(axes) => normalize_axes("axes", &axes, dims.len())?,
                None => (0..dims.len()).collect(),
            };
            if pads.len() != axes.len() * 2 {
                return Err(ConvertError::invalid_attribute(
                    "pads",
                    format!("{} values for {} axes", pads.len(), axes.len()),
                ));
            }
            let mut out = dims.to_vec();
            for (i, &axis) in axes.iter().enumerate() {
                let Some(d) = dims[axis].as_static() else {
                    out[axis] = Dim::dynamic();
                    continue;
                };
                let grown = i64::try_from(d)
                    .ok()
                    .and_then(|d| d.checked_add(pads[i]))
                    .and_then(|d| d.checked_add(pads[i + axes.len()]))
                    .ok_or_else(|| ConvertError::invalid_attribute("pads", format!("axis {axis} overflows")))?;
                if grown < 0 {
                    return Err(ConvertError::invalid_attribute(
                        "pads",
                        format!("axis {axis} shrinks to {grown}"),
                    ));
                }
                out[axis] = Dim::Static(grown as usize);
            }
            p.insert("pads".to_string(), Param::Ints(pads));
            p.insert("axes".to_string(), ints(&axes));
            Type::new(x.element_type, out)
        }
        (Some(dims), _) => Type::with_rank(x.element_type, dims.len()),
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn shape(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let start = ctx.attrs.get_or("start", 0i64)?;
    let end = ctx.attrs.get::<i64>("end")?;
    let x = ctx.input_type(0)?;
    let Some(dims) = x.dims() else {
        let ty = Type::with_rank(ElementType::I64, 1);
        return Ok(ctx.emit(params([("start", Param::Int(start))]), vec![ty]));
    };
    let rank = dims.len() as i64;
    let clamp = |v: i64| (if v < 0 { v + rank } else { v }).clamp(0, rank) as usize;
    let (start, end) = (clamp(start), clamp(end.unwrap_or(rank)));
    let selected = &dims[start..end.max(start)];
    if let Some(values) = selected.iter().map(Dim::as_static).collect::<Option<Vec<_>>>() {
        let data = TensorData::I64(Tensor {
            shape: Shape::new(vec![values.len()]),
            data: values.into_iter().map(|v| v as i64).collect(),
        });
        log::debug!("folded Shape of {x} into constant {}", ctx.node.outputs[0]);
        return Ok(vec![ctx.builder.create_constant(&ctx.node.outputs[0], data)]);
    }
    let ty = Type::with_static(ElementType::I64, &[selected.len()]);
    let p = params([("start", Param::Int(start as i64)), ("end", Param::Int(end as i64))]);
    Ok(ctx.emit(p, vec![ty]))
}

fn size(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    if let Some(volume) = x.dims().and_then(product) {
        let data = TensorData::I64(Tensor::filled(volume as i64, Shape::scalar()));
        return Ok(vec![ctx.builder.create_constant(&ctx.node.outputs[0], data)]);
    }
    Ok(ctx.emit(Params::new(), vec![Type::scalar(ElementType::I64)]))
}

fn cast(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let to: i64 = ctx.attrs.required("to")?;
    let saturate = ctx.attrs.get_or("saturate", 1i64)?;
    let code = i32::try_from(to).map_err(|_| ConvertError::UnsupportedElementType { code: i32::MAX })?;
    let element_type = resolve_element_type(code)?;
    let ty = ctx.input_type(0)?.with_element_type(element_type);
    let p = params([
        ("to", Param::ElementType(element_type)),
        ("saturate", Param::Int(saturate)),
    ]);
    Ok(ctx.emit(p, vec![ty]))
}

/// Binds the output to the input value itself.
fn identity(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    Ok(vec![ctx.input(0)?])
}

fn range(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(3, 3)?;
    ctx.check_outputs(1, 1)?;
    let start = ctx.input_type(0)?;
    let bounds: Option<Vec<f64>> = (0..3)
        .map(|i| ctx.constant_input(i).and_then(|t| t.to_f64_vec().first().copied()))
        .collect();
    let len = match bounds.as_deref() {
        Some(&[start, limit, delta]) if delta != 0.0 => {
            Dim::Static(((limit - start) / delta).ceil().max(0.0) as usize)
        }
        Some(_) => return Err(ConvertError::invalid_attribute("delta", "delta of 0")),
        None => Dim::dynamic(),
    };
    Ok(ctx.emit(Params::new(), vec![Type::new(start.element_type, vec![len])]))
}

/// Fill value defaults to a float zero.
fn constant_of_shape(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let value = match ctx.attrs.get("value")? {
        Some(tensor) => materialize_tensor(tensor)?,
        None => TensorData::F32(Tensor::filled(0.0, Shape::scalar())),
    };
    if value.len() != 1 {
        return Err(ConvertError::invalid_attribute(
            "value",
            format!("expected one element, got {}", value.len()),
        ));
    }
    let element_type = value.element_type();
    let fill = match value.to_i64_vec() {
        Some(v) => Param::Int(v[0]),
        None => Param::Float(value.to_f64_vec()[0] as f32),
    };
    let mut p = params([("value", fill)]);
    let ty = match ctx.constant_ints(0) {
        Some(shape) => {
            let dims = shape
                .iter()
                .map(|&d| usize::try_from(d))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConvertError::invalid_attribute("input", format!("negative shape {shape:?}")))?;
            p.insert("shape".to_string(), Param::Ints(shape));
            Type::new(element_type, static_dims(&dims))
        }
        None => match length_of(&ctx.input_type(0)?) {
            Some(rank) => Type::with_rank(element_type, rank),
            None => Type::unranked(element_type),
        },
    };
    Ok(ctx.emit(p, vec![ty]))
}

fn one_hot(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(3, 3)?;
    ctx.check_outputs(1, 1)?;
    let axis = ctx.attrs.get_or("axis", -1i64)?;
    let indices = ctx.input_type(0)?;
    let values = ctx.input_type(2)?;
    let depth = ctx
        .constant_input(1)
        .and_then(|t| t.to_f64_vec().first().copied())
        .map(|d| Dim::Static(d as usize))
        .unwrap_or_else(Dim::dynamic);
    let (axis, ty) = match indices.dims() {
        Some(dims) => {
            let axis = normalize_axis("axis", axis, dims.len() + 1)?;
            let mut out = dims.to_vec();
            out.insert(axis, depth);
            (axis as i64, Type::new(values.element_type, out))
        }
        None => (axis, Type::unranked(values.element_type)),
    };
    Ok(ctx.emit(params([("axis", Param::Int(axis))]), vec![ty]))
}

/// Inputs are `(X, scales)` at opset 10 and `(X, roi?, scales?, sizes?)` afterwards.
fn resize(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_outputs(1, 1)?;
    let (scales_at, sizes_at) = if ctx.opset < 11 {
        ctx.check_inputs(2, 2)?;
        (1, None)
    } else {
        ctx.check_inputs(1, 4)?;
        (2, Some(3))
    };
    let mode = ctx.attrs.get_or("mode", "nearest")?;
    if !matches!(mode, "nearest" | "linear" | "cubic") {
        return Err(ConvertError::invalid_attribute("mode", format!("unknown mode {mode:?}")));
    }
    let mut p = params([
        ("mode", Param::String(mode.to_string())),
        (
            "coordinate_transformation_mode",
            Param::String(ctx.attrs.get_or("coordinate_transformation_mode", "half_pixel")?.to_string()),
        ),
        (
            "nearest_mode",
            Param::String(ctx.attrs.get_or("nearest_mode", "round_prefer_floor")?.to_string()),
        ),
        ("cubic_coeff_a", Param::Float(ctx.attrs.get_or("cubic_coeff_a", -0.75f32)?)),
        ("exclude_outside", Param::Int(ctx.attrs.get_or("exclude_outside", 0i64)?)),
        ("extrapolation_value", Param::Float(ctx.attrs.get_or("extrapolation_value", 0.0f32)?)),
        ("antialias", Param::Int(ctx.attrs.get_or("antialias", 0i64)?)),
    ]);
    let x = ctx.input_type(0)?;
    let sizes = sizes_at.and_then(|i| ctx.constant_ints(i)).filter(|s| !s.is_empty());
    let scales = ctx
        .constant_input(scales_at)
        .map(TensorData::to_f64_vec)
        .filter(|s| !s.is_empty());
    let ty = match x.dims() {
        Some(dims) => {
            let out: Vec<Dim> = match (&sizes, &scales) {
                (Some(sizes), _) if sizes.len() == dims.len() => sizes
                    .iter()
                    .map(|&s| usize::try_from(s).map(Dim::Static).unwrap_or_else(|_| Dim::dynamic()))
                    .collect(),
                (None, Some(scales)) if scales.len() == dims.len() => dims
                    .iter()
                    .zip(scales)
                    .map(|(d, s)| match d.as_static() {
                        Some(d) => Dim::Static((d as f64 * s).floor() as usize),
                        None if *s == 1.0 => d.clone(),
                        None => Dim::dynamic(),
                    })
                    .collect(),
                (None, None) => vec![Dim::dynamic(); dims.len()],
                _ => {
                    return Err(ConvertError::invalid_attribute(
                        "scales",
                        format!("resize target does not match rank {}", dims.len()),
                    ));
                }
            };
            Type::new(x.element_type, out)
        }
        None => Type::unranked(x.element_type),
    };
    if let Some(sizes) = sizes {
        p.insert("sizes".to_string(), Param::Ints(sizes));
    }
    if let Some(scales) = scales {
        p.insert("scales".to_string(), Param::Floats(scales.iter().map(|&s| s as f32).collect()));
    }
    Ok(ctx.emit(p, vec![ty]))
}

fn non_zero(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let rows = x.rank().map(Dim::Static).unwrap_or_else(Dim::dynamic);
    let ty = Type::new(ElementType::I64, vec![rows, Dim::dynamic()]);
    Ok(ctx.emit(Params::new(), vec![ty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::{data_type, AttributeValue, Node, TensorPayload, WireTensor};
    use crate::supported_ops::test_utils::{node, run_node};

    fn f32s(dims: &[usize]) -> Option<Type> {
        Some(Type::with_static(ElementType::F32, dims))
    }

    fn i64s(values: Vec<i64>) -> TensorData {
        let len = values.len();
        TensorData::I64(Tensor::new(values, Shape::new(vec![len])).unwrap())
    }

    fn result_type(
        node: Node,
        inputs: &[Option<Type>],
        constants: &[(usize, TensorData)],
        opset: i64,
    ) -> Type {
        let (function, outputs) = run_node(node, inputs, constants, opset).unwrap();
        function.value_type(outputs[0]).unwrap().clone()
    }

    #[test]
    fn test_reshape_zero_and_inferred_dims() {
        let ty = result_type(
            node("Reshape", 2, &[]),
            &[f32s(&[2, 3, 4]), None],
            &[(1, i64s(vec![0, -1]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 12]));

        let err = run_node(
            node("Reshape", 2, &[]),
            &[f32s(&[2, 3, 4]), None],
            &[(1, i64s(vec![-1, -1]))],
            13,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_reshape_runtime_shape_keeps_rank() {
        let shape = Some(Type::with_static(ElementType::I64, &[3]));
        let ty = result_type(node("Reshape", 2, &[]), &[f32s(&[24]), shape], &[], 13);
        assert_eq!(ty, Type::with_rank(ElementType::F32, 3));
    }

    #[test]
    fn test_flatten_and_transpose() {
        let ty = result_type(node("Flatten", 1, &[]), &[f32s(&[2, 3, 4])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 12]));

        let ty = result_type(node("Transpose", 1, &[]), &[f32s(&[2, 3, 4])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[4, 3, 2]));

        let attrs = [("perm", AttributeValue::Ints(vec![0, 2, 1]))];
        let ty = result_type(node("Transpose", 1, &attrs), &[f32s(&[2, 3, 4])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 4, 3]));
    }

    #[test]
    fn test_squeeze_unsqueeze_by_opset() {
        let attrs = [("axes", AttributeValue::Ints(vec![0]))];
        let ty = result_type(node("Squeeze", 1, &attrs), &[f32s(&[1, 3, 1])], &[], 11);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[3, 1]));

        let ty = result_type(node("Squeeze", 1, &[]), &[f32s(&[1, 3, 1])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[3]));

        let ty = result_type(
            node("Unsqueeze", 2, &[]),
            &[f32s(&[3, 4]), None],
            &[(1, i64s(vec![0, -1]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[1, 3, 4, 1]));

        let err = run_node(node("Unsqueeze", 1, &[]), &[f32s(&[3])], &[], 11).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingAttribute);
    }

    #[test]
    fn test_squeeze_non_unit_axis_is_rejected() {
        let attrs = [("axes", AttributeValue::Ints(vec![1]))];
        let err = run_node(node("Squeeze", 1, &attrs), &[f32s(&[1, 3])], &[], 11).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_concat_sums_axis() {
        let attrs = [("axis", AttributeValue::Int(1))];
        let ty = result_type(node("Concat", 2, &attrs), &[f32s(&[2, 3]), f32s(&[2, 5])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 8]));

        let err = run_node(node("Concat", 2, &[]), &[f32s(&[2]), f32s(&[2])], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingAttribute);
    }

    #[test]
    fn test_split_even_and_explicit() {
        let node3 = Node::new("Split", &["in0"], &["a", "b", "c"]);
        let (function, outputs) = run_node(node3, &[f32s(&[7, 2])], &[], 13).unwrap();
        let lens: Vec<String> = outputs.iter().map(|&o| function.value_type(o).unwrap().to_string()).collect();
        assert_eq!(lens, vec!["f32[3,2]", "f32[3,2]", "f32[1,2]"]);

        let node2 = Node::new("Split", &["in0"], &["a", "b"])
            .with_attr("split", AttributeValue::Ints(vec![1, 6]));
        let (function, outputs) = run_node(node2, &[f32s(&[7])], &[], 11).unwrap();
        assert_eq!(function.value_type(outputs[1]), Some(&Type::with_static(ElementType::F32, &[6])));
    }

    #[test]
    fn test_slice_len() {
        assert_eq!(slice_len(10, 0, 5, 1), 5);
        assert_eq!(slice_len(10, -3, i64::MAX, 1), 3);
        assert_eq!(slice_len(10, 1, 8, 3), 3);
        assert_eq!(slice_len(10, -1, i64::MIN, -1), 10);
        assert_eq!(slice_len(10, 5, 2, 1), 0);
    }

    #[test]
    fn test_slice_with_constant_bounds() {
        let ty = result_type(
            node("Slice", 4, &[]),
            &[f32s(&[4, 10]), None, None, None],
            &[(1, i64s(vec![2])), (2, i64s(vec![8])), (3, i64s(vec![1]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[4, 6]));

        let attrs = [
            ("starts", AttributeValue::Ints(vec![1])),
            ("ends", AttributeValue::Ints(vec![3])),
        ];
        let ty = result_type(node("Slice", 1, &attrs), &[f32s(&[4, 10])], &[], 9);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 10]));
    }

    #[test]
    fn test_slice_more_bounds_than_axes_is_rejected() {
        let attrs = [
            ("starts", AttributeValue::Ints(vec![0, 0])),
            ("ends", AttributeValue::Ints(vec![1, 1])),
        ];
        let err = run_node(node("Slice", 1, &attrs), &[f32s(&[4])], &[], 9).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_gather_inserts_index_dims() {
        let attrs = [("axis", AttributeValue::Int(1))];
        let indices = Some(Type::with_static(ElementType::I64, &[5, 6]));
        let ty = result_type(node("Gather", 2, &attrs), &[f32s(&[2, 3, 4]), indices], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 5, 6, 4]));
    }

    #[test]
    fn test_expand_and_tile() {
        let ty = result_type(
            node("Expand", 2, &[]),
            &[f32s(&[3, 1]), None],
            &[(1, i64s(vec![2, 1, 6]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 3, 6]));

        let ty = result_type(
            node("Tile", 2, &[]),
            &[f32s(&[3, 2]), None],
            &[(1, i64s(vec![2, 2]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[6, 4]));
    }

    #[test]
    fn test_pad_by_opset() {
        let attrs = [("pads", AttributeValue::Ints(vec![0, 1, 0, 1]))];
        let ty = result_type(node("Pad", 1, &attrs), &[f32s(&[2, 2])], &[], 2);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[2, 4]));

        let ty = result_type(
            node("Pad", 2, &[]),
            &[f32s(&[2, 2]), None],
            &[(1, i64s(vec![1, 0, 1, 0]))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[4, 2]));
    }

    #[test]
    fn test_oversized_pads_and_repeats_are_rejected() {
        let err = run_node(
            node("Pad", 2, &[]),
            &[f32s(&[2]), None],
            &[(1, i64s(vec![i64::MAX, 1]))],
            11,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);

        let err = run_node(
            node("Tile", 2, &[]),
            &[f32s(&[3]), None],
            &[(1, i64s(vec![i64::MAX]))],
            13,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }

    #[test]
    fn test_shape_and_size_fold_when_static() {
        let (function, outputs) = run_node(node("Shape", 1, &[]), &[f32s(&[2, 3])], &[], 13).unwrap();
        assert_eq!(function.instruction_count(), 0);
        assert_eq!(function.constant(outputs[0]).unwrap().to_i64_vec(), Some(vec![2, 3]));

        let (function, outputs) = run_node(node("Size", 1, &[]), &[f32s(&[2, 3])], &[], 13).unwrap();
        assert_eq!(function.constant(outputs[0]).unwrap().to_i64_vec(), Some(vec![6]));

        let dynamic = Some(Type::new(ElementType::F32, vec![Dim::dynamic(), Dim::Static(3)]));
        let ty = result_type(node("Shape", 1, &[]), &[dynamic], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::I64, &[2]));
    }

    #[test]
    fn test_cast_resolves_target() {
        let attrs = [("to", AttributeValue::Int(data_type::FLOAT16 as i64))];
        let ty = result_type(node("Cast", 1, &attrs), &[f32s(&[3])], &[], 13);
        assert_eq!(ty, Type::with_static(ElementType::F16, &[3]));

        let attrs = [("to", AttributeValue::Int(data_type::STRING as i64))];
        let err = run_node(node("Cast", 1, &attrs), &[f32s(&[3])], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedElementType);
    }

    #[test]
    fn test_identity_is_passthrough() {
        let (function, outputs) = run_node(node("Identity", 1, &[]), &[f32s(&[3])], &[], 13).unwrap();
        assert_eq!(outputs, function.placeholders);
    }

    #[test]
    fn test_range_length() {
        let scalar = |v: i64| TensorData::I64(Tensor::filled(v, Shape::scalar()));
        let ty = result_type(
            node("Range", 3, &[]),
            &[None, None, None],
            &[(0, scalar(1)), (1, scalar(10)), (2, scalar(3))],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::I64, &[3]));
    }

    #[test]
    fn test_constant_of_shape_value() {
        let value = WireTensor::new("", data_type::INT64, vec![1], TensorPayload::Int64s(vec![7]));
        let attrs = [("value", AttributeValue::Tensor(value))];
        let (function, outputs) = run_node(
            node("ConstantOfShape", 1, &attrs),
            &[None],
            &[(0, i64s(vec![2, 2]))],
            13,
        )
        .unwrap();
        assert_eq!(function.value_type(outputs[0]), Some(&Type::with_static(ElementType::I64, &[2, 2])));
        let insn = function.producer(outputs[0]).unwrap();
        assert_eq!(insn.param("value"), Some(&Param::Int(7)));

        let ty = result_type(node("ConstantOfShape", 1, &[]), &[None], &[(0, i64s(vec![3]))], 13);
        assert_eq!(ty, Type::with_static(ElementType::F32, &[3]));
    }

    #[test]
    fn test_one_hot_inserts_depth() {
        let depth = TensorData::I64(Tensor::filled(10, Shape::scalar()));
        let ty = result_type(
            node("OneHot", 3, &[]),
            &[Some(Type::with_static(ElementType::I64, &[4])), None, f32s(&[2])],
            &[(1, depth)],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[4, 10]));
    }

    #[test]
    fn test_resize_from_scales() {
        let scales = TensorData::F32(Tensor::new(vec![1.0, 1.0, 2.0, 2.0], Shape::new(vec![4])).unwrap());
        let ty = result_type(
            node("Resize", 3, &[]),
            &[f32s(&[1, 3, 8, 8]), None, None],
            &[(2, scales)],
            13,
        );
        assert_eq!(ty, Type::with_static(ElementType::F32, &[1, 3, 16, 16]));
    }

    #[test]
    fn test_non_zero_shape() {
        let ty = result_type(node("NonZero", 1, &[]), &[f32s(&[3, 4])], &[], 13);
        assert_eq!(ty, Type::new(ElementType::I64, vec![Dim::Static(2), Dim::dynamic()]));
    }
}
