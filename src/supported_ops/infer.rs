use crate::error::ConvertError;
use crate::ir::{Dim, Type};
use crate::tensor::ElementType;

/// Numpy style broadcast of the given shapes, `None` if any rank is unknown.
pub fn broadcast(types: &[Type]) -> Option<Vec<Dim>> {
    let shapes: Vec<&[Dim]> = types.iter().map(Type::dims).collect::<Option<_>>()?;
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = Vec::with_capacity(rank);
    for axis in 0..rank {
        let mut dim = Dim::Static(1);
        for shape in &shapes {
            let Some(offset) = (axis + shape.len()).checked_sub(rank) else {
                continue;
            };
            dim = broadcast_dim(&dim, &shape[offset]);
        }
        out.push(dim);
    }
    Some(out)
}

fn broadcast_dim(acc: &Dim, next: &Dim) -> Dim {
    match (acc, next) {
        (Dim::Static(1), other) => other.clone(),
        (_, Dim::Static(1)) => acc.clone(),
        (Dim::Static(a), Dim::Static(b)) if a == b => acc.clone(),
        (Dim::Static(a), Dim::Static(b)) => {
            log::debug!("incompatible broadcast dims {a} and {b}, leaving axis dynamic");
            Dim::dynamic()
        }
        (Dim::Dynamic(Some(a)), Dim::Dynamic(Some(b))) if a == b => acc.clone(),
        (Dim::Static(_), Dim::Dynamic(_)) => acc.clone(),
        (Dim::Dynamic(_), Dim::Static(_)) => next.clone(),
        _ => Dim::dynamic(),
    }
}

/// Broadcast result type with the given element type.
pub fn broadcast_type(element_type: ElementType, types: &[Type]) -> Type {
    match broadcast(types) {
        Some(dims) => Type::new(element_type, dims),
        None => Type::unranked(element_type),
    }
}

/// Maps a possibly negative axis into `0..rank`.
pub fn normalize_axis(key: &str, axis: i64, rank: usize) -> Result<usize, ConvertError> {
    let rank = rank as i64;
    let normalized = if axis < 0 { axis + rank } else { axis };
    if normalized < 0 || normalized >= rank {
        return Err(ConvertError::invalid_attribute(
            key,
            format!("axis {axis} out of range for rank {rank}"),
        ));
    }
    Ok(normalized as usize)
}

/// Normalizes every axis and rejects repeats.
pub fn normalize_axes(key: &str, axes: &[i64], rank: usize) -> Result<Vec<usize>, ConvertError> {
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let axis = normalize_axis(key, axis, rank)?;
        if out.contains(&axis) {
            return Err(ConvertError::invalid_attribute(
                key,
                format!("axis {axis} listed twice"),
            ));
        }
        out.push(axis);
    }
    Ok(out)
}

/// Output length of one spatial axis of a sliding window.
pub fn window_output(
    input: &Dim,
    kernel: usize,
    stride: usize,
    pads: (usize, usize),
    dilation: usize,
    ceil_mode: bool,
) -> Dim {
    let Some(input) = input.as_static() else {
        return Dim::dynamic();
    };
    let effective = dilation.saturating_mul(kernel.max(1) - 1).saturating_add(1);
    let padded = input.saturating_add(pads.0).saturating_add(pads.1);
    if padded < effective || stride == 0 {
        return Dim::dynamic();
    }
    let span = padded - effective;
    let steps = if ceil_mode {
        span.div_ceil(stride)
    } else {
        span / stride
    };
    Dim::Static(steps + 1)
}

pub fn static_dims(dims: &[usize]) -> Vec<Dim> {
    dims.iter().map(|&d| Dim::Static(d)).collect()
}

/// Product of the axes, `None` if any is dynamic.
pub fn product(dims: &[Dim]) -> Option<usize> {
    dims.iter().map(Dim::as_static).product()
}
