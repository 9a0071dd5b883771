use crate::error::ConvertError;
use crate::ir::builder::OpSpec;
use crate::ir::op::params;
use crate::ir::{Dim, Param, Params, Type, ValueId};
use crate::supported_ops::infer::{normalize_axis, window_output};
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::ElementType;

pub(super) fn register(registry: &mut ConverterRegistry) {
    registry.register("Conv", conv);
    registry.register("ConvTranspose", conv_transpose);
    registry.register("MaxPool", max_pool);
    registry.register("AveragePool", average_pool);
    registry.register("GlobalAveragePool", global_pool);
    registry.register("GlobalMaxPool", global_pool);
    registry.register("BatchNormalization", batch_norm);
    registry.register("InstanceNormalization", instance_norm);
    registry.register("LayerNormalization", layer_norm);
    registry.register("LRN", lrn);
    registry.register("Dropout", dropout);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutoPad {
    NotSet,
    SameUpper,
    SameLower,
    Valid,
}

impl AutoPad {
    fn parse(value: &str) -> Result<Self, ConvertError> {
        match value {
            "NOTSET" => Ok(AutoPad::NotSet),
            "SAME_UPPER" => Ok(AutoPad::SameUpper),
            "SAME_LOWER" => Ok(AutoPad::SameLower),
            "VALID" => Ok(AutoPad::Valid),
            other => Err(ConvertError::invalid_attribute(
                "auto_pad",
                format!("unknown mode {other:?}"),
            )),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AutoPad::NotSet => "NOTSET",
            AutoPad::SameUpper => "SAME_UPPER",
            AutoPad::SameLower => "SAME_LOWER",
            AutoPad::Valid => "VALID",
        }
    }
}

/// Sliding window configuration shared by Conv, ConvTranspose and the pools,
/// defaults applied for `spatial` axes.
#[derive(Debug, Clone, PartialEq)]
struct Window {
    kernel: Vec<usize>,
    strides: Vec<usize>,
    dilations: Vec<usize>,
    /// `[begin_0.., end_0..]` as on the wire.
    pads: Vec<usize>,
    auto_pad: AutoPad,
}

fn non_negative(key: &str, values: Vec<i64>) -> Result<Vec<usize>, ConvertError> {
    values
        .into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| ConvertError::invalid_attribute(key, format!("negative value {v}")))
        })
        .collect()
}

fn per_axis(
    ctx: &ConvertContext<'_>,
    key: &str,
    expected: usize,
    default: usize,
) -> Result<Vec<usize>, ConvertError> {
    match ctx.attrs.get::<Vec<i64>>(key)? {
        Some(values) if values.len() != expected => Err(ConvertError::invalid_attribute(
            key,
            format!("expected {expected} values, got {}", values.len()),
        )),
        Some(values) => non_negative(key, values),
        None => Ok(vec![default; expected]),
    }
}

impl Window {
    /// `kernel` comes from `kernel_shape` or, failing that, from `weights`.
    fn read(
        ctx: &ConvertContext<'_>,
        spatial: usize,
        weights: Option<&Type>,
    ) -> Result<Self, ConvertError> {
        let kernel = match ctx.attrs.get::<Vec<i64>>("kernel_shape")? {
            Some(kernel) => non_negative("kernel_shape", kernel)?,
            None => match weights.and_then(Type::static_dims) {
                Some(dims) if dims.len() == spatial + 2 => dims[2..].to_vec(),
                _ => {
                    if weights.is_none() {
                        return Err(ConvertError::MissingAttribute {
                            key: "kernel_shape".to_string(),
                        });
                    }
                    vec![]
                }
            },
        };
        if !kernel.is_empty() && kernel.len() != spatial {
            return Err(ConvertError::invalid_attribute(
                "kernel_shape",
                format!("expected {spatial} values, got {}", kernel.len()),
            ));
        }
        let auto_pad = AutoPad::parse(ctx.attrs.get_or("auto_pad", "NOTSET")?)?;
        Ok(Self {
            kernel,
            strides: per_axis(ctx, "strides", spatial, 1)?,
            dilations: per_axis(ctx, "dilations", spatial, 1)?,
            pads: per_axis(ctx, "pads", spatial * 2, 0)?,
            auto_pad,
        })
    }

    /// Pads for one axis after resolving `auto_pad`, `None` when that needs an unknown size.
    fn axis_pads(&self, axis: usize, input: &Dim) -> Option<(usize, usize)> {
        let spatial = self.strides.len();
        match self.auto_pad {
            AutoPad::NotSet => Some((self.pads[axis], self.pads[axis + spatial])),
            AutoPad::Valid => Some((0, 0)),
            AutoPad::SameUpper | AutoPad::SameLower => {
                let input = input.as_static()?;
                if input == 0 {
                    return Some((0, 0));
                }
                let kernel = *self.kernel.get(axis)?;
                let stride = self.strides[axis].max(1);
                let effective = self.dilations[axis].saturating_mul(kernel.max(1) - 1).saturating_add(1);
                let total = input
                    .div_ceil(stride)
                    .saturating_sub(1)
                    .saturating_mul(stride)
                    .saturating_add(effective)
                    .saturating_sub(input);
                let small = total / 2;
                Some(if self.auto_pad == AutoPad::SameUpper {
                    (small, total - small)
                } else {
                    (total - small, small)
                })
            }
        }
    }

    fn output_dims(&self, spatial_dims: &[Dim], ceil_mode: bool) -> Vec<Dim> {
        spatial_dims
            .iter()
            .enumerate()
            .map(|(axis, input)| {
                let (Some(kernel), Some(pads)) = (self.kernel.get(axis), self.axis_pads(axis, input)) else {
                    return Dim::dynamic();
                };
                window_output(input, *kernel, self.strides[axis], pads, self.dilations[axis], ceil_mode)
            })
            .collect()
    }

    fn params(&self) -> Params {
        let as_i64 = |v: &[usize]| v.iter().map(|&x| x as i64).collect::<Vec<_>>();
        let mut p = params([
            ("strides", Param::Ints(as_i64(&self.strides))),
            ("dilations", Param::Ints(as_i64(&self.dilations))),
            ("pads", Param::Ints(as_i64(&self.pads))),
            ("auto_pad", Param::String(self.auto_pad.as_str().to_string())),
        ]);
        if !self.kernel.is_empty() {
            p.insert("kernel_shape".to_string(), Param::Ints(as_i64(&self.kernel)));
        }
        p
    }
}

/// Input rank must be at least 3 (`N, C, spatial..`) when known.
fn spatial_rank(ctx: &ConvertContext<'_>, input: &Type) -> Result<Option<usize>, ConvertError> {
    match input.rank() {
        Some(rank) if rank < 3 => Err(ConvertError::invalid_attribute(
            "input",
            format!("{} expects at least 3 axes, got {rank}", ctx.op_type()),
        )),
        Some(rank) => Ok(Some(rank - 2)),
        None => Ok(None),
    }
}

/// Number of spatial axes, from the input rank when known, else from the
/// weights or `kernel_shape`.
fn spatial_axes(ctx: &ConvertContext<'_>, x: &Type, weights: Option<&Type>) -> Result<usize, ConvertError> {
    if let Some(spatial) = spatial_rank(ctx, x)? {
        return Ok(spatial);
    }
    if let Some(rank) = weights.and_then(Type::rank) {
        return Ok(rank.saturating_sub(2));
    }
    Ok(ctx
        .attrs
        .get::<Vec<i64>>("kernel_shape")?
        .map(|kernel| kernel.len())
        .unwrap_or_default())
}

fn conv(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 3)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let w = ctx.input_type(1)?;
    let group = ctx.attrs.get_or("group", 1i64)?;
    if group < 1 {
        return Err(ConvertError::invalid_attribute("group", format!("must be positive, got {group}")));
    }
    let spatial = spatial_axes(ctx, &x, Some(&w))?;
    let window = Window::read(ctx, spatial, Some(&w))?;
    let ty = match x.dims() {
        Some(dims) => {
            let channels = w.dims().and_then(|d| d.first().cloned()).unwrap_or_else(Dim::dynamic);
            let mut out = vec![dims[0].clone(), channels];
            out.extend(window.output_dims(&dims[2..], false));
            Type::new(x.element_type, out)
        }
        None => Type::unranked(x.element_type),
    };
    let mut p = window.params();
    p.insert("group".to_string(), Param::Int(group));
    Ok(ctx.emit(p, vec![ty]))
}

fn conv_transpose(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 3)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let w = ctx.input_type(1)?;
    let group = ctx.attrs.get_or("group", 1i64)?;
    if group < 1 {
        return Err(ConvertError::invalid_attribute("group", format!("must be positive, got {group}")));
    }
    let spatial = spatial_axes(ctx, &x, Some(&w))?;
    let window = Window::read(ctx, spatial, Some(&w))?;
    let output_padding = per_axis(ctx, "output_padding", spatial, 0)?;
    let output_shape = ctx.attrs.get::<Vec<i64>>("output_shape")?;

    let ty = match x.dims() {
        Some(dims) => {
            let channels = match w.dims().and_then(|d| d.get(1)).and_then(Dim::as_static) {
                Some(c) => Dim::Static(c.saturating_mul(group as usize)),
                None => Dim::dynamic(),
            };
            let mut out = vec![dims[0].clone(), channels];
            match &output_shape {
                Some(shape) => out.extend(non_negative("output_shape", shape.clone())?.into_iter().map(Dim::Static)),
                None => out.extend(dims[2..].iter().enumerate().map(|(axis, input)| {
                    let (Some(input), Some(kernel)) = (input.as_static(), window.kernel.get(axis)) else {
                        return Dim::dynamic();
                    };
                    let (begin, end) = match window.auto_pad {
                        AutoPad::NotSet => (window.pads[axis], window.pads[axis + spatial]),
                        _ => (0, 0),
                    };
                    let effective = window.dilations[axis].saturating_mul((*kernel).max(1) - 1).saturating_add(1);
                    let full = window.strides[axis]
                        .saturating_mul(input.saturating_sub(1))
                        .saturating_add(output_padding[axis])
                        .saturating_add(effective);
                    match window.auto_pad {
                        AutoPad::SameUpper | AutoPad::SameLower => {
                            Dim::Static(input.saturating_mul(window.strides[axis]))
                        }
                        _ => full
                            .checked_sub(begin.saturating_add(end))
                            .map(Dim::Static)
                            .unwrap_or_else(Dim::dynamic),
                    }
                })),
            }
            Type::new(x.element_type, out)
        }
        None => Type::unranked(x.element_type),
    };
    let mut p = window.params();
    p.insert("group".to_string(), Param::Int(group));
    p.insert(
        "output_padding".to_string(),
        Param::Ints(output_padding.iter().map(|&v| v as i64).collect()),
    );
    if let Some(shape) = output_shape {
        p.insert("output_shape".to_string(), Param::Ints(shape));
    }
    Ok(ctx.emit(p, vec![ty]))
}

fn pool(ctx: &mut ConvertContext<'_>, max: bool) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, if max { 2 } else { 1 })?;
    let x = ctx.input_type(0)?;
    let spatial = spatial_axes(ctx, &x, None)?;
    let window = Window::read(ctx, spatial, None)?;
    let ceil_mode = ctx.attrs.get_or("ceil_mode", 0i64)? != 0;
    let ty = match x.dims() {
        Some(dims) => {
            let mut out = dims[..2].to_vec();
            out.extend(window.output_dims(&dims[2..], ceil_mode));
            Type::new(x.element_type, out)
        }
        None => Type::unranked(x.element_type),
    };
    let mut p = window.params();
    p.insert("ceil_mode".to_string(), Param::Int(ceil_mode as i64));
    let mut types = vec![ty.clone()];
    if max {
        p.insert(
            "storage_order".to_string(),
            Param::Int(ctx.attrs.get_or("storage_order", 0i64)?),
        );
        if ctx.node.outputs.len() == 2 {
            types.push(ty.with_element_type(ElementType::I64));
        }
    } else {
        p.insert(
            "count_include_pad".to_string(),
            Param::Int(ctx.attrs.get_or("count_include_pad", 0i64)?),
        );
    }
    Ok(ctx.emit(p, types))
}

fn max_pool(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    pool(ctx, true)
}

fn average_pool(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    pool(ctx, false)
}

fn global_pool(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let x = ctx.input_type(0)?;
    let ty = match x.dims() {
        Some(dims) if dims.len() >= 2 => {
            let mut out = dims[..2].to_vec();
            out.extend(std::iter::repeat(Dim::Static(1)).take(dims.len() - 2));
            Type::new(x.element_type, out)
        }
        _ => Type::unranked(x.element_type),
    };
    Ok(ctx.emit(Params::new(), vec![ty]))
}

fn batch_norm(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(5, 5)?;
    ctx.check_outputs(1, 5)?;
    let epsilon = ctx.attrs.get_or("epsilon", 1e-5f32)?;
    let momentum = ctx.attrs.get_or("momentum", 0.9f32)?;
    let training_mode = ctx.attrs.get_or("training_mode", 0i64)?;
    // opset 6 and earlier carried `spatial`; only the default layout is supported
    let spatial = ctx.attrs.get_or("spatial", 1i64)?;
    if spatial != 1 {
        return Err(ConvertError::invalid_attribute("spatial", "only spatial=1 is supported"));
    }
    let x = ctx.input_type(0)?;
    let stats = ctx.input_type(3)?;
    let mut types = vec![x];
    types.extend(std::iter::repeat(stats).take(ctx.node.outputs.len() - 1));
    let p = params([
        ("epsilon", Param::Float(epsilon)),
        ("momentum", Param::Float(momentum)),
        ("training_mode", Param::Int(training_mode)),
    ]);
    Ok(ctx.emit(p, types))
}

fn instance_norm(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(3, 3)?;
    ctx.check_outputs(1, 1)?;
    let epsilon = ctx.attrs.get_or("epsilon", 1e-5f32)?;
    let ty = ctx.input_type(0)?;
    Ok(ctx.emit(params([("epsilon", Param::Float(epsilon))]), vec![ty]))
}

/// Optional Mean and InvStdDev outputs keep the leading axes and collapse the rest to 1.
fn layer_norm(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(2, 3)?;
    ctx.check_outputs(1, 3)?;
    let epsilon = ctx.attrs.get_or("epsilon", 1e-5f32)?;
    let stash_type = ctx.attrs.get_or("stash_type", 1i64)?;
    let axis = ctx.attrs.get_or("axis", -1i64)?;
    let x = ctx.input_type(0)?;
    let (axis, stat_type) = match x.dims() {
        Some(dims) => {
            let axis = normalize_axis("axis", axis, dims.len())?;
            let mut stat = dims[..axis].to_vec();
            stat.extend(std::iter::repeat(Dim::Static(1)).take(dims.len() - axis));
            (axis as i64, Type::new(ElementType::F32, stat))
        }
        None => (axis, Type::unranked(ElementType::F32)),
    };
    let mut types = vec![x];
    types.extend(std::iter::repeat(stat_type).take(ctx.node.outputs.len() - 1));
    let p = params([
        ("axis", Param::Int(axis)),
        ("epsilon", Param::Float(epsilon)),
        ("stash_type", Param::Int(stash_type)),
    ]);
    Ok(ctx.emit(p, types))
}

fn lrn(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 1)?;
    ctx.check_outputs(1, 1)?;
    let size: i64 = ctx.attrs.required("size")?;
    if size < 1 {
        return Err(ConvertError::invalid_attribute("size", format!("must be positive, got {size}")));
    }
    let alpha = ctx.attrs.get_or("alpha", 1e-4f32)?;
    let beta = ctx.attrs.get_or("beta", 0.75f32)?;
    let bias = ctx.attrs.get_or("bias", 1.0f32)?;
    let ty = ctx.input_type(0)?;
    let p = params([
        ("size", Param::Int(size)),
        ("alpha", Param::Float(alpha)),
        ("beta", Param::Float(beta)),
        ("bias", Param::Float(bias)),
    ]);
    Ok(ctx.emit(p, vec![ty]))
}

/// Inference only: the data passes through untouched. A requested mask is
/// produced by an instruction of its own.
fn dropout(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, 3)?;
    ctx.check_outputs(1, 2)?;
    // ratio is meaningless at inference time but still part of the node
    ctx.attrs.get::<f32>("ratio")?;
    ctx.attrs.get::<i64>("seed")?;
    let data = ctx.input(0)?;
    let wants_mask = ctx.node.outputs.get(1).is_some_and(|name| !name.is_empty());
    if !wants_mask {
        return Ok(vec![data]);
    }
    let mask_type = ctx.value_type(data)?.with_element_type(ElementType::Bool);
    let mask = ctx.builder.append(OpSpec {
        op_type: "DropoutMask".to_string(),
        name: ctx.node.display_name().to_string(),
        operands: vec![Some(data)],
        params: Params::new(),
        result_names: ctx.node.outputs[1..].to_vec(),
        result_types: vec![mask_type],
    });
    let mut outputs = vec![data];
    outputs.extend(mask);
    Ok(outputs)
}
