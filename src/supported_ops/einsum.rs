use std::collections::{BTreeMap, HashMap};

use crate::error::ConvertError;
use crate::ir::op::params;
use crate::ir::{Dim, Param, Type, ValueId};
use crate::supported_ops::infer::broadcast;
use crate::supported_ops::{ConvertContext, ConverterRegistry};

pub(super) fn register(registry: &mut ConverterRegistry) {
    registry.register("Einsum", einsum);
}

const ELLIPSIS: &str = "...";

/// Parsed equation. `None` entries in a term stand for the ellipsis.
#[derive(Debug, PartialEq)]
struct Equation {
    inputs: Vec<Vec<Option<char>>>,
    output: Vec<Option<char>>,
}

fn parse_term(term: &str) -> Result<Vec<Option<char>>, ConvertError> {
    let term = term.trim();
    let mut labels = vec![];
    let mut rest = term;
    let mut seen_ellipsis = false;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(ELLIPSIS) {
            if seen_ellipsis {
                return Err(invalid(format!("term {term:?} has more than one ellipsis")));
            }
            seen_ellipsis = true;
            labels.push(None);
            rest = tail;
            continue;
        }
        let mut chars = rest.chars();
        let Some(c) = chars.next() else { break };
        if !c.is_ascii_alphabetic() {
            return Err(invalid(format!("unexpected {c:?} in term {term:?}")));
        }
        labels.push(Some(c));
        rest = chars.as_str();
    }
    Ok(labels)
}

fn invalid(reason: String) -> ConvertError {
    ConvertError::invalid_attribute("equation", reason)
}

fn parse_equation(equation: &str) -> Result<Equation, ConvertError> {
    let equation: String = equation.chars().filter(|c| !c.is_whitespace()).collect();
    let (lhs, rhs) = match equation.split_once("->") {
        Some((lhs, rhs)) => (lhs, Some(rhs)),
        None => (equation.as_str(), None),
    };
    let inputs = lhs.split(',').map(parse_term).collect::<Result<Vec<_>, _>>()?;
    let output = match rhs {
        Some(rhs) => parse_term(rhs)?,
        None => {
            // implicit form: labels used exactly once, alphabetically, after the ellipsis
            let mut counts: BTreeMap<char, usize> = BTreeMap::new();
            let mut has_ellipsis = false;
            for label in inputs.iter().flatten() {
                match label {
                    Some(c) => *counts.entry(*c).or_default() += 1,
                    None => has_ellipsis = true,
                }
            }
            let mut output: Vec<Option<char>> = if has_ellipsis { vec![None] } else { vec![] };
            output.extend(counts.into_iter().filter(|(_, n)| *n == 1).map(|(c, _)| Some(c)));
            output
        }
    };
    Ok(Equation { inputs, output })
}

fn output_type(equation: &Equation, operands: &[Type]) -> Result<Type, ConvertError> {
    let element_type = operands[0].element_type;
    if equation.inputs.len() != operands.len() {
        return Err(invalid(format!(
            "{} terms for {} operands",
            equation.inputs.len(),
            operands.len()
        )));
    }
    let mut symbol_dimensions: HashMap<char, Dim> = HashMap::new();
    let mut ellipsis_shapes = vec![];
    for (term, operand) in equation.inputs.iter().zip(operands) {
        let Some(dims) = operand.dims() else {
            return Ok(Type::unranked(element_type));
        };
        let named = term.iter().filter(|l| l.is_some()).count();
        let has_ellipsis = named < term.len();
        if (has_ellipsis && dims.len() < named) || (!has_ellipsis && dims.len() != named) {
            return Err(invalid(format!("term of {} labels for rank {}", term.len(), dims.len())));
        }
        let ellipsis_rank = dims.len() - named;
        let mut axis = 0;
        for label in term {
            match label {
                Some(c) => {
                    let dim = &dims[axis];
                    // keep the first static size seen for a label
                    let slot = symbol_dimensions.entry(*c).or_insert_with(|| dim.clone());
                    if slot.as_static().is_none() && dim.as_static().is_some() {
                        *slot = dim.clone();
                    }
                    axis += 1;
                }
                None => {
                    ellipsis_shapes.push(Type::new(element_type, dims[axis..axis + ellipsis_rank].to_vec()));
                    axis += ellipsis_rank;
                }
            }
        }
    }
    let ellipsis_dims = broadcast(&ellipsis_shapes).unwrap_or_default();
    let mut dims = vec![];
    for label in &equation.output {
        match label {
            Some(c) => dims.push(
                symbol_dimensions
                    .get(c)
                    .cloned()
                    .ok_or_else(|| invalid(format!("output label {c:?} not in any input")))?,
            ),
            None => dims.extend(ellipsis_dims.iter().cloned()),
        }
    }
    Ok(Type::new(element_type, dims))
}

fn einsum(ctx: &mut ConvertContext<'_>) -> Result<Vec<ValueId>, ConvertError> {
    ctx.check_inputs(1, usize::MAX)?;
    ctx.check_outputs(1, 1)?;
    let equation: &str = ctx.attrs.required("equation")?;
    let parsed = parse_equation(equation)?;
    let operands = (0..ctx.inputs.len())
        .map(|i| ctx.input_type(i))
        .collect::<Result<Vec<_>, _>>()?;
    let ty = output_type(&parsed, &operands)?;
    let p = params([("equation", Param::String(equation.to_string()))]);
    Ok(ctx.emit(p, vec![ty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::AttributeValue;
    use crate::supported_ops::test_utils::{node, run_node};
    use crate::tensor::ElementType;

    fn f32s(dims: &[usize]) -> Type {
        Type::with_static(ElementType::F32, dims)
    }

    fn shape_of(equation: &str, operands: &[Type]) -> Result<Type, ConvertError> {
        output_type(&parse_equation(equation)?, operands)
    }

    #[test]
    fn test_parse_explicit_and_implicit() {
        let eq = parse_equation("ij,jk->ik").unwrap();
        assert_eq!(eq.inputs, vec![vec![Some('i'), Some('j')], vec![Some('j'), Some('k')]]);
        assert_eq!(eq.output, vec![Some('i'), Some('k')]);

        let eq = parse_equation("ba,ac").unwrap();
        assert_eq!(eq.output, vec![Some('b'), Some('c')]);

        let eq = parse_equation("...ij, ...jk").unwrap();
        assert_eq!(eq.output, vec![None, Some('i'), Some('k')]);
    }

    #[test]
    fn test_matmul_and_transpose_shapes() {
        assert_eq!(shape_of("ij,jk->ik", &[f32s(&[2, 3]), f32s(&[3, 5])]).unwrap(), f32s(&[2, 5]));
        assert_eq!(shape_of("ij->ji", &[f32s(&[2, 3])]).unwrap(), f32s(&[3, 2]));
        assert_eq!(shape_of("ii->", &[f32s(&[4, 4])]).unwrap(), f32s(&[]));
        assert_eq!(
            shape_of("...ij,...jk->...ik", &[f32s(&[7, 2, 3]), f32s(&[3, 4])]).unwrap(),
            f32s(&[7, 2, 4])
        );
    }

    #[test]
    fn test_bad_equations() {
        assert!(parse_equation("i1->i").is_err());
        assert!(parse_equation("......i->i").is_err());
        assert!(shape_of("ij->k", &[f32s(&[2, 3])]).is_err());
        assert!(shape_of("ijk->i", &[f32s(&[2, 3])]).is_err());
        assert!(shape_of("ij,jk->ik", &[f32s(&[2, 3])]).is_err());
    }

    #[test]
    fn test_einsum_node() {
        let attrs = [("equation", AttributeValue::String("bij,bjk->bik".into()))];
        let (function, outputs) = run_node(
            node("Einsum", 2, &attrs),
            &[Some(f32s(&[8, 2, 3])), Some(f32s(&[8, 3, 4]))],
            &[],
            13,
        )
        .unwrap();
        assert_eq!(function.value_type(outputs[0]), Some(&f32s(&[8, 2, 4])));

        let err = run_node(node("Einsum", 1, &[]), &[Some(f32s(&[2]))], &[], 13).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingAttribute);
    }
}
