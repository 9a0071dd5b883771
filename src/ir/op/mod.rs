use std::collections::BTreeMap;
use std::fmt;

use crate::ir::{BlockId, ValueId};
use crate::tensor::ElementType;

/// Normalized operator parameter, defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    String(String),
    ElementType(ElementType),
    Block(BlockId),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(v) => write!(f, "{v}"),
            Param::Float(v) => write!(f, "{v:?}"),
            Param::Ints(v) => write!(f, "{v:?}"),
            Param::Floats(v) => write!(f, "{v:?}"),
            Param::String(v) => write!(f, "{v:?}"),
            Param::ElementType(v) => write!(f, "{v}"),
            Param::Block(v) => write!(f, "{v}"),
        }
    }
}

pub type Params = BTreeMap<String, Param>;

/// Builds a [`Params`] map from literal entries.
pub fn params<const N: usize>(entries: [(&str, Param); N]) -> Params {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// One operator instance inside a basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op_type: String,
    pub name: String,
    /// Positional operands; `None` where an optional input was omitted.
    pub operands: Vec<Option<ValueId>>,
    pub params: Params,
    pub results: Vec<ValueId>,
}

impl Instruction {
    pub fn param(&self, key: &str) -> Option<&Param> {
        self.params.get(key)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results: Vec<String> = self.results.iter().map(ValueId::to_string).collect();
        let operands: Vec<String> = self
            .operands
            .iter()
            .map(|o| o.map(|v| v.to_string()).unwrap_or_else(|| "_".to_string()))
            .collect();
        if !results.is_empty() {
            write!(f, "{} = ", results.join(", "))?;
        }
        write!(f, "{}({})", self.op_type, operands.join(", "))?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " {{{}}}", params.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_display() {
        let inst = Instruction {
            op_type: "Clip".into(),
            name: "clip".into(),
            operands: vec![Some(ValueId(0)), None, Some(ValueId(2))],
            params: params([("mode", Param::String("x".into()))]),
            results: vec![ValueId(3)],
        };
        assert_eq!(inst.to_string(), "%3 = Clip(%0, _, %2) {mode=\"x\"}");
    }
}
