use std::collections::HashMap;
use std::fmt;

use crate::ir::{BlockId, Instruction, Type, ValueId};
use crate::tensor::TensorData;

/// How a value came to exist.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    Placeholder,
    Constant,
    BlockArgument(BlockId),
    Instruction { block: BlockId, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub name: String,
    pub ty: Type,
    pub def: ValueDef,
}

/// Straight-line list of instructions; nested blocks hold loop bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub arguments: Vec<ValueId>,
    pub instructions: Vec<Instruction>,
    /// Values the block yields: function outputs for the entry block,
    /// next-iteration values for a loop body.
    pub results: Vec<ValueId>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            arguments: vec![],
            instructions: vec![],
            results: vec![],
        }
    }
}

/// Converted model: placeholders and constants feeding an entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub(crate) values: Vec<ValueRecord>,
    pub placeholders: Vec<ValueId>,
    pub constants: Vec<ValueId>,
    pub(crate) constant_data: HashMap<ValueId, TensorData>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Function {
    pub(crate) fn new(name: &str) -> Self {
        let entry = BlockId(0);
        Self {
            name: name.to_string(),
            values: vec![],
            placeholders: vec![],
            constants: vec![],
            constant_data: HashMap::new(),
            blocks: vec![BasicBlock::new(entry, "entry")],
            entry,
        }
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueRecord> {
        self.values.get(id.0)
    }

    pub fn value_type(&self, id: ValueId) -> Option<&Type> {
        self.value(id).map(|v| &v.ty)
    }

    /// First value carrying `name`.
    pub fn find_value(&self, name: &str) -> Option<ValueId> {
        self.values.iter().position(|v| v.name == name).map(ValueId)
    }

    pub fn constant(&self, id: ValueId) -> Option<&TensorData> {
        self.constant_data.get(&id)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    pub fn entry_block(&self) -> &BasicBlock {
        &self.blocks[self.entry.0]
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.entry_block().results
    }

    /// Instruction that defines `id`, if any.
    pub fn producer(&self, id: ValueId) -> Option<&Instruction> {
        match self.value(id)?.def {
            ValueDef::Instruction { block, index } => self.block(block)?.instructions.get(index),
            _ => None,
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    fn describe(&self, id: ValueId) -> String {
        match self.value(id) {
            Some(v) => format!("{id}: {} \"{}\"", v.ty, v.name),
            None => id.to_string(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {}", self.name)?;
        for &p in &self.placeholders {
            writeln!(f, "  input {}", self.describe(p))?;
        }
        for &c in &self.constants {
            writeln!(f, "  const {}", self.describe(c))?;
        }
        for block in &self.blocks {
            let args: Vec<String> = block.arguments.iter().map(|&a| self.describe(a)).collect();
            writeln!(f, "{} {}({}):", block.id, block.name, args.join(", "))?;
            for inst in &block.instructions {
                writeln!(f, "  {inst}")?;
            }
            let results: Vec<String> = block.results.iter().map(ValueId::to_string).collect();
            writeln!(f, "  yield {}", results.join(", "))?;
        }
        Ok(())
    }
}
