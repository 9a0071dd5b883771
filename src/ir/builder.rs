use crate::ir::{BasicBlock, BlockId, Function, Instruction, Params, Type, ValueDef, ValueId, ValueRecord};
use crate::tensor::TensorData;

/// Everything needed to append one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct OpSpec {
    pub op_type: String,
    pub name: String,
    pub operands: Vec<Option<ValueId>>,
    pub params: Params,
    /// Names given to the results; may be shorter than `result_types`.
    pub result_names: Vec<String>,
    pub result_types: Vec<Type>,
}

pub trait IrBuilder {
    /// Function-level input whose value is supplied at run time.
    fn create_placeholder(&mut self, name: &str, ty: Type) -> ValueId;

    fn create_constant(&mut self, name: &str, data: TensorData) -> ValueId;

    /// Appends to the innermost open block and returns one handle per result type.
    fn append(&mut self, op: OpSpec) -> Vec<ValueId>;

    /// Opens a nested block; appends go there until it is closed.
    fn open_block(&mut self, name: &str) -> BlockId;

    fn create_block_argument(&mut self, name: &str, ty: Type) -> ValueId;

    /// Sets the values yielded by the innermost open block.
    fn set_results(&mut self, results: Vec<ValueId>);

    /// Closes the innermost nested block. The entry block is never closed.
    fn close_block(&mut self) -> BlockId;

    fn value_type(&self, value: ValueId) -> Option<&Type>;

    fn constant_data(&self, value: ValueId) -> Option<&TensorData>;
}

pub struct FunctionBuilder {
    function: Function,
    open: Vec<BlockId>,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        let function = Function::new(name);
        let open = vec![function.entry];
        Self { function, open }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn finish(self) -> Function {
        self.function
    }

    fn current(&self) -> BlockId {
        self.open.last().copied().unwrap_or(self.function.entry)
    }

    fn push_value(&mut self, name: &str, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId(self.function.values.len());
        self.function.values.push(ValueRecord {
            name: name.to_string(),
            ty,
            def,
        });
        id
    }
}

impl IrBuilder for FunctionBuilder {
    fn create_placeholder(&mut self, name: &str, ty: Type) -> ValueId {
        let id = self.push_value(name, ty, ValueDef::Placeholder);
        self.function.placeholders.push(id);
        id
    }

    fn create_constant(&mut self, name: &str, data: TensorData) -> ValueId {
        let ty = Type::with_static(data.element_type(), data.shape().dims());
        let id = self.push_value(name, ty, ValueDef::Constant);
        self.function.constants.push(id);
        self.function.constant_data.insert(id, data);
        id
    }

    fn append(&mut self, op: OpSpec) -> Vec<ValueId> {
        let block = self.current();
        let index = self.function.blocks[block.0].instructions.len();
        let results: Vec<ValueId> = op
            .result_types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| {
                let name = op.result_names.get(i).map(String::as_str).unwrap_or("");
                self.push_value(name, ty, ValueDef::Instruction { block, index })
            })
            .collect();
        self.function.blocks[block.0].instructions.push(Instruction {
            op_type: op.op_type,
            name: op.name,
            operands: op.operands,
            params: op.params,
            results: results.clone(),
        });
        results
    }

    fn open_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.function.blocks.len());
        self.function.blocks.push(BasicBlock::new(id, name));
        self.open.push(id);
        id
    }

    fn create_block_argument(&mut self, name: &str, ty: Type) -> ValueId {
        let block = self.current();
        let id = self.push_value(name, ty, ValueDef::BlockArgument(block));
        self.function.blocks[block.0].arguments.push(id);
        id
    }

    fn set_results(&mut self, results: Vec<ValueId>) {
        let block = self.current();
        self.function.blocks[block.0].results = results;
    }

    fn close_block(&mut self) -> BlockId {
        let current = self.current();
        if self.open.len() > 1 {
            self.open.pop();
        }
        current
    }

    fn value_type(&self, value: ValueId) -> Option<&Type> {
        self.function.value_type(value)
    }

    fn constant_data(&self, value: ValueId) -> Option<&TensorData> {
        self.function.constant(value)
    }
}
