//! Graph converter: walks a decoded ONNX graph and drives the IR builder.
//!
//! Nodes are converted in declared order. Per-node failures are recorded as
//! [`Diagnostic`]s and conversion carries on with the next node, so one run
//! reports every problem in the graph. Loop bodies are converted recursively
//! into a nested block, with their names bound in a child scope that is
//! destroyed once the body is done.

use std::collections::HashSet;

use tract_core::internal::tract_itertools::Itertools;

use crate::config::ConvertOptions;
use crate::error::{ConversionFailed, ConvertError, Diagnostic, NodeContext};
use crate::graph::{Graph, Model, Node, ValueInfo, WireTensor};
use crate::ir::attributes::Attributes;
use crate::ir::builder::{IrBuilder, OpSpec};
use crate::ir::op::params;
use crate::ir::scope::{ScopeId, ScopeTree};
use crate::ir::{Dim, Param, Type, ValueId};
use crate::supported_ops::{ConvertContext, ConverterRegistry};
use crate::tensor::materialize::{materialize_tensor, resolve_value_type};
use crate::tensor::ElementType;

/// Where the converter is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterState {
    Idle,
    ConvertingGraph,
    /// Inside a loop body, entered once per nesting level.
    ConvertingSubgraph,
    Success,
    Failed,
}

/// Pseudo operator kinds used in diagnostics for values that are not nodes.
const GRAPH_INPUT: &str = "<input>";
const INITIALIZER: &str = "<initializer>";
const GRAPH_OUTPUT: &str = "<output>";

fn is_default_domain(domain: &str) -> bool {
    domain.is_empty() || domain == "ai.onnx"
}

pub struct GraphConverter<'r, B: IrBuilder> {
    builder: B,
    registry: &'r ConverterRegistry,
    options: ConvertOptions,
    scopes: ScopeTree,
    state: ConverterState,
    diagnostics: Vec<Diagnostic>,
    /// Graph names from the outermost graph in.
    path: Vec<String>,
    outputs: Vec<ValueId>,
    /// Output names of nodes that failed, so their absence is reported once.
    failed_outputs: HashSet<(ScopeId, String)>,
    converted_nodes: usize,
    cancelled: bool,
}

impl<B: IrBuilder> GraphConverter<'static, B> {
    /// Converter using the built-in operator table.
    pub fn new(builder: B) -> Self {
        Self::with_registry(builder, ConverterRegistry::global())
    }
}

impl<'r, B: IrBuilder> GraphConverter<'r, B> {
    pub fn with_registry(builder: B, registry: &'r ConverterRegistry) -> Self {
        Self {
            builder,
            registry,
            options: ConvertOptions::default(),
            scopes: ScopeTree::new(),
            state: ConverterState::Idle,
            diagnostics: vec![],
            path: vec![],
            outputs: vec![],
            failed_outputs: HashSet::new(),
            converted_nodes: 0,
            cancelled: false,
        }
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ConverterState {
        self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Nodes converted so far, loop bodies included.
    pub fn converted_nodes(&self) -> usize {
        self.converted_nodes
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Records a failure that happened outside the graph walk, e.g. while decoding.
    pub fn report(&mut self, context: NodeContext, error: ConvertError) {
        log::debug!("{context}: {error}");
        self.diagnostics.push(Diagnostic::new(context, error));
        self.state = ConverterState::Failed;
    }

    /// Converts one model into the root scope. Several models can be added
    /// in turn; their graph outputs are concatenated.
    pub fn convert_model(&mut self, model: &Model) -> &mut Self {
        if model.opset_version < self.options.min_opset {
            let error = ConvertError::UnsupportedOpset {
                opset: model.opset_version,
                min: self.options.min_opset,
            };
            self.report(NodeContext::model(model.graph.name.clone()), error);
            return self;
        }
        log::debug!(
            "converting graph `{}` (ir version {}, opset {}, producer `{}`)",
            model.graph.name,
            model.ir_version,
            model.opset_version,
            model.producer
        );
        self.convert_graph(&model.graph, model.opset_version)
    }

    /// Converts a top-level graph into the root scope.
    pub fn convert_graph(&mut self, graph: &Graph, opset: i64) -> &mut Self {
        self.state = ConverterState::ConvertingGraph;
        self.path.push(graph.name.clone());
        let root = self.scopes.root();

        let initializer_names: HashSet<&str> = graph.initializers.iter().map(|t| t.name.as_str()).collect();
        for input in &graph.inputs {
            if initializer_names.contains(input.name.as_str()) {
                log::debug!("graph input `{}` has an initializer, binding it as a constant", input.name);
                continue;
            }
            if let Err(error) = self.bind_placeholder(input, root) {
                self.record(&input.name, GRAPH_INPUT, error);
            }
        }
        self.bind_initializers(&graph.initializers, root);
        self.convert_nodes(&graph.nodes, root, opset);

        if !self.cancelled {
            if let Some(results) = self.resolve_outputs(&graph.outputs, root) {
                self.outputs.extend(results);
            }
        }
        self.path.pop();
        self.state = if self.diagnostics.is_empty() {
            ConverterState::Success
        } else {
            ConverterState::Failed
        };
        self
    }

    /// The built IR when every node converted, every diagnostic otherwise.
    pub fn finish(mut self) -> Result<B, ConversionFailed> {
        log::info!(
            "converted {} node(s) with {} error(s)",
            self.converted_nodes,
            self.diagnostics.len()
        );
        if !self.diagnostics.is_empty() {
            return Err(ConversionFailed {
                diagnostics: self.diagnostics,
            });
        }
        self.builder.set_results(self.outputs);
        Ok(self.builder)
    }

    fn context(&self, node: &str, op_type: &str) -> NodeContext {
        NodeContext::new(self.path.iter().join("/"), node, op_type)
    }

    fn record(&mut self, node: &str, op_type: &str, error: ConvertError) {
        let context = self.context(node, op_type);
        log::debug!("{context}: {error}");
        self.diagnostics.push(Diagnostic::new(context, error));
    }

    fn bind_placeholder(&mut self, input: &ValueInfo, scope: ScopeId) -> Result<(), ConvertError> {
        let mut ty = resolve_value_type(input)?;
        if let Some(shape) = self.options.input_shapes.get(&input.name) {
            log::debug!("pinning shape of `{}` to {shape:?}", input.name);
            ty = Type::with_static(ty.element_type, shape);
        }
        log::debug!("placeholder `{}`: {ty}", input.name);
        let value = self.builder.create_placeholder(&input.name, ty);
        self.scopes.insert(scope, &input.name, value)
    }

    fn bind_initializers(&mut self, initializers: &[WireTensor], scope: ScopeId) {
        for tensor in initializers {
            let bound = materialize_tensor(tensor).and_then(|data| {
                log::debug!("constant `{}`: {data}", tensor.name);
                let value = self.builder.create_constant(&tensor.name, data);
                self.scopes.insert(scope, &tensor.name, value)
            });
            if let Err(error) = bound {
                self.record(&tensor.name, INITIALIZER, error);
            }
        }
    }

    fn convert_nodes(&mut self, nodes: &[Node], scope: ScopeId, opset: i64) {
        for node in nodes {
            if self.cancelled {
                return;
            }
            if self.options.is_cancelled() {
                self.cancelled = true;
                self.record(node.display_name(), &node.op_type, ConvertError::Cancelled);
                return;
            }
            let converted = if node.op_type == "Loop" && is_default_domain(&node.domain) {
                self.convert_loop(node, scope, opset)
            } else {
                self.convert_node(node, scope, opset).map(|()| true)
            };
            match converted {
                Ok(true) => self.converted_nodes += 1,
                Ok(false) => self.mark_failed(node, scope),
                Err(error) => {
                    self.record(node.display_name(), &node.op_type, error);
                    self.mark_failed(node, scope);
                }
            }
        }
    }

    fn mark_failed(&mut self, node: &Node, scope: ScopeId) {
        let names = node.outputs.iter().filter(|name| !name.is_empty());
        self.failed_outputs.extend(names.map(|name| (scope, name.clone())));
    }

    /// Positional inputs; empty names are omitted optional inputs.
    fn resolve_inputs(&self, node: &Node, scope: ScopeId) -> Result<Vec<Option<ValueId>>, ConvertError> {
        node.inputs
            .iter()
            .map(|name| {
                if name.is_empty() {
                    return Ok(None);
                }
                self.scopes
                    .find(scope, name)
                    .map(Some)
                    .map_err(|_| ConvertError::UnresolvedInput { name: name.clone() })
            })
            .collect()
    }

    fn convert_node(&mut self, node: &Node, scope: ScopeId, opset: i64) -> Result<(), ConvertError> {
        let inputs = self.resolve_inputs(node, scope)?;
        let attrs = Attributes::new(&node.attributes);
        if !is_default_domain(&node.domain) {
            return Err(ConvertError::UnsupportedOperator {
                op_type: format!("{}.{}", node.domain, node.op_type),
            });
        }
        let converter = self.registry.lookup(&node.op_type)?;
        let outputs = {
            let mut ctx = ConvertContext {
                node,
                inputs: &inputs,
                attrs: &attrs,
                builder: &mut self.builder,
                opset,
            };
            converter(&mut ctx)?
        };
        warn_unread(node, &attrs);
        log::debug!("{} ({}) -> {}", node.display_name(), node.op_type, outputs.iter().join(", "));
        self.bind_outputs(node, scope, &outputs)
    }

    fn bind_outputs(&mut self, node: &Node, scope: ScopeId, values: &[ValueId]) -> Result<(), ConvertError> {
        let declared = node.outputs.len();
        if values.len() < declared {
            return Err(ConvertError::arity(&node.op_type, "results", declared, declared, values.len()));
        }
        for (name, &value) in node.outputs.iter().zip(values) {
            if !name.is_empty() {
                self.scopes.insert(scope, name, value)?;
            }
        }
        Ok(())
    }

    /// `Loop(M?, cond?, v_initial...)` with body `(iter_num, cond_in, v_in...) ->
    /// (cond_out, v_out..., scan...)`. The body formals are typed from the body's
    /// declarations when present and from `expected` otherwise. `Ok(false)` when
    /// the body failed and its errors are already recorded.
    fn convert_loop(&mut self, node: &Node, scope: ScopeId, opset: i64) -> Result<bool, ConvertError> {
        let inputs = self.resolve_inputs(node, scope)?;
        let attrs = Attributes::new(&node.attributes);
        if inputs.len() < 2 {
            return Err(ConvertError::arity("Loop", "inputs", 2, usize::MAX, inputs.len()));
        }
        let body: &Graph = attrs.required("body")?;

        let initial = &inputs[2..];
        let present = initial.iter().flatten().count();
        if present != initial.len() {
            return Err(ConvertError::arity(
                "Loop",
                "present loop-carried inputs",
                initial.len(),
                initial.len(),
                present,
            ));
        }
        let carried: Vec<Type> = initial
            .iter()
            .flatten()
            .map(|&v| {
                self.builder
                    .value_type(v)
                    .cloned()
                    .ok_or_else(|| ConvertError::NameNotFound { name: v.to_string() })
            })
            .collect::<Result<_, _>>()?;
        let formals = carried.len() + 2;
        if body.inputs.len() != formals {
            return Err(ConvertError::arity("Loop", "body inputs", formals, formals, body.inputs.len()));
        }
        if body.outputs.len() < carried.len() + 1 {
            return Err(ConvertError::arity(
                "Loop",
                "body outputs",
                carried.len() + 1,
                usize::MAX,
                body.outputs.len(),
            ));
        }
        let produced = body.outputs.len() - 1;
        if node.outputs.len() > produced {
            return Err(ConvertError::arity("Loop", "outputs", 0, produced, node.outputs.len()));
        }

        let mut expected = vec![Type::scalar(ElementType::I64), Type::scalar(ElementType::Bool)];
        expected.extend(carried.iter().cloned());

        let outer_state = self.state;
        self.state = ConverterState::ConvertingSubgraph;
        let block = self.builder.open_block(&format!("{}_body", node.display_name()));
        let child = self.scopes.create_child(scope);
        self.path.push(body.name.clone());

        let results = self.convert_body(body, child, opset, &expected);
        if let Some(results) = &results {
            self.builder.set_results(results.clone());
        }

        self.path.pop();
        self.scopes.destroy(child);
        self.builder.close_block();
        self.state = outer_state;

        let Some(results) = results else {
            return Ok(false);
        };

        let mut result_types = carried;
        for &scan in &results[1 + result_types.len()..] {
            let ty = self
                .builder
                .value_type(scan)
                .cloned()
                .unwrap_or_else(|| Type::unranked(ElementType::F32));
            let shape = ty.shape.map(|dims| {
                let mut stacked = vec![Dim::dynamic()];
                stacked.extend(dims);
                stacked
            });
            result_types.push(Type {
                element_type: ty.element_type,
                shape,
            });
        }
        result_types.truncate(node.outputs.len());

        let outputs = self.builder.append(OpSpec {
            op_type: "Loop".to_string(),
            name: node.display_name().to_string(),
            operands: inputs,
            params: params([("body", Param::Block(block))]),
            result_names: node.outputs.clone(),
            result_types,
        });
        warn_unread(node, &attrs);
        self.bind_outputs(node, scope, &outputs)?;
        Ok(true)
    }

    /// Body results, or `None` when any part of the body failed.
    fn convert_body(
        &mut self,
        body: &Graph,
        scope: ScopeId,
        opset: i64,
        expected: &[Type],
    ) -> Option<Vec<ValueId>> {
        let errors_before = self.diagnostics.len();
        for (formal, expected) in body.inputs.iter().zip(expected) {
            let ty = match formal.element_type {
                Some(_) => match resolve_value_type(formal) {
                    Ok(ty) => ty,
                    Err(error) => {
                        self.record(&formal.name, GRAPH_INPUT, error);
                        continue;
                    }
                },
                None => expected.clone(),
            };
            let value = self.builder.create_block_argument(&formal.name, ty);
            if let Err(error) = self.scopes.insert(scope, &formal.name, value) {
                self.record(&formal.name, GRAPH_INPUT, error);
            }
        }
        self.bind_initializers(&body.initializers, scope);
        self.convert_nodes(&body.nodes, scope, opset);
        if self.cancelled {
            return None;
        }
        let results = self.resolve_outputs(&body.outputs, scope);
        (self.diagnostics.len() == errors_before).then_some(results).flatten()
    }

    fn resolve_outputs(&mut self, outputs: &[ValueInfo], scope: ScopeId) -> Option<Vec<ValueId>> {
        let mut resolved = Vec::with_capacity(outputs.len());
        for output in outputs {
            match self.scopes.find(scope, &output.name) {
                Ok(value) => resolved.push(value),
                Err(_) if self.failed_outputs.contains(&(scope, output.name.clone())) => {
                    log::debug!("output `{}` missing, its producer already failed", output.name);
                }
                Err(_) => self.record(
                    &output.name,
                    GRAPH_OUTPUT,
                    ConvertError::UnresolvedInput {
                        name: output.name.clone(),
                    },
                ),
            }
        }
        (resolved.len() == outputs.len()).then_some(resolved)
    }
}

fn warn_unread(node: &Node, attrs: &Attributes<'_>) {
    for key in attrs.unread() {
        log::warn!(
            "{} ({}): attribute `{key}` was ignored",
            node.display_name(),
            node.op_type
        );
    }
}
