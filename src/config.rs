use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked by the driver once per node.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs for a single conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Static shapes for graph inputs, keyed by input name. Replaces whatever
    /// the model declares, dynamic axes included.
    pub input_shapes: HashMap<String, Vec<usize>>,
    /// Lowest default-domain opset accepted.
    pub min_opset: i64,
    pub cancel: Option<CancellationToken>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            input_shapes: HashMap::new(),
            min_opset: 1,
            cancel: None,
        }
    }
}

impl ConvertOptions {
    pub fn with_input_shape(mut self, name: impl Into<String>, shape: Vec<usize>) -> Self {
        self.input_shapes.insert(name.into(), shape);
        self
    }

    pub fn with_min_opset(mut self, min_opset: i64) -> Self {
        self.min_opset = min_opset;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
