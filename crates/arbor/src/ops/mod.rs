//! Operator nodes and their shape-inference rules.
//!
//! Operators form a closed sum over the built-in variants plus an open
//! [`CustomOp`] extension point for externally registered kinds. Each
//! variant infers its output shapes as a pure function of input shapes and
//! its own attributes; MatMul additionally caches the `(m, n, k)` problem
//! size it derived.

mod concat;
mod matmul;
mod transpose;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use concat::ConcatSpec;
pub use matmul::MatMulSpec;
pub use transpose::TransposeSpec;

use crate::error::GraphError;
use crate::tensor::{Shape, TensorId};

/// Graph-local unique operator identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Capability set an externally registered operator must provide: a name
/// for diagnostics and shape inference over its input shapes.
pub trait CustomOp: fmt::Debug {
    fn name(&self) -> &str;

    /// Returns one shape per output tensor.
    fn infer_shape(&self, inputs: &[Shape]) -> Result<Vec<Shape>, GraphError>;
}

/// The operator variants the core knows how to reason about.
#[derive(Debug, Clone)]
pub enum OpKind {
    MatMul(MatMulSpec),
    Transpose(TransposeSpec),
    Concat(ConcatSpec),
    Custom(Arc<dyn CustomOp>),
}

impl OpKind {
    /// Human-readable operator tag.
    pub fn name(&self) -> &str {
        match self {
            OpKind::MatMul(_) => "MatMul",
            OpKind::Transpose(_) => "Transpose",
            OpKind::Concat(_) => "Concat",
            OpKind::Custom(op) => op.name(),
        }
    }

    pub(crate) fn infer_shape(&mut self, inputs: &[Shape]) -> Result<Vec<Shape>, GraphError> {
        match self {
            OpKind::MatMul(spec) => {
                assert_eq!(inputs.len(), 2, "MatMul takes exactly two inputs");
                Ok(vec![spec.infer_shape(&inputs[0], &inputs[1])?])
            }
            OpKind::Transpose(spec) => {
                assert_eq!(inputs.len(), 1, "Transpose takes exactly one input");
                Ok(vec![spec.infer_shape(&inputs[0])?])
            }
            OpKind::Concat(spec) => Ok(vec![spec.infer_shape(inputs)?]),
            OpKind::Custom(op) => op.infer_shape(inputs),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::MatMul(spec) => write!(
                f,
                "MatMul([{},{}], mnk=[{},{},{}])",
                if spec.trans_a { "A^T" } else { "A" },
                if spec.trans_b { "B^T" } else { "B" },
                spec.m,
                spec.n,
                spec.k
            ),
            OpKind::Transpose(spec) => write!(f, "Transpose(permute={:?})", spec.perm()),
            OpKind::Concat(spec) => write!(f, "Concat(dim={})", spec.axis()),
            OpKind::Custom(op) => write!(f, "{}", op.name()),
        }
    }
}

/// One node of the graph: an operator kind plus its ordered tensor slots
/// and the derived operator-to-operator links.
#[derive(Debug)]
pub struct OpNode {
    id: OpId,
    kind: OpKind,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    predecessors: Vec<OpId>,
    successors: Vec<OpId>,
}

impl OpNode {
    pub(crate) fn new(id: OpId, kind: OpKind, inputs: Vec<TensorId>, outputs: Vec<TensorId>) -> Self {
        OpNode {
            id,
            kind,
            inputs,
            outputs,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut OpKind {
        &mut self.kind
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    /// Operators producing this node's inputs (deduplicated).
    pub fn predecessors(&self) -> &[OpId] {
        &self.predecessors
    }

    /// Operators consuming this node's outputs (deduplicated).
    pub fn successors(&self) -> &[OpId] {
        &self.successors
    }

    /// Rewrites every input slot holding `old` to `new`.
    pub fn replace_input(&mut self, old: TensorId, new: TensorId) {
        for slot in &mut self.inputs {
            if *slot == old {
                *slot = new;
            }
        }
    }

    /// Rewrites a single input slot, leaving other slots holding the same
    /// tensor untouched.
    pub(crate) fn set_input(&mut self, slot: usize, tensor: TensorId) {
        self.inputs[slot] = tensor;
    }

    pub(crate) fn add_predecessor(&mut self, op: OpId) {
        if !self.predecessors.contains(&op) {
            self.predecessors.push(op);
        }
    }

    pub(crate) fn add_successor(&mut self, op: OpId) {
        if !self.successors.contains(&op) {
            self.successors.push(op);
        }
    }

    pub(crate) fn clear_links(&mut self) {
        self.predecessors.clear();
        self.successors.clear();
    }
}

impl fmt::Display for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}, in [", self.id, self.kind)?;
        for (index, id) in self.inputs.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "], out [")?;
        for (index, id) in self.outputs.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}
