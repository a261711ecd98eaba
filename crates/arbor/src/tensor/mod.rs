//! Tensor descriptors: the values flowing on graph edges.
//!
//! A tensor is immutable metadata (shape, dtype, runtime) plus the edge
//! bookkeeping the graph maintains on its behalf, and, after memory
//! planning, a binding into the shared arena. Edges are stored as plain
//! [`OpId`] handles so tensors never extend operator lifetimes.

mod dtype;
mod shape;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dtype::DType;
pub use shape::{infer_broadcast, normalize_axis, Shape};

use crate::ops::OpId;
use crate::runtime::{Blob, Runtime};

/// Graph-local unique tensor identifier (fuid). Assigned monotonically by
/// the owning graph and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(pub u32);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A tensor descriptor constructed outside any graph, to be imported via
/// [`crate::Graph::adopt_tensor`]. Carries the runtime it was built
/// against so the import can reject cross-runtime mixing.
#[derive(Debug, Clone)]
pub struct TensorDecl {
    pub shape: Shape,
    pub dtype: DType,
    pub runtime: Arc<dyn Runtime>,
}

impl TensorDecl {
    pub fn new(shape: impl Into<Shape>, dtype: DType, runtime: Arc<dyn Runtime>) -> Self {
        TensorDecl {
            shape: shape.into(),
            dtype,
            runtime,
        }
    }
}

/// A named value on a graph edge.
#[derive(Debug)]
pub struct Tensor {
    id: TensorId,
    shape: Shape,
    dtype: DType,
    runtime: Arc<dyn Runtime>,
    source: Option<OpId>,
    targets: Vec<OpId>,
    data: Option<Blob>,
}

impl Tensor {
    pub(crate) fn new(id: TensorId, shape: Shape, dtype: DType, runtime: Arc<dyn Runtime>) -> Self {
        Tensor {
            id,
            shape,
            dtype,
            runtime,
            source: None,
            targets: Vec::new(),
            data: None,
        }
    }

    /// The graph-local fuid.
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Total byte size: element count times element width.
    pub fn bytes(&self) -> usize {
        self.shape.num_elements() * self.dtype.size_in_bytes()
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// The operator producing this tensor, absent for graph inputs.
    pub fn source(&self) -> Option<OpId> {
        self.source
    }

    /// Operators consuming this tensor. An operator consuming the same
    /// tensor through several input slots appears once per slot; the
    /// memory planner's use counting relies on that.
    pub fn targets(&self) -> &[OpId] {
        &self.targets
    }

    /// Arena binding, present only after memory planning.
    pub fn data(&self) -> Option<&Blob> {
        self.data.as_ref()
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        assert!(
            self.data.is_none(),
            "tensor {} shape is frozen once arena data is bound",
            self.id
        );
        self.shape = shape;
    }

    pub(crate) fn set_source(&mut self, op: OpId) {
        self.source = Some(op);
    }

    pub(crate) fn add_target(&mut self, op: OpId) {
        self.targets.push(op);
    }

    pub(crate) fn clear_edges(&mut self) {
        self.source = None;
        self.targets.clear();
    }

    pub(crate) fn bind_data(&mut self, blob: Blob) {
        assert!(
            self.data.is_none(),
            "tensor {} arena data bound more than once",
            self.id
        );
        self.data = Some(blob);
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}{}, source {}, targets [",
            self.id,
            self.dtype,
            self.shape,
            match self.source {
                Some(op) => op.to_string(),
                None => "-".to_string(),
            },
        )?;
        for (index, target) in self.targets.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{target}")?;
        }
        write!(f, "]")
    }
}
