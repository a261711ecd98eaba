//! Error kinds surfaced by graph construction, inference, rewriting, and
//! memory planning. None of these are recovered from internally; callers
//! either propagate them or treat them as fatal.

use thiserror::Error;

use crate::tensor::TensorId;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("permute {perm:?} is not a permutation of 0..{rank}")]
    InvalidPermute { perm: Vec<usize>, rank: usize },

    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },

    #[error("tensor belongs to runtime '{tensor}', cannot add it to a graph on runtime '{graph}'")]
    RuntimeMismatch { tensor: String, graph: String },

    #[error("graph contains a cycle; topological sort cannot make progress")]
    GraphCycle,

    #[error("arena is already materialized; alloc/free are no longer permitted")]
    ArenaMaterialized,

    #[error("freeing {size} bytes but only {used} bytes are in use")]
    OverFree { size: usize, used: usize },

    #[error("tensor {0} reached arena binding without an offset")]
    UnallocatedTensor(TensorId),

    #[error("tensor {0} is not part of this graph")]
    UnknownTensor(TensorId),
}

impl GraphError {
    pub(crate) fn shape_mismatch(message: impl Into<String>) -> Self {
        GraphError::ShapeMismatch(message.into())
    }
}
