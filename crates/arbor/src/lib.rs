//! Core of a small inference-oriented computation-graph runtime.
//!
//! A user-built DAG of tensor operators is driven through shape inference,
//! local algebraic rewrites, and lifetime-aware arena packing, ending with
//! every tensor bound to an offset in one contiguous backing buffer:
//!
//! ```text
//! Graph construction (add_tensor / matmul / transpose / concat)
//!         |
//!         v
//! shape_infer      propagate shapes through the topological order
//!         |
//!         v
//! optimize         peephole rewrites (see passes)
//!         |
//!         v
//! data_malloc      liveness scan -> offsets -> one arena buffer
//! ```
//!
//! Raw memory comes from a [`Runtime`] collaborator; kernels, transfers,
//! and bindings live outside this crate.

pub mod alloc;
pub mod error;
pub mod graph;
pub mod ops;
pub mod passes;
pub mod runtime;
pub mod tensor;

pub use alloc::{ArenaAllocator, ArenaUsage, ARENA_ALIGNMENT};
pub use error::GraphError;
pub use graph::Graph;
pub use ops::{ConcatSpec, CustomOp, MatMulSpec, OpId, OpKind, OpNode, TransposeSpec};
pub use runtime::{ArenaBuffer, Blob, Runtime};
pub use tensor::{
    infer_broadcast, normalize_axis, DType, Shape, Tensor, TensorDecl, TensorId,
};
