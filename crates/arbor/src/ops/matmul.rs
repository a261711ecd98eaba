//! Batched matrix multiplication with optional transposed operands.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::tensor::{infer_broadcast, Shape};

/// Attributes of a MatMul node. `trans_a`/`trans_b` flip the trailing two
/// axes of the respective operand; `(m, n, k)` is the problem size cached
/// by the last shape inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatMulSpec {
    pub trans_a: bool,
    pub trans_b: bool,
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl MatMulSpec {
    pub fn new(trans_a: bool, trans_b: bool) -> Self {
        MatMulSpec {
            trans_a,
            trans_b,
            m: 0,
            n: 0,
            k: 0,
        }
    }

    /// Infers `C = A @ B` with leading batch axes broadcast against each
    /// other and the trailing two axes contracted.
    pub(crate) fn infer_shape(&mut self, a: &Shape, b: &Shape) -> Result<Shape, GraphError> {
        if a.rank() < 2 || b.rank() < 2 {
            return Err(GraphError::shape_mismatch(format!(
                "MatMul operands need rank >= 2, got {a} and {b}"
            )));
        }
        let a_dims = a.dims();
        let b_dims = b.dims();

        let a_batch = Shape::new(&a_dims[..a_dims.len() - 2]);
        let b_batch = Shape::new(&b_dims[..b_dims.len() - 2]);
        let out_batch = infer_broadcast(&a_batch, &b_batch)?;

        // Row-major: A is (.., M, K), B is (.., K, N), transposition swaps
        // the roles of the last two axes.
        let (a_m, a_k) = if self.trans_a {
            (a_dims[a_dims.len() - 1], a_dims[a_dims.len() - 2])
        } else {
            (a_dims[a_dims.len() - 2], a_dims[a_dims.len() - 1])
        };
        let (b_k, b_n) = if self.trans_b {
            (b_dims[b_dims.len() - 1], b_dims[b_dims.len() - 2])
        } else {
            (b_dims[b_dims.len() - 2], b_dims[b_dims.len() - 1])
        };
        if a_k != b_k {
            return Err(GraphError::shape_mismatch(format!(
                "MatMul K dimension mismatch: {a_k} vs {b_k} (A {a}, B {b})"
            )));
        }

        self.m = a_m;
        self.n = b_n;
        self.k = a_k;

        let mut out = out_batch.dims().to_vec();
        out.push(self.m);
        out.push(self.n);
        Ok(Shape::new(out))
    }
}
