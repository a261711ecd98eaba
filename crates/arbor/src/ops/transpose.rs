//! Axis permutation.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::tensor::Shape;

/// Attributes of a Transpose node: a bijection over the input's axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransposeSpec {
    perm: Vec<usize>,
}

impl TransposeSpec {
    /// Builds a validated permutation for a tensor of rank `rank`. An
    /// empty `perm` defaults to the full reversal `[rank-1, .., 0]`.
    pub fn resolve(perm: Vec<usize>, rank: usize) -> Result<Self, GraphError> {
        let perm = if perm.is_empty() {
            (0..rank).rev().collect()
        } else {
            perm
        };
        validate_permutation(&perm, rank)?;
        Ok(TransposeSpec { perm })
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub(crate) fn infer_shape(&self, input: &Shape) -> Result<Shape, GraphError> {
        validate_permutation(&self.perm, input.rank())?;
        let dims = input.dims();
        Ok(Shape::new(
            self.perm.iter().map(|&axis| dims[axis]).collect::<Vec<_>>(),
        ))
    }

    /// True when applying `other` after `self` restores the original axis
    /// order.
    pub fn is_inverse_of(&self, other: &TransposeSpec) -> bool {
        if self.perm.len() != other.perm.len() {
            return false;
        }
        let mut inverse = vec![usize::MAX; self.perm.len()];
        for (index, &axis) in self.perm.iter().enumerate() {
            if axis >= inverse.len() || inverse[axis] != usize::MAX {
                return false;
            }
            inverse[axis] = index;
        }
        inverse == other.perm
    }

    /// True for the permutation that swaps the trailing two axes and fixes
    /// every other axis, the form MatMul can absorb as a `trans_*` flag.
    pub fn swaps_last_two(&self) -> bool {
        let rank = self.perm.len();
        if rank < 2 {
            return false;
        }
        if !self.perm[..rank - 2].iter().copied().eq(0..rank - 2) {
            return false;
        }
        self.perm[rank - 2] == rank - 1 && self.perm[rank - 1] == rank - 2
    }
}

fn validate_permutation(perm: &[usize], rank: usize) -> Result<(), GraphError> {
    let invalid = || GraphError::InvalidPermute {
        perm: perm.to_vec(),
        rank,
    };
    if perm.len() != rank {
        return Err(invalid());
    }
    let mut seen = vec![false; rank];
    for &axis in perm {
        if axis >= rank || seen[axis] {
            return Err(invalid());
        }
        seen[axis] = true;
    }
    Ok(())
}
