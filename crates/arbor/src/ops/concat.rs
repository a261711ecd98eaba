//! Concatenation along one axis.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::tensor::{normalize_axis, Shape};

/// Attributes of a Concat node. The axis is normalized to a non-negative
/// index at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatSpec {
    axis: usize,
}

impl ConcatSpec {
    /// Normalizes a possibly negative `axis` against the rank of the first
    /// input.
    pub fn resolve(axis: isize, rank: usize) -> Result<Self, GraphError> {
        Ok(ConcatSpec {
            axis: normalize_axis(axis, rank)?,
        })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub(crate) fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape, GraphError> {
        assert!(!inputs.is_empty(), "Concat needs at least one input");
        let first = &inputs[0];
        let rank = first.rank();
        assert!(self.axis < rank, "Concat axis must be pre-normalized");

        let mut dims = first.dims().to_vec();
        for input in &inputs[1..] {
            if input.rank() != rank {
                return Err(GraphError::shape_mismatch(format!(
                    "Concat rank mismatch: {first} vs {input}"
                )));
            }
            for (axis, (&expected, &actual)) in
                first.dims().iter().zip(input.dims().iter()).enumerate()
            {
                if axis != self.axis && expected != actual {
                    return Err(GraphError::shape_mismatch(format!(
                        "Concat extent mismatch on non-concat axis {axis}: {first} vs {input}"
                    )));
                }
            }
            dims[self.axis] += input.dims()[self.axis];
        }
        Ok(Shape::new(dims))
    }
}
