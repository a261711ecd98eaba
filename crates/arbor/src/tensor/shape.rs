//! Tensor shapes plus the broadcast and axis arithmetic shared by the
//! operator set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Stores the logical dimensions of a tensor. Rank 0 (a scalar) is legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Shape { dims: dims.into() }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}

/// Computes the bidirectional broadcast of two shapes.
///
/// The shapes are right-aligned and the shorter one padded with implicit
/// leading 1s. Aligned extents must either match or have one side equal
/// to 1, in which case the other side wins.
pub fn infer_broadcast(lhs: &Shape, rhs: &Shape) -> Result<Shape, GraphError> {
    let rank = lhs.rank().max(rhs.rank());
    let mut out = Vec::with_capacity(rank);
    for axis in 0..rank {
        let a = aligned_dim(lhs, axis, rank);
        let b = aligned_dim(rhs, axis, rank);
        if a == b {
            out.push(a);
        } else if a == 1 {
            out.push(b);
        } else if b == 1 {
            out.push(a);
        } else {
            return Err(GraphError::shape_mismatch(format!(
                "cannot broadcast {lhs} with {rhs} (axis {axis}: {a} vs {b})"
            )));
        }
    }
    Ok(Shape::new(out))
}

fn aligned_dim(shape: &Shape, axis: usize, rank: usize) -> usize {
    let pad = rank - shape.rank();
    if axis < pad {
        1
    } else {
        shape.dims()[axis - pad]
    }
}

/// Resolves a possibly negative axis against `rank`, returning the
/// equivalent non-negative index. Valid input range is `[-rank, rank - 1]`.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize, GraphError> {
    if rank == 0 {
        return Err(GraphError::AxisOutOfRange { axis, rank });
    }
    let rank_i = rank as isize;
    if axis < -rank_i || axis > rank_i - 1 {
        return Err(GraphError::AxisOutOfRange { axis, rank });
    }
    if axis < 0 {
        Ok((axis + rank_i) as usize)
    } else {
        Ok(axis as usize)
    }
}
