use anyhow::Result;
use proptest::prelude::*;

use arbor::{infer_broadcast, normalize_axis, DType, Graph, GraphError, OpKind, Shape};
use arbor_runtime_cpu::CpuRuntime;

fn graph() -> Graph {
    Graph::new(CpuRuntime::shared())
}

#[test]
fn broadcast_right_aligns_and_widens_ones() -> Result<()> {
    let out = infer_broadcast(&Shape::new([1, 3, 1]), &Shape::new([2, 1, 4]))?;
    assert_eq!(out, Shape::new([2, 3, 4]));
    Ok(())
}

#[test]
fn broadcast_pads_the_shorter_shape_with_leading_ones() -> Result<()> {
    let out = infer_broadcast(&Shape::new([5, 1, 3]), &Shape::new([3]))?;
    assert_eq!(out, Shape::new([5, 1, 3]));

    let out = infer_broadcast(&Shape::new(Vec::new()), &Shape::new([2, 2]))?;
    assert_eq!(out, Shape::new([2, 2]));
    Ok(())
}

#[test]
fn broadcast_rejects_incompatible_extents() {
    let err = infer_broadcast(&Shape::new([2, 3]), &Shape::new([4, 3])).unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch(_)));
}

#[test]
fn normalize_axis_resolves_negative_indices() -> Result<()> {
    assert_eq!(normalize_axis(0, 3)?, 0);
    assert_eq!(normalize_axis(2, 3)?, 2);
    assert_eq!(normalize_axis(-1, 3)?, 2);
    assert_eq!(normalize_axis(-3, 3)?, 0);
    Ok(())
}

#[test]
fn normalize_axis_rejects_out_of_range() {
    for axis in [3, -4] {
        let err = normalize_axis(axis, 3).unwrap_err();
        assert!(matches!(err, GraphError::AxisOutOfRange { .. }));
    }
    assert!(matches!(
        normalize_axis(0, 0),
        Err(GraphError::AxisOutOfRange { .. })
    ));
}

#[test]
fn matmul_broadcasts_batch_axes_and_caches_mnk() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([2, 3, 4], DType::F32);
    let b = g.add_tensor([1, 4, 5], DType::F32);
    let c = g.add_tensor(Shape::default(), DType::F32);
    let op = g.matmul(a, b, c, false, false)?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(c).unwrap().shape(), &Shape::new([2, 3, 5]));

    let OpKind::MatMul(spec) = g.get_operator(op).unwrap().kind() else {
        panic!("expected a MatMul node");
    };
    assert_eq!((spec.m, spec.n, spec.k), (3, 5, 4));
    Ok(())
}

#[test]
fn matmul_honors_transposed_operands() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([4, 3], DType::F32);
    let b = g.add_tensor([4, 5], DType::F32);
    let c = g.add_tensor(Shape::default(), DType::F32);
    g.matmul(a, b, c, true, false)?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(c).unwrap().shape(), &Shape::new([3, 5]));
    Ok(())
}

#[test]
fn matmul_rejects_contraction_mismatch() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([2, 3, 4], DType::F32);
    let b = g.add_tensor([2, 5, 6], DType::F32);
    let c = g.add_tensor(Shape::default(), DType::F32);
    g.matmul(a, b, c, false, false)?;

    let err = g.shape_infer().unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch(_)));
    Ok(())
}

#[test]
fn matmul_rejects_vectors() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([4], DType::F32);
    let b = g.add_tensor([4, 5], DType::F32);
    let c = g.add_tensor(Shape::default(), DType::F32);
    g.matmul(a, b, c, false, false)?;

    let err = g.shape_infer().unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch(_)));
    Ok(())
}

#[test]
fn transpose_defaults_to_full_reversal() -> Result<()> {
    let mut g = graph();
    let x = g.add_tensor([2, 3, 4], DType::F32);
    let y = g.add_tensor(Shape::default(), DType::F32);
    g.transpose(x, y, Vec::new())?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(y).unwrap().shape(), &Shape::new([4, 3, 2]));
    Ok(())
}

#[test]
fn transpose_applies_explicit_permute() -> Result<()> {
    let mut g = graph();
    let x = g.add_tensor([2, 3, 4], DType::F32);
    let y = g.add_tensor(Shape::default(), DType::F32);
    g.transpose(x, y, vec![1, 0, 2])?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(y).unwrap().shape(), &Shape::new([3, 2, 4]));
    Ok(())
}

#[test]
fn transpose_rejects_non_permutations() {
    let mut g = graph();
    let x = g.add_tensor([2, 3, 4], DType::F32);
    let y = g.add_tensor(Shape::default(), DType::F32);

    for perm in [vec![0, 1], vec![0, 1, 1], vec![0, 1, 3]] {
        let err = g.transpose(x, y, perm).unwrap_err();
        assert!(matches!(err, GraphError::InvalidPermute { .. }));
    }
}

#[test]
fn concat_sums_the_concat_axis() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([2, 3], DType::F32);
    let b = g.add_tensor([2, 4], DType::F32);
    let out = g.add_tensor(Shape::default(), DType::F32);
    g.concat(vec![a, b], out, 1)?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(out).unwrap().shape(), &Shape::new([2, 7]));
    Ok(())
}

#[test]
fn concat_accepts_negative_axes() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([2, 3], DType::F32);
    let b = g.add_tensor([2, 4], DType::F32);
    let out = g.add_tensor(Shape::default(), DType::F32);
    g.concat(vec![a, b], out, -1)?;

    g.shape_infer()?;
    assert_eq!(g.get_tensor(out).unwrap().shape(), &Shape::new([2, 7]));
    Ok(())
}

#[test]
fn concat_rejects_mismatch_off_the_concat_axis() -> Result<()> {
    let mut g = graph();
    let a = g.add_tensor([2, 3], DType::F32);
    let b = g.add_tensor([2, 4], DType::F32);
    let out = g.add_tensor(Shape::default(), DType::F32);
    g.concat(vec![a, b], out, 0)?;

    let err = g.shape_infer().unwrap_err();
    assert!(matches!(err, GraphError::ShapeMismatch(_)));
    Ok(())
}

#[test]
fn concat_rejects_out_of_range_axis() {
    let mut g = graph();
    let a = g.add_tensor([2, 3], DType::F32);
    let out = g.add_tensor(Shape::default(), DType::F32);
    let err = g.concat(vec![a], out, 2).unwrap_err();
    assert!(matches!(err, GraphError::AxisOutOfRange { .. }));
}

fn arb_dims() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 0..4)
}

fn arb_permutation() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    (1usize..5).prop_flat_map(|rank| {
        (
            Just((0..rank).collect::<Vec<_>>()).prop_shuffle(),
            prop::collection::vec(1usize..6, rank..=rank),
        )
    })
}

fn invert(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; perm.len()];
    for (index, &axis) in perm.iter().enumerate() {
        inverse[axis] = index;
    }
    inverse
}

proptest! {
    /// Broadcasting is symmetric whenever it is defined at all.
    #[test]
    fn broadcast_is_symmetric(a in arb_dims(), b in arb_dims()) {
        let lhs = Shape::new(a);
        let rhs = Shape::new(b);
        match (infer_broadcast(&lhs, &rhs), infer_broadcast(&rhs, &lhs)) {
            (Ok(ab), Ok(ba)) => prop_assert_eq!(ab, ba),
            (Err(_), Err(_)) => {}
            (ab, ba) => prop_assert!(false, "asymmetric outcome: {:?} vs {:?}", ab, ba),
        }
    }

    /// A transpose followed by its inverse restores the input shape.
    #[test]
    fn transpose_involution_restores_shape((perm, dims) in arb_permutation()) {
        let mut g = graph();
        let permuted: Vec<usize> = perm.iter().map(|&axis| dims[axis]).collect();
        let x = g.add_tensor(dims.clone(), DType::F32);
        let y = g.add_tensor(permuted, DType::F32);
        let z = g.add_tensor(Shape::default(), DType::F32);
        g.transpose(x, y, perm.clone()).unwrap();
        g.transpose(y, z, invert(&perm)).unwrap();

        g.shape_infer().unwrap();
        prop_assert_eq!(g.get_tensor(z).unwrap().shape(), &Shape::new(dims));
    }
}
