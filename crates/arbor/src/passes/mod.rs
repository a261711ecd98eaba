//! Peephole rewrites over a constructed graph.
//!
//! Passes run under a fixed-point driver: each iteration lets every pass
//! fire, then prunes unreferenced tensors, rebuilds all derived edges
//! from the operator list, and re-sorts topologically, which must succeed.
//! Every rewrite strictly removes operators, so the loop terminates in at
//! most `op_count` iterations.

mod matmul_fusion;
mod transpose_pairs;

pub use matmul_fusion::TransposeMatMulFusion;
pub use transpose_pairs::TransposePairElimination;

use crate::error::GraphError;
use crate::graph::Graph;

/// Outcome of a single pass invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassResult {
    pub changed: bool,
    pub rewrites_applied: usize,
    pub erased_ops: usize,
}

/// A local rewrite over the graph. Passes may leave tensor edges stale;
/// the driver rebuilds them after every iteration.
pub trait GraphPass {
    fn name(&self) -> &'static str;

    fn run(&self, graph: &mut Graph) -> PassResult;
}

/// Aggregate statistics over a full optimization run.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeStats {
    pub iterations: usize,
    pub rewrites_applied: usize,
    pub erased_ops: usize,
}

/// Fixed-point driver over an ordered pass list.
pub struct Optimizer {
    passes: Vec<Box<dyn GraphPass>>,
}

impl Optimizer {
    pub fn new(passes: Vec<Box<dyn GraphPass>>) -> Self {
        Optimizer { passes }
    }

    /// The built-in rule set: inverse-transpose elimination, then
    /// transpose-into-matmul fusion.
    pub fn standard() -> Self {
        Optimizer::new(vec![
            Box::new(TransposePairElimination),
            Box::new(TransposeMatMulFusion),
        ])
    }

    pub fn run(&self, graph: &mut Graph) -> Result<OptimizeStats, GraphError> {
        graph.topo_sort()?;
        let mut stats = OptimizeStats::default();
        loop {
            stats.iterations += 1;
            let mut changed = false;
            for pass in &self.passes {
                let result = pass.run(graph);
                if result.changed {
                    tracing::debug!(
                        pass = pass.name(),
                        rewrites = result.rewrites_applied,
                        erased = result.erased_ops,
                        "pass fired"
                    );
                }
                changed |= result.changed;
                stats.rewrites_applied += result.rewrites_applied;
                stats.erased_ops += result.erased_ops;
            }

            let pruned = graph.prune_unreferenced_tensors();
            if pruned > 0 {
                tracing::trace!(pruned, "dropped unreferenced tensors");
            }
            graph.rebuild_edges();
            graph.mark_unsorted();
            graph.topo_sort()?;

            if !changed {
                return Ok(stats);
            }
        }
    }
}
