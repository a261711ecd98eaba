use crate::graph::Graph;
use crate::ops::{OpId, OpKind};
use crate::tensor::TensorId;

use super::{GraphPass, PassResult};

/// Removes a transpose feeding a second transpose whose permutation undoes
/// it, rewiring every consumer of the pair's output to the pair's input.
///
/// At most one pair is rewritten per invocation; operator indices shift
/// after the removal, so the driver restarts the scan.
pub struct TransposePairElimination;

struct PairMatch {
    first: OpId,
    second: OpId,
    input: TensorId,
    output: TensorId,
}

impl GraphPass for TransposePairElimination {
    fn name(&self) -> &'static str {
        "transpose-pair-elimination"
    }

    fn run(&self, graph: &mut Graph) -> PassResult {
        let Some(found) = find_inverse_pair(graph) else {
            return PassResult::default();
        };

        let consumers = graph.tensor(found.output).targets().to_vec();
        for consumer in consumers {
            graph.op_mut(consumer).replace_input(found.output, found.input);
        }
        graph.remove_ops(&[found.first, found.second]);
        PassResult {
            changed: true,
            rewrites_applied: 1,
            erased_ops: 2,
        }
    }
}

fn find_inverse_pair(graph: &Graph) -> Option<PairMatch> {
    for op in graph.ops() {
        let OpKind::Transpose(first) = op.kind() else {
            continue;
        };
        let between = op.outputs()[0];
        let targets = graph.tensor(between).targets();
        if targets.len() != 1 {
            continue;
        }
        let follower = graph.op(targets[0]);
        let OpKind::Transpose(second) = follower.kind() else {
            continue;
        };
        if follower.inputs()[0] != between {
            continue;
        }
        if !first.is_inverse_of(second) {
            continue;
        }
        return Some(PairMatch {
            first: op.id(),
            second: follower.id(),
            input: op.inputs()[0],
            output: follower.outputs()[0],
        });
    }
    None
}
