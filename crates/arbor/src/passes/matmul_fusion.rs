use crate::graph::Graph;
use crate::ops::{OpId, OpKind};

use super::{GraphPass, PassResult};

/// Folds a swap-last-two transpose feeding a MatMul operand into the
/// MatMul's `trans_a`/`trans_b` flag.
///
/// The two input slots are handled independently, so a MatMul consuming
/// the same transpose output on both sides toggles both flags. Obsolete
/// transposes are collected and deleted once at pass end.
pub struct TransposeMatMulFusion;

impl GraphPass for TransposeMatMulFusion {
    fn name(&self) -> &'static str {
        "transpose-matmul-fusion"
    }

    fn run(&self, graph: &mut Graph) -> PassResult {
        let mut rewrites = 0;
        let mut doomed: Vec<OpId> = Vec::new();

        let matmuls: Vec<OpId> = graph
            .ops()
            .iter()
            .filter(|op| matches!(op.kind(), OpKind::MatMul(_)))
            .map(|op| op.id())
            .collect();

        for matmul in matmuls {
            for slot in 0..2 {
                let input = graph.op(matmul).inputs()[slot];
                let Some(source) = graph.tensor(input).source() else {
                    continue;
                };
                let producer = graph.op(source);
                let OpKind::Transpose(spec) = producer.kind() else {
                    continue;
                };
                if producer.outputs()[0] != input || !spec.swaps_last_two() {
                    continue;
                }
                let transposed_input = producer.inputs()[0];

                graph.op_mut(matmul).set_input(slot, transposed_input);
                let OpKind::MatMul(spec) = graph.op_mut(matmul).kind_mut() else {
                    unreachable!("operator was matched as MatMul above");
                };
                if slot == 0 {
                    spec.trans_a = !spec.trans_a;
                } else {
                    spec.trans_b = !spec.trans_b;
                }
                if !doomed.contains(&source) {
                    doomed.push(source);
                }
                rewrites += 1;
            }
        }

        if doomed.is_empty() {
            return PassResult::default();
        }
        let erased = doomed.len();
        graph.remove_ops(&doomed);
        PassResult {
            changed: true,
            rewrites_applied: rewrites,
            erased_ops: erased,
        }
    }
}
