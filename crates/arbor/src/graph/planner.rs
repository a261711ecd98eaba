//! Lifetime-aware memory planning: `data_malloc`.
//!
//! The planner walks the topologically sorted operator list once, keeping
//! a remaining-use counter per tensor. Outputs are given offsets when
//! their producer runs; an input whose last use just happened is freed on
//! the spot, so a later allocation of compatible size can reclaim its
//! range through the allocator's first-fit search. Tensors nothing
//! consumes (graph outputs and dangling inputs) are keep-alive and never
//! freed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::runtime::Blob;
use crate::tensor::TensorId;

impl Graph {
    /// Assigns every tensor a byte offset in the arena, materializes the
    /// backing buffer sized to the realized peak, and binds each tensor to
    /// its slice of it. The graph must not be mutated afterwards.
    pub fn data_malloc(&mut self) -> Result<(), GraphError> {
        self.topo_sort()?;

        let mut bytes: HashMap<TensorId, usize> = HashMap::with_capacity(self.tensor_count());
        let mut remaining_uses: HashMap<TensorId, usize> =
            HashMap::with_capacity(self.tensor_count());
        let mut keep_alive: HashSet<TensorId> = HashSet::new();
        for tensor in self.tensors() {
            bytes.insert(tensor.id(), tensor.bytes());
            remaining_uses.insert(tensor.id(), tensor.targets().len());
            if tensor.targets().is_empty() {
                keep_alive.insert(tensor.id());
            }
        }

        let mut offsets: HashMap<TensorId, usize> = HashMap::with_capacity(self.tensor_count());

        // Graph inputs live from the start of execution.
        let input_ids: Vec<TensorId> = self.inputs().map(|tensor| tensor.id()).collect();
        for id in input_ids {
            let offset = self.allocator_mut().alloc(bytes[&id])?;
            offsets.insert(id, offset);
        }

        for index in 0..self.op_count() {
            let outputs = self.ops()[index].outputs().to_vec();
            for output in outputs {
                if !offsets.contains_key(&output) {
                    let offset = self.allocator_mut().alloc(bytes[&output])?;
                    offsets.insert(output, offset);
                }
            }

            let inputs = self.ops()[index].inputs().to_vec();
            for input in inputs {
                let Some(uses) = remaining_uses.get_mut(&input) else {
                    continue;
                };
                if *uses > 0 {
                    *uses -= 1;
                }
                if *uses == 0 && !keep_alive.contains(&input) {
                    if let Some(&offset) = offsets.get(&input) {
                        let size = bytes[&input];
                        self.allocator_mut().free(offset, size)?;
                    }
                }
            }
        }

        let buffer = self.allocator_mut().materialize();
        let ids: Vec<TensorId> = self.tensors().iter().map(|tensor| tensor.id()).collect();
        for id in ids {
            let &offset = offsets
                .get(&id)
                .ok_or(GraphError::UnallocatedTensor(id))?;
            self.tensor_mut(id)
                .bind_data(Blob::new(Arc::clone(&buffer), offset));
        }

        let usage = self.arena_usage();
        tracing::debug!(used = usage.used, peak = usage.peak, "memory plan complete");
        Ok(())
    }
}
