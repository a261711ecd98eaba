//! The graph container: exclusive owner of all tensors and operators.
//!
//! A graph is built by adding tensors and connecting operators over them,
//! then driven through its lifecycle in order: [`Graph::shape_infer`] →
//! [`Graph::optimize`] → [`Graph::data_malloc`]. Each step mutates the
//! graph in place and leaves the structural invariants checked by
//! [`Graph::check_valid`] restored.
//!
//! Edges are redundant on purpose: tensors know their producer and
//! consumers, operators know their predecessors and successors. The
//! operator-to-operator links are a derived view; after any structural
//! rewrite they are reconstructed wholesale by `rebuild_edges` so the two
//! views can never drift apart.

mod planner;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::alloc::{ArenaAllocator, ArenaUsage};
use crate::error::GraphError;
use crate::ops::{ConcatSpec, CustomOp, MatMulSpec, OpId, OpKind, OpNode, TransposeSpec};
use crate::passes::Optimizer;
use crate::runtime::Runtime;
use crate::tensor::{DType, Shape, Tensor, TensorDecl, TensorId};

pub struct Graph {
    runtime: Arc<dyn Runtime>,
    ops: Vec<OpNode>,
    tensors: Vec<Tensor>,
    sorted: bool,
    allocator: ArenaAllocator,
    next_tensor: u32,
    next_op: u32,
}

impl Graph {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        let allocator = ArenaAllocator::new(Arc::clone(&runtime));
        Graph {
            runtime,
            ops: Vec::new(),
            tensors: Vec::new(),
            sorted: false,
            allocator,
            next_tensor: 0,
            next_op: 0,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Creates a tensor owned by this graph and returns its fuid.
    pub fn add_tensor(&mut self, shape: impl Into<Shape>, dtype: DType) -> TensorId {
        let id = TensorId(self.next_tensor);
        self.next_tensor += 1;
        self.tensors
            .push(Tensor::new(id, shape.into(), dtype, Arc::clone(&self.runtime)));
        id
    }

    /// Imports a tensor descriptor built outside the graph. Fails when the
    /// descriptor was constructed against a different runtime.
    pub fn adopt_tensor(&mut self, decl: TensorDecl) -> Result<TensorId, GraphError> {
        if !Arc::ptr_eq(&decl.runtime, &self.runtime) {
            return Err(GraphError::RuntimeMismatch {
                tensor: decl.runtime.name().to_string(),
                graph: self.runtime.name().to_string(),
            });
        }
        Ok(self.add_tensor(decl.shape, decl.dtype))
    }

    /// Adds `C = A @ B` with optional transposed operands.
    pub fn matmul(
        &mut self,
        a: TensorId,
        b: TensorId,
        out: TensorId,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<OpId, GraphError> {
        self.add_operator(
            OpKind::MatMul(MatMulSpec::new(trans_a, trans_b)),
            vec![a, b],
            vec![out],
        )
    }

    /// Adds an axis permutation. An empty `perm` defaults to the full
    /// reversal of the input's axes.
    pub fn transpose(
        &mut self,
        input: TensorId,
        output: TensorId,
        perm: Vec<usize>,
    ) -> Result<OpId, GraphError> {
        let rank = self.lookup_tensor(input)?.rank();
        let spec = TransposeSpec::resolve(perm, rank)?;
        self.add_operator(OpKind::Transpose(spec), vec![input], vec![output])
    }

    /// Adds a concatenation of `inputs` along `axis` (negative axes count
    /// from the back of the first input's rank).
    pub fn concat(
        &mut self,
        inputs: Vec<TensorId>,
        output: TensorId,
        axis: isize,
    ) -> Result<OpId, GraphError> {
        assert!(!inputs.is_empty(), "Concat needs at least one input");
        let rank = self.lookup_tensor(inputs[0])?.rank();
        let spec = ConcatSpec::resolve(axis, rank)?;
        self.add_operator(OpKind::Concat(spec), inputs, vec![output])
    }

    /// Adds an externally defined operator.
    pub fn custom(
        &mut self,
        op: Arc<dyn CustomOp>,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> Result<OpId, GraphError> {
        self.add_operator(OpKind::Custom(op), inputs, outputs)
    }

    /// Appends an operator and wires every edge it induces: the operator
    /// becomes a target of each input and the source of each output, and
    /// predecessor/successor links are mirrored both ways.
    fn add_operator(
        &mut self,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> Result<OpId, GraphError> {
        for &id in inputs.iter().chain(outputs.iter()) {
            self.lookup_tensor(id)?;
        }

        let id = OpId(self.next_op);
        self.next_op += 1;
        self.sorted = false;
        self.ops
            .push(OpNode::new(id, kind, inputs.clone(), outputs.clone()));

        for &input in &inputs {
            let source = self.tensor(input).source();
            self.tensor_mut(input).add_target(id);
            if let Some(pred) = source {
                self.op_mut(pred).add_successor(id);
                self.op_mut(id).add_predecessor(pred);
            }
        }
        for &output in &outputs {
            let targets = self.tensor(output).targets().to_vec();
            for succ in targets {
                self.op_mut(succ).add_predecessor(id);
                self.op_mut(id).add_successor(succ);
            }
            self.tensor_mut(output).set_source(id);
        }
        Ok(id)
    }

    /// Reorders the operator list topologically with a repeated-scan Kahn
    /// pass: every round emits each operator whose inputs are either graph
    /// inputs or produced by an already emitted operator. Ties keep the
    /// current list order, so the sort is stable and deterministic. A
    /// round that emits nothing means a cycle.
    pub fn topo_sort(&mut self) -> Result<(), GraphError> {
        if self.sorted {
            return Ok(());
        }
        let mut order = Vec::with_capacity(self.ops.len());
        let mut emitted: HashSet<OpId> = HashSet::with_capacity(self.ops.len());
        while order.len() < self.ops.len() {
            let mut modified = false;
            for (index, op) in self.ops.iter().enumerate() {
                if emitted.contains(&op.id()) {
                    continue;
                }
                let ready = op.inputs().iter().all(|&input| {
                    match self.tensor(input).source() {
                        None => true,
                        Some(source) => emitted.contains(&source),
                    }
                });
                if ready {
                    order.push(index);
                    emitted.insert(op.id());
                    modified = true;
                }
            }
            if !modified {
                return Err(GraphError::GraphCycle);
            }
        }

        let mut slots: Vec<Option<OpNode>> = std::mem::take(&mut self.ops)
            .into_iter()
            .map(Some)
            .collect();
        self.ops = order
            .into_iter()
            .map(|index| slots[index].take().expect("topo order visits each op once"))
            .collect();
        self.sorted = true;
        Ok(())
    }

    /// Runs shape inference over every operator in topological order,
    /// updating each output tensor whose computed shape differs from its
    /// current one.
    pub fn shape_infer(&mut self) -> Result<(), GraphError> {
        self.topo_sort()?;
        for index in 0..self.ops.len() {
            let input_shapes: Vec<Shape> = self.ops[index]
                .inputs()
                .iter()
                .map(|&id| self.tensor(id).shape().clone())
                .collect();
            let inferred = self.ops[index].kind_mut().infer_shape(&input_shapes)?;
            let outputs = self.ops[index].outputs().to_vec();
            assert_eq!(
                inferred.len(),
                outputs.len(),
                "operator inferred {} shapes for {} outputs",
                inferred.len(),
                outputs.len()
            );
            for (output, shape) in outputs.into_iter().zip(inferred) {
                if self.tensor(output).shape() != &shape {
                    self.tensor_mut(output).set_shape(shape);
                }
            }
        }
        Ok(())
    }

    /// Applies the standard peephole rewrites until fixed point. See
    /// [`crate::passes`] for the rule set.
    pub fn optimize(&mut self) -> Result<(), GraphError> {
        Optimizer::standard().run(self)?;
        Ok(())
    }

    /// Linear fuid lookup.
    pub fn get_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.iter().find(|tensor| tensor.id() == id)
    }

    pub fn get_operator(&self, id: OpId) -> Option<&OpNode> {
        self.ops.iter().find(|op| op.id() == id)
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn ops(&self) -> &[OpNode] {
        &self.ops
    }

    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Graph inputs: tensors no operator produces.
    pub fn inputs(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter().filter(|tensor| tensor.source().is_none())
    }

    /// Graph outputs: tensors no operator consumes.
    pub fn outputs(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter().filter(|tensor| tensor.targets().is_empty())
    }

    pub fn arena_usage(&self) -> ArenaUsage {
        self.allocator.usage()
    }

    /// Verifies the structural invariants: every edge endpoint is owned by
    /// the graph, no tensor is orphaned, and fuids are unique.
    pub fn check_valid(&self) -> bool {
        let op_ids: HashSet<OpId> = self.ops.iter().map(|op| op.id()).collect();
        let tensor_ids: HashSet<TensorId> = self.tensors.iter().map(|tensor| tensor.id()).collect();
        if tensor_ids.len() != self.tensors.len() {
            return false;
        }
        for tensor in &self.tensors {
            if tensor.targets().is_empty() && tensor.source().is_none() {
                return false;
            }
            if !tensor.targets().iter().all(|op| op_ids.contains(op)) {
                return false;
            }
            if let Some(source) = tensor.source() {
                if !op_ids.contains(&source) {
                    return false;
                }
            }
        }
        for op in &self.ops {
            let endpoints_ok = op
                .inputs()
                .iter()
                .chain(op.outputs().iter())
                .all(|tensor| tensor_ids.contains(tensor));
            let links_ok = op
                .predecessors()
                .iter()
                .chain(op.successors().iter())
                .all(|link| op_ids.contains(link));
            if !endpoints_ok || !links_ok {
                return false;
            }
        }
        true
    }

    /// Drops every tensor no operator references any more. Returns the
    /// number removed.
    pub(crate) fn prune_unreferenced_tensors(&mut self) -> usize {
        let mut referenced: HashSet<TensorId> = HashSet::with_capacity(self.tensors.len());
        for op in &self.ops {
            referenced.extend(op.inputs().iter().copied());
            referenced.extend(op.outputs().iter().copied());
        }
        let before = self.tensors.len();
        self.tensors.retain(|tensor| referenced.contains(&tensor.id()));
        before - self.tensors.len()
    }

    /// Reconstructs every derived edge from the operator list alone:
    /// producers first, then consumer targets and the mirrored
    /// predecessor/successor links.
    pub(crate) fn rebuild_edges(&mut self) {
        for tensor in &mut self.tensors {
            tensor.clear_edges();
        }
        for op in &mut self.ops {
            op.clear_links();
        }
        for index in 0..self.ops.len() {
            let id = self.ops[index].id();
            for output in self.ops[index].outputs().to_vec() {
                self.tensor_mut(output).set_source(id);
            }
        }
        for index in 0..self.ops.len() {
            let id = self.ops[index].id();
            for input in self.ops[index].inputs().to_vec() {
                let source = self.tensor(input).source();
                self.tensor_mut(input).add_target(id);
                if let Some(pred) = source {
                    self.op_mut(pred).add_successor(id);
                    self.op_mut(id).add_predecessor(pred);
                }
            }
        }
    }

    pub(crate) fn remove_ops(&mut self, doomed: &[OpId]) {
        self.ops.retain(|op| !doomed.contains(&op.id()));
        self.sorted = false;
    }

    pub(crate) fn mark_unsorted(&mut self) {
        self.sorted = false;
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut ArenaAllocator {
        &mut self.allocator
    }

    fn lookup_tensor(&self, id: TensorId) -> Result<&Tensor, GraphError> {
        self.get_tensor(id).ok_or(GraphError::UnknownTensor(id))
    }

    pub(crate) fn tensor(&self, id: TensorId) -> &Tensor {
        self.get_tensor(id).expect("tensor id not owned by this graph")
    }

    pub(crate) fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        self.tensors
            .iter_mut()
            .find(|tensor| tensor.id() == id)
            .expect("tensor id not owned by this graph")
    }

    pub(crate) fn op(&self, id: OpId) -> &OpNode {
        self.get_operator(id)
            .expect("operator id not owned by this graph")
    }

    pub(crate) fn op_mut(&mut self, id: OpId) -> &mut OpNode {
        self.ops
            .iter_mut()
            .find(|op| op.id() == id)
            .expect("operator id not owned by this graph")
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph tensors:")?;
        for tensor in &self.tensors {
            writeln!(f, "  {tensor}")?;
        }
        writeln!(f, "Graph operators:")?;
        for op in &self.ops {
            writeln!(
                f,
                "  {op}, pred {}, succ {}",
                fmt_op_ids(op.predecessors()),
                fmt_op_ids(op.successors())
            )?;
        }
        Ok(())
    }
}

fn fmt_op_ids(ids: &[OpId]) -> String {
    let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}
