use crate::axes::Axes;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{NodeId, NodeType, Op};
use crate::shape::Shape;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Handle to a node in [Graph].
///
/// Cloning shares the node, it never copies the graph. Two expressions
/// are equal if they point to the same node. Operands of a node can not
/// change after it was created, so graphs built from expressions are
/// always acyclic.
pub struct Expression<'g> {
    id: NodeId,
    graph: &'g Graph,
}

impl Clone for Expression<'_> {
    fn clone(&self) -> Self {
        self.graph.retain(self.id);
        Self {
            id: self.id,
            graph: self.graph,
        }
    }
}

impl Drop for Expression<'_> {
    fn drop(&mut self) {
        self.graph.release(self.id);
    }
}

impl PartialEq for Expression<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.graph, other.graph) && self.id == other.id
    }
}

impl Eq for Expression<'_> {}

impl core::hash::Hash for Expression<'_> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl core::fmt::Debug for Expression<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("Expression {{ id = {}, {} }}", self.id, self.description()))
    }
}

impl core::fmt::Display for Expression<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.description())
    }
}

impl<'g> Expression<'g> {
    /// Takes over one reference count of id.
    pub(crate) const fn from_raw(graph: &'g Graph, id: NodeId) -> Self {
        Self { id, graph }
    }

    /// Create new node from op and operands.
    ///
    /// # Errors
    /// [`GraphError::ArityMismatch`] if number of operands is not op's arity,
    /// [`GraphError::ForeignExpression`] if operand is from different graph,
    /// shape errors if operand shapes are not compatible with op.
    pub fn new(graph: &'g Graph, op: Op, operands: &[&Expression<'g>]) -> Result<Self, GraphError> {
        if operands.len() != op.arity() {
            return Err(GraphError::ArityMismatch {
                op: op.description(),
                expected: op.arity(),
                found: operands.len(),
            });
        }
        let mut ids = SmallVec::<[NodeId; 2]>::new();
        for x in operands {
            if !core::ptr::eq(x.graph, graph) {
                return Err(GraphError::ForeignExpression { id: x.id });
            }
            ids.push(x.id);
        }
        let id = graph.push(op, &ids)?;
        Ok(Self::from_raw(graph, id))
    }

    /// Id of node, stable for the lifetime of the node
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Graph this expression belongs to
    #[must_use]
    pub const fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Operation of the node
    #[must_use]
    pub fn op(&self) -> Op {
        self.graph.node(self.id).op
    }

    /// Category of the node
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.op().node_type()
    }

    /// Shape of the node's output
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.graph.shape(self.id)
    }

    /// Node has no operands
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.node_type() == NodeType::Leaf
    }

    /// Operands in order
    #[must_use]
    pub fn operands(&self) -> Vec<Expression<'g>> {
        self.operand_ids()
            .into_iter()
            .map(|id| {
                self.graph.retain(id);
                Self::from_raw(self.graph, id)
            })
            .collect()
    }

    pub(crate) fn operand_ids(&self) -> SmallVec<[NodeId; 2]> {
        self.graph.node(self.id).operands
    }

    /// Number of operand slots across the graph that reference this node.
    /// Does not include expression handles.
    #[must_use]
    pub fn consumer_count(&self) -> u32 {
        self.graph.consumers(self.id)
    }

    /// Description of the node with operand ids, e.g. `Mul(3, 5)`
    #[must_use]
    pub fn description(&self) -> String {
        self.graph.node(self.id).description()
    }

    /// Shapes of both operands of broadcastable node
    #[must_use]
    pub fn broadcast_shapes(&self) -> Option<(Shape, Shape)> {
        if self.node_type() != NodeType::Broadcastable {
            return None;
        }
        match self.operand_ids().as_slice() {
            [x, y] => Some((self.graph.shape(*x), self.graph.shape(*y))),
            _ => None,
        }
    }

    /// Compare graphs behind two expressions by structure.
    ///
    /// Nodes are equal if they are the same node, or if they have equal ops
    /// and shapes and their operands are structurally equal. Inputs
    /// ([`Op::Leaf`]) are only equal to themselves.
    #[must_use]
    pub fn same_structure(&self, other: &Expression<'_>) -> bool {
        if !core::ptr::eq(self.graph, other.graph) {
            return false;
        }
        let graph = self.graph;
        let mut visited = BTreeSet::new();
        let mut params = vec![(self.id, other.id)];
        while let Some((x, y)) = params.pop() {
            if x == y || !visited.insert((x, y)) {
                continue;
            }
            let (xn, yn) = (graph.node(x), graph.node(y));
            if matches!(xn.op, Op::Leaf { .. })
                || xn.op != yn.op
                || xn.operands.len() != yn.operands.len()
                || graph.shape(x) != graph.shape(y)
            {
                return false;
            }
            params.extend(xn.parameters().zip(yn.parameters()));
        }
        true
    }

    fn unary(&self, op: Op) -> Result<Expression<'g>, GraphError> {
        Expression::new(self.graph, op, &[self])
    }

    fn binary(&self, other: &Expression<'g>, op: Op) -> Result<Expression<'g>, GraphError> {
        Expression::new(self.graph, op, &[self, other])
    }

    /// Constant in the same graph
    pub(crate) fn constant(
        &self,
        value: f32,
        shape: impl Into<Shape>,
    ) -> Result<Expression<'g>, GraphError> {
        self.graph.constant(value, shape)
    }

    /// Negation
    pub fn neg(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Neg)
    }

    /// Exponential
    pub fn exp(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Exp)
    }

    /// Natural logarithm
    pub fn ln(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Ln)
    }

    /// Hyperbolic tangent
    pub fn tanh(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Tanh)
    }

    /// Logistic function `1 / (1 + e^-x)`
    pub fn sigmoid(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Sigmoid)
    }

    /// `max(x, 0)`
    pub fn relu(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::ReLU)
    }

    /// 1 where x > 0, else 0. Not differentiable.
    pub fn step(&self) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Step)
    }

    /// Addition with broadcasting
    pub fn add(&self, other: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(other, Op::Add)
    }

    /// Subtraction with broadcasting
    pub fn sub(&self, other: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(other, Op::Sub)
    }

    /// Multiplication with broadcasting
    pub fn mul(&self, other: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(other, Op::Mul)
    }

    /// Division with broadcasting
    pub fn div(&self, other: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(other, Op::Div)
    }

    /// Mean of squared differences between self and target broadcasted
    /// to common shape. Result has shape `[1]`.
    pub fn mse_loss(&self, target: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(target, Op::MeanSquareLoss)
    }

    /// Mean binary cross entropy between probabilities in self and target
    /// of the same shape. Result has shape `[1]`.
    pub fn bce_loss(&self, target: &Expression<'g>) -> Result<Expression<'g>, GraphError> {
        self.binary(target, Op::BinaryCrossEntropyLoss)
    }

    /// Sum along axes, reduced axes are removed
    pub fn sum(&self, axes: impl Into<Axes>) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Sum { axes: axes.into() })
    }

    /// Broadcast to shape
    pub fn expand(&self, shape: impl Into<Shape>) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Expand { shape: shape.into() })
    }

    /// Reshape, number of elements must stay the same
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Expression<'g>, GraphError> {
        self.unary(Op::Reshape { shape: shape.into() })
    }
}
