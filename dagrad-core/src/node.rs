use crate::{axes::Axes, error::GraphError, shape::Shape, slab};
use core::fmt::{Display, Formatter};
use smallvec::SmallVec;

/// Id of node in [Graph](crate::graph::Graph).
/// Ids are stable for the whole lifetime of the node.
#[derive(Clone, Copy, PartialOrd, PartialEq, Ord, Eq, Hash, Debug)]
pub struct NodeId(slab::Id);

impl NodeId {
    pub(crate) const fn new(id: slab::Id) -> Self {
        Self(id)
    }

    pub(crate) const fn raw(self) -> slab::Id {
        self.0
    }

    /// Convert id to usize
    #[must_use]
    pub const fn i(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

/// Category of operation, generic graph algorithms dispatch on it
/// instead of on the concrete [Op].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeType {
    /// No operands, input, parameter or constant
    Leaf,
    /// Unary pointwise op, output has operand's shape
    Elementwise,
    /// Pointwise predicate, not differentiable
    Comparison,
    /// Binary op with broadcasting of operand shapes
    Broadcastable,
    /// Loss over two operands of equal shape, scalar output
    Loss,
    /// Reduction along axes
    Reduce,
    /// Movement op, changes shape but not values
    Movement,
}

/// Operation of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Input or parameter
    Leaf {
        /// Name used in descriptions
        label: Box<str>,
        /// Shape of the input
        shape: Shape,
    },
    /// Tensor filled with single value
    Const {
        /// Fill value
        value: f32,
        /// Shape of the constant
        shape: Shape,
    },
    /// Neg unary op
    Neg,
    /// Exp unary op
    Exp,
    /// Natural logarithm unary op
    Ln,
    /// Hyperbolic tangent unary op
    Tanh,
    /// Logistic function unary op
    Sigmoid,
    /// ReLU unary op
    ReLU,
    /// 1 where operand is positive, 0 elsewhere
    Step,
    /// Addition binary op
    Add,
    /// Subtraction binary op
    Sub,
    /// Multiplication binary op
    Mul,
    /// Division binary op
    Div,
    /// Mean of squared differences between output and broadcasted target
    MeanSquareLoss,
    /// Mean binary cross entropy between output probabilities and target
    BinaryCrossEntropyLoss,
    /// Sum reduce op, reduced axes are removed
    Sum {
        /// Reduced axes
        axes: Axes,
    },
    /// Expand (broadcast) movement op
    Expand {
        /// Result shape
        shape: Shape,
    },
    /// Reshape movement op
    Reshape {
        /// Result shape
        shape: Shape,
    },
}

impl Op {
    /// Category of this op
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Op::Leaf { .. } | Op::Const { .. } => NodeType::Leaf,
            Op::Neg | Op::Exp | Op::Ln | Op::Tanh | Op::Sigmoid | Op::ReLU => NodeType::Elementwise,
            Op::Step => NodeType::Comparison,
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::MeanSquareLoss => NodeType::Broadcastable,
            Op::BinaryCrossEntropyLoss => NodeType::Loss,
            Op::Sum { .. } => NodeType::Reduce,
            Op::Expand { .. } | Op::Reshape { .. } => NodeType::Movement,
        }
    }

    /// Number of operands this op takes
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self.node_type() {
            NodeType::Leaf => 0,
            NodeType::Elementwise
            | NodeType::Comparison
            | NodeType::Reduce
            | NodeType::Movement => 1,
            NodeType::Broadcastable | NodeType::Loss => 2,
        }
    }

    /// Short stable description, without operands
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Op::Leaf { label, shape } => format!("Leaf({label}, {shape})"),
            Op::Const { value, shape } => format!("Const({value}, {shape})"),
            Op::Sum { axes } => format!("Sum({axes})"),
            Op::Expand { shape } => format!("Expand({shape})"),
            Op::Reshape { shape } => format!("Reshape({shape})"),
            op => format!("{op:?}"),
        }
    }

    /// Infer shape of this op's output from shapes of operands.
    pub fn output_shape(&self, operands: &[&Shape]) -> Result<Shape, GraphError> {
        if operands.len() != self.arity() {
            return Err(GraphError::ArityMismatch {
                op: self.description(),
                expected: self.arity(),
                found: operands.len(),
            });
        }
        let shape = match (self, operands) {
            (Op::Leaf { shape, .. } | Op::Const { shape, .. }, []) => shape.clone(),
            (Op::Add | Op::Sub | Op::Mul | Op::Div, [x, y]) => x
                .broadcast(y)
                .ok_or_else(|| self.shape_mismatch(x, y))?,
            (Op::MeanSquareLoss, [x, y]) => {
                x.broadcast(y).ok_or_else(|| self.shape_mismatch(x, y))?;
                Shape::from(1)
            }
            (Op::BinaryCrossEntropyLoss, [x, y]) => {
                if x != y {
                    return Err(self.shape_mismatch(x, y));
                }
                Shape::from(1)
            }
            (Op::Sum { axes }, [x]) => {
                if axes.is_empty() || !axes.is_valid_for(x.rank()) {
                    return Err(GraphError::InvalidAxes {
                        axes: axes.iter().copied().collect(),
                        shape: (*x).clone(),
                    });
                }
                x.remove_axes(axes)
            }
            (Op::Expand { shape }, [x]) => {
                if !x.expands_to(shape) {
                    return Err(self.shape_mismatch(x, shape));
                }
                shape.clone()
            }
            (Op::Reshape { shape }, [x]) => {
                if x.numel() != shape.numel() {
                    return Err(self.shape_mismatch(x, shape));
                }
                shape.clone()
            }
            (_, [x]) => (*x).clone(),
            // Arity was checked above
            _ => unreachable!(),
        };
        if !shape.is_valid() {
            return Err(GraphError::InvalidShape { shape });
        }
        Ok(shape)
    }

    fn shape_mismatch(&self, x: &Shape, y: &Shape) -> GraphError {
        GraphError::ShapeMismatch {
            op: self.description(),
            lhs: x.clone(),
            rhs: y.clone(),
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.description())
    }
}

/// Operation together with ids of its operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) op: Op,
    pub(crate) operands: SmallVec<[NodeId; 2]>,
}

impl Node {
    /// Operation of this node
    #[must_use]
    pub const fn op(&self) -> &Op {
        &self.op
    }

    /// Ids of operands in order
    #[must_use]
    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    /// Get all parameters of self. This method does not allocate.
    pub fn parameters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.operands.iter().copied()
    }

    /// Check if parameters of self contains nid.
    #[must_use]
    pub fn parameters_contain(&self, nid: NodeId) -> bool {
        self.operands.contains(&nid)
    }

    /// Description with operand ids, e.g. `Mul(3, 5)`
    #[must_use]
    pub fn description(&self) -> String {
        if self.operands.is_empty() {
            return self.op.description();
        }
        let operands: Vec<String> = self.operands.iter().map(NodeId::to_string).collect();
        match &self.op {
            Op::Sum { axes } => format!("Sum({}, {axes})", operands.join(", ")),
            Op::Expand { shape } => format!("Expand({}, {shape})", operands.join(", ")),
            Op::Reshape { shape } => format!("Reshape({}, {shape})", operands.join(", ")),
            op => format!("{op:?}({})", operands.join(", ")),
        }
    }
}
