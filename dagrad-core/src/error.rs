use crate::node::{NodeId, NodeType};
use crate::shape::Shape;
use thiserror::Error;

/// Errors returned while building graphs or deriving gradients.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Operation was given wrong number of operands.
    #[error("arity mismatch: {op} takes {expected} operands, got {found}")]
    ArityMismatch {
        /// Description of the operation
        op: String,
        /// Number of operands the operation takes
        expected: usize,
        /// Number of operands passed
        found: usize,
    },

    /// Generic traversal step has no handling for this category of node.
    #[error("unsupported node type {node_type:?} of node {id} ({description})")]
    UnsupportedNodeType {
        /// Offending node
        id: NodeId,
        /// Its category
        node_type: NodeType,
        /// Node description
        description: String,
    },

    /// Node was reached in backward order without any accumulated gradient.
    /// This is an internal bug in topological ordering.
    #[error("node {id} was reached without accumulated gradient")]
    UnresolvedReference {
        /// Offending node
        id: NodeId,
    },

    /// Node is its own transitive operand.
    #[error("cycle detected in graph at node {id}")]
    CyclicGraphDetected {
        /// Some node on the cycle
        id: NodeId,
    },

    /// Shapes are not compatible for given operation.
    #[error("shape mismatch in {op}: {lhs} and {rhs}")]
    ShapeMismatch {
        /// Description of the operation
        op: String,
        /// First shape
        lhs: Shape,
        /// Second shape
        rhs: Shape,
    },

    /// Shape is empty or has zero sized dimension.
    #[error("invalid shape {shape}")]
    InvalidShape {
        /// Passed shape
        shape: Shape,
    },

    /// Reduce axes are out of range or repeated.
    #[error("invalid axes {axes:?} for shape {shape}")]
    InvalidAxes {
        /// Passed axes
        axes: Vec<usize>,
        /// Shape being reduced
        shape: Shape,
    },

    /// Expressions from different graphs were combined.
    #[error("expression {id} belongs to a different graph")]
    ForeignExpression {
        /// Id of the foreign expression
        id: NodeId,
    },

    /// Graph config could not be read or parsed.
    #[error("graph config: {0}")]
    Config(String),
}
