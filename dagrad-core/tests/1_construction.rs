use dagrad_core::{Expression, Graph, GraphError, NodeType, Op, Shape};

mod common;

#[test]
fn mse_with_one_operand() -> Result<(), GraphError> {
    let graph = Graph::new();
    let x = graph.leaf("x", 3)?;
    let len = graph.len();
    let res = Expression::new(&graph, Op::MeanSquareLoss, &[&x]);
    assert!(matches!(
        res,
        Err(GraphError::ArityMismatch { expected: 2, found: 1, .. })
    ));
    // Failed construction leaves no node behind
    assert_eq!(graph.len(), len);
    Ok(())
}

#[test]
fn leaf_with_operand() -> Result<(), GraphError> {
    let graph = Graph::new();
    let x = graph.leaf("x", 3)?;
    let one = Op::Const {
        value: 1.,
        shape: 3.into(),
    };
    let res = Expression::new(&graph, one, &[&x]);
    assert!(matches!(res, Err(GraphError::ArityMismatch { expected: 0, found: 1, .. })));
    let res = Expression::new(&graph, Op::Sigmoid, &[]);
    assert!(matches!(res, Err(GraphError::ArityMismatch { expected: 1, found: 0, .. })));
    Ok(())
}

#[test]
fn incompatible_shapes() -> Result<(), GraphError> {
    let graph = Graph::new();
    let x = graph.leaf("x", [4, 3])?;
    let y = graph.leaf("y", [4, 2])?;
    assert!(matches!(x.add(&y), Err(GraphError::ShapeMismatch { .. })));
    assert!(matches!(x.mse_loss(&y), Err(GraphError::ShapeMismatch { .. })));
    assert!(matches!(x.reshape([5, 2]), Err(GraphError::ShapeMismatch { .. })));
    assert!(matches!(x.expand([4, 6]), Err(GraphError::ShapeMismatch { .. })));
    assert!(matches!(x.sum([2]), Err(GraphError::InvalidAxes { .. })));
    assert!(matches!(graph.leaf("z", [3, 0]), Err(GraphError::InvalidShape { .. })));
    Ok(())
}

#[test]
fn output_shapes() -> Result<(), GraphError> {
    let graph = Graph::new();
    let x = graph.leaf("x", [4, 3])?;
    let t = graph.leaf("t", 3)?;
    assert_eq!(x.mul(&t)?.shape(), Shape::from([4, 3]));
    assert_eq!(x.mse_loss(&t)?.shape(), Shape::from(1));
    assert_eq!(x.sum([0])?.shape(), Shape::from(3));
    assert_eq!(x.sum([0, 1])?.shape(), Shape::from(1));
    assert_eq!(t.expand([2, 4, 3])?.shape(), Shape::from([2, 4, 3]));
    assert_eq!(x.reshape([2, 6])?.shape(), Shape::from([2, 6]));
    Ok(())
}

#[test]
fn identity_equality() -> Result<(), GraphError> {
    let graph = Graph::new();
    let x = graph.leaf("x", 3)?;
    let a = x.sigmoid()?;
    let b = x.sigmoid()?;
    let c = a.clone();
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert!(a.same_structure(&b));
    assert_eq!(a.id(), c.id());
    Ok(())
}

#[test]
fn foreign_operand() -> Result<(), GraphError> {
    let graph = Graph::new();
    let other = Graph::new();
    let x = graph.leaf("x", 3)?;
    let y = other.leaf("y", 3)?;
    assert!(matches!(
        Expression::new(&graph, Op::Add, &[&x, &y]),
        Err(GraphError::ForeignExpression { .. })
    ));
    assert!(!x.same_structure(&y));
    Ok(())
}

#[test]
fn inspection() -> Result<(), GraphError> {
    common::init_logger();
    let graph = Graph::new();
    let x = graph.leaf("x", [4, 3])?;
    let t = graph.leaf("t", 3)?;
    let s = x.sigmoid()?;
    let loss = s.mse_loss(&t)?;
    assert_eq!(loss.node_type(), NodeType::Broadcastable);
    assert_eq!(loss.op(), Op::MeanSquareLoss);
    assert_eq!(loss.operands(), vec![s.clone(), t.clone()]);
    assert_eq!(loss.broadcast_shapes(), Some((Shape::from([4, 3]), Shape::from(3))));
    assert_eq!(s.broadcast_shapes(), None);
    assert_eq!(s.consumer_count(), 1);
    assert!(x.is_leaf());
    assert!(x.operands().is_empty());
    assert_eq!(x.description(), "Leaf(x, [4, 3])");
    assert_eq!(loss.description(), format!("MeanSquareLoss({}, {})", s.id(), t.id()));
    let again = graph.expression(loss.id()).unwrap();
    assert_eq!(again, loss);
    Ok(())
}
