//! Local differentiation rules of every op.

use crate::error::GraphError;
use crate::expression::Expression;
use crate::node::{NodeType, Op};
use crate::shape::Shape;

impl<'g> Expression<'g> {
    /// Local gradient contributions of this node.
    ///
    /// Given `grad`, the gradient flowing into this node's output, returns
    /// one expression per operand, the gradient of that operand caused by
    /// this node alone. Each contribution has exactly its operand's shape.
    /// Leaves return no contributions.
    ///
    /// # Errors
    /// [`GraphError::ShapeMismatch`] if grad does not have this node's shape,
    /// [`GraphError::UnsupportedNodeType`] for nodes that are not differentiable.
    pub fn backward(&self, grad: &Expression<'g>) -> Result<Vec<Expression<'g>>, GraphError> {
        if !core::ptr::eq(self.graph(), grad.graph()) {
            return Err(GraphError::ForeignExpression { id: grad.id() });
        }
        let shape = self.shape();
        if grad.shape() != shape {
            return Err(GraphError::ShapeMismatch {
                op: format!("backward of {}", self.description()),
                lhs: shape,
                rhs: grad.shape(),
            });
        }
        let op = self.op();
        let operands = self.operands();
        match (op.node_type(), operands.as_slice()) {
            (NodeType::Leaf, []) => Ok(Vec::new()),
            (NodeType::Elementwise, [x]) => Ok(vec![self.elementwise_backward(&op, x, grad)?]),
            (NodeType::Broadcastable, [x, y]) => {
                let (x_grad, y_grad) = self.broadcastable_backward(&op, x, y, grad)?;
                // Contributions have broadcasted shape, sum them back to operand shapes
                Ok(vec![reduce_to(x_grad, &x.shape())?, reduce_to(y_grad, &y.shape())?])
            }
            (NodeType::Loss, [x, y]) => {
                let (x_grad, y_grad) = self.loss_backward(&op, x, y, grad)?;
                Ok(vec![x_grad, y_grad])
            }
            (NodeType::Reduce, [x]) => match op {
                Op::Sum { axes } => {
                    let x_shape = x.shape();
                    let keepdim = x_shape.clone().reduce(&axes);
                    let temp = reshape_to(grad.clone(), &keepdim)?;
                    Ok(vec![expand_to(temp, &x_shape)?])
                }
                _ => Err(self.unsupported()),
            },
            (NodeType::Movement, [x]) => match op {
                Op::Expand { .. } => Ok(vec![reduce_to(grad.clone(), &x.shape())?]),
                Op::Reshape { .. } => Ok(vec![reshape_to(grad.clone(), &x.shape())?]),
                _ => Err(self.unsupported()),
            },
            _ => Err(self.unsupported()),
        }
    }

    fn unsupported(&self) -> GraphError {
        GraphError::UnsupportedNodeType {
            id: self.id(),
            node_type: self.node_type(),
            description: self.description(),
        }
    }

    fn elementwise_backward(
        &self,
        op: &Op,
        x: &Expression<'g>,
        grad: &Expression<'g>,
    ) -> Result<Expression<'g>, GraphError> {
        match op {
            Op::Neg => grad.neg(),
            Op::Exp => grad.mul(self),
            Op::Ln => grad.div(x),
            Op::Tanh => {
                // grad * (1 - tanh^2(x))
                let one = self.constant(1., 1)?;
                let tanh_2 = self.mul(self)?;
                let one_minus = one.sub(&tanh_2)?;
                grad.mul(&one_minus)
            }
            Op::Sigmoid => {
                // grad * s * (1 - s)
                let one = self.constant(1., 1)?;
                let one_minus = one.sub(self)?;
                grad.mul(self)?.mul(&one_minus)
            }
            Op::ReLU => grad.mul(&x.step()?),
            _ => Err(self.unsupported()),
        }
    }

    fn broadcastable_backward(
        &self,
        op: &Op,
        x: &Expression<'g>,
        y: &Expression<'g>,
        grad: &Expression<'g>,
    ) -> Result<(Expression<'g>, Expression<'g>), GraphError> {
        match op {
            Op::Add => Ok((grad.clone(), grad.clone())),
            Op::Sub => Ok((grad.clone(), grad.neg()?)),
            Op::Mul => Ok((grad.mul(y)?, grad.mul(x)?)),
            Op::Div => {
                // -(grad*x/(y*y))
                let x_grad = grad.div(y)?;
                let grad_neg = grad.neg()?;
                let x_mul = grad_neg.mul(x)?;
                let y_squared = y.mul(y)?;
                Ok((x_grad, x_mul.div(&y_squared)?))
            }
            Op::MeanSquareLoss => {
                // grad * 2 * (x - y) / n, where n is size of broadcasted shape
                let n = x.shape().broadcast(&y.shape()).map_or(1, |sh| sh.numel());
                let scale = self.constant(2. / n as f32, 1)?;
                let coef = grad.mul(&scale)?;
                let diff = x.sub(y)?;
                let x_grad = diff.mul(&coef)?;
                let y_grad = x_grad.neg()?;
                Ok((x_grad, y_grad))
            }
            _ => Err(self.unsupported()),
        }
    }

    fn loss_backward(
        &self,
        op: &Op,
        x: &Expression<'g>,
        y: &Expression<'g>,
        grad: &Expression<'g>,
    ) -> Result<(Expression<'g>, Expression<'g>), GraphError> {
        match op {
            Op::BinaryCrossEntropyLoss => {
                // x_grad = grad * (x - y) / (x * (1 - x)) / n
                // y_grad = grad * (ln(1 - x) - ln(x)) / n
                let x_shape = x.shape();
                let scale = self.constant(1. / x_shape.numel() as f32, 1)?;
                let coef = grad.mul(&scale)?;
                let one = self.constant(1., 1)?;
                let one_minus = one.sub(x)?;
                let denom = x.mul(&one_minus)?;
                let diff = x.sub(y)?;
                let x_grad = coef.mul(&diff.div(&denom)?)?;
                let log_ratio = one_minus.ln()?.sub(&x.ln()?)?;
                let y_grad = coef.mul(&log_ratio)?;
                Ok((expand_to(x_grad, &x_shape)?, expand_to(y_grad, &x_shape)?))
            }
            _ => Err(self.unsupported()),
        }
    }
}

/// Sum grad along axes that were broadcasted, so that it has shape.
fn reduce_to<'g>(grad: Expression<'g>, shape: &Shape) -> Result<Expression<'g>, GraphError> {
    let grad_shape = grad.shape();
    if grad_shape == *shape {
        return Ok(grad);
    }
    let axes = shape.expand_axes(&grad_shape);
    if axes.is_empty() {
        // Only leading ones differ
        return reshape_to(grad, shape);
    }
    let summed = grad.sum(axes)?;
    reshape_to(summed, shape)
}

fn reshape_to<'g>(x: Expression<'g>, shape: &Shape) -> Result<Expression<'g>, GraphError> {
    if x.shape() == *shape {
        Ok(x)
    } else {
        x.reshape(shape)
    }
}

fn expand_to<'g>(x: Expression<'g>, shape: &Shape) -> Result<Expression<'g>, GraphError> {
    if x.shape() == *shape {
        Ok(x)
    } else {
        x.expand(shape)
    }
}
