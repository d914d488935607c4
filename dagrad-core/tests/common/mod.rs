//! Reference interpreter for tests. Evaluates graphs on the CPU through
//! the public inspection API.
#![allow(dead_code)]

use dagrad_core::{Expression, Graph, GraphError, NodeId, Op};
use std::collections::BTreeMap;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Values of inputs, keyed by node id
#[derive(Debug, Default, Clone)]
pub struct Inputs {
    values: BTreeMap<NodeId, Vec<f32>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, x: &Expression<'_>, data: &[f32]) -> &mut Self {
        assert_eq!(x.shape().numel(), data.len(), "wrong number of values for {x}");
        self.values.insert(x.id(), data.to_vec());
        self
    }
}

/// Evaluate root given values of all reachable inputs
pub fn eval(
    graph: &Graph,
    root: &Expression<'_>,
    inputs: &Inputs,
) -> Result<Vec<f32>, GraphError> {
    let topo = graph.build_topo(root)?;
    let mut values: BTreeMap<NodeId, Vec<f32>> = BTreeMap::new();
    for &nid in topo.iter().rev() {
        let x = graph.expression(nid).ok_or(GraphError::UnresolvedReference { id: nid })?;
        let shape = x.shape();
        let operands = x.operands();
        let arg = |i: usize| {
            let p = &operands[i];
            (values[&p.id()].as_slice(), p.shape().dims().to_vec())
        };
        let data = match x.op() {
            Op::Leaf { label, .. } => inputs
                .values
                .get(&nid)
                .unwrap_or_else(|| panic!("missing value of input {label}"))
                .clone(),
            Op::Const { value, shape } => vec![value; shape.numel()],
            Op::Neg => unary(arg(0).0, |v| -v),
            Op::Exp => unary(arg(0).0, f32::exp),
            Op::Ln => unary(arg(0).0, f32::ln),
            Op::Tanh => unary(arg(0).0, f32::tanh),
            Op::Sigmoid => unary(arg(0).0, |v| 1. / (1. + (-v).exp())),
            Op::ReLU => unary(arg(0).0, |v| v.max(0.)),
            Op::Step => unary(arg(0).0, |v| if v > 0. { 1. } else { 0. }),
            Op::Add => binary(arg(0), arg(1), shape.dims(), |a, b| a + b),
            Op::Sub => binary(arg(0), arg(1), shape.dims(), |a, b| a - b),
            Op::Mul => binary(arg(0), arg(1), shape.dims(), |a, b| a * b),
            Op::Div => binary(arg(0), arg(1), shape.dims(), |a, b| a / b),
            Op::MeanSquareLoss => {
                let (a, b) = (arg(0), arg(1));
                let out = broadcast_dims(&a.1, &b.1);
                let sq = binary(a, b, &out, |a, b| (a - b) * (a - b));
                vec![sq.iter().sum::<f32>() / sq.len() as f32]
            }
            Op::BinaryCrossEntropyLoss => {
                let (o, t) = (arg(0).0, arg(1).0);
                let total: f32 = o
                    .iter()
                    .zip(t)
                    .map(|(o, t)| -(t * o.ln() + (1. - t) * (1. - o).ln()))
                    .sum();
                vec![total / o.len() as f32]
            }
            Op::Sum { axes } => {
                let (a, a_shape) = arg(0);
                let mut out = vec![0.; shape.numel()];
                for (i, v) in a.iter().enumerate() {
                    let index = unravel(i, &a_shape);
                    let kept: Vec<usize> = index
                        .iter()
                        .enumerate()
                        .filter(|(d, _)| !axes.contains(*d))
                        .map(|(_, i)| *i)
                        .collect();
                    let o = if kept.is_empty() { 0 } else { ravel(&kept, shape.dims()) };
                    out[o] += v;
                }
                out
            }
            Op::Expand { shape } => {
                let (a, a_shape) = arg(0);
                (0..shape.numel())
                    .map(|i| a[broadcast_index(&unravel(i, shape.dims()), &a_shape)])
                    .collect()
            }
            Op::Reshape { .. } => arg(0).0.to_vec(),
        };
        values.insert(nid, data);
    }
    Ok(values.remove(&root.id()).unwrap_or_default())
}

fn unary(a: &[f32], f: impl Fn(f32) -> f32) -> Vec<f32> {
    a.iter().map(|v| f(*v)).collect()
}

fn binary(
    a: (&[f32], Vec<usize>),
    b: (&[f32], Vec<usize>),
    out: &[usize],
    f: impl Fn(f32, f32) -> f32,
) -> Vec<f32> {
    let numel: usize = out.iter().product();
    (0..numel)
        .map(|i| {
            let index = unravel(i, out);
            f(a.0[broadcast_index(&index, &a.1)], b.0[broadcast_index(&index, &b.1)])
        })
        .collect()
}

fn broadcast_dims(a: &[usize], b: &[usize]) -> Vec<usize> {
    let rank = a.len().max(b.len());
    let pad = |s: &[usize]| {
        let mut v = vec![1; rank - s.len()];
        v.extend_from_slice(s);
        v
    };
    pad(a).into_iter().zip(pad(b)).map(|(a, b)| a.max(b)).collect()
}

fn unravel(mut i: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (d, &n) in shape.iter().enumerate().rev() {
        index[d] = i % n;
        i /= n;
    }
    index
}

fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index.iter().zip(shape).fold(0, |acc, (i, n)| acc * n + i)
}

/// Index into right aligned, possibly broadcasted shape
fn broadcast_index(index: &[usize], shape: &[usize]) -> usize {
    let offset = index.len() - shape.len();
    let index: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(d, &n)| if n == 1 { 0 } else { index[offset + d] })
        .collect();
    ravel(&index, shape)
}

/// Central finite difference of scalar root with respect to every element of x
pub fn numeric_gradient(
    graph: &Graph,
    root: &Expression<'_>,
    x: &Expression<'_>,
    inputs: &Inputs,
) -> Result<Vec<f32>, GraphError> {
    let eps = 1e-2;
    let base = inputs.values[&x.id()].clone();
    let mut grad = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut plus = inputs.clone();
        let mut minus = inputs.clone();
        let mut data = base.clone();
        data[i] += eps;
        plus.set(x, &data);
        data[i] -= 2. * eps;
        minus.set(x, &data);
        let f = |inputs: &Inputs| -> Result<f32, GraphError> {
            Ok(eval(graph, root, inputs)?.iter().sum())
        };
        grad.push((f(&plus)? - f(&minus)?) / (2. * eps));
    }
    Ok(grad)
}
