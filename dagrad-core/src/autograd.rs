use crate::error::GraphError;
use crate::expression::Expression;
use crate::node::{NodeId, Op};
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// Reverse-mode differentiation of a root expression.
///
/// Backward nodes are pushed into the same [Graph](crate::graph::Graph)
/// as the forward graph. Forward nodes are never modified, so several
/// backward passes over the same forward graph can run concurrently.
#[derive(Debug, Clone)]
pub struct Autograd<'g> {
    root: Expression<'g>,
    seed: Option<Expression<'g>>,
}

impl<'g> Autograd<'g> {
    /// Differentiate root, seeded with ones of root's shape
    #[must_use]
    pub fn new(root: &Expression<'g>) -> Self {
        Self {
            root: root.clone(),
            seed: None,
        }
    }

    /// Use seed as gradient of root.
    ///
    /// # Errors
    /// [`GraphError::ShapeMismatch`] if seed does not have root's shape.
    pub fn with_seed(mut self, seed: &Expression<'g>) -> Result<Self, GraphError> {
        if !core::ptr::eq(seed.graph(), self.root.graph()) {
            return Err(GraphError::ForeignExpression { id: seed.id() });
        }
        let (root_shape, seed_shape) = (self.root.shape(), seed.shape());
        if root_shape != seed_shape {
            return Err(GraphError::ShapeMismatch {
                op: String::from("backward seed"),
                lhs: root_shape,
                rhs: seed_shape,
            });
        }
        self.seed = Some(seed.clone());
        Ok(self)
    }

    /// Gradients of root with respect to all inputs ([`Op::Leaf`])
    /// reachable from root.
    pub fn backward(&self) -> Result<Gradients<'g>, GraphError> {
        let graph = self.root.graph();
        let topo = graph.build_topo(&self.root)?;
        let sources: BTreeSet<NodeId> = topo
            .iter()
            .copied()
            .filter(|nid| matches!(graph.node(*nid).op, Op::Leaf { .. }))
            .collect();
        let mut grads = BTreeMap::new();
        for (nid, grad) in self.run(&topo, &sources)? {
            // Held source keeps its id from being reused while gradients live
            let source = graph
                .expression(nid)
                .ok_or(GraphError::UnresolvedReference { id: nid })?;
            grads.insert(nid, (source, grad));
        }
        Ok(Gradients { grads })
    }

    /// Gradients of root with respect to sources, in the same order.
    /// Sources may be intermediate nodes. Returns [None] for sources that
    /// root does not depend on and for constants.
    pub fn gradient(
        &self,
        sources: &[&Expression<'g>],
    ) -> Result<Vec<Option<Expression<'g>>>, GraphError> {
        let graph = self.root.graph();
        let mut source_ids = BTreeSet::new();
        for x in sources {
            if !core::ptr::eq(x.graph(), graph) {
                return Err(GraphError::ForeignExpression { id: x.id() });
            }
            if !matches!(x.op(), Op::Const { .. }) {
                source_ids.insert(x.id());
            }
        }
        let topo = graph.build_topo(&self.root)?;
        let grads = self.run(&topo, &source_ids)?;
        Ok(sources.iter().map(|x| grads.get(&x.id()).cloned()).collect())
    }

    fn run(
        &self,
        topo: &[NodeId],
        sources: &BTreeSet<NodeId>,
    ) -> Result<BTreeMap<NodeId, Expression<'g>>, GraphError> {
        let graph = self.root.graph();
        let config = graph.config();
        // Nodes lying on a path from root to some source
        let mut req_grad = BTreeSet::new();
        for &nid in topo.iter().rev() {
            let on_path = graph.node(nid).parameters().any(|p| req_grad.contains(&p));
            if sources.contains(&nid) || on_path {
                req_grad.insert(nid);
            }
        }
        let root = self.root.id();
        let mut grads: BTreeMap<NodeId, Expression<'g>> = BTreeMap::new();
        if !req_grad.contains(&root) {
            log::debug!("Root {root} does not depend on any of {} sources", sources.len());
            return Ok(grads);
        }
        log::debug!(
            "Backward from {root}, {} of {} nodes require gradient",
            req_grad.len(),
            topo.len()
        );
        let seed = match &self.seed {
            Some(seed) => seed.clone(),
            None => graph.constant(1., self.root.shape())?,
        };
        grads.insert(root, seed);
        for &nid in topo {
            if !req_grad.contains(&nid) {
                continue;
            }
            let grad = grads.get(&nid).cloned().ok_or(GraphError::UnresolvedReference { id: nid })?;
            let node = graph.node(nid);
            if node.parameters().any(|p| req_grad.contains(&p)) {
                let x = graph.expression(nid).ok_or(GraphError::UnresolvedReference { id: nid })?;
                let contributions = x.backward(&grad)?;
                for (&p, contribution) in node.operands().iter().zip(contributions) {
                    if req_grad.contains(&p) {
                        self.join(&mut grads, p, contribution)?;
                    }
                }
            }
            if !sources.contains(&nid) {
                grads.remove(&nid);
            }
        }
        grads.retain(|nid, _| sources.contains(nid));
        if config.debug_dot() {
            let roots: Vec<&Expression<'g>> = grads.values().collect();
            log::debug!("Backward graph from {root}:\n{}", graph.plot_dot_graph(&roots));
        }
        log::debug!(
            "Backward from {root} finished with {} gradients, graph has {} nodes",
            grads.len(),
            graph.len()
        );
        Ok(grads)
    }

    /// Add contribution to accumulator of nid
    fn join(
        &self,
        grads: &mut BTreeMap<NodeId, Expression<'g>>,
        nid: NodeId,
        contribution: Expression<'g>,
    ) -> Result<(), GraphError> {
        let graph = self.root.graph();
        let (shape, grad_shape) = (graph.shape(nid), contribution.shape());
        if shape != grad_shape {
            return Err(GraphError::ShapeMismatch {
                op: format!("gradient of node {nid}"),
                lhs: shape,
                rhs: grad_shape,
            });
        }
        let trace = graph.config().debug_grad();
        match grads.entry(nid) {
            btree_map::Entry::Vacant(entry) => {
                if trace {
                    log::trace!("Gradient of {nid} initialized with {}", contribution.id());
                }
                entry.insert(contribution);
            }
            btree_map::Entry::Occupied(mut entry) => {
                let sum = entry.get().add(&contribution)?;
                if trace {
                    log::trace!(
                        "Gradient of {nid} joined {} + {} = {}",
                        entry.get().id(),
                        contribution.id(),
                        sum.id()
                    );
                }
                entry.insert(sum);
            }
        }
        Ok(())
    }
}

/// Gradients produced by [`Autograd::backward`], keyed by input node.
/// Inputs are held until gradients are dropped.
#[derive(Debug, Clone, Default)]
pub struct Gradients<'g> {
    grads: BTreeMap<NodeId, (Expression<'g>, Expression<'g>)>,
}

impl<'g> Gradients<'g> {
    /// Gradient of x, [None] if root does not depend on x
    #[must_use]
    pub fn get(&self, x: &Expression<'g>) -> Option<&Expression<'g>> {
        self.grads
            .get(&x.id())
            .filter(|(source, _)| source == x)
            .map(|(_, grad)| grad)
    }

    /// Number of inputs with gradient
    #[must_use]
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    /// No input has gradient
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Iterate over inputs and their gradients in order of node ids
    pub fn iter(&self) -> impl Iterator<Item = (&Expression<'g>, &Expression<'g>)> {
        self.grads.values().map(|(source, grad)| (source, grad))
    }
}

impl<'g> IntoIterator for Gradients<'g> {
    type Item = (Expression<'g>, Expression<'g>);
    type IntoIter = btree_map::IntoValues<NodeId, (Expression<'g>, Expression<'g>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.grads.into_values()
    }
}
