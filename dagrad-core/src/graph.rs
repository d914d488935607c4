//! Graph of tensor operations.

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::expression::Expression;
use crate::node::{Node, NodeId, Op};
use crate::shape::Shape;
use crate::slab::Slab;
use smallvec::SmallVec;
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct NodeEntry {
    // Number of expressions and operand slots owning this node
    rc: u32,
    // Number of operand slots referencing this node, informational only
    consumers: u32,
    node: Node,
    shape: Shape,
}

/// Arena of nodes shared by all [Expression]s built from it.
///
/// Nodes are reference counted. Each [Expression] handle and each operand
/// slot of another node holds one reference. When the count drops to zero
/// the node is removed and its operands are released.
///
/// Graph is [Sync], independent backward passes may run concurrently over
/// the same forward graph.
pub struct Graph {
    nodes: Mutex<Slab<NodeEntry>>,
    config: GraphConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Graph {
    /// New empty graph with default config
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// New empty graph with given config
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: Mutex::new(Slab::new()),
            config,
        }
    }

    /// Config of this graph
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    // Arena is never left half updated, so poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Slab<NodeEntry>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Graph has no live nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// New input or parameter
    pub fn leaf(&self, label: &str, shape: impl Into<Shape>) -> Result<Expression<'_>, GraphError> {
        let op = Op::Leaf {
            label: label.into(),
            shape: shape.into(),
        };
        Expression::new(self, op, &[])
    }

    /// New constant filled with value
    pub fn constant(
        &self,
        value: f32,
        shape: impl Into<Shape>,
    ) -> Result<Expression<'_>, GraphError> {
        let op = Op::Const {
            value,
            shape: shape.into(),
        };
        Expression::new(self, op, &[])
    }

    /// Get handle to live node
    #[must_use]
    pub fn expression(&self, id: NodeId) -> Option<Expression<'_>> {
        let mut nodes = self.lock();
        let entry = nodes.get_mut(id.raw())?;
        entry.rc += 1;
        drop(nodes);
        Some(Expression::from_raw(self, id))
    }

    pub(crate) fn push(&self, op: Op, operands: &[NodeId]) -> Result<NodeId, GraphError> {
        let mut nodes = self.lock();
        let shape = {
            let mut shapes = SmallVec::<[&Shape; 2]>::new();
            for &x in operands {
                let entry = nodes.get(x.raw()).ok_or(GraphError::UnresolvedReference { id: x })?;
                shapes.push(&entry.shape);
            }
            op.output_shape(&shapes)?
        };
        for &x in operands {
            let entry = &mut nodes[x.raw()];
            entry.rc += 1;
            entry.consumers += 1;
        }
        let node = Node {
            op,
            operands: operands.into(),
        };
        let id = nodes.push(NodeEntry {
            rc: 1,
            consumers: 0,
            node,
            shape,
        });
        Ok(NodeId::new(id))
    }

    pub(crate) fn retain(&self, x: NodeId) {
        self.lock()[x.raw()].rc += 1;
    }

    /// Returns ids of removed nodes
    pub(crate) fn release(&self, x: NodeId) -> BTreeSet<NodeId> {
        let mut nodes = self.lock();
        let mut params = Vec::with_capacity(10);
        params.push(x);
        let mut to_remove = BTreeSet::new();
        while let Some(x) = params.pop() {
            let Some(entry) = nodes.get_mut(x.raw()) else {
                log::error!("Releasing node {x} which does not exist. This is internal bug.");
                continue;
            };
            entry.rc -= 1;
            if entry.rc == 0 {
                if let Some(entry) = nodes.remove(x.raw()) {
                    for p in entry.node.parameters() {
                        if let Some(param) = nodes.get_mut(p.raw()) {
                            param.consumers -= 1;
                        }
                        params.push(p);
                    }
                }
                to_remove.insert(x);
            }
        }
        to_remove
    }

    #[track_caller]
    pub(crate) fn node(&self, x: NodeId) -> Node {
        self.lock()[x.raw()].node.clone()
    }

    #[track_caller]
    pub(crate) fn shape(&self, x: NodeId) -> Shape {
        self.lock()[x.raw()].shape.clone()
    }

    #[track_caller]
    pub(crate) fn consumers(&self, x: NodeId) -> u32 {
        self.lock()[x.raw()].consumers
    }

    /// Order of all nodes reachable from root, such that every node comes
    /// after all of its consumers. Root is first, leaves are last.
    ///
    /// Iterative, uses Kahn's algorithm over in-degrees counted from
    /// consumer edges inside the reachable subgraph.
    pub fn build_topo(&self, root: &Expression<'_>) -> Result<Vec<NodeId>, GraphError> {
        if !core::ptr::eq(root.graph(), self) {
            return Err(GraphError::ForeignExpression { id: root.id() });
        }
        fn params(nodes: &Slab<NodeEntry>, nid: NodeId) -> Result<&Node, GraphError> {
            nodes
                .get(nid.raw())
                .map(|entry| &entry.node)
                .ok_or(GraphError::UnresolvedReference { id: nid })
        }
        let nodes = self.lock();
        let x = root.id();
        // Reachable nodes and number of consumer edges into each of them
        let mut indegree: BTreeMap<NodeId, u32> = BTreeMap::new();
        indegree.insert(x, 0);
        let mut stack = vec![x];
        while let Some(nid) = stack.pop() {
            for p in params(&nodes, nid)?.parameters() {
                match indegree.entry(p) {
                    Entry::Vacant(e) => {
                        e.insert(1);
                        stack.push(p);
                    }
                    Entry::Occupied(mut e) => *e.get_mut() += 1,
                }
            }
        }
        if indegree[&x] != 0 {
            return Err(GraphError::CyclicGraphDetected { id: x });
        }
        let mut order = Vec::with_capacity(indegree.len());
        let mut ready = vec![x];
        while let Some(nid) = ready.pop() {
            order.push(nid);
            // Reversed, so that first operand is visited first
            for p in params(&nodes, nid)?.operands().iter().rev() {
                if let Some(rc) = indegree.get_mut(p) {
                    *rc -= 1;
                    if *rc == 0 {
                        ready.push(*p);
                    }
                }
            }
        }
        if order.len() != indegree.len() {
            let id = indegree.iter().find(|(_, rc)| **rc > 0).map_or(x, |(id, _)| *id);
            return Err(GraphError::CyclicGraphDetected { id });
        }
        if self.config.debug_topo() {
            log::debug!("Topo from {x}: {order:?}");
        }
        Ok(order)
    }

    /// Plot graph reachable from given expressions in dot format.
    /// Nodes held by user are coral, nodes held only by other nodes are aqua.
    #[must_use]
    pub fn plot_dot_graph(&self, roots: &[&Expression<'_>]) -> String {
        let nodes = self.lock();
        let mut params: Vec<NodeId> = roots
            .iter()
            .filter(|x| core::ptr::eq(x.graph(), self))
            .map(|x| x.id())
            .collect();
        let mut ids = BTreeSet::new();
        while let Some(nid) = params.pop() {
            if let Some(entry) = nodes.get(nid.raw()) {
                if ids.insert(nid) {
                    params.extend(entry.node.parameters());
                }
            }
        }
        let mut res_dot_graph =
            String::from("strict digraph {\n  ordering=in\n  rank=source\n  rankdir=LR\n");
        let mut edges = String::new();
        for &id in &ids {
            let entry = &nodes[id.raw()];
            let color = if entry.rc > entry.consumers { "coral" } else { "aqua" };
            let shape = if entry.node.operands().is_empty() { "box" } else { "oval" };
            let label = format!(
                "{id} x {}\\n{}\\n{}",
                entry.rc,
                entry.node.op().description().replace('"', "'"),
                entry.shape,
            );
            res_dot_graph.push_str(&format!(
                "  {id}[label=\"{label}\", shape={shape}, fillcolor=\"{color}\", style=filled]\n"
            ));
            for param in entry.node.parameters() {
                edges.push_str(&format!("  {param} -> {id}\n"));
            }
        }
        res_dot_graph.push_str(&edges);
        res_dot_graph.push('}');
        res_dot_graph
    }

    /// Replace operands of node without any checks, used to build
    /// malformed graphs in tests.
    #[cfg(test)]
    pub(crate) fn rewire(&self, x: NodeId, operands: &[NodeId]) {
        let mut nodes = self.lock();
        for &p in operands {
            nodes[p.raw()].rc += 1;
            nodes[p.raw()].consumers += 1;
        }
        nodes[x.raw()].node.operands = operands.into();
    }
}

#[cfg(test)]
mod tests {
    use super::Graph;
    use crate::error::GraphError;

    #[test]
    fn ref_counting() -> Result<(), GraphError> {
        let graph = Graph::new();
        let x = graph.leaf("x", [2, 3])?;
        let y = x.sigmoid()?;
        let z = y.mul(&y)?;
        assert_eq!(graph.len(), 3);
        assert_eq!(y.consumer_count(), 2);
        assert_eq!(x.consumer_count(), 1);
        drop(y);
        // y is still held by z
        assert_eq!(graph.len(), 3);
        drop(z);
        assert_eq!(graph.len(), 1);
        assert_eq!(x.consumer_count(), 0);
        drop(x);
        assert!(graph.is_empty());
        Ok(())
    }

    #[test]
    fn topo_puts_consumers_first() -> Result<(), GraphError> {
        let graph = Graph::new();
        let x = graph.leaf("x", 3)?;
        let a = x.sigmoid()?;
        let b = x.relu()?;
        let c = a.add(&b)?;
        let d = c.mul(&a)?;
        let topo = graph.build_topo(&d)?;
        assert_eq!(topo.len(), 5);
        assert_eq!(topo[0], d.id());
        let pos = |e: &crate::Expression<'_>| topo.iter().position(|id| *id == e.id()).unwrap();
        assert!(pos(&c) < pos(&a));
        assert!(pos(&a) < pos(&x));
        assert!(pos(&b) < pos(&x));
        assert_eq!(*topo.last().unwrap(), x.id());
        Ok(())
    }

    #[test]
    fn deep_graph_does_not_overflow_stack() -> Result<(), GraphError> {
        let graph = Graph::new();
        let x = graph.leaf("x", 1)?;
        let mut y = x.clone();
        for _ in 0..100_000 {
            y = y.neg()?;
        }
        assert_eq!(graph.build_topo(&y)?.len(), 100_001);
        drop(y);
        assert_eq!(graph.len(), 1);
        Ok(())
    }

    #[test]
    fn cycle_is_detected() -> Result<(), GraphError> {
        let graph = Graph::new();
        let x = graph.leaf("x", 3)?;
        let a = x.exp()?;
        let b = a.exp()?;
        let c = b.exp()?;
        // a -> c -> b -> a
        graph.rewire(a.id(), &[c.id()]);
        assert!(matches!(graph.build_topo(&c), Err(GraphError::CyclicGraphDetected { .. })));
        let d = c.neg()?;
        assert!(matches!(graph.build_topo(&d), Err(GraphError::CyclicGraphDetected { .. })));
        Ok(())
    }

    #[test]
    fn dot_graph() -> Result<(), GraphError> {
        let graph = Graph::new();
        let x = graph.leaf("x", [2, 3])?;
        let y = x.relu()?;
        let dot = graph.plot_dot_graph(&[&y]);
        assert!(dot.starts_with("strict digraph {"));
        assert!(dot.contains(&format!("  {} -> {}", x.id(), y.id())));
        assert!(dot.contains("ReLU"));
        assert!(dot.ends_with('}'));
        Ok(())
    }
}
