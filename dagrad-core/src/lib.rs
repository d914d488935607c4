//! # dagrad-core
//!
//! dagrad-core is a computation graph with reverse-mode automatic
//! differentiation. Expressions are composed into a directed acyclic graph
//! of typed operations, [Autograd] derives a second graph computing the
//! gradient of a root expression with respect to its inputs.
//!
//! dagrad-core does not execute graphs. Executors walk them through
//! [`Graph::build_topo`] and the inspection methods of [Expression].
//!
//! ```
//! use dagrad_core::{Autograd, Graph, GraphError};
//!
//! let graph = Graph::new();
//! let x = graph.leaf("x", [4, 3])?;
//! let target = graph.leaf("target", 3)?;
//! let loss = x.sigmoid()?.mse_loss(&target)?;
//! let grads = Autograd::new(&loss).backward()?;
//! assert_eq!(grads.get(&target).map(|g| g.shape()), Some(3.into()));
//! # Ok::<(), GraphError>(())
//! ```
#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::private_doc_tests)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_html_tags)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]
#![forbid(rustdoc::unescaped_backticks)]
#![forbid(rustdoc::redundant_explicit_links)]

/// See [Autograd](autograd::Autograd)
pub mod autograd;
/// See [Axes](axes::Axes)
pub mod axes;
mod backward;
/// See [GraphConfig](config::GraphConfig)
pub mod config;
/// See [GraphError](error::GraphError)
pub mod error;
/// See [Expression](expression::Expression)
pub mod expression;
/// See [Graph](graph::Graph)
pub mod graph;
/// See [Node](node::Node) and [Op](node::Op)
pub mod node;
/// See [Shape](shape::Shape)
pub mod shape;
mod slab;

pub use autograd::{Autograd, Gradients};
pub use axes::Axes;
pub use config::{GraphConfig, DEBUG_DOT, DEBUG_GRAD, DEBUG_TOPO};
pub use error::GraphError;
pub use expression::Expression;
pub use graph::Graph;
pub use node::{Node, NodeId, NodeType, Op};
pub use shape::Shape;
