// src/dag/mod.rs

//! Work graph representation.
//!
//! - [`node`] defines tasks and the nodes a graph is built from.
//! - [`plan`] holds the `petgraph`-backed graph of one build and computes
//!   its execution order.
//! - [`work_graph`] wraps a plan for a build lifecycle and defines the
//!   narrow [`WorkGraphBuilder`] capability used during population.

pub mod node;
pub mod plan;
pub mod work_graph;

pub use node::{Node, NodeKey, SyntheticNode, Task, TaskPath, TaskRef};
pub use plan::{CloseHook, CompletionHandler, ExecutionPlan};
pub use work_graph::{WorkGraph, WorkGraphBuilder};
