// src/dag/plan.rs

//! The node graph of one build, backed by `petgraph`.
//!
//! Edge direction: dependency -> dependent. A plan is mutable until
//! [`ExecutionPlan::finalize`] computes its topological order; after that it
//! is read-only apart from completion notifications.

use std::collections::HashMap;
use std::fmt;
use std::io;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::dag::node::{Node, NodeKey, Task, TaskRef};
use crate::errors::{CompositeError, Result};
use crate::types::BuildIdentifier;

/// Callback invoked for every task node that completes.
pub type CompletionHandler = Box<dyn Fn(&Task) + Send + Sync>;

/// Resource release hook run when a plan is closed.
pub type CloseHook = Box<dyn FnOnce() -> io::Result<()> + Send>;

pub struct ExecutionPlan {
    build: BuildIdentifier,
    graph: DiGraph<Node, ()>,
    index: HashMap<NodeKey, NodeIndex>,
    /// Entry tasks in the order they were requested.
    entries: Vec<NodeKey>,
    /// Tasks of other builds discovered while adding tasks, not yet routed.
    cross_build: Vec<TaskRef>,
    handlers: Vec<CompletionHandler>,
    close_hooks: Vec<CloseHook>,
    order: Option<Vec<NodeIndex>>,
}

impl ExecutionPlan {
    pub fn new(build: BuildIdentifier) -> Self {
        Self {
            build,
            graph: DiGraph::new(),
            index: HashMap::new(),
            entries: Vec::new(),
            cross_build: Vec::new(),
            handlers: Vec::new(),
            close_hooks: Vec::new(),
            order: None,
        }
    }

    pub fn build(&self) -> &BuildIdentifier {
        &self.build
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn is_finalized(&self) -> bool {
        self.order.is_some()
    }

    pub fn entry_tasks(&self) -> &[NodeKey] {
        &self.entries
    }

    /// Add `task` (and everything it depends on) as a root of the graph.
    ///
    /// Returns `false` if the task already was an entry task.
    pub fn add_entry_task(&mut self, task: &TaskRef) -> Result<bool> {
        self.ensure_mutable()?;
        self.add_task_node(task);

        let key = NodeKey::Task(task.path().clone());
        if self.entries.contains(&key) {
            return Ok(false);
        }
        debug!(build = %self.build, task = %task.path(), "added entry task");
        self.entries.push(key);
        Ok(true)
    }

    /// Add arbitrary nodes. Synthetic nodes may only depend on nodes that are
    /// already present.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> Result<()> {
        self.ensure_mutable()?;

        for node in nodes {
            match node {
                Node::Task(task) | Node::External(task) => {
                    self.add_task_node(&task);
                }
                Node::Synthetic(synthetic) => {
                    let key = NodeKey::Synthetic(synthetic.name.clone());
                    if self.index.contains_key(&key) {
                        continue;
                    }
                    let mut deps = Vec::with_capacity(synthetic.depends_on.len());
                    for dep in &synthetic.depends_on {
                        let idx = self.index.get(dep).copied().ok_or_else(|| {
                            CompositeError::InvalidWorkGraph(format!(
                                "{key} in {} depends on unknown {dep}",
                                self.build
                            ))
                        })?;
                        deps.push(idx);
                    }
                    let idx = self.graph.add_node(Node::Synthetic(synthetic));
                    self.index.insert(key, idx);
                    for dep in deps {
                        self.graph.add_edge(dep, idx, ());
                    }
                }
            }
        }

        Ok(())
    }

    /// Make `dependent` wait for `dependency`. Both nodes must exist.
    pub fn add_dependency(&mut self, dependent: &NodeKey, dependency: &NodeKey) -> Result<()> {
        self.ensure_mutable()?;
        let from = self.lookup(dependency)?;
        let to = self.lookup(dependent)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Drain the tasks of other builds this plan has come to depend on.
    pub fn take_cross_build_requests(&mut self) -> Vec<TaskRef> {
        std::mem::take(&mut self.cross_build)
    }

    pub fn on_complete(&mut self, handler: CompletionHandler) {
        self.handlers.push(handler);
    }

    pub fn add_close_hook(&mut self, hook: CloseHook) {
        self.close_hooks.push(hook);
    }

    /// Compute and freeze the execution order.
    pub fn finalize(&mut self) -> Result<()> {
        if self.order.is_some() {
            return Ok(());
        }

        match toposort(&self.graph, None) {
            Ok(order) => {
                debug!(
                    build = %self.build,
                    nodes = order.len(),
                    entries = self.entries.len(),
                    "work graph finalized"
                );
                self.order = Some(order);
                Ok(())
            }
            Err(cycle) => {
                let node = self.graph[cycle.node_id()].key();
                Err(CompositeError::InvalidWorkGraph(format!(
                    "cycle detected in work graph of {} involving {}",
                    self.build, node
                )))
            }
        }
    }

    /// Nodes in execution order. Empty until the plan is finalized.
    pub fn execution_order(&self) -> Vec<&Node> {
        self.order
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|idx| &self.graph[*idx])
            .collect()
    }

    /// Direct dependencies of the node stored under `key`.
    pub fn dependencies_of(&self, key: &NodeKey) -> Vec<NodeKey> {
        let Some(idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut deps: Vec<NodeKey> = self
            .graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|dep| self.graph[dep].key())
            .collect();
        deps.sort();
        deps
    }

    /// Report that `node` completed; task nodes are passed to every
    /// completion handler.
    pub fn node_completed(&self, node: &Node) {
        if let Node::Task(task) = node {
            for handler in &self.handlers {
                handler(task);
            }
        }
    }

    /// Release the plan's resources. Every close hook runs; the first error
    /// is returned.
    pub fn close(&mut self) -> io::Result<()> {
        let mut first_error = None;
        for hook in self.close_hooks.drain(..) {
            if let Err(err) = hook() {
                warn!(build = %self.build, error = %err, "work graph close hook failed");
                first_error.get_or_insert(err);
            }
        }
        self.handlers.clear();
        self.graph.clear();
        self.index.clear();
        // A closed plan stays finalized but has nothing left to run.
        if let Some(order) = self.order.as_mut() {
            order.clear();
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn add_task_node(&mut self, task: &TaskRef) -> NodeIndex {
        let key = NodeKey::Task(task.path().clone());
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }

        if task.build() != &self.build {
            let idx = self.graph.add_node(Node::External(task.clone()));
            self.index.insert(key, idx);
            debug!(
                build = %self.build,
                task = %task.path(),
                "task belongs to another build; recording cross-build request"
            );
            self.cross_build.push(task.clone());
            return idx;
        }

        let idx = self.graph.add_node(Node::Task(task.clone()));
        self.index.insert(key, idx);
        for dep in task.dependencies() {
            let dep_idx = self.add_task_node(dep);
            self.graph.update_edge(dep_idx, idx, ());
        }
        idx
    }

    fn lookup(&self, key: &NodeKey) -> Result<NodeIndex> {
        self.index.get(key).copied().ok_or_else(|| {
            CompositeError::InvalidWorkGraph(format!("{key} is not part of {}", self.build))
        })
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.order.is_some() {
            return Err(CompositeError::IllegalPhase {
                owner: format!("work graph of {}", self.build),
                message: "work graph is finalized and can no longer change".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("build", &self.build)
            .field("nodes", &self.graph.node_count())
            .field("entries", &self.entries)
            .field("finalized", &self.order.is_some())
            .finish_non_exhaustive()
    }
}
