// src/dag/node.rs

//! Tasks and the nodes a work graph is made of.

use std::fmt;
use std::sync::Arc;

use crate::types::BuildIdentifier;

/// Fully qualified task name: owning build plus task name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPath {
    pub build: BuildIdentifier,
    pub name: String,
}

impl TaskPath {
    pub fn new(build: BuildIdentifier, name: impl Into<String>) -> Self {
        Self {
            build,
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.build {
            BuildIdentifier::Root => write!(f, ":{}", self.name),
            BuildIdentifier::Included(build) => write!(f, ":{}:{}", build, self.name),
        }
    }
}

/// A schedulable task together with the tasks it depends on.
///
/// Dependencies may belong to other builds; adding such a task to a work
/// graph turns those dependencies into cross-build requests.
#[derive(Debug)]
pub struct Task {
    path: TaskPath,
    depends_on: Vec<TaskRef>,
}

pub type TaskRef = Arc<Task>;

impl Task {
    pub fn new(build: BuildIdentifier, name: impl Into<String>) -> Self {
        Self {
            path: TaskPath::new(build, name),
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, dependency: TaskRef) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }

    pub fn path(&self) -> &TaskPath {
        &self.path
    }

    pub fn build(&self) -> &BuildIdentifier {
        &self.path.build
    }

    pub fn name(&self) -> &str {
        &self.path.name
    }

    pub fn dependencies(&self) -> &[TaskRef] {
        &self.depends_on
    }
}

/// Key under which a node is stored in a work graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Task(TaskPath),
    Synthetic(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Task(path) => write!(f, "task {path}"),
            NodeKey::Synthetic(name) => write!(f, "node '{name}'"),
        }
    }
}

/// A non-task node, e.g. a barrier that completes once its dependencies did.
#[derive(Debug, Clone)]
pub struct SyntheticNode {
    pub name: String,
    pub depends_on: Vec<NodeKey>,
}

impl SyntheticNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, key: NodeKey) -> Self {
        self.depends_on.push(key);
        self
    }
}

/// Node of a work graph.
#[derive(Debug, Clone)]
pub enum Node {
    /// A task owned by the graph's build.
    Task(TaskRef),
    /// Placeholder for a task owned by another build; the owning build runs
    /// it and this node completes with it.
    External(TaskRef),
    Synthetic(SyntheticNode),
}

impl Node {
    pub fn key(&self) -> NodeKey {
        match self {
            Node::Task(task) | Node::External(task) => NodeKey::Task(task.path().clone()),
            Node::Synthetic(node) => NodeKey::Synthetic(node.name.clone()),
        }
    }
}
