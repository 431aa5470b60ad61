//! Task model and dependency directory.
//!
//! Tasks arrive as flat `SHOW TASKS` rows; the directory resolves the
//! serialized predecessor lists into a name-keyed forest that the renderers
//! walk. Everything here is an immutable snapshot of one fetch.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::warehouse::TaskRow;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("task '{dependent}' references unknown predecessor '{name}'")]
    UnknownPredecessor { name: String, dependent: String },
    #[error("dependency cycle detected at task '{0}'")]
    Cycle(String),
}

/// Scheduling state of a task, as reported by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Started,
    Suspended,
    Other(String),
}

impl TaskState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "started" => TaskState::Started,
            "suspended" => TaskState::Suspended,
            _ => TaskState::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Started => write!(f, "started"),
            TaskState::Suspended => write!(f, "suspended"),
            TaskState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A scheduled task with its resolved predecessor names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub name: String,
    pub id: String,
    pub state: TaskState,
    pub created_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_overlap: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub predecessors: Vec<String>,
}

impl Task {
    /// A root task has no predecessors.
    pub fn is_root(&self) -> bool {
        self.predecessors.is_empty()
    }
}

/// Parse a serialized predecessor list into bare task names.
///
/// The warehouse reports predecessors as a bracketed list of qualified names
/// (`["DB.SCHEMA.TASK_A"]`). Only the final segment identifies the task
/// within the schema. The empty list (`[]`) yields no predecessors, not one
/// empty-string predecessor.
pub fn parse_predecessors(raw: &str) -> Vec<String> {
    let inner = raw.trim().trim_matches(|c| c == '[' || c == ']').trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|part| {
            let name = part.trim().trim_matches('"').trim();
            name.rsplit('.').next().unwrap_or(name).to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Name-keyed collection of tasks from a single fetch.
///
/// Backed by a `BTreeMap` so iteration (and therefore rendered output) is
/// deterministic for a given fetch.
#[derive(Debug, Clone, Default)]
pub struct TaskDirectory {
    tasks: BTreeMap<String, Task>,
}

impl TaskDirectory {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }

    /// Build the directory from raw warehouse rows.
    pub fn from_rows(rows: &[TaskRow]) -> Self {
        let mut dir = Self::new();
        for row in rows {
            dir.insert(Task {
                name: row.name.clone(),
                id: row.id.clone(),
                state: TaskState::parse(&row.state),
                created_on: row.created_on.clone(),
                warehouse: row.warehouse.clone(),
                schedule: row.schedule.clone(),
                allow_overlap: row.allow_overlap,
                predecessors: parse_predecessors(&row.predecessors),
            });
        }
        dir
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.name.clone(), task);
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Names of all root tasks, in directory order.
    pub fn roots(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.is_root())
            .map(|t| t.name.clone())
            .collect()
    }

    /// Whether `root` is a transitive ancestor of the named task (a task is
    /// its own ancestor for this purpose).
    pub fn has_root_task(&self, name: &str, root: &str) -> Result<bool, GraphError> {
        let task = self
            .get(name)
            .ok_or_else(|| GraphError::UnknownPredecessor {
                name: name.to_string(),
                dependent: name.to_string(),
            })?;
        let mut done = BTreeSet::new();
        let mut path = Vec::new();
        self.walk(task, root, &mut done, &mut path)
    }

    // Depth-first ancestor search. `path` holds the current recursion stack
    // so a revisited node on the stack is reported as a cycle instead of
    // exhausting the call stack; `done` memoizes fully-explored subtrees
    // (a diamond is not a cycle).
    fn walk(
        &self,
        task: &Task,
        root: &str,
        done: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> Result<bool, GraphError> {
        if task.name == root {
            return Ok(true);
        }
        if path.iter().any(|n| n == &task.name) {
            return Err(GraphError::Cycle(task.name.clone()));
        }
        if done.contains(&task.name) {
            return Ok(false);
        }
        path.push(task.name.clone());
        for pred in &task.predecessors {
            let parent = self
                .get(pred)
                .ok_or_else(|| GraphError::UnknownPredecessor {
                    name: pred.clone(),
                    dependent: task.name.clone(),
                })?;
            if self.walk(parent, root, done, path)? {
                path.pop();
                return Ok(true);
            }
        }
        path.pop();
        done.insert(task.name.clone());
        Ok(false)
    }

    /// The subset of the directory whose members have `root` as a transitive
    /// ancestor. Contains `root` itself and is closed under "is a dependent
    /// of a member".
    pub fn subgraph_rooted_at(&self, root: &str) -> Result<TaskDirectory, GraphError> {
        let mut sub = TaskDirectory::new();
        for task in self.tasks.values() {
            if self.has_root_task(&task.name, root)? {
                sub.insert(task.clone());
            }
        }
        Ok(sub)
    }
}
