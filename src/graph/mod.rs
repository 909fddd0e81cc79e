//! Execution-graph contract
//!
//! [`ExecutionGraph`] wraps a compiled [`RecordTable`] after checking the
//! structural invariants a runtime depends on, and exposes the traversal
//! helpers used to drain it:
//!
//! - dispatch starts at [`ExecutionGraph::root`];
//! - once a record's own work completes, every one of its
//!   [`child_branches`](ExecutionGraph::child_branches) is started;
//! - a record is subtree-complete when all of those branches are;
//! - only then is its [`next`](ExecutionGraph::next) record started.
//!
//! Structural records (`batch`, `batch_child`, `superworker`) do no work of
//! their own and move straight on to their branches.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::types::{Record, RecordTable, BATCH_CHILD};

pub mod runner;
pub mod store;


pub use runner::{
    DispatchError, DispatchFuture, Dispatcher, RunReport, Runner, RunnerOptions,
    SimulatedDispatcher,
};
pub use store::{CompletionStore, MemoryCompletionStore};

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph is empty")]
    EmptyGraph,

    #[error("Record ids must run 1..N without gaps: expected {expected}, found {found}")]
    NonContiguousIds { expected: u32, found: u32 },

    #[error("Graph must have exactly one root, found {found}")]
    RootCount { found: usize },

    #[error("Record {id} refers to missing record {target}")]
    DanglingReference { id: u32, target: u32 },

    #[error("Record {id} has {keys} argument keys but {values} values")]
    ArgLengthMismatch { id: u32, keys: usize, values: usize },

    #[error("Record {id} was numbered before its parent {parent}")]
    NotPreOrder { id: u32, parent: u32 },

    #[error("Record {id} lists an empty children_ids")]
    EmptyChildren { id: u32 },

    #[error("Record {id} lists child {child}, whose parent is {parent:?}")]
    ForeignChild {
        id: u32,
        child: u32,
        parent: Option<u32>,
    },

    #[error("Record {id} continues to {next}, which has a different parent")]
    CrossParentLink { id: u32, next: u32 },

    #[error("Record {id} is reached by more than one next_id or sits in a cycle")]
    BrokenChain { id: u32 },
}

/// A validated, read-only record table
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    table: RecordTable,
    root: u32,
    /// Content entry of each batch_child that has one
    entries: HashMap<u32, u32>,
}

impl ExecutionGraph {
    pub fn new(table: RecordTable) -> GraphResult<Self> {
        let root = validate(&table)?;

        let mut entries = HashMap::new();
        for record in table.iter() {
            if let Some(parent) = record.parent_id {
                let is_batch_child = table
                    .get(parent)
                    .is_some_and(|p| p.worker_class == BATCH_CHILD);
                if is_batch_child {
                    // Records come in id order, so the first one seen is the lowest
                    entries.entry(parent).or_insert(record.id);
                }
            }
        }

        Ok(Self {
            table,
            root,
            entries,
        })
    }

    pub fn root(&self) -> Option<&Record> {
        self.table.get(self.root)
    }

    pub fn root_id(&self) -> u32 {
        self.root
    }

    pub fn get(&self, id: u32) -> Option<&Record> {
        self.table.get(id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn into_table(self) -> RecordTable {
        self.table
    }

    /// Branches started once `id`'s own work completes: its `children_ids`,
    /// or for a batch_child, the entry of the body it replays.
    pub fn child_branches(&self, id: u32) -> Vec<u32> {
        match self.table.get(id) {
            Some(Record {
                children_ids: Some(children),
                ..
            }) => children.clone(),
            Some(_) => self.entries.get(&id).copied().into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn next(&self, id: u32) -> Option<u32> {
        self.table.get(id).and_then(|r| r.next_id)
    }

    pub fn parent(&self, id: u32) -> Option<u32> {
        self.table.get(id).and_then(|r| r.parent_id)
    }

    pub fn is_structural(&self, id: u32) -> bool {
        self.table.get(id).is_some_and(Record::is_structural)
    }

    /// `id` and every record transitively parented to it, in id order
    pub fn subtree(&self, id: u32) -> Vec<u32> {
        let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for record in self.table.iter() {
            if let Some(parent) = record.parent_id {
                children.entry(parent).or_default().push(record.id);
            }
        }

        let mut out = Vec::new();
        if self.table.get(id).is_none() {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(kids) = children.get(&current) {
                stack.extend(kids.iter().rev());
            }
        }
        out.sort_unstable();
        out
    }
}

/// Check the record-table invariants and return the root id
pub fn validate(table: &RecordTable) -> GraphResult<u32> {
    if table.is_empty() {
        return Err(GraphError::EmptyGraph);
    }

    for (expected, found) in (1u32..).zip(table.ids()) {
        if expected != found {
            return Err(GraphError::NonContiguousIds { expected, found });
        }
    }

    let roots: Vec<u32> = table
        .iter()
        .filter(|r| r.parent_id.is_none())
        .map(|r| r.id)
        .collect();
    if roots.len() != 1 {
        return Err(GraphError::RootCount { found: roots.len() });
    }

    let mut predecessors: HashMap<u32, u32> = HashMap::new();

    for record in table.iter() {
        let id = record.id;

        if record.arg_keys.len() != record.arg_values.len() {
            return Err(GraphError::ArgLengthMismatch {
                id,
                keys: record.arg_keys.len(),
                values: record.arg_values.len(),
            });
        }

        if let Some(parent) = record.parent_id {
            if table.get(parent).is_none() {
                return Err(GraphError::DanglingReference { id, target: parent });
            }
            if parent >= id {
                return Err(GraphError::NotPreOrder { id, parent });
            }
        }

        if let Some(children) = &record.children_ids {
            if children.is_empty() {
                return Err(GraphError::EmptyChildren { id });
            }
            for &child in children {
                let target = table
                    .get(child)
                    .ok_or(GraphError::DanglingReference { id, target: child })?;
                if target.parent_id != Some(id) {
                    return Err(GraphError::ForeignChild {
                        id,
                        child,
                        parent: target.parent_id,
                    });
                }
            }
        }

        if let Some(next) = record.next_id {
            let target = table
                .get(next)
                .ok_or(GraphError::DanglingReference { id, target: next })?;
            if target.parent_id != record.parent_id {
                return Err(GraphError::CrossParentLink { id, next });
            }
            if predecessors.insert(next, id).is_some() {
                return Err(GraphError::BrokenChain { id: next });
            }
        }
    }

    // Walk every chain from its head; a linked record never reached sits on a cycle
    let mut reached = HashSet::new();
    for record in table.iter() {
        if record.next_id.is_none() || predecessors.contains_key(&record.id) {
            continue;
        }
        let mut current = Some(record.id);
        while let Some(id) = current {
            reached.insert(id);
            current = table.get(id).and_then(|r| r.next_id);
        }
    }
    if let Some(&id) = predecessors.keys().find(|id| !reached.contains(*id)) {
        return Err(GraphError::BrokenChain { id });
    }

    Ok(roots[0])
}
