//! Reference runner
//!
//! Drains an [`ExecutionGraph`] through a caller-supplied [`Dispatcher`],
//! following the traversal rules of the graph contract. It keeps no durable
//! state; a real runtime would keep the same bookkeeping in its queue's
//! backing store.
//!
//! Failure policy: a failed unit of work marks its record failed, its branches
//! and its `next_id` are never started, and the branch it belongs to closes as
//! failed. Sibling batch branches keep running. Nothing is retried.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::store::{CompletionStore, MemoryCompletionStore};
use super::ExecutionGraph;
use crate::types::{RunStatus, SubjobStatus};

pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Worker '{worker}' failed: {message}")]
    Failed { worker: String, message: String },

    #[error("Worker task panicked: {0}")]
    Panicked(String),
}

/// Hands one unit of work to whatever actually runs it
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, worker_class: &str, arg_values: &[JsonValue]) -> DispatchFuture;
}

/// Completes every unit of work immediately, failing the named workers
#[derive(Debug, Clone, Default)]
pub struct SimulatedDispatcher {
    failing: HashSet<String>,
}

impl SimulatedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(workers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            failing: workers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Dispatcher for SimulatedDispatcher {
    fn dispatch(&self, worker_class: &str, arg_values: &[JsonValue]) -> DispatchFuture {
        let worker = worker_class.to_string();
        let fail = self.failing.contains(worker_class);
        info!(worker = %worker, args = ?arg_values, "simulated dispatch");

        Box::pin(async move {
            if fail {
                Err(DispatchError::Failed {
                    worker,
                    message: "simulated failure".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Upper bound on units of work dispatched but not yet finished
    pub max_in_flight: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { max_in_flight: 64 }
    }
}

/// Outcome of one superjob
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub superjob_id: Uuid,
    pub status: RunStatus,
    /// Ids handed to the dispatcher, in dispatch order
    pub dispatched: Vec<u32>,
    pub statuses: BTreeMap<u32, SubjobStatus>,
}

impl RunReport {
    pub fn status_of(&self, id: u32) -> Option<SubjobStatus> {
        self.statuses.get(&id).copied()
    }
}

pub struct Runner {
    graph: Arc<ExecutionGraph>,
    dispatcher: Arc<dyn Dispatcher>,
    options: RunnerOptions,
}

impl Runner {
    pub fn new(graph: ExecutionGraph, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            graph: Arc::new(graph),
            dispatcher,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Run the whole graph with in-memory completion counters
    pub async fn run(&self) -> RunReport {
        let store = MemoryCompletionStore::new(self.graph.len());
        self.run_with_store(&store).await
    }

    pub async fn run_with_store(&self, store: &dyn CompletionStore) -> RunReport {
        let superjob_id = Uuid::new_v4();
        info!(%superjob_id, records = self.graph.len(), "starting superjob");

        let mut run = Run {
            graph: &self.graph,
            store,
            statuses: self
                .graph
                .table()
                .ids()
                .map(|id| (id, SubjobStatus::Initialized))
                .collect(),
            failed_branches: HashSet::new(),
            events: VecDeque::from([Event::Start(self.graph.root_id())]),
            queue: VecDeque::new(),
            dispatched: Vec::new(),
            finished: None,
        };

        let max_in_flight = self.options.max_in_flight.max(1);
        let mut in_flight: JoinSet<(u32, Result<(), DispatchError>)> = JoinSet::new();

        loop {
            run.drain_events();

            while in_flight.len() < max_in_flight {
                let Some(id) = run.queue.pop_front() else {
                    break;
                };
                let Some(record) = self.graph.get(id) else {
                    continue;
                };

                debug!(%superjob_id, id, worker = %record.worker_class, "dispatching");
                run.statuses.insert(id, SubjobStatus::Running);
                run.dispatched.push(id);

                let work = self
                    .dispatcher
                    .dispatch(&record.worker_class, &record.arg_values);
                in_flight.spawn(async move {
                    // The inner task turns a dispatcher panic into a failed record
                    let result = match tokio::spawn(work).await {
                        Ok(result) => result,
                        Err(e) => Err(DispatchError::Panicked(e.to_string())),
                    };
                    (id, result)
                });
            }

            match in_flight.join_next().await {
                Some(Ok((id, result))) => run.events.push_back(Event::WorkDone(id, result)),
                Some(Err(e)) => error!(%superjob_id, error = %e, "dispatch task aborted"),
                None => break,
            }
        }

        let status = match run.finished {
            Some(false) => RunStatus::Complete,
            Some(true) => RunStatus::Failed,
            None => {
                warn!(%superjob_id, "superjob stopped before its root completed");
                RunStatus::Failed
            }
        };
        info!(%superjob_id, ?status, dispatched = run.dispatched.len(), "superjob finished");

        RunReport {
            superjob_id,
            status,
            dispatched: run.dispatched,
            statuses: run.statuses,
        }
    }
}

/* ===================== Bookkeeping ===================== */

#[derive(Debug)]
enum Event {
    /// Begin a record: queue its work, or move on if it is structural
    Start(u32),
    /// The record's own unit of work finished
    WorkDone(u32, Result<(), DispatchError>),
    /// Every branch below the record is terminal
    SubtreeDone { id: u32, failed: bool },
    /// The chain running under `owner` ended (`None` for the root chain)
    BranchEnd { owner: Option<u32>, failed: bool },
}

struct Run<'a> {
    graph: &'a ExecutionGraph,
    store: &'a dyn CompletionStore,
    statuses: BTreeMap<u32, SubjobStatus>,
    failed_branches: HashSet<u32>,
    events: VecDeque<Event>,
    queue: VecDeque<u32>,
    dispatched: Vec<u32>,
    /// Set once the root chain ends; `true` when it failed
    finished: Option<bool>,
}

impl Run<'_> {
    fn drain_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            match event {
                Event::Start(id) => self.start(id),
                Event::WorkDone(id, result) => self.work_done(id, result),
                Event::SubtreeDone { id, failed } => self.subtree_done(id, failed),
                Event::BranchEnd { owner, failed } => self.branch_end(owner, failed),
            }
        }
    }

    fn start(&mut self, id: u32) {
        if self.graph.is_structural(id) {
            self.statuses.insert(id, SubjobStatus::Running);
            self.events.push_back(Event::WorkDone(id, Ok(())));
        } else {
            self.statuses.insert(id, SubjobStatus::Queued);
            self.queue.push_back(id);
        }
    }

    fn work_done(&mut self, id: u32, result: Result<(), DispatchError>) {
        if let Err(e) = result {
            warn!(id, error = %e, "subjob failed");
            self.statuses.insert(id, SubjobStatus::Failed);
            self.events.push_back(Event::BranchEnd {
                owner: self.graph.parent(id),
                failed: true,
            });
            return;
        }

        if !self.graph.is_structural(id) {
            self.statuses.insert(id, SubjobStatus::Complete);
        }

        let branches = self.graph.child_branches(id);
        if branches.is_empty() {
            self.events.push_back(Event::SubtreeDone { id, failed: false });
            return;
        }

        self.store.arm(id, branches.len());
        for branch in branches {
            self.events.push_back(Event::Start(branch));
        }
    }

    fn subtree_done(&mut self, id: u32, failed: bool) {
        if self.graph.is_structural(id) {
            let status = if failed {
                SubjobStatus::Failed
            } else {
                SubjobStatus::Complete
            };
            self.statuses.insert(id, status);
        }

        let owner = self.graph.parent(id);
        match self.graph.next(id) {
            Some(next) if !failed => self.events.push_back(Event::Start(next)),
            _ => self.events.push_back(Event::BranchEnd { owner, failed }),
        }
    }

    fn branch_end(&mut self, owner: Option<u32>, failed: bool) {
        let Some(owner) = owner else {
            self.finished = Some(failed);
            return;
        };

        if failed {
            self.failed_branches.insert(owner);
        }
        if self.store.complete_branch(owner) {
            let failed = self.failed_branches.contains(&owner);
            self.events.push_back(Event::SubtreeDone { id: owner, failed });
        }
    }
}
