//! Outstanding-branch counters
//!
//! A runtime arms a record with the number of branches it starts and
//! decrements once per finished branch. Exactly one decrement observes the
//! crossing to zero, and only that caller may continue past the record.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

pub trait CompletionStore: Send + Sync {
    /// Set the number of outstanding branches for `id`
    fn arm(&self, id: u32, branches: usize);

    /// Record one finished branch of `id`. Returns `true` for exactly one
    /// caller: the one that brought the count to zero.
    fn complete_branch(&self, id: u32) -> bool;

    /// Branches of `id` still outstanding
    fn outstanding(&self, id: u32) -> usize;
}

/// Lock-free store for a graph whose ids are 1..=len
#[derive(Debug)]
pub struct MemoryCompletionStore {
    counters: Vec<AtomicUsize>,
}

impl MemoryCompletionStore {
    pub fn new(len: usize) -> Self {
        Self {
            counters: (0..len).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn counter(&self, id: u32) -> Option<&AtomicUsize> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.counters.get(index)
    }
}

impl CompletionStore for MemoryCompletionStore {
    fn arm(&self, id: u32, branches: usize) {
        match self.counter(id) {
            Some(counter) => counter.store(branches, Ordering::Release),
            None => warn!(id, "arming unknown record"),
        }
    }

    fn complete_branch(&self, id: u32) -> bool {
        let Some(counter) = self.counter(id) else {
            warn!(id, "completing branch of unknown record");
            return false;
        };

        match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
            Ok(previous) => previous == 1,
            Err(_) => {
                warn!(id, "branch completed more often than armed");
                false
            }
        }
    }

    fn outstanding(&self, id: u32) -> usize {
        self.counter(id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}
