//! Scoped transactions.
//!
//! A [`Transaction`] brackets a unit of work with an ordered list of
//! wrappers. Every wrapper that initialized successfully gets its `close`
//! called, whether the work succeeded or not, and closes run in the same
//! order as initializes.

use std::cell::Cell;

use crate::callback_queue::CallbackQueue;
use crate::error::{Error, Invariant};
use crate::reconciler::Instance;
use crate::runtime::RuntimeHandle;

pub trait TransactionWrapper<S> {
    fn initialize(&self, _state: &S) -> Result<(), Error> {
        Ok(())
    }

    fn close(&self, _state: &S) -> Result<(), Error> {
        Ok(())
    }
}

/// Transaction state that supports partial rollback of deferred work.
pub trait Checkpoint {
    fn checkpoint(&self) -> usize;
    fn rollback(&self, checkpoint: usize);
}

pub struct Transaction<S> {
    state: S,
    wrappers: Vec<Box<dyn TransactionWrapper<S>>>,
    in_progress: Cell<bool>,
}

impl<S> Transaction<S> {
    pub fn new(state: S, wrappers: Vec<Box<dyn TransactionWrapper<S>>>) -> Self {
        Self {
            state,
            wrappers,
            in_progress: Cell::new(false),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_progress.get()
    }

    pub fn perform<R>(&self, work: impl FnOnce(&S) -> Result<R, Error>) -> Result<R, Error> {
        if self.in_progress.replace(true) {
            return Err(Invariant::TransactionInProgress.into());
        }
        let mut initialized = 0;
        let mut result = Ok(());
        for wrapper in &self.wrappers {
            if let Err(err) = wrapper.initialize(&self.state) {
                result = Err(err);
                break;
            }
            initialized += 1;
        }
        let result = result.and_then(|()| work(&self.state));
        let result = self.close_all(initialized, result);
        self.in_progress.set(false);
        result
    }

    fn close_all<R>(&self, initialized: usize, mut result: Result<R, Error>) -> Result<R, Error> {
        for wrapper in &self.wrappers[..initialized] {
            if let Err(err) = wrapper.close(&self.state) {
                if result.is_ok() {
                    result = Err(err);
                } else {
                    log::warn!("transaction close failed while unwinding: {err}");
                }
            }
        }
        result
    }
}

impl<S: Checkpoint> Transaction<S> {
    pub fn checkpoint(&self) -> usize {
        self.state.checkpoint()
    }

    pub fn rollback(&self, checkpoint: usize) {
        self.state.rollback(checkpoint)
    }
}

/// State of one reconcile pass: the mount-ready queue that collects
/// after-mount hooks, after-update hooks and ref attachments until the pass
/// commits.
pub struct ReconcileTransaction {
    runtime: RuntimeHandle,
    mount_ready: CallbackQueue<Instance>,
}

impl ReconcileTransaction {
    /// A reconcile pass bracketed by the host commit and the mount-ready
    /// drain. The host commit closes first, so hooks observe committed nodes.
    pub fn transaction(runtime: RuntimeHandle) -> Transaction<ReconcileTransaction> {
        Transaction::new(
            ReconcileTransaction {
                runtime,
                mount_ready: CallbackQueue::new(),
            },
            vec![Box::new(HostCommit), Box::new(MountReadyQueueing)],
        )
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn mount_ready(&self) -> &CallbackQueue<Instance> {
        &self.mount_ready
    }
}

impl Checkpoint for ReconcileTransaction {
    fn checkpoint(&self) -> usize {
        self.mount_ready.checkpoint()
    }

    fn rollback(&self, checkpoint: usize) {
        self.mount_ready.rollback(checkpoint)
    }
}

struct HostCommit;

impl TransactionWrapper<ReconcileTransaction> for HostCommit {
    fn initialize(&self, state: &ReconcileTransaction) -> Result<(), Error> {
        state.runtime.with_host(|host| {
            host.begin_commit();
            Ok(())
        })
    }

    fn close(&self, state: &ReconcileTransaction) -> Result<(), Error> {
        state.runtime.with_host(|host| {
            host.end_commit();
            Ok(())
        })
    }
}

struct MountReadyQueueing;

impl TransactionWrapper<ReconcileTransaction> for MountReadyQueueing {
    fn initialize(&self, state: &ReconcileTransaction) -> Result<(), Error> {
        state.mount_ready.reset();
        Ok(())
    }

    fn close(&self, state: &ReconcileTransaction) -> Result<(), Error> {
        state.mount_ready.notify_all()
    }
}

#[cfg(test)]
#[path = "tests/transaction_tests.rs"]
mod tests;
