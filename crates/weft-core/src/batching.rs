use std::cell::{Cell, RefCell};

use crate::error::Error;
use crate::runtime::RuntimeHandle;
use crate::transaction::{Transaction, TransactionWrapper};

/// Decides how update batches are opened and when they are flushed.
pub trait BatchingStrategy {
    fn is_batching_updates(&self) -> bool;

    /// Runs `work` inside a batch. Nested calls run `work` directly in the
    /// enclosing batch.
    fn batched_updates(
        &self,
        runtime: &RuntimeHandle,
        work: &mut dyn FnMut() -> Result<(), Error>,
    ) -> Result<(), Error>;
}

struct BatchState {
    batching: Cell<bool>,
    runtime: RefCell<Option<RuntimeHandle>>,
}

/// Flushes dirty instances when the outermost batch closes, then leaves
/// batching mode.
pub struct DefaultBatchingStrategy {
    transaction: Transaction<BatchState>,
}

impl DefaultBatchingStrategy {
    pub fn new() -> Self {
        Self {
            transaction: Transaction::new(
                BatchState {
                    batching: Cell::new(false),
                    runtime: RefCell::new(None),
                },
                vec![Box::new(FlushBatchedUpdates), Box::new(ResetBatchedUpdates)],
            ),
        }
    }
}

impl Default for DefaultBatchingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchingStrategy for DefaultBatchingStrategy {
    fn is_batching_updates(&self) -> bool {
        self.transaction.state().batching.get()
    }

    fn batched_updates(
        &self,
        runtime: &RuntimeHandle,
        work: &mut dyn FnMut() -> Result<(), Error>,
    ) -> Result<(), Error> {
        let state = self.transaction.state();
        if state.batching.replace(true) {
            return work();
        }
        *state.runtime.borrow_mut() = Some(runtime.clone());
        self.transaction.perform(|_| work())
    }
}

struct FlushBatchedUpdates;

impl TransactionWrapper<BatchState> for FlushBatchedUpdates {
    fn close(&self, state: &BatchState) -> Result<(), Error> {
        let runtime = state.runtime.borrow().clone();
        match runtime {
            Some(runtime) => runtime.flush_batched_updates(),
            None => Ok(()),
        }
    }
}

struct ResetBatchedUpdates;

impl TransactionWrapper<BatchState> for ResetBatchedUpdates {
    fn close(&self, state: &BatchState) -> Result<(), Error> {
        state.batching.set(false);
        Ok(())
    }
}
