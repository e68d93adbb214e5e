//! Dirty-instance scheduling.
//!
//! Instances that received new state or a new descriptor are collected in a
//! dirty list. A flush reconciles them in mount order, so a parent always
//! re-renders before its children and a child re-rendered by its parent is
//! skipped when its own entry comes up. Updates enqueued during a pass are
//! handled by further passes until nothing is left.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::callback_queue::CallbackQueue;
use crate::composite::CompositeInstance;
use crate::error::Error;
use crate::reconciler;
use crate::runtime::RuntimeHandle;
use crate::transaction::{ReconcileTransaction, Transaction, TransactionWrapper};
use crate::update_queue::ComponentHandle;

pub(crate) struct Scheduler {
    dirty: RefCell<Vec<Rc<CompositeInstance>>>,
    /// Number of flush passes started so far.
    update_batch: Cell<u64>,
    asap: RefCell<CallbackQueue<()>>,
    asap_pending: Cell<bool>,
    flushing: Cell<bool>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            dirty: RefCell::new(Vec::new()),
            update_batch: Cell::new(0),
            asap: RefCell::new(CallbackQueue::new()),
            asap_pending: Cell::new(false),
            flushing: Cell::new(false),
        }
    }

    pub(crate) fn dirty_len(&self) -> usize {
        self.dirty.borrow().len()
    }

    /// Appends `instance` and stamps it with the pass that will reconcile it.
    /// An instance already stamped keeps its stamp.
    pub(crate) fn push_dirty(&self, instance: &Rc<CompositeInstance>) {
        self.dirty.borrow_mut().push(Rc::clone(instance));
        if instance.update_batch().is_none() {
            instance.set_update_batch(Some(self.update_batch.get() + 1));
        }
    }

    pub(crate) fn asap(&self, callback: impl FnOnce() -> Result<(), Error> + 'static) {
        self.asap
            .borrow()
            .enqueue(move |_: &(), _: &()| callback(), ());
        self.asap_pending.set(true);
    }

    pub(crate) fn flush(&self, runtime: &RuntimeHandle) -> Result<(), Error> {
        if self.flushing.replace(true) {
            log::trace!("flush requested while flushing; the running flush picks it up");
            return Ok(());
        }
        let result = self.flush_all(runtime);
        self.flushing.set(false);
        result
    }

    fn flush_all(&self, runtime: &RuntimeHandle) -> Result<(), Error> {
        loop {
            if self.dirty_len() > 0 {
                let transaction = flush_transaction(runtime.clone());
                transaction.perform(|flush| {
                    flush
                        .reconcile
                        .perform(|reconcile| self.run_pass(flush, reconcile))
                })?;
            }
            if self.asap_pending.replace(false) {
                let queue = self.asap.replace(CallbackQueue::new());
                log::debug!("running {} asap callbacks", queue.len());
                queue.notify_all()?;
            }
            if self.dirty_len() == 0 && !self.asap_pending.get() {
                return Ok(());
            }
        }
    }

    fn run_pass(&self, flush: &FlushState, reconcile: &ReconcileTransaction) -> Result<(), Error> {
        let window = flush.window.get();
        let snapshot: Vec<Rc<CompositeInstance>> = {
            let mut dirty = self.dirty.borrow_mut();
            dirty.sort_by_key(|instance| instance.mount_order());
            dirty[..window].to_vec()
        };
        let batch = self.update_batch.get() + 1;
        self.update_batch.set(batch);
        log::debug!("flush pass {batch}: {window} dirty instances");

        for instance in snapshot {
            flush.processed.set(flush.processed.get() + 1);
            let callbacks = instance.take_pending_callbacks();
            reconciler::perform_update_if_necessary(&instance, reconcile, batch)?;
            if callbacks.is_empty() {
                continue;
            }
            if let Some(handle) = instance.public_instance() {
                for callback in callbacks {
                    flush
                        .callbacks
                        .enqueue(move |handle, _| callback(handle), handle.clone());
                }
            }
        }
        Ok(())
    }

    /// Called when a pass closes. Entries the pass reconciled are dropped;
    /// entries appended during the pass stay for the next one. When the pass
    /// aborted, the entries it never reached are restamped so the next pass
    /// still reconciles them.
    fn close_pass(&self, window: usize, processed: usize) {
        let mut dirty = self.dirty.borrow_mut();
        if processed < window {
            dirty.drain(..processed);
            let next = self.update_batch.get() + 1;
            for instance in dirty.iter().take(window - processed) {
                instance.set_update_batch(Some(next));
            }
        } else if dirty.len() > window {
            dirty.drain(..window);
        } else {
            dirty.clear();
        }
    }
}

struct FlushState {
    runtime: RuntimeHandle,
    window: Cell<usize>,
    processed: Cell<usize>,
    callbacks: CallbackQueue<ComponentHandle>,
    reconcile: Transaction<ReconcileTransaction>,
}

fn flush_transaction(runtime: RuntimeHandle) -> Transaction<FlushState> {
    Transaction::new(
        FlushState {
            reconcile: ReconcileTransaction::transaction(runtime.clone()),
            runtime,
            window: Cell::new(0),
            processed: Cell::new(0),
            callbacks: CallbackQueue::new(),
        },
        vec![Box::new(NestedUpdates), Box::new(UpdateQueueing)],
    )
}

struct NestedUpdates;

impl TransactionWrapper<FlushState> for NestedUpdates {
    fn initialize(&self, state: &FlushState) -> Result<(), Error> {
        let inner = state.runtime.inner()?;
        state.window.set(inner.scheduler.dirty_len());
        state.processed.set(0);
        Ok(())
    }

    fn close(&self, state: &FlushState) -> Result<(), Error> {
        let inner = state.runtime.inner()?;
        inner
            .scheduler
            .close_pass(state.window.get(), state.processed.get());
        Ok(())
    }
}

struct UpdateQueueing;

impl TransactionWrapper<FlushState> for UpdateQueueing {
    fn initialize(&self, state: &FlushState) -> Result<(), Error> {
        state.callbacks.reset();
        Ok(())
    }

    fn close(&self, state: &FlushState) -> Result<(), Error> {
        state.callbacks.notify_all()
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
