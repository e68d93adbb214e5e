use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::batching::{BatchingStrategy, DefaultBatchingStrategy};
use crate::collections::map::HashMap;
use crate::composite::CompositeInstance;
use crate::error::{Error, Invariant};
use crate::host::{Host, HostError};
use crate::scheduler::Scheduler;
use crate::update_queue::{ComponentHandle, HandleId};

pub(crate) struct RuntimeInner {
    host: Rc<RefCell<dyn Host>>,
    batching: Box<dyn BatchingStrategy>,
    pub(crate) scheduler: Scheduler,
    instances: RefCell<HashMap<HandleId, Weak<CompositeInstance>>>,
    next_handle: Cell<HandleId>,
    next_mount_order: Cell<u64>,
    deferred_errors: RefCell<Vec<Error>>,
}

/// Owns the host, the batching strategy and the dirty-instance scheduler.
///
/// Everything else holds a [`RuntimeHandle`], which does not keep the
/// runtime alive.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(host: Rc<RefCell<dyn Host>>) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: Rc<RefCell<dyn Host>>) -> RuntimeBuilder {
        RuntimeBuilder {
            host,
            batching: None,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn host(&self) -> Rc<RefCell<dyn Host>> {
        Rc::clone(&self.inner.host)
    }

    pub fn is_batching_updates(&self) -> bool {
        self.inner.batching.is_batching_updates()
    }

    /// Number of instances waiting for the next flush.
    pub fn dirty_len(&self) -> usize {
        self.inner.scheduler.dirty_len()
    }

    /// Number of mounted stateful, pure or functional instances.
    pub fn mounted_instances(&self) -> usize {
        self.inner
            .instances
            .borrow()
            .values()
            .filter(|instance| instance.strong_count() > 0)
            .count()
    }
}

pub struct RuntimeBuilder {
    host: Rc<RefCell<dyn Host>>,
    batching: Option<Box<dyn BatchingStrategy>>,
}

impl RuntimeBuilder {
    /// Replaces the default transaction-based batching strategy.
    pub fn batching_strategy(mut self, strategy: Box<dyn BatchingStrategy>) -> Self {
        self.batching = Some(strategy);
        self
    }

    pub fn build(self) -> Runtime {
        let batching = self
            .batching
            .unwrap_or_else(|| Box::new(DefaultBatchingStrategy::new()));
        Runtime {
            inner: Rc::new(RuntimeInner {
                host: self.host,
                batching,
                scheduler: Scheduler::new(),
                instances: RefCell::new(HashMap::default()),
                next_handle: Cell::new(1),
                next_mount_order: Cell::new(1),
                deferred_errors: RefCell::new(Vec::new()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub(crate) fn inner(&self) -> Result<Rc<RuntimeInner>, Error> {
        self.0
            .upgrade()
            .ok_or(Error::Invariant(Invariant::RuntimeDropped))
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn is_batching_updates(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.batching.is_batching_updates())
            .unwrap_or(false)
    }

    /// Runs `work` inside a batch. Updates enqueued by `work` are flushed
    /// when the outermost batch closes.
    ///
    /// Errors raised by will-unmount hooks during safe unmounts do not abort
    /// the batch. The first of them is returned once the outermost batch has
    /// closed.
    pub fn batched_updates<R>(&self, work: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
        let inner = self.inner()?;
        let outermost = !inner.batching.is_batching_updates();
        let mut work = Some(work);
        let mut output = None;
        let result = inner.batching.batched_updates(self, &mut || {
            if let Some(work) = work.take() {
                output = Some(work()?);
            }
            Ok(())
        });
        let deferred = if outermost {
            self.take_deferred_error()
        } else {
            None
        };
        result?;
        if let Some(err) = deferred {
            return Err(err);
        }
        output.ok_or(Error::Invariant(Invariant::BatchNotRun))
    }

    /// Marks `instance` dirty. Outside a batch this opens one, which flushes
    /// before returning.
    pub fn enqueue_update(&self, instance: &Rc<CompositeInstance>) -> Result<(), Error> {
        let inner = self.inner()?;
        if !inner.batching.is_batching_updates() {
            return self.batched_updates(|| self.enqueue_update(instance));
        }
        inner.scheduler.push_dirty(instance);
        Ok(())
    }

    /// Schedules `callback` to run once the dirty instances of the current
    /// flush pass have been reconciled. Only valid inside a batch.
    pub fn asap(&self, callback: impl FnOnce() -> Result<(), Error> + 'static) -> Result<(), Error> {
        let inner = self.inner()?;
        if !inner.batching.is_batching_updates() {
            return Err(Invariant::AsapOutsideBatch.into());
        }
        inner.scheduler.asap(callback);
        Ok(())
    }

    pub fn flush_batched_updates(&self) -> Result<(), Error> {
        let inner = self.inner()?;
        inner.scheduler.flush(self)
    }

    pub(crate) fn with_host<R>(
        &self,
        f: impl FnOnce(&mut dyn Host) -> Result<R, HostError>,
    ) -> Result<R, Error> {
        let inner = self.inner()?;
        let mut host = inner
            .host
            .try_borrow_mut()
            .map_err(|_| Error::Invariant(Invariant::HostBusy))?;
        Ok(f(&mut *host)?)
    }

    pub(crate) fn next_mount_order(&self) -> Result<u64, Error> {
        let inner = self.inner()?;
        let order = inner.next_mount_order.get();
        inner.next_mount_order.set(order + 1);
        Ok(order)
    }

    pub(crate) fn register_instance(
        &self,
        instance: &Rc<CompositeInstance>,
        name: &'static str,
    ) -> Result<ComponentHandle, Error> {
        let inner = self.inner()?;
        let id = inner.next_handle.get();
        inner.next_handle.set(id + 1);
        inner
            .instances
            .borrow_mut()
            .insert(id, Rc::downgrade(instance));
        log::trace!("registered {name} as #{id}");
        Ok(ComponentHandle::new(id, name, self.clone()))
    }

    pub(crate) fn lookup_instance(&self, id: HandleId) -> Option<Rc<CompositeInstance>> {
        let inner = self.0.upgrade()?;
        let instances = inner.instances.borrow();
        instances.get(&id).and_then(Weak::upgrade)
    }

    pub(crate) fn release_instance(&self, id: HandleId) {
        if let Some(inner) = self.0.upgrade() {
            inner.instances.borrow_mut().remove(&id);
        }
    }

    pub(crate) fn defer_error(&self, err: Error) {
        if let Some(inner) = self.0.upgrade() {
            inner.deferred_errors.borrow_mut().push(err);
        }
    }

    /// First error recorded by a safe unmount since the last call. Later
    /// errors have already been logged and are discarded.
    pub(crate) fn take_deferred_error(&self) -> Option<Error> {
        let inner = self.0.upgrade()?;
        let mut errors = inner.deferred_errors.borrow_mut();
        if errors.is_empty() {
            return None;
        }
        let first = errors.remove(0);
        errors.clear();
        Some(first)
    }
}
