//! Instances of user-defined units.
//!
//! A [`CompositeInstance`] owns one constructed unit, the props, state and
//! context it currently sees, the work queued against it and the single
//! child instance its last render produced. It drives the unit through
//! mount, update and unmount.
//!
//! Lifecycle hooks run with no `RefCell` borrow held except the unit's own,
//! so hooks may freely enqueue updates on any instance. Re-entering the same
//! unit while one of its hooks runs is reported as
//! [`Invariant::ComponentBusy`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::component::{Component, ComponentType, CompositeKind, Cx, Hooks, View};
use crate::descriptor::{same_type_and_key, Descriptor};
use crate::error::{Error, HookName, Invariant};
use crate::host::{HostError, NodeId};
use crate::reconciler::{self, HostContext, Instance, Reconcilable};
use crate::runtime::RuntimeHandle;
use crate::transaction::{Checkpoint, ReconcileTransaction};
use crate::update_queue::{merge_state, ComponentHandle, PendingWork, UpdateCallback};
use crate::value::{shallow_equal, Context, Props, Record};

pub struct CompositeInstance {
    this: Weak<CompositeInstance>,
    runtime: RuntimeHandle,
    ty: ComponentType,
    unit: RefCell<Option<Box<dyn Component>>>,
    hooks: Cell<Hooks>,
    handle: RefCell<Option<ComponentHandle>>,
    descriptor: RefCell<Descriptor>,
    unmasked_context: RefCell<Context>,
    view: RefCell<View>,
    pending: RefCell<PendingWork>,
    prerendered: RefCell<Option<Option<Descriptor>>>,
    rendered: RefCell<Option<Instance>>,
    host_parent: Cell<Option<NodeId>>,
    host_context: Cell<Option<HostContext>>,
    mount_order: Cell<Option<u64>>,
    update_batch: Cell<Option<u64>>,
    called_will_unmount: Cell<bool>,
}

enum BoundaryStep {
    FirstAttempt { checkpoint: usize },
    Recover(Error),
    SecondAttempt,
}

impl CompositeInstance {
    pub(crate) fn new(runtime: RuntimeHandle, descriptor: Descriptor, ty: ComponentType) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            runtime,
            ty,
            unit: RefCell::new(None),
            hooks: Cell::new(Hooks::empty()),
            handle: RefCell::new(None),
            descriptor: RefCell::new(descriptor),
            unmasked_context: RefCell::new(Context::new()),
            view: RefCell::new(View::default()),
            pending: RefCell::new(PendingWork::default()),
            prerendered: RefCell::new(None),
            rendered: RefCell::new(None),
            host_parent: Cell::new(None),
            host_context: Cell::new(None),
            mount_order: Cell::new(None),
            update_batch: Cell::new(None),
            called_will_unmount: Cell::new(false),
        })
    }

    pub fn name(&self) -> &'static str {
        self.ty.name()
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.ty
    }

    pub fn kind(&self) -> CompositeKind {
        self.ty.kind()
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor.borrow().clone()
    }

    pub fn unmasked_context(&self) -> Context {
        self.unmasked_context.borrow().clone()
    }

    /// Props, state and masked context as of the last commit.
    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.handle.borrow().is_some()
    }

    /// Position in mount order; parents precede their descendants.
    pub fn mount_order(&self) -> u64 {
        self.mount_order.get().unwrap_or(u64::MAX)
    }

    pub(crate) fn update_batch(&self) -> Option<u64> {
        self.update_batch.get()
    }

    pub(crate) fn set_update_batch(&self, batch: Option<u64>) {
        self.update_batch.set(batch);
    }

    pub fn rendered(&self) -> Option<Instance> {
        self.rendered.borrow().clone()
    }

    pub fn public_instance(&self) -> Option<ComponentHandle> {
        if self.ty.kind() == CompositeKind::Functional {
            return None;
        }
        self.handle.borrow().clone()
    }

    pub(crate) fn record_pending(&self, record: impl FnOnce(&mut PendingWork)) {
        record(&mut self.pending.borrow_mut());
    }

    /// Queues a new descriptor for the next flush.
    pub(crate) fn receive_later(&self, descriptor: Descriptor) {
        self.pending.borrow_mut().descriptor = Some(descriptor);
    }

    pub(crate) fn take_pending_callbacks(&self) -> Vec<UpdateCallback> {
        std::mem::take(&mut self.pending.borrow_mut().callbacks)
    }

    fn rc(&self) -> Result<Rc<CompositeInstance>, Error> {
        self.this.upgrade().ok_or(Error::Invariant(Invariant::Unmounted {
            component: self.name(),
        }))
    }

    fn handle(&self) -> Result<ComponentHandle, Error> {
        self.handle
            .borrow()
            .clone()
            .ok_or(Error::Invariant(Invariant::Unmounted {
                component: self.name(),
            }))
    }

    /// Runs `f` against the unit with a snapshot of the current view.
    fn with_unit<R>(
        &self,
        hook: HookName,
        f: impl FnOnce(&mut dyn Component, &Cx<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let name = self.name();
        let view = self.view();
        let handle = self.handle()?;
        let mut slot = self
            .unit
            .try_borrow_mut()
            .map_err(|_| Error::Invariant(Invariant::ComponentBusy { component: name }))?;
        let unit = slot
            .as_mut()
            .ok_or(Error::Invariant(Invariant::Unmounted { component: name }))?;
        log::trace!("{name}.{hook}");
        f(unit.as_mut(), &Cx::new(&view, &handle)).map_err(|err| err.in_hook(name, hook))
    }

    fn render(&self) -> Result<Option<Descriptor>, Error> {
        self.with_unit(HookName::Render, |unit, cx| unit.render(cx))
    }

    /// Folds the queued state updates against `props` and `context` without
    /// committing the result.
    fn process_pending_state(&self, props: &Props, context: &Context) -> Option<Record> {
        let (queue, replace) = self.pending.borrow_mut().take_state();
        let existing = self.view.borrow().state.clone();
        merge_state(existing.as_ref(), &queue, replace, props, context)
    }

    /// Commits queued state immediately, used by hooks that run before the
    /// first render.
    fn merge_pending_state_now(&self) {
        let View { props, context, .. } = self.view();
        let next = self.process_pending_state(&props, &context);
        self.view.borrow_mut().state = next;
    }

    fn child_context(&self, context: &Context) -> Result<Context, Error> {
        if !self.hooks.get().contains(Hooks::CHILD_CONTEXT) {
            return Ok(context.clone());
        }
        let Some(child_context) =
            self.with_unit(HookName::ChildContext, |unit, cx| unit.child_context(cx))?
        else {
            return Ok(context.clone());
        };
        let declared = self.ty.child_context_keys();
        if declared.is_empty() {
            return Err(Invariant::ChildContextWithoutKeys {
                component: self.name(),
            }
            .into());
        }
        if let Some((key, _)) = child_context.iter().find(|(key, _)| !declared.contains(key)) {
            return Err(Invariant::UndeclaredChildContext {
                component: self.name(),
                key: key.to_string(),
            }
            .into());
        }
        Ok(context.merged(&child_context))
    }

    fn perform_initial_mount(
        &self,
        tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let prerendered = self.prerendered.borrow_mut().take();
        let rendered = match prerendered {
            Some(rendered) => rendered,
            None => self.render()?,
        };
        let child = Instance::instantiate(&self.runtime, rendered.as_ref());
        *self.rendered.borrow_mut() = Some(child.clone());
        let child_context = self.child_context(context)?;
        let host_context = self.host_context()?;
        reconciler::mount(&child, tx, self.host_parent.get(), host_context, &child_context)
    }

    fn host_context(&self) -> Result<HostContext, Error> {
        self.host_context
            .get()
            .ok_or(Error::Invariant(Invariant::Unmounted {
                component: self.name(),
            }))
    }

    /// Mounts with one recovery attempt: the unit's `on_error` hook sees the
    /// failure, the partial subtree is discarded along with every hook it
    /// queued, and the subtree renders once more. A second failure
    /// propagates.
    fn mount_with_error_handling(
        &self,
        tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let mut step = BoundaryStep::FirstAttempt {
            checkpoint: tx.checkpoint(),
        };
        loop {
            step = match step {
                BoundaryStep::FirstAttempt { checkpoint } => {
                    match self.perform_initial_mount(tx, context) {
                        Ok(node) => return Ok(node),
                        Err(err) if err.is_invariant() => return Err(err),
                        Err(err) => {
                            tx.rollback(checkpoint);
                            BoundaryStep::Recover(err)
                        }
                    }
                }
                BoundaryStep::Recover(err) => {
                    log::debug!("{}: recovering from mount failure: {err}", self.name());
                    self.with_unit(HookName::OnError, |unit, cx| unit.on_error(cx, &err))?;
                    self.merge_pending_state_now();
                    let checkpoint = tx.checkpoint();
                    self.discard_partial_child()?;
                    tx.rollback(checkpoint);
                    BoundaryStep::SecondAttempt
                }
                BoundaryStep::SecondAttempt => return self.perform_initial_mount(tx, context),
            };
        }
    }

    fn discard_partial_child(&self) -> Result<(), Error> {
        let partial = self.rendered.borrow_mut().take();
        let Some(partial) = partial else {
            return Ok(());
        };
        // None of these nodes reached the boundary's parent. Nodes inside an
        // already released subtree report `Missing`.
        let mut orphans = Vec::new();
        partial.collect_host_nodes(&mut orphans);
        reconciler::unmount(&partial, true)?;
        for orphan in orphans {
            match self.runtime.with_host(|host| host.remove_node(orphan)) {
                Ok(()) | Err(Error::Host(HostError::Missing { .. })) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Applies whatever is pending: a new descriptor, queued state or a
    /// forced update. Always clears the batch stamp.
    pub fn reconcile_if_necessary(&self, tx: &ReconcileTransaction) -> Result<(), Error> {
        self.update_batch.set(None);
        if !self.is_mounted() {
            return Ok(());
        }
        let pending_descriptor = self.pending.borrow_mut().descriptor.take();
        if let Some(next) = pending_descriptor {
            let context = self.unmasked_context();
            let instance = Instance::Composite(self.rc()?);
            return reconciler::receive(&instance, Some(&next), tx, &context);
        }
        if self.pending.borrow().has_state_work() {
            let current = self.descriptor();
            let context = self.unmasked_context();
            return self.update(tx, &current, &current, &context);
        }
        Ok(())
    }

    fn update(
        &self,
        tx: &ReconcileTransaction,
        prev_descriptor: &Descriptor,
        next_descriptor: &Descriptor,
        next_unmasked: &Context,
    ) -> Result<(), Error> {
        let hooks = self.hooks.get();
        let current = self.view();
        let mut will_receive = false;

        let next_context = if self.unmasked_context.borrow().ptr_eq(next_unmasked) {
            current.context.clone()
        } else {
            will_receive = true;
            self.ty.mask_context(next_unmasked)
        };
        if !prev_descriptor.ptr_eq(next_descriptor) {
            will_receive = true;
        }
        let next_props = next_descriptor.props().clone();

        if will_receive && hooks.contains(Hooks::RECEIVE_PROPS) {
            self.with_unit(HookName::ReceiveProps, |unit, cx| {
                unit.receive_props(cx, &next_props, &next_context)
            })?;
        }

        let next = View {
            state: self.process_pending_state(&next_props, &next_context),
            props: next_props,
            context: next_context,
        };

        let should_update = if self.pending.borrow().force {
            true
        } else if hooks.contains(Hooks::SHOULD_UPDATE) {
            self.with_unit(HookName::ShouldUpdate, |unit, cx| unit.should_update(cx, &next))?
        } else if self.ty.kind() == CompositeKind::Pure {
            !current.props.shallow_equal(&next.props)
                || !shallow_equal(current.state.as_ref(), next.state.as_ref())
        } else {
            true
        };

        self.update_batch.set(None);
        if should_update {
            self.pending.borrow_mut().force = false;
            self.perform_update(tx, next_descriptor, next, next_unmasked)
        } else {
            log::trace!("{}: update skipped", self.name());
            self.commit(next_descriptor, next, next_unmasked);
            Ok(())
        }
    }

    fn commit(&self, descriptor: &Descriptor, view: View, unmasked: &Context) {
        *self.descriptor.borrow_mut() = descriptor.clone();
        *self.unmasked_context.borrow_mut() = unmasked.clone();
        *self.view.borrow_mut() = view;
    }

    fn perform_update(
        &self,
        tx: &ReconcileTransaction,
        next_descriptor: &Descriptor,
        next: View,
        next_unmasked: &Context,
    ) -> Result<(), Error> {
        let hooks = self.hooks.get();
        let prev = hooks
            .contains(Hooks::AFTER_UPDATE)
            .then(|| self.view());
        if hooks.contains(Hooks::BEFORE_UPDATE) {
            self.with_unit(HookName::BeforeUpdate, |unit, cx| unit.before_update(cx, &next))?;
        }
        self.commit(next_descriptor, next, next_unmasked);
        self.update_rendered_child(tx, next_unmasked)?;
        if let Some(prev) = prev {
            tx.mount_ready().enqueue(
                move |instance: &Instance, _: &()| match instance.as_composite() {
                    Some(composite) if composite.is_mounted() => composite.with_unit(
                        HookName::AfterUpdate,
                        |unit, cx| unit.after_update(cx, &prev),
                    ),
                    _ => Ok(()),
                },
                Instance::Composite(self.rc()?),
            );
        }
        Ok(())
    }

    fn update_rendered_child(&self, tx: &ReconcileTransaction, context: &Context) -> Result<(), Error> {
        let prev_child = self.rendered();
        let prev_rendered = prev_child.as_ref().and_then(Instance::descriptor);
        let next_rendered = self.render()?;
        let child_context = self.child_context(context)?;

        if let Some(prev_child) = &prev_child {
            if same_type_and_key(prev_rendered.as_ref(), next_rendered.as_ref()) {
                return reconciler::receive(prev_child, next_rendered.as_ref(), tx, &child_context);
            }
        }

        let old_node = prev_child.as_ref().and_then(Instance::host_node);
        if let Some(prev_child) = &prev_child {
            reconciler::unmount(prev_child, false)?;
        }
        let child = Instance::instantiate(&self.runtime, next_rendered.as_ref());
        *self.rendered.borrow_mut() = Some(child.clone());
        let node = reconciler::mount(
            &child,
            tx,
            self.host_parent.get(),
            self.host_context()?,
            &child_context,
        )?;
        if let Some(old_node) = old_node {
            self.runtime.with_host(|host| host.replace_node(old_node, node))?;
        }
        Ok(())
    }

    fn invoke_after_mount(&self) -> Result<(), Error> {
        if !self.is_mounted() {
            return Ok(());
        }
        self.with_unit(HookName::AfterMount, |unit, cx| unit.after_mount(cx))
    }
}

impl Reconcilable for CompositeInstance {
    fn mount(
        &self,
        tx: &ReconcileTransaction,
        host_parent: Option<NodeId>,
        host_context: HostContext,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let name = self.name();
        self.mount_order.set(Some(self.runtime.next_mount_order()?));
        self.host_parent.set(host_parent);
        self.host_context.set(Some(host_context));
        *self.unmasked_context.borrow_mut() = context.clone();

        let props = self.descriptor().props().clone();
        let masked = self.ty.mask_context(context);
        let constructed = self.ty.construct(&props, &masked)?;
        let hooks = constructed.unit.hooks();
        let state = constructed.unit.initial_state(&props, &masked);
        self.hooks.set(hooks);
        *self.unit.borrow_mut() = Some(constructed.unit);
        *self.prerendered.borrow_mut() = constructed.rendered;
        *self.view.borrow_mut() = View {
            props,
            state,
            context: masked,
        };
        *self.pending.borrow_mut() = PendingWork::default();
        self.called_will_unmount.set(false);

        let this = self.rc()?;
        let handle = self.runtime.register_instance(&this, name)?;
        *self.handle.borrow_mut() = Some(handle);
        log::trace!("mounting {name} (order {})", self.mount_order());

        if hooks.contains(Hooks::BEFORE_MOUNT) {
            self.with_unit(HookName::BeforeMount, |unit, cx| unit.before_mount(cx))?;
            self.merge_pending_state_now();
        }

        let node = if hooks.contains(Hooks::ON_ERROR) {
            self.mount_with_error_handling(tx, context)?
        } else {
            self.perform_initial_mount(tx, context)?
        };

        if hooks.contains(Hooks::AFTER_MOUNT) {
            tx.mount_ready().enqueue(
                |instance: &Instance, _: &()| match instance.as_composite() {
                    Some(composite) => composite.invoke_after_mount(),
                    None => Ok(()),
                },
                Instance::Composite(this),
            );
        }
        Ok(node)
    }

    fn receive(
        &self,
        next: Option<&Descriptor>,
        tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<(), Error> {
        let Some(next) = next else {
            return Ok(());
        };
        let prev = self.descriptor();
        self.pending.borrow_mut().descriptor = None;
        self.update(tx, &prev, next, context)
    }

    fn unmount(&self, safely: bool) -> Result<(), Error> {
        let name = self.name();
        if self.rendered.borrow().is_some()
            && self.hooks.get().contains(Hooks::WILL_UNMOUNT)
            && !self.called_will_unmount.replace(true)
        {
            let result = self.with_unit(HookName::WillUnmount, |unit, cx| unit.will_unmount(cx));
            if let Err(err) = result {
                if !safely {
                    return Err(err);
                }
                log::error!("{name}: error while unmounting: {err}");
                self.runtime.defer_error(err);
            }
        }

        let child = self.rendered.borrow_mut().take();
        if let Some(child) = child {
            reconciler::unmount(&child, safely)?;
        }

        *self.pending.borrow_mut() = PendingWork::default();
        *self.prerendered.borrow_mut() = None;
        *self.unmasked_context.borrow_mut() = Context::new();
        self.update_batch.set(None);
        self.host_parent.set(None);
        self.host_context.set(None);
        let unit = self.unit.borrow_mut().take();
        drop(unit);
        let handle = self.handle.borrow_mut().take();
        if let Some(handle) = handle {
            self.runtime.release_instance(handle.id());
            log::trace!("unmounted {name} #{}", handle.id());
        }
        Ok(())
    }

    fn host_node(&self) -> Option<NodeId> {
        self.rendered.borrow().as_ref().and_then(Instance::host_node)
    }
}

#[cfg(test)]
#[path = "tests/composite_tests.rs"]
mod tests;
