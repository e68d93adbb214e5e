//! Instances backed directly by host nodes.

use std::cell::{Cell, RefCell};

use crate::collections::map::HashMap;
use crate::descriptor::{same_type_and_key, Descriptor};
use crate::error::Error;
use crate::host::NodeId;
use crate::reconciler::{self, HostContext, Instance, Reconcilable};
use crate::runtime::RuntimeHandle;
use crate::transaction::ReconcileTransaction;
use crate::value::Context;

/// Placeholder for a position that rendered nothing.
pub struct EmptyInstance {
    runtime: RuntimeHandle,
    node: Cell<Option<NodeId>>,
    context: RefCell<Context>,
}

impl EmptyInstance {
    pub(crate) fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            node: Cell::new(None),
            context: RefCell::new(Context::new()),
        }
    }

    pub fn context(&self) -> Context {
        self.context.borrow().clone()
    }
}

impl Reconcilable for EmptyInstance {
    fn mount(
        &self,
        _tx: &ReconcileTransaction,
        _host_parent: Option<NodeId>,
        _host_context: HostContext,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let node = self.runtime.with_host(|host| host.create_empty())?;
        self.node.set(Some(node));
        *self.context.borrow_mut() = context.clone();
        Ok(node)
    }

    fn receive(
        &self,
        _next: Option<&Descriptor>,
        _tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<(), Error> {
        *self.context.borrow_mut() = context.clone();
        Ok(())
    }

    fn unmount(&self, _safely: bool) -> Result<(), Error> {
        self.node.set(None);
        Ok(())
    }

    fn host_node(&self) -> Option<NodeId> {
        self.node.get()
    }
}

pub struct TextInstance {
    runtime: RuntimeHandle,
    descriptor: RefCell<Descriptor>,
    node: Cell<Option<NodeId>>,
    context: RefCell<Context>,
}

impl TextInstance {
    pub(crate) fn new(runtime: RuntimeHandle, descriptor: Descriptor) -> Self {
        Self {
            runtime,
            descriptor: RefCell::new(descriptor),
            node: Cell::new(None),
            context: RefCell::new(Context::new()),
        }
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor.borrow().clone()
    }

    pub fn context(&self) -> Context {
        self.context.borrow().clone()
    }
}

impl Reconcilable for TextInstance {
    fn mount(
        &self,
        _tx: &ReconcileTransaction,
        _host_parent: Option<NodeId>,
        _host_context: HostContext,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let text = self.descriptor().text_content();
        let node = self.runtime.with_host(|host| host.create_text(&text))?;
        self.node.set(Some(node));
        *self.context.borrow_mut() = context.clone();
        Ok(node)
    }

    fn receive(
        &self,
        next: Option<&Descriptor>,
        _tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<(), Error> {
        *self.context.borrow_mut() = context.clone();
        let Some(next) = next else {
            return Ok(());
        };
        let text = next.text_content();
        let changed = self.descriptor().text_content() != text;
        *self.descriptor.borrow_mut() = next.clone();
        match self.node.get() {
            Some(node) if changed => self.runtime.with_host(|host| host.set_text(node, &text)),
            _ => Ok(()),
        }
    }

    fn unmount(&self, _safely: bool) -> Result<(), Error> {
        self.node.set(None);
        Ok(())
    }

    fn host_node(&self) -> Option<NodeId> {
        self.node.get()
    }
}

/// A platform element. Children are matched to the previous render by key,
/// or by position when unkeyed.
pub struct HostInstance {
    runtime: RuntimeHandle,
    descriptor: RefCell<Descriptor>,
    node: Cell<Option<NodeId>>,
    host_context: Cell<Option<HostContext>>,
    context: RefCell<Context>,
    children: RefCell<Vec<Instance>>,
}

impl HostInstance {
    pub(crate) fn new(runtime: RuntimeHandle, descriptor: Descriptor) -> Self {
        Self {
            runtime,
            descriptor: RefCell::new(descriptor),
            node: Cell::new(None),
            host_context: Cell::new(None),
            context: RefCell::new(Context::new()),
            children: RefCell::new(Vec::new()),
        }
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor.borrow().clone()
    }

    pub fn context(&self) -> Context {
        self.context.borrow().clone()
    }

    pub fn children(&self) -> Vec<Instance> {
        self.children.borrow().clone()
    }

    fn mount_child(
        &self,
        descriptor: &Descriptor,
        tx: &ReconcileTransaction,
        node: NodeId,
        host_context: HostContext,
        context: &Context,
    ) -> Result<Instance, Error> {
        let child = Instance::instantiate(&self.runtime, Some(descriptor));
        reconciler::mount(&child, tx, Some(node), host_context, context)?;
        Ok(child)
    }

    fn reconcile_children(
        &self,
        next: &Descriptor,
        tx: &ReconcileTransaction,
        node: NodeId,
        context: &Context,
    ) -> Result<(), Error> {
        let host_context = self.host_context.get().unwrap_or(HostContext { container: node });
        let prev_children = std::mem::take(&mut *self.children.borrow_mut());
        let mut removed = Vec::new();
        let mut prev_by_name: HashMap<String, Instance> = HashMap::default();
        for (index, child) in prev_children.into_iter().enumerate() {
            let name = child_name(child.descriptor().as_ref(), index);
            if let Some(duplicate) = prev_by_name.insert(name, child) {
                removed.push(duplicate);
            }
        }

        let mut next_children = Vec::with_capacity(next.children().len());
        for (index, descriptor) in next.children().iter().enumerate() {
            let name = child_name(Some(descriptor), index);
            match prev_by_name.remove(&name) {
                Some(prev)
                    if same_type_and_key(prev.descriptor().as_ref(), Some(descriptor)) =>
                {
                    reconciler::receive(&prev, Some(descriptor), tx, context)?;
                    next_children.push(prev);
                }
                stale => {
                    if let Some(stale) = stale {
                        removed.push(stale);
                    }
                    next_children.push(self.mount_child(descriptor, tx, node, host_context, context)?);
                }
            }
        }
        removed.extend(prev_by_name.into_values());

        for child in removed {
            let child_node = child.host_node();
            reconciler::unmount(&child, false)?;
            if let Some(child_node) = child_node {
                self.runtime.with_host(|host| host.remove_node(child_node))?;
            }
        }
        for (index, child) in next_children.iter().enumerate() {
            if let Some(child_node) = child.host_node() {
                self.runtime
                    .with_host(|host| host.insert_child(node, child_node, index))?;
            }
        }
        *self.children.borrow_mut() = next_children;
        Ok(())
    }
}

fn child_name(descriptor: Option<&Descriptor>, index: usize) -> String {
    match descriptor.and_then(Descriptor::key) {
        Some(key) => format!("${key}"),
        None => format!(".{index}"),
    }
}

impl Reconcilable for HostInstance {
    fn mount(
        &self,
        tx: &ReconcileTransaction,
        _host_parent: Option<NodeId>,
        host_context: HostContext,
        context: &Context,
    ) -> Result<NodeId, Error> {
        let descriptor = self.descriptor();
        let tag = descriptor.ty().name().to_string();
        let node = self
            .runtime
            .with_host(|host| host.create_element(&tag, descriptor.props()))?;
        self.node.set(Some(node));
        self.host_context.set(Some(host_context));
        *self.context.borrow_mut() = context.clone();

        // Children are recorded before they mount so a failed mount can
        // still tear down everything it built, the failing child included.
        self.children.borrow_mut().clear();
        for (index, child_descriptor) in descriptor.children().iter().enumerate() {
            let child = Instance::instantiate(&self.runtime, Some(child_descriptor));
            self.children.borrow_mut().push(child.clone());
            reconciler::mount(&child, tx, Some(node), host_context, context)?;
            if let Some(child_node) = child.host_node() {
                self.runtime
                    .with_host(|host| host.insert_child(node, child_node, index))?;
            }
        }
        Ok(node)
    }

    fn receive(
        &self,
        next: Option<&Descriptor>,
        tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<(), Error> {
        let (Some(next), Some(node)) = (next, self.node.get()) else {
            return Ok(());
        };
        let prev = self.descriptor();
        self.runtime
            .with_host(|host| host.update_props(node, prev.props(), next.props()))?;
        *self.descriptor.borrow_mut() = next.clone();
        *self.context.borrow_mut() = context.clone();
        self.reconcile_children(next, tx, node, context)
    }

    fn unmount(&self, safely: bool) -> Result<(), Error> {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in &children {
            reconciler::unmount(child, safely)?;
        }
        self.node.set(None);
        Ok(())
    }

    fn host_node(&self) -> Option<NodeId> {
        self.node.get()
    }
}
