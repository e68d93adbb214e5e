//! Uniform entry points over every instance kind.
//!
//! The free functions here wrap [`Reconcilable`] with the work shared by all
//! kinds: ref bookkeeping, the unchanged-descriptor fast path and the
//! update-batch check for dirty composites.

use std::fmt;
use std::rc::Rc;

use crate::composite::CompositeInstance;
use crate::descriptor::{Descriptor, ElementType, RefTarget};
use crate::error::Error;
use crate::host::NodeId;
use crate::nodes::{EmptyInstance, HostInstance, TextInstance};
use crate::runtime::RuntimeHandle;
use crate::transaction::ReconcileTransaction;
use crate::update_queue::ComponentHandle;
use crate::value::Context;

/// Where an instance tree is attached in the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostContext {
    pub container: NodeId,
}

pub trait Reconcilable {
    /// Builds the subtree and returns its (not yet inserted) host node.
    fn mount(
        &self,
        tx: &ReconcileTransaction,
        host_parent: Option<NodeId>,
        host_context: HostContext,
        context: &Context,
    ) -> Result<NodeId, Error>;

    /// Reconciles against a descriptor of the same type and key.
    fn receive(
        &self,
        next: Option<&Descriptor>,
        tx: &ReconcileTransaction,
        context: &Context,
    ) -> Result<(), Error>;

    /// Tears the subtree down. With `safely`, will-unmount failures are
    /// logged and deferred instead of aborting the teardown.
    fn unmount(&self, safely: bool) -> Result<(), Error>;

    fn host_node(&self) -> Option<NodeId>;
}

/// A mounted (or about to be mounted) position in the tree.
#[derive(Clone)]
pub enum Instance {
    Empty(Rc<EmptyInstance>),
    Text(Rc<TextInstance>),
    Host(Rc<HostInstance>),
    Composite(Rc<CompositeInstance>),
}

impl Instance {
    /// Picks the instance kind for `descriptor`.
    pub fn instantiate(runtime: &RuntimeHandle, descriptor: Option<&Descriptor>) -> Instance {
        let Some(descriptor) = descriptor else {
            return Instance::Empty(Rc::new(EmptyInstance::new(runtime.clone())));
        };
        match descriptor.ty() {
            ElementType::Text => {
                Instance::Text(Rc::new(TextInstance::new(runtime.clone(), descriptor.clone())))
            }
            ElementType::Host(_) => {
                Instance::Host(Rc::new(HostInstance::new(runtime.clone(), descriptor.clone())))
            }
            ElementType::Component(ty) => Instance::Composite(CompositeInstance::new(
                runtime.clone(),
                descriptor.clone(),
                ty.clone(),
            )),
        }
    }

    fn as_reconcilable(&self) -> &dyn Reconcilable {
        match self {
            Instance::Empty(instance) => instance.as_ref(),
            Instance::Text(instance) => instance.as_ref(),
            Instance::Host(instance) => instance.as_ref(),
            Instance::Composite(instance) => instance.as_ref(),
        }
    }

    pub fn descriptor(&self) -> Option<Descriptor> {
        match self {
            Instance::Empty(_) => None,
            Instance::Text(instance) => Some(instance.descriptor()),
            Instance::Host(instance) => Some(instance.descriptor()),
            Instance::Composite(instance) => Some(instance.descriptor()),
        }
    }

    /// Unmasked context this instance was last reconciled with.
    pub fn context(&self) -> Context {
        match self {
            Instance::Empty(instance) => instance.context(),
            Instance::Text(instance) => instance.context(),
            Instance::Host(instance) => instance.context(),
            Instance::Composite(instance) => instance.unmasked_context(),
        }
    }

    pub fn as_composite(&self) -> Option<&Rc<CompositeInstance>> {
        match self {
            Instance::Composite(instance) => Some(instance),
            _ => None,
        }
    }

    /// Handle exposed to refs and update callbacks. Only stateful and pure
    /// composites have one.
    pub fn public_instance(&self) -> Option<ComponentHandle> {
        self.as_composite()
            .and_then(|instance| instance.public_instance())
    }

    pub fn host_node(&self) -> Option<NodeId> {
        self.as_reconcilable().host_node()
    }

    /// Every host node created below and including this instance, parents
    /// before children. Covers nodes not yet inserted into their parent.
    pub(crate) fn collect_host_nodes(&self, nodes: &mut Vec<NodeId>) {
        match self {
            Instance::Empty(_) | Instance::Text(_) => nodes.extend(self.host_node()),
            Instance::Host(instance) => {
                nodes.extend(instance.host_node());
                for child in instance.children() {
                    child.collect_host_nodes(nodes);
                }
            }
            Instance::Composite(instance) => {
                if let Some(rendered) = instance.rendered() {
                    rendered.collect_host_nodes(nodes);
                }
            }
        }
    }

    fn ref_target(&self) -> Option<RefTarget> {
        match self {
            Instance::Empty(_) => None,
            Instance::Text(_) | Instance::Host(_) => self.host_node().map(RefTarget::Host),
            Instance::Composite(_) => self.public_instance().map(RefTarget::Component),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Instance::Empty(_) => "Empty",
            Instance::Text(_) => "Text",
            Instance::Host(_) => "Host",
            Instance::Composite(_) => "Composite",
        };
        f.debug_struct(kind)
            .field("descriptor", &self.descriptor())
            .field("host_node", &self.host_node())
            .finish()
    }
}

pub fn mount(
    instance: &Instance,
    tx: &ReconcileTransaction,
    host_parent: Option<NodeId>,
    host_context: HostContext,
    context: &Context,
) -> Result<NodeId, Error> {
    let node = instance
        .as_reconcilable()
        .mount(tx, host_parent, host_context, context)?;
    if instance
        .descriptor()
        .is_some_and(|descriptor| descriptor.ref_().is_some())
    {
        tx.mount_ready().enqueue(attach_ref, instance.clone());
    }
    Ok(node)
}

pub fn receive(
    instance: &Instance,
    next: Option<&Descriptor>,
    tx: &ReconcileTransaction,
    context: &Context,
) -> Result<(), Error> {
    let prev = instance.descriptor();
    let same_descriptor = match (prev.as_ref(), next) {
        (None, None) => true,
        (Some(prev), Some(next)) => prev.ptr_eq(next),
        _ => false,
    };
    if same_descriptor && instance.context().ptr_eq(context) {
        log::trace!("skipping unchanged {}", describe(next));
        return Ok(());
    }

    let refs_changed = refs_changed(prev.as_ref(), next);
    if refs_changed {
        if let Some(ref_) = prev.as_ref().and_then(Descriptor::ref_) {
            ref_.call(None);
        }
    }
    instance.as_reconcilable().receive(next, tx, context)?;
    if refs_changed && next.is_some_and(|next| next.ref_().is_some()) {
        tx.mount_ready().enqueue(attach_ref, instance.clone());
    }
    Ok(())
}

pub fn unmount(instance: &Instance, safely: bool) -> Result<(), Error> {
    if let Some(ref_) = instance.descriptor().as_ref().and_then(Descriptor::ref_) {
        ref_.call(None);
    }
    instance.as_reconcilable().unmount(safely)
}

pub fn host_node(instance: &Instance) -> Option<NodeId> {
    instance.host_node()
}

/// Reconciles a dirty composite, unless it already took part in another
/// pass or was reconciled by its parent earlier in this one.
pub fn perform_update_if_necessary(
    instance: &Rc<CompositeInstance>,
    tx: &ReconcileTransaction,
    update_batch: u64,
) -> Result<(), Error> {
    if instance.update_batch() != Some(update_batch) {
        log::trace!(
            "{} already reconciled; skipping its dirty entry",
            instance.name()
        );
        return Ok(());
    }
    instance.reconcile_if_necessary(tx)
}

fn refs_changed(prev: Option<&Descriptor>, next: Option<&Descriptor>) -> bool {
    match (prev.and_then(Descriptor::ref_), next.and_then(Descriptor::ref_)) {
        (None, None) => false,
        (Some(prev), Some(next)) => !prev.ptr_eq(next),
        _ => true,
    }
}

fn attach_ref(instance: &Instance, _: &()) -> Result<(), Error> {
    if let Some(ref_) = instance.descriptor().as_ref().and_then(Descriptor::ref_) {
        ref_.call(instance.ref_target());
    }
    Ok(())
}

fn describe(descriptor: Option<&Descriptor>) -> &str {
    descriptor.map_or("(empty)", |descriptor| descriptor.ty().name())
}
