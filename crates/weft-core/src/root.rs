//! Top-level roots.
//!
//! Every rendered tree hangs below a hidden wrapper unit whose only job is to
//! render the descriptor it was given. Updating a root hands the wrapper a
//! new descriptor, which goes through the regular dirty-instance flush.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{Component, ComponentClass, ComponentType, Cx};
use crate::composite::CompositeInstance;
use crate::descriptor::Descriptor;
use crate::error::{Error, Invariant};
use crate::host::NodeId;
use crate::reconciler::{self, HostContext, Instance};
use crate::runtime::{Runtime, RuntimeHandle};
use crate::transaction::ReconcileTransaction;
use crate::update_queue::ComponentHandle;
use crate::value::{Context, Props};

const CHILD: &str = "child";

struct TopLevelWrapper;

impl Component for TopLevelWrapper {
    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        Ok(cx.props().descriptor(CHILD).cloned())
    }
}

impl ComponentClass for TopLevelWrapper {
    const NAME: &'static str = "TopLevelWrapper";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(TopLevelWrapper)
    }
}

fn wrap(descriptor: Descriptor) -> Descriptor {
    ComponentType::stateful::<TopLevelWrapper>().element(Props::new().with(CHILD, descriptor))
}

/// A tree mounted into a host container.
pub struct Root {
    runtime: RuntimeHandle,
    container: NodeId,
    wrapper: RefCell<Option<Rc<CompositeInstance>>>,
}

impl Runtime {
    /// Mounts `descriptor` and appends its host node to `container`.
    pub fn render(&self, descriptor: Descriptor, container: NodeId) -> Result<Root, Error> {
        let runtime = self.handle();
        let instance = Instance::instantiate(&runtime, Some(&wrap(descriptor)));
        runtime.batched_updates(|| {
            let transaction = ReconcileTransaction::transaction(runtime.clone());
            transaction.perform(|tx| {
                let node =
                    reconciler::mount(&instance, tx, None, HostContext { container }, &Context::new())?;
                runtime.with_host(|host| host.insert_child(container, node, usize::MAX))
            })
        })?;
        log::debug!("rendered root into container {container}");
        Ok(Root {
            runtime,
            container,
            wrapper: RefCell::new(instance.as_composite().cloned()),
        })
    }
}

impl Root {
    pub fn container(&self) -> NodeId {
        self.container
    }

    fn wrapper(&self) -> Result<Rc<CompositeInstance>, Error> {
        self.wrapper
            .borrow()
            .clone()
            .ok_or(Error::Invariant(Invariant::RootUnmounted))
    }

    pub fn is_mounted(&self) -> bool {
        self.wrapper.borrow().is_some()
    }

    /// Reconciles the tree against `descriptor`. Inside a batch the update
    /// is deferred to the batch's flush.
    pub fn update(&self, descriptor: Descriptor) -> Result<(), Error> {
        let wrapper = self.wrapper()?;
        wrapper.receive_later(wrap(descriptor));
        self.runtime.enqueue_update(&wrapper)
    }

    pub fn unmount(&self) -> Result<(), Error> {
        let wrapper = self.wrapper()?;
        let instance = Instance::Composite(Rc::clone(&wrapper));
        self.runtime.batched_updates(|| {
            let node = instance.host_node();
            reconciler::unmount(&instance, false)?;
            if let Some(node) = node {
                self.runtime.with_host(|host| host.remove_node(node))?;
            }
            Ok(())
        })?;
        self.wrapper.borrow_mut().take();
        log::debug!("unmounted root from container {}", self.container);
        Ok(())
    }

    /// Instance built for the descriptor passed to `render` or `update`.
    pub fn rendered(&self) -> Option<Instance> {
        self.wrapper.borrow().as_ref().and_then(|wrapper| wrapper.rendered())
    }

    /// Handle of the top-level unit, when it is stateful or pure.
    pub fn public_instance(&self) -> Option<ComponentHandle> {
        self.rendered().and_then(|instance| instance.public_instance())
    }

    pub fn host_node(&self) -> Option<NodeId> {
        self.rendered().and_then(|instance| instance.host_node())
    }
}
