use std::cell::{Ref, RefCell};
use std::rc::Rc;

use weft_core::collections::map::HashMap;
use weft_core::{
    BatchingStrategy, Component, ComponentClass, ComponentHandle, ComponentType, Context, Cx,
    Descriptor, Error, Hooks, HostOp, Instance, MemoryHost, NodeId, Props, Record, Root, Runtime,
    Value, View,
};

/// Headless harness for exercising trees in tests.
///
/// `WeftTestRule` owns an in-memory host with a single container element and
/// the runtime driving it. The first call to [`WeftTestRule::set_content`]
/// mounts a root; later calls reconcile the same root against the new
/// descriptor.
pub struct WeftTestRule {
    host: Rc<RefCell<MemoryHost>>,
    runtime: Runtime,
    container: NodeId,
    root: Option<Root>,
}

impl WeftTestRule {
    /// Create a new test rule backed by the default batching strategy.
    pub fn new() -> Self {
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        let runtime = Runtime::new(host.clone());
        Self::with_runtime(host, runtime)
    }

    /// Create a rule whose runtime uses `strategy` for batching.
    pub fn with_batching_strategy(strategy: Box<dyn BatchingStrategy>) -> Self {
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        let runtime = Runtime::builder(host.clone())
            .batching_strategy(strategy)
            .build();
        Self::with_runtime(host, runtime)
    }

    fn with_runtime(host: Rc<RefCell<MemoryHost>>, runtime: Runtime) -> Self {
        let container = {
            use weft_core::Host;
            host.borrow_mut()
                .create_element("root", &Props::new())
                .expect("create test container")
        };
        Self {
            host,
            runtime,
            container,
            root: None,
        }
    }

    /// Mount `descriptor`, or reconcile the existing root against it.
    pub fn set_content(&mut self, descriptor: Descriptor) -> Result<(), Error> {
        match &self.root {
            Some(root) if root.is_mounted() => root.update(descriptor),
            _ => {
                log::debug!("mounting test root into container {}", self.container);
                self.root = Some(self.runtime.render(descriptor, self.container)?);
                Ok(())
            }
        }
    }

    /// Unmount the root, if one is mounted.
    pub fn unmount(&mut self) -> Result<(), Error> {
        match self.root.take() {
            Some(root) if root.is_mounted() => root.unmount(),
            _ => Ok(()),
        }
    }

    /// Run `work` inside one batch. Updates enqueued by `work` flush together
    /// when it returns.
    pub fn batched<R>(&self, work: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
        self.runtime.handle().batched_updates(work)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn root(&self) -> Option<&Root> {
        self.root.as_ref()
    }

    pub fn rendered(&self) -> Option<Instance> {
        self.root.as_ref().and_then(Root::rendered)
    }

    /// Handle of the top-level unit.
    pub fn public_instance(&self) -> Option<ComponentHandle> {
        self.root.as_ref().and_then(Root::public_instance)
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn host(&self) -> Ref<'_, MemoryHost> {
        self.host.borrow()
    }

    /// Text of every text node under the container, in tree order.
    pub fn text(&self) -> String {
        self.host.borrow().text_content(self.container)
    }

    pub fn dump(&self) -> String {
        self.host.borrow().dump_tree(Some(self.container))
    }

    pub fn commits(&self) -> usize {
        self.host.borrow().commits()
    }

    /// Drain the host operation log.
    pub fn take_host_log(&self) -> Vec<HostOp> {
        self.host.borrow_mut().take_log()
    }
}

impl Default for WeftTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `WeftTestRule`.
pub fn run_test_root<R>(f: impl FnOnce(&mut WeftTestRule) -> R) -> R {
    let mut rule = WeftTestRule::new();
    f(&mut rule)
}

#[derive(Default)]
struct LogInner {
    events: RefCell<Vec<String>>,
    handles: RefCell<HashMap<String, ComponentHandle>>,
}

/// Shared record of lifecycle events, passed to [`Probe`] units through
/// their props.
#[derive(Clone, Default)]
pub struct LifecycleLog {
    inner: Rc<LogInner>,
}

const LOG_PROP: &str = "log";

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_props(props: &Props) -> Option<Self> {
        let inner = props.get(LOG_PROP)?.downcast::<LogInner>()?;
        Some(Self { inner })
    }

    /// `props` with this log attached.
    pub fn attach(&self, props: Props) -> Props {
        let value: Rc<dyn std::any::Any> = self.inner.clone();
        props.with(LOG_PROP, Value::Any(value))
    }

    pub fn record(&self, event: impl Into<String>) {
        self.inner.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.events.borrow().clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.events.borrow_mut())
    }

    pub fn handle(&self, name: &str) -> Option<ComponentHandle> {
        self.inner.handles.borrow().get(name).cloned()
    }

    fn register(&self, name: &str, handle: &ComponentHandle) {
        self.inner
            .handles
            .borrow_mut()
            .insert(name.to_string(), handle.clone());
    }
}

/// Unit that records each lifecycle hook into the [`LifecycleLog`] found in
/// its props as `"{name}.{hook}"`.
///
/// Props read by the probe:
/// - `name`: label used in recorded events and for [`LifecycleLog::handle`].
/// - `child`: descriptor to render. Without it the probe renders the text of
///   its `n` state, falling back to its `label` prop.
/// - `block`: when `true`, `should_update` declines.
pub struct Probe {
    name: String,
    log: Option<LifecycleLog>,
}

impl Probe {
    pub fn element(log: &LifecycleLog, name: &str, props: Props) -> Descriptor {
        ComponentType::stateful::<Probe>().element(log.attach(props.with("name", name)))
    }

    fn record(&self, hook: &str) {
        if let Some(log) = &self.log {
            log.record(format!("{}.{hook}", self.name));
        }
    }
}

impl Component for Probe {
    fn hooks(&self) -> Hooks {
        Hooks::BEFORE_MOUNT
            | Hooks::AFTER_MOUNT
            | Hooks::RECEIVE_PROPS
            | Hooks::SHOULD_UPDATE
            | Hooks::BEFORE_UPDATE
            | Hooks::AFTER_UPDATE
            | Hooks::WILL_UNMOUNT
    }

    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        self.record("render");
        if let Some(child) = cx.props().descriptor("child") {
            return Ok(Some(child.clone()));
        }
        let text = match cx.state().and_then(|state| state.int("n")) {
            Some(n) => n.to_string(),
            None => cx.props().str("label").unwrap_or_default().to_string(),
        };
        Ok(Some(Descriptor::text(text)))
    }

    fn before_mount(&mut self, _cx: &Cx<'_>) -> Result<(), Error> {
        self.record("before_mount");
        Ok(())
    }

    fn after_mount(&mut self, cx: &Cx<'_>) -> Result<(), Error> {
        self.record("after_mount");
        if let Some(log) = &self.log {
            log.register(&self.name, cx.handle());
        }
        Ok(())
    }

    fn receive_props(
        &mut self,
        _cx: &Cx<'_>,
        _next_props: &Props,
        _next_context: &Context,
    ) -> Result<(), Error> {
        self.record("receive_props");
        Ok(())
    }

    fn should_update(&mut self, _cx: &Cx<'_>, next: &View) -> Result<bool, Error> {
        self.record("should_update");
        Ok(next.props.bool("block") != Some(true))
    }

    fn before_update(&mut self, _cx: &Cx<'_>, _next: &View) -> Result<(), Error> {
        self.record("before_update");
        Ok(())
    }

    fn after_update(&mut self, _cx: &Cx<'_>, _prev: &View) -> Result<(), Error> {
        self.record("after_update");
        Ok(())
    }

    fn will_unmount(&mut self, _cx: &Cx<'_>) -> Result<(), Error> {
        self.record("will_unmount");
        Ok(())
    }
}

impl ComponentClass for Probe {
    const NAME: &'static str = "Probe";

    fn create(props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Self {
            name: props.str("name").unwrap_or("probe").to_string(),
            log: LifecycleLog::from_props(props),
        })
    }
}

/// State record with a single integer `n`.
pub fn count(n: i64) -> Record {
    Record::new().with("n", n)
}
