use super::*;
use crate::component::{Component, ComponentClass, ComponentType, Cx, Hooks, View};
use crate::descriptor::Descriptor;
use crate::error::Invariant;
use crate::host::{Host, MemoryHost, NodeId};
use crate::reconciler::Instance;
use crate::root::Root;
use crate::runtime::Runtime;
use crate::value::{Context, Props, Record};

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    static OUTER: RefCell<Option<ComponentHandle>> = RefCell::new(None);
    static INNER: RefCell<Option<ComponentHandle>> = RefCell::new(None);
}

fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

fn events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

fn outer_handle() -> ComponentHandle {
    OUTER.with(|outer| outer.borrow().clone()).expect("outer mounted")
}

fn inner_handle() -> ComponentHandle {
    INNER.with(|inner| inner.borrow().clone()).expect("inner mounted")
}

fn n(state: Option<&Record>) -> i64 {
    state.and_then(|state| state.int("n")).unwrap_or(0)
}

fn setup(descriptor: Descriptor) -> (Rc<RefCell<MemoryHost>>, Runtime, Root, NodeId) {
    let host = Rc::new(RefCell::new(MemoryHost::new()));
    let container = host
        .borrow_mut()
        .create_element("root", &Props::new())
        .expect("container");
    let runtime = Runtime::new(host.clone());
    let root = runtime.render(descriptor, container).expect("render");
    events();
    (host, runtime, root, container)
}

struct Outer;

impl Component for Outer {
    fn hooks(&self) -> Hooks {
        Hooks::AFTER_MOUNT
    }

    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        let count = n(cx.state());
        record(format!("Outer.render n={count}"));
        Ok(Some(Descriptor::host(
            "div",
            Props::new(),
            vec![ComponentType::stateful::<Inner>().element(Props::new().with("label", count))],
        )))
    }

    fn after_mount(&mut self, cx: &Cx<'_>) -> Result<(), Error> {
        OUTER.with(|outer| *outer.borrow_mut() = Some(cx.handle().clone()));
        Ok(())
    }
}

impl ComponentClass for Outer {
    const NAME: &'static str = "Outer";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Outer)
    }
}

struct Inner {
    poked_outer: bool,
}

impl Component for Inner {
    fn hooks(&self) -> Hooks {
        Hooks::AFTER_MOUNT | Hooks::BEFORE_UPDATE
    }

    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        let label = cx.props().int("label").unwrap_or(-1);
        record(format!("Inner.render label={label} n={}", n(cx.state())));
        Ok(Some(Descriptor::text(label)))
    }

    fn after_mount(&mut self, cx: &Cx<'_>) -> Result<(), Error> {
        INNER.with(|inner| *inner.borrow_mut() = Some(cx.handle().clone()));
        Ok(())
    }

    fn before_update(&mut self, _cx: &Cx<'_>, next: &View) -> Result<(), Error> {
        let poke = next
            .state
            .as_ref()
            .and_then(|state| state.bool("poke_outer"))
            .unwrap_or(false);
        if poke && !self.poked_outer {
            self.poked_outer = true;
            outer_handle().set_state(Record::new().with("n", 1))?;
        }
        Ok(())
    }
}

impl ComponentClass for Inner {
    const NAME: &'static str = "Inner";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Inner { poked_outer: false })
    }
}

fn outer() -> Descriptor {
    ComponentType::stateful::<Outer>().element(Props::new())
}

#[test]
fn ancestors_reconcile_before_descendants() {
    let (_host, runtime, _root, _container) = setup(outer());
    let inner = inner_handle();
    let outer = outer_handle();

    runtime
        .handle()
        .batched_updates(|| {
            inner.set_state(Record::new().with("n", 1))?;
            outer.set_state(Record::new().with("n", 1))
        })
        .unwrap();

    assert_eq!(
        events(),
        vec!["Outer.render n=1", "Inner.render label=1 n=1"]
    );
}

#[test]
fn update_triggered_from_a_hook_runs_in_a_later_pass() {
    let (host, runtime, _root, container) = setup(outer());
    let inner = inner_handle();

    inner
        .set_state(Record::new().with("n", 1).with("poke_outer", true))
        .unwrap();

    assert_eq!(
        events(),
        vec![
            "Inner.render label=0 n=1",
            "Outer.render n=1",
            "Inner.render label=1 n=1",
        ]
    );
    assert_eq!(inner, inner_handle());
    assert!(inner.is_mounted());
    assert_eq!(host.borrow().text_content(container), "1");
    assert_eq!(runtime.dirty_len(), 0);
}

#[test]
fn asap_runs_after_the_dirty_window_and_before_the_trigger_returns() {
    let (_host, runtime, _root, _container) = setup(outer());
    let handle = runtime.handle();
    let inner = inner_handle();
    let outer = outer_handle();

    handle
        .batched_updates(|| {
            outer.set_state(Record::new().with("n", 2))?;
            handle.asap(|| {
                record("asap");
                Ok(())
            })?;
            inner.set_state(Record::new().with("n", 3))
        })
        .unwrap();
    record("returned");

    assert_eq!(
        events(),
        vec![
            "Outer.render n=2",
            "Inner.render label=2 n=3",
            "asap",
            "returned"
        ]
    );
}

#[test]
fn asap_outside_a_batch_is_rejected() {
    let (_host, runtime, _root, _container) = setup(outer());
    let err = runtime.handle().asap(|| Ok(())).unwrap_err();
    assert!(matches!(err, Error::Invariant(Invariant::AsapOutsideBatch)));
}

#[test]
fn nested_batches_flush_once_when_the_outermost_closes() {
    let (_host, runtime, _root, _container) = setup(outer());
    let handle = runtime.handle();
    let outer = outer_handle();

    handle
        .batched_updates(|| {
            handle.batched_updates(|| outer.set_state(Record::new().with("n", 1)))?;
            assert_eq!(runtime.dirty_len(), 1);
            record("inner batch closed");
            outer.set_state(Record::new().with("n", 2))
        })
        .unwrap();

    assert_eq!(
        events(),
        vec![
            "inner batch closed",
            "Outer.render n=2",
            "Inner.render label=2 n=0"
        ]
    );
}

struct Fragile;

impl Component for Fragile {
    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        let name = cx.props().str("name").unwrap_or("?").to_string();
        if cx.state().and_then(|state| state.bool("boom")) == Some(true) {
            record(format!("{name} failed"));
            return Err(Error::component(format!("{name} exploded")));
        }
        record(format!("{name}.render n={}", n(cx.state())));
        Ok(Some(Descriptor::text(name)))
    }
}

impl ComponentClass for Fragile {
    const NAME: &'static str = "Fragile";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Fragile)
    }
}

struct Pair;

impl Component for Pair {
    fn render(&mut self, _cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        let fragile = |name: &str| {
            ComponentType::stateful::<Fragile>().element(Props::new().with("name", name))
        };
        Ok(Some(Descriptor::host(
            "div",
            Props::new(),
            vec![fragile("a"), fragile("b")],
        )))
    }
}

impl ComponentClass for Pair {
    const NAME: &'static str = "Pair";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Pair)
    }
}

fn fragile_handles(root: &Root) -> (ComponentHandle, ComponentHandle) {
    let pair = root
        .rendered()
        .and_then(|instance| instance.as_composite().cloned())
        .expect("pair instance");
    let div = match pair.rendered() {
        Some(Instance::Host(div)) => div,
        other => panic!("expected a host child, got {other:?}"),
    };
    let children = div.children();
    let handle = |index: usize| {
        children[index]
            .public_instance()
            .expect("fragile handle")
    };
    (handle(0), handle(1))
}

#[test]
fn aborted_pass_leaves_unreached_instances_for_the_next_trigger() {
    let (_host, runtime, root, _container) =
        setup(ComponentType::stateful::<Pair>().element(Props::new()));
    let (a, b) = fragile_handles(&root);
    let handle = runtime.handle();

    let err = handle
        .batched_updates(|| {
            a.set_state(Record::new().with("boom", true))?;
            b.set_state(Record::new().with("n", 1))
        })
        .unwrap_err();
    assert_eq!(err.root_cause().to_string(), "a exploded");
    assert_eq!(events(), vec!["a failed"]);
    assert_eq!(runtime.dirty_len(), 1);

    a.set_state(Record::new().with("boom", false)).unwrap();

    assert_eq!(events(), vec!["a.render n=0", "b.render n=1"]);
    assert_eq!(runtime.dirty_len(), 0);
}

#[test]
fn unmounted_instances_drop_their_pending_work() {
    let (_host, runtime, root, _container) = setup(outer());
    let inner = inner_handle();
    let handle = runtime.handle();

    handle
        .batched_updates(|| {
            inner.set_state(Record::new().with("n", 5))?;
            root.unmount()
        })
        .unwrap();

    assert!(events().is_empty());
    assert_eq!(runtime.dirty_len(), 0);
    assert_eq!(runtime.mounted_instances(), 0);
}
