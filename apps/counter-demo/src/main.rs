//! Mounts a pair of counters into an in-memory host, drives a few batched
//! updates and prints the resulting node tree after each step.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::{
    Component, ComponentClass, ComponentType, Context, Cx, Descriptor, Error, Hooks, Host,
    Instance, MemoryHost, Props, Record, Runtime, View,
};

struct Counter;

impl Component for Counter {
    fn hooks(&self) -> Hooks {
        Hooks::AFTER_UPDATE
    }

    fn initial_state(&self, props: &Props, _context: &Context) -> Option<Record> {
        Some(Record::new().with("count", props.int("start").unwrap_or(0)))
    }

    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        let label = cx.props().str("label").unwrap_or("counter");
        let count = cx.state().and_then(|state| state.int("count")).unwrap_or(0);
        Ok(Some(Descriptor::host(
            "p",
            Props::new().with("class", "counter"),
            vec![Descriptor::text(format!("{label}: {count}"))],
        )))
    }

    fn after_update(&mut self, cx: &Cx<'_>, prev: &View) -> Result<(), Error> {
        let before = prev.state.as_ref().and_then(|state| state.int("count"));
        let after = cx.state().and_then(|state| state.int("count"));
        log::info!("{} went from {before:?} to {after:?}", cx.handle().name());
        Ok(())
    }
}

impl ComponentClass for Counter {
    const NAME: &'static str = "Counter";

    fn create(_props: &Props, _context: &Context) -> Result<Self, Error> {
        Ok(Counter)
    }
}

fn counters() -> Descriptor {
    let counter = ComponentType::stateful::<Counter>();
    Descriptor::host(
        "main",
        Props::new(),
        vec![
            counter
                .element(Props::new().with("label", "apples").with("start", 3))
                .with_key("apples"),
            counter
                .element(Props::new().with("label", "pears"))
                .with_key("pears"),
        ],
    )
}

fn increment(by: i64) -> impl Fn(&Record, &Props, &Context) -> Option<Record> {
    move |state: &Record, _props: &Props, _context: &Context| {
        let count = state.int("count").unwrap_or(0);
        Some(Record::new().with("count", count + by))
    }
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let host = Rc::new(RefCell::new(MemoryHost::new()));
    let container = host
        .borrow_mut()
        .create_element("body", &Props::new())?;
    let runtime = Runtime::new(host.clone());

    let root = runtime.render(counters(), container)?;
    println!("after mount:\n{}", host.borrow().dump_tree(Some(container)));

    let handles: Vec<_> = match root.rendered() {
        Some(Instance::Host(main)) => main
            .children()
            .iter()
            .filter_map(Instance::public_instance)
            .collect(),
        _ => Vec::new(),
    };

    runtime.handle().batched_updates(|| {
        for handle in &handles {
            handle.update_state(increment(1))?;
            handle.update_state(increment(10))?;
        }
        Ok(())
    })?;
    log::info!("host committed {} times", host.borrow().commits());
    println!(
        "after batched increments:\n{}",
        host.borrow().dump_tree(Some(container))
    );

    root.unmount()?;
    println!("after unmount:\n{}", host.borrow().dump_tree(Some(container)));
    Ok(())
}
