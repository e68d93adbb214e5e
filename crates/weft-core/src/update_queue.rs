//! Pending state work and the public handle that produces it.

use std::fmt;
use std::rc::Rc;

use crate::composite::CompositeInstance;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::runtime::RuntimeHandle;
use crate::value::{Context, Props, Record};

pub type HandleId = u64;

pub type StateUpdater = Rc<dyn Fn(&Record, &Props, &Context) -> Option<Record>>;

pub type UpdateCallback = Box<dyn FnOnce(&ComponentHandle) -> Result<(), Error>>;

/// One queued state change.
#[derive(Clone)]
pub enum StateUpdate {
    /// Shallow-merged over the accumulated state.
    Partial(Record),
    /// Computes a partial from the accumulated state, the next props and the
    /// next context. Returning `None` leaves the state unchanged.
    Updater(StateUpdater),
}

impl StateUpdate {
    pub fn updater(f: impl Fn(&Record, &Props, &Context) -> Option<Record> + 'static) -> Self {
        StateUpdate::Updater(Rc::new(f))
    }

    fn resolve(&self, accumulated: &Record, props: &Props, context: &Context) -> Option<Record> {
        match self {
            StateUpdate::Partial(partial) => Some(partial.clone()),
            StateUpdate::Updater(updater) => updater(accumulated, props, context),
        }
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Partial(partial) => f.debug_tuple("Partial").field(partial).finish(),
            StateUpdate::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Folds a state queue into the next state.
///
/// An empty queue yields `existing` itself. A replace with a single entry
/// yields that entry verbatim. Otherwise the fold starts from the first entry
/// (replace) or from `existing`, and shallow-merges every remaining entry in
/// order.
pub fn merge_state(
    existing: Option<&Record>,
    queue: &[StateUpdate],
    replace: bool,
    props: &Props,
    context: &Context,
) -> Option<Record> {
    let Some((first, rest)) = queue.split_first() else {
        return existing.cloned();
    };
    let empty = Record::new();
    let base = existing.unwrap_or(&empty);
    if replace && rest.is_empty() {
        if let StateUpdate::Partial(state) = first {
            return Some(state.clone());
        }
    }
    let (mut next, rest) = if replace {
        (first.resolve(base, props, context).unwrap_or_default(), rest)
    } else {
        (base.clone(), queue)
    };
    for update in rest {
        if let Some(partial) = update.resolve(&next, props, context) {
            next = next.merged(&partial);
        }
    }
    Some(next)
}

/// Work recorded against an instance between flushes.
#[derive(Default)]
pub(crate) struct PendingWork {
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) state_queue: Vec<StateUpdate>,
    pub(crate) replace: bool,
    pub(crate) force: bool,
    pub(crate) callbacks: Vec<UpdateCallback>,
}

impl PendingWork {
    pub(crate) fn has_state_work(&self) -> bool {
        !self.state_queue.is_empty() || self.force
    }

    pub(crate) fn take_state(&mut self) -> (Vec<StateUpdate>, bool) {
        let replace = std::mem::take(&mut self.replace);
        (std::mem::take(&mut self.state_queue), replace)
    }
}

/// Public face of a mounted stateful or pure unit.
///
/// Handles are cheap to clone and may outlive the instance. Updates sent
/// through a released handle are dropped with a warning.
#[derive(Clone)]
pub struct ComponentHandle {
    id: HandleId,
    name: &'static str,
    runtime: RuntimeHandle,
}

impl ComponentHandle {
    pub(crate) fn new(id: HandleId, name: &'static str, runtime: RuntimeHandle) -> Self {
        Self { id, name, runtime }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub(crate) fn instance(&self) -> Option<Rc<CompositeInstance>> {
        self.runtime.lookup_instance(self.id)
    }

    pub fn is_mounted(&self) -> bool {
        self.instance().is_some()
    }

    pub fn props(&self) -> Option<Props> {
        self.instance().map(|instance| instance.view().props)
    }

    pub fn state(&self) -> Option<Record> {
        self.instance().and_then(|instance| instance.view().state)
    }

    pub fn set_state(&self, partial: Record) -> Result<(), Error> {
        self.enqueue("set_state", |pending| {
            pending.state_queue.push(StateUpdate::Partial(partial))
        })
    }

    /// Like [`set_state`](Self::set_state), with a callback that runs once
    /// the update has been flushed.
    pub fn set_state_with(
        &self,
        partial: Record,
        callback: impl FnOnce(&ComponentHandle) -> Result<(), Error> + 'static,
    ) -> Result<(), Error> {
        self.enqueue("set_state", |pending| {
            pending.state_queue.push(StateUpdate::Partial(partial));
            pending.callbacks.push(Box::new(callback));
        })
    }

    pub fn update_state(
        &self,
        updater: impl Fn(&Record, &Props, &Context) -> Option<Record> + 'static,
    ) -> Result<(), Error> {
        self.enqueue("update_state", |pending| {
            pending.state_queue.push(StateUpdate::updater(updater))
        })
    }

    /// Discards updates queued so far and replaces the state wholesale.
    pub fn replace_state(&self, state: Record) -> Result<(), Error> {
        self.enqueue("replace_state", |pending| {
            pending.state_queue.clear();
            pending.state_queue.push(StateUpdate::Partial(state));
            pending.replace = true;
        })
    }

    /// Re-renders even when the unit would skip the update.
    pub fn force_update(&self) -> Result<(), Error> {
        self.enqueue("force_update", |pending| pending.force = true)
    }

    pub fn force_update_with(
        &self,
        callback: impl FnOnce(&ComponentHandle) -> Result<(), Error> + 'static,
    ) -> Result<(), Error> {
        self.enqueue("force_update", |pending| {
            pending.force = true;
            pending.callbacks.push(Box::new(callback));
        })
    }

    fn enqueue(&self, operation: &str, record: impl FnOnce(&mut PendingWork)) -> Result<(), Error> {
        let Some(instance) = self.instance() else {
            log::warn!(
                "{}: {operation} called on an unmounted component; the update was dropped",
                self.name
            );
            return Ok(());
        };
        instance.record_pending(record);
        self.runtime.enqueue_update(&instance)
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentHandle {}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(record: &Option<Record>) -> Option<i64> {
        record.as_ref().and_then(|state| state.int("n"))
    }

    #[test]
    fn empty_queue_returns_existing_state_by_identity() {
        let existing = Record::new().with("n", 1);
        let next = merge_state(Some(&existing), &[], false, &Props::new(), &Context::new());
        assert!(next.expect("state").ptr_eq(&existing));
        assert!(merge_state(None, &[], false, &Props::new(), &Context::new()).is_none());
    }

    #[test]
    fn partials_fold_left_to_right() {
        let existing = Record::new().with("n", 0).with("label", "x");
        let queue = [
            StateUpdate::Partial(Record::new().with("n", 1)),
            StateUpdate::Partial(Record::new().with("n", 2)),
            StateUpdate::Partial(Record::new().with("n", 3)),
        ];
        let next = merge_state(Some(&existing), &queue, false, &Props::new(), &Context::new());
        assert_eq!(n(&next), Some(3));
        assert_eq!(next.as_ref().and_then(|s| s.str("label")), Some("x"));
    }

    #[test]
    fn updaters_see_accumulated_state_and_props() {
        let props = Props::new().with("step", 10);
        let queue = [
            StateUpdate::Partial(Record::new().with("n", 1)),
            StateUpdate::updater(|state, props, _| {
                let n = state.int("n").unwrap_or(0) + props.int("step").unwrap_or(0);
                Some(Record::new().with("n", n))
            }),
            StateUpdate::updater(|_, _, _| None),
        ];
        let next = merge_state(None, &queue, false, &props, &Context::new());
        assert_eq!(n(&next), Some(11));
    }

    #[test]
    fn single_replace_is_used_verbatim() {
        let existing = Record::new().with("n", 1).with("extra", true);
        let replacement = Record::new().with("n", 5);
        let next = merge_state(
            Some(&existing),
            &[StateUpdate::Partial(replacement.clone())],
            true,
            &Props::new(),
            &Context::new(),
        )
        .expect("state");
        assert!(next.ptr_eq(&replacement));
        assert!(!next.contains_key("extra"));
    }

    #[test]
    fn replace_then_partial_merges_over_the_replacement() {
        let existing = Record::new().with("extra", true);
        let queue = [
            StateUpdate::Partial(Record::new().with("n", 5)),
            StateUpdate::Partial(Record::new().with("m", 6)),
        ];
        let next = merge_state(Some(&existing), &queue, true, &Props::new(), &Context::new())
            .expect("state");
        assert_eq!(next.int("n"), Some(5));
        assert_eq!(next.int("m"), Some(6));
        assert!(!next.contains_key("extra"));
    }
}
