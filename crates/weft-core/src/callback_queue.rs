use std::cell::RefCell;
use std::fmt;

use crate::error::Error;

pub type Callback<R, A> = Box<dyn FnOnce(&R, &A) -> Result<(), Error>>;

/// Ordered buffer of deferred callbacks, each paired with the receiver it is
/// invoked on.
///
/// Draining works on a snapshot: callbacks enqueued while [`notify_all`]
/// runs stay queued for the next drain.
///
/// [`notify_all`]: CallbackQueue::notify_all
pub struct CallbackQueue<R, A = ()> {
    entries: RefCell<Vec<(Callback<R, A>, R)>>,
    arg: A,
}

impl<R> CallbackQueue<R, ()> {
    pub fn new() -> Self {
        Self::with_arg(())
    }
}

impl<R> Default for CallbackQueue<R, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, A> CallbackQueue<R, A> {
    /// Queue whose callbacks all receive `arg` as their second argument.
    pub fn with_arg(arg: A) -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            arg,
        }
    }

    pub fn enqueue(
        &self,
        callback: impl FnOnce(&R, &A) -> Result<(), Error> + 'static,
        receiver: R,
    ) {
        self.entries
            .borrow_mut()
            .push((Box::new(callback), receiver));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn checkpoint(&self) -> usize {
        self.len()
    }

    /// Drops everything enqueued after `checkpoint`.
    pub fn rollback(&self, checkpoint: usize) {
        self.entries.borrow_mut().truncate(checkpoint);
    }

    pub fn reset(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Invokes the queued callbacks in enqueue order and clears the queue.
    /// Stops at the first failing callback; the remaining snapshot entries
    /// are dropped.
    pub fn notify_all(&self) -> Result<(), Error> {
        let snapshot = std::mem::take(&mut *self.entries.borrow_mut());
        if snapshot.is_empty() {
            return Ok(());
        }
        log::trace!("notifying {} queued callbacks", snapshot.len());
        for (callback, receiver) in snapshot {
            callback(&receiver, &self.arg)?;
        }
        Ok(())
    }
}

impl<R, A> fmt::Debug for CallbackQueue<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, CallbackQueue<&'static str>) {
        (Rc::new(RefCell::new(Vec::new())), CallbackQueue::new())
    }

    #[test]
    fn notify_runs_in_enqueue_order_and_clears() {
        let (seen, queue) = recorder();
        for name in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            queue.enqueue(
                move |receiver, _| {
                    seen.borrow_mut().push(receiver.to_string());
                    Ok(())
                },
                name,
            );
        }
        queue.notify_all().unwrap();
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn rollback_discards_entries_after_checkpoint() {
        let (seen, queue) = recorder();
        let push = |name: &'static str| {
            let seen = Rc::clone(&seen);
            move |_: &&'static str, _: &()| {
                seen.borrow_mut().push(name.to_string());
                Ok(())
            }
        };
        queue.enqueue(push("kept"), "r");
        let checkpoint = queue.checkpoint();
        queue.enqueue(push("dropped"), "r");
        queue.enqueue(push("dropped too"), "r");
        queue.rollback(checkpoint);
        assert_eq!(queue.len(), 1);
        queue.notify_all().unwrap();
        assert_eq!(*seen.borrow(), vec!["kept"]);
    }

    #[test]
    fn reentrant_enqueue_waits_for_next_drain() {
        let queue: Rc<CallbackQueue<u32>> = Rc::new(CallbackQueue::new());
        let count = Rc::new(RefCell::new(0));
        {
            let inner_queue = Rc::clone(&queue);
            let count = Rc::clone(&count);
            queue.enqueue(
                move |_, _| {
                    *count.borrow_mut() += 1;
                    let count = Rc::clone(&count);
                    inner_queue.enqueue(
                        move |_, _| {
                            *count.borrow_mut() += 10;
                            Ok(())
                        },
                        2,
                    );
                    Ok(())
                },
                1,
            );
        }
        queue.notify_all().unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(queue.len(), 1);
        queue.notify_all().unwrap();
        assert_eq!(*count.borrow(), 11);
    }

    #[test]
    fn shared_argument_reaches_every_callback() {
        let queue = CallbackQueue::with_arg(7);
        let total = Rc::new(RefCell::new(0));
        for receiver in [1, 2] {
            let total = Rc::clone(&total);
            queue.enqueue(
                move |receiver: &i32, arg: &i32| {
                    *total.borrow_mut() += receiver * arg;
                    Ok(())
                },
                receiver,
            );
        }
        queue.notify_all().unwrap();
        assert_eq!(*total.borrow(), 21);
    }
}
