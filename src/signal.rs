//! Single-threaded observer lists.
//!
//! A [`Signal`] holds callbacks registered with [`Signal::connect`]. Each
//! registration returns a [`Subscription`]; dropping it disconnects the
//! callback, so an observer's lifetime is tied to whatever owns the guard.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Slot<T> = Box<dyn FnMut(&T)>;

struct Slots<T> {
    next_id: u64,
    slots: Vec<(u64, Slot<T>)>,
    /// Ids disconnected while their slot was taken out for an emit.
    dropped_during_emit: Vec<u64>,
    emitting: bool,
}

trait Disconnect {
    fn disconnect(&self, id: u64);
}

impl<T> Disconnect for RefCell<Slots<T>> {
    fn disconnect(&self, id: u64) {
        let mut inner = self.borrow_mut();
        let before = inner.slots.len();
        inner.slots.retain(|(slot_id, _)| *slot_id != id);
        if inner.slots.len() == before && inner.emitting {
            inner.dropped_during_emit.push(id);
        }
    }
}

pub struct Signal<T> {
    inner: Rc<RefCell<Slots<T>>>,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Slots {
                next_id: 0,
                slots: Vec::new(),
                dropped_during_emit: Vec::new(),
                emitting: false,
            })),
        }
    }

    #[must_use = "dropping the subscription disconnects the callback"]
    pub fn connect(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.push((id, Box::new(callback)));
            id
        };
        let target: Rc<dyn Disconnect> = self.inner.clone();
        Subscription {
            id,
            target: Rc::downgrade(&target),
        }
    }

    /// Call every connected callback. Callbacks may connect or disconnect
    /// while running; new connections only see later emits.
    pub fn emit(&self, value: &T) {
        let mut running = {
            let mut inner = self.inner.borrow_mut();
            if inner.emitting {
                // Nested emit from inside a callback; the outer pass owns the slots.
                return;
            }
            inner.emitting = true;
            std::mem::take(&mut inner.slots)
        };
        for (_, slot) in running.iter_mut() {
            slot(value);
        }
        let mut inner = self.inner.borrow_mut();
        inner.emitting = false;
        let dropped = std::mem::take(&mut inner.dropped_during_emit);
        running.retain(|(id, _)| !dropped.contains(id));
        running.append(&mut inner.slots);
        inner.slots = running;
    }

    pub fn receiver_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}

/// Keeps a callback connected for as long as it lives.
pub struct Subscription {
    id: u64,
    target: Weak<dyn Disconnect>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(target) = self.target.upgrade() {
            target.disconnect(self.id);
        }
    }
}
