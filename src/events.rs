use anyhow::Result;
use std::cell::RefCell;

/// A typed, synchronous, in-process publish/subscribe slot.
///
/// Subscribers are invoked in subscription order, on the caller's thread,
/// after the emitting component has committed its own state change. There
/// is no replay of past emissions. Subscribers must not call back into the
/// emitting component: emission happens while the emitter may still hold a
/// mutable borrow of its own state.
pub struct Signal<T> {
    slots: RefCell<Vec<Box<dyn Fn(&T) -> Result<()>>>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Signal {
            slots: RefCell::new(Vec::new()),
        }
    }

    /// Register a subscriber. Subscribers are never removed; components
    /// live for the process lifetime.
    pub fn connect<F>(&self, handler: F)
    where
        F: Fn(&T) -> Result<()> + 'static,
    {
        self.slots.borrow_mut().push(Box::new(handler));
    }

    /// Deliver `payload` to all current subscribers in subscription order.
    /// Stops at the first subscriber error and propagates it to the
    /// emitter's caller.
    pub fn emit(&self, payload: &T) -> Result<()> {
        for slot in self.slots.borrow().iter() {
            slot(payload)?;
        }
        Ok(())
    }

    /// Number of connected subscribers.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal::new()
    }
}
