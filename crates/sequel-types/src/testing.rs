//! Test helpers: a call-recording spy for callback and event handlers.
//!
//! Enabled with the `test-helpers` feature. Each handler produced by a
//! [`Spy`] appends its arguments to the shared call log.

use std::{cell::RefCell, rc::Rc};

use crate::Value;

/// Records every invocation of the handlers it hands out.
#[derive(Debug, Clone, Default)]
pub struct Spy {
    calls: Rc<RefCell<Vec<Vec<Value>>>>,
}

impl Spy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call with `args`.
    pub fn record(&self, args: &[Value]) {
        self.calls.borrow_mut().push(args.to_vec());
    }

    /// Multi-fire handler for `on` and `success`.
    pub fn handler(&self) -> impl FnMut(&[Value]) + 'static {
        let spy = self.clone();
        move |args| spy.record(args)
    }

    /// Handler for `error`: records the reason as the single argument.
    pub fn error_handler(&self) -> impl FnOnce(&Value) + 'static {
        let spy = self.clone();
        move |reason| spy.record(std::slice::from_ref(reason))
    }

    /// Node-style handler for `done`/`complete`.
    ///
    /// Records `[reason, ...values]`, with `Null` in the reason slot on
    /// fulfillment.
    pub fn done_handler(&self) -> impl FnOnce(Option<&Value>, &[Value]) + 'static {
        let spy = self.clone();
        move |reason, values| {
            let mut args = Vec::with_capacity(values.len() + 1);
            args.push(reason.cloned().unwrap_or_default());
            args.extend_from_slice(values);
            spy.record(&args);
        }
    }

    #[must_use]
    pub fn called(&self) -> bool {
        !self.calls.borrow().is_empty()
    }

    #[must_use]
    pub fn called_once(&self) -> bool {
        self.call_count() == 1
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Snapshot of every call's arguments, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.calls.borrow().clone()
    }

    #[must_use]
    pub fn first_call(&self) -> Option<Vec<Value>> {
        self.calls.borrow().first().cloned()
    }
}
