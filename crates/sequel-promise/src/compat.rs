//! Callback/Event Compatibility Layer.
//!
//! The legacy surfaces (`success`, `error`, `done`/`complete`,
//! `on("success" | "error")`) are projections of one settlement signal. The
//! table in [`Callback::deliver`] maps each surface and each logical outcome
//! to the argument shape that surface expects:
//!
//! | surface        | fulfilled `(values)`   | rejected `(reason)`   |
//! |----------------|------------------------|-----------------------|
//! | `success`      | `values` spread        | -                     |
//! | `error`        | -                      | `reason`, unspread    |
//! | `done`         | `(None, values)`       | `(Some(reason), [])`  |
//! | `on("success")`| `values` spread        | -                     |
//! | `on("error")`  | -                      | `[reason]`            |
//!
//! Every other event name lives on an independent multi-fire channel that
//! the settlement state machine never touches.

use std::{cell::RefCell, rc::Rc};

use sequel_types::{EventName, Value};

use crate::promise::{Promise, Shared, Subscriber};
use crate::proxy;
use crate::scheduler::Scheduler;
use crate::state::{Outcome, Resolution};

type Handler = Rc<RefCell<dyn FnMut(&[Value])>>;

/// A settlement signal: the instance's own settlement, or a `success` /
/// `error` event forwarded from a proxied source.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Signal<'a> {
    Fulfilled(&'a [Value]),
    Rejected(&'a Value),
}

impl<'a> From<&'a Outcome> for Signal<'a> {
    fn from(outcome: &'a Outcome) -> Self {
        match outcome {
            Outcome::Fulfilled(values) => Self::Fulfilled(values),
            Outcome::Rejected(reason) => Self::Rejected(reason),
        }
    }
}

impl<'a> Signal<'a> {
    /// Interpret a forwarded settlement event. `None` for other events.
    pub(crate) fn from_event(event: &EventName, args: &'a [Value]) -> Option<Self> {
        match event {
            EventName::Success => Some(Self::Fulfilled(args)),
            EventName::Error => Some(Self::Rejected(args.first().unwrap_or(&Value::Null))),
            _ => None,
        }
    }

    fn event(self) -> EventName {
        match self {
            Self::Fulfilled(_) => EventName::Success,
            Self::Rejected(_) => EventName::Error,
        }
    }

    fn args(self) -> &'a [Value] {
        match self {
            Self::Fulfilled(values) => values,
            Self::Rejected(reason) => std::slice::from_ref(reason),
        }
    }
}

/// A legacy settlement-linked registration.
pub(crate) enum Callback {
    Success(Box<dyn FnOnce(&[Value])>),
    Error(Box<dyn FnOnce(&Value)>),
    Done(Box<dyn FnOnce(Option<&Value>, &[Value])>),
    /// `on("success")` / `on("error")`: persists for the instance's lifetime.
    Listener(EventName, Handler),
}

impl Callback {
    pub(crate) fn observes_rejection(&self) -> bool {
        match self {
            Self::Success(_) => false,
            Self::Error(_) | Self::Done(_) => true,
            Self::Listener(event, _) => *event == EventName::Error,
        }
    }

    /// A second handle to a persistent listener; `None` for one-shot callbacks.
    pub(crate) fn persistent_clone(&self) -> Option<Self> {
        match self {
            Self::Listener(event, handler) => Some(Self::Listener(event.clone(), handler.clone())),
            _ => None,
        }
    }

    /// Deliver `signal`. Returns the callback if it stays registered: it did
    /// not observe this outcome, or it is persistent.
    pub(crate) fn deliver(self, signal: Signal<'_>) -> Option<Self> {
        match (self, signal) {
            (Self::Success(f), Signal::Fulfilled(values)) => {
                f(values);
                None
            }
            (Self::Error(f), Signal::Rejected(reason)) => {
                f(reason);
                None
            }
            (Self::Done(f), Signal::Fulfilled(values)) => {
                f(None, values);
                None
            }
            (Self::Done(f), Signal::Rejected(reason)) => {
                f(Some(reason), &[]);
                None
            }
            (Self::Listener(event, handler), signal) => {
                if event == signal.event() {
                    (*handler.borrow_mut())(signal.args());
                }
                Some(Self::Listener(event, handler))
            }
            (unmatched, _) => Some(unmatched),
        }
    }
}

/// A generic channel listener.
pub(crate) struct Listener {
    pub(crate) event: EventName,
    pub(crate) handler: Handler,
}

impl Promise {
    /// Call `handler` with the fulfillment values once fulfilled.
    pub fn success<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&[Value]) + 'static,
    {
        self.subscribe(Subscriber::Callback(Callback::Success(Box::new(handler))));
        self
    }

    /// Call `handler` with the rejection reason, exactly as given, once rejected.
    pub fn error<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(&Value) + 'static,
    {
        self.subscribe(Subscriber::Callback(Callback::Error(Box::new(handler))));
        self
    }

    /// Node-style callback: `(None, values)` on fulfillment,
    /// `(Some(reason), [])` on rejection. Invoked exactly once.
    pub fn done<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Option<&Value>, &[Value]) + 'static,
    {
        self.subscribe(Subscriber::Callback(Callback::Done(Box::new(handler))));
        self
    }

    /// Alias of [`Promise::done`].
    pub fn complete<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Option<&Value>, &[Value]) + 'static,
    {
        self.done(handler)
    }

    /// Listen for `event`.
    ///
    /// `success` and `error` listeners project the settlement (replayed if
    /// already settled) and also observe forwarded events. Any other event
    /// fires once per `emit`.
    pub fn on<F>(&self, event: impl Into<EventName>, handler: F) -> &Self
    where
        F: FnMut(&[Value]) + 'static,
    {
        let event = event.into();
        let handler: Handler = Rc::new(RefCell::new(handler));
        if event.is_settlement() {
            self.subscribe(Subscriber::Callback(Callback::Listener(event, handler)));
        } else {
            self.inner.borrow_mut().listeners.push(Listener { event, handler });
        }
        self
    }

    /// Emit `event` with `args`.
    ///
    /// `success` resolves this promise with `args` and `error` rejects it
    /// with the first argument; listeners then observe the settlement. Any
    /// other event is delivered to its listeners, and along proxy links, on
    /// a later tick.
    pub fn emit(&self, event: impl Into<EventName>, args: Vec<Value>) -> &Self {
        let event = event.into();
        match event {
            EventName::Success => self.resolver().resolve(Resolution::Values(args)),
            EventName::Error => self.resolver().reject(args.into_iter().next().unwrap_or_default()),
            _ => {
                let me = self.inner.clone();
                Scheduler::schedule(move || {
                    deliver_channel(&me, &event, &args);
                    proxy::forward_from(&me, &event, &args);
                });
            }
        }
        self
    }
}

/// Invoke every channel listener registered for `event`, in registration order.
///
/// Handlers run on a snapshot, so they may register further listeners.
pub(crate) fn deliver_channel(shared: &Shared, event: &EventName, args: &[Value]) {
    let handlers: Vec<Handler> = shared
        .borrow()
        .listeners
        .iter()
        .filter(|l| l.event == *event)
        .map(|l| l.handler.clone())
        .collect();
    for handler in handlers {
        (*handler.borrow_mut())(args);
    }
}
