//! Settlement Core.
//!
//! A [`Promise`] owns one [`Inner`] cell holding the state machine, the
//! settlement-linked subscriber list, the generic event listeners and the
//! outgoing proxy links. Producers settle it through a [`Resolver`];
//! consumers register continuations with `then`, `catch`, `spread` and the
//! legacy surface in [`crate::compat`].
//!
//! Settlement only records the outcome and queues a dispatch task, so a
//! producer calling `resolve` is never re-entered by a consumer.

use std::{cell::RefCell, fmt, rc::Rc, task::Waker};

use sequel_types::{EventName, PromiseId, SequelError, Value};

use crate::compat::{Callback, Listener, Signal};
use crate::proxy::{self, ProxyLink};
use crate::scheduler::Scheduler;
use crate::state::{Outcome, Resolution, Status, collapse};

type Continuation = Box<dyn FnOnce(&Outcome)>;
type OnFulfilled = Box<dyn FnOnce(&[Value]) -> Result<Resolution, Value>>;
type OnRejected = Box<dyn FnOnce(Value) -> Result<Resolution, Value>>;

/// An observer of the single settlement transition.
pub(crate) enum Subscriber {
    /// Chain continuation (`then` family, flattening, aggregation).
    Continuation(Continuation),
    /// Legacy callback or settlement-linked event listener.
    Callback(Callback),
}

impl Subscriber {
    /// Whether attaching this subscriber counts as handling a rejection.
    fn observes_rejection(&self) -> bool {
        match self {
            Self::Continuation(_) => true,
            Self::Callback(cb) => cb.observes_rejection(),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) id: PromiseId,
    pub(crate) outcome: Option<Outcome>,
    /// Resolved with a pending promise; further resolve calls are ignored.
    locked: bool,
    /// Some observer of rejections has been attached at some point.
    observed: bool,
    /// The settlement has been handed to the subscriber list.
    pub(crate) dispatched: bool,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) links: Vec<ProxyLink>,
    wakers: Vec<Waker>,
}

pub(crate) type Shared = Rc<RefCell<Inner>>;

/// Dual-interface asynchronous result.
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Promise {
    pub(crate) inner: Shared,
}

/// Producer-side handle that settles one promise.
#[derive(Clone)]
pub struct Resolver {
    inner: Shared,
}

impl Promise {
    /// Create a promise and run `setup` synchronously.
    ///
    /// An `Err` returned by `setup` becomes the rejection reason, unless
    /// `setup` already settled the promise.
    pub fn new<F>(setup: F) -> Self
    where
        F: FnOnce(Resolver) -> Result<(), Value>,
    {
        let (promise, resolver) = Self::pending();
        if let Err(reason) = setup(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// A pending promise plus the resolver that settles it.
    #[must_use]
    pub fn pending() -> (Self, Resolver) {
        let inner = Rc::new(RefCell::new(Inner {
            id: PromiseId::new(),
            outcome: None,
            locked: false,
            observed: false,
            dispatched: false,
            subscribers: Vec::new(),
            listeners: Vec::new(),
            links: Vec::new(),
            wakers: Vec::new(),
        }));
        let resolver = Resolver { inner: inner.clone() };
        (Self { inner }, resolver)
    }

    /// A promise resolved with `resolution`.
    pub fn resolved(resolution: impl Into<Resolution>) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.resolve(resolution);
        promise
    }

    /// A promise rejected with `reason`.
    pub fn rejected(reason: impl Into<Value>) -> Self {
        let (promise, resolver) = Self::pending();
        resolver.reject(reason);
        promise
    }

    // -----------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.inner
            .borrow()
            .outcome
            .as_ref()
            .map_or(Status::Pending, Outcome::status)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.borrow().outcome.clone()
    }

    /// Fulfillment values, if fulfilled.
    #[must_use]
    pub fn values(&self) -> Option<Vec<Value>> {
        match self.outcome()? {
            Outcome::Fulfilled(values) => Some(values),
            Outcome::Rejected(_) => None,
        }
    }

    /// Rejection reason, if rejected.
    #[must_use]
    pub fn reason(&self) -> Option<Value> {
        match self.outcome()? {
            Outcome::Rejected(reason) => Some(reason),
            Outcome::Fulfilled(_) => None,
        }
    }

    /// Whether both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------
    // Chaining
    // -----------------------------------------------------------------

    /// Continue with the collapsed fulfillment value.
    ///
    /// Rejections pass through to the derived promise unchanged.
    pub fn then<F, R>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<R, Value> + 'static,
        R: Into<Resolution>,
    {
        self.chain(
            Some(Box::new(move |values| on_fulfilled(collapse(values)).map(Into::into))),
            None,
        )
    }

    /// Handle a rejection; fulfillments pass through unchanged.
    pub fn catch<G, R>(&self, on_rejected: G) -> Promise
    where
        G: FnOnce(Value) -> Result<R, Value> + 'static,
        R: Into<Resolution>,
    {
        self.chain(None, Some(Box::new(move |reason| on_rejected(reason).map(Into::into))))
    }

    /// `then` with both a fulfillment and a rejection handler.
    pub fn then_or_else<F, G, R, S>(&self, on_fulfilled: F, on_rejected: G) -> Promise
    where
        F: FnOnce(Value) -> Result<R, Value> + 'static,
        G: FnOnce(Value) -> Result<S, Value> + 'static,
        R: Into<Resolution>,
        S: Into<Resolution>,
    {
        self.chain(
            Some(Box::new(move |values| on_fulfilled(collapse(values)).map(Into::into))),
            Some(Box::new(move |reason| on_rejected(reason).map(Into::into))),
        )
    }

    /// Continue with every fulfillment value as a positional argument.
    ///
    /// A fulfillment consisting of one `List` is spread as well, mirroring
    /// how `then` collapses many values into one list.
    pub fn spread<F, R>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Vec<Value>) -> Result<R, Value> + 'static,
        R: Into<Resolution>,
    {
        self.chain(
            Some(Box::new(move |values| {
                let args = match values {
                    [Value::List(items)] => items.clone(),
                    other => other.to_vec(),
                };
                on_fulfilled(args).map(Into::into)
            })),
            None,
        )
    }

    fn chain(&self, on_fulfilled: Option<OnFulfilled>, on_rejected: Option<OnRejected>) -> Promise {
        let (derived, resolver) = Promise::pending();
        tracing::trace!(source = %self.id(), derived = %derived.id(), "Continuation registered");
        self.subscribe(Subscriber::Continuation(Box::new(move |outcome| {
            let result = match outcome {
                Outcome::Fulfilled(values) => match on_fulfilled {
                    Some(f) => f(values),
                    None => Ok(Resolution::Values(values.clone())),
                },
                Outcome::Rejected(reason) => match on_rejected {
                    Some(g) => g(reason.clone()),
                    None => Err(reason.clone()),
                },
            };
            match result {
                Ok(resolution) => resolver.resolve(resolution),
                Err(reason) => resolver.reject(reason),
            }
        })));
        derived
    }

    // -----------------------------------------------------------------
    // Subscription plumbing
    // -----------------------------------------------------------------

    /// Attach a settlement-linked subscriber.
    ///
    /// Before settlement it joins the list in registration order. A
    /// callback added between settlement and dispatch also joins the list,
    /// so the pending dispatch delivers it exactly once. Otherwise a settled
    /// promise replays on the next tick; persistent listeners are also kept
    /// for later forwarded events.
    pub(crate) fn subscribe(&self, subscriber: Subscriber) {
        let mut inner = self.inner.borrow_mut();
        if subscriber.observes_rejection() {
            inner.observed = true;
        }
        let Some(outcome) = inner.outcome.clone() else {
            inner.subscribers.push(subscriber);
            return;
        };
        match subscriber {
            Subscriber::Continuation(f) => {
                drop(inner);
                Scheduler::schedule(move || f(&outcome));
            }
            Subscriber::Callback(cb) if !inner.dispatched => {
                inner.subscribers.push(Subscriber::Callback(cb));
            }
            Subscriber::Callback(cb) => {
                if let Some(kept) = cb.persistent_clone() {
                    inner.subscribers.push(Subscriber::Callback(kept));
                }
                drop(inner);
                Scheduler::schedule(move || {
                    let _ = cb.deliver(Signal::from(&outcome));
                });
            }
        }
    }

    /// Count this promise as observed for unhandled-rejection purposes.
    pub(crate) fn mark_observed(&self) {
        self.inner.borrow_mut().observed = true;
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        let mut inner = self.inner.borrow_mut();
        inner.observed = true;
        if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
            inner.wakers.push(waker.clone());
        }
    }

    pub(crate) fn resolver(&self) -> Resolver {
        Resolver { inner: self.inner.clone() }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("id", &inner.id)
            .field("outcome", &inner.outcome)
            .field("subscribers", &inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Resolver: the producer entry points
// ---------------------------------------------------------------------------

impl Resolver {
    #[must_use]
    pub fn id(&self) -> PromiseId {
        self.inner.borrow().id
    }

    /// Fulfill, or adopt a pending promise. Ignored once settled or locked.
    pub fn resolve(&self, resolution: impl Into<Resolution>) {
        {
            let inner = self.inner.borrow();
            if inner.outcome.is_some() || inner.locked {
                tracing::trace!(promise = %inner.id, "Resolve ignored: already settled");
                return;
            }
        }
        match resolution.into() {
            Resolution::Values(values) => {
                settle(&self.inner, Outcome::Fulfilled(values));
            }
            Resolution::Deferred(other) => {
                if Rc::ptr_eq(&other.inner, &self.inner) {
                    let id = self.id();
                    settle(&self.inner, Outcome::Rejected(SequelError::SelfResolution(id).into()));
                    return;
                }
                self.inner.borrow_mut().locked = true;
                let me = self.inner.clone();
                other.subscribe(Subscriber::Continuation(Box::new(move |outcome| {
                    settle(&me, outcome.clone());
                })));
            }
        }
    }

    /// Reject with `reason`. Ignored once settled or locked.
    pub fn reject(&self, reason: impl Into<Value>) {
        {
            let inner = self.inner.borrow();
            if inner.outcome.is_some() || inner.locked {
                tracing::trace!(promise = %inner.id, "Reject ignored: already settled");
                return;
            }
        }
        settle(&self.inner, Outcome::Rejected(reason.into()));
    }

    /// Emit an event on the promise this resolver settles.
    pub fn emit(&self, event: impl Into<EventName>, args: Vec<Value>) {
        Promise { inner: self.inner.clone() }.emit(event, args);
    }
}

/// The one transition out of Pending. Returns `false` if already settled.
fn settle(shared: &Shared, outcome: Outcome) -> bool {
    let wakers = {
        let mut inner = shared.borrow_mut();
        if inner.outcome.is_some() {
            return false;
        }
        tracing::debug!(promise = %inner.id, status = %outcome.status(), "Promise settled");
        inner.outcome = Some(outcome);
        std::mem::take(&mut inner.wakers)
    };
    for waker in wakers {
        waker.wake();
    }
    let me = shared.clone();
    Scheduler::schedule(move || dispatch_settlement(&me));
    true
}

/// Deliver the settlement to every subscriber in registration order, then
/// forward it along proxy links.
fn dispatch_settlement(shared: &Shared) {
    let (id, outcome, subscribers, observed) = {
        let mut inner = shared.borrow_mut();
        let Some(outcome) = inner.outcome.clone() else {
            return;
        };
        let observed = inner.observed || proxy::forwards_rejection(&inner.links);
        inner.dispatched = true;
        (inner.id, outcome, std::mem::take(&mut inner.subscribers), observed)
    };
    tracing::trace!(promise = %id, subscribers = subscribers.len(), "Dispatching settlement");

    let mut kept = Vec::new();
    for subscriber in subscribers {
        match subscriber {
            Subscriber::Continuation(f) => f(&outcome),
            Subscriber::Callback(cb) => {
                if let Some(cb) = cb.deliver(Signal::from(&outcome)) {
                    kept.push(Subscriber::Callback(cb));
                }
            }
        }
    }
    {
        let mut inner = shared.borrow_mut();
        kept.append(&mut inner.subscribers);
        inner.subscribers = kept;
    }

    let (event, args) = proxy::settlement_event(&outcome);
    proxy::forward_from(shared, &event, &args);

    if let Outcome::Rejected(reason) = outcome {
        if !observed {
            let me = shared.clone();
            Scheduler::schedule(move || {
                let inner = me.borrow();
                if !inner.observed {
                    Scheduler::report_unhandled(inner.id, reason);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn run() {
        Scheduler::run_until_idle().unwrap();
    }

    #[test]
    fn first_resolution_wins() {
        let (p, r) = Promise::pending();
        r.resolve("first");
        r.resolve("second");
        r.reject(Value::error("late"));
        assert_eq!(p.values(), Some(vec![Value::from("first")]));
        run();
        assert_eq!(p.values(), Some(vec![Value::from("first")]));
        assert!(p.reason().is_none());
    }

    #[test]
    fn first_rejection_wins() {
        let err = Value::error("no");
        let (p, r) = Promise::pending();
        r.reject(err.clone());
        r.resolve("yes");
        assert_eq!(p.status(), Status::Rejected);
        assert!(p.reason().unwrap().same_instance(&err));
        p.catch(|_| Ok(())).wait().unwrap();
    }

    #[test]
    fn setup_error_becomes_rejection() {
        let p = Promise::new(|_| Err(Value::error("no")));
        assert_eq!(p.status(), Status::Rejected);
        p.catch(|_| Ok(()));
        run();
    }

    #[test]
    fn setup_error_after_resolve_is_ignored() {
        let p = Promise::new(|r| {
            r.resolve("ok");
            Err(Value::error("late"))
        });
        assert_eq!(p.values(), Some(vec![Value::from("ok")]));
    }

    #[test]
    fn handlers_never_run_inside_resolve() {
        let (p, r) = Promise::pending();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        p.then(move |_| {
            f.set(true);
            Ok(())
        });
        r.resolve("x");
        assert!(!fired.get());
        run();
        assert!(fired.get());
    }

    #[test]
    fn continuations_fire_in_registration_order() {
        let p = Promise::resolved(1_i64);
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            p.then(move |_| {
                order.borrow_mut().push(i);
                Ok(())
            });
        }
        run();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn then_transforms_value() {
        let p = Promise::resolved("Heyo").then(|v| Ok(format!("{v}123")));
        run();
        assert_eq!(p.values(), Some(vec![Value::from("Heyo123")]));
    }

    #[test]
    fn continuation_fault_rejects_derived_only() {
        let source = Promise::resolved("fine");
        let derived = source.then(|_| Err::<Value, _>(Value::error("handler failed")));
        derived.catch(|_| Ok(()));
        run();
        assert_eq!(source.status(), Status::Fulfilled);
        assert_eq!(derived.status(), Status::Rejected);
    }

    #[test]
    fn rejection_passes_through_then() {
        let err = Value::error("no");
        let p = Promise::rejected(err.clone()).then(|_| Ok("unreachable"));
        let caught = p.catch(|reason| Ok(reason));
        run();
        assert!(caught.values().unwrap()[0].same_instance(&err));
    }

    #[test]
    fn catch_recovers() {
        let p = Promise::rejected(Value::error("no")).catch(|_| Ok("recovered"));
        run();
        assert_eq!(p.values(), Some(vec![Value::from("recovered")]));
    }

    #[test]
    fn then_or_else_routes_by_outcome() {
        let ok = Promise::resolved(1_i64).then_or_else(|_| Ok("ok"), |_| Ok("err"));
        let bad = Promise::rejected(Value::Null).then_or_else(|_| Ok("ok"), |_| Ok("err"));
        run();
        assert_eq!(ok.values(), Some(vec![Value::from("ok")]));
        assert_eq!(bad.values(), Some(vec![Value::from("err")]));
    }

    #[test]
    fn resolving_with_pending_promise_follows_it() {
        let (inner, inner_r) = Promise::pending();
        let (outer, outer_r) = Promise::pending();
        outer_r.resolve(&inner);
        outer_r.resolve("ignored while locked");
        run();
        assert!(outer.is_pending());
        inner_r.resolve("adopted");
        run();
        assert_eq!(outer.values(), Some(vec![Value::from("adopted")]));
    }

    #[test]
    fn followed_rejection_is_adopted() {
        let err = Value::error("inner failure");
        let outer = Promise::resolved(Promise::rejected(err.clone()));
        outer.catch(|_| Ok(()));
        run();
        assert!(outer.reason().unwrap().same_instance(&err));
    }

    #[test]
    fn continuation_may_return_promise() {
        let p = Promise::resolved(1_i64).then(|_| Ok(Promise::resolved("nested")));
        run();
        assert_eq!(p.values(), Some(vec![Value::from("nested")]));
    }

    #[test]
    fn self_resolution_rejects() {
        let (p, r) = Promise::pending();
        r.resolve(&p);
        let reason = p.reason().unwrap();
        assert!(matches!(reason.as_error(), Some(SequelError::SelfResolution(_))));
        p.catch(|_| Ok(()));
        run();
    }

    #[test]
    fn list_fulfillment_is_single_value() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        Promise::resolved(list.clone()).then(move |v| {
            *s.borrow_mut() = Some(v);
            Ok(())
        });
        run();
        assert_eq!(seen.borrow().clone(), Some(list));
    }

    #[test]
    fn spread_passes_positional_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        Promise::resolved(("MyModel", true)).spread(move |args| {
            *s.borrow_mut() = args;
            Ok(())
        });
        run();
        assert_eq!(*seen.borrow(), vec![Value::from("MyModel"), Value::Bool(true)]);
    }

    #[test]
    fn then_collapses_multi_value() {
        let p = Promise::resolved(("a", "b")).then(Ok);
        run();
        assert_eq!(
            p.values(),
            Some(vec![Value::List(vec![Value::from("a"), Value::from("b")])])
        );
    }

    #[test]
    fn unhandled_rejection_is_detectable() {
        let p = Promise::rejected(Value::error("nobody listens"));
        run();
        let reports = Scheduler::take_unhandled_rejections();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].promise, p.id());
    }

    #[test]
    fn late_handler_in_same_run_counts_as_handled() {
        let p = Promise::rejected(Value::error("late"));
        let p2 = p.clone();
        Scheduler::schedule(move || {
            p2.catch(|_| Ok(()));
        });
        run();
        assert!(Scheduler::take_unhandled_rejections().is_empty());
    }

    #[test]
    fn handled_rejection_is_not_reported() {
        Promise::rejected(Value::error("seen")).catch(|_| Ok(()));
        run();
        assert!(Scheduler::take_unhandled_rejections().is_empty());
    }
}
