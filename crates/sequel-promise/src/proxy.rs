//! Proxy Forwarder.
//!
//! `target.proxy(&source)` registers a [`ProxyLink`] on the source: "when
//! you emit X, also emit X on the target". The link holds the target
//! weakly, so forwarding never keeps a target alive, and it lives exactly
//! as long as the source does.
//!
//! Forwarded `success`/`error` reach the target's legacy callbacks and
//! listeners only. The target's own settlement, and thus its `then` chain,
//! is driven solely by whoever resolves the target.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use sequel_types::{EventName, PromiseId, ProxyOptions, Value};

use crate::compat::{Signal, deliver_channel};
use crate::promise::{Inner, Promise, Shared, Subscriber};
use crate::scheduler::Scheduler;
use crate::state::Outcome;

/// A forwarding registration held by the source.
pub(crate) struct ProxyLink {
    target: Weak<RefCell<Inner>>,
    options: ProxyOptions,
}

impl Promise {
    /// Re-emit every event `source` emits on `self`, settlement-linked or
    /// generic.
    ///
    /// Each call adds an independent link; proxying the same source twice
    /// delivers every event twice.
    pub fn proxy(&self, source: &Promise) -> &Self {
        self.proxy_with(source, ProxyOptions::default())
    }

    /// [`Promise::proxy`] restricted to the events selected by `options`.
    ///
    /// If the source already dispatched its settlement and that event is
    /// selected, it is forwarded on the next tick. A settlement still
    /// waiting for dispatch travels over the new link with the dispatch.
    pub fn proxy_with(&self, source: &Promise, options: ProxyOptions) -> &Self {
        if self.ptr_eq(source) {
            return self;
        }
        let (source_id, replay) = {
            let inner = source.inner.borrow();
            let replay = inner
                .outcome
                .as_ref()
                .filter(|_| inner.dispatched)
                .map(settlement_event)
                .filter(|(event, _)| options.forwards(event));
            (inner.id, replay)
        };
        tracing::trace!(source = %source_id, target = %self.id(), "Proxy link registered");
        source.inner.borrow_mut().links.push(ProxyLink {
            target: Rc::downgrade(&self.inner),
            options,
        });
        if let Some((event, args)) = replay {
            let target = self.inner.clone();
            Scheduler::schedule(move || receive(&target, &event, &args, &mut vec![source_id]));
        }
        self
    }
}

/// The event a settlement is re-emitted as.
pub(crate) fn settlement_event(outcome: &Outcome) -> (EventName, Vec<Value>) {
    match outcome {
        Outcome::Fulfilled(values) => (EventName::Success, values.clone()),
        Outcome::Rejected(reason) => (EventName::Error, vec![reason.clone()]),
    }
}

/// Whether a live link will carry this instance's rejection elsewhere.
pub(crate) fn forwards_rejection(links: &[ProxyLink]) -> bool {
    links
        .iter()
        .any(|link| link.target.strong_count() > 0 && link.options.forwards(&EventName::Error))
}

/// Forward an event the source itself emitted.
pub(crate) fn forward_from(source: &Shared, event: &EventName, args: &[Value]) {
    let mut path = vec![source.borrow().id];
    forward(source, event, args, &mut path);
}

fn forward(source: &Shared, event: &EventName, args: &[Value], path: &mut Vec<PromiseId>) {
    let targets: Vec<Shared> = {
        let mut inner = source.borrow_mut();
        inner.links.retain(|link| link.target.strong_count() > 0);
        inner
            .links
            .iter()
            .filter(|link| link.options.forwards(event))
            .filter_map(|link| link.target.upgrade())
            .collect()
    };
    for target in targets {
        receive(&target, event, args, path);
    }
}

/// Deliver a forwarded event to `target`, then pass it along the target's
/// own links. `path` holds the instances the event already went through.
fn receive(target: &Shared, event: &EventName, args: &[Value], path: &mut Vec<PromiseId>) {
    let id = target.borrow().id;
    if path.contains(&id) {
        tracing::trace!(promise = %id, event = %event, "Forwarding cycle cut");
        return;
    }
    tracing::trace!(promise = %id, event = %event, hops = path.len(), "Forwarded event received");

    match Signal::from_event(event, args) {
        Some(signal) => deliver_callbacks(target, signal),
        None => deliver_channel(target, event, args),
    }

    path.push(id);
    forward(target, event, args, path);
    path.pop();
}

/// Run the target's legacy callbacks against a forwarded settlement signal.
/// Chain continuations are left untouched.
fn deliver_callbacks(target: &Shared, signal: Signal<'_>) {
    let subscribers = std::mem::take(&mut target.borrow_mut().subscribers);
    let mut kept = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers {
        match subscriber {
            Subscriber::Callback(cb) => {
                if let Some(cb) = cb.deliver(signal) {
                    kept.push(Subscriber::Callback(cb));
                }
            }
            continuation @ Subscriber::Continuation(_) => kept.push(continuation),
        }
    }
    let mut inner = target.borrow_mut();
    kept.append(&mut inner.subscribers);
    inner.subscribers = kept;
}
