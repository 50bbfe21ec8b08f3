//! Multi-value Fulfillment Protocol: combining several computations.
//!
//! [`Promise::all`] fulfills with one value per input, in input order, and
//! rejects with the first rejection observed. Consumers unwrap the result
//! positionally through `spread` or `done`.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use sequel_types::Value;

use crate::promise::{Promise, Subscriber};
use crate::state::{Outcome, Resolution, collapse};

impl Promise {
    /// Wait for every input, then fulfill with their values in order.
    ///
    /// Inputs may be plain values or promises. The first rejection wins;
    /// later outcomes are ignored but still count as handled. No inputs
    /// fulfill immediately with zero values.
    pub fn all<I>(inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Resolution>,
    {
        let inputs: Vec<Resolution> = inputs.into_iter().map(Into::into).collect();
        let (aggregate, resolver) = Promise::pending();
        let total = inputs.len();
        let slots: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(vec![None; total]));
        let remaining = Rc::new(Cell::new(total));

        let complete = {
            let slots = slots.clone();
            let resolver = resolver.clone();
            move || {
                let values: Vec<Value> = slots.borrow_mut().drain(..).map(Option::unwrap_or_default).collect();
                tracing::debug!(promise = %resolver.id(), inputs = values.len(), "Aggregate fulfilled");
                resolver.resolve(Resolution::Values(values));
            }
        };
        let complete = Rc::new(RefCell::new(Some(complete)));

        for (index, input) in inputs.into_iter().enumerate() {
            match input {
                Resolution::Values(values) => {
                    slots.borrow_mut()[index] = Some(collapse(&values));
                    remaining.set(remaining.get() - 1);
                }
                Resolution::Deferred(promise) => {
                    let slots = slots.clone();
                    let remaining = remaining.clone();
                    let complete = complete.clone();
                    let resolver = resolver.clone();
                    promise.subscribe(Subscriber::Continuation(Box::new(move |outcome| match outcome {
                        Outcome::Fulfilled(values) => {
                            slots.borrow_mut()[index] = Some(collapse(values));
                            remaining.set(remaining.get() - 1);
                            if remaining.get() == 0 {
                                if let Some(done) = complete.borrow_mut().take() {
                                    done();
                                }
                            }
                        }
                        Outcome::Rejected(reason) => {
                            tracing::debug!(promise = %resolver.id(), input = index, "Aggregate rejected");
                            resolver.reject(reason.clone());
                        }
                    })));
                }
            }
        }

        if remaining.get() == 0 {
            if let Some(done) = complete.borrow_mut().take() {
                done();
            }
        }
        aggregate
    }

    /// Two-input [`Promise::all`].
    pub fn join(a: impl Into<Resolution>, b: impl Into<Resolution>) -> Promise {
        Promise::all([a.into(), b.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scheduler, Status};
    use sequel_types::testing::Spy;

    fn run() {
        Scheduler::run_until_idle().unwrap();
    }

    #[test]
    fn plain_values_fulfill_in_order() {
        let p = Promise::all([Value::from("MyModel"), Value::Bool(true)]);
        run();
        assert_eq!(p.values(), Some(vec![Value::from("MyModel"), Value::Bool(true)]));
    }

    #[test]
    fn waits_for_all_inputs_and_keeps_input_order() {
        let (a, ra) = Promise::pending();
        let (b, rb) = Promise::pending();
        let all = Promise::all([&a, &b]);
        rb.resolve("second");
        run();
        assert!(all.is_pending());
        ra.resolve("first");
        run();
        assert_eq!(all.values(), Some(vec![Value::from("first"), Value::from("second")]));
    }

    #[test]
    fn first_rejection_wins_without_waiting() {
        let (a, _ra) = Promise::pending();
        let (b, rb) = Promise::pending();
        let err = Value::error("b failed");
        let all = Promise::all([&a, &b]);
        all.catch(|_| Ok(()));
        rb.reject(err.clone());
        run();
        assert_eq!(all.status(), Status::Rejected);
        assert!(all.reason().unwrap().same_instance(&err));
        assert!(a.is_pending());
    }

    #[test]
    fn losing_rejections_are_not_unhandled() {
        let all = Promise::all([
            Promise::rejected(Value::error("one")),
            Promise::rejected(Value::error("two")),
        ]);
        all.catch(|_| Ok(()));
        run();
        assert!(Scheduler::take_unhandled_rejections().is_empty());
    }

    #[test]
    fn empty_input_fulfills_with_no_values() {
        let p = Promise::all(Vec::<Value>::new());
        run();
        assert_eq!(p.values(), Some(vec![]));
    }

    #[test]
    fn multi_value_input_collapses_to_one_slot() {
        let p = Promise::join(Promise::resolved(("a", "b")), "c");
        run();
        assert_eq!(
            p.values(),
            Some(vec![Value::List(vec![Value::from("a"), Value::from("b")]), Value::from("c")])
        );
    }

    #[test]
    fn spread_and_done_agree() {
        let spread = Spy::new();
        let done = Spy::new();
        let p = Promise::resolved(Promise::all([Value::from("MyModel"), Value::Bool(true)]));
        let s = spread.clone();
        p.spread(move |args| {
            s.record(&args);
            Ok(())
        });
        p.done(done.done_handler());
        run();
        assert_eq!(spread.first_call().unwrap(), vec![Value::from("MyModel"), Value::Bool(true)]);
        assert_eq!(
            done.first_call().unwrap(),
            vec![Value::Null, Value::from("MyModel"), Value::Bool(true)]
        );
    }
}
