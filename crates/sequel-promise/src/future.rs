//! Bridging to Rust's `async`/`.await`.
//!
//! Polling drives the current thread's tick queue first, so awaiting from a
//! current-thread runtime makes progress without a separate driver, and
//! events queued before settlement have reached their listeners when the
//! value comes back. A promise still pending after the queue drains parks
//! the task until settlement wakes it.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use sequel_types::{Result, SequelError, Value};

use crate::promise::Promise;
use crate::scheduler::Scheduler;
use crate::state::Outcome;

impl Future for Promise {
    type Output = std::result::Result<Vec<Value>, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Err(err) = Scheduler::run_until_idle() {
            tracing::warn!(promise = %self.id(), error = %err, "Scheduler run interrupted while polling");
        }
        match self.outcome() {
            Some(outcome) => {
                self.mark_observed();
                Poll::Ready(outcome.into_result())
            }
            None => {
                self.register_waker(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl Promise {
    /// Drain the tick queue, then report this promise's outcome.
    ///
    /// The queue is drained even when the promise already settled, so
    /// every queued event and dispatch has run on return. Waiting counts as
    /// handling a rejection.
    ///
    /// # Errors
    /// - [`SequelError::Stalled`] if the queue drains while still pending
    /// - [`SequelError::TickBudgetExhausted`] if the run hits its budget
    pub fn wait(&self) -> Result<Outcome> {
        self.mark_observed();
        Scheduler::run_until_idle()?;
        self.outcome().ok_or_else(|| SequelError::Stalled(self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;

    #[test]
    fn wait_drives_queue() {
        let p = Promise::resolved("abc").then(|v| Ok(format!("{v}!")));
        let outcome = p.wait().unwrap();
        assert_eq!(outcome, Outcome::Fulfilled(vec![Value::from("abc!")]));
    }

    #[test]
    fn wait_on_settled_promise_runs_queued_events() {
        let spy = sequel_types::testing::Spy::new();
        let p = Promise::new(|r| {
            r.emit("sql", vec![Value::from("SELECT 1")]);
            r.resolve("done");
            Ok(())
        });
        p.on("sql", spy.handler());
        p.success(spy.handler());
        assert!(matches!(p.wait().unwrap(), Outcome::Fulfilled(_)));
        assert_eq!(spy.call_count(), 2);
    }

    #[test]
    fn wait_on_never_settled_promise_stalls() {
        let (p, _r) = Promise::pending();
        let err = p.wait().unwrap_err();
        assert!(matches!(err, SequelError::Stalled(id) if id == p.id()));
        assert_eq!(p.status(), Status::Pending);
    }

    #[test]
    fn wait_handles_rejection() {
        let p = Promise::rejected(Value::error("no"));
        assert!(matches!(p.wait().unwrap(), Outcome::Rejected(_)));
        Scheduler::run_until_idle().unwrap();
        assert!(Scheduler::take_unhandled_rejections().is_empty());
    }

    #[tokio::test]
    async fn await_fulfilled_chain() {
        let values = Promise::resolved(1_i64)
            .then(|v| Ok(Value::Int(v.as_int().unwrap_or_default() + 1)))
            .await
            .unwrap();
        assert_eq!(values, vec![Value::Int(2)]);
    }

    #[tokio::test]
    async fn await_rejection() {
        let err = Value::error("nope");
        let reason = Promise::rejected(err.clone()).await.unwrap_err();
        assert!(reason.same_instance(&err));
    }

    #[tokio::test]
    async fn await_settled_promise_delivers_callbacks_first() {
        let spy = sequel_types::testing::Spy::new();
        let p = Promise::resolved("now");
        p.success(spy.handler());
        let values = p.clone().await.unwrap();
        assert_eq!(values, vec![Value::from("now")]);
        assert!(spy.called_once());
    }

    #[tokio::test]
    async fn await_wakes_on_later_settlement() {
        let (p, r) = Promise::pending();
        let local = tokio::task::LocalSet::new();
        let values = local
            .run_until(async move {
                tokio::task::spawn_local(async move {
                    tokio::task::yield_now().await;
                    r.resolve(("late", 2_i64));
                });
                p.await
            })
            .await
            .unwrap();
        assert_eq!(values, vec![Value::from("late"), Value::Int(2)]);
    }
}
