//! Cooperative single-thread tick queue.
//!
//! Every continuation, callback and event delivery runs as a task on this
//! queue, never inline inside `resolve`, `reject` or `emit`. The queue is
//! per thread: promises are `!Send` and live on the thread that made them.
//!
//! Nothing runs until someone drives the queue, via
//! [`Scheduler::run_until_idle`], [`Promise::wait`](crate::Promise::wait)
//! or by awaiting a promise.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use chrono::{DateTime, Utc};
use sequel_types::{PromiseId, Result, SchedulerConfig, SequelError, UnhandledRejectionPolicy, Value};

type Task = Box<dyn FnOnce()>;

/// A rejection that reached the end of its check tick without any observer.
#[derive(Debug, Clone)]
pub struct UnhandledRejection {
    pub promise: PromiseId,
    pub reason: Value,
    pub detected_at: DateTime<Utc>,
}

struct TickQueue {
    tasks: RefCell<VecDeque<Task>>,
    config: RefCell<SchedulerConfig>,
    running: Cell<bool>,
    unhandled: RefCell<Vec<UnhandledRejection>>,
}

thread_local! {
    static QUEUE: TickQueue = TickQueue {
        tasks: RefCell::new(VecDeque::new()),
        config: RefCell::new(SchedulerConfig::default()),
        running: Cell::new(false),
        unhandled: RefCell::new(Vec::new()),
    };
}

/// Clears the re-entrancy flag even if a task panics.
struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Handle to the current thread's tick queue.
pub struct Scheduler;

impl Scheduler {
    /// Replace the current thread's configuration.
    pub fn configure(config: SchedulerConfig) {
        QUEUE.with(|q| *q.config.borrow_mut() = config);
    }

    #[must_use]
    pub fn config() -> SchedulerConfig {
        QUEUE.with(|q| q.config.borrow().clone())
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending() -> usize {
        QUEUE.with(|q| q.tasks.borrow().len())
    }

    /// Run queued tasks, including tasks they queue, until the queue is empty.
    ///
    /// Returns the number of tasks executed. Called from inside a task it
    /// returns `Ok(0)` immediately: the outer run picks up the work.
    ///
    /// # Errors
    /// [`SequelError::TickBudgetExhausted`] if more than
    /// `max_ticks_per_run` tasks ran; the rest stay queued.
    pub fn run_until_idle() -> Result<usize> {
        QUEUE.with(|q| {
            if q.running.replace(true) {
                return Ok(0);
            }
            let _guard = RunGuard(&q.running);
            let budget = q.config.borrow().max_ticks_per_run;
            let mut ran = 0;
            loop {
                let Some(task) = q.tasks.borrow_mut().pop_front() else {
                    break;
                };
                if ran >= budget {
                    q.tasks.borrow_mut().push_front(task);
                    tracing::warn!(budget, queued = q.tasks.borrow().len(), "Tick budget exhausted");
                    return Err(SequelError::TickBudgetExhausted { budget });
                }
                task();
                ran += 1;
            }
            tracing::trace!(ran, "Scheduler idle");
            Ok(ran)
        })
    }

    /// Drain the rejections reported as unhandled so far.
    #[must_use]
    pub fn take_unhandled_rejections() -> Vec<UnhandledRejection> {
        QUEUE.with(|q| std::mem::take(&mut *q.unhandled.borrow_mut()))
    }

    /// Queue `task` behind everything already scheduled on this thread.
    pub fn schedule(task: impl FnOnce() + 'static) {
        QUEUE.with(|q| q.tasks.borrow_mut().push_back(Box::new(task)));
    }

    pub(crate) fn report_unhandled(promise: PromiseId, reason: Value) {
        QUEUE.with(|q| {
            let policy = q.config.borrow().unhandled_rejections;
            if policy == UnhandledRejectionPolicy::Ignore {
                return;
            }
            if policy == UnhandledRejectionPolicy::Warn {
                tracing::warn!(promise = %promise, reason = %reason, "Unhandled rejection");
            }
            q.unhandled.borrow_mut().push(UnhandledRejection {
                promise,
                reason,
                detected_at: Utc::now(),
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn runs_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            Scheduler::schedule(move || log.borrow_mut().push(i));
        }
        assert_eq!(Scheduler::pending(), 3);
        assert_eq!(Scheduler::run_until_idle().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(Scheduler::pending(), 0);
    }

    #[test]
    fn tasks_scheduled_by_tasks_run_later() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = log.clone();
        Scheduler::schedule(move || {
            let l2 = l1.clone();
            Scheduler::schedule(move || l2.borrow_mut().push("inner"));
            l1.borrow_mut().push("outer");
        });
        let l3 = log.clone();
        Scheduler::schedule(move || l3.borrow_mut().push("second"));
        Scheduler::run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["outer", "second", "inner"]);
    }

    #[test]
    fn nested_run_is_a_noop() {
        let nested = Rc::new(Cell::new(None));
        let n = nested.clone();
        Scheduler::schedule(move || n.set(Some(Scheduler::run_until_idle().unwrap())));
        Scheduler::schedule(|| {});
        assert_eq!(Scheduler::run_until_idle().unwrap(), 2);
        assert_eq!(nested.get(), Some(0));
    }

    #[test]
    fn budget_exhaustion_keeps_remaining_tasks() {
        Scheduler::configure(SchedulerConfig {
            max_ticks_per_run: 2,
            ..SchedulerConfig::default()
        });
        for _ in 0..3 {
            Scheduler::schedule(|| {});
        }
        let err = Scheduler::run_until_idle().unwrap_err();
        assert!(matches!(err, SequelError::TickBudgetExhausted { budget: 2 }));
        assert_eq!(Scheduler::pending(), 1);
        assert_eq!(Scheduler::run_until_idle().unwrap(), 1);
    }

    #[test]
    fn unhandled_policy_record_and_ignore() {
        Scheduler::configure(SchedulerConfig {
            unhandled_rejections: UnhandledRejectionPolicy::Record,
            ..SchedulerConfig::default()
        });
        Scheduler::report_unhandled(PromiseId::new(), Value::error("lost"));
        assert_eq!(Scheduler::take_unhandled_rejections().len(), 1);
        assert!(Scheduler::take_unhandled_rejections().is_empty());

        Scheduler::configure(SchedulerConfig {
            unhandled_rejections: UnhandledRejectionPolicy::Ignore,
            ..SchedulerConfig::default()
        });
        Scheduler::report_unhandled(PromiseId::new(), Value::error("lost"));
        assert!(Scheduler::take_unhandled_rejections().is_empty());
    }
}
