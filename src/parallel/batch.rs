//! Fire-all task batch
//!
//! Every scheduled task runs to completion, even after another task has
//! failed. `join` waits for all of them and only then reports the first
//! failure by scheduling order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::controlflow::ExecutionFailure;

type Task<'env, T> = Box<dyn FnOnce() -> Result<T, ExecutionFailure> + Send + 'env>;
type Outcome<T> = Mutex<Option<Result<T, ExecutionFailure>>>;

/// A set of independent tasks joined as one unit
pub struct TaskBatch<'env, T> {
    workers: usize,
    names: Vec<String>,
    tasks: Vec<Task<'env, T>>,
}

impl<'env, T: Send> TaskBatch<'env, T> {
    /// `workers` is clamped to at least one
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            names: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn schedule<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce() -> Result<T, ExecutionFailure> + Send + 'env,
    {
        self.names.push(name.into());
        self.tasks.push(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task and returns their results in scheduling order, or the
    /// failure of the earliest-scheduled task that failed.
    ///
    /// A panicking task counts as a failure of that task.
    pub fn join(self) -> Result<Vec<T>, ExecutionFailure> {
        let count = self.tasks.len();
        let outcomes: Vec<Outcome<T>> = (0..count).map(|_| Mutex::new(None)).collect();

        if self.workers == 1 || count <= 1 {
            for (index, task) in self.tasks.into_iter().enumerate() {
                *outcomes[index].lock() = Some(run_task(&self.names[index], task));
            }
        } else {
            let pending: Vec<Mutex<Option<Task<'env, T>>>> =
                self.tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();
            let next = AtomicUsize::new(0);
            let names = &self.names;

            thread::scope(|scope| {
                for _ in 0..self.workers.min(count) {
                    scope.spawn(|| loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        if index >= count {
                            break;
                        }
                        if let Some(task) = pending[index].lock().take() {
                            *outcomes[index].lock() = Some(run_task(&names[index], task));
                        }
                    });
                }
            });
        }

        let mut results = Vec::with_capacity(count);
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome.into_inner() {
                Some(Ok(value)) => results.push(value),
                Some(Err(failure)) => return Err(failure),
                None => {
                    return Err(ExecutionFailure::new(
                        self.names[index].clone(),
                        "task did not run",
                    ))
                }
            }
        }
        Ok(results)
    }
}

fn run_task<T>(name: &str, task: Task<'_, T>) -> Result<T, ExecutionFailure> {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => result,
        Err(payload) => Err(ExecutionFailure::new(name, panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}
