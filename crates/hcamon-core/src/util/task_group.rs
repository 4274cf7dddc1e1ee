//! Fan-out/join helper for independent collection tasks.

use std::sync::Mutex;
use std::thread;

use tracing::{debug, warn};

type Task<'a, T> = Box<dyn FnOnce() -> Vec<T> + Send + 'a>;

/// A set of independent tasks that run on scoped threads.
///
/// Tasks do their I/O without any shared state. Each finished task stores its
/// output under one lock, and [`join`](TaskGroup::join) returns only after
/// every task has finished. Output is concatenated in spawn order, so the
/// result does not depend on thread scheduling.
pub struct TaskGroup<'a, T> {
    tasks: Vec<(String, Task<'a, T>)>,
}

impl<'a, T: Send + 'a> TaskGroup<'a, T> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Adds a task. Nothing runs until [`join`](TaskGroup::join).
    pub fn spawn(&mut self, name: impl Into<String>, task: impl FnOnce() -> Vec<T> + Send + 'a) {
        self.tasks.push((name.into(), Box::new(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs all tasks in parallel and waits for all of them.
    ///
    /// A panicking task is logged and contributes nothing.
    pub fn join(self) -> Vec<T> {
        let slots: Mutex<Vec<Option<Vec<T>>>> =
            Mutex::new((0..self.tasks.len()).map(|_| None).collect());

        thread::scope(|s| {
            let handles: Vec<_> = self
                .tasks
                .into_iter()
                .enumerate()
                .map(|(idx, (name, task))| {
                    let slots = &slots;
                    let handle = s.spawn(move || {
                        let out = task();
                        if let Ok(mut slots) = slots.lock() {
                            slots[idx] = Some(out);
                        }
                    });
                    (name, handle)
                })
                .collect();

            for (name, handle) in handles {
                if handle.join().is_err() {
                    warn!("collection task '{}' panicked", name);
                } else {
                    debug!("collection task '{}' done", name);
                }
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }
}

impl<'a, T: Send + 'a> Default for TaskGroup<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}
