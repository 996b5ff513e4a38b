//! A single worker thread draining a FIFO task queue.
//!
//! Everything a debugging client wants to do with the VM is funnelled through
//! one [`SerialExecutor`], so the VM is only ever touched from one thread.
//! The worker is spawned lazily on the first [`SerialExecutor::add`] and,
//! when an idle timeout is configured, exits after sitting idle for that
//! long; the next `add` spawns a fresh one.
//!
//! Dropping the executor blocks until every task that was queued, including
//! tasks queued by running tasks through an [`ExecutorHandle`], has run.

use crate::{
    error::{DebuggerError, DebuggerResult},
    sync::{lock, wait_timeout_while, wait_while},
};
use std::{
    collections::VecDeque,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Condvar, Mutex, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

/// A unit of work for the executor.
pub type Task = Box<dyn FnOnce() + Send>;

pub(crate) const DEFAULT_THREAD_NAME: &str = "boa-runtime";

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    terminating: bool,
    worker_alive: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    signal: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    stack_size: Option<usize>,
    idle_timeout: Option<Duration>,
    thread_name: String,
}

impl Shared {
    /// Queues `task`, spawning a worker if none is alive.
    ///
    /// Returns the task back if the executor is terminating and its worker
    /// has already exited.
    fn push(self: &Arc<Self>, task: Task) -> Result<(), Task> {
        let mut worker = lock(&self.worker);
        let mut queue = lock(&self.queue);

        if queue.worker_alive {
            queue.tasks.push_back(task);
            drop(queue);
            self.signal.notify_one();
            return Ok(());
        }
        if queue.terminating {
            return Err(task);
        }
        queue.tasks.push_back(task);
        queue.worker_alive = true;
        drop(queue);

        // The previous worker, if any, exited on its idle timeout.
        if let Some(previous) = worker.take() {
            join_worker(previous);
        }
        *worker = Some(self.spawn_worker());
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let mut builder = thread::Builder::new().name(self.thread_name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let shared = Arc::clone(self);

        log::debug!("spawning serial executor worker `{}`", self.thread_name);
        builder
            .spawn(move || run_worker(&shared))
            .unwrap_or_else(|err| panic!("failed to spawn the serial executor worker: {err}"))
    }
}

/// Builder for a [`SerialExecutor`].
#[derive(Debug, Clone, Default)]
pub struct SerialExecutorBuilder {
    stack_size: Option<usize>,
    idle_timeout: Option<Duration>,
    thread_name: Option<String>,
}

impl SerialExecutorBuilder {
    /// Creates a builder with no stack size hint and no idle reclamation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stack size of the worker thread, in bytes.
    ///
    /// VM threads usually want the same stack as the main thread.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Lets the worker exit after being idle for `timeout`.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Sets the name of the worker thread.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Builds the executor. No thread is spawned until the first task.
    #[must_use]
    pub fn build(self) -> SerialExecutor {
        SerialExecutor {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                signal: Condvar::new(),
                worker: Mutex::new(None),
                stack_size: self.stack_size,
                idle_timeout: self.idle_timeout,
                thread_name: self
                    .thread_name
                    .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_owned()),
            }),
        }
    }
}

/// Serializes tasks onto a single, lazily spawned worker thread.
pub struct SerialExecutor {
    shared: Arc<Shared>,
}

impl SerialExecutor {
    /// Creates an executor with default settings.
    #[must_use]
    pub fn new() -> Self {
        SerialExecutorBuilder::new().build()
    }

    /// Returns a builder to configure the worker thread.
    #[must_use]
    pub fn builder() -> SerialExecutorBuilder {
        SerialExecutorBuilder::new()
    }

    /// Appends `task` to the queue, spawning the worker if none is alive.
    ///
    /// Never blocks on running tasks, so tasks may call `add` themselves.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be created.
    pub fn add<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.push(Box::new(task)).is_err() {
            // Only reachable from a task running while the executor drops.
            log::warn!("task offered to a serial executor that already shut down");
        }
    }

    /// Returns a handle that can submit tasks without owning the executor.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Default for SerialExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = lock(&self.shared.queue);
        f.debug_struct("SerialExecutor")
            .field("thread_name", &self.shared.thread_name)
            .field("queued", &queue.tasks.len())
            .field("worker_alive", &queue.worker_alive)
            .field("stack_size", &self.shared.stack_size)
            .field("idle_timeout", &self.shared.idle_timeout)
            .finish()
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        lock(&self.shared.queue).terminating = true;
        self.shared.signal.notify_all();

        let worker = lock(&self.shared.worker).take();
        match worker {
            Some(worker) if worker.thread().id() == thread::current().id() => {
                // Dropped by one of its own tasks; the worker finishes the
                // queue on its own once that task returns.
            }
            Some(worker) => join_worker(worker),
            None => {}
        }
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        log::error!("serial executor worker terminated abnormally");
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let mut queue = lock(&shared.queue);
        let task = loop {
            if let Some(task) = queue.tasks.pop_front() {
                break task;
            }
            if queue.terminating {
                queue.worker_alive = false;
                log::debug!("serial executor worker drained its queue and is exiting");
                return;
            }
            match shared.idle_timeout {
                Some(timeout) => {
                    let timed_out;
                    (queue, timed_out) = wait_timeout_while(&shared.signal, queue, timeout, |q| {
                        q.tasks.is_empty() && !q.terminating
                    });
                    if timed_out {
                        queue.worker_alive = false;
                        log::debug!("serial executor worker idle for {timeout:?}, exiting");
                        return;
                    }
                }
                None => {
                    queue = wait_while(&shared.signal, queue, |q| {
                        q.tasks.is_empty() && !q.terminating
                    });
                }
            }
        };
        drop(queue);

        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("serial executor task panicked");
        }
    }
}

/// A weak, cloneable handle to a [`SerialExecutor`].
///
/// Tasks use it to queue follow-up work. It does not keep the executor alive.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Weak<Shared>,
}

impl ExecutorHandle {
    /// Queues `task` on the executor, respawning a reclaimed worker.
    ///
    /// Tasks queued while the executor is being dropped still run, as long
    /// as its worker has not exited yet.
    ///
    /// # Errors
    ///
    /// Returns [`DebuggerError::ExecutorShutDown`] once the executor has been
    /// dropped and its worker is gone.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread has to be created and cannot be.
    pub fn try_add<F>(&self, task: F) -> DebuggerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let pushed = self
            .shared
            .upgrade()
            .is_some_and(|shared| shared.push(Box::new(task)).is_ok());
        if pushed {
            Ok(())
        } else {
            log::warn!("task offered to a serial executor that already shut down");
            Err(DebuggerError::ExecutorShutDown)
        }
    }
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
