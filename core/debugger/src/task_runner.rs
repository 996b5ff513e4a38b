//! Runs work on the VM thread whether the VM is paused or running.
//!
//! A task submitted through [`RuntimeTaskRunner::enqueue_task`] is offered to
//! two lanes at once: the integrator's own queue, which reaches the VM while
//! it runs freely, and the bridge's interrupt queue, which reaches it while it
//! is parked in a pause. Whichever lane gets there first runs the task; the
//! other finds the slot empty and does nothing.

use crate::{
    async_api::{AsyncDebuggerApi, Debuggee, InterruptCallback},
    sync::lock,
};
use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// Lanes a task is offered to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskQueues {
    /// Both the integrator's queue and the interrupt queue.
    #[default]
    All,
    /// Only the integrator's queue, for work that must not run while paused
    /// (e.g. a top-level evaluation).
    Integrator,
}

/// Hands a runtime task to the integrator, which must eventually run it on
/// the VM thread with the runtime.
pub type EnqueueRuntimeTask<D> = dyn Fn(InterruptCallback<D>) + Send + Sync;

type TaskSlot<D> = Arc<Mutex<Option<InterruptCallback<D>>>>;

/// Submits runtime tasks to every lane that can reach the VM thread.
pub struct RuntimeTaskRunner<D: Debuggee> {
    debugger: Arc<AsyncDebuggerApi<D>>,
    enqueue: Box<EnqueueRuntimeTask<D>>,
}

impl<D: Debuggee> RuntimeTaskRunner<D> {
    /// Creates a runner offering tasks to `debugger` and to `enqueue`.
    #[must_use]
    pub fn new<F>(debugger: Arc<AsyncDebuggerApi<D>>, enqueue: F) -> Self
    where
        F: Fn(InterruptCallback<D>) + Send + Sync + 'static,
    {
        Self {
            debugger,
            enqueue: Box::new(enqueue),
        }
    }

    /// Queues `task` to run exactly once on the VM thread.
    ///
    /// With [`TaskQueues::Integrator`] the task only runs when the
    /// integrator gets to it, never from inside a pause.
    pub fn enqueue_task<F>(&self, task: F, queues: TaskQueues)
    where
        F: FnOnce(&mut D) + Send + 'static,
    {
        let slot: TaskSlot<D> = Arc::new(Mutex::new(Some(Box::new(task))));

        if queues == TaskQueues::All {
            let interrupt_slot = Arc::clone(&slot);
            self.debugger
                .trigger_interrupt(move |runtime| run_once(&interrupt_slot, runtime, "interrupt"));
        }
        (self.enqueue)(Box::new(move |runtime| {
            run_once(&slot, runtime, "integrator");
        }));
    }

    /// Returns the bridge tasks are offered to.
    #[must_use]
    pub fn debugger(&self) -> &Arc<AsyncDebuggerApi<D>> {
        &self.debugger
    }
}

fn run_once<D>(slot: &Mutex<Option<InterruptCallback<D>>>, runtime: &mut D, lane: &str) {
    let task = lock(slot).take();
    if let Some(task) = task {
        log::trace!("runtime task picked up by the {lane} lane");
        task(runtime);
    }
}

impl<D: Debuggee> fmt::Debug for RuntimeTaskRunner<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeTaskRunner")
            .field("debugger", &self.debugger)
            .finish_non_exhaustive()
    }
}
