//! Bridge between the VM's synchronous pause hook and asynchronous clients.
//!
//! The VM calls [`AsyncDebuggerApi::did_pause`] on its own thread whenever it
//! stops. The bridge fans the pause out to the registered observers and then
//! parks the VM thread on a condition variable, waking up only to run
//! interrupts submitted from other threads, until one of them decides how to
//! resume through [`AsyncDebuggerApi::resume_from_paused`] or the last
//! observer goes away.
//!
//! All methods that do not take the runtime may be called from any thread.
//! No lock is ever held while user code (observers, interrupts, evaluation
//! callbacks) runs, so that code may call back into the bridge freely.

use crate::{
    command::{AsyncPauseKind, Command, DebuggerEventType, PauseReason},
    sync::{lock, wait_while},
};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    ops::Bound,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

/// The VM side of the bridge, as seen from the VM thread.
///
/// The runtime is never stored by the bridge; it is lent to every pause and
/// every interrupt drain, and from there to observers and interrupts.
pub trait Debuggee: 'static {
    /// Result of an expression evaluated through [`Command::Eval`].
    type EvalResult;

    /// Returns the result of the evaluation the VM just completed.
    ///
    /// Only called while handling [`PauseReason::EvalComplete`].
    fn eval_result(&mut self) -> Self::EvalResult;
}

/// Thread-safe handle used to ask a running VM to pause at the next
/// opportunity.
///
/// This is passed explicitly to the bridge instead of being looked up through
/// global state.
pub trait AsyncPauseRequester: Send + Sync {
    /// Requests an asynchronous pause of the given kind.
    ///
    /// The VM answers by calling [`AsyncDebuggerApi::did_pause`] with
    /// [`PauseReason::AsyncTrigger`]. Redundant requests may be coalesced.
    fn request_async_pause(&self, kind: AsyncPauseKind);
}

/// Identifier of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventCallbackId(u32);

impl EventCallbackId {
    /// Sentinel that never identifies a registration.
    pub const INVALID: Self = Self(0);

    /// Returns `false` for [`EventCallbackId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for EventCallbackId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Observer invoked on every pause with the classified event.
pub type DebuggerEventCallback<D> =
    dyn Fn(&mut D, &AsyncDebuggerApi<D>, DebuggerEventType) + Send + Sync;

/// One-shot work item run on the VM thread.
pub type InterruptCallback<D> = Box<dyn FnOnce(&mut D) + Send>;

/// Callback receiving the result of [`AsyncDebuggerApi::eval_while_paused`].
pub type EvalCompleteCallback<D> = Box<dyn FnOnce(&mut D, <D as Debuggee>::EvalResult) + Send>;

struct Coordination<D: Debuggee> {
    /// Keys are allocated monotonically, so key order is registration order.
    event_callbacks: BTreeMap<EventCallbackId, Arc<DebuggerEventCallback<D>>>,
    last_callback_id: u32,
    interrupts: VecDeque<InterruptCallback<D>>,
    waiting_for_command: bool,
    next_command: Command,
    eval_complete: Option<EvalCompleteCallback<D>>,
    detached: bool,
}

impl<D: Debuggee> Coordination<D> {
    fn set_next_command(&mut self, command: Command) {
        assert!(
            self.waiting_for_command,
            "a resume command can only be set while the VM is waiting for one"
        );
        self.next_command = command;
        self.waiting_for_command = false;
    }
}

/// Synchronization bridge between a paused VM and its debugging clients.
///
/// # Example
///
/// ```rust,ignore
/// let api = Arc::new(AsyncDebuggerApi::new(vm.pause_requester()));
///
/// // Any thread:
/// api.add_debugger_event_callback(|_vm, api, event| {
///     if event == DebuggerEventType::DebuggerStatement {
///         log::info!("paused on `debugger;`");
///     }
/// });
///
/// // VM thread, from the engine's debugger hook:
/// let command = api.did_pause(&mut vm, PauseReason::DebuggerStatement);
/// ```
pub struct AsyncDebuggerApi<D: Debuggee> {
    coordination: Mutex<Coordination<D>>,
    signal: Condvar,
    in_did_pause: AtomicBool,
    pause_requester: Arc<dyn AsyncPauseRequester>,
}

impl<D: Debuggee> AsyncDebuggerApi<D> {
    /// Creates a bridge for one VM instance.
    ///
    /// Must be created before the VM starts running JavaScript.
    #[must_use]
    pub fn new(pause_requester: Arc<dyn AsyncPauseRequester>) -> Self {
        Self {
            coordination: Mutex::new(Coordination {
                event_callbacks: BTreeMap::new(),
                last_callback_id: EventCallbackId::INVALID.0,
                interrupts: VecDeque::new(),
                waiting_for_command: false,
                next_command: Command::Continue,
                eval_complete: None,
                detached: false,
            }),
            signal: Condvar::new(),
            in_did_pause: AtomicBool::new(false),
            pause_requester,
        }
    }

    /// Registers an observer and returns its id.
    ///
    /// Observers run on the VM thread, in registration order, on every pause.
    /// Safe to call from any thread, including from inside an observer.
    pub fn add_debugger_event_callback<F>(&self, callback: F) -> EventCallbackId
    where
        F: Fn(&mut D, &Self, DebuggerEventType) + Send + Sync + 'static,
    {
        let id = {
            let mut coordination = lock(&self.coordination);
            coordination.last_callback_id += 1;
            let id = EventCallbackId(coordination.last_callback_id);
            coordination.event_callbacks.insert(id, Arc::new(callback));
            id
        };
        log::debug!("registered debugger event callback {id:?}");
        self.signal.notify_all();
        id
    }

    /// Unregisters an observer. Unknown ids are ignored.
    ///
    /// An observer may remove itself while it runs: it finishes its current
    /// invocation and is never invoked again. Removing the last observer
    /// while the VM is waiting for a command resumes it with
    /// [`Command::Continue`].
    pub fn remove_debugger_event_callback(&self, id: EventCallbackId) {
        let removed = lock(&self.coordination).event_callbacks.remove(&id);
        if removed.is_some() {
            log::debug!("removed debugger event callback {id:?}");
        } else if id.is_valid() {
            log::debug!("ignoring removal of unknown debugger event callback {id:?}");
        }
        self.signal.notify_all();
    }

    /// Queues `callback` to run exactly once on the VM thread.
    ///
    /// If the VM is paused the callback runs from the pause loop; otherwise
    /// an implicit asynchronous pause is requested so that it runs without
    /// waiting for the next natural pause. Interrupts run in submission
    /// order.
    ///
    /// Once [`detach`](Self::detach) was called there is no VM thread left to
    /// run it: the callback is dropped without running and a warning is
    /// logged.
    pub fn trigger_interrupt<F>(&self, callback: F)
    where
        F: FnOnce(&mut D) + Send + 'static,
    {
        {
            let mut coordination = lock(&self.coordination);
            if coordination.detached {
                drop(coordination);
                log::warn!("refusing interrupt: the debugger was detached from the VM");
                return;
            }
            coordination.interrupts.push_back(Box::new(callback));
        }
        self.signal.notify_all();
        self.pause_requester
            .request_async_pause(AsyncPauseKind::Implicit);
    }

    /// Asks the VM to pause on behalf of a client.
    ///
    /// An [`AsyncPauseKind::Explicit`] pause is reported to observers as
    /// [`DebuggerEventType::ExplicitPause`].
    pub fn trigger_async_pause(&self, kind: AsyncPauseKind) {
        self.pause_requester.request_async_pause(kind);
    }

    /// Returns `true` while the VM is paused and expecting a resume decision.
    #[must_use]
    pub fn is_waiting_for_command(&self) -> bool {
        lock(&self.coordination).waiting_for_command
    }

    /// Returns `true` while at least one observer is registered.
    #[must_use]
    pub fn is_debugger_attached(&self) -> bool {
        !lock(&self.coordination).event_callbacks.is_empty()
    }

    /// Sets the command the VM resumes with.
    ///
    /// # Panics
    ///
    /// Panics if the VM is not waiting for a command.
    pub fn resume_from_paused(&self, command: Command) {
        lock(&self.coordination).set_next_command(command);
        self.signal.notify_all();
    }

    /// Resumes the VM with an evaluation of `expression` in the frame at
    /// `frame_index`.
    ///
    /// The VM pauses again with [`PauseReason::EvalComplete`]; `callback`
    /// then receives the result before observers are notified.
    ///
    /// # Panics
    ///
    /// Panics if the VM is not waiting for a command.
    pub fn eval_while_paused<F>(&self, expression: impl Into<String>, frame_index: u32, callback: F)
    where
        F: FnOnce(&mut D, D::EvalResult) + Send + 'static,
    {
        {
            let mut coordination = lock(&self.coordination);
            coordination.set_next_command(Command::eval(expression, frame_index));
            coordination.eval_complete = Some(Box::new(callback));
        }
        self.signal.notify_all();
    }

    /// Pause entrypoint, called by the VM's debugger hook on the VM thread.
    ///
    /// Returns once a resume decision was made, or immediately if nobody is
    /// observing.
    ///
    /// # Panics
    ///
    /// Panics if called again while a previous call has not returned.
    ///
    /// If an observer or interrupt panics, the pause is abandoned: the panic
    /// propagates to the VM and the bridge is left as if the VM had resumed
    /// with [`Command::Continue`].
    pub fn did_pause(&self, runtime: &mut D, reason: PauseReason) -> Command {
        let _scope = PauseScope::enter(self);

        let Some(event) = reason.event_type() else {
            log::trace!("implicit async pause: draining interrupts");
            self.run_interrupts(runtime, false);
            return Command::Continue;
        };

        if reason == PauseReason::EvalComplete {
            let callback = lock(&self.coordination).eval_complete.take();
            if let Some(callback) = callback {
                let result = runtime.eval_result();
                callback(runtime, result);
            }
        }

        {
            let mut coordination = lock(&self.coordination);
            if coordination.event_callbacks.is_empty() {
                drop(coordination);
                log::trace!("no debugger event callbacks registered, resuming on {event}");
                self.run_interrupts(runtime, false);
                return Command::Continue;
            }
            coordination.waiting_for_command = true;
            coordination.next_command = Command::Continue;
        }

        log::debug!("VM paused: {event}");
        self.run_event_callbacks(runtime, event);
        self.process_interrupts_while_paused(runtime);
        self.run_event_callbacks(runtime, DebuggerEventType::Resumed);

        let command = std::mem::take(&mut lock(&self.coordination).next_command);
        log::debug!("VM resuming with {command:?}");
        command
    }

    /// Detaches from the VM and runs every pending interrupt.
    ///
    /// Must be called on the VM thread before the runtime goes away. No
    /// further asynchronous pauses are requested afterwards, and later
    /// interrupts are refused.
    pub fn detach(&self, runtime: &mut D) {
        lock(&self.coordination).detached = true;
        self.run_interrupts(runtime, false);
        log::debug!("debugger detached from VM");
    }

    fn run_event_callbacks(&self, runtime: &mut D, event: DebuggerEventType) {
        let mut cursor: Option<EventCallbackId> = None;
        loop {
            let next = {
                let coordination = lock(&self.coordination);
                let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);
                coordination
                    .event_callbacks
                    .range((lower, Bound::Unbounded))
                    .next()
                    .map(|(id, callback)| (*id, Arc::clone(callback)))
            };
            let Some((id, callback)) = next else {
                break;
            };
            cursor = Some(id);
            callback(runtime, self, event);
        }
    }

    fn process_interrupts_while_paused(&self, runtime: &mut D) {
        loop {
            let mut coordination = wait_while(&self.signal, lock(&self.coordination), |c| {
                c.waiting_for_command && c.interrupts.is_empty() && !c.event_callbacks.is_empty()
            });

            if !coordination.waiting_for_command {
                break;
            }
            if coordination.event_callbacks.is_empty() {
                log::debug!("last debugger event callback removed while paused, resuming");
                coordination.waiting_for_command = false;
                coordination.next_command = Command::Continue;
                break;
            }
            drop(coordination);

            self.run_interrupts(runtime, true);
        }
    }

    /// Pops and runs interrupts until the queue is empty.
    ///
    /// With `while_paused` set, stops as soon as a resume command was given;
    /// the remaining interrupts stay queued for the next drain.
    fn run_interrupts(&self, runtime: &mut D, while_paused: bool) {
        loop {
            let interrupt = {
                let mut coordination = lock(&self.coordination);
                if while_paused && !coordination.waiting_for_command {
                    break;
                }
                coordination.interrupts.pop_front()
            };
            match interrupt {
                Some(interrupt) => interrupt(runtime),
                None => break,
            }
        }
    }
}

impl<D: Debuggee> fmt::Debug for AsyncDebuggerApi<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coordination = lock(&self.coordination);
        f.debug_struct("AsyncDebuggerApi")
            .field("event_callbacks", &coordination.event_callbacks.len())
            .field("interrupts", &coordination.interrupts.len())
            .field("waiting_for_command", &coordination.waiting_for_command)
            .field("next_command", &coordination.next_command)
            .field("detached", &coordination.detached)
            .finish_non_exhaustive()
    }
}

impl<D: Debuggee> Drop for AsyncDebuggerApi<D> {
    fn drop(&mut self) {
        let coordination = self
            .coordination
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !coordination.interrupts.is_empty() {
            log::error!(
                "AsyncDebuggerApi dropped with {} pending interrupts; call `detach` on the VM thread first",
                coordination.interrupts.len()
            );
        }
    }
}

/// Marks the extent of a [`AsyncDebuggerApi::did_pause`] call.
///
/// Unwinding out of the call resets the pause state, so that clients never
/// see a VM waiting for a command while it runs.
struct PauseScope<'a, D: Debuggee>(&'a AsyncDebuggerApi<D>);

impl<'a, D: Debuggee> PauseScope<'a, D> {
    fn enter(api: &'a AsyncDebuggerApi<D>) -> Self {
        let reentered = api.in_did_pause.swap(true, Ordering::AcqRel);
        assert!(
            !reentered,
            "AsyncDebuggerApi::did_pause must not be called recursively"
        );
        Self(api)
    }
}

impl<D: Debuggee> Drop for PauseScope<'_, D> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let stale_eval = {
                let mut coordination = lock(&self.0.coordination);
                coordination.waiting_for_command = false;
                coordination.next_command = Command::Continue;
                coordination.eval_complete.take()
            };
            self.0.signal.notify_all();
            log::error!("VM left `did_pause` while unwinding, pause abandoned");
            drop(stale_eval);
        }
        self.0.in_did_pause.store(false, Ordering::Release);
    }
}
