//! A scripted stand-in for a JavaScript VM.
//!
//! The mock VM runs a list of [`Op`]s on a `SerialExecutor` worker, checks
//! for asynchronous pause requests between ops the way an interpreter checks
//! between instructions, and calls into the debugger bridge whenever it
//! would pause.

#![allow(dead_code, unreachable_pub)]

use boa_debugger::{
    AsyncDebuggerApi, AsyncPauseKind, AsyncPauseRequester, Command, Debuggee, DebuggerEventType,
    EventCallbackId, PauseReason, SerialExecutor,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
    },
    thread,
    time::Duration,
};

/// How long to wait for the runtime thread before failing a test.
pub const TIMEOUT: Duration = Duration::from_millis(2500);

/// Name of the harness' runtime thread.
pub const RUNTIME_THREAD: &str = "mock-runtime";

/// One step of a mock script.
#[derive(Debug, Clone)]
pub enum Op {
    /// A plain statement.
    Statement,
    /// A `debugger;` statement.
    Debugger,
    /// A statement carrying a breakpoint.
    Breakpoint,
    /// `while (!flag) {}`
    SpinUntil(Arc<AtomicBool>),
}

/// Pending asynchronous pause requests, polled by the VM.
#[derive(Debug, Default)]
pub struct MockPauseRequester {
    implicit: AtomicBool,
    explicit: AtomicBool,
}

impl MockPauseRequester {
    fn take(&self) -> Option<AsyncPauseKind> {
        if self.explicit.swap(false, Ordering::AcqRel) {
            // The explicit pause services interrupts as well.
            self.implicit.store(false, Ordering::Release);
            Some(AsyncPauseKind::Explicit)
        } else if self.implicit.swap(false, Ordering::AcqRel) {
            Some(AsyncPauseKind::Implicit)
        } else {
            None
        }
    }
}

impl AsyncPauseRequester for MockPauseRequester {
    fn request_async_pause(&self, kind: AsyncPauseKind) {
        match kind {
            AsyncPauseKind::Implicit => self.implicit.store(true, Ordering::Release),
            AsyncPauseKind::Explicit => self.explicit.store(true, Ordering::Release),
        }
    }
}

/// The mock VM. Evaluating an expression parses it as an integer.
pub struct MockVm {
    api: Arc<AsyncDebuggerApi<MockVm>>,
    requester: Arc<MockPauseRequester>,
    abort: Arc<AtomicBool>,
    last_eval: i64,
    /// Commands the VM resumed with, in order.
    pub resumed_with: Vec<Command>,
    /// Number of ops executed so far.
    pub executed: usize,
}

impl Debuggee for MockVm {
    type EvalResult = i64;

    fn eval_result(&mut self) -> i64 {
        self.last_eval
    }
}

impl MockVm {
    /// Returns the bridge this VM reports its pauses to.
    pub fn debugger(&self) -> Arc<AsyncDebuggerApi<MockVm>> {
        Arc::clone(&self.api)
    }

    fn run(&mut self, script: &[Op]) {
        for op in script {
            self.service_async_pause();
            match op {
                Op::Statement => {}
                Op::Debugger => {
                    self.pause(PauseReason::DebuggerStatement);
                }
                Op::Breakpoint => {
                    self.pause(PauseReason::Breakpoint);
                }
                Op::SpinUntil(flag) => {
                    while !flag.load(Ordering::Acquire) && !self.abort.load(Ordering::Acquire) {
                        self.service_async_pause();
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
            self.executed += 1;
        }
        self.service_async_pause();
    }

    fn service_async_pause(&mut self) {
        if let Some(kind) = self.requester.take() {
            self.pause(PauseReason::AsyncTrigger(kind));
        }
    }

    fn pause(&mut self, reason: PauseReason) {
        let api = Arc::clone(&self.api);
        let mut command = api.did_pause(self, reason);
        while let Command::Eval { expression, .. } = &command {
            self.last_eval = expression.trim().parse().unwrap_or_default();
            command = api.did_pause(self, PauseReason::EvalComplete);
        }
        if reason != PauseReason::AsyncTrigger(AsyncPauseKind::Implicit) {
            self.resumed_with.push(command);
        }
    }
}

/// A bridge, a mock VM and the runtime thread the VM lives on.
pub struct Harness {
    pub api: Arc<AsyncDebuggerApi<MockVm>>,
    pub requester: Arc<MockPauseRequester>,
    pub vm: Arc<Mutex<MockVm>>,
    observers: Mutex<Vec<EventCallbackId>>,
    abort: Arc<AtomicBool>,
    // Dropped last so that the cleanup above can unblock it.
    pub runtime_thread: SerialExecutor,
}

impl Harness {
    pub fn new() -> Self {
        let requester = Arc::new(MockPauseRequester::default());
        let api = Arc::new(AsyncDebuggerApi::new(requester.clone()));
        let abort = Arc::new(AtomicBool::new(false));
        let vm = MockVm {
            api: Arc::clone(&api),
            requester: Arc::clone(&requester),
            abort: Arc::clone(&abort),
            last_eval: 0,
            resumed_with: Vec::new(),
            executed: 0,
        };
        Self {
            api,
            requester,
            vm: Arc::new(Mutex::new(vm)),
            observers: Mutex::new(Vec::new()),
            abort,
            runtime_thread: SerialExecutor::builder()
                .thread_name(RUNTIME_THREAD)
                .build(),
        }
    }

    /// Registers an observer that is removed when the harness drops.
    pub fn add_observer<F>(&self, callback: F) -> EventCallbackId
    where
        F: Fn(&mut MockVm, &AsyncDebuggerApi<MockVm>, DebuggerEventType) + Send + Sync + 'static,
    {
        let id = self.api.add_debugger_event_callback(callback);
        self.observers.lock().unwrap().push(id);
        id
    }

    /// Runs `script` on the runtime thread.
    ///
    /// The receiver yields the commands the VM resumed with once the script
    /// has finished.
    pub fn run_script(&self, script: Vec<Op>) -> Receiver<Vec<Command>> {
        let (tx, rx) = mpsc::channel();
        let vm = Arc::clone(&self.vm);
        self.runtime_thread.add(move || {
            let mut vm = vm.lock().unwrap();
            vm.resumed_with.clear();
            vm.run(&script);
            tx.send(vm.resumed_with.clone()).unwrap();
        });
        rx
    }

    /// Runs `task` on the runtime thread with the VM and waits for it.
    pub fn on_runtime_thread<T, F>(&self, task: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut MockVm) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let vm = Arc::clone(&self.vm);
        self.runtime_thread.add(move || {
            let mut vm = vm.lock().unwrap();
            tx.send(task(&mut vm)).unwrap();
        });
        recv(&rx)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // Unblock a VM left paused or spinning by a failed test.
        self.abort.store(true, Ordering::Release);
        for id in self.observers.get_mut().unwrap().drain(..) {
            self.api.remove_debugger_event_callback(id);
        }
    }
}

/// Waits for the runtime thread to send a value.
pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(TIMEOUT)
        .expect("timed out waiting for the runtime thread")
}

/// Returns `true` when called on the harness' runtime thread.
pub fn on_runtime_thread() -> bool {
    thread::current().name() == Some(RUNTIME_THREAD)
}
