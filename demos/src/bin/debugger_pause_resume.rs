//! Demonstrates pausing a VM on a `debugger;` statement and resuming it from
//! another thread.
//!
//! A toy VM runs a small program on a dedicated runtime thread. A client
//! thread observes the pause, evaluates an expression in the paused frame,
//! then resumes. Afterwards the client asks a busy loop to pause explicitly,
//! the way `Debugger.pause` would.
//!
//! Run with `RUST_LOG=debug` to see the bridge's own log output.

use boa_debugger::{
    AsyncDebuggerApi, AsyncPauseKind, AsyncPauseRequester, Command, Debuggee, DebuggerEventType,
    PauseReason, SerialExecutor,
};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    collections::BTreeMap,
    error::Error,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

/// One statement of the toy language.
#[derive(Debug, Clone, Copy)]
enum Stmt {
    Let(&'static str, i64),
    Add(&'static str, i64),
    Debugger,
    /// `while (!stop) { name += 1 }`
    SpinUntilStopped(&'static str),
}

/// Async pause requests, polled between statements.
#[derive(Debug, Default)]
struct PauseFlags {
    implicit: AtomicBool,
    explicit: AtomicBool,
}

impl PauseFlags {
    fn take(&self) -> Option<AsyncPauseKind> {
        if self.explicit.swap(false, Ordering::AcqRel) {
            Some(AsyncPauseKind::Explicit)
        } else if self.implicit.swap(false, Ordering::AcqRel) {
            Some(AsyncPauseKind::Implicit)
        } else {
            None
        }
    }
}

impl AsyncPauseRequester for PauseFlags {
    fn request_async_pause(&self, kind: AsyncPauseKind) {
        match kind {
            AsyncPauseKind::Implicit => self.implicit.store(true, Ordering::Release),
            AsyncPauseKind::Explicit => self.explicit.store(true, Ordering::Release),
        }
    }
}

struct ToyVm {
    debugger: Arc<AsyncDebuggerApi<ToyVm>>,
    pause_flags: Arc<PauseFlags>,
    stop: Arc<AtomicBool>,
    vars: BTreeMap<&'static str, i64>,
    eval_result: Option<i64>,
}

impl Debuggee for ToyVm {
    type EvalResult = Option<i64>;

    fn eval_result(&mut self) -> Option<i64> {
        self.eval_result.take()
    }
}

impl ToyVm {
    fn run(&mut self, program: &[Stmt]) {
        for stmt in program {
            self.poll_async_pause();
            match *stmt {
                Stmt::Let(name, value) => {
                    self.vars.insert(name, value);
                }
                Stmt::Add(name, value) => *self.vars.entry(name).or_default() += value,
                Stmt::Debugger => self.pause(PauseReason::DebuggerStatement),
                Stmt::SpinUntilStopped(name) => {
                    while !self.stop.load(Ordering::Acquire) {
                        *self.vars.entry(name).or_default() += 1;
                        self.poll_async_pause();
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        }
    }

    fn poll_async_pause(&mut self) {
        if let Some(kind) = self.pause_flags.take() {
            self.pause(PauseReason::AsyncTrigger(kind));
        }
    }

    fn pause(&mut self, reason: PauseReason) {
        let debugger = Arc::clone(&self.debugger);
        let mut command = debugger.did_pause(self, reason);
        while let Command::Eval { expression, .. } = &command {
            self.eval_result = self.vars.get(expression.as_str()).copied();
            command = debugger.did_pause(self, PauseReason::EvalComplete);
        }
        log::info!("[vm] resuming with {command:?}");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let pause_flags = Arc::new(PauseFlags::default());
    let debugger = Arc::new(AsyncDebuggerApi::<ToyVm>::new(pause_flags.clone()));
    let stop = Arc::new(AtomicBool::new(false));
    let runtime_thread = SerialExecutor::builder()
        .thread_name("toy-runtime")
        .build();

    // Observers run on the runtime thread; hand pauses to the client thread.
    let (paused_tx, paused_rx) = mpsc::channel();
    let paused_tx = Mutex::new(paused_tx);
    let observer = debugger.add_debugger_event_callback(move |vm, _api, event| {
        log::info!("[observer] {event} (x = {:?})", vm.vars.get("x"));
        if event != DebuggerEventType::Resumed {
            paused_tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .send(event)
                .ok();
        }
    });

    let (done_tx, done_rx) = mpsc::channel();
    let mut vm = ToyVm {
        debugger: Arc::clone(&debugger),
        pause_flags,
        stop: Arc::clone(&stop),
        vars: BTreeMap::new(),
        eval_result: None,
    };
    runtime_thread.add(move || {
        vm.run(&[
            Stmt::Let("x", 40),
            Stmt::Add("x", 2),
            Stmt::Debugger,
            Stmt::Let("ticks", 0),
            Stmt::SpinUntilStopped("ticks"),
        ]);
        let debugger = Arc::clone(&vm.debugger);
        debugger.detach(&mut vm);
        done_tx.send(vm.vars).ok();
    });

    let timeout = Duration::from_secs(5);

    let event = paused_rx.recv_timeout(timeout)?;
    log::info!("[client] VM paused on {event}");
    thread::sleep(Duration::from_millis(500));

    // Evaluate `x` in the paused frame; the VM pauses again when it is done.
    let (eval_tx, eval_rx) = mpsc::channel();
    let api = Arc::clone(&debugger);
    debugger.trigger_interrupt(move |_vm| {
        api.eval_while_paused("x", 0, move |_vm, result| {
            eval_tx.send(result).ok();
        });
    });
    log::info!("[client] x evaluated to {:?}", eval_rx.recv_timeout(timeout)?);
    let event = paused_rx.recv_timeout(timeout)?;
    log::info!("[client] VM paused again on {event}, resuming");
    debugger.resume_from_paused(Command::Continue);

    // Interrupt the busy loop the way `Debugger.pause` does.
    thread::sleep(Duration::from_millis(200));
    debugger.trigger_async_pause(AsyncPauseKind::Explicit);
    let event = paused_rx.recv_timeout(timeout)?;
    log::info!("[client] VM paused on {event}, stopping the loop");
    stop.store(true, Ordering::Release);
    debugger.remove_debugger_event_callback(observer);

    let vars = done_rx.recv_timeout(timeout)?;
    log::info!("[client] program finished with {vars:?}");
    Ok(())
}
