//! Boa's **`boa_debugger`** crate coordinates a single-threaded JavaScript VM
//! with debugging clients running on other threads.
//!
//! # Overview
//!
//! A client speaking a Chrome DevTools Protocol style of commands and events
//! wants to pause, inspect and resume the VM whenever it likes, but the VM can
//! only be touched from its own thread and only reports pauses synchronously
//! from inside its interpreter loop. This crate provides the pieces that
//! reconcile the two:
//!
//! - [`AsyncDebuggerApi`]: the bridge the VM's pause hook calls into. It fans
//!   pauses out to observers and keeps the paused VM thread servicing
//!   interrupts until a resume decision arrives.
//! - [`SerialExecutor`]: a single worker thread that serializes all work the
//!   client wants done on the VM.
//! - [`RuntimeTaskRunner`]: runs a task on the VM thread whether the VM is
//!   paused or running.
//! - [`DomainState`]: transactional per-domain session state.
//! - [`RemoteObjectsTable`]: wire ids for scopes and values shown to a client.
//! - [`ConsoleMessageStorage`]: the bounded log of console output replayed to
//!   late clients.
//!
//! # Example
//!
//! ```
//! use boa_debugger::{
//!     AsyncDebuggerApi, AsyncPauseKind, AsyncPauseRequester, Command, Debuggee, PauseReason,
//! };
//! use std::sync::Arc;
//!
//! struct Vm;
//!
//! impl Debuggee for Vm {
//!     type EvalResult = ();
//!     fn eval_result(&mut self) {}
//! }
//!
//! struct Requester;
//!
//! impl AsyncPauseRequester for Requester {
//!     fn request_async_pause(&self, _kind: AsyncPauseKind) {}
//! }
//!
//! let api = AsyncDebuggerApi::<Vm>::new(Arc::new(Requester));
//! api.add_debugger_event_callback(|_vm, api, _event| {
//!     if api.is_waiting_for_command() {
//!         api.resume_from_paused(Command::StepOver);
//!     }
//! });
//!
//! let command = api.did_pause(&mut Vm, PauseReason::DebuggerStatement);
//! assert_eq!(command, Command::StepOver);
//! ```

#![doc(
    html_logo_url = "https://raw.githubusercontent.com/boa-dev/boa_logo/main/boa_logo.svg",
    html_favicon_url = "https://raw.githubusercontent.com/boa-dev/boa_logo/main/boa_logo.svg"
)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

pub mod async_api;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod executor;
pub mod remote_objects;
pub mod state;
pub mod task_runner;

mod sync;

#[doc(inline)]
pub use crate::{
    async_api::{AsyncDebuggerApi, AsyncPauseRequester, Debuggee, EventCallbackId},
    command::{AsyncPauseKind, Command, DebuggerEventType, PauseReason},
    config::{DebuggerConfig, ExecutorConfig},
    console::{
        ConsoleApiType, ConsoleMessage, ConsoleMessageDispatcher, ConsoleMessageStorage,
        SubscriptionToken,
    },
    error::{DebuggerError, DebuggerResult},
    executor::{ExecutorHandle, SerialExecutor, SerialExecutorBuilder},
    remote_objects::{
        BACKTRACE_OBJECT_GROUP, CONSOLE_OBJECT_GROUP, RemoteObjectId, RemoteObjectsTable,
        ScopeRef,
    },
    state::{DomainState, StateValue, Transaction},
    task_runner::{RuntimeTaskRunner, TaskQueues},
};
