//! Values exchanged between the VM's pause hook and the debugger bridge.

use serde::Serialize;
use std::fmt;

/// What the VM should do once the pause hook returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// Resume free execution.
    #[default]
    Continue,
    /// Step into the next call.
    StepInto,
    /// Step over the next statement.
    StepOver,
    /// Run until the current frame returns.
    StepOut,
    /// Evaluate `expression` in the frame at `frame_index` and pause again
    /// with [`PauseReason::EvalComplete`].
    Eval {
        /// Source text to evaluate.
        expression: String,
        /// Index of the call frame to evaluate in, 0 being the innermost.
        frame_index: u32,
    },
}

impl Command {
    /// Creates an evaluation command.
    #[must_use]
    pub fn eval(expression: impl Into<String>, frame_index: u32) -> Self {
        Self::Eval {
            expression: expression.into(),
            frame_index,
        }
    }

    /// Returns `true` for the stepping directives.
    #[must_use]
    pub const fn is_step(&self) -> bool {
        matches!(self, Self::StepInto | Self::StepOver | Self::StepOut)
    }
}

/// Who asked the VM for an asynchronous pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncPauseKind {
    /// Requested by the bridge itself to service queued interrupts.
    ///
    /// Never surfaces as an event.
    Implicit,
    /// Requested on behalf of a client, e.g. `Debugger.pause`.
    Explicit,
}

/// Why the VM invoked its pause hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseReason {
    /// A new script was compiled and is about to run.
    ScriptLoaded,
    /// A `debugger;` statement was executed.
    DebuggerStatement,
    /// A breakpoint was hit.
    Breakpoint,
    /// A step command finished.
    StepFinish,
    /// An exception is about to be thrown out of a frame.
    Exception,
    /// A [`Command::Eval`] finished.
    EvalComplete,
    /// An asynchronous pause requested from another thread.
    AsyncTrigger(AsyncPauseKind),
}

impl PauseReason {
    /// Maps a pause reason to the event delivered to observers.
    ///
    /// Returns `None` for implicit async pauses, which only exist to get the
    /// bridge onto the VM thread.
    #[must_use]
    pub const fn event_type(self) -> Option<DebuggerEventType> {
        Some(match self {
            Self::ScriptLoaded => DebuggerEventType::ScriptLoaded,
            Self::DebuggerStatement => DebuggerEventType::DebuggerStatement,
            Self::Breakpoint => DebuggerEventType::Breakpoint,
            Self::StepFinish => DebuggerEventType::StepFinish,
            Self::Exception => DebuggerEventType::Exception,
            Self::EvalComplete => DebuggerEventType::EvalComplete,
            Self::AsyncTrigger(AsyncPauseKind::Explicit) => DebuggerEventType::ExplicitPause,
            Self::AsyncTrigger(AsyncPauseKind::Implicit) => return None,
        })
    }
}

/// Event delivered to every registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DebuggerEventType {
    /// See [`PauseReason::ScriptLoaded`].
    ScriptLoaded,
    /// See [`PauseReason::DebuggerStatement`].
    DebuggerStatement,
    /// See [`PauseReason::Breakpoint`].
    Breakpoint,
    /// See [`PauseReason::StepFinish`].
    StepFinish,
    /// See [`PauseReason::Exception`].
    Exception,
    /// See [`PauseReason::EvalComplete`].
    EvalComplete,
    /// A client-requested asynchronous pause.
    ExplicitPause,
    /// The VM is leaving the pause hook.
    Resumed,
}

impl fmt::Display for DebuggerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScriptLoaded => "scriptLoaded",
            Self::DebuggerStatement => "debuggerStatement",
            Self::Breakpoint => "breakpoint",
            Self::StepFinish => "stepFinish",
            Self::Exception => "exception",
            Self::EvalComplete => "evalComplete",
            Self::ExplicitPause => "explicitPause",
            Self::Resumed => "resumed",
        };
        f.write_str(name)
    }
}
