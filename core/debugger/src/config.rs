//! Session configuration.
//!
//! Integrators usually load this from their own settings file; every field
//! has a default, so an empty object is a valid configuration.

use crate::{
    console::{ConsoleMessageStorage, DEFAULT_CONSOLE_BUFFER_SIZE},
    executor::{DEFAULT_THREAD_NAME, SerialExecutorBuilder},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::time::Duration;

/// Configuration of a debugging session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebuggerConfig {
    /// Number of console messages kept for clients that attach later.
    ///
    /// Zero is rejected when deserializing.
    #[serde(deserialize_with = "deserialize_buffer_size")]
    pub console_buffer_size: usize,
    /// Settings of the thread all runtime work is serialized on.
    pub runtime_thread: ExecutorConfig,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            console_buffer_size: DEFAULT_CONSOLE_BUFFER_SIZE,
            runtime_thread: ExecutorConfig::default(),
        }
    }
}

impl DebuggerConfig {
    /// Creates an empty console storage with the configured capacity.
    ///
    /// # Panics
    ///
    /// Panics if `console_buffer_size` was set to zero in code; a loaded
    /// configuration never holds zero.
    #[must_use]
    pub fn console_storage<V>(&self) -> ConsoleMessageStorage<V> {
        ConsoleMessageStorage::with_capacity(self.console_buffer_size)
    }
}

fn deserialize_buffer_size<'de, De>(deserializer: De) -> Result<usize, De::Error>
where
    De: Deserializer<'de>,
{
    let size = usize::deserialize(deserializer)?;
    if size == 0 {
        return Err(De::Error::invalid_value(
            Unexpected::Unsigned(0),
            &"a console buffer size of at least 1",
        ));
    }
    Ok(size)
}

/// Configuration of a [`SerialExecutor`](crate::SerialExecutor) worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Stack size of the worker, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    /// Idle time after which the worker exits, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stack_size: None,
            idle_timeout_ms: None,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl ExecutorConfig {
    /// Returns an executor builder carrying these settings.
    #[must_use]
    pub fn builder(&self) -> SerialExecutorBuilder {
        let mut builder = SerialExecutorBuilder::new().thread_name(self.thread_name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        if let Some(ms) = self.idle_timeout_ms {
            builder = builder.idle_timeout(Duration::from_millis(ms));
        }
        builder
    }
}
