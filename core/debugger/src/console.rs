//! Console output captured from the VM.
//!
//! Messages produced before a client attaches (or between two attachments)
//! are kept in a bounded [`ConsoleMessageStorage`] and replayed to the client
//! once it enables the `Runtime` domain. Live output is fanned out through a
//! [`ConsoleMessageDispatcher`].

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};

/// Number of messages retained when no capacity is given.
pub const DEFAULT_CONSOLE_BUFFER_SIZE: usize = 1000;

/// The `console` method that produced a message.
///
/// Serializes to the `type` of a `Runtime.consoleAPICalled` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleApiType {
    /// `console.log`
    Log,
    /// `console.debug`
    Debug,
    /// `console.info`
    Info,
    /// `console.error`
    Error,
    /// `console.warn`
    Warning,
    /// `console.dir`
    Dir,
    /// `console.dirxml`
    #[serde(rename = "dirxml")]
    DirXml,
    /// `console.table`
    Table,
    /// `console.trace`
    Trace,
    /// `console.clear`
    Clear,
    /// `console.group`
    StartGroup,
    /// `console.groupCollapsed`
    StartGroupCollapsed,
    /// `console.groupEnd`
    EndGroup,
    /// `console.assert`
    Assert,
    /// `console.profile`
    Profile,
    /// `console.profileEnd`
    ProfileEnd,
    /// `console.count`
    Count,
    /// `console.timeEnd`
    TimeEnd,
}

/// A single `console.*` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage<V> {
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
    /// The method that was called.
    pub api_type: ConsoleApiType,
    /// The call's arguments, as VM values.
    pub args: Vec<V>,
    /// Frames of the stack at the call site, innermost first, if captured.
    pub stack_trace: Option<Vec<String>>,
}

impl<V> ConsoleMessage<V> {
    /// Creates a message without a stack trace.
    #[must_use]
    pub fn new(timestamp: f64, api_type: ConsoleApiType, args: Vec<V>) -> Self {
        Self {
            timestamp,
            api_type,
            args,
            stack_trace: None,
        }
    }

    /// Attaches the call site's stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, frames: Vec<String>) -> Self {
        self.stack_trace = Some(frames);
        self
    }
}

/// Bounded log of the most recent console messages.
#[derive(Debug, Clone)]
pub struct ConsoleMessageStorage<V> {
    capacity: usize,
    messages: VecDeque<ConsoleMessage<V>>,
    discarded: usize,
}

impl<V> Default for ConsoleMessageStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ConsoleMessageStorage<V> {
    /// Creates a storage retaining [`DEFAULT_CONSOLE_BUFFER_SIZE`] messages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CONSOLE_BUFFER_SIZE)
    }

    /// Creates a storage retaining at most `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "console storage needs room for one message");
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity.min(DEFAULT_CONSOLE_BUFFER_SIZE)),
            discarded: 0,
        }
    }

    /// Appends `message`, evicting the oldest one when full.
    pub fn add_message(&mut self, message: ConsoleMessage<V>) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
            self.discarded += 1;
        }
        self.messages.push_back(message);
    }

    /// Drops every message and resets the discarded count.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.discarded = 0;
    }

    /// Retained messages, oldest first.
    #[must_use]
    pub const fn messages(&self) -> &VecDeque<ConsoleMessage<V>> {
        &self.messages
    }

    /// Number of messages evicted since the last [`clear`](Self::clear).
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Timestamp of the oldest retained message.
    #[must_use]
    pub fn oldest_timestamp(&self) -> Option<f64> {
        self.messages.front().map(|message| message.timestamp)
    }

    /// Maximum number of retained messages.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Builds the warning a newly attached client is shown before the replay
    /// when messages were evicted.
    ///
    /// Returns the text along with a timestamp sorting just before the
    /// oldest retained message.
    #[must_use]
    pub fn discarded_warning(&self) -> Option<(f64, String)> {
        if self.discarded == 0 {
            return None;
        }
        let timestamp = self.oldest_timestamp()? - 0.1;
        let noun = if self.discarded == 1 {
            "message was"
        } else {
            "messages were"
        };
        Some((
            timestamp,
            format!(
                "Only limited number of console messages can be cached. {} {noun} discarded at the beginning.",
                self.discarded
            ),
        ))
    }
}

/// Token returned by [`ConsoleMessageDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

type ConsoleHandler<V> = Box<dyn Fn(&ConsoleMessage<V>) + Send>;

/// Delivers live console messages to every subscriber.
///
/// Like the storage, it is only touched from the VM thread.
pub struct ConsoleMessageDispatcher<V> {
    last_token: u64,
    subscribers: Vec<(SubscriptionToken, ConsoleHandler<V>)>,
}

impl<V> Default for ConsoleMessageDispatcher<V> {
    fn default() -> Self {
        Self {
            last_token: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<V> ConsoleMessageDispatcher<V> {
    /// Creates a dispatcher without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` and returns the token to unsubscribe it.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionToken
    where
        F: Fn(&ConsoleMessage<V>) + Send + 'static,
    {
        self.last_token += 1;
        let token = SubscriptionToken(self.last_token);
        self.subscribers.push((token, Box::new(handler)));
        token
    }

    /// Removes a subscriber. Returns `false` if `token` was unknown.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(t, _)| *t != token);
        self.subscribers.len() != before
    }

    /// Calls every subscriber with `message`, in subscription order.
    pub fn deliver(&self, message: &ConsoleMessage<V>) {
        for (_, handler) in &self.subscribers {
            handler(message);
        }
    }

    /// Returns `true` if anyone is subscribed.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }
}

impl<V> fmt::Debug for ConsoleMessageDispatcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleMessageDispatcher")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use test_case::test_case;

    fn log(timestamp: f64, arg: u32) -> ConsoleMessage<u32> {
        ConsoleMessage::new(timestamp, ConsoleApiType::Log, vec![arg])
    }

    #[test]
    fn keeps_the_most_recent_messages() {
        let mut storage = ConsoleMessageStorage::new();
        for i in 0..2000 {
            storage.add_message(log(f64::from(i), i));
        }

        assert_eq!(storage.messages().len(), 1000);
        assert_eq!(storage.discarded(), 1000);
        assert_eq!(storage.oldest_timestamp(), Some(1000.0));
        let args: Vec<u32> = storage.messages().iter().map(|m| m.args[0]).collect();
        assert_eq!(args, (1000..2000).collect::<Vec<_>>());
    }

    #[test]
    fn clear_resets_everything() {
        let mut storage = ConsoleMessageStorage::with_capacity(2);
        storage.add_message(log(1.0, 1));
        storage.add_message(log(2.0, 2));
        storage.add_message(log(3.0, 3));
        let kept: Vec<f64> = storage.messages().iter().map(|m| m.timestamp).collect();
        assert_eq!(kept, [2.0, 3.0]);
        assert_eq!(storage.discarded(), 1);

        storage.clear();

        assert!(storage.messages().is_empty());
        assert_eq!(storage.discarded(), 0);
        assert_eq!(storage.oldest_timestamp(), None);
        assert!(storage.discarded_warning().is_none());
    }

    #[test_case(1, "1 message was discarded"; "singular")]
    #[test_case(3, "3 messages were discarded"; "plural")]
    fn discarded_warning(overflow: u32, expected: &str) {
        let mut storage = ConsoleMessageStorage::with_capacity(1);
        for i in 0..=overflow {
            storage.add_message(log(10.0 + f64::from(i), i));
        }

        let (timestamp, text) = storage.discarded_warning().unwrap();
        assert!(text.contains(expected), "{text}");
        assert!(timestamp < storage.oldest_timestamp().unwrap());
    }

    #[test]
    fn dispatcher_delivers_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ConsoleMessageDispatcher::new();
        let tokens: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let seen = Arc::clone(&seen);
                dispatcher.subscribe(move |message: &ConsoleMessage<u32>| {
                    seen.lock().unwrap().push((name, message.args[0]));
                })
            })
            .collect();

        assert!(dispatcher.unsubscribe(tokens[1]));
        assert!(!dispatcher.unsubscribe(tokens[1]));
        dispatcher.deliver(&log(0.0, 7));

        assert_eq!(*seen.lock().unwrap(), [("a", 7), ("c", 7)]);
        assert!(dispatcher.has_subscribers());
    }

    #[test_case(ConsoleApiType::Log, "log")]
    #[test_case(ConsoleApiType::Warning, "warning")]
    #[test_case(ConsoleApiType::DirXml, "dirxml")]
    #[test_case(ConsoleApiType::StartGroupCollapsed, "startGroupCollapsed")]
    #[test_case(ConsoleApiType::TimeEnd, "timeEnd")]
    fn api_type_wire_names(api_type: ConsoleApiType, name: &str) {
        assert_eq!(serde_json::to_value(api_type).unwrap(), name);
        let parsed: ConsoleApiType = serde_json::from_value(name.into()).unwrap();
        assert_eq!(parsed, api_type);
    }

    #[test]
    fn stack_trace_is_optional() {
        let message = log(0.0, 1).with_stack_trace(vec!["main (app.js:1:1)".into()]);
        assert_eq!(message.stack_trace.as_deref().map(<[String]>::len), Some(1));
        assert!(log(0.0, 1).stack_trace.is_none());
    }
}
