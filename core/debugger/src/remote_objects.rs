//! Wire identifiers for scopes and values handed out to a client.
//!
//! The client refers to objects it was shown (`Runtime.RemoteObject.objectId`)
//! and scopes (`Debugger.Scope.object`) by opaque strings. This table maps
//! those strings back to what the VM needs to find the object again.
//!
//! Scope ids are negative and count down from `-1`; value ids are positive
//! and count up from `1`. Ids are never reused, and `0` is never issued.
//! The table is only meant to be touched from the VM thread.

use crate::error::DebuggerError;
use rustc_hash::FxHashMap;
use std::{fmt, str::FromStr};

/// Group of the objects shown for the current call stack.
pub const BACKTRACE_OBJECT_GROUP: &str = "backtrace";

/// Group of the objects passed to `console.*` calls.
pub const CONSOLE_OBJECT_GROUP: &str = "console";

/// Identifier of a scope or value handed out to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteObjectId(i64);

impl RemoteObjectId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns `true` if the id designates a scope.
    #[must_use]
    pub const fn is_scope(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if the id designates a value.
    #[must_use]
    pub const fn is_value(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for RemoteObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RemoteObjectId {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| DebuggerError::InvalidObjectId(s.to_owned()))
    }
}

/// Location of a scope: the call frame and the scope within that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef {
    /// Index of the call frame, 0 being the innermost.
    pub frame_index: u32,
    /// Index of the scope within the frame's scope chain.
    pub scope_index: u32,
}

impl ScopeRef {
    /// Creates a scope reference.
    #[must_use]
    pub const fn new(frame_index: u32, scope_index: u32) -> Self {
        Self {
            frame_index,
            scope_index,
        }
    }
}

/// Maps wire ids to scopes and to VM values of type `V`.
#[derive(Debug)]
pub struct RemoteObjectsTable<V> {
    last_scope_id: i64,
    last_value_id: i64,
    scopes: FxHashMap<i64, ScopeRef>,
    values: FxHashMap<i64, V>,
    id_to_group: FxHashMap<i64, String>,
    group_to_ids: FxHashMap<String, Vec<i64>>,
}

impl<V> Default for RemoteObjectsTable<V> {
    fn default() -> Self {
        Self {
            last_scope_id: 0,
            last_value_id: 0,
            scopes: FxHashMap::default(),
            values: FxHashMap::default(),
            id_to_group: FxHashMap::default(),
            group_to_ids: FxHashMap::default(),
        }
    }
}

impl<V> RemoteObjectsTable<V> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `scope` under a fresh scope id and returns the wire id.
    ///
    /// An empty `group` leaves the entry ungrouped.
    pub fn add_scope(&mut self, scope: ScopeRef, group: &str) -> String {
        self.last_scope_id -= 1;
        let id = self.last_scope_id;
        self.scopes.insert(id, scope);
        self.tag(id, group);
        id.to_string()
    }

    /// Stores `value` under a fresh value id and returns the wire id.
    ///
    /// An empty `group` leaves the entry ungrouped.
    pub fn add_value(&mut self, value: V, group: &str) -> String {
        self.last_value_id += 1;
        let id = self.last_value_id;
        self.values.insert(id, value);
        self.tag(id, group);
        id.to_string()
    }

    /// Looks up a scope by wire id.
    #[must_use]
    pub fn get_scope(&self, id: &str) -> Option<&ScopeRef> {
        let id = parse(id)?;
        if !id.is_scope() {
            return None;
        }
        self.scopes.get(&id.get())
    }

    /// Looks up a value by wire id.
    #[must_use]
    pub fn get_value(&self, id: &str) -> Option<&V> {
        let id = parse(id)?;
        if !id.is_value() {
            return None;
        }
        self.values.get(&id.get())
    }

    /// Returns the group `id` was tagged with, or `""` if none.
    #[must_use]
    pub fn get_object_group(&self, id: &str) -> &str {
        parse(id)
            .and_then(|id| self.id_to_group.get(&id.get()))
            .map_or("", String::as_str)
    }

    /// Releases the entry with the given wire id.
    ///
    /// Returns `true` if something was removed.
    pub fn release_object(&mut self, id: &str) -> bool {
        parse(id).is_some_and(|id| self.release_object_id(id.get()))
    }

    /// Releases the entry with the given raw id.
    ///
    /// Returns `true` if something was removed.
    pub fn release_object_id(&mut self, id: i64) -> bool {
        let removed = match id.signum() {
            -1 => self.scopes.remove(&id).is_some(),
            1 => self.values.remove(&id).is_some(),
            _ => false,
        };
        if removed {
            self.id_to_group.remove(&id);
        }
        removed
    }

    /// Releases every entry ever tagged with `group`.
    ///
    /// Entries released individually before are skipped.
    pub fn release_object_group(&mut self, group: &str) {
        let Some(ids) = self.group_to_ids.remove(group) else {
            return;
        };
        log::trace!("releasing object group `{group}` ({} ids)", ids.len());
        for id in ids {
            self.release_object_id(id);
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len() + self.values.len()
    }

    /// Returns `true` if no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tag(&mut self, id: i64, group: &str) {
        if group.is_empty() {
            return;
        }
        self.id_to_group.insert(id, group.to_owned());
        self.group_to_ids
            .entry(group.to_owned())
            .or_default()
            .push(id);
    }
}

fn parse(id: &str) -> Option<RemoteObjectId> {
    id.parse().ok()
}
