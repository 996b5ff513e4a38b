//! Per-domain session state.
//!
//! Each protocol domain keeps its own nested key/value area in a
//! [`DomainState`]. Writes are staged in a [`Transaction`] and applied all at
//! once under the state's lock; reads hand out deep copies, so no caller ever
//! holds a reference into the shared tree.
//!
//! ```
//! use boa_debugger::{DomainState, StateValue};
//!
//! let state = DomainState::new();
//! {
//!     let mut tx = state.transaction();
//!     tx.add(&["Debugger", "enabled"], &StateValue::leaf(true));
//!     tx.add(&["Debugger", "pauseOnExceptions"], &StateValue::leaf("none"));
//! } // committed here
//!
//! let enabled = state.get_copy(&["Debugger", "enabled"]).unwrap();
//! assert_eq!(enabled.downcast_ref::<bool>(), Some(&true));
//! ```

use crate::sync::lock;
use rustc_hash::FxHashMap;
use std::{
    any::Any,
    fmt,
    sync::Mutex,
};

/// A value that can be stored as a [`StateValue::Leaf`].
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type.
pub trait LeafValue: Any + fmt::Debug + Send + Sync {
    /// Returns an owned deep copy of the value.
    fn clone_leaf(&self) -> Box<dyn LeafValue>;

    /// Upcasts to [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> LeafValue for T
where
    T: Any + Clone + fmt::Debug + Send + Sync,
{
    fn clone_leaf(&self) -> Box<dyn LeafValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dictionary of state values.
pub type StateDict = FxHashMap<String, StateValue>;

/// A node of the state tree.
///
/// Cloning a `StateValue` is a deep copy.
#[derive(Debug)]
pub enum StateValue {
    /// A nested dictionary.
    Dictionary(StateDict),
    /// An opaque value owned by the domain that stored it.
    Leaf(Box<dyn LeafValue>),
}

impl StateValue {
    /// Wraps `value` into a leaf.
    #[must_use]
    pub fn leaf<T>(value: T) -> Self
    where
        T: Any + Clone + fmt::Debug + Send + Sync,
    {
        Self::Leaf(Box::new(value))
    }

    /// Creates an empty dictionary.
    #[must_use]
    pub fn dictionary() -> Self {
        Self::Dictionary(StateDict::default())
    }

    /// Returns the dictionary if this is one.
    #[must_use]
    pub fn as_dict(&self) -> Option<&StateDict> {
        match self {
            Self::Dictionary(dict) => Some(dict),
            Self::Leaf(_) => None,
        }
    }

    /// Returns the leaf as a `T` if this is a leaf holding a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Leaf(leaf) => (**leaf).as_any().downcast_ref(),
            Self::Dictionary(_) => None,
        }
    }
}

impl Clone for StateValue {
    fn clone(&self) -> Self {
        match self {
            Self::Dictionary(dict) => Self::Dictionary(dict.clone()),
            Self::Leaf(leaf) => Self::Leaf((**leaf).clone_leaf()),
        }
    }
}

fn assert_path(path: &[&str]) {
    assert!(!path.is_empty(), "state paths must not be empty");
    debug_assert!(
        path.iter().all(|segment| !segment.is_empty()),
        "state path segments must not be empty: {path:?}"
    );
}

/// Traversing through a leaf is a caller bug; release builds recover.
fn not_a_dictionary(segment: &str) {
    if cfg!(debug_assertions) {
        panic!("state segment `{segment}` is not a dictionary");
    }
}

/// Follows `prefix` from `root`, creating missing dictionaries.
fn dict_mut<'a>(root: &'a mut StateDict, prefix: &[&str]) -> &'a mut StateDict {
    let mut dict = root;
    for segment in prefix {
        let entry = dict
            .entry((*segment).to_owned())
            .or_insert_with(StateValue::dictionary);
        if !matches!(entry, StateValue::Dictionary(_)) {
            not_a_dictionary(segment);
            *entry = StateValue::dictionary();
        }
        let StateValue::Dictionary(next) = entry else {
            unreachable!("entry was just made a dictionary");
        };
        dict = next;
    }
    dict
}

/// Follows `prefix` from `root` without creating anything.
fn find_dict_mut<'a>(root: &'a mut StateDict, prefix: &[&str]) -> Option<&'a mut StateDict> {
    let mut dict = root;
    for segment in prefix {
        match dict.get_mut(*segment)? {
            StateValue::Dictionary(next) => dict = next,
            StateValue::Leaf(_) => {
                not_a_dictionary(segment);
                return None;
            }
        }
    }
    Some(dict)
}

fn find_dict<'a>(root: &'a StateDict, prefix: &[&str]) -> Option<&'a StateDict> {
    let mut dict = root;
    for segment in prefix {
        match dict.get(*segment)? {
            StateValue::Dictionary(next) => dict = next,
            StateValue::Leaf(_) => {
                not_a_dictionary(segment);
                return None;
            }
        }
    }
    Some(dict)
}

/// Lock-protected nested state of one debugging session.
#[derive(Default)]
pub struct DomainState {
    root: Mutex<StateDict>,
}

impl DomainState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state holding `root`.
    #[must_use]
    pub fn from_dict(root: StateDict) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }

    /// Starts a transaction. Nothing is applied until it commits.
    #[must_use]
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            state: self,
            ops: Vec::new(),
        }
    }

    /// Returns a copy of the value stored at `path`, if every segment exists.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty.
    #[must_use]
    pub fn get_copy(&self, path: &[&str]) -> Option<StateValue> {
        assert_path(path);
        let (key, prefix) = path.split_last()?;
        let root = lock(&self.root);
        find_dict(&root, prefix)?.get(*key).cloned()
    }

    /// Returns a deep copy of the whole state.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::from_dict(self.snapshot())
    }

    /// Returns a deep copy of the root dictionary.
    #[must_use]
    pub fn snapshot(&self) -> StateDict {
        lock(&self.root).clone()
    }

    fn apply(&self, ops: Vec<(Vec<String>, Option<StateValue>)>) {
        if ops.is_empty() {
            return;
        }
        let mut root = lock(&self.root);
        for (path, value) in ops {
            let path: Vec<&str> = path.iter().map(String::as_str).collect();
            let Some((key, prefix)) = path.split_last() else {
                continue;
            };
            match value {
                Some(value) => {
                    dict_mut(&mut root, prefix).insert((*key).to_owned(), value);
                }
                None => {
                    if let Some(dict) = find_dict_mut(&mut root, prefix) {
                        dict.remove(*key);
                    }
                }
            }
        }
    }
}

impl Clone for DomainState {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl fmt::Debug for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainState")
            .field("root", &*lock(&self.root))
            .finish()
    }
}

/// Buffered writes to a [`DomainState`].
///
/// Commits on [`Transaction::commit`] or, failing that, when dropped.
pub struct Transaction<'state> {
    state: &'state DomainState,
    ops: Vec<(Vec<String>, Option<StateValue>)>,
}

impl Transaction<'_> {
    /// Stages a copy of `value` to be stored at `path`.
    ///
    /// Missing intermediate dictionaries are created on commit.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty.
    pub fn add(&mut self, path: &[&str], value: &StateValue) -> &mut Self {
        assert_path(path);
        self.ops.push((to_owned_path(path), Some(value.clone())));
        self
    }

    /// Stages the removal of `path`. Missing parents make this a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty.
    pub fn remove(&mut self, path: &[&str]) -> &mut Self {
        assert_path(path);
        self.ops.push((to_owned_path(path), None));
        self
    }

    /// Applies every staged operation at once.
    pub fn commit(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        log::trace!("committing {} domain state operations", ops.len());
        self.state.apply(ops);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("staged", &self.ops.len())
            .finish_non_exhaustive()
    }
}

fn to_owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|segment| (*segment).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Breakpoint {
        line: u32,
        condition: Option<String>,
    }

    #[test]
    fn transaction_commits_on_drop() {
        let state = DomainState::new();
        {
            let mut tx = state.transaction();
            tx.add(&["a", "b", "c"], &StateValue::leaf(1_u32));
            assert!(state.get_copy(&["a", "b", "c"]).is_none());
        }

        let value = state.get_copy(&["a", "b", "c"]).unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn explicit_commit_applies_everything() {
        let state = DomainState::new();
        let mut tx = state.transaction();
        tx.add(&["Debugger", "enabled"], &StateValue::leaf(true))
            .add(&["Runtime", "enabled"], &StateValue::leaf(true))
            .remove(&["Debugger", "enabled"]);
        tx.commit();

        assert!(state.get_copy(&["Debugger", "enabled"]).is_none());
        assert!(state.get_copy(&["Debugger"]).unwrap().as_dict().unwrap().is_empty());
        assert!(state.get_copy(&["Runtime", "enabled"]).is_some());
    }

    #[test]
    fn staged_values_are_copies() {
        let state = DomainState::new();
        let mut value = StateValue::leaf(Breakpoint {
            line: 3,
            condition: None,
        });
        let mut tx = state.transaction();
        tx.add(&["bp", "1"], &value);
        value = StateValue::leaf(Breakpoint {
            line: 9,
            condition: Some("x > 1".into()),
        });
        tx.commit();

        let stored = state.get_copy(&["bp", "1"]).unwrap();
        assert_eq!(stored.downcast_ref::<Breakpoint>().map(|bp| bp.line), Some(3));
        assert_eq!(value.downcast_ref::<Breakpoint>().map(|bp| bp.line), Some(9));
    }

    #[test]
    fn missing_paths_read_as_absent_and_remove_is_noop() {
        let state = DomainState::new();
        state.transaction().remove(&["nowhere", "key"]);

        assert!(state.get_copy(&["nowhere", "key"]).is_none());
        assert!(state.get_copy(&["nowhere"]).is_none());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn copy_is_independent() {
        let state = DomainState::new();
        state
            .transaction()
            .add(&["Debugger", "enabled"], &StateValue::leaf(true));

        let exported = state.clone();
        state.transaction().remove(&["Debugger", "enabled"]);

        assert!(state.get_copy(&["Debugger", "enabled"]).is_none());
        let enabled = exported.get_copy(&["Debugger", "enabled"]).unwrap();
        assert_eq!(enabled.downcast_ref::<bool>(), Some(&true));
    }

    #[test]
    fn readers_never_see_partial_commits() {
        let state = std::sync::Arc::new(DomainState::new());
        let writer_state = std::sync::Arc::clone(&state);
        let writer = std::thread::spawn(move || {
            for i in 0..200_u32 {
                let mut tx = writer_state.transaction();
                for key in ["a", "b", "c"] {
                    tx.add(&["d", key], &StateValue::leaf(i));
                }
                tx.commit();
            }
        });

        for _ in 0..200 {
            let snapshot = state.snapshot();
            let Some(dict) = snapshot.get("d").and_then(StateValue::as_dict) else {
                continue;
            };
            let values: Vec<Option<u32>> = ["a", "b", "c"]
                .iter()
                .map(|key| dict.get(*key).and_then(|v| v.downcast_ref::<u32>()).copied())
                .collect();
            assert!(values.iter().all(|v| *v == values[0]), "{values:?}");
        }
        writer.join().unwrap();
    }

    #[test]
    fn wrong_leaf_type_does_not_downcast() {
        let value = StateValue::leaf(5_i64);
        assert!(value.downcast_ref::<i32>().is_none());
        assert!(value.as_dict().is_none());
        assert!(StateValue::dictionary().downcast_ref::<i64>().is_none());
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_path_panics() {
        let state = DomainState::new();
        assert!(state.get_copy(&[]).is_none());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "is not a dictionary")]
    fn traversing_a_leaf_panics_in_debug() {
        let state = DomainState::new();
        state.transaction().add(&["a"], &StateValue::leaf(1_u8));
        assert!(state.get_copy(&["a", "b"]).is_none());
    }
}
