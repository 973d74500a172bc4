use serde_json::Value;
use tracing::trace;

/// Mutations made while applying defaults, oldest first.
///
/// Each action names its container by an absolute json-pointer into the
/// instance, so reverting touches only the containers that were changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Undo(Vec<Action>);

#[derive(Debug, Clone, PartialEq)]
enum Action {
    /// `key` was inserted into the object at `at`.
    Remove { at: String, key: String },
    /// defaults were appended to the array at `at`, which had `len` items.
    Truncate { at: String, len: usize },
}

impl Undo {
    pub(crate) fn inserted(&mut self, at: String, key: String) {
        self.0.push(Action::Remove { at, key });
    }

    pub(crate) fn appended(&mut self, at: String, len: usize) {
        self.0.push(Action::Truncate { at, len });
    }

    pub(crate) fn append(&mut self, other: Undo) {
        self.0.extend(other.0);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverts all actions, newest first. `base` is the pointer of `v`
    /// within the instance; every action lies at or below it.
    pub(crate) fn rollback(self, v: &mut Value, base: &str) {
        if !self.0.is_empty() {
            trace!(at = base, actions = self.0.len(), "rolling back defaults");
        }
        for action in self.0.into_iter().rev() {
            match action {
                Action::Remove { at, key } => {
                    let target = at.strip_prefix(base).and_then(|rel| v.pointer_mut(rel));
                    if let Some(Value::Object(obj)) = target {
                        // the key is the newest entry, so removal keeps key order
                        obj.remove(&key);
                    }
                }
                Action::Truncate { at, len } => {
                    let target = at.strip_prefix(base).and_then(|rel| v.pointer_mut(rel));
                    if let Some(Value::Array(arr)) = target {
                        arr.truncate(len);
                    }
                }
            }
        }
    }
}
