//! Typed content storage shared between operations.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

const JSON_NAMESPACE: &str = "json:";

type Slot = (&'static str, TypeId);

/// A named key that also fixes the type of the value stored under it.
///
/// Keys are cheap to copy and are usually declared as constants next to the
/// operation that writes them:
///
/// ```rust
/// use opflow::context::ContentKey;
///
/// const ORDER_ID: ContentKey<u64> = ContentKey::new("orders.id");
/// ```
pub struct ContentKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> ContentKey<T> {
    /// Creates a new key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContentKey<T> {}

impl<T> fmt::Debug for ContentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKey")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Scratch space operations read and write during a run.
///
/// Writes are last-write-wins. A typed entry is addressed by its name and its
/// type together, so reading with a key of another type returns `None` and
/// two keys sharing a name never replace each other. JSON entries are kept
/// apart from typed ones.
#[derive(Default)]
pub struct ContentBag {
    typed: HashMap<Slot, Box<dyn Any + Send + Sync>>,
    json: HashMap<String, serde_json::Value>,
}

impl ContentBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, returning the previous one stored under the same key.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: ContentKey<T>, value: T) -> Option<T> {
        self.typed
            .insert(slot(key), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Gets a value.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: ContentKey<T>) -> Option<&T> {
        self.typed
            .get(&slot(key))
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Gets a mutable reference to a value.
    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: ContentKey<T>) -> Option<&mut T> {
        self.typed
            .get_mut(&slot(key))
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Removes a value.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: ContentKey<T>) -> Option<T> {
        self.typed
            .remove(&slot(key))
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Checks if a value of the key's type is stored.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self, key: ContentKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// Stores an untyped JSON value under a dynamic name.
    ///
    /// JSON entries live in their own map and never collide with typed keys.
    pub fn insert_json(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.json.insert(name.into(), value)
    }

    /// Gets an untyped JSON value.
    #[must_use]
    pub fn get_json(&self, name: &str) -> Option<&serde_json::Value> {
        self.json.get(name)
    }

    /// Removes an untyped JSON value.
    pub fn remove_json(&mut self, name: &str) -> Option<serde_json::Value> {
        self.json.remove(name)
    }

    /// Returns the number of entries, typed and JSON.
    #[must_use]
    pub fn len(&self) -> usize {
        self.typed.len() + self.json.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.json.is_empty()
    }

    /// Returns all stored key names, sorted and deduplicated.
    ///
    /// JSON entries are listed with a `json:` prefix.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .typed
            .keys()
            .map(|(name, _)| (*name).to_string())
            .chain(self.json.keys().map(|name| format!("{JSON_NAMESPACE}{name}")))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl fmt::Debug for ContentBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentBag")
            .field("keys", &self.keys())
            .finish()
    }
}

fn slot<T: Any>(key: ContentKey<T>) -> Slot {
    (key.name, TypeId::of::<T>())
}

/// Capability for anything that carries a [`ContentBag`].
///
/// Operations that only need to stash state for a later step can depend on
/// this trait instead of the full context type.
pub trait ContentExt {
    /// Returns the content bag.
    fn content(&self) -> &ContentBag;

    /// Returns the content bag mutably.
    fn content_mut(&mut self) -> &mut ContentBag;

    /// Stores a value for a later step.
    fn stash<T: Any + Send + Sync>(&mut self, key: ContentKey<T>, value: T) -> Option<T> {
        self.content_mut().insert(key, value)
    }

    /// Reads a value stored by an earlier step.
    fn fetch<T: Any + Send + Sync>(&self, key: ContentKey<T>) -> Option<&T> {
        self.content().get(key)
    }
}

impl ContentExt for ContentBag {
    fn content(&self) -> &ContentBag {
        self
    }

    fn content_mut(&mut self) -> &mut ContentBag {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COUNT: ContentKey<u32> = ContentKey::new("count");
    const COUNT_AS_TEXT: ContentKey<String> = ContentKey::new("count");

    #[test]
    fn test_insert_and_get() {
        let mut bag = ContentBag::new();
        assert!(bag.insert(COUNT, 1).is_none());

        assert_eq!(bag.get(COUNT), Some(&1));
        assert!(bag.contains(COUNT));
    }

    #[test]
    fn test_last_write_wins() {
        let mut bag = ContentBag::new();
        bag.insert(COUNT, 1);
        let previous = bag.insert(COUNT, 2);

        assert_eq!(previous, Some(1));
        assert_eq!(bag.get(COUNT), Some(&2));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_wrong_type_reads_none() {
        let mut bag = ContentBag::new();
        bag.insert(COUNT, 7);

        assert!(bag.get(COUNT_AS_TEXT).is_none());
        assert!(bag.remove(COUNT_AS_TEXT).is_none());
        assert_eq!(bag.get(COUNT), Some(&7));
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut bag = ContentBag::new();
        bag.insert(COUNT, 1);
        *bag.get_mut(COUNT).unwrap() += 10;

        assert_eq!(bag.remove(COUNT), Some(11));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_json_namespace_is_separate() {
        let mut bag = ContentBag::new();
        bag.insert(COUNT, 3);
        bag.insert_json("count", serde_json::json!({"n": 3}));

        assert_eq!(bag.get(COUNT), Some(&3));
        assert_eq!(bag.get_json("count"), Some(&serde_json::json!({"n": 3})));
        assert_eq!(bag.keys(), vec!["count".to_string(), "json:count".to_string()]);
    }

    #[test]
    fn test_same_name_different_types_coexist() {
        let mut bag = ContentBag::new();
        assert!(bag.insert(COUNT, 4).is_none());
        assert!(bag.insert(COUNT_AS_TEXT, "four".to_string()).is_none());

        assert_eq!(bag.get(COUNT), Some(&4));
        assert_eq!(bag.get(COUNT_AS_TEXT).map(String::as_str), Some("four"));
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.keys(), vec!["count".to_string()]);

        assert_eq!(bag.remove(COUNT_AS_TEXT).as_deref(), Some("four"));
        assert_eq!(bag.get(COUNT), Some(&4));
    }

    #[test]
    fn test_prefixed_typed_key_does_not_shadow_json() {
        const PREFIXED: ContentKey<serde_json::Value> = ContentKey::new("json:count");

        let mut bag = ContentBag::new();
        bag.insert(PREFIXED, serde_json::json!("typed"));
        assert!(bag.insert_json("count", serde_json::json!("untyped")).is_none());

        assert_eq!(bag.get(PREFIXED), Some(&serde_json::json!("typed")));
        assert_eq!(bag.get_json("count"), Some(&serde_json::json!("untyped")));
        assert_eq!(bag.len(), 2);

        assert_eq!(bag.remove_json("count"), Some(serde_json::json!("untyped")));
        assert_eq!(bag.get(PREFIXED), Some(&serde_json::json!("typed")));
    }

    #[test]
    fn test_content_ext_helpers() {
        let mut bag = ContentBag::new();
        bag.stash(COUNT, 5);
        assert_eq!(bag.fetch(COUNT), Some(&5));
    }

    #[test]
    fn test_key_debug_includes_type() {
        let debug = format!("{COUNT:?}");
        assert!(debug.contains("count"));
        assert!(debug.contains("u32"));
    }
}
