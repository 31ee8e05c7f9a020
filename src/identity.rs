//! Stable identities for children across rebuilds.

use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A key used to identify a child among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub u64);

impl Key {
    /// Derives a key by hashing a value.
    pub fn of<T: Hash + ?Sized>(value: &T) -> Key {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Key(hasher.finish())
    }

    /// Combines an outer and an inner key; used when keyed collections nest.
    pub fn combine(self, inner: Key) -> Key {
        Key::of(&(self.0, inner.0))
    }
}

impl From<u64> for Key {
    fn from(k: u64) -> Key {
        Key(k)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// The identity a node occupies in its parent's child list.
///
/// Reconciliation matches old and new children by slot key, so siblings with the same slot key
/// are the same logical child. Children without any user-visible identity are auto-keyed
/// sequentially, ignoring keyed siblings, e.g.
///
/// ```text
/// children   [A, B, C(key=1), D(key=2), E]
/// auto-key    0  1                      2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    /// An explicit key given on the descriptor.
    Explicit(Key),
    /// A node produced by an element of a keyed collection.
    ///
    /// - `collection`: ordinal of the keyed collection within the parent's expansion
    /// - `part`: index of this node among the nodes the element expanded to
    Element { collection: u32, key: Key, part: u32 },
    /// Position among the unkeyed siblings.
    Auto(u32),
}

impl SlotKey {
    /// Returns true for identities that survive reordering.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, SlotKey::Auto(_))
    }
}

/// The opaque value that produced a keyed child.
#[derive(Clone)]
pub struct TagValue {
    value: Arc<dyn Any + Send + Sync>,
    label: Arc<str>,
}

impl TagValue {
    pub fn new<T: fmt::Debug + Send + Sync + 'static>(value: T) -> TagValue {
        let label = format!("{:?}", value).into();
        TagValue {
            value: Arc::new(value),
            label,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// The `Debug` rendering of the value, captured at creation.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TagValue({})", self.label)
    }
}

/// Where a keyed child came from: the collection ordinal within its parent's expansion, and the
/// element key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub collection: u32,
    pub key: Key,
}

/// Per-expansion mapping from a child's tag to the element value that produced it.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    map: BTreeMap<Tag, TagValue>,
}

impl TagMap {
    pub fn new() -> TagMap {
        TagMap::default()
    }

    /// Records a tag. Returns false (and keeps the existing entry) if the key is already present.
    pub fn insert(&mut self, tag: Tag, value: TagValue) -> bool {
        use std::collections::btree_map::Entry;
        match self.map.entry(tag) {
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.map.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.map.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.map.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_keys_are_stable() {
        assert_eq!(Key::of("row-1"), Key::of("row-1"));
        assert_ne!(Key::of("row-1"), Key::of("row-2"));
        assert_ne!(Key(1).combine(Key(2)), Key(2).combine(Key(1)));
    }

    #[test]
    fn tag_map_keeps_first_entry() {
        let first = Tag {
            collection: 0,
            key: Key(7),
        };
        let other_collection = Tag {
            collection: 1,
            key: Key(7),
        };
        let mut tags = TagMap::new();
        assert!(tags.insert(first, TagValue::new("first")));
        assert!(!tags.insert(first, TagValue::new("second")));
        assert!(tags.insert(other_collection, TagValue::new("other")));
        assert_eq!(tags.len(), 2);
        let tag = tags.get(first).unwrap();
        assert_eq!(tag.downcast_ref::<&str>(), Some(&"first"));
        assert_eq!(tag.label(), "\"first\"");
    }

    #[test]
    fn only_auto_slots_are_positional() {
        assert!(!SlotKey::Auto(0).is_keyed());
        assert!(SlotKey::Explicit(Key(0)).is_keyed());
        assert!(SlotKey::Element {
            collection: 0,
            key: Key(0),
            part: 0
        }
        .is_keyed());
    }
}
