//! Keys identify slots in the pools of a render graph.
//!
//! A [`Key`] names one slot inside a single pool. Since pass groups carry their own pools, a key alone
//! is only unique inside the pool it lives in. A [`GlobalKey`] is the path of keys from the root pools of the
//! graph down to the object, and stays stable no matter how deep the object is nested.
//!
//! # Example
//! ```
//! use vkrg::prelude::*;
//!
//! let blur = GlobalKey::from(Key::new("blur"));
//! let horizontal = blur.child(Key::with_id("tap", 1));
//! assert_eq!(horizontal.to_string(), "blur/tap:1");
//! ```

use std::fmt::{Display, Formatter};

use static_assertions::assert_impl_all;

/// Identifies one slot in a pool. The `id` disambiguates slots that share a name, for example
/// the taps of a multi-pass blur.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub name: &'static str,
    pub id: u32,
}

assert_impl_all!(Key: Copy, Send, Sync);

impl Key {
    /// Create a key with id zero.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            id: 0,
        }
    }

    /// Create a key with an explicit disambiguator.
    pub const fn with_id(name: &'static str, id: u32) -> Self {
        Self {
            name,
            id,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.id == 0 {
            f.write_str(self.name)
        } else {
            write!(f, "{}:{}", self.name, self.id)
        }
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key::new(value)
    }
}

/// Path of keys from the root pools of a graph to an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalKey(Vec<Key>);

assert_impl_all!(GlobalKey: Send, Sync);

impl GlobalKey {
    /// The empty path, naming the root of the graph.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a new key for a slot inside the pools owned by `self`.
    pub fn child(&self, key: impl Into<Key>) -> Self {
        let mut path = self.0.clone();
        path.push(key.into());
        Self(path)
    }

    /// The key of the slot in its own pool.
    pub fn last(&self) -> Option<Key> {
        self.0.last().copied()
    }

    /// Key of the pass group that owns this slot, or the root key if it lives in the root pools.
    pub fn parent(&self) -> GlobalKey {
        match self.0.split_last() {
            None => GlobalKey::root(),
            Some((_, rest)) => Self(rest.to_vec()),
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for GlobalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str("/")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl From<Key> for GlobalKey {
    fn from(value: Key) -> Self {
        Self(vec![value])
    }
}

impl From<&'static str> for GlobalKey {
    fn from(value: &'static str) -> Self {
        Self(vec![Key::new(value)])
    }
}

impl From<&GlobalKey> for GlobalKey {
    fn from(value: &GlobalKey) -> Self {
        value.clone()
    }
}

impl FromIterator<Key> for GlobalKey {
    fn from_iter<T: IntoIterator<Item = Key>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
