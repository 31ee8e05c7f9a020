//! Hierarchical typed values propagated down the node tree.
//!
//! An [`Environment`] is a persistent chain of scopes. Binding a value with [`Environment::with`]
//! pushes one scope in front of the chain and shares everything behind it, so a scope captured by
//! a node never changes afterwards.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::Arc;

/// A typed environment key with a default value.
///
/// ```
/// use sprig::environment::{Environment, EnvironmentKey};
///
/// struct Spacing;
/// impl EnvironmentKey for Spacing {
///     type Value = f64;
///     fn default_value() -> f64 {
///         8.
///     }
/// }
///
/// let env = Environment::new();
/// assert_eq!(env.get::<Spacing>(), 8.);
/// assert_eq!(env.with::<Spacing>(4.).get::<Spacing>(), 4.);
/// ```
pub trait EnvironmentKey: 'static {
    type Value: Clone + Send + Sync + 'static;

    /// The value used when no enclosing scope binds this key.
    fn default_value() -> Self::Value;
}

/// Identifies what a scope binds: either an [`EnvironmentKey`] or an environment object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Key(TypeId),
    Object(TypeId),
}

struct Scope {
    slot: Slot,
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Scope>>,
    depth: usize,
}

/// An immutable, structurally shared environment.
///
/// Cloning is cheap (one `Arc` clone).
#[derive(Clone, Default)]
pub struct Environment {
    head: Option<Arc<Scope>>,
}

impl Environment {
    /// Creates an empty environment where every key resolves to its default.
    pub fn new() -> Environment {
        Environment { head: None }
    }

    /// Returns the nearest binding for `K`, or its default.
    pub fn get<K: EnvironmentKey>(&self) -> K::Value {
        self.lookup::<K>().unwrap_or_else(K::default_value)
    }

    /// Returns the nearest binding for `K` without falling back to the default.
    pub fn lookup<K: EnvironmentKey>(&self) -> Option<K::Value> {
        self.find(Slot::Key(TypeId::of::<K>()))
            .and_then(|value| value.downcast_ref::<K::Value>())
            .cloned()
    }

    /// Returns a child scope that binds `K` to `value`. `self` is left untouched.
    pub fn with<K: EnvironmentKey>(&self, value: K::Value) -> Environment {
        self.push(
            Slot::Key(TypeId::of::<K>()),
            core::any::type_name::<K>(),
            Arc::new(value),
        )
    }

    /// Returns a child scope that carries an environment object, keyed by its own type.
    pub fn with_object<T: Send + Sync + 'static>(&self, object: Arc<T>) -> Environment {
        self.push(
            Slot::Object(TypeId::of::<T>()),
            core::any::type_name::<T>(),
            Arc::new(object),
        )
    }

    /// Returns the nearest environment object of type `T`.
    ///
    /// Objects have no default; absence is reported as `None`.
    pub fn object<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.find(Slot::Object(TypeId::of::<T>()))
            .and_then(|value| value.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Number of scopes in the chain.
    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |scope| scope.depth)
    }

    /// Returns true if both environments share the same head scope.
    ///
    /// Two environments that are `ptr_eq` resolve every key identically.
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn push(
        &self,
        slot: Slot,
        name: &'static str,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Environment {
        Environment {
            head: Some(Arc::new(Scope {
                slot,
                name,
                value,
                parent: self.head.clone(),
                depth: self.depth() + 1,
            })),
        }
    }

    fn find(&self, slot: Slot) -> Option<&(dyn Any + Send + Sync)> {
        let mut cursor = self.head.as_deref();
        while let Some(scope) = cursor {
            if scope.slot == slot {
                return Some(&*scope.value);
            }
            cursor = scope.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cursor = self.head.as_deref();
        while let Some(scope) = cursor {
            list.entry(&scope.name);
            cursor = scope.parent.as_deref();
        }
        list.finish()
    }
}

/// Lifecycle phase of the hosting scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenePhase {
    Active,
    Inactive,
    Background,
}

impl fmt::Display for ScenePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScenePhase::Active => write!(f, "active"),
            ScenePhase::Inactive => write!(f, "inactive"),
            ScenePhase::Background => write!(f, "background"),
        }
    }
}

/// Environment key for the current [`ScenePhase`]. Defaults to `Active`.
pub struct ScenePhaseKey;

impl EnvironmentKey for ScenePhaseKey {
    type Value = ScenePhase;
    fn default_value() -> ScenePhase {
        ScenePhase::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Accent;
    impl EnvironmentKey for Accent {
        type Value = &'static str;
        fn default_value() -> &'static str {
            "blue"
        }
    }

    struct FontSize;
    impl EnvironmentKey for FontSize {
        type Value = u32;
        fn default_value() -> u32 {
            12
        }
    }

    #[test]
    fn unbound_keys_resolve_to_default() {
        let env = Environment::new();
        assert_eq!(env.get::<Accent>(), "blue");
        assert_eq!(env.lookup::<Accent>(), None);
        assert_eq!(env.get::<ScenePhaseKey>(), ScenePhase::Active);
    }

    #[test]
    fn child_scope_shadows_without_touching_parent() {
        let parent = Environment::new().with::<Accent>("red");
        let child = parent.with::<Accent>("green").with::<FontSize>(20);

        assert_eq!(parent.get::<Accent>(), "red");
        assert_eq!(parent.get::<FontSize>(), 12);
        assert_eq!(child.get::<Accent>(), "green");
        assert_eq!(child.get::<FontSize>(), 20);
        assert_eq!(child.depth(), 3);
    }

    #[test]
    fn objects_are_keyed_by_type_and_have_no_default() {
        #[derive(Debug, PartialEq)]
        struct Store(u8);

        let env = Environment::new();
        assert!(env.object::<Store>().is_none());

        let env = env.with_object(Arc::new(Store(3)));
        assert_eq!(env.object::<Store>().as_deref(), Some(&Store(3)));
        // an object of a type never collides with a key of the same type
        assert_eq!(env.get::<FontSize>(), 12);
    }

    #[test]
    fn clones_share_scopes() {
        let env = Environment::new().with::<FontSize>(1);
        let copy = env.clone();
        assert!(env.ptr_eq(&copy));
        assert!(!env.ptr_eq(&env.with::<FontSize>(1)));
    }
}
