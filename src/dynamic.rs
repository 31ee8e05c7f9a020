//! Dynamic values: bindings that are refreshed once after every completed pass.
//!
//! The registry is owned by the host and only touched from the build thread. Other threads hand
//! observers over through [`Invalidator::register_observer`](crate::scheduler::Invalidator::register_observer).

use crate::environment::{Environment, EnvironmentKey};
use crate::error::ValueError;
use crate::scheduler::Invalidator;
use core::fmt;
use core::marker::PhantomData;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;
use tracing::error;

/// Resolves values for one refresh: the per-pass override environment first, then the ambient
/// environment.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    ambient: &'a Environment,
    override_env: Option<&'a Environment>,
}

impl<'a> Resolver<'a> {
    pub fn new(ambient: &'a Environment, override_env: Option<&'a Environment>) -> Resolver<'a> {
        Resolver {
            ambient,
            override_env,
        }
    }

    /// The environment a pass was built with.
    pub fn environment(&self) -> &'a Environment {
        self.override_env.unwrap_or(self.ambient)
    }

    /// Resolves an environment key. Falls back to the key's default.
    pub fn resolve<K: EnvironmentKey>(&self) -> K::Value {
        self.override_env
            .and_then(|env| env.lookup::<K>())
            .or_else(|| self.ambient.lookup::<K>())
            .unwrap_or_else(K::default_value)
    }

    /// Resolves an environment object. There is no default.
    pub fn resolve_object<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ValueError> {
        self.override_env
            .and_then(|env| env.object::<T>())
            .or_else(|| self.ambient.object::<T>())
            .ok_or(ValueError::NotFound {
                type_name: core::any::type_name::<T>(),
            })
    }
}

/// An observer refreshed after every pass.
pub trait DynamicValue: Send {
    /// Re-reads the backing value.
    fn refresh(&self, resolver: &Resolver) -> Result<(), ValueError>;

    /// Name used in diagnostics.
    fn describe(&self) -> String {
        core::any::type_name::<Self>().to_string()
    }
}

/// A binding to an environment key.
pub struct EnvValue<K: EnvironmentKey> {
    value: Arc<RwLock<K::Value>>,
    _key: PhantomData<fn() -> K>,
}

impl<K: EnvironmentKey> EnvValue<K> {
    /// Creates a binding holding the key's default until the first refresh.
    pub fn new() -> EnvValue<K> {
        EnvValue {
            value: Arc::new(RwLock::new(K::default_value())),
            _key: PhantomData,
        }
    }

    pub fn get(&self) -> K::Value {
        self.value.read().clone()
    }
}

impl<K: EnvironmentKey> Default for EnvValue<K> {
    fn default() -> EnvValue<K> {
        EnvValue::new()
    }
}

impl<K: EnvironmentKey> Clone for EnvValue<K> {
    fn clone(&self) -> EnvValue<K> {
        EnvValue {
            value: Arc::clone(&self.value),
            _key: PhantomData,
        }
    }
}

impl<K: EnvironmentKey> DynamicValue for EnvValue<K> {
    fn refresh(&self, resolver: &Resolver) -> Result<(), ValueError> {
        *self.value.write() = resolver.resolve::<K>();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("EnvValue<{}>", core::any::type_name::<K>())
    }
}

/// A binding to an externally-owned environment object.
pub struct EnvObject<T> {
    value: Arc<RwLock<Option<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EnvObject<T> {
    pub fn new() -> EnvObject<T> {
        EnvObject {
            value: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the object, or an error if the last refresh found none.
    pub fn get(&self) -> Result<Arc<T>, ValueError> {
        self.value.read().clone().ok_or(ValueError::NotFound {
            type_name: core::any::type_name::<T>(),
        })
    }
}

impl<T: Send + Sync + 'static> Default for EnvObject<T> {
    fn default() -> EnvObject<T> {
        EnvObject::new()
    }
}

impl<T> Clone for EnvObject<T> {
    fn clone(&self) -> EnvObject<T> {
        EnvObject {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Send + Sync + 'static> DynamicValue for EnvObject<T> {
    fn refresh(&self, resolver: &Resolver) -> Result<(), ValueError> {
        let resolved = resolver.resolve_object::<T>();
        let mut value = self.value.write();
        match resolved {
            Ok(object) => {
                *value = Some(object);
                Ok(())
            }
            Err(err) => {
                *value = None;
                Err(err)
            }
        }
    }

    fn describe(&self) -> String {
        format!("EnvObject<{}>", core::any::type_name::<T>())
    }
}

/// Application state that requests a rebuild whenever it is written.
pub struct Shared<T> {
    value: Arc<RwLock<T>>,
    invalidator: Invalidator,
}

impl<T> Shared<T> {
    pub fn new(value: T, invalidator: Invalidator) -> Shared<T> {
        Shared {
            value: Arc::new(RwLock::new(value)),
            invalidator,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.invalidator.request_rebuild();
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.value.write());
        self.invalidator.request_rebuild();
        result
    }
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    /// A two-way binding that reads and writes this state.
    pub fn binding(&self) -> Binding<T> {
        let (reader, writer) = (self.clone(), self.clone());
        Binding::new(move || reader.get(), move |value| writer.set(value))
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Shared<T> {
        Shared {
            value: Arc::clone(&self.value),
            invalidator: self.invalidator.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.value.read()).finish()
    }
}

/// A read-write view of a value owned elsewhere, handed to content that edits it.
pub struct Binding<T> {
    get: Arc<dyn Fn() -> T + Send + Sync>,
    set: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T: 'static> Binding<T> {
    pub fn new<G, S>(get: G, set: S) -> Binding<T>
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Binding {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// A binding that always reads `value` and ignores writes.
    pub fn constant(value: T) -> Binding<T>
    where
        T: Clone + Send + Sync,
    {
        Binding::new(move || value.clone(), |_| {})
    }

    pub fn get(&self) -> T {
        (self.get)()
    }

    pub fn set(&self, value: T) {
        (self.set)(value)
    }

    /// Narrows the binding to a part of the value. Writes go through the whole value.
    pub fn project<U, V, W>(&self, view: V, write: W) -> Binding<U>
    where
        U: 'static,
        V: Fn(&T) -> U + Send + Sync + 'static,
        W: Fn(&mut T, U) + Send + Sync + 'static,
    {
        let (get, outer_get, outer_set) = (Arc::clone(&self.get), Arc::clone(&self.get), Arc::clone(&self.set));
        Binding::new(
            move || view(&get()),
            move |part| {
                let mut whole = outer_get();
                write(&mut whole, part);
                outer_set(whole);
            },
        )
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Binding<T> {
        Binding {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Binding").field(&(self.get)()).finish()
    }
}

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

/// Outcome of one refresh of all observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refresh {
    pub refreshed: usize,
    /// Observers whose backing value could not be found.
    pub missing: Vec<ValueError>,
}

/// The registry of observers.
#[derive(Default)]
pub struct DynamicValues {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn DynamicValue>)>,
}

impl DynamicValues {
    pub fn new() -> DynamicValues {
        DynamicValues::default()
    }

    pub fn register<O: DynamicValue + 'static>(&mut self, observer: O) -> ObserverId {
        self.register_boxed(Box::new(observer))
    }

    pub fn register_boxed(&mut self, observer: Box<dyn DynamicValue>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let len = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != len
    }

    /// Refreshes every observer in registration order.
    pub fn refresh_all(&self, ambient: &Environment, override_env: Option<&Environment>) -> Refresh {
        let resolver = Resolver::new(ambient, override_env);
        let mut refresh = Refresh::default();
        for (_, observer) in &self.observers {
            match observer.refresh(&resolver) {
                Ok(()) => refresh.refreshed += 1,
                Err(err) => {
                    error!(observer = %observer.describe(), %err, "dynamic value not found");
                    refresh.missing.push(err);
                }
            }
        }
        refresh
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for DynamicValues {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.observers.iter().map(|(_, o)| o.describe()))
            .finish()
    }
}
