//! Runtime objects: suite instances and the per-suite static surface.
//!
//! An [`Object`] is a cheap, cloneable handle. Every test unit gets its own
//! freshly constructed instance; the statics object is shared by all units of
//! a suite and should only be written from suite setup and teardown.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::value::Value;

#[derive(Debug, Default)]
struct ObjectState {
    fields: BTreeMap<String, Value>,
}

/// Handle to a class-named field map.
#[derive(Clone)]
pub struct Object {
    class_name: Arc<str>,
    state: Arc<RwLock<ObjectState>>,
    statics: Option<Box<Object>>,
}

impl Object {
    /// Creates an empty statics object for a class.
    pub fn new_static(class_name: &str) -> Self {
        Self {
            class_name: Arc::from(class_name),
            state: Arc::default(),
            statics: None,
        }
    }

    /// Creates an empty instance linked to its class's statics object.
    pub fn new_instance(class_name: &str, statics: &Object) -> Self {
        Self {
            class_name: Arc::from(class_name),
            state: Arc::default(),
            statics: Some(Box::new(statics.clone())),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The suite-scoped statics object, if this is an instance.
    pub fn statics(&self) -> Option<&Object> {
        self.statics.as_deref()
    }

    /// Reads a field. Missing fields read as `None`.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.read().fields.get(field).cloned()
    }

    /// Reads a field, treating a missing one as [`Value::Nil`].
    pub fn get_or_nil(&self, field: &str) -> Value {
        self.get(field).unwrap_or_default()
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) {
        self.write().fields.insert(field.to_string(), value.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.read().fields.contains_key(field)
    }

    /// Updates a field in place under a single write lock.
    pub fn update<F>(&self, field: &str, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut state = self.write();
        let slot = state.fields.entry(field.to_string()).or_default();
        f(slot);
    }

    /// Copies all fields.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.read().fields.clone()
    }

    /// Whether two handles refer to the same object.
    pub fn same(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn read(&self) -> RwLockReadGuard<'_, ObjectState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObjectState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class_name)
            .field("fields", &self.read().fields)
            .finish()
    }
}
