//! Entity fields and lazily computed overrides
//!
//! A field is either a JSON value or a reference to another entity (the
//! usual product of an override that turns `"author": "/users/1"` into the
//! cached `/users/1` resource). Each field lives in a [`Slot`]: a concrete
//! value, or a lazy override that is evaluated on first read and then
//! replaced by its result.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::collection::Collection;
use crate::entity::{Entity, EntityRef};
use crate::error::{ResourceError, Result};
use crate::resource::Resource;

/// Prefix marking entity metadata keys that data merges never touch
pub const RESERVED_PREFIX: char = '$';

/// Deferred computation installed by an override
pub type Compute = Box<dyn FnOnce() -> Field + Send>;

/// The value of one entity field
#[derive(Debug, Clone)]
pub enum Field {
    /// Plain JSON data
    Value(Value),
    /// Another cached entity
    Entity(EntityRef),
}

impl Field {
    /// A JSON `null` field
    pub fn null() -> Self {
        Field::Value(Value::Null)
    }

    /// True for a JSON `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Value(Value::Null))
    }

    /// The JSON value, if this field holds one
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            Field::Entity(_) => None,
        }
    }

    /// The string, if this field holds a JSON string
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// The entity reference, if this field holds one
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Field::Entity(entity) => Some(entity),
            Field::Value(_) => None,
        }
    }

    /// The resource, if this field references one
    pub fn as_resource(&self) -> Option<&Resource> {
        self.as_entity().and_then(EntityRef::as_resource)
    }

    /// The collection, if this field references one
    pub fn as_collection(&self) -> Option<&Collection> {
        self.as_entity().and_then(EntityRef::as_collection)
    }

    /// JSON rendering; entities render as their path (or `null` if unknown)
    pub fn to_json(&self) -> Value {
        match self {
            Field::Value(value) => value.clone(),
            Field::Entity(entity) => entity.path().map(Value::String).unwrap_or(Value::Null),
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Field::Value(a), Field::Value(b)) => a == b,
            (Field::Entity(a), Field::Entity(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq<Value> for Field {
    fn eq(&self, other: &Value) -> bool {
        self.as_value() == Some(other)
    }
}

impl PartialEq<&str> for Field {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Value(value)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Value(Value::String(value))
    }
}

impl From<EntityRef> for Field {
    fn from(entity: EntityRef) -> Self {
        Field::Entity(entity)
    }
}

impl From<Resource> for Field {
    fn from(resource: Resource) -> Self {
        Field::Entity(resource.to_entity_ref())
    }
}

impl From<Collection> for Field {
    fn from(collection: Collection) -> Self {
        Field::Entity(collection.to_entity_ref())
    }
}

enum Slot {
    Concrete(Field),
    Lazy { compute: Compute, original: Field },
}

/// Outcome of the first half of a field read
pub(crate) enum Read {
    Missing,
    Ready(Field),
    Compute(Compute),
}

/// Per-entity field storage
#[derive(Default)]
pub(crate) struct Fields {
    slots: BTreeMap<String, Slot>,
    overrides: BTreeMap<String, Field>,
}

impl Fields {
    /// Start reading `name`.
    ///
    /// A lazy slot is disarmed here and its compute function handed back, so
    /// the caller can run it without holding the entity lock. Until the
    /// caller stores the result the slot reads as its original value.
    pub(crate) fn begin_read(&mut self, name: &str) -> Read {
        let Some(slot) = self.slots.get_mut(name) else {
            return Read::Missing;
        };
        match std::mem::replace(slot, Slot::Concrete(Field::null())) {
            Slot::Concrete(field) => {
                *slot = Slot::Concrete(field.clone());
                Read::Ready(field)
            }
            Slot::Lazy { compute, original } => {
                *slot = Slot::Concrete(original);
                Read::Compute(compute)
            }
        }
    }

    pub(crate) fn set(&mut self, name: &str, field: Field) {
        self.slots.insert(name.to_string(), Slot::Concrete(field));
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub(crate) fn is_lazy(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Slot::Lazy { .. }))
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Install a lazy override for an existing field
    pub(crate) fn proxy(&mut self, name: &str, compute: Compute) -> Result<()> {
        let current = match self.slots.get(name) {
            None => {
                return Err(ResourceError::invalid(format!(
                    "cannot proxy missing property '{}'",
                    name
                )))
            }
            Some(Slot::Concrete(field)) => field.clone(),
            Some(Slot::Lazy { original, .. }) => original.clone(),
        };

        self.overrides.insert(name.to_string(), current.clone());
        if current.is_null() {
            return Ok(());
        }
        self.slots.insert(
            name.to_string(),
            Slot::Lazy {
                compute,
                original: current,
            },
        );
        Ok(())
    }

    /// Current value of `name` without evaluating overrides
    pub(crate) fn peek(&self, name: &str) -> Option<Field> {
        self.slots.get(name).map(|slot| match slot {
            Slot::Concrete(field) => field.clone(),
            Slot::Lazy { original, .. } => original.clone(),
        })
    }

    /// Merge plain data, skipping reserved and previously proxied keys
    pub(crate) fn extend(&mut self, data: &Map<String, Value>) {
        for (key, value) in data {
            if key.starts_with(RESERVED_PREFIX) || self.overrides.contains_key(key) {
                continue;
            }
            self.set(key, Field::Value(value.clone()));
        }
    }

    /// Merge another entity's concrete fields
    pub(crate) fn extend_fields(&mut self, fields: Vec<(String, Field)>) {
        for (key, field) in fields {
            if key.starts_with(RESERVED_PREFIX) || self.overrides.contains_key(&key) {
                continue;
            }
            self.set(&key, field);
        }
    }

    pub(crate) fn concrete(&self) -> Vec<(String, Field)> {
        self.slots
            .iter()
            .map(|(key, slot)| {
                let field = match slot {
                    Slot::Concrete(field) => field.clone(),
                    Slot::Lazy { original, .. } => original.clone(),
                };
                (key.clone(), field)
            })
            .collect()
    }

    pub(crate) fn overrides(&self) -> BTreeMap<String, Field> {
        self.overrides.clone()
    }

    pub(crate) fn to_json(&self) -> Value {
        let map = self
            .concrete()
            .into_iter()
            .map(|(key, field)| (key, field.to_json()))
            .collect::<Map<String, Value>>();
        Value::Object(map)
    }
}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, slot) in &self.slots {
            match slot {
                Slot::Concrete(field) => map.entry(key, field),
                Slot::Lazy { .. } => map.entry(key, &"<lazy>"),
            };
        }
        map.finish()
    }
}
