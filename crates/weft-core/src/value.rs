//! Dynamic values carried by props, state and context.
//!
//! A [`Record`] is an immutable key/value map shared behind an `Rc`. Every
//! "mutation" produces a new record, which keeps identity comparison
//! meaningful: two records are [`Record::ptr_eq`] only when one was cloned
//! from the other. The empty record has no allocation, so all empty records
//! share the same identity.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::descriptor::Descriptor;

/// Props handed to a unit by its owner.
pub type Props = Record;
/// Legacy context visible to a unit.
pub type Context = Record;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<[Value]>),
    Record(Record),
    Descriptor(Descriptor),
    Any(Rc<dyn Any>),
}

impl Value {
    /// Same-value comparison used by shallow equality. Scalars and strings
    /// compare by value, shared payloads compare by pointer.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::Descriptor(a), Value::Descriptor(b)) => a.ptr_eq(b),
            (Value::Any(a), Value::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Value::Descriptor(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Value::Any(value) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::List(values) => f.debug_list().entries(values.iter()).finish(),
            Value::Record(record) => fmt::Debug::fmt(record, f),
            Value::Descriptor(descriptor) => fmt::Debug::fmt(descriptor, f),
            Value::Any(_) => f.write_str("<any>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(Rc::from(values))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Descriptor> for Value {
    fn from(descriptor: Descriptor) -> Self {
        Value::Descriptor(descriptor)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

type Entries = HashMap<Rc<str>, Value>;

/// Immutable shared key/value map.
#[derive(Clone, Default)]
pub struct Record {
    entries: Option<Rc<Entries>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this record with `key` set to `value`.
    pub fn with(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Self {
        let mut entries = self.to_entries();
        entries.insert(key.into(), value.into());
        Self::from_entries(entries)
    }

    /// Returns a copy of this record without `key`.
    pub fn without(&self, key: &str) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        let mut entries = self.to_entries();
        entries.remove(key);
        Self::from_entries(entries)
    }

    fn from_entries(entries: Entries) -> Self {
        if entries.is_empty() {
            Self::default()
        } else {
            Self {
                entries: Some(Rc::new(entries)),
            }
        }
    }

    fn to_entries(&self) -> Entries {
        self.entries
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.as_deref().and_then(|entries| entries.get(key))
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn descriptor(&self, key: &str) -> Option<&Descriptor> {
        self.get(key).and_then(Value::as_descriptor)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.as_deref().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .as_deref()
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(key, value)| (&**key, value)))
    }

    /// Identity comparison. All empty records are identical.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        match (&self.entries, &other.entries) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// One-level merge; entries of `other` win on conflicts.
    pub fn merged(&self, other: &Record) -> Record {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut entries = self.to_entries();
        for (key, value) in other.iter() {
            entries.insert(Rc::from(key), value.clone());
        }
        Self::from_entries(entries)
    }

    /// Keeps only `keys`; missing keys are skipped.
    pub fn masked(&self, keys: &[&str]) -> Record {
        if keys.is_empty() || self.is_empty() {
            return Record::default();
        }
        let mut entries = Entries::default();
        for key in keys {
            if let Some(value) = self.get(key) {
                entries.insert(Rc::from(*key), value.clone());
            }
        }
        Self::from_entries(entries)
    }

    /// One-level comparison of keys and values.
    pub fn shallow_equal(&self, other: &Record) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(key, value)| {
            other
                .get(key)
                .map(|candidate| candidate.same(value))
                .unwrap_or(false)
        })
    }
}

/// Shallow comparison where a missing record (null state) only equals
/// another missing record.
pub fn shallow_equal(a: Option<&Record>, b: Option<&Record>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.shallow_equal(b),
        _ => false,
    }
}

impl<K: Into<Rc<str>>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries: Entries = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_entries(entries)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&str, &Value)> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map().entries(entries).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_records_share_identity() {
        assert!(Record::new().ptr_eq(&Record::default()));
        let filled = Record::new().with("a", 1);
        assert!(!filled.ptr_eq(&Record::new()));
        assert!(filled.ptr_eq(&filled.clone()));
    }

    #[test]
    fn merged_prefers_right_hand_entries() {
        let base = Record::new().with("a", 1).with("b", 2);
        let merged = base.merged(&Record::new().with("b", 3).with("c", 4));
        assert_eq!(merged.int("a"), Some(1));
        assert_eq!(merged.int("b"), Some(3));
        assert_eq!(merged.int("c"), Some(4));
        assert_eq!(base.int("b"), Some(2));
    }

    #[test]
    fn shallow_equal_compares_one_level() {
        let inner = Record::new().with("x", 1);
        let a = Record::new().with("n", 1).with("inner", inner.clone());
        let b = Record::new().with("n", 1).with("inner", inner);
        assert!(a.shallow_equal(&b));

        let c = Record::new()
            .with("n", 1)
            .with("inner", Record::new().with("x", 1));
        assert!(!a.shallow_equal(&c), "nested records compare by identity");
        assert!(!a.shallow_equal(&Record::new().with("n", 1)));
    }

    #[test]
    fn missing_state_only_equals_missing_state() {
        let empty = Record::new();
        assert!(shallow_equal(None, None));
        assert!(!shallow_equal(None, Some(&empty)));
        assert!(shallow_equal(Some(&empty), Some(&Record::default())));
    }

    #[test]
    fn masked_keeps_declared_keys_only() {
        let context = Record::new().with("theme", "dark").with("locale", "en");
        let masked = context.masked(&["theme", "missing"]);
        assert_eq!(masked.len(), 1);
        assert_eq!(masked.str("theme"), Some("dark"));
        assert!(context.masked(&[]).ptr_eq(&Record::new()));
    }

    #[test]
    fn nan_is_same_as_nan() {
        assert!(Value::Float(f64::NAN).same(&Value::Float(f64::NAN)));
        assert!(!Value::Float(0.0).same(&Value::Float(-0.0)));
    }
}
