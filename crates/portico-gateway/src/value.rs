use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// An opaque host instance held by the registry.
///
/// Concrete types are supplied by the embedding application (and by the
/// reflector, which downcasts through [`HostObject::as_any`] to reach them).
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    /// Fully qualified type name shown to the peer in diagnostics.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

pub type SharedList = Arc<Mutex<Vec<HostValue>>>;
pub type SharedMap = Arc<Mutex<BTreeMap<Key, HostValue>>>;
pub type SharedSet = Arc<Mutex<BTreeSet<Key>>>;
pub type SharedIter = Arc<Mutex<Box<dyn Iterator<Item = HostValue> + Send>>>;

/// Map keys and set elements are restricted to totally ordered primitives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Char(char),
    Str(String),
}

impl Key {
    /// Extracts a key from a primitive value; `None` for anything that
    /// cannot key a map (doubles, containers, objects).
    pub fn from_value(value: &HostValue) -> Option<Key> {
        match value {
            HostValue::Bool(v) => Some(Key::Bool(*v)),
            HostValue::Int(v) => Some(Key::Int(i64::from(*v))),
            HostValue::Long(v) => Some(Key::Int(*v)),
            HostValue::Char(v) => Some(Key::Char(*v)),
            HostValue::Str(v) => Some(Key::Str(v.clone())),
            _ => None,
        }
    }

    pub fn into_value(self) -> HostValue {
        match self {
            Key::Bool(v) => HostValue::Bool(v),
            Key::Int(v) => match i32::try_from(v) {
                Ok(small) => HostValue::Int(small),
                Err(_) => HostValue::Long(v),
            },
            Key::Char(v) => HostValue::Char(v),
            Key::Str(v) => HostValue::Str(v),
        }
    }
}

/// A dynamically typed host value: what the registry binds, what the
/// reflector consumes and produces, and what the classifier turns into a
/// wire envelope.
///
/// Containers are shared and interior-mutable so element-wise commands
/// mutate the registered container in place.
#[derive(Clone)]
pub enum HostValue {
    Null,
    /// Distinguished sentinel for methods that return nothing.
    Void,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Decimal(String),
    /// Ordered, growable sequence.
    List(SharedList),
    /// Fixed-length indexable sequence; elements may be replaced but the
    /// length never changes.
    Array(SharedList),
    Map(SharedMap),
    Set(SharedSet),
    /// Lazy single-pass producer. Has no cheap size.
    Iter(SharedIter),
    Object(Arc<dyn HostObject>),
}

impl HostValue {
    pub fn list(items: Vec<HostValue>) -> Self {
        HostValue::List(Arc::new(Mutex::new(items)))
    }

    pub fn array(items: Vec<HostValue>) -> Self {
        HostValue::Array(Arc::new(Mutex::new(items)))
    }

    pub fn map(entries: impl IntoIterator<Item = (Key, HostValue)>) -> Self {
        HostValue::Map(Arc::new(Mutex::new(entries.into_iter().collect())))
    }

    pub fn set(elements: impl IntoIterator<Item = Key>) -> Self {
        HostValue::Set(Arc::new(Mutex::new(elements.into_iter().collect())))
    }

    pub fn iterator(iter: impl Iterator<Item = HostValue> + Send + 'static) -> Self {
        HostValue::Iter(Arc::new(Mutex::new(Box::new(iter))))
    }

    pub fn object(object: impl HostObject) -> Self {
        HostValue::Object(Arc::new(object))
    }

    /// A short human-readable type description used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Void => "void".to_string(),
            HostValue::Bool(_) => "boolean".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Long(_) => "long".to_string(),
            HostValue::Double(_) => "double".to_string(),
            HostValue::Char(_) => "char".to_string(),
            HostValue::Str(_) => "string".to_string(),
            HostValue::Bytes(_) => "bytes".to_string(),
            HostValue::Decimal(_) => "decimal".to_string(),
            HostValue::List(_) => "list".to_string(),
            HostValue::Array(_) => "array".to_string(),
            HostValue::Map(_) => "map".to_string(),
            HostValue::Set(_) => "set".to_string(),
            HostValue::Iter(_) => "iterator".to_string(),
            HostValue::Object(object) => object.type_name().to_string(),
        }
    }

    /// Identity comparison: true only when both sides are the same shared
    /// container or object. Primitives are never identical in this sense.
    pub fn is_same_object(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::List(a), HostValue::List(b)) => Arc::ptr_eq(a, b),
            (HostValue::Array(a), HostValue::Array(b)) => Arc::ptr_eq(a, b),
            (HostValue::Map(a), HostValue::Map(b)) => Arc::ptr_eq(a, b),
            (HostValue::Set(a), HostValue::Set(b)) => Arc::ptr_eq(a, b),
            (HostValue::Iter(a), HostValue::Iter(b)) => Arc::ptr_eq(a, b),
            (HostValue::Object(a), HostValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Downcasts an [`HostValue::Object`] to a concrete host type.
    pub fn downcast_object<T: HostObject>(&self) -> Option<&T> {
        match self {
            HostValue::Object(object) => object.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Void, HostValue::Void) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Long(a), HostValue::Long(b)) => a == b,
            (HostValue::Double(a), HostValue::Double(b)) => a == b,
            (HostValue::Char(a), HostValue::Char(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::Decimal(a), HostValue::Decimal(b)) => a == b,
            _ => self.is_same_object(other),
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Void => f.write_str("Void"),
            HostValue::Bool(v) => write!(f, "Bool({v})"),
            HostValue::Int(v) => write!(f, "Int({v})"),
            HostValue::Long(v) => write!(f, "Long({v})"),
            HostValue::Double(v) => write!(f, "Double({v})"),
            HostValue::Char(v) => write!(f, "Char({v:?})"),
            HostValue::Str(v) => write!(f, "Str({v:?})"),
            HostValue::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            HostValue::Decimal(v) => write!(f, "Decimal({v})"),
            HostValue::List(v) => write!(f, "List(len={})", v.lock().len()),
            HostValue::Array(v) => write!(f, "Array(len={})", v.lock().len()),
            HostValue::Map(v) => write!(f, "Map(len={})", v.lock().len()),
            HostValue::Set(v) => write!(f, "Set(len={})", v.lock().len()),
            HostValue::Iter(_) => f.write_str("Iter"),
            HostValue::Object(object) => write!(f, "Object({})", object.type_name()),
        }
    }
}
