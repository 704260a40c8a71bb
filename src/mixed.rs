use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::ObjLink;
use crate::type_info::Persist;

/// A dynamically typed value holding any supported leaf type, a nested list
/// of values, a nested string-keyed map of values, or a link to a stored
/// object.
///
/// Unmanaged values own their payload; a nested collection is a deep copy.
/// Values physically resident inside a stored object's column are reached
/// through [`ManagedMixed`](crate::ManagedMixed), which forwards to the
/// backing store instead.
#[derive(Clone, Default)]
pub enum Mixed {
    #[default]
    Null,
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    ObjectId(ObjectId),
    Uuid(Uuid),
    Decimal(Decimal),
    List(Vec<Mixed>),
    Dictionary(BTreeMap<String, Mixed>),
    Link(ObjLink),
}

/// The active variant of a [`Mixed`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixedKind {
    Null,
    Int,
    Bool,
    String,
    Double,
    Binary,
    Timestamp,
    ObjectId,
    Uuid,
    Decimal,
    List,
    Dictionary,
    Link,
}

impl Mixed {
    pub fn is_null(&self) -> bool {
        matches!(self, Mixed::Null)
    }

    pub fn kind(&self) -> MixedKind {
        match self {
            Mixed::Null => MixedKind::Null,
            Mixed::Int(_) => MixedKind::Int,
            Mixed::Bool(_) => MixedKind::Bool,
            Mixed::String(_) => MixedKind::String,
            Mixed::Double(_) => MixedKind::Double,
            Mixed::Binary(_) => MixedKind::Binary,
            Mixed::Timestamp(_) => MixedKind::Timestamp,
            Mixed::ObjectId(_) => MixedKind::ObjectId,
            Mixed::Uuid(_) => MixedKind::Uuid,
            Mixed::Decimal(_) => MixedKind::Decimal,
            Mixed::List(_) => MixedKind::List,
            Mixed::Dictionary(_) => MixedKind::Dictionary,
            Mixed::Link(_) => MixedKind::Link,
        }
    }

    /// Borrow the list payload.
    ///
    /// Fails unless the active variant is [`Mixed::List`].
    pub fn get_list(&self) -> Result<&[Mixed]> {
        match self {
            Mixed::List(items) => Ok(items),
            other => Err(Error::TypeMismatch {
                expected: "List".into(),
                found: format!("{:?}", other.kind()),
            }),
        }
    }

    /// Borrow the dictionary payload.
    ///
    /// Fails unless the active variant is [`Mixed::Dictionary`].
    pub fn get_dictionary(&self) -> Result<&BTreeMap<String, Mixed>> {
        match self {
            Mixed::Dictionary(entries) => Ok(entries),
            other => Err(Error::TypeMismatch {
                expected: "Dictionary".into(),
                found: format!("{:?}", other.kind()),
            }),
        }
    }

    /// Rank used to order values of different variants. Int and Double share
    /// a rank; they compare numerically instead.
    fn type_rank(&self) -> u8 {
        match self {
            Mixed::Null => 0,
            Mixed::Bool(_) => 1,
            Mixed::Int(_) | Mixed::Double(_) => 2,
            Mixed::String(_) => 3,
            Mixed::Binary(_) => 4,
            Mixed::Timestamp(_) => 5,
            Mixed::ObjectId(_) => 6,
            Mixed::Uuid(_) => 7,
            Mixed::Decimal(_) => 8,
            Mixed::List(_) => 9,
            Mixed::Dictionary(_) => 10,
            Mixed::Link(_) => 11,
        }
    }
}

/// Extract a typed value from a [`Mixed`].
///
/// The active variant must match `T` exactly; there is no numeric
/// promotion (an `Int`-holding value is not readable as `f64`). Equality
/// between `Mixed` values is the only place Int and Double coerce.
pub fn mixed_cast<T: Persist>(value: &Mixed) -> Result<T> {
    T::from_mixed(value.clone())
}

/// Equality is defined pairwise by variant: two nulls are equal,
/// same-variant payloads compare naturally, and the single documented
/// coercion is Int vs Double comparing numerically. Every other
/// cross-variant comparison is false.
impl PartialEq for Mixed {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Mixed::Null, Mixed::Null) => true,
            (Mixed::Int(a), Mixed::Int(b)) => a == b,
            (Mixed::Int(a), Mixed::Double(b)) | (Mixed::Double(b), Mixed::Int(a)) => {
                *a as f64 == *b
            }
            (Mixed::Bool(a), Mixed::Bool(b)) => a == b,
            (Mixed::String(a), Mixed::String(b)) => a == b,
            (Mixed::Double(a), Mixed::Double(b)) => a == b,
            (Mixed::Binary(a), Mixed::Binary(b)) => a == b,
            (Mixed::Timestamp(a), Mixed::Timestamp(b)) => a == b,
            (Mixed::ObjectId(a), Mixed::ObjectId(b)) => a == b,
            (Mixed::Uuid(a), Mixed::Uuid(b)) => a == b,
            (Mixed::Decimal(a), Mixed::Decimal(b)) => a == b,
            (Mixed::List(a), Mixed::List(b)) => a == b,
            (Mixed::Dictionary(a), Mixed::Dictionary(b)) => a == b,
            (Mixed::Link(a), Mixed::Link(b)) => a == b,
            _ => false,
        }
    }
}

/// Ordering within a variant is the payload's natural order (Double
/// involving NaN is unordered). Across variants, values order by an
/// explicit type rank: Null < Bool < Int/Double < String < Binary <
/// Timestamp < ObjectId < Uuid < Decimal < List < Dictionary < Link.
impl PartialOrd for Mixed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Mixed::Null, Mixed::Null) => Some(Ordering::Equal),
            (Mixed::Int(a), Mixed::Int(b)) => a.partial_cmp(b),
            (Mixed::Int(a), Mixed::Double(b)) => (*a as f64).partial_cmp(b),
            (Mixed::Double(a), Mixed::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Mixed::Double(a), Mixed::Double(b)) => a.partial_cmp(b),
            (Mixed::Bool(a), Mixed::Bool(b)) => a.partial_cmp(b),
            (Mixed::String(a), Mixed::String(b)) => a.partial_cmp(b),
            (Mixed::Binary(a), Mixed::Binary(b)) => a.partial_cmp(b),
            (Mixed::Timestamp(a), Mixed::Timestamp(b)) => a.partial_cmp(b),
            (Mixed::ObjectId(a), Mixed::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Mixed::Uuid(a), Mixed::Uuid(b)) => a.partial_cmp(b),
            (Mixed::Decimal(a), Mixed::Decimal(b)) => a.partial_cmp(b),
            (Mixed::List(a), Mixed::List(b)) => a.partial_cmp(b),
            (Mixed::Dictionary(a), Mixed::Dictionary(b)) => a.partial_cmp(b),
            (Mixed::Link(a), Mixed::Link(b)) => a.partial_cmp(b),
            _ => self.type_rank().partial_cmp(&other.type_rank()),
        }
    }
}

impl Debug for Mixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mixed::Null => write!(f, "Null"),
            Mixed::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Mixed::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Mixed::String(v) => f.debug_tuple("String").field(v).finish(),
            Mixed::Double(v) => f.debug_tuple("Double").field(v).finish(),
            Mixed::Binary(v) => write!(f, "Binary(0x{})", hex::encode(v)),
            Mixed::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            Mixed::ObjectId(v) => f.debug_tuple("ObjectId").field(v).finish(),
            Mixed::Uuid(v) => f.debug_tuple("Uuid").field(v).finish(),
            Mixed::Decimal(v) => f.debug_tuple("Decimal").field(v).finish(),
            Mixed::List(v) => f.debug_tuple("List").field(v).finish(),
            Mixed::Dictionary(v) => f.debug_tuple("Dictionary").field(v).finish(),
            Mixed::Link(v) => f.debug_tuple("Link").field(v).finish(),
        }
    }
}

macro_rules! mixed_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Mixed {
                fn from(value: $ty) -> Self {
                    Mixed::$variant(value)
                }
            }
        )+
    };
}

mixed_from!(
    i64 => Int,
    bool => Bool,
    String => String,
    f64 => Double,
    Vec<u8> => Binary,
    DateTime<Utc> => Timestamp,
    ObjectId => ObjectId,
    Uuid => Uuid,
    Decimal => Decimal,
    Vec<Mixed> => List,
    BTreeMap<String, Mixed> => Dictionary,
    ObjLink => Link,
);

impl From<&str> for Mixed {
    fn from(value: &str) -> Self {
        Mixed::String(value.to_owned())
    }
}

impl<T> From<Option<T>> for Mixed
where
    T: Into<Mixed>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Mixed::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Mixed, mixed_cast};

    #[test]
    fn test_equality_within_variant() {
        assert_eq!(Mixed::Int(5), Mixed::Int(5));
        assert_ne!(Mixed::Int(5), Mixed::Int(6));
        assert_eq!(Mixed::from("abc"), Mixed::String("abc".into()));
        assert_eq!(Mixed::Null, Mixed::Null);
    }

    #[test]
    fn test_equality_across_variants_is_false() {
        assert_ne!(Mixed::Int(5), Mixed::from("5"));
        assert_ne!(Mixed::Bool(true), Mixed::Int(1));
        assert_ne!(Mixed::Null, Mixed::Int(0));
        assert_ne!(Mixed::Binary(vec![1]), Mixed::List(vec![Mixed::Int(1)]));
    }

    #[test]
    fn test_numeric_coercion_is_symmetric() {
        assert_eq!(Mixed::Int(5), Mixed::Double(5.0));
        assert_eq!(Mixed::Double(5.0), Mixed::Int(5));
        assert_ne!(Mixed::Int(5), Mixed::Double(5.5));
    }

    #[test]
    fn test_ordering_within_variant() {
        assert!(Mixed::Int(1) < Mixed::Int(2));
        assert!(Mixed::from("a") < Mixed::from("b"));
        assert!(Mixed::Int(1) < Mixed::Double(1.5));
        assert!(Mixed::Double(2.5) > Mixed::Int(2));
    }

    #[test]
    fn test_ordering_across_variants_follows_rank() {
        // Null < Bool < numeric < String < ... < List < Dictionary < Link
        assert!(Mixed::Null < Mixed::Bool(false));
        assert!(Mixed::Bool(true) < Mixed::Int(0));
        assert!(Mixed::Int(i64::MAX) < Mixed::from(""));
        assert!(Mixed::from("zzz") < Mixed::Binary(vec![]));
        assert!(Mixed::List(vec![]) < Mixed::Dictionary(BTreeMap::new()));
    }

    #[test]
    fn test_nan_is_unordered() {
        let nan = Mixed::Double(f64::NAN);
        assert_eq!(nan.partial_cmp(&Mixed::Double(1.0)), None);
        assert_eq!(nan.partial_cmp(&Mixed::Int(1)), None);
        assert_ne!(nan, nan.clone());
    }

    #[test]
    fn test_cast_requires_exact_variant() {
        assert_eq!(mixed_cast::<i64>(&Mixed::Int(42)).unwrap(), 42);
        assert!(mixed_cast::<String>(&Mixed::Int(42)).is_err());
        // No numeric promotion through casts.
        assert!(mixed_cast::<f64>(&Mixed::Int(42)).is_err());
    }

    #[test]
    fn test_collection_access_checks_variant() {
        let list = Mixed::List(vec![Mixed::Int(1), Mixed::from("two")]);
        assert_eq!(list.get_list().unwrap().len(), 2);
        assert!(list.get_dictionary().is_err());

        let mut entries = BTreeMap::new();
        entries.insert("a".to_owned(), Mixed::Int(1));
        let dict = Mixed::Dictionary(entries);
        assert_eq!(dict.get_dictionary().unwrap().len(), 1);
        assert!(dict.get_list().is_err());

        assert!(Mixed::Int(3).get_list().is_err());
    }

    #[test]
    fn test_binary_debug_is_hex() {
        assert_eq!(format!("{:?}", Mixed::Binary(vec![0xDE, 0xAD])), "Binary(0xdead)");
    }
}
