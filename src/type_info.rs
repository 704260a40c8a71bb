use std::collections::{BTreeMap, BTreeSet};

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::link::Link;
use crate::mixed::Mixed;
use crate::property::PropertyType;
use crate::schema::Model;

/// Resolves a static field type to its storage type tag.
///
/// There is no runtime fallback: a field type without an implementation is
/// rejected when the schema descriptor is compiled.
pub trait TypeInfo {
    /// The resolved storage type of the field.
    const TYPE: PropertyType;

    /// The name of the target table, for link-bearing fields.
    const TARGET: Option<&'static str> = None;
}

/// Lossless conversion between a static leaf type and its dynamic wire
/// representation.
///
/// For every supported value `v`, `from_mixed(v.to_mixed())` returns `v`
/// unchanged; `from_mixed` fails on any other variant.
pub trait Persist: TypeInfo + Sized {
    fn to_mixed(&self) -> Mixed;

    fn from_mixed(value: Mixed) -> Result<Self>;
}

fn mismatch(expected: &str, found: &Mixed) -> Error {
    Error::TypeMismatch {
        expected: expected.into(),
        found: format!("{:?}", found.kind()),
    }
}

macro_rules! persist_leaf {
    ($($ty:ty => $tag:ident / $variant:ident),+ $(,)?) => {
        $(
            impl TypeInfo for $ty {
                const TYPE: PropertyType = PropertyType::$tag;
            }

            impl Persist for $ty {
                fn to_mixed(&self) -> Mixed {
                    Mixed::$variant(self.clone())
                }

                fn from_mixed(value: Mixed) -> Result<Self> {
                    match value {
                        Mixed::$variant(v) => Ok(v),
                        other => Err(mismatch(stringify!($variant), &other)),
                    }
                }
            }
        )+
    };
}

persist_leaf!(
    i64 => INT / Int,
    bool => BOOL / Bool,
    String => STRING / String,
    f64 => DOUBLE / Double,
    Vec<u8> => BINARY / Binary,
    DateTime<Utc> => DATE / Timestamp,
    ObjectId => OBJECT_ID / ObjectId,
    Uuid => UUID / Uuid,
    Decimal => DECIMAL / Decimal,
);

/// The open union resolves to the Mixed tag, always nullable. Its closed
/// set of alternatives is fixed by the definition of [`Mixed`] itself.
impl TypeInfo for Mixed {
    const TYPE: PropertyType = PropertyType::MIXED.or(PropertyType::NULLABLE);
}

impl Persist for Mixed {
    fn to_mixed(&self) -> Mixed {
        self.clone()
    }

    fn from_mixed(value: Mixed) -> Result<Self> {
        Ok(value)
    }
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const TYPE: PropertyType = T::TYPE.or(PropertyType::NULLABLE);
    const TARGET: Option<&'static str> = T::TARGET;
}

impl<T: Persist> Persist for Option<T> {
    fn to_mixed(&self) -> Mixed {
        match self {
            Some(value) => value.to_mixed(),
            None => Mixed::Null,
        }
    }

    fn from_mixed(value: Mixed) -> Result<Self> {
        match value {
            Mixed::Null => Ok(None),
            other => T::from_mixed(other).map(Some),
        }
    }
}

impl<T: Persist> TypeInfo for Vec<T> {
    const TYPE: PropertyType = T::TYPE.or(PropertyType::ARRAY);
    const TARGET: Option<&'static str> = T::TARGET;
}

impl<T: Persist> Persist for Vec<T> {
    fn to_mixed(&self) -> Mixed {
        Mixed::List(self.iter().map(Persist::to_mixed).collect())
    }

    fn from_mixed(value: Mixed) -> Result<Self> {
        match value {
            Mixed::List(items) => items.into_iter().map(T::from_mixed).collect(),
            other => Err(mismatch("List", &other)),
        }
    }
}

impl<T: Persist + Ord> TypeInfo for BTreeSet<T> {
    const TYPE: PropertyType = T::TYPE.or(PropertyType::SET);
    const TARGET: Option<&'static str> = T::TARGET;
}

impl<T: Persist + Ord> Persist for BTreeSet<T> {
    fn to_mixed(&self) -> Mixed {
        Mixed::List(self.iter().map(Persist::to_mixed).collect())
    }

    fn from_mixed(value: Mixed) -> Result<Self> {
        match value {
            Mixed::List(items) => items.into_iter().map(T::from_mixed).collect(),
            other => Err(mismatch("List", &other)),
        }
    }
}

impl<T: Persist> TypeInfo for BTreeMap<String, T> {
    const TYPE: PropertyType = T::TYPE.or(PropertyType::DICTIONARY);
    const TARGET: Option<&'static str> = T::TARGET;
}

impl<T: Persist> Persist for BTreeMap<String, T> {
    fn to_mixed(&self) -> Mixed {
        Mixed::Dictionary(
            self.iter()
                .map(|(key, value)| (key.clone(), value.to_mixed()))
                .collect(),
        )
    }

    fn from_mixed(value: Mixed) -> Result<Self> {
        match value {
            Mixed::Dictionary(entries) => entries
                .into_iter()
                .map(|(key, value)| Ok((key, T::from_mixed(value)?)))
                .collect(),
            other => Err(mismatch("Dictionary", &other)),
        }
    }
}

/// Links resolve to the Object tag and are implicitly nullable.
impl<T: Model> TypeInfo for Link<T> {
    const TYPE: PropertyType = PropertyType::OBJECT.or(PropertyType::NULLABLE);
    const TARGET: Option<&'static str> = Some(T::NAME);
}

impl<T: Model> TypeInfo for Vec<Link<T>> {
    const TYPE: PropertyType = PropertyType::OBJECT.or(PropertyType::ARRAY);
    const TARGET: Option<&'static str> = Some(T::NAME);
}

impl<T: Model> TypeInfo for BTreeMap<String, Link<T>> {
    const TYPE: PropertyType = PropertyType::OBJECT
        .or(PropertyType::DICTIONARY)
        .or(PropertyType::NULLABLE);
    const TARGET: Option<&'static str> = Some(T::NAME);
}
