use std::collections::{BTreeMap, BTreeSet};

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::link::Link;
use crate::mixed::Mixed;
use crate::schema::{Model, ObjectKind};
use crate::store::{ColKey, ObjLink, Store, WriteGuard};
use crate::type_info::Persist;

/// Bridges one field type to the store's column operations. Exactly one
/// `set` and one `get` apply per field type, selected at compile time.
pub trait Accessor: Sized {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()>;

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self>;
}

macro_rules! accessor_via_persist {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Accessor for $ty {
                fn set(
                    txn: &mut WriteGuard<'_>,
                    obj: ObjLink,
                    col: ColKey,
                    value: &Self,
                ) -> Result<()> {
                    txn.set_value(obj, col, value.to_mixed())
                }

                fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
                    <$ty>::from_mixed(store.get_value(obj, col)?)
                }
            }
        )+
    };
}

accessor_via_persist!(
    i64,
    bool,
    f64,
    String,
    Vec<u8>,
    DateTime<Utc>,
    ObjectId,
    Uuid,
    Decimal,
    Mixed,
);

/// Null goes through the engine's explicit set-null operation, never a
/// sentinel value.
impl<T: Persist> Accessor for Option<T> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        match value {
            Some(inner) => txn.set_value(obj, col, inner.to_mixed()),
            None => txn.set_null(obj, col),
        }
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        match store.get_value(obj, col)? {
            Mixed::Null => Ok(None),
            other => T::from_mixed(other).map(Some),
        }
    }
}

impl<T: Persist> Accessor for Vec<T> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        txn.set_value(obj, col, value.to_mixed())
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        Self::from_mixed(store.get_value(obj, col)?)
    }
}

impl<T: Persist + Ord> Accessor for BTreeSet<T> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        txn.set_value(obj, col, value.to_mixed())
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        Self::from_mixed(store.get_value(obj, col)?)
    }
}

impl<T: Persist> Accessor for BTreeMap<String, T> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        txn.set_value(obj, col, value.to_mixed())
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        Self::from_mixed(store.get_value(obj, col)?)
    }
}

/// Persist an unmanaged instance as a new (or upserted) row: create the
/// row, then write every property through accessor dispatch. Not
/// applicable to embedded objects, which only exist through a parent slot.
pub(crate) fn insert_object<M: Model>(txn: &mut WriteGuard<'_>, value: &M) -> Result<ObjLink> {
    if M::KIND == ObjectKind::Embedded {
        return Err(Error::EmbeddedTopLevel);
    }
    let schema = M::schema();
    let table = txn.store().table_key(M::NAME)?;
    let link = match schema.primary_key_value(value) {
        Some(pk) => txn.create_object_with_primary_key(table, pk)?,
        None => txn.create_object(table)?,
    };
    schema.set_all(value, txn, link)?;
    Ok(link)
}

impl<T: Model> Accessor for Link<T> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        match value {
            Link::Null => txn.set_null(obj, col),
            Link::Managed(target) => txn.set_link(obj, col, *target),
            Link::Unmanaged(target) => {
                if T::KIND == ObjectKind::Embedded {
                    // The owning slot is the row's identity; create through
                    // it, then populate.
                    let child = txn.create_and_set_linked_object(obj, col)?;
                    T::schema().set_all(target, txn, child)
                } else {
                    // The target is created and fully populated before the
                    // parent's column becomes observably non-null.
                    let child = insert_object(txn, target.as_ref())?;
                    txn.set_link(obj, col, child)
                }
            }
        }
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        match store.get_value(obj, col)? {
            Mixed::Null => Ok(Link::Null),
            Mixed::Link(target) => Ok(Link::Managed(target)),
            other => Err(Error::TypeMismatch {
                expected: "Link".into(),
                found: format!("{:?}", other.kind()),
            }),
        }
    }
}

/// A list of links replaces the whole column, element by element in input
/// order. Null entries are skipped, as are the rows behind them.
impl<T: Model> Accessor for Vec<Link<T>> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        txn.set_value(obj, col, Mixed::List(Vec::new()))?;
        for element in value {
            match element {
                Link::Null => continue,
                Link::Managed(target) => txn.link_push(obj, col, *target)?,
                Link::Unmanaged(target) => {
                    if T::KIND == ObjectKind::Embedded {
                        let index = txn.store().list_len(obj, col)?;
                        let child = txn.create_and_insert_linked_object(obj, col, index)?;
                        T::schema().set_all(target, txn, child)?;
                    } else {
                        let child = insert_object(txn, target.as_ref())?;
                        txn.link_push(obj, col, child)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        let items = store.get_value(obj, col)?;
        items
            .get_list()?
            .iter()
            .map(|item| match item {
                Mixed::Link(target) => Ok(Link::Managed(*target)),
                other => Err(Error::TypeMismatch {
                    expected: "Link".into(),
                    found: format!("{:?}", other.kind()),
                }),
            })
            .collect()
    }
}

impl<T: Model> Accessor for BTreeMap<String, Link<T>> {
    fn set(txn: &mut WriteGuard<'_>, obj: ObjLink, col: ColKey, value: &Self) -> Result<()> {
        txn.set_value(obj, col, Mixed::Dictionary(Default::default()))?;
        for (key, element) in value {
            match element {
                Link::Null => txn.dict_insert(obj, col, key, Mixed::Null)?,
                Link::Managed(target) => {
                    // Same ownership rule as any other slot.
                    if T::KIND == ObjectKind::Embedded {
                        return Err(Error::AlreadyOwned);
                    }
                    txn.dict_insert(obj, col, key, Mixed::Link(*target))?;
                }
                Link::Unmanaged(target) => {
                    if T::KIND == ObjectKind::Embedded {
                        return Err(Error::EmbeddedTopLevel);
                    }
                    let child = insert_object(txn, target.as_ref())?;
                    txn.dict_insert(obj, col, key, Mixed::Link(child))?;
                }
            }
        }
        Ok(())
    }

    fn get(store: &Store, obj: ObjLink, col: ColKey) -> Result<Self> {
        let entries = store.get_value(obj, col)?;
        entries
            .get_dictionary()?
            .iter()
            .map(|(key, item)| match item {
                Mixed::Null => Ok((key.clone(), Link::Null)),
                Mixed::Link(target) => Ok((key.clone(), Link::Managed(*target))),
                other => Err(Error::TypeMismatch {
                    expected: "Link".into(),
                    found: format!("{:?}", other.kind()),
                }),
            })
            .collect()
    }
}
