use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::accessors::Accessor;
use crate::error::{Error, Result};
use crate::mixed::{Mixed, MixedKind};
use crate::observation::{NotificationToken, ObjectChange, ObjectObserver};
use crate::schema::{Model, ObjectKind};
use crate::store::{ColKey, Core, ObjLink, Store, WriteGuard};

/// A handle to a stored instance of `M`: every field read or write goes
/// straight to the underlying row.
///
/// The handle is a non-owning back-reference. It does not keep the store
/// alive, and it dangles once the row is deleted; every dereference
/// revalidates, and [`is_valid`](Self::is_valid) is the explicit check to
/// use after a write-transaction boundary.
pub struct Managed<M: Model> {
    core: Weak<RefCell<Core>>,
    link: ObjLink,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Managed<M> {
    pub(crate) fn new(store: &Store, link: ObjLink) -> Self {
        Self {
            core: Rc::downgrade(&store.core),
            link,
            _marker: PhantomData,
        }
    }

    pub(crate) fn store(&self) -> Result<Store> {
        self.core
            .upgrade()
            .map(|core| Store { core })
            .ok_or(Error::ObjectInvalidated)
    }

    /// The stored row this handle points at.
    pub fn object_link(&self) -> ObjLink {
        self.link
    }

    /// Whether the underlying row still exists.
    pub fn is_valid(&self) -> bool {
        self.store()
            .map(|store| store.is_valid(self.link))
            .unwrap_or(false)
    }

    /// Read a property through typed accessor dispatch.
    pub fn get<T: Accessor>(&self, property: &str) -> Result<T> {
        let store = self.store()?;
        let col = M::schema().column_key(property)?;
        T::get(&store, self.link, col)
    }

    /// Write a property through typed accessor dispatch. Fails unless a
    /// write transaction is open on the owning store.
    pub fn set<T: Accessor>(&self, property: &str, value: &T) -> Result<()> {
        let store = self.store()?;
        let col = M::schema().column_key(property)?;
        let mut txn = WriteGuard::new(&store);
        T::set(&mut txn, self.link, col, value)
    }

    /// Read a property as a dynamic value.
    pub fn value_for(&self, property: &str) -> Result<Mixed> {
        M::schema().value_for_name(self, property, false)
    }

    /// A managed view over a Mixed-typed property.
    pub fn get_mixed(&self, property: &str) -> Result<ManagedMixed> {
        let col = M::schema().column_key(property)?;
        // Validate now; the view revalidates on every use.
        self.store()?.get_value(self.link, col)?;
        Ok(ManagedMixed {
            core: self.core.clone(),
            link: self.link,
            col,
        })
    }

    /// Copy the row back into a plain unmanaged instance.
    pub fn detach(&self) -> Result<M> {
        M::from_managed(self)
    }

    /// Add `delta` to an integer property. Incrementing a stored null is a
    /// null-arithmetic error, distinct from a type mismatch.
    pub fn incr(&self, property: &str, delta: i64) -> Result<()> {
        let store = self.store()?;
        let col = M::schema().column_key(property)?;
        let current = store.get_value(self.link, col)?;
        let next = match current {
            Mixed::Int(value) => value + delta,
            Mixed::Null => {
                return Err(Error::NullArithmetic {
                    property: property.into(),
                });
            }
            other => {
                return Err(Error::TypeMismatch {
                    expected: "Int".into(),
                    found: format!("{:?}", other.kind()),
                });
            }
        };
        let mut txn = WriteGuard::new(&store);
        txn.set_value(self.link, col, Mixed::Int(next))
    }

    /// Observe changes to this object. The callback fires exactly once per
    /// commit that touches it, and once more with a deletion payload when
    /// the object is removed, after which the subscription ends.
    ///
    /// Dropping the returned token unregisters the observer.
    pub fn observe<F>(&self, callback: F) -> Result<NotificationToken>
    where
        F: FnMut(ObjectChange<M>) + 'static,
    {
        if M::KIND == ObjectKind::Asymmetric {
            return Err(Error::NotObservable { name: M::NAME });
        }
        let store = self.store()?;
        let hook = ObjectObserver::new(self.clone(), callback);
        let id = store.register_observer(self.link, Box::new(hook));
        Ok(NotificationToken::new(self.core.clone(), id))
    }
}

impl<M: Model> Clone for Managed<M> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            link: self.link,
            _marker: PhantomData,
        }
    }
}

impl<M: Model> Debug for Managed<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Managed")
            .field("type", &M::NAME)
            .field("link", &self.link)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Store {
    /// Look up an object by primary key.
    pub fn find<M: Model>(&self, pk: impl Into<Mixed>) -> Result<Option<Managed<M>>> {
        let table = self.table_key(M::NAME)?;
        let pk = pk.into();
        Ok(self
            .find_by_primary_key(table, &pk)?
            .map(|obj| Managed::new(self, ObjLink::new(table, obj))))
    }
}

/// A Mixed value resident in a stored column. The active variant is
/// whatever the cell currently holds, inspected lazily; collection access
/// returns live views rather than snapshots.
pub struct ManagedMixed {
    core: Weak<RefCell<Core>>,
    link: ObjLink,
    col: ColKey,
}

impl ManagedMixed {
    fn store(&self) -> Result<Store> {
        self.core
            .upgrade()
            .map(|core| Store { core })
            .ok_or(Error::ObjectInvalidated)
    }

    pub fn is_valid(&self) -> bool {
        self.store()
            .map(|store| store.is_valid(self.link))
            .unwrap_or(false)
    }

    /// The variant currently stored in the cell.
    pub fn kind(&self) -> Result<MixedKind> {
        Ok(self.store()?.get_value(self.link, self.col)?.kind())
    }

    /// Deep-copy the cell into an unmanaged value.
    pub fn detach(&self) -> Result<Mixed> {
        self.store()?.get_value(self.link, self.col)
    }

    /// Overwrite the cell. Requires an open write transaction.
    pub fn set(&self, value: Mixed) -> Result<()> {
        let store = self.store()?;
        let mut txn = WriteGuard::new(&store);
        txn.set_value(self.link, self.col, value)
    }

    /// A live view over the cell's list. Fails if the cell does not
    /// currently hold a list.
    pub fn get_list(&self) -> Result<ManagedList> {
        match self.kind()? {
            MixedKind::List => Ok(ManagedList {
                core: self.core.clone(),
                link: self.link,
                col: self.col,
            }),
            other => Err(Error::TypeMismatch {
                expected: "List".into(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// A live view over the cell's dictionary. Fails if the cell does not
    /// currently hold a dictionary.
    pub fn get_dictionary(&self) -> Result<ManagedDictionary> {
        match self.kind()? {
            MixedKind::Dictionary => Ok(ManagedDictionary {
                core: self.core.clone(),
                link: self.link,
                col: self.col,
            }),
            other => Err(Error::TypeMismatch {
                expected: "Dictionary".into(),
                found: format!("{other:?}"),
            }),
        }
    }
}

impl Debug for ManagedMixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedMixed")
            .field("link", &self.link)
            .field("col", &self.col)
            .finish()
    }
}

/// Live view over a list stored in a Mixed cell. Reads and writes forward
/// to the backing store, so mutations are immediately visible to every
/// holder of the same cell.
#[derive(Debug)]
pub struct ManagedList {
    core: Weak<RefCell<Core>>,
    link: ObjLink,
    col: ColKey,
}

impl ManagedList {
    fn store(&self) -> Result<Store> {
        self.core
            .upgrade()
            .map(|core| Store { core })
            .ok_or(Error::ObjectInvalidated)
    }

    pub fn len(&self) -> Result<usize> {
        self.store()?.list_len(self.link, self.col)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The element at `index`, detached.
    pub fn get(&self, index: usize) -> Result<Mixed> {
        self.store()?.list_get(self.link, self.col, index)
    }

    pub fn push(&self, value: Mixed) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).list_push(self.link, self.col, value)
    }

    pub fn set(&self, index: usize, value: Mixed) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).list_set(self.link, self.col, index, value)
    }

    pub fn erase(&self, index: usize) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).list_erase(self.link, self.col, index)
    }

    pub fn clear(&self) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).list_clear(self.link, self.col)
    }
}

/// Live view over a dictionary stored in a Mixed cell.
#[derive(Debug)]
pub struct ManagedDictionary {
    core: Weak<RefCell<Core>>,
    link: ObjLink,
    col: ColKey,
}

impl ManagedDictionary {
    fn store(&self) -> Result<Store> {
        self.core
            .upgrade()
            .map(|core| Store { core })
            .ok_or(Error::ObjectInvalidated)
    }

    pub fn len(&self) -> Result<usize> {
        self.store()?.dict_len(self.link, self.col)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, key: &str) -> Result<Option<Mixed>> {
        self.store()?.dict_get(self.link, self.col, key)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.store()?.dict_keys(self.link, self.col)
    }

    pub fn insert(&self, key: &str, value: Mixed) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).dict_insert(self.link, self.col, key, value)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let store = self.store()?;
        WriteGuard::new(&store).dict_remove(self.link, self.col, key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::error::Error;
    use crate::mixed::{Mixed, MixedKind};
    use crate::schema::Model;
    use crate::store::Store;

    #[derive(Debug, PartialEq)]
    struct Counter {
        name: String,
        count: Option<i64>,
        payload: Mixed,
    }

    crate::object_schema!(Counter (TopLevel) {
        name: String [primary_key],
        count: Option<i64>,
        payload: Mixed,
    });

    fn open_store() -> Store {
        Store::open(vec![Counter::schema().table_spec()]).unwrap()
    }

    fn add_counter(store: &Store, name: &str, payload: Mixed) -> crate::managed::Managed<Counter> {
        store
            .write(|txn| {
                txn.add(&Counter {
                    name: name.into(),
                    count: Some(0),
                    payload,
                })
            })
            .unwrap()
    }

    #[test]
    fn test_typed_get_and_set() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::Null);

        assert_eq!(counter.get::<Option<i64>>("count").unwrap(), Some(0));
        store
            .write(|_| counter.set("count", &Some(5i64)))
            .unwrap();
        assert_eq!(counter.get::<Option<i64>>("count").unwrap(), Some(5));

        // Outside a transaction the same call fails loudly.
        assert!(matches!(
            counter.set("count", &Some(6i64)),
            Err(Error::NotInWriteTransaction)
        ));
    }

    #[test]
    fn test_detach_round_trips() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::from(7i64));
        let detached = counter.detach().unwrap();
        assert_eq!(
            detached,
            Counter {
                name: "c".into(),
                count: Some(0),
                payload: Mixed::Int(7),
            }
        );
    }

    #[test]
    fn test_incr_and_null_arithmetic() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::Null);

        store.write(|_| counter.incr("count", 3)).unwrap();
        store.write(|_| counter.incr("count", 2)).unwrap();
        assert_eq!(counter.get::<Option<i64>>("count").unwrap(), Some(5));

        store
            .write(|_| counter.set::<Option<i64>>("count", &None))
            .unwrap();
        let result = store.write(|_| counter.incr("count", 1));
        assert!(matches!(result, Err(Error::NullArithmetic { .. })));

        let result = store.write(|_| counter.incr("name", 1));
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_handle_dangles_after_deletion() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::Null);
        assert!(counter.is_valid());

        store.write(|txn| txn.remove(&counter)).unwrap();
        assert!(!counter.is_valid());
        assert!(matches!(
            counter.get::<Option<i64>>("count"),
            Err(Error::ObjectInvalidated)
        ));
    }

    #[test]
    fn test_managed_mixed_kind_is_inspected_lazily() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::from(1i64));
        let mixed = counter.get_mixed("payload").unwrap();
        assert_eq!(mixed.kind().unwrap(), MixedKind::Int);

        store
            .write(|_| mixed.set(Mixed::from("text")))
            .unwrap();
        assert_eq!(mixed.kind().unwrap(), MixedKind::String);
        assert_eq!(mixed.detach().unwrap(), Mixed::from("text"));
    }

    #[test]
    fn test_managed_list_view_forwards_mutations() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::List(vec![Mixed::Int(1)]));
        let mixed = counter.get_mixed("payload").unwrap();
        let list = mixed.get_list().unwrap();

        // A second holder of the same cell sees mutations immediately.
        let other_view = counter.get_mixed("payload").unwrap().get_list().unwrap();

        store
            .write(|_| {
                list.push(Mixed::from("two"))?;
                list.set(0, Mixed::Int(10))
            })
            .unwrap();

        assert_eq!(other_view.len().unwrap(), 2);
        assert_eq!(other_view.get(0).unwrap(), Mixed::Int(10));
        assert_eq!(other_view.get(1).unwrap(), Mixed::from("two"));
    }

    #[test]
    fn test_managed_collection_access_checks_variant() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::from(1i64));
        let mixed = counter.get_mixed("payload").unwrap();
        assert!(matches!(
            mixed.get_list(),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            mixed.get_dictionary(),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_managed_dictionary_view() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::Dictionary(BTreeMap::new()));
        let dict = counter
            .get_mixed("payload")
            .unwrap()
            .get_dictionary()
            .unwrap();

        store
            .write(|_| {
                dict.insert("a", Mixed::Int(1))?;
                dict.insert("b", Mixed::from("two"))?;
                dict.remove("a")
            })
            .unwrap();

        assert_eq!(dict.len().unwrap(), 1);
        assert_eq!(dict.get("a").unwrap(), None);
        assert_eq!(dict.get("b").unwrap(), Some(Mixed::from("two")));
        assert_eq!(dict.keys().unwrap(), vec!["b".to_owned()]);
    }

    #[test]
    fn test_nested_collection_in_managed_mixed() {
        let store = open_store();
        let counter = add_counter(&store, "c", Mixed::List(vec![]));
        let list = counter.get_mixed("payload").unwrap().get_list().unwrap();

        let mut inner = BTreeMap::new();
        inner.insert("k".to_owned(), Mixed::Int(1));
        store
            .write(|_| list.push(Mixed::Dictionary(inner.clone())))
            .unwrap();

        assert_eq!(list.get(0).unwrap(), Mixed::Dictionary(inner));
    }

    #[test]
    fn test_find_by_primary_key() {
        let store = open_store();
        add_counter(&store, "one", Mixed::Null);
        add_counter(&store, "two", Mixed::Null);

        let found = store.find::<Counter>("two").unwrap().unwrap();
        assert_eq!(found.get::<String>("name").unwrap(), "two");
        assert!(store.find::<Counter>("three").unwrap().is_none());
    }
}
