use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Weak;

use log::debug;

use crate::managed::Managed;
use crate::mixed::Mixed;
use crate::schema::Model;
use crate::store::{ChangeObserver, ColKey, Core, ObjectChangeSet};

/// Information about one property that changed in an observed object.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Name of the property that changed.
    pub name: &'static str,

    /// Value of the property before the change, when the change set
    /// carries one; collection properties report an empty collection. A
    /// change set without old values is delivered with `None` here rather
    /// than an error.
    pub old_value: Option<Mixed>,

    /// Value of the property after the change. Absent on deletion.
    /// Collection properties report an empty collection; only the fact
    /// that something inside them changed is surfaced at object level.
    pub new_value: Option<Mixed>,
}

/// The payload delivered to an object observer, once per change cycle.
pub struct ObjectChange<M: Model> {
    /// The observed object; `None` when it was deleted.
    pub object: Option<Managed<M>>,

    /// The object was deleted from the store. No further notifications
    /// follow.
    pub is_deleted: bool,

    /// The properties that changed in this cycle.
    pub property_changes: Vec<PropertyChange>,
}

impl<M: Model> Debug for ObjectChange<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectChange")
            .field("is_deleted", &self.is_deleted)
            .field("property_changes", &self.property_changes)
            .finish()
    }
}

/// Keeps an object subscription alive. Dropping (or explicitly
/// unregistering) the token ends the subscription.
#[must_use = "dropping the token unregisters the observer"]
pub struct NotificationToken {
    core: Weak<RefCell<Core>>,
    id: u64,
}

impl NotificationToken {
    pub(crate) fn new(core: Weak<RefCell<Core>>, id: u64) -> Self {
        Self { core, id }
    }

    /// Stop observing. Equivalent to dropping the token.
    pub fn unregister(self) {}
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            let store = crate::store::Store { core };
            store.unregister_observer(self.id);
        }
    }
}

/// Where the adapter is within one change cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    CollectingBefore,
    CollectingAfter,
    Delivered,
}

/// Translates raw changed-column sets into typed property changes for one
/// observed object, and forwards exactly one callback per cycle.
pub(crate) struct ObjectObserver<M: Model, F> {
    object: Managed<M>,
    callback: F,
    phase: Phase,
    /// Property positions and names for the current cycle, mapped from the
    /// changed columns by one scan of the schema's declared order and
    /// cached until delivery.
    names: Option<Vec<(usize, &'static str)>>,
    old_values: Option<Vec<Option<Mixed>>>,
    deleted: bool,
}

impl<M, F> ObjectObserver<M, F>
where
    M: Model,
    F: FnMut(ObjectChange<M>),
{
    pub(crate) fn new(object: Managed<M>, callback: F) -> Self {
        Self {
            object,
            callback,
            phase: Phase::Idle,
            names: None,
            old_values: None,
            deleted: false,
        }
    }

    fn populate_properties(&mut self, change: &ObjectChangeSet) {
        if self.names.is_some() {
            return;
        }
        if change.deleted {
            // Straight to the deletion payload; no value reads.
            self.deleted = true;
            return;
        }
        if change.columns.is_empty() {
            return;
        }

        let schema = M::schema();
        let mut names = Vec::new();
        for (index, property) in schema.properties().iter().enumerate() {
            if change.contains(ColKey::from_index(index)) {
                names.push((index, property.name));
            }
        }
        if !names.is_empty() {
            self.names = Some(names);
        }
    }

    fn read_old_values(&mut self, change: &ObjectChangeSet) {
        let Some(names) = &self.names else {
            return;
        };
        let schema = M::schema();
        let old_values = names
            .iter()
            .map(|(index, _)| {
                let property = &schema.properties()[*index];
                if property.ty.is_collection() {
                    // Collection diffs are not surfaced object-level.
                    return Some(empty_like(property.ty));
                }
                change.old_for(ColKey::from_index(*index)).cloned()
            })
            .collect();
        self.old_values = Some(old_values);
    }

    fn forward(&mut self, change: ObjectChange<M>) {
        (self.callback)(change);
    }
}

fn empty_like(ty: crate::property::PropertyType) -> Mixed {
    if ty.is_dictionary() {
        Mixed::Dictionary(Default::default())
    } else {
        Mixed::List(Vec::new())
    }
}

impl<M, F> ChangeObserver for ObjectObserver<M, F>
where
    M: Model,
    F: FnMut(ObjectChange<M>),
{
    fn before(&mut self, change: &ObjectChangeSet) {
        debug_assert!(matches!(self.phase, Phase::Idle | Phase::Delivered));
        self.phase = Phase::CollectingBefore;
        self.populate_properties(change);
        if self.deleted {
            return;
        }
        self.read_old_values(change);
    }

    fn after(&mut self, change: &ObjectChangeSet) {
        self.phase = Phase::CollectingAfter;
        if self.deleted {
            debug!(target: "ObjectObserver", "delivering deletion for {:?}", self.object.object_link());
            self.forward(ObjectChange {
                object: None,
                is_deleted: true,
                property_changes: Vec::new(),
            });
        } else {
            self.populate_properties(change);
            if let Some(names) = self.names.take() {
                let schema = M::schema();
                let old_values = self
                    .old_values
                    .take()
                    .unwrap_or_else(|| vec![None; names.len()]);
                let mut property_changes = Vec::with_capacity(names.len());
                for ((_, name), old_value) in names.into_iter().zip(old_values) {
                    let new_value = schema.value_for_name(&self.object, name, true).ok();
                    property_changes.push(PropertyChange {
                        name,
                        old_value,
                        new_value,
                    });
                }
                debug!(
                    target: "ObjectObserver",
                    "delivering {} property change(s) for {:?}",
                    property_changes.len(),
                    self.object.object_link()
                );
                self.forward(ObjectChange {
                    object: Some(self.object.clone()),
                    is_deleted: false,
                    property_changes,
                });
            }
        }

        // Exactly one delivery happened (or none was due); clear the
        // cycle's cached state.
        self.phase = Phase::Delivered;
        self.names = None;
        self.old_values = None;
        self.deleted = false;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::mixed::Mixed;
    use crate::schema::Model;
    use crate::store::Store;

    #[derive(Debug)]
    struct Tracked {
        id: String,
        label: String,
        scores: Vec<i64>,
        note: Option<String>,
    }

    crate::object_schema!(Tracked (TopLevel) {
        id: String [primary_key],
        label: String,
        scores: Vec<i64>,
        note: Option<String>,
    });

    #[derive(Debug)]
    struct Event {
        name: String,
    }

    crate::object_schema!(Event (Asymmetric) {
        name: String,
    });

    fn open_store() -> Store {
        Store::open(vec![
            Tracked::schema().table_spec(),
            Event::schema().table_spec(),
        ])
        .unwrap()
    }

    fn add_tracked(store: &Store) -> crate::managed::Managed<Tracked> {
        store
            .write(|txn| {
                txn.add(&Tracked {
                    id: "t1".into(),
                    label: "initial".into(),
                    scores: vec![1, 2],
                    note: None,
                })
            })
            .unwrap()
    }

    #[test]
    fn test_single_property_change_payload() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let _token = tracked
            .observe(move |change| sink.borrow_mut().push(change))
            .unwrap();

        store
            .write(|_| tracked.set("label", &"renamed".to_owned()))
            .unwrap();

        let changes = received.borrow();
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert!(!change.is_deleted);
        assert_eq!(change.property_changes.len(), 1);

        let property = &change.property_changes[0];
        assert_eq!(property.name, "label");
        assert_eq!(property.old_value, Some(Mixed::from("initial")));
        assert_eq!(property.new_value, Some(Mixed::from("renamed")));

        // Reading the untouched list property with collections excluded
        // yields an empty sequence, not an error or an omission.
        assert_eq!(
            Tracked::schema()
                .value_for_name(&tracked, "scores", true)
                .unwrap(),
            Mixed::List(vec![])
        );
        assert_eq!(
            Tracked::schema()
                .value_for_name(&tracked, "scores", false)
                .unwrap(),
            Mixed::List(vec![Mixed::Int(1), Mixed::Int(2)])
        );
    }

    #[test]
    fn test_collection_property_reports_empty_collection() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let _token = tracked
            .observe(move |change| sink.borrow_mut().push(change))
            .unwrap();

        store
            .write(|_| tracked.set("scores", &vec![9i64, 9, 9]))
            .unwrap();

        let changes = received.borrow();
        assert_eq!(changes.len(), 1);
        let property = &changes[0].property_changes[0];
        assert_eq!(property.name, "scores");
        // Only the fact of a change is surfaced, not the contents.
        assert_eq!(property.new_value, Some(Mixed::List(vec![])));
        assert_eq!(property.old_value, Some(Mixed::List(vec![])));
    }

    #[test]
    fn test_multiple_properties_in_one_commit() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let _token = tracked
            .observe(move |change| sink.borrow_mut().push(change))
            .unwrap();

        store
            .write(|_| {
                tracked.set("label", &"x".to_owned())?;
                tracked.set("note", &Some("y".to_owned()))
            })
            .unwrap();

        // One commit, one callback, two property entries in declared order.
        let changes = received.borrow();
        assert_eq!(changes.len(), 1);
        let names: Vec<_> = changes[0]
            .property_changes
            .iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["label", "note"]);
    }

    #[test]
    fn test_deletion_delivers_once_and_ends_subscription() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let _token = tracked
            .observe(move |change| sink.borrow_mut().push(change))
            .unwrap();

        store.write(|txn| txn.remove(&tracked)).unwrap();

        {
            let changes = received.borrow();
            assert_eq!(changes.len(), 1);
            assert!(changes[0].is_deleted);
            assert!(changes[0].object.is_none());
            assert!(changes[0].property_changes.is_empty());
        }

        // Another commit produces nothing further.
        store
            .write(|txn| {
                txn.add(&Tracked {
                    id: "t2".into(),
                    label: "other".into(),
                    scores: vec![],
                    note: None,
                })
            })
            .unwrap();
        assert_eq!(received.borrow().len(), 1);
    }

    #[test]
    fn test_unchanged_observer_is_not_notified() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let _token = tracked
            .observe(move |_| *sink.borrow_mut() += 1)
            .unwrap();

        store
            .write(|txn| {
                txn.add(&Tracked {
                    id: "t2".into(),
                    label: "unrelated".into(),
                    scores: vec![],
                    note: None,
                })
            })
            .unwrap();
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn test_nested_write_from_callback_is_not_reentrant() {
        let store = open_store();
        let tracked = add_tracked(&store);

        // The callback writes back into the store. Delivery of the nested
        // commit must wait until the callback has returned, so the depth
        // counter never exceeds one.
        let depth = Rc::new(RefCell::new(0i32));
        let max_depth = Rc::new(RefCell::new(0i32));
        let deliveries = Rc::new(RefCell::new(0i32));

        let store_clone = store.clone();
        let tracked_clone = tracked.clone();
        let depth_clone = Rc::clone(&depth);
        let max_clone = Rc::clone(&max_depth);
        let count_clone = Rc::clone(&deliveries);
        let _token = tracked
            .observe(move |change| {
                *depth_clone.borrow_mut() += 1;
                let current = *depth_clone.borrow();
                if current > *max_clone.borrow() {
                    *max_clone.borrow_mut() = current;
                }
                *count_clone.borrow_mut() += 1;

                if !change.is_deleted && *count_clone.borrow() == 1 {
                    store_clone
                        .write(|_| tracked_clone.set("note", &Some("from callback".to_owned())))
                        .unwrap();
                }
                *depth_clone.borrow_mut() -= 1;
            })
            .unwrap();

        store
            .write(|_| tracked.set("label", &"trigger".to_owned()))
            .unwrap();

        assert_eq!(*max_depth.borrow(), 1);
        // Both the triggering commit and the nested one were delivered.
        assert_eq!(*deliveries.borrow(), 2);
    }

    #[test]
    fn test_token_drop_unregisters() {
        let store = open_store();
        let tracked = add_tracked(&store);

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let token = tracked
            .observe(move |_| *sink.borrow_mut() += 1)
            .unwrap();
        drop(token);

        store
            .write(|_| tracked.set("label", &"silent".to_owned()))
            .unwrap();
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn test_asymmetric_objects_cannot_be_observed() {
        let store = open_store();
        let event = store
            .write(|txn| txn.add(&Event { name: "boot".into() }))
            .unwrap();
        let result = event.observe(|_| {});
        assert!(matches!(
            result,
            Err(crate::error::Error::NotObservable { .. })
        ));
    }
}
