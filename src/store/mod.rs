mod changes;
mod keys;
mod table;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::Rc;

use log::debug;
use tracing::instrument;

pub use keys::{ColKey, ObjKey, ObjLink, TableKey};
pub use table::{ColumnSpec, TableSpec};

pub(crate) use changes::{ChangeObserver, ObjectChangeSet};

use crate::error::{Error, Result};
use crate::mixed::Mixed;
use crate::property::PropertyType;
use crate::schema::{Model, ObjectKind};
use crate::store::changes::{DeletedRow, Journal};
use crate::store::table::{TableCore, cell_matches, element_matches, store_cell};

pub(crate) struct ObserverSlot {
    id: u64,
    target: ObjLink,
    hook: Option<Box<dyn ChangeObserver>>,
    removed: bool,
}

/// Mutable state behind a [`Store`]. Managed handles keep weak references
/// to this and revalidate on every dereference.
pub(crate) struct Core {
    tables: Vec<TableCore>,
    in_write: bool,
    delivering: bool,
    journal: Journal,
    observers: Vec<ObserverSlot>,
    pending: VecDeque<(u64, ObjectChangeSet)>,
    next_observer_id: u64,
}

impl Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("tables", &self.tables.len())
            .field("in_write", &self.in_write)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Core {
    fn require_write(&self) -> Result<()> {
        if self.in_write {
            Ok(())
        } else {
            Err(Error::NotInWriteTransaction)
        }
    }

    fn table(&self, key: TableKey) -> Result<&TableCore> {
        self.tables
            .get(key.0 as usize)
            .ok_or_else(|| Error::TableNotFound {
                name: format!("{key:?}"),
            })
    }

    fn table_mut(&mut self, key: TableKey) -> Result<&mut TableCore> {
        self.tables
            .get_mut(key.0 as usize)
            .ok_or_else(|| Error::TableNotFound {
                name: format!("{key:?}"),
            })
    }

    fn table_key_by_name(&self, name: &str) -> Result<TableKey> {
        self.tables
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.key)
            .ok_or_else(|| Error::TableNotFound { name: name.into() })
    }

    fn cell(&self, link: ObjLink, col: ColKey) -> Result<&Mixed> {
        let table = self.table(link.table)?;
        table.column(col)?;
        let row = table.row(link.obj)?;
        Ok(&row[col.index()])
    }

    /// Journal the cell's current value, then overwrite it. All cell writes
    /// funnel through here.
    #[instrument(target = "Core", level = "debug", skip(self))]
    fn write_cell(&mut self, link: ObjLink, col: ColKey, value: Mixed) -> Result<()> {
        self.require_write()?;
        let table = self.table(link.table)?;
        let column = table.column(col)?;
        if !cell_matches(column.ty, &value) {
            return Err(Error::TypeMismatch {
                expected: format!("{:?}", column.ty),
                found: format!("{:?}", value.kind()),
            });
        }
        let old = table.row(link.obj)?[col.index()].clone();
        self.journal.record_cell(link, col, old);
        let slot = &mut self.table_mut(link.table)?.row_mut(link.obj)?[col.index()];
        store_cell(slot, value);
        Ok(())
    }

    fn set_null(&mut self, link: ObjLink, col: ColKey) -> Result<()> {
        self.require_write()?;
        let table = self.table(link.table)?;
        let column = table.column(col)?;
        let ty = column.ty;
        if !(ty.is_nullable()
            || ty.base_is(PropertyType::OBJECT)
            || ty.base_is(PropertyType::MIXED))
        {
            return Err(Error::NotNullable {
                property: column.name.into(),
            });
        }
        let old = table.row(link.obj)?[col.index()].clone();
        self.journal.record_cell(link, col, old);
        self.table_mut(link.table)?.row_mut(link.obj)?[col.index()] = Mixed::Null;
        Ok(())
    }

    /// Target table of a link-bearing column.
    fn target_table(&self, link: ObjLink, col: ColKey) -> Result<TableKey> {
        let table = self.table(link.table)?;
        let column = table.column(col)?;
        let Some(target) = column.target else {
            return Err(Error::TypeMismatch {
                expected: "a link column".into(),
                found: format!("{:?}", column.ty),
            });
        };
        self.table_key_by_name(target)
    }

    /// Refuse to point a second slot at an embedded row that already has an
    /// owner. The original linkage stays untouched.
    fn check_linkable(&self, target: ObjLink) -> Result<()> {
        let table = self.table(target.table)?;
        table.row(target.obj)?;
        if table.kind() == ObjectKind::Embedded && table.parents.contains_key(&target.obj) {
            return Err(Error::AlreadyOwned);
        }
        Ok(())
    }

    fn create_object(&mut self, table: TableKey) -> Result<ObjLink> {
        self.require_write()?;
        let core = self.table_mut(table)?;
        if core.kind() == ObjectKind::Embedded {
            return Err(Error::EmbeddedTopLevel);
        }
        let link = core.create_row();
        self.journal.record_created(link);
        debug!(target: "Store", "created object {link:?}");
        Ok(link)
    }

    fn create_object_with_primary_key(&mut self, table: TableKey, pk: Mixed) -> Result<ObjLink> {
        self.require_write()?;
        let core = self.table(table)?;
        if core.kind() == ObjectKind::Embedded {
            return Err(Error::EmbeddedTopLevel);
        }
        let Some(pk_col) = core.spec.primary_key else {
            return Err(Error::InvalidSchema {
                reason: format!("table '{}' has no primary key", core.name()),
            });
        };
        let pk_ty = core.spec.columns[pk_col].ty;
        if !cell_matches(pk_ty, &pk) {
            return Err(Error::TypeMismatch {
                expected: format!("{pk_ty:?}"),
                found: format!("{:?}", pk.kind()),
            });
        }
        if let Some(existing) = core.find_by_primary_key(&pk)? {
            return Ok(ObjLink::new(table, existing));
        }
        let core = self.table_mut(table)?;
        let link = core.create_row();
        core.row_mut(link.obj)?[pk_col] = pk;
        self.journal.record_created(link);
        debug!(target: "Store", "created object {link:?} with primary key");
        Ok(link)
    }

    /// Create an embedded row owned by a single-link parent slot, and point
    /// the slot at it. The returned row is populated afterwards by the
    /// caller; it is already owned, so no separate linking step follows.
    fn create_and_set_linked_object(&mut self, obj: ObjLink, col: ColKey) -> Result<ObjLink> {
        self.require_write()?;
        let target = self.target_table(obj, col)?;
        let child = self.table_mut(target)?.create_row();
        self.table_mut(target)?.parents.insert(child.obj, obj);
        self.journal.record_created(child);
        self.write_cell(obj, col, Mixed::Link(child))
            .inspect_err(|_| {
                // Undo the orphan on failure.
                let table = self.table_mut(target).expect("table just used");
                table.rows.remove(&child.obj);
                table.parents.remove(&child.obj);
            })?;
        Ok(child)
    }

    /// Create an embedded row owned by one slot of a link list, inserted at
    /// the given position.
    fn create_and_insert_linked_object(
        &mut self,
        obj: ObjLink,
        col: ColKey,
        index: usize,
    ) -> Result<ObjLink> {
        self.require_write()?;
        let target = self.target_table(obj, col)?;
        let child = self.table_mut(target)?.create_row();
        self.table_mut(target)?.parents.insert(child.obj, obj);
        self.journal.record_created(child);

        let old = self.cell(obj, col)?.clone();
        self.journal.record_cell(obj, col, old);
        let slot = &mut self.table_mut(obj.table)?.row_mut(obj.obj)?[col.index()];
        match slot {
            Mixed::List(items) if index <= items.len() => {
                items.insert(index, Mixed::Link(child));
                Ok(child)
            }
            _ => {
                let table = self.table_mut(target)?;
                table.rows.remove(&child.obj);
                table.parents.remove(&child.obj);
                Err(Error::TypeMismatch {
                    expected: "List".into(),
                    found: "non-list cell or out-of-range index".into(),
                })
            }
        }
    }

    fn list_cell_mut(&mut self, link: ObjLink, col: ColKey) -> Result<&mut Vec<Mixed>> {
        let old = self.cell(link, col)?.clone();
        self.journal.record_cell(link, col, old);
        let slot = &mut self.table_mut(link.table)?.row_mut(link.obj)?[col.index()];
        match slot {
            Mixed::List(items) => Ok(items),
            other => Err(Error::TypeMismatch {
                expected: "List".into(),
                found: format!("{:?}", other.kind()),
            }),
        }
    }

    fn dict_cell_mut(
        &mut self,
        link: ObjLink,
        col: ColKey,
    ) -> Result<&mut std::collections::BTreeMap<String, Mixed>> {
        let old = self.cell(link, col)?.clone();
        self.journal.record_cell(link, col, old);
        let slot = &mut self.table_mut(link.table)?.row_mut(link.obj)?[col.index()];
        match slot {
            Mixed::Dictionary(entries) => Ok(entries),
            other => Err(Error::TypeMismatch {
                expected: "Dictionary".into(),
                found: format!("{:?}", other.kind()),
            }),
        }
    }

    fn check_element(&self, link: ObjLink, col: ColKey, value: &Mixed) -> Result<()> {
        let column = self.table(link.table)?.column(col)?;
        if !element_matches(column.ty, value) {
            return Err(Error::TypeMismatch {
                expected: format!("element of {:?}", column.ty),
                found: format!("{:?}", value.kind()),
            });
        }
        Ok(())
    }

    /// Remove a row, then every embedded row it owned, recursively.
    #[instrument(target = "Core", level = "debug", skip(self))]
    fn remove_object(&mut self, link: ObjLink) -> Result<()> {
        self.require_write()?;
        let table = self.table_mut(link.table)?;
        let Some(cells) = table.rows.remove(&link.obj) else {
            return Err(Error::ObjectInvalidated);
        };
        let parent = table.parents.remove(&link.obj);
        self.journal.record_deleted(DeletedRow {
            link,
            cells,
            parent,
        });
        debug!(target: "Store", "removed object {link:?}");

        let mut orphans = Vec::new();
        for table in &self.tables {
            if table.kind() != ObjectKind::Embedded {
                continue;
            }
            for (child, owner) in &table.parents {
                if *owner == link {
                    orphans.push(ObjLink::new(table.key, *child));
                }
            }
        }
        for orphan in orphans {
            self.remove_object(orphan)?;
        }
        Ok(())
    }

    fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        let (deleted, cells, created) = journal.into_rollback();
        for row in deleted {
            let table = &mut self.tables[row.link.table.0 as usize];
            table.rows.insert(row.link.obj, row.cells);
            if let Some(parent) = row.parent {
                table.parents.insert(row.link.obj, parent);
            }
        }
        for ((link, col), old) in cells {
            if created.contains(&link) {
                continue;
            }
            let table = &mut self.tables[link.table.0 as usize];
            if let Some(row) = table.rows.get_mut(&link.obj) {
                row[col.index()] = old;
            }
        }
        for link in created {
            let table = &mut self.tables[link.table.0 as usize];
            table.rows.remove(&link.obj);
            table.parents.remove(&link.obj);
        }
    }

    /// Turn the journal into per-observer change sets and reset it.
    fn take_commit_changes(&mut self) -> Vec<(u64, ObjectChangeSet)> {
        let journal = std::mem::take(&mut self.journal);
        let mut out = Vec::new();
        for slot in &self.observers {
            if slot.removed {
                continue;
            }
            if let Some(change) = journal.change_set_for(slot.target) {
                out.push((slot.id, change));
            }
        }
        out
    }
}

/// An in-memory table store: the row/column engine the object-mapping
/// layer binds to.
///
/// The store is single-threaded and cooperative. All writes happen inside
/// [`write`](Store::write); change notifications are delivered after the
/// commit, on the same thread, one cycle per commit.
#[derive(Clone)]
pub struct Store {
    pub(crate) core: Rc<RefCell<Core>>,
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("core", &self.core.borrow())
            .finish()
    }
}

impl Store {
    /// Open a store over the given table descriptors.
    ///
    /// Fails if two tables share a name, a link column's target is not among
    /// the descriptors, or an embedded table declares a primary key.
    #[instrument(target = "Store", level = "debug", skip(specs))]
    pub fn open(specs: Vec<TableSpec>) -> Result<Self> {
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(Error::InvalidSchema {
                    reason: format!("duplicate table name '{}'", spec.name),
                });
            }
            if spec.kind == ObjectKind::Embedded && spec.primary_key.is_some() {
                return Err(Error::InvalidSchema {
                    reason: format!("embedded table '{}' declares a primary key", spec.name),
                });
            }
            for column in &spec.columns {
                if let Some(target) = column.target
                    && !specs.iter().any(|other| other.name == target)
                {
                    return Err(Error::InvalidSchema {
                        reason: format!(
                            "column '{}.{}' links to unknown table '{}'",
                            spec.name, column.name, target
                        ),
                    });
                }
            }
        }

        let tables = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| TableCore::new(TableKey(i as u32), spec))
            .collect();
        Ok(Self {
            core: Rc::new(RefCell::new(Core {
                tables,
                in_write: false,
                delivering: false,
                journal: Journal::default(),
                observers: Vec::new(),
                pending: VecDeque::new(),
                next_observer_id: 0,
            })),
        })
    }

    /// Run a write transaction. The closure receives the only handle
    /// through which mutation is possible; if it fails, every change it
    /// made is rolled back. On success, change notifications for the
    /// commit are delivered before this returns.
    #[instrument(target = "Store", level = "debug", skip(self, f))]
    pub fn write<R>(&self, f: impl FnOnce(&mut WriteGuard<'_>) -> Result<R>) -> Result<R> {
        {
            let mut core = self.core.borrow_mut();
            if core.in_write {
                return Err(Error::WriteInProgress);
            }
            core.in_write = true;
        }
        let mut guard = WriteGuard { store: self };
        let result = f(&mut guard);
        let mut core = self.core.borrow_mut();
        core.in_write = false;
        match result {
            Ok(value) => {
                let deliveries = core.take_commit_changes();
                let already_delivering = core.delivering;
                core.pending.extend(deliveries);
                if !already_delivering {
                    core.delivering = true;
                }
                drop(core);
                if !already_delivering {
                    self.deliver_pending();
                }
                Ok(value)
            }
            Err(e) => {
                core.rollback();
                Err(e)
            }
        }
    }

    /// Drain the pending notification queue, one observer at a time. The
    /// callback runs with the core unborrowed, so it may read values and
    /// even open its own write transaction; a nested commit only enqueues
    /// and is drained here after the current callback returns.
    fn deliver_pending(&self) {
        loop {
            let mut next: Option<(u64, Box<dyn ChangeObserver>, ObjectChangeSet)> = None;
            {
                let mut core = self.core.borrow_mut();
                while let Some((id, change)) = core.pending.pop_front() {
                    if let Some(slot) = core
                        .observers
                        .iter_mut()
                        .find(|s| s.id == id && !s.removed)
                        && let Some(hook) = slot.hook.take()
                    {
                        next = Some((id, hook, change));
                        break;
                    }
                }
                if next.is_none() {
                    core.delivering = false;
                    return;
                }
            }
            let (id, mut hook, change) = next.unwrap();
            hook.before(&change);
            hook.after(&change);

            let mut core = self.core.borrow_mut();
            if change.deleted {
                // No further notifications after the deletion payload.
                core.observers.retain(|s| s.id != id);
            } else if let Some(slot) = core.observers.iter_mut().find(|s| s.id == id) {
                if slot.removed {
                    core.observers.retain(|s| s.id != id);
                } else {
                    slot.hook = Some(hook);
                }
            }
        }
    }

    pub fn table_key(&self, name: &str) -> Result<TableKey> {
        self.core.borrow().table_key_by_name(name)
    }

    /// Whether the given object still exists. Managed handles check this
    /// before every dereference; row keys are invalidated by deletion.
    pub fn is_valid(&self, link: ObjLink) -> bool {
        let core = self.core.borrow();
        core.table(link.table)
            .map(|t| t.rows.contains_key(&link.obj))
            .unwrap_or(false)
    }

    /// Read a cell as a dynamic value. Collections come back as deep
    /// copies.
    pub fn get_value(&self, link: ObjLink, col: ColKey) -> Result<Mixed> {
        Ok(self.core.borrow().cell(link, col)?.clone())
    }

    pub fn object_count(&self, table: TableKey) -> Result<usize> {
        Ok(self.core.borrow().table(table)?.rows.len())
    }

    pub fn find_by_primary_key(&self, table: TableKey, pk: &Mixed) -> Result<Option<ObjKey>> {
        self.core.borrow().table(table)?.find_by_primary_key(pk)
    }

    pub fn list_len(&self, link: ObjLink, col: ColKey) -> Result<usize> {
        let core = self.core.borrow();
        Ok(core.cell(link, col)?.get_list()?.len())
    }

    pub fn list_get(&self, link: ObjLink, col: ColKey, index: usize) -> Result<Mixed> {
        let core = self.core.borrow();
        let items = core.cell(link, col)?.get_list()?;
        items.get(index).cloned().ok_or_else(|| Error::TypeMismatch {
            expected: format!("index < {}", items.len()),
            found: format!("index {index}"),
        })
    }

    pub fn dict_len(&self, link: ObjLink, col: ColKey) -> Result<usize> {
        let core = self.core.borrow();
        Ok(core.cell(link, col)?.get_dictionary()?.len())
    }

    pub fn dict_get(&self, link: ObjLink, col: ColKey, key: &str) -> Result<Option<Mixed>> {
        let core = self.core.borrow();
        Ok(core.cell(link, col)?.get_dictionary()?.get(key).cloned())
    }

    pub fn dict_keys(&self, link: ObjLink, col: ColKey) -> Result<Vec<String>> {
        let core = self.core.borrow();
        Ok(core
            .cell(link, col)?
            .get_dictionary()?
            .keys()
            .cloned()
            .collect())
    }

    pub(crate) fn register_observer(
        &self,
        target: ObjLink,
        hook: Box<dyn ChangeObserver>,
    ) -> u64 {
        let mut core = self.core.borrow_mut();
        let id = core.next_observer_id;
        core.next_observer_id += 1;
        core.observers.push(ObserverSlot {
            id,
            target,
            hook: Some(hook),
            removed: false,
        });
        id
    }

    pub(crate) fn unregister_observer(&self, id: u64) {
        let mut core = self.core.borrow_mut();
        if let Some(pos) = core.observers.iter().position(|s| s.id == id) {
            if core.observers[pos].hook.is_some() {
                core.observers.remove(pos);
            } else {
                // Mid-delivery; the delivery loop drops it afterwards.
                core.observers[pos].removed = true;
            }
        }
    }
}

/// Handle through which a write transaction mutates the store. Only
/// obtainable inside [`Store::write`]; every operation still revalidates
/// that the transaction is open, so a stale managed handle fails loudly
/// instead of writing outside the transaction.
pub struct WriteGuard<'a> {
    store: &'a Store,
}

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        self.store
    }

    fn core(&self) -> std::cell::RefMut<'a, Core> {
        self.store.core.borrow_mut()
    }

    /// Persist an unmanaged instance and every unmanaged object it links
    /// to, returning a managed handle.
    pub fn add<M: Model>(&mut self, value: &M) -> Result<crate::managed::Managed<M>> {
        let link = crate::accessors::insert_object(self, value)?;
        Ok(crate::managed::Managed::new(self.store, link))
    }

    /// Delete a managed object, cascading to embedded children.
    pub fn remove<M: Model>(&mut self, object: &crate::managed::Managed<M>) -> Result<()> {
        self.remove_object(object.object_link())
    }

    pub fn create_object(&mut self, table: TableKey) -> Result<ObjLink> {
        self.core().create_object(table)
    }

    /// Create a row keyed by `pk`, or return the existing row holding that
    /// key (upsert-by-key).
    pub fn create_object_with_primary_key(
        &mut self,
        table: TableKey,
        pk: Mixed,
    ) -> Result<ObjLink> {
        self.core().create_object_with_primary_key(table, pk)
    }

    pub fn create_and_set_linked_object(&mut self, obj: ObjLink, col: ColKey) -> Result<ObjLink> {
        self.core().create_and_set_linked_object(obj, col)
    }

    pub fn create_and_insert_linked_object(
        &mut self,
        obj: ObjLink,
        col: ColKey,
        index: usize,
    ) -> Result<ObjLink> {
        self.core().create_and_insert_linked_object(obj, col, index)
    }

    pub fn set_value(&mut self, obj: ObjLink, col: ColKey, value: Mixed) -> Result<()> {
        self.core().write_cell(obj, col, value)
    }

    /// Store null through the engine's explicit null operation. Fails on
    /// non-nullable columns.
    pub fn set_null(&mut self, obj: ObjLink, col: ColKey) -> Result<()> {
        self.core().set_null(obj, col)
    }

    /// Point a link column at an already-stored row.
    pub fn set_link(&mut self, obj: ObjLink, col: ColKey, target: ObjLink) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.check_linkable(target)?;
        core.write_cell(obj, col, Mixed::Link(target))
    }

    /// Append an already-stored row to a link list.
    pub fn link_push(&mut self, obj: ObjLink, col: ColKey, target: ObjLink) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.check_linkable(target)?;
        core.list_cell_mut(obj, col)?.push(Mixed::Link(target));
        Ok(())
    }

    pub fn list_push(&mut self, obj: ObjLink, col: ColKey, value: Mixed) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.check_element(obj, col, &value)?;
        let items = core.list_cell_mut(obj, col)?;
        items.push(Mixed::Null);
        let slot = items.last_mut().unwrap();
        store_cell(slot, value);
        Ok(())
    }

    pub fn list_set(&mut self, obj: ObjLink, col: ColKey, index: usize, value: Mixed) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.check_element(obj, col, &value)?;
        let items = core.list_cell_mut(obj, col)?;
        let len = items.len();
        let Some(slot) = items.get_mut(index) else {
            return Err(Error::TypeMismatch {
                expected: format!("index < {len}"),
                found: format!("index {index}"),
            });
        };
        store_cell(slot, value);
        Ok(())
    }

    pub fn list_erase(&mut self, obj: ObjLink, col: ColKey, index: usize) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        let items = core.list_cell_mut(obj, col)?;
        if index >= items.len() {
            return Err(Error::TypeMismatch {
                expected: format!("index < {}", items.len()),
                found: format!("index {index}"),
            });
        }
        items.remove(index);
        Ok(())
    }

    pub fn list_clear(&mut self, obj: ObjLink, col: ColKey) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.list_cell_mut(obj, col)?.clear();
        Ok(())
    }

    pub fn dict_insert(&mut self, obj: ObjLink, col: ColKey, key: &str, value: Mixed) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        if !value.is_null() {
            core.check_element(obj, col, &value)?;
        }
        let entries = core.dict_cell_mut(obj, col)?;
        let slot = entries.entry(key.to_owned()).or_insert(Mixed::Null);
        store_cell(slot, value);
        Ok(())
    }

    pub fn dict_remove(&mut self, obj: ObjLink, col: ColKey, key: &str) -> Result<()> {
        let mut core = self.core();
        core.require_write()?;
        core.dict_cell_mut(obj, col)?.remove(key);
        Ok(())
    }

    pub fn remove_object(&mut self, obj: ObjLink) -> Result<()> {
        self.core().remove_object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::{Store, TableSpec};
    use crate::error::Error;
    use crate::mixed::Mixed;
    use crate::property::PropertyType;
    use crate::schema::ObjectKind;
    use crate::store::ColKey;
    use crate::store::table::ColumnSpec;

    fn person_spec() -> TableSpec {
        TableSpec {
            name: "Person",
            kind: ObjectKind::TopLevel,
            primary_key: Some(0),
            columns: vec![
                ColumnSpec {
                    name: "id",
                    ty: PropertyType::STRING,
                    target: None,
                },
                ColumnSpec {
                    name: "age",
                    ty: PropertyType::INT,
                    target: None,
                },
                ColumnSpec {
                    name: "email",
                    ty: PropertyType::STRING | PropertyType::NULLABLE,
                    target: None,
                },
                ColumnSpec {
                    name: "tags",
                    ty: PropertyType::STRING | PropertyType::ARRAY,
                    target: None,
                },
            ],
        }
    }

    fn open_store() -> Store {
        Store::open(vec![person_spec()]).unwrap()
    }

    #[test]
    fn test_open_rejects_unknown_link_target() {
        let spec = TableSpec {
            name: "Broken",
            kind: ObjectKind::TopLevel,
            primary_key: None,
            columns: vec![ColumnSpec {
                name: "other",
                ty: PropertyType::OBJECT | PropertyType::NULLABLE,
                target: Some("Missing"),
            }],
        };
        assert!(matches!(
            Store::open(vec![spec]),
            Err(Error::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_write_outside_transaction_fails() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let link = store
            .write(|txn| txn.create_object_with_primary_key(table, Mixed::from("p1")))
            .unwrap();

        // A guard that escaped its transaction must fail loudly.
        let mut stale = super::WriteGuard::new(&store);
        assert!(matches!(
            stale.set_value(link, ColKey::from_index(1), Mixed::Int(1)),
            Err(Error::NotInWriteTransaction)
        ));
    }

    #[test]
    fn test_create_object_with_primary_key_is_upsert() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let (first, second) = store
            .write(|txn| {
                let first = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
                let second = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
                Ok((first, second))
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.object_count(table).unwrap(), 1);
        assert_eq!(
            store.find_by_primary_key(table, &Mixed::from("p1")).unwrap(),
            Some(first.obj)
        );
        assert_eq!(
            store.find_by_primary_key(table, &Mixed::from("p2")).unwrap(),
            None
        );
    }

    #[test]
    fn test_set_null_requires_nullable_column() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        store
            .write(|txn| {
                let link = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
                txn.set_value(link, ColKey::from_index(2), Mixed::from("a@b.c"))?;
                txn.set_null(link, ColKey::from_index(2))?;
                assert!(matches!(
                    txn.set_null(link, ColKey::from_index(1)),
                    Err(Error::NotNullable { .. })
                ));
                Ok(link)
            })
            .map(|link| {
                assert_eq!(
                    store.get_value(link, ColKey::from_index(2)).unwrap(),
                    Mixed::Null
                );
            })
            .unwrap();
    }

    #[test]
    fn test_type_mismatch_on_wrong_cell_type() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let result = store.write(|txn| {
            let link = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
            txn.set_value(link, ColKey::from_index(1), Mixed::from("not an int"))
        });
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let link = store
            .write(|txn| {
                let link = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
                txn.set_value(link, ColKey::from_index(1), Mixed::Int(30))?;
                Ok(link)
            })
            .unwrap();

        let result: crate::error::Result<()> = store.write(|txn| {
            txn.set_value(link, ColKey::from_index(1), Mixed::Int(99))?;
            txn.create_object_with_primary_key(table, Mixed::from("p2"))?;
            txn.remove_object(link)?;
            Err(Error::TypeMismatch {
                expected: "forced failure".into(),
                found: "".into(),
            })
        });
        assert!(result.is_err());

        // Original row restored with its pre-transaction value, the new row
        // gone.
        assert!(store.is_valid(link));
        assert_eq!(
            store.get_value(link, ColKey::from_index(1)).unwrap(),
            Mixed::Int(30)
        );
        assert_eq!(store.object_count(table).unwrap(), 1);
    }

    #[test]
    fn test_list_operations() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let tags = ColKey::from_index(3);
        let link = store
            .write(|txn| {
                let link = txn.create_object_with_primary_key(table, Mixed::from("p1"))?;
                txn.list_push(link, tags, Mixed::from("a"))?;
                txn.list_push(link, tags, Mixed::from("b"))?;
                txn.list_set(link, tags, 0, Mixed::from("c"))?;
                assert!(txn.list_push(link, tags, Mixed::Int(1)).is_err());
                Ok(link)
            })
            .unwrap();
        assert_eq!(store.list_len(link, tags).unwrap(), 2);
        assert_eq!(store.list_get(link, tags, 0).unwrap(), Mixed::from("c"));
        assert_eq!(store.list_get(link, tags, 1).unwrap(), Mixed::from("b"));
    }

    #[test]
    fn test_nested_write_is_rejected() {
        let store = open_store();
        let result = store.write(|_| {
            let inner = store.write(|_| Ok(()));
            assert!(matches!(inner, Err(Error::WriteInProgress)));
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_deleted_object_invalidates_reads() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let link = store
            .write(|txn| txn.create_object_with_primary_key(table, Mixed::from("p1")))
            .unwrap();
        store.write(|txn| txn.remove_object(link)).unwrap();
        assert!(!store.is_valid(link));
        assert!(matches!(
            store.get_value(link, ColKey::from_index(0)),
            Err(Error::ObjectInvalidated)
        ));
    }

    #[test]
    fn test_reads_need_no_transaction() {
        let store = open_store();
        let table = store.table_key("Person").unwrap();
        let link = store
            .write(|txn| txn.create_object_with_primary_key(table, Mixed::from("p1")))
            .unwrap();
        assert_eq!(
            store.get_value(link, ColKey::from_index(0)).unwrap(),
            Mixed::from("p1")
        );
    }
}
