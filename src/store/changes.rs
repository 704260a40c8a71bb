use std::collections::{HashMap, HashSet};

use crate::mixed::Mixed;
use crate::store::keys::{ColKey, ObjLink};

/// One changed column within a commit, with the value it held when the
/// transaction first touched it.
#[derive(Debug, Clone)]
pub(crate) struct ChangedColumn {
    pub col: ColKey,
    pub old: Mixed,
}

/// The raw per-object change set handed to observers after a commit: the
/// set of changed columns (with first-touch old values), or a deletion
/// marker. Deleted change sets never carry columns.
#[derive(Debug, Clone)]
pub(crate) struct ObjectChangeSet {
    pub columns: Vec<ChangedColumn>,
    pub deleted: bool,
}

impl ObjectChangeSet {
    pub(crate) fn deletion() -> Self {
        Self {
            columns: Vec::new(),
            deleted: true,
        }
    }

    pub(crate) fn contains(&self, col: ColKey) -> bool {
        self.columns.iter().any(|c| c.col == col)
    }

    pub(crate) fn old_for(&self, col: ColKey) -> Option<&Mixed> {
        self.columns.iter().find(|c| c.col == col).map(|c| &c.old)
    }
}

/// Receives the before/after halves of one change cycle. Implemented by the
/// typed notification adapter.
pub(crate) trait ChangeObserver {
    fn before(&mut self, change: &ObjectChangeSet);
    fn after(&mut self, change: &ObjectChangeSet);
}

/// A row removed during the current transaction, kept for rollback.
#[derive(Debug)]
pub(crate) struct DeletedRow {
    pub link: ObjLink,
    pub cells: Vec<Mixed>,
    pub parent: Option<ObjLink>,
}

/// Per-transaction record of everything the transaction touched: the value
/// each cell held when first modified, created rows, and removed rows.
/// Doubles as the rollback log and as the change-set source at commit.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    cells: HashMap<(ObjLink, ColKey), Mixed>,
    created: HashSet<ObjLink>,
    deleted: Vec<DeletedRow>,
}

impl Journal {
    /// Record the old value of a cell the first time it is touched. Later
    /// writes to the same cell keep the original.
    pub(crate) fn record_cell(&mut self, link: ObjLink, col: ColKey, old: Mixed) {
        if self.created.contains(&link) {
            return;
        }
        self.cells.entry((link, col)).or_insert(old);
    }

    pub(crate) fn record_created(&mut self, link: ObjLink) {
        self.created.insert(link);
    }

    pub(crate) fn record_deleted(&mut self, row: DeletedRow) {
        self.deleted.push(row);
    }

    pub(crate) fn was_created(&self, link: ObjLink) -> bool {
        self.created.contains(&link)
    }

    pub(crate) fn was_deleted(&self, link: ObjLink) -> bool {
        self.deleted.iter().any(|d| d.link == link)
    }

    /// The change set for one object, if the transaction touched it.
    pub(crate) fn change_set_for(&self, link: ObjLink) -> Option<ObjectChangeSet> {
        if self.was_deleted(link) {
            // Rows both created and deleted in one transaction were never
            // observable outside it.
            if self.was_created(link) {
                return None;
            }
            return Some(ObjectChangeSet::deletion());
        }
        if self.was_created(link) {
            return None;
        }

        let mut columns: Vec<ChangedColumn> = self
            .cells
            .iter()
            .filter(|((l, _), _)| *l == link)
            .map(|((_, col), old)| ChangedColumn {
                col: *col,
                old: old.clone(),
            })
            .collect();
        if columns.is_empty() {
            return None;
        }
        columns.sort_by_key(|c| c.col);
        Some(ObjectChangeSet {
            columns,
            deleted: false,
        })
    }

    /// Consume the journal for rollback, yielding what must be undone:
    /// deleted rows to restore (in reverse deletion order), cells to
    /// restore, and created rows to drop.
    pub(crate) fn into_rollback(
        self,
    ) -> (
        Vec<DeletedRow>,
        HashMap<(ObjLink, ColKey), Mixed>,
        HashSet<ObjLink>,
    ) {
        let mut deleted = self.deleted;
        deleted.reverse();
        (deleted, self.cells, self.created)
    }
}
