use std::fmt::Debug;

/// Opaque store-assigned identifier for a table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey(pub(crate) u32);

impl Debug for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableKey({})", self.0)
    }
}

/// Opaque store-assigned identifier for a row within its table. Keys are
/// never reused; a deleted key stays dead, which is what makes the liveness
/// check on managed handles meaningful.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjKey(pub(crate) u64);

impl Debug for ObjKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjKey({})", self.0)
    }
}

/// Opaque identifier for a column: its position in the declared property
/// order. Column order matches declaration order for the life of the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColKey(pub(crate) u32);

impl ColKey {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for ColKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ColKey({})", self.0)
    }
}

/// A fully qualified reference to a stored object: table plus row key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjLink {
    pub table: TableKey,
    pub obj: ObjKey,
}

impl ObjLink {
    pub fn new(table: TableKey, obj: ObjKey) -> Self {
        Self { table, obj }
    }
}

impl Debug for ObjLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjLink({}:{})", self.table.0, self.obj.0)
    }
}
