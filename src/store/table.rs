use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::mixed::Mixed;
use crate::property::PropertyType;
use crate::schema::ObjectKind;
use crate::store::keys::{ColKey, ObjKey, ObjLink, TableKey};

/// Erased description of one column: name, storage type, and the target
/// table for link-bearing columns.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: PropertyType,
    pub target: Option<&'static str>,
}

/// Erased description of one table, produced from a schema descriptor.
/// Column order is the schema's declaration order.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub kind: ObjectKind,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Option<usize>,
}

/// One table's in-memory state: its spec, its rows, and (for embedded
/// tables) the owning parent of each row.
#[derive(Debug)]
pub(crate) struct TableCore {
    pub(crate) key: TableKey,
    pub(crate) spec: TableSpec,
    pub(crate) rows: BTreeMap<ObjKey, Vec<Mixed>>,
    pub(crate) parents: HashMap<ObjKey, ObjLink>,
    next_key: u64,
}

impl TableCore {
    pub(crate) fn new(key: TableKey, spec: TableSpec) -> Self {
        Self {
            key,
            spec,
            rows: BTreeMap::new(),
            parents: HashMap::new(),
            next_key: 0,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.spec.name
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        self.spec.kind
    }

    pub(crate) fn column(&self, col: ColKey) -> Result<&ColumnSpec> {
        self.spec
            .columns
            .get(col.index())
            .ok_or_else(|| Error::PropertyNotFound {
                name: format!("{col:?}"),
            })
    }

    /// Allocate a fresh row key and insert a default-initialized row.
    pub(crate) fn create_row(&mut self) -> ObjLink {
        let obj = ObjKey(self.next_key);
        self.next_key += 1;
        let cells = self.spec.columns.iter().map(default_cell).collect();
        self.rows.insert(obj, cells);
        ObjLink::new(self.key, obj)
    }

    pub(crate) fn row(&self, obj: ObjKey) -> Result<&Vec<Mixed>> {
        self.rows.get(&obj).ok_or(Error::ObjectInvalidated)
    }

    pub(crate) fn row_mut(&mut self, obj: ObjKey) -> Result<&mut Vec<Mixed>> {
        self.rows.get_mut(&obj).ok_or(Error::ObjectInvalidated)
    }

    /// First row whose primary-key column holds the given value.
    pub(crate) fn find_by_primary_key(&self, pk: &Mixed) -> Result<Option<ObjKey>> {
        let Some(pk_col) = self.spec.primary_key else {
            return Err(Error::InvalidSchema {
                reason: format!("table '{}' has no primary key", self.spec.name),
            });
        };
        Ok(self
            .rows
            .iter()
            .find(|(_, cells)| cells[pk_col] == *pk)
            .map(|(obj, _)| *obj))
    }
}

/// The cell a column starts out with before accessor dispatch populates it.
fn default_cell(column: &ColumnSpec) -> Mixed {
    if column.ty.is_dictionary() {
        return Mixed::Dictionary(BTreeMap::new());
    }
    if column.ty.is_collection() {
        return Mixed::List(Vec::new());
    }
    if column.ty.is_nullable()
        || column.ty.base_is(PropertyType::OBJECT)
        || column.ty.base_is(PropertyType::MIXED)
    {
        return Mixed::Null;
    }
    match column.ty.base() {
        PropertyType::INT => Mixed::Int(0),
        PropertyType::BOOL => Mixed::Bool(false),
        PropertyType::STRING => Mixed::String(String::new()),
        PropertyType::DOUBLE => Mixed::Double(0.0),
        PropertyType::BINARY => Mixed::Binary(Vec::new()),
        PropertyType::DATE => Mixed::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
        PropertyType::OBJECT_ID => Mixed::ObjectId(bson::oid::ObjectId::from_bytes([0; 12])),
        PropertyType::UUID => Mixed::Uuid(uuid::Uuid::nil()),
        PropertyType::DECIMAL => Mixed::Decimal(rust_decimal::Decimal::ZERO),
        _ => Mixed::Null,
    }
}

/// Whether a value may be stored into a column of the given type. Mixed
/// columns accept anything, including nested collections; Object columns
/// accept links and null; collection columns accept the matching collection
/// shape with element-checked contents.
pub(crate) fn cell_matches(ty: PropertyType, value: &Mixed) -> bool {
    if value.is_null() {
        return ty.is_nullable()
            || ty.base_is(PropertyType::OBJECT)
            || ty.base_is(PropertyType::MIXED);
    }
    if ty.is_dictionary() {
        return match value {
            Mixed::Dictionary(entries) => entries.values().all(|v| element_matches(ty, v)),
            _ => false,
        };
    }
    if ty.is_collection() {
        return match value {
            Mixed::List(items) => items.iter().all(|v| element_matches(ty, v)),
            _ => false,
        };
    }
    scalar_matches(ty, value)
}

/// Whether a value may be stored as one element of a collection column.
pub(crate) fn element_matches(ty: PropertyType, value: &Mixed) -> bool {
    if value.is_null() {
        return ty.is_nullable() || ty.base_is(PropertyType::OBJECT);
    }
    scalar_matches(ty, value)
}

fn scalar_matches(ty: PropertyType, value: &Mixed) -> bool {
    if ty.base_is(PropertyType::MIXED) {
        return true;
    }
    match value {
        Mixed::Int(_) => ty.base_is(PropertyType::INT),
        Mixed::Bool(_) => ty.base_is(PropertyType::BOOL),
        Mixed::String(_) => ty.base_is(PropertyType::STRING),
        Mixed::Double(_) => ty.base_is(PropertyType::DOUBLE),
        Mixed::Binary(_) => ty.base_is(PropertyType::BINARY),
        Mixed::Timestamp(_) => ty.base_is(PropertyType::DATE),
        Mixed::ObjectId(_) => ty.base_is(PropertyType::OBJECT_ID),
        Mixed::Uuid(_) => ty.base_is(PropertyType::UUID),
        Mixed::Decimal(_) => ty.base_is(PropertyType::DECIMAL),
        Mixed::Link(_) => ty.base_is(PropertyType::OBJECT),
        Mixed::List(_) | Mixed::Dictionary(_) => false,
        Mixed::Null => unreachable!("null handled by callers"),
    }
}

/// Write a value into a slot. Collection values are written
/// create-then-populate: the empty collection is stored first, then each
/// child is inserted, recursing for nested collections. The placeholder
/// must exist before any child does.
pub(crate) fn store_cell(slot: &mut Mixed, value: Mixed) {
    match value {
        Mixed::List(items) => {
            *slot = Mixed::List(Vec::new());
            for item in items {
                let Mixed::List(list) = slot else {
                    unreachable!("slot was just initialized as a list")
                };
                list.push(Mixed::Null);
                let child = list.last_mut().unwrap();
                store_cell(child, item);
            }
        }
        Mixed::Dictionary(entries) => {
            *slot = Mixed::Dictionary(BTreeMap::new());
            for (key, item) in entries {
                let Mixed::Dictionary(dict) = slot else {
                    unreachable!("slot was just initialized as a dictionary")
                };
                let child = dict.entry(key).or_insert(Mixed::Null);
                store_cell(child, item);
            }
        }
        other => *slot = other,
    }
}
