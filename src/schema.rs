use std::fmt::Debug;

use crate::error::{Error, Result};
use crate::managed::Managed;
use crate::mixed::Mixed;
use crate::property::PropertyType;
use crate::store::{ColKey, ColumnSpec, ObjLink, TableSpec, WriteGuard};
use crate::type_info::TypeInfo;

/// How objects of a schema relate to the rest of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// An ordinary object with its own identity.
    TopLevel,
    /// An object whose lifetime and linkage is exclusively owned by one
    /// parent slot. Embedded schemas must not declare a primary key.
    Embedded,
    /// An insert-only object; it can be written but not observed.
    Asymmetric,
}

/// Writes one field of an unmanaged instance into its column.
pub type SetFn<M> = fn(&M, &mut WriteGuard<'_>, ObjLink, ColKey) -> Result<()>;

/// Reads one field of an unmanaged instance as a dynamic value.
pub type ReadFn<M> = fn(&M) -> Mixed;

/// Compile-time record of one persisted field: its name, resolved storage
/// type, link target, primary-key flag and monomorphized accessors. One
/// instance per (struct, field) pair, shared by every instance of the
/// struct.
pub struct Property<M: 'static> {
    pub name: &'static str,
    pub ty: PropertyType,
    pub target: Option<&'static str>,
    pub is_primary_key: bool,
    pub(crate) set: SetFn<M>,
    pub(crate) read: Option<ReadFn<M>>,
}

impl<M> Property<M> {
    /// Descriptor for an ordinary property of field type `T`.
    pub const fn new<T: TypeInfo>(name: &'static str, set: SetFn<M>) -> Self {
        Self {
            name,
            ty: T::TYPE,
            target: T::TARGET,
            is_primary_key: false,
            set,
            read: None,
        }
    }

    /// Descriptor for the primary-key property. The key must be a
    /// non-collection Int, String, ObjectId or Uuid field; anything else
    /// fails schema compilation.
    pub const fn primary_key<T: TypeInfo>(
        name: &'static str,
        set: SetFn<M>,
        read: ReadFn<M>,
    ) -> Self {
        assert!(
            !T::TYPE.is_collection(),
            "a primary key cannot be a collection"
        );
        assert!(
            T::TYPE.base_is(PropertyType::INT)
                || T::TYPE.base_is(PropertyType::STRING)
                || T::TYPE.base_is(PropertyType::OBJECT_ID)
                || T::TYPE.base_is(PropertyType::UUID),
            "a primary key must be an Int, String, ObjectId or Uuid property"
        );
        Self {
            name,
            ty: T::TYPE,
            target: T::TARGET,
            is_primary_key: true,
            set,
            read: Some(read),
        }
    }
}

impl<M> Debug for Property<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Property");
        s.field("name", &self.name).field("ty", &self.ty);
        if let Some(target) = self.target {
            s.field("target", &target);
        }
        if self.is_primary_key {
            s.field("primary_key", &true);
        }
        s.finish()
    }
}

/// Compile-time description of a struct's persisted shape: its name, object
/// kind and ordered property list. Declaration order is column order and is
/// stable for the life of the process; the change-notification adapter
/// relies on that positional parity.
///
/// Construction is `const`-evaluated, so a schema declaring two primary
/// keys, or an embedded schema declaring any primary key, fails to compile.
pub struct Schema<M: 'static> {
    pub name: &'static str,
    pub kind: ObjectKind,
    properties: &'static [Property<M>],
    primary_key: Option<usize>,
}

impl<M> Schema<M> {
    pub const fn new(
        name: &'static str,
        kind: ObjectKind,
        properties: &'static [Property<M>],
    ) -> Self {
        let mut primary_key = None;
        let mut i = 0;
        while i < properties.len() {
            if properties[i].is_primary_key {
                assert!(
                    primary_key.is_none(),
                    "schema declares more than one primary-key property"
                );
                assert!(
                    !matches!(kind, ObjectKind::Embedded),
                    "embedded schemas must not declare a primary key"
                );
                primary_key = Some(i);
            }
            i += 1;
        }
        Self {
            name,
            kind,
            properties,
            primary_key,
        }
    }

    /// All properties, in declaration order.
    pub fn properties(&self) -> &'static [Property<M>] {
        self.properties
    }

    /// Look up a property by name. Linear scan; schemas hold at most a few
    /// dozen properties.
    pub fn find_by_name(&self, name: &str) -> Option<&'static Property<M>> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Position of a named property in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Column key of a named property.
    pub fn column_key(&self, name: &str) -> Result<ColKey> {
        self.position(name)
            .map(ColKey::from_index)
            .ok_or_else(|| Error::PropertyNotFound { name: name.into() })
    }

    /// The property flagged as primary key, if any.
    pub fn primary_key(&self) -> Option<&'static Property<M>> {
        self.primary_key.map(|i| &self.properties[i])
    }

    /// The erased descriptor handed to the store when it is opened.
    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            name: self.name,
            kind: self.kind,
            primary_key: self.primary_key,
            columns: self
                .properties
                .iter()
                .map(|p| ColumnSpec {
                    name: p.name,
                    ty: p.ty,
                    target: p.target,
                })
                .collect(),
        }
    }

    /// The primary-key value of an unmanaged instance, if the schema has a
    /// primary key.
    pub(crate) fn primary_key_value(&self, value: &M) -> Option<Mixed> {
        let property = self.primary_key()?;
        let read = property.read?;
        Some(read(value))
    }

    /// Write every property of an unmanaged instance into the given row, in
    /// declaration order.
    pub(crate) fn set_all(
        &self,
        value: &M,
        txn: &mut WriteGuard<'_>,
        obj: ObjLink,
    ) -> Result<()> {
        for (index, property) in self.properties.iter().enumerate() {
            (property.set)(value, txn, obj, ColKey::from_index(index))?;
        }
        Ok(())
    }
}

impl<M: Model> Schema<M> {
    /// Read the live value of a named property off a managed instance,
    /// wrapped as a dynamic value.
    ///
    /// With `excluding_collections`, an Array, Set or Dictionary property
    /// is reported as the empty collection of its shape instead of being
    /// materialized. Notification delivery calls this once per changed
    /// property and must never pay for reading a whole collection just to
    /// discard it.
    pub fn value_for_name(
        &self,
        object: &Managed<M>,
        name: &str,
        excluding_collections: bool,
    ) -> Result<Mixed> {
        let property = self
            .find_by_name(name)
            .ok_or_else(|| Error::PropertyNotFound { name: name.into() })?;
        if excluding_collections && property.ty.is_collection() {
            return Ok(empty_collection(property.ty));
        }
        let col = self.column_key(name)?;
        object.store()?.get_value(object.object_link(), col)
    }
}

impl<M> Debug for Schema<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .finish()
    }
}

fn empty_collection(ty: PropertyType) -> Mixed {
    if ty.is_dictionary() {
        Mixed::Dictionary(Default::default())
    } else {
        Mixed::List(Vec::new())
    }
}

/// A struct that can be persisted: it carries a static schema descriptor
/// and can be rebuilt from a managed row. Implemented by the
/// [`object_schema!`](crate::object_schema) macro.
pub trait Model: Sized + 'static {
    /// The table name objects of this type are stored under.
    const NAME: &'static str;

    /// The object kind of this type.
    const KIND: ObjectKind;

    /// The static schema descriptor; one instance per type, immutable for
    /// the life of the program.
    fn schema() -> &'static Schema<Self>;

    /// Read every property of a managed row back into a plain unmanaged
    /// instance.
    fn from_managed(object: &Managed<Self>) -> Result<Self>;
}
