mod accessors;
mod error;
mod link;
mod managed;
mod mixed;
mod model;
mod observation;
mod property;
mod schema;
pub mod store;
mod type_info;

pub use accessors::Accessor;
pub use error::{Error, Result};
pub use link::Link;
pub use managed::{Managed, ManagedDictionary, ManagedList, ManagedMixed};
pub use mixed::{Mixed, MixedKind, mixed_cast};
pub use observation::{NotificationToken, ObjectChange, PropertyChange};
pub use property::PropertyType;
pub use schema::{Model, ObjectKind, Property, ReadFn, Schema, SetFn};
pub use store::{ColKey, ColumnSpec, ObjKey, ObjLink, Store, TableKey, TableSpec, WriteGuard};
pub use type_info::{Persist, TypeInfo};

pub use bson::oid::ObjectId;
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
