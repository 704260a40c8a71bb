use thiserror::Error;

/// Errors raised by the object-mapping layer at runtime.
///
/// Schema-definition mistakes (two primary keys, a primary key on an
/// embedded schema, a field type that does not resolve) are not represented
/// here: they fail compilation when the schema's static descriptor is
/// evaluated.
#[derive(Debug, Error)]
pub enum Error {
    /// A value did not have the type that the caller or the column expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected type or variant.
        expected: String,
        /// What was actually found.
        found: String,
    },

    /// A write was attempted while no write transaction is open.
    #[error("cannot modify objects outside of a write transaction")]
    NotInWriteTransaction,

    /// A write transaction is already open on this store.
    #[error("a write transaction is already open")]
    WriteInProgress,

    /// A managed handle was dereferenced after its object was deleted or its
    /// store was dropped.
    #[error("object has been deleted or invalidated")]
    ObjectInvalidated,

    /// Tried to link an embedded object that is already owned by another
    /// parent slot. The original linkage is left unchanged.
    #[error("embedded object is already owned by another parent")]
    AlreadyOwned,

    /// Embedded objects only exist through their owning parent slot and
    /// cannot be created or linked as top-level rows.
    #[error("embedded objects cannot be created outside of a parent")]
    EmbeddedTopLevel,

    /// Arithmetic on a stored null, e.g. incrementing a nullable integer
    /// column that currently holds null. Distinct from an ordinary type
    /// mismatch.
    #[error("cannot apply arithmetic to null value in property '{property}'")]
    NullArithmetic {
        /// Name of the property holding null.
        property: String,
    },

    /// Tried to store null into a column that is not nullable.
    #[error("property '{property}' is not nullable")]
    NotNullable {
        /// Name of the non-nullable property.
        property: String,
    },

    /// Tried to access a table that does not exist in the store.
    #[error("table not found with name '{name}'")]
    TableNotFound {
        /// Name of the table that was not found.
        name: String,
    },

    /// Tried to access a property that the schema does not declare.
    #[error("property not found with name '{name}'")]
    PropertyNotFound {
        /// Name of the property that was not found.
        name: String,
    },

    /// The set of table descriptors handed to the store is inconsistent,
    /// e.g. a link column whose target table is missing.
    #[error("invalid schema: {reason}")]
    InvalidSchema {
        /// Why the descriptors were rejected.
        reason: String,
    },

    /// Asymmetric objects are insert-only and cannot be observed.
    #[error("objects of type '{name}' cannot be observed")]
    NotObservable {
        /// Name of the asymmetric object type.
        name: &'static str,
    },
}

/// Convenience type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
