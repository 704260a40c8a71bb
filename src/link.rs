use std::fmt::Debug;

use crate::schema::Model;
use crate::store::ObjLink;

/// A nullable reference from one object to another declared model type.
///
/// An unmanaged link owns a plain instance of the target; persisting the
/// parent persists the target too (create-or-find by primary key, via the
/// owning slot for embedded targets, or as a fresh row otherwise). A
/// managed link points at a row that is already stored.
#[derive(Default, PartialEq)]
pub enum Link<T: Model> {
    #[default]
    Null,
    Unmanaged(Box<T>),
    Managed(ObjLink),
}

impl<T: Model> Link<T> {
    /// Wrap an unmanaged instance for persistence through the parent.
    pub fn new(value: T) -> Self {
        Link::Unmanaged(Box::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Link::Null)
    }

    /// The stored row this link points at, if it is managed.
    pub fn object_link(&self) -> Option<ObjLink> {
        match self {
            Link::Managed(link) => Some(*link),
            _ => None,
        }
    }
}

impl<T: Model + Debug> Debug for Link<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Null => write!(f, "Link::Null"),
            Link::Unmanaged(value) => f.debug_tuple("Link::Unmanaged").field(value).finish(),
            Link::Managed(link) => f.debug_tuple("Link::Managed").field(link).finish(),
        }
    }
}

impl<T: Model> From<T> for Link<T> {
    fn from(value: T) -> Self {
        Link::new(value)
    }
}
