use std::fmt::Debug;
use std::ops::BitOr;

/// The storage type of a column: a base tag describing the leaf value,
/// optionally combined with the [`NULLABLE`](Self::NULLABLE) flag and at
/// most one collection flag.
///
/// A leaf field carries exactly one base tag. Collection flags compose with
/// exactly one underlying base tag (the element type, or
/// [`OBJECT`](Self::OBJECT) for link collections). [`MIXED`](Self::MIXED)
/// is itself the open union and never combines with another base tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyType(u16);

impl PropertyType {
    pub const INT: Self = Self(0);
    pub const BOOL: Self = Self(1);
    pub const STRING: Self = Self(2);
    pub const BINARY: Self = Self(3);
    pub const DATE: Self = Self(4);
    pub const DOUBLE: Self = Self(5);
    pub const OBJECT: Self = Self(6);
    pub const MIXED: Self = Self(7);
    pub const OBJECT_ID: Self = Self(8);
    pub const DECIMAL: Self = Self(9);
    pub const UUID: Self = Self(10);

    pub const NULLABLE: Self = Self(1 << 6);
    pub const ARRAY: Self = Self(1 << 7);
    pub const SET: Self = Self(1 << 8);
    pub const DICTIONARY: Self = Self(1 << 9);

    const BASE_MASK: u16 = 0x3F;

    /// Combine this type with a flag. Const counterpart of `|`.
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// The base tag, with all flags stripped.
    pub const fn base(self) -> Self {
        Self(self.0 & Self::BASE_MASK)
    }

    pub const fn is_nullable(self) -> bool {
        self.0 & Self::NULLABLE.0 != 0
    }

    pub const fn is_array(self) -> bool {
        self.0 & Self::ARRAY.0 != 0
    }

    pub const fn is_set(self) -> bool {
        self.0 & Self::SET.0 != 0
    }

    pub const fn is_dictionary(self) -> bool {
        self.0 & Self::DICTIONARY.0 != 0
    }

    pub const fn is_collection(self) -> bool {
        self.0 & (Self::ARRAY.0 | Self::SET.0 | Self::DICTIONARY.0) != 0
    }

    /// Whether the base tag equals the given base.
    pub const fn base_is(self, base: Self) -> bool {
        self.0 & Self::BASE_MASK == base.0
    }

    /// Name of the base tag, for diagnostics.
    pub const fn base_name(self) -> &'static str {
        match self.0 & Self::BASE_MASK {
            0 => "Int",
            1 => "Bool",
            2 => "String",
            3 => "Binary",
            4 => "Date",
            5 => "Double",
            6 => "Object",
            7 => "Mixed",
            8 => "ObjectId",
            9 => "Decimal",
            10 => "Uuid",
            _ => "Unknown",
        }
    }
}

impl BitOr for PropertyType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl Debug for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_name())?;
        if self.is_nullable() {
            write!(f, "?")?;
        }
        if self.is_array() {
            write!(f, "[]")?;
        }
        if self.is_set() {
            write!(f, "{{}}")?;
        }
        if self.is_dictionary() {
            write!(f, "{{:}}")?;
        }
        Ok(())
    }
}
