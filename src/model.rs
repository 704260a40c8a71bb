/// Declare the persisted schema for an existing struct.
///
/// Lists every persisted field with its type, in the order columns should
/// be created; the declaration order is what change notifications map
/// column indexes back through. A field may be marked `[primary_key]`.
///
/// ```
/// #[derive(Debug)]
/// struct Dog {
///     name: String,
///     age: i64,
/// }
///
/// objmap::object_schema!(Dog (TopLevel) {
///     name: String [primary_key],
///     age: i64,
/// });
///
/// assert_eq!(<Dog as objmap::Model>::schema().primary_key().unwrap().name, "name");
/// ```
///
/// A schema declaring two primary keys does not compile:
///
/// ```compile_fail
/// struct Bad {
///     a: i64,
///     b: i64,
/// }
///
/// objmap::object_schema!(Bad (TopLevel) {
///     a: i64 [primary_key],
///     b: i64 [primary_key],
/// });
///
/// let _ = <Bad as objmap::Model>::schema();
/// ```
///
/// Neither does an embedded schema with a primary key:
///
/// ```compile_fail
/// struct BadEmbedded {
///     a: i64,
/// }
///
/// objmap::object_schema!(BadEmbedded (Embedded) {
///     a: i64 [primary_key],
/// });
///
/// let _ = <BadEmbedded as objmap::Model>::schema();
/// ```
///
/// Nor a field whose type does not resolve to a storage type:
///
/// ```compile_fail
/// struct BadField {
///     a: u8,
/// }
///
/// objmap::object_schema!(BadField (TopLevel) {
///     a: u8,
/// });
///
/// let _ = <BadField as objmap::Model>::schema();
/// ```
#[macro_export]
macro_rules! object_schema {
    ($name:ident ($kind:ident) { $($field:ident : $fty:ty $([$marker:ident])?),* $(,)? }) => {
        impl $crate::Model for $name {
            const NAME: &'static str = stringify!($name);
            const KIND: $crate::ObjectKind = $crate::ObjectKind::$kind;

            fn schema() -> &'static $crate::Schema<Self> {
                static SCHEMA: $crate::Schema<$name> = $crate::Schema::new(
                    stringify!($name),
                    $crate::ObjectKind::$kind,
                    &[$(
                        $crate::object_schema!(@property $name, $field, $fty $(, $marker)?)
                    ),*],
                );
                &SCHEMA
            }

            fn from_managed(object: &$crate::Managed<Self>) -> $crate::Result<Self> {
                Ok(Self {
                    $($field: object.get(stringify!($field))?),*
                })
            }
        }
    };

    (@property $name:ident, $field:ident, $fty:ty) => {{
        fn set(
            value: &$name,
            txn: &mut $crate::WriteGuard<'_>,
            obj: $crate::ObjLink,
            col: $crate::ColKey,
        ) -> $crate::Result<()> {
            <$fty as $crate::Accessor>::set(txn, obj, col, &value.$field)
        }
        $crate::Property::new::<$fty>(stringify!($field), set)
    }};

    (@property $name:ident, $field:ident, $fty:ty, primary_key) => {{
        fn set(
            value: &$name,
            txn: &mut $crate::WriteGuard<'_>,
            obj: $crate::ObjLink,
            col: $crate::ColKey,
        ) -> $crate::Result<()> {
            <$fty as $crate::Accessor>::set(txn, obj, col, &value.$field)
        }
        fn read(value: &$name) -> $crate::Mixed {
            $crate::Persist::to_mixed(&value.$field)
        }
        $crate::Property::primary_key::<$fty>(stringify!($field), set, read)
    }};
}

/// Persist a fieldless enum as its integer discriminant.
///
/// The cast to storage is static; reading back a value that matches no
/// listed variant is a type mismatch.
///
/// ```
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Color {
///     Red = 1,
///     Green = 2,
/// }
///
/// objmap::int_enum!(Color { Red, Green });
///
/// use objmap::{Mixed, Persist};
/// assert_eq!(Color::Green.to_mixed(), Mixed::Int(2));
/// assert_eq!(Color::from_mixed(Mixed::Int(1)).unwrap(), Color::Red);
/// assert!(Color::from_mixed(Mixed::Int(9)).is_err());
/// ```
#[macro_export]
macro_rules! int_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::TypeInfo for $name {
            const TYPE: $crate::PropertyType = $crate::PropertyType::INT;
        }

        impl $crate::Persist for $name {
            fn to_mixed(&self) -> $crate::Mixed {
                $crate::Mixed::Int(*self as i64)
            }

            fn from_mixed(value: $crate::Mixed) -> $crate::Result<Self> {
                let found = match value {
                    $crate::Mixed::Int(v) => {
                        $(
                            if v == $name::$variant as i64 {
                                return Ok($name::$variant);
                            }
                        )+
                        format!("Int({v})")
                    }
                    other => format!("{:?}", other.kind()),
                };
                Err($crate::Error::TypeMismatch {
                    expected: concat!("a variant of ", stringify!($name)).into(),
                    found,
                })
            }
        }

        impl $crate::Accessor for $name {
            fn set(
                txn: &mut $crate::WriteGuard<'_>,
                obj: $crate::ObjLink,
                col: $crate::ColKey,
                value: &Self,
            ) -> $crate::Result<()> {
                txn.set_value(obj, col, $crate::Persist::to_mixed(value))
            }

            fn get(
                store: &$crate::Store,
                obj: $crate::ObjLink,
                col: $crate::ColKey,
            ) -> $crate::Result<Self> {
                <$name as $crate::Persist>::from_mixed(store.get_value(obj, col)?)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::mixed::Mixed;
    use crate::property::PropertyType;
    use crate::schema::Model;
    use crate::store::Store;
    use crate::type_info::{Persist, TypeInfo};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Priority {
        Low = 0,
        Medium = 5,
        High = 10,
    }

    crate::int_enum!(Priority { Low, Medium, High });

    #[derive(Debug, PartialEq)]
    struct Task {
        title: String,
        priority: Priority,
        backup_priority: Option<Priority>,
    }

    crate::object_schema!(Task (TopLevel) {
        title: String [primary_key],
        priority: Priority,
        backup_priority: Option<Priority>,
    });

    #[test]
    fn test_enum_resolves_to_int() {
        assert_eq!(Priority::TYPE, PropertyType::INT);
        assert_eq!(
            <Option<Priority>>::TYPE,
            PropertyType::INT | PropertyType::NULLABLE
        );
    }

    #[test]
    fn test_enum_round_trip() {
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(
                Priority::from_mixed(priority.to_mixed()).unwrap(),
                priority
            );
        }
        assert!(Priority::from_mixed(Mixed::Int(3)).is_err());
        assert!(Priority::from_mixed(Mixed::from("High")).is_err());
    }

    #[test]
    fn test_optional_field_combinations_round_trip() {
        use chrono::{DateTime, Utc};
        use itertools::iproduct;

        #[derive(Debug, PartialEq)]
        struct Profile {
            id: String,
            foo: Option<String>,
            bar: Option<DateTime<Utc>>,
            qux: Option<i64>,
        }

        crate::object_schema!(Profile (TopLevel) {
            id: String [primary_key],
            foo: Option<String>,
            bar: Option<DateTime<Utc>>,
            qux: Option<i64>,
        });

        let store = Store::open(vec![Profile::schema().table_spec()]).unwrap();

        let foo_values = [Some("hello".to_string()), None];
        let bar_values = [Some(Utc::now()), None];
        let qux_values = [Some(42i64), None];

        for (i, (foo, bar, qux)) in
            iproduct!(foo_values, bar_values, qux_values).enumerate()
        {
            let profile = Profile {
                id: format!("p{i}"),
                foo: foo.clone(),
                bar,
                qux,
            };
            let managed = store.write(|txn| txn.add(&profile)).unwrap();
            assert_eq!(managed.detach().unwrap(), profile);
        }
    }

    #[test]
    fn test_enum_fields_persist_through_store() {
        let store = Store::open(vec![Task::schema().table_spec()]).unwrap();
        let task = store
            .write(|txn| {
                txn.add(&Task {
                    title: "write docs".into(),
                    priority: Priority::High,
                    backup_priority: None,
                })
            })
            .unwrap();

        assert_eq!(task.get::<Priority>("priority").unwrap(), Priority::High);
        assert_eq!(
            task.get::<Option<Priority>>("backup_priority").unwrap(),
            None
        );

        // The stored representation is the discriminant.
        assert_eq!(
            task.value_for("priority").unwrap(),
            Mixed::Int(10)
        );

        let detached = task.detach().unwrap();
        assert_eq!(detached.priority, Priority::High);
        assert_eq!(detached.backup_priority, None);
    }
}
