// reflection/mod.rs - the reflection registry: `Type` descriptors, the traits
// attachable to them, and the `Reflect` trait that gives Rust types a handle
// into that registry.
//
// Mirrors forge_core::ecs::component::Component::handle()'s per-type
// OnceCell caching, generalized from a single component-id registry to
// full type descriptors carrying an open set of attached traits.

pub mod traits;
pub mod type_;

pub use traits::{
    array::ArrayTrait, constructible::ConstructibleTrait, dictionary::DictionaryTrait,
    enum_trait::EnumTrait, fields::FieldsTrait, mask::MaskTrait, nullable::NullableTrait,
    relation_flags::{SymmetricTrait, TreeTrait}, string_conversion::StringConversionTrait,
};
pub use type_::{Type, TypeBuilder};

/// Implemented for any Rust type that participates in the ECS's reflection
/// registry: components, resources, relations, and any value nested inside
/// one of those (fields of a component, element type of a `Vec` field, ...).
///
/// `reflect()` is cheap after the first call: the `Type` is built once per
/// concrete type and cached in a `OnceCell`, the same way
/// `Component::handle()` caches its `ComponentHandle`.
pub trait Reflect: 'static {
    fn reflect() -> &'static Type
    where
        Self: Sized;
}

/// Implements `Reflect` for a type whose `Type` is entirely described by
/// `$build` (an expression producing a `Type`, typically `Type::builder(...)
/// .with_trait(...).build()`). The body only runs once per concrete type.
///
/// ```ignore
/// reflect_leaf!(f32, || {
///     Type::builder("f32", std::mem::size_of::<f32>(), std::mem::align_of::<f32>())
///         .with_trait(constructible_for::<f32>())
///         .build()
/// });
/// ```
#[macro_export]
macro_rules! reflect_leaf {
    ($ty:ty, $build:expr) => {
        impl $crate::ecs::reflection::Reflect for $ty {
            fn reflect() -> &'static $crate::ecs::reflection::Type {
                static CELL: once_cell::sync::OnceCell<$crate::ecs::reflection::Type> =
                    once_cell::sync::OnceCell::new();
                CELL.get_or_init($build)
            }
        }
    };
}

macro_rules! impl_reflect_primitive {
    ($ty:ty) => {
        impl Reflect for $ty {
            fn reflect() -> &'static Type {
                static CELL: once_cell::sync::OnceCell<Type> = once_cell::sync::OnceCell::new();
                CELL.get_or_init(|| {
                    Type::builder(
                        stringify!($ty),
                        std::mem::size_of::<$ty>(),
                        std::mem::align_of::<$ty>(),
                    )
                    .with_trait(traits::constructible::with_copy::<$ty>(
                        traits::constructible::with_default::<$ty>(traits::constructible::constructible_of::<$ty>()),
                    ))
                    .with_trait(traits::string_conversion::string_conversion_of::<$ty>())
                    .build()
                })
            }
        }
    };
}

impl_reflect_primitive!(bool);
impl_reflect_primitive!(u8);
impl_reflect_primitive!(u16);
impl_reflect_primitive!(u32);
impl_reflect_primitive!(u64);
impl_reflect_primitive!(i8);
impl_reflect_primitive!(i16);
impl_reflect_primitive!(i32);
impl_reflect_primitive!(i64);
impl_reflect_primitive!(f32);
impl_reflect_primitive!(f64);
impl_reflect_primitive!(usize);
impl_reflect_primitive!(isize);

impl Reflect for String {
    fn reflect() -> &'static Type {
        static CELL: once_cell::sync::OnceCell<Type> = once_cell::sync::OnceCell::new();
        CELL.get_or_init(|| {
            Type::builder("String", std::mem::size_of::<String>(), std::mem::align_of::<String>())
                .with_trait(traits::constructible::with_copy::<String>(
                    traits::constructible::with_default::<String>(traits::constructible::constructible_of::<String>()),
                ))
                .build()
        })
    }
}

impl<T: Reflect + Default + 'static> Reflect for Vec<T> {
    fn reflect() -> &'static Type {
        static CELL: once_cell::sync::OnceCell<Type> = once_cell::sync::OnceCell::new();
        CELL.get_or_init(|| {
            Type::builder(
                format!("Vec<{}>", T::reflect().name()),
                std::mem::size_of::<Vec<T>>(),
                std::mem::align_of::<Vec<T>>(),
            )
            .with_trait(traits::constructible::with_default::<Vec<T>>(
                traits::constructible::constructible_for::<Vec<T>>(),
            ))
            .with_trait(traits::array::array_of_vec::<T>())
            .build()
        })
    }
}
