// name.rs - the `Name` component blueprints attach to instantiated entities
// when `withName` is requested (spec.md §4.8, SPEC_FULL.md §B.5). Grounded on
// examples/original_source's `ecs::Name` (a one-field wrapper reflected with
// just Fields + Constructible, used purely for debugging/inspection, not
// looked up by the core itself).

use crate::ecs::reflection::traits::fields::FieldsTrait;
use crate::ecs::reflection::traits::constructible;
use crate::ecs::reflection::{Reflect, Type};

/// The blueprint-local name an entity was instantiated from, attached when
/// `instantiate(.., with_name: true)` is used. Purely informational: nothing
/// in the core reads it back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Name(pub String);

crate::reflect_leaf!(Name, || {
    unsafe fn address_of_value(instance: *mut u8) -> *mut u8 {
        &mut (*(instance as *mut Name)).0 as *mut String as *mut u8
    }

    Type::builder("Name", std::mem::size_of::<Name>(), std::mem::align_of::<Name>())
        .with_trait(constructible::with_move::<Name>(constructible::with_copy::<Name>(
            constructible::with_default::<Name>(constructible::constructible_of::<Name>()),
        )))
        .with_trait(
            FieldsTrait::builder()
                .with_field("value", String::reflect(), address_of_value)
                .build(),
        )
        .build()
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::reflection::Reflect;

    #[test]
    fn name_reflects_with_a_single_string_field() {
        let ty = Name::reflect();
        let fields = ty.get::<FieldsTrait>().expect("Name should carry FieldsTrait");
        assert_eq!(fields.iter().count(), 1);
        assert_eq!(fields.field("value").unwrap().name(), "value");
    }
}
