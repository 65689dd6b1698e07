// Reflection traits attachable to a `Type` via `TypeBuilder::with_trait`.
//
// Each submodule is independent: a `Type` can carry any combination of these
// (e.g. a `Vec<Transform>` field carries both `Array` and nothing else; an
// `Entity` field carries `Nullable`; a settings struct carries `Fields`).

pub mod array;
pub mod constructible;
pub mod dictionary;
pub mod enum_trait;
pub mod fields;
pub mod mask;
pub mod nullable;
pub mod relation_flags;
pub mod string_conversion;

pub use array::ArrayTrait;
pub use constructible::ConstructibleTrait;
pub use dictionary::DictionaryTrait;
pub use enum_trait::EnumTrait;
pub use fields::FieldsTrait;
pub use mask::MaskTrait;
pub use nullable::NullableTrait;
pub use relation_flags::{SymmetricTrait, TreeTrait};
pub use string_conversion::StringConversionTrait;
