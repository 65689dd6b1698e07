// fields.rs - ordered named-field descriptions for reflected struct types.
//
// Grounded on examples/original_source's FieldsTrait (withField chain,
// AddressOf getter) translated to an owned builder and a plain fn pointer
// instead of a virtual `AddressOf` interface.

use super::super::type_::Type;

/// `(instance_ptr) -> field_ptr`. Both pointers refer to the same allocation;
/// the field pointer must stay within `[instance, instance + size)`.
pub type AddressOf = unsafe fn(instance: *mut u8) -> *mut u8;

pub struct Field {
    name: String,
    ty: &'static Type,
    address_of: AddressOf,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &'static Type {
        self.ty
    }

    /// # Safety
    /// `instance` must point to a live value of the owning type.
    pub unsafe fn address_of(&self, instance: *mut u8) -> *mut u8 {
        (self.address_of)(instance)
    }
}

pub struct FieldsTrait {
    fields: Vec<Field>,
}

impl FieldsTrait {
    pub fn builder() -> FieldsTraitBuilder {
        FieldsTraitBuilder { fields: Vec::new() }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}

pub struct FieldsTraitBuilder {
    fields: Vec<Field>,
}

impl FieldsTraitBuilder {
    pub fn with_field(mut self, name: impl Into<String>, ty: &'static Type, address_of: AddressOf) -> Self {
        let name = name.into();
        assert!(
            !self.fields.iter().any(|f| f.name == name),
            "duplicate field name '{name}'"
        );
        self.fields.push(Field {
            name,
            ty,
            address_of,
        });
        self
    }

    pub fn build(self) -> FieldsTrait {
        FieldsTrait { fields: self.fields }
    }
}
