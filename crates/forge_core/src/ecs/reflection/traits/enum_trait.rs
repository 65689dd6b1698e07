// enum_trait.rs - reflection trait for C-like enums: a fixed, named list of
// variants plus function pointers to test/set the active one. Named
// `enum_trait` rather than `enum` because the latter is a reserved word.
//
// Grounded on examples/original_source's EnumTrait, which models variants as
// a linked list of `Variant` nodes; kept here as a `Vec` since Rust has no
// equivalent reason to avoid a growable container at registration time.

pub type EnumVariantTest = unsafe fn(instance: *const u8) -> usize;
pub type EnumVariantSet = unsafe fn(instance: *mut u8, variant_index: usize);

pub struct EnumVariant {
    name: String,
    index: usize,
}

impl EnumVariant {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

pub struct EnumTrait {
    variants: Vec<EnumVariant>,
    test: EnumVariantTest,
    set: EnumVariantSet,
}

impl EnumTrait {
    pub fn builder(test: EnumVariantTest, set: EnumVariantSet) -> EnumTraitBuilder {
        EnumTraitBuilder {
            variants: Vec::new(),
            test,
            set,
        }
    }

    pub fn variants(&self) -> &[EnumVariant] {
        &self.variants
    }

    pub fn variant(&self, name: &str) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// # Safety
    /// `instance` must point to a live value of the reflected enum type.
    pub unsafe fn active_variant(&self, instance: *const u8) -> &EnumVariant {
        let idx = (self.test)(instance);
        self.variants
            .iter()
            .find(|v| v.index == idx)
            .expect("active variant index not found in reflected variant list")
    }

    /// # Safety
    /// `instance` must be a live value of the reflected enum type.
    ///
    /// # Panics
    /// Panics if `name` does not name one of the registered variants.
    pub unsafe fn set_variant(&self, instance: *mut u8, name: &str) {
        let variant = self
            .variant(name)
            .unwrap_or_else(|| panic!("unknown enum variant '{name}'"));
        (self.set)(instance, variant.index);
    }
}

pub struct EnumTraitBuilder {
    variants: Vec<EnumVariant>,
    test: EnumVariantTest,
    set: EnumVariantSet,
}

impl EnumTraitBuilder {
    pub fn with_variant(mut self, name: impl Into<String>, index: usize) -> Self {
        let name = name.into();
        assert!(
            !self.variants.iter().any(|v| v.name == name),
            "duplicate enum variant name '{name}'"
        );
        self.variants.push(EnumVariant { name, index });
        self
    }

    pub fn build(self) -> EnumTrait {
        assert!(!self.variants.is_empty(), "enum trait needs at least one variant");
        EnumTrait {
            variants: self.variants,
            test: self.test,
            set: self.set,
        }
    }
}
