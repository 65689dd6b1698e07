// type_.rs - runtime type descriptors for the reflection registry
//
// A `Type` is an immutable, process-wide singleton. Identity is by pointer:
// two `&'static Type` references describe the same reflected type iff they
// point at the same allocation. Traits (Fields, Array, Constructible, ...)
// are attached once, at construction, through `TypeBuilder`.

use std::any::{Any, TypeId as AnyTypeId};
use std::collections::HashMap;
use std::fmt;

/// Immutable descriptor for a reflected type.
///
/// `name` is free-form (may include template/generic arguments); `short_name`
/// is `name` with any `<...>` suffix stripped.
pub struct Type {
    name: String,
    short_name: String,
    size: usize,
    align: usize,
    traits: HashMap<AnyTypeId, Box<dyn Any + Send + Sync>>,
}

impl Type {
    pub fn builder(name: impl Into<String>, size: usize, align: usize) -> TypeBuilder {
        TypeBuilder {
            name: name.into(),
            size,
            align,
            traits: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.traits.contains_key(&AnyTypeId::of::<T>())
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.traits
            .get(&AnyTypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Compares by pointer identity, as spec.md requires ("Type identity is by pointer").
    pub fn is(&self, other: &Type) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}
impl Eq for Type {}

/// Strips a `<...>` template-argument suffix from a type name.
fn strip_template_args(name: &str) -> String {
    match name.find('<') {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

pub struct TypeBuilder {
    name: String,
    size: usize,
    align: usize,
    traits: HashMap<AnyTypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeBuilder {
    /// Attaches a trait to the type under construction.
    ///
    /// # Panics
    /// Panics if a trait of the same Rust type has already been attached --
    /// spec.md §4.1 requires this to be fatal ("attaching the same trait
    /// twice is fatal").
    pub fn with_trait<T: Any + Send + Sync>(mut self, trait_value: T) -> Self {
        let key = AnyTypeId::of::<T>();
        assert!(
            !self.traits.contains_key(&key),
            "trait already attached to type '{}'",
            self.name
        );
        self.traits.insert(key, Box::new(trait_value));
        self
    }

    pub fn build(self) -> Type {
        let short_name = strip_template_args(&self.name);
        Type {
            name: self.name,
            short_name,
            size: self.size,
            align: self.align,
            traits: self.traits,
        }
    }
}
