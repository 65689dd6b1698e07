// types.rs - the registry of data types known to a World: components,
// relations and resources, each wrapping a reflected `Type` plus the flags
// that change how the rest of the ECS treats it (tree/symmetric relations,
// ephemeral relations that don't persist across a frame boundary).
//
// Grounded on spec.md §4.2's DataTypeId/Types description and, for the
// "registration after first use panics" invariant, forge_core's own
// SystemRegistrationError::DuplicateName style of hard-failing on misuse
// rather than silently accepting it.

use crate::ecs::reflection::Type;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataTypeId(u32);

impl DataTypeId {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Component,
    Relation,
    Resource,
}

/// Flags that only apply to relation types; meaningless (left at their
/// defaults) for components and resources.
#[derive(Copy, Clone, Debug, Default)]
pub struct RelationFlags {
    /// A tree relation: each entity may have at most one outgoing edge, and
    /// adding a new one replaces (erases) the previous edge. Spec.md §4.3.
    pub tree: bool,
    /// A symmetric relation: `relate(a, r, b)` is equivalent to
    /// `relate(b, r, a)`; the sparse table canonicalizes by archetype index
    /// to store it once. Spec.md §4.3.
    pub symmetric: bool,
    /// An ephemeral relation: cleared at the end of every frame by the
    /// scheduler's sync point, rather than persisting indefinitely.
    pub ephemeral: bool,
}

struct TypeEntry {
    kind: TypeKind,
    reflected: &'static Type,
    relation_flags: RelationFlags,
}

/// Registers and looks up every component/relation/resource type a `World`
/// knows about. Registration is append-only: once a `World` has used a type
/// (spawned an entity with it, related through it, read/written it as a
/// resource) registering it again with different flags is a programmer
/// error and panics, per spec.md invariant 6.
#[derive(Default)]
pub struct Types {
    entries: Vec<TypeEntry>,
    by_type: HashMap<*const Type, DataTypeId>,
    by_name: HashMap<String, DataTypeId>,
    used: Vec<bool>,
}

// `Type` values are `'static` singletons created once by `Reflect::reflect`
// and never moved or mutated after construction, so a raw-pointer key is a
// stable, cheap identity -- mirrors `Type::is`'s own pointer-equality rule.
unsafe impl Send for Types {}
unsafe impl Sync for Types {}

impl Types {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, reflected: &'static Type, kind: TypeKind, relation_flags: RelationFlags) -> DataTypeId {
        let key = reflected as *const Type;
        if let Some(&id) = self.by_type.get(&key) {
            let entry = &self.entries[id.index()];
            assert_eq!(entry.kind, kind, "type '{}' re-registered with a different kind", reflected.name());
            assert!(
                !self.used[id.index()],
                "type '{}' registered again after it was already used",
                reflected.name()
            );
            return id;
        }
        let id = DataTypeId::from_index(self.entries.len());
        self.entries.push(TypeEntry {
            kind,
            reflected,
            relation_flags,
        });
        self.used.push(false);
        self.by_type.insert(key, id);
        self.by_name.insert(reflected.name().to_string(), id);
        id
    }

    pub fn register_component(&mut self, reflected: &'static Type) -> DataTypeId {
        self.register(reflected, TypeKind::Component, RelationFlags::default())
    }

    pub fn register_relation(&mut self, reflected: &'static Type, flags: RelationFlags) -> DataTypeId {
        assert!(
            !(flags.tree && flags.symmetric),
            "relation '{}' cannot be both tree and symmetric",
            reflected.name()
        );
        self.register(reflected, TypeKind::Relation, flags)
    }

    pub fn register_resource(&mut self, reflected: &'static Type) -> DataTypeId {
        self.register(reflected, TypeKind::Resource, RelationFlags::default())
    }

    /// Marks a type as used, locking its registration. `World` calls this
    /// the first time a type participates in a spawn/add/relate/resource op.
    pub fn mark_used(&mut self, id: DataTypeId) {
        self.used[id.index()] = true;
    }

    pub fn kind(&self, id: DataTypeId) -> TypeKind {
        self.entries[id.index()].kind
    }

    pub fn reflected(&self, id: DataTypeId) -> &'static Type {
        self.entries[id.index()].reflected
    }

    pub fn relation_flags(&self, id: DataTypeId) -> RelationFlags {
        self.entries[id.index()].relation_flags
    }

    pub fn id_of(&self, reflected: &'static Type) -> Option<DataTypeId> {
        self.by_type.get(&(reflected as *const Type)).copied()
    }

    /// Reverse lookup from a registered type's name to its `DataTypeId`.
    /// Supplemented from `examples/original_source`'s
    /// `Registry::name`/`Registry::type` (SPEC_FULL.md §B.2); used by
    /// external tooling (inspector, debugger) that only has a type name
    /// string, e.g. typed in a console.
    pub fn id_by_name(&self, name: &str) -> Option<DataTypeId> {
        self.by_name.get(name).copied()
    }

    /// The registered name of `id`'s reflected type -- the other direction
    /// of the same reverse lookup.
    pub fn name_of(&self, id: DataTypeId) -> &str {
        self.entries[id.index()].reflected.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::reflection::Reflect;

    #[test]
    fn registering_same_type_twice_returns_same_id() {
        let mut types = Types::new();
        let a = types.register_component(u32::reflect());
        let b = types.register_component(u32::reflect());
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "registered again after it was already used")]
    fn reregistering_after_use_panics() {
        let mut types = Types::new();
        let id = types.register_component(u32::reflect());
        types.mark_used(id);
        types.register_component(u32::reflect());
    }
}
