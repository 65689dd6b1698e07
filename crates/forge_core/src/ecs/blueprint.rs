// blueprint.rs - collections of entities plus their components/relations
// that can be instantiated into a `World` any number of times: the engine's
// "prefab". Ported from examples/original_source's `Blueprint`
// (`core/include/cubos/core/ecs/blueprint.hpp`, `core/src/ecs/blueprint.cpp`):
// a bimap of local entity identity to name, a type-keyed map of
// entity->component value, and a type-keyed map of from->to->relation value.
// See SPEC_FULL.md §C9 and §B.3/§B.4/§B.5.

use crate::ecs::entity::{Entity, EntityManager};
use crate::ecs::name::Name;
use crate::ecs::reflection::traits::{ArrayTrait, DictionaryTrait, FieldsTrait, SymmetricTrait, TreeTrait};
use crate::ecs::reflection::{ConstructibleTrait, Reflect, Type};
use crate::ecs::value::Value;
use std::collections::HashMap;

/// A target `Blueprint::instantiate_into` spawns entities and applies
/// components/relations to. `World` is the only production implementation;
/// `Blueprint::merge` uses a private in-memory one so merging reuses exactly
/// the same rewriting logic as instantiation (SPEC_FULL.md §B.3).
pub trait InstantiateSink {
    fn create(&mut self, name: &str) -> Entity;

    /// # Safety
    /// `value` points to an initialized, `constructible.size()`-byte value of
    /// `type_`; ownership moves into the sink.
    unsafe fn add(&mut self, entity: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8);

    /// # Safety
    /// Same as `add`, for a relation between two already-created entities.
    unsafe fn relate(&mut self, from: Entity, to: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8);
}

/// A collection of entities and their components/relations that can be
/// instantiated into a `World`, as many times as needed. See spec.md §4.8.
#[derive(Default)]
pub struct Blueprint {
    entities: EntityManager,
    names: HashMap<Entity, String>,
    by_name: HashMap<String, Entity>,
    components: HashMap<*const Type, HashMap<Entity, Value>>,
    relations: HashMap<*const Type, HashMap<Entity, HashMap<Entity, Value>>>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity names may only contain lowercase alphanumerics and hyphens
    /// (spec.md §4.8, SPEC_FULL.md §B.4).
    pub fn valid_entity_name(name: &str) -> bool {
        name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    /// Creates a new entity in the blueprint, named `name`. Panics if the
    /// name is invalid or already used on this blueprint -- the original
    /// engine rejects duplicate names at `create()` time, not only at merge
    /// time (SPEC_FULL.md §B.4).
    pub fn create(&mut self, name: impl Into<String>) -> Entity {
        let name = name.into();
        assert!(
            Self::valid_entity_name(&name),
            "blueprint entity name '{name}' is invalid: only lowercase letters, digits and hyphens are allowed"
        );
        assert!(
            !self.by_name.contains_key(&name),
            "an entity named '{name}' already exists on this blueprint"
        );
        let entity = self.entities.create();
        self.by_name.insert(name.clone(), entity);
        self.names.insert(entity, name);
        entity
    }

    /// Adds (overwriting any existing) component to `entity`.
    pub fn add<T: Reflect + 'static>(&mut self, entity: Entity, value: T) {
        assert!(self.entities.is_alive(entity), "entity wasn't created with this blueprint");
        let type_ = T::reflect();
        let constructible = type_
            .get::<ConstructibleTrait>()
            .copied()
            .expect("component type has no Constructible trait");
        assert!(
            constructible.has_copy_construct(),
            "blueprint components must be copy-constructible, but '{}' isn't",
            type_.name()
        );
        let mut value = value;
        let stored = unsafe { Value::from_owned(type_, constructible, &mut value as *mut T as *mut u8) };
        std::mem::forget(value);
        self.components.entry(type_ as *const Type).or_default().insert(entity, stored);
    }

    /// Adds (overwriting any existing) relation between `from` and `to`.
    /// Symmetric relations are canonicalized by entity index, and a tree
    /// relation's previous outgoing edge from `from` is erased first --
    /// mirrors `RelationTable::insert`'s rules, applied here purely off the
    /// relation type's `SymmetricTrait`/`TreeTrait` markers since a blueprint
    /// has no `World`/`Types` registry of its own to consult.
    pub fn relate<R: Reflect + 'static>(&mut self, mut from: Entity, mut to: Entity, value: R) {
        assert!(
            self.entities.is_alive(from) && self.entities.is_alive(to),
            "entity wasn't created with this blueprint"
        );
        let type_ = R::reflect();
        let constructible = type_
            .get::<ConstructibleTrait>()
            .copied()
            .expect("relation type has no Constructible trait");
        assert!(
            constructible.has_copy_construct(),
            "blueprint relations must be copy-constructible, but '{}' isn't",
            type_.name()
        );

        if type_.has::<SymmetricTrait>() && to.index() < from.index() {
            std::mem::swap(&mut from, &mut to);
        }

        let mut value = value;
        let stored = unsafe { Value::from_owned(type_, constructible, &mut value as *mut R as *mut u8) };
        std::mem::forget(value);

        let outgoing = self.relations.entry(type_ as *const Type).or_default();
        if type_.has::<TreeTrait>() {
            outgoing.remove(&from);
        }
        outgoing.entry(from).or_default().insert(to, stored);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Iterates this blueprint's entities and their names.
    pub fn entities(&self) -> impl Iterator<Item = (Entity, &str)> {
        self.names.iter().map(|(&entity, name)| (entity, name.as_str()))
    }

    /// Merges `other` into `self`, prefixing every entity name from `other`
    /// with `"{prefix}."`. Implemented in terms of `instantiate_into` so the
    /// two can never drift apart (SPEC_FULL.md §B.3).
    pub fn merge(&mut self, prefix: &str, other: &Blueprint) {
        struct MergeSink<'a> {
            target: &'a mut Blueprint,
            prefix: String,
        }

        impl InstantiateSink for MergeSink<'_> {
            fn create(&mut self, name: &str) -> Entity {
                // Prefixed names (e.g. "child.root") contain '.', which
                // `valid_entity_name` rejects -- going through
                // `Blueprint::create` would panic on every merge. cubos's own
                // merge callback (`Blueprint::merge` in the original engine)
                // inserts the prefixed name straight into the bimap,
                // deliberately bypassing that check; mirrored here, keeping
                // only the duplicate-name guard.
                let prefixed = format!("{}.{}", self.prefix, name);
                assert!(
                    !self.target.by_name.contains_key(&prefixed),
                    "an entity named '{prefixed}' already exists on this blueprint"
                );
                let entity = self.target.entities.create();
                self.target.by_name.insert(prefixed.clone(), entity);
                self.target.names.insert(entity, prefixed);
                entity
            }

            unsafe fn add(&mut self, entity: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8) {
                let stored = unsafe { Value::from_owned(type_, constructible, value) };
                self.target.components.entry(type_ as *const Type).or_default().insert(entity, stored);
            }

            unsafe fn relate(&mut self, from: Entity, to: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8) {
                let stored = unsafe { Value::from_owned(type_, constructible, value) };
                let outgoing = self.target.relations.entry(type_ as *const Type).or_default();
                if type_.has::<TreeTrait>() {
                    outgoing.remove(&from);
                }
                outgoing.entry(from).or_default().insert(to, stored);
            }
        }

        let mut sink = MergeSink {
            target: self,
            prefix: prefix.to_string(),
        };
        other.instantiate_into(&mut sink, false);
    }

    /// Instantiates this blueprint into `sink`: creates one entity per
    /// blueprint entity, then copies every component/relation across,
    /// rewriting any `Entity` values nested inside them (via Fields/Array/
    /// Dictionary reflection traits) to point at the newly spawned entities
    /// instead of the blueprint-local ones. Returns the blueprint-local ->
    /// spawned translation map. Ported from `convertToInstancedEntities` +
    /// `Blueprint::instantiate` in examples/original_source.
    pub fn instantiate_into(&self, sink: &mut dyn InstantiateSink, with_name: bool) -> HashMap<Entity, Entity> {
        let mut translate = HashMap::with_capacity(self.names.len());
        for (&entity, name) in &self.names {
            let spawned = sink.create(name);
            translate.insert(entity, spawned);

            if with_name {
                let mut name_component = Name(name.clone());
                let type_ = Name::reflect();
                let constructible = type_.get::<ConstructibleTrait>().copied().unwrap();
                unsafe {
                    sink.add(spawned, type_, constructible, &mut name_component as *mut Name as *mut u8);
                }
                std::mem::forget(name_component);
            }
        }

        for per_entity in self.components.values() {
            for (&entity, value) in per_entity {
                let mut copy = value.copied();
                rewrite_entities(copy.type_, copy.as_mut_ptr(), &translate);
                let spawned = translate[&entity];
                unsafe {
                    sink.add(spawned, copy.type_, copy.constructible, copy.as_mut_ptr());
                }
                copy.into_moved();
            }
        }

        for outgoing in self.relations.values() {
            for (&from, targets) in outgoing {
                for (&to, value) in targets {
                    let mut copy = value.copied();
                    rewrite_entities(copy.type_, copy.as_mut_ptr(), &translate);
                    let (from_spawned, to_spawned) = (translate[&from], translate[&to]);
                    unsafe {
                        sink.relate(from_spawned, to_spawned, copy.type_, copy.constructible, copy.as_mut_ptr());
                    }
                    copy.into_moved();
                }
            }
        }

        translate
    }
}

/// Recursively walks `value` (of reflected type `type_`) rewriting any
/// `Entity` found inside -- directly, through `Fields`, through `Array`
/// elements -- from a blueprint-local id to its instantiated counterpart in
/// `map`. A null entity is left alone; a non-null entity missing from `map`
/// is a fatal usage error (it must reference another entity on the same
/// blueprint). Dictionary-keyed-by-`Entity` is rejected outright, matching
/// `convertToInstancedEntities`; dictionary values are not currently
/// descended into since `DictionaryTrait` only exposes const iteration
/// (no mutable per-entry pointer), a documented simplification (DESIGN.md).
fn rewrite_entities(type_: &'static Type, value: *mut u8, map: &HashMap<Entity, Entity>) {
    if type_.is(Entity::reflect()) {
        unsafe {
            let entity_ptr = value as *mut Entity;
            let entity = *entity_ptr;
            if !entity.is_null() {
                let mapped = map.get(&entity).unwrap_or_else(|| {
                    panic!("entities stored in components/relations must either be null or reference valid entities on their blueprint")
                });
                *entity_ptr = *mapped;
            }
        }
        return;
    }

    if let Some(dict) = type_.get::<DictionaryTrait>() {
        assert!(
            !dict.key_type().is(Entity::reflect()),
            "dictionaries using entities as keys are not supported on blueprint components"
        );
        return;
    }

    if let Some(array) = type_.get::<ArrayTrait>() {
        let len = unsafe { array.length(value) };
        for i in 0..len {
            let element = unsafe { array.get_mut(value, i) };
            rewrite_entities(array.element_type(), element, map);
        }
        return;
    }

    if let Some(fields) = type_.get::<FieldsTrait>() {
        for field in fields.iter() {
            let field_ptr = unsafe { field.address_of(value) };
            rewrite_entities(field.ty(), field_ptr, map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::reflection::Type;
    use crate::ecs::world::World;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Marker;
    crate::reflect_leaf!(Marker, || {
        Type::builder("Marker", 0, 1)
            .with_trait(crate::ecs::reflection::traits::constructible::with_copy::<Marker>(
                crate::ecs::reflection::traits::constructible::with_default::<Marker>(
                    crate::ecs::reflection::traits::constructible::constructible_of::<Marker>(),
                ),
            ))
            .build()
    });

    #[derive(Clone, Debug, Default, PartialEq)]
    struct LinkTo {
        target: Entity,
    }
    crate::reflect_leaf!(LinkTo, || {
        unsafe fn address_of_target(instance: *mut u8) -> *mut u8 {
            &mut (*(instance as *mut LinkTo)).target as *mut Entity as *mut u8
        }
        Type::builder("LinkTo", std::mem::size_of::<LinkTo>(), std::mem::align_of::<LinkTo>())
            .with_trait(crate::ecs::reflection::traits::constructible::with_copy::<LinkTo>(
                crate::ecs::reflection::traits::constructible::with_default::<LinkTo>(
                    crate::ecs::reflection::traits::constructible::constructible_of::<LinkTo>(),
                ),
            ))
            .with_trait(
                FieldsTrait::builder()
                    .with_field("target", Entity::reflect(), address_of_target)
                    .build(),
            )
            .build()
    });

    #[test]
    fn rejects_invalid_or_duplicate_names() {
        let mut blueprint = Blueprint::new();
        blueprint.create("root");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut blueprint = Blueprint::new();
            blueprint.create("Not Valid");
        }));
        assert!(result.is_err());
    }

    #[test]
    fn instantiate_spawns_entities_and_copies_components() {
        let mut blueprint = Blueprint::new();
        let root = blueprint.create("root");
        blueprint.add(root, Marker);

        let mut world = World::new();
        let translate = blueprint.instantiate_into(&mut world, true);
        let spawned = translate[&root];
        assert!(world.is_alive(spawned));
        assert!(world.has::<Marker>(spawned));
        assert_eq!(world.get::<Name>(spawned).unwrap().0, "root");
    }

    #[test]
    fn instantiate_rewrites_entity_references() {
        let mut blueprint = Blueprint::new();
        let a = blueprint.create("a");
        let b = blueprint.create("b");
        blueprint.add(a, LinkTo { target: b });

        let mut world = World::new();
        let translate = blueprint.instantiate_into(&mut world, false);
        let spawned_a = translate[&a];
        let spawned_b = translate[&b];
        assert_eq!(world.get::<LinkTo>(spawned_a).unwrap().target, spawned_b);
    }

    #[test]
    fn merge_prefixes_names_and_preserves_components() {
        let mut other = Blueprint::new();
        let root = other.create("root");
        other.add(root, Marker);

        let mut blueprint = Blueprint::new();
        blueprint.merge("child", &other);

        assert!(blueprint.entities().any(|(_, name)| name == "child.root"));
    }
}
