// world.rs - the top-level ECS state: entities, archetypes, relations,
// resources and the type registry, tied together behind a single typed API.
//
// Mirrors forge_core's own _legacy_reference/world.rs in shape (a `World`
// owning a map of per-archetype storages plus spawn/despawn/get_component),
// generalized to add/remove/relate/unrelate and resources, and supplemented
// with the `components(entity)`/`const_components(entity)` entity-scoped
// views from examples/original_source's `core/src/cubos/core/ecs/world.cpp`
// (SPEC_FULL.md §B.1).

use crate::ecs::archetype::{ArchetypeGraph, ArchetypeId, ArchetypeTable};
use crate::ecs::entity::{Entity, EntityManager};
use crate::ecs::reflection::{ConstructibleTrait, Reflect, Type};
use crate::ecs::relation::{RelationTable, RelationTableKey};
use crate::ecs::types::{DataTypeId, RelationFlags, Types};
use std::any::{Any, TypeId as AnyTypeId};
use std::collections::HashMap;

/// Owns every piece of ECS state for one simulation: which entities exist,
/// which archetype/row each lives at, the archetype graph and tables
/// themselves, sparse relation storage, the type registry, and resources
/// (singleton values keyed by Rust type, outside any entity).
pub struct World {
    entities: EntityManager,
    graph: ArchetypeGraph,
    tables: HashMap<ArchetypeId, ArchetypeTable>,
    relations: HashMap<RelationTableKey, RelationTable>,
    types: Types,
    resources: HashMap<AnyTypeId, Box<dyn Any + Send + Sync>>,
}

impl Default for World {
    fn default() -> Self {
        let mut tables = HashMap::new();
        tables.insert(ArchetypeId::EMPTY, ArchetypeTable::new());
        Self {
            entities: EntityManager::new(),
            graph: ArchetypeGraph::new(),
            tables,
            relations: HashMap::new(),
            types: Types::new(),
            resources: HashMap::new(),
        }
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    fn component_id<T: Reflect>(&mut self) -> DataTypeId {
        let reflected = T::reflect();
        match self.types.id_of(reflected) {
            Some(id) => id,
            None => self.types.register_component(reflected),
        }
    }

    /// Registers `T` as a relation type with the given flags. Must happen
    /// before the first `relate`/`unrelate`/`related` call involving `T`;
    /// calling it again after use panics (spec.md invariant 6).
    pub fn register_relation<T: Reflect>(&mut self, flags: RelationFlags) -> DataTypeId {
        self.types.register_relation(T::reflect(), flags)
    }

    pub fn create(&mut self) -> Entity {
        let entity = self.entities.create();
        let table = self.tables.get_mut(&ArchetypeId::EMPTY).unwrap();
        let row = table.begin_row_insert(entity);
        self.entities.set_location(entity, ArchetypeId::EMPTY, row);
        entity
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn destroy(&mut self, entity: Entity) {
        let Some((archetype, row)) = self.entities.destroy(entity) else {
            return;
        };
        if let Some(table) = self.tables.get_mut(&archetype) {
            if let Some(moved) = table.swap_erase_row(row) {
                self.entities.set_location(moved, archetype, row);
            }
        }
        for key in self.relations.keys().copied().collect::<Vec<_>>() {
            if let Some(table) = self.relations.get_mut(&key) {
                table.erase_all_from(entity);
                table.erase_all_to(entity);
            }
        }
    }

    /// Runs `f` with simultaneous `&mut` access to two distinct archetype
    /// tables, by temporarily removing both from the map. Avoids needing an
    /// unstable "get two mutable entries" HashMap API: `a` and `b` are always
    /// distinct archetypes at every call site (an add/remove always changes
    /// archetype), so this never loses a table. Takes the map directly
    /// (rather than `&mut self`) so callers can still access other `World`
    /// fields -- notably `entities` -- from inside `f`.
    fn with_two_tables<R>(
        tables: &mut HashMap<ArchetypeId, ArchetypeTable>,
        a: ArchetypeId,
        b: ArchetypeId,
        f: impl FnOnce(&mut ArchetypeTable, &mut ArchetypeTable) -> R,
    ) -> R {
        debug_assert_ne!(a, b, "with_two_tables: archetypes must differ");
        let mut table_a = tables.remove(&a).unwrap_or_default();
        let mut table_b = tables.remove(&b).unwrap_or_default();
        let result = f(&mut table_a, &mut table_b);
        tables.insert(a, table_a);
        tables.insert(b, table_b);
        result
    }

    /// Transitions `entity` from its current archetype to `to_archetype`,
    /// relocating every surviving component column and either constructing
    /// `added` (if adding a component) or destructing `dropped`'s old value
    /// (if removing one) -- exactly one of the two is ever set.
    fn transition(
        &mut self,
        entity: Entity,
        to_archetype: ArchetypeId,
        added: Option<(DataTypeId, ConstructibleTrait, *mut u8)>,
        dropped: Option<DataTypeId>,
    ) {
        let (from_archetype, row) = self.entities.location_of(entity).expect("transition: entity not placed");
        let kept: Vec<DataTypeId> = self
            .graph
            .components_of(from_archetype)
            .iter()
            .copied()
            .filter(|c| Some(*c) != dropped)
            .collect();

        let entities = &mut self.entities;
        let to_row = Self::with_two_tables(&mut self.tables, from_archetype, to_archetype, |from_table, to_table| {
            let to_row = to_table.begin_row_insert(entity);
            for component in &kept {
                let Some(src) = from_table.column_mut(*component) else { continue };
                let constructible = *src.constructible();
                let dst = to_table.ensure_column(*component, constructible);
                unsafe {
                    src.relocate_row(row, dst);
                }
            }
            if let Some(component) = dropped {
                if let Some(src) = from_table.column_mut(component) {
                    src.swap_erase(row);
                }
            }
            if let Some((component, constructible, ptr)) = added {
                let dst = to_table.ensure_column(component, constructible);
                unsafe {
                    dst.push_move(ptr);
                }
            }
            if let Some(moved) = from_table.finish_row_removal(row) {
                entities.set_location(moved, from_archetype, row);
            }
            to_row
        });

        self.entities.set_location(entity, to_archetype, to_row);
    }

    /// Adds (or overwrites, if already present) component `T` on `entity`.
    /// Thin generic wrapper over `add_erased` -- spec.md §9's design note
    /// ("generic wrappers are added only at the public API for ergonomics").
    pub fn add<T: Reflect + 'static>(&mut self, entity: Entity, value: T) {
        let component = self.component_id::<T>();
        let constructible = T::reflect()
            .get::<ConstructibleTrait>()
            .copied()
            .expect("component type has no Constructible trait");
        let mut value = value;
        unsafe {
            self.add_erased(entity, component, constructible, &mut value as *mut T as *mut u8);
        }
        std::mem::forget(value);
    }

    /// Erased core of `add`: moves the `size()`-byte value at `value` into
    /// `entity`'s component of type `component`, transitioning archetypes if
    /// the entity didn't already carry it. Used directly by commands and
    /// blueprint instantiation, which only have a `DataTypeId` and a raw
    /// pointer, never a static `T`.
    ///
    /// # Safety
    /// `value` must point to an initialized value whose layout matches
    /// `constructible`; ownership moves into the world.
    pub unsafe fn add_erased(&mut self, entity: Entity, component: DataTypeId, constructible: ConstructibleTrait, value: *mut u8) {
        assert!(self.is_alive(entity), "add: entity is not alive");
        self.types.mark_used(component);
        let (from_archetype, row) = self.entities.location_of(entity).unwrap();

        if self.graph.contains(from_archetype, component) {
            let table = self.tables.get_mut(&from_archetype).unwrap();
            let col = table.column_mut(component).expect("column missing for contained component");
            let ptr = col.get_mut(row);
            col.constructible().destruct(ptr);
            col.constructible().move_construct(ptr, value);
            return;
        }

        let to_archetype = self.graph.with_added(from_archetype, component);
        self.transition(entity, to_archetype, Some((component, constructible, value)), None);
    }

    /// Removes component `T` from `entity`, if present.
    pub fn remove<T: Reflect + 'static>(&mut self, entity: Entity) {
        let Some(component) = self.types.id_of(T::reflect()) else { return };
        self.remove_erased(entity, component);
    }

    /// Erased core of `remove`.
    pub fn remove_erased(&mut self, entity: Entity, component: DataTypeId) {
        assert!(self.is_alive(entity), "remove: entity is not alive");
        let (from_archetype, _) = self.entities.location_of(entity).unwrap();
        if !self.graph.contains(from_archetype, component) {
            return;
        }
        let to_archetype = self.graph.with_removed(from_archetype, component);
        self.transition(entity, to_archetype, None, Some(component));
    }

    pub fn has<T: Reflect>(&self, entity: Entity) -> bool {
        let Some(component) = self.types.id_of(T::reflect()) else { return false };
        self.entities
            .location_of(entity)
            .is_some_and(|(archetype, _)| self.graph.contains(archetype, component))
    }

    pub fn get<T: Reflect + 'static>(&self, entity: Entity) -> Option<&T> {
        let component = self.types.id_of(T::reflect())?;
        let (archetype, row) = self.entities.location_of(entity)?;
        let table = self.tables.get(&archetype)?;
        let column = table.column(component)?;
        unsafe { Some(&*(column.get(row) as *const T)) }
    }

    pub fn get_mut<T: Reflect + 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let component = self.types.id_of(T::reflect())?;
        let (archetype, row) = self.entities.location_of(entity)?;
        let table = self.tables.get_mut(&archetype)?;
        let column = table.column_mut(component)?;
        unsafe { Some(&mut *(column.get_mut(row) as *mut T)) }
    }

    /// Canonicalizes `(from, to)` for a symmetric relation (lower entity
    /// index first) before it's used either as a `RelationTable` lookup key
    /// or to pick which `(fromArchetype, toArchetype)` table the pair lives
    /// in. Must happen *before* `relation_key`: the table is keyed by
    /// archetype pair, and `relate(a, b)` / `relate(b, a)` need to land in
    /// the same table for `RelationTable::insert`'s own canonicalization to
    /// ever see both calls. Doing the entity-order swap only inside
    /// `RelationTable` (as it must, for `contains`/`erase` symmetry) but not
    /// here would let the two calls pick two different archetype-pair
    /// tables whenever `archetype_of(a) != archetype_of(b)`, silently
    /// duplicating the edge instead of overwriting it (spec.md invariant 3).
    fn canonicalize_pair(&self, symmetric: bool, from: Entity, to: Entity) -> (Entity, Entity) {
        if symmetric && to.index() < from.index() {
            (to, from)
        } else {
            (from, to)
        }
    }

    fn relation_key(&self, relation: DataTypeId, from: Entity, to: Entity) -> RelationTableKey {
        let from_archetype = self.entities.archetype_of(from).unwrap_or(ArchetypeId::EMPTY);
        let to_archetype = self.entities.archetype_of(to).unwrap_or(ArchetypeId::EMPTY);
        (relation, from_archetype, to_archetype, 0)
    }

    pub fn relate<R: Reflect + 'static>(&mut self, from: Entity, to: Entity, value: R) {
        let relation = self
            .types
            .id_of(R::reflect())
            .unwrap_or_else(|| panic!("relation type '{}' used before registration", R::reflect().name()));
        let constructible = R::reflect()
            .get::<ConstructibleTrait>()
            .copied()
            .expect("relation type has no Constructible trait");
        let mut value = value;
        unsafe {
            self.relate_erased(from, to, relation, constructible, &mut value as *mut R as *mut u8);
        }
        std::mem::forget(value);
    }

    /// Erased core of `relate`, used by blueprint instantiation and deferred
    /// commands, which only carry a `DataTypeId` and a raw pointer.
    ///
    /// # Safety
    /// `value` must point to an initialized value whose layout matches
    /// `constructible` and the relation type identified by `relation`.
    pub unsafe fn relate_erased(&mut self, from: Entity, to: Entity, relation: DataTypeId, constructible: ConstructibleTrait, value: *mut u8) {
        assert!(self.is_alive(from) && self.is_alive(to), "relate: endpoint not alive");
        self.types.mark_used(relation);
        let flags = self.types.relation_flags(relation);
        let (from, to) = self.canonicalize_pair(flags.symmetric, from, to);
        let key = self.relation_key(relation, from, to);
        let table = self
            .relations
            .entry(key)
            .or_insert_with(|| RelationTable::new(constructible, flags.symmetric, flags.tree));
        table.insert(from, to, value);
    }

    pub fn unrelate<R: Reflect>(&mut self, from: Entity, to: Entity) -> bool {
        let Some(relation) = self.types.id_of(R::reflect()) else { return false };
        self.unrelate_erased(from, to, relation)
    }

    /// Erased core of `unrelate`.
    pub fn unrelate_erased(&mut self, from: Entity, to: Entity, relation: DataTypeId) -> bool {
        let flags = self.types.relation_flags(relation);
        let (from, to) = self.canonicalize_pair(flags.symmetric, from, to);
        let key = self.relation_key(relation, from, to);
        self.relations.get_mut(&key).is_some_and(|table| table.erase(from, to))
    }

    pub fn related<R: Reflect + 'static>(&self, from: Entity, to: Entity) -> Option<&R> {
        let relation = self.types.id_of(R::reflect())?;
        let flags = self.types.relation_flags(relation);
        let (from, to) = self.canonicalize_pair(flags.symmetric, from, to);
        let key = self.relation_key(relation, from, to);
        let table = self.relations.get(&key)?;
        table.get(from, to).map(|ptr| unsafe { &*(ptr as *const R) })
    }

    /// Relation table keys currently in use, for the query planner's link
    /// resolution (spec.md §4.6): given a relation type and the sets of
    /// candidate from/to archetypes, find which `(fromArch, toArch)` tables
    /// actually exist.
    pub(crate) fn relation_table_keys(&self) -> impl Iterator<Item = &RelationTableKey> {
        self.relations.keys()
    }

    pub(crate) fn relation_table(&self, key: &RelationTableKey) -> Option<&RelationTable> {
        self.relations.get(key)
    }

    pub(crate) fn types(&self) -> &Types {
        &self.types
    }

    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    /// Registers `T` as a component type without requiring a value, for
    /// callers (the query planner, blueprints) that need a `DataTypeId`
    /// before any entity carries the component.
    pub fn register_component<T: Reflect>(&mut self) -> DataTypeId {
        let reflected = T::reflect();
        match self.types.id_of(reflected) {
            Some(id) => id,
            None => self.types.register_component(reflected),
        }
    }

    pub fn component_id_of<T: Reflect>(&self) -> Option<DataTypeId> {
        self.types.id_of(T::reflect())
    }

    /// Type-erased counterpart of `component_id_of`, for callers (the
    /// command buffer) that only carry a `&'static Type`.
    pub fn component_id_of_reflected(&self, reflected: &'static Type) -> Option<DataTypeId> {
        self.types.id_of(reflected)
    }

    pub fn add_resource<T: Send + Sync + 'static>(&mut self, value: T) {
        self.resources.insert(AnyTypeId::of::<T>(), Box::new(value));
    }

    pub fn remove_resource<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.resources
            .remove(&AnyTypeId::of::<T>())
            .map(|boxed| *boxed.downcast::<T>().expect("resource type mismatch"))
    }

    pub fn read_resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.get(&AnyTypeId::of::<T>()).and_then(|boxed| boxed.downcast_ref::<T>())
    }

    pub fn write_resource<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut(&AnyTypeId::of::<T>()).and_then(|boxed| boxed.downcast_mut::<T>())
    }

    pub fn archetypes_with(&self, required: &[DataTypeId]) -> Vec<ArchetypeId> {
        self.graph.matching(required)
    }

    pub fn table(&self, archetype: ArchetypeId) -> Option<&ArchetypeTable> {
        self.tables.get(&archetype)
    }

    /// The supplemented `Components` view from
    /// examples/original_source's `core/src/cubos/core/ecs/world.cpp`:
    /// every `(Type, raw pointer)` pair this entity currently carries,
    /// without the caller needing to already know which component types to
    /// ask for. Used by inspector/debugger tooling (spec.md §6).
    pub fn components(&self, entity: Entity) -> Vec<(&'static Type, *const u8)> {
        let Some((archetype, row)) = self.entities.location_of(entity) else {
            return Vec::new();
        };
        let table = self.tables.get(&archetype).unwrap();
        self.graph
            .components_of(archetype)
            .iter()
            .filter_map(|&component| {
                table
                    .column(component)
                    .map(|col| (self.types.reflected(component), unsafe { col.get(row) }))
            })
            .collect()
    }

    /// Type-erased component registration, for callers (`Blueprint`
    /// instantiation) that only have a `&'static Type`, not a static
    /// `T: Reflect`.
    pub fn register_component_reflected(&mut self, reflected: &'static Type) -> DataTypeId {
        match self.types.id_of(reflected) {
            Some(id) => id,
            None => self.types.register_component(reflected),
        }
    }

    /// Looks up a relation type's `DataTypeId`, requiring it to already be
    /// registered. Blueprint instantiation cannot auto-register relations the
    /// way it does components, since `RelationFlags` (tree/symmetric) must be
    /// supplied by `register_relation` and aren't recoverable from the
    /// reflected `Type` alone (see the `SymmetricTrait`/`TreeTrait` markers
    /// Blueprint itself uses for its own bookkeeping).
    pub fn relation_id_reflected(&self, reflected: &'static Type) -> Option<DataTypeId> {
        self.types.id_of(reflected)
    }

    /// Looks up a registered type by name, for tooling that only has a type
    /// name string (spec.md §6; SPEC_FULL.md §B.2).
    pub fn type_by_name(&self, name: &str) -> Option<&'static Type> {
        self.types.id_by_name(name).map(|id| self.types.reflected(id))
    }

    /// The registered name of a `DataTypeId`, the reverse of `type_by_name`.
    pub fn name_of(&self, id: DataTypeId) -> &str {
        self.types.name_of(id)
    }
}

impl crate::ecs::blueprint::InstantiateSink for World {
    fn create(&mut self, _name: &str) -> Entity {
        self.create()
    }

    unsafe fn add(&mut self, entity: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8) {
        let component = self.register_component_reflected(type_);
        self.add_erased(entity, component, constructible, value);
    }

    unsafe fn relate(&mut self, from: Entity, to: Entity, type_: &'static Type, constructible: ConstructibleTrait, value: *mut u8) {
        let relation = self.relation_id_reflected(type_).unwrap_or_else(|| {
            panic!(
                "relation type '{}' referenced by a blueprint must be registered on the world before instantiation",
                type_.name()
            )
        });
        self.relate_erased(from, to, relation, constructible, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    crate::reflect_leaf!(Position, || {
        Type::builder("Position", std::mem::size_of::<Position>(), std::mem::align_of::<Position>())
            .with_trait(crate::ecs::reflection::traits::constructible::with_default::<Position>(
                crate::ecs::reflection::traits::constructible::constructible_for::<Position>(),
            ))
            .build()
    });

    #[derive(Debug, Default, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    crate::reflect_leaf!(Velocity, || {
        Type::builder("Velocity", std::mem::size_of::<Velocity>(), std::mem::align_of::<Velocity>())
            .with_trait(crate::ecs::reflection::traits::constructible::with_default::<Velocity>(
                crate::ecs::reflection::traits::constructible::constructible_for::<Velocity>(),
            ))
            .build()
    });

    #[test]
    fn spawn_add_remove_round_trip() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position { x: 1.0, y: 2.0 });
        assert!(world.has::<Position>(e));
        assert_eq!(world.get::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));

        world.add(e, Velocity { dx: 0.5, dy: 0.0 });
        assert!(world.has::<Position>(e));
        assert!(world.has::<Velocity>(e));
        assert_eq!(world.get::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));

        world.remove::<Position>(e);
        assert!(!world.has::<Position>(e));
        assert!(world.has::<Velocity>(e));
    }

    #[test]
    fn destroy_frees_the_slot() {
        let mut world = World::new();
        let e = world.create();
        world.add(e, Position::default());
        world.destroy(e);
        assert!(!world.is_alive(e));
    }

    #[test]
    fn relations_store_and_erase() {
        let mut world = World::new();
        #[derive(Debug, Default, PartialEq)]
        struct ChildOf;
        crate::reflect_leaf!(ChildOf, || {
            Type::builder("ChildOf", 0, 1)
                .with_trait(crate::ecs::reflection::traits::constructible::constructible_for::<ChildOf>())
                .build()
        });

        let parent = world.create();
        let child = world.create();
        world.register_relation::<ChildOf>(RelationFlags { tree: true, ..Default::default() });
        world.relate(child, parent, ChildOf);
        assert!(world.related::<ChildOf>(child, parent).is_some());
        assert!(world.unrelate::<ChildOf>(child, parent));
        assert!(world.related::<ChildOf>(child, parent).is_none());
    }
}
