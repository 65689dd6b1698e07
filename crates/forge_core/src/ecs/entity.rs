// entity.rs - entity identity and the archive that tracks which archetype
// row each live entity currently occupies.
//
// Grounded on forge_core's own _legacy_reference/entity.rs for the overall
// shape (generational index, dense reuse), corrected against the bug in that
// file (an `Entity` that embedded its own archetype/row, which goes stale the
// instant the entity moves archetypes on add/remove). Here `Entity` is a
// pure identity; the archetype/row it currently lives at is looked up
// through `EntityManager`, following spec.md's EntityArchive design.

use std::fmt;

/// Lightweight, `Copy` entity handle. Identity is `(index, generation)`;
/// a stale handle (slot reused since this handle was issued) is detectably
/// dead via `EntityManager::is_alive`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

/// High bit of `Entity::index` marking a placeholder allocated by a
/// `CommandBuffer` rather than a real `World` entity. Never collides with a
/// real index: `EntityManager` hands out dense indices from zero and would
/// need to outlive 2^31 live slots to reach it.
pub(crate) const RESERVED_BIT: u32 = 1 << 31;

impl Entity {
    /// The null entity: never returned by `EntityManager::create`, always
    /// dead. Used as the default/sentinel value for optional entity fields
    /// (see the `Nullable` reflection trait).
    pub const NULL: Entity = Entity {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// A placeholder entity standing in for the `n`th id a `CommandBuffer`
    /// has reserved, not yet resolved to a real `World` entity.
    pub(crate) fn reserved(index: u32) -> Entity {
        assert!(index & RESERVED_BIT == 0, "command buffer reserved more entities than fit");
        Entity {
            index: index | RESERVED_BIT,
            generation: 0,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !self.is_null() && self.index & RESERVED_BIT != 0
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}#{})", self.index, self.generation)
        }
    }
}

crate::reflect_leaf!(Entity, || {
    use crate::ecs::reflection::traits::{constructible, nullable};
    use crate::ecs::reflection::Type;

    unsafe fn is_null(instance: *const u8) -> bool {
        (*(instance as *const Entity)).is_null()
    }
    unsafe fn set_to_null(instance: *mut u8) {
        *(instance as *mut Entity) = Entity::NULL;
    }

    Type::builder("Entity", std::mem::size_of::<Entity>(), std::mem::align_of::<Entity>())
        .with_trait(constructible::with_move::<Entity>(constructible::with_copy::<Entity>(
            constructible::with_default::<Entity>(constructible::constructible_of::<Entity>()),
        )))
        .with_trait(nullable::NullableTrait::new(is_null, set_to_null))
        .build()
});

struct Slot {
    generation: u32,
    archetype: Option<crate::ecs::archetype::ArchetypeId>,
    row: usize,
}

/// Owns the dense slot table backing every live `Entity`: generation (to
/// detect stale handles), and which archetype/row it currently lives at.
/// `World` is the only code that should call the mutating methods; query and
/// command-buffer code only ever reads through `is_alive`/`location_of`.
#[derive(Default)]
pub struct EntityManager {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh entity with no archetype (not yet placed into any
    /// archetype table). Reuses a freed slot's index when one is available,
    /// bumping its generation.
    pub fn create(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            Entity {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                archetype: None,
                row: 0,
            });
            Entity { index, generation: 0 }
        }
    }

    /// Reserves an entity id without placing it anywhere, for the command
    /// buffer's "allocate ids up front, resolve later" protocol (spec.md's
    /// deferred command buffer, C12). Identical to `create`; kept as a
    /// separate name so call sites read intent-first.
    pub fn reserve(&mut self) -> Entity {
        self.create()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.generation == entity.generation)
    }

    /// Marks `entity`'s slot free, bumping its generation so existing handles
    /// become detectably stale. Returns the archetype/row it occupied, if
    /// any, so the caller (`World::destroy`) can remove it from that table.
    pub fn destroy(&mut self, entity: Entity) -> Option<(crate::ecs::archetype::ArchetypeId, usize)> {
        assert!(self.is_alive(entity), "destroy called on a dead entity");
        let slot = &mut self.slots[entity.index as usize];
        let location = slot.archetype.map(|archetype| (archetype, slot.row));
        slot.generation = slot.generation.wrapping_add(1);
        slot.archetype = None;
        slot.row = 0;
        self.free.push(entity.index);
        location
    }

    pub fn location_of(&self, entity: Entity) -> Option<(crate::ecs::archetype::ArchetypeId, usize)> {
        if !self.is_alive(entity) {
            return None;
        }
        let slot = &self.slots[entity.index as usize];
        slot.archetype.map(|archetype| (archetype, slot.row))
    }

    pub fn archetype_of(&self, entity: Entity) -> Option<crate::ecs::archetype::ArchetypeId> {
        self.location_of(entity).map(|(archetype, _)| archetype)
    }

    /// Records that `entity` now lives at `row` in `archetype`. Called by
    /// `World` after every spawn/add/remove/move-between-archetypes.
    pub fn set_location(&mut self, entity: Entity, archetype: crate::ecs::archetype::ArchetypeId, row: usize) {
        assert!(self.is_alive(entity), "set_location called on a dead entity");
        let slot = &mut self.slots[entity.index as usize];
        slot.archetype = Some(archetype);
        slot.row = row;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slot_bumps_generation() {
        let mut manager = EntityManager::new();
        let e0 = manager.create();
        assert!(manager.is_alive(e0));
        manager.destroy(e0);
        assert!(!manager.is_alive(e0));

        let e1 = manager.create();
        assert_eq!(e1.index(), e0.index());
        assert_ne!(e1.generation(), e0.generation());
        assert!(manager.is_alive(e1));
        assert!(!manager.is_alive(e0));
    }

    #[test]
    fn null_entity_is_never_alive() {
        let manager = EntityManager::new();
        assert!(!manager.is_alive(Entity::NULL));
    }

    #[test]
    fn reserved_entities_are_distinct_from_real_ones() {
        let reserved = Entity::reserved(0);
        assert!(reserved.is_reserved());
        assert!(!Entity::NULL.is_reserved());

        let mut manager = EntityManager::new();
        let real = manager.create();
        assert!(!real.is_reserved());
        assert_ne!(real, reserved);
    }
}
