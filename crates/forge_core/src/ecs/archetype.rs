// archetype.rs - the archetype graph (which sets of components exist, and
// the memoized add/remove edges between them) and the archetype table
// (the actual column storage for one archetype's entities).
//
// Grounded on forge_core's own _legacy_reference/archetype.rs for the overall
// "archetype = a set of component ids" concept, deliberately NOT reusing its
// hashing scheme: that file computes `ArchetypeId` as a `DefaultHasher` of the
// sorted component-id list, which collides silently on hash collision and
// gives no stable small-integer handle for indexing a `Vec`. Here
// `ArchetypeId` is the index of a node in `ArchetypeGraph`, and a `HashMap`
// keyed by the sorted component list is used only to *find* an existing node
// during `with_added`/`with_removed` -- mirroring how `forge_core`'s
// `SystemRegistry` uses a `HashMap` purely for lookup, never as identity.

use crate::ecs::column::Column;
use crate::ecs::entity::Entity;
use crate::ecs::reflection::ConstructibleTrait;
use crate::ecs::types::DataTypeId;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype of an entity with no components.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

struct ArchetypeNode {
    components: Vec<DataTypeId>,
    add_edges: HashMap<DataTypeId, ArchetypeId>,
    remove_edges: HashMap<DataTypeId, ArchetypeId>,
}

/// Tracks every distinct set of components seen so far and the edges between
/// them (`with_added(id, C)` / `with_removed(id, C)`), memoized so repeatedly
/// adding/removing the same component from the same starting archetype is
/// O(1) after the first time.
pub struct ArchetypeGraph {
    nodes: Vec<ArchetypeNode>,
    by_components: HashMap<Vec<DataTypeId>, ArchetypeId>,
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        let empty = ArchetypeNode {
            components: Vec::new(),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        };
        let mut by_components = HashMap::new();
        by_components.insert(Vec::new(), ArchetypeId::EMPTY);
        Self {
            nodes: vec![empty],
            by_components,
        }
    }
}

impl ArchetypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn components_of(&self, id: ArchetypeId) -> &[DataTypeId] {
        &self.nodes[id.index()].components
    }

    pub fn contains(&self, id: ArchetypeId, component: DataTypeId) -> bool {
        self.nodes[id.index()].components.binary_search(&component).is_ok()
    }

    fn find_or_insert(&mut self, components: Vec<DataTypeId>) -> ArchetypeId {
        if let Some(&id) = self.by_components.get(&components) {
            return id;
        }
        let id = ArchetypeId::from_index(self.nodes.len());
        self.by_components.insert(components.clone(), id);
        self.nodes.push(ArchetypeNode {
            components,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        });
        id
    }

    /// Returns the archetype reached by adding `component` to `from`, which
    /// must not already contain it.
    pub fn with_added(&mut self, from: ArchetypeId, component: DataTypeId) -> ArchetypeId {
        if let Some(&to) = self.nodes[from.index()].add_edges.get(&component) {
            return to;
        }
        let mut components = self.nodes[from.index()].components.clone();
        debug_assert!(components.binary_search(&component).is_err());
        let insert_at = components.binary_search(&component).unwrap_err();
        components.insert(insert_at, component);

        let to = self.find_or_insert(components);
        self.nodes[from.index()].add_edges.insert(component, to);
        self.nodes[to.index()].remove_edges.insert(component, from);
        to
    }

    /// Returns the archetype reached by removing `component` from `from`,
    /// which must contain it.
    pub fn with_removed(&mut self, from: ArchetypeId, component: DataTypeId) -> ArchetypeId {
        if let Some(&to) = self.nodes[from.index()].remove_edges.get(&component) {
            return to;
        }
        let mut components = self.nodes[from.index()].components.clone();
        let at = components
            .binary_search(&component)
            .expect("with_removed: component not present in archetype");
        components.remove(at);

        let to = self.find_or_insert(components);
        self.nodes[from.index()].remove_edges.insert(component, to);
        self.nodes[to.index()].add_edges.insert(component, from);
        to
    }

    /// Archetypes whose component set is a superset of `required` (used by
    /// the query planner to build its base archetype set, and incrementally
    /// as new archetypes are discovered -- spec.md §4.6).
    pub fn matching(&self, required: &[DataTypeId]) -> Vec<ArchetypeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| required.iter().all(|c| node.components.binary_search(c).is_ok()))
            .map(|(index, _)| ArchetypeId::from_index(index))
            .collect()
    }

    pub fn archetype_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Column storage for every entity currently in one archetype. Each row
/// index is shared across `entities` and every component `Column`.
pub struct ArchetypeTable {
    entities: Vec<Entity>,
    columns: HashMap<DataTypeId, Column>,
}

impl ArchetypeTable {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            columns: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_at(&self, row: usize) -> Entity {
        self.entities[row]
    }

    pub fn has_column(&self, component: DataTypeId) -> bool {
        self.columns.contains_key(&component)
    }

    /// Returns the column for `component`, creating an empty one keyed by
    /// `constructible` if it doesn't exist yet. Used while building up a
    /// freshly-reached archetype table row by row.
    pub fn ensure_column(&mut self, component: DataTypeId, constructible: ConstructibleTrait) -> &mut Column {
        self.columns.entry(component).or_insert_with(|| Column::new(constructible))
    }

    pub fn column(&self, component: DataTypeId) -> Option<&Column> {
        self.columns.get(&component)
    }

    pub fn column_mut(&mut self, component: DataTypeId) -> Option<&mut Column> {
        self.columns.get_mut(&component)
    }

    /// Appends a new, otherwise-empty row for `entity` to the entity list.
    /// Used both for brand-new entities with no components yet (the empty
    /// archetype) and as the first step of an archetype transition, before
    /// per-column data is relocated/constructed into place.
    pub fn begin_row_insert(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Removes row `row` from the entity list only (columns must already
    /// have had their value at `row` relocated or destructed by the caller,
    /// in lockstep with this removal, since every column shares row indices
    /// with `entities`). Returns the entity that used to occupy the last
    /// slot, now living at `row`, if this wasn't already the last row.
    pub fn finish_row_removal(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        if row == last {
            None
        } else {
            Some(self.entities[row])
        }
    }

    /// Removes row `row`, destructing every column's value there and
    /// swap-filling the hole from the last row. Returns the entity that used
    /// to be the last row (now living at `row`), if any, so the caller can
    /// update its `EntityManager` location.
    pub fn swap_erase_row(&mut self, row: usize) -> Option<Entity> {
        for column in self.columns.values_mut() {
            column.swap_erase(row);
        }
        self.finish_row_removal(row)
    }
}

impl Default for ArchetypeTable {
    fn default() -> Self {
        Self::new()
    }
}
