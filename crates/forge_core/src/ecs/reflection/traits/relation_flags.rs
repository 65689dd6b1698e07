// relation_flags.rs - zero-sized marker traits a relation's reflected `Type`
// carries so code without access to a `World`'s `Types` registry (chiefly
// `Blueprint`, which is authored before any `World` exists) can still tell a
// symmetric or tree relation apart from a plain one.
//
// Grounded on examples/original_source's `SymmetricTrait`/`TreeTrait`
// (`core/src/ecs/blueprint.cpp` checks `relation.type().has<SymmetricTrait>()`
// and `has<TreeTrait>()` directly on the reflected type). `World::Types`
// remains the authoritative source for the scheduler and query planner
// (`RelationFlags`, set explicitly at `register_relation`); these markers are
// the blueprint-local mirror of the same two bits.

/// Marks a relation type as symmetric: `relate(a, b)` and `relate(b, a)`
/// describe the same edge.
#[derive(Copy, Clone, Debug, Default)]
pub struct SymmetricTrait;

/// Marks a relation type as a tree relation: each entity has at most one
/// outgoing edge, and inserting a new one replaces the previous one.
#[derive(Copy, Clone, Debug, Default)]
pub struct TreeTrait;
