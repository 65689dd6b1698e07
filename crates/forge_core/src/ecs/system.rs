// system.rs - system signature and fetchers (spec.md §4.9, C13): wires the
// declared access of a system (which query terms, which resources it reads
// and writes) to a `SystemAccess` footprint the scheduler orders by, and
// fetches the concrete values (queries, resources, the command buffer) a
// running system body needs from a `SystemContext`.
//
// `SystemAccess`'s sorted read/write id sets and write/write + write/read
// conflict rule are carried over near-verbatim from forge_core's own
// `_legacy_reference/system_descriptor.rs` and `system_registration_error.rs`
// (`ComponentWriteConflict`), generalized with a resource axis alongside
// components (SPEC_FULL.md §C13). The builder's term methods
// (`with`/`without`/`optional`/`related`) mirror the free-function chain
// spec.md §6 names verbatim: `system(name).tagged(tag).before(tag)
// .after(tag).with<T>().without<T>().related<R>(traversal).call(fn)`.

use crate::ecs::command::CommandBuffer;
use crate::ecs::query::{QueryFilter, QueryTerm, Traversal};
use crate::ecs::reflection::{Reflect, Type};
use crate::ecs::types::DataTypeId;
use crate::ecs::world::World;
use std::any::TypeId as AnyTypeId;
use std::collections::BTreeSet;

/// The access footprint of one system: which resource types and which
/// component/relation types it reads and writes. Two systems *conflict*
/// (spec.md §4.9) when these sets overlap write/read or write/write on the
/// same type.
#[derive(Clone, Debug, Default)]
pub struct SystemAccess {
    resource_reads: BTreeSet<AnyTypeId>,
    resource_writes: BTreeSet<AnyTypeId>,
    component_reads: BTreeSet<DataTypeId>,
    component_writes: BTreeSet<DataTypeId>,
}

impl SystemAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource_read<T: 'static>(&mut self) {
        self.resource_reads.insert(AnyTypeId::of::<T>());
    }

    pub fn add_resource_write<T: 'static>(&mut self) {
        self.resource_writes.insert(AnyTypeId::of::<T>());
    }

    pub fn add_component_read(&mut self, id: DataTypeId) {
        self.component_reads.insert(id);
    }

    pub fn add_component_write(&mut self, id: DataTypeId) {
        self.component_writes.insert(id);
    }

    /// True if this footprint touches nothing at all -- a system with no
    /// declared resource or component access (it may still enqueue commands
    /// or run unconditionally). Such a system never conflicts with anything.
    pub fn is_empty(&self) -> bool {
        self.resource_reads.is_empty()
            && self.resource_writes.is_empty()
            && self.component_reads.is_empty()
            && self.component_writes.is_empty()
    }

    /// True if `self` and `other` have a write/read or write/write overlap
    /// on the same resource or component type (spec.md §4.9).
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        fn overlaps<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> bool {
            a.intersection(b).next().is_some()
        }
        overlaps(&self.resource_writes, &other.resource_writes)
            || overlaps(&self.resource_writes, &other.resource_reads)
            || overlaps(&other.resource_writes, &self.resource_reads)
            || overlaps(&self.component_writes, &other.component_writes)
            || overlaps(&self.component_writes, &other.component_reads)
            || overlaps(&other.component_writes, &self.component_reads)
    }
}

/// A query term declared on a `SystemBuilder` before the component/relation
/// type it names has been assigned a `DataTypeId` -- that assignment needs a
/// `&mut World`, which a builder invoked from a plugin's registration
/// function doesn't yet have (spec.md §6: plugins register against an `App`
/// before the world necessarily exists). Resolved into a `QueryTerm` by
/// `System::resolve`, the first time a `World` is available.
#[derive(Clone, Copy)]
enum PendingTerm {
    With(&'static Type),
    WithMut(&'static Type),
    Without(&'static Type),
    Optional(&'static Type),
    Related(&'static Type, Traversal),
}

/// One registered system: its declared tag relationships, access footprint,
/// pending query terms, optional run condition, and the closure that
/// performs its work. Built via `system(name)...call(fn)`; scheduled by a
/// `Scheduler`.
pub struct System {
    name: String,
    tags: Vec<String>,
    before: Vec<String>,
    after: Vec<String>,
    pending_terms: Vec<PendingTerm>,
    access: SystemAccess,
    terms: Option<Vec<QueryTerm>>,
    condition: Option<Box<dyn FnMut(&mut World) -> bool + Send>>,
    run: Box<dyn FnMut(&mut SystemContext) + Send>,
}

impl System {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn before_tags(&self) -> &[String] {
        &self.before
    }

    pub fn after_tags(&self) -> &[String] {
        &self.after
    }

    pub fn access(&self) -> &SystemAccess {
        &self.access
    }

    /// Resolves every pending query term against `world` (registering
    /// component types as needed) and records the resulting component
    /// read/write access. A no-op on every call after the first: the
    /// scheduler calls this once per dispatcher compile, and `terms` once
    /// populated never needs to change for the lifetime of the `World`
    /// it was resolved against (spec.md invariant 6: a type, once used,
    /// keeps the same `DataTypeId`).
    pub(crate) fn resolve(&mut self, world: &mut World) {
        if self.terms.is_some() {
            return;
        }
        let mut raw = Vec::with_capacity(self.pending_terms.len());
        for pending in &self.pending_terms {
            match *pending {
                PendingTerm::With(ty) => {
                    let id = world.register_component_reflected(ty);
                    self.access.add_component_read(id);
                    raw.push(QueryTerm::with_component(id, -1));
                }
                PendingTerm::WithMut(ty) => {
                    let id = world.register_component_reflected(ty);
                    self.access.add_component_write(id);
                    raw.push(QueryTerm::with_component(id, -1));
                }
                PendingTerm::Without(ty) => {
                    let id = world.register_component_reflected(ty);
                    raw.push(QueryTerm::without_component(id, -1));
                }
                PendingTerm::Optional(ty) => {
                    let id = world.register_component_reflected(ty);
                    self.access.add_component_read(id);
                    raw.push(QueryTerm::optional_component(id, -1));
                }
                PendingTerm::Related(ty, traversal) => {
                    let id = world.relation_id_reflected(ty).unwrap_or_else(|| {
                        panic!(
                            "system '{}' queries relation '{}', which must be registered on the world before the schedule compiles",
                            self.name,
                            ty.name()
                        )
                    });
                    self.access.add_component_read(id);
                    raw.push(QueryTerm::relation(id, -1, -1, traversal));
                }
            }
        }
        self.terms = Some(QueryTerm::resolve(&[], &raw));
    }

    /// The resolved term list. Panics if called before `resolve`; the
    /// scheduler always resolves every system before the first `run`.
    pub(crate) fn terms(&self) -> &[QueryTerm] {
        self.terms.as_deref().unwrap_or_else(|| panic!("system '{}' run before its terms were resolved", self.name))
    }

    /// Evaluates this system's run condition, if any. A system with no
    /// condition always runs (spec.md §4.10).
    pub(crate) fn should_run(&mut self, world: &mut World) -> bool {
        match &mut self.condition {
            Some(condition) => condition(world),
            None => true,
        }
    }

    pub(crate) fn run(&mut self, ctx: &mut SystemContext<'_>) {
        (self.run)(ctx)
    }
}

/// World, command buffer and resolved query terms made available to a
/// running system's body (spec.md's "SystemContext"). Queries are rebuilt
/// fresh from the resolved terms on every call to `query`: matches are
/// collected into an owned `Vec` before the body needs `&mut World` again
/// (e.g. to write a component through `world_mut`), so the borrow never
/// outlives the query call (see query.rs's module doc for the same trade).
pub struct SystemContext<'a> {
    world: &'a mut World,
    commands: &'a mut CommandBuffer,
    terms: &'a [QueryTerm],
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(world: &'a mut World, commands: &'a mut CommandBuffer, terms: &'a [QueryTerm]) -> Self {
        Self { world, commands, terms }
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    pub fn commands(&mut self) -> &mut CommandBuffer {
        self.commands
    }

    /// Builds a `QueryFilter` over this system's resolved terms. Borrows
    /// `world` immutably for as long as the returned filter (and any view
    /// derived from it) lives; callers that also need `world_mut` inside the
    /// same body should materialize matches into a `Vec` first (the pattern
    /// `query.rs`'s own tests use).
    pub fn query(&self) -> QueryFilter<'_> {
        QueryFilter::new(self.world, self.terms.to_vec())
    }

    pub fn read_resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.world.read_resource::<T>()
    }

    pub fn write_resource<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.world.write_resource::<T>()
    }
}

/// Entry point matching spec.md §6's builder chain verbatim:
/// `system(name).tagged(tag).before(tag).after(tag).with<T>()
/// .without<T>().related<R>(traversal).call(fn)`.
pub fn system(name: impl Into<String>) -> SystemBuilder {
    SystemBuilder::new(name)
}

/// Builder for a `System`. Every term/tag/resource method consumes and
/// returns `self` so calls chain, matching the owned-builder idiom the rest
/// of this crate's reflection/blueprint builders already use.
pub struct SystemBuilder {
    name: String,
    tags: Vec<String>,
    before: Vec<String>,
    after: Vec<String>,
    pending_terms: Vec<PendingTerm>,
    access: SystemAccess,
    condition: Option<Box<dyn FnMut(&mut World) -> bool + Send>>,
}

impl SystemBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            pending_terms: Vec::new(),
            access: SystemAccess::new(),
            condition: None,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn before(mut self, tag: impl Into<String>) -> Self {
        self.before.push(tag.into());
        self
    }

    pub fn after(mut self, tag: impl Into<String>) -> Self {
        self.after.push(tag.into());
        self
    }

    /// Declares a read-only `with`-component term on the default target.
    pub fn with<T: Reflect + 'static>(mut self) -> Self {
        self.pending_terms.push(PendingTerm::With(T::reflect()));
        self
    }

    /// Declares a writable `with`-component term. Spec.md §6 only names a
    /// single `.with<T>()`; this is the Rust-idiomatic split needed so the
    /// access footprint can tell read queries apart from write queries for
    /// the future parallel scheduler spec.md §5 describes (documented in
    /// DESIGN.md).
    pub fn with_mut<T: Reflect + 'static>(mut self) -> Self {
        self.pending_terms.push(PendingTerm::WithMut(T::reflect()));
        self
    }

    pub fn without<T: Reflect + 'static>(mut self) -> Self {
        self.pending_terms.push(PendingTerm::Without(T::reflect()));
        self
    }

    pub fn optional<T: Reflect + 'static>(mut self) -> Self {
        self.pending_terms.push(PendingTerm::Optional(T::reflect()));
        self
    }

    pub fn related<R: Reflect + 'static>(mut self, traversal: Traversal) -> Self {
        self.pending_terms.push(PendingTerm::Related(R::reflect(), traversal));
        self
    }

    pub fn reads_resource<T: Send + Sync + 'static>(mut self) -> Self {
        self.access.add_resource_read::<T>();
        self
    }

    pub fn writes_resource<T: Send + Sync + 'static>(mut self) -> Self {
        self.access.add_resource_write::<T>();
        self
    }

    /// Gates this system on `condition`, a no-argument system evaluated
    /// immediately before it every tick; `false` skips the run (spec.md
    /// §4.10).
    pub fn run_if(mut self, condition: impl FnMut(&mut World) -> bool + Send + 'static) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn call(self, run: impl FnMut(&mut SystemContext) + Send + 'static) -> System {
        System {
            name: self.name,
            tags: self.tags,
            before: self.before,
            after: self.after,
            pending_terms: self.pending_terms,
            access: self.access,
            terms: None,
            condition: self.condition,
            run: Box::new(run),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::reflection::Type;

    #[derive(Debug, Default, PartialEq)]
    struct Pos(f32);
    crate::reflect_leaf!(Pos, || {
        Type::builder("system::Pos", std::mem::size_of::<Pos>(), std::mem::align_of::<Pos>())
            .with_trait(crate::ecs::reflection::traits::constructible::with_default::<Pos>(
                crate::ecs::reflection::traits::constructible::constructible_for::<Pos>(),
            ))
            .build()
    });

    #[derive(Debug, Default, PartialEq)]
    struct Vel(f32);
    crate::reflect_leaf!(Vel, || {
        Type::builder("system::Vel", std::mem::size_of::<Vel>(), std::mem::align_of::<Vel>())
            .with_trait(crate::ecs::reflection::traits::constructible::with_default::<Vel>(
                crate::ecs::reflection::traits::constructible::constructible_for::<Vel>(),
            ))
            .build()
    });

    #[test]
    fn resolving_fills_component_access_from_pending_terms() {
        let mut world = World::new();
        let mut sys = system("movement").with::<Pos>().with_mut::<Vel>().call(|_ctx| {});
        sys.resolve(&mut world);

        let pos = world.component_id_of::<Pos>().unwrap();
        let vel = world.component_id_of::<Vel>().unwrap();
        assert!(sys.access().component_reads.contains(&pos));
        assert!(sys.access().component_writes.contains(&vel));
        assert_eq!(sys.terms().len(), 2);
    }

    #[test]
    fn write_write_conflict_is_detected() {
        let mut world = World::new();
        let mut a = system("a").with_mut::<Pos>().call(|_ctx| {});
        let mut b = system("b").with_mut::<Pos>().call(|_ctx| {});
        a.resolve(&mut world);
        b.resolve(&mut world);
        assert!(a.access().conflicts_with(b.access()));
    }

    #[test]
    fn disjoint_reads_do_not_conflict() {
        let mut world = World::new();
        let mut a = system("a").with::<Pos>().call(|_ctx| {});
        let mut b = system("b").with::<Vel>().call(|_ctx| {});
        a.resolve(&mut world);
        b.resolve(&mut world);
        assert!(!a.access().conflicts_with(b.access()));
    }

    #[test]
    fn running_a_system_commits_through_the_context() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let mut sys = system("spawner").call(|ctx| {
            ctx.commands().create().add(Pos(1.0));
        });
        sys.resolve(&mut world);
        let terms = sys.terms().to_vec();
        {
            let mut ctx = SystemContext::new(&mut world, &mut commands, &terms);
            sys.run(&mut ctx);
        }
        commands.commit(&mut world);
        assert_eq!(world.archetypes_with(&[world.component_id_of::<Pos>().unwrap()]).len(), 1);
    }
}
