// schedule.rs - the dependency-ordered scheduler (spec.md §4.10, C14): a tag
// graph, per-system before/after/tagged relations, run conditions, and a
// deterministic compiled order produced by a topological sort that also
// serializes conflicting systems in insertion order.
//
// The teacher has no scheduler of its own to port (SPEC_FULL.md §C14 notes
// this plainly); `SchedulerError` is written as a `thiserror` enum parallel
// to forge_core's own `_legacy_reference/system_registration_error.rs`, and
// `Scheduler::add_system`'s duplicate-name check mirrors
// `SystemRegistry::register`'s `DuplicateName` guard.

use crate::ecs::command::CommandBuffer;
use crate::ecs::system::{System, SystemContext};
use crate::ecs::world::World;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Errors a `Scheduler` can report. All are fatal at compile (order-
/// materialization) time, per spec.md §7 `SchedulerImpossible` -- none of
/// these are recoverable, callers are expected to `unwrap`/propagate and
/// abort, not retry.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("system '{name}' is already registered in this dispatcher")]
    DuplicateSystem { name: String },

    #[error("tag '{tag}' is referenced by a before/after edge but never declared on any system or via `tag()`")]
    UnknownTag { tag: String },

    #[error("system ordering is impossible: a cycle involves {systems:?}")]
    Cycle { systems: Vec<String> },
}

#[derive(Default)]
struct TagEdges {
    before: HashSet<String>,
    after: HashSet<String>,
}

/// One dispatcher: an ordered, conflict-serialized list of systems. `App`
/// owns two of these -- `startup` (run once) and `main` (run every tick) --
/// per spec.md §4.10.
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<System>,
    known_tags: HashSet<String>,
    tag_edges: HashMap<String, TagEdges>,
    compiled: Option<Vec<usize>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `system`, invalidating any previously compiled order.
    pub fn add_system(&mut self, system: System) -> Result<(), SchedulerError> {
        if self.systems.iter().any(|existing| existing.name() == system.name()) {
            return Err(SchedulerError::DuplicateSystem {
                name: system.name().to_string(),
            });
        }
        for tag in system.tags() {
            self.known_tags.insert(tag.clone());
        }
        self.systems.push(system);
        self.compiled = None;
        Ok(())
    }

    /// Declares a tag-to-tag ordering edge directly, usable even before any
    /// system carries either tag (spec.md §6: `tag(tag).before(other)
    /// .after(other)`).
    pub fn tag(&mut self, name: impl Into<String>) -> TagBuilder<'_> {
        let name = name.into();
        self.known_tags.insert(name.clone());
        self.compiled = None;
        TagBuilder { scheduler: self, name }
    }

    fn validate_tags(&self) -> Result<(), SchedulerError> {
        let mut referenced = BTreeSet::new();
        for system in &self.systems {
            referenced.extend(system.before_tags().iter().cloned());
            referenced.extend(system.after_tags().iter().cloned());
        }
        for edges in self.tag_edges.values() {
            referenced.extend(edges.before.iter().cloned());
            referenced.extend(edges.after.iter().cloned());
        }
        for tag in referenced {
            if !self.known_tags.contains(&tag) {
                return Err(SchedulerError::UnknownTag { tag });
            }
        }
        Ok(())
    }

    fn systems_tagged(&self, tag: &str) -> Vec<usize> {
        self.systems
            .iter()
            .enumerate()
            .filter(|(_, system)| system.tags().iter().any(|t| t == tag))
            .map(|(index, _)| index)
            .collect()
    }

    /// Produces the deterministic run order: a topological sort over
    /// explicit tag/system ordering edges plus access-conflict edges
    /// (serialized in insertion order), per spec.md §4.10. `world` is needed
    /// to resolve every system's pending query terms into `DataTypeId`s
    /// before their access footprints can be compared.
    ///
    /// # Errors
    /// `UnknownTag` if a before/after edge names a tag nothing declares;
    /// `Cycle` if the resulting graph has no topological order.
    pub fn compile(&mut self, world: &mut World) -> Result<(), SchedulerError> {
        self.validate_tags()?;
        for system in &mut self.systems {
            system.resolve(world);
        }

        let n = self.systems.len();
        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut indegree = vec![0usize; n];

        let mut add_edge = |successors: &mut Vec<BTreeSet<usize>>, indegree: &mut Vec<usize>, from: usize, to: usize| {
            if from == to {
                return;
            }
            if successors[from].insert(to) {
                indegree[to] += 1;
            }
        };

        for (i, system) in self.systems.iter().enumerate() {
            for tag in system.before_tags() {
                for j in self.systems_tagged(tag) {
                    add_edge(&mut successors, &mut indegree, i, j);
                }
            }
            for tag in system.after_tags() {
                for j in self.systems_tagged(tag) {
                    add_edge(&mut successors, &mut indegree, j, i);
                }
            }
        }
        for (tag, edges) in &self.tag_edges {
            for other in &edges.before {
                for i in self.systems_tagged(tag) {
                    for j in self.systems_tagged(other) {
                        add_edge(&mut successors, &mut indegree, i, j);
                    }
                }
            }
            for other in &edges.after {
                for i in self.systems_tagged(tag) {
                    for j in self.systems_tagged(other) {
                        add_edge(&mut successors, &mut indegree, j, i);
                    }
                }
            }
        }

        // Conflicting systems with no explicit ordering between them still
        // must not run "simultaneously" under a future parallel scheduler;
        // serialize them in insertion order (spec.md §4.10).
        for i in 0..n {
            for j in (i + 1)..n {
                if self.systems[i].access().conflicts_with(self.systems[j].access()) {
                    add_edge(&mut successors, &mut indegree, i, j);
                }
            }
        }

        // Kahn's algorithm over a `BTreeSet` ready-frontier so ties resolve
        // to the lowest system index -- i.e. insertion order -- whenever no
        // explicit edge forces otherwise (spec.md §8 scenario 6: swapping
        // the declaration order of two systems with an explicit `.after`
        // edge between them must not change the compiled order; only the
        // *absence* of an edge lets insertion order matter).
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &successor in &successors[next] {
                indegree[successor] -= 1;
                if indegree[successor] == 0 {
                    ready.insert(successor);
                }
            }
        }

        if order.len() != n {
            let ordered: HashSet<usize> = order.iter().copied().collect();
            let remaining: Vec<String> = (0..n)
                .filter(|index| !ordered.contains(index))
                .map(|index| self.systems[index].name().to_string())
                .collect();
            return Err(SchedulerError::Cycle { systems: remaining });
        }

        self.compiled = Some(order);
        Ok(())
    }

    /// Runs every system once, in compiled order, committing `commands`
    /// after each one so its side effects are visible to the next system in
    /// line (spec.md §5: "side effects of system i are visible to system
    /// i+1"). Compiles the schedule first if it hasn't been yet or was
    /// invalidated by a subsequent `add_system`/`tag` call.
    pub fn run(&mut self, world: &mut World, commands: &mut CommandBuffer) -> Result<(), SchedulerError> {
        if self.compiled.is_none() {
            self.compile(world)?;
        }
        let order = self.compiled.clone().expect("compiled order just populated above");

        for index in order {
            let should_run = self.systems[index].should_run(world);
            if !should_run {
                continue;
            }
            let terms = self.systems[index].terms().to_vec();
            {
                let mut ctx = SystemContext::new(world, commands, &terms);
                self.systems[index].run(&mut ctx);
            }
            commands.commit(world);
        }
        Ok(())
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The compiled run order, as system names, for diagnostics and tests.
    /// Panics if `compile`/`run` hasn't happened yet.
    pub fn compiled_names(&self) -> Vec<&str> {
        self.compiled
            .as_ref()
            .expect("schedule not compiled yet")
            .iter()
            .map(|&index| self.systems[index].name())
            .collect()
    }
}

/// Returned by `Scheduler::tag`, for chaining tag-to-tag ordering edges:
/// `scheduler.tag("logic").after("input")`.
pub struct TagBuilder<'a> {
    scheduler: &'a mut Scheduler,
    name: String,
}

impl<'a> TagBuilder<'a> {
    pub fn before(self, other: impl Into<String>) -> Self {
        let other = other.into();
        self.scheduler.known_tags.insert(other.clone());
        self.scheduler.tag_edges.entry(self.name.clone()).or_default().before.insert(other);
        self.scheduler.compiled = None;
        self
    }

    pub fn after(self, other: impl Into<String>) -> Self {
        let other = other.into();
        self.scheduler.known_tags.insert(other.clone());
        self.scheduler.tag_edges.entry(self.name.clone()).or_default().after.insert(other);
        self.scheduler.compiled = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::system::system;
    use std::sync::{Arc, Mutex};

    fn record(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl FnMut(&mut crate::ecs::system::SystemContext) + Send {
        move |_ctx| log.lock().unwrap().push(name)
    }

    #[test]
    fn tag_before_after_edges_order_systems() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler
            .add_system(system("s3").after("logic").call(record(log.clone(), "s3")))
            .unwrap();
        scheduler
            .add_system(system("s1").tagged("input").call(record(log.clone(), "s1")))
            .unwrap();
        scheduler
            .add_system(system("s2").tagged("logic").call(record(log.clone(), "s2")))
            .unwrap();
        scheduler.tag("logic").after("input");

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        scheduler.run(&mut world, &mut commands).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn insertion_order_does_not_change_explicit_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        // Declared in the opposite order from the tag dependency below.
        scheduler
            .add_system(system("s2").tagged("logic").after("input").call(record(log.clone(), "s2")))
            .unwrap();
        scheduler
            .add_system(system("s1").tagged("input").call(record(log.clone(), "s1")))
            .unwrap();

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        scheduler.run(&mut world, &mut commands).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["s1", "s2"]);
    }

    #[test]
    fn unknown_tag_reference_is_an_error() {
        let mut scheduler = Scheduler::new();
        scheduler.add_system(system("s1").after("nonexistent").call(|_ctx| {})).unwrap();
        let mut world = World::new();
        let err = scheduler.compile(&mut world).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTag { .. }));
    }

    #[test]
    fn cycle_is_an_error() {
        let mut scheduler = Scheduler::new();
        scheduler
            .add_system(system("a").tagged("a-tag").after("b-tag").call(|_ctx| {}))
            .unwrap();
        scheduler
            .add_system(system("b").tagged("b-tag").after("a-tag").call(|_ctx| {}))
            .unwrap();
        let mut world = World::new();
        let err = scheduler.compile(&mut world).unwrap_err();
        assert!(matches!(err, SchedulerError::Cycle { .. }));
    }

    #[test]
    fn conflicting_systems_serialize_in_insertion_order() {
        use crate::ecs::reflection::Type;

        #[derive(Debug, Default, PartialEq)]
        struct Counter(u32);
        crate::reflect_leaf!(Counter, || {
            Type::builder("schedule::Counter", std::mem::size_of::<Counter>(), std::mem::align_of::<Counter>())
                .with_trait(crate::ecs::reflection::traits::constructible::with_default::<Counter>(
                    crate::ecs::reflection::traits::constructible::constructible_for::<Counter>(),
                ))
                .build()
        });

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler
            .add_system(system("writer-a").with_mut::<Counter>().call(record(log.clone(), "writer-a")))
            .unwrap();
        scheduler
            .add_system(system("writer-b").with_mut::<Counter>().call(record(log.clone(), "writer-b")))
            .unwrap();

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        scheduler.run(&mut world, &mut commands).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["writer-a", "writer-b"]);
    }

    #[test]
    fn condition_false_skips_the_system() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler
            .add_system(system("conditional").run_if(|_world| false).call(record(log.clone(), "conditional")))
            .unwrap();

        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        scheduler.run(&mut world, &mut commands).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }
}
