//! Application driver (spec.md §4.10/§6, C15): resource lifecycle, plugin
//! registration, and the main loop.
//!
//! Generalizes `forge_runtime/src/main.rs`'s boot sequence (logging init,
//! a startup banner, a platform-services init call) into a reusable `App`
//! that owns a `World`, a startup dispatcher and a main dispatcher, the
//! `DeltaTime`/`ShouldQuit`/`Arguments` resources spec.md §5/§6 name, and a
//! plugin list that is idempotent per function pointer (spec.md §6:
//! "`App::plugin(fn)` is idempotent").

use crate::ecs::command::CommandBuffer;
use crate::ecs::schedule::{Scheduler, SchedulerError, TagBuilder};
use crate::ecs::system::System;
use crate::ecs::world::World;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

/// Wall-clock time elapsed since the previous tick, in seconds. Updated by
/// `App::run`/`App::update` right after the main dispatcher runs (spec.md
/// §4.10: "write elapsed to the `DeltaTime` resource").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaTime(pub f32);

/// Set from inside a system (through `ctx.world_mut()`) to end the main loop
/// after the current tick finishes. In-flight commands from that tick are
/// still applied (spec.md §5 "Cancellation").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShouldQuit(pub bool);

/// The process's command-line arguments, verbatim. No flags are interpreted
/// by the core (spec.md §6 "CLI surface").
#[derive(Debug, Clone, Default)]
pub struct Arguments(pub Vec<String>);

/// A plugin registers systems and resources with an `App`. Spec.md §6:
/// "a function `void plugin(App&)`".
pub type Plugin = fn(&mut App);

/// Owns the `World` and the two dispatchers (startup, run once; main, run
/// every tick) that make up one running simulation (spec.md §4.10/§4.15).
pub struct App {
    world: World,
    commands: CommandBuffer,
    startup: Scheduler,
    main: Scheduler,
    plugins: HashSet<usize>,
    started: bool,
}

impl Default for App {
    fn default() -> Self {
        let mut world = World::new();
        world.add_resource(DeltaTime(0.0));
        world.add_resource(ShouldQuit::default());
        world.add_resource(Arguments(std::env::args().collect()));
        Self {
            world,
            commands: CommandBuffer::new(),
            startup: Scheduler::new(),
            main: Scheduler::new(),
            plugins: HashSet::new(),
            started: false,
        }
    }
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Registers `plugin_fn`, running it immediately. Calling it again with
    /// the *same* function pointer is a no-op (spec.md §6); a different
    /// function with the same name is a distinct plugin and always runs.
    pub fn plugin(&mut self, plugin_fn: Plugin) -> &mut Self {
        if self.plugins.insert(plugin_fn as usize) {
            plugin_fn(self);
        } else {
            debug!("plugin already registered, skipping re-registration");
        }
        self
    }

    /// Adds `system` to the startup dispatcher (run once, before the first
    /// main tick).
    ///
    /// # Panics
    /// If a system with the same name is already registered in this
    /// dispatcher (spec.md §7 `SchedulerImpossible`, fatal at compile time --
    /// surfaced early here since duplicate names are knowable at
    /// registration, not only at compile).
    pub fn add_startup_system(&mut self, system: System) -> &mut Self {
        self.startup.add_system(system).unwrap_or_else(|err| panic!("{err}"));
        self
    }

    /// Adds `system` to the main dispatcher (run once per tick).
    pub fn add_system(&mut self, system: System) -> &mut Self {
        self.main.add_system(system).unwrap_or_else(|err| panic!("{err}"));
        self
    }

    pub fn startup_tag(&mut self, name: impl Into<String>) -> TagBuilder<'_> {
        self.startup.tag(name)
    }

    pub fn tag(&mut self, name: impl Into<String>) -> TagBuilder<'_> {
        self.main.tag(name)
    }

    /// Compiles both dispatchers without running them, surfacing any
    /// `SchedulerError` (missing tag, cycle) before the loop starts instead
    /// of on the first tick.
    pub fn compile(&mut self) -> Result<(), SchedulerError> {
        self.startup.compile(&mut self.world)?;
        self.main.compile(&mut self.world)
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.startup
                .run(&mut self.world, &mut self.commands)
                .unwrap_or_else(|err| panic!("{err}"));
            self.started = true;
        }
    }

    /// Runs exactly one tick of the main dispatcher, running the startup
    /// dispatcher first if this is the first call. Used by tests and by
    /// embedders (editor, headless harness) that own their own loop instead
    /// of calling `run`.
    pub fn update(&mut self) {
        self.ensure_started();
        self.main.run(&mut self.world, &mut self.commands).unwrap_or_else(|err| panic!("{err}"));
    }

    /// Runs startup once, then loops the main dispatcher until
    /// `ShouldQuit.0` becomes `true` (spec.md §4.10: "run startup once, then
    /// loops: sample `now()`, run main, write elapsed to `DeltaTime`, exit
    /// when `ShouldQuit.value` is true").
    pub fn run(&mut self) {
        self.ensure_started();
        info!("entering main loop");
        let mut last_tick = Instant::now();
        loop {
            self.main.run(&mut self.world, &mut self.commands).unwrap_or_else(|err| panic!("{err}"));

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;
            if let Some(dt) = self.world.write_resource::<DeltaTime>() {
                dt.0 = elapsed;
            }

            let should_quit = self.world.read_resource::<ShouldQuit>().is_some_and(|quit| quit.0);
            if should_quit {
                info!("ShouldQuit set, exiting main loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::system::system;

    #[test]
    fn plugin_registration_is_idempotent_per_function_pointer() {
        struct Calls(u32);

        fn count_plugin(app: &mut App) {
            match app.world.write_resource::<Calls>() {
                Some(calls) => calls.0 += 1,
                None => app.world.add_resource(Calls(1)),
            }
        }

        let mut app = App::new();
        app.plugin(count_plugin);
        app.plugin(count_plugin);
        app.plugin(count_plugin);

        // A second or third registration of the same function pointer must
        // not re-run it, so the counter stays at its first-run value of 1
        // instead of climbing to 3.
        assert_eq!(app.world().read_resource::<Calls>().unwrap().0, 1);
    }

    #[test]
    fn update_runs_startup_once_then_main_every_call() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut app = App::new();
        {
            let log = log.clone();
            app.add_startup_system(system("boot").call(move |_ctx| log.lock().unwrap().push("startup")));
        }
        {
            let log = log.clone();
            app.add_system(system("tick").call(move |_ctx| log.lock().unwrap().push("main")));
        }

        app.update();
        app.update();

        assert_eq!(*log.lock().unwrap(), vec!["startup", "main", "main"]);
    }

    #[test]
    fn should_quit_ends_the_run_loop() {
        let mut app = App::new();
        app.add_system(system("quit-immediately").call(|ctx| {
            if let Some(quit) = ctx.world_mut().write_resource::<ShouldQuit>() {
                quit.0 = true;
            }
        }));
        app.run();
        assert!(app.world().read_resource::<ShouldQuit>().unwrap().0);
    }
}
