//! Entity Component System
//!
//! Archetype-based storage, sparse relation tables, a reflection registry for
//! component/resource introspection, a query planner, deferred command
//! buffers, blueprint instantiation, and a dependency-ordered scheduler.

pub mod archetype;
pub mod blueprint;
pub mod column;
pub mod command;
pub mod entity;
pub mod name;
pub mod query;
pub mod reflection;
pub mod relation;
pub mod schedule;
pub mod system;
pub mod types;
mod value;
pub mod world;

pub use command::CommandBuffer;
pub use entity::Entity;
pub use name::Name;
pub use query::{QueryFilter, QueryTerm, Traversal};
pub use reflection::{Reflect, Type};
pub use schedule::{Scheduler, SchedulerError};
pub use system::{system, System, SystemAccess, SystemBuilder, SystemContext};
pub use types::DataTypeId;
pub use world::World;
