//! Entity Component System module
//!
//! Built on top of the hecs ECS library. hecs stores the per-entity records
//! (metadata, transform, component list); attached components and behaviors
//! live in a slot map keyed by [`ComponentId`].

mod behavior;
mod cached;
mod components;
mod error;
mod hierarchy;
mod scheduler;
mod world;

pub use behavior::{Behavior, BehaviorContext, LifecycleHook};
pub use cached::Transform;
pub use components::{
    AsAny, BehaviorState, Component, ComponentId, ComponentList, EntityInfo, UNTAGGED,
};
pub use error::{EcsError, EcsResult};
pub use hecs::Entity;
pub use hierarchy::Space;
pub use scheduler::LifecycleScheduler;
pub use world::World;
