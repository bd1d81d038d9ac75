//! A scene-graph runtime built in Rust
//!
//! This crate provides:
//! - Entities with attached components and behaviors
//! - A transform hierarchy with lazily cached world matrices
//! - A deterministic lifecycle schedule (awake, start, update, late and
//!   fixed update)
//! - A headless frame driver and a scene registry

pub mod core;
pub mod ecs;

// Re-exports for convenience
pub use glam;
pub use hecs;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{Engine, EngineConfig, SceneHandle, SceneRegistry, Time};
    pub use crate::ecs::{
        Behavior, BehaviorContext, Component, ComponentId, EcsError, EcsResult, Entity,
        LifecycleHook, Space, Transform, World,
    };
    pub use glam::{EulerRot, Mat4, Quat, Vec3};
}
