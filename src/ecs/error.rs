//! Error taxonomy for the entity runtime
//!
//! Only precondition violations are errors. Lookups that may legitimately
//! find nothing return `Option`, and repeated teardown calls are no-ops.

use hecs::Entity;
use thiserror::Error;

use super::components::ComponentId;

/// Misuse of the entity/component API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EcsError {
    /// The entity handle is stale or was never created by this world.
    #[error("entity {0:?} does not exist")]
    NoSuchEntity(Entity),

    /// The component handle is stale or was never created by this world.
    #[error("component {0:?} does not exist")]
    NoSuchComponent(ComponentId),

    /// A behavior-only operation was applied to a plain data component.
    #[error("component {0:?} is not a behavior")]
    NotABehavior(ComponentId),

    /// `child(index)` was called with an index past the end of the child list.
    #[error("child index {index} out of range (transform has {count} children)")]
    ChildIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of children the transform actually has
        count: usize,
    },

    /// Linking would make a transform its own ancestor.
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle {
        /// Transform being reparented
        child: Entity,
        /// Requested new parent
        parent: Entity,
    },
}

/// Result alias for entity runtime operations.
pub type EcsResult<T> = Result<T, EcsError>;
