//! Scripted behaviors and their lifecycle hooks
//!
//! A behavior is a component with optional hook methods. The lifecycle is:
//!
//! 1. `awake()` - once, on the first awake pass after the behavior is added
//! 2. `on_enable()` - after awake if enabled, and on every later enable
//! 3. `start()` - once, before the first update, while enabled and active
//! 4. `update()` / `late_update()` / `fixed_update()` - every matching pass
//! 5. `on_disable()` - on every disable after awake
//! 6. `on_destroy()` - once, when an awoken behavior is destroyed
//!
//! # Example
//!
//! ```ignore
//! struct Spin { speed: f32 }
//! impl Component for Spin {}
//!
//! impl Behavior for Spin {
//!     fn update(&mut self, ctx: &mut BehaviorContext) {
//!         let me = ctx.entity();
//!         let angle = self.speed * ctx.delta_time();
//!         ctx.rotate(me, Quat::from_rotation_y(angle), Space::Local).ok();
//!     }
//! }
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

use hecs::Entity;
use smallvec::SmallVec;

use super::components::{BehaviorState, Component, ComponentBody, ComponentId};
use super::error::{EcsError, EcsResult};
use super::world::World;

// ============================================================================
// Behavior Trait
// ============================================================================

/// A component with scripted lifecycle hooks. Every hook defaults to a no-op.
///
/// Hooks receive a [`BehaviorContext`], which dereferences to the
/// [`World`], so they can freely create, mutate and destroy entities.
pub trait Behavior: Component {
    /// Called once, before any `start` of the same batch.
    fn awake(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called when the behavior becomes enabled after awake.
    fn on_enable(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called once before the first update.
    fn start(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called once per frame.
    fn update(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called once per frame after every behavior has updated.
    fn late_update(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called once per fixed step.
    fn fixed_update(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called when the behavior becomes disabled after awake.
    fn on_disable(&mut self, _ctx: &mut BehaviorContext<'_>) {}

    /// Called once when an awoken behavior is destroyed.
    fn on_destroy(&mut self, _ctx: &mut BehaviorContext<'_>) {}
}

// ============================================================================
// Hooks
// ============================================================================

/// Names of the lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    Awake,
    OnEnable,
    Start,
    Update,
    LateUpdate,
    FixedUpdate,
    OnDisable,
    OnDestroy,
}

impl LifecycleHook {
    /// Hook name for logging
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Awake => "Awake",
            Self::OnEnable => "OnEnable",
            Self::Start => "Start",
            Self::Update => "Update",
            Self::LateUpdate => "LateUpdate",
            Self::FixedUpdate => "FixedUpdate",
            Self::OnDisable => "OnDisable",
            Self::OnDestroy => "OnDestroy",
        }
    }

    fn invoke(self, behavior: &mut dyn Behavior, ctx: &mut BehaviorContext<'_>) {
        match self {
            Self::Awake => behavior.awake(ctx),
            Self::OnEnable => behavior.on_enable(ctx),
            Self::Start => behavior.start(ctx),
            Self::Update => behavior.update(ctx),
            Self::LateUpdate => behavior.late_update(ctx),
            Self::FixedUpdate => behavior.fixed_update(ctx),
            Self::OnDisable => behavior.on_disable(ctx),
            Self::OnDestroy => behavior.on_destroy(ctx),
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Context
// ============================================================================

/// World access handed to a running hook.
pub struct BehaviorContext<'w> {
    world: &'w mut World,
    id: ComponentId,
    entity: Entity,
}

impl BehaviorContext<'_> {
    /// Handle of the behavior whose hook is running
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Entity owning the behavior
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Shared world access
    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    /// Exclusive world access
    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Enable or disable the running behavior.
    ///
    /// The matching hook runs as soon as the current hook returns.
    pub fn set_enabled(&mut self, enabled: bool) {
        let id = self.id;
        // The running behavior always exists, so this cannot fail
        let _ = self.world.set_enabled(id, enabled);
    }

    /// Whether the running behavior is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.world.is_enabled(self.id).unwrap_or(false)
    }

    /// Queue the running behavior for destruction at the end of the pass
    pub fn destroy_self(&mut self) {
        let id = self.id;
        self.world.destroy_component(id);
    }
}

impl Deref for BehaviorContext<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for BehaviorContext<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl World {
    /// Set a behavior's enabled flag.
    ///
    /// After awake, a change fires `on_enable` or `on_disable` right away.
    /// Before awake the flag is only recorded.
    pub fn set_enabled(&mut self, id: ComponentId, enabled: bool) -> EcsResult<()> {
        let record = self
            .components
            .get_mut(id)
            .filter(|r| !r.destroyed)
            .ok_or(EcsError::NoSuchComponent(id))?;
        let state = record
            .behavior_state_mut()
            .ok_or(EcsError::NotABehavior(id))?;
        if state.enabled == enabled {
            return Ok(());
        }
        state.enabled = enabled;
        if !state.has_awoken {
            return Ok(());
        }

        let hook = if enabled {
            LifecycleHook::OnEnable
        } else {
            LifecycleHook::OnDisable
        };
        self.dispatch(id, &[hook]);
        Ok(())
    }

    /// A behavior's enabled flag
    pub fn is_enabled(&self, id: ComponentId) -> EcsResult<bool> {
        Ok(self.behavior_state(id)?.enabled)
    }

    /// Enabled flag and lifecycle markers of a behavior
    pub fn behavior_state(&self, id: ComponentId) -> EcsResult<BehaviorState> {
        let record = self
            .components
            .get(id)
            .filter(|r| !r.destroyed)
            .ok_or(EcsError::NoSuchComponent(id))?;
        record
            .behavior_state()
            .copied()
            .ok_or(EcsError::NotABehavior(id))
    }

    /// Run `hooks` on a behavior.
    ///
    /// The instance is checked out of storage while its hooks run. Hooks aimed
    /// at a checked-out behavior (it disabled or destroyed itself) are queued
    /// and replayed by the outer call before the instance is checked back in.
    /// A record marked destroyed is dropped at check-in.
    pub(crate) fn dispatch(&mut self, id: ComponentId, hooks: &[LifecycleHook]) {
        let Some(record) = self.components.get_mut(id) else {
            return;
        };
        let owner = record.owner;
        let type_name = record.type_name;
        let ComponentBody::Behavior {
            instance, deferred, ..
        } = &mut record.body
        else {
            return;
        };
        let Some(mut behavior) = instance.take() else {
            deferred.extend(hooks.iter().copied());
            return;
        };

        let mut queue: SmallVec<[LifecycleHook; 4]> = hooks.iter().copied().collect();
        let mut next = 0;
        loop {
            while let Some(&hook) = queue.get(next) {
                next += 1;
                log::trace!("{hook} -> {type_name} on {owner:?}");
                if let Some(record) = self.components.get_mut(id) {
                    record.set_running_hook(Some(hook));
                }
                let mut ctx = BehaviorContext {
                    world: self,
                    id,
                    entity: owner,
                };
                hook.invoke(behavior.as_mut(), &mut ctx);
                if let Some(record) = self.components.get_mut(id) {
                    record.set_running_hook(None);
                }
            }

            match self.components.get_mut(id).map(|r| &mut r.body) {
                Some(ComponentBody::Behavior { deferred, .. }) if !deferred.is_empty() => {
                    queue.extend(deferred.drain(..));
                }
                _ => break,
            }
        }

        let destroyed = match self.components.get_mut(id) {
            Some(record) if record.destroyed => true,
            Some(record) => {
                if let ComponentBody::Behavior { instance, .. } = &mut record.body {
                    *instance = Some(behavior);
                }
                false
            }
            None => false,
        };
        if destroyed {
            self.components.remove(id);
        }
    }
}
