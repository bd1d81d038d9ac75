//! Component capability and per-entity records
//!
//! Every entity carries an [`EntityInfo`], a [`Transform`](super::Transform)
//! and a [`ComponentList`] inside the hecs world. User components are boxed
//! and stored in a slot map owned by the [`World`](super::World); the
//! per-entity list keeps their insertion order.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};

use hecs::Entity;
use smallvec::SmallVec;
use uuid::Uuid;

use super::behavior::{Behavior, LifecycleHook};

/// Global counter for entity instance ids
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Tag given to entities that were never tagged.
pub const UNTAGGED: &str = "Untagged";

slotmap::new_key_type! {
    /// Handle to a component attached to an entity.
    pub struct ComponentId;
}

/// Upcast helper so boxed components can be downcast to their concrete type.
pub trait AsAny: Any {
    /// Borrow as `&dyn Any`
    fn as_any(&self) -> &dyn Any;
    /// Borrow as `&mut dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Anything that can be attached to an entity.
///
/// Plain data types only need an empty impl:
///
/// ```ignore
/// struct Health(f32);
/// impl Component for Health {}
/// ```
pub trait Component: AsAny {}

/// Identity and activity of an entity.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub(crate) instance_id: u64,
    pub(crate) guid: Uuid,
    pub(crate) name: String,
    pub(crate) tag: String,
    pub(crate) active_self: bool,
    /// Set once teardown begins so re-entrant destroy calls are ignored
    pub(crate) destroying: bool,
}

impl EntityInfo {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            instance_id: next_instance_id(),
            guid: Uuid::new_v4(),
            name: name.into(),
            tag: UNTAGGED.to_string(),
            active_self: true,
            destroying: false,
        }
    }

    /// Process-unique, monotonically assigned runtime id.
    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Persistent identifier.
    #[must_use]
    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag string.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Locally requested active state.
    #[must_use]
    pub fn active_self(&self) -> bool {
        self.active_self
    }
}

/// Components owned by an entity, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ComponentList(pub(crate) SmallVec<[ComponentId; 4]>);

impl ComponentList {
    /// Iterate over component handles in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ComponentId> {
        self.0.iter()
    }

    /// Number of attached components (the transform is not counted)
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no components are attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, id: ComponentId) {
        self.0.push(id);
    }

    pub(crate) fn remove(&mut self, id: ComponentId) -> bool {
        if let Some(pos) = self.0.iter().position(|&c| c == id) {
            self.0.remove(pos);
            true
        } else {
            false
        }
    }
}

/// Scheduler-facing state of a behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorState {
    /// Enabled flag, independent of the owning entity's activity
    pub enabled: bool,
    /// `awake` has returned
    pub has_awoken: bool,
    /// `start` has been invoked
    pub has_started: bool,
}

impl Default for BehaviorState {
    fn default() -> Self {
        Self {
            enabled: true,
            has_awoken: false,
            has_started: false,
        }
    }
}

pub(crate) enum ComponentBody {
    Data(Box<dyn Component>),
    Behavior {
        state: BehaviorState,
        /// `None` while one of its hooks is executing
        instance: Option<Box<dyn Behavior>>,
        /// Hooks aimed at this behavior while it was checked out
        deferred: SmallVec<[LifecycleHook; 2]>,
        /// Hook currently executing, if any
        running: Option<LifecycleHook>,
    },
}

pub(crate) struct ComponentRecord {
    pub owner: Entity,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub body: ComponentBody,
    pub destroyed: bool,
}

impl ComponentRecord {
    pub fn data<T: Component>(owner: Entity, component: T) -> Self {
        Self {
            owner,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            body: ComponentBody::Data(Box::new(component)),
            destroyed: false,
        }
    }

    pub fn behavior<T: Behavior>(owner: Entity, behavior: T) -> Self {
        Self {
            owner,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            body: ComponentBody::Behavior {
                state: BehaviorState::default(),
                instance: Some(Box::new(behavior)),
                deferred: SmallVec::new(),
                running: None,
            },
            destroyed: false,
        }
    }

    pub fn is_behavior(&self) -> bool {
        matches!(self.body, ComponentBody::Behavior { .. })
    }

    pub fn behavior_state(&self) -> Option<&BehaviorState> {
        match &self.body {
            ComponentBody::Behavior { state, .. } => Some(state),
            ComponentBody::Data(_) => None,
        }
    }

    pub fn behavior_state_mut(&mut self) -> Option<&mut BehaviorState> {
        match &mut self.body {
            ComponentBody::Behavior { state, .. } => Some(state),
            ComponentBody::Data(_) => None,
        }
    }

    /// Hook currently executing on this behavior.
    pub fn running_hook(&self) -> Option<LifecycleHook> {
        match &self.body {
            ComponentBody::Behavior { running, .. } => *running,
            ComponentBody::Data(_) => None,
        }
    }

    pub fn set_running_hook(&mut self, hook: Option<LifecycleHook>) {
        if let ComponentBody::Behavior { running, .. } = &mut self.body {
            *running = hook;
        }
    }

    /// Whether the instance is currently checked out to a running hook.
    pub fn is_checked_out(&self) -> bool {
        matches!(&self.body, ComponentBody::Behavior { instance: None, .. })
    }

    /// Borrow the concrete value if it is of type `T` and not checked out.
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        if self.destroyed || self.type_id != TypeId::of::<T>() {
            return None;
        }
        match &self.body {
            ComponentBody::Data(component) => (**component).as_any().downcast_ref::<T>(),
            ComponentBody::Behavior { instance, .. } => instance
                .as_deref()
                .and_then(|behavior| behavior.as_any().downcast_ref::<T>()),
        }
    }

    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        if self.destroyed || self.type_id != TypeId::of::<T>() {
            return None;
        }
        match &mut self.body {
            ComponentBody::Data(component) => (**component).as_any_mut().downcast_mut::<T>(),
            ComponentBody::Behavior { instance, .. } => instance
                .as_deref_mut()
                .and_then(|behavior| behavior.as_any_mut().downcast_mut::<T>()),
        }
    }
}
