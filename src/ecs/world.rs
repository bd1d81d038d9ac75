//! World wrapper around hecs
//!
//! Entities live in a `hecs::World` and always carry an [`EntityInfo`], a
//! [`Transform`] and a [`ComponentList`]. Attached components are boxed in a
//! slot map so several components of the same type can coexist on one
//! entity and keep their insertion order.

use std::any::TypeId;

use hecs::Entity;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use uuid::Uuid;

use super::behavior::Behavior;
use super::cached::Transform;
use super::components::{Component, ComponentId, ComponentList, ComponentRecord, EntityInfo};
use super::error::{EcsError, EcsResult};
use super::scheduler::LifecycleScheduler;

/// Game world containing all entities, components and the behavior schedule
pub struct World {
    /// The underlying hecs world
    pub(crate) inner: hecs::World,
    /// Live entities in creation order
    pub(crate) order: Vec<Entity>,
    /// Storage for every attached component
    pub(crate) components: SlotMap<ComponentId, ComponentRecord>,
    /// Behavior lifecycle queues
    pub(crate) scheduler: LifecycleScheduler,
    /// Entities queued by `destroy`
    pending_destroy: Vec<Entity>,
    /// Components queued by `destroy_component`
    pending_component_destroy: Vec<ComponentId>,
    delta_time: f32,
    fixed_delta_time: f32,
}

impl World {
    /// Create a new empty world
    pub fn new() -> Self {
        Self {
            inner: hecs::World::new(),
            order: Vec::new(),
            components: SlotMap::with_key(),
            scheduler: LifecycleScheduler::new(),
            pending_destroy: Vec::new(),
            pending_component_destroy: Vec::new(),
            delta_time: 0.0,
            fixed_delta_time: 0.0,
        }
    }

    /// Drop every entity and component and clear the schedule.
    ///
    /// No hooks run; this is a hard reset for tests and tooling.
    pub fn reset(&mut self) {
        self.inner.clear();
        self.order.clear();
        self.components.clear();
        self.scheduler.reset();
        self.pending_destroy.clear();
        self.pending_component_destroy.clear();
    }

    /// The behavior schedule
    pub fn scheduler(&self) -> &LifecycleScheduler {
        &self.scheduler
    }

    // -------------------------------------------------------------------------
    // Frame timing
    // -------------------------------------------------------------------------

    /// Seconds covered by the current frame, as set by the frame driver
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds covered by one fixed step
    pub fn fixed_delta_time(&self) -> f32 {
        self.fixed_delta_time
    }

    /// Record the timing that hooks observe during the next passes
    pub fn set_frame_times(&mut self, delta_time: f32, fixed_delta_time: f32) {
        self.delta_time = delta_time;
        self.fixed_delta_time = fixed_delta_time;
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Spawn a new root entity with an identity transform
    pub fn create_entity(&mut self, name: impl Into<String>) -> Entity {
        let info = EntityInfo::new(name);
        log::trace!("create entity '{}' (#{})", info.name, info.instance_id);
        let entity = self
            .inner
            .spawn((info, Transform::new(), ComponentList::default()));
        self.order.push(entity);
        entity
    }

    /// Spawn a new entity parented under `parent` with an identity local pose
    pub fn create_child(&mut self, parent: Entity, name: impl Into<String>) -> EcsResult<Entity> {
        self.ensure_entity(parent)?;
        let entity = self.create_entity(name);
        self.set_parent(entity, Some(parent), false)?;
        Ok(entity)
    }

    /// Check if an entity exists
    pub fn contains(&self, entity: Entity) -> bool {
        self.inner.contains(entity)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    /// Live entities in creation order
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.order.iter().copied()
    }

    /// Identity and activity record of an entity
    pub fn info(&self, entity: Entity) -> EcsResult<hecs::Ref<'_, EntityInfo>> {
        self.inner
            .get::<&EntityInfo>(entity)
            .map_err(|_| EcsError::NoSuchEntity(entity))
    }

    fn info_mut(&mut self, entity: Entity) -> EcsResult<hecs::RefMut<'_, EntityInfo>> {
        self.inner
            .get::<&mut EntityInfo>(entity)
            .map_err(|_| EcsError::NoSuchEntity(entity))
    }

    pub(crate) fn ensure_entity(&self, entity: Entity) -> EcsResult<()> {
        if self.inner.contains(entity) {
            Ok(())
        } else {
            Err(EcsError::NoSuchEntity(entity))
        }
    }

    /// Runtime instance id
    pub fn instance_id(&self, entity: Entity) -> EcsResult<u64> {
        Ok(self.info(entity)?.instance_id())
    }

    /// Persistent identifier
    pub fn guid(&self, entity: Entity) -> EcsResult<Uuid> {
        Ok(self.info(entity)?.guid())
    }

    /// Display name
    pub fn name(&self, entity: Entity) -> EcsResult<String> {
        Ok(self.info(entity)?.name().to_owned())
    }

    /// Rename an entity
    pub fn set_name(&mut self, entity: Entity, name: impl Into<String>) -> EcsResult<()> {
        self.info_mut(entity)?.name = name.into();
        Ok(())
    }

    /// Tag string
    pub fn tag(&self, entity: Entity) -> EcsResult<String> {
        Ok(self.info(entity)?.tag().to_owned())
    }

    /// Replace the tag
    pub fn set_tag(&mut self, entity: Entity, tag: impl Into<String>) -> EcsResult<()> {
        self.info_mut(entity)?.tag = tag.into();
        Ok(())
    }

    /// Exact, case-sensitive tag comparison
    pub fn compare_tag(&self, entity: Entity, tag: &str) -> EcsResult<bool> {
        Ok(self.info(entity)?.tag == tag)
    }

    /// Locally requested active state
    pub fn active_self(&self, entity: Entity) -> EcsResult<bool> {
        Ok(self.info(entity)?.active_self)
    }

    /// Set the local active flag.
    ///
    /// Behaviors read hierarchy activity live at every phase pass, so nothing
    /// else has to be notified here.
    pub fn set_active(&mut self, entity: Entity, active: bool) -> EcsResult<()> {
        let mut info = self.info_mut(entity)?;
        if info.active_self != active {
            log::debug!("entity '{}' active = {active}", info.name);
            info.active_self = active;
        }
        Ok(())
    }

    /// `active_self` of this entity and of every ancestor
    pub fn active_in_hierarchy(&self, entity: Entity) -> EcsResult<bool> {
        let mut current = Some(entity);
        while let Some(e) = current {
            if !self.info(e)?.active_self {
                return Ok(false);
            }
            current = self.transform(e)?.parent();
        }
        Ok(true)
    }

    /// First entity active in hierarchy with this exact name
    pub fn find_entity(&self, name: &str) -> Option<Entity> {
        self.order.iter().copied().find(|&e| {
            self.info(e).is_ok_and(|info| info.name == name)
                && self.active_in_hierarchy(e).unwrap_or(false)
        })
    }

    /// First entity active in hierarchy with this exact tag
    pub fn find_with_tag(&self, tag: &str) -> Option<Entity> {
        self.find_all_with_tag(tag).into_iter().next()
    }

    /// Every entity active in hierarchy with this exact tag, in creation order
    pub fn find_all_with_tag(&self, tag: &str) -> Vec<Entity> {
        self.order
            .iter()
            .copied()
            .filter(|&e| {
                self.info(e).is_ok_and(|info| info.tag == tag)
                    && self.active_in_hierarchy(e).unwrap_or(false)
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    /// Attach a data component. Several components of one type may coexist.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> EcsResult<ComponentId> {
        self.ensure_entity(entity)?;
        let id = self.components.insert(ComponentRecord::data(entity, component));
        self.attach(entity, id)?;
        Ok(id)
    }

    /// Attach a behavior and queue it for the next awake pass.
    pub fn add_behavior<T: Behavior>(&mut self, entity: Entity, behavior: T) -> EcsResult<ComponentId> {
        self.ensure_entity(entity)?;
        let id = self.components.insert(ComponentRecord::behavior(entity, behavior));
        self.attach(entity, id)?;
        self.scheduler.register(id);
        log::trace!(
            "queued behavior {} on {entity:?}",
            std::any::type_name::<T>()
        );
        Ok(id)
    }

    fn attach(&mut self, entity: Entity, id: ComponentId) -> EcsResult<()> {
        match self.inner.get::<&mut ComponentList>(entity) {
            Ok(mut list) => {
                list.push(id);
                Ok(())
            }
            Err(_) => {
                self.components.remove(id);
                Err(EcsError::NoSuchEntity(entity))
            }
        }
    }

    /// Every component handle on an entity, in insertion order
    pub fn components(&self, entity: Entity) -> EcsResult<Vec<ComponentId>> {
        let list = self
            .inner
            .get::<&ComponentList>(entity)
            .map_err(|_| EcsError::NoSuchEntity(entity))?;
        Ok(list.iter().copied().collect())
    }

    /// Behavior handles on an entity, in insertion order
    pub fn behaviors(&self, entity: Entity) -> EcsResult<Vec<ComponentId>> {
        Ok(self
            .components(entity)?
            .into_iter()
            .filter(|&id| self.components.get(id).is_some_and(|r| r.is_behavior()))
            .collect())
    }

    /// Handles of components of exactly type `T` on one entity.
    ///
    /// Unlike the reference-returning lookups, this includes a behavior whose
    /// hook is currently running.
    pub fn find_components<T: Component>(&self, entity: Entity) -> Vec<ComponentId> {
        let Ok(list) = self.inner.get::<&ComponentList>(entity) else {
            return Vec::new();
        };
        let type_id = TypeId::of::<T>();
        list.iter()
            .copied()
            .filter(|&id| {
                self.components
                    .get(id)
                    .is_some_and(|r| !r.destroyed && r.type_id == type_id)
            })
            .collect()
    }

    /// Handle of the first component of type `T`
    pub fn find_component<T: Component>(&self, entity: Entity) -> Option<ComponentId> {
        self.find_components::<T>(entity).into_iter().next()
    }

    /// First component of type `T`, in insertion order
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.find_components::<T>(entity)
            .into_iter()
            .find_map(|id| self.component::<T>(id))
    }

    /// Mutable access to the first component of type `T`
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self
            .find_components::<T>(entity)
            .into_iter()
            .find(|&id| self.component::<T>(id).is_some())?;
        self.component_mut::<T>(id)
    }

    /// All components of type `T`, in insertion order
    pub fn get_components<T: Component>(&self, entity: Entity) -> Vec<&T> {
        self.find_components::<T>(entity)
            .into_iter()
            .filter_map(|id| self.component::<T>(id))
            .collect()
    }

    /// Component behind a handle, if it is of type `T`
    pub fn component<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.components.get(id)?.downcast_ref::<T>()
    }

    /// Mutable component behind a handle, if it is of type `T`
    pub fn component_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.components.get_mut(id)?.downcast_mut::<T>()
    }

    /// Entity owning a component
    pub fn component_owner(&self, id: ComponentId) -> Option<Entity> {
        self.components
            .get(id)
            .filter(|r| !r.destroyed)
            .map(|r| r.owner)
    }

    /// Concrete type name of a component
    pub fn component_type_name(&self, id: ComponentId) -> Option<&'static str> {
        self.components
            .get(id)
            .filter(|r| !r.destroyed)
            .map(|r| r.type_name)
    }

    /// First component of type `T` on this entity or its descendants.
    ///
    /// Depth-first pre-order. The entity itself is always searched; a child
    /// whose `active_self` is false is skipped together with its subtree
    /// unless `include_inactive` is set.
    pub fn get_component_in_children<T: Component>(
        &self,
        entity: Entity,
        include_inactive: bool,
    ) -> Option<&T> {
        self.walk_children(entity, include_inactive)
            .into_iter()
            .find_map(|e| self.get_component::<T>(e))
    }

    /// All components of type `T` on this entity and its descendants
    pub fn get_components_in_children<T: Component>(
        &self,
        entity: Entity,
        include_inactive: bool,
    ) -> Vec<&T> {
        self.walk_children(entity, include_inactive)
            .into_iter()
            .flat_map(|e| self.get_components::<T>(e))
            .collect()
    }

    /// First component of type `T` on this entity or its ancestors
    pub fn get_component_in_parent<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.ancestors_inclusive(entity)
            .into_iter()
            .find_map(|e| self.get_component::<T>(e))
    }

    /// All components of type `T` on this entity and its ancestors, nearest first
    pub fn get_components_in_parent<T: Component>(&self, entity: Entity) -> Vec<&T> {
        self.ancestors_inclusive(entity)
            .into_iter()
            .flat_map(|e| self.get_components::<T>(e))
            .collect()
    }

    fn walk_children(&self, root: Entity, include_inactive: bool) -> Vec<Entity> {
        let mut visited = Vec::new();
        if !self.contains(root) {
            return visited;
        }
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if current != root && !include_inactive && !self.active_self(current).unwrap_or(false) {
                continue;
            }
            visited.push(current);
            if let Ok(transform) = self.transform(current) {
                stack.extend(transform.children().iter().rev().copied());
            }
        }
        visited
    }

    fn ancestors_inclusive(&self, entity: Entity) -> Vec<Entity> {
        let mut chain = Vec::new();
        let mut current = self.contains(entity).then_some(entity);
        while let Some(e) = current {
            chain.push(e);
            current = self.transform(e).ok().and_then(|t| t.parent());
        }
        chain
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Queue an entity, its components and its descendants for destruction
    /// at the end of the current phase pass.
    pub fn destroy(&mut self, entity: Entity) {
        if self.contains(entity) && !self.pending_destroy.contains(&entity) {
            self.pending_destroy.push(entity);
        }
    }

    /// Queue a component for destruction at the end of the current phase pass.
    pub fn destroy_component(&mut self, id: ComponentId) {
        if self.components.contains_key(id) && !self.pending_component_destroy.contains(&id) {
            self.pending_component_destroy.push(id);
        }
    }

    /// Run every queued destruction. Hooks may queue more; those run too.
    pub fn flush_destroyed(&mut self) {
        loop {
            let components = std::mem::take(&mut self.pending_component_destroy);
            let entities = std::mem::take(&mut self.pending_destroy);
            if components.is_empty() && entities.is_empty() {
                break;
            }
            for id in components {
                self.destroy_component_immediate(id);
            }
            for entity in entities {
                self.destroy_immediate(entity);
            }
        }
    }

    /// Destroy an entity now, together with its components and every
    /// descendant. Destroying a missing entity is a no-op.
    pub fn destroy_immediate(&mut self, entity: Entity) {
        match self.info(entity) {
            Ok(info) if !info.destroying => {}
            _ => return,
        }

        let snapshot = self.subtree(entity);
        for &e in &snapshot {
            if let Ok(mut info) = self.info_mut(e) {
                info.destroying = true;
            }
        }
        log::debug!("destroying {entity:?} and {} descendants", snapshot.len() - 1);

        // Teardown hooks first, while the whole subtree is still intact and
        // still attached to its parent
        for &e in &snapshot {
            for id in self.components(e).unwrap_or_default() {
                self.destroy_component_immediate(id);
            }
        }

        // Hooks may have added children or components; sweep everything now
        // reachable from the snapshot. Anything whose parent survives,
        // including `entity` itself, is unlinked here.
        let mut doomed: Vec<Entity> = Vec::new();
        let mut seen = FxHashSet::default();
        for &e in &snapshot {
            for d in self.subtree(e) {
                if seen.insert(d) {
                    doomed.push(d);
                }
            }
        }
        for &e in &doomed {
            let parent = self.transform(e).ok().and_then(|t| t.parent());
            if parent.is_some_and(|p| !seen.contains(&p)) {
                self.unlink_from_parent(e);
            }
            for id in self.components(e).unwrap_or_default() {
                self.destroy_component_immediate(id);
            }
        }
        for &e in &doomed {
            let _ = self.inner.despawn(e);
        }
        self.order.retain(|e| !seen.contains(e));
    }

    /// Destroy a component now. Awoken behaviors receive `on_disable` (if
    /// enabled) and `on_destroy`. Destroying twice is a no-op.
    pub fn destroy_component_immediate(&mut self, id: ComponentId) {
        use super::behavior::LifecycleHook;

        let Some(record) = self.components.get_mut(id) else {
            return;
        };
        if record.destroyed {
            return;
        }
        record.destroyed = true;
        let owner = record.owner;
        let checked_out = record.is_checked_out();
        // A behavior tearing itself down from inside `awake` has not been
        // marked awoken yet, but its awake has run
        let in_awake = record.running_hook() == Some(LifecycleHook::Awake);
        let hooks: &[LifecycleHook] = match record.behavior_state() {
            Some(state) if state.has_awoken && state.enabled => {
                &[LifecycleHook::OnDisable, LifecycleHook::OnDestroy]
            }
            Some(state) if state.has_awoken || in_awake => &[LifecycleHook::OnDestroy],
            _ => &[],
        };

        if let Ok(mut list) = self.inner.get::<&mut ComponentList>(owner) {
            list.remove(id);
        }
        self.scheduler.unregister(id);

        if !hooks.is_empty() {
            // Dispatch drops the record once the hooks have run
            self.dispatch(id, hooks);
        } else if !checked_out {
            self.components.remove(id);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::ecs::BehaviorContext;

    #[derive(Debug, PartialEq)]
    struct Health(f32);
    impl Component for Health {}

    #[derive(Debug, PartialEq)]
    struct Marker(&'static str);
    impl Component for Marker {}

    struct Idle;
    impl Component for Idle {}
    impl Behavior for Idle {}

    /// Records its parent and world position as seen from `on_destroy`
    struct PoseWitness {
        seen: Rc<RefCell<Option<(Option<Entity>, Vec3)>>>,
    }

    impl Component for PoseWitness {}

    impl Behavior for PoseWitness {
        fn on_destroy(&mut self, ctx: &mut BehaviorContext<'_>) {
            let me = ctx.entity();
            let parent = ctx.parent(me).ok().flatten();
            let position = ctx.position(me).unwrap_or(Vec3::NAN);
            *self.seen.borrow_mut() = Some((parent, position));
        }
    }

    /// Grows and reparents its own subtree from `on_destroy`
    struct Grower {
        keeper: Entity,
        recruit: Entity,
    }

    impl Component for Grower {}

    impl Behavior for Grower {
        fn on_destroy(&mut self, ctx: &mut BehaviorContext<'_>) {
            let me = ctx.entity();
            if let Ok(spawned) = ctx.create_child(me, "spawned") {
                let _ = ctx.add_behavior(spawned, Idle);
                let _ = ctx.add_component(spawned, Marker("spawned"));
            }
            let _ = ctx.set_parent(self.recruit, Some(me), false);
            let _ = ctx.set_parent(me, Some(self.keeper), false);
        }
    }

    #[test]
    fn test_create_entity_has_transform() {
        let mut world = World::new();
        let e = world.create_entity("Player");

        assert!(world.contains(e));
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.name(e).unwrap(), "Player");
        assert!(world.transform(e).is_ok());
        assert!(world.components(e).unwrap().is_empty());
    }

    #[test]
    fn test_multiple_components_same_type_keep_order() {
        let mut world = World::new();
        let e = world.create_entity("e");

        world.add_component(e, Health(1.0)).unwrap();
        world.add_component(e, Marker("x")).unwrap();
        world.add_component(e, Health(2.0)).unwrap();

        assert_eq!(world.get_component::<Health>(e), Some(&Health(1.0)));
        assert_eq!(
            world.get_components::<Health>(e),
            vec![&Health(1.0), &Health(2.0)]
        );
        assert_eq!(world.get_components::<Marker>(e).len(), 1);
    }

    #[test]
    fn test_missing_component_is_none() {
        let mut world = World::new();
        let e = world.create_entity("e");

        assert!(world.get_component::<Health>(e).is_none());
        assert!(world.get_components::<Health>(e).is_empty());
        assert!(world.find_component::<Health>(e).is_none());
    }

    #[test]
    fn test_get_component_mut() {
        let mut world = World::new();
        let e = world.create_entity("e");
        world.add_component(e, Health(5.0)).unwrap();

        if let Some(health) = world.get_component_mut::<Health>(e) {
            health.0 -= 2.0;
        }
        assert_eq!(world.get_component::<Health>(e), Some(&Health(3.0)));
    }

    #[test]
    fn test_add_component_to_dead_entity_fails() {
        let mut world = World::new();
        let e = world.create_entity("e");
        world.destroy_immediate(e);

        assert_eq!(
            world.add_component(e, Health(1.0)),
            Err(EcsError::NoSuchEntity(e))
        );
    }

    #[test]
    fn test_active_in_hierarchy_follows_ancestors() {
        let mut world = World::new();
        let root = world.create_entity("root");
        let mid = world.create_child(root, "mid").unwrap();
        let leaf = world.create_child(mid, "leaf").unwrap();

        assert!(world.active_in_hierarchy(leaf).unwrap());

        world.set_active(root, false).unwrap();
        assert!(!world.active_in_hierarchy(leaf).unwrap());
        assert!(world.active_self(leaf).unwrap());

        world.set_active(root, true).unwrap();
        world.set_active(leaf, false).unwrap();
        assert!(world.active_in_hierarchy(mid).unwrap());
        assert!(!world.active_in_hierarchy(leaf).unwrap());
    }

    #[test]
    fn test_active_in_hierarchy_matches_definition() {
        let mut world = World::new();
        let a = world.create_entity("a");
        let b = world.create_child(a, "b").unwrap();
        let c = world.create_child(b, "c").unwrap();
        let d = world.create_child(a, "d").unwrap();

        let flags = [(a, true), (b, false), (c, true), (d, true)];
        for (e, active) in flags {
            world.set_active(e, active).unwrap();
        }

        for e in [a, b, c, d] {
            let parent = world.parent(e).unwrap();
            let expected = world.active_self(e).unwrap()
                && parent.is_none_or(|p| world.active_in_hierarchy(p).unwrap());
            assert_eq!(world.active_in_hierarchy(e).unwrap(), expected);
        }
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let mut world = World::new();
        let e = world.create_entity("e");
        world.set_tag(e, "Enemy").unwrap();

        assert!(world.compare_tag(e, "Enemy").unwrap());
        assert!(!world.compare_tag(e, "enemy").unwrap());
        assert_eq!(world.find_with_tag("Enemy"), Some(e));
        assert_eq!(world.find_with_tag("enemy"), None);
    }

    #[test]
    fn test_find_entity_skips_inactive() {
        let mut world = World::new();
        let a = world.create_entity("Target");
        let b = world.create_entity("Target");

        assert_eq!(world.find_entity("Target"), Some(a));
        world.set_active(a, false).unwrap();
        assert_eq!(world.find_entity("Target"), Some(b));
        assert_eq!(world.find_entity("Nothing"), None);
    }

    #[test]
    fn test_get_component_in_children_preorder() {
        let mut world = World::new();
        let root = world.create_entity("root");
        let a = world.create_child(root, "a").unwrap();
        let a1 = world.create_child(a, "a1").unwrap();
        let b = world.create_child(root, "b").unwrap();

        world.add_component(a1, Marker("a1")).unwrap();
        world.add_component(b, Marker("b")).unwrap();

        assert_eq!(
            world.get_component_in_children::<Marker>(root, false),
            Some(&Marker("a1"))
        );
        let all: Vec<_> = world
            .get_components_in_children::<Marker>(root, false)
            .into_iter()
            .map(|m| m.0)
            .collect();
        assert_eq!(all, vec!["a1", "b"]);
    }

    #[test]
    fn test_get_component_in_children_inactive_filter() {
        let mut world = World::new();
        let root = world.create_entity("root");
        let hidden = world.create_child(root, "hidden").unwrap();
        let below = world.create_child(hidden, "below").unwrap();
        world.add_component(below, Marker("below")).unwrap();
        world.add_component(root, Health(1.0)).unwrap();

        world.set_active(hidden, false).unwrap();
        assert!(world.get_component_in_children::<Marker>(root, false).is_none());
        assert_eq!(
            world.get_component_in_children::<Marker>(root, true),
            Some(&Marker("below"))
        );

        // Self is searched even when inactive
        world.set_active(root, false).unwrap();
        assert_eq!(
            world.get_component_in_children::<Health>(root, false),
            Some(&Health(1.0))
        );
    }

    #[test]
    fn test_get_component_in_parent_ignores_activity() {
        let mut world = World::new();
        let root = world.create_entity("root");
        let child = world.create_child(root, "child").unwrap();
        let leaf = world.create_child(child, "leaf").unwrap();
        world.add_component(root, Marker("root")).unwrap();
        world.add_component(child, Marker("child")).unwrap();
        world.set_active(root, false).unwrap();

        assert_eq!(
            world.get_component_in_parent::<Marker>(leaf),
            Some(&Marker("child"))
        );
        let names: Vec<_> = world
            .get_components_in_parent::<Marker>(leaf)
            .into_iter()
            .map(|m| m.0)
            .collect();
        assert_eq!(names, vec!["child", "root"]);
    }

    #[test]
    fn test_destroy_immediate_removes_subtree() {
        let mut world = World::new();
        let root = world.create_entity("root");
        let child = world.create_child(root, "child").unwrap();
        let grandchild = world.create_child(child, "grandchild").unwrap();
        let other = world.create_entity("other");
        let id = world.add_component(grandchild, Health(1.0)).unwrap();

        world.destroy_immediate(child);

        assert!(world.contains(root));
        assert!(!world.contains(child));
        assert!(!world.contains(grandchild));
        assert!(world.contains(other));
        assert!(world.component::<Health>(id).is_none());
        assert_eq!(world.child_count(root).unwrap(), 0);
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![root, other]);

        // Idempotent
        world.destroy_immediate(child);
    }

    #[test]
    fn test_teardown_hooks_see_attached_hierarchy() {
        let mut world = World::new();
        let root = world.create_entity("root");
        world.set_local_position(root, Vec3::new(4.0, 0.0, 0.0)).unwrap();
        let child = world.create_child(root, "child").unwrap();
        world.set_local_position(child, Vec3::new(6.0, 0.0, 0.0)).unwrap();
        let seen = Rc::new(RefCell::new(None));
        world
            .add_behavior(child, PoseWitness { seen: Rc::clone(&seen) })
            .unwrap();
        world.process_awake();

        world.destroy_immediate(child);

        let (parent, position) = (*seen.borrow()).expect("on_destroy ran");
        assert_eq!(parent, Some(root));
        assert!(position.abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
        assert!(!world.contains(child));
        assert_eq!(world.child_count(root).unwrap(), 0);
    }

    #[test]
    fn test_teardown_hooks_growing_subtree_are_swept() {
        let mut world = World::new();
        let keeper = world.create_entity("keeper");
        let recruit = world.create_entity("recruit");
        let doomed = world.create_entity("doomed");
        world.add_behavior(doomed, Grower { keeper, recruit }).unwrap();
        world.process_awake();

        world.destroy_immediate(doomed);

        assert!(!world.contains(doomed));
        assert!(!world.contains(recruit));
        assert!(world.find_entity("spawned").is_none());
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![keeper]);
        assert_eq!(world.child_count(keeper).unwrap(), 0);
        assert_eq!(world.scheduler().pending_count(), 0);
        assert_eq!(world.scheduler().active_count(), 0);
    }

    #[test]
    fn test_deferred_destroy_waits_for_flush() {
        let mut world = World::new();
        let e = world.create_entity("e");
        let id = world.add_component(e, Health(1.0)).unwrap();

        world.destroy_component(id);
        assert!(world.component::<Health>(id).is_some());
        world.destroy(e);
        world.destroy(e);
        assert!(world.contains(e));

        world.flush_destroyed();
        assert!(!world.contains(e));
        assert!(world.component::<Health>(id).is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut world = World::new();
        let e = world.create_entity("e");
        world.add_component(e, Health(1.0)).unwrap();

        world.reset();
        assert_eq!(world.entity_count(), 0);
        assert!(!world.contains(e));
    }
}
