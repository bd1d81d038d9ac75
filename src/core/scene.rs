//! Scene registry
//!
//! A scene is a named list of root entities. The registry keeps scenes in
//! creation order, tracks which one is active, and tears a scene's roots
//! (and with them their subtrees) down when it is unloaded.

use hecs::Entity;
use slotmap::SlotMap;
use thiserror::Error;

use crate::ecs::{EcsError, World};

slotmap::new_key_type! {
    /// Handle to a scene in a [`SceneRegistry`].
    pub struct SceneHandle;
}

/// A loaded scene
#[derive(Debug, Clone)]
pub struct Scene {
    name: String,
    roots: Vec<Entity>,
}

impl Scene {
    fn new(name: String) -> Self {
        Self {
            name,
            roots: Vec::new(),
        }
    }

    /// Scene name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root entities as registered, including any that have since been
    /// reparented. Destroyed roots linger until
    /// [`SceneRegistry::prune_dead_roots`] runs. Use
    /// [`SceneRegistry::root_entities`] for the live set.
    #[must_use]
    pub fn registered_roots(&self) -> &[Entity] {
        &self.roots
    }

    fn forget(&mut self, entity: Entity) -> bool {
        let before = self.roots.len();
        self.roots.retain(|&e| e != entity);
        self.roots.len() != before
    }
}

/// Errors that can occur during scene operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// The handle does not refer to a loaded scene
    #[error("no such scene")]
    NoSuchScene,
    /// `get_scene_at` index past the end
    #[error("scene index {index} out of range (scene count {count})")]
    SceneIndexOutOfRange { index: usize, count: usize },
    /// Scene names must be unique
    #[error("a scene named {0:?} already exists")]
    DuplicateSceneName(String),
    /// Only parentless entities can be scene roots
    #[error("entity {0:?} has a parent and cannot be a scene root")]
    NotARootEntity(Entity),
    /// Underlying entity operation failed
    #[error(transparent)]
    Ecs(#[from] EcsError),
}

/// Set of loaded scenes
#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: SlotMap<SceneHandle, Scene>,
    order: Vec<SceneHandle>,
    active: Option<SceneHandle>,
}

impl SceneRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scene. The first scene created becomes active.
    pub fn create_scene(&mut self, name: impl Into<String>) -> Result<SceneHandle, SceneError> {
        let name = name.into();
        if self.get_scene_by_name(&name).is_some() {
            return Err(SceneError::DuplicateSceneName(name));
        }
        log::debug!("create scene {name:?}");
        let handle = self.scenes.insert(Scene::new(name));
        self.order.push(handle);
        if self.active.is_none() {
            self.active = Some(handle);
        }
        Ok(handle)
    }

    /// Number of loaded scenes
    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.order.len()
    }

    /// Scene at `index` in load order
    pub fn get_scene_at(&self, index: usize) -> Result<SceneHandle, SceneError> {
        self.order
            .get(index)
            .copied()
            .ok_or(SceneError::SceneIndexOutOfRange {
                index,
                count: self.order.len(),
            })
    }

    /// Scene with an exact name
    #[must_use]
    pub fn get_scene_by_name(&self, name: &str) -> Option<SceneHandle> {
        self.order
            .iter()
            .copied()
            .find(|&handle| self.scenes.get(handle).is_some_and(|s| s.name == name))
    }

    /// Scene data for a handle
    #[must_use]
    pub fn scene(&self, handle: SceneHandle) -> Option<&Scene> {
        self.scenes.get(handle)
    }

    /// Currently active scene
    #[must_use]
    pub fn active_scene(&self) -> Option<SceneHandle> {
        self.active
    }

    /// Make a loaded scene active
    pub fn set_active_scene(&mut self, handle: SceneHandle) -> Result<(), SceneError> {
        if !self.scenes.contains_key(handle) {
            return Err(SceneError::NoSuchScene);
        }
        self.active = Some(handle);
        Ok(())
    }

    /// Scene an entity is registered under as a root
    #[must_use]
    pub fn scene_of(&self, entity: Entity) -> Option<SceneHandle> {
        self.order
            .iter()
            .copied()
            .find(|&handle| self.scenes[handle].roots.contains(&entity))
    }

    /// Register a parentless entity as a root of `handle`, removing it from
    /// any other scene. Adding an existing root again does nothing.
    pub fn add_root_entity(
        &mut self,
        world: &World,
        handle: SceneHandle,
        entity: Entity,
    ) -> Result<(), SceneError> {
        if !self.scenes.contains_key(handle) {
            return Err(SceneError::NoSuchScene);
        }
        if world.parent(entity)?.is_some() {
            return Err(SceneError::NotARootEntity(entity));
        }
        if let Some(current) = self.scene_of(entity) {
            if current == handle {
                return Ok(());
            }
            self.scenes[current].forget(entity);
        }
        self.prune_dead_roots(world);
        self.scenes[handle].roots.push(entity);
        Ok(())
    }

    /// Forget registered roots whose entity no longer exists in `world`.
    /// Returns how many were dropped.
    pub fn prune_dead_roots(&mut self, world: &World) -> usize {
        let mut pruned = 0;
        for scene in self.scenes.values_mut() {
            let before = scene.roots.len();
            scene.roots.retain(|&e| world.contains(e));
            pruned += before - scene.roots.len();
        }
        if pruned > 0 {
            log::trace!("pruned {pruned} dead scene roots");
        }
        pruned
    }

    /// Live root entities of a scene: registered, still alive and still
    /// parentless, in registration order
    pub fn root_entities(&self, world: &World, handle: SceneHandle) -> Result<Vec<Entity>, SceneError> {
        let scene = self.scenes.get(handle).ok_or(SceneError::NoSuchScene)?;
        Ok(scene
            .roots
            .iter()
            .copied()
            .filter(|&e| matches!(world.parent(e), Ok(None)))
            .collect())
    }

    /// Move an entity into another scene as a root. A parented entity is
    /// detached first, keeping its world pose.
    pub fn move_entity_to_scene(
        &mut self,
        world: &mut World,
        entity: Entity,
        handle: SceneHandle,
    ) -> Result<(), SceneError> {
        if !self.scenes.contains_key(handle) {
            return Err(SceneError::NoSuchScene);
        }
        if world.parent(entity)?.is_some() {
            world.set_parent(entity, None, true)?;
        }
        self.add_root_entity(world, handle, entity)
    }

    /// Destroy every root of a scene (immediately, with their subtrees) and
    /// remove the scene. If it was active, the first remaining scene becomes
    /// active.
    pub fn unload_scene(&mut self, world: &mut World, handle: SceneHandle) -> Result<(), SceneError> {
        let roots = self.root_entities(world, handle)?;
        let Some(scene) = self.scenes.remove(handle) else {
            return Err(SceneError::NoSuchScene);
        };
        self.order.retain(|&h| h != handle);
        if self.active == Some(handle) {
            self.active = self.order.first().copied();
        }

        log::debug!("unload scene {:?} ({} roots)", scene.name, roots.len());
        for root in roots {
            world.destroy_immediate(root);
        }
        Ok(())
    }

    /// Drop every scene without touching the world
    pub fn clear(&mut self) {
        self.scenes.clear();
        self.order.clear();
        self.active = None;
    }
}
