//! Transform hierarchy operations
//!
//! Parent/child links, local and world-space accessors, and the dirty
//! propagation that keeps cached world matrices honest.
//!
//! Local values are authoritative; world-space setters convert through the
//! parent's inverse world matrix and write the local fields. Any local write
//! or reparent dirties the transform, and the first dirtying of a clean
//! transform also dirties its descendants. A dirty transform therefore never
//! has a clean descendant, so propagation can stop at already-dirty nodes.

use glam::{EulerRot, Mat4, Quat, Vec3};
use hecs::Entity;
use smallvec::SmallVec;

use super::cached::Transform;
use super::error::{EcsError, EcsResult};
use super::world::World;

/// Reference frame for relative transform operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// Axes of the world
    World,
    /// Axes of the transform itself
    Local,
}

impl World {
    // -------------------------------------------------------------------------
    // Record access
    // -------------------------------------------------------------------------

    /// The transform record of an entity
    pub fn transform(&self, entity: Entity) -> EcsResult<hecs::Ref<'_, Transform>> {
        self.inner
            .get::<&Transform>(entity)
            .map_err(|_| EcsError::NoSuchEntity(entity))
    }

    fn transform_mut(&mut self, entity: Entity) -> EcsResult<hecs::RefMut<'_, Transform>> {
        self.inner
            .get::<&mut Transform>(entity)
            .map_err(|_| EcsError::NoSuchEntity(entity))
    }

    /// Dirty `entity` and, unless it was dirty already, its descendants.
    fn invalidate(&mut self, entity: Entity) {
        let mut stack: SmallVec<[Entity; 16]> = SmallVec::new();
        stack.push(entity);
        while let Some(current) = stack.pop() {
            let Ok(mut transform) = self.inner.get::<&mut Transform>(current) else {
                continue;
            };
            if transform.mark_dirty() {
                stack.extend(transform.children().iter().copied());
            }
        }
    }

    /// Bring the cached matrices of `entity` up to date and return them as
    /// `(local_to_world, world_to_local)`.
    ///
    /// Walks up to the nearest clean ancestor, then recomputes top-down so no
    /// parent is ever read while stale.
    fn refresh_matrices(&mut self, entity: Entity) -> EcsResult<(Mat4, Mat4)> {
        let mut stale: SmallVec<[Entity; 16]> = SmallVec::new();
        let mut parent_world = Mat4::IDENTITY;
        let mut current = entity;
        loop {
            let transform = self.transform(current)?;
            if !transform.is_dirty() {
                parent_world = transform.matrices().0;
                break;
            }
            stale.push(current);
            match transform.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        for &e in stale.iter().rev() {
            parent_world = self.transform_mut(e)?.refresh(parent_world);
        }
        Ok(self.transform(entity)?.matrices())
    }

    // -------------------------------------------------------------------------
    // Local space
    // -------------------------------------------------------------------------

    /// Position relative to the parent
    pub fn local_position(&self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.transform(entity)?.local_position())
    }

    /// Set the position relative to the parent
    pub fn set_local_position(&mut self, entity: Entity, position: Vec3) -> EcsResult<()> {
        self.transform_mut(entity)?.set_local_position(position);
        self.invalidate(entity);
        Ok(())
    }

    /// Rotation relative to the parent
    pub fn local_rotation(&self, entity: Entity) -> EcsResult<Quat> {
        Ok(self.transform(entity)?.local_rotation())
    }

    /// Set the rotation relative to the parent
    pub fn set_local_rotation(&mut self, entity: Entity, rotation: Quat) -> EcsResult<()> {
        self.transform_mut(entity)?.set_local_rotation(rotation);
        self.invalidate(entity);
        Ok(())
    }

    /// Scale relative to the parent
    pub fn local_scale(&self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.transform(entity)?.local_scale())
    }

    /// Set the scale relative to the parent
    pub fn set_local_scale(&mut self, entity: Entity, scale: Vec3) -> EcsResult<()> {
        self.transform_mut(entity)?.set_local_scale(scale);
        self.invalidate(entity);
        Ok(())
    }

    /// Local rotation as XYZ euler angles in radians
    pub fn local_euler_angles(&self, entity: Entity) -> EcsResult<Vec3> {
        let (x, y, z) = self.local_rotation(entity)?.to_euler(EulerRot::XYZ);
        Ok(Vec3::new(x, y, z))
    }

    /// Set the local rotation from XYZ euler angles in radians
    pub fn set_local_euler_angles(&mut self, entity: Entity, euler: Vec3) -> EcsResult<()> {
        let rotation = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.set_local_rotation(entity, rotation)
    }

    // -------------------------------------------------------------------------
    // World space
    // -------------------------------------------------------------------------

    /// Matrix from this transform's space to world space
    pub fn local_to_world_matrix(&mut self, entity: Entity) -> EcsResult<Mat4> {
        Ok(self.refresh_matrices(entity)?.0)
    }

    /// Matrix from world space to this transform's space
    pub fn world_to_local_matrix(&mut self, entity: Entity) -> EcsResult<Mat4> {
        Ok(self.refresh_matrices(entity)?.1)
    }

    /// World-space position
    pub fn position(&mut self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.local_to_world_matrix(entity)?.w_axis.truncate())
    }

    /// Move to a world-space position
    pub fn set_position(&mut self, entity: Entity, position: Vec3) -> EcsResult<()> {
        let parent = self.transform(entity)?.parent();
        let local = match parent {
            Some(parent) => self.world_to_local_matrix(parent)?.transform_point3(position),
            None => position,
        };
        self.set_local_position(entity, local)
    }

    /// World-space rotation, composed along the parent chain
    pub fn rotation(&self, entity: Entity) -> EcsResult<Quat> {
        let mut rotation = Quat::IDENTITY;
        let mut current = Some(entity);
        while let Some(e) = current {
            let transform = self.transform(e)?;
            rotation = transform.local_rotation() * rotation;
            current = transform.parent();
        }
        Ok(rotation.normalize())
    }

    /// Set the world-space rotation
    pub fn set_rotation(&mut self, entity: Entity, rotation: Quat) -> EcsResult<()> {
        let parent = self.transform(entity)?.parent();
        let local = match parent {
            Some(parent) => self.rotation(parent)?.inverse() * rotation,
            None => rotation,
        };
        self.set_local_rotation(entity, local)
    }

    /// World rotation as XYZ euler angles in radians
    pub fn euler_angles(&self, entity: Entity) -> EcsResult<Vec3> {
        let (x, y, z) = self.rotation(entity)?.to_euler(EulerRot::XYZ);
        Ok(Vec3::new(x, y, z))
    }

    /// Set the world rotation from XYZ euler angles in radians
    pub fn set_euler_angles(&mut self, entity: Entity, euler: Vec3) -> EcsResult<()> {
        let rotation = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.set_rotation(entity, rotation)
    }

    /// Approximate world scale: local scale multiplied component-wise by
    /// every ancestor's local scale. Shear from rotated non-uniform parents
    /// is not represented.
    pub fn lossy_scale(&self, entity: Entity) -> EcsResult<Vec3> {
        let mut scale = Vec3::ONE;
        let mut current = Some(entity);
        while let Some(e) = current {
            let transform = self.transform(e)?;
            scale *= transform.local_scale();
            current = transform.parent();
        }
        Ok(scale)
    }

    /// World-space forward direction (negative Z)
    pub fn forward(&self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.rotation(entity)? * Vec3::NEG_Z)
    }

    /// World-space right direction (positive X)
    pub fn right(&self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.rotation(entity)? * Vec3::X)
    }

    /// World-space up direction (positive Y)
    pub fn up(&self, entity: Entity) -> EcsResult<Vec3> {
        Ok(self.rotation(entity)? * Vec3::Y)
    }

    // -------------------------------------------------------------------------
    // Space conversion
    // -------------------------------------------------------------------------

    /// Local point to world space (position, rotation and scale apply)
    pub fn transform_point(&mut self, entity: Entity, point: Vec3) -> EcsResult<Vec3> {
        Ok(self.local_to_world_matrix(entity)?.transform_point3(point))
    }

    /// World point to local space
    pub fn inverse_transform_point(&mut self, entity: Entity, point: Vec3) -> EcsResult<Vec3> {
        Ok(self.world_to_local_matrix(entity)?.transform_point3(point))
    }

    /// Local vector to world space (rotation and scale apply)
    pub fn transform_vector(&mut self, entity: Entity, vector: Vec3) -> EcsResult<Vec3> {
        Ok(self.local_to_world_matrix(entity)?.transform_vector3(vector))
    }

    /// World vector to local space
    pub fn inverse_transform_vector(&mut self, entity: Entity, vector: Vec3) -> EcsResult<Vec3> {
        Ok(self.world_to_local_matrix(entity)?.transform_vector3(vector))
    }

    /// Local direction to world space (rotation only)
    pub fn transform_direction(&self, entity: Entity, direction: Vec3) -> EcsResult<Vec3> {
        Ok(self.rotation(entity)? * direction)
    }

    /// World direction to local space (rotation only)
    pub fn inverse_transform_direction(&self, entity: Entity, direction: Vec3) -> EcsResult<Vec3> {
        Ok(self.rotation(entity)?.inverse() * direction)
    }

    // -------------------------------------------------------------------------
    // Relative motion
    // -------------------------------------------------------------------------

    /// Move by `delta`, expressed in world axes or in the transform's own axes
    pub fn translate(&mut self, entity: Entity, delta: Vec3, space: Space) -> EcsResult<()> {
        let delta = match space {
            Space::World => delta,
            Space::Local => self.transform_direction(entity, delta)?,
        };
        let position = self.position(entity)?;
        self.set_position(entity, position + delta)
    }

    /// Apply `rotation` about the world axes or about the transform's own axes
    pub fn rotate(&mut self, entity: Entity, rotation: Quat, space: Space) -> EcsResult<()> {
        match space {
            Space::Local => {
                let local = self.local_rotation(entity)?;
                self.set_local_rotation(entity, local * rotation)
            }
            Space::World => {
                let world = self.rotation(entity)?;
                self.set_rotation(entity, rotation * world)
            }
        }
    }

    /// Rotate so forward points at `target`. Does nothing if the target is
    /// at the transform's own position.
    pub fn look_at(&mut self, entity: Entity, target: Vec3, up: Vec3) -> EcsResult<()> {
        let position = self.position(entity)?;
        if (target - position).length_squared() < f32::EPSILON {
            return Ok(());
        }
        let rotation = Quat::from_mat4(&Mat4::look_at_rh(position, target, up)).inverse();
        self.set_rotation(entity, rotation)
    }

    // -------------------------------------------------------------------------
    // Hierarchy
    // -------------------------------------------------------------------------

    /// Parent entity, if any
    pub fn parent(&self, entity: Entity) -> EcsResult<Option<Entity>> {
        Ok(self.transform(entity)?.parent())
    }

    /// Number of direct children
    pub fn child_count(&self, entity: Entity) -> EcsResult<usize> {
        Ok(self.transform(entity)?.child_count())
    }

    /// Child at `index` in sibling order
    pub fn child(&self, entity: Entity, index: usize) -> EcsResult<Entity> {
        let transform = self.transform(entity)?;
        transform
            .children()
            .get(index)
            .copied()
            .ok_or(EcsError::ChildIndexOutOfRange {
                index,
                count: transform.child_count(),
            })
    }

    /// Direct children in sibling order
    pub fn children(&self, entity: Entity) -> EcsResult<Vec<Entity>> {
        Ok(self.transform(entity)?.children().to_vec())
    }

    /// Topmost ancestor (the entity itself for roots)
    pub fn root(&self, entity: Entity) -> EcsResult<Entity> {
        let mut current = entity;
        while let Some(parent) = self.transform(current)?.parent() {
            current = parent;
        }
        Ok(current)
    }

    /// Whether `entity` is `ancestor` or lies below it
    pub fn is_child_of(&self, entity: Entity, ancestor: Entity) -> EcsResult<bool> {
        let mut current = Some(entity);
        while let Some(e) = current {
            if e == ancestor {
                return Ok(true);
            }
            current = self.transform(e)?.parent();
        }
        Ok(false)
    }

    /// Move under `parent` (or to the root when `None`).
    ///
    /// With `keep_world_transform` the world position and rotation recorded
    /// before the move are restored under the new parent. Fails without
    /// changing anything if the move would create a cycle.
    pub fn set_parent(
        &mut self,
        entity: Entity,
        parent: Option<Entity>,
        keep_world_transform: bool,
    ) -> EcsResult<()> {
        let old_parent = self.transform(entity)?.parent();
        if let Some(parent) = parent {
            self.ensure_entity(parent)?;
            if self.is_child_of(parent, entity)? {
                return Err(EcsError::HierarchyCycle {
                    child: entity,
                    parent,
                });
            }
        }

        if old_parent == parent {
            self.invalidate(entity);
            return Ok(());
        }

        let world_pose = if keep_world_transform {
            Some((self.position(entity)?, self.rotation(entity)?))
        } else {
            None
        };

        if let Some(old) = old_parent {
            if let Ok(mut old) = self.transform_mut(old) {
                old.remove_child(entity);
            }
        }
        self.transform_mut(entity)?.set_parent_link(parent);
        if let Some(parent) = parent {
            self.transform_mut(parent)?.push_child(entity);
        }
        self.invalidate(entity);

        if let Some((position, rotation)) = world_pose {
            self.set_position(entity, position)?;
            self.set_rotation(entity, rotation)?;
        }

        log::debug!("reparent {entity:?}: {old_parent:?} -> {parent:?}");
        Ok(())
    }

    /// Unparent every child, keeping their world poses
    pub fn detach_children(&mut self, entity: Entity) -> EcsResult<()> {
        for child in self.children(entity)? {
            self.set_parent(child, None, true)?;
        }
        Ok(())
    }

    /// Position among the parent's children (0 for roots)
    pub fn sibling_index(&self, entity: Entity) -> EcsResult<usize> {
        let Some(parent) = self.parent(entity)? else {
            return Ok(0);
        };
        Ok(self
            .transform(parent)?
            .sibling_index_of(entity)
            .unwrap_or_default())
    }

    /// Move among the parent's children; indices past the end are clamped.
    /// Does nothing for roots.
    pub fn set_sibling_index(&mut self, entity: Entity, index: usize) -> EcsResult<()> {
        if let Some(parent) = self.parent(entity)? {
            self.transform_mut(parent)?.move_child(entity, index);
        }
        Ok(())
    }

    /// Move to the front of the parent's children
    pub fn set_as_first_sibling(&mut self, entity: Entity) -> EcsResult<()> {
        self.set_sibling_index(entity, 0)
    }

    /// Move to the back of the parent's children
    pub fn set_as_last_sibling(&mut self, entity: Entity) -> EcsResult<()> {
        self.set_sibling_index(entity, usize::MAX)
    }

    /// Depth-first search of the descendants (never the entity itself) for
    /// an exact name
    pub fn find(&self, entity: Entity, name: &str) -> Option<Entity> {
        let mut stack: Vec<Entity> = self.children(entity).ok()?.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if self.info(current).is_ok_and(|info| info.name() == name) {
                return Some(current);
            }
            if let Ok(transform) = self.transform(current) {
                stack.extend(transform.children().iter().rev().copied());
            }
        }
        None
    }

    /// The entity and every descendant, pre-order
    pub(crate) fn subtree(&self, entity: Entity) -> Vec<Entity> {
        let mut nodes = Vec::new();
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            let Ok(transform) = self.transform(current) else {
                continue;
            };
            nodes.push(current);
            stack.extend(transform.children().iter().rev().copied());
        }
        nodes
    }

    /// Sever the link to the parent without touching the local pose
    pub(crate) fn unlink_from_parent(&mut self, entity: Entity) {
        let Ok(parent) = self.parent(entity) else {
            return;
        };
        if let Some(parent) = parent {
            if let Ok(mut parent) = self.transform_mut(parent) {
                parent.remove_child(entity);
            }
            if let Ok(mut transform) = self.transform_mut(entity) {
                transform.set_parent_link(None);
            }
            self.invalidate(entity);
        }
    }
}
