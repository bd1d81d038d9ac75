//! Transform record with cached world matrices
//!
//! The local position, rotation and scale are authoritative. The
//! local-to-world matrix and its inverse are derived from them and from the
//! parent's world matrix, and are only valid while the dirty flag is clear.
//!
//! # Design Principles
//!
//! - **Lazy Evaluation**: matrices are recomputed on the first read after a change
//! - **Automatic Invalidation**: every local write marks the record dirty
//! - **Hierarchy-Aware**: the [`World`](super::World) propagates dirtiness to
//!   descendants, since a record only knows its own links
//!
//! Reading world-space values goes through the world (see `hierarchy.rs`),
//! which refreshes stale ancestors top-down before touching this record.

use glam::{Mat4, Quat, Vec3};
use hecs::Entity;
use smallvec::SmallVec;

/// Spatial component present on every entity.
#[derive(Debug, Clone)]
pub struct Transform {
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,

    parent: Option<Entity>,
    children: SmallVec<[Entity; 8]>,

    /// Cached local-to-world matrix (parent world * local TRS)
    local_to_world: Mat4,
    /// Cached inverse of `local_to_world`
    world_to_local: Mat4,
    /// Whether the cached matrices are stale
    dirty: bool,
}

impl Transform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Local state
    // -------------------------------------------------------------------------

    /// Position relative to the parent.
    #[must_use]
    #[inline]
    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    /// Rotation relative to the parent.
    #[must_use]
    #[inline]
    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    /// Scale relative to the parent.
    #[must_use]
    #[inline]
    pub fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    /// Local scale-rotation-translation matrix.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.local_scale,
            self.local_rotation,
            self.local_position,
        )
    }

    pub(crate) fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
    }

    pub(crate) fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation.normalize();
    }

    pub(crate) fn set_local_scale(&mut self, scale: Vec3) {
        self.local_scale = scale;
    }

    // -------------------------------------------------------------------------
    // Links
    // -------------------------------------------------------------------------

    /// Parent transform, if any.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    /// Children in sibling order.
    #[must_use]
    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<Entity>) {
        self.parent = parent;
    }

    pub(crate) fn push_child(&mut self, child: Entity) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: Entity) -> bool {
        if let Some(pos) = self.children.iter().position(|&e| e == child) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn sibling_index_of(&self, child: Entity) -> Option<usize> {
        self.children.iter().position(|&e| e == child)
    }

    /// Move `child` to `index`, clamped to the valid range.
    pub(crate) fn move_child(&mut self, child: Entity, index: usize) {
        if let Some(pos) = self.sibling_index_of(child) {
            self.children.remove(pos);
            let index = index.min(self.children.len());
            self.children.insert(index, child);
        }
    }

    // -------------------------------------------------------------------------
    // Cache state
    // -------------------------------------------------------------------------

    /// Whether the cached matrices are stale.
    #[must_use]
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cached local-to-world matrix, or `None` when it is stale.
    #[must_use]
    pub fn cached_local_to_world(&self) -> Option<Mat4> {
        (!self.dirty).then_some(self.local_to_world)
    }

    /// Mark the cache stale. Returns `true` if it was clean before, meaning
    /// the caller still has to visit the children.
    pub(crate) fn mark_dirty(&mut self) -> bool {
        let was_clean = !self.dirty;
        self.dirty = true;
        was_clean
    }

    /// Recompute the cached matrices against an up-to-date parent matrix.
    pub(crate) fn refresh(&mut self, parent_local_to_world: Mat4) -> Mat4 {
        if self.dirty {
            self.local_to_world = parent_local_to_world * self.local_matrix();
            self.world_to_local = self.local_to_world.inverse();
            self.dirty = false;
        }
        self.local_to_world
    }

    /// Both cached matrices; only meaningful after `refresh`.
    pub(crate) fn matrices(&self) -> (Mat4, Mat4) {
        (self.local_to_world, self.world_to_local)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_scale: Vec3::ONE,
            parent: None,
            children: SmallVec::new(),
            local_to_world: Mat4::IDENTITY,
            world_to_local: Mat4::IDENTITY,
            dirty: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_default() {
        let t = Transform::new();

        assert_eq!(t.local_position(), Vec3::ZERO);
        assert_eq!(t.local_rotation(), Quat::IDENTITY);
        assert_eq!(t.local_scale(), Vec3::ONE);
        assert!(t.parent().is_none());
        assert!(t.is_dirty());
        assert!(t.cached_local_to_world().is_none());
    }

    #[test]
    fn test_transform_refresh_composes_parent() {
        let mut t = Transform::new();
        t.set_local_position(Vec3::new(1.0, 0.0, 0.0));

        let parent = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let world = t.refresh(parent);

        assert!((world.w_axis.truncate() - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
        assert!(!t.is_dirty());

        let (l2w, w2l) = t.matrices();
        assert!((l2w * w2l).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_transform_refresh_is_noop_when_clean() {
        let mut t = Transform::new();
        let first = t.refresh(Mat4::IDENTITY);

        // A different parent matrix is ignored until the record is dirtied
        let second = t.refresh(Mat4::from_translation(Vec3::X));
        assert_eq!(first, second);

        assert!(t.mark_dirty());
        assert!(!t.mark_dirty());
        let third = t.refresh(Mat4::from_translation(Vec3::X));
        assert_eq!(third.w_axis.truncate(), Vec3::X);
    }

    #[test]
    fn test_transform_children_order() {
        let mut world = hecs::World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let c = world.spawn(());

        let mut t = Transform::new();
        t.push_child(a);
        t.push_child(b);
        t.push_child(c);
        // No duplicates
        t.push_child(a);
        assert_eq!(t.child_count(), 3);

        t.move_child(c, 0);
        assert_eq!(t.children(), &[c, a, b]);

        t.move_child(c, 99);
        assert_eq!(t.children(), &[a, b, c]);

        assert!(t.remove_child(b));
        assert!(!t.remove_child(b));
        assert_eq!(t.sibling_index_of(c), Some(1));
    }
}
