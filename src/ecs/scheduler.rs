//! Lifecycle phase scheduling for behaviors
//!
//! Behaviors enter a pending queue when they are added. The frame driver
//! then calls the phase passes once per frame, in this order:
//!
//! | Pass                    | Hooks                 | Runs for                               |
//! |-------------------------|-----------------------|----------------------------------------|
//! | `process_awake`         | awake, on_enable      | the pending batch taken at entry       |
//! | `process_start`         | start                 | awoken, not started, enabled, active   |
//! | `process_update`        | update                | started, enabled, active               |
//! | `process_late_update`   | late_update           | started, enabled, active               |
//! | `process_fixed_update`  | fixed_update          | started, enabled, active (0..n a frame)|
//!
//! Each pass is a barrier: every behavior finishes one phase before any
//! behavior enters the next. Queued destructions are flushed at the end of
//! every pass.

use rustc_hash::FxHashSet;

use super::behavior::LifecycleHook;
use super::components::ComponentId;
use super::world::World;

/// Pending and active behavior sets.
#[derive(Debug, Default)]
pub struct LifecycleScheduler {
    /// Added since the last awake pass, in registration order
    pending: Vec<ComponentId>,
    /// Awoken behaviors, in awake order
    active: Vec<ComponentId>,
    /// Membership of both lists
    registered: FxHashSet<ComponentId>,
}

impl LifecycleScheduler {
    /// Create an empty scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every registered behavior
    pub fn reset(&mut self) {
        self.pending.clear();
        self.active.clear();
        self.registered.clear();
    }

    /// Queue a behavior for the next awake pass. Returns `false` if it was
    /// already registered.
    pub fn register(&mut self, id: ComponentId) -> bool {
        if !self.registered.insert(id) {
            return false;
        }
        self.pending.push(id);
        true
    }

    /// Remove a behavior from both sets. Returns `false` if it was unknown.
    pub fn unregister(&mut self, id: ComponentId) -> bool {
        if !self.registered.remove(&id) {
            return false;
        }
        self.pending.retain(|&p| p != id);
        self.active.retain(|&a| a != id);
        true
    }

    /// Check whether a behavior is pending or active
    #[must_use]
    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.registered.contains(&id)
    }

    /// Behaviors waiting for the next awake pass
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Behaviors that have been through an awake pass
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Swap the pending queue for an empty one
    fn take_pending(&mut self) -> Vec<ComponentId> {
        std::mem::take(&mut self.pending)
    }

    fn activate(&mut self, id: ComponentId) {
        self.active.push(id);
    }

    /// Copy of the active set, so passes tolerate removal mid-iteration
    fn active_snapshot(&self) -> Vec<ComponentId> {
        self.active.clone()
    }
}

impl World {
    /// Awake every behavior pending at entry, then enable the enabled ones.
    ///
    /// Behaviors added by these hooks stay pending until the next call.
    pub fn process_awake(&mut self) {
        let batch = self.scheduler.take_pending();
        if !batch.is_empty() {
            log::debug!("awake pass: {} behaviors", batch.len());
        }

        for id in batch {
            if !self.scheduler.is_registered(id) || !self.is_live_behavior(id) {
                continue;
            }
            self.scheduler.activate(id);
            self.dispatch(id, &[LifecycleHook::Awake]);

            // `enabled` is read after awake returns; awake may have cleared it
            let enabled = match self
                .components
                .get_mut(id)
                .filter(|r| !r.destroyed)
                .and_then(|r| r.behavior_state_mut())
            {
                Some(state) => {
                    state.has_awoken = true;
                    state.enabled
                }
                None => continue,
            };
            if enabled {
                self.dispatch(id, &[LifecycleHook::OnEnable]);
            }
        }

        self.flush_destroyed();
    }

    /// Start every awoken behavior that is enabled, active in hierarchy and
    /// not yet started. Skipped behaviors are retried on later calls.
    pub fn process_start(&mut self) {
        for id in self.scheduler.active_snapshot() {
            let ready = self
                .behavior_state(id)
                .is_ok_and(|s| s.has_awoken && !s.has_started && s.enabled)
                && self.owner_active(id);
            if !ready {
                continue;
            }
            if let Some(state) = self
                .components
                .get_mut(id)
                .and_then(|r| r.behavior_state_mut())
            {
                state.has_started = true;
            }
            self.dispatch(id, &[LifecycleHook::Start]);
        }

        self.flush_destroyed();
    }

    /// Run `update` on every started, enabled and active behavior
    pub fn process_update(&mut self) {
        self.run_phase(LifecycleHook::Update);
    }

    /// Run `late_update` on every started, enabled and active behavior
    pub fn process_late_update(&mut self) {
        self.run_phase(LifecycleHook::LateUpdate);
    }

    /// Run `fixed_update` on every started, enabled and active behavior
    pub fn process_fixed_update(&mut self) {
        self.run_phase(LifecycleHook::FixedUpdate);
    }

    fn run_phase(&mut self, hook: LifecycleHook) {
        for id in self.scheduler.active_snapshot() {
            // Checked per behavior: earlier hooks in this pass may have
            // disabled, deactivated or destroyed it
            let runnable = self
                .behavior_state(id)
                .is_ok_and(|s| s.has_started && s.enabled)
                && self.owner_active(id);
            if runnable {
                self.dispatch(id, &[hook]);
            }
        }

        self.flush_destroyed();
    }

    fn is_live_behavior(&self, id: ComponentId) -> bool {
        self.components
            .get(id)
            .is_some_and(|r| !r.destroyed && r.is_behavior())
    }

    fn owner_active(&self, id: ComponentId) -> bool {
        self.component_owner(id)
            .is_some_and(|owner| self.active_in_hierarchy(owner).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ecs::{Behavior, BehaviorContext, Component};

    /// (behavior label, hook) pairs in invocation order
    type Log = Rc<RefCell<Vec<(&'static str, LifecycleHook)>>>;

    struct Tracker {
        label: &'static str,
        log: Log,
    }

    impl Tracker {
        fn record(&self, hook: LifecycleHook) {
            self.log.borrow_mut().push((self.label, hook));
        }
    }

    impl Component for Tracker {}

    impl Behavior for Tracker {
        fn awake(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::Awake);
        }
        fn on_enable(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::OnEnable);
        }
        fn start(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::Start);
        }
        fn update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::Update);
        }
        fn late_update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::LateUpdate);
        }
        fn fixed_update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::FixedUpdate);
        }
        fn on_disable(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::OnDisable);
        }
        fn on_destroy(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.record(LifecycleHook::OnDestroy);
        }
    }

    /// Spawns a child tracker from inside its own awake
    struct Spawner {
        log: Log,
    }

    impl Component for Spawner {}

    impl Behavior for Spawner {
        fn awake(&mut self, ctx: &mut BehaviorContext<'_>) {
            self.log.borrow_mut().push(("spawner", LifecycleHook::Awake));
            let me = ctx.entity();
            let child = ctx.create_child(me, "spawned").unwrap();
            let tracker = Tracker {
                label: "spawned",
                log: Rc::clone(&self.log),
            };
            ctx.add_behavior(child, tracker).unwrap();
        }
    }

    fn tracker(world: &mut World, label: &'static str, log: &Log) -> ComponentId {
        let e = world.create_entity(label);
        world
            .add_behavior(
                e,
                Tracker {
                    label,
                    log: Rc::clone(log),
                },
            )
            .unwrap()
    }

    fn frame(world: &mut World) {
        world.process_awake();
        world.process_start();
        world.process_update();
        world.process_late_update();
    }

    fn hooks_of(log: &Log, label: &str) -> Vec<LifecycleHook> {
        log.borrow()
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|&(_, h)| h)
            .collect()
    }

    #[test]
    fn test_scheduler_register_is_idempotent() {
        let mut slots: slotmap::SlotMap<ComponentId, ()> = slotmap::SlotMap::with_key();
        let id = slots.insert(());
        let mut scheduler = LifecycleScheduler::new();

        assert!(scheduler.register(id));
        assert!(!scheduler.register(id));
        assert_eq!(scheduler.pending_count(), 1);

        assert!(scheduler.unregister(id));
        assert!(!scheduler.unregister(id));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_all_awakes_before_any_start() {
        let mut world = World::new();
        let log = Log::default();
        tracker(&mut world, "b1", &log);
        tracker(&mut world, "b2", &log);

        world.process_awake();
        world.process_start();

        let order: Vec<_> = log.borrow().clone();
        assert_eq!(
            order,
            vec![
                ("b1", LifecycleHook::Awake),
                ("b1", LifecycleHook::OnEnable),
                ("b2", LifecycleHook::Awake),
                ("b2", LifecycleHook::OnEnable),
                ("b1", LifecycleHook::Start),
                ("b2", LifecycleHook::Start),
            ]
        );
    }

    #[test]
    fn test_update_is_a_global_barrier_before_late_update() {
        let mut world = World::new();
        let log = Log::default();
        tracker(&mut world, "b1", &log);
        tracker(&mut world, "b2", &log);
        frame(&mut world);

        let tail: Vec<_> = log.borrow()[6..].to_vec();
        assert_eq!(
            tail,
            vec![
                ("b1", LifecycleHook::Update),
                ("b2", LifecycleHook::Update),
                ("b1", LifecycleHook::LateUpdate),
                ("b2", LifecycleHook::LateUpdate),
            ]
        );
    }

    #[test]
    fn test_hook_sequence_over_frames() {
        let mut world = World::new();
        let log = Log::default();
        let id = tracker(&mut world, "b", &log);

        frame(&mut world);
        frame(&mut world);
        world.set_enabled(id, false).unwrap();
        frame(&mut world);
        world.set_enabled(id, true).unwrap();
        frame(&mut world);

        use LifecycleHook::*;
        assert_eq!(
            hooks_of(&log, "b"),
            vec![
                Awake, OnEnable, Start, Update, LateUpdate, Update, LateUpdate, OnDisable,
                OnEnable, Update, LateUpdate,
            ]
        );
    }

    #[test]
    fn test_disabled_at_awake_skips_enable_and_start() {
        let mut world = World::new();
        let log = Log::default();
        let id = tracker(&mut world, "b", &log);
        world.set_enabled(id, false).unwrap();

        frame(&mut world);
        assert_eq!(hooks_of(&log, "b"), vec![LifecycleHook::Awake]);

        world.set_enabled(id, true).unwrap();
        assert_eq!(
            hooks_of(&log, "b"),
            vec![LifecycleHook::Awake, LifecycleHook::OnEnable]
        );

        // Enabled between passes: no update until start has run
        world.process_update();
        assert_eq!(hooks_of(&log, "b").len(), 2);

        frame(&mut world);
        let hooks = hooks_of(&log, "b");
        assert_eq!(
            hooks.iter().filter(|&&h| h == LifecycleHook::OnEnable).count(),
            1
        );
        assert_eq!(
            &hooks[2..],
            &[
                LifecycleHook::Start,
                LifecycleHook::Update,
                LifecycleHook::LateUpdate
            ]
        );
    }

    #[test]
    fn test_inactive_entity_blocks_start_and_update() {
        let mut world = World::new();
        let log = Log::default();
        let id = tracker(&mut world, "b", &log);
        let owner = world.component_owner(id).unwrap();
        world.set_active(owner, false).unwrap();

        frame(&mut world);
        world.process_fixed_update();
        assert_eq!(
            hooks_of(&log, "b"),
            vec![LifecycleHook::Awake, LifecycleHook::OnEnable]
        );

        world.set_active(owner, true).unwrap();
        world.process_start();
        world.process_fixed_update();
        assert_eq!(
            &hooks_of(&log, "b")[2..],
            &[LifecycleHook::Start, LifecycleHook::FixedUpdate]
        );
    }

    #[test]
    fn test_behaviors_added_during_awake_wait_for_next_pass() {
        let mut world = World::new();
        let log = Log::default();
        let e = world.create_entity("root");
        world
            .add_behavior(e, Spawner { log: Rc::clone(&log) })
            .unwrap();

        world.process_awake();
        assert_eq!(*log.borrow(), vec![("spawner", LifecycleHook::Awake)]);
        assert_eq!(world.scheduler().pending_count(), 1);

        world.process_start();
        world.process_awake();
        assert_eq!(
            hooks_of(&log, "spawned"),
            vec![LifecycleHook::Awake, LifecycleHook::OnEnable]
        );
    }

    #[test]
    fn test_destroyed_behavior_leaves_schedule() {
        let mut world = World::new();
        let log = Log::default();
        let id = tracker(&mut world, "b", &log);
        frame(&mut world);
        assert_eq!(world.scheduler().active_count(), 1);

        let owner = world.component_owner(id).unwrap();
        world.destroy(owner);
        assert_eq!(world.scheduler().active_count(), 1);
        world.process_update();

        assert_eq!(world.scheduler().active_count(), 0);
        world.process_update();
        let hooks = hooks_of(&log, "b");
        assert_eq!(
            &hooks[hooks.len() - 3..],
            &[
                LifecycleHook::Update,
                LifecycleHook::OnDisable,
                LifecycleHook::OnDestroy
            ]
        );
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut world = World::new();
        let log = Log::default();
        tracker(&mut world, "a", &log);
        tracker(&mut world, "b", &log);
        world.process_awake();
        tracker(&mut world, "c", &log);

        world.reset();
        assert_eq!(world.scheduler().pending_count(), 0);
        assert_eq!(world.scheduler().active_count(), 0);
    }
}
