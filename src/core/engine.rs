//! Engine configuration and headless frame driver

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{SceneRegistry, Time};
use crate::ecs::World;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one fixed update step in seconds
    pub fixed_timestep: f32,
    /// Upper bound on fixed update passes in a single frame
    pub max_fixed_steps_per_frame: u32,
    /// Frame deltas longer than this (seconds) are clamped
    pub max_delta: f32,
    /// Multiplier applied to every frame delta
    pub time_scale: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 0.02,
            max_fixed_steps_per_frame: 8,
            max_delta: 0.25,
            time_scale: 1.0,
        }
    }
}

impl EngineConfig {
    /// Set the fixed update step
    pub fn with_fixed_timestep(mut self, seconds: f32) -> Self {
        self.fixed_timestep = seconds;
        self
    }

    /// Set the fixed update cap per frame
    pub fn with_max_fixed_steps(mut self, steps: u32) -> Self {
        self.max_fixed_steps_per_frame = steps;
        self
    }

    /// Set the frame delta clamp
    pub fn with_max_delta(mut self, seconds: f32) -> Self {
        self.max_delta = seconds;
        self
    }

    /// Set the time scale
    pub fn with_time_scale(mut self, scale: f32) -> Self {
        self.time_scale = scale;
        self
    }

    /// Parse a config from RON text. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }
}

/// Errors that can occur while loading a config
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Config text is not valid RON
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Headless engine: owns the world, the scenes and the frame clock, and
/// runs the lifecycle passes in order on every tick.
pub struct Engine {
    config: EngineConfig,
    world: World,
    scenes: SceneRegistry,
    time: Time,
}

impl Engine {
    /// Create an engine with an empty world
    pub fn new(config: EngineConfig) -> Self {
        let mut time = Time::new(config.fixed_timestep, config.max_delta);
        time.set_time_scale(config.time_scale);
        log::info!(
            "Starting engine (fixed step {:.3}s, max {} steps/frame)",
            config.fixed_timestep,
            config.max_fixed_steps_per_frame
        );
        Self {
            config,
            world: World::new(),
            scenes: SceneRegistry::new(),
            time,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Entity world
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Entity world, mutably
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Scene registry
    pub fn scenes(&self) -> &SceneRegistry {
        &self.scenes
    }

    /// Scene registry, mutably
    pub fn scenes_mut(&mut self) -> &mut SceneRegistry {
        &mut self.scenes
    }

    /// Borrow the world and the scene registry together
    pub fn split_mut(&mut self) -> (&mut World, &mut SceneRegistry) {
        (&mut self.world, &mut self.scenes)
    }

    /// Frame clock
    pub fn time(&self) -> &Time {
        &self.time
    }

    /// Change the time scale for subsequent frames
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time.set_time_scale(scale);
    }

    /// Run one frame.
    ///
    /// Order: awake, start, update, late update, then zero or more fixed
    /// updates for the accumulated fixed-step time, then a final flush of
    /// deferred destroys and pruning of dead scene roots. Returns the number
    /// of fixed steps run.
    pub fn tick(&mut self, frame: Duration) -> u32 {
        if self.time.advance(frame) {
            log::warn!(
                "Frame took {:.3}s, clamped to {:.3}s",
                frame.as_secs_f32(),
                self.config.max_delta
            );
        }
        self.world
            .set_frame_times(self.time.delta(), self.time.fixed_timestep());

        self.world.process_awake();
        self.world.process_start();
        self.world.process_update();
        self.world.process_late_update();

        let (steps, dropped) = self
            .time
            .consume_fixed_steps(self.config.max_fixed_steps_per_frame);
        if dropped {
            log::warn!(
                "Fixed update fell behind, dropping backlog after {steps} steps"
            );
        }
        for _ in 0..steps {
            self.world.process_fixed_update();
        }

        self.world.flush_destroyed();
        self.scenes.prune_dead_roots(&self.world);
        log::trace!("frame {} done ({steps} fixed steps)", self.time.frame_count());
        steps
    }

    /// Run `count` frames of equal length
    pub fn run_frames(&mut self, count: u32, frame: Duration) {
        for _ in 0..count {
            self.tick(frame);
        }
    }

    /// Destroy every entity and scene and restart the clock
    pub fn shutdown(&mut self) {
        log::info!(
            "Shutting down after {} frames ({} entities alive)",
            self.time.frame_count(),
            self.world.entity_count()
        );
        self.scenes.clear();
        self.world.reset();
        let scale = self.time.time_scale();
        self.time = Time::new(self.config.fixed_timestep, self.config.max_delta);
        self.time.set_time_scale(scale);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ecs::{Behavior, BehaviorContext, Component, LifecycleHook};

    type Log = Rc<RefCell<Vec<LifecycleHook>>>;

    struct Recorder(Log);

    impl Component for Recorder {}

    impl Behavior for Recorder {
        fn awake(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.0.borrow_mut().push(LifecycleHook::Awake);
        }
        fn start(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.0.borrow_mut().push(LifecycleHook::Start);
        }
        fn update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.0.borrow_mut().push(LifecycleHook::Update);
        }
        fn late_update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.0.borrow_mut().push(LifecycleHook::LateUpdate);
        }
        fn fixed_update(&mut self, _ctx: &mut BehaviorContext<'_>) {
            self.0.borrow_mut().push(LifecycleHook::FixedUpdate);
        }
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = EngineConfig::default()
            .with_fixed_timestep(0.01)
            .with_max_fixed_steps(3)
            .with_time_scale(2.0);

        assert_eq!(config.fixed_timestep, 0.01);
        assert_eq!(config.max_fixed_steps_per_frame, 3);
        assert_eq!(config.max_delta, 0.25);
        assert_eq!(config.time_scale, 2.0);
    }

    #[test]
    fn test_config_from_ron_fills_defaults() {
        let config = EngineConfig::from_ron_str("(fixed_timestep: 0.05)").unwrap();
        assert_eq!(config.fixed_timestep, 0.05);
        assert_eq!(config.max_fixed_steps_per_frame, 8);

        assert!(matches!(
            EngineConfig::from_ron_str("(fixed_timestep: \"fast\")"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_missing_file_is_io_error() {
        let result = EngineConfig::load_ron("/definitely/not/here/engine.ron");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_tick_runs_phases_in_order() {
        let mut engine = Engine::new(EngineConfig::default().with_fixed_timestep(0.02));
        let log: Log = Rc::default();
        let entity = engine.world_mut().create_entity("tracked");
        engine
            .world_mut()
            .add_behavior(entity, Recorder(log.clone()))
            .unwrap();

        let steps = engine.tick(Duration::from_millis(45));

        use LifecycleHook::*;
        assert_eq!(steps, 2);
        assert_eq!(
            *log.borrow(),
            vec![Awake, Start, Update, LateUpdate, FixedUpdate, FixedUpdate]
        );
    }

    #[test]
    fn test_fixed_steps_are_capped() {
        let config = EngineConfig::default()
            .with_fixed_timestep(0.01)
            .with_max_fixed_steps(3)
            .with_max_delta(1.0);
        let mut engine = Engine::new(config);

        assert_eq!(engine.tick(Duration::from_millis(100)), 3);
        // Backlog was dropped, so a short frame does not catch up
        assert_eq!(engine.tick(Duration::from_millis(5)), 0);
    }

    #[test]
    fn test_frame_times_visible_to_world() {
        let mut engine = Engine::new(EngineConfig::default().with_time_scale(0.5));
        engine.tick(Duration::from_millis(100));

        assert!((engine.world().delta_time() - 0.05).abs() < 1e-6);
        assert_eq!(engine.world().fixed_delta_time(), 0.02);
        assert_eq!(engine.time().frame_count(), 1);
    }

    #[test]
    fn test_tick_flushes_deferred_destroys() {
        let mut engine = Engine::default();
        let entity = engine.world_mut().create_entity("doomed");
        engine.world_mut().destroy(entity);

        engine.tick(Duration::from_millis(16));
        assert!(!engine.world().contains(entity));
    }

    #[test]
    fn test_tick_prunes_destroyed_scene_roots() {
        let mut engine = Engine::default();
        let scene = engine.scenes_mut().create_scene("Main").unwrap();
        let (world, scenes) = engine.split_mut();
        let keep = world.create_entity("keep");
        let doomed = world.create_entity("doomed");
        scenes.add_root_entity(world, scene, keep).unwrap();
        scenes.add_root_entity(world, scene, doomed).unwrap();
        world.destroy(doomed);

        engine.tick(Duration::from_millis(16));
        assert_eq!(engine.scenes().scene(scene).unwrap().registered_roots(), &[keep]);
    }

    #[test]
    fn test_shutdown_clears_world_and_scenes() {
        let mut engine = Engine::default();
        let scene = engine.scenes_mut().create_scene("Main").unwrap();
        let (world, scenes) = engine.split_mut();
        let entity = world.create_entity("root");
        scenes.add_root_entity(world, scene, entity).unwrap();
        engine.run_frames(3, Duration::from_millis(16));

        engine.shutdown();
        assert_eq!(engine.world().entity_count(), 0);
        assert_eq!(engine.scenes().scene_count(), 0);
        assert_eq!(engine.time().frame_count(), 0);
    }
}
