//! Headless demo: a small orbiting hierarchy driven by behaviors
//!
//! Usage: `scenegraph [config.ron]`

use std::time::Duration;

use scenegraph::prelude::*;

/// Spins its entity about the local Y axis
struct Spinner {
    radians_per_second: f32,
}

impl Component for Spinner {}

impl Behavior for Spinner {
    fn update(&mut self, ctx: &mut BehaviorContext<'_>) {
        let entity = ctx.entity();
        let angle = self.radians_per_second * ctx.delta_time();
        if let Err(err) = ctx.rotate(entity, Quat::from_rotation_y(angle), Space::Local) {
            log::error!("spinner lost its entity: {err}");
        }
    }
}

/// Destroys its entity after a fixed amount of simulated time
struct Lifetime {
    remaining: f32,
}

impl Component for Lifetime {}

impl Behavior for Lifetime {
    fn fixed_update(&mut self, ctx: &mut BehaviorContext<'_>) {
        self.remaining -= ctx.fixed_delta_time();
        if self.remaining <= 0.0 {
            let entity = ctx.entity();
            log::info!("{} expired", ctx.name(entity).unwrap_or_default());
            ctx.destroy(entity);
        }
    }

    fn on_destroy(&mut self, _ctx: &mut BehaviorContext<'_>) {
        log::debug!("lifetime torn down");
    }
}

/// Logs the world position of a tracked entity every few frames
struct Reporter {
    target: Entity,
    every: u32,
    frames: u32,
}

impl Component for Reporter {}

impl Behavior for Reporter {
    fn start(&mut self, ctx: &mut BehaviorContext<'_>) {
        let name = ctx.name(self.target).unwrap_or_default();
        log::info!("tracking {name}");
    }

    fn late_update(&mut self, ctx: &mut BehaviorContext<'_>) {
        self.frames += 1;
        if self.frames % self.every != 0 {
            return;
        }
        match ctx.position(self.target) {
            Ok(position) => log::info!("frame {}: moon at {position:.2}", self.frames),
            Err(_) => {
                log::info!("target gone, reporter disabling itself");
                ctx.set_enabled(false);
            }
        }
    }
}

fn build_scene(engine: &mut Engine) -> EcsResult<()> {
    let (world, scenes) = engine.split_mut();

    let sun = world.create_entity("Sun");
    world.add_behavior(sun, Spinner { radians_per_second: 0.5 })?;

    let planet = world.create_child(sun, "Planet")?;
    world.set_local_position(planet, Vec3::new(10.0, 0.0, 0.0))?;
    world.add_behavior(planet, Spinner { radians_per_second: 2.0 })?;

    let moon = world.create_child(planet, "Moon")?;
    world.set_local_position(moon, Vec3::new(2.0, 0.0, 0.0))?;
    world.set_local_scale(moon, Vec3::splat(0.25))?;
    world.add_behavior(moon, Lifetime { remaining: 1.5 })?;

    let observer = world.create_entity("Observer");
    world.set_tag(observer, "Observer")?;
    world.add_behavior(
        observer,
        Reporter {
            target: moon,
            every: 30,
            frames: 0,
        },
    )?;

    match scenes.create_scene("SolarSystem") {
        Ok(scene) => {
            for root in [sun, observer] {
                if let Err(err) = scenes.add_root_entity(world, scene, root) {
                    log::warn!("could not register root: {err}");
                }
            }
        }
        Err(err) => log::warn!("{err}"),
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::load_ron(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{path}: {err}");
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let mut engine = Engine::new(config);
    if let Err(err) = build_scene(&mut engine) {
        log::error!("failed to build scene: {err}");
        std::process::exit(1);
    }

    engine.run_frames(120, Duration::from_micros(16_667));

    if let Some(sun) = engine.world().find_entity("Sun") {
        let planet = engine.world().find(sun, "Planet");
        log::info!(
            "after {} frames: {} entities, planet present: {}",
            engine.time().frame_count(),
            engine.world().entity_count(),
            planet.is_some()
        );
    }
    engine.shutdown();
}
