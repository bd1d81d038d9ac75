//! Core engine module
//!
//! Contains the frame driver, its configuration and timing, and the scene
//! registry

mod engine;
mod scene;
mod time;

pub use engine::{ConfigError, Engine, EngineConfig};
pub use scene::{Scene, SceneError, SceneHandle, SceneRegistry};
pub use time::Time;
