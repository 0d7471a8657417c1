//! # Composition
//!
//! Shots are composited from their rendered layers; scenes, sequences and the
//! outline are joined from their children's clips. Durations are resolved per
//! shot before any video layer is rendered.

pub mod duration;
pub mod engine;
pub mod shot;

// Re-exports for convenience
pub use duration::DurationResolver;
pub use engine::{CompositionEngine, NodeLevel, NodeSelector};
pub use shot::ShotCompositor;
