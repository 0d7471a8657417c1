//! # Project Model
//!
//! The clip tree handed over by the script and art-direction agents:
//! outline → sequence → scene → shot, with media layers on the shots only.
//! The renderer reads the structure and only ever writes layer durations.

pub mod loader;
pub mod types;
pub mod validate;

pub use loader::ProjectLoader;
pub use types::{
    Layer, LayerKind, MusicLayer, Outline, ResolvedLayer, Scene, Sequence, Shot, VideoLayer,
    VoiceOverLayer,
};
