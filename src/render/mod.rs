//! # Layer Rendering
//!
//! Turns one layer into one media artifact, consulting a per-layer parameter
//! record first so that unchanged layers are never regenerated.

pub mod cache;
pub mod renderer;

pub use cache::{CachedRecord, ImageParams, LayerCache, LayerParams};
pub use renderer::{LayerRenderer, RenderStats};
