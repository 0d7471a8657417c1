//! # Narrative-Compositor
//!
//! Render a narrative video from a clip tree of generated media layers, and
//! only regenerate what actually changed.
//!
//! A project is an outline of sequences, scenes and shots. Shots own media
//! layers (still-image video, narration, music). Each layer is produced by an
//! external generator and an external encoder, both far too slow to rerun
//! needlessly, so every artifact is paired with a record of the parameters
//! that produced it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use narrative_compositor::{
//!     composition::CompositionEngine,
//!     config::Config,
//!     project::ProjectLoader,
//! };
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut outline = ProjectLoader::load("story.json")?;
//! outline.validate()?;
//!
//! let engine = CompositionEngine::from_config(Config::default());
//! let video = engine.render_outline(&mut outline, Path::new("render/")).await?;
//! println!("{}", video.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`project`] - Clip tree types, loading and validation
//! - [`composition`] - Duration resolution, shot compositing and the tree walk
//! - [`render`] - Per-layer rendering behind a parameter cache
//! - [`generators`] - Image and speech generator backends
//! - [`encoder`] - The external media encoder
//! - [`audio`] - Audio length measurement
//! - [`config`] - Configuration management

pub mod audio;
pub mod composition;
pub mod config;
pub mod encoder;
pub mod error;
pub mod generators;
pub mod project;
pub mod render;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionEngine, NodeSelector},
    config::Config,
    error::{CompositorError, Result},
    project::{Outline, ProjectLoader},
};
