use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::composition::shot::ShotCompositor;
use crate::config::Config;
use crate::encoder::{FfmpegEncoder, MediaEncoder};
use crate::error::{CompositorError, ProjectError, Result};
use crate::generators::GeneratorSet;
use crate::project::{Outline, Scene, Sequence, Shot};
use crate::render::{LayerRenderer, RenderStats};

/// Depth of a node in the clip tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLevel {
    Sequence,
    Scene,
    Shot,
}

impl NodeLevel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Scene => "scene",
            Self::Shot => "shot",
        }
    }

    /// Number of ids from a sequence down to a node of this level
    fn depth(self) -> usize {
        match self {
            Self::Sequence => 1,
            Self::Scene => 2,
            Self::Shot => 3,
        }
    }
}

/// One node of the tree, for partial re-renders
///
/// Ids are only unique among siblings, so a selector may name some of the
/// node's parents too: `scene:C1` matches every scene called `C1`, while
/// `scene:Q2/C1` only matches the one inside sequence `Q2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSelector {
    level: NodeLevel,
    path: Vec<String>,
}

impl NodeSelector {
    pub fn level(&self) -> NodeLevel {
        self.level
    }

    pub fn id(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// `chain` holds the ids from the sequence down to the candidate
    fn matches(&self, level: NodeLevel, chain: &[&str]) -> bool {
        level == self.level
            && chain.len() >= self.path.len()
            && chain
                .iter()
                .rev()
                .zip(self.path.iter().rev())
                .all(|(id, wanted)| *id == wanted.as_str())
    }
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level.name(), self.path.join("/"))
    }
}

/// Parses `<level>:<id>` or `<level>:<parent>/.../<id>`
impl FromStr for NodeSelector {
    type Err = CompositorError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| -> CompositorError {
            ProjectError::InvalidId {
                id: s.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let (level, path) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <level>:<id>"))?;
        let level = match level {
            "sequence" => NodeLevel::Sequence,
            "scene" => NodeLevel::Scene,
            "shot" => NodeLevel::Shot,
            _ => return Err(invalid("level must be sequence, scene or shot")),
        };

        let path: Vec<String> = path.split('/').map(str::to_string).collect();
        if path.iter().any(String::is_empty) {
            return Err(invalid("empty id"));
        }
        if path.len() > level.depth() {
            return Err(invalid("more parents than the level has"));
        }

        Ok(Self { level, path })
    }
}

/// Indices of the node a selector resolved to
struct NodeLocation {
    sequence: usize,
    scene: Option<usize>,
    shot: Option<usize>,
    path: String,
}

impl NodeLocation {
    fn new(sequence: usize, scene: Option<usize>, shot: Option<usize>, chain: &[&str]) -> Self {
        Self {
            sequence,
            scene,
            shot,
            path: chain.join("/"),
        }
    }
}

/// Find the single node `node` selects
fn locate(outline: &Outline, node: &NodeSelector) -> Result<NodeLocation> {
    let mut found = Vec::new();

    for (q, sequence) in outline.sequences.iter().enumerate() {
        let chain = [sequence.id.as_str()];
        if node.matches(NodeLevel::Sequence, &chain) {
            found.push(NodeLocation::new(q, None, None, &chain));
        }

        for (c, scene) in sequence.scenes.iter().enumerate() {
            let chain = [sequence.id.as_str(), scene.id.as_str()];
            if node.matches(NodeLevel::Scene, &chain) {
                found.push(NodeLocation::new(q, Some(c), None, &chain));
            }

            for (h, shot) in scene.shots.iter().enumerate() {
                let chain = [sequence.id.as_str(), scene.id.as_str(), shot.id.as_str()];
                if node.matches(NodeLevel::Shot, &chain) {
                    found.push(NodeLocation::new(q, Some(c), Some(h), &chain));
                }
            }
        }
    }

    match found.len() {
        0 => Err(ProjectError::NodeNotFound { id: node.to_string() }.into()),
        1 => Ok(found.remove(0)),
        _ => Err(ProjectError::AmbiguousNode {
            id: node.to_string(),
            candidates: found
                .iter()
                .map(|location| location.path.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into()),
    }
}

/// Walks the clip tree bottom-up and joins children into their parent's clip
///
/// The pipeline:
/// 1. Shots - resolve durations, render layers, composite
/// 2. Scenes - concatenate shots in order
/// 3. Sequences - concatenate scenes in order
/// 4. Outline - concatenate sequences into the final video
///
/// Every node writes into its own directory:
/// `<output>/sequences/<id>/scenes/<id>/shots/<id>/`.
pub struct CompositionEngine {
    config: Config,
    encoder: Arc<dyn MediaEncoder>,
    renderer: Arc<LayerRenderer>,
    shots: ShotCompositor,
}

impl CompositionEngine {
    pub fn new(config: Config, encoder: Arc<dyn MediaEncoder>, generators: GeneratorSet) -> Self {
        let renderer = Arc::new(LayerRenderer::new(
            encoder.clone(),
            generators,
            config.render.clone(),
        ));
        let shots = ShotCompositor::new(renderer.clone(), encoder.clone(), config.render.clone());

        Self {
            config,
            encoder,
            renderer,
            shots,
        }
    }

    /// Engine backed by ffmpeg and the configured generator backends
    pub fn from_config(config: Config) -> Self {
        let encoder: Arc<dyn MediaEncoder> = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
        let generators = GeneratorSet::from_config(&config.generators);
        Self::new(config, encoder, generators)
    }

    pub fn stats(&self) -> RenderStats {
        self.renderer.stats()
    }

    /// Render the whole project into `dir`, returning the final video
    pub async fn render_outline(&self, outline: &mut Outline, dir: &Path) -> Result<PathBuf> {
        info!("🎬 Rendering outline '{}' into {:?}", outline.id, dir);
        if outline.sequences.is_empty() {
            return Err(empty("outline", &outline.id));
        }

        let sequences_dir = dir.join("sequences");
        let mut clips = Vec::with_capacity(outline.sequences.len());
        for sequence in outline.sequences.iter_mut() {
            let sequence_dir = sequences_dir.join(&sequence.id);
            clips.push(self.render_sequence(sequence, &sequence_dir).await?);
        }

        let output = self.output(dir, "outline");
        self.encoder.concatenate(&clips, &output).await?;

        let stats = self.stats();
        info!(
            "🎉 Outline '{}' done: {} image(s), {} clip(s), {} narration(s) generated, \
             {} cache hit(s)",
            outline.id,
            stats.images_generated,
            stats.clips_encoded,
            stats.speech_generated,
            stats.cache_hits
        );
        info!("   Output: {:?}", output);
        Ok(output)
    }

    pub async fn render_sequence(&self, sequence: &mut Sequence, dir: &Path) -> Result<PathBuf> {
        info!("📼 Sequence '{}' ({} scene(s))", sequence.id, sequence.scenes.len());
        if sequence.scenes.is_empty() {
            return Err(empty("sequence", &sequence.id));
        }

        let scenes_dir = dir.join("scenes");
        let mut clips = Vec::with_capacity(sequence.scenes.len());
        for scene in sequence.scenes.iter_mut() {
            let scene_dir = scenes_dir.join(&scene.id);
            clips.push(self.render_scene(scene, &scene_dir).await?);
        }

        let output = self.output(dir, "sequence");
        self.encoder.concatenate(&clips, &output).await?;
        Ok(output)
    }

    /// Render the shots of a scene, at most `max_parallel_shots` at a time
    ///
    /// Concatenation waits for every shot and keeps document order no matter
    /// which shot finished first.
    pub async fn render_scene(&self, scene: &mut Scene, dir: &Path) -> Result<PathBuf> {
        let parallelism = self.config.render.shot_parallelism();
        info!("🎥 Scene '{}' ({} shot(s))", scene.id, scene.shots.len());
        if scene.shots.is_empty() {
            return Err(empty("scene", &scene.id));
        }
        debug!("Rendering up to {} shot(s) of scene '{}' at once", parallelism, scene.id);

        let permits = Semaphore::new(parallelism);
        let shots_dir = dir.join("shots");
        let jobs = scene.shots.iter_mut().map(|shot| {
            let shot_dir = shots_dir.join(&shot.id);
            let permits = &permits;
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| {
                        CompositorError::generic(format!("shot scheduler closed: {}", e))
                    })?;
                Ok::<PathBuf, CompositorError>(self.render_shot(shot, &shot_dir).await?)
            }
        });
        let clips = try_join_all(jobs).await?;

        let output = self.output(dir, "scene");
        self.encoder.concatenate(&clips, &output).await?;
        Ok(output)
    }

    pub async fn render_shot(&self, shot: &mut Shot, dir: &Path) -> Result<PathBuf> {
        debug!("Shot '{}' in {:?}", shot.id, dir);
        tokio::fs::create_dir_all(dir).await?;
        self.shots.compose(shot, dir).await
    }

    /// Re-render one node in the directory a full pass would give it
    ///
    /// Parents are not re-joined; their clips go stale until the next full pass.
    pub async fn render_node(
        &self,
        outline: &mut Outline,
        node: &NodeSelector,
        dir: &Path,
    ) -> Result<PathBuf> {
        let location = locate(outline, node)?;
        info!("🎯 Re-rendering {} only", location.path);

        let sequence = &mut outline.sequences[location.sequence];
        let sequence_dir = dir.join("sequences").join(&sequence.id);
        let Some(c) = location.scene else {
            return self.render_sequence(sequence, &sequence_dir).await;
        };

        let scene = &mut sequence.scenes[c];
        let scene_dir = sequence_dir.join("scenes").join(&scene.id);
        let Some(h) = location.shot else {
            return self.render_scene(scene, &scene_dir).await;
        };

        let shot = &mut scene.shots[h];
        let shot_dir = scene_dir.join("shots").join(&shot.id);
        self.render_shot(shot, &shot_dir).await
    }

    fn output(&self, dir: &Path, level: &str) -> PathBuf {
        dir.join(format!("{}.{}", level, self.config.render.video_extension))
    }
}

fn empty(level: &str, id: &str) -> CompositorError {
    ProjectError::EmptyNode {
        level: level.to_string(),
        id: id.to_string(),
    }
    .into()
}
