use serde::{Deserialize, Serialize};

/// One generated media component attached to a shot
///
/// Everything except `duration` is fixed once the layer is authored. The
/// duration starts out optional and is filled in by the duration resolver;
/// see [`ResolvedLayer`] for the post-resolution view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Project-wide unique id, also the on-disk artifact name
    pub id: String,

    /// Playback length in seconds, `None` until resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(flatten)]
    pub kind: LayerKind,
}

/// Kind-specific layer payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    Video(VideoLayer),
    VoiceOver(VoiceOverLayer),
    Music(MusicLayer),
}

/// A still image turned into a clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLayer {
    pub prompt: String,
    #[serde(default)]
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub model: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
}

/// A narrated line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceOverLayer {
    /// The line to speak
    pub prompt: String,
    pub speaker: String,
    #[serde(default = "default_temperature")]
    pub speaker_text_temp: f64,
    #[serde(default = "default_temperature")]
    pub speaker_waveform_temp: f64,
}

/// Background music described by mood or style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicLayer {
    pub prompt: String,
}

fn default_temperature() -> f64 {
    0.7
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::VoiceOver(_) => "voice_over",
            Self::Music(_) => "music",
        }
    }

    /// Voice-over and music layers end up in the shot's mixed audio track
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::VoiceOver(_) | Self::Music(_))
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }
}

impl Layer {
    pub fn new(id: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            duration: None,
            kind,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// The authored duration, ignoring unset or non-positive values
    pub fn explicit_duration(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    /// View this layer with its duration pinned, if it has one
    pub fn resolved(&self) -> Option<ResolvedLayer> {
        self.explicit_duration().map(|duration| ResolvedLayer {
            id: self.id.clone(),
            duration,
            kind: self.kind.clone(),
        })
    }
}

/// A layer whose duration is known
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    pub id: String,
    pub duration: f64,
    pub kind: LayerKind,
}

/// Smallest independently composited unit; owns the layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Shot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub shots: Vec<Shot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sequence {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// Root of the clip tree; renders to the final video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Outline {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

impl Shot {
    pub fn new(id: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            id: id.into(),
            title: None,
            summary: None,
            layers,
        }
    }

    pub fn has_video_layer(&self) -> bool {
        self.layers.iter().any(|layer| layer.kind.is_video())
    }
}

impl Scene {
    pub fn new(id: impl Into<String>, shots: Vec<Shot>) -> Self {
        Self {
            id: id.into(),
            title: None,
            summary: None,
            shots,
        }
    }
}

impl Sequence {
    pub fn new(id: impl Into<String>, scenes: Vec<Scene>) -> Self {
        Self {
            id: id.into(),
            title: None,
            summary: None,
            scenes,
        }
    }
}

impl Outline {
    pub fn new(id: impl Into<String>, sequences: Vec<Sequence>) -> Self {
        Self {
            id: id.into(),
            title: None,
            summary: None,
            sequences,
        }
    }

    /// Iterate every shot in playback order
    pub fn shots(&self) -> impl Iterator<Item = &Shot> {
        self.sequences
            .iter()
            .flat_map(|sequence| sequence.scenes.iter())
            .flat_map(|scene| scene.shots.iter())
    }

    /// Iterate every layer in playback order
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.shots().flat_map(|shot| shot.layers.iter())
    }
}
