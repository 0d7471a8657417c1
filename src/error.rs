use thiserror::Error;

/// Main error type for the Narrative-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Media encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Audio measurement error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised by the external media encoding tool
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to spawn {tool}: {reason}")]
    SpawnFailed { tool: String, reason: String },

    #[error("{tool} exited with status {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} did not finish within {seconds}s")]
    TimedOut { tool: String, seconds: u64 },

    #[error("Unexpected probe output for {path}: {details}")]
    ProbeFailed { path: String, details: String },

    #[error("Nothing to {operation}: no input files")]
    NoInputs { operation: String },
}

/// Malformed or unreadable project trees
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to parse project file {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Unsupported project format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Shot '{shot_id}' has no video layer to composite onto")]
    MissingVideoLayer { shot_id: String },

    #[error("Layer id '{id}' is used more than once")]
    DuplicateLayerId { id: String },

    #[error("Invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Layer '{id}' has an invalid duration: {duration}")]
    InvalidDuration { id: String, duration: f64 },

    #[error("{level} '{id}' has no children to render")]
    EmptyNode { level: String, id: String },

    #[error("No node with id '{id}' in the project")]
    NodeNotFound { id: String },

    #[error("'{id}' matches several nodes ({candidates}); qualify it with its parents")]
    AmbiguousNode { id: String, candidates: String },
}

/// Failures of the external image and speech generators
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("{generator} generation failed for layer '{layer_id}': {reason}")]
    Failed {
        generator: String,
        layer_id: String,
        reason: String,
    },

    #[error("{generator} reported success but wrote no file at {path}")]
    MissingOutput { generator: String, path: String },

    #[error("{generator} generator gave up on layer '{layer_id}' after {seconds}s")]
    TimedOut {
        generator: String,
        layer_id: String,
        seconds: f64,
    },
}

/// Errors while measuring rendered audio
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {path}")]
    OpenFailed { path: String },

    #[error("Could not determine duration of {path}: {reason}")]
    DurationUnknown { path: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if re-running the same render pass could succeed
    ///
    /// Completed layers are reused on the next pass, so a retry only redoes
    /// the work downstream of the failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Encoder(EncoderError::TimedOut { .. }) => true,
            Self::Encoder(EncoderError::CommandFailed { .. }) => true,
            Self::Generator(GeneratorError::Failed { .. }) => true,
            Self::Generator(GeneratorError::TimedOut { .. }) => true,
            // Malformed trees fail the same way every time
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Project(ProjectError::MissingVideoLayer { shot_id }) => {
                format!(
                    "Shot '{}' cannot be composited: add at least one video layer to it.",
                    shot_id
                )
            }
            Self::Project(ProjectError::DuplicateLayerId { id }) => {
                format!(
                    "Layer id '{}' appears twice. \
                     Layer ids name cached artifacts and must be unique.",
                    id
                )
            }
            Self::Encoder(EncoderError::SpawnFailed { tool, .. }) => {
                format!(
                    "Could not run '{}'. Please check that FFmpeg is installed and on PATH.",
                    tool
                )
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
