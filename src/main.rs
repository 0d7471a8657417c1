use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use narrative_compositor::{
    composition::{CompositionEngine, NodeSelector},
    config::Config,
    encoder::FfmpegEncoder,
    project::ProjectLoader,
};

#[derive(Parser)]
#[command(
    name = "narrative-compositor",
    version,
    about = "Render narrative videos from a clip tree of generated media layers",
    long_about = "Narrative-Compositor renders every shot of an outline from its image, narration \
                  and music layers, joins them into scenes, sequences and a final video, and skips \
                  every layer whose generation parameters did not change since the last pass."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render a project, reusing unchanged layers from earlier passes
    Render {
        /// Project file (JSON or TOML)
        #[arg(short, long)]
        project: PathBuf,

        /// Output directory for all artifacts
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (optional)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only render one node, e.g. `shot:H3` or `scene:Q2/C1` when ids repeat
        #[arg(short, long)]
        node: Option<NodeSelector>,

        /// Write resolved layer durations back into the project file
        #[arg(long)]
        save_durations: bool,
    },

    /// Check a project file without rendering anything
    Validate {
        /// Project file (JSON or TOML)
        #[arg(short, long)]
        project: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Narrative-Compositor v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Render {
            project,
            output,
            config,
            node,
            save_durations,
        } => render(project, output, config, node, save_durations).await,
        Command::Validate { project } => {
            let outline =
                ProjectLoader::load(&project).map_err(|e| anyhow::anyhow!(e.user_message()))?;
            outline.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;
            info!(
                "✅ {:?} is valid: {} shot(s), {} layer(s)",
                project,
                outline.shots().count(),
                outline.layers().count()
            );
            Ok(())
        }
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!("Default configuration written to {:?}", path);
            Ok(())
        }
    }
}

async fn render(
    project: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    node: Option<NodeSelector>,
    save_durations: bool,
) -> Result<()> {
    // Load configuration
    let config = match config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.validate()?;

    info!("Project: {:?}", project);
    info!("Output: {:?}", output);

    let mut outline = ProjectLoader::load(&project).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    outline.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if !FfmpegEncoder::new(config.encoder.clone()).check_available().await {
        warn!(
            "{} does not respond to -version, rendering will likely fail",
            config.encoder.ffmpeg_path
        );
    }

    tokio::fs::create_dir_all(&output)
        .await
        .with_context(|| format!("cannot create output directory {:?}", output))?;

    let engine = CompositionEngine::from_config(config);
    let result = match &node {
        Some(node) => engine.render_node(&mut outline, node, &output).await,
        None => engine.render_outline(&mut outline, &output).await,
    };

    // Durations resolved before a failure are still worth keeping
    if save_durations {
        ProjectLoader::save(&outline, &project)?;
        info!("Resolved durations saved to {:?}", project);
    }

    let video = result.map_err(|e| {
        if e.is_recoverable() {
            warn!("Finished layers are cached; re-running will resume after the failure");
        }
        anyhow::anyhow!(e.user_message())
    })?;

    info!("Render complete! Output saved to: {:?}", video);
    Ok(())
}
