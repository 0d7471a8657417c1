use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{GeneratorError, Result};
use crate::generators::{ImageGenerator, ImageRequest, SpeechGenerator, SpeechRequest};

/// Image generator that shells out to an external program
///
/// Recognised placeholders: `{prompt}`, `{negative_prompt}`, `{model}`,
/// `{seed}`, `{width}`, `{height}`, `{output}`, `{layer_id}`.
pub struct CommandImageGenerator {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandImageGenerator {
    pub fn new(program: String, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl ImageGenerator for CommandImageGenerator {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<()> {
        let vars = [
            ("prompt", request.prompt.clone()),
            ("negative_prompt", request.negative_prompt.clone()),
            ("model", request.model.clone()),
            ("seed", request.seed.to_string()),
            ("width", request.width.to_string()),
            ("height", request.height.to_string()),
            ("output", output.display().to_string()),
            ("layer_id", request.layer_id.clone()),
        ];

        let invocation = Invocation {
            generator: "image",
            program: &self.program,
            templates: &self.args,
            timeout: self.timeout,
        };
        invocation.run(&vars, &request.layer_id, output).await
    }
}

/// Speech generator that shells out to an external program
///
/// Recognised placeholders: `{text}`, `{speaker}`, `{text_temp}`,
/// `{waveform_temp}`, `{output}`, `{layer_id}`.
pub struct CommandSpeechGenerator {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandSpeechGenerator {
    pub fn new(program: String, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl SpeechGenerator for CommandSpeechGenerator {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, request: &SpeechRequest, output: &Path) -> Result<()> {
        let vars = [
            ("text", request.text.clone()),
            ("speaker", request.speaker.clone()),
            ("text_temp", request.text_temp.to_string()),
            ("waveform_temp", request.waveform_temp.to_string()),
            ("output", output.display().to_string()),
            ("layer_id", request.layer_id.clone()),
        ];

        let invocation = Invocation {
            generator: "speech",
            program: &self.program,
            templates: &self.args,
            timeout: self.timeout,
        };
        invocation.run(&vars, &request.layer_id, output).await
    }
}

/// Substitute `{name}` placeholders in one argument
fn expand(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |arg, (name, value)| {
        arg.replace(&format!("{{{}}}", name), value)
    })
}

/// One templated run of an external generator
struct Invocation<'a> {
    generator: &'a str,
    program: &'a str,
    templates: &'a [String],
    timeout: Option<Duration>,
}

impl Invocation<'_> {
    async fn run(&self, vars: &[(&str, String)], layer_id: &str, output: &Path) -> Result<()> {
        let args: Vec<String> = self.templates.iter().map(|t| expand(t, vars)).collect();
        debug!("Running {} generator: {} {:?}", self.generator, self.program, args);

        let failed = |reason: String| GeneratorError::Failed {
            generator: self.generator.to_string(),
            layer_id: layer_id.to_string(),
            reason,
        };

        let child = Command::new(self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("could not start {}: {}", self.program, e)))?;

        // Dropping the wait future on timeout drops the child, which kills it
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| GeneratorError::TimedOut {
                    generator: self.generator.to_string(),
                    layer_id: layer_id.to_string(),
                    seconds: limit.as_secs_f64(),
                })?,
            None => child.wait_with_output().await,
        };
        let result = waited.map_err(|e| failed(format!("{} did not finish: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            ))
            .into());
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(GeneratorError::MissingOutput {
                generator: self.generator.to_string(),
                path: output.display().to_string(),
            }
            .into());
        }

        Ok(())
    }
}
