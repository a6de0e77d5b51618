//! Plugin configuration
//!
//! The configuration is supplied once when the plugin is constructed and is
//! never mutated afterwards. Per-format compressor parameters are merged over
//! the built-in defaults: an override for one format replaces that format's
//! whole `{engine, command}` object and leaves the other formats untouched.
//!
//! ```rust
//! use talos_compress_images::PluginConfig;
//!
//! let config = PluginConfig::from_json_str(r#"{
//!     "patterns": ["**/*.png"],
//!     "output": "dist",
//!     "compressParameters": { "png": { "engine": "pngquant", "command": ["--quality=60-80"] } }
//! }"#).unwrap();
//!
//! assert_eq!(config.output(), "/dist");
//! assert_eq!(config.compress_parameters().jpg.engine, "mozjpeg");
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::asset::ImageFormat;
use crate::error::PluginResult;

/// Default number of artifacts processed at the same time
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Engine arguments, either a single string or an argument list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineCommand {
    Line(String),
    Args(Vec<String>),
}

impl EngineCommand {
    /// Arguments to pass to the engine, in order
    pub fn args(&self) -> Vec<String> {
        match self {
            EngineCommand::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            EngineCommand::Args(args) => args.clone(),
        }
    }
}

impl From<&str> for EngineCommand {
    fn from(line: &str) -> Self {
        EngineCommand::Line(line.to_string())
    }
}

impl From<&[&str]> for EngineCommand {
    fn from(args: &[&str]) -> Self {
        EngineCommand::Args(args.iter().map(|a| a.to_string()).collect())
    }
}

/// Engine selection for one image format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Engine identifier (e.g. `mozjpeg`, `pngquant`)
    pub engine: String,

    /// Engine-specific arguments
    pub command: EngineCommand,
}

impl EngineParams {
    pub fn new(engine: impl Into<String>, command: impl Into<EngineCommand>) -> Self {
        Self {
            engine: engine.into(),
            command: command.into(),
        }
    }
}

/// Per-format compressor parameters after merging over the defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressParameters {
    pub jpg: EngineParams,
    pub png: EngineParams,
    pub svg: EngineParams,
    pub gif: EngineParams,

    /// Destination root the compressor writes under
    pub destination: String,
}

impl Default for CompressParameters {
    fn default() -> Self {
        Self {
            jpg: EngineParams::new("mozjpeg", &["-quality", "60"][..]),
            png: EngineParams::new("pngquant", &["--quality=20-50"][..]),
            svg: EngineParams::new("svgo", "--multipass"),
            gif: EngineParams::new("gifsicle", &["--colors", "64", "--use-col=web"][..]),
            destination: String::new(),
        }
    }
}

impl CompressParameters {
    /// Parameters for a given image format
    pub fn for_format(&self, format: ImageFormat) -> &EngineParams {
        match format {
            ImageFormat::Jpg => &self.jpg,
            ImageFormat::Png => &self.png,
            ImageFormat::Svg => &self.svg,
            ImageFormat::Gif => &self.gif,
        }
    }
}

/// User-supplied parameters; missing entries fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressParametersOverride {
    pub jpg: Option<EngineParams>,
    pub png: Option<EngineParams>,
    pub svg: Option<EngineParams>,
    pub gif: Option<EngineParams>,
    pub destination: Option<String>,
}

impl CompressParametersOverride {
    /// Merge these overrides over `base`
    pub fn merge_over(self, base: CompressParameters) -> CompressParameters {
        CompressParameters {
            jpg: self.jpg.unwrap_or(base.jpg),
            png: self.png.unwrap_or(base.png),
            svg: self.svg.unwrap_or(base.svg),
            gif: self.gif.unwrap_or(base.gif),
            destination: self.destination.unwrap_or(base.destination),
        }
    }
}

/// On-disk configuration document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    #[serde(default)]
    patterns: Vec<String>,

    #[serde(default)]
    output: String,

    #[serde(default)]
    compress_parameters: CompressParametersOverride,

    #[serde(default)]
    context: Option<PathBuf>,

    #[serde(default)]
    concurrency: Option<usize>,
}

/// Immutable plugin configuration
#[derive(Debug, Clone)]
pub struct PluginConfig {
    patterns: Vec<String>,
    output: String,
    compress_parameters: CompressParameters,
    context: PathBuf,
    concurrency: usize,
}

impl PluginConfig {
    /// Create a configuration from patterns, an output override, and
    /// per-format parameter overrides
    pub fn new(
        patterns: Vec<String>,
        output: &str,
        overrides: CompressParametersOverride,
    ) -> Self {
        Self {
            patterns,
            output: normalize_output(output),
            compress_parameters: overrides.merge_over(CompressParameters::default()),
            context: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Resolve artifact paths against `context` instead of the process
    /// working directory
    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = context.into();
        self
    }

    /// Limit how many artifacts are processed at the same time
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(source: &str) -> PluginResult<Self> {
        let document: ConfigDocument = serde_json::from_str(source)?;
        Ok(Self::from_document(document))
    }

    /// Parse a YAML configuration document
    pub fn from_yaml_str(source: &str) -> PluginResult<Self> {
        let document: ConfigDocument = serde_yaml::from_str(source)?;
        Ok(Self::from_document(document))
    }

    /// Load a configuration file; `.yaml`/`.yml` are read as YAML,
    /// everything else as JSON
    pub fn from_path(path: &Path) -> PluginResult<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plugin config {:?}", path))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            _ => Self::from_json_str(&source),
        }
    }

    fn from_document(document: ConfigDocument) -> Self {
        let mut config = Self::new(
            document.patterns,
            &document.output,
            document.compress_parameters,
        );
        if let Some(context) = document.context {
            config = config.with_context(context);
        }
        if let Some(concurrency) = document.concurrency {
            config = config.with_concurrency(concurrency);
        }
        config
    }

    /// Glob patterns selecting the artifacts to process
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Normalized output override: empty, or `/`-prefixed
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn compress_parameters(&self) -> &CompressParameters {
        &self.compress_parameters
    }

    /// Directory artifact paths are resolved against
    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::new(Vec::new(), "", CompressParametersOverride::default())
    }
}

fn normalize_output(output: &str) -> String {
    let trimmed = output.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
