//! External compressor boundary
//!
//! The plugin never compresses anything itself. Each selected image is handed
//! to a [`Compressor`] as a [`CompressRequest`]; the compressor writes the
//! result into the destination directory and reports back whether it
//! completed. [`CommandCompressor`] drives the per-format engine binaries
//! (`cjpeg` for mozjpeg, `pngquant`, `svgo`, `gifsicle`) as child processes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::asset::ImageFormat;
use crate::config::{CompressParameters, EngineParams};
use crate::error::{PluginError, PluginResult};

/// Options forwarded with every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    /// Recompress even if an output already exists
    pub compress_force: bool,

    /// Report size statistics
    pub statistic: bool,

    /// Recompress outputs older than their source
    pub autoupdate: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            compress_force: true,
            statistic: true,
            autoupdate: true,
        }
    }
}

/// Engine parameters tagged with the format they apply to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatParameters {
    pub format: ImageFormat,
    pub params: EngineParams,
}

/// One compression job
#[derive(Debug, Clone)]
pub struct CompressRequest {
    /// File to compress
    pub source: PathBuf,

    /// Directory the compressed file is written into
    pub destination_dir: PathBuf,

    pub options: CompressOptions,

    /// Write the compressor's own log file
    pub enable_log: bool,

    pub jpg: FormatParameters,
    pub png: FormatParameters,
    pub svg: FormatParameters,
    pub gif: FormatParameters,
}

impl CompressRequest {
    pub fn new(source: PathBuf, destination_dir: PathBuf, parameters: &CompressParameters) -> Self {
        let wrap = |format: ImageFormat| FormatParameters {
            format,
            params: parameters.for_format(format).clone(),
        };

        Self {
            source,
            destination_dir,
            options: CompressOptions::default(),
            enable_log: false,
            jpg: wrap(ImageFormat::Jpg),
            png: wrap(ImageFormat::Png),
            svg: wrap(ImageFormat::Svg),
            gif: wrap(ImageFormat::Gif),
        }
    }

    /// Parameters for the given format
    pub fn parameters(&self, format: ImageFormat) -> &FormatParameters {
        match format {
            ImageFormat::Jpg => &self.jpg,
            ImageFormat::Png => &self.png,
            ImageFormat::Svg => &self.svg,
            ImageFormat::Gif => &self.gif,
        }
    }

    /// Format of the source file, if it is an image
    pub fn format(&self) -> Option<ImageFormat> {
        self.source
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(ImageFormat::from_filename)
    }
}

/// Size statistics for one compressed file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressStatistic {
    pub input_size: u64,
    pub output_size: u64,
}

impl CompressStatistic {
    /// Percentage of bytes saved
    pub fn percent(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        100.0 - (self.output_size as f64 / self.input_size as f64) * 100.0
    }
}

/// Result of a compression job that did not error
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressOutcome {
    /// The output was written
    pub completed: bool,

    pub statistic: Option<CompressStatistic>,
}

impl CompressOutcome {
    pub fn completed(statistic: Option<CompressStatistic>) -> Self {
        Self {
            completed: true,
            statistic,
        }
    }

    pub fn not_completed() -> Self {
        Self::default()
    }
}

/// External image compressor
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Compress `request.source` into `request.destination_dir`
    async fn compress(&self, request: CompressRequest) -> PluginResult<CompressOutcome>;
}

/// Compressor backed by engine binaries run as child processes
#[derive(Debug, Clone, Default)]
pub struct CommandCompressor {
    bin_dir: Option<PathBuf>,
}

impl CommandCompressor {
    /// Look engine binaries up on `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    /// Look engine binaries up in `bin_dir`
    pub fn with_bin_dir(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: Some(bin_dir.into()),
        }
    }

    fn program(&self, binary: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(binary),
            None => PathBuf::from(binary),
        }
    }
}

#[async_trait]
impl Compressor for CommandCompressor {
    async fn compress(&self, request: CompressRequest) -> PluginResult<CompressOutcome> {
        let Some(format) = request.format() else {
            tracing::debug!("No compression format for {:?}", request.source);
            return Ok(CompressOutcome::not_completed());
        };
        let Some(filename) = request.source.file_name() else {
            return Ok(CompressOutcome::not_completed());
        };
        let output = request.destination_dir.join(filename);

        if !request.options.compress_force && is_fresh(&request, &output).await? {
            tracing::debug!("Skipping up-to-date output {:?}", output);
            return Ok(CompressOutcome::completed(None));
        }

        tokio::fs::create_dir_all(&request.destination_dir).await?;

        let params = &request.parameters(format).params;
        let invocation =
            EngineInvocation::build(params, &request.source, &output, request.options)?;

        tracing::debug!(
            "Running {} ({}) on {:?}",
            invocation.binary,
            params.engine,
            request.source
        );

        let result = Command::new(self.program(invocation.binary))
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            return Err(PluginError::Compressor(format!(
                "{} exited with {}: {}",
                params.engine,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        if !tokio::fs::try_exists(&output).await? {
            return Ok(CompressOutcome::not_completed());
        }

        let statistic = if request.options.statistic {
            let input_size = tokio::fs::metadata(&request.source).await?.len();
            let output_size = tokio::fs::metadata(&output).await?.len();
            Some(CompressStatistic {
                input_size,
                output_size,
            })
        } else {
            None
        };

        Ok(CompressOutcome::completed(statistic))
    }
}

/// True if `output` exists and, with autoupdate on, is not older than the source
async fn is_fresh(request: &CompressRequest, output: &Path) -> PluginResult<bool> {
    if !tokio::fs::try_exists(output).await? {
        return Ok(false);
    }
    if !request.options.autoupdate {
        return Ok(true);
    }

    let source_modified = tokio::fs::metadata(&request.source).await?.modified()?;
    let output_modified = tokio::fs::metadata(output).await?.modified()?;
    Ok(output_modified >= source_modified)
}

/// Binary and argument list for one engine run
#[derive(Debug, Clone, PartialEq, Eq)]
struct EngineInvocation {
    binary: &'static str,
    args: Vec<String>,
}

impl EngineInvocation {
    fn build(
        params: &EngineParams,
        source: &Path,
        output: &Path,
        options: CompressOptions,
    ) -> PluginResult<Self> {
        let source = source.to_string_lossy().into_owned();
        let output = output.to_string_lossy().into_owned();
        let mut args = params.command.args();

        let binary = match params.engine.as_str() {
            "mozjpeg" => {
                args.extend(["-outfile".to_string(), output, source]);
                "cjpeg"
            }
            "pngquant" => {
                if options.compress_force {
                    args.push("--force".to_string());
                }
                args.extend(["--output".to_string(), output, "--".to_string(), source]);
                "pngquant"
            }
            "svgo" => {
                args.extend(["-i".to_string(), source, "-o".to_string(), output]);
                "svgo"
            }
            "gifsicle" => {
                args.extend(["-o".to_string(), output, source]);
                "gifsicle"
            }
            other => return Err(PluginError::UnsupportedEngine(other.to_string())),
        };

        Ok(Self { binary, args })
    }
}
