use std::path::Path;
use std::sync::Arc;

use crate::asset::{AssetManifest, ImageFormat, RawSource};
use crate::compressor::{CompressRequest, CompressStatistic, Compressor};
use crate::config::PluginConfig;
use crate::error::{PluginError, PluginResult};
use crate::path::{PathRewriter, RewrittenPath};

/// Terminal state of one artifact
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Not an image; copied to the destination and re-registered as is
    Copied { key: String },

    /// Compressed and re-registered under `key`
    Compressed {
        key: String,
        statistic: Option<CompressStatistic>,
    },

    /// Nothing was re-registered
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Runs the per-artifact copy or compression task
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<PluginConfig>,
    rewriter: PathRewriter,
    compressor: Arc<dyn Compressor>,
}

impl Dispatcher {
    pub fn new(config: Arc<PluginConfig>, compressor: Arc<dyn Compressor>) -> Self {
        let rewriter = PathRewriter::new(
            config.compress_parameters().destination.clone(),
            config.output(),
        );

        Self {
            config,
            rewriter,
            compressor,
        }
    }

    pub fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }

    /// Process one artifact; never fails, errors end up in the outcome
    pub async fn process(&self, asset: RewrittenPath, manifest: &AssetManifest) -> TaskOutcome {
        let result = match ImageFormat::from_filename(&asset.filename) {
            Some(format) => {
                tracing::debug!("Compressing {} as {}", asset.original, format.tag());
                self.compress(&asset, manifest).await
            }
            None => {
                tracing::debug!("Copying {} unmodified", asset.original);
                self.copy_unmodified(&asset, manifest).await
            }
        };

        result.unwrap_or_else(|err| {
            tracing::warn!("Leaving {} as is: {}", asset.original, err);
            TaskOutcome::Failed {
                reason: err.to_string(),
            }
        })
    }

    async fn copy_unmodified(
        &self,
        asset: &RewrittenPath,
        manifest: &AssetManifest,
    ) -> PluginResult<TaskOutcome> {
        let context = self.config.context();
        let destination = self.rewriter.resolve_destination(context, asset);

        if !tokio::fs::try_exists(&destination).await? {
            tokio::fs::create_dir_all(&destination).await?;
        }
        let source = context.join(&asset.original);
        let target = destination.join(&asset.filename);
        if is_same_file(&source, &target).await? {
            tracing::debug!("{} is already in place at {:?}", asset.original, target);
        } else {
            tokio::fs::copy(&source, &target).await?;
        }

        self.register(asset, manifest, context).await?;
        Ok(TaskOutcome::Copied {
            key: asset.manifest_key.clone(),
        })
    }

    async fn compress(
        &self,
        asset: &RewrittenPath,
        manifest: &AssetManifest,
    ) -> PluginResult<TaskOutcome> {
        let context = self.config.context();
        let request = CompressRequest::new(
            context.join(&asset.original),
            self.rewriter.resolve_destination(context, asset),
            self.config.compress_parameters(),
        );

        let outcome = self.compressor.compress(request).await?;
        if !outcome.completed {
            return Err(PluginError::Compressor(format!(
                "{} was not completed",
                asset.original
            )));
        }

        self.register(asset, manifest, context).await?;
        Ok(TaskOutcome::Compressed {
            key: asset.manifest_key.clone(),
            statistic: outcome.statistic,
        })
    }

    /// Read the result back and swap it in under the new key
    async fn register(
        &self,
        asset: &RewrittenPath,
        manifest: &AssetManifest,
        context: &Path,
    ) -> PluginResult<()> {
        let data = tokio::fs::read(context.join(asset.read_back_path())).await?;
        manifest.replace(&asset.original, asset.manifest_key.clone(), RawSource::from(data));
        Ok(())
    }
}

/// True if `target` exists and resolves to the same file as `source`
async fn is_same_file(source: &Path, target: &Path) -> PluginResult<bool> {
    let Ok(target) = tokio::fs::canonicalize(target).await else {
        return Ok(false);
    };
    Ok(tokio::fs::canonicalize(source).await? == target)
}
