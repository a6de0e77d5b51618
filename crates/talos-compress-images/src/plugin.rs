use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::asset::AssetManifest;
use crate::compressor::{CommandCompressor, Compressor};
use crate::config::PluginConfig;
use crate::dispatcher::{Dispatcher, TaskOutcome};
use crate::error::{PluginError, PluginResult};
use crate::host::{detect_host, Compiler, Continuation, EmitHandler, HostKind};
use crate::path::RewrittenPath;
use crate::selector::PatternSelector;

/// Name the plugin registers its emit handler under
pub const PLUGIN_NAME: &str = "CompressImagesPlugin";

/// Per-build summary of processed artifacts
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    /// Original key and outcome of every selected artifact
    pub outcomes: Vec<(String, TaskOutcome)>,
}

impl EmitReport {
    pub fn selected(&self) -> usize {
        self.outcomes.len()
    }

    pub fn compressed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Compressed { .. }))
    }

    pub fn copied(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Copied { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(TaskOutcome::is_failed)
    }

    /// Outcome for an original artifact key
    pub fn outcome(&self, key: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(original, _)| original == key)
            .map(|(_, outcome)| outcome)
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Emit-phase plugin replacing selected image assets with compressed versions
#[derive(Clone)]
pub struct CompressImagesPlugin {
    config: Arc<PluginConfig>,
    selector: PatternSelector,
    dispatcher: Dispatcher,
}

impl CompressImagesPlugin {
    /// Create a plugin driving the engine binaries found on `PATH`
    pub fn new(config: PluginConfig) -> PluginResult<Self> {
        Self::with_compressor(config, Arc::new(CommandCompressor::new()))
    }

    /// Create a plugin with a custom compressor
    pub fn with_compressor(
        config: PluginConfig,
        compressor: Arc<dyn Compressor>,
    ) -> PluginResult<Self> {
        let selector = PatternSelector::new(config.patterns())?;
        let config = Arc::new(config);

        Ok(Self {
            dispatcher: Dispatcher::new(config.clone(), compressor),
            config,
            selector,
        })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Register the emit handler on `compiler`
    pub fn apply(&self, compiler: &mut dyn Compiler) -> HostKind {
        let plugin = self.clone();
        let handler: EmitHandler = Arc::new(
            move |manifest: Arc<AssetManifest>,
                  continuation: Continuation|
                  -> BoxFuture<'static, ()> {
                let plugin = plugin.clone();
                Box::pin(async move { plugin.on_emit(manifest, continuation).await })
            },
        );

        let mut host = detect_host(compiler);
        host.on_emit(PLUGIN_NAME, handler);

        tracing::debug!("Registered {} on {:?} host", PLUGIN_NAME, host.kind());
        host.kind()
    }

    /// Process the manifest and resume or abort the build
    pub async fn on_emit(&self, manifest: Arc<AssetManifest>, continuation: Continuation) {
        match self.run(manifest).await {
            Ok(report) => {
                tracing::info!(
                    "{}: {} selected, {} compressed, {} copied, {} failed",
                    PLUGIN_NAME,
                    report.selected(),
                    report.compressed(),
                    report.copied(),
                    report.failed()
                );
                continuation.proceed();
            }
            Err(err) => {
                tracing::error!("{} aborted the build: {}", PLUGIN_NAME, err);
                continuation.abort(err);
            }
        }
    }

    /// Select artifacts, run one task per artifact and wait for all of them
    pub async fn run(&self, manifest: Arc<AssetManifest>) -> PluginResult<EmitReport> {
        let selected = self.selector.select(manifest.keys());
        tracing::debug!("Selected {} of {} assets", selected.len(), manifest.len());

        let assets = selected
            .iter()
            .map(|key| self.dispatcher.rewriter().rewrite(key))
            .collect::<PluginResult<Vec<RewrittenPath>>>()?;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));
        let tasks: Vec<JoinHandle<(String, TaskOutcome)>> = assets
            .into_iter()
            .map(|asset| {
                let semaphore = semaphore.clone();
                let dispatcher = self.dispatcher.clone();
                let manifest = manifest.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let key = asset.original.clone();
                    let outcome = dispatcher.process(asset, &manifest).await;
                    (key, outcome)
                })
            })
            .collect();

        let mut report = EmitReport::default();
        for joined in futures::future::join_all(tasks).await {
            let entry = joined.map_err(|e| PluginError::TaskJoin(e.to_string()))?;
            report.outcomes.push(entry);
        }

        Ok(report)
    }
}
