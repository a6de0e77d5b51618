//! Host build lifecycle surface
//!
//! Hosts expose the emit lifecycle point in one of two shapes: a modern hook
//! registry ([`AsyncSeriesHook`]) reachable through [`Compiler::emit_hook`],
//! or the legacy `plugin("emit", handler)` registration. [`detect_host`]
//! probes the compiler once and returns the matching [`HookHost`] adapter.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::asset::AssetManifest;
use crate::error::{PluginError, PluginResult};

/// Lifecycle event name used by legacy hosts
pub const EMIT_EVENT: &str = "emit";

/// Handler invoked once per build with the assembled manifest
pub type EmitHandler =
    Arc<dyn Fn(Arc<AssetManifest>, Continuation) -> BoxFuture<'static, ()> + Send + Sync>;

/// Host continuation; consumed by the single call that resumes or aborts the build
pub struct Continuation {
    callback: Box<dyn FnOnce(PluginResult<()>) + Send>,
}

impl Continuation {
    pub fn new(callback: impl FnOnce(PluginResult<()>) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Continuation paired with a receiver the host awaits
    pub fn channel() -> (Self, oneshot::Receiver<PluginResult<()>>) {
        let (tx, rx) = oneshot::channel();
        let continuation = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (continuation, rx)
    }

    /// Resume the build
    pub fn proceed(self) {
        (self.callback)(Ok(()))
    }

    /// Abort the build with `err`
    pub fn abort(self, err: PluginError) {
        (self.callback)(Err(err))
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}

/// Ordered registry of async emit taps
#[derive(Default)]
pub struct AsyncSeriesHook {
    taps: Vec<(String, EmitHandler)>,
}

impl AsyncSeriesHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`
    pub fn tap_async(&mut self, name: impl Into<String>, handler: EmitHandler) {
        self.taps.push((name.into(), handler));
    }

    /// Names of registered taps, in call order
    pub fn tap_names(&self) -> Vec<&str> {
        self.taps.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run every tap in order, stopping at the first one that aborts
    pub async fn call_async(&self, manifest: Arc<AssetManifest>) -> PluginResult<()> {
        for (name, handler) in &self.taps {
            let (continuation, rx) = Continuation::channel();
            handler(manifest.clone(), continuation).await;

            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Err(PluginError::TaskJoin(format!(
                        "{} finished without resuming the build",
                        name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Host build object plugins are applied to
pub trait Compiler {
    /// Modern emit hook; `None` when the host only supports legacy registration
    fn emit_hook(&mut self) -> Option<&mut AsyncSeriesHook> {
        None
    }

    /// Legacy event registration
    fn plugin(&mut self, event: &str, handler: EmitHandler);
}

/// Which registration shape a host exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Modern,
    Legacy,
}

/// Registers emit handlers on a host
pub trait HookHost {
    fn kind(&self) -> HostKind;

    fn on_emit(&mut self, name: &str, handler: EmitHandler);
}

/// Host exposing [`Compiler::emit_hook`]
pub struct ModernHookHost<'a> {
    compiler: &'a mut dyn Compiler,
}

impl HookHost for ModernHookHost<'_> {
    fn kind(&self) -> HostKind {
        HostKind::Modern
    }

    fn on_emit(&mut self, name: &str, handler: EmitHandler) {
        if let Some(hook) = self.compiler.emit_hook() {
            hook.tap_async(name, handler);
        }
    }
}

/// Host that only supports `plugin("emit", ..)`
pub struct LegacyHookHost<'a> {
    compiler: &'a mut dyn Compiler,
}

impl HookHost for LegacyHookHost<'_> {
    fn kind(&self) -> HostKind {
        HostKind::Legacy
    }

    fn on_emit(&mut self, _name: &str, handler: EmitHandler) {
        self.compiler.plugin(EMIT_EVENT, handler);
    }
}

/// Pick the adapter matching the registration shape `compiler` exposes
pub fn detect_host<'a>(compiler: &'a mut dyn Compiler) -> Box<dyn HookHost + 'a> {
    if compiler.emit_hook().is_some() {
        Box::new(ModernHookHost { compiler })
    } else {
        Box::new(LegacyHookHost { compiler })
    }
}
