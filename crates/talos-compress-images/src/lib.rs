// Talos compress-images plugin
//
// Hooks into a host build's emit phase, selects artifacts by glob pattern and
// swaps image assets for versions produced by external compression engines.

pub mod asset;
pub mod compressor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod path;
pub mod plugin;
pub mod selector;

pub use asset::{AssetManifest, ImageFormat, RawSource};
pub use compressor::{
    CommandCompressor, CompressOptions, CompressOutcome, CompressRequest, CompressStatistic,
    Compressor, FormatParameters,
};
pub use config::{
    CompressParameters, CompressParametersOverride, EngineCommand, EngineParams, PluginConfig,
};
pub use dispatcher::{Dispatcher, TaskOutcome};
pub use error::{PluginError, PluginResult};
pub use host::{
    detect_host, AsyncSeriesHook, Compiler, Continuation, EmitHandler, HookHost, HostKind,
    LegacyHookHost, ModernHookHost, EMIT_EVENT,
};
pub use path::{PathRewriter, RewrittenPath};
pub use plugin::{CompressImagesPlugin, EmitReport, PLUGIN_NAME};
pub use selector::PatternSelector;
