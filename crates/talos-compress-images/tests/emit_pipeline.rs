use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use talos_compress_images::{
    AssetManifest, AsyncSeriesHook, CompressImagesPlugin, CompressOutcome,
    CompressParametersOverride, CompressRequest, CompressStatistic, Compiler, Compressor,
    Continuation, EmitHandler, EngineParams, HostKind, ImageFormat, PluginConfig, PluginError,
    PluginResult, RawSource, TaskOutcome, EMIT_EVENT, PLUGIN_NAME,
};

/// What the scripted compressor does with every request
#[derive(Clone)]
enum Script {
    /// Write the given bytes to `destination_dir/filename` and complete
    Complete(&'static [u8]),
    /// Report `(null, false, null)`
    Decline,
    /// Report an error
    Fail,
}

struct ScriptedCompressor {
    script: Script,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompressRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCompressor {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn with_delay(script: Script, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn requests(&self) -> Vec<CompressRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compressor for ScriptedCompressor {
    async fn compress(&self, request: CompressRequest) -> PluginResult<CompressOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.script {
            Script::Complete(bytes) => {
                let filename = request.source.file_name().unwrap();
                tokio::fs::create_dir_all(&request.destination_dir).await?;
                tokio::fs::write(request.destination_dir.join(filename), bytes).await?;
                Ok(CompressOutcome::completed(Some(CompressStatistic {
                    input_size: tokio::fs::metadata(&request.source).await?.len(),
                    output_size: bytes.len() as u64,
                })))
            }
            Script::Decline => Ok(CompressOutcome::not_completed()),
            Script::Fail => Err(PluginError::Compressor("pngquant exited with 99".to_string())),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn manifest_of(root: &Path, files: &[(&str, &'static str)]) -> Arc<AssetManifest> {
    let manifest = AssetManifest::new();
    for (key, content) in files {
        write_file(root, key, content.as_bytes());
        manifest.insert(*key, RawSource::from(content.as_bytes()));
    }
    Arc::new(manifest)
}

fn config(root: &Path, patterns: &[&str], output: &str, destination: &str) -> PluginConfig {
    let overrides = CompressParametersOverride {
        destination: Some(destination.to_string()),
        ..Default::default()
    };
    PluginConfig::new(patterns.iter().map(|p| p.to_string()).collect(), output, overrides)
        .with_context(root)
}

#[tokio::test]
async fn test_selects_png_and_leaves_readme() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(
        dir.path(),
        &[("static/logo.png", "original png"), ("static/readme.md", "# readme")],
    );
    // Destination `static` with no override writes back over the source directory
    let compressor = ScriptedCompressor::new(Script::Complete(b"tiny"));
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["*.png", "*.jpg"], "", "static"),
        compressor.clone(),
    )
    .unwrap();

    let report = plugin.run(manifest.clone()).await.unwrap();

    assert_eq!(report.selected(), 1);
    assert_eq!(report.compressed(), 1);
    let requests = compressor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source, dir.path().join("static/logo.png"));
    assert_eq!(requests[0].destination_dir, dir.path().join("static/"));

    assert!(!manifest.contains("static/logo.png"));
    assert_eq!(manifest.get("../static/logo.png").unwrap().bytes().as_ref(), b"tiny");
    assert_eq!(manifest.get("static/readme.md").unwrap().bytes().as_ref(), b"# readme");
    assert_eq!(manifest.len(), 2);

    match report.outcome("static/logo.png").unwrap() {
        TaskOutcome::Compressed { key, statistic } => {
            assert_eq!(key, "../static/logo.png");
            assert_eq!(statistic.unwrap().output_size, 4);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_declined_compression_keeps_entry_and_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(dir.path(), &[("static/logo.png", "original png")]);
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["**/*.png"], "", ""),
        ScriptedCompressor::new(Script::Decline),
    )
    .unwrap();

    let (continuation, rx) = Continuation::channel();
    plugin.on_emit(manifest.clone(), continuation).await;

    assert!(rx.await.unwrap().is_ok());
    assert_eq!(manifest.keys(), vec!["static/logo.png"]);
    assert_eq!(manifest.get("static/logo.png").unwrap().bytes().as_ref(), b"original png");
}

#[tokio::test]
async fn test_compressor_error_does_not_fail_build() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(
        dir.path(),
        &[("static/a.png", "a"), ("static/b.gif", "b")],
    );
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["static/*"], "", ""),
        ScriptedCompressor::new(Script::Fail),
    )
    .unwrap();

    let report = plugin.run(manifest.clone()).await.unwrap();

    assert_eq!(report.failed(), 2);
    assert!(manifest.contains("static/a.png"));
    assert!(manifest.contains("static/b.gif"));
}

#[tokio::test]
async fn test_non_image_copied_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(dir.path(), &[("a/b/readme.txt", "plain text\n")]);
    let compressor = ScriptedCompressor::new(Script::Complete(b"never"));
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["**/*.txt"], "dist", ""),
        compressor.clone(),
    )
    .unwrap();

    let report = plugin.run(manifest.clone()).await.unwrap();

    assert_eq!(report.copied(), 1);
    assert!(compressor.requests().is_empty());
    assert_eq!(
        std::fs::read(dir.path().join("dist/b/readme.txt")).unwrap(),
        b"plain text\n"
    );
    assert_eq!(manifest.keys(), vec!["../a/b/readme.txt"]);
    assert_eq!(
        manifest.get("../a/b/readme.txt").unwrap().bytes().as_ref(),
        b"plain text\n"
    );
}

#[tokio::test]
async fn test_copy_onto_itself_keeps_content() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(dir.path(), &[("static/readme.md", "# readme")]);
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["static/*"], "", "static"),
        ScriptedCompressor::new(Script::Complete(b"never")),
    )
    .unwrap();

    let report = plugin.run(manifest.clone()).await.unwrap();

    assert_eq!(
        report.outcome("static/readme.md"),
        Some(&TaskOutcome::Copied {
            key: "../static/readme.md".to_string()
        })
    );
    assert_eq!(
        std::fs::read(dir.path().join("static/readme.md")).unwrap(),
        b"# readme"
    );
    assert_eq!(manifest.keys(), vec!["../static/readme.md"]);
    assert_eq!(
        manifest.get("../static/readme.md").unwrap().bytes().as_ref(),
        b"# readme"
    );
}

#[tokio::test]
async fn test_every_format_carries_its_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(
        dir.path(),
        &[
            ("img/a.jpg", "jpg"),
            ("img/b.JPEG", "jpeg"),
            ("img/c.png", "png"),
            ("img/d.svg", "<svg/>"),
            ("img/e.gif", "gif"),
        ],
    );
    let overrides = CompressParametersOverride {
        png: Some(EngineParams::new("pngquant", &["--quality=65-80"][..])),
        ..Default::default()
    };
    let config =
        PluginConfig::new(vec!["img/*".to_string()], "dist", overrides).with_context(dir.path());
    let compressor = ScriptedCompressor::new(Script::Decline);
    let plugin = CompressImagesPlugin::with_compressor(config, compressor.clone()).unwrap();

    plugin.run(manifest).await.unwrap();

    let requests = compressor.requests();
    assert_eq!(requests.len(), 5);
    for request in &requests {
        assert!(request.options.compress_force);
        assert!(request.options.statistic);
        assert!(request.options.autoupdate);
        assert!(!request.enable_log);
        assert_eq!(request.jpg.params.engine, "mozjpeg");
        assert_eq!(request.png.params.command.args(), vec!["--quality=65-80"]);
        assert_eq!(request.svg.params.engine, "svgo");
        assert_eq!(request.gif.params.engine, "gifsicle");
        assert!(request.destination_dir.ends_with("dist"));

        let format = request.format().unwrap();
        assert_eq!(request.parameters(format).format, format);
    }

    let mut formats: Vec<ImageFormat> = requests.iter().filter_map(|r| r.format()).collect();
    formats.dedup();
    assert!(formats.contains(&ImageFormat::Gif));
    assert!(formats.contains(&ImageFormat::Svg));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<(String, &'static [u8])> = (0..6)
        .map(|i| (format!("static/{}.png", i), &b"png"[..]))
        .collect();
    let manifest = AssetManifest::new();
    for (key, content) in &files {
        write_file(dir.path(), key, content);
        manifest.insert(key.clone(), RawSource::from(*content));
    }

    let compressor = ScriptedCompressor::with_delay(Script::Decline, Duration::from_millis(20));
    let config = config(dir.path(), &["*.png"], "", "").with_concurrency(2);
    let plugin = CompressImagesPlugin::with_compressor(config, compressor.clone()).unwrap();

    let report = plugin.run(Arc::new(manifest)).await.unwrap();

    assert_eq!(report.selected(), 6);
    assert!(compressor.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_empty_patterns_select_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(dir.path(), &[("static/logo.png", "png")]);
    let compressor = ScriptedCompressor::new(Script::Complete(b"x"));
    let plugin =
        CompressImagesPlugin::with_compressor(config(dir.path(), &[], "", ""), compressor.clone())
            .unwrap();

    let report = plugin.run(manifest.clone()).await.unwrap();

    assert_eq!(report.selected(), 0);
    assert!(compressor.requests().is_empty());
    assert!(manifest.contains("static/logo.png"));
}

struct ModernHost {
    emit: AsyncSeriesHook,
}

impl Compiler for ModernHost {
    fn emit_hook(&mut self) -> Option<&mut AsyncSeriesHook> {
        Some(&mut self.emit)
    }

    fn plugin(&mut self, _event: &str, _handler: EmitHandler) {
        panic!("modern hosts must not receive legacy registrations");
    }
}

#[derive(Default)]
struct LegacyHost {
    handlers: HashMap<String, Vec<EmitHandler>>,
}

impl Compiler for LegacyHost {
    fn plugin(&mut self, event: &str, handler: EmitHandler) {
        self.handlers.entry(event.to_string()).or_default().push(handler);
    }
}

#[tokio::test]
async fn test_modern_host_runs_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_of(dir.path(), &[("static/logo.svg", "<svg></svg>")]);
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["**/*.svg"], "", "static"),
        ScriptedCompressor::new(Script::Complete(b"<svg/>")),
    )
    .unwrap();

    let mut host = ModernHost {
        emit: AsyncSeriesHook::new(),
    };
    assert_eq!(plugin.apply(&mut host), HostKind::Modern);
    assert_eq!(host.emit.tap_names(), vec![PLUGIN_NAME]);

    host.emit.call_async(manifest.clone()).await.unwrap();

    assert_eq!(manifest.get("../static/logo.svg").unwrap().bytes().as_ref(), b"<svg/>");
}

#[tokio::test]
async fn test_legacy_host_receives_abort() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Arc::new(AssetManifest::new());
    manifest.insert("static/", RawSource::from(&b""[..]));
    let plugin = CompressImagesPlugin::with_compressor(
        config(dir.path(), &["static*"], "", ""),
        ScriptedCompressor::new(Script::Decline),
    )
    .unwrap();

    let mut host = LegacyHost::default();
    assert_eq!(plugin.apply(&mut host), HostKind::Legacy);

    let handler = host.handlers[EMIT_EVENT][0].clone();
    let (continuation, rx) = Continuation::channel();
    let run: BoxFuture<'static, ()> = handler(manifest.clone(), continuation);
    run.await;

    assert!(matches!(
        rx.await.unwrap(),
        Err(PluginError::InvalidAssetPath(key)) if key == "static/"
    ));
    assert!(manifest.contains("static/"));
}
