use bytes::Bytes;
use dashmap::DashMap;

/// Raw artifact content held by the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource(Bytes);

impl RawSource {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self(content.into())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawSource {
    fn from(content: Vec<u8>) -> Self {
        Self(Bytes::from(content))
    }
}

impl From<&'static [u8]> for RawSource {
    fn from(content: &'static [u8]) -> Self {
        Self(Bytes::from_static(content))
    }
}

/// Per-build mapping from artifact path to content
///
/// Owned by the host build. The plugin only reads keys, removes entries and
/// inserts new ones; every operation is a point operation on one key.
#[derive(Debug, Default)]
pub struct AssetManifest {
    assets: DashMap<String, RawSource>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current keys
    pub fn keys(&self) -> Vec<String> {
        self.assets.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, key: &str) -> Option<RawSource> {
        self.assets.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, source: RawSource) {
        self.assets.insert(key.into(), source);
    }

    pub fn remove(&self, key: &str) -> Option<RawSource> {
        self.assets.remove(key).map(|(_, source)| source)
    }

    /// Replace `old_key` with `new_key` holding `source`
    pub fn replace(&self, old_key: &str, new_key: impl Into<String>, source: RawSource) {
        self.assets.remove(old_key);
        self.assets.insert(new_key.into(), source);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, RawSource)> for AssetManifest {
    fn from_iter<I: IntoIterator<Item = (K, RawSource)>>(iter: I) -> Self {
        let manifest = AssetManifest::new();
        for (key, source) in iter {
            manifest.insert(key, source);
        }
        manifest
    }
}

/// Image format handled by the compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpg,
    Png,
    Svg,
    Gif,
}

impl ImageFormat {
    /// Detect the format from a filename's extension; `None` means the
    /// artifact is copied unmodified
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;

        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpg),
            "png" => Some(ImageFormat::Png),
            "svg" => Some(ImageFormat::Svg),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    /// Format tag used in configuration
    pub fn tag(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
            ImageFormat::Gif => "gif",
        }
    }
}
