use std::path::{Path, PathBuf};

use crate::error::{PluginError, PluginResult};

/// Locations derived from one artifact path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPath {
    /// Original manifest key
    pub original: String,

    /// Last path segment
    pub filename: String,

    /// Directory the compressed result is read back from, with a trailing `/`
    /// (empty for top-level artifacts)
    pub read_back_dir: String,

    /// Directory the compressor writes into, with a trailing `/`
    pub destination_dir: String,

    /// Key the result is registered under
    pub manifest_key: String,
}

impl RewrittenPath {
    /// Relative path the result is read back from
    pub fn read_back_path(&self) -> String {
        format!("{}{}", self.read_back_dir, self.filename)
    }

    /// Relative path of the file inside the destination directory
    pub fn destination_path(&self) -> String {
        format!("{}{}", self.destination_dir, self.filename)
    }
}

/// Computes destination directories and manifest keys for artifacts
///
/// The first directory segment of an artifact names the host's own output
/// bucket; it is replaced by the compressor's destination root followed by
/// the output override.
#[derive(Debug, Clone)]
pub struct PathRewriter {
    destination_root: String,
    output: String,
}

impl PathRewriter {
    /// `output` must already be normalized (empty or `/`-prefixed)
    pub fn new(destination_root: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            destination_root: destination_root.into(),
            output: output.into(),
        }
    }

    pub fn rewrite(&self, path: &str) -> PluginResult<RewrittenPath> {
        let mut segments: Vec<&str> = path.split('/').collect();
        let filename = match segments.pop() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(PluginError::InvalidAssetPath(path.to_string())),
        };

        let read_back_dir = if segments.is_empty() {
            String::new()
        } else {
            format!("{}/", segments.join("/"))
        };

        Ok(RewrittenPath {
            original: path.to_string(),
            filename: filename.to_string(),
            manifest_key: format!("../{}{}", read_back_dir, filename),
            destination_dir: format!(
                "{}{}{}",
                self.destination_root,
                self.output,
                relocated_dir(&segments)
            ),
            read_back_dir,
        })
    }

    /// On-disk destination directory for `rewritten`
    ///
    /// An absolute destination root is used as is; otherwise the directory is
    /// taken relative to `context`.
    pub fn resolve_destination(&self, context: &Path, rewritten: &RewrittenPath) -> PathBuf {
        if Path::new(&self.destination_root).is_absolute() {
            PathBuf::from(&rewritten.destination_dir)
        } else {
            context.join(rewritten.destination_dir.trim_start_matches('/'))
        }
    }
}

/// Directory segments without the leading bucket, as `/a/b/`; `/` when
/// nothing remains
fn relocated_dir(segments: &[&str]) -> String {
    match segments.split_first() {
        Some((_, rest)) if !rest.is_empty() => format!("/{}/", rest.join("/")),
        _ => "/".to_string(),
    }
}
