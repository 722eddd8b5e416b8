//! Source locators for ingested files.
//!
//! Each collection directory is registered with a resolver kind; the
//! resolver turns a file path into the URL cited in answers. Files outside
//! every collection, or whose resolver fails, keep their raw path.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use vta_core::config::CollectionConfig;
use vta_core::error::{Result, VtaError};

/// Strategy for deriving a source locator from a file path.
pub trait SourceResolver: Send + Sync {
    /// Kind name used in configuration, e.g. "docs_site".
    fn kind(&self) -> &str;

    fn resolve(&self, path: &Path) -> Result<String>;
}

/// Documentation site page: `{base_url}{file stem}`.
pub struct DocsSiteResolver {
    base_url: String,
}

impl DocsSiteResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl SourceResolver for DocsSiteResolver {
    fn kind(&self) -> &str {
        "docs_site"
    }

    fn resolve(&self, path: &Path) -> Result<String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| VtaError::Configuration(format!("no file stem in {}", path.display())))?;
        Ok(format!("{}{}", self.base_url, stem))
    }
}

/// Forum thread: `{base_url}/t/{slug}/{id}`, with slug and id read from
/// `{threads_dir}/{file stem}.json`.
pub struct ForumThreadResolver {
    base_url: String,
    threads_dir: PathBuf,
}

#[derive(Deserialize)]
struct ThreadInfo {
    slug: String,
    id: serde_json::Value,
}

impl ForumThreadResolver {
    pub fn new(base_url: impl Into<String>, threads_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            threads_dir: threads_dir.into(),
        }
    }
}

impl SourceResolver for ForumThreadResolver {
    fn kind(&self) -> &str {
        "forum_thread"
    }

    fn resolve(&self, path: &Path) -> Result<String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| VtaError::Configuration(format!("no file stem in {}", path.display())))?;
        let json_path = self.threads_dir.join(format!("{stem}.json"));
        let raw = std::fs::read_to_string(&json_path)?;
        let info: ThreadInfo = serde_json::from_str(&raw)?;
        let id = match &info.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(format!("{}/t/{}/{}", self.base_url.trim_end_matches('/'), info.slug, id))
    }
}

/// Collection directories mapped to resolvers.
#[derive(Default)]
pub struct ProvenanceRegistry {
    collections: Vec<(PathBuf, String)>,
    resolvers: HashMap<String, Box<dyn SourceResolver>>,
}

impl ProvenanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `[[ingest.collections]]` entries with the built-in kinds.
    pub fn from_config(collections: &[CollectionConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for c in collections {
            let resolver: Box<dyn SourceResolver> = match c.kind.as_str() {
                "docs_site" => Box::new(DocsSiteResolver::new(c.base_url.clone())),
                "forum_thread" => {
                    let threads_dir = c.threads_dir.clone().ok_or_else(|| {
                        VtaError::Configuration(format!(
                            "collection {} of kind forum_thread needs threads_dir",
                            c.dir
                        ))
                    })?;
                    Box::new(ForumThreadResolver::new(c.base_url.clone(), threads_dir))
                }
                other => {
                    return Err(VtaError::Configuration(format!(
                        "unknown collection kind '{other}' for {}",
                        c.dir
                    )));
                }
            };
            // Kinds are keyed per collection so two sites can share a kind name.
            let key = format!("{}@{}", resolver.kind(), c.dir);
            registry.register(key.clone(), resolver);
            registry.add_collection(&c.dir, &key);
        }
        Ok(registry)
    }

    /// Register a resolver under `key`.
    pub fn register(&mut self, key: impl Into<String>, resolver: Box<dyn SourceResolver>) {
        let key = key.into();
        tracing::debug!("Registered {} resolver as {key}", resolver.kind());
        self.resolvers.insert(key, resolver);
    }

    /// Route files under `dir` to the resolver registered as `key`.
    pub fn add_collection(&mut self, dir: impl AsRef<Path>, key: &str) {
        self.collections.push((dir.as_ref().to_path_buf(), key.to_string()));
    }

    /// Locator for `path`, falling back to the path itself.
    pub fn locate(&self, path: &Path) -> String {
        let fallback = || path.to_string_lossy().into_owned();

        // Deepest matching collection wins.
        let Some((_, key)) = self
            .collections
            .iter()
            .filter(|(dir, _)| is_within(path, dir))
            .max_by_key(|(dir, _)| lexical(dir).components().count())
        else {
            tracing::debug!("{} is outside every collection, using raw path", path.display());
            return fallback();
        };
        let Some(resolver) = self.resolvers.get(key) else {
            tracing::warn!("No resolver registered as {key}, using raw path for {}", path.display());
            return fallback();
        };
        match resolver.resolve(path) {
            Ok(locator) => locator,
            Err(e) => {
                tracing::warn!("Could not resolve source for {}: {e}", path.display());
                fallback()
            }
        }
    }
}

/// `path` without `.` components.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Whether `path` lies under `dir`, however either is spelled.
///
/// Compares `.`-stripped forms first, then canonical forms when both
/// exist on disk (absolute vs relative, `..`, symlinks).
fn is_within(path: &Path, dir: &Path) -> bool {
    if lexical(path).starts_with(lexical(dir)) {
        return true;
    }
    match (path.canonicalize(), dir.canonicalize()) {
        (Ok(path), Ok(dir)) => path.starts_with(dir),
        _ => false,
    }
}
