//! Template Content Resolver: looks up named base templates for the
//! proposal family of generators.
//!
//! Resolution never fails outward: a missing template degrades to a
//! `TemplateResolution::Failed` carrying a readable message, and the rest of
//! the form keeps working.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Selector value meaning "use the inline override field instead".
pub const CUSTOM_TEMPLATE: &str = "custom";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("failed to read template '{name}': {message}")]
    Unavailable { name: String, message: String },
}

/// Anything that can hand back raw template text by name.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<String, TemplateError>;
}

/// Outcome of resolving a selector value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateResolution {
    /// Empty selector or `custom`; nothing was fetched.
    Inline,
    Loaded(String),
    Failed(String),
}

impl TemplateResolution {
    /// Text to compose with. Empty unless a template was loaded.
    pub fn text(&self) -> &str {
        match self {
            TemplateResolution::Loaded(text) => text,
            _ => "",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TemplateResolution::Failed(message) => Some(message),
            _ => None,
        }
    }
}

pub async fn resolve(source: &dyn TemplateSource, name: &str) -> TemplateResolution {
    if name.is_empty() || name == CUSTOM_TEMPLATE {
        return TemplateResolution::Inline;
    }

    match source.fetch(name).await {
        Ok(text) => {
            debug!("Resolved template '{}' ({} bytes)", name, text.len());
            TemplateResolution::Loaded(text)
        }
        Err(e) => {
            warn!("Could not load template '{}': {}", name, e);
            TemplateResolution::Failed(format!("Could not load template \"{name}\"."))
        }
    }
}

/// Template store backed by a directory; one file per template name.
#[derive(Debug, Clone)]
pub struct DirTemplateStore {
    root: PathBuf,
}

impl DirTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names must stay inside the store: no separators, no dot-prefixed names.
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(|c: char| c == '/' || c == '\\')
            && !name.contains("..");
        plain.then(|| self.root.join(name))
    }
}

#[async_trait]
impl TemplateSource for DirTemplateStore {
    async fn fetch(&self, name: &str) -> Result<String, TemplateError> {
        let path = self
            .locate(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound(name.to_string()))
            }
            Err(e) => Err(TemplateError::Unavailable {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Reads the reference context file. A missing or unreadable file yields
/// empty text.
pub async fn load_context_text(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Reference context {} unavailable: {}", path.display(), e);
            String::new()
        }
    }
}
