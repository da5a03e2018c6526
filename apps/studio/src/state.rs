use std::path::PathBuf;
use std::sync::Arc;

use crate::llm_client::ChatModel;
use crate::schema::Catalog;
use crate::templates::DirTemplateStore;

/// Session gate settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub password: String,
    pub token: String,
    pub secure_cookie: bool,
}

/// Shared application state injected into all route handlers via Axum extractors.
/// Read-only after startup; nothing here is per-user.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub templates: DirTemplateStore,
    /// Reference context file; re-read on every composition, absence is non-fatal.
    pub context_file: PathBuf,
    /// Pluggable model backend. Default: `LlmClient`.
    pub model: Arc<dyn ChatModel>,
    pub auth: AuthSettings,
}
