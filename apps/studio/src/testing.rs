//! Shared fixtures for in-crate tests: a scripted model and a ready-made
//! `AppState` over a temporary public directory.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::llm_client::{ChatModel, ChatRequest, ChunkStream, LlmError};
use crate::schema::Catalog;
use crate::state::{AppState, AuthSettings};
use crate::templates::DirTemplateStore;

pub const TEST_PASSWORD: &str = "open-sesame";
pub const TEST_TOKEN: &str = "tok-test";
pub const TEST_CONTEXT: &str = "House style: plain words.";
pub const TEST_HTML_TEMPLATE: &str = "<main>{{BODY}}</main>";

/// Replays a fixed list of chunks and records what it was asked.
pub struct ScriptedModel {
    chunks: Vec<Result<String, String>>,
    fail_open: bool,
    stall: bool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
            fail_open: false,
            stall: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Streams `chunks`, then fails.
    pub fn breaking_after(chunks: &[&str]) -> Self {
        let mut model = Self::replying(chunks);
        model.chunks.push(Err("upstream reset".to_string()));
        model
    }

    /// Streams `chunks`, then never yields again.
    pub fn stalling_after(chunks: &[&str]) -> Self {
        let mut model = Self::replying(chunks);
        model.stall = true;
        model
    }

    pub fn unavailable() -> Self {
        Self {
            chunks: Vec::new(),
            fail_open: true,
            stall: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        if self.fail_open {
            return Err(LlmError::Api {
                status: 503,
                message: "model unavailable".to_string(),
            });
        }
        let items: Vec<Result<String, LlmError>> = self
            .chunks
            .iter()
            .map(|c| c.clone().map_err(LlmError::Stream))
            .collect();
        if self.stall {
            return Ok(stream::iter(items).chain(stream::pending()).boxed());
        }
        Ok(stream::iter(items).boxed())
    }
}

/// State over a temp dir holding `templates/overview.html` and a context file.
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn test_state(model: Arc<ScriptedModel>) -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir(&templates).unwrap();
    std::fs::write(templates.join("overview.html"), TEST_HTML_TEMPLATE).unwrap();
    let context_file = dir.path().join("context.txt");
    std::fs::write(&context_file, TEST_CONTEXT).unwrap();

    let state = AppState {
        catalog: Arc::new(Catalog::builtin().unwrap()),
        templates: DirTemplateStore::new(templates),
        context_file,
        model,
        auth: AuthSettings {
            password: TEST_PASSWORD.to_string(),
            token: TEST_TOKEN.to_string(),
            secure_cookie: false,
        },
    };
    (dir, state)
}

pub fn session_cookie_header() -> String {
    format!("{}={}", crate::auth::SESSION_COOKIE, TEST_TOKEN)
}
