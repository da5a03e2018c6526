//! Per-view studio session: one generator's form, its template state and the
//! running conversation with the model.
//!
//! Owned by whoever drives the view; nothing here is shared or global.

use thiserror::Error;
use tracing::{info, warn};

use super::{ClientError, StudioClient};
use crate::compose::{self, ComposeOptions};
use crate::form::{FormError, FormState};
use crate::llm_client::ChatTurn;
use crate::relay::{strip_code_fences, GenerateRequest};
use crate::schema::{GeneratorDefinition, Variant};
use crate::templates::{self, TemplateResolution, TemplateSource};
use crate::validation::{self, Submission};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Invalid(#[from] Submission),

    #[error("nothing to refine")]
    NothingToRefine,

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct StudioSession {
    generator: GeneratorDefinition,
    form: FormState,
    variant: Option<Variant>,
    include_context: bool,
    context_text: String,
    template: TemplateResolution,
    conversation: Vec<ChatTurn>,
    refinement: String,
    response: String,
    error: Option<String>,
    executing: bool,
}

impl StudioSession {
    pub fn new(generator: GeneratorDefinition) -> Self {
        Self {
            form: FormState::for_generator(&generator),
            generator,
            variant: None,
            include_context: true,
            context_text: String::new(),
            template: TemplateResolution::Inline,
            conversation: Vec::new(),
            refinement: String::new(),
            response: String::new(),
            error: None,
            executing: false,
        }
    }

    /// Switches generator and starts over. Context text is kept.
    pub fn select_generator(&mut self, generator: GeneratorDefinition) {
        let context_text = std::mem::take(&mut self.context_text);
        let include_context = self.include_context;
        *self = Self::new(generator);
        self.context_text = context_text;
        self.include_context = include_context;
    }

    pub fn generator(&self) -> &GeneratorDefinition {
        &self.generator
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    /// Document edits go straight to the form; they never affect templates.
    pub fn form_mut(&mut self) -> &mut FormState {
        &mut self.form
    }

    pub fn variant(&self) -> Option<Variant> {
        self.variant
    }

    pub fn include_context(&self) -> bool {
        self.include_context
    }

    pub fn set_include_context(&mut self, include: bool) {
        self.include_context = include;
    }

    pub fn context_text(&self) -> &str {
        &self.context_text
    }

    pub fn set_context_text(&mut self, text: impl Into<String>) {
        self.context_text = text.into();
    }

    /// Fetches the reference context once for this view. Failures leave it
    /// empty.
    pub async fn load_context(&mut self, client: &StudioClient) {
        self.context_text = match client.context_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Reference context unavailable: {}", e);
                String::new()
            }
        };
    }

    pub fn template(&self) -> &TemplateResolution {
        &self.template
    }

    pub fn template_error(&self) -> Option<&str> {
        self.template.error()
    }

    pub fn conversation(&self) -> &[ChatTurn] {
        &self.conversation
    }

    pub fn refinement_input(&self) -> &str {
        &self.refinement
    }

    pub fn set_refinement_input(&mut self, text: impl Into<String>) {
        self.refinement = text.into();
    }

    /// Latest model output with wrapping code fences removed.
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Form values are kept across variant changes; only the template is
    /// re-resolved.
    pub async fn choose_variant(&mut self, variant: Variant, source: &dyn TemplateSource) {
        if !self.generator.is_variant_bearing() {
            return;
        }
        self.variant = Some(variant);
        self.refresh_template(source).await;
    }

    pub async fn set_field(
        &mut self,
        id: &str,
        value: impl Into<String>,
        source: &dyn TemplateSource,
    ) -> Result<(), FormError> {
        self.form.set_value(id, value)?;
        if self.active_selector().is_some_and(|selector| selector == id) {
            self.refresh_template(source).await;
        }
        Ok(())
    }

    pub fn is_submittable(&self) -> bool {
        validation::is_submittable(Some(&self.generator), &self.form, self.variant)
    }

    pub fn compose(&self) -> String {
        compose::compose(
            &self.generator,
            &self.form,
            ComposeOptions {
                include_context: self.include_context,
                context_text: &self.context_text,
                template_text: self.template.text(),
                variant: self.variant,
            },
        )
    }

    /// Sends the composed prompt as a fresh request. `on_update` sees the
    /// cleaned response after every chunk. On success the conversation is
    /// replaced by the prompt and the reply.
    pub async fn execute<F>(&mut self, client: &StudioClient, on_update: F) -> Result<(), SessionError>
    where
        F: FnMut(&str),
    {
        validation::check_submission(Some(&self.generator), &self.form, self.variant)?;

        let prompt = self.compose();
        let request = GenerateRequest::fresh(prompt.clone());
        match self.run(client, &request, on_update).await {
            Ok(output) => {
                self.conversation = vec![ChatTurn::user(prompt), ChatTurn::assistant(output)];
                info!("Generation finished for '{}'", self.generator.id);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn can_refine(&self) -> bool {
        !self.refinement.trim().is_empty() && !self.executing
    }

    /// Sends the conversation plus the refinement input, with the rendered
    /// system prompt attached on every turn.
    pub async fn refine<F>(&mut self, client: &StudioClient, on_update: F) -> Result<(), SessionError>
    where
        F: FnMut(&str),
    {
        if !self.can_refine() {
            return Err(SessionError::NothingToRefine);
        }

        let mut history = self.conversation.clone();
        history.push(ChatTurn::user(self.refinement.trim()));
        let system = compose::render_system_prompt(&self.generator, &self.form, self.variant);
        let request = GenerateRequest::conversation(
            history.clone(),
            Some(system).filter(|s| !s.is_empty()),
        );

        match self.run(client, &request, on_update).await {
            Ok(output) => {
                history.push(ChatTurn::assistant(output));
                self.conversation = history;
                self.refinement.clear();
                info!(
                    "Refinement finished for '{}' ({} turns)",
                    self.generator.id,
                    self.conversation.len()
                );
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run<F>(
        &mut self,
        client: &StudioClient,
        request: &GenerateRequest,
        mut on_update: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        let mut flight = InFlight::begin(self);

        let mut chunks = client.open_stream(request).await?;
        let mut raw = String::new();
        while let Some(chunk) = chunks.recv().await {
            raw.push_str(&chunk?);
            flight.session.response = strip_code_fences(&raw);
            on_update(&flight.session.response);
        }

        Ok(flight.finish())
    }

    fn fail(&mut self, error: ClientError) -> SessionError {
        warn!("Generation failed for '{}': {}", self.generator.id, error);
        self.executing = false;
        self.response.clear();
        self.error = Some(error.to_string());
        SessionError::Client(error)
    }

    fn active_selector(&self) -> Option<&str> {
        self.variant
            .and_then(|v| self.generator.template_selector(Some(v)))
            .map(|f| f.id.as_str())
    }

    async fn refresh_template(&mut self, source: &dyn TemplateSource) {
        self.template = match self.active_selector() {
            Some(selector) => templates::resolve(source, self.form.value(selector)).await,
            None => TemplateResolution::Inline,
        };
    }
}

/// Marks a session busy for the life of one invocation. Unless finished,
/// dropping it (error, or the caller dropping the future) clears the busy
/// flag and any partial response.
struct InFlight<'s> {
    session: &'s mut StudioSession,
    finished: bool,
}

impl<'s> InFlight<'s> {
    fn begin(session: &'s mut StudioSession) -> Self {
        session.executing = true;
        session.response.clear();
        session.error = None;
        Self {
            session,
            finished: false,
        }
    }

    fn finish(mut self) -> String {
        self.finished = true;
        self.session.executing = false;
        self.session.response.clone()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.executing = false;
            self.session.response.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::routes::build_router;
    use crate::schema::Catalog;
    use crate::templates::TemplateError;
    use crate::testing::{test_state, ScriptedModel, TEST_HTML_TEMPLATE, TEST_PASSWORD};

    fn generator(id: &str) -> GeneratorDefinition {
        Catalog::builtin().unwrap().get(id).unwrap().clone()
    }

    /// Serves the real router on an ephemeral port and logs a client in.
    async fn serve(model: ScriptedModel) -> (tempfile::TempDir, Arc<ScriptedModel>, StudioClient) {
        let model = Arc::new(model);
        let (dir, state) = test_state(model.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        let mut client = StudioClient::new(format!("http://{addr}")).unwrap();
        client.login(TEST_PASSWORD).await.unwrap();
        (dir, model, client)
    }

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl TemplateSource for CountingSource {
        async fn fetch(&self, name: &str) -> Result<String, TemplateError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("template {name}"))
        }
    }

    #[tokio::test]
    async fn test_execute_streams_and_records_turn_pair() {
        let (_dir, model, client) =
            serve(ScriptedModel::replying(&["```markdown\n", "# Title", "\nbody\n```"])).await;
        let mut session = StudioSession::new(generator("prompt-builder"));
        session.load_context(&client).await;
        let source = CountingSource(AtomicUsize::new(0));
        session.set_field("task", "Summarize", &source).await.unwrap();
        assert!(session.is_submittable());

        let mut updates = Vec::new();
        session
            .execute(&client, |text| updates.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(updates.last().map(String::as_str), Some("# Title\nbody"));
        assert_eq!(session.response(), "# Title\nbody");
        assert!(session.error().is_none());
        assert!(!session.is_executing());

        let prompt = session.compose();
        assert_eq!(
            session.conversation(),
            &[ChatTurn::user(prompt.clone()), ChatTurn::assistant("# Title\nbody")]
        );
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].turns, vec![ChatTurn::user(prompt)]);
        assert_eq!(source.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_failure_keeps_history() {
        let (_dir, _, client) = serve(ScriptedModel::breaking_after(&["partial"])).await;
        let mut session = StudioSession::new(generator("prompt-builder"));
        let source = CountingSource(AtomicUsize::new(0));
        session.set_field("task", "Summarize", &source).await.unwrap();

        let result = session.execute(&client, |_| {}).await;
        assert!(matches!(result, Err(SessionError::Client(_))));
        assert!(session.error().is_some());
        assert_eq!(session.response(), "");
        assert!(session.conversation().is_empty());
        assert!(!session.is_executing());
    }

    #[tokio::test]
    async fn test_execute_refuses_incomplete_form() {
        let client = StudioClient::new("http://127.0.0.1:9").unwrap();
        let mut session = StudioSession::new(generator("email-writer"));
        let result = session.execute(&client, |_| {}).await;
        assert!(matches!(
            result,
            Err(SessionError::Invalid(Submission::MissingFields(_)))
        ));
        assert!(session.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_refine_resends_system_prompt_and_extends_history() {
        let (_dir, model, client) = serve(ScriptedModel::replying(&["v1"])).await;
        let mut session = StudioSession::new(generator("prompt-builder"));
        let source = CountingSource(AtomicUsize::new(0));
        session.set_field("task", "Summarize", &source).await.unwrap();
        session.execute(&client, |_| {}).await.unwrap();

        assert!(!session.can_refine());
        session.set_refinement_input("  shorter  ");
        assert!(session.can_refine());
        session.refine(&client, |_| {}).await.unwrap();

        let prompt = session.compose();
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        let system = requests[1].system.clone().unwrap();
        assert!(system.contains("balanced depth"));
        assert_eq!(
            requests[1].turns,
            vec![
                ChatTurn::user(prompt.clone()),
                ChatTurn::assistant("v1"),
                ChatTurn::user("shorter"),
            ]
        );
        assert_eq!(session.conversation().len(), 4);
        assert_eq!(session.conversation()[3], ChatTurn::assistant("v1"));
        assert_eq!(session.refinement_input(), "");
    }

    #[tokio::test]
    async fn test_cancelled_refine_leaves_session_idle() {
        let (_dir, model, client) = serve(ScriptedModel::stalling_after(&["v1"])).await;
        let mut session = StudioSession::new(generator("prompt-builder"));
        let source = CountingSource(AtomicUsize::new(0));
        session.set_field("task", "Summarize", &source).await.unwrap();

        // Each reply stalls after its chunk, so the caller gives up on it.
        let mut seen = Vec::new();
        let first = tokio::time::timeout(
            Duration::from_millis(300),
            session.execute(&client, |text| seen.push(text.to_string())),
        )
        .await;
        assert!(first.is_err());
        assert_eq!(seen, vec!["v1".to_string()]);
        assert!(!session.is_executing());
        assert_eq!(session.response(), "");
        assert!(session.conversation().is_empty());

        session.set_refinement_input("shorter");
        assert!(session.can_refine());
        let second =
            tokio::time::timeout(Duration::from_millis(300), session.refine(&client, |_| {})).await;
        assert!(second.is_err());
        assert!(!session.is_executing());
        assert!(session.can_refine());
        assert_eq!(session.refinement_input(), "shorter");
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_refine_requires_input() {
        let client = StudioClient::new("http://127.0.0.1:9").unwrap();
        let mut session = StudioSession::new(generator("prompt-builder"));
        session.set_refinement_input("   ");
        assert!(matches!(
            session.refine(&client, |_| {}).await,
            Err(SessionError::NothingToRefine)
        ));
    }

    #[tokio::test]
    async fn test_variant_choice_resolves_templates_over_http() {
        let (_dir, _, client) = serve(ScriptedModel::replying(&[])).await;
        let mut session = StudioSession::new(generator("proposal-generator"));
        assert!(!session.is_submittable());

        session.choose_variant(Variant::Html, &client).await;
        assert_eq!(session.template().text(), TEST_HTML_TEMPLATE);

        session.choose_variant(Variant::Markdown, &client).await;
        assert_eq!(
            session.template_error(),
            Some("Could not load template \"proposal.md\".")
        );

        session.set_field("md_template", "custom", &client).await.unwrap();
        assert_eq!(session.template(), &TemplateResolution::Inline);
    }

    #[tokio::test]
    async fn test_only_selector_edits_trigger_resolution() {
        let source = CountingSource(AtomicUsize::new(0));
        let mut session = StudioSession::new(generator("proposal-generator"));

        // No variant yet: the selector is not active.
        session.set_field("html_template", "overview.html", &source).await.unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 0);

        session.choose_variant(Variant::Html, &source).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        session.set_field("client_name", "Acme", &source).await.unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        session.set_field("html_template", "overview.html", &source).await.unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
        assert_eq!(session.template().text(), "template overview.html");

        // The markdown selector is off-path while the HTML variant is active.
        session.set_field("md_template", "proposal.md", &source).await.unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_variant_change_keeps_values_generator_change_resets() {
        let source = CountingSource(AtomicUsize::new(0));
        let mut session = StudioSession::new(generator("proposal-generator"));
        session.set_context_text("house style");
        session.set_field("client_name", "Acme", &source).await.unwrap();
        session.choose_variant(Variant::Markdown, &source).await;
        session.choose_variant(Variant::Html, &source).await;
        assert_eq!(session.form().value("client_name"), "Acme");

        session.select_generator(generator("email-writer"));
        assert_eq!(session.generator().id, "email-writer");
        assert_eq!(session.variant(), None);
        assert_eq!(session.template(), &TemplateResolution::Inline);
        assert_eq!(session.form().value("recipient"), "");
        assert_eq!(session.context_text(), "house style");
    }

    #[tokio::test]
    async fn test_variant_ignored_for_single_prompt_generators() {
        let source = CountingSource(AtomicUsize::new(0));
        let mut session = StudioSession::new(generator("email-writer"));
        session.choose_variant(Variant::Html, &source).await;
        assert_eq!(session.variant(), None);
    }
}
