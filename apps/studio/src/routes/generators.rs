//! Axum route handlers for the generator catalog, prompt composition and the
//! static text resources composition reads.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compose::{compose, ComposeOptions};
use crate::errors::AppError;
use crate::form::{Document, FormState};
use crate::schema::{GeneratorDefinition, GeneratorSummary, Variant};
use crate::state::AppState;
use crate::templates::{self, TemplateError, TemplateResolution, TemplateSource};
use crate::validation::check_submission;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRequest {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default = "default_include_context")]
    pub include_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
}

fn default_include_context() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeResponse {
    pub prompt: String,
    /// Set when the selected base template could not be loaded; the prompt
    /// was composed without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_error: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/generators
pub async fn handle_list_generators(State(state): State<AppState>) -> Json<Vec<GeneratorSummary>> {
    Json(state.catalog.summaries())
}

/// GET /api/generators/:id
pub async fn handle_get_generator(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GeneratorDefinition>, AppError> {
    let generator = lookup(&state, &id)?;
    Ok(Json(generator.clone()))
}

/// POST /api/generators/:id/compose
///
/// Validates the submitted form, resolves the base template and reference
/// context, and returns the composed prompt.
pub async fn handle_compose(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ComposeRequest>,
) -> Result<Json<ComposeResponse>, AppError> {
    let generator = lookup(&state, &id)?;
    let variant = request.variant.filter(|_| generator.is_variant_bearing());
    let form = FormState::from_parts(generator, request.values, request.documents);

    check_submission(Some(generator), &form, variant)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let resolution = match variant.and_then(|v| generator.template_selector(Some(v))) {
        Some(selector) => templates::resolve(&state.templates, form.value(&selector.id)).await,
        None => TemplateResolution::Inline,
    };

    let context_text = if request.include_context {
        templates::load_context_text(&state.context_file).await
    } else {
        String::new()
    };

    let prompt = compose(
        generator,
        &form,
        ComposeOptions {
            include_context: request.include_context,
            context_text: &context_text,
            template_text: resolution.text(),
            variant,
        },
    );
    info!(
        "Composed prompt for '{}' (variant: {:?}, {} chars)",
        generator.id,
        variant,
        prompt.len()
    );

    Ok(Json(ComposeResponse {
        prompt,
        template_error: resolution.error().map(String::from),
    }))
}

/// GET /templates/:name
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let text = state.templates.fetch(&name).await.map_err(|e| match e {
        TemplateError::NotFound(name) => AppError::NotFound(format!("Template {name} not found")),
        other => AppError::Internal(other.into()),
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// GET /context
pub async fn handle_get_context(State(state): State<AppState>) -> impl IntoResponse {
    let text = templates::load_context_text(&state.context_file).await;
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text)
}

fn lookup<'a>(state: &'a AppState, id: &str) -> Result<&'a GeneratorDefinition, AppError> {
    state
        .catalog
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Generator {id} not found")))
}
