//! Generator schema: the declarative description of every form-to-prompt tool.
//!
//! A generator is a titled list of typed fields plus an optional system-prompt
//! template. Field ids double as tag names in composed prompts, so they are
//! validated when the catalog loads (see `catalog.rs`).

pub mod catalog;

use serde::{Deserialize, Serialize};

pub use catalog::{Catalog, CatalogError, GeneratorSummary};

// ────────────────────────────────────────────────────────────────────────────
// Field-level types
// ────────────────────────────────────────────────────────────────────────────

/// Input widget kind. The legacy catalog vocabulary (`text`, `textarea`,
/// `select`, `document_upload`) is accepted on input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[serde(alias = "text")]
    ShortText,
    #[serde(alias = "textarea")]
    LongText,
    #[serde(alias = "select")]
    Choice,
    #[serde(alias = "document_upload")]
    DocumentSet,
}

/// One of the two mutually exclusive output modes of a variant-bearing generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Html,
    Markdown,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Html => "html",
            Variant::Markdown => "markdown",
        }
    }
}

/// Which variant flow a field belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathScope {
    #[default]
    Both,
    Html,
    Markdown,
}

impl PathScope {
    /// True when a field with this scope takes part in the given variant's flow.
    /// With no active variant every field is admitted.
    pub fn admits(&self, variant: Option<Variant>) -> bool {
        match (self, variant) {
            (PathScope::Both, _) | (_, None) => true,
            (PathScope::Html, Some(v)) => v == Variant::Html,
            (PathScope::Markdown, Some(v)) => v == Variant::Markdown,
        }
    }
}

/// How the composer treats a field. Declared in the schema rather than
/// hard-coded by field name.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    /// Emitted as a regular `<id>` section.
    #[default]
    Section,
    /// Emitted after every other section.
    MainInstruction,
    /// Only reaches the prompt through `{{ID}}` placeholders in the system template.
    SystemOnly,
    /// Value names a template in the template store.
    TemplateSelector,
    /// Inline template text; wins over the resolved template when non-empty.
    TemplateOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub label: String,
    #[serde(alias = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, alias = "options", skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub path: PathScope,
    #[serde(default)]
    pub role: FieldRole,
}

impl FieldDefinition {
    /// Initial form value: the declared default, else the first choice, else empty.
    pub fn initial_value(&self) -> String {
        if let Some(default) = self.default.as_deref().filter(|d| !d.is_empty()) {
            return default.to_string();
        }
        if self.kind == FieldKind::Choice {
            if let Some(first) = self.choices.first() {
                return first.clone();
            }
        }
        String::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generator-level types
// ────────────────────────────────────────────────────────────────────────────

/// Either one system template, or one per variant. A generator carrying the
/// per-variant form is variant-bearing and cannot be submitted until a
/// variant is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Single(String),
    PerVariant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markdown: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLinks {
    pub copy_label: String,
    pub link_label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<SystemPrompt>,
    pub fields: Vec<FieldDefinition>,
    pub output: OutputLinks,
}

impl GeneratorDefinition {
    pub fn is_variant_bearing(&self) -> bool {
        matches!(self.system_prompt, Some(SystemPrompt::PerVariant { .. }))
    }

    /// Proposal-family generators carry template selector fields and get a
    /// template section in composed prompts.
    pub fn is_proposal_family(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.role == FieldRole::TemplateSelector)
    }

    /// The raw system template for the active variant, if any.
    pub fn system_template(&self, variant: Option<Variant>) -> Option<&str> {
        match (&self.system_prompt, variant) {
            (Some(SystemPrompt::Single(t)), _) => Some(t.as_str()),
            (Some(SystemPrompt::PerVariant { html, .. }), Some(Variant::Html)) => html.as_deref(),
            (Some(SystemPrompt::PerVariant { markdown, .. }), Some(Variant::Markdown)) => {
                markdown.as_deref()
            }
            _ => None,
        }
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Fields taking part in the given variant's flow, in declared order.
    pub fn relevant_fields(
        &self,
        variant: Option<Variant>,
    ) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(move |f| f.path.admits(variant))
    }

    fn role_field(&self, role: FieldRole, variant: Option<Variant>) -> Option<&FieldDefinition> {
        self.relevant_fields(variant).find(|f| f.role == role)
    }

    pub fn main_instruction(&self, variant: Option<Variant>) -> Option<&FieldDefinition> {
        self.role_field(FieldRole::MainInstruction, variant)
    }

    pub fn template_selector(&self, variant: Option<Variant>) -> Option<&FieldDefinition> {
        self.role_field(FieldRole::TemplateSelector, variant)
    }

    pub fn template_override(&self, variant: Option<Variant>) -> Option<&FieldDefinition> {
        self.role_field(FieldRole::TemplateOverride, variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, kind: FieldKind) -> FieldDefinition {
        FieldDefinition {
            id: id.to_string(),
            label: id.to_string(),
            kind,
            placeholder: None,
            required: false,
            choices: vec![],
            default: None,
            path: PathScope::Both,
            role: FieldRole::Section,
        }
    }

    #[test]
    fn test_initial_value_prefers_default() {
        let mut f = field("tone", FieldKind::Choice);
        f.choices = vec!["formal".into(), "casual".into()];
        f.default = Some("casual".into());
        assert_eq!(f.initial_value(), "casual");
    }

    #[test]
    fn test_initial_value_falls_back_to_first_choice() {
        let mut f = field("tone", FieldKind::Choice);
        f.choices = vec!["formal".into(), "casual".into()];
        assert_eq!(f.initial_value(), "formal");
    }

    #[test]
    fn test_initial_value_empty_for_text() {
        assert_eq!(field("task", FieldKind::LongText).initial_value(), "");
    }

    #[test]
    fn test_path_scope_admits() {
        assert!(PathScope::Both.admits(Some(Variant::Html)));
        assert!(PathScope::Html.admits(Some(Variant::Html)));
        assert!(!PathScope::Html.admits(Some(Variant::Markdown)));
        assert!(!PathScope::Markdown.admits(Some(Variant::Html)));
        assert!(PathScope::Markdown.admits(None));
    }

    #[test]
    fn test_legacy_field_vocabulary_deserializes() {
        let f: FieldDefinition = serde_json::from_str(
            r#"{"id":"tpl","label":"Template","type":"select","options":["a","b"],"path":"html"}"#,
        )
        .unwrap();
        assert_eq!(f.kind, FieldKind::Choice);
        assert_eq!(f.choices, vec!["a", "b"]);
        assert_eq!(f.path, PathScope::Html);
        assert_eq!(f.role, FieldRole::Section);
    }

    #[test]
    fn test_system_prompt_untagged_forms() {
        let single: SystemPrompt = serde_json::from_str(r#""Write about {{TOPIC}}""#).unwrap();
        assert!(matches!(single, SystemPrompt::Single(_)));

        let per: SystemPrompt =
            serde_json::from_str(r#"{"html":"H","markdown":"M"}"#).unwrap();
        match per {
            SystemPrompt::PerVariant { html, markdown } => {
                assert_eq!(html.as_deref(), Some("H"));
                assert_eq!(markdown.as_deref(), Some("M"));
            }
            other => panic!("expected per-variant prompt, got {other:?}"),
        }
    }
}
