//! Prompt Composer: turns a generator schema plus the user's form state into
//! one tagged text block.
//!
//! Section order is fixed:
//! system instructions → reference context → base template → regular fields →
//! documents → main instruction.
//!
//! Composition is pure. Anything that needs I/O (template text, the context
//! file) is resolved by the caller and passed in through `ComposeOptions`.

use crate::form::FormState;
use crate::schema::{FieldKind, FieldRole, GeneratorDefinition, Variant};

pub const SYSTEM_TAG: &str = "system_instructions";
pub const CONTEXT_TAG: &str = "reference_context";
pub const DOCUMENTS_TAG: &str = "context_docs";
pub const HTML_TEMPLATE_TAG: &str = "base_html_template";
pub const MARKDOWN_TEMPLATE_TAG: &str = "markdown_template";

/// Inputs resolved outside the composer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeOptions<'a> {
    pub include_context: bool,
    /// Reference context text; may be empty when the file is missing.
    pub context_text: &'a str,
    /// Text of the resolved base template; empty when none loaded.
    pub template_text: &'a str,
    pub variant: Option<Variant>,
}

pub fn compose(
    generator: &GeneratorDefinition,
    state: &FormState,
    options: ComposeOptions<'_>,
) -> String {
    let variant = options.variant;
    let mut sections: Vec<String> = Vec::new();

    let system = render_system_prompt(generator, state, variant);
    if !system.is_empty() {
        sections.push(tagged(SYSTEM_TAG, &system));
    }

    // Emitted even when empty once the toggle is on.
    if options.include_context {
        sections.push(tagged(CONTEXT_TAG, options.context_text));
    }

    if let Some(section) = template_section(generator, state, options) {
        sections.push(section);
    }

    for field in generator.relevant_fields(variant) {
        if field.role != FieldRole::Section || field.kind == FieldKind::DocumentSet {
            continue;
        }
        let value = state.value(&field.id);
        if !value.is_empty() {
            sections.push(tagged(&field.id, value));
        }
    }

    let docs: String = state
        .documents()
        .iter()
        .filter(|d| d.is_complete())
        .map(|d| {
            let tag = sanitize_tag_name(&d.name);
            format!("  <{tag}>\n{}\n  </{tag}>\n", d.content)
        })
        .collect();
    if !docs.is_empty() {
        sections.push(format!("<{DOCUMENTS_TAG}>\n{docs}</{DOCUMENTS_TAG}>"));
    }

    if let Some(main) = generator.main_instruction(variant) {
        let value = state.value(&main.id);
        if !value.is_empty() {
            sections.push(tagged(&main.id, value));
        }
    }

    sections.join("\n\n").trim().to_string()
}

/// The system template for the active variant with `{{FIELD_ID}}`
/// placeholders filled in. Empty when the generator has none.
pub fn render_system_prompt(
    generator: &GeneratorDefinition,
    state: &FormState,
    variant: Option<Variant>,
) -> String {
    generator
        .system_template(variant)
        .map(|template| {
            let values = generator
                .fields
                .iter()
                .map(|f| (f.id.as_str(), state.value(&f.id)));
            substitute_placeholders(template, values)
        })
        .unwrap_or_default()
}

/// Replaces every `{{KEY}}` (key uppercased) with its value, one key at a
/// time in the order given. A value that itself contains a later key's
/// placeholder gets that placeholder filled too. Placeholders with no
/// matching key are left as written.
pub fn substitute_placeholders<'a>(
    template: &str,
    values: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{{{}}}}}", key.to_uppercase());
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, value);
        }
    }
    out
}

/// Lowercases and maps every character outside `[a-z0-9_]` to `_`.
pub fn sanitize_tag_name(name: &str) -> String {
    let tag: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if tag.is_empty() {
        "document".to_string()
    } else {
        tag
    }
}

/// Ids of fields that never appear as a regular `<id>` section for the given
/// variant: the main instruction, system-only fields, template selectors and
/// overrides, and document sets.
pub fn excluded_fields(generator: &GeneratorDefinition, variant: Option<Variant>) -> Vec<&str> {
    generator
        .relevant_fields(variant)
        .filter(|f| f.role != FieldRole::Section || f.kind == FieldKind::DocumentSet)
        .map(|f| f.id.as_str())
        .collect()
}

fn template_section(
    generator: &GeneratorDefinition,
    state: &FormState,
    options: ComposeOptions<'_>,
) -> Option<String> {
    let variant = options.variant?;
    if !generator.is_proposal_family() {
        return None;
    }

    let override_text = generator
        .template_override(Some(variant))
        .map(|f| state.value(&f.id))
        .unwrap_or("");
    let text = if override_text.is_empty() {
        options.template_text
    } else {
        override_text
    };
    if text.is_empty() {
        return None;
    }

    Some(match variant {
        Variant::Html => format!(
            "<{HTML_TEMPLATE_TAG}>\n<![CDATA[\n{text}\n]]>\n\n</{HTML_TEMPLATE_TAG}>"
        ),
        Variant::Markdown => tagged(MARKDOWN_TEMPLATE_TAG, text),
    })
}

fn tagged(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{body}\n</{tag}>")
}
