//! Validation Gate: decides whether a form may be composed and submitted.

use thiserror::Error;

use crate::form::FormState;
use crate::schema::{FieldKind, GeneratorDefinition, Variant};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Submission {
    #[error("no generator selected")]
    NoGenerator,

    #[error("choose an output variant first")]
    VariantRequired,

    #[error("required fields are empty: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Required, path-relevant, non-document fields whose value is blank after
/// trimming. Document sets always count as satisfied.
pub fn missing_required<'g>(
    generator: &'g GeneratorDefinition,
    state: &FormState,
    variant: Option<Variant>,
) -> Vec<&'g str> {
    generator
        .relevant_fields(variant)
        .filter(|f| f.required && f.kind != FieldKind::DocumentSet)
        .filter(|f| state.value(&f.id).trim().is_empty())
        .map(|f| f.id.as_str())
        .collect()
}

pub fn check_submission(
    generator: Option<&GeneratorDefinition>,
    state: &FormState,
    variant: Option<Variant>,
) -> Result<(), Submission> {
    let generator = generator.ok_or(Submission::NoGenerator)?;

    if generator.is_variant_bearing() && variant.is_none() {
        return Err(Submission::VariantRequired);
    }

    let missing = missing_required(generator, state, variant);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Submission::MissingFields(
            missing.into_iter().map(String::from).collect(),
        ))
    }
}

pub fn is_submittable(
    generator: Option<&GeneratorDefinition>,
    state: &FormState,
    variant: Option<Variant>,
) -> bool {
    check_submission(generator, state, variant).is_ok()
}
