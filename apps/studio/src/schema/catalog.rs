use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{FieldKind, FieldRole, GeneratorDefinition, Variant};

/// Catalog compiled into the binary; used when no `CATALOG_PATH` is configured.
const BUILTIN_CATALOG: &str = include_str!("../../catalog/generators.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate generator id '{0}'")]
    DuplicateGenerator(String),

    #[error("generator '{generator}' declares field '{field}' twice")]
    DuplicateField { generator: String, field: String },

    #[error("generator '{generator}': field id '{field}' is not a valid tag name")]
    InvalidFieldId { generator: String, field: String },

    #[error("generator '{generator}': choice field '{field}' has no choices")]
    EmptyChoices { generator: String, field: String },

    #[error("generator '{generator}' has more than one main instruction field")]
    AmbiguousMainInstruction { generator: String },
}

/// Lightweight listing entry for the home view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub variant_bearing: bool,
}

/// Read-only list of generators, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    generators: Vec<GeneratorDefinition>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let catalog = Self::from_json(&raw)?;
        info!(
            "Loaded {} generators from {}",
            catalog.generators.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let generators: Vec<GeneratorDefinition> = serde_json::from_str(raw)?;
        validate(&generators)?;
        Ok(Self { generators })
    }

    pub fn get(&self, id: &str) -> Option<&GeneratorDefinition> {
        self.generators.iter().find(|g| g.id == id)
    }

    pub fn generators(&self) -> &[GeneratorDefinition] {
        &self.generators
    }

    pub fn summaries(&self) -> Vec<GeneratorSummary> {
        self.generators
            .iter()
            .map(|g| GeneratorSummary {
                id: g.id.clone(),
                title: g.title.clone(),
                description: g.description.clone(),
                icon: g.icon.clone(),
                variant_bearing: g.is_variant_bearing(),
            })
            .collect()
    }
}

fn validate(generators: &[GeneratorDefinition]) -> Result<(), CatalogError> {
    let mut seen_generators = HashSet::new();

    for generator in generators {
        if !seen_generators.insert(generator.id.as_str()) {
            return Err(CatalogError::DuplicateGenerator(generator.id.clone()));
        }

        let mut seen_fields = HashSet::new();
        for field in &generator.fields {
            if !seen_fields.insert(field.id.as_str()) {
                return Err(CatalogError::DuplicateField {
                    generator: generator.id.clone(),
                    field: field.id.clone(),
                });
            }
            if !is_tag_name(&field.id) {
                return Err(CatalogError::InvalidFieldId {
                    generator: generator.id.clone(),
                    field: field.id.clone(),
                });
            }
            if field.kind == FieldKind::Choice && field.choices.is_empty() {
                return Err(CatalogError::EmptyChoices {
                    generator: generator.id.clone(),
                    field: field.id.clone(),
                });
            }
        }

        let flows: &[Option<Variant>] = if generator.is_variant_bearing() {
            &[Some(Variant::Html), Some(Variant::Markdown)]
        } else {
            &[None]
        };
        for &variant in flows {
            let mains = generator
                .relevant_fields(variant)
                .filter(|f| f.role == FieldRole::MainInstruction)
                .count();
            if mains > 1 {
                return Err(CatalogError::AmbiguousMainInstruction {
                    generator: generator.id.clone(),
                });
            }
        }
    }

    Ok(())
}

/// `[A-Za-z_][A-Za-z0-9_-]*`
fn is_tag_name(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
