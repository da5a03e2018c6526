//! Form State Store: the current values of one generator's fields plus the
//! user's attached documents.
//!
//! The key set of `values` always equals the active generator's field ids.
//! Switching generators means building a fresh `FormState`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::GeneratorDefinition;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("no document at index {0}")]
    DocumentIndex(usize),

    #[error("'{0}' is not a text file")]
    NotText(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

impl Document {
    /// Only documents with both a name and content reach the composed prompt.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.content.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentField {
    Name,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    values: BTreeMap<String, String>,
    documents: Vec<Document>,
}

impl FormState {
    pub fn for_generator(generator: &GeneratorDefinition) -> Self {
        let values = generator
            .fields
            .iter()
            .map(|f| (f.id.clone(), f.initial_value()))
            .collect();
        Self {
            values,
            documents: Vec::new(),
        }
    }

    /// Builds a state from client-supplied parts. Keys the generator does not
    /// declare are dropped; missing keys keep their seeded value.
    pub fn from_parts(
        generator: &GeneratorDefinition,
        values: impl IntoIterator<Item = (String, String)>,
        documents: Vec<Document>,
    ) -> Self {
        let mut state = Self::for_generator(generator);
        for (id, value) in values {
            if let Some(slot) = state.values.get_mut(&id) {
                *slot = value;
            }
        }
        state.documents = documents;
        state
    }

    pub fn value(&self, id: &str) -> &str {
        self.values.get(id).map(String::as_str).unwrap_or("")
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn set_value(&mut self, id: &str, value: impl Into<String>) -> Result<(), FormError> {
        let slot = self
            .values
            .get_mut(id)
            .ok_or_else(|| FormError::UnknownField(id.to_string()))?;
        *slot = value.into();
        Ok(())
    }

    pub fn add_document(&mut self) {
        self.documents.push(Document::default());
    }

    pub fn update_document(
        &mut self,
        index: usize,
        field: DocumentField,
        value: impl Into<String>,
    ) -> Result<(), FormError> {
        let doc = self
            .documents
            .get_mut(index)
            .ok_or(FormError::DocumentIndex(index))?;
        match field {
            DocumentField::Name => doc.name = value.into(),
            DocumentField::Content => doc.content = value.into(),
        }
        Ok(())
    }

    pub fn remove_document(&mut self, index: usize) -> Result<Document, FormError> {
        if index >= self.documents.len() {
            return Err(FormError::DocumentIndex(index));
        }
        Ok(self.documents.remove(index))
    }

    /// Loads an uploaded file into a document slot. The file must be UTF-8
    /// text; its name is adopted only when the slot has none yet.
    pub fn attach_file(
        &mut self,
        index: usize,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), FormError> {
        let content =
            String::from_utf8(bytes).map_err(|_| FormError::NotText(file_name.to_string()))?;
        let doc = self
            .documents
            .get_mut(index)
            .ok_or(FormError::DocumentIndex(index))?;
        doc.content = content;
        if doc.name.is_empty() {
            doc.name = file_name.to_string();
        }
        Ok(())
    }
}
