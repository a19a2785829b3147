//! Multi-document splitting and schema-agnostic decoding.
//!
//! Bundles mix arbitrary resource kinds, so a document is decoded into a
//! generic tree and only the fields needed to address it are extracted.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Separator between documents inside a bundle.
pub const DOCUMENT_SEPARATOR: &str = "\n---";

/// Errors produced while decoding a single document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document cannot be represented as JSON: {0}")]
    Unrepresentable(#[from] serde_json::Error),

    #[error("document is not a mapping")]
    NotAMapping,

    #[error("document is missing string field {0}")]
    MissingField(&'static str),
}

/// Identity of a cluster object: group/version, kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A decoded document: addressing fields plus the full field tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// The whole document, sent verbatim as the apply body.
    pub body: Value,
}

impl ManifestObject {
    /// Extract the addressing fields from a generic tree.
    pub fn from_value(body: Value) -> Result<Self, DecodeError> {
        if !body.is_object() {
            return Err(DecodeError::NotAMapping);
        }
        let api_version = string_field(&body, &["apiVersion"])
            .ok_or(DecodeError::MissingField("apiVersion"))?;
        let kind = string_field(&body, &["kind"]).ok_or(DecodeError::MissingField("kind"))?;
        let name = string_field(&body, &["metadata", "name"])
            .ok_or(DecodeError::MissingField("metadata.name"))?;
        let namespace = string_field(&body, &["metadata", "namespace"]).filter(|ns| !ns.is_empty());

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            body,
        })
    }

    /// Split `apiVersion` into `(group, version)`; the core group is `""`.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

fn string_field(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    current.as_str().map(str::to_string)
}

/// Split bundle text into documents, dropping blank ones.
///
/// Splits on a separator preceded by a newline, so a bundle without any
/// separator is a single document and leading/trailing separators are
/// tolerated.
pub fn split_documents(text: &str) -> Vec<&str> {
    text.split(DOCUMENT_SEPARATOR)
        .filter(|doc| !is_blank(doc))
        .collect()
}

// The first chunk keeps a leading marker when the text starts with `---`.
fn is_blank(doc: &str) -> bool {
    let trimmed = doc.trim();
    trimmed
        .strip_prefix("---")
        .unwrap_or(trimmed)
        .trim()
        .is_empty()
}

/// Decode one YAML document into a [`ManifestObject`].
pub fn decode_document(doc: &str) -> Result<ManifestObject, DecodeError> {
    let mut tree: serde_yaml::Value = serde_yaml::from_str(doc)?;
    tree.apply_merge()?;
    let body = serde_json::to_value(tree)?;
    ManifestObject::from_value(body)
}
