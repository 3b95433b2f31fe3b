use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier a document carries in its source system (newtype for type safety)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for DocumentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for DocumentId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// Which kind of source connector a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  Web,
  File,
  Slack,
  GoogleDrive,
  Github,
  Confluence,
  Notion,
  Jira,
  Other,
}

impl SourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceType::Web => "web",
      SourceType::File => "file",
      SourceType::Slack => "slack",
      SourceType::GoogleDrive => "google_drive",
      SourceType::Github => "github",
      SourceType::Confluence => "confluence",
      SourceType::Notion => "notion",
      SourceType::Jira => "jira",
      SourceType::Other => "other",
    }
  }
}

impl std::str::FromStr for SourceType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "web" => Ok(SourceType::Web),
      "file" => Ok(SourceType::File),
      "slack" => Ok(SourceType::Slack),
      "google_drive" => Ok(SourceType::GoogleDrive),
      "github" => Ok(SourceType::Github),
      "confluence" => Ok(SourceType::Confluence),
      "notion" => Ok(SourceType::Notion),
      "jira" => Ok(SourceType::Jira),
      "other" => Ok(SourceType::Other),
      _ => Err(format!("Unknown source type: {}", s)),
    }
  }
}

/// One contiguous span of document text with an optional deep link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
  pub text: String,
  pub link: Option<String>,
}

impl Section {
  pub fn new(text: impl Into<String>, link: Option<String>) -> Self {
    Self { text: text.into(), link }
  }
}

/// A document as fetched from an external source. Immutable once built;
/// a re-fetch produces a fresh instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub id: DocumentId,

  /// Ordered sections; chunking walks these in order
  pub sections: Vec<Section>,

  pub source: SourceType,

  /// Human-meaningful name (page title, file path, channel name)
  pub semantic_identifier: String,

  /// Free-form source metadata, carried into keyword-matching suffixes
  pub metadata: BTreeMap<String, String>,

  /// When the source last saw this document change, if it reports one
  pub doc_updated_at: Option<DateTime<Utc>>,
}

impl Document {
  pub fn new(id: impl Into<String>, source: SourceType, semantic_identifier: impl Into<String>) -> Self {
    Self {
      id: DocumentId::new(id),
      sections: Vec::new(),
      source,
      semantic_identifier: semantic_identifier.into(),
      metadata: BTreeMap::new(),
      doc_updated_at: None,
    }
  }

  pub fn with_sections(mut self, sections: Vec<Section>) -> Self {
    self.sections = sections;
    self
  }

  pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
    self.doc_updated_at = Some(at);
    self
  }

  /// Total character count across sections
  pub fn char_count(&self) -> usize {
    self.sections.iter().map(|s| s.text.len()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_source_type_parse_roundtrip() {
    for source in [SourceType::Web, SourceType::Slack, SourceType::GoogleDrive] {
      let parsed: SourceType = source.as_str().parse().unwrap();
      assert_eq!(parsed, source);
    }
  }

  #[test]
  fn test_document_char_count() {
    let doc = Document::new("doc-1", SourceType::Web, "Example").with_sections(vec![
      Section::new("abcde", Some("https://example.com/a".into())),
      Section::new("fgh", None),
    ]);
    assert_eq!(doc.char_count(), 8);
  }
}
