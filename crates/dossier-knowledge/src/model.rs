//! Knowledge base model
//!
//! The structured aggregate the extractor produces from raw documents:
//! - Ordered, uniquely numbered sources
//! - Ordered topics (`t<n>`) with summary points and references
//! - Optional subtopics (`t<n>.<m>`) nested under each topic
//! - Abstract and conclusion framing the report

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured knowledge extracted for one research topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeBase {
    /// Report title
    pub title: String,
    /// Cited sources, each with a unique id
    pub sources: Vec<Source>,
    /// Top-level topics, one report section each
    pub topics: Vec<Topic>,
    /// Abstract of the whole report
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Closing conclusion
    pub conclusion: String,
}

impl KnowledgeBase {
    /// Look up a source by id
    #[inline]
    #[must_use]
    pub fn source(&self, id: u32) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Number of top-level topics
    #[inline]
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// JSON schema describing this structure
    ///
    /// Embedded verbatim in the extractor instructions so the generator is
    /// constrained to the shape [`crate::parse_knowledge_base`] accepts.
    #[must_use]
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(KnowledgeBase);
        serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
    }
}

/// A cited source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    /// Unique integer id referenced by topics
    pub id: u32,
    /// Source title
    pub title: String,
    /// Where the source came from (URL, archive id, outlet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Source {
    /// Create new source
    #[inline]
    #[must_use]
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            origin: None,
        }
    }

    /// With origin
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A top-level topic (`t<n>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Topic {
    /// Topic id, `t<n>`
    pub id: String,
    /// Topic title
    pub title: String,
    /// Summary points, at least one
    pub summary: Vec<String>,
    /// Ordered subtopics
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
    /// Source ids supporting this topic
    #[serde(default)]
    pub references: Vec<u32>,
}

impl Topic {
    /// Create new topic
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: Vec::new(),
            subtopics: Vec::new(),
            references: Vec::new(),
        }
    }

    /// With summary point
    #[inline]
    #[must_use]
    pub fn with_point(mut self, point: impl Into<String>) -> Self {
        self.summary.push(point.into());
        self
    }

    /// With references
    #[inline]
    #[must_use]
    pub fn with_references(mut self, references: impl IntoIterator<Item = u32>) -> Self {
        self.references.extend(references);
        self
    }

    /// With subtopic
    #[inline]
    #[must_use]
    pub fn with_subtopic(mut self, subtopic: Subtopic) -> Self {
        self.subtopics.push(subtopic);
        self
    }

    /// Every reference in this topic and its subtopics, in declaration order
    pub fn all_references(&self) -> impl Iterator<Item = u32> + '_ {
        self.references
            .iter()
            .copied()
            .chain(self.subtopics.iter().flat_map(|s| s.references.iter().copied()))
    }
}

/// A subtopic (`t<n>.<m>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subtopic {
    /// Subtopic id, `t<n>.<m>`
    pub id: String,
    /// Subtopic title
    pub title: String,
    /// Summary points
    #[serde(default)]
    pub summary: Vec<String>,
    /// Source ids supporting this subtopic
    #[serde(default)]
    pub references: Vec<u32>,
}

impl Subtopic {
    /// Create new subtopic
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: Vec::new(),
            references: Vec::new(),
        }
    }

    /// With summary point
    #[inline]
    #[must_use]
    pub fn with_point(mut self, point: impl Into<String>) -> Self {
        self.summary.push(point.into());
        self
    }

    /// With references
    #[inline]
    #[must_use]
    pub fn with_references(mut self, references: impl IntoIterator<Item = u32>) -> Self {
        self.references.extend(references);
        self
    }
}
