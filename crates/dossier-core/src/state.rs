//! Research state
//!
//! The single record the engine threads through one run. Stages never mutate
//! it directly; they return a [`StateUpdate`] which the engine merges after
//! checking that the stage only touched fields it owns and that the index
//! alignment between topics, sections and verdicts still holds.

use crate::stage::StageKind;
use chrono::{DateTime, Utc};
use dossier_knowledge::KnowledgeBase;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Retrieval source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// Encyclopedic articles
    Wiki,
    /// Academic preprints
    Arxiv,
    /// Recent news
    News,
}

impl DocumentSource {
    /// Every known source
    pub const ALL: [DocumentSource; 3] = [Self::Wiki, Self::Arxiv, Self::News];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wiki => "wiki",
            Self::Arxiv => "arxiv",
            Self::News => "news",
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
    /// Encyclopedic source only
    Wiki,
    /// Preprint source only
    Arxiv,
    /// Both encyclopedic and preprint sources
    Both,
}

impl SourceSelection {
    /// Sources this selection consults
    #[inline]
    #[must_use]
    pub fn sources(&self) -> &'static [DocumentSource] {
        match self {
            Self::Wiki => &[DocumentSource::Wiki],
            Self::Arxiv => &[DocumentSource::Arxiv],
            Self::Both => &[DocumentSource::Wiki, DocumentSource::Arxiv],
        }
    }

    /// Parse a generator decision
    ///
    /// Tolerates surrounding whitespace, quotes, backticks, a trailing period
    /// and case; anything beyond a single allowed token is rejected.
    #[must_use]
    pub fn parse_decision(raw: &str) -> Option<Self> {
        let token = raw
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.'))
            .trim()
            .to_lowercase();
        token.parse().ok()
    }
}

impl FromStr for SourceSelection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wiki" => Ok(Self::Wiki),
            "arxiv" => Ok(Self::Arxiv),
            "both" => Ok(Self::Both),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wiki => "wiki",
            Self::Arxiv => "arxiv",
            Self::Both => "both",
        })
    }
}

/// Retrieved text per source
///
/// A source that was not consulted, found nothing, or failed reads as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocuments(BTreeMap<DocumentSource, String>);

impl RawDocuments {
    /// Entry for every known source, all empty
    #[must_use]
    pub fn empty() -> Self {
        Self(
            DocumentSource::ALL
                .iter()
                .map(|s| (*s, String::new()))
                .collect(),
        )
    }

    /// Set the text for a source
    #[inline]
    pub fn insert(&mut self, source: DocumentSource, text: impl Into<String>) {
        self.0.insert(source, text.into());
    }

    /// With text for a source
    #[inline]
    #[must_use]
    pub fn with(mut self, source: DocumentSource, text: impl Into<String>) -> Self {
        self.insert(source, text);
        self
    }

    /// Text for a source, empty when absent
    #[inline]
    #[must_use]
    pub fn text(&self, source: DocumentSource) -> &str {
        self.0.get(&source).map_or("", String::as_str)
    }

    /// True if every entry is blank
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|t| t.trim().is_empty())
    }

    /// Non-blank entries in source order
    pub fn non_blank(&self) -> impl Iterator<Item = (DocumentSource, &str)> {
        self.0
            .iter()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(s, t)| (*s, t.as_str()))
    }
}

/// Critic outcome for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Section is consistent with its topic data
    Pass,
    /// Section needs rewriting for the given reason
    Critique(String),
}

impl Verdict {
    /// Sentinel the critic emits for a passing section
    pub const PASS_TOKEN: &'static str = "PASS";

    /// Interpret a critic response; `None` for an empty response
    #[must_use]
    pub fn from_response(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            None
        } else if text == Self::PASS_TOKEN {
            Some(Self::Pass)
        } else {
            Some(Self::Critique(text.to_string()))
        }
    }

    /// Check if this is a pass
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Critique text, if failing
    #[inline]
    #[must_use]
    pub fn critique(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Critique(text) => Some(text),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pass => serializer.serialize_str(Self::PASS_TOKEN),
            Self::Critique(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_response(&raw).ok_or_else(|| serde::de::Error::custom("empty verdict"))
    }
}

/// Verdicts keyed by section index
pub type Criticism = BTreeMap<usize, Verdict>;

/// Rendered report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown document
    Markdown,
}

/// Assembled report artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Body format
    pub format: ReportFormat,
    /// Rendered document
    pub body: String,
    /// Sections that still carried a failing verdict when assembled
    #[serde(default)]
    pub unresolved_sections: Vec<usize>,
    /// Sections rewritten after their last review and never re-reviewed
    #[serde(default)]
    pub unverified_sections: Vec<usize>,
    /// Assembly time
    pub generated_at: DateTime<Utc>,
}

/// Shared state of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// Research topic, fixed at run start
    pub topic: String,
    /// Router decision
    pub source_selection: Option<SourceSelection>,
    /// Retrieved documents
    pub raw_documents: RawDocuments,
    /// Extracted knowledge
    pub knowledge_base: Option<KnowledgeBase>,
    /// One section per topic, index-aligned with `knowledge_base.topics`
    pub report_sections: Option<Vec<String>>,
    /// Latest verdict per section
    pub criticism: Option<Criticism>,
    /// Set once the critic has run
    pub is_criticized: bool,
    /// True when the writer just performed a criticism-driven rewrite
    pub needs_rewrite: bool,
    /// Rewrite passes performed so far
    pub rewrite_cycles: u32,
    /// Assembled report; presence marks the run complete
    pub final_report: Option<FinalReport>,
}

impl ResearchState {
    /// Fresh state for a topic
    #[inline]
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Check if the run produced a report
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.final_report.is_some()
    }

    /// Indices whose latest verdict is not `PASS`
    #[must_use]
    pub fn failing_sections(&self) -> Vec<usize> {
        self.criticism
            .iter()
            .flat_map(|c| c.iter())
            .filter(|(_, v)| !v.is_pass())
            .map(|(i, _)| *i)
            .collect()
    }

    /// Merge a stage update
    ///
    /// All checks run before any field is written, so a rejected update
    /// leaves the state untouched.
    ///
    /// # Errors
    /// - `StateError::NotOwned` if the update touches a field `owner` does not own
    /// - `StateError::SelectionChanged` if a set source selection would change
    /// - `StateError::SectionsResized` if existing sections would change length
    /// - `StateError::MisalignedSections` / `MisalignedCriticism` if the
    ///   topic/section/verdict alignment would break
    pub fn merge(&mut self, owner: StageKind, update: StateUpdate) -> Result<(), StateError> {
        for field in update.touched_fields() {
            if !owner.owns(field) {
                return Err(StateError::NotOwned {
                    stage: owner,
                    field,
                });
            }
        }

        if let (Some(current), Some(next)) = (self.source_selection, update.source_selection) {
            if current != next {
                return Err(StateError::SelectionChanged {
                    from: current,
                    to: next,
                });
            }
        }

        if let (Some(current), Some(next)) = (&self.report_sections, &update.report_sections) {
            if current.len() != next.len() {
                return Err(StateError::SectionsResized {
                    expected: current.len(),
                    actual: next.len(),
                });
            }
        }

        let knowledge = update.knowledge_base.as_ref().or(self.knowledge_base.as_ref());
        let sections = update.report_sections.as_ref().or(self.report_sections.as_ref());
        if let (Some(kb), Some(sections)) = (knowledge, sections) {
            if kb.topics.len() != sections.len() {
                return Err(StateError::MisalignedSections {
                    topics: kb.topics.len(),
                    sections: sections.len(),
                });
            }
        }
        if let Some(criticism) = &update.criticism {
            let expected = sections.map_or(0, Vec::len);
            let aligned = criticism.len() == expected
                && criticism.keys().enumerate().all(|(i, k)| i == *k);
            if !aligned {
                return Err(StateError::MisalignedCriticism {
                    sections: expected,
                    verdicts: criticism.len(),
                });
            }
        }

        let StateUpdate {
            source_selection,
            raw_documents,
            knowledge_base,
            report_sections,
            criticism,
            is_criticized,
            needs_rewrite,
            rewrite_cycles,
            final_report,
        } = update;

        if let Some(v) = source_selection {
            self.source_selection = Some(v);
        }
        if let Some(v) = raw_documents {
            self.raw_documents = v;
        }
        if let Some(v) = knowledge_base {
            self.knowledge_base = Some(v);
        }
        if let Some(v) = report_sections {
            self.report_sections = Some(v);
        }
        if let Some(v) = criticism {
            self.criticism = Some(v);
        }
        if let Some(v) = is_criticized {
            self.is_criticized = v;
        }
        if let Some(v) = needs_rewrite {
            self.needs_rewrite = v;
        }
        if let Some(v) = rewrite_cycles {
            self.rewrite_cycles = v;
        }
        if let Some(v) = final_report {
            self.final_report = Some(v);
        }

        Ok(())
    }
}

/// Writable state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    /// `source_selection`
    SourceSelection,
    /// `raw_documents`
    RawDocuments,
    /// `knowledge_base`
    KnowledgeBase,
    /// `report_sections`
    ReportSections,
    /// `criticism`
    Criticism,
    /// `is_criticized`
    IsCriticized,
    /// `needs_rewrite`
    NeedsRewrite,
    /// `rewrite_cycles`
    RewriteCycles,
    /// `final_report`
    FinalReport,
}

/// Partial update returned by a stage
///
/// `None` means "not touched".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// New source selection
    pub source_selection: Option<SourceSelection>,
    /// Replacement documents
    pub raw_documents: Option<RawDocuments>,
    /// Extracted knowledge
    pub knowledge_base: Option<KnowledgeBase>,
    /// Replacement sections
    pub report_sections: Option<Vec<String>>,
    /// Replacement verdict set
    pub criticism: Option<Criticism>,
    /// Critic-ran flag
    pub is_criticized: Option<bool>,
    /// Rewrite flag
    pub needs_rewrite: Option<bool>,
    /// Rewrite counter
    pub rewrite_cycles: Option<u32>,
    /// Assembled report
    pub final_report: Option<FinalReport>,
}

impl StateUpdate {
    /// Empty update
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields this update writes
    #[must_use]
    pub fn touched_fields(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        let mut mark = |set: bool, field| {
            if set {
                fields.push(field);
            }
        };
        mark(self.source_selection.is_some(), StateField::SourceSelection);
        mark(self.raw_documents.is_some(), StateField::RawDocuments);
        mark(self.knowledge_base.is_some(), StateField::KnowledgeBase);
        mark(self.report_sections.is_some(), StateField::ReportSections);
        mark(self.criticism.is_some(), StateField::Criticism);
        mark(self.is_criticized.is_some(), StateField::IsCriticized);
        mark(self.needs_rewrite.is_some(), StateField::NeedsRewrite);
        mark(self.rewrite_cycles.is_some(), StateField::RewriteCycles);
        mark(self.final_report.is_some(), StateField::FinalReport);
        fields
    }

    /// With source selection
    #[inline]
    #[must_use]
    pub fn with_source_selection(mut self, selection: SourceSelection) -> Self {
        self.source_selection = Some(selection);
        self
    }

    /// With documents
    #[inline]
    #[must_use]
    pub fn with_raw_documents(mut self, documents: RawDocuments) -> Self {
        self.raw_documents = Some(documents);
        self
    }

    /// With knowledge base
    #[inline]
    #[must_use]
    pub fn with_knowledge_base(mut self, kb: KnowledgeBase) -> Self {
        self.knowledge_base = Some(kb);
        self
    }

    /// With sections
    #[inline]
    #[must_use]
    pub fn with_report_sections(mut self, sections: Vec<String>) -> Self {
        self.report_sections = Some(sections);
        self
    }

    /// With verdicts
    #[inline]
    #[must_use]
    pub fn with_criticism(mut self, criticism: Criticism) -> Self {
        self.criticism = Some(criticism);
        self
    }

    /// With critic-ran flag
    #[inline]
    #[must_use]
    pub fn with_is_criticized(mut self, value: bool) -> Self {
        self.is_criticized = Some(value);
        self
    }

    /// With rewrite flag
    #[inline]
    #[must_use]
    pub fn with_needs_rewrite(mut self, value: bool) -> Self {
        self.needs_rewrite = Some(value);
        self
    }

    /// With rewrite counter
    #[inline]
    #[must_use]
    pub fn with_rewrite_cycles(mut self, cycles: u32) -> Self {
        self.rewrite_cycles = Some(cycles);
        self
    }

    /// With report
    #[inline]
    #[must_use]
    pub fn with_final_report(mut self, report: FinalReport) -> Self {
        self.final_report = Some(report);
        self
    }
}

/// Merge rejections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Stage wrote a field it does not own
    #[error("{stage} stage may not write {field:?}")]
    NotOwned {
        /// Offending stage
        stage: StageKind,
        /// Field it tried to write
        field: StateField,
    },

    /// Source selection changed after being set
    #[error("source selection is immutable once set ({from} -> {to})")]
    SelectionChanged {
        /// Current selection
        from: SourceSelection,
        /// Rejected selection
        to: SourceSelection,
    },

    /// Sections changed length after creation
    #[error("report sections resized from {expected} to {actual}")]
    SectionsResized {
        /// Current length
        expected: usize,
        /// Rejected length
        actual: usize,
    },

    /// Sections no longer line up with topics
    #[error("{sections} sections for {topics} topics")]
    MisalignedSections {
        /// Topic count
        topics: usize,
        /// Section count
        sections: usize,
    },

    /// Verdicts do not cover sections `0..n` exactly
    #[error("{verdicts} verdicts for {sections} sections")]
    MisalignedCriticism {
        /// Section count
        sections: usize,
        /// Verdict count
        verdicts: usize,
    },
}
