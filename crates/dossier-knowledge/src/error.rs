//! Error types for knowledge base handling

/// Knowledge base error
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Payload is not well-formed JSON of the expected shape
    #[error("malformed knowledge base: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload parsed but violates the data contract
    #[error("invalid knowledge base: {}", summarize(.violations))]
    Invalid {
        /// Every violation found, in document order
        violations: Vec<Violation>,
    },

    /// No JSON object found in the payload
    #[error("no JSON object in payload")]
    EmptyPayload,
}

impl KnowledgeError {
    /// Violations, if this is a contract error
    #[inline]
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single data-contract violation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// Title is empty
    #[error("title is empty")]
    EmptyTitle,

    /// No topics declared
    #[error("no topics declared")]
    NoTopics,

    /// Two sources share an id
    #[error("duplicate source id {0}")]
    DuplicateSourceId(u32),

    /// Topic id does not match `t<n>`
    #[error("topic #{index} has malformed id {id:?}")]
    MalformedTopicId { index: usize, id: String },

    /// Two topics share an id
    #[error("duplicate topic id {0:?}")]
    DuplicateTopicId(String),

    /// Topic has no summary points
    #[error("topic {topic:?} has no summary points")]
    EmptySummary { topic: String },

    /// Subtopic id does not match `t<n>.<m>`
    #[error("subtopic {id:?} under {topic:?} has malformed id")]
    MalformedSubtopicId { topic: String, id: String },

    /// Subtopic id names a different parent
    #[error("subtopic {id:?} does not belong to topic {topic:?}")]
    ForeignSubtopic { topic: String, id: String },

    /// Reference to an undeclared source
    #[error("{owner:?} references undeclared source {reference}")]
    DanglingReference { owner: String, reference: u32 },
}
