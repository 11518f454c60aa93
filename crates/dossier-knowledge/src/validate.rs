//! Knowledge base validation
//!
//! Checks the data contract the rest of the pipeline relies on:
//! - Unique source ids
//! - Well-formed, unique topic ids and correctly parented subtopic ids
//! - At least one summary point per topic
//! - Every reference resolves to a declared source
//!
//! Violations are collected rather than short-circuited so a rejected
//! payload can be diagnosed in one pass.

use crate::error::{KnowledgeError, Violation};
use crate::ids::{SubtopicId, TopicId};
use crate::model::KnowledgeBase;
use std::collections::HashSet;

/// Collect every contract violation in document order
#[must_use]
pub fn violations(kb: &KnowledgeBase) -> Vec<Violation> {
    let mut found = Vec::new();

    if kb.title.trim().is_empty() {
        found.push(Violation::EmptyTitle);
    }

    let mut source_ids = HashSet::with_capacity(kb.sources.len());
    for source in &kb.sources {
        if !source_ids.insert(source.id) {
            found.push(Violation::DuplicateSourceId(source.id));
        }
    }

    if kb.topics.is_empty() {
        found.push(Violation::NoTopics);
    }

    let mut topic_ids = HashSet::with_capacity(kb.topics.len());
    for (index, topic) in kb.topics.iter().enumerate() {
        let parsed = topic.id.parse::<TopicId>().ok();
        if parsed.is_none() {
            found.push(Violation::MalformedTopicId {
                index,
                id: topic.id.clone(),
            });
        }
        if !topic_ids.insert(topic.id.as_str()) {
            found.push(Violation::DuplicateTopicId(topic.id.clone()));
        }
        if topic.summary.iter().all(|p| p.trim().is_empty()) {
            found.push(Violation::EmptySummary {
                topic: topic.id.clone(),
            });
        }

        check_references(&topic.id, &topic.references, &source_ids, &mut found);

        for sub in &topic.subtopics {
            match sub.id.parse::<SubtopicId>() {
                Ok(sub_id) => {
                    if parsed.is_some_and(|p| p != sub_id.parent()) {
                        found.push(Violation::ForeignSubtopic {
                            topic: topic.id.clone(),
                            id: sub.id.clone(),
                        });
                    }
                }
                Err(_) => found.push(Violation::MalformedSubtopicId {
                    topic: topic.id.clone(),
                    id: sub.id.clone(),
                }),
            }
            check_references(&sub.id, &sub.references, &source_ids, &mut found);
        }
    }

    found
}

/// Validate the knowledge base, failing with every violation found
pub fn validate(kb: &KnowledgeBase) -> Result<(), KnowledgeError> {
    let violations = violations(kb);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(KnowledgeError::Invalid { violations })
    }
}

fn check_references(
    owner: &str,
    references: &[u32],
    source_ids: &HashSet<u32>,
    found: &mut Vec<Violation>,
) {
    for &reference in references {
        if !source_ids.contains(&reference) {
            found.push(Violation::DanglingReference {
                owner: owner.to_string(),
                reference,
            });
        }
    }
}
