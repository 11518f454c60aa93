//! Role instructions and input builders
//!
//! Instructions are fixed per role; inputs are built from state so each
//! generation call sees exactly the data its stage is allowed to rely on.

use crate::state::{DocumentSource, RawDocuments, Verdict};
use dossier_knowledge::{KnowledgeBase, Topic};
use std::fmt::Write;

/// Source selection instructions
pub const ROUTER_INSTRUCTIONS: &str = "\
You decide where to look up background material for a research topic.
Answer with exactly one lowercase word and nothing else:
- wiki: the topic is general, historical, or encyclopedic
- arxiv: the topic is technical and best covered by recent papers
- both: the topic needs general background and current research";

/// Section writing instructions
pub const WRITER_INSTRUCTIONS: &str = "\
You write one section of an academic research report from a topic record.
Rules:
- Use the summary points as the only factual basis. Add nothing external.
- Cite with the topic's reference ids only, inline right after the claim, as [1] or [1, 3].
- Never invent a reference id.
- Write 2 to 4 paragraphs for the topic and 1 to 3 for each subtopic.
- Use a formal third-person tone.
Output Markdown only: \"##\" for the topic heading, \"###\" for each subtopic heading.";

/// Section rewriting instructions
pub const REWRITE_INSTRUCTIONS: &str = "\
You revise one section of an academic research report after a review.
You receive the topic record, the previous section and the reviewer's critique.
Rules:
- Fix every issue the critique raises and keep everything it does not mention.
- Use the summary points as the only factual basis. Add nothing external.
- Cite with the topic's reference ids only, inline, as [1] or [1, 3].
Output the full revised section as Markdown with \"##\" and \"###\" headings.";

/// Section review instructions
pub const CRITIC_INSTRUCTIONS: &str = "\
You fact-check one report section against the topic record it was written from.
Compare every statement with the summary points and references.
If every statement is supported and every citation id belongs to the record, reply with exactly: PASS
Otherwise reply in plain sentences: name each unsupported or wrong statement,
say why it is wrong, and point to the summary point it should follow.
Do not rewrite the section.";

/// Knowledge extraction instructions with the knowledge base schema embedded
#[must_use]
pub fn extractor_instructions() -> String {
    let schema = serde_json::to_string_pretty(&KnowledgeBase::json_schema())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "You turn raw source documents into a structured knowledge base for a research report.\n\
         Rules:\n\
         - Number each distinct source from 1 and list it under \"sources\".\n\
         - Group the material into topics with ids t1, t2, ... and subtopics t1.1, t1.2, ...\n\
         - Every topic has at least one summary point.\n\
         - \"references\" may only contain ids listed under \"sources\".\n\
         - Write a short abstract and a conclusion covering all topics.\n\
         Reply with a single JSON object matching this schema and nothing else:\n{schema}"
    )
}

/// Router input
#[must_use]
pub fn router_input(topic: &str) -> String {
    format!("TOPIC: {topic}")
}

/// Extractor input: every non-blank document, labelled by source
#[must_use]
pub fn extractor_input(topic: &str, documents: &RawDocuments) -> String {
    let mut input = format!("TOPIC: {topic}\n");
    for (source, text) in documents.non_blank() {
        let _ = write!(input, "\n=== {} ===\n{text}\n", label(source));
    }
    input
}

/// Writer input for a first-pass section
#[must_use]
pub fn writer_input(topic: &Topic) -> String {
    format!("TOPIC RECORD:\n{}", topic_json(topic))
}

/// Writer input for a rewrite
#[must_use]
pub fn rewrite_input(topic: &Topic, previous: &str, critique: &str) -> String {
    format!(
        "TOPIC RECORD:\n{}\n\nPREVIOUS SECTION:\n{previous}\n\nCRITIQUE:\n{critique}",
        topic_json(topic)
    )
}

/// Critic input for one section
#[must_use]
pub fn critic_input(topic: &Topic, section: &str) -> String {
    format!(
        "TOPIC RECORD:\n{}\n\nSECTION:\n{section}\n\nReply {} if the section passes.",
        topic_json(topic),
        Verdict::PASS_TOKEN
    )
}

fn topic_json(topic: &Topic) -> String {
    serde_json::to_string_pretty(topic).unwrap_or_default()
}

fn label(source: DocumentSource) -> &'static str {
    match source {
        DocumentSource::Wiki => "WIKIPEDIA",
        DocumentSource::Arxiv => "ARXIV",
        DocumentSource::News => "NEWS",
    }
}
