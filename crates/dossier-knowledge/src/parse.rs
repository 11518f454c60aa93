//! Payload extraction and parsing
//!
//! Generators frequently wrap JSON in Markdown fences or add a stray line of
//! prose. The payload is narrowed to the outermost JSON object before parsing;
//! nothing else is repaired.

use crate::error::KnowledgeError;
use crate::model::KnowledgeBase;
use crate::validate::validate;

/// Narrow a raw response to its JSON object
///
/// Strips a surrounding ```` ``` ```` / ```` ```json ```` fence, then takes the
/// span from the first `{` to the last `}`.
#[must_use]
pub fn extract_payload(raw: &str) -> Option<&str> {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. `json`) on the opening fence line
        body = rest.split_once('\n').map_or("", |(_, tail)| tail);
        body = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Parse and validate a knowledge base from a raw generator response
pub fn parse_knowledge_base(raw: &str) -> Result<KnowledgeBase, KnowledgeError> {
    let payload = extract_payload(raw).ok_or(KnowledgeError::EmptyPayload)?;
    let kb: KnowledgeBase = serde_json::from_str(payload)?;
    validate(&kb)?;
    Ok(kb)
}
