//! Markdown report renderer

use crate::collaborators::{Renderer, ReportMetadata};
use crate::error::RenderError;
use crate::state::{FinalReport, ReportFormat};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write;

/// Renders title, abstract, sections, conclusion and a numbered reference list
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    /// Create renderer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render(sections: &[String], meta: &ReportMetadata) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        let title = if meta.title.trim().is_empty() {
            meta.topic.as_str()
        } else {
            meta.title.as_str()
        };
        writeln!(out, "# {title}\n")?;

        if !meta.abstract_text.trim().is_empty() {
            writeln!(out, "## Abstract\n\n{}\n", meta.abstract_text.trim())?;
        }

        for (index, body) in sections.iter().enumerate() {
            let body = body.trim();
            if body.is_empty() {
                // Failed expansion; keep the heading so numbering stays aligned
                let heading = meta.section_titles.get(index).map_or("Untitled", String::as_str);
                writeln!(out, "## {heading}\n\n_This section could not be generated._\n")?;
            } else {
                writeln!(out, "{body}\n")?;
            }
        }

        if !meta.conclusion.trim().is_empty() {
            writeln!(out, "## Conclusion\n\n{}\n", meta.conclusion.trim())?;
        }

        if !meta.sources.is_empty() {
            writeln!(out, "## References\n")?;
            for source in &meta.sources {
                match &source.origin {
                    Some(origin) => writeln!(out, "[{}] {} ({origin})", source.id, source.title)?,
                    None => writeln!(out, "[{}] {}", source.id, source.title)?,
                }
            }
        }

        Ok(out.trim_end().to_string() + "\n")
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn assemble(
        &self,
        sections: &[String],
        metadata: &ReportMetadata,
    ) -> Result<FinalReport, RenderError> {
        if sections.is_empty() {
            return Err(RenderError::Empty);
        }
        let body =
            Self::render(sections, metadata).map_err(|e| RenderError::Backend(e.to_string()))?;

        Ok(FinalReport {
            format: ReportFormat::Markdown,
            body,
            unresolved_sections: metadata.unresolved_sections.clone(),
            unverified_sections: metadata.unverified_sections.clone(),
            generated_at: Utc::now(),
        })
    }
}
