//! Document rendering: stored history content to sanitized HTML, a
//! templated HTML document, and finally PDF bytes.

pub mod filename;
pub mod pdf;
pub mod sanitize;
pub mod template;

pub use filename::filename_for;
pub use template::RenderMetadata;

use crate::config::RenderConfig;
use crate::models::enums::HistoryFormat;
use crate::models::{HistoryView, PdfArtifact};
use crate::pipeline::HistoryError;

/// Produces the PDF artifact for one history view. Blocking; callers on
/// an async runtime run it through `spawn_blocking`.
pub trait PdfRender: Send + Sync {
    fn render(&self, view: &HistoryView) -> Result<PdfArtifact, HistoryError>;
}

pub struct DocumentRenderer {
    organization: String,
    generator: String,
}

impl DocumentRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            organization: config.organization.clone(),
            generator: config.generator.clone(),
        }
    }

    /// Markdown to allow-listed HTML.
    pub fn to_sanitized_html(&self, markdown: &str) -> String {
        sanitize::markdown_to_safe_html(markdown)
    }

    /// Stored content of any format to allow-listed HTML.
    pub fn content_to_sanitized_html(&self, content: &str, format: HistoryFormat) -> String {
        match format {
            HistoryFormat::Markdown => self.to_sanitized_html(content),
            other => sanitize::content_to_safe_html(content, other),
        }
    }

    pub fn to_templated_html(&self, sanitized_html: &str, meta: &RenderMetadata) -> String {
        template::render_template(sanitized_html, meta)
    }

    pub fn to_pdf(&self, templated_html: &str, title: &str) -> Result<Vec<u8>, HistoryError> {
        pdf::html_to_pdf(templated_html, title)
    }

    pub fn metadata_for(&self, view: &HistoryView) -> RenderMetadata {
        RenderMetadata {
            patient_name: view.patient_name.clone(),
            organization: self.organization.clone(),
            generated_at: view.history.generated_at,
            generator: self.generator.clone(),
            document_id: view.history.id(),
            language: view.history.language,
        }
    }

    /// Full HTML document for in-browser preview.
    pub fn preview_html(&self, view: &HistoryView) -> String {
        let body = self.content_to_sanitized_html(&view.history.content, view.history.format);
        self.to_templated_html(&body, &self.metadata_for(view))
    }
}

impl PdfRender for DocumentRenderer {
    fn render(&self, view: &HistoryView) -> Result<PdfArtifact, HistoryError> {
        let html = self.preview_html(view);
        let title = format!(
            "{} - {}",
            template::document_title(view.history.language),
            view.patient_name
        );
        let bytes = self.to_pdf(&html, &title)?;

        tracing::debug!(
            history_id = %view.history.id(),
            bytes = bytes.len(),
            "Rendered history PDF"
        );

        Ok(PdfArtifact {
            history_id: view.history.id(),
            filename: filename_for(&view.patient_name, &view.history.generated_at),
            bytes,
        })
    }
}
