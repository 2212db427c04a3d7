//! Entry → PDF rendering.
//!
//! The steps run in order for each entry: [`sanitize`] the body, substitute the
//! [`template`], interpret the [`stylesheet`], flatten and paginate with
//! [`layout`], then emit bytes with [`pdf`]. Every failure is a
//! [`RenderError`] scoped to the single entry.

pub mod layout;
pub mod metrics;
pub mod pdf;
pub mod sanitize;
pub mod stylesheet;
pub mod template;

use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::contract::{Entry, RecentEntry, RenderedDocument};
use crate::error::RenderError;
use crate::output::proposed_file_name;

pub use sanitize::{sanitize, SanitizeOptions};
pub use template::{render_template, TemplateVars};

pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/article.html");
pub const DEFAULT_STYLESHEET: &str = include_str!("../../templates/style.css");

/// Renders entries with one template and stylesheet for the whole run.
#[derive(Debug, Clone)]
pub struct Processor {
    template: String,
    stylesheet: String,
    font_size_px: u32,
    max_image_width: u32,
}

impl Processor {
    pub fn new(template: impl Into<String>, stylesheet: impl Into<String>, render: &RenderConfig) -> Self {
        Self {
            template: template.into(),
            stylesheet: stylesheet.into(),
            font_size_px: render.font_size,
            max_image_width: render.max_image_width,
        }
    }

    /// Load the configured template and stylesheet, falling back to the
    /// built-in ones when a file is not configured or cannot be read.
    pub fn from_config(render: &RenderConfig) -> Self {
        let template = read_or_default(render.template_file.as_deref(), DEFAULT_TEMPLATE, "Template");
        let stylesheet = read_or_default(render.css_file.as_deref(), DEFAULT_STYLESHEET, "CSS");
        Self::new(template, stylesheet, render)
    }

    pub fn sanitize(&self, entry: &Entry) -> String {
        sanitize(
            &entry.raw_content,
            &SanitizeOptions {
                max_image_width: self.max_image_width,
                base_url: entry.link.as_deref(),
            },
        )
    }

    /// The entry's article HTML: sanitized body substituted into the template.
    pub fn compose(&self, recent: &RecentEntry, generated_at: DateTime<Utc>) -> Result<String, RenderError> {
        let entry = &recent.entry;
        let vars = TemplateVars {
            entry_title: entry.title.clone(),
            feed_title: entry.feed_title.clone(),
            author: entry.author.clone(),
            link: entry.link.clone().unwrap_or_default(),
            published: recent.published_at.format("%B %d, %Y %H:%M UTC").to_string(),
            generated_date: generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            content: self.sanitize(entry),
        };
        render_template(&self.template, &vars)
    }

    pub fn render(
        &self,
        recent: &RecentEntry,
        generated_at: DateTime<Utc>,
    ) -> Result<RenderedDocument, RenderError> {
        let entry = &recent.entry;
        let html = self.compose(recent, generated_at)?;
        let style = stylesheet::parse_stylesheet(&self.stylesheet, self.font_size_px)?;

        let blocks = layout::extract_blocks(&html);
        let pages = layout::paginate(&blocks, &style);
        debug!(
            title = %entry.title,
            blocks = blocks.len(),
            pages = pages.len(),
            "Laid out entry"
        );

        let title = metrics::fold_to_ascii(&entry.title);
        let fingerprint = self.fingerprint(&html, generated_at);
        let bytes = pdf::write_pdf(
            &pages,
            &style.page,
            &pdf::PdfMeta {
                title: &title,
                generated_at,
                fingerprint,
            },
        )?;

        Ok(RenderedDocument {
            entry_title: entry.title.clone(),
            bytes,
            proposed_file_name: proposed_file_name(recent.published_at, &entry.title),
        })
    }

    fn fingerprint(&self, html: &str, generated_at: DateTime<Utc>) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(html.as_bytes());
        hasher.update(self.stylesheet.as_bytes());
        hasher.update(self.font_size_px.to_le_bytes());
        hasher.update(self.max_image_width.to_le_bytes());
        hasher.update(generated_at.timestamp().to_le_bytes());
        hasher.finalize().into()
    }
}

fn read_or_default(path: Option<&Path>, default: &str, what: &str) -> String {
    let Some(path) = path else {
        return default.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "{what} file not found, using built-in default");
            default.to_string()
        }
    }
}
