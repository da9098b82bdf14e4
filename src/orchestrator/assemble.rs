//! Context assembly.
//!
//! Merges document evidence and web results into a single prompt context
//! plus a source descriptor list for attribution in the response.

use serde::{Deserialize, Serialize};

use super::retrieval::EvidenceItem;

/// Marker inserted between document context and appended web results.
pub const WEB_CONTEXT_SEPARATOR: &str = "--- Additional Information from Web Search ---";

/// Label used when web results are the only context.
pub const WEB_RESULTS_LABEL: &str = "Web Search Results:";

/// Maximum excerpt length, in characters, shown per source.
const EXCERPT_CHARS: usize = 200;

/// Attribution record returned alongside the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source category ("document", "web", "image", "csv").
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name (file name or URL).
    pub name: String,
    /// Truncated preview of the contributing text.
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Build the prompt context and source list for one turn.
///
/// Document evidence always precedes web evidence. Returns an empty
/// context when neither channel produced anything; the caller decides how
/// to answer without evidence.
pub fn assemble(
    doc_items: &[EvidenceItem],
    web_text: &str,
    web_links: &[String],
) -> (String, Vec<SourceDescriptor>) {
    let mut sources = Vec::new();

    let doc_context = doc_items
        .iter()
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    for item in doc_items {
        sources.push(SourceDescriptor {
            kind: item.source_kind.as_str().to_string(),
            name: item.source_name.clone(),
            excerpt: truncate_excerpt(&item.text),
            url: item.url.clone(),
        });
    }

    let context = if !web_text.is_empty() {
        // Web links are deduplicated within the web channel only; a page
        // that was also ingested as a document keeps both attributions.
        let mut seen = Vec::new();
        for link in web_links {
            if seen.contains(link) {
                continue;
            }
            seen.push(link.clone());
            sources.push(SourceDescriptor {
                kind: "web".to_string(),
                name: link.clone(),
                excerpt: String::new(),
                url: Some(link.clone()),
            });
        }

        if doc_context.is_empty() {
            format!("{}\n{}", WEB_RESULTS_LABEL, web_text)
        } else {
            format!("{}\n\n{}\n{}", doc_context, WEB_CONTEXT_SEPARATOR, web_text)
        }
    } else {
        doc_context
    };

    (context, sources)
}

fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", truncated)
    }
}
