//! Document ingestion.
//!
//! Turns raw inputs (pasted text, fetched web pages) into chunks ready for
//! embedding. PDF/image extraction happens upstream of this service; the
//! ingestion endpoints accept pre-extracted text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Configuration for text chunking and URL fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks
    pub chunk_overlap: usize,
    /// Maximum total chunks per source
    pub max_chunks: usize,
    /// Timeout for web requests in seconds
    pub web_timeout_secs: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_chunks: 20,
            web_timeout_secs: 30,
        }
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Document,
    Web,
    Image,
    Csv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Document => "document",
            SourceKind::Web => "web",
            SourceKind::Image => "image",
            SourceKind::Csv => "csv",
        }
    }
}

/// A text chunk with provenance, ready for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source_kind: SourceKind,
    /// Source identifier (file name or URL).
    pub source_name: String,
    /// Original URL when the source was fetched from the web.
    pub url: Option<String>,
    /// Chunk index within the source
    pub chunk_index: usize,
}

/// Split pre-extracted text into chunks.
///
/// Fails with `Extraction` when no usable text is present; session state is
/// unaffected by a failed ingestion.
pub fn chunk_text(
    text: &str,
    source_name: &str,
    kind: SourceKind,
    url: Option<&str>,
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>, ApiError> {
    let chunks = split_into_chunks(text, source_name, kind, url, config);
    if chunks.is_empty() {
        return Err(ApiError::Extraction(format!(
            "no text content in '{}'",
            source_name
        )));
    }
    Ok(chunks)
}

/// Fetch a URL and chunk its visible text.
pub async fn fetch_url_chunks(
    url: &str,
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>, ApiError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.web_timeout_secs))
        .build()
        .map_err(ApiError::internal)?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ApiError::Extraction(format!("failed to fetch {}: {}", url, e)))?;
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Extraction(format!("failed to read {}: {}", url, e)))?;

    let clean_text = strip_html_tags(&body);
    chunk_text(&clean_text, url, SourceKind::Web, Some(url), config)
}

/// Extract http(s) URLs from free text, in order of appearance, deduplicated.
pub fn detect_urls(text: &str) -> Vec<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("url regex is valid")
    });

    let mut seen = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !seen.contains(&url) {
            seen.push(url);
        }
    }
    seen
}

fn split_into_chunks(
    text: &str,
    source_name: &str,
    kind: SourceKind,
    url: Option<&str>,
    config: &ChunkingConfig,
) -> Vec<DocumentChunk> {
    let chunk_size = config.chunk_size;
    let overlap = config.chunk_overlap;
    let max_chunks = config.max_chunks;

    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();

    if total_chars == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;
    let mut chunk_index = 0;

    while start < total_chars && chunks.len() < max_chunks {
        let end = (start + chunk_size).min(total_chars);
        let chunk_text: String = chars[start..end].iter().collect();

        // Try to break at sentence boundary
        let final_text = if end < total_chars {
            find_sentence_boundary(&chunk_text)
        } else {
            chunk_text
        };

        let trimmed = final_text.trim();
        if !trimmed.is_empty() {
            chunks.push(DocumentChunk {
                text: trimmed.to_string(),
                source_kind: kind,
                source_name: source_name.to_string(),
                url: url.map(|u| u.to_string()),
                chunk_index,
            });
            chunk_index += 1;
        }

        start += step;
    }

    chunks
}

/// Simple HTML tag stripper.
pub fn strip_html_tags(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    let html_lower = html.to_lowercase();
    let chars: Vec<char> = html.chars().collect();
    let chars_lower: Vec<char> = html_lower.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if i + 7 < chars.len() {
            let tag: String = chars_lower[i..i + 7].iter().collect();
            if tag == "<script" {
                in_script = true;
            } else if i + 6 < chars.len()
                && chars_lower[i..i + 6].iter().collect::<String>() == "<style"
            {
                in_style = true;
            }
        }

        if in_script && i + 9 <= chars.len() {
            let tag: String = chars_lower[i..i + 9].iter().collect();
            if tag == "</script>" {
                in_script = false;
                i += 9;
                continue;
            }
        }
        if in_style && i + 8 <= chars.len() {
            let tag: String = chars_lower[i..i + 8].iter().collect();
            if tag == "</style>" {
                in_style = false;
                i += 8;
                continue;
            }
        }

        if in_script || in_style {
            i += 1;
            continue;
        }

        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }

        i += 1;
    }

    let lines: Vec<&str> = result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines.join("\n")
}

/// Find a good sentence boundary within the chunk.
fn find_sentence_boundary(text: &str) -> String {
    let sentence_endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    // Search in the last 20% of the chunk
    let search_start = (text.len() * 80) / 100;
    if !text.is_char_boundary(search_start) {
        return text.to_string();
    }
    let search_text = &text[search_start..];

    for ending in sentence_endings.iter() {
        if let Some(pos) = search_text.rfind(ending) {
            let cut_pos = search_start + pos + ending.len();
            return text[..cut_pos].to_string();
        }
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_limits() {
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            max_chunks: 10,
            ..Default::default()
        };

        let text = "This is a test. ".repeat(200);
        let chunks = chunk_text(&text, "test.txt", SourceKind::Document, None, &config).unwrap();

        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 10);
        assert!(chunks.iter().all(|c| c.source_name == "test.txt"));
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn empty_text_is_an_extraction_error() {
        let config = ChunkingConfig::default();
        let result = chunk_text("   \n  ", "blank.pdf", SourceKind::Document, None, &config);
        assert!(matches!(result, Err(ApiError::Extraction(_))));
    }

    #[test]
    fn html_stripping_drops_script_and_tags() {
        let html = r#"
            <html>
            <head><script>var x = 1;</script></head>
            <body>
                <h1>Hello</h1>
                <p>World</p>
            </body>
            </html>
        "#;

        let text = strip_html_tags(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn url_detection_dedupes_and_trims_punctuation() {
        let text = "See https://example.com/a, and also https://example.com/a plus http://other.org/page.";
        let urls = detect_urls(text);
        assert_eq!(
            urls,
            vec![
                "https://example.com/a".to_string(),
                "http://other.org/page".to_string()
            ]
        );
    }

    #[test]
    fn url_detection_ignores_plain_text() {
        assert!(detect_urls("no links here").is_empty());
    }
}
