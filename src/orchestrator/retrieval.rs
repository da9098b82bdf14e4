//! Relevance gate over the session's document store.

use crate::ingest::SourceKind;
use crate::registry::StoreHandle;

/// One retrieved piece of evidence with its provenance.
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub text: String,
    pub source_kind: SourceKind,
    pub source_name: String,
    pub url: Option<String>,
    pub score: Option<f32>,
}

/// Check whether the session's documents are relevant to the query.
///
/// Returns the sufficiency verdict together with the retrieved evidence so
/// a positive verdict never requires a second retrieval pass. A missing
/// handle or a backend failure degrades to "not sufficient" with no
/// evidence rather than failing the turn.
pub async fn assess(
    query: &str,
    handle: Option<&StoreHandle>,
    top_k: usize,
    threshold: f32,
) -> (bool, Vec<EvidenceItem>) {
    let handle = match handle {
        Some(handle) => handle,
        None => return (false, Vec::new()),
    };

    let results = match handle.search(query, top_k, threshold).await {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!("Document relevance check failed: {}", err);
            return (false, Vec::new());
        }
    };

    let items: Vec<EvidenceItem> = results
        .into_iter()
        .map(|result| {
            let metadata = result.chunk.metadata.unwrap_or_default();
            let source_kind = metadata
                .get("source_type")
                .and_then(|v| v.as_str())
                .and_then(|s| match s {
                    "web" => Some(SourceKind::Web),
                    "image" => Some(SourceKind::Image),
                    "csv" => Some(SourceKind::Csv),
                    "document" => Some(SourceKind::Document),
                    _ => None,
                })
                .unwrap_or(SourceKind::Document);
            let source_name = metadata
                .get("source_name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| result.chunk.source.clone());
            let url = metadata
                .get("url")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            EvidenceItem {
                text: result.chunk.content,
                source_kind,
                source_name,
                url,
                score: Some(result.score),
            }
        })
        .collect();

    (!items.is_empty(), items)
}
