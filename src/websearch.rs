//! Web search collaborator.
//!
//! Google Custom Search when configured, DuckDuckGo instant answers as
//! fallback. The `search_web` facade never errors to the orchestrator; a
//! failed search degrades to empty text and no links.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::SearchSettings;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError>;
}

/// Degrading facade: formats hits into one answer text plus a link list,
/// returning empty values on any failure.
pub async fn search_web(searcher: &dyn WebSearcher, query: &str) -> (String, Vec<String>) {
    match searcher.search(query).await {
        Ok(hits) if !hits.is_empty() => {
            let text = hits
                .iter()
                .map(|hit| format!("{}: {}", hit.title, hit.snippet))
                .collect::<Vec<_>>()
                .join("\n");
            let links = hits.into_iter().map(|hit| hit.url).collect();
            (text, links)
        }
        Ok(_) => (String::new(), Vec::new()),
        Err(err) => {
            tracing::warn!("Web search failed for query: {}", err);
            (String::new(), Vec::new())
        }
    }
}

pub struct HttpSearcher {
    settings: SearchSettings,
    client: reqwest::Client,
}

impl HttpSearcher {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebSearcher for HttpSearcher {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        let key = &self.settings.google_api_key;
        let engine = &self.settings.google_engine_id;

        if !key.is_empty() && !engine.is_empty() {
            if let Ok(results) = google_search(&self.client, query, key, engine).await {
                if !results.is_empty() {
                    return Ok(results);
                }
            }
        }

        duckduckgo_search(&self.client, query).await
    }
}

async fn google_search(
    client: &reqwest::Client,
    query: &str,
    api_key: &str,
    engine_id: &str,
) -> Result<Vec<SearchHit>, ApiError> {
    let url = format!(
        "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
        api_key,
        engine_id,
        urlencoding::encode(query)
    );

    let response = client.get(url).send().await.map_err(ApiError::internal)?;

    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "Google search failed: {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await.map_err(ApiError::internal)?;
    let items = payload
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for item in items {
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let url = item
            .get("link")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let snippet = item
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if !title.is_empty() && !url.is_empty() {
            results.push(SearchHit {
                title,
                url,
                snippet,
            });
        }
    }

    Ok(results)
}

async fn duckduckgo_search(
    client: &reqwest::Client,
    query: &str,
) -> Result<Vec<SearchHit>, ApiError> {
    let url = format!(
        "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
        urlencoding::encode(query)
    );

    let response = client.get(url).send().await.map_err(ApiError::internal)?;

    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "DuckDuckGo search failed: {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await.map_err(ApiError::internal)?;
    let mut results = Vec::new();

    if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() && !url.is_empty() {
                results.push(SearchHit {
                    title: abstract_text
                        .split(" - ")
                        .next()
                        .unwrap_or(abstract_text)
                        .to_string(),
                    url: url.to_string(),
                    snippet: abstract_text.to_string(),
                });
            }
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    Ok(results)
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<SearchHit>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchHit {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}
