//! Search-necessity policy.
//!
//! Pure decision logic, kept free of I/O so it can be tested exhaustively.

/// Decide whether this turn performs a web search.
///
/// The caller's explicit request wins unconditionally. Otherwise search
/// happens only when the session allows it and the query's intent calls for
/// it. Document sufficiency does not suppress search; a query can be
/// answerable from documents and still warrant fresh web results, so the
/// two evidence channels are additive.
pub fn should_search(
    force: bool,
    _doc_sufficient: bool,
    web_search_enabled: bool,
    intent_detected: bool,
) -> bool {
    force || (web_search_enabled && intent_detected)
}
