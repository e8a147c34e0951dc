//! Server render pass and the payload that carries its result to the browser.

use std::collections::BTreeMap;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::CanonicalUrl;
use crate::routing::RouteQuery;
use crate::search::{plan_queries, SearchClient, SearchError, SearchParameters, SearchResponse, SearchResults};
use crate::widgets::{render_page, PageLayout, PageView, WidgetLocalState};

/// Element id of the embedded payload script.
pub const PAYLOAD_SCRIPT_ID: &str = "__STOREFRONT_DATA__";
/// Element id of the container the page markup is rendered into.
pub const ROOT_ELEMENT_ID: &str = "__storefront";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("document has no #{PAYLOAD_SCRIPT_ID} script")]
    MissingScript,
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad selector: {0}")]
    Selector(String),
}

/// Queries and raw responses for one index, enough to rebuild its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialResult {
    pub requests: Vec<SearchParameters>,
    pub results: Vec<SearchResponse>,
}

/// Search state computed before the page reaches the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerState {
    pub initial_results: BTreeMap<String, InitialResult>,
}

/// Output of the render pass.
#[derive(Debug, Clone)]
pub struct ServerRender {
    pub url: CanonicalUrl,
    pub server_state: ServerState,
    pub markup: String,
}

/// Page-level properties shipped next to the markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    pub server_state: ServerState,
    pub url: CanonicalUrl,
}

/// Rebuild results and markup from a captured query plan. Both the server and the
/// hydrated client go through here.
pub fn render_initial(
    layout: &PageLayout,
    route: &RouteQuery,
    location: &CanonicalUrl,
    initial: &InitialResult,
    local: &WidgetLocalState,
) -> Result<(SearchResults, String), SearchError> {
    let state = route.index_state(layout.index_id());
    let results = SearchResults::build(&initial.requests, &initial.results, &state.refinement_list)?;
    let markup = render_page(layout, &PageView { route, location, results: &results, local });
    Ok((results, markup))
}

/// Decode the search parameters from `url`, run the whole query plan against the backend,
/// and render. Resolves only once every response is in; a backend error fails the pass.
pub async fn get_server_state(
    layout: &PageLayout,
    url: &CanonicalUrl,
    client: &dyn SearchClient,
) -> Result<ServerRender, SearchError> {
    let route = RouteQuery::from_url(url, &layout.state_defaults());
    let resolved = route.index_state(layout.index_id()).resolve(&layout.state_defaults());
    let requests = plan_queries(&resolved, &layout.query_options());
    let results = client.search(&requests).await?;
    let initial = InitialResult { requests, results };
    let (results, markup) = render_initial(layout, &route, url, &initial, &WidgetLocalState::default())?;
    tracing::info!(
        url = %url,
        index = %resolved.index_name,
        nb_hits = results.nb_hits,
        "precomputed search state"
    );
    let mut server_state = ServerState::default();
    server_state.initial_results.insert(layout.index_id().to_string(), initial);
    Ok(ServerRender { url: url.clone(), server_state, markup })
}

impl PagePayload {
    /// Owned copy of the render's state; later changes to either side do not leak.
    pub fn from_render(render: &ServerRender) -> Self {
        Self { server_state: render.server_state.clone(), url: render.url.clone() }
    }

    /// JSON safe to place inside a `<script>` element.
    pub fn to_script_json(&self) -> Result<String, PayloadError> {
        let json = serde_json::to_string(self)?;
        Ok(json
            .replace('<', "\\u003c")
            .replace('>', "\\u003e")
            .replace('&', "\\u0026")
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029"))
    }

    /// Full HTML document: markup plus the embedded payload.
    pub fn render_document(&self, layout: &PageLayout, markup: &str) -> Result<String, PayloadError> {
        let json = self.to_script_json()?;
        Ok(format!(
            concat!(
                "<!DOCTYPE html>",
                r#"<html lang="en"><head><meta charset="utf-8"/>"#,
                r#"<meta name="viewport" content="width=device-width, initial-scale=1"/>"#,
                "<title>{title}</title></head><body>",
                r#"<div id="{root}">{markup}</div>"#,
                r#"<script id="{script}" type="application/json">{json}</script>"#,
                "</body></html>"
            ),
            title = crate::widgets::render::escape_html(&layout.title),
            root = ROOT_ELEMENT_ID,
            markup = markup,
            script = PAYLOAD_SCRIPT_ID,
            json = json,
        ))
    }

    /// Recover the payload from a served document.
    pub fn extract(document: &str) -> Result<Self, PayloadError> {
        let html = Html::parse_document(document);
        let selector = Selector::parse(&format!("script#{PAYLOAD_SCRIPT_ID}"))
            .map_err(|e| PayloadError::Selector(e.to_string()))?;
        let script = html.select(&selector).next().ok_or(PayloadError::MissingScript)?;
        let text: String = script.text().collect();
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PagePayload {
        let mut server_state = ServerState::default();
        server_state.initial_results.insert(
            "instant_search".into(),
            InitialResult {
                requests: Vec::new(),
                results: vec![SearchResponse { query: "</script><b>".into(), ..Default::default() }],
            },
        );
        PagePayload {
            server_state,
            url: CanonicalUrl::parse("https://shop.test/?instant_search%5Bquery%5D=a%26b").unwrap(),
        }
    }

    #[test]
    fn script_json_cannot_close_the_element() {
        let json = payload().to_script_json().unwrap();
        assert!(!json.contains("</script>"));
        assert!(!json.contains('<'));
        let back: PagePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload());
    }

    #[test]
    fn document_round_trips_payload() {
        let layout = PageLayout::catalog();
        let doc = payload().render_document(&layout, "<p>markup</p>").unwrap();
        assert!(doc.contains(r#"<div id="__storefront"><p>markup</p></div>"#));
        assert!(doc.contains("<title>Algolia InstantSearch - Next.js</title>"));
        assert_eq!(PagePayload::extract(&doc).unwrap(), payload());
    }

    #[test]
    fn extract_without_script_fails() {
        let err = PagePayload::extract("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, PayloadError::MissingScript));
    }
}
