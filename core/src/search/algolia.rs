use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use super::{FacetHit, FacetSearch, SearchClient, SearchError, SearchParameters, SearchResponse};

const APPLICATION_ID_HEADER: &str = "x-algolia-application-id";
const API_KEY_HEADER: &str = "x-algolia-api-key";

/// REST client for an Algolia-compatible search service, restricted to read calls.
#[derive(Clone)]
pub struct AlgoliaClient {
    http: Client,
    base: Url,
    app_id: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MultiQueryRequest<'a> {
    requests: Vec<IndexQuery<'a>>,
    strategy: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexQuery<'a> {
    index_name: &'a str,
    params: String,
}

#[derive(Deserialize)]
struct MultiQueryResponse {
    results: Vec<SearchResponse>,
}

#[derive(Serialize)]
struct ParamsBody {
    params: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FacetSearchResponse {
    #[serde(default)]
    facet_hits: Vec<FacetHit>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl AlgoliaClient {
    /// Client for `https://{app_id}-dsn.algolia.net`.
    pub fn new(app_id: &str, api_key: &str) -> Result<Self, SearchError> {
        let base = Url::parse(&format!("https://{}-dsn.algolia.net", app_id.to_ascii_lowercase()))?;
        Self::with_base_url(base.as_str(), app_id, api_key)
    }

    /// Client against an explicit host, e.g. a proxy or a local stand-in.
    pub fn with_base_url(base: &str, app_id: &str, api_key: &str) -> Result<Self, SearchError> {
        let http = Client::builder()
            .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: Url::parse(base)?,
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: Url, body: &B) -> Result<R, SearchError> {
        let resp = self
            .http
            .post(url)
            .header(APPLICATION_ID_HEADER, &self.app_id)
            .header(API_KEY_HEADER, &self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status != StatusCode::OK {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|e| e.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(SearchError::Status { status: status.as_u16(), message });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// URL-encoded `params` string the backend expects; list values are JSON arrays.
pub fn encode_params(params: &SearchParameters) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    out.append_pair("query", &params.query);
    out.append_pair("page", &params.page.to_string());
    out.append_pair("hitsPerPage", &params.hits_per_page.to_string());
    out.append_pair("facets", &json_list(&params.facets));
    if !params.facet_filters.is_empty() {
        let filters = serde_json::to_string(&params.facet_filters).unwrap_or_else(|_| "[]".into());
        out.append_pair("facetFilters", &filters);
    }
    out.append_pair("maxValuesPerFacet", &params.max_values_per_facet.to_string());
    out.append_pair("highlightPreTag", &params.highlight_pre_tag);
    out.append_pair("highlightPostTag", &params.highlight_post_tag);
    if params.click_analytics {
        out.append_pair("clickAnalytics", "true");
    }
    if let Some(analytics) = params.analytics {
        out.append_pair("analytics", if analytics { "true" } else { "false" });
    }
    if let Some(attrs) = &params.attributes_to_retrieve {
        out.append_pair("attributesToRetrieve", &json_list(attrs));
    }
    out.finish()
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".into())
}

#[async_trait]
impl SearchClient for AlgoliaClient {
    async fn search(&self, queries: &[SearchParameters]) -> Result<Vec<SearchResponse>, SearchError> {
        let body = MultiQueryRequest {
            requests: queries
                .iter()
                .map(|q| IndexQuery { index_name: &q.index, params: encode_params(q) })
                .collect(),
            strategy: "none",
        };
        let url = self.endpoint(&["1", "indexes", "*", "queries"])?;
        tracing::debug!(%url, queries = queries.len(), "multi-query");
        let resp: MultiQueryResponse = self.post(url, &body).await?;
        if resp.results.len() != queries.len() {
            return Err(SearchError::ResponseCount { expected: queries.len(), got: resp.results.len() });
        }
        Ok(resp.results)
    }

    async fn search_for_facet_values(&self, request: &FacetSearch) -> Result<Vec<FacetHit>, SearchError> {
        let mut params = encode_params(&request.params);
        let extra = form_urlencoded::Serializer::new(String::new())
            .append_pair("facetQuery", &request.facet_query)
            .append_pair("maxFacetHits", &request.max_facet_hits.to_string())
            .finish();
        params.push('&');
        params.push_str(&extra);
        let url = self.endpoint(&[
            "1",
            "indexes",
            &request.params.index,
            "facets",
            &request.attribute,
            "query",
        ])?;
        let resp: FacetSearchResponse = self.post(url, &ParamsBody { params }).await?;
        Ok(resp.facet_hits)
    }
}
