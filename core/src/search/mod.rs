//! Contract with the hosted search backend: request parameters, raw responses, and the
//! merged result set the widgets render from.

pub mod algolia;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::ResolvedState;

pub use algolia::AlgoliaClient;

pub const HIGHLIGHT_PRE_TAG: &str = "__ais-highlight__";
pub const HIGHLIGHT_POST_TAG: &str = "__/ais-highlight__";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("search backend answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed search response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected {expected} results, backend returned {got}")]
    ResponseCount { expected: usize, got: usize },
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
}

/// Parameters of one backend query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameters {
    pub index: String,
    pub query: String,
    /// zero-based, as the backend counts
    pub page: u32,
    pub hits_per_page: u32,
    pub facets: Vec<String>,
    /// Outer list is AND, inner lists are OR.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facet_filters: Vec<Vec<String>>,
    pub max_values_per_facet: u32,
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub click_analytics: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_retrieve: Option<Vec<String>>,
}

/// Page-level knobs that shape every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub facets: Vec<String>,
    pub max_values_per_facet: u32,
    pub click_analytics: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(rename = "_highlightResult", default, skip_serializing_if = "Option::is_none")]
    pub highlight_result: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Hit {
    /// Highlighted value of `attribute` as returned by the backend, tags included.
    pub fn highlighted(&self, attribute: &str) -> Option<&str> {
        self.highlight_result.as_ref()?.get(attribute)?.get("value")?.as_str()
    }

    /// Plain value of a top-level attribute.
    pub fn attribute(&self, attribute: &str) -> Option<String> {
        match attribute {
            "name" => Some(self.name.clone()),
            "objectID" => Some(self.object_id.clone()),
            other => match self.extra.get(other)? {
                Value::String(s) => Some(s.clone()),
                v => Some(v.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetsOrder {
    #[serde(default)]
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetOrdering {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetsOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_ordering: Option<FacetOrdering>,
}

/// One backend result, kept close to the wire shape so it can be shipped to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Hit>,
    #[serde(default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub nb_pages: u32,
    #[serde(default)]
    pub hits_per_page: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "queryID", default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(rename = "processingTimeMS", default)]
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering_content: Option<RenderingContent>,
}

/// Facet-value search request (searchable refinement list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSearch {
    pub params: SearchParameters,
    pub attribute: String,
    pub facet_query: String,
    pub max_facet_hits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetHit {
    pub value: String,
    pub highlighted: String,
    pub count: u64,
}

/// The hosted search service. Implementations must be safe to call from concurrent
/// requests; they hold no per-page state.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run all queries in one round trip; responses come back in request order.
    async fn search(&self, queries: &[SearchParameters]) -> Result<Vec<SearchResponse>, SearchError>;

    async fn search_for_facet_values(&self, request: &FacetSearch) -> Result<Vec<FacetHit>, SearchError>;
}

/// Display-ready view over the responses of one query plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub index: String,
    pub query: String,
    pub hits: Vec<Hit>,
    pub nb_hits: u64,
    /// zero-based
    pub page: u32,
    pub nb_pages: u32,
    pub hits_per_page: u32,
    /// attribute -> value -> count; disjunctive attributes carry counts computed
    /// without their own refinements.
    pub facets: BTreeMap<String, BTreeMap<String, u64>>,
    /// Attribute order configured on the index for dynamic facets.
    pub facet_order: Vec<String>,
    pub query_id: Option<String>,
    pub processing_time_ms: u64,
}

fn facet_filter(attribute: &str, value: &str) -> String {
    // a leading '-' would negate the filter
    if let Some(rest) = value.strip_prefix('-') {
        format!("{attribute}:\\-{rest}")
    } else {
        format!("{attribute}:{value}")
    }
}

fn facet_filters(refinements: &BTreeMap<String, Vec<String>>, skip: Option<&str>) -> Vec<Vec<String>> {
    refinements
        .iter()
        .filter(|(attribute, _)| Some(attribute.as_str()) != skip)
        .map(|(attribute, values)| values.iter().map(|v| facet_filter(attribute, v)).collect())
        .collect()
}

/// Queries needed to render `state`: the main query first, then one per refined
/// attribute so the counts of an OR-refined list ignore its own selection.
pub fn plan_queries(state: &ResolvedState, options: &QueryOptions) -> Vec<SearchParameters> {
    let main = SearchParameters {
        index: state.index_name.clone(),
        query: state.query.clone(),
        page: state.page.saturating_sub(1),
        hits_per_page: state.hits_per_page,
        facets: options.facets.clone(),
        facet_filters: facet_filters(&state.refinements, None),
        max_values_per_facet: options.max_values_per_facet,
        highlight_pre_tag: HIGHLIGHT_PRE_TAG.to_string(),
        highlight_post_tag: HIGHLIGHT_POST_TAG.to_string(),
        click_analytics: options.click_analytics,
        analytics: None,
        attributes_to_retrieve: None,
    };
    let mut plan = vec![main.clone()];
    for attribute in state.refinements.keys() {
        plan.push(SearchParameters {
            page: 0,
            hits_per_page: 0,
            facets: vec![attribute.clone()],
            facet_filters: facet_filters(&state.refinements, Some(attribute)),
            click_analytics: false,
            analytics: Some(false),
            attributes_to_retrieve: Some(Vec::new()),
            ..main.clone()
        });
    }
    tracing::debug!(index = %main.index, queries = plan.len(), "planned search queries");
    plan
}

impl SearchResults {
    /// Merge the responses of `plan` (same order). Pure: the server and the hydrated
    /// client derive the same value from the same inputs.
    pub fn build(
        plan: &[SearchParameters],
        responses: &[SearchResponse],
        refinements: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, SearchError> {
        if plan.len() != responses.len() || responses.is_empty() {
            return Err(SearchError::ResponseCount { expected: plan.len(), got: responses.len() });
        }
        let main = &responses[0];
        let mut facets = main.facets.clone();
        for (params, response) in plan.iter().zip(responses).skip(1) {
            for attribute in &params.facets {
                let counts = response.facets.get(attribute).cloned().unwrap_or_default();
                facets.insert(attribute.clone(), counts);
            }
        }
        // selected values stay visible even when nothing matches them any more
        for (attribute, values) in refinements {
            let counts = facets.entry(attribute.clone()).or_default();
            for v in values {
                counts.entry(v.clone()).or_insert(0);
            }
        }
        let facet_order = main
            .rendering_content
            .as_ref()
            .and_then(|rc| rc.facet_ordering.as_ref())
            .and_then(|fo| fo.facets.as_ref())
            .map(|f| f.order.clone())
            .unwrap_or_default();

        Ok(Self {
            index: plan[0].index.clone(),
            query: main.query.clone(),
            hits: main.hits.clone(),
            nb_hits: main.nb_hits,
            page: main.page,
            nb_pages: main.nb_pages,
            hits_per_page: main.hits_per_page,
            facets,
            facet_order,
            query_id: main.query_id.clone(),
            processing_time_ms: main.processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(refinements: &[(&str, &[&str])]) -> ResolvedState {
        ResolvedState {
            query: "phone".into(),
            refinements: refinements
                .iter()
                .map(|(a, vs)| (a.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
            page: 2,
            index_name: "instant_search_price_asc".into(),
            hits_per_page: 40,
        }
    }

    fn options() -> QueryOptions {
        QueryOptions { facets: vec!["*".into()], max_values_per_facet: 20, click_analytics: true }
    }

    #[test]
    fn plan_without_refinements_is_one_query() {
        let plan = plan_queries(&resolved(&[]), &options());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].page, 1);
        assert_eq!(plan[0].hits_per_page, 40);
        assert_eq!(plan[0].index, "instant_search_price_asc");
        assert!(plan[0].facet_filters.is_empty());
        assert!(plan[0].click_analytics);
    }

    #[test]
    fn disjunctive_queries_drop_their_own_filter() {
        let plan = plan_queries(&resolved(&[("brand", &["Apple", "-Off"][..]), ("type", &["Phone"][..])]), &options());
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[0].facet_filters,
            vec![vec!["brand:Apple".to_string(), "brand:\\-Off".to_string()], vec!["type:Phone".to_string()]]
        );
        assert_eq!(plan[1].facets, vec!["brand"]);
        assert_eq!(plan[1].facet_filters, vec![vec!["type:Phone".to_string()]]);
        assert_eq!(plan[1].hits_per_page, 0);
        assert!(!plan[1].click_analytics);
        assert_eq!(plan[2].facets, vec!["type"]);
    }

    #[test]
    fn build_merges_disjunctive_counts() {
        let r = resolved(&[("brand", &["Apple", "Nokia"][..])]);
        let plan = plan_queries(&r, &options());
        let main = SearchResponse {
            nb_hits: 3,
            facets: BTreeMap::from([("brand".into(), BTreeMap::from([("Apple".into(), 3)]))]),
            ..Default::default()
        };
        let brand = SearchResponse {
            facets: BTreeMap::from([(
                "brand".into(),
                BTreeMap::from([("Apple".into(), 3), ("Samsung".into(), 7)]),
            )]),
            ..Default::default()
        };
        let results = SearchResults::build(&plan, &[main, brand], &r.refinements).unwrap();
        let counts = &results.facets["brand"];
        assert_eq!(counts["Samsung"], 7);
        assert_eq!(counts["Nokia"], 0);
        assert_eq!(results.nb_hits, 3);
    }

    #[test]
    fn build_rejects_missing_responses() {
        let plan = plan_queries(&resolved(&[("brand", &["Apple"][..])]), &options());
        let err = SearchResults::build(&plan, &[SearchResponse::default()], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SearchError::ResponseCount { expected: 2, got: 1 }));
    }

    #[test]
    fn hit_reads_backend_json() {
        let hit: Hit = serde_json::from_value(serde_json::json!({
            "objectID": "42",
            "name": "Phone X",
            "price": 99.99,
            "brand": "Acme",
            "_highlightResult": {"name": {"value": "__ais-highlight__Phone__/ais-highlight__ X", "matchLevel": "partial"}}
        }))
        .unwrap();
        assert_eq!(hit.highlighted("name"), Some("__ais-highlight__Phone__/ais-highlight__ X"));
        assert_eq!(hit.attribute("brand").as_deref(), Some("Acme"));
        assert!(hit.highlighted("brand").is_none());
    }
}
