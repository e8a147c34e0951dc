#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use storefront_core::search::{
    FacetHit, FacetOrdering, FacetSearch, FacetsOrder, Hit, RenderingContent, SearchClient, SearchError,
    SearchParameters, SearchResponse,
};

pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub brand: &'static str,
    pub kind: &'static str,
}

/// In-memory stand-in for the hosted index and its price replicas.
pub struct FakeCatalog {
    pub products: Vec<Product>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeCatalog {
    pub fn new() -> Self {
        let brands = ["Apple", "Samsung", "Nokia", "Sony"];
        let mut products = Vec::new();
        for i in 0..90u32 {
            products.push(Product {
                id: i,
                name: format!("Phone model {i}"),
                price: 100.0 + f64::from(i) * 2.5,
                brand: brands[(i % 4) as usize],
                kind: "Phone",
            });
        }
        for i in 90..120u32 {
            products.push(Product {
                id: i,
                name: format!("Tablet {i}"),
                price: 300.0 + f64::from(i),
                brand: brands[(i % 2) as usize],
                kind: "Tablet",
            });
        }
        Self { products, calls: AtomicUsize::new(0), fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn attr<'a>(p: &'a Product, attribute: &str) -> Option<&'a str> {
        match attribute {
            "brand" => Some(p.brand),
            "type" => Some(p.kind),
            _ => None,
        }
    }

    fn matches(p: &Product, q: &SearchParameters) -> bool {
        let name = p.name.to_lowercase();
        let text_ok = q.query.split_whitespace().all(|w| name.contains(&w.to_lowercase()));
        let filters_ok = q.facet_filters.iter().all(|group| {
            group.iter().any(|f| {
                let (a, v) = f.split_once(':').unwrap_or((f.as_str(), ""));
                Self::attr(p, a) == Some(v)
            })
        });
        text_ok && filters_ok
    }

    fn run(&self, q: &SearchParameters) -> SearchResponse {
        let mut matched: Vec<&Product> = self.products.iter().filter(|p| Self::matches(p, q)).collect();
        if q.index.ends_with("_price_asc") {
            matched.sort_by(|a, b| a.price.total_cmp(&b.price));
        } else if q.index.ends_with("_price_desc") {
            matched.sort_by(|a, b| b.price.total_cmp(&a.price));
        }

        let facet_names: Vec<&str> = if q.facets.iter().any(|f| f == "*") {
            vec!["brand", "type"]
        } else {
            q.facets.iter().map(String::as_str).collect()
        };
        let mut facets: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for name in facet_names {
            let counts = facets.entry(name.to_string()).or_default();
            for p in &matched {
                if let Some(v) = Self::attr(p, name) {
                    *counts.entry(v.to_string()).or_insert(0) += 1;
                }
            }
        }

        let nb_hits = matched.len() as u64;
        let hpp = q.hits_per_page as usize;
        let nb_pages = if hpp == 0 { 0 } else { matched.len().div_ceil(hpp) as u32 };
        let hits = matched
            .iter()
            .skip(q.page as usize * hpp)
            .take(hpp)
            .map(|p| Hit {
                object_id: p.id.to_string(),
                name: p.name.clone(),
                price: p.price,
                highlight_result: None,
                extra: serde_json::from_value(json!({ "brand": p.brand, "type": p.kind })).unwrap(),
            })
            .collect();

        SearchResponse {
            hits,
            nb_hits,
            page: q.page,
            nb_pages,
            hits_per_page: q.hits_per_page,
            facets,
            query: q.query.clone(),
            index: Some(q.index.clone()),
            query_id: q.click_analytics.then(|| format!("qid-{}", q.page)),
            processing_time_ms: 1,
            rendering_content: Some(RenderingContent {
                facet_ordering: Some(FacetOrdering {
                    facets: Some(FacetsOrder { order: vec!["brand".into(), "type".into()] }),
                    values: None,
                }),
            }),
        }
    }
}

#[async_trait]
impl SearchClient for FakeCatalog {
    async fn search(&self, queries: &[SearchParameters]) -> Result<Vec<SearchResponse>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Status { status: 503, message: "index unavailable".into() });
        }
        Ok(queries.iter().map(|q| self.run(q)).collect())
    }

    async fn search_for_facet_values(&self, request: &FacetSearch) -> Result<Vec<FacetHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.run(&SearchParameters { facets: vec![request.attribute.clone()], ..request.params.clone() });
        let needle = request.facet_query.to_lowercase();
        Ok(response
            .facets
            .get(&request.attribute)
            .into_iter()
            .flatten()
            .filter(|(v, _)| v.to_lowercase().starts_with(&needle))
            .map(|(v, c)| FacetHit { value: v.clone(), highlighted: v.clone(), count: *c })
            .collect())
    }
}
