use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use scraper::{Html, Selector};
use serde_json::Value;
use server::{build_app, AppSettings};
use storefront_core::search::{FacetHit, FacetSearch, Hit, SearchClient, SearchError, SearchParameters, SearchResponse};
use storefront_core::PagePayload;

struct StubClient {
    fail: bool,
}

#[async_trait]
impl SearchClient for StubClient {
    async fn search(&self, queries: &[SearchParameters]) -> Result<Vec<SearchResponse>, SearchError> {
        if self.fail {
            return Err(SearchError::Status { status: 503, message: "index unavailable".into() });
        }
        Ok(queries
            .iter()
            .map(|q| {
                let hits = if q.hits_per_page == 0 {
                    Vec::new()
                } else {
                    vec![Hit {
                        object_id: "sku-1".into(),
                        name: "Phone X <128GB>".into(),
                        price: 99.99,
                        highlight_result: None,
                        extra: serde_json::Map::new(),
                    }]
                };
                let mut brand = BTreeMap::new();
                brand.insert("Apple".to_string(), 1u64);
                SearchResponse {
                    hits,
                    nb_hits: 1,
                    page: q.page,
                    nb_pages: 1,
                    hits_per_page: q.hits_per_page,
                    facets: BTreeMap::from([("brand".to_string(), brand)]),
                    query: q.query.clone(),
                    index: Some(q.index.clone()),
                    ..Default::default()
                }
            })
            .collect())
    }

    async fn search_for_facet_values(&self, _request: &FacetSearch) -> Result<Vec<FacetHit>, SearchError> {
        Ok(Vec::new())
    }
}

fn app(fail: bool) -> Router {
    build_app(AppSettings::default(), Arc::new(StubClient { fail })).unwrap()
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = call(app(false), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn page_embeds_payload_for_the_request_url() {
    let req = Request::get("/?instant_search%5Bquery%5D=phone")
        .header("host", "shop.test")
        .header("referer", "http://shop.test/elsewhere")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(false), req).await;
    assert_eq!(status, StatusCode::OK);

    let document = String::from_utf8(body.to_vec()).unwrap();
    let payload = PagePayload::extract(&document).unwrap();
    assert_eq!(payload.url.as_str(), "http://shop.test/?instant_search%5Bquery%5D=phone");
    let initial = &payload.server_state.initial_results["instant_search"];
    assert_eq!(initial.requests[0].query, "phone");
    assert_eq!(initial.results[0].hits[0].object_id, "sku-1");

    let html = Html::parse_document(&document);
    let title = Selector::parse("title").unwrap();
    assert_eq!(html.select(&title).next().unwrap().inner_html(), "Algolia InstantSearch - Next.js");
    let items = Selector::parse("li.ais-Hits-item").unwrap();
    let hit = html.select(&items).next().unwrap();
    assert_eq!(hit.text().collect::<String>(), "Phone X <128GB>$99.99");
    let input = Selector::parse("input.ais-SearchBox-input").unwrap();
    assert_eq!(html.select(&input).next().unwrap().value().attr("value"), Some("phone"));
}

#[tokio::test]
async fn missing_headers_fall_back_to_https_and_default_host() {
    let (status, body) = call(app(false), Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let payload = PagePayload::extract(std::str::from_utf8(&body).unwrap()).unwrap();
    assert_eq!(payload.url.as_str(), "https://localhost/");
}

#[tokio::test]
async fn backend_failure_is_a_bad_gateway() {
    let req = Request::get("/").header("host", "shop.test").body(Body::empty()).unwrap();
    let (status, body) = call(app(true), req).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(std::str::from_utf8(&body).unwrap(), "search backend answered 503: index unavailable");
}

#[tokio::test]
async fn page_props_route_returns_json_payload() {
    let req = Request::get("/api/page-props?instant_search%5Bpage%5D=2")
        .header("host", "shop.test")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(false), req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["url"], "https://shop.test/?instant_search%5Bpage%5D=2");
    let main = &json["serverState"]["initialResults"]["instant_search"]["requests"][0];
    assert_eq!(main["page"], 1);
    assert_eq!(main["hitsPerPage"], 20);
}
