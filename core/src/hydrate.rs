//! Client-side search session: seeded from the server payload, then driven by UI events
//! and history navigation.
//!
//! ```text
//! Uninitialized --hydrate--> Hydrated --event/navigation--> Interactive --+
//!                                                             ^            |
//!                                                             +------------+
//! any state --dispose--> Disposed
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::canonical::CanonicalUrl;
use crate::router::HistoryRouter;
use crate::routing::RouteQuery;
use crate::search::{plan_queries, FacetSearch, SearchClient, SearchError, SearchResults};
use crate::ssr::{InitialResult, PagePayload, ServerState};
use crate::state::IndexUiState;
use crate::widgets::render::FacetSearchState;
use crate::widgets::{render_page, PageLayout, PageView, WidgetLocalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// Showing the server's results; nothing fetched yet.
    Hydrated,
    Interactive,
    Disposed,
}

/// User interaction with a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    SetQuery(String),
    ToggleRefinement { attribute: String, value: String },
    ClearRefinements,
    /// 1-based
    SetPage(u32),
    SetSortBy(String),
    SetHitsPerPage(u32),
    /// Widget-local: does not touch the URL or query the main index.
    ToggleShowMore(String),
    /// Widget-local: searches the values of one refinement list.
    SearchFacetValues { attribute: String, query: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not hydrated yet")]
    NotHydrated,
    #[error("session is already hydrated")]
    AlreadyHydrated,
    #[error("session was disposed")]
    Disposed,
    #[error(transparent)]
    Search(#[from] SearchError),
}

pub struct SearchSession {
    layout: Arc<PageLayout>,
    client: Arc<dyn SearchClient>,
    router: Arc<HistoryRouter>,
    phase: Phase,
    location: CanonicalUrl,
    route: RouteQuery,
    current: Option<InitialResult>,
    results: SearchResults,
    local: WidgetLocalState,
    last_error: Option<String>,
}

impl SearchSession {
    /// Session reading and writing the URL through `router`, whose current location is
    /// the address the page was loaded at.
    pub fn new(layout: Arc<PageLayout>, client: Arc<dyn SearchClient>, router: Arc<HistoryRouter>) -> Self {
        let location = router.current();
        Self {
            layout,
            client,
            router,
            phase: Phase::Uninitialized,
            location,
            route: RouteQuery::default(),
            current: None,
            results: SearchResults::default(),
            local: WidgetLocalState::default(),
            last_error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn location(&self) -> &CanonicalUrl {
        &self.location
    }

    pub fn ui_state(&self) -> IndexUiState {
        self.route.index_state(self.layout.index_id())
    }

    pub fn results(&self) -> &SearchResults {
        &self.results
    }

    /// Error of the most recent backend call, cleared by the next successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn router(&self) -> &Arc<HistoryRouter> {
        &self.router
    }

    /// Seed the session from the server payload. The router is moved to the payload's URL
    /// first. When the state decoded from it plans exactly the queries the server ran, the
    /// server's responses are used as-is and no request is sent. Otherwise the payload is
    /// stale and results are fetched.
    pub async fn hydrate(&mut self, payload: &PagePayload) -> Result<(), SessionError> {
        match self.phase {
            Phase::Uninitialized => {}
            Phase::Disposed => return Err(SessionError::Disposed),
            _ => return Err(SessionError::AlreadyHydrated),
        }
        if self.router.current() != payload.url {
            tracing::debug!(from = %self.router.current(), to = %payload.url, "moving router to the rendered url");
            self.router.replace(payload.url.clone());
        }
        self.location = payload.url.clone();
        self.route = RouteQuery::from_url(&self.location, &self.layout.state_defaults());
        let plan = self.plan();

        let seeded = payload
            .server_state
            .initial_results
            .get(self.layout.index_id())
            .filter(|initial| initial.requests == plan)
            .cloned();
        match seeded {
            Some(initial) => {
                self.apply(initial)?;
                self.phase = Phase::Hydrated;
                tracing::info!(url = %self.location, "hydrated from server state");
                Ok(())
            }
            None => {
                tracing::warn!(url = %self.location, "server state does not match its url, fetching");
                self.phase = Phase::Hydrated;
                self.refresh().await
            }
        }
    }

    pub async fn dispatch(&mut self, event: UiEvent) -> Result<(), SessionError> {
        self.ensure_active()?;
        let defaults = self.layout.state_defaults();
        let state = self.ui_state();
        let next = match event {
            UiEvent::SetQuery(q) => state.set_query(&q, &defaults),
            UiEvent::ToggleRefinement { attribute, value } => state.toggle_refinement(&attribute, &value, &defaults),
            UiEvent::ClearRefinements => state.clear_refinements(&defaults),
            UiEvent::SetPage(page) => state.set_page(page, &defaults),
            UiEvent::SetSortBy(index) => state.set_sort_by(&index, &defaults),
            UiEvent::SetHitsPerPage(n) => state.set_hits_per_page(n, &defaults),
            UiEvent::ToggleShowMore(attribute) => {
                if !self.local.expanded.remove(&attribute) {
                    self.local.expanded.insert(attribute);
                }
                return Ok(());
            }
            UiEvent::SearchFacetValues { attribute, query } => {
                return self.search_facet_values(attribute, query).await;
            }
        };
        if next == state {
            return Ok(());
        }
        self.route.set_index_state(self.layout.index_id(), next);
        self.local.facet_searches.clear();
        let outcome = self.refresh().await;
        let url = self.route.to_url(&self.location);
        tracing::debug!(%url, "pushing search state");
        self.router.push(url.clone());
        self.location = url;
        outcome
    }

    /// React to back/forward or a manual edit: the router already holds the new location.
    pub async fn navigate(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let location = self.router.current();
        if location == self.location {
            return Ok(());
        }
        self.location = location;
        self.route = RouteQuery::from_url(&self.location, &self.layout.state_defaults());
        self.local.facet_searches.clear();
        self.refresh().await
    }

    pub async fn back(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if self.router.back().is_none() {
            return Ok(false);
        }
        self.navigate().await.map(|_| true)
    }

    pub async fn forward(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if self.router.forward().is_none() {
            return Ok(false);
        }
        self.navigate().await.map(|_| true)
    }

    /// Unmount. Search parameters stay in the URL unless the layout asks to clean it.
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        if self.layout.routing.clean_url_on_dispose {
            let bare = RouteQuery { state: Default::default(), passthrough: self.route.passthrough.clone() };
            self.router.replace(bare.to_url(&self.location));
        }
        self.phase = Phase::Disposed;
        tracing::debug!(url = %self.router.current(), "search session disposed");
    }

    /// Current state in the server's shape; right after a seeded hydration it equals the
    /// payload's server state.
    pub fn snapshot(&self) -> ServerState {
        let mut state = ServerState::default();
        if let Some(current) = &self.current {
            state.initial_results.insert(self.layout.index_id().to_string(), current.clone());
        }
        state
    }

    pub fn render(&self) -> String {
        render_page(
            &self.layout,
            &PageView { route: &self.route, location: &self.location, results: &self.results, local: &self.local },
        )
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Hydrated | Phase::Interactive => Ok(()),
            Phase::Uninitialized => Err(SessionError::NotHydrated),
            Phase::Disposed => Err(SessionError::Disposed),
        }
    }

    fn plan(&self) -> Vec<crate::search::SearchParameters> {
        let resolved = self.ui_state().resolve(&self.layout.state_defaults());
        plan_queries(&resolved, &self.layout.query_options())
    }

    fn apply(&mut self, initial: InitialResult) -> Result<(), SessionError> {
        let refinements = self.ui_state().refinement_list;
        self.results = SearchResults::build(&initial.requests, &initial.results, &refinements)?;
        self.current = Some(initial);
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), SessionError> {
        let requests = self.plan();
        self.phase = Phase::Interactive;
        match self.client.search(&requests).await {
            Ok(results) => {
                self.apply(InitialResult { requests, results })?;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "search failed, keeping previous results");
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    async fn search_facet_values(&mut self, attribute: String, query: String) -> Result<(), SessionError> {
        if query.is_empty() {
            self.local.facet_searches.remove(&attribute);
            return Ok(());
        }
        let Some(mut params) = self.plan().into_iter().next() else {
            return Ok(());
        };
        // values of this attribute are searched as if it were not refined
        let prefix = format!("{attribute}:");
        params.facet_filters.retain(|group| !group.iter().all(|f| f.starts_with(&prefix)));
        let list = &self.layout.dynamic_widgets.fallback;
        let max_facet_hits = if list.show_more && self.local.expanded.contains(&attribute) {
            list.show_more_limit
        } else {
            list.limit
        };
        let request = FacetSearch { params, attribute: attribute.clone(), facet_query: query.clone(), max_facet_hits };
        match self.client.search_for_facet_values(&request).await {
            Ok(hits) => {
                self.local.facet_searches.insert(attribute, FacetSearchState { query, hits });
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, %attribute, "facet value search failed");
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }
}
