//! Search-state plumbing for a server-rendered product search page.
//!
//! The hosted search backend does the searching; this crate owns the state that
//! travels between the URL, the server render pass, and the hydrated client.

pub mod canonical;
pub mod hydrate;
pub mod router;
pub mod routing;
pub mod search;
pub mod ssr;
pub mod state;
pub mod widgets;

pub use canonical::CanonicalUrl;
pub use hydrate::{Phase, SearchSession, SessionError, UiEvent};
pub use router::HistoryRouter;
pub use routing::RouteQuery;
pub use search::{SearchClient, SearchError, SearchParameters, SearchResponse, SearchResults};
pub use ssr::{get_server_state, PagePayload, ServerRender, ServerState};
pub use state::{IndexUiState, ResolvedState, UiState};
pub use widgets::PageLayout;

/// Identifier of the main index; also the key of its entry in [`UiState`].
pub const MAIN_INDEX: &str = "instant_search";
