//! Two-way binding between the address-bar query string and [`UiState`].
//!
//! Keys use the nested bracket form of the search UI library:
//! `instant_search[refinementList][brand][0]=Apple`. Parameters that are not search state
//! are carried through untouched so other features of the page keep their URLs.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::canonical::CanonicalUrl;
use crate::state::{IndexUiState, StateDefaults, UiState};

const QUERY: &str = "query";
const REFINEMENT_LIST: &str = "refinementList";
const PAGE: &str = "page";
const SORT_BY: &str = "sortBy";
const HITS_PER_PAGE: &str = "hitsPerPage";

/// Decoded query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteQuery {
    pub state: UiState,
    /// Non-search parameters, in their original order.
    pub passthrough: Vec<(String, String)>,
}

#[derive(Default)]
struct RefinementSlots {
    // (explicit index, arrival order, value)
    entries: Vec<(usize, usize, String)>,
}

impl RouteQuery {
    pub fn from_state(state: UiState) -> Self {
        Self { state, passthrough: Vec::new() }
    }

    /// Parse a raw query string (with or without a leading `?`). Never fails: keys that do
    /// not describe search state are kept as passthrough, unparsable values are dropped.
    pub fn decode(query: &str, defaults: &StateDefaults) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut passthrough = Vec::new();
        let mut states: BTreeMap<String, IndexUiState> = BTreeMap::new();
        let mut slots: BTreeMap<(String, String), RefinementSlots> = BTreeMap::new();

        for (seq, (key, value)) in form_urlencoded::parse(query.as_bytes()).enumerate() {
            let (key, value) = (key.into_owned(), value.into_owned());
            let Some((root, field)) = parse_key(&key) else {
                passthrough.push((key.clone(), value));
                continue;
            };
            let state = states.entry(root.to_string()).or_default();
            match field {
                Field::Query => state.query = Some(value),
                Field::Page => state.page = value.trim().parse().ok(),
                Field::SortBy => state.sort_by = Some(value),
                Field::HitsPerPage => state.hits_per_page = value.trim().parse().ok(),
                Field::Refinement { attribute, slot } => slots
                    .entry((root.to_string(), attribute.to_string()))
                    .or_default()
                    .entries
                    .push((slot.unwrap_or(usize::MAX), seq, value)),
            }
        }

        for ((root, attribute), mut slot) in slots {
            slot.entries.sort_by_key(|(i, seq, _)| (*i, *seq));
            let values = slot.entries.into_iter().map(|(_, _, v)| v).collect();
            if let Some(state) = states.get_mut(&root) {
                state.refinement_list.insert(attribute, values);
            }
        }

        let state = states
            .into_iter()
            .map(|(id, s)| (id, s.normalized(defaults)))
            .filter(|(_, s)| !s.is_empty())
            .collect();
        Self { state, passthrough }
    }

    /// Canonical query string: passthrough first, then each index id in order with its
    /// fields in a fixed order (attributes sorted, values as stored).
    pub fn encode(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.passthrough {
            out.append_pair(k, v);
        }
        for (id, state) in &self.state {
            if let Some(q) = &state.query {
                out.append_pair(&format!("{id}[{QUERY}]"), q);
            }
            for (attribute, values) in &state.refinement_list {
                for (i, v) in values.iter().enumerate() {
                    out.append_pair(&format!("{id}[{REFINEMENT_LIST}][{attribute}][{i}]"), v);
                }
            }
            if let Some(page) = state.page {
                out.append_pair(&format!("{id}[{PAGE}]"), &page.to_string());
            }
            if let Some(sort) = &state.sort_by {
                out.append_pair(&format!("{id}[{SORT_BY}]"), sort);
            }
            if let Some(n) = state.hits_per_page {
                out.append_pair(&format!("{id}[{HITS_PER_PAGE}]"), &n.to_string());
            }
        }
        out.finish()
    }

    pub fn from_url(url: &CanonicalUrl, defaults: &StateDefaults) -> Self {
        Self::decode(url.query(), defaults)
    }

    /// `base` with its query replaced by this route.
    pub fn to_url(&self, base: &CanonicalUrl) -> CanonicalUrl {
        base.with_query(&self.encode())
    }

    pub fn index_state(&self, index_id: &str) -> IndexUiState {
        self.state.get(index_id).cloned().unwrap_or_default()
    }

    /// Replace one index's state; empty states are removed so they do not reach the URL.
    pub fn set_index_state(&mut self, index_id: &str, state: IndexUiState) {
        if state.is_empty() {
            self.state.remove(index_id);
        } else {
            self.state.insert(index_id.to_string(), state);
        }
    }
}

enum Field<'a> {
    Query,
    Page,
    SortBy,
    HitsPerPage,
    /// `slot` is `None` for `[]` and for keys without a slot.
    Refinement { attribute: &'a str, slot: Option<usize> },
}

/// `root[field]` or `root[refinementList][attribute][n]`. The attribute is everything
/// between `[refinementList][` and the last `][`, so names holding brackets survive.
fn parse_key(key: &str) -> Option<(&str, Field<'_>)> {
    let open = key.find('[')?;
    let (root, rest) = key.split_at(open);
    if root.is_empty() {
        return None;
    }
    let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
    let field = match inner {
        QUERY => Field::Query,
        PAGE => Field::Page,
        SORT_BY => Field::SortBy,
        HITS_PER_PAGE => Field::HitsPerPage,
        _ => {
            let body = inner.strip_prefix(REFINEMENT_LIST)?.strip_prefix("][")?;
            let (attribute, slot) = match body.rfind("][") {
                Some(at) => {
                    let tail = &body[at + 2..];
                    let slot = if tail.is_empty() { None } else { Some(tail.parse::<usize>().ok()?) };
                    (&body[..at], slot)
                }
                None => (body, None),
            };
            if attribute.is_empty() {
                return None;
            }
            Field::Refinement { attribute, slot }
        }
    };
    Some((root, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> StateDefaults {
        StateDefaults {
            index_name: "instant_search".into(),
            hits_per_page: 20,
            sort_indices: vec![
                "instant_search".into(),
                "instant_search_price_asc".into(),
                "instant_search_price_desc".into(),
            ],
            hits_per_page_options: vec![20, 40, 60],
        }
    }

    #[test]
    fn decodes_every_field() {
        let q = "instant_search%5Bquery%5D=phone&instant_search%5BrefinementList%5D%5Bbrand%5D%5B1%5D=Samsung\
                 &instant_search%5BrefinementList%5D%5Bbrand%5D%5B0%5D=Apple&instant_search%5Bpage%5D=2\
                 &instant_search%5BsortBy%5D=instant_search_price_asc&instant_search%5BhitsPerPage%5D=40";
        let route = RouteQuery::decode(q, &defaults());
        let s = route.index_state("instant_search");
        assert_eq!(s.query.as_deref(), Some("phone"));
        assert_eq!(s.refinement_list["brand"], vec!["Apple", "Samsung"]);
        assert_eq!(s.page, Some(2));
        assert_eq!(s.sort_by.as_deref(), Some("instant_search_price_asc"));
        assert_eq!(s.hits_per_page, Some(40));
        assert!(route.passthrough.is_empty());
    }

    #[test]
    fn unbracketed_and_unknown_keys_pass_through() {
        let route = RouteQuery::decode("?utm_source=mail&instant_search[menu][x]=1", &defaults());
        assert!(route.state.is_empty());
        assert_eq!(
            route.passthrough,
            vec![
                ("utm_source".to_string(), "mail".to_string()),
                ("instant_search[menu][x]".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(route.encode(), "utm_source=mail&instant_search%5Bmenu%5D%5Bx%5D=1");
    }

    #[test]
    fn garbage_numbers_are_dropped() {
        let route = RouteQuery::decode(
            "instant_search[page]=abc&instant_search[hitsPerPage]=-4&instant_search[query]=tv",
            &defaults(),
        );
        let s = route.index_state("instant_search");
        assert_eq!(s.page, None);
        assert_eq!(s.hits_per_page, None);
        assert_eq!(s.query.as_deref(), Some("tv"));
    }

    #[test]
    fn reencoding_is_canonical() {
        let d = defaults();
        let messy = "instant_search[hitsPerPage]=60&x=1&instant_search[refinementList][type][]=TV\
                     &instant_search[query]=big+screen&instant_search[refinementList][brand][]=LG&instant_search[page]=1";
        let first = RouteQuery::decode(messy, &d).encode();
        assert_eq!(
            first,
            "x=1&instant_search%5Bquery%5D=big+screen\
             &instant_search%5BrefinementList%5D%5Bbrand%5D%5B0%5D=LG\
             &instant_search%5BrefinementList%5D%5Btype%5D%5B0%5D=TV\
             &instant_search%5BhitsPerPage%5D=60"
        );
        assert_eq!(RouteQuery::decode(&first, &d).encode(), first);
    }

    #[test]
    fn awkward_attributes_and_values_survive() {
        let d = defaults();
        let attributes = ["brand", "a]b", "cat[1]", "x][0", "größe", "a&b=c"];
        let values = ["a b", "a&b", "x=y", "100%", "1+1", "Ünïcødé", "[0]", "-sale"];
        for attribute in attributes {
            let mut state = IndexUiState { query: Some("q&a=%+".into()), ..Default::default() };
            for value in values {
                state = state.toggle_refinement(attribute, value, &d);
            }
            let mut route = RouteQuery { passthrough: vec![("ref".into(), "a[b]".into())], ..Default::default() };
            route.set_index_state("instant_search", state);

            let back = RouteQuery::decode(&route.encode(), &d);
            assert_eq!(back, route, "attribute {attribute:?}");
            assert_eq!(back.encode(), route.encode());
        }
    }

    #[test]
    fn refinement_keys_need_a_numeric_or_empty_slot() {
        let route = RouteQuery::decode(
            "instant_search[refinementList][brand][x]=LG&instant_search[refinementList][]=TV",
            &defaults(),
        );
        assert!(route.state.is_empty());
        assert_eq!(route.passthrough.len(), 2);
    }

    #[test]
    fn empty_state_writes_empty_query() {
        let mut route = RouteQuery::default();
        route.set_index_state("instant_search", IndexUiState::default());
        assert_eq!(route.encode(), "");
        let base = CanonicalUrl::parse("https://shop.test/?old=1").unwrap();
        assert_eq!(route.to_url(&base).as_str(), "https://shop.test/");
    }
}
