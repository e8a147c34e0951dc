use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters held by the widgets of one index.
///
/// Default values are never stored: an empty query, page 1, the main index as sort and
/// the default hits-per-page entry are all represented by `None`/empty. Every transition
/// returns a normalized value so that equal searches have equal states and equal URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUiState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// attribute -> selected values, in the order they were refined
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refinement_list: BTreeMap<String, Vec<String>>,
    /// 1-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits_per_page: Option<u32>,
}

/// Index id -> widget parameters.
pub type UiState = BTreeMap<String, IndexUiState>;

/// Values the state falls back to, taken from the page layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefaults {
    pub index_name: String,
    pub hits_per_page: u32,
    pub sort_indices: Vec<String>,
    pub hits_per_page_options: Vec<u32>,
}

/// Effective search parameters once defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedState {
    pub query: String,
    pub refinements: BTreeMap<String, Vec<String>>,
    /// 1-based
    pub page: u32,
    /// Index variant chosen by the sort selector.
    pub index_name: String,
    pub hits_per_page: u32,
}

impl IndexUiState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Drop defaults and invalid values.
    pub fn normalized(mut self, defaults: &StateDefaults) -> Self {
        self.query = self.query.filter(|q| !q.is_empty());
        self.page = self.page.filter(|&p| p > 1);
        self.sort_by = self
            .sort_by
            .filter(|s| *s != defaults.index_name && defaults.sort_indices.contains(s));
        self.hits_per_page = self.hits_per_page.filter(|n| {
            *n != defaults.hits_per_page && defaults.hits_per_page_options.contains(n)
        });
        self.refinement_list = std::mem::take(&mut self.refinement_list)
            .into_iter()
            .filter_map(|(attribute, values)| {
                let mut unique: Vec<String> = Vec::with_capacity(values.len());
                for v in values {
                    if !v.is_empty() && !unique.contains(&v) {
                        unique.push(v);
                    }
                }
                (!attribute.is_empty() && !unique.is_empty()).then_some((attribute, unique))
            })
            .collect();
        self
    }

    pub fn resolve(&self, defaults: &StateDefaults) -> ResolvedState {
        ResolvedState {
            query: self.query.clone().unwrap_or_default(),
            refinements: self.refinement_list.clone(),
            page: self.page.unwrap_or(1),
            index_name: self.sort_by.clone().unwrap_or_else(|| defaults.index_name.clone()),
            hits_per_page: self.hits_per_page.unwrap_or(defaults.hits_per_page),
        }
    }

    pub fn is_refined(&self, attribute: &str, value: &str) -> bool {
        self.refinement_list
            .get(attribute)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    pub fn set_query(&self, query: &str, defaults: &StateDefaults) -> Self {
        Self {
            query: Some(query.to_string()),
            page: None,
            ..self.clone()
        }
        .normalized(defaults)
    }

    pub fn toggle_refinement(&self, attribute: &str, value: &str, defaults: &StateDefaults) -> Self {
        let mut next = self.clone();
        let values = next.refinement_list.entry(attribute.to_string()).or_default();
        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
        } else {
            values.push(value.to_string());
        }
        next.page = None;
        next.normalized(defaults)
    }

    /// Remove every refinement; the query is not a refinement and stays.
    pub fn clear_refinements(&self, defaults: &StateDefaults) -> Self {
        Self {
            refinement_list: BTreeMap::new(),
            page: None,
            ..self.clone()
        }
        .normalized(defaults)
    }

    pub fn set_page(&self, page: u32, defaults: &StateDefaults) -> Self {
        Self {
            page: Some(page),
            ..self.clone()
        }
        .normalized(defaults)
    }

    /// Unknown index names leave the state untouched.
    pub fn set_sort_by(&self, index_name: &str, defaults: &StateDefaults) -> Self {
        if !defaults.sort_indices.iter().any(|s| s == index_name) {
            return self.clone();
        }
        Self {
            sort_by: Some(index_name.to_string()),
            page: None,
            ..self.clone()
        }
        .normalized(defaults)
    }

    /// Page goes back to 1: it is valid for every page size. Sizes the selector does not
    /// offer leave the state untouched.
    pub fn set_hits_per_page(&self, hits_per_page: u32, defaults: &StateDefaults) -> Self {
        if !defaults.hits_per_page_options.contains(&hits_per_page) {
            return self.clone();
        }
        Self {
            hits_per_page: Some(hits_per_page),
            page: None,
            ..self.clone()
        }
        .normalized(defaults)
    }
}
