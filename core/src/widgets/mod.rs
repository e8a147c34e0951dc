//! Declarative widget configuration and page composition.
//!
//! Each widget is a plain config struct. Styling hooks go through [`ClassNames`], keyed by
//! the parts the widget actually renders; [`PageLayout::validate`] rejects parts a widget
//! does not know.

pub mod render;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::search::QueryOptions;
use crate::state::StateDefaults;
use crate::MAIN_INDEX;

pub use render::{render_page, PageView, WidgetLocalState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("widget {widget} has no class part `{part}`")]
    UnknownClassPart { widget: &'static str, part: String },
    #[error("hits-per-page selector needs exactly one default entry, found {0}")]
    HitsPerPageDefaults(usize),
    #[error("sort selector has no entries")]
    EmptySortBy,
    #[error("refinement list limit {limit} exceeds its show-more limit {show_more_limit}")]
    ShowMoreLimit { limit: u32, show_more_limit: u32 },
}

/// Extra CSS classes appended to a widget's own classes, per rendered part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames(BTreeMap<String, String>);

impl ClassNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: &str, classes: &str) -> Self {
        self.0.insert(part.to_string(), classes.to_string());
        self
    }

    pub fn get(&self, part: &str) -> Option<&str> {
        self.0.get(part).map(String::as_str)
    }

    fn check(&self, widget: &'static str, known: &[&str]) -> Result<(), LayoutError> {
        match self.0.keys().find(|p| !known.contains(&p.as_str())) {
            Some(part) => Err(LayoutError::UnknownClassPart { widget, part: part.clone() }),
            None => Ok(()),
        }
    }
}

pub trait Widget {
    const NAME: &'static str;
    const CLASS_PARTS: &'static [&'static str];

    fn class_names(&self) -> &ClassNames;

    fn validate(&self) -> Result<(), LayoutError> {
        self.class_names().check(Self::NAME, Self::CLASS_PARTS)
    }
}

macro_rules! widget {
    ($ty:ty, $name:literal, [$($part:literal),* $(,)?]) => {
        impl Widget for $ty {
            const NAME: &'static str = $name;
            const CLASS_PARTS: &'static [&'static str] = &[$($part),*];

            fn class_names(&self) -> &ClassNames {
                &self.class_names
            }
        }
    };
}

/// Free-text query input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchBoxConfig {
    pub placeholder: String,
    /// Text shown inside the reset button; the default icon when `None`.
    pub reset_label: Option<String>,
    pub class_names: ClassNames,
}
widget!(SearchBoxConfig, "SearchBox", ["root", "form", "input", "submit", "submitIcon", "reset", "resetIcon"]);

/// How each hit is drawn: a highlighted label and a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitTemplate {
    pub label_attribute: String,
    pub label_class: String,
    pub price_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitsConfig {
    pub template: HitTemplate,
    pub class_names: ClassNames,
}
widget!(HitsConfig, "Hits", ["root", "emptyRoot", "list", "item"]);

/// Result count line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// `{nbHits}` is replaced by the grouped hit count.
    pub label: String,
    pub class_names: ClassNames,
}
widget!(StatsConfig, "Stats", ["root", "text"]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortItem {
    pub label: String,
    /// Index variant queried for this ordering.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortByConfig {
    pub items: Vec<SortItem>,
    pub class_names: ClassNames,
}
widget!(SortByConfig, "SortBy", ["root", "select", "option"]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Pages shown on each side of the current one.
    pub padding: u32,
    pub show_first: bool,
    pub show_previous: bool,
    pub show_next: bool,
    pub show_last: bool,
    pub class_names: ClassNames,
}
widget!(
    PaginationConfig,
    "Pagination",
    [
        "root",
        "noRefinementRoot",
        "list",
        "item",
        "firstPageItem",
        "previousPageItem",
        "pageItem",
        "selectedItem",
        "disabledItem",
        "nextPageItem",
        "lastPageItem",
        "link",
    ]
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitsPerPageItem {
    pub label: String,
    pub value: u32,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitsPerPageConfig {
    pub items: Vec<HitsPerPageItem>,
    pub class_names: ClassNames,
}
widget!(HitsPerPageConfig, "HitsPerPage", ["root", "select", "option"]);

impl HitsPerPageConfig {
    pub fn default_value(&self) -> Option<u32> {
        self.items.iter().find(|i| i.default).map(|i| i.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRefinementsConfig {
    pub class_names: ClassNames,
}
widget!(
    CurrentRefinementsConfig,
    "CurrentRefinements",
    ["root", "noRefinementRoot", "list", "item", "label", "category", "categoryLabel", "delete"]
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearRefinementsConfig {
    pub label: String,
    pub class_names: ClassNames,
}
widget!(ClearRefinementsConfig, "ClearRefinements", ["root", "button", "disabledButton"]);

/// Ordering criteria for facet values, applied in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetSort {
    NameAsc,
    NameDesc,
    CountAsc,
    CountDesc,
    IsRefined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementListConfig {
    pub limit: u32,
    pub show_more: bool,
    pub show_more_limit: u32,
    pub searchable: bool,
    pub searchable_placeholder: String,
    pub sort_by: Vec<FacetSort>,
    pub class_names: ClassNames,
}
widget!(
    RefinementListConfig,
    "RefinementList",
    [
        "root",
        "noRefinementRoot",
        "searchBox",
        "noResults",
        "list",
        "item",
        "selectedItem",
        "label",
        "checkbox",
        "labelText",
        "count",
        "showMore",
        "disabledShowMore",
    ]
);

impl RefinementListConfig {
    /// Most values the list can ever show.
    pub fn max_values(&self) -> u32 {
        if self.show_more {
            self.show_more_limit.max(self.limit)
        } else {
            self.limit
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub class_names: ClassNames,
}
widget!(PanelConfig, "Panel", ["root", "header", "body", "footer"]);

/// Facet widgets chosen by the index's facet ordering; every attribute is rendered with
/// the fallback refinement list inside a panel headed by the attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicWidgetsConfig {
    pub facets: Vec<String>,
    pub max_values_per_facet: u32,
    pub panel: PanelConfig,
    pub fallback: RefinementListConfig,
    pub class_names: ClassNames,
}
widget!(DynamicWidgetsConfig, "DynamicWidgets", ["root", "widget"]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Whether unmounting the search UI strips search parameters from the URL.
    pub clean_url_on_dispose: bool,
}

/// The whole page: every widget plus page-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub title: String,
    pub index_name: String,
    /// Ask the backend for query ids so click events can be attributed.
    pub insights: bool,
    pub routing: RoutingConfig,
    pub search_box: SearchBoxConfig,
    pub hits: HitsConfig,
    pub stats: StatsConfig,
    pub sort_by: SortByConfig,
    pub pagination: PaginationConfig,
    pub hits_per_page: HitsPerPageConfig,
    pub current_refinements: CurrentRefinementsConfig,
    pub clear_refinements: ClearRefinementsConfig,
    pub dynamic_widgets: DynamicWidgetsConfig,
}

impl PageLayout {
    /// The product catalog page.
    pub fn catalog() -> Self {
        Self::catalog_for(MAIN_INDEX)
    }

    /// Catalog page over `index_name` and its `_price_asc` / `_price_desc` replicas.
    pub fn catalog_for(index_name: &str) -> Self {
        Self {
            title: "Algolia InstantSearch - Next.js".into(),
            index_name: index_name.into(),
            insights: true,
            routing: RoutingConfig { clean_url_on_dispose: false },
            search_box: SearchBoxConfig {
                placeholder: "Search catalog by sku or keywords...".into(),
                reset_label: Some("CLEAR".into()),
                class_names: ClassNames::new().with("root", "my-6"),
            },
            hits: HitsConfig {
                template: HitTemplate {
                    label_attribute: "name".into(),
                    label_class: "Hit-label".into(),
                    price_class: "Hit-price".into(),
                },
                class_names: ClassNames::new().with("list", "grid grid-cols-4"),
            },
            stats: StatsConfig { label: "{nbHits} Products".into(), class_names: ClassNames::new() },
            sort_by: SortByConfig {
                items: vec![
                    SortItem { label: "Relevance".into(), value: index_name.into() },
                    SortItem { label: "Price (asc)".into(), value: format!("{index_name}_price_asc") },
                    SortItem { label: "Price (desc)".into(), value: format!("{index_name}_price_desc") },
                ],
                class_names: ClassNames::new(),
            },
            pagination: PaginationConfig {
                padding: 2,
                show_first: false,
                show_previous: true,
                show_next: true,
                show_last: false,
                class_names: ClassNames::new(),
            },
            hits_per_page: HitsPerPageConfig {
                items: vec![
                    HitsPerPageItem { label: "20".into(), value: 20, default: true },
                    HitsPerPageItem { label: "40".into(), value: 40, default: false },
                    HitsPerPageItem { label: "60".into(), value: 60, default: false },
                ],
                class_names: ClassNames::new().with("select", "appearance-none"),
            },
            current_refinements: CurrentRefinementsConfig {
                class_names: ClassNames::new()
                    .with("list", "!block")
                    .with("item", "w-full mb-2 !block")
                    .with("label", "block")
                    .with("category", "!ml-0 flex items-center justify-between text-slate-400"),
            },
            clear_refinements: ClearRefinementsConfig {
                label: "Clear refinements".into(),
                class_names: ClassNames::new().with("root", "mb-4"),
            },
            dynamic_widgets: DynamicWidgetsConfig {
                facets: vec!["*".into()],
                max_values_per_facet: 20,
                panel: PanelConfig { class_names: ClassNames::new() },
                fallback: RefinementListConfig {
                    limit: 8,
                    show_more: true,
                    show_more_limit: 20,
                    searchable: true,
                    searchable_placeholder: "Search for other ...".into(),
                    sort_by: vec![FacetSort::NameAsc],
                    class_names: ClassNames::new().with("root", "MyCustomRefinementList").with(
                        "showMore",
                        "!bg-transparent !border-0 !p-0 !text-primary !shadow-none !underline hover:!no-underline",
                    ),
                },
                class_names: ClassNames::new(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        self.search_box.validate()?;
        self.hits.validate()?;
        self.stats.validate()?;
        self.sort_by.validate()?;
        self.pagination.validate()?;
        self.hits_per_page.validate()?;
        self.current_refinements.validate()?;
        self.clear_refinements.validate()?;
        self.dynamic_widgets.validate()?;
        self.dynamic_widgets.panel.validate()?;
        self.dynamic_widgets.fallback.validate()?;
        if self.sort_by.items.is_empty() {
            return Err(LayoutError::EmptySortBy);
        }
        let defaults = self.hits_per_page.items.iter().filter(|i| i.default).count();
        if defaults != 1 {
            return Err(LayoutError::HitsPerPageDefaults(defaults));
        }
        let list = &self.dynamic_widgets.fallback;
        if list.show_more && list.show_more_limit < list.limit {
            return Err(LayoutError::ShowMoreLimit { limit: list.limit, show_more_limit: list.show_more_limit });
        }
        Ok(())
    }

    /// Id under which this page's state lives in [`crate::UiState`] and the URL.
    pub fn index_id(&self) -> &str {
        &self.index_name
    }

    pub fn state_defaults(&self) -> StateDefaults {
        StateDefaults {
            index_name: self.index_name.clone(),
            hits_per_page: self.hits_per_page.default_value().unwrap_or(20),
            sort_indices: self.sort_by.items.iter().map(|i| i.value.clone()).collect(),
            hits_per_page_options: self.hits_per_page.items.iter().map(|i| i.value).collect(),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        let dw = &self.dynamic_widgets;
        QueryOptions {
            facets: dw.facets.clone(),
            max_values_per_facet: dw.max_values_per_facet.max(dw.fallback.max_values()),
            click_analytics: self.insights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_valid() {
        let layout = PageLayout::catalog();
        assert_eq!(layout.validate(), Ok(()));
        let d = layout.state_defaults();
        assert_eq!(d.index_name, "instant_search");
        assert_eq!(d.hits_per_page, 20);
        assert_eq!(d.sort_indices[2], "instant_search_price_desc");
        assert_eq!(layout.query_options().max_values_per_facet, 20);
    }

    #[test]
    fn unknown_class_part_is_rejected() {
        let mut layout = PageLayout::catalog();
        layout.stats.class_names = ClassNames::new().with("banner", "x");
        assert_eq!(
            layout.validate(),
            Err(LayoutError::UnknownClassPart { widget: "Stats", part: "banner".into() })
        );
    }

    #[test]
    fn hits_per_page_needs_one_default() {
        let mut layout = PageLayout::catalog();
        layout.hits_per_page.items[1].default = true;
        assert_eq!(layout.validate(), Err(LayoutError::HitsPerPageDefaults(2)));
    }
}
