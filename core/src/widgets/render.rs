//! Markup for the whole page as a pure function of layout, URL state, and results.
//!
//! The server render pass and the hydrated client call the same [`render_page`]; any
//! difference in output between the two is a hydration mismatch.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use regex::RegexBuilder;

use super::{ClassNames, FacetSort, PageLayout, RefinementListConfig};
use crate::canonical::CanonicalUrl;
use crate::routing::RouteQuery;
use crate::search::{FacetHit, Hit, SearchResults, HIGHLIGHT_POST_TAG, HIGHLIGHT_PRE_TAG};
use crate::state::{IndexUiState, ResolvedState};

/// An in-progress search inside one refinement list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetSearchState {
    pub query: String,
    pub hits: Vec<FacetHit>,
}

/// Widget state that lives only in the browser and never reaches the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetLocalState {
    /// Refinement lists showing their extended limit.
    pub expanded: BTreeSet<String>,
    pub facet_searches: BTreeMap<String, FacetSearchState>,
}

/// Everything one render needs.
pub struct PageView<'a> {
    pub route: &'a RouteQuery,
    pub location: &'a CanonicalUrl,
    pub results: &'a SearchResults,
    pub local: &'a WidgetLocalState,
}

struct Ctx<'a> {
    layout: &'a PageLayout,
    view: &'a PageView<'a>,
    state: IndexUiState,
    resolved: ResolvedState,
}

impl Ctx<'_> {
    /// Link target for the page in `next` state; relative to the current path.
    fn href(&self, next: IndexUiState) -> String {
        let mut route = self.view.route.clone();
        route.set_index_state(self.layout.index_id(), next);
        let query = route.encode();
        let path = self.view.location.path();
        if query.is_empty() {
            escape_html(path)
        } else {
            escape_html(&format!("{path}?{query}"))
        }
    }
}

pub fn render_page(layout: &PageLayout, view: &PageView<'_>) -> String {
    let state = view.route.index_state(layout.index_id());
    let resolved = state.resolve(&layout.state_defaults());
    let ctx = Ctx { layout, view, state, resolved };

    let mut out = String::with_capacity(16 * 1024);
    out.push_str(r#"<div class="grid items-start grid-cols-5 gap-2">"#);
    out.push_str(r#"<div class="col-span-1">"#);
    current_refinements(&mut out, &ctx);
    clear_refinements(&mut out, &ctx);
    dynamic_widgets(&mut out, &ctx);
    out.push_str("</div>");
    out.push_str(r#"<div class="col-span-4">"#);
    out.push_str(r#"<div class="flex items-center justify-between">"#);
    stats(&mut out, &ctx);
    sort_by(&mut out, &ctx);
    out.push_str("</div>");
    search_box(&mut out, &ctx);
    hits(&mut out, &ctx);
    out.push_str(r#"<div class="flex items-center justify-between my-6 relative w-full">"#);
    pagination(&mut out, &ctx);
    hits_per_page(&mut out, &ctx);
    out.push_str("</div>");
    out.push_str("</div>");
    out.push_str("</div>");
    out
}

/// Escape HTML special characters.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `ais-{widget}-{part}` plus the configured extra classes.
fn class(names: &ClassNames, widget: &str, part: &str, modifiers: &[&str]) -> String {
    let base = if part == "root" { format!("ais-{widget}") } else { format!("ais-{widget}-{part}") };
    let mut out = base.clone();
    for m in modifiers {
        out.push(' ');
        out.push_str(&base);
        out.push_str("--");
        out.push_str(m);
    }
    if let Some(extra) = names.get(part) {
        out.push(' ');
        out.push_str(extra);
    }
    escape_html(&out)
}

/// Like [`class`], also appending the extra classes of a state part (`selectedItem` etc.).
fn class_with(names: &ClassNames, widget: &str, part: &str, modifiers: &[&str], states: &[&str]) -> String {
    let mut out = class(names, widget, part, modifiers);
    for s in states {
        if let Some(extra) = names.get(s) {
            out.push(' ');
            out.push_str(&escape_html(extra));
        }
    }
    out
}

/// en-US digit grouping: `1234567` -> `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Prices print the way a JS number does: `100`, `99.99`.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 && price.abs() < 1e15 {
        format!("{}", price as i64)
    } else {
        format!("{price}")
    }
}

/// Page numbers (zero-based) the pagination shows: up to `2 * padding + 1` pages around
/// `current`, shifted to stay inside `0..nb_pages`.
pub fn pagination_pages(current: u32, nb_pages: u32, padding: u32) -> Vec<u32> {
    if nb_pages == 0 {
        return vec![0];
    }
    let current = current.min(nb_pages - 1);
    let displayed = (2 * padding + 1).min(nb_pages);
    if displayed == nb_pages {
        return (0..nb_pages).collect();
    }
    let left = if current <= padding {
        current
    } else if current >= nb_pages - padding {
        displayed - (nb_pages - current)
    } else {
        padding
    };
    let first = current - left;
    (first..first + displayed).collect()
}

fn highlight_markup(segments: &[(bool, &str)], root_class: &str) -> String {
    let mut out = format!(r#"<span class="{root_class}">"#);
    for (highlighted, text) in segments {
        if text.is_empty() {
            continue;
        }
        if *highlighted {
            out.push_str(r#"<mark class="ais-Highlight-highlighted">"#);
            out.push_str(&escape_html(text));
            out.push_str("</mark>");
        } else {
            out.push_str(r#"<span class="ais-Highlight-nonHighlighted">"#);
            out.push_str(&escape_html(text));
            out.push_str("</span>");
        }
    }
    out.push_str("</span>");
    out
}

/// Split a backend-highlighted value on the highlight tags.
fn tagged_segments(value: &str) -> Vec<(bool, &str)> {
    let mut segments = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find(HIGHLIGHT_PRE_TAG) {
        segments.push((false, &rest[..start]));
        let inner = &rest[start + HIGHLIGHT_PRE_TAG.len()..];
        match inner.find(HIGHLIGHT_POST_TAG) {
            Some(end) => {
                segments.push((true, &inner[..end]));
                rest = &inner[end + HIGHLIGHT_POST_TAG.len()..];
            }
            None => {
                segments.push((true, inner));
                rest = "";
            }
        }
    }
    segments.push((false, rest));
    segments
}

/// Case-insensitive highlighting of query words, for hits the backend did not highlight.
fn term_segments<'a>(value: &'a str, query: &str) -> Vec<(bool, &'a str)> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if terms.is_empty() {
        return vec![(false, value)];
    }
    let Ok(pat) = RegexBuilder::new(&terms.join("|")).case_insensitive(true).build() else {
        return vec![(false, value)];
    };
    let mut segments = Vec::new();
    let mut last = 0;
    for m in pat.find_iter(value) {
        segments.push((false, &value[last..m.start()]));
        segments.push((true, m.as_str()));
        last = m.end();
    }
    segments.push((false, &value[last..]));
    segments
}

fn hit_markup(ctx: &Ctx<'_>, hit: &Hit) -> String {
    let template = &ctx.layout.hits.template;
    let root = format!("ais-Highlight {}", escape_html(&template.label_class));
    let label = match hit.highlighted(&template.label_attribute) {
        Some(tagged) => highlight_markup(&tagged_segments(tagged), &root),
        None => {
            let plain = hit.attribute(&template.label_attribute).unwrap_or_default();
            highlight_markup(&term_segments(&plain, &ctx.resolved.query), &root)
        }
    };
    format!(
        r#"{label}<span class="{}">${}</span>"#,
        escape_html(&template.price_class),
        format_price(hit.price)
    )
}

fn current_refinements(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.current_refinements;
    let names = &cfg.class_names;
    let refinements = &ctx.state.refinement_list;
    let root = if refinements.is_empty() {
        class_with(names, "CurrentRefinements", "root", &["noRefinement"], &["noRefinementRoot"])
    } else {
        class(names, "CurrentRefinements", "root", &[])
    };
    out.push_str(&format!(r#"<div class="{root}">"#));
    out.push_str(&format!(r#"<ul class="{}">"#, class(names, "CurrentRefinements", "list", &[])));
    for (attribute, values) in refinements {
        out.push_str(&format!(r#"<li class="{}">"#, class(names, "CurrentRefinements", "item", &[])));
        out.push_str(&format!(
            r#"<span class="{}">{}:</span>"#,
            class(names, "CurrentRefinements", "label", &[]),
            escape_html(attribute)
        ));
        for value in values {
            out.push_str(&format!(
                r#"<span class="{}"><span class="{}">{}</span><button class="{}" type="button" data-attribute="{}" data-value="{}">✕</button></span>"#,
                class(names, "CurrentRefinements", "category", &[]),
                class(names, "CurrentRefinements", "categoryLabel", &[]),
                escape_html(value),
                class(names, "CurrentRefinements", "delete", &[]),
                escape_html(attribute),
                escape_html(value),
            ));
        }
        out.push_str("</li>");
    }
    out.push_str("</ul></div>");
}

fn clear_refinements(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.clear_refinements;
    let names = &cfg.class_names;
    let disabled = ctx.state.refinement_list.is_empty();
    let button = if disabled {
        class_with(names, "ClearRefinements", "button", &["disabled"], &["disabledButton"])
    } else {
        class(names, "ClearRefinements", "button", &[])
    };
    out.push_str(&format!(
        r#"<div class="{}"><button class="{button}" type="button"{}>{}</button></div>"#,
        class(names, "ClearRefinements", "root", &[]),
        if disabled { " disabled" } else { "" },
        escape_html(&cfg.label),
    ));
}

fn dynamic_widgets(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.dynamic_widgets;
    out.push_str(&format!(r#"<div class="{}">"#, class(&cfg.class_names, "DynamicWidgets", "root", &[])));
    for attribute in &ctx.view.results.facet_order {
        out.push_str(&format!(r#"<div class="{}">"#, class(&cfg.class_names, "DynamicWidgets", "widget", &[])));
        let panel = &cfg.panel.class_names;
        out.push_str(&format!(
            r#"<div class="{}"><div class="{}"><span>{}</span></div><div class="{}">"#,
            class(panel, "Panel", "root", &[]),
            class(panel, "Panel", "header", &[]),
            escape_html(attribute),
            class(panel, "Panel", "body", &[]),
        ));
        refinement_list(out, ctx, &cfg.fallback, attribute);
        out.push_str("</div></div></div>");
    }
    out.push_str("</div>");
}

struct FacetItem {
    value: String,
    label: String,
    count: u64,
    refined: bool,
}

fn compare_items(a: &FacetItem, b: &FacetItem, criteria: &[FacetSort]) -> Ordering {
    for c in criteria {
        let ord = match c {
            FacetSort::NameAsc => a.value.cmp(&b.value),
            FacetSort::NameDesc => b.value.cmp(&a.value),
            FacetSort::CountAsc => a.count.cmp(&b.count),
            FacetSort::CountDesc => b.count.cmp(&a.count),
            FacetSort::IsRefined => b.refined.cmp(&a.refined),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn refinement_list(out: &mut String, ctx: &Ctx<'_>, cfg: &RefinementListConfig, attribute: &str) {
    let names = &cfg.class_names;
    let facet_search = ctx.view.local.facet_searches.get(attribute).filter(|s| !s.query.is_empty());
    let mut items: Vec<FacetItem> = match facet_search {
        Some(search) => search
            .hits
            .iter()
            .map(|h| FacetItem {
                value: h.value.clone(),
                label: highlight_markup(&tagged_segments(&h.highlighted), "ais-Highlight"),
                count: h.count,
                refined: ctx.state.is_refined(attribute, &h.value),
            })
            .collect(),
        None => {
            let mut items: Vec<FacetItem> = ctx
                .view
                .results
                .facets
                .get(attribute)
                .into_iter()
                .flatten()
                .map(|(value, count)| FacetItem {
                    value: value.clone(),
                    label: escape_html(value),
                    count: *count,
                    refined: ctx.state.is_refined(attribute, value),
                })
                .collect();
            items.sort_by(|a, b| compare_items(a, b, &cfg.sort_by));
            items
        }
    };

    let expanded = ctx.view.local.expanded.contains(attribute);
    let limit = (if cfg.show_more && expanded { cfg.show_more_limit } else { cfg.limit }) as usize;
    let can_toggle = cfg.show_more && facet_search.is_none() && (expanded || items.len() > cfg.limit as usize);
    items.truncate(limit);

    let root = if items.is_empty() {
        class_with(names, "RefinementList", "root", &["noRefinement"], &["noRefinementRoot"])
    } else {
        class(names, "RefinementList", "root", &[])
    };
    out.push_str(&format!(r#"<div class="{root}" data-attribute="{}">"#, escape_html(attribute)));
    if cfg.searchable {
        out.push_str(&format!(
            r#"<div class="{}"><div class="ais-SearchBox"><form class="ais-SearchBox-form" action="" novalidate="" role="search"><input class="ais-SearchBox-input" type="search" placeholder="{}" maxlength="512" value="{}"/></form></div></div>"#,
            class(names, "RefinementList", "searchBox", &[]),
            escape_html(&cfg.searchable_placeholder),
            escape_html(facet_search.map(|s| s.query.as_str()).unwrap_or("")),
        ));
    }
    if facet_search.is_some() && items.is_empty() {
        out.push_str(&format!(
            r#"<div class="{}">No results.</div>"#,
            class(names, "RefinementList", "noResults", &[])
        ));
    }
    out.push_str(&format!(r#"<ul class="{}">"#, class(names, "RefinementList", "list", &[])));
    for item in &items {
        let li = if item.refined {
            class_with(names, "RefinementList", "item", &["selected"], &["selectedItem"])
        } else {
            class(names, "RefinementList", "item", &[])
        };
        out.push_str(&format!(
            r#"<li class="{li}"><label class="{}"><input class="{}" type="checkbox" value="{}"{}/><span class="{}">{}</span><span class="{}">{}</span></label></li>"#,
            class(names, "RefinementList", "label", &[]),
            class(names, "RefinementList", "checkbox", &[]),
            escape_html(&item.value),
            if item.refined { " checked" } else { "" },
            class(names, "RefinementList", "labelText", &[]),
            item.label,
            class(names, "RefinementList", "count", &[]),
            format_count(item.count),
        ));
    }
    out.push_str("</ul>");
    if cfg.show_more && facet_search.is_none() {
        let button = if can_toggle {
            class(names, "RefinementList", "showMore", &[])
        } else {
            class_with(names, "RefinementList", "showMore", &["disabled"], &["disabledShowMore"])
        };
        out.push_str(&format!(
            r#"<button class="{button}" type="button"{}>{}</button>"#,
            if can_toggle { "" } else { " disabled" },
            if expanded { "Show less" } else { "Show more" },
        ));
    }
    out.push_str("</div>");
}

fn stats(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.stats;
    let text = cfg.label.replace("{nbHits}", &format_count(ctx.view.results.nb_hits));
    out.push_str(&format!(
        r#"<div class="{}"><span class="{}">{}</span></div>"#,
        class(&cfg.class_names, "Stats", "root", &[]),
        class(&cfg.class_names, "Stats", "text", &[]),
        escape_html(&text),
    ));
}

fn sort_by(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.sort_by;
    let names = &cfg.class_names;
    out.push_str(&format!(
        r#"<div class="{}"><select class="{}">"#,
        class(names, "SortBy", "root", &[]),
        class(names, "SortBy", "select", &[]),
    ));
    for item in &cfg.items {
        out.push_str(&format!(
            r#"<option class="{}" value="{}"{}>{}</option>"#,
            class(names, "SortBy", "option", &[]),
            escape_html(&item.value),
            if item.value == ctx.resolved.index_name { " selected" } else { "" },
            escape_html(&item.label),
        ));
    }
    out.push_str("</select></div>");
}

fn search_box(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.search_box;
    let names = &cfg.class_names;
    let query = &ctx.resolved.query;
    let reset_icon = match &cfg.reset_label {
        Some(label) => format!(r#"<div class="{}">{}</div>"#, class(names, "SearchBox", "resetIcon", &[]), escape_html(label)),
        None => format!(r#"<svg class="{}" viewBox="0 0 20 20" width="10" height="10" aria-hidden="true"></svg>"#, class(names, "SearchBox", "resetIcon", &[])),
    };
    out.push_str(&format!(
        concat!(
            r#"<div class="{}"><form class="{}" action="" novalidate="" role="search">"#,
            r#"<input class="{}" type="search" autocomplete="off" autocorrect="off" autocapitalize="off" spellcheck="false" maxlength="512" placeholder="{}" value="{}"/>"#,
            r#"<button class="{}" type="submit" title="Submit the search query"><svg class="{}" viewBox="0 0 40 40" width="10" height="10" aria-hidden="true"></svg></button>"#,
            r#"<button class="{}" type="reset" title="Clear the search query"{}>{}</button>"#,
            "</form></div>"
        ),
        class(names, "SearchBox", "root", &[]),
        class(names, "SearchBox", "form", &[]),
        class(names, "SearchBox", "input", &[]),
        escape_html(&cfg.placeholder),
        escape_html(query),
        class(names, "SearchBox", "submit", &[]),
        class(names, "SearchBox", "submitIcon", &[]),
        class(names, "SearchBox", "reset", &[]),
        if query.is_empty() { " hidden" } else { "" },
        reset_icon,
    ));
}

fn hits(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.hits;
    let names = &cfg.class_names;
    let results = &ctx.view.results.hits;
    let root = if results.is_empty() {
        class_with(names, "Hits", "root", &["empty"], &["emptyRoot"])
    } else {
        class(names, "Hits", "root", &[])
    };
    out.push_str(&format!(r#"<div class="{root}"><ol class="{}">"#, class(names, "Hits", "list", &[])));
    for hit in results {
        out.push_str(&format!(
            r#"<li class="{}" data-object-id="{}">{}</li>"#,
            class(names, "Hits", "item", &[]),
            escape_html(&hit.object_id),
            hit_markup(ctx, hit),
        ));
    }
    out.push_str("</ol></div>");
}

fn pagination(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.pagination;
    let names = &cfg.class_names;
    let nb_pages = ctx.view.results.nb_pages;
    let current = ctx.resolved.page.saturating_sub(1);
    let last_page = nb_pages.saturating_sub(1);
    let root = if nb_pages <= 1 {
        class_with(names, "Pagination", "root", &["noRefinement"], &["noRefinementRoot"])
    } else {
        class(names, "Pagination", "root", &[])
    };
    out.push_str(&format!(r#"<div class="{root}"><ul class="{}">"#, class(names, "Pagination", "list", &[])));

    let item = |out: &mut String, kind: &str, part: &str, page: u32, label: &str, text: &str, disabled: bool, selected: bool| {
        let mut modifiers = vec![kind];
        let mut states = vec![part];
        if selected {
            modifiers.push("selected");
            states.push("selectedItem");
        }
        if disabled {
            modifiers.push("disabled");
            states.push("disabledItem");
        }
        let li = class_with(names, "Pagination", "item", &modifiers, &states);
        let link = class(names, "Pagination", "link", &[]);
        if disabled {
            out.push_str(&format!(r#"<li class="{li}"><span class="{link}" aria-label="{label}">{text}</span></li>"#));
        } else {
            let href = ctx.href(ctx.state.set_page(page + 1, &ctx.layout.state_defaults()));
            out.push_str(&format!(r#"<li class="{li}"><a class="{link}" aria-label="{label}" href="{href}">{text}</a></li>"#));
        }
    };

    let at_start = current == 0;
    let at_end = current >= last_page;
    if cfg.show_first {
        item(out, "firstPage", "firstPageItem", 0, "First Page", "«", at_start, false);
    }
    if cfg.show_previous {
        item(out, "previousPage", "previousPageItem", current.saturating_sub(1), "Previous Page", "‹", at_start, false);
    }
    for page in pagination_pages(current, nb_pages, cfg.padding) {
        let n = page + 1;
        item(out, "page", "pageItem", page, &format!("Page {n}"), &n.to_string(), false, page == current);
    }
    if cfg.show_next {
        item(out, "nextPage", "nextPageItem", current + 1, "Next Page", "›", at_end, false);
    }
    if cfg.show_last {
        item(out, "lastPage", "lastPageItem", last_page, "Last Page", "»", at_end, false);
    }
    out.push_str("</ul></div>");
}

fn hits_per_page(out: &mut String, ctx: &Ctx<'_>) {
    let cfg = &ctx.layout.hits_per_page;
    let names = &cfg.class_names;
    out.push_str(&format!(
        r#"<div class="{}"><select class="{}">"#,
        class(names, "HitsPerPage", "root", &[]),
        class(names, "HitsPerPage", "select", &[]),
    ));
    for item in &cfg.items {
        out.push_str(&format!(
            r#"<option class="{}" value="{}"{}>{}</option>"#,
            class(names, "HitsPerPage", "option", &[]),
            item.value,
            if item.value == ctx.resolved.hits_per_page { " selected" } else { "" },
            escape_html(&item.label),
        ));
    }
    out.push_str("</select></div>");
}
