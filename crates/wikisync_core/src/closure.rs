//! Selection of the pages a destination needs to render the requested pages
//! and categories: the pages themselves, category members, and templates up to
//! two hops away.

use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::api::WikiReadApi;
use crate::site::{PageRef, Site};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ClosureStats {
    pub direct_pages: usize,
    pub category_pages: usize,
    pub category_articles: usize,
    pub first_hop_templates: usize,
    pub second_hop_templates: usize,
    pub unique_templates: usize,
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub pages: Vec<PageRef>,
    pub stats: ClosureStats,
}

pub fn resolve_closure<A: WikiReadApi>(
    api: &mut A,
    source: &Site,
    page_titles: &[String],
    category_titles: &[String],
) -> Result<Vec<PageRef>> {
    resolve_closure_with_stats(api, source, page_titles, category_titles)
        .map(|closure| closure.pages)
}

/// Requested pages keep their order and are not deduplicated; only the
/// discovered template tier is.
pub fn resolve_closure_with_stats<A: WikiReadApi>(
    api: &mut A,
    source: &Site,
    page_titles: &[String],
    category_titles: &[String],
) -> Result<Closure> {
    let mut stats = ClosureStats::default();
    let mut pages: Vec<PageRef> = page_titles
        .iter()
        .map(|title| source.page(title.as_str()))
        .collect();
    stats.direct_pages = pages.len();

    for title in category_titles {
        let category = source.category(title);
        pages.push(category.page());
        stats.category_pages += 1;
        info!("retrieve pages from {}", category.title);
        let articles = api.category_articles(source, &category.title)?;
        stats.category_articles += articles.len();
        pages.extend(articles.into_iter().map(|article| source.page(article)));
    }

    let mut templates = TitleSet::default();
    for page in &pages {
        let invoked = api.invoked_templates(source, &page.title)?;
        if !invoked.is_empty() {
            info!("add {} templates of {}", invoked.len(), page.title);
            stats.first_hop_templates += invoked.len();
            templates.extend(invoked);
        }
    }

    let first_hop = templates.titles.clone();
    for template in &first_hop {
        let references = api.invoked_templates(source, template)?;
        if !references.is_empty() {
            info!("add {} references of {}", references.len(), template);
            stats.second_hop_templates += references.len();
            templates.extend(references);
        }
    }
    stats.unique_templates = templates.titles.len();

    pages.extend(templates.titles.into_iter().map(|title| source.page(title)));
    Ok(Closure { pages, stats })
}

/// Titles in first-seen order, each kept once.
#[derive(Default)]
struct TitleSet {
    seen: BTreeSet<String>,
    titles: Vec<String>,
}

impl TitleSet {
    fn extend(&mut self, titles: impl IntoIterator<Item = String>) {
        for title in titles {
            if self.seen.insert(title.clone()) {
                self.titles.push(title);
            }
        }
    }
}
