use std::fmt;

use serde::Serialize;

pub const CATEGORY_PREFIX: &str = "Category:";

/// A wiki endpoint identified by family and language/variant code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Site {
    pub family: String,
    pub code: String,
}

impl Site {
    pub fn new(family: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            code: code.into(),
        }
    }

    pub fn page(&self, title: impl Into<String>) -> PageRef {
        PageRef::new(self.clone(), title)
    }

    pub fn category(&self, title: &str) -> CategoryRef {
        CategoryRef::new(self.clone(), title)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.code)
    }
}

/// A page on a site. Text and existence are not cached here; ask the
/// content service for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    pub site: Site,
    pub title: String,
}

impl PageRef {
    pub fn new(site: Site, title: impl Into<String>) -> Self {
        Self {
            site,
            title: title.into(),
        }
    }

    /// The page with the same title on another site.
    pub fn on(&self, site: &Site) -> PageRef {
        PageRef::new(site.clone(), self.title.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryRef {
    pub site: Site,
    pub title: String,
}

impl CategoryRef {
    /// Titles without a namespace prefix are placed in `Category:`.
    pub fn new(site: Site, title: &str) -> Self {
        Self {
            site,
            title: qualify_category_title(title),
        }
    }

    /// The category page itself.
    pub fn page(&self) -> PageRef {
        PageRef::new(self.site.clone(), self.title.clone())
    }
}

/// Namespace prefix matching is case-insensitive, as on the wiki itself.
pub fn qualify_category_title(title: &str) -> String {
    let trimmed = title.trim();
    let name = trimmed
        .get(..CATEGORY_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(CATEGORY_PREFIX))
        .map_or(trimmed, |_| trimmed[CATEGORY_PREFIX.len()..].trim_start());
    format!("{CATEGORY_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_displays_family_and_code() {
        assert_eq!(Site::new("wikipedia", "en").to_string(), "wikipedia:en");
    }

    #[test]
    fn category_title_gains_prefix_once() {
        let site = Site::new("wikipedia", "en");
        assert_eq!(site.category("Cuba").title, "Category:Cuba");
        assert_eq!(site.category("Category:Cuba").title, "Category:Cuba");
        assert_eq!(site.category("Cuba").page().title, "Category:Cuba");
    }

    #[test]
    fn category_prefix_is_recognized_in_any_case() {
        let site = Site::new("wikipedia", "en");
        assert_eq!(site.category("category:Cuba").title, "Category:Cuba");
        assert_eq!(site.category("CATEGORY: Cuba").title, "Category:Cuba");
        assert_eq!(site.category("Categories").title, "Category:Categories");
    }

    #[test]
    fn page_ref_moves_between_sites_by_title() {
        let source = Site::new("wikipedia", "en");
        let destination = Site::new("kiwix", "kiwix");
        let page = source.page("Paris");
        let copy = page.on(&destination);
        assert_eq!(copy.title, "Paris");
        assert_eq!(copy.site, destination);
        assert_ne!(copy, page);
    }
}
