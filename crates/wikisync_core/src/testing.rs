use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::api::{WikiReadApi, WikiWriteApi};
use crate::error::WikiSyncError;
use crate::site::{Site, qualify_category_title};

pub type SiteTitle = (Site, String);

/// In-memory content service with scripted responses.
#[derive(Default)]
pub struct MockWiki {
    pub unreachable: BTreeSet<Site>,
    pub pages: BTreeMap<SiteTitle, String>,
    pub templates: BTreeMap<SiteTitle, Vec<String>>,
    pub categories: BTreeMap<SiteTitle, Vec<String>>,
    pub foreign_titles: BTreeSet<SiteTitle>,
    pub refused_commits: BTreeSet<String>,
    pub broken_commits: BTreeSet<String>,
    pub committed: Vec<SiteTitle>,
    pub text_fetches: Vec<SiteTitle>,
    pub template_queries: Vec<String>,
    pub throttles: BTreeMap<Site, Duration>,
    pub logins: Vec<(Site, String)>,
    pub request_count: usize,
}

impl MockWiki {
    pub fn with_page(mut self, site: &Site, title: &str, text: &str) -> Self {
        self.pages.insert(key(site, title), text.to_string());
        self
    }

    pub fn with_templates(mut self, site: &Site, title: &str, templates: &[&str]) -> Self {
        self.templates.insert(key(site, title), to_strings(templates));
        self
    }

    pub fn with_category(mut self, site: &Site, title: &str, articles: &[&str]) -> Self {
        let qualified = qualify_category_title(title);
        self.pages
            .insert(key(site, &qualified), format!("category page {qualified}"));
        self.categories
            .insert(key(site, &qualified), to_strings(articles));
        self
    }

    pub fn committed_titles(&self) -> Vec<String> {
        self.committed
            .iter()
            .map(|(_, title)| title.clone())
            .collect()
    }
}

impl WikiReadApi for MockWiki {
    fn connect(&mut self, family: &str, code: &str) -> Result<Site> {
        self.request_count += 1;
        let site = Site::new(family, code);
        if self.unreachable.contains(&site) {
            return Err(WikiSyncError::ServiceUnavailable {
                site,
                detail: "connection refused".to_string(),
            }
            .into());
        }
        Ok(site)
    }

    fn page_exists(&mut self, site: &Site, title: &str) -> Result<bool> {
        self.request_count += 1;
        Ok(self.pages.contains_key(&key(site, title)))
    }

    fn page_site(&mut self, site: &Site, title: &str) -> Result<Site> {
        self.request_count += 1;
        if self.foreign_titles.contains(&key(site, title)) {
            return Ok(Site::new("interwiki", site.code.clone()));
        }
        Ok(site.clone())
    }

    fn page_text(&mut self, site: &Site, title: &str) -> Result<String> {
        self.request_count += 1;
        self.text_fetches.push(key(site, title));
        self.pages.get(&key(site, title)).cloned().ok_or_else(|| {
            WikiSyncError::PageMissing {
                site: site.clone(),
                title: title.to_string(),
            }
            .into()
        })
    }

    fn invoked_templates(&mut self, site: &Site, title: &str) -> Result<Vec<String>> {
        self.request_count += 1;
        self.template_queries.push(title.to_string());
        Ok(self
            .templates
            .get(&key(site, title))
            .cloned()
            .unwrap_or_default())
    }

    fn category_articles(&mut self, site: &Site, category: &str) -> Result<Vec<String>> {
        self.request_count += 1;
        let qualified = qualify_category_title(category);
        match self.categories.get(&key(site, &qualified)) {
            Some(articles) => Ok(articles.clone()),
            None => Err(WikiSyncError::CategoryNotFound {
                site: site.clone(),
                title: qualified,
            }
            .into()),
        }
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl WikiWriteApi for MockWiki {
    fn login(&mut self, site: &Site, username: &str, _password: &str) -> Result<()> {
        self.request_count += 1;
        self.logins.push((site.clone(), username.to_string()));
        Ok(())
    }

    fn commit_page(
        &mut self,
        site: &Site,
        title: &str,
        text: &str,
        _summary: &str,
    ) -> Result<bool> {
        self.request_count += 1;
        if self.broken_commits.contains(title) {
            bail!("MediaWiki API error [protectedpage]: {title} is protected");
        }
        if self.refused_commits.contains(title) {
            return Ok(false);
        }
        self.pages.insert(key(site, title), text.to_string());
        self.committed.push(key(site, title));
        Ok(true)
    }

    fn set_write_throttle(&mut self, site: &Site, delay: Duration) {
        self.throttles.insert(site.clone(), delay);
    }
}

fn key(site: &Site, title: &str) -> SiteTitle {
    (site.clone(), title.to_string())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}
