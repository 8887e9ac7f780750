use std::time::Duration;

use anyhow::Result;

use crate::site::Site;

/// Read side of a wiki content service. Every call is one blocking round
/// trip; nothing is cached between calls.
pub trait WikiReadApi {
    fn connect(&mut self, family: &str, code: &str) -> Result<Site>;
    fn page_exists(&mut self, site: &Site, title: &str) -> Result<bool>;
    /// The site a title resolves to when opened on `site`. Differs from `site`
    /// when the title carries an interwiki prefix.
    fn page_site(&mut self, site: &Site, title: &str) -> Result<Site>;
    fn page_text(&mut self, site: &Site, title: &str) -> Result<String>;
    fn invoked_templates(&mut self, site: &Site, title: &str) -> Result<Vec<String>>;
    fn category_articles(&mut self, site: &Site, category: &str) -> Result<Vec<String>>;
    fn request_count(&self) -> usize;
}

pub trait WikiWriteApi: WikiReadApi {
    fn login(&mut self, site: &Site, username: &str, password: &str) -> Result<()>;
    /// Returns `false` when the service answered but refused the edit.
    fn commit_page(
        &mut self,
        site: &Site,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<bool>;
    fn set_write_throttle(&mut self, site: &Site, delay: Duration);
}
