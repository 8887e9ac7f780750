use std::env;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::WikiWriteApi;
use crate::closure::{ClosureStats, resolve_closure_with_stats};
use crate::config::{SyncConfig, load_config};
use crate::executor::{SyncOptions, SyncReport, sync_pages};
use crate::mediawiki::MediaWikiService;
use crate::site::Site;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// `WIKI_BOT_USER` and `WIKI_BOT_PASS`, when both are set and non-blank.
    pub fn from_env() -> Option<Self> {
        let username = env::var("WIKI_BOT_USER").ok()?;
        let password = env::var("WIKI_BOT_PASS").ok()?;
        if username.trim().is_empty() || password.trim().is_empty() {
            return None;
        }
        Some(Self {
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source: Site,
    pub destination: Site,
    pub closure: ClosureStats,
    pub sync: SyncReport,
}

/// Loads the configuration file and synchronizes it against live MediaWiki sites.
pub fn sync_from_config_file(config_path: &Path) -> Result<PipelineReport> {
    let config = load_config(config_path)?;
    let mut service = MediaWikiService::from_env(config.endpoint_overrides());
    run_sync(&config, &mut service, Credentials::from_env().as_ref())
}

pub fn run_sync<A: WikiWriteApi>(
    config: &SyncConfig,
    api: &mut A,
    credentials: Option<&Credentials>,
) -> Result<PipelineReport> {
    config.validate()?;

    let source = api.connect(config.sites.src.fam.trim(), config.sites.src.code.trim())?;
    let destination = api.connect(config.sites.dst.fam.trim(), config.sites.dst.code.trim())?;
    info!("syncing from {source} to {destination}");

    match credentials {
        Some(credentials) => {
            api.login(&destination, &credentials.username, &credentials.password)?
        }
        None => warn!("WIKI_BOT_USER/WIKI_BOT_PASS not set; editing {destination} anonymously"),
    }

    let closure = resolve_closure_with_stats(api, &source, config.pages(), config.categories())?;
    info!("{} pages to synchronize", closure.pages.len());

    let options = match &config.summary {
        Some(summary) if !summary.trim().is_empty() => SyncOptions {
            summary: summary.trim().to_string(),
        },
        _ => SyncOptions::for_source(&source),
    };
    let sync = sync_pages(api, &source, &destination, &closure.pages, &options)?;

    Ok(PipelineReport {
        source,
        destination,
        closure: closure.stats,
        sync,
    })
}

#[cfg(test)]
mod tests {
    use super::{Credentials, run_sync};
    use crate::config::parse_config;
    use crate::error::WikiSyncError;
    use crate::site::Site;
    use crate::testing::MockWiki;

    const CONFIG: &str = r#"
sites:
  src: {fam: wikipedia, code: en}
  dst: {fam: kiwix, code: kiwix}
pages: [New_York_City, Paris, Geneva]
categories: [Cuba]
summary: mirror
"#;

    fn source() -> Site {
        Site::new("wikipedia", "en")
    }

    fn destination() -> Site {
        Site::new("kiwix", "kiwix")
    }

    fn populated_wiki() -> MockWiki {
        let site = source();
        let articles = ["Havana", "Santiago", "Camaguey", "Holguin", "Trinidad"];
        let mut api = MockWiki::default().with_category(&site, "Cuba", &articles);
        for title in ["New_York_City", "Paris", "Geneva"]
            .into_iter()
            .chain(articles)
        {
            api = api.with_page(&site, title, &format!("text of {title}"));
        }
        for article in articles {
            api = api.with_templates(&site, article, &["Template:Infobox_country"]);
        }
        api.with_page(&site, "Template:Infobox_country", "{{{name}}}")
    }

    #[test]
    fn pipeline_resolves_and_copies_everything_once() {
        let config = parse_config(CONFIG).expect("config");
        let mut api = populated_wiki();
        let credentials = Credentials {
            username: "bot".to_string(),
            password: "secret".to_string(),
        };

        let report = run_sync(&config, &mut api, Some(&credentials)).expect("pipeline");

        assert_eq!(report.source, source());
        assert_eq!(report.destination, destination());
        assert_eq!(report.sync.total, 3 + 1 + 5 + 1);
        assert_eq!(report.sync.synced, 10);
        assert_eq!(report.closure.unique_templates, 1);
        assert_eq!(api.logins, vec![(destination(), "bot".to_string())]);

        let rerun = run_sync(&config, &mut api, Some(&credentials)).expect("second pipeline");
        assert_eq!(rerun.sync.synced, 0);
        assert_eq!(rerun.sync.skipped_existing, 10);
    }

    #[test]
    fn existing_destination_page_is_excluded_from_count() {
        let config = parse_config(
            "sites:\n  src: {fam: wikipedia, code: en}\n  dst: {fam: kiwix, code: kiwix}\npages: [New_York_City, Paris, Geneva]\n",
        )
        .expect("config");
        let mut api = populated_wiki().with_page(&destination(), "Paris", "already here");

        let report = run_sync(&config, &mut api, None).expect("pipeline");

        assert_eq!(report.sync.total, 3);
        assert_eq!(report.sync.synced, 2);
        assert_eq!(
            report.sync.pages[1].detail.as_deref(),
            Some("page exists")
        );
        assert!(api.logins.is_empty());
    }

    #[test]
    fn unreachable_destination_aborts_before_resolution() {
        let config = parse_config(CONFIG).expect("config");
        let mut api = populated_wiki();
        api.unreachable.insert(destination());

        let error = run_sync(&config, &mut api, None).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<WikiSyncError>(),
            Some(WikiSyncError::ServiceUnavailable { .. })
        ));
        assert!(api.template_queries.is_empty());
        assert!(api.committed.is_empty());
    }

    #[test]
    fn missing_category_aborts_before_any_commit() {
        let config = parse_config(
            "sites:\n  src: {fam: wikipedia, code: en}\n  dst: {fam: kiwix, code: kiwix}\npages: [Paris]\ncategories: [Atlantis]\n",
        )
        .expect("config");
        let mut api = populated_wiki();

        let error = run_sync(&config, &mut api, None).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<WikiSyncError>(),
            Some(WikiSyncError::CategoryNotFound { .. })
        ));
        assert!(api.committed.is_empty());
    }
}
