use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::WikiSyncError;
use crate::site::Site;

pub const DEFAULT_USER_AGENT: &str = "wikisync/0.1";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    pub sites: SitesSection,
    #[serde(default)]
    pages: Option<Vec<String>>,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SitesSection {
    pub src: SiteConfig,
    pub dst: SiteConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(alias = "family")]
    pub fam: String,
    pub code: String,
    /// Overrides the endpoint derived from the family.
    pub api_url: Option<String>,
}

impl SiteConfig {
    pub fn site(&self) -> Site {
        Site::new(self.fam.trim(), self.code.trim())
    }
}

impl SyncConfig {
    pub fn pages(&self) -> &[String] {
        self.pages.as_deref().unwrap_or(&[])
    }

    pub fn categories(&self) -> &[String] {
        self.categories.as_deref().unwrap_or(&[])
    }

    /// Explicit API endpoints keyed by the site they belong to.
    pub fn endpoint_overrides(&self) -> Vec<(Site, String)> {
        [&self.sites.src, &self.sites.dst]
            .into_iter()
            .filter_map(|site| {
                site.api_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(|url| (site.site(), url.to_string()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (role, site) in [("src", &self.sites.src), ("dst", &self.sites.dst)] {
            if site.fam.trim().is_empty() {
                return Err(WikiSyncError::configuration(format!(
                    "sites.{role}.fam must not be empty"
                ))
                .into());
            }
            if site.code.trim().is_empty() {
                return Err(WikiSyncError::configuration(format!(
                    "sites.{role}.code must not be empty"
                ))
                .into());
            }
        }
        for (field, titles) in [("pages", self.pages()), ("categories", self.categories())] {
            if let Some(index) = titles.iter().position(|title| title.trim().is_empty()) {
                return Err(WikiSyncError::configuration(format!(
                    "{field}[{index}] must not be blank"
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Load and validate a sync configuration from a YAML file.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    parse_config(&content).with_context(|| format!("failed to load {}", config_path.display()))
}

pub fn parse_config(content: &str) -> Result<SyncConfig> {
    let parsed: SyncConfig = serde_yaml::from_str(content)
        .map_err(|error| WikiSyncError::configuration(error.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}
