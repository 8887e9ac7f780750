use thiserror::Error;

use crate::site::Site;

/// Failures that abort a sync run. Per-page commit problems are not errors;
/// they are reported as [`crate::executor::PageOutcome`] values.
#[derive(Debug, Error)]
pub enum WikiSyncError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("content service for {site} is unavailable: {detail}")]
    ServiceUnavailable { site: Site, detail: String },

    #[error("category not found on {site}: {title}")]
    CategoryNotFound { site: Site, title: String },

    #[error("page not found on {site}: {title}")]
    PageMissing { site: Site, title: String },
}

impl WikiSyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
