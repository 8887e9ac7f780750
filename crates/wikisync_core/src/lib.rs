//! Mirrors pages from one wiki to another: resolves the closure of requested
//! pages, category members and templates, then creates whatever the
//! destination is missing.

pub mod api;
pub mod closure;
pub mod config;
pub mod error;
pub mod executor;
pub mod mediawiki;
pub mod pipeline;
pub mod site;

#[cfg(test)]
mod testing;

pub use error::WikiSyncError;
