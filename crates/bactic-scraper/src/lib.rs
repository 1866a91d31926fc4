//! Bactic scraper library
//!
//! Ingests collegiate track & field and cross-country results from the
//! TFRRS results site into a normalized Postgres database.
//!
//! # Overview
//!
//! - **Feed polling**: newly posted meets are discovered from the site's RSS
//!   feed and deduplicated by their link
//! - **Page ingestion**: each meet page's result tables are classified,
//!   parsed and committed one heat per transaction
//! - **Identity resolution**: athlete links that differ from page to page are
//!   converged onto one athlete through their profile pages
//! - **Schools**: created once per team page, with division and leagues
//!
//! # Modules
//!
//! - [`config`]: environment configuration
//! - [`db`]: the [`db::Store`] trait with Postgres and in-memory backends
//! - [`ingest`]: parsing, resolution and orchestration

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod ingest;

pub use config::Config;
