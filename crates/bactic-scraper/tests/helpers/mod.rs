//! Shared fixtures for ingestion integration tests
//!
//! [`FakeFetcher`] serves canned documents keyed by URL so the orchestrators
//! run end to end against a [`MemoryStore`] without touching the network.
//! The `*_page` builders produce just enough of the results site's markup
//! for the extractors to find what they look for.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bactic_scraper::db::{MemoryStore, Store};
use bactic_scraper::ingest::{
    FetchError, FetchedPage, MeetPageOrchestrator, PageFetcher, ScrapeConfig,
};
use bactic_scraper::ingest::tfrrs::{EventClassifier, RowParsers};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const SITE: &str = "https://www.tfrrs.org";

pub fn athlete_url(id: u32) -> String {
    format!("{}/athletes/{}.html", SITE, id)
}

pub fn team_url(slug: &str) -> String {
    format!("{}/teams/tf/{}.html", SITE, slug)
}

pub fn meet_url(id: u32) -> String {
    format!("{}/results/{}/Spring_Invitational", SITE, id)
}

pub fn xc_meet_url(id: u32) -> String {
    format!("{}/results/xc/{}/Regionals", SITE, id)
}

// ============================================================================
// Fake fetcher
// ============================================================================

#[derive(Debug, Clone)]
struct Route {
    final_url: String,
    body: String,
}

/// In-memory [`PageFetcher`]; unknown URLs answer 404
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<String>>,
    cancel_on: Mutex<HashMap<String, CancellationToken>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<String>) -> &Self {
        let url = url.into();
        self.routes.lock().unwrap().insert(
            url.clone(),
            Route {
                final_url: url,
                body: body.into(),
            },
        );
        self
    }

    /// Serve `body` at `url` as if reached after a redirect to `final_url`
    pub fn serve_redirected(
        &self,
        url: impl Into<String>,
        final_url: impl Into<String>,
        body: impl Into<String>,
    ) -> &Self {
        self.routes.lock().unwrap().insert(
            url.into(),
            Route {
                final_url: final_url.into(),
                body: body.into(),
            },
        );
        self
    }

    /// Cancel `token` as soon as `url` is requested
    pub fn cancel_when_fetched(&self, url: impl Into<String>, token: CancellationToken) {
        self.cancel_on.lock().unwrap().insert(url.into(), token);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(token) = self.cancel_on.lock().unwrap().get(url) {
            token.cancel();
        }

        let route = self.routes.lock().unwrap().get(url).cloned();
        match route {
            Some(route) => Ok(FetchedPage {
                url: url.to_string(),
                final_url: route.final_url,
                status: 200,
                body: route.body,
            }),
            None => Err(FetchError::status(url, 404)),
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn test_config() -> ScrapeConfig {
    ScrapeConfig {
        feed_url: format!("{}/results.rss", SITE),
        site_base_url: SITE.to_string(),
        ..ScrapeConfig::default()
    }
}

pub fn page_orchestrator(
    store: Arc<MemoryStore>,
    fetcher: Arc<FakeFetcher>,
    cancel: CancellationToken,
) -> MeetPageOrchestrator {
    let store: Arc<dyn Store> = store;
    let fetcher: Arc<dyn PageFetcher> = fetcher;
    MeetPageOrchestrator::new(
        store,
        fetcher,
        Arc::new(EventClassifier::new()),
        Arc::new(RowParsers::new()),
        test_config(),
        cancel,
    )
}

// ============================================================================
// Markup builders
// ============================================================================

/// A result table row: `(place, athlete link id, team url, time)`
pub fn individual_row(place: u32, athlete: u32, team: &str, time: &str) -> String {
    format!(
        r#"<tr>
          <td>{place}</td>
          <td><a href="/athletes/{athlete}/School/Runner_{athlete}.html">Runner, Athlete</a></td>
          <td>SR-4</td>
          <td><a href="{team}">Team</a></td>
          <td>{time}</td>
        </tr>"#
    )
}

pub fn sprint_row(place: u32, athlete: u32, team: &str, time: &str, wind: &str) -> String {
    format!(
        r#"<tr>
          <td>{place}</td>
          <td><a href="/athletes/{athlete}/School/Sprinter_{athlete}.html">Sprinter, Athlete</a></td>
          <td>JR-3</td>
          <td><a href="{team}">Team</a></td>
          <td>{time}</td>
          <td>{wind}</td>
        </tr>"#
    )
}

pub fn cross_country_row(place: u32, athlete: u32, team: &str, time: &str) -> String {
    format!(
        r#"<tr>
          <td>{place}</td>
          <td><a href="/athletes/{athlete}/School/Harrier_{athlete}.html">Harrier, Athlete</a></td>
          <td>SO-2</td>
          <td><a href="{team}">Team</a></td>
          <td>8.0</td>
          <td>{time}</td>
        </tr>"#
    )
}

pub fn relay_row(place: u32, team: &str, members: &[u32], time: &str) -> String {
    let legs: Vec<String> = members
        .iter()
        .map(|id| format!(r#"<a href="/athletes/{id}/School/Leg_{id}.html">Leg {id}</a>"#))
        .collect();
    format!(
        r#"<tr>
          <td><a href="{team}">Relay Team</a></td>
          <td>{place}</td>
          <td>{legs}</td>
          <td>{time}</td>
          <td>10</td>
        </tr>"#,
        legs = legs.join(" ")
    )
}

/// A track meet page with one results block per `(header, rows)`
pub fn meet_page(tables: &[(&str, Vec<String>)]) -> String {
    meet_page_with_companions(tables, &[])
}

pub fn meet_page_with_companions(tables: &[(&str, Vec<String>)], companions: &[&str]) -> String {
    let blocks: String = tables
        .iter()
        .map(|(header, rows)| {
            format!(
                r#"<div class="row">
                  <div class="custom-table-title"><h3>{header}</h3></div>
                  <table>
                    <thead><tr><th>PL</th><th>NAME</th><th>YEAR</th><th>TEAM</th><th>TIME</th></tr></thead>
                    <tbody>{rows}</tbody>
                  </table>
                </div>"#,
                rows = rows.concat()
            )
        })
        .collect();
    let links: String = companions
        .iter()
        .map(|href| format!(r#"<a href="{href}">Other results</a>"#))
        .collect();

    format!(
        r#"<html><body>
          <div class="panel-second-title">
            <span class="panel-heading-normal-text">{links}</span>
          </div>
          <div class="container">{blocks}</div>
        </body></html>"#
    )
}

/// A cross-country meet page; headers carry a second descriptive line
pub fn xc_meet_page(tables: &[(&str, Vec<String>)]) -> String {
    let blocks: String = tables
        .iter()
        .map(|(header, rows)| {
            format!(
                r#"<div class="row">
                  <div class="custom-table-title-xc"><h3>{header}
                    Regional Championship Course</h3></div>
                  <table><tbody>{rows}</tbody></table>
                </div>"#,
                rows = rows.concat()
            )
        })
        .collect();
    format!(r#"<html><body><div class="container">{blocks}</div></body></html>"#)
}

pub fn athlete_page(name: &str) -> String {
    format!(
        r#"<html><body>
          <div class="panel-heading">
            <h3 class="panel-title large-title">{name} SR-4</h3>
          </div>
        </body></html>"#
    )
}

pub fn team_page(name: &str, affiliations: &[&str]) -> String {
    let spans: String = affiliations
        .iter()
        .map(|text| format!("<span>{text}</span>"))
        .collect();
    format!(
        r#"<html><body>
          <h3 id="team-name">{name}</h3>
          <span class="panel-heading-normal-text">{spans}</span>
        </body></html>"#
    )
}

pub fn feed(items: &[(&str, &str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(title, date, link)| {
            format!(
                "<item><title>{title}</title><description>{date}</description><link>{link}</link></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Results</title>{entries}</channel></rss>"#
    )
}
