// School Resolution
//
// Schools are keyed by their team page URL. The page is only fetched when
// the URL is not yet stored.

use bactic_common::types::{NewSchool, School};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::SchoolError;
use crate::db::{DbResult, Store};

#[derive(Clone)]
pub struct SchoolResolver {
    store: Arc<dyn Store>,
}

impl SchoolResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Exact lookup by team page URL
    pub async fn find(&self, url: &str) -> DbResult<Option<School>> {
        self.store.school_by_url(url).await
    }

    /// Return the school for `url`, scraping and creating it on a miss
    ///
    /// `scrape` runs only when the URL is unknown. If another task creates
    /// the same school first, its row is returned with `created == false`.
    pub async fn resolve_or_create<F, Fut>(
        &self,
        url: &str,
        scrape: F,
    ) -> Result<(School, bool), SchoolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NewSchool, SchoolError>>,
    {
        if let Some(school) = self.find(url).await? {
            return Ok((school, false));
        }

        let mut new_school = scrape().await?;
        new_school.url = url.to_string();

        let (school, created) = self.store.create_school(&new_school).await?;
        if created {
            info!(
                school_id = %school.id,
                name = %school.name,
                division = %school.division,
                "Created school"
            );
        } else {
            debug!(url, "School created concurrently, using existing row");
        }

        Ok((school, created))
    }
}
