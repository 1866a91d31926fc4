//! Feed orchestrator
//!
//! Polls the results feed on a fixed interval, creates a meet for each new
//! feed link and ingests its pages in a background task. Page tasks run
//! concurrently up to `max_concurrent_pages`; shutdown waits for them to
//! reach a heat boundary.
//!
//! A meet is marked complete only after all of its pages were ingested
//! without interruption. Known meets that never completed are cleared and
//! dispatched again by the next poll that lists them.

use bactic_common::types::{Meet, MeetId};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::ScrapeConfig;
use super::fetcher::PageFetcher;
use super::heats::MeetIngestor;
use super::meet_page::{MeetPageOrchestrator, PageReport};
use super::tfrrs::{parse_feed, EventClassifier, RowParsers};
use super::Result;
use crate::db::Store;

/// What a meet page task hands back to the orchestrator
pub type PageTaskOutput = (Meet, Result<Vec<PageReport>>);

/// Outcome of one feed poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub items: usize,
    pub new_meets: usize,
    /// Complete, or still being ingested by an earlier poll
    pub known_meets: usize,
    /// Known meets whose ingestion never completed, dispatched again
    pub resumed_meets: usize,
    /// Repeated links within the same feed document
    pub repeated_items: usize,
    /// Items whose date could not be read
    pub skipped_items: usize,
}

pub struct FeedOrchestrator {
    config: ScrapeConfig,
    fetcher: Arc<dyn PageFetcher>,
    ingestor: MeetIngestor,
    pages: MeetPageOrchestrator,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl FeedOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn PageFetcher>,
        config: ScrapeConfig,
        cancel: CancellationToken,
    ) -> Self {
        // Built once and shared read-only by every page task
        let classifier = Arc::new(EventClassifier::new());
        let parsers = Arc::new(RowParsers::new());

        let pages = MeetPageOrchestrator::new(
            store.clone(),
            fetcher.clone(),
            classifier,
            parsers,
            config.clone(),
            cancel.clone(),
        );

        Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrent_pages)),
            ingestor: MeetIngestor::new(store),
            config,
            fetcher,
            pages,
            cancel,
        }
    }

    /// Start the polling loop in the background
    pub fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Poll until cancelled, then wait for in-flight page tasks
    ///
    /// The first poll happens immediately. An identity invariant violation
    /// in any page task cancels the token and is returned once every task
    /// has stopped.
    pub async fn run(&self) -> Result<()> {
        info!(
            feed = %self.config.feed_url,
            interval_secs = self.config.interval_secs,
            "Feed orchestrator started"
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks = PageTasks::new();
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = handle_finished(joined) {
                        outcome = Err(e);
                        self.cancel.cancel();
                    }
                },

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(&mut tasks).await {
                        error!(error = %e, "Feed poll failed, retrying next interval");
                    }
                },
            }
        }

        if !tasks.is_empty() {
            info!(tasks = tasks.len(), "Waiting for meet page tasks to stop");
        }
        let drained = drain(&mut tasks, &self.cancel).await;
        if outcome.is_ok() {
            outcome = drained;
        }

        info!("Feed orchestrator stopped");
        outcome
    }

    /// Poll the feed once and wait for every dispatched meet
    pub async fn run_once(&self) -> Result<PollReport> {
        let mut tasks = PageTasks::new();
        let polled = self.poll_once(&mut tasks).await;
        drain(&mut tasks, &self.cancel).await?;
        polled
    }

    /// Fetch the feed and dispatch a page task for every meet not yet complete
    pub async fn poll_once(&self, tasks: &mut PageTasks) -> Result<PollReport> {
        let feed = self.fetcher.fetch(&self.config.feed_url).await?;
        let items = parse_feed(&feed.body)?;

        let mut report = PollReport {
            items: items.len(),
            ..PollReport::default()
        };
        let mut seen = HashSet::new();

        for item in items {
            if self.cancel.is_cancelled() {
                info!("Shutdown requested, stopping feed dispatch");
                break;
            }
            if !seen.insert(item.link.clone()) {
                report.repeated_items += 1;
                continue;
            }

            let new_meet = match item.to_new_meet() {
                Ok(meet) => meet,
                Err(e) => {
                    warn!(title = %item.title, link = %item.link, error = %e, "Skipping feed item");
                    report.skipped_items += 1;
                    continue;
                },
            };

            let (meet, created) = self.ingestor.ingest_meet(&new_meet).await?;
            if created {
                report.new_meets += 1;
            } else if meet.ingested_at.is_some() || tasks.contains(meet.id) {
                report.known_meets += 1;
                continue;
            } else {
                info!(meet_id = %meet.id, name = %meet.name, "Resuming incomplete meet");
                report.resumed_meets += 1;
            }

            self.spawn_page_task(tasks, meet, !created);
        }

        info!(
            items = report.items,
            new_meets = report.new_meets,
            known_meets = report.known_meets,
            resumed_meets = report.resumed_meets,
            skipped = report.skipped_items,
            "Feed poll complete"
        );

        Ok(report)
    }

    fn spawn_page_task(&self, tasks: &mut PageTasks, meet: Meet, resume: bool) {
        let pages = self.pages.clone();
        let ingestor = self.ingestor.clone();
        let limiter = self.limiter.clone();
        let cancel = self.cancel.clone();

        tasks.spawn(meet.id, async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return (meet, Ok(Vec::new()));
            };
            let outcome = run_page_task(&pages, &ingestor, &cancel, &meet, resume).await;
            (meet, outcome)
        });
    }
}

/// Page tasks in flight, tracked by meet so a meet runs at most once
pub struct PageTasks {
    set: JoinSet<PageTaskOutput>,
    in_flight: HashSet<MeetId>,
}

impl PageTasks {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, meet_id: MeetId) -> bool {
        self.in_flight.contains(&meet_id)
    }

    fn spawn<F>(&mut self, meet_id: MeetId, task: F)
    where
        F: Future<Output = PageTaskOutput> + Send + 'static,
    {
        self.in_flight.insert(meet_id);
        self.set.spawn(task);
    }

    async fn join_next(&mut self) -> Option<std::result::Result<PageTaskOutput, JoinError>> {
        let joined = self.set.join_next().await?;
        match &joined {
            Ok((meet, _)) => {
                self.in_flight.remove(&meet.id);
            },
            // A panicked task cannot name its meet
            Err(_) if self.set.is_empty() => self.in_flight.clear(),
            Err(_) => {},
        }
        Some(joined)
    }
}

impl Default for PageTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Ingest every page of a meet and mark it complete unless interrupted
async fn run_page_task(
    pages: &MeetPageOrchestrator,
    ingestor: &MeetIngestor,
    cancel: &CancellationToken,
    meet: &Meet,
    resume: bool,
) -> Result<Vec<PageReport>> {
    if resume {
        ingestor.reset_meet(meet.id).await?;
    }

    let reports = pages.ingest_meet_pages(meet.id, &meet.source_url).await?;

    if cancel.is_cancelled() || reports.iter().any(|report| report.cancelled) {
        info!(meet_id = %meet.id, "Meet interrupted, a later poll will resume it");
    } else {
        ingestor.complete_meet(meet.id).await?;
    }

    Ok(reports)
}

/// Log a finished page task; only invariant violations are returned
fn handle_finished(joined: std::result::Result<PageTaskOutput, JoinError>) -> Result<()> {
    match joined {
        Ok((meet, Ok(reports))) => {
            let heats: usize = reports.iter().map(|r| r.heats_committed).sum();
            let failed: usize = reports.iter().map(|r| r.heats_failed).sum();
            info!(
                meet_id = %meet.id,
                name = %meet.name,
                pages = reports.len(),
                heats,
                failed_heats = failed,
                "Meet ingested"
            );
            Ok(())
        },
        Ok((meet, Err(e))) if e.is_invariant_violation() => {
            error!(meet_id = %meet.id, error = %e, "Identity invariant violated, stopping");
            Err(e)
        },
        Ok((meet, Err(e))) => {
            error!(meet_id = %meet.id, url = %meet.source_url, error = %e, "Meet ingestion failed");
            Ok(())
        },
        Err(e) => {
            error!(error = %e, "Meet page task aborted");
            Ok(())
        },
    }
}

/// Wait for every task; the first invariant violation cancels the rest
async fn drain(tasks: &mut PageTasks, cancel: &CancellationToken) -> Result<()> {
    let mut outcome = Ok(());
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = handle_finished(joined) {
            cancel.cancel();
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
    }
    outcome
}
