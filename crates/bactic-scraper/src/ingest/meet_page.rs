//! Meet page ingestion
//!
//! One meet results page is processed as an explicit state machine:
//!
//! ```text
//! FetchingPage -> ClassifyingTables -> ParsingRows
//!   -> ResolvingIdentitiesPass1 -> FetchingUnresolvedDetailPages
//!   -> ResolvingIdentitiesPass2 -> ResolvingSchools -> Committing -> Done
//! ```
//!
//! Classification, row parsing and result assembly are pure functions over
//! the state's data; only the fetch, resolve and commit states do I/O.
//! Every unknown athlete link is resolved before the first heat is
//! written, so a committed heat never references a missing athlete.

use bactic_common::types::{
    AthleteId, EventFamily, EventType, MeetId, NewResult, SchoolId, SourceId, Stage,
};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::ScrapeConfig;
use super::fetcher::PageFetcher;
use super::heats::MeetIngestor;
use super::identity::IdentityResolver;
use super::schools::SchoolResolver;
use super::tfrrs::{
    extract_companion_links, extract_result_tables, parse_athlete_page, parse_school_page, Cell,
    EventClassifier, PageKind, ParsedRow, RawTable, RowParsers,
};
use super::{IngestError, Result, SchoolError};
use crate::db::Store;

/// What happened to one meet page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub url: String,
    pub heats_committed: usize,
    pub heats_failed: usize,
    pub tables_skipped: usize,
    pub rows_dropped: usize,
    pub athletes_created: usize,
    pub schools_created: usize,
    /// Other result pages of the same meet linked from this one
    pub companion_links: Vec<String>,
    /// Stopped at a heat boundary because shutdown was requested
    pub cancelled: bool,
}

impl PageReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

// ============================================================================
// State data
// ============================================================================

#[derive(Debug, Clone)]
struct ClassifiedTable {
    header: String,
    event_type: EventType,
    stage: Option<Stage>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone)]
struct ParsedTable {
    header: String,
    event_type: EventType,
    stage: Option<Stage>,
    rows: Vec<ParsedRow>,
}

#[derive(Debug, Clone)]
struct IdentifiedRow {
    row: ParsedRow,
    athlete_id: Option<AthleteId>,
    members: Vec<AthleteId>,
}

#[derive(Debug, Clone)]
struct IdentifiedTable {
    header: String,
    event_type: EventType,
    stage: Option<Stage>,
    rows: Vec<IdentifiedRow>,
}

#[derive(Debug, Clone)]
struct ReadyHeat {
    header: String,
    event_type: EventType,
    results: Vec<NewResult>,
}

#[derive(Debug)]
enum PageState {
    FetchingPage,
    ClassifyingTables {
        kind: PageKind,
        tables: Vec<RawTable>,
    },
    ParsingRows {
        tables: Vec<ClassifiedTable>,
    },
    ResolvingIdentitiesPass1 {
        tables: Vec<ParsedTable>,
    },
    FetchingUnresolvedDetailPages {
        tables: Vec<ParsedTable>,
        unresolved: BTreeSet<SourceId>,
    },
    ResolvingIdentitiesPass2 {
        tables: Vec<ParsedTable>,
    },
    ResolvingSchools {
        tables: Vec<IdentifiedTable>,
    },
    Committing {
        heats: Vec<ReadyHeat>,
    },
    Done,
}

impl PageState {
    fn name(&self) -> &'static str {
        match self {
            PageState::FetchingPage => "fetching_page",
            PageState::ClassifyingTables { .. } => "classifying_tables",
            PageState::ParsingRows { .. } => "parsing_rows",
            PageState::ResolvingIdentitiesPass1 { .. } => "resolving_identities_pass1",
            PageState::FetchingUnresolvedDetailPages { .. } => "fetching_unresolved_detail_pages",
            PageState::ResolvingIdentitiesPass2 { .. } => "resolving_identities_pass2",
            PageState::ResolvingSchools { .. } => "resolving_schools",
            PageState::Committing { .. } => "committing",
            PageState::Done => "done",
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives meet result pages from fetch to committed heats
#[derive(Clone)]
pub struct MeetPageOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    identities: IdentityResolver,
    schools: SchoolResolver,
    ingestor: MeetIngestor,
    classifier: Arc<EventClassifier>,
    parsers: Arc<RowParsers>,
    config: ScrapeConfig,
    cancel: CancellationToken,
}

impl MeetPageOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn PageFetcher>,
        classifier: Arc<EventClassifier>,
        parsers: Arc<RowParsers>,
        config: ScrapeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            identities: IdentityResolver::new(store.clone()),
            schools: SchoolResolver::new(store.clone()),
            ingestor: MeetIngestor::new(store),
            classifier,
            parsers,
            config,
            cancel,
        }
    }

    /// Ingest a meet's page and, when enabled, every companion page it links to
    ///
    /// A failing companion page is logged and skipped. Invariant violations
    /// and failures of the first page are returned.
    pub async fn ingest_meet_pages(&self, meet_id: MeetId, url: &str) -> Result<Vec<PageReport>> {
        let mut queue = VecDeque::from([url.to_string()]);
        let mut visited = HashSet::new();
        let mut reports = Vec::new();

        while let Some(page_url) = queue.pop_front() {
            if !visited.insert(page_url.clone()) {
                continue;
            }
            if self.cancel.is_cancelled() {
                info!(meet_id = %meet_id, url = %page_url, "Shutdown requested, not starting page");
                break;
            }

            match self.ingest_page(meet_id, &page_url).await {
                Ok(report) => {
                    queue.extend(
                        report
                            .companion_links
                            .iter()
                            .filter(|link| !visited.contains(*link))
                            .cloned(),
                    );
                    reports.push(report);
                },
                Err(e) if e.is_invariant_violation() || page_url == url => return Err(e),
                Err(e) => {
                    warn!(meet_id = %meet_id, url = %page_url, error = %e, "Companion page failed");
                },
            }
        }

        Ok(reports)
    }

    /// Run one page through the state machine
    pub async fn ingest_page(&self, meet_id: MeetId, url: &str) -> Result<PageReport> {
        let mut report = PageReport::new(url);
        let mut state = PageState::FetchingPage;

        info!(meet_id = %meet_id, url, "Ingesting meet page");

        loop {
            trace!(url, state = state.name(), "Meet page state");
            state = match state {
                PageState::FetchingPage => self.fetch_page(url, &mut report).await?,
                PageState::ClassifyingTables { kind, tables } => PageState::ParsingRows {
                    tables: classify_tables(&self.classifier, kind, tables, &mut report),
                },
                PageState::ParsingRows { tables } => PageState::ResolvingIdentitiesPass1 {
                    tables: parse_tables(&self.parsers, tables, &mut report),
                },
                PageState::ResolvingIdentitiesPass1 { tables } => {
                    let unresolved = self.find_unresolved(url, &tables).await?;
                    if unresolved.is_empty() {
                        PageState::ResolvingIdentitiesPass2 { tables }
                    } else {
                        PageState::FetchingUnresolvedDetailPages { tables, unresolved }
                    }
                },
                PageState::FetchingUnresolvedDetailPages { tables, unresolved } => {
                    let failed = self.fetch_detail_pages(url, &unresolved, &mut report).await?;
                    PageState::ResolvingIdentitiesPass2 {
                        tables: drop_unavailable(tables, &failed, &mut report),
                    }
                },
                PageState::ResolvingIdentitiesPass2 { tables } => PageState::ResolvingSchools {
                    tables: self.resolve_identities(url, tables).await?,
                },
                PageState::ResolvingSchools { tables } => PageState::Committing {
                    heats: self.resolve_schools(tables, &mut report).await?,
                },
                PageState::Committing { heats } => {
                    self.commit_heats(meet_id, heats, &mut report).await;
                    PageState::Done
                },
                PageState::Done => break,
            };
        }

        info!(
            meet_id = %meet_id,
            url,
            heats = report.heats_committed,
            failed_heats = report.heats_failed,
            skipped_tables = report.tables_skipped,
            dropped_rows = report.rows_dropped,
            new_athletes = report.athletes_created,
            new_schools = report.schools_created,
            "Meet page ingested"
        );

        Ok(report)
    }

    // ========================================================================
    // I/O states
    // ========================================================================

    async fn fetch_page(&self, url: &str, report: &mut PageReport) -> Result<PageState> {
        let page = self.fetcher.fetch(url).await?;
        let page_url = Url::parse(&page.final_url).map_err(|source| IngestError::InvalidUrl {
            url: page.final_url.clone(),
            source,
        })?;

        if self.config.follow_companion_pages {
            report.companion_links = extract_companion_links(&page.body, &page_url);
        }

        let tables = extract_result_tables(&page.body, &page_url);
        debug!(url, tables = tables.len(), "Extracted result tables");

        Ok(PageState::ClassifyingTables {
            kind: PageKind::from_url(page_url.as_str()),
            tables,
        })
    }

    /// Pass 1: ids the map cannot resolve yet
    async fn find_unresolved(
        &self,
        url: &str,
        tables: &[ParsedTable],
    ) -> Result<BTreeSet<SourceId>> {
        let mut unresolved = BTreeSet::new();
        for id in collect_source_ids(tables) {
            let known = self
                .identities
                .lookup(id)
                .await
                .map_err(|e| IngestError::identity(url, e))?;
            if known.is_none() {
                unresolved.insert(id);
            }
        }
        debug!(url, unresolved = unresolved.len(), "Identity pass 1 complete");
        Ok(unresolved)
    }

    /// Fetch each unknown athlete's profile and resolve it
    ///
    /// Returns the ids whose profile could not be fetched or read.
    async fn fetch_detail_pages(
        &self,
        url: &str,
        unresolved: &BTreeSet<SourceId>,
        report: &mut PageReport,
    ) -> Result<BTreeSet<SourceId>> {
        let mut failed = BTreeSet::new();

        for &id in unresolved {
            let profile_url = self.config.athlete_url(id);
            let profile = match self.fetcher.fetch(&profile_url).await {
                Ok(page) => {
                    parse_athlete_page(&page.final_url, &page.body).map_err(|e| e.to_string())
                },
                Err(e) => Err(e.to_string()),
            };

            let profile = match profile {
                Ok(profile) => profile,
                Err(reason) => {
                    warn!(
                        athlete = %id,
                        url = %profile_url,
                        error = %reason,
                        "Athlete profile unavailable, dropping its rows"
                    );
                    failed.insert(id);
                    continue;
                },
            };

            let resolution = self
                .identities
                .resolve_or_create(id, &profile)
                .await
                .map_err(|e| IngestError::identity(url, e))?;
            if resolution.is_new {
                report.athletes_created += 1;
            }
        }

        Ok(failed)
    }

    /// Pass 2: every remaining id must now resolve
    async fn resolve_identities(
        &self,
        url: &str,
        tables: Vec<ParsedTable>,
    ) -> Result<Vec<IdentifiedTable>> {
        let mut identified = Vec::with_capacity(tables.len());

        for table in tables {
            let mut rows = Vec::with_capacity(table.rows.len());
            for row in table.rows {
                let athlete_id = if row.performer.is_none() {
                    None
                } else {
                    Some(self.require(url, row.performer).await?)
                };
                let mut members = Vec::with_capacity(row.members.len());
                for member in &row.members {
                    members.push(self.require(url, *member).await?);
                }
                rows.push(IdentifiedRow {
                    row,
                    athlete_id,
                    members,
                });
            }
            identified.push(IdentifiedTable {
                header: table.header,
                event_type: table.event_type,
                stage: table.stage,
                rows,
            });
        }

        Ok(identified)
    }

    async fn require(&self, url: &str, id: SourceId) -> Result<AthleteId> {
        self.identities.require(id).await.map_err(|e| {
            error!(url, athlete = %id, error = %e, "Athlete unresolved after profile pass");
            IngestError::identity(url, e)
        })
    }

    async fn resolve_schools(
        &self,
        tables: Vec<IdentifiedTable>,
        report: &mut PageReport,
    ) -> Result<Vec<ReadyHeat>> {
        let links: BTreeSet<String> = tables
            .iter()
            .flat_map(|table| table.rows.iter())
            .filter_map(|row| row.row.school_link.clone())
            .collect();

        let mut resolved: HashMap<String, SchoolId> = HashMap::new();
        for link in links {
            let fetcher = &self.fetcher;
            let team_url = link.as_str();
            let outcome = self
                .schools
                .resolve_or_create(team_url, move || async move {
                    let page = fetcher.fetch(team_url).await?;
                    Ok::<_, SchoolError>(parse_school_page(team_url, &page.body)?)
                })
                .await;

            match outcome {
                Ok((school, created)) => {
                    if created {
                        report.schools_created += 1;
                    }
                    resolved.insert(link, school.id);
                },
                Err(SchoolError::Store(e)) => return Err(e.into()),
                Err(e) => warn!(url = %link, error = %e, "School unavailable, dropping its rows"),
            }
        }

        Ok(assemble_heats(tables, &resolved, report))
    }

    async fn commit_heats(&self, meet_id: MeetId, heats: Vec<ReadyHeat>, report: &mut PageReport) {
        for heat in heats {
            if self.cancel.is_cancelled() {
                info!(
                    meet_id = %meet_id,
                    url = %report.url,
                    "Shutdown requested, stopping at heat boundary"
                );
                report.cancelled = true;
                break;
            }

            match self
                .ingestor
                .ingest_heat(heat.event_type, meet_id, &heat.results)
                .await
            {
                Ok(_) => report.heats_committed += 1,
                Err(e) => {
                    error!(
                        meet_id = %meet_id,
                        event = %heat.event_type,
                        header = %heat.header,
                        error = %e,
                        "Heat commit failed, nothing written"
                    );
                    report.heats_failed += 1;
                },
            }
        }
    }
}

// ============================================================================
// Pure transitions
// ============================================================================

fn classify_tables(
    classifier: &EventClassifier,
    kind: PageKind,
    tables: Vec<RawTable>,
    report: &mut PageReport,
) -> Vec<ClassifiedTable> {
    tables
        .into_iter()
        .filter_map(|table| {
            if table.rows.is_empty() {
                return None;
            }
            if kind == PageKind::CrossCountry && EventClassifier::is_team_results(&table.header) {
                debug!(header = %table.header, "Skipping team scores");
                report.tables_skipped += 1;
                return None;
            }

            let classified = match kind {
                PageKind::Track => classifier.classify_track_event(&table.header),
                PageKind::CrossCountry => classifier.classify_cross_country_event(&table.header),
            };

            match classified {
                Ok(event_type) => Some(ClassifiedTable {
                    stage: EventClassifier::stage(&table.header),
                    header: table.header,
                    event_type,
                    rows: table.rows,
                }),
                Err(e) => {
                    warn!(error = %e, "Skipping table");
                    report.tables_skipped += 1;
                    None
                },
            }
        })
        .collect()
}

fn parse_tables(
    parsers: &RowParsers,
    tables: Vec<ClassifiedTable>,
    report: &mut PageReport,
) -> Vec<ParsedTable> {
    let mut parsed = Vec::with_capacity(tables.len());

    for table in tables {
        if !parsers.supports(table.event_type) {
            debug!(event = %table.event_type, header = %table.header, "No row parser, skipping table");
            report.tables_skipped += 1;
            continue;
        }

        let mut rows = Vec::with_capacity(table.rows.len());
        for cells in &table.rows {
            match parsers.parse(table.event_type, cells) {
                Ok(row) if !names_competitor(&row, table.event_type) => {
                    debug!(header = %table.header, place = row.place, "Row has no linked competitor");
                    report.rows_dropped += 1;
                },
                Ok(row) => rows.push(row),
                Err(e) if e.is_timing() => {
                    trace!(header = %table.header, error = %e, "Non-performance row");
                    report.rows_dropped += 1;
                },
                Err(e) => {
                    warn!(header = %table.header, error = %e, "Skipping row");
                    report.rows_dropped += 1;
                },
            }
        }

        if rows.is_empty() {
            continue;
        }

        parsed.push(ParsedTable {
            header: table.header,
            event_type: table.event_type,
            stage: table.stage,
            rows,
        });
    }

    parsed
}

/// Individual rows need a profile link; relay lines need a team or members
fn names_competitor(row: &ParsedRow, event_type: EventType) -> bool {
    match event_type.family() {
        EventFamily::Relay => row.team.is_some() || !row.members.is_empty(),
        _ => !row.performer.is_none(),
    }
}

fn collect_source_ids(tables: &[ParsedTable]) -> BTreeSet<SourceId> {
    tables
        .iter()
        .flat_map(|table| table.rows.iter())
        .flat_map(ParsedRow::source_ids)
        .collect()
}

/// Remove references to athletes whose profile could not be fetched
///
/// Individual rows are dropped; relay lines lose only the missing member.
fn drop_unavailable(
    tables: Vec<ParsedTable>,
    failed: &BTreeSet<SourceId>,
    report: &mut PageReport,
) -> Vec<ParsedTable> {
    if failed.is_empty() {
        return tables;
    }

    tables
        .into_iter()
        .filter_map(|mut table| {
            let before = table.rows.len();
            table.rows.retain(|row| !failed.contains(&row.performer));
            report.rows_dropped += before - table.rows.len();
            for row in &mut table.rows {
                row.members.retain(|member| !failed.contains(member));
            }
            (!table.rows.is_empty()).then_some(table)
        })
        .collect()
}

fn assemble_heats(
    tables: Vec<IdentifiedTable>,
    schools: &HashMap<String, SchoolId>,
    report: &mut PageReport,
) -> Vec<ReadyHeat> {
    tables
        .into_iter()
        .filter_map(|table| {
            let stage = table.stage;
            let results: Vec<NewResult> = table
                .rows
                .into_iter()
                .filter_map(|identified| {
                    let school_id = match &identified.row.school_link {
                        Some(link) => match schools.get(link) {
                            Some(id) => Some(*id),
                            None => {
                                report.rows_dropped += 1;
                                return None;
                            },
                        },
                        None => None,
                    };
                    Some(NewResult {
                        athlete_id: identified.athlete_id,
                        school_id,
                        place: identified.row.place,
                        quantity: identified.row.quantity,
                        wind: identified.row.wind,
                        stage,
                        team: identified.row.team,
                        members: identified.members,
                    })
                })
                .collect();

            (!results.is_empty()).then_some(ReadyHeat {
                header: table.header,
                event_type: table.event_type,
                results,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ATHLETE: &str = "https://www.tfrrs.org/athletes/1001.html";
    const TEAM: &str = "https://www.tfrrs.org/teams/a.html";

    fn row(place: &str, athlete: Option<&str>, time: &str) -> Vec<Cell> {
        vec![
            Cell::new(place),
            match athlete {
                Some(link) => Cell::linked("Runner, Jane", link),
                None => Cell::new("Runner, Jane"),
            },
            Cell::new("SR"),
            Cell::linked("Team A", TEAM),
            Cell::new(time),
        ]
    }

    fn table(header: &str, rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable {
            header: header.to_string(),
            rows,
        }
    }

    #[test]
    fn test_classify_skips_empty_unknown_and_team_tables() {
        let classifier = EventClassifier::new();
        let mut report = PageReport::default();
        let tables = vec![
            table("Men's 5000 Meters", vec![row("1", Some(ATHLETE), "14:01.29")]),
            table("Men's 1000 Meters", vec![row("1", Some(ATHLETE), "2:30.00")]),
            table("Men's 800 Meters", vec![]),
        ];
        let classified = classify_tables(&classifier, PageKind::Track, tables, &mut report);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].event_type, EventType::T5000M);
        assert_eq!(report.tables_skipped, 1);

        let mut report = PageReport::default();
        let xc = vec![
            table("Men's 8k Run CC Team Results", vec![row("1", None, "1")]),
            table("Men's 8k Run CC", vec![row("1", Some(ATHLETE), "25:00.0")]),
        ];
        let classified = classify_tables(&classifier, PageKind::CrossCountry, xc, &mut report);
        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].event_type, EventType::Xc8K);
        assert_eq!(report.tables_skipped, 1);
    }

    #[test]
    fn test_parse_drops_bad_rows_but_keeps_table() {
        let parsers = RowParsers::new();
        let mut report = PageReport::default();
        let tables = vec![ClassifiedTable {
            header: "Men's 5000 Meters".to_string(),
            event_type: EventType::T5000M,
            stage: None,
            rows: vec![
                row("1", Some(ATHLETE), "14:01.29"),
                row("2", Some(ATHLETE), "DNF"),
                row("3", Some(ATHLETE), "fast"),
                row("4", None, "14:30.00"),
            ],
        }];
        let parsed = parse_tables(&parsers, tables, &mut report);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].rows.len(), 1);
        assert_eq!(report.rows_dropped, 3);
    }

    #[test]
    fn test_field_tables_are_skipped() {
        let parsers = RowParsers::new();
        let mut report = PageReport::default();
        let tables = vec![ClassifiedTable {
            header: "Women's Javelin".to_string(),
            event_type: EventType::Javelin,
            stage: Some(Stage::Final),
            rows: vec![row("1", Some(ATHLETE), "45.10")],
        }];
        assert!(parse_tables(&parsers, tables, &mut report).is_empty());
        assert_eq!(report.tables_skipped, 1);
    }

    #[test]
    fn test_drop_unavailable_keeps_relays() {
        let mut report = PageReport::default();
        let individual = ParsedRow {
            place: 1,
            quantity: 10.0,
            wind: None,
            performer: SourceId(7),
            school_link: None,
            team: None,
            members: vec![],
        };
        let relay = ParsedRow {
            performer: SourceId::NONE,
            team: Some("Team A".to_string()),
            members: vec![SourceId(7), SourceId(8)],
            ..individual.clone()
        };
        let tables = vec![
            ParsedTable {
                header: "a".to_string(),
                event_type: EventType::T100M,
                stage: None,
                rows: vec![individual],
            },
            ParsedTable {
                header: "b".to_string(),
                event_type: EventType::T4x100Relay,
                stage: None,
                rows: vec![relay],
            },
        ];
        let failed = BTreeSet::from([SourceId(7)]);
        let kept = drop_unavailable(tables, &failed, &mut report);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rows[0].members, vec![SourceId(8)]);
        assert_eq!(report.rows_dropped, 1);
    }

    #[test]
    fn test_assemble_drops_rows_of_failed_schools() {
        let mut report = PageReport::default();
        let parsed = ParsedRow {
            place: 1,
            quantity: 841.29,
            wind: None,
            performer: SourceId(7),
            school_link: Some(TEAM.to_string()),
            team: Some("Team A".to_string()),
            members: vec![],
        };
        let tables = vec![IdentifiedTable {
            header: "Men's 5000 Meters Finals".to_string(),
            event_type: EventType::T5000M,
            stage: Some(Stage::Final),
            rows: vec![IdentifiedRow {
                row: parsed,
                athlete_id: Some(AthleteId(1)),
                members: vec![],
            }],
        }];

        let schools = HashMap::from([(TEAM.to_string(), SchoolId(4))]);
        let heats = assemble_heats(tables.clone(), &schools, &mut report);
        assert_eq!(heats.len(), 1);
        assert_eq!(heats[0].results[0].school_id, Some(SchoolId(4)));
        assert_eq!(heats[0].results[0].stage, Some(Stage::Final));

        let heats = assemble_heats(tables, &HashMap::new(), &mut report);
        assert!(heats.is_empty());
        assert_eq!(report.rows_dropped, 1);
    }
}
