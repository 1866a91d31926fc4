// HTML extraction for meet, athlete and team pages

use bactic_common::types::{Division, NewSchool, SourceId};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::warn;
use url::Url;

use super::rows::{parse_source_id, Cell};
use super::{PageKind, ParseError, Result};

macro_rules! selector {
    ($name:ident, $css:literal) => {
        #[allow(clippy::expect_used)]
        static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect(concat!("valid selector ", $css)));
    };
}

selector!(RESULT_BLOCK, "div.row");
selector!(TABLE, "table");
selector!(BODY_ROWS, "tbody > tr");
selector!(CELLS, "td");
selector!(ANCHORS, "a[href]");
selector!(TRACK_TITLE, "div.custom-table-title > h3");
selector!(XC_TITLE, "div.custom-table-title-xc > h3");
selector!(COMPANION_LINKS, "div.panel-second-title span.panel-heading-normal-text a[href]");
selector!(ATHLETE_NAME, "h3.panel-title.large-title");
selector!(TEAM_NAME, "h3#team-name");
selector!(TEAM_AFFILIATIONS, "span.panel-heading-normal-text");

#[allow(clippy::expect_used)]
static CLASS_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(?(?:fr|so|jr|sr|gr|rs)(?:-\d+)?\)?$").expect("class year pattern is valid")
});

#[allow(clippy::expect_used)]
static DIVISION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(DIII|DII|DI|NAIA)\b").expect("division pattern is valid"));

/// One results table: its header and data rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub header: String,
    pub rows: Vec<Vec<Cell>>,
}

/// Identity facts read from an athlete's own profile page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthleteProfile {
    pub canonical_id: SourceId,
    pub name: String,
}

// ============================================================================
// Meet pages
// ============================================================================

/// Extract every results table on a meet page
///
/// Links are resolved against `page_url` so relative hrefs become absolute.
/// Tables without a body row are kept so the caller can skip them.
pub fn extract_result_tables(html: &str, page_url: &Url) -> Vec<RawTable> {
    let document = Html::parse_document(html);
    let kind = PageKind::from_url(page_url.as_str());

    document
        .select(&RESULT_BLOCK)
        .filter(|block| is_innermost_block(block))
        .filter(|block| block.select(&TABLE).next().is_some())
        .map(|block| RawTable {
            header: table_header(&block, kind),
            rows: block
                .select(&BODY_ROWS)
                .map(|row| row.select(&CELLS).map(|cell| read_cell(&cell, page_url)).collect())
                .collect(),
        })
        .collect()
}

/// Links to the other result pages of the same meet (e.g. the other season half)
pub fn extract_companion_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links: Vec<String> = document
        .select(&COMPANION_LINKS)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| page_url.join(href.trim()).ok())
        .map(String::from)
        .filter(|link| link != page_url.as_str())
        .collect();
    links.dedup();
    links
}

fn is_innermost_block(block: &ElementRef<'_>) -> bool {
    !block
        .select(&RESULT_BLOCK)
        .any(|nested| nested.id() != block.id())
}

fn table_header(block: &ElementRef<'_>, kind: PageKind) -> String {
    match kind {
        PageKind::Track => block
            .select(&TRACK_TITLE)
            .next()
            .map(|title| collapse_whitespace(&element_text(&title)))
            .unwrap_or_default(),
        PageKind::CrossCountry => block
            .select(&XC_TITLE)
            .next()
            .and_then(|title| {
                element_text(&title)
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(collapse_whitespace)
            })
            .unwrap_or_default(),
    }
}

fn read_cell(cell: &ElementRef<'_>, page_url: &Url) -> Cell {
    let links: Vec<String> = cell
        .select(&ANCHORS)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(|href| {
            page_url
                .join(href.trim())
                .map(String::from)
                .unwrap_or_else(|_| href.trim().to_string())
        })
        .collect();

    Cell {
        text: collapse_whitespace(&element_text(cell)),
        link: (!links.is_empty()).then(|| links.join(", ")),
    }
}

// ============================================================================
// Athlete and team pages
// ============================================================================

/// Read the canonical id and display name from an athlete profile
///
/// `final_url` is the URL after redirects; its id is the canonical id.
pub fn parse_athlete_page(final_url: &str, html: &str) -> Result<AthleteProfile> {
    let canonical_id = parse_source_id(final_url);
    if canonical_id.is_none() {
        return Err(ParseError::NotAProfile(final_url.to_string()));
    }

    let document = Html::parse_document(html);
    let heading = document
        .select(&ATHLETE_NAME)
        .next()
        .map(|title| element_text(&title))
        .ok_or(ParseError::MissingElement("athlete name"))?;

    let mut tokens: Vec<&str> = heading.split_whitespace().collect();
    if tokens.len() > 1 && tokens.last().is_some_and(|last| CLASS_YEAR.is_match(last)) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err(ParseError::MissingElement("athlete name"));
    }

    Ok(AthleteProfile {
        canonical_id,
        name: title_case(&tokens.join(" ")),
    })
}

/// Read a team page into a school record keyed by `url`
///
/// Each affiliation span is either a division or a league. A page naming
/// two different divisions is rejected.
pub fn parse_school_page(url: &str, html: &str) -> Result<NewSchool> {
    let document = Html::parse_document(html);

    let name = document
        .select(&TEAM_NAME)
        .next()
        .map(|title| collapse_whitespace(&element_text(&title)))
        .filter(|name| !name.is_empty())
        .ok_or(ParseError::MissingElement("team name"))?;

    let affiliations: Vec<String> = document
        .select(&TEAM_AFFILIATIONS)
        .next()
        .map(|container| {
            let children: Vec<String> = container
                .children()
                .filter_map(ElementRef::wrap)
                .map(|child| collapse_whitespace(&element_text(&child)))
                .filter(|text| !text.is_empty())
                .collect();
            if children.is_empty() {
                vec![collapse_whitespace(&element_text(&container))]
            } else {
                children
            }
        })
        .unwrap_or_default();

    let mut division: Option<Division> = None;
    let mut leagues = Vec::new();
    for text in affiliations.into_iter().filter(|text| !text.is_empty()) {
        match parse_division(&text) {
            Some(found) => match division {
                Some(first) if first != found => {
                    return Err(ParseError::ConflictingDivisions {
                        first,
                        second: found,
                    });
                },
                _ => division = Some(found),
            },
            None => leagues.push(text),
        }
    }

    if division.is_none() {
        warn!(url, school = %name, "School page lists no division");
    }

    Ok(NewSchool {
        name,
        division: division.unwrap_or_default(),
        url: url.to_string(),
        leagues,
    })
}

/// First division token in `text`, checked from most to least specific
pub fn parse_division(text: &str) -> Option<Division> {
    let tokens: Vec<&str> = DIVISION_TOKEN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        .collect();

    [
        ("DIII", Division::DIII),
        ("DII", Division::DII),
        ("DI", Division::DI),
        ("NAIA", Division::Naia),
    ]
    .into_iter()
    .find(|(token, _)| tokens.contains(token))
    .map(|(_, division)| division)
}

// ============================================================================
// Text helpers
// ============================================================================

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Profile headings are upper case; rebuild the display form
///
/// Apostrophes and hyphens start a new word and a leading "Mc" capitalizes
/// the following letter. Other inner capitals ("MacLeod", "DeShawn") are
/// not recoverable and come out lower case.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() || matches!(ch, '-' | '\'' | '\u{2019}') {
            out.push_str(&word);
            out.push(ch);
            word.clear();
        } else if word.is_empty() || word == "Mc" {
            word.extend(ch.to_uppercase());
        } else {
            word.extend(ch.to_lowercase());
        }
    }
    out.push_str(&word);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MEET_URL: &str = "https://www.tfrrs.org/results/78901/Spring_Invitational";

    const MEET_PAGE: &str = r#"
        <html><body>
        <div class="panel-second-title">
          <span class="panel-heading-normal-text">
            <a href="/results/78902/Spring_Invitational">Men's results</a>
          </span>
        </div>
        <div class="row">
          <div class="row">
            <div class="custom-table-title"><h3>Men's 5000 Meters</h3></div>
            <table>
              <thead><tr><th>PL</th><th>NAME</th></tr></thead>
              <tbody>
                <tr>
                  <td>1</td>
                  <td><a href="https://www.tfrrs.org/athletes/6543210/Pomona/Jane_Runner.html">Runner, Jane</a></td>
                  <td>SR-4</td>
                  <td><a href="/teams/tf/CA_college_m_Pomona_Pitzer.html">Pomona-Pitzer</a></td>
                  <td>14:01.29</td>
                </tr>
              </tbody>
            </table>
          </div>
          <div class="row">
            <div class="custom-table-title"><h3>Men's Javelin</h3></div>
            <table><tbody></tbody></table>
          </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_innermost_tables() {
        let url = Url::parse(MEET_URL).unwrap();
        let tables = extract_result_tables(MEET_PAGE, &url);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].header, "Men's 5000 Meters");
        assert_eq!(tables[0].rows.len(), 1);
        let row = &tables[0].rows[0];
        assert_eq!(row.len(), 5);
        assert_eq!(row[4].text, "14:01.29");
        assert_eq!(
            row[3].link.as_deref(),
            Some("https://www.tfrrs.org/teams/tf/CA_college_m_Pomona_Pitzer.html")
        );
        assert!(tables[1].rows.is_empty());
    }

    #[test]
    fn test_cross_country_header_uses_first_line() {
        let html = r#"
            <div class="row">
              <div class="custom-table-title-xc"><h3>Men's 8k Run CC
                 Individual Results</h3></div>
              <table><tbody><tr><td>1</td></tr></tbody></table>
            </div>
        "#;
        let url = Url::parse("https://www.tfrrs.org/results/xc/12345/Regionals").unwrap();
        let tables = extract_result_tables(html, &url);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].header, "Men's 8k Run CC");
    }

    #[test]
    fn test_multiple_anchors_are_joined() {
        let html = r#"
            <div class="row"><table><tbody><tr>
              <td><a href="/athletes/1.html">A</a> <a href="/athletes/2.html">B</a></td>
            </tr></tbody></table></div>
        "#;
        let url = Url::parse(MEET_URL).unwrap();
        let tables = extract_result_tables(html, &url);
        assert_eq!(
            tables[0].rows[0][0].link.as_deref(),
            Some("https://www.tfrrs.org/athletes/1.html, https://www.tfrrs.org/athletes/2.html")
        );
    }

    #[test]
    fn test_companion_links() {
        let url = Url::parse(MEET_URL).unwrap();
        assert_eq!(
            extract_companion_links(MEET_PAGE, &url),
            vec!["https://www.tfrrs.org/results/78902/Spring_Invitational".to_string()]
        );
    }

    #[test]
    fn test_parse_athlete_page() {
        let html = r#"<h3 class="panel-title large-title">JANE   RUNNER-SMITH SR-4</h3>"#;
        let profile =
            parse_athlete_page("https://www.tfrrs.org/athletes/7000001/Pomona/Jane.html", html)
                .unwrap();
        assert_eq!(profile.canonical_id, SourceId(7_000_001));
        assert_eq!(profile.name, "Jane Runner-Smith");
    }

    #[test]
    fn test_title_case_names() {
        assert_eq!(title_case("JANE RUNNER"), "Jane Runner");
        assert_eq!(title_case("O'BRIEN"), "O'Brien");
        assert_eq!(title_case("MARY-KATE D\u{2019}ANGELO"), "Mary-Kate D\u{2019}Angelo");
        assert_eq!(title_case("SEAN MCDONALD"), "Sean McDonald");
        assert_eq!(title_case("MC"), "Mc");
    }

    #[test]
    fn test_parse_athlete_page_requires_profile_url() {
        let html = r#"<h3 class="panel-title large-title">JANE RUNNER</h3>"#;
        assert!(matches!(
            parse_athlete_page("https://www.tfrrs.org/teams/x.html", html),
            Err(ParseError::NotAProfile(_))
        ));
        assert!(matches!(
            parse_athlete_page("https://www.tfrrs.org/athletes/5.html", "<p></p>"),
            Err(ParseError::MissingElement(_))
        ));
    }

    #[test]
    fn test_parse_school_page() {
        let html = r#"
            <h3 id="team-name">Pomona-Pitzer</h3>
            <span class="panel-heading-normal-text">
              <span>NCAA DIII</span><span>SCIAC</span><span>West Region</span>
            </span>
        "#;
        let school = parse_school_page("https://www.tfrrs.org/teams/p.html", html).unwrap();
        assert_eq!(school.name, "Pomona-Pitzer");
        assert_eq!(school.division, Division::DIII);
        assert_eq!(school.leagues, vec!["SCIAC".to_string(), "West Region".to_string()]);
    }

    #[test]
    fn test_conflicting_divisions_are_rejected() {
        let html = r#"
            <h3 id="team-name">Somewhere</h3>
            <span class="panel-heading-normal-text"><span>NCAA DI</span><span>NAIA</span></span>
        "#;
        assert!(matches!(
            parse_school_page("https://www.tfrrs.org/teams/s.html", html),
            Err(ParseError::ConflictingDivisions { .. })
        ));
    }

    #[test]
    fn test_parse_division_prefers_specific_tokens() {
        assert_eq!(parse_division("NCAA DIII"), Some(Division::DIII));
        assert_eq!(parse_division("NCAA DII"), Some(Division::DII));
        assert_eq!(parse_division("NCAA DI"), Some(Division::DI));
        assert_eq!(parse_division("NAIA"), Some(Division::Naia));
        assert_eq!(parse_division("Division Championships"), None);
        assert_eq!(parse_division("SCIAC"), None);
    }

    #[test]
    fn test_missing_division_defaults_to_unknown() {
        let html = r#"<h3 id="team-name">Club</h3>"#;
        let school = parse_school_page("https://www.tfrrs.org/teams/c.html", html).unwrap();
        assert_eq!(school.division, Division::Unknown);
        assert!(school.leagues.is_empty());
    }
}
