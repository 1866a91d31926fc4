// RSS feed of newly posted meets

use bactic_common::types::{NewMeet, Season};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

use super::{ParseError, Result};

// "April 28-29, 2023" and "April 30-May 1, 2023" both keep the first day
#[allow(clippy::expect_used)]
static DAY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*-\s*(?:[A-Za-z]+\.?\s+)?\d{1,2}\b").expect("day range pattern is valid")
});

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%b. %d, %Y"];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
}

/// A complete feed item: meet name, date text and meet page link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
}

impl FeedItem {
    /// Season is read off the link and title
    pub fn season(&self) -> Season {
        if self.link.contains("/xc/") {
            Season::CrossCountry
        } else if self.title.to_lowercase().contains("indoor") {
            Season::Indoor
        } else {
            Season::Outdoor
        }
    }

    pub fn to_new_meet(&self) -> Result<NewMeet> {
        Ok(NewMeet {
            name: self.title.clone(),
            date: parse_meet_date(&self.description)?,
            season: self.season(),
            source_url: self.link.clone(),
        })
    }
}

/// Parse the feed document, skipping items that lack a title, description or link
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let rss: Rss = quick_xml::de::from_str(xml)?;
    let total = rss.channel.items.len();

    let items: Vec<FeedItem> = rss
        .channel
        .items
        .into_iter()
        .filter_map(|raw| {
            let title = raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            let description = raw
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())?;
            let link = raw.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
            Some(FeedItem {
                title,
                description,
                link,
            })
        })
        .collect();

    if items.len() < total {
        debug!(skipped = total - items.len(), "Feed items missing required fields");
    }

    Ok(items)
}

/// Parse a meet date such as `"April 28, 2023"`
///
/// Multi-day ranges resolve to their first day.
pub fn parse_meet_date(text: &str) -> Result<NaiveDate> {
    let single_day = DAY_RANGE.replace(text.trim(), "");
    let single_day = single_day.split_whitespace().collect::<Vec<_>>().join(" ");

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&single_day, format).ok())
        .ok_or_else(|| ParseError::MalformedDate(text.trim().to_string()))
}
