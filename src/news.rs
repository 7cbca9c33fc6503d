use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Summaries are cut to this many characters.
pub const SUMMARY_MAX_CHARS: usize = 200;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Elements holding a publish date, in lookup order.
const RAW_DATE_TAGS: &[&str] = &["pubDate", "dc:date", "published", "updated"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "FeedSourceConfig")]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    /// Label shown next to every item from this feed
    pub source_label: String,
}

#[derive(Deserialize)]
struct FeedSourceConfig {
    name: String,
    url: String,
    source: Option<String>,
}

impl From<FeedSourceConfig> for FeedSource {
    fn from(raw: FeedSourceConfig) -> Self {
        let source_label = raw.source.unwrap_or_else(|| raw.name.clone());
        Self {
            name: raw.name,
            url: raw.url,
            source_label,
        }
    }
}

impl FeedSource {
    pub fn new(name: &str, url: &str, source_label: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            source_label: source_label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_label: String,
    pub published_display: String,
    /// Unix seconds, 0 when the entry carries no usable date
    pub published_epoch: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unparsable feed: {0}")]
    Parse(#[from] parser::ParseFeedError),
}

/// Result of fetching one feed.
#[derive(Debug)]
pub enum FeedOutcome {
    Fetched { source: String, items: Vec<NewsItem> },
    Failed { source: String, reason: FeedError },
}

pub struct NewsAggregator {
    client: Client,
    feeds: Arc<[FeedSource]>,
    per_feed_limit: usize,
    timeout: Duration,
}

impl NewsAggregator {
    pub fn new(
        client: Client,
        feeds: Vec<FeedSource>,
        per_feed_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            feeds: feeds.into(),
            per_feed_limit,
            timeout,
        }
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    /// Fetch every feed and return at most `limit` items, newest first.
    ///
    /// Feeds that fail are logged and skipped, so this never errors.
    pub async fn fetch_news(&self, limit: usize) -> Vec<NewsItem> {
        let mut outcomes = Vec::with_capacity(self.feeds.len());
        for feed in self.feeds.iter() {
            outcomes.push(self.fetch_outcome(feed).await);
        }
        merge_outcomes(outcomes, limit)
    }

    pub async fn fetch_outcome(&self, feed: &FeedSource) -> FeedOutcome {
        match self.fetch_feed(feed).await {
            Ok(items) => FeedOutcome::Fetched {
                source: feed.name.clone(),
                items,
            },
            Err(reason) => FeedOutcome::Failed {
                source: feed.name.clone(),
                reason,
            },
        }
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> Result<Vec<NewsItem>, FeedError> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let response = self
            .client
            .get(&feed.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let items = parse_feed(&bytes, &feed.source_label, self.per_feed_limit)?;
        info!("Parsed {} items from feed '{}'", items.len(), feed.name);
        Ok(items)
    }
}

/// Log failures, concatenate successes and keep the newest `limit` items.
pub fn merge_outcomes(outcomes: Vec<FeedOutcome>, limit: usize) -> Vec<NewsItem> {
    let mut items = Vec::new();
    for outcome in outcomes {
        match outcome {
            FeedOutcome::Fetched { items: fetched, .. } => items.extend(fetched),
            FeedOutcome::Failed { source, reason } => {
                warn!("Skipping feed '{}': {}", source, reason);
            }
        }
    }
    sort_newest_first(&mut items);
    items.truncate(limit);
    items
}

pub fn sort_newest_first(items: &mut [NewsItem]) {
    items.sort_by(|a, b| b.published_epoch.cmp(&a.published_epoch));
}

/// Parse a feed body into at most `cap` items, in feed order.
pub fn parse_feed(
    bytes: &[u8],
    source_label: &str,
    cap: usize,
) -> Result<Vec<NewsItem>, FeedError> {
    let parsed = parser::parse(bytes)?;

    // feed_rs drops dates it cannot parse; keep the raw text for display.
    let raw_dates = extract_raw_dates(bytes);
    let raw_dates = if raw_dates.len() == parsed.entries.len() {
        raw_dates
    } else {
        Vec::new()
    };

    let items = parsed
        .entries
        .iter()
        .take(cap)
        .enumerate()
        .map(|(i, entry)| {
            let raw_date = raw_dates.get(i).and_then(|d| d.as_deref());
            entry_to_item(entry, source_label, raw_date)
        })
        .collect();

    Ok(items)
}

pub fn entry_to_item(entry: &Entry, source_label: &str, raw_date: Option<&str>) -> NewsItem {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_default();

    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .unwrap_or("");

    let (published_display, published_epoch) = match entry.published.or(entry.updated) {
        Some(published) => (display_time(published), published.timestamp().max(0)),
        None => (raw_date.unwrap_or("").to_string(), 0),
    };

    NewsItem {
        title,
        link,
        summary: truncate_chars(summary, SUMMARY_MAX_CHARS),
        source_label: source_label.to_string(),
        published_display,
        published_epoch,
    }
}

/// Format an instant in local time for the news list.
pub fn display_time(published: DateTime<Utc>) -> String {
    published
        .with_timezone(&Local)
        .format(DISPLAY_FORMAT)
        .to_string()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Raw date text of every `<item>` (or Atom `<entry>`) in document order.
pub fn extract_raw_dates(xml_bytes: &[u8]) -> Vec<Option<String>> {
    let xml_str = match std::str::from_utf8(xml_bytes) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut blocks = element_blocks(xml_str, "item");
    if blocks.is_empty() {
        blocks = element_blocks(xml_str, "entry");
    }

    blocks
        .into_iter()
        .map(|block| {
            RAW_DATE_TAGS
                .iter()
                .find_map(|tag| extract_xml_element(block, tag))
                .filter(|date| !date.is_empty())
        })
        .collect()
}

/// Bodies of every `<tag ...>...</tag>` element, attributes allowed.
fn element_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.chars().next() {
            Some(c) if c == '>' || c.is_whitespace() => {}
            _ => {
                rest = after;
                continue;
            }
        }
        let end = after.find(&close).unwrap_or(after.len());
        blocks.push(&after[..end]);
        rest = &after[end..];
    }
    blocks
}

pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = xml.find(&start_tag)? + start_tag.len();
    let end = xml[start..].find(&end_tag)? + start;

    Some(xml[start..end].trim().to_string())
}
