//! # arXiv Search Tool
//!
//! Queries the arXiv Atom API for papers matching a sub-question.
//!
//! - Requests are spaced by a minimum interval; the interval doubles after
//!   each failure (up to 32x) and resets after a success.
//! - Results are cached per `(query, limit)` in a bounded moka cache.
//! - Only retryable failures (timeouts, 429, 5xx) widen the interval.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SearchError;

/// Default timeout for arXiv API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Number of distinct queries kept in the result cache
const CACHE_CAPACITY: u64 = 100;

/// Upper bound for the backoff multiplier
const MAX_BACKOFF_MULTIPLIER: f64 = 32.0;

// =============================================================================
// PAPER METADATA
// =============================================================================
/// Metadata for a single paper returned by the search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,

    #[serde(rename = "abstract")]
    pub abstract_text: String,

    pub authors: Vec<String>,

    pub pdf_url: String,

    /// Publication timestamp as reported by arXiv (ISO 8601)
    pub published: Option<String>,

    /// Short identifier, e.g. `2301.00001v1`
    pub arxiv_id: String,

    pub categories: Vec<String>,

    pub primary_category: Option<String>,
}

/// Paper search collaborator: query in, ranked metadata out.
#[async_trait]
pub trait PaperSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SearchError>;
}

// =============================================================================
// RATE LIMITING
// =============================================================================
struct Throttle {
    last_request: Option<Instant>,
    min_interval: Duration,
    backoff_multiplier: f64,
}

impl Throttle {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: None,
            min_interval,
            backoff_multiplier: 1.0,
        }
    }

    fn current_interval(&self) -> Duration {
        self.min_interval.mul_f64(self.backoff_multiplier)
    }

    /// Sleep until the next request is allowed, then claim the slot.
    async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let wait = self.current_interval();
            let elapsed = last.elapsed();
            if elapsed < wait {
                let sleep_for = wait - elapsed;
                debug!(sleep_ms = sleep_for.as_millis() as u64, "Rate limiting arXiv request");
                tokio::time::sleep(sleep_for).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    fn record_success(&mut self) {
        self.backoff_multiplier = 1.0;
    }

    fn record_error(&mut self, error: &SearchError) {
        if error.is_retryable() {
            self.backoff_multiplier = (self.backoff_multiplier * 2.0).min(MAX_BACKOFF_MULTIPLIER);
        }
    }
}

// =============================================================================
// ARXIV SEARCHER
// =============================================================================
/// arXiv API client with rate limiting and caching.
pub struct ArxivSearcher {
    client: reqwest::Client,
    base_url: String,
    /// Upper bound on results requested per search
    max_results: usize,
    throttle: Mutex<Throttle>,
    cache: Cache<(String, usize), Vec<Paper>>,
}

impl ArxivSearcher {
    /// Create a searcher against the given API endpoint.
    pub fn new(base_url: impl Into<String>, max_results: usize) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(concat!("scholarflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            max_results,
            throttle: Mutex::new(Throttle::new(Duration::from_secs(3))),
            cache: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
        })
    }

    /// Set the minimum spacing between requests
    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.throttle = Mutex::new(Throttle::new(interval));
        self
    }

    /// Fetch a single paper by its arXiv id.
    pub async fn search_by_id(&self, arxiv_id: &str) -> Result<Option<Paper>, SearchError> {
        let url = format!("{}?id_list={}", self.base_url, urlencoding::encode(arxiv_id));
        let papers = self.fetch(&url).await?;

        Ok(papers.into_iter().next().map(|mut paper| {
            paper.arxiv_id = arxiv_id.to_string();
            paper
        }))
    }

    /// Throttled GET + parse, updating the backoff state.
    async fn fetch(&self, url: &str) -> Result<Vec<Paper>, SearchError> {
        let mut throttle = self.throttle.lock().await;
        throttle.wait().await;

        match self.fetch_once(url).await {
            Ok(papers) => {
                throttle.record_success();
                Ok(papers)
            }
            Err(e) => {
                throttle.record_error(&e);
                warn!(error = %e, retryable = e.is_retryable(), "arXiv request failed");
                Err(e)
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<Paper>, SearchError> {
        debug!(url = %url, "Fetching arXiv feed");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => SearchError::RateLimited,
                code @ 500..=599 => SearchError::ServerError(code, body),
                code => SearchError::HttpError(code, body),
            });
        }

        let body = response.text().await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl PaperSearch for ArxivSearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, SearchError> {
        let limit = limit.min(self.max_results);
        let key = (query.to_string(), limit);
        if let Some(papers) = self.cache.get(&key).await {
            debug!(query = %query, "arXiv cache hit");
            return Ok(papers);
        }

        info!(query = %query, limit, "Searching arXiv");

        let url = format!(
            "{}?search_query=all:{}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.base_url,
            urlencoding::encode(query),
            limit
        );
        let papers = self.fetch(&url).await?;

        info!(query = %query, count = papers.len(), "arXiv search completed");
        self.cache.insert(key, papers.clone()).await;
        Ok(papers)
    }
}

// =============================================================================
// ATOM PARSING
// =============================================================================
/// Parse an arXiv Atom feed into paper records.
fn parse_feed(xml: &str) -> Result<Vec<Paper>, SearchError> {
    if !xml.contains("<feed") {
        return Err(SearchError::ParseError("missing <feed> element".to_string()));
    }

    let papers = xml
        .split("<entry")
        .skip(1)
        .filter_map(|segment| {
            // `<entry>` or `<entry xmlns=...>`, not `<entry_x>`
            let open_end = segment.find('>')?;
            if !segment.starts_with(|c: char| c == '>' || c.is_whitespace()) {
                return None;
            }
            let body = &segment[open_end + 1..];
            body.find("</entry>").map(|end| &body[..end])
        })
        .filter_map(parse_entry)
        .collect();

    Ok(papers)
}

fn parse_entry(entry: &str) -> Option<Paper> {
    let entry_id = element_text(entry, "id")?;

    // arXiv reports query errors as a pseudo-entry
    if entry_id.contains("/api/errors") {
        warn!(id = %entry_id, "arXiv returned an error entry");
        return None;
    }

    let arxiv_id = entry_id.rsplit('/').next()?.to_string();
    let title = normalize_whitespace(&element_text(entry, "title")?);

    let authors = entry
        .split("<author>")
        .skip(1)
        .filter_map(|segment| element_text(segment, "name"))
        .map(|name| normalize_whitespace(&name))
        .collect();

    let pdf_url = entry
        .split("<link")
        .skip(1)
        .filter_map(|segment| segment.find('>').map(|end| &segment[..end]))
        .find(|tag| attribute(tag, "title").as_deref() == Some("pdf"))
        .and_then(|tag| attribute(tag, "href"))
        .unwrap_or_else(|| entry_id.replacen("/abs/", "/pdf/", 1));

    let categories = entry
        .split("<category")
        .skip(1)
        .filter_map(|segment| segment.find('>').map(|end| &segment[..end]))
        .filter_map(|tag| attribute(tag, "term"))
        .collect();

    let primary_category = entry
        .split("<arxiv:primary_category")
        .nth(1)
        .and_then(|segment| segment.find('>').map(|end| &segment[..end]))
        .and_then(|tag| attribute(tag, "term"));

    Some(Paper {
        title,
        abstract_text: element_text(entry, "summary")
            .map(|s| normalize_whitespace(&s))
            .unwrap_or_default(),
        authors,
        pdf_url,
        published: element_text(entry, "published"),
        arxiv_id,
        categories,
        primary_category,
    })
}

/// Text content of the first `<tag>` or `<tag attr="...">` element.
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut search_from = 0;
    while let Some(pos) = xml[search_from..].find(&open) {
        let start = search_from + pos;
        let after_name = start + open.len();
        let next = xml[after_name..].chars().next()?;

        if next == '>' || next.is_whitespace() {
            let content_start = after_name + xml[after_name..].find('>')? + 1;
            let content_end = content_start + xml[content_start..].find(&close)?;
            return Some(decode_entities(xml[content_start..content_end].trim()));
        }
        search_from = after_name;
    }
    None
}

/// Value of `name="..."` inside a tag's attribute list.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=\"", name);
    let mut search_from = 0;
    while let Some(pos) = tag[search_from..].find(&needle) {
        let start = search_from + pos;
        // Reject suffix matches such as `xml:term=`
        let boundary_ok = start == 0
            || tag[..start]
                .chars()
                .last()
                .is_some_and(|c| c.is_whitespace());
        let value_start = start + needle.len();
        if boundary_ok {
            let value_end = value_start + tag[value_start..].find('"')?;
            return Some(decode_entities(&tag[value_start..value_end]));
        }
        search_from = value_start;
    }
    None
}

/// Decode the predefined XML entities and numeric character references.
/// Unknown or malformed references are kept as written.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_reference(&tail[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    pub(super) const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:quantum</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2301.00001v2</id>
    <published>2023-01-01T00:00:00Z</published>
    <title>Surface Codes and
      Quantum Error Correction</title>
    <summary>  We study surface codes &amp; their thresholds.
    </summary>
    <author>
      <name>Alice Smith</name>
    </author>
    <author>
      <name>Bob Jones</name>
    </author>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="quant-ph" scheme="http://arxiv.org/schemas/atom"/>
    <link href="http://arxiv.org/abs/2301.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2301.00001v2" rel="related" type="application/pdf"/>
    <category term="quant-ph" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.IT" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2302.00002v1</id>
    <published>2023-02-01T00:00:00Z</published>
    <title>Decoders for QEC</title>
    <summary>Fast decoders.</summary>
    <author><name>Carol White</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.arxiv_id, "2301.00001v2");
        assert_eq!(first.title, "Surface Codes and Quantum Error Correction");
        assert_eq!(first.abstract_text, "We study surface codes & their thresholds.");
        assert_eq!(first.authors, vec!["Alice Smith", "Bob Jones"]);
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2301.00001v2");
        assert_eq!(first.published.as_deref(), Some("2023-01-01T00:00:00Z"));
        assert_eq!(first.categories, vec!["quant-ph", "cs.IT"]);
        assert_eq!(first.primary_category.as_deref(), Some("quant-ph"));
    }

    #[test]
    fn test_parse_feed_derives_pdf_url_without_link() {
        let papers = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(papers[1].pdf_url, "http://arxiv.org/pdf/2302.00002v1");
        assert!(papers[1].categories.is_empty());
        assert!(papers[1].primary_category.is_none());
    }

    #[test]
    fn test_parse_feed_skips_error_entries() {
        let xml = r#"<feed><entry><id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title></entry></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed_rejects_non_feed() {
        assert!(matches!(
            parse_feed("<html>nope</html>"),
            Err(SearchError::ParseError(_))
        ));
    }

    #[test]
    fn test_element_text_ignores_longer_tag_names() {
        let xml = "<identifier>x</identifier><id>real</id>";
        assert_eq!(element_text(xml, "id").as_deref(), Some("real"));
    }

    #[test]
    fn test_parse_entry_with_attributes() {
        let xml = r#"<feed><entry xml:lang="en">
            <id>http://arxiv.org/abs/2303.00003v1</id>
            <title>Codes</title></entry><entry_meta>x</entry_meta></feed>"#;
        let papers = parse_feed(xml).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].arxiv_id, "2303.00003v1");
    }

    #[test]
    fn test_decode_numeric_references() {
        assert_eq!(decode_entities("Schr&#246;dinger &#x3C8; &amp;lt;"), "Schrödinger ψ &lt;");
        assert_eq!(decode_entities("it&#39;s &quot;ok&quot;"), "it's \"ok\"");
        assert_eq!(decode_entities("AT&T &#xZZ; & more"), "AT&T &#xZZ; & more");
    }

    #[test]
    fn test_title_with_numeric_references() {
        let xml = r#"<feed><entry><id>http://arxiv.org/abs/1</id>
            <title>Na&#239;ve Bayes &#x2013; revisited</title></entry></feed>"#;
        assert_eq!(parse_feed(xml).unwrap()[0].title, "Naïve Bayes – revisited");
    }

    #[test]
    fn test_throttle_backoff_is_capped() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        for _ in 0..10 {
            throttle.record_error(&SearchError::RateLimited);
        }
        assert_eq!(throttle.current_interval(), Duration::from_secs(32));

        throttle.record_success();
        assert_eq!(throttle.current_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_throttle_ignores_permanent_errors() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        throttle.record_error(&SearchError::HttpError(400, "bad query".to_string()));
        throttle.record_error(&SearchError::ParseError("bad xml".to_string()));
        assert_eq!(throttle.current_interval(), Duration::from_secs(1));

        throttle.record_error(&SearchError::ServerError(503, "busy".to_string()));
        assert_eq!(throttle.current_interval(), Duration::from_secs(2));
    }
}
