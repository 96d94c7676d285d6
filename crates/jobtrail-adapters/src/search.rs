//! Web-search result lists and hand-written import files.
//!
//! Both are a JSON array of posting objects, possibly wrapped in a markdown
//! code fence or surrounded by prose.

use chrono::NaiveDate;
use jobtrail_core::CandidateJob;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::html::strip_html;
use crate::{AdapterError, Harvest};

pub const WEB_SEARCH: &str = "Web Search";

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    feed: Option<String>,
}

/// Drops a surrounding ```` ```json ```` fence and anything outside the
/// outermost `[...]`.
pub fn extract_json_array(raw: &str) -> Option<&str> {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.trim_end().strip_suffix("```").unwrap_or(text);
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (start < end).then(|| &text[start..=end])
}

fn parse_posted_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| crate::feed::parse_timestamp(text).map(|ts| ts.date_naive()))
}

/// Maps each object of the array to a candidate. Missing `source` and `feed`
/// default to [`WEB_SEARCH`]; unreadable dates become `None`. Elements that
/// are not objects are counted as skipped.
pub fn parse_search_results(raw: &str) -> Result<Harvest, AdapterError> {
    let Some(array) = extract_json_array(raw) else {
        // An empty response is a valid "nothing found".
        if raw.trim().is_empty() {
            return Ok(Harvest::default());
        }
        return Err(AdapterError::Parse("no JSON array in search results".into()));
    };
    let values: Vec<JsonValue> = serde_json::from_str(array)
        .map_err(|e| AdapterError::Parse(format!("search results: {e}")))?;

    let mut harvest = Harvest::default();
    for value in values {
        let result: SearchResult = match serde_json::from_value(value) {
            Ok(result) => result,
            Err(err) => {
                debug!(error = %err, "skipping malformed search result");
                harvest.skipped += 1;
                continue;
            }
        };
        let description = result
            .description
            .as_deref()
            .map(strip_html)
            .unwrap_or_default();
        harvest.candidates.push(
            CandidateJob::new(result.title.trim(), result.url.trim())
                .with_description(description)
                .with_posted_date(result.posted_date.as_deref().and_then(parse_posted_date))
                .with_source(result.source.unwrap_or_else(|| WEB_SEARCH.to_string()))
                .with_feed(result.feed.unwrap_or_else(|| WEB_SEARCH.to_string())),
        );
    }
    Ok(harvest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_prose() {
        assert_eq!(extract_json_array("```json\n[1, 2]\n```"), Some("[1, 2]"));
        assert_eq!(
            extract_json_array("Here you go: [{\"a\": [1]}] hope it helps"),
            Some("[{\"a\": [1]}]")
        );
        assert_eq!(extract_json_array("no results"), None);
    }

    #[test]
    fn maps_results_with_defaults() {
        let raw = r#"```json
[
  {"title": "Globex hiring Technical Writer in Remote", "url": "https://builtin.com/job/1",
   "description": "<p>Write docs</p>", "posted_date": "2026-03-02", "source": "builtin.com"},
  {"title": "Initech hiring Editor", "url": "https://wellfound.com/jobs/2", "posted_date": "last week"},
  "stray"
]
```"#;
        let harvest = parse_search_results(raw).unwrap();
        assert_eq!(harvest.candidates.len(), 2);
        assert_eq!(harvest.skipped, 1);

        let first = &harvest.candidates[0];
        assert_eq!(first.description, "Write docs");
        assert_eq!(first.posted_date, NaiveDate::from_ymd_opt(2026, 3, 2));
        assert_eq!(first.source, "builtin.com");
        assert_eq!(first.feed, WEB_SEARCH);

        let second = &harvest.candidates[1];
        assert_eq!(second.posted_date, None);
        assert_eq!(second.source, WEB_SEARCH);
    }

    #[test]
    fn empty_and_invalid_responses() {
        assert!(parse_search_results("").unwrap().candidates.is_empty());
        assert!(parse_search_results("[]").unwrap().candidates.is_empty());
        assert!(parse_search_results("sorry, I could not search").is_err());
        assert!(parse_search_results("[{\"title\": }]").is_err());
    }
}
