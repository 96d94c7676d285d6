//! RSS 2.0 and Atom feeds.

use chrono::{DateTime, NaiveDate, Utc};
use jobtrail_core::CandidateJob;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::html::strip_html;
use crate::{AdapterError, Harvest};

/// One `<item>` or `<entry>`, with text as it appeared in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub author: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// Where a feed is registered, as far as naming its postings goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    pub source: Option<String>,
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// RFC 2822 (RSS), RFC 3339 (Atom), or a bare date.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn link_href(start: &BytesStart<'_>) -> Result<Option<String>, AdapterError> {
    let mut href = None;
    for attr in start.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"rel" => {
                let rel = attr.unescape_value().map_err(AdapterError::xml)?;
                if rel != "alternate" {
                    return Ok(None);
                }
            }
            b"href" => {
                href = Some(attr.unescape_value().map_err(AdapterError::xml)?.into_owned());
            }
            _ => {}
        }
    }
    Ok(href)
}

fn append_text(entry: &mut FeedEntry, field: &[u8], parent: &[u8], text: &str) {
    let target = match (field, parent) {
        (b"title", p) if is_entry(p) => &mut entry.title,
        (b"link", p) if is_entry(p) => &mut entry.link,
        (b"description" | b"summary", p) if is_entry(p) => &mut entry.summary,
        // Full content only when there is no summary.
        (b"content" | b"encoded", p) if is_entry(p) && entry.summary.is_empty() => {
            &mut entry.summary
        }
        (b"author" | b"creator", p) if is_entry(p) => &mut entry.author,
        (b"name", b"author") => &mut entry.author,
        (b"pubDate" | b"published" | b"date", p) if is_entry(p) => {
            entry.published = entry.published.or_else(|| parse_timestamp(text));
            return;
        }
        (b"updated", p) if is_entry(p) => {
            entry.updated = entry.updated.or_else(|| parse_timestamp(text));
            return;
        }
        _ => return,
    };
    target.push_str(text);
}

/// Parses an RSS or Atom document. Unknown elements are ignored.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, AdapterError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            AdapterError::Parse(format!(
                "xml error at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                if path.is_empty() {
                    saw_root = matches!(name.as_slice(), b"rss" | b"feed" | b"RDF");
                }
                if is_entry(&name) {
                    current = Some(FeedEntry::default());
                } else if name == b"link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), link_href(&start)?) {
                        entry.link = href;
                    }
                }
                path.push(name);
            }
            Event::Empty(start) => {
                if start.local_name().as_ref() == b"link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), link_href(&start)?) {
                        if entry.link.is_empty() {
                            entry.link = href;
                        }
                    }
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(AdapterError::xml)?;
                route_text(&mut feed, current.as_mut(), &path, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                route_text(&mut feed, current.as_mut(), &path, &text);
            }
            Event::End(_) => {
                if let Some(name) = path.pop() {
                    if is_entry(&name) {
                        if let Some(entry) = current.take() {
                            feed.entries.push(entry);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(AdapterError::Parse("not an RSS or Atom document".into()));
    }
    Ok(feed)
}

fn route_text(feed: &mut ParsedFeed, entry: Option<&mut FeedEntry>, path: &[Vec<u8>], text: &str) {
    let [.., parent, field] = path else {
        return;
    };
    match entry {
        Some(entry) => append_text(entry, field, parent, text),
        None if field == b"title" && (parent == b"channel" || parent == b"feed") => {
            feed.title.push_str(text)
        }
        None => {}
    }
}

/// Turns parsed entries into candidates.
///
/// Entries without a link are dropped. Entries without a date are treated as
/// published at `fetched_at`. With `since` set, entries at or before it are
/// dropped. `Harvest::newest` is the latest date among the kept entries.
pub fn harvest_feed(
    parsed: &ParsedFeed,
    spec: &FeedSpec,
    since: Option<DateTime<Utc>>,
    fetched_at: DateTime<Utc>,
) -> Harvest {
    let feed_name = [parsed.title.trim(), spec.name.trim(), spec.url.trim()]
        .into_iter()
        .find(|name| !name.is_empty())
        .unwrap_or_default()
        .to_string();

    let mut dated: Vec<(DateTime<Utc>, &FeedEntry)> = Vec::new();
    let mut harvest = Harvest::default();
    for entry in &parsed.entries {
        if entry.link.trim().is_empty() {
            harvest.skipped += 1;
            continue;
        }
        let when = entry.published.or(entry.updated).unwrap_or(fetched_at);
        if since.is_some_and(|cutoff| when <= cutoff) {
            harvest.stale += 1;
            continue;
        }
        dated.push((when, entry));
    }

    // Newest first; a repeated (title, link) pair keeps its newest copy.
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    let mut seen = std::collections::HashSet::new();
    for (when, entry) in dated {
        let title = entry.title.trim();
        let link = entry.link.trim();
        if !seen.insert((title.to_string(), link.to_string())) {
            harvest.skipped += 1;
            continue;
        }
        let source = [entry.author.trim(), spec.source.as_deref().unwrap_or("").trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(feed_name.as_str())
            .to_string();

        harvest.newest = harvest.newest.max(Some(when));
        harvest.candidates.push(
            CandidateJob::new(title, link)
                .with_description(strip_html(&entry.summary))
                .with_posted_date(Some(when.date_naive()))
                .with_source(source)
                .with_feed(feed_name.clone()),
        );
    }
    harvest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/feeds")
            .join(name);
        std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    fn spec() -> FeedSpec {
        FeedSpec {
            name: "Writers".into(),
            url: "https://feeds.example/writers.xml".into(),
            source: None,
        }
    }

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_rss_items() {
        let feed = parse_feed(&fixture("sample_rss.xml")).unwrap();
        assert_eq!(feed.title, "Technical Writer Jobs");
        assert_eq!(feed.entries.len(), 4);

        let first = &feed.entries[0];
        assert_eq!(first.title, "Acme hiring Senior Technical Writer in Seattle, WA");
        assert_eq!(first.link, "https://jobs.example/acme/senior-technical-writer");
        assert_eq!(first.author, "builtin.com");
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap())
        );
        assert!(first.summary.contains("<p>"));
    }

    #[test]
    fn parses_atom_entries() {
        let feed = parse_feed(&fixture("sample_atom.xml")).unwrap();
        assert_eq!(feed.title, "Docs Roles");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].link, "https://jobs.example/globex/docs-engineer");
        assert_eq!(feed.entries[0].author, "Globex Careers");
        assert!(feed.entries[1].published.is_none());
        assert!(feed.entries[1].updated.is_some());
    }

    #[test]
    fn harvest_names_postings_and_skips_linkless_items() {
        let feed = parse_feed(&fixture("sample_rss.xml")).unwrap();
        let harvest = harvest_feed(&feed, &spec(), None, fetched_at());

        assert_eq!(harvest.skipped, 1);
        assert_eq!(harvest.candidates.len(), 3);
        let acme = harvest
            .candidates
            .iter()
            .find(|c| c.url.contains("acme"))
            .unwrap();
        assert_eq!(acme.source, "builtin.com");
        assert_eq!(acme.feed, "Technical Writer Jobs");
        assert_eq!(acme.posted_date, NaiveDate::from_ymd_opt(2026, 3, 3));
        assert!(!acme.description.contains('<'));

        let undated = harvest
            .candidates
            .iter()
            .find(|c| c.url.contains("initech"))
            .unwrap();
        assert_eq!(undated.source, "Technical Writer Jobs");
        assert_eq!(undated.posted_date, Some(fetched_at().date_naive()));
        assert_eq!(harvest.newest, Some(fetched_at()));
    }

    #[test]
    fn since_cutoff_drops_entries_at_or_before_it() {
        let feed = parse_feed(&fixture("sample_rss.xml")).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap();
        let harvest = harvest_feed(&feed, &spec(), Some(cutoff), fetched_at());

        assert!(harvest.candidates.iter().all(|c| !c.url.contains("acme")));
        assert!(harvest.stale >= 1);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_feed(b"not a feed").is_err());
        assert!(parse_feed(b"<rss><channel><item></channel>").is_err());
    }

    #[test]
    fn timestamps_accept_common_feed_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 3, 16, 0, 0).unwrap();
        assert_eq!(parse_timestamp("Tue, 03 Mar 2026 16:00:00 +0000"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-03T08:00:00-08:00"), Some(expected));
        assert!(parse_timestamp("2026-03-03").is_some());
        assert_eq!(parse_timestamp("soon"), None);
    }
}
