//! Metadata parser: one content unit in, one [`ParsedPost`] out.
//!
//! A unit is every file in a user directory whose name starts with the same
//! numeric post id. Media files carry an optional `_<index>` suffix that fixes
//! their authored order; `.json` and `.txt` files are sidecars.

use crate::error::ParseError;
use crate::source::ArchiveEntry;
use archivist_db::{Engagement, NewPost, TimestampSource, UserProfile};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// `<digits>[_<digits>].<ext>[.<ext>...]`
static UNIT_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:_(\d+))?\.([^/\\]+)$").expect("unit file pattern is valid")
});

const SIDECAR_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v"];

const TEXT_FIELDS: &[&str] = &["full_text", "content", "text"];
const TIMESTAMP_FIELDS: &[&str] = &["date", "ts", "timestamp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Media,
    JsonSidecar,
    TextSidecar,
}

/// A file that belongs to a content unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub name: String,
    /// `_<index>` suffix; `None` sorts as 0
    pub index: Option<u64>,
    pub kind: FileKind,
    pub modified: Option<DateTime<Utc>>,
}

impl UnitFile {
    fn sort_key(&self) -> (u64, &str) {
        (self.index.unwrap_or(0), self.name.as_str())
    }
}

/// All files sharing one post id within one user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    pub post_id: String,
    pub files: Vec<UnitFile>,
}

/// Structured record extracted from a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPost {
    pub post_id: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub text: String,
    /// Paths relative to the user directory, ordered by index suffix
    pub media: Vec<String>,
    pub engagement: Engagement,
    pub raw_json: Option<String>,
    /// Author profile, only when it belongs to the directory's user
    pub profile: Option<UserProfile>,
}

impl ParsedPost {
    pub fn is_degraded(&self) -> bool {
        self.timestamp_source == TimestampSource::ModifiedTime
    }

    pub fn to_new_post(&self) -> NewPost {
        NewPost {
            post_id: self.post_id.clone(),
            timestamp: self.timestamp,
            timestamp_source: self.timestamp_source,
            text: self.text.clone(),
            media: self.media.clone(),
            engagement: self.engagement,
            raw_json: self.raw_json.clone(),
        }
    }
}

/// Split a file name into `(post_id, unit file)`.
///
/// Returns `None` for names outside the pattern and for unknown extensions;
/// those files are ignored, never errors.
pub fn classify_entry(entry: &ArchiveEntry) -> Option<(String, UnitFile)> {
    let caps = UNIT_FILE_RE.captures(&entry.name)?;
    let post_id = caps.get(1)?.as_str().to_string();
    let index = match caps.get(2) {
        Some(m) => Some(m.as_str().parse::<u64>().ok()?),
        None => None,
    };

    let extension = caps.get(3)?.as_str().rsplit('.').next()?.to_ascii_lowercase();
    let kind = match extension.as_str() {
        "json" => FileKind::JsonSidecar,
        "txt" => FileKind::TextSidecar,
        ext if IMAGE_EXTENSIONS.contains(&ext) || VIDEO_EXTENSIONS.contains(&ext) => {
            FileKind::Media
        }
        _ => return None,
    };

    Some((
        post_id,
        UnitFile {
            name: entry.name.clone(),
            index,
            kind,
            modified: entry.modified,
        },
    ))
}

/// Numeric order for post ids: longer digit strings are larger.
pub fn compare_post_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Fields a sidecar contributed.
#[derive(Debug, Default)]
struct SidecarFields {
    timestamp: Option<DateTime<Utc>>,
    text: Option<String>,
    engagement: Engagement,
    raw_json: Option<String>,
    profile: Option<UserProfile>,
}

/// Parse one unit.
///
/// `read` loads a sidecar by file name; it is the only I/O the parser does.
pub fn parse_unit<F>(username: &str, unit: &ContentUnit, read: F) -> Result<ParsedPost, ParseError>
where
    F: Fn(&str) -> std::io::Result<String>,
{
    let mut files: Vec<&UnitFile> = unit.files.iter().collect();
    files.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let media: Vec<String> = files
        .iter()
        .filter(|f| f.kind == FileKind::Media)
        .map(|f| f.name.clone())
        .collect();

    let json = match files.iter().find(|f| f.kind == FileKind::JsonSidecar) {
        Some(file) => {
            let content = read(&file.name).map_err(|e| unreadable(&file.name, e))?;
            parse_json_sidecar(&file.name, &content, username)?
        }
        None => SidecarFields::default(),
    };

    let txt = match files.iter().find(|f| f.kind == FileKind::TextSidecar) {
        Some(file) => {
            let content = read(&file.name).map_err(|e| unreadable(&file.name, e))?;
            parse_text_sidecar(&content)
        }
        None => SidecarFields::default(),
    };

    let (timestamp, timestamp_source) = match json.timestamp.or(txt.timestamp) {
        Some(ts) => (ts, TimestampSource::Metadata),
        None => {
            let fallback = files
                .iter()
                .find(|f| f.kind == FileKind::Media)
                .or_else(|| files.first())
                .and_then(|f| f.modified)
                .ok_or_else(|| ParseError::MissingTimestamp(unit.post_id.clone()))?;
            (fallback, TimestampSource::ModifiedTime)
        }
    };

    Ok(ParsedPost {
        post_id: unit.post_id.clone(),
        timestamp,
        timestamp_source,
        text: json.text.or(txt.text).unwrap_or_default(),
        media,
        engagement: json.engagement,
        raw_json: json.raw_json,
        profile: json.profile,
    })
}

fn unreadable(file: &str, err: std::io::Error) -> ParseError {
    ParseError::UnreadableSidecar {
        file: file.to_string(),
        reason: err.to_string(),
    }
}

fn malformed(file: &str, reason: impl Into<String>) -> ParseError {
    ParseError::MalformedMetadata {
        file: file.to_string(),
        reason: reason.into(),
    }
}

fn parse_json_sidecar(file: &str, content: &str, username: &str) -> Result<SidecarFields, ParseError> {
    let value: Value = serde_json::from_str(content).map_err(|e| malformed(file, e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(file, "top-level value is not an object"))?;

    let mut timestamp = None;
    for field in TIMESTAMP_FIELDS {
        if let Some(raw) = obj.get(*field).filter(|v| !v.is_null()) {
            let parsed = parse_timestamp_value(raw)
                .ok_or_else(|| malformed(file, format!("unparsable '{}': {}", field, raw)))?;
            timestamp = Some(parsed);
            break;
        }
    }

    let text = TEXT_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_string);

    let engagement = Engagement {
        retweet_count: obj.get("retweet_count").and_then(Value::as_i64),
        reply_count: obj.get("reply_count").and_then(Value::as_i64),
        favorite_count: obj.get("favorite_count").and_then(Value::as_i64),
        bookmark_count: obj.get("bookmark_count").and_then(Value::as_i64),
    };

    let profile = ["author", "user"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_object))
        .find(|author| author_matches(author, username))
        .map(profile_from_author)
        .filter(|p| !p.is_empty());

    Ok(SidecarFields {
        timestamp,
        text,
        engagement,
        raw_json: Some(content.to_string()),
        profile,
    })
}

/// A `.txt` sidecar either starts with a timestamp line or is all text.
fn parse_text_sidecar(content: &str) -> SidecarFields {
    let mut lines = content.splitn(2, '\n');
    let first = lines.next().unwrap_or_default().trim();

    match parse_sidecar_date(first) {
        Some(ts) => SidecarFields {
            timestamp: Some(ts),
            text: Some(lines.next().unwrap_or_default().trim().to_string()),
            ..Default::default()
        },
        None => SidecarFields {
            text: Some(content.trim().to_string()),
            ..Default::default()
        },
    }
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        Value::String(s) => {
            let s = s.trim();
            parse_sidecar_date(s)
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)))
                .or_else(|| s.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
        }
        _ => None,
    }
}

fn parse_sidecar_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, SIDECAR_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn author_matches(author: &Map<String, Value>, username: &str) -> bool {
    ["nick", "name"].iter().any(|key| {
        author
            .get(*key)
            .and_then(Value::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case(username))
    })
}

fn profile_from_author(author: &Map<String, Value>) -> UserProfile {
    let string = |key: &str| author.get(key).and_then(Value::as_str).map(str::to_string);
    let int = |key: &str| author.get(key).and_then(Value::as_i64);

    UserProfile {
        name: string("name"),
        nick: string("nick"),
        location: string("location"),
        description: string("description"),
        verified: author.get("verified").and_then(Value::as_bool),
        profile_image_url: string("profile_image"),
        followers_count: int("followers_count"),
        friends_count: int("friends_count"),
        favourites_count: int("favourites_count"),
        listed_count: int("listed_count"),
        statuses_count: int("statuses_count"),
        media_count: int("media_count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(name: &str, secs: i64) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            modified: Utc.timestamp_opt(secs, 0).single(),
        }
    }

    fn unit(post_id: &str, names: &[(&str, i64)]) -> ContentUnit {
        ContentUnit {
            post_id: post_id.to_string(),
            files: names
                .iter()
                .map(|(name, secs)| classify_entry(&entry(name, *secs)).unwrap().1)
                .collect(),
        }
    }

    fn reader(files: &[(&str, &str)]) -> impl Fn(&str) -> std::io::Result<String> {
        let map: HashMap<String, String> = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| {
            map.get(name)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()))
        }
    }

    #[test]
    fn test_classify_entry() {
        let (id, file) = classify_entry(&entry("100_2.JPG", 0)).unwrap();
        assert_eq!(id, "100");
        assert_eq!(file.index, Some(2));
        assert_eq!(file.kind, FileKind::Media);

        let (id, file) = classify_entry(&entry("100_1.jpg.json", 0)).unwrap();
        assert_eq!(id, "100");
        assert_eq!(file.kind, FileKind::JsonSidecar);

        let (_, file) = classify_entry(&entry("7.txt", 0)).unwrap();
        assert_eq!(file.kind, FileKind::TextSidecar);
        assert_eq!(file.index, None);

        assert!(classify_entry(&entry("avatar.jpg", 0)).is_none());
        assert!(classify_entry(&entry("100.exe", 0)).is_none());
        assert!(classify_entry(&entry("100", 0)).is_none());
        assert!(classify_entry(&entry("100_a.jpg", 0)).is_none());
    }

    #[test]
    fn test_media_sorted_by_index_not_name() {
        let u = unit("5", &[("5_10.jpg", 0), ("5_2.jpg", 0), ("5_1.png", 0)]);
        let post = parse_unit("alice", &u, reader(&[])).unwrap();
        assert_eq!(post.media, vec!["5_1.png", "5_2.jpg", "5_10.jpg"]);
    }

    #[test]
    fn test_json_sidecar_supplies_text_and_time() {
        let u = unit("100", &[("100_1.jpg", 500), ("100.json", 500)]);
        let json = r#"{"date": "2024-03-01 12:30:00", "content": "hello", "favorite_count": 7}"#;
        let post = parse_unit("alice", &u, reader(&[("100.json", json)])).unwrap();

        assert_eq!(post.text, "hello");
        assert_eq!(post.timestamp_source, TimestampSource::Metadata);
        assert_eq!(post.timestamp.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert_eq!(post.engagement.favorite_count, Some(7));
        assert_eq!(post.raw_json.as_deref(), Some(json));
    }

    #[test]
    fn test_numeric_ts_field() {
        let u = unit("100", &[("100.json", 500)]);
        let post = parse_unit("alice", &u, reader(&[("100.json", r#"{"ts": 10, "text": "hi"}"#)]))
            .unwrap();
        assert_eq!(post.timestamp.timestamp(), 10);
        assert_eq!(post.text, "hi");
        assert!(post.media.is_empty());
    }

    #[test]
    fn test_no_sidecar_falls_back_to_mtime() {
        let u = unit("101", &[("101.jpg", 1234)]);
        let post = parse_unit("alice", &u, reader(&[])).unwrap();
        assert!(post.is_degraded());
        assert_eq!(post.timestamp.timestamp(), 1234);
        assert_eq!(post.text, "");
    }

    #[test]
    fn test_sidecar_without_time_is_degraded_not_error() {
        let u = unit("9", &[("9.jpg", 77), ("9.json", 88)]);
        let post = parse_unit("alice", &u, reader(&[("9.json", r#"{"text": "t"}"#)])).unwrap();
        assert!(post.is_degraded());
        assert_eq!(post.timestamp.timestamp(), 77);
        assert_eq!(post.text, "t");
    }

    #[test]
    fn test_malformed_json_is_item_error() {
        let u = unit("9", &[("9.jpg", 0), ("9.json", 0)]);
        let err = parse_unit("alice", &u, reader(&[("9.json", "{not json")])).unwrap_err();
        assert!(matches!(err, ParseError::MalformedMetadata { .. }));

        let err = parse_unit("alice", &u, reader(&[("9.json", r#"{"date": "yesterday"}"#)]))
            .unwrap_err();
        assert!(matches!(err, ParseError::MalformedMetadata { .. }));

        let err = parse_unit("alice", &u, reader(&[("9.json", "[1, 2]")])).unwrap_err();
        assert!(matches!(err, ParseError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_unreadable_sidecar() {
        let u = unit("9", &[("9.jpg", 0), ("9.json", 0)]);
        let err = parse_unit("alice", &u, reader(&[])).unwrap_err();
        assert!(matches!(err, ParseError::UnreadableSidecar { .. }));
    }

    #[test]
    fn test_missing_timestamp() {
        let u = ContentUnit {
            post_id: "3".to_string(),
            files: vec![UnitFile {
                name: "3.jpg".to_string(),
                index: None,
                kind: FileKind::Media,
                modified: None,
            }],
        };
        let err = parse_unit("alice", &u, reader(&[])).unwrap_err();
        assert_eq!(err, ParseError::MissingTimestamp("3".to_string()));
    }

    #[test]
    fn test_text_sidecar_with_and_without_timestamp_line() {
        let u = unit("4", &[("4.jpg", 0), ("4.txt", 0)]);
        let post = parse_unit(
            "alice",
            &u,
            reader(&[("4.txt", "2023-01-02 03:04:05\nfirst line\nsecond line\n")]),
        )
        .unwrap();
        assert_eq!(post.timestamp_source, TimestampSource::Metadata);
        assert_eq!(post.timestamp.to_rfc3339(), "2023-01-02T03:04:05+00:00");
        assert_eq!(post.text, "first line\nsecond line");

        let post = parse_unit("alice", &u, reader(&[("4.txt", "just words\n")])).unwrap();
        assert!(post.is_degraded());
        assert_eq!(post.text, "just words");
    }

    #[test]
    fn test_json_text_wins_over_txt() {
        let u = unit("4", &[("4.json", 0), ("4.txt", 0)]);
        let post = parse_unit(
            "alice",
            &u,
            reader(&[("4.json", r#"{"ts": 5, "full_text": "json"}"#), ("4.txt", "txt")]),
        )
        .unwrap();
        assert_eq!(post.text, "json");
    }

    #[test]
    fn test_empty_text_field_falls_through_to_next() {
        let u = unit("8", &[("8.json", 0)]);
        let json = r#"{"ts": 1, "full_text": "", "content": "hello", "text": "later"}"#;
        let post = parse_unit("alice", &u, reader(&[("8.json", json)])).unwrap();
        assert_eq!(post.text, "hello");

        let blank = r#"{"ts": 1, "full_text": "", "text": ""}"#;
        let post = parse_unit("alice", &u, reader(&[("8.json", blank)])).unwrap();
        assert_eq!(post.text, "");
    }

    #[test]
    fn test_profile_only_for_matching_author() {
        let u = unit("1", &[("1.json", 0)]);
        let own = r#"{"ts": 1, "author": {"nick": "Alice", "name": "alice", "followers_count": 3,
            "favourites_count": 17, "listed_count": 2, "profile_image": "http://x/a.jpg"}}"#;
        let post = parse_unit("alice", &u, reader(&[("1.json", own)])).unwrap();
        let profile = post.profile.unwrap();
        assert_eq!(profile.followers_count, Some(3));
        assert_eq!(profile.favourites_count, Some(17));
        assert_eq!(profile.listed_count, Some(2));
        assert_eq!(profile.statuses_count, None);
        assert_eq!(profile.profile_image_url.as_deref(), Some("http://x/a.jpg"));

        let other = r#"{"ts": 1, "author": {"nick": "bob", "name": "bob"}}"#;
        let post = parse_unit("alice", &u, reader(&[("1.json", other)])).unwrap();
        assert!(post.profile.is_none());
    }

    #[test]
    fn test_compare_post_ids_is_numeric() {
        assert_eq!(compare_post_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_post_ids("200", "199"), Ordering::Greater);
        assert_eq!(compare_post_ids("42", "42"), Ordering::Equal);
    }
}
