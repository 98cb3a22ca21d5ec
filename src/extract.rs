use crate::provider::RawRecord;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static MPAA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Rated (?P<rating>[a-zA-Z0-9-]+)").unwrap());
static CERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^USA:(?P<rating>[ a-zA-Z0-9-]+)").unwrap());
static RELEASE_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<country>\w+)::(?P<date>\d{1,2} \w+ \d{4})( \((?P<note>.*)\))?").unwrap()
});
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+").unwrap());

/// US rating classifications, ordered from most to least restrictive era.
/// Ratings systems loosen over time, so when a movie carries several
/// certificates the earliest (lowest-ordinal) one is treated as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MpaaRating {
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    R,
    #[serde(rename = "NC-17")]
    Nc17,
    Unrated,
}

impl MpaaRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpaaRating::G => "G",
            MpaaRating::Pg => "PG",
            MpaaRating::Pg13 => "PG-13",
            MpaaRating::R => "R",
            MpaaRating::Nc17 => "NC-17",
            MpaaRating::Unrated => "Unrated",
        }
    }

    /// Parses a modern rating label, mapping legacy labels to their current
    /// equivalents (M and X predate NC-17, GP predates PG, and so on).
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "G" => Some(MpaaRating::G),
            "PG" | "GP" | "Approved" | "Open" => Some(MpaaRating::Pg),
            "PG-13" => Some(MpaaRating::Pg13),
            "R" => Some(MpaaRating::R),
            "NC-17" | "M" | "X" => Some(MpaaRating::Nc17),
            "Unrated" | "Not Rated" => Some(MpaaRating::Unrated),
            _ => None,
        }
    }
}

impl std::fmt::Display for MpaaRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One runtime variant with its optional country and note context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub minutes: u32,
    pub country: Option<String>,
    pub notes: Option<String>,
}

/// One theatrical release date, with its optional note (e.g. a festival name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDate {
    pub date: NaiveDate,
    pub note: Option<String>,
}

/// One DVD release; fields other than the release date pass through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DvdRelease {
    pub release_date: NaiveDate,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The main title according to the provider.
pub fn title(record: &RawRecord) -> Option<String> {
    record
        .get_field("title")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Every title variant the provider reports: the value of each field whose
/// name contains "title", de-duplicated preserving first-seen order.
pub fn title_variants(record: &RawRecord) -> Vec<String> {
    let keys: Vec<String> = record
        .field_names()
        .filter(|name| name.to_lowercase().contains("title"))
        .map(str::to_string)
        .collect();

    let mut titles = Vec::new();
    for key in keys {
        if let Some(value) = record.get_field(&key).and_then(Value::as_str) {
            push_unique(&mut titles, value.to_string());
        }
    }
    titles
}

/// Every name this movie could go by: the main title, provider title
/// variants, and the locale titles of its foreign releases. De-duplicated,
/// first-seen order preserved.
pub fn all_titles(record: &RawRecord) -> Vec<String> {
    let mut titles = Vec::new();
    if let Some(main) = title(record) {
        push_unique(&mut titles, main);
    }
    for variant in title_variants(record) {
        push_unique(&mut titles, variant);
    }
    if let Some(pairs) = alternate_title_pairs(record) {
        for (local, _) in pairs {
            push_unique(&mut titles, local);
        }
    }
    titles
}

/// Title translations for releases in other countries, keyed by the local
/// title. A missing translation segment maps to `None`.
pub fn alternate_titles(record: &RawRecord) -> Option<BTreeMap<String, Option<String>>> {
    alternate_title_pairs(record).map(|pairs| pairs.into_iter().collect())
}

/// Parses the raw "akas" list in provider order. Each entry is a
/// double-colon-delimited `localTitle::translatedTitle` string; empty
/// segments are dropped before pairing.
fn alternate_title_pairs(record: &RawRecord) -> Option<Vec<(String, Option<String>)>> {
    let akas = record.get_field("akas")?.as_array()?;

    let mut pairs = Vec::new();
    for aka in akas.iter().filter_map(Value::as_str) {
        let segments: Vec<&str> = aka.split("::").filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => continue,
            [local] => pairs.push((local.to_string(), None)),
            [local, translated, ..] => {
                pairs.push((local.to_string(), Some(translated.to_string())))
            }
        }
    }
    Some(pairs)
}

/// Resolves the US rating classification.
///
/// A free-text "mpaa" field ("Rated R for violence") wins outright. Failing
/// that, the "certificates" list is scanned for USA entries; since a movie is
/// often re-rated across releases, the most restrictive recognized rating
/// (minimum ordinal) is returned.
pub fn mpaa(record: &RawRecord) -> Option<MpaaRating> {
    if let Some(text) = record.get_field("mpaa").and_then(Value::as_str) {
        if let Some(caps) = MPAA_RE.captures(text) {
            if let Some(rating) = MpaaRating::from_label(&caps["rating"]) {
                return Some(rating);
            }
        }
    }

    let certs = record.get_field("certificates")?.as_array()?;
    let mut best: Option<MpaaRating> = None;
    for cert in certs.iter().filter_map(Value::as_str) {
        if !cert.to_lowercase().contains("usa") {
            continue;
        }
        let Some(caps) = CERT_RE.captures(cert) else {
            continue;
        };
        if let Some(rating) = MpaaRating::from_label(caps["rating"].trim_end()) {
            best = Some(match best {
                Some(current) if current <= rating => current,
                _ => rating,
            });
        }
    }
    best
}

/// Parses the raw runtimes list, preserving input order.
///
/// Each entry is either a bare minute count ("105") or a colon-delimited
/// composite of minutes, a parenthesized note and a bare country token, in
/// any order ("108::(director's cut)::Hong Kong").
pub fn runtimes(record: &RawRecord) -> Option<Vec<Runtime>> {
    let raw = record.get_field("runtimes")?.as_array()?;

    let mut times = Vec::new();
    for entry in raw {
        let text = match entry {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };

        // Providers usually report a plain minute count with no context
        if let Ok(minutes) = text.trim().parse::<u32>() {
            times.push(Runtime {
                minutes,
                country: None,
                notes: None,
            });
            continue;
        }

        let mut minutes = None;
        let mut country = None;
        let mut notes = None;
        for segment in text.split(':').filter(|s| !s.is_empty()) {
            if let Ok(m) = segment.parse::<u32>() {
                minutes = Some(m);
            } else if segment.starts_with('(') && segment.ends_with(')') {
                notes = Some(segment[1..segment.len() - 1].to_string());
            } else if WORD_RE.is_match(segment) {
                country = Some(segment.to_string());
            }
        }
        if let Some(minutes) = minutes {
            times.push(Runtime {
                minutes,
                country,
                notes,
            });
        }
    }
    Some(times)
}

/// Theatrical release dates grouped by country, duplicate (date, note) pairs
/// skipped within a country. Entries look like
/// `USA::25 March 1999 (premiere)`; the month is a full English name.
pub fn release_dates(record: &RawRecord) -> Option<BTreeMap<String, Vec<ReleaseDate>>> {
    let raw = record.get_field("release dates")?.as_array()?;

    let mut grouped: BTreeMap<String, Vec<ReleaseDate>> = BTreeMap::new();
    for entry in raw.iter().filter_map(Value::as_str) {
        let Some(caps) = RELEASE_DATE_RE.captures(entry) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&caps["date"], "%d %B %Y") else {
            continue;
        };
        let release = ReleaseDate {
            date,
            note: caps.name("note").map(|m| m.as_str().to_string()),
        };
        let dates = grouped.entry(caps["country"].to_string()).or_default();
        if !dates.contains(&release) {
            dates.push(release);
        }
    }
    Some(grouped)
}

/// DVD releases with their release date parsed; other provider fields for
/// each release pass through unchanged.
pub fn dvd_releases(record: &RawRecord) -> Option<Vec<DvdRelease>> {
    let raw = record.get_field("dvd")?.as_array()?;

    let mut releases = Vec::new();
    for entry in raw {
        let Some(fields) = entry.as_object() else {
            continue;
        };
        let Some(date_str) = fields.get("release date").and_then(Value::as_str) else {
            continue;
        };
        let Ok(release_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        let extra = fields
            .iter()
            .filter(|(key, _)| key.as_str() != "release date")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        releases.push(DvdRelease {
            release_date,
            extra,
        });
    }
    Some(releases)
}

pub fn cast(record: &RawRecord) -> Option<Vec<String>> {
    person_list(record, "cast")
}

pub fn director(record: &RawRecord) -> Option<Vec<String>> {
    person_list(record, "director")
}

pub fn producer(record: &RawRecord) -> Option<Vec<String>> {
    person_list(record, "producer")
}

pub fn writers(record: &RawRecord) -> Option<Vec<String>> {
    // the provider's raw key is singular
    person_list(record, "writer")
}

/// Stringifies a list of people element-wise: upstream entries may be richer
/// person records, of which only the displayable name is kept.
fn person_list(record: &RawRecord, field: &str) -> Option<Vec<String>> {
    let raw = record.get_field(field)?.as_array()?;
    Some(raw.iter().map(stringify).collect())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(fields) => fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// First plot summary, truncated at the author attribution separator.
pub fn plot(record: &RawRecord) -> Option<String> {
    let first = record.get_field("plot")?.as_array()?.first()?.as_str()?;
    first.split("::").next().map(str::to_string)
}

pub fn plot_outline(record: &RawRecord) -> Option<String> {
    record
        .get_field("plot outline")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn genres(record: &RawRecord) -> Option<Vec<String>> {
    let raw = record.get_field("genres")?.as_array()?;
    Some(
        raw.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

pub fn kind(record: &RawRecord) -> Option<String> {
    record
        .get_field("kind")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn rating(record: &RawRecord) -> Option<f64> {
    record.get_field("rating").and_then(Value::as_f64)
}

pub fn votes(record: &RawRecord) -> Option<u64> {
    record.get_field("votes").and_then(Value::as_u64)
}

pub fn top250(record: &RawRecord) -> Option<u64> {
    record.get_field("top 250 rank").and_then(Value::as_u64)
}

pub fn year(record: &RawRecord) -> Option<i32> {
    record
        .get_field("year")
        .and_then(Value::as_i64)
        .map(|y| y as i32)
}

pub fn taglines(record: &RawRecord) -> Option<Vec<String>> {
    let raw = record.get_field("taglines")?.as_array()?;
    Some(
        raw.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

fn push_unique(titles: &mut Vec<String>, title: String) {
    if !titles.contains(&title) {
        titles.push(title);
    }
}
