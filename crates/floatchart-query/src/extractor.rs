//! Entity extraction from normalized query text.
//!
//! Each rule runs independently over the same text, so one query can yield
//! float ids, a time range, variables, locations and a threshold together.
//! Nothing here fails: a missing entity is just an empty field.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use floatchart_common::{GeoRegion, Variable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gazetteer::Gazetteer;
use crate::plan::{Aggregation, Breakdown};

/// Lower-case and collapse whitespace. The caller keeps the raw text for summaries.
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Extracted types ───────────────────────────────────────────────────────────

/// Inclusive UTC time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOp {
    pub fn sql(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
        }
    }
}

/// Numeric comparison target, e.g. "temperature above 28".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub variable: Option<Variable>,
    pub op: ComparisonOp,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub float_ids: Vec<i64>,
    pub time_range: Option<TimeRange>,
    pub variables: Vec<Variable>,
    pub locations: Vec<GeoRegion>,
    /// Location-like phrases that matched nothing in the gazetteer.
    pub unresolved_locations: Vec<String>,
    pub threshold: Option<Threshold>,
    pub requested_limit: Option<u32>,
    pub aggregation: Option<Aggregation>,
    pub breakdown: Option<Breakdown>,
}

impl ExtractedEntities {
    pub fn primary_location(&self) -> Option<&GeoRegion> {
        self.locations.first()
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EntityExtractor {
    gazetteer: Arc<Gazetteer>,
}

impl EntityExtractor {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    /// Extract against the current clock. Relative phrases ("last 30 days") make
    /// the result depend on when this is called.
    pub fn extract(&self, normalized: &str) -> ExtractedEntities {
        self.extract_at(normalized, Utc::now())
    }

    pub fn extract_at(&self, normalized: &str, now: DateTime<Utc>) -> ExtractedEntities {
        let (mut variables, variable_ends) = extract_variables(normalized);
        if variables.is_empty() && temperature_superlative_regex().is_match(normalized) {
            variables.push(Variable::Temperature);
        }
        let (locations, unresolved_locations) = self.extract_locations(normalized);

        let entities = ExtractedEntities {
            float_ids: extract_float_ids(normalized),
            time_range: extract_time_range(normalized, now),
            threshold: extract_threshold(normalized, &variables, &variable_ends),
            requested_limit: extract_requested_limit(normalized),
            aggregation: extract_aggregation(normalized),
            breakdown: extract_breakdown(normalized),
            variables,
            locations,
            unresolved_locations,
        };

        debug!(
            floats = entities.float_ids.len(),
            variables = ?entities.variables,
            locations = ?entities.locations.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
            unresolved = ?entities.unresolved_locations,
            has_time = entities.time_range.is_some(),
            "entities extracted"
        );
        entities
    }

    fn extract_locations(&self, text: &str) -> (Vec<GeoRegion>, Vec<String>) {
        let mut found: Vec<GeoRegion> = Vec::new();
        let mut unresolved = Vec::new();

        let matches = self.gazetteer.scan(text);
        for m in &matches {
            if !found.iter().any(|r| r.name == m.region.name) {
                found.push(m.region.clone());
            }
        }

        // Prepositional phrases the scan did not cover get one more chance via resolve().
        // Searching resumes right after each preposition so a rejected phrase never
        // swallows the next one.
        let mut pos = 0;
        while let Some(cap) = location_phrase_regex().captures_at(text, pos) {
            let (Some(prep), Some(phrase)) = (cap.get(1), cap.get(2)) else { break };
            pos = prep.end();
            if prep.as_str() == "to" && !follows_proximity_word(&text[..prep.start()]) {
                continue;
            }
            if matches.iter().any(|m| phrase.start() < m.end && m.start < phrase.end()) {
                continue;
            }

            let words: Vec<&str> = phrase.as_str()
                .split_whitespace()
                .take_while(|w| !is_location_stopword(w))
                .collect();
            if words.is_empty() {
                continue;
            }

            let resolved = (1..=words.len()).rev()
                .find_map(|n| self.gazetteer.resolve(&words[..n].join(" ")).ok());
            match resolved {
                Some(region) => {
                    if !found.iter().any(|r| r.name == region.name) {
                        found.push(region.clone());
                    }
                }
                None => {
                    let phrase = words.join(" ");
                    if !unresolved.contains(&phrase) {
                        unresolved.push(phrase);
                    }
                }
            }
        }

        (found, unresolved)
    }
}

// ── Float identifiers ─────────────────────────────────────────────────────────

fn float_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{6,8}\b").unwrap())
}

/// Every 6–8 digit token, in order of appearance, without duplicates.
pub fn extract_float_ids(text: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for m in float_id_regex().find_iter(text) {
        if let Ok(id) = m.as_str().parse::<i64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

// ── Variables ─────────────────────────────────────────────────────────────────

const VARIABLE_SYNONYMS: &[(&str, Variable)] = &[
    ("sea surface temperature", Variable::Temperature),
    ("dissolved oxygen", Variable::DissolvedOxygen),
    ("temperatures", Variable::Temperature),
    ("temperature", Variable::Temperature),
    ("temps", Variable::Temperature),
    ("temp", Variable::Temperature),
    ("sst", Variable::Temperature),
    ("salinity", Variable::Salinity),
    ("salt", Variable::Salinity),
    ("psu", Variable::Salinity),
    ("pressure", Variable::Pressure),
    ("depth", Variable::Pressure),
    ("oxygen", Variable::DissolvedOxygen),
    ("doxy", Variable::DissolvedOxygen),
    ("o2", Variable::DissolvedOxygen),
    ("do", Variable::DissolvedOxygen),
    ("chlorophyll", Variable::Chlorophyll),
    ("chla", Variable::Chlorophyll),
    ("chl", Variable::Chlorophyll),
];

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Table is ordered longest-first so alternation prefers the longer synonym
        let alternation = VARIABLE_SYNONYMS.iter()
            .map(|(s, _)| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{})\b", alternation)).unwrap()
    })
}

/// Words that make "do" read as a verb when they precede it.
const DO_VERB_PRECEDERS: &[&str] = &[
    "how", "what", "why", "where", "when", "which", "who", "i", "you", "we", "they",
    "does", "did", "to", "can", "could", "should", "would", "not",
];

/// Words that may follow "do" when it means dissolved oxygen.
const DO_NOUN_FOLLOWERS: &[&str] = &[
    "and", "or", "vs", "versus", "in", "near", "at", "around", "levels", "level",
    "concentration", "concentrations", "values", "data", "for", "from", "over", "since",
    "during", "of", "with", "trend", "trends", "between", "above", "below",
];

fn is_dissolved_oxygen_do(text: &str, start: usize, end: usize) -> bool {
    let prev = text[..start].split_whitespace().last()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()));
    if prev.is_some_and(|p| DO_VERB_PRECEDERS.contains(&p)) {
        return false;
    }
    let rest = &text[end..];
    if rest.trim_start().starts_with(',') {
        return true;
    }
    match rest.split_whitespace().next() {
        None => true,
        Some(next) => {
            let next = next.trim_matches(|c: char| !c.is_alphanumeric());
            next.is_empty() || DO_NOUN_FOLLOWERS.contains(&next)
        }
    }
}

/// Variables in order of first mention, plus the end offset of every mention.
fn extract_variables(text: &str) -> (Vec<Variable>, Vec<(usize, Variable)>) {
    let mut variables = Vec::new();
    let mut ends = Vec::new();
    for m in variable_regex().find_iter(text) {
        if m.as_str() == "do" && !is_dissolved_oxygen_do(text, m.start(), m.end()) {
            continue;
        }
        let Some(&(_, variable)) = VARIABLE_SYNONYMS.iter().find(|(s, _)| *s == m.as_str()) else {
            continue;
        };
        ends.push((m.end(), variable));
        if !variables.contains(&variable) {
            variables.push(variable);
        }
    }
    (variables, ends)
}

/// "warmest", "colder than" and friends imply temperature when nothing else is named.
fn temperature_superlative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:warm|hott|cold|cool)(?:est|er)\b").unwrap())
}

// ── Locations ─────────────────────────────────────────────────────────────────

fn location_phrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(close to|near|around|off|in|at|to)\s+(?:the\s+)?([a-z][a-z'\-]*(?:\s+[a-z][a-z'\-]*){0,3})"
        ).unwrap()
    })
}

/// "to" names a place only after a proximity word ("nearest floats to goa").
/// Otherwise it is an infinitive ("i want to see ...").
fn follows_proximity_word(before: &str) -> bool {
    const PROXIMITY_WORDS: &[&str] = &["nearest", "closest", "near", "nearby", "close", "next", "proximity"];
    before.split_whitespace()
        .rev()
        .take(3)
        .any(|w| PROXIMITY_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
}

const LOCATION_STOPWORDS: &[&str] = &[
    // connectives, prepositions and pronouns
    "the", "in", "at", "to", "on", "near", "around", "off", "into", "within", "inside",
    "about", "where", "what", "which", "how", "is", "are", "was", "were", "least", "most",
    "and", "or", "with", "for", "during", "since", "from", "between", "over", "by", "vs",
    "versus", "of", "it", "this", "that", "these", "those", "there", "here", "them", "all",
    "any", "each", "every", "our", "my", "their", "a", "an", "terms", "general", "particular",
    "total", "detail", "order", "compare", "compared", "show", "list",
    // time words
    "last", "past", "previous", "next", "recent", "recently", "today", "yesterday", "year",
    "years", "month", "months", "week", "weeks", "day", "days", "time", "summer", "winter",
    "spring", "autumn", "monsoon", "season", "january", "february", "march", "april", "may",
    "june", "july", "august", "september", "october", "november", "december", "jan", "feb",
    "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
    "night", "nights", "nighttime", "daytime", "noon", "midnight", "dawn", "dusk", "sunrise",
    "sunset", "morning", "evening", "afternoon",
    // statistic words
    "maximum", "max", "minimum", "min", "mean", "median", "avg", "highest", "lowest",
    "warmest", "hottest", "coldest", "coolest", "peak", "count", "number", "trend", "trends",
    // measurement words
    "surface", "depth", "depths", "deep", "meters", "metres", "m", "dbar", "average", "range",
    "region", "area", "ocean", "oceans", "sea", "seas", "water", "waters", "float", "floats",
    "data", "values", "profile", "profiles", "temperature", "temp", "salinity", "pressure",
    "oxygen", "chlorophyll", "degrees", "celsius",
];

fn is_location_stopword(word: &str) -> bool {
    let w = word.trim_matches(|c: char| !c.is_alphanumeric());
    w.is_empty() || LOCATION_STOPWORDS.contains(&w)
}

// ── Time ranges ───────────────────────────────────────────────────────────────

fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

fn month_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{4})\b").unwrap()
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap())
}

fn relative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:last|past|previous)\s+(?:(\d{1,4})\s+)?(day|week|month|year)s?\b").unwrap()
    })
}

fn this_period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bthis\s+(month|year)\b").unwrap())
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59)?))
}

fn day_range(date: NaiveDate) -> Option<TimeRange> {
    Some(TimeRange { start: start_of_day(date)?, end: end_of_day(date)? })
}

fn month_range(year: i32, month: u32) -> Option<TimeRange> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(TimeRange { start: start_of_day(first)?, end: end_of_day(next.pred_opt()?)? })
}

fn year_range(year: i32) -> Option<TimeRange> {
    Some(TimeRange {
        start: start_of_day(NaiveDate::from_ymd_opt(year, 1, 1)?)?,
        end: end_of_day(NaiveDate::from_ymd_opt(year, 12, 31)?)?,
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    MONTHS.iter().position(|m| *m == abbrev).map(|i| i as u32 + 1)
}

fn relative_range(count: u32, unit: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    let start = match unit {
        "day" => now - Duration::days(i64::from(count)),
        "week" => now - Duration::weeks(i64::from(count)),
        "month" => now.checked_sub_months(Months::new(count))?,
        "year" => now.checked_sub_months(Months::new(count.checked_mul(12)?))?,
        _ => return None,
    };
    Some(TimeRange { start, end: now })
}

/// Resolve all date expressions to one inclusive window.
///
/// A relative phrase wins outright. Otherwise absolute dates are merged into
/// their overall span, and "since"/"after" before a date leaves the window open to `now`.
pub fn extract_time_range(text: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    if let Some(cap) = relative_regex().captures(text) {
        let count = cap.get(1).and_then(|c| c.as_str().parse::<u32>().ok()).unwrap_or(1);
        if count > 0 {
            if let Some(range) = relative_range(count, &cap[2], now) {
                return Some(range);
            }
        }
    }
    if let Some(cap) = this_period_regex().captures(text) {
        let start = match &cap[1] {
            "month" => NaiveDate::from_ymd_opt(now.year(), now.month(), 1),
            _ => NaiveDate::from_ymd_opt(now.year(), 1, 1),
        };
        if let Some(start) = start.and_then(start_of_day) {
            return Some(TimeRange { start, end: now });
        }
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut ranges: Vec<(usize, TimeRange)> = Vec::new();

    for cap in iso_date_regex().captures_iter(text) {
        let whole = cap.get(0)?;
        let date = NaiveDate::from_ymd_opt(
            cap[1].parse().ok()?, cap[2].parse().ok()?, cap[3].parse().ok()?,
        );
        spans.push((whole.start(), whole.end()));
        if let Some(range) = date.and_then(day_range) {
            ranges.push((whole.start(), range));
        }
    }
    for cap in month_year_regex().captures_iter(text) {
        let whole = cap.get(0)?;
        if spans.iter().any(|&(s, e)| whole.start() < e && s < whole.end()) {
            continue;
        }
        spans.push((whole.start(), whole.end()));
        let year: i32 = cap[2].parse().ok()?;
        if let Some(range) = month_number(&cap[1]).and_then(|m| month_range(year, m)) {
            ranges.push((whole.start(), range));
        }
    }
    for m in year_regex().find_iter(text) {
        if spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
            continue;
        }
        if is_measured_quantity(text, m.start(), m.end()) {
            continue;
        }
        if let Some(range) = m.as_str().parse().ok().and_then(year_range) {
            ranges.push((m.start(), range));
        }
    }

    if ranges.is_empty() {
        return None;
    }

    let start = ranges.iter().map(|(_, r)| r.start).min()?;
    let open_ended = ranges.iter().any(|(pos, _)| {
        let before = text[..*pos].trim_end();
        before.ends_with("since") || before.ends_with("after")
    });
    let end = if open_ended {
        now.max(start)
    } else {
        ranges.iter().map(|(_, r)| r.end).max()?
    };
    Some(TimeRange { start, end })
}

/// "below 2000 m" or "1500 floats": a year-shaped number that measures something.
fn is_measured_quantity(text: &str, start: usize, end: usize) -> bool {
    let next = text[end..].split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '°'))
        .unwrap_or("");
    if DEPTH_UNITS.contains(&next) || COUNT_NOUNS.contains(&next) || OTHER_UNITS.contains(&next) {
        return true;
    }
    threshold_regex().captures_iter(text)
        .filter_map(|cap| cap.get(2))
        .any(|operand| operand.start() <= start && end <= operand.end())
}

// ── Threshold ─────────────────────────────────────────────────────────────────

fn threshold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(above|over|greater than|more than|higher than|warmer than|exceeding|at least|",
            r"below|under|less than|lower than|colder than|at most|>=|<=|>|<)",
            r"\s*(-?\d+(?:\.\d+)?)(?:\s*([a-z°]+))?"
        )).unwrap()
    })
}

const COUNT_NOUNS: &[&str] = &[
    "day", "days", "week", "weeks", "month", "months", "year", "years", "float", "floats",
    "record", "records", "row", "rows", "result", "results", "profile", "profiles",
    "measurement", "measurements", "observation", "observations",
];

const DEPTH_UNITS: &[&str] = &["m", "meter", "meters", "metre", "metres", "dbar", "db"];

const OTHER_UNITS: &[&str] = &[
    "km", "kilometer", "kilometers", "kilometre", "kilometres", "psu", "c", "°c", "degrees",
    "celsius",
];

fn extract_threshold(
    text: &str,
    variables: &[Variable],
    variable_ends: &[(usize, Variable)],
) -> Option<Threshold> {
    for cap in threshold_regex().captures_iter(text) {
        let whole = cap.get(0)?;
        let unit = cap.get(3).map(|u| u.as_str()).unwrap_or("");
        if COUNT_NOUNS.contains(&unit) {
            continue;
        }
        let Ok(value) = cap[2].parse::<f64>() else { continue };

        let op = match &cap[1] {
            "above" | "over" | "greater than" | "more than" | "higher than" | "warmer than"
            | "exceeding" | ">" => ComparisonOp::Gt,
            "at least" | ">=" => ComparisonOp::Ge,
            "at most" | "<=" => ComparisonOp::Le,
            _ => ComparisonOp::Lt,
        };

        let variable = if DEPTH_UNITS.contains(&unit) {
            Some(Variable::Pressure)
        } else {
            variable_ends.iter()
                .rev()
                .find(|(end, _)| *end <= whole.start())
                .map(|(_, v)| *v)
                .or_else(|| variables.first().copied())
        };
        return Some(Threshold { variable, op, value });
    }
    None
}

// ── Requested count ───────────────────────────────────────────────────────────

fn limit_regexes() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| [
        Regex::new(r"\b(\d{1,5})\s+(?:nearest|closest|latest|recent)\b").unwrap(),
        Regex::new(r"\b(?:top|first|limit|nearest|closest|latest)\s+(\d{1,5})\b").unwrap(),
        Regex::new(r"\b(\d{1,5})\s+(?:floats?|records|rows|results|profiles|measurements|observations)\b").unwrap(),
    ])
}

pub fn extract_requested_limit(text: &str) -> Option<u32> {
    limit_regexes().iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|cap| cap[1].parse::<u32>().ok())
        .find(|n| *n > 0)
}

// ── Aggregation and breakdown hints ──────────────────────────────────────────

fn aggregation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\b(average|avg|mean|maximum|max|highest|warmest|hottest|peak|",
            r"minimum|min|lowest|coldest|coolest|count|how many|number of)\b"
        )).unwrap()
    })
}

pub fn extract_aggregation(text: &str) -> Option<Aggregation> {
    let m = aggregation_regex().find(text)?;
    Some(match m.as_str() {
        "average" | "avg" | "mean" => Aggregation::Avg,
        "maximum" | "max" | "highest" | "warmest" | "hottest" | "peak" => Aggregation::Max,
        "minimum" | "min" | "lowest" | "coldest" | "coolest" => Aggregation::Min,
        _ => Aggregation::Count,
    })
}

fn per_float_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:per|each|by|every)\s+float\b").unwrap())
}

fn monthly_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:trends?|monthly|per month|by month|each month|over time|seasonal)\b").unwrap()
    })
}

pub fn extract_breakdown(text: &str) -> Option<Breakdown> {
    if per_float_regex().is_match(text) {
        Some(Breakdown::PerFloat)
    } else if monthly_regex().is_match(text) {
        Some(Breakdown::Monthly)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatchart_common::GeoExtent;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(Arc::new(Gazetteer::builtin()))
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_lowercases_and_collapses() {
        assert_eq!(normalize("  Average   TEMPERATURE\tin Bay of\nBengal "), "average temperature in bay of bengal");
    }

    #[test]
    fn test_float_ids_all_collected() {
        assert_eq!(extract_float_ids("compare 2902115 and 5904471 then 2902115 again"), vec![2902115, 5904471]);
        assert_eq!(extract_float_ids("float 123456 and 12345678"), vec![123456, 12345678]);
    }

    #[test]
    fn test_float_ids_ignore_other_lengths() {
        assert!(extract_float_ids("top 10 floats in 2023 near 12345").is_empty());
        assert!(extract_float_ids("id 123456789").is_empty());
        assert!(extract_float_ids("since 2023-01-15").is_empty());
    }

    #[test]
    fn test_variables_with_synonyms() {
        let (vars, _) = extract_variables("compare temp vs salt and chl");
        assert_eq!(vars, vec![Variable::Temperature, Variable::Salinity, Variable::Chlorophyll]);

        let (vars, _) = extract_variables("dissolved oxygen and oxygen and o2");
        assert_eq!(vars, vec![Variable::DissolvedOxygen]);
    }

    #[test]
    fn test_do_only_as_a_noun() {
        let (vars, _) = extract_variables("compare temperature and do in arabian sea");
        assert_eq!(vars, vec![Variable::Temperature, Variable::DissolvedOxygen]);

        let (vars, _) = extract_variables("how do floats measure salinity");
        assert_eq!(vars, vec![Variable::Salinity]);

        let (vars, _) = extract_variables("what do you know");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_iso_dates_span() {
        let r = extract_time_range("between 2023-01-01 and 2023-03-31", fixed_now()).unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(r.end, Utc.with_ymd_and_hms(2023, 3, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_year_and_month_year() {
        let r = extract_time_range("salinity in 2021", fixed_now()).unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(r.end, Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 59).unwrap());

        let r = extract_time_range("temperature in february 2024", fixed_now()).unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(r.end, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_since_year_is_open_ended() {
        let r = extract_time_range("temperature since 2020", fixed_now()).unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(r.end, fixed_now());
    }

    #[test]
    fn test_relative_phrases() {
        let r = extract_time_range("salinity in the last 30 days", fixed_now()).unwrap();
        assert_eq!(r.end, fixed_now());
        assert_eq!(r.start, fixed_now() - Duration::days(30));

        let r = extract_time_range("floats active past year", fixed_now()).unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_no_time_expression() {
        assert!(extract_time_range("average temperature in bay of bengal", fixed_now()).is_none());
        assert!(extract_time_range("trajectory of float 2902115", fixed_now()).is_none());
    }

    #[test]
    fn test_locations_longest_match_and_fallback() {
        let e = extractor().extract_at("average salinity in the bay of bengal and near chennai", fixed_now());
        let names: Vec<&str> = e.locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Bay of Bengal", "Chennai"]);
        assert!(e.unresolved_locations.is_empty());
    }

    #[test]
    fn test_partial_name_resolves_through_gazetteer() {
        let e = extractor().extract_at("temperature near andamans", fixed_now());
        assert!(e.locations.is_empty());
        assert_eq!(e.unresolved_locations, vec!["andamans".to_string()]);

        let e = extractor().extract_at("temperature off mediterr", fixed_now());
        assert_eq!(e.locations[0].name, "Mediterranean Sea");
    }

    #[test]
    fn test_unresolved_location_recorded() {
        let e = extractor().extract_at("floats near nowhereville", fixed_now());
        assert!(e.locations.is_empty());
        assert_eq!(e.unresolved_locations, vec!["nowhereville".to_string()]);
    }

    #[test]
    fn test_time_words_are_not_locations() {
        let e = extractor().extract_at("salinity in the last 30 days at the surface in march 2024", fixed_now());
        assert!(e.unresolved_locations.is_empty());
        assert!(e.locations.is_empty());
    }

    #[test]
    fn test_depth_and_counts_are_not_years() {
        let e = extractor().extract_at("salinity below 2000 m in the arabian sea", fixed_now());
        assert_eq!(e.time_range, None);
        assert_eq!(e.threshold.as_ref().map(|t| t.variable), Some(Some(Variable::Pressure)));

        assert!(extract_time_range("temperature above 1950 dbar", fixed_now()).is_none());
        assert!(extract_time_range("list 2000 floats", fixed_now()).is_none());
        assert!(extract_time_range("floats within 1900 km of goa", fixed_now()).is_none());
        assert!(extract_time_range("salinity below 2000 m in 2021", fixed_now()).is_some());
    }

    #[test]
    fn test_infinitive_to_is_not_a_place() {
        for text in [
            "i would like to see the average temperature",
            "i want to know the maximum salinity",
            "what is the average temperature at night",
        ] {
            let e = extractor().extract_at(text, fixed_now());
            assert!(e.unresolved_locations.is_empty(), "{text}: {:?}", e.unresolved_locations);
            assert!(e.locations.is_empty());
        }

        let e = extractor().extract_at("nearest floats to nowhereville", fixed_now());
        assert_eq!(e.unresolved_locations, vec!["nowhereville".to_string()]);
    }

    #[test]
    fn test_phrase_stops_at_inner_article_and_statistics() {
        let e = extractor().extract_at("floats in atlantis the lost city", fixed_now());
        assert_eq!(e.unresolved_locations, vec!["atlantis".to_string()]);

        let e = extractor().extract_at("salinity in atlantis maximum depth", fixed_now());
        assert_eq!(e.unresolved_locations, vec!["atlantis".to_string()]);
    }

    #[test]
    fn test_city_is_a_point() {
        let e = extractor().extract_at("find 5 nearest floats to chennai", fixed_now());
        assert!(matches!(e.locations[0].extent, GeoExtent::Point { .. }));
        assert_eq!(e.requested_limit, Some(5));
    }

    #[test]
    fn test_threshold_binds_to_preceding_variable() {
        let (vars, ends) = extract_variables("salinity and temperature above 28.5");
        let t = extract_threshold("salinity and temperature above 28.5", &vars, &ends).unwrap();
        assert_eq!(t.variable, Some(Variable::Temperature));
        assert_eq!(t.op, ComparisonOp::Gt);
        assert!((t.value - 28.5).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_skips_counts_and_maps_depth() {
        let text = "temperature over 30 days";
        let (vars, ends) = extract_variables(text);
        assert!(extract_threshold(text, &vars, &ends).is_none());

        let text = "temperature below 500 m";
        let (vars, ends) = extract_variables(text);
        let t = extract_threshold(text, &vars, &ends).unwrap();
        assert_eq!(t.variable, Some(Variable::Pressure));
        assert_eq!(t.op, ComparisonOp::Lt);
    }

    #[test]
    fn test_requested_limit_forms() {
        assert_eq!(extract_requested_limit("top 20 warmest floats"), Some(20));
        assert_eq!(extract_requested_limit("show 50 records"), Some(50));
        assert_eq!(extract_requested_limit("10 closest floats"), Some(10));
        assert_eq!(extract_requested_limit("salinity in the last 30 days"), None);
    }

    #[test]
    fn test_aggregation_and_breakdown() {
        assert_eq!(extract_aggregation("average temperature"), Some(Aggregation::Avg));
        assert_eq!(extract_aggregation("maximum salinity"), Some(Aggregation::Max));
        assert_eq!(extract_aggregation("coldest water"), Some(Aggregation::Min));
        assert_eq!(extract_aggregation("how many floats"), Some(Aggregation::Count));
        assert_eq!(extract_aggregation("trajectory of float 2902115"), None);

        assert_eq!(extract_breakdown("average temperature per float"), Some(Breakdown::PerFloat));
        assert_eq!(extract_breakdown("monthly salinity"), Some(Breakdown::Monthly));
        assert_eq!(extract_breakdown("temperature trends in arabian sea"), Some(Breakdown::Monthly));
        assert_eq!(extract_breakdown("average temperature"), None);
    }
}
