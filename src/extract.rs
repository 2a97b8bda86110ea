//! # Markup Extractor
//! Turns the upstream calendar HTML fragment into a `DayBucket`.
//!
//! The fragment is not parsed as a DOM. It is split on `<tr` boundaries and
//! every row is probed by small, independent patterns. Each field extractor
//! falls back to a safe default on no-match, so a truncated or reshuffled row
//! degrades to fewer fields instead of an error.

use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DayBucket, EventRecord, ALL_DAY};

const ROW_DELIM: &str = "<tr";
const HOLIDAY_MARKER: &str = r#"<span class="bold">Holiday</span>"#;
const IMPACT_ICON: &str = "grayFullBullishIcon";

// `[^>]*` between the tag name and the matched attribute keeps extra attributes
// (or a different attribute order) from breaking a match.
static RE_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<td[^>]*\bclass="[^"]*\btheDay\b[^"]*"[^>]*>([^<]+)<"#).expect("day regex")
});
static RE_DAY_COLSPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)colspan="9""#).expect("colspan regex"));
static RE_ROW_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bid="eventRowId_?(\d+)""#).expect("row id regex"));
static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<\w+[^>]*\bclass="[^"]*\btime\b[^"]*"[^>]*>([^<]+)<"#).expect("time regex")
});
// Flag markup puts the code after the titled tag, separated only by `&nbsp;`,
// whitespace or closing tags.
static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<\w+[^>]*\btitle="[^"]*"[^>]*>(?:\s|&nbsp;|</[^>]*>)*([A-Z]{3})\s*<"#)
        .expect("currency regex")
});
static RE_HOLIDAY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<td[^>]*\bcolspan="6"[^>]*>([^<]+)<"#).expect("holiday name regex")
});
// `event` as a whole class token; `event-123-actual` must not qualify.
static RE_EVENT_CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<td[^>]*\bclass="(?:[^"]*\s)?event(?:\s[^"]*)?"[^>]*>"#)
        .expect("event cell regex")
});
static RE_ANCHOR_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*<a\b[^>]*>([^<]+)</a>"#).expect("anchor regex"));
static RE_LEADING_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([^<]+)<"#).expect("leading text regex"));
static RE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bid="event(Act|Fore|Prev)_(\d+)"[^>]*>(?:<span[^>]*>)?([^<]+)"#)
        .expect("value regex")
});

/// Which numeric cell of an event row to read.
#[derive(Debug, Clone, Copy)]
enum ValueField {
    Actual,
    Forecast,
    Previous,
}

impl ValueField {
    fn id_tag(self) -> &'static str {
        match self {
            ValueField::Actual => "Act",
            ValueField::Forecast => "Fore",
            ValueField::Previous => "Prev",
        }
    }
}

/// Classification of one `<tr` fragment.
#[derive(Debug, PartialEq)]
enum Row {
    DayHeader(String),
    Event(String),
    Other,
}

fn classify(row: &str) -> Row {
    if RE_DAY_COLSPAN.is_match(row) {
        if let Some(c) = RE_DAY.captures(row) {
            let label = c[1].trim();
            if !label.is_empty() {
                return Row::DayHeader(label.to_string());
            }
        }
    }
    match RE_ROW_ID.captures(row) {
        Some(c) => Row::Event(c[1].to_string()),
        None => Row::Other,
    }
}

/// Parse the upstream HTML fragment. Never fails: rows that match nothing are
/// skipped and events seen before the first day header are dropped.
pub fn extract(raw_markup: &str) -> DayBucket {
    let t0 = std::time::Instant::now();
    let mut out = DayBucket::new();
    let mut current_date: Option<String> = None;
    let mut orphaned = 0usize;
    let mut unnamed = 0usize;

    for row in raw_markup.split(ROW_DELIM) {
        match classify(row) {
            Row::DayHeader(label) => {
                out.ensure_day(&label);
                current_date = Some(label);
            }
            Row::Event(id) => {
                let ev = parse_event_row(row, &id);
                if ev.event_name.is_empty() {
                    unnamed += 1;
                    continue;
                }
                match current_date.as_deref() {
                    Some(date) => out.push(date, ev),
                    None => orphaned += 1,
                }
            }
            Row::Other => {}
        }
    }

    if orphaned > 0 || unnamed > 0 {
        tracing::debug!(
            target: "calendar",
            orphaned,
            unnamed,
            "extract dropped event rows"
        );
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("calendar_extract_ms").record(ms);
    counter!("calendar_extracted_events_total").increment(out.event_count() as u64);
    out
}

fn parse_event_row(row: &str, id: &str) -> EventRecord {
    let is_holiday = row.contains(HOLIDAY_MARKER);
    let importance = if is_holiday {
        0
    } else {
        match row.matches(IMPACT_ICON).count() {
            0 => 1,
            n => n.min(3) as u8,
        }
    };

    let event_name = if is_holiday {
        holiday_name(row)
    } else {
        event_name(row)
    };

    let (actual, forecast, previous) = if is_holiday {
        (String::new(), String::new(), String::new())
    } else {
        (
            value_cell(row, id, ValueField::Actual),
            value_cell(row, id, ValueField::Forecast),
            value_cell(row, id, ValueField::Previous),
        )
    };

    EventRecord {
        id: Some(id.to_string()),
        time: time_label(row),
        currency: currency(row),
        importance,
        is_holiday,
        event_name,
        actual,
        forecast,
        previous,
    }
}

fn time_label(row: &str) -> String {
    RE_TIME
        .captures(row)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ALL_DAY.to_string())
}

fn currency(row: &str) -> String {
    RE_CURRENCY
        .captures(row)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

fn holiday_name(row: &str) -> String {
    RE_HOLIDAY_NAME
        .captures_iter(row)
        .find(|c| {
            c.get(0)
                .is_some_and(|m| RE_EVENT_CELL.is_match(m.as_str()))
        })
        .map(|c| clean_text(&c[1]))
        .unwrap_or_default()
}

/// Anchored text inside the event cell, else the cell's leading plain text.
fn event_name(row: &str) -> String {
    for cell in RE_EVENT_CELL.find_iter(row) {
        let rest = &row[cell.end()..];
        if let Some(c) = RE_ANCHOR_TEXT.captures(rest) {
            let name = clean_text(&c[1]);
            if !name.is_empty() {
                return name;
            }
        }
        if let Some(c) = RE_LEADING_TEXT.captures(rest) {
            let name = clean_text(&c[1]);
            if !name.is_empty() {
                return name;
            }
        }
    }
    String::new()
}

/// Cell keyed by `id="event<Field>_<row id>"`, optionally wrapped in one `<span>`.
fn value_cell(row: &str, id: &str, field: ValueField) -> String {
    RE_VALUE
        .captures_iter(row)
        .find(|c| &c[1] == field.id_tag() && &c[2] == id)
        .map(|c| c[3].replace("&nbsp;", "").trim().to_string())
        .unwrap_or_default()
}

fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    decoded
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
