//! Inbound calendar query: date window + country / importance filters.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::error::QueryError;

/// Default upstream country codes (US, EU, UK, JP, CA, AU, NZ, CH, DE).
pub const DEFAULT_COUNTRIES: [u32; 9] = [32, 37, 25, 72, 6, 22, 17, 39, 14];
pub const DEFAULT_IMPORTANCE: [u8; 3] = [1, 2, 3];
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarQuery {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub countries: Vec<u32>,
    pub importance: Vec<u8>,
}

impl CalendarQuery {
    /// `today .. today + 7 days`, default countries, all importance tiers.
    pub fn default_for(today: NaiveDate) -> Self {
        Self {
            date_from: today,
            date_to: today
                .checked_add_signed(Duration::days(DEFAULT_WINDOW_DAYS))
                .unwrap_or(NaiveDate::MAX),
            countries: DEFAULT_COUNTRIES.to_vec(),
            importance: DEFAULT_IMPORTANCE.to_vec(),
        }
    }

    /// Build from raw query-string params. Missing or blank params take defaults
    /// relative to `today`; present params must be well-formed.
    pub fn from_params(params: &HashMap<String, String>, today: NaiveDate) -> Result<Self, QueryError> {
        // Both bounds default independently: `from` to today, `to` to today + 7.
        let mut q = Self::default_for(today);
        let get = |k: &str| params.get(k).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("from") {
            q.date_from = parse_date("from", v)?;
        }
        if let Some(v) = get("to") {
            q.date_to = parse_date("to", v)?;
        }
        if q.date_from > q.date_to {
            return Err(QueryError::InvertedRange {
                from: q.date_from,
                to: q.date_to,
            });
        }

        if let Some(v) = get("countries") {
            q.countries = parse_csv(v, |s| s.parse::<u32>().ok())
                .ok_or_else(|| QueryError::InvalidCountries(v.to_string()))?;
        }
        if let Some(v) = get("importance") {
            q.importance = parse_csv(v, |s| s.parse::<u8>().ok().filter(|i| (1..=3).contains(i)))
                .ok_or_else(|| QueryError::InvalidImportance(v.to_string()))?;
        }
        Ok(q)
    }

    pub fn date_from_str(&self) -> String {
        self.date_from.format(DATE_FMT).to_string()
    }

    pub fn date_to_str(&self) -> String {
        self.date_to.format(DATE_FMT).to_string()
    }

    pub fn countries_csv(&self) -> String {
        join_csv(&self.countries)
    }

    pub fn importance_csv(&self) -> String {
        join_csv(&self.importance)
    }

    /// Single cache key per logical calendar window.
    pub fn cache_key(&self) -> String {
        format!(
            "calendar-data:{}:{}:{}:{}",
            self.date_from_str(),
            self.date_to_str(),
            self.countries_csv(),
            self.importance_csv()
        )
    }
}

fn parse_date(param: &'static str, v: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(v, DATE_FMT).map_err(|_| QueryError::InvalidDate {
        param,
        value: v.to_string(),
    })
}

/// Parse a comma list; `None` if any item is invalid or the list is empty.
/// Duplicates are removed, first occurrence wins.
fn parse_csv<T: PartialEq>(v: &str, parse: impl Fn(&str) -> Option<T>) -> Option<Vec<T>> {
    let mut out = Vec::new();
    for part in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let item = parse(part)?;
        if !out.contains(&item) {
            out.push(item);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn join_csv<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
