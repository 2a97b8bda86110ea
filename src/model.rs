//! # Calendar Model
//! Typed shape of one calendar event, the day-grouped collection, and the
//! outward JSON envelope returned to callers.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::query::CalendarQuery;
use crate::summary::{summarize, Summary};

/// Label used when a row carries no time-of-day.
pub const ALL_DAY: &str = "All Day";

/// `metadata.source` value of a degraded (all sources failed) result.
pub const SOURCE_UNAVAILABLE: &str = "unavailable";

/// One calendar event as extracted from an upstream payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Upstream row id. JSON sources may send it as a number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default)]
    pub currency: String,
    /// 0 = holiday, 1..=3 = impact intensity.
    pub importance: u8,
    #[serde(default)]
    pub is_holiday: bool,
    pub event_name: String,
    #[serde(default)]
    pub actual: String,
    #[serde(default)]
    pub forecast: String,
    #[serde(default)]
    pub previous: String,
}

fn default_time() -> String {
    ALL_DAY.to_string()
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or integer id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(IdVisitor)
        }
    }

    deserializer.deserialize_option(IdVisitor)
}

impl EventRecord {
    /// True when the record satisfies the model invariants: non-empty name,
    /// importance in 0..=3, and `importance == 0` exactly for holidays.
    pub fn is_well_formed(&self) -> bool {
        !self.event_name.trim().is_empty()
            && self.importance <= 3
            && (self.importance == 0) == self.is_holiday
    }
}

/// Events grouped by upstream date label, in the order the labels were first seen.
///
/// Keys are free-form strings ("Monday, January 5, 2026") and are never re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayBucket {
    days: Vec<(String, Vec<EventRecord>)>,
}

impl DayBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a bucket exists for `date`; returns its position.
    pub fn ensure_day(&mut self, date: &str) -> usize {
        if let Some(pos) = self.days.iter().position(|(d, _)| d == date) {
            return pos;
        }
        self.days.push((date.to_string(), Vec::new()));
        self.days.len() - 1
    }

    pub fn push(&mut self, date: &str, event: EventRecord) {
        let pos = self.ensure_day(date);
        self.days[pos].1.push(event);
    }

    pub fn get(&self, date: &str) -> Option<&[EventRecord]> {
        self.days
            .iter()
            .find(|(d, _)| d == date)
            .map(|(_, evs)| evs.as_slice())
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.days.iter().map(|(d, _)| d.as_str())
    }

    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.days.iter().flat_map(|(_, evs)| evs.iter())
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn event_count(&self) -> usize {
        self.days.iter().map(|(_, evs)| evs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Drop records that break the model invariants. Returns how many were removed.
    pub fn retain_well_formed(&mut self) -> usize {
        let mut dropped = 0usize;
        for (_, evs) in self.days.iter_mut() {
            let before = evs.len();
            evs.retain(EventRecord::is_well_formed);
            dropped += before - evs.len();
        }
        dropped
    }
}

impl Serialize for DayBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (date, evs) in &self.days {
            map.serialize_entry(date, evs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DayBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BucketVisitor;

        impl<'de> Visitor<'de> for BucketVisitor {
            type Value = DayBucket;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of date label -> event list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DayBucket, A::Error> {
                let mut out = DayBucket::new();
                while let Some((date, evs)) = access.next_entry::<String, Vec<EventRecord>>()? {
                    let pos = out.ensure_day(&date);
                    out.days[pos].1.extend(evs);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(BucketVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Query parameters echoed back in `metadata.query_parameters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEcho {
    pub date_from: String,
    pub date_to: String,
    pub countries: Vec<String>,
    pub importance_filter: Vec<String>,
}

impl From<&CalendarQuery> for QueryEcho {
    fn from(q: &CalendarQuery) -> Self {
        Self {
            date_from: q.date_from_str(),
            date_to: q.date_to_str(),
            countries: q.countries.iter().map(|c| c.to_string()).collect(),
            importance_filter: q.importance.iter().map(|i| i.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub generated_at: String,
    pub generated_timestamp: i64,
    pub timezone: String,
    pub total_events: usize,
    pub total_days: usize,
    pub query_parameters: QueryEcho,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarData {
    pub events_by_date: DayBucket,
    pub summary: Summary,
}

/// Outward envelope. Built once per upstream payload, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarResult {
    pub status: Status,
    pub metadata: Metadata,
    pub data: CalendarData,
}

impl CalendarResult {
    /// Build a success envelope from a parsed bucket.
    pub fn build(
        source: &str,
        events: DayBucket,
        query: &CalendarQuery,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let summary = summarize(&events);
        Self {
            status: Status::Success,
            metadata: Metadata {
                source: source.to_string(),
                generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
                generated_timestamp: now.timestamp(),
                timezone: "UTC".to_string(),
                total_events: summary.total,
                total_days: events.day_count(),
                query_parameters: QueryEcho::from(query),
            },
            data: CalendarData {
                events_by_date: events,
                summary,
            },
        }
    }

    /// Empty envelope returned when every source failed.
    pub fn degraded(query: &CalendarQuery, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self::build(SOURCE_UNAVAILABLE, DayBucket::new(), query, now)
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.source == SOURCE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(name: &str, importance: u8, holiday: bool) -> EventRecord {
        EventRecord {
            id: Some("1".into()),
            time: ALL_DAY.into(),
            currency: "USD".into(),
            importance,
            is_holiday: holiday,
            event_name: name.into(),
            actual: String::new(),
            forecast: String::new(),
            previous: String::new(),
        }
    }

    #[test]
    fn bucket_keeps_first_seen_order_in_json() {
        let mut b = DayBucket::new();
        b.ensure_day("Wednesday, January 7, 2026");
        b.push("Monday, January 5, 2026", ev("CPI", 3, false));
        b.push("Wednesday, January 7, 2026", ev("PPI", 2, false));

        let s = serde_json::to_string(&b).unwrap();
        let wed = s.find("Wednesday").unwrap();
        let mon = s.find("Monday").unwrap();
        assert!(wed < mon, "keys must keep insertion order: {s}");

        let back: DayBucket = serde_json::from_str(&s).unwrap();
        assert_eq!(back, b);
        assert_eq!(
            back.dates().collect::<Vec<_>>(),
            vec!["Wednesday, January 7, 2026", "Monday, January 5, 2026"]
        );
    }

    #[test]
    fn retain_well_formed_drops_contract_violations() {
        let mut b = DayBucket::new();
        b.push("d", ev("ok", 2, false));
        b.push("d", ev("", 2, false));
        b.push("d", ev("bad holiday", 2, true));
        b.push("d", ev("bad importance", 7, false));
        b.push("d", ev("zero not holiday", 0, false));
        assert_eq!(b.retain_well_formed(), 4);
        assert_eq!(b.event_count(), 1);
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let b: DayBucket = serde_json::from_str(
            r#"{"d":[
                {"id":101,"importance":2,"event_name":"CPI"},
                {"id":"102","importance":1,"event_name":"PPI"},
                {"id":null,"importance":3,"event_name":"NFP"},
                {"importance":0,"is_holiday":true,"event_name":"Holiday"}
            ]}"#,
        )
        .unwrap();
        let ids: Vec<_> = b.events().map(|e| e.id.clone()).collect();
        assert_eq!(
            ids,
            vec![Some("101".to_string()), Some("102".to_string()), None, None]
        );
    }

    #[test]
    fn degraded_envelope_shape() {
        let q = CalendarQuery::default_for(chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        let now = chrono::DateTime::from_timestamp(1_767_600_000, 0).unwrap();
        let r = CalendarResult::degraded(&q, now);
        assert!(r.is_degraded());
        assert_eq!(r.status, Status::Success);
        assert_eq!(r.metadata.total_events, 0);

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["metadata"]["source"], "unavailable");
        assert_eq!(v["metadata"]["query_parameters"]["date_from"], "2026-01-05");
        assert_eq!(v["data"]["summary"]["by_importance"]["holidays"], 0);
        assert!(v["data"]["events_by_date"].as_object().unwrap().is_empty());
    }
}
