// tests/extract_fixture.rs
use econ_calendar_proxy::{extract, summarize};

const FRAGMENT: &str = include_str!("fixtures/calendar_fragment.html");

#[test]
fn fixture_days_follow_markup_order() {
    let b = extract(FRAGMENT);
    assert_eq!(
        b.dates().collect::<Vec<_>>(),
        vec![
            "Monday, January 5, 2026",
            "Tuesday, January 6, 2026",
            "Wednesday, January 7, 2026",
        ]
    );
    // Trailing header with only a truncated row after it keeps an empty bucket.
    assert_eq!(b.get("Wednesday, January 7, 2026").unwrap().len(), 0);
}

#[test]
fn fixture_drops_orphans_and_unnamed_rows() {
    let b = extract(FRAGMENT);
    let ids: Vec<_> = b.events().filter_map(|e| e.id.as_deref()).collect();
    assert_eq!(ids, vec!["500123", "523111", "523200", "523300"]);
}

#[test]
fn fixture_event_fields() {
    let b = extract(FRAGMENT);
    let monday = b.get("Monday, January 5, 2026").unwrap();

    let holiday = &monday[0];
    assert!(holiday.is_holiday);
    assert_eq!(holiday.importance, 0);
    assert_eq!(holiday.currency, "JPY");
    assert_eq!(holiday.event_name, "Japan - Bank Holiday");
    assert_eq!(holiday.time, "All Day");

    let pmi = &monday[1];
    assert_eq!(pmi.time, "09:30");
    assert_eq!(pmi.currency, "GBP");
    assert_eq!(pmi.importance, 2);
    assert_eq!(pmi.event_name, "S&P Global Composite PMI (Dec)");
    assert_eq!(
        (pmi.actual.as_str(), pmi.forecast.as_str(), pmi.previous.as_str()),
        ("51.4", "52.1", "51.2")
    );

    let ism = &monday[2];
    assert_eq!(ism.importance, 3);
    assert_eq!(ism.actual, "", "&nbsp;-only cell must become empty");
    assert_eq!(ism.forecast, "48.3");

    let tuesday = b.get("Tuesday, January 6, 2026").unwrap();
    assert_eq!(tuesday[0].importance, 1);
    assert_eq!(tuesday[0].currency, "EUR");
    assert_eq!(tuesday[0].event_name, "German Buba President Nagel Speaks");
}

#[test]
fn fixture_invariants_and_summary() {
    let b = extract(FRAGMENT);
    for ev in b.events() {
        assert!(!ev.event_name.is_empty());
        assert_eq!(ev.is_holiday, ev.importance == 0, "holiday <=> importance 0: {ev:?}");
    }

    let s = summarize(&b);
    assert_eq!(s.total, 4);
    assert_eq!(s.by_importance.high, 1);
    assert_eq!(s.by_importance.medium, 1);
    assert_eq!(s.by_importance.low, 1);
    assert_eq!(s.by_importance.holidays, 1);
    assert_eq!(s.total, s.by_importance.sum());
    assert_eq!(s.currencies, vec!["EUR", "GBP", "JPY", "USD"]);
    assert_eq!(summarize(&b), s);
}

#[test]
fn event_rows_without_any_header_yield_nothing() {
    let only_events: String = FRAGMENT
        .split("<tr")
        .filter(|row| !row.contains("theDay"))
        .map(|row| format!("<tr{row}"))
        .collect();
    assert!(extract(&only_events).is_empty());
}
