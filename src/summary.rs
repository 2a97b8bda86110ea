//! Summary statistics over a `DayBucket`. Pure, no I/O.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::DayBucket;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportanceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub holidays: usize,
}

impl ImportanceCounts {
    pub fn sum(&self) -> usize {
        self.high + self.medium + self.low + self.holidays
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub by_importance: ImportanceCounts,
    /// Distinct non-empty currency codes, sorted.
    pub currencies: Vec<String>,
}

/// Count events per importance tier and collect the currency set.
///
/// Importance outside 0..=3 never reaches here; the extractor and the JSON
/// ingest path both filter such records out.
pub fn summarize(bucket: &DayBucket) -> Summary {
    let mut counts = ImportanceCounts::default();
    let mut currencies = BTreeSet::new();
    let mut total = 0usize;

    for ev in bucket.events() {
        total += 1;
        match ev.importance {
            3 => counts.high += 1,
            2 => counts.medium += 1,
            1 => counts.low += 1,
            0 => counts.holidays += 1,
            other => debug_assert!(false, "importance out of range: {other}"),
        }
        if !ev.currency.is_empty() {
            currencies.insert(ev.currency.clone());
        }
    }

    Summary {
        total,
        by_importance: counts,
        currencies: currencies.into_iter().collect(),
    }
}
