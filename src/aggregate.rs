// Alert aggregation - pure filtering and grouping over store snapshots
//
// No side effects anywhere in this module; everything is safe to recompute on
// every view refresh.

use std::collections::HashMap;

use crate::record::{Category, Record, Severity};

/// Active filter selections. `None` means "All".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub severity: Option<Severity>,
    pub disease: Option<String>,
}

impl Filters {
    /// Conjunctive match: both selections must pass.
    pub fn matches(&self, record: &Record) -> bool {
        let severity_ok = self.severity.map_or(true, |s| record.severity == s);
        let disease_ok = self
            .disease
            .as_deref()
            .map_or(true, |d| record.disease == d);
        severity_ok && disease_ok
    }
}

/// Filter a snapshot down to the records matching the current selections.
/// Idempotent: filtering an already-filtered set with the same filters
/// returns the same set.
pub fn filter_records<'a>(records: &'a [Record], filters: &Filters) -> Vec<&'a Record> {
    records.iter().filter(|r| filters.matches(r)).collect()
}

/// Group a snapshot by source category, preserving order within each group.
pub fn group_by_category(records: &[Record]) -> HashMap<Category, Vec<&Record>> {
    let mut groups: HashMap<Category, Vec<&Record>> = HashMap::new();
    for record in records {
        groups.entry(record.category).or_default().push(record);
    }
    groups
}

/// Filter option lists derived from what is actually present, so the UI only
/// offers selections that can match something. "All" is implicit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    pub severities: Vec<Severity>,
    pub diseases: Vec<String>,
}

/// Distinct option lists for one category tab, or across all categories when
/// `category` is `None`. First-seen order, matching the snapshot.
pub fn filter_options(records: &[Record], category: Option<Category>) -> FilterOptions {
    let mut options = FilterOptions::default();
    for record in records {
        if let Some(c) = category {
            if record.category != c {
                continue;
            }
        }
        if !options.severities.contains(&record.severity) {
            options.severities.push(record.severity);
        }
        if !options.diseases.iter().any(|d| *d == record.disease) {
            options.diseases.push(record.disease.clone());
        }
    }
    options
}
