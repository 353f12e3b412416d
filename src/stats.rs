//! Load-balancer statistics parsing.
//!
//! The router's diagnostic port serves a delimited report (one record per
//! frontend/backend/server) that the traffic tests scrape to check how
//! requests were distributed. Parsing is all-or-nothing: a malformed row
//! fails the whole report rather than producing partial results.

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur while parsing a stats report.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The report is not well-formed delimited text (including rows whose
    /// column count disagrees with the rest of the report).
    #[error("malformed stats report: {0}")]
    Malformed(#[from] csv::Error),

    /// A matching row is narrower than the requested field.
    #[error("field index {index} out of range for row with {width} columns")]
    FieldIndex { index: usize, width: usize },
}

/// Extract one field from every server row of a stats report.
///
/// For each data row whose first column contains `row_key` and whose second
/// column does NOT contain `exclude` (used to skip synthetic aggregate rows
/// such as `BACKEND`), the value at `field_index` is collected in row
/// order. The header row never matches a real `row_key`, so it falls out of
/// the filter. An empty result is valid; the caller decides whether zero
/// matches is an error.
pub fn parse_stats(
    report: &str,
    row_key: &str,
    exclude: &str,
    field_index: usize,
) -> Result<Vec<String>, StatsError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(report.as_bytes());

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(first) = record.get(0) else {
            continue;
        };
        if !first.contains(row_key) {
            continue;
        }
        if record.get(1).is_some_and(|second| second.contains(exclude)) {
            continue;
        }
        let value = record.get(field_index).ok_or(StatsError::FieldIndex {
            index: field_index,
            width: record.len(),
        })?;
        values.push(value.to_string());
    }
    Ok(values)
}

/// Acceptance band for a traffic-distribution ratio.
///
/// The bounds are empirical: wide enough to absorb scheduling noise between
/// weighted backends, tight enough to catch gross misconfiguration. Both
/// bounds are strict. Kept configurable rather than derived from a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceBand {
    /// Lower bound (exclusive) on the accepted ratio.
    pub min: f64,
    /// Upper bound (exclusive) on the accepted ratio.
    pub max: f64,
}

impl Default for BalanceBand {
    fn default() -> Self {
        Self { min: 0.2, max: 5.0 }
    }
}

impl BalanceBand {
    /// Whether two observed counters are balanced within this band.
    ///
    /// The ratio is `a / b`; a zero `b` is never balanced.
    pub fn accepts(&self, a: u64, b: u64) -> bool {
        if b == 0 {
            return false;
        }
        let ratio = a as f64 / b as f64;
        ratio > self.min && ratio < self.max
    }
}
