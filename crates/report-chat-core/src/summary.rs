//! Top-N digest of a report table.
//!
//! [`summarize`] groups rows by a categorical key column, sums a numeric
//! measure column per group, and renders the largest groups as a short
//! bulleted list. The digest is prepended to every chat question so the
//! model sees the current data without receiving the whole table.
//!
//! # Ordering
//!
//! Groups are sorted by summed measure, descending. The sort is stable, so
//! groups with equal sums keep the order in which their key first appeared
//! in the table.
//!
//! # Numeric cells
//!
//! Measure cells are parsed as `f64` after trimming. Missing cells and cells
//! that do not parse to a finite number contribute nothing to their group.

use std::collections::HashMap;

use crate::table::ReportTable;

/// Number of groups rendered when no other value is configured.
pub const DEFAULT_TOP_N: usize = 5;

/// Placeholder returned when no report rows are loaded.
pub const EMPTY_TABLE_DIGEST: &str =
    "No report data is loaded yet. Fetch the reports to include their figures.";

/// Which columns the digest groups and sums, and how many groups it keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryColumns {
    pub key: String,
    pub measure: String,
    pub top_n: usize,
}

impl Default for SummaryColumns {
    fn default() -> Self {
        Self {
            key: "cancion".to_string(),
            measure: "streams".to_string(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// A group key and its summed measure.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
}

/// Render the digest for `table`.
///
/// Always returns non-empty text: the ranked list, or a placeholder when the
/// table is empty or lacks the configured columns.
pub fn summarize(table: &ReportTable, columns: &SummaryColumns) -> String {
    if table.is_empty() {
        return EMPTY_TABLE_DIGEST.to_string();
    }

    let Some(groups) = top_groups(table, columns) else {
        return missing_columns_digest(table, columns);
    };

    let mut digest = format!(
        "Top {} {} (by {}):\n",
        columns.top_n, columns.key, columns.measure
    );
    for group in &groups {
        digest.push_str(&format!("- {}: {}\n", group.key, format_total(group.total)));
    }
    digest
}

/// The `top_n` largest groups, or `None` when the key or measure column is
/// absent.
pub fn top_groups(table: &ReportTable, columns: &SummaryColumns) -> Option<Vec<GroupTotal>> {
    let key_index = table.column_index(&columns.key)?;
    let measure_index = table.column_index(&columns.measure)?;

    let mut groups: Vec<GroupTotal> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in table.rows() {
        let key = row[key_index].as_deref().unwrap_or("");
        let value = row[measure_index]
            .as_deref()
            .and_then(|cell| cell.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        let position = *positions.entry(key).or_insert_with(|| {
            groups.push(GroupTotal {
                key: key.to_string(),
                total: 0.0,
            });
            groups.len() - 1
        });
        groups[position].total += value;
    }

    groups.sort_by(|a, b| b.total.total_cmp(&a.total));
    groups.truncate(columns.top_n);
    Some(groups)
}

fn missing_columns_digest(table: &ReportTable, columns: &SummaryColumns) -> String {
    let available = if table.columns().is_empty() {
        "none".to_string()
    } else {
        table.columns().join(", ")
    };
    format!(
        "The report data has no '{}' and '{}' columns to rank (available columns: {}).",
        columns.key, columns.measure, available
    )
}

/// Integral totals print without a fractional part (`13`, not `13.0`).
fn format_total(total: f64) -> String {
    if total.fract() == 0.0 && total.abs() < 1e15 {
        format!("{}", total as i64)
    } else {
        format!("{}", total)
    }
}
