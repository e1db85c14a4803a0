// 🧹 Cleaner - RawTable → CanonicalTable
//
// Fixed sequence: rename → drop exact duplicates → normalize sentinels →
// coerce types → resolve missing values → final duplicate pass.
//
// Malformed cells never raise. They become `Value::Missing` and are counted
// in the report. Running the cleaner on its own output changes nothing.

use crate::error::{PipelineError, Result};
use crate::schema::{CleaningSpec, FillStrategy, MissingPolicy};
use crate::stats;
use crate::table::{CanonicalTable, RawTable, Table, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Tokens treated as "no value" (compared trimmed, case-insensitive)
pub const MISSING_SENTINELS: &[&str] = &["", "..", "n/a", "na", "#n/a", "nan", "null", "none"];

// ============================================================================
// CLEANING REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub dataset: String,
    pub rows_in: usize,
    pub rows_out: usize,
    /// (source header, canonical name) for every header that changed
    pub renamed: Vec<(String, String)>,
    pub duplicates_removed: usize,
    pub sentinels_replaced: usize,
    /// Cells that were present but failed numeric/integer parsing
    pub coerced_to_missing: usize,
    /// Missing cells per numeric column before resolution
    pub missing_before: Vec<(String, usize)>,
    /// Rows dropped because a core column was missing
    pub rows_dropped: usize,
    /// Rows dropped because every numeric column was missing
    pub empty_rows_dropped: usize,
    /// Value used to fill each numeric column
    pub fill_values: Vec<(String, f64)>,
    /// Designated numeric columns the table does not carry
    pub missing_columns: Vec<String>,
    pub warnings: Vec<String>,
}

impl CleaningReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} → {} rows | {} duplicates, {} sentinels, {} unparseable, {} dropped, {} filled columns, {} warnings",
            self.dataset,
            self.rows_in,
            self.rows_out,
            self.duplicates_removed,
            self.sentinels_replaced,
            self.coerced_to_missing,
            self.rows_dropped + self.empty_rows_dropped,
            self.fill_values.len(),
            self.warnings.len()
        )
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Output of a cleaning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cleaned {
    pub table: CanonicalTable,
    pub report: CleaningReport,
}

impl Cleaned {
    /// Fail with `EmptyResult` if cleaning left nothing to analyse
    pub fn ensure_rows(&self) -> Result<&CanonicalTable> {
        if self.table.is_empty() {
            return Err(PipelineError::EmptyResult {
                dataset: self.report.dataset.clone(),
                stage: "cleaning".to_string(),
            });
        }
        Ok(&self.table)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Clean a raw (or already cleaned) table according to `spec`
pub fn clean(raw: &RawTable, spec: &CleaningSpec) -> Cleaned {
    let mut report = CleaningReport {
        dataset: spec.dataset.clone(),
        rows_in: raw.len(),
        ..Default::default()
    };

    let mut table = rename_columns(raw, spec, &mut report);
    report.duplicates_removed += remove_duplicates(&mut table);
    report.sentinels_replaced = replace_sentinels(&mut table);

    let numeric: Vec<usize> = spec
        .numeric_columns
        .iter()
        .filter_map(|name| match table.column_index(name) {
            Some(idx) => Some(idx),
            None => {
                report.missing_columns.push(name.clone());
                None
            }
        })
        .collect();

    for &idx in &numeric {
        report.coerced_to_missing += coerce_column(&mut table, idx, coerce_float);
    }
    if let Some(idx) = spec.time_column.as_deref().and_then(|t| table.column_index(t)) {
        report.coerced_to_missing += coerce_column(&mut table, idx, coerce_integer);
    }

    report.missing_before = numeric
        .iter()
        .map(|&idx| {
            let name = table.columns[idx].clone();
            let count = table.rows.iter().filter(|r| r[idx].is_missing()).count();
            (name, count)
        })
        .collect();

    match spec.policy {
        MissingPolicy::DropMissing => {
            let core: Vec<usize> = spec
                .core_columns
                .iter()
                .filter_map(|name| table.column_index(name))
                .collect();
            report.rows_dropped =
                table.retain_rows(|row| core.iter().all(|&i| !row[i].is_missing()));
        }
        MissingPolicy::Fill(strategy) => {
            if !numeric.is_empty() {
                report.empty_rows_dropped =
                    table.retain_rows(|row| numeric.iter().any(|&i| !row[i].is_missing()));
            }
            for &idx in &numeric {
                fill_column(&mut table, idx, strategy, &mut report);
            }
        }
    }

    // Filling can make two rows identical
    report.duplicates_removed += remove_duplicates(&mut table);
    report.rows_out = table.len();

    for warning in &report.warnings {
        warn!(dataset = %spec.dataset, "{}", warning);
    }
    info!("🧹 {}", report.summary());

    Cleaned { table, report }
}

fn rename_columns(raw: &RawTable, spec: &CleaningSpec, report: &mut CleaningReport) -> Table {
    let columns = raw
        .columns
        .iter()
        .map(|header| match spec.mapping.canonical_for(header) {
            Some(canonical) => {
                if canonical != header {
                    report.renamed.push((header.clone(), canonical.to_string()));
                }
                canonical.to_string()
            }
            None => header.clone(),
        })
        .collect();

    Table {
        columns,
        rows: raw.rows.clone(),
    }
}

/// Keep the first occurrence of each full row, preserving order
fn remove_duplicates(table: &mut Table) -> usize {
    let mut seen = HashSet::new();
    let removed = table.retain_rows(|row| seen.insert(Table::row_fingerprint(row)));
    if removed > 0 {
        debug!(removed, "removed duplicate rows");
    }
    removed
}

pub fn is_missing_sentinel(raw: &str) -> bool {
    let token = raw.trim().to_lowercase();
    MISSING_SENTINELS.contains(&token.as_str())
}

fn replace_sentinels(table: &mut Table) -> usize {
    let mut replaced = 0;
    for cell in table.rows.iter_mut().flat_map(|row| row.iter_mut()) {
        if let Value::Text(s) = cell {
            if is_missing_sentinel(s) {
                *cell = Value::Missing;
                replaced += 1;
            }
        }
    }
    replaced
}

/// Apply a coercion to one column, returning how many cells became missing
fn coerce_column(table: &mut Table, idx: usize, coerce: fn(&Value) -> Value) -> usize {
    let mut lost = 0;
    for row in table.rows.iter_mut() {
        let cell = &mut row[idx];
        let was_missing = cell.is_missing();
        *cell = coerce(cell);
        if !was_missing && cell.is_missing() {
            lost += 1;
        }
    }
    lost
}

fn coerce_float(value: &Value) -> Value {
    let parsed = match value {
        Value::Number(v) => Some(*v),
        Value::Integer(v) => Some(*v as f64),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Missing => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Value::Number(v),
        _ => Value::Missing,
    }
}

fn coerce_integer(value: &Value) -> Value {
    let as_whole = |v: f64| {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Value::Integer(v as i64)
        } else {
            Value::Missing
        }
    };

    match value {
        Value::Integer(v) => Value::Integer(*v),
        Value::Number(v) => as_whole(*v),
        Value::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => Value::Integer(v),
                Err(_) => s.parse::<f64>().map(as_whole).unwrap_or(Value::Missing),
            }
        }
        Value::Missing => Value::Missing,
    }
}

fn fill_column(table: &mut Table, idx: usize, strategy: FillStrategy, report: &mut CleaningReport) {
    let name = table.columns[idx].clone();
    let present: Vec<f64> = table.rows.iter().filter_map(|r| r[idx].as_f64()).collect();

    if present.len() == table.len() {
        return;
    }

    let fill = match strategy {
        FillStrategy::Mean => stats::mean(&present),
        FillStrategy::Median => stats::median(&present),
    };

    let Some(fill) = fill else {
        report.warnings.push(format!(
            "column '{}' has no values; {:?} fill undefined, left missing",
            name, strategy
        ));
        return;
    };

    for row in table.rows.iter_mut() {
        if row[idx].is_missing() {
            row[idx] = Value::Number(fill);
        }
    }
    report.fill_values.push((name, fill));
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnMapping, DatasetSchema, GINI_INDEX, INTERNET_USERS, YEAR};

    fn raw(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        Table::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| Value::text(*c)).collect())
                .collect(),
        )
    }

    fn spec(policy: MissingPolicy) -> CleaningSpec {
        CleaningSpec {
            dataset: "test".to_string(),
            mapping: ColumnMapping::new([("Time", "Year"), ("Gini index [SI.POV.GINI]", "Gini Index")]),
            time_column: Some("Year".to_string()),
            numeric_columns: vec!["Gini Index".to_string(), "Enrollment".to_string()],
            core_columns: vec!["Year".to_string(), "Gini Index".to_string()],
            policy,
        }
    }

    #[test]
    fn test_rename_and_passthrough() {
        let table = raw(&["Time", "Time Code", "Gini index [SI.POV.GINI]"], &[&["2000", "YR2000", "57.8"]]);
        let cleaned = clean(&table, &spec(MissingPolicy::DropMissing));

        assert_eq!(cleaned.table.columns, vec!["Year", "Time Code", "Gini Index"]);
        assert_eq!(cleaned.report.renamed.len(), 2);
        assert_eq!(cleaned.report.missing_columns, vec!["Enrollment"]);
        assert_eq!(cleaned.table.rows[0][0], Value::Integer(2000));
        assert_eq!(cleaned.table.rows[0][1], Value::text("YR2000"));
        assert_eq!(cleaned.table.rows[0][2], Value::Number(57.8));
    }

    #[test]
    fn test_duplicates_keep_first_in_order() {
        let table = raw(
            &["Time", "Gini Index"],
            &[&["2001", "1"], &["2000", "2"], &["2001", "1"], &["2002", "3"], &["2000", "2"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::DropMissing));

        let years: Vec<_> = cleaned.table.rows.iter().map(|r| r[0].as_i64().unwrap()).collect();
        assert_eq!(years, vec![2001, 2000, 2002]);
        assert_eq!(cleaned.report.duplicates_removed, 2);
    }

    #[test]
    fn test_sentinels_and_bad_numbers_become_missing() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[
                &["2000", "..", "N/A"],
                &["2001", "abc", ""],
                &["2002", "inf", " 61.5 "],
            ],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Mean)));

        assert_eq!(cleaned.report.sentinels_replaced, 3);
        // "abc" and "inf" fail numeric coercion
        assert_eq!(cleaned.report.coerced_to_missing, 2);
        assert_eq!(
            cleaned.report.missing_before,
            vec![("Gini Index".to_string(), 3), ("Enrollment".to_string(), 2)]
        );
    }

    #[test]
    fn test_drop_policy_removes_rows_missing_core() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[
                &["2000", "57.8", ""],
                &["2001", "..", "80"],
                &["YR2002", "58.1", "81"],
                &["2003", "58.4", "82"],
            ],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::DropMissing));

        assert_eq!(cleaned.table.len(), 2);
        assert_eq!(cleaned.report.rows_dropped, 2);
        // Non-core column stays missing
        assert!(cleaned.table.rows[0][2].is_missing());
        for row in &cleaned.table.rows {
            assert!(!row[0].is_missing() && !row[1].is_missing());
        }
    }

    #[test]
    fn test_mean_fill_uses_remaining_values_exactly() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[&["2000", "57.8", "1"], &["2001", "..", "2"], &["2002", "63.0", "3"], &["2003", "59.5", "4"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Mean)));

        let expected = (57.8 + 63.0 + 59.5) / 3.0;
        assert_eq!(cleaned.table.rows[1][1], Value::Number(expected));
        assert_eq!(cleaned.report.fill_values, vec![("Gini Index".to_string(), expected)]);
    }

    #[test]
    fn test_median_fill() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[&["2000", "1", "5"], &["2001", "", "5"], &["2002", "10", "5"], &["2003", "2", "6"], &["2004", "3", "7"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Median)));
        assert_eq!(cleaned.table.rows[1][1], Value::Number(2.5));
    }

    #[test]
    fn test_entirely_missing_column_warns_and_stays_missing() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[&["2000", "..", "80"], &["2001", "..", "81"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Mean)));

        assert!(cleaned.report.has_warnings());
        assert!(cleaned.report.warnings[0].contains("Gini Index"));
        assert_eq!(cleaned.table.missing_count("Gini Index"), 2);
        assert!(cleaned.report.fill_values.iter().all(|(c, _)| c != "Gini Index"));
    }

    #[test]
    fn test_fill_drops_rows_without_any_observation() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[&["2000", "57.8", "80"], &["Data from database: World Development Indicators"], &["Last Updated: 07/01/2025"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Mean)));

        assert_eq!(cleaned.table.len(), 1);
        assert_eq!(cleaned.report.empty_rows_dropped, 2);
    }

    #[test]
    fn test_fill_that_creates_duplicates_is_deduplicated() {
        let table = raw(
            &["Time", "Gini Index", "Enrollment"],
            &[&["2000", "5", "1"], &["2000", "", "1"]],
        );
        let cleaned = clean(&table, &spec(MissingPolicy::Fill(FillStrategy::Mean)));
        assert_eq!(cleaned.table.len(), 1);
        assert_eq!(cleaned.report.duplicates_removed, 1);
    }

    #[test]
    fn test_year_coercion() {
        assert_eq!(coerce_integer(&Value::text("1998")), Value::Integer(1998));
        assert_eq!(coerce_integer(&Value::text("1998.0")), Value::Integer(1998));
        assert_eq!(coerce_integer(&Value::text("1998.5")), Value::Missing);
        assert_eq!(coerce_integer(&Value::text("YR1998")), Value::Missing);
        assert_eq!(coerce_integer(&Value::Number(2001.0)), Value::Integer(2001));
    }

    #[test]
    fn test_clean_is_idempotent_for_both_policies() {
        let table = raw(
            &["Time", "Time Code", "Gini index [SI.POV.GINI]", "Enrollment"],
            &[
                &["2000", "YR2000", "57.8", ".."],
                &["2001", "YR2001", "..", "81.2"],
                &["2001", "YR2001", "..", "81.2"],
                &["bad", "YR2002", "58.0", "80.0"],
                &["2003", "YR2003", "x", ""],
                &["2004", "YR2004", "", ""],
            ],
        );

        for policy in [
            MissingPolicy::DropMissing,
            MissingPolicy::Fill(FillStrategy::Mean),
            MissingPolicy::Fill(FillStrategy::Median),
        ] {
            let spec = spec(policy);
            let once = clean(&table, &spec);
            let twice = clean(&once.table, &spec);
            assert_eq!(once.table, twice.table, "policy {policy}");
        }
    }

    #[test]
    fn test_real_schema_trends() {
        let schema = DatasetSchema::trends();
        let table = raw(
            &[
                "Time",
                "Time Code",
                "Country Name",
                "Country Code",
                "Urban population (% of total population) [SP.URB.TOTL.IN.ZS]",
                "Unemployment, total (% of total labor force) (national estimate) [SL.UEM.TOTL.NE.ZS]",
                "Individuals using the Internet (% of population) [IT.NET.USER.ZS]",
            ],
            &[
                &["1990", "YR1990", "South Africa", "ZAF", "52.0", "..", ".."],
                &["2000", "YR2000", "South Africa", "ZAF", "56.9", "29.9", "5.3"],
                &["2021", "YR2021", "South Africa", "ZAF", "67.8", "34.0", "75.0"],
            ],
        );

        let cleaned = clean(&table, &schema.cleaning);
        assert_eq!(cleaned.table.len(), 2);
        assert!(cleaned.table.has_column(YEAR));
        assert_eq!(cleaned.table.present_values(INTERNET_USERS), vec![5.3, 75.0]);
        assert!(cleaned.ensure_rows().is_ok());
        assert!(!cleaned.table.has_column(GINI_INDEX));
    }

    #[test]
    fn test_empty_result_is_reported() {
        let table = raw(&["Time", "Gini Index"], &[&["2000", ".."]]);
        let cleaned = clean(&table, &spec(MissingPolicy::DropMissing));
        assert!(matches!(
            cleaned.ensure_rows(),
            Err(PipelineError::EmptyResult { .. })
        ));
    }
}
