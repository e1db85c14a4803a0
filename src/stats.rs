// 📊 Aggregator - descriptive statistics, correlation and decade summaries
//
// All views here are derived from a CanonicalTable on demand and never
// stored. Missing cells are skipped per column (per pair for correlation).

use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// PRIMITIVES
// ============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Population standard deviation (denominator N)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Linear-interpolation quantile: position q·(n−1) between the two nearest
/// order statistics
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Pearson correlation over paired observations; NaN when undefined
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let (Some(mx), Some(my)) = (mean(xs), mean(ys)) else {
        return f64::NAN;
    };

    let mut cov = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (cov / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// ============================================================================
// SUMMARY STATS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    /// Non-missing observations
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub columns: Vec<String>,
    pub stats: Vec<ColumnStats>,
    /// Row/column order matches `columns`
    pub correlation: Vec<Vec<f64>>,
}

impl SummaryStats {
    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.stats.iter().find(|s| s.column == name)
    }

    pub fn correlation_between(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.correlation[i][j])
    }
}

/// Mean, population std-dev and pairwise Pearson matrix for `columns`
pub fn summarize(table: &Table, columns: &[&str]) -> Result<SummaryStats> {
    if table.is_empty() {
        return Err(PipelineError::EmptyResult {
            dataset: "table".to_string(),
            stage: "summary".to_string(),
        });
    }

    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|name| {
            table
                .numeric_column(name)
                .ok_or_else(|| PipelineError::UnknownColumn {
                    table: "canonical".to_string(),
                    column: name.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    let stats = columns
        .iter()
        .zip(&series)
        .map(|(name, col)| {
            let present: Vec<f64> = col.iter().flatten().copied().collect();
            ColumnStats {
                column: name.to_string(),
                count: present.len(),
                mean: mean(&present).unwrap_or(f64::NAN),
                std_dev: std_dev(&present).unwrap_or(f64::NAN),
                min: present.iter().copied().reduce(f64::min).unwrap_or(f64::NAN),
                max: present.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
            }
        })
        .collect();

    let k = columns.len();
    let mut correlation = vec![vec![f64::NAN; k]; k];
    for i in 0..k {
        for j in i..k {
            let (xs, ys): (Vec<f64>, Vec<f64>) = series[i]
                .iter()
                .zip(&series[j])
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .unzip();
            let r = pearson(&xs, &ys);
            let r = if i == j && !r.is_nan() { 1.0 } else { r };
            correlation[i][j] = r;
            correlation[j][i] = r;
        }
    }

    Ok(SummaryStats {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        stats,
        correlation,
    })
}

// ============================================================================
// DECADE AGGREGATION
// ============================================================================

pub fn decade_of(year: i64) -> i64 {
    year.div_euclid(10) * 10
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeRow {
    pub decade: i64,
    pub rows: usize,
    /// Mean per value column, rounded to 2 places; None if no observations
    pub averages: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeAggregate {
    pub time_column: String,
    pub value_columns: Vec<String>,
    pub rows: Vec<DecadeRow>,
    /// Rows ignored because the time value was missing
    pub skipped_rows: usize,
}

impl DecadeAggregate {
    pub fn row(&self, decade: i64) -> Option<&DecadeRow> {
        self.rows.iter().find(|r| r.decade == decade)
    }

    /// Tabular view: `decade`, then `avg_<column>` per value column
    pub fn to_table(&self) -> Table {
        let mut columns = vec!["decade".to_string()];
        columns.extend(
            self.value_columns
                .iter()
                .map(|c| format!("avg_{}", snake_case(c))),
        );

        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = vec![Value::Integer(r.decade)];
                row.extend(
                    r.averages
                        .iter()
                        .map(|a| a.map(Value::Number).unwrap_or(Value::Missing)),
                );
                row
            })
            .collect();

        Table::from_rows(columns, rows)
    }
}

/// Group rows by `floor(year/10)*10` and average each value column
pub fn aggregate_by_decade(
    table: &Table,
    time_column: &str,
    value_columns: &[&str],
) -> Result<DecadeAggregate> {
    let unknown = |column: &str| PipelineError::UnknownColumn {
        table: "canonical".to_string(),
        column: column.to_string(),
    };

    let time_idx = table
        .column_index(time_column)
        .ok_or_else(|| unknown(time_column))?;
    let value_idx: Vec<usize> = value_columns
        .iter()
        .map(|c| table.column_index(c).ok_or_else(|| unknown(c)))
        .collect::<Result<_>>()?;

    let mut groups: BTreeMap<i64, Vec<&Vec<Value>>> = BTreeMap::new();
    let mut skipped_rows = 0;
    for row in &table.rows {
        match row[time_idx].as_i64() {
            Some(year) => groups.entry(decade_of(year)).or_default().push(row),
            None => skipped_rows += 1,
        }
    }

    let rows = groups
        .into_iter()
        .map(|(decade, members)| DecadeRow {
            decade,
            rows: members.len(),
            averages: value_idx
                .iter()
                .map(|&i| {
                    let present: Vec<f64> = members.iter().filter_map(|r| r[i].as_f64()).collect();
                    mean(&present).map(|m| round_to(m, 2))
                })
                .collect(),
        })
        .collect();

    Ok(DecadeAggregate {
        time_column: time_column.to_string(),
        value_columns: value_columns.iter().map(|c| c.to_string()).collect(),
        rows,
        skipped_rows,
    })
}

pub fn snake_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

// ============================================================================
// TESTS
// ============================================================================
