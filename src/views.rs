// 📊 Presenter data - the numbers behind each dashboard panel
//
// Everything here reads a cleaned table and returns plain serializable
// structs. Rendering (terminal charts, JSON) happens in the binaries.

use crate::error::{PipelineError, Result};
use crate::stats;
use crate::table::{CanonicalTable, Table};
use serde::Serialize;

/// Bin count used when a caller does not ask for one
pub const DEFAULT_HISTOGRAM_BINS: usize = 15;

/// Upper bound on requested bins; the count arrives from API query strings
pub const MAX_HISTOGRAM_BINS: usize = 1000;

const VIEW_TABLE: &str = "cleaned table";

fn unknown(column: &str) -> PipelineError {
    PipelineError::UnknownColumn {
        table: VIEW_TABLE.to_string(),
        column: column.to_string(),
    }
}

fn years(table: &Table, time_column: &str) -> Result<Vec<Option<i64>>> {
    let idx = table.column_index(time_column).ok_or_else(|| unknown(time_column))?;
    Ok(table.rows.iter().map(|row| row[idx].as_i64()).collect())
}

// ============================================================================
// YEAR RANGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearRange {
    pub start: i64,
    pub end: i64,
}

impl YearRange {
    pub fn new(start: i64, end: i64) -> Self {
        if start <= end {
            YearRange { start, end }
        } else {
            YearRange { start: end, end: start }
        }
    }

    /// Full span of years present in the table
    pub fn of(table: &Table, time_column: &str) -> Option<YearRange> {
        let years: Vec<i64> = years(table, time_column).ok()?.into_iter().flatten().collect();
        let start = *years.iter().min()?;
        let end = *years.iter().max()?;
        Some(YearRange { start, end })
    }

    pub fn contains(&self, year: i64) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

/// Rows whose year falls inside `range` (inclusive); rows without a year drop out
pub fn filter_years(table: &CanonicalTable, time_column: &str, range: YearRange) -> Result<CanonicalTable> {
    let idx = table.column_index(time_column).ok_or_else(|| unknown(time_column))?;
    let mut filtered = table.clone();
    filtered.retain_rows(|row| row[idx].as_i64().is_some_and(|y| range.contains(y)));
    Ok(filtered)
}

// ============================================================================
// KPIs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub column: String,
    pub year: i64,
    pub value: f64,
}

/// Most recent non-missing value of each column
pub fn latest_kpis(table: &CanonicalTable, time_column: &str, columns: &[&str]) -> Result<Vec<Kpi>> {
    let years = years(table, time_column)?;

    columns
        .iter()
        .filter(|c| table.has_column(c))
        .map(|column| {
            let values = table.numeric_column(column).ok_or_else(|| unknown(column))?;
            let latest = years
                .iter()
                .zip(values)
                .filter_map(|(year, value)| Some(((*year)?, value?)))
                .max_by_key(|(year, _)| *year);
            Ok(latest.map(|(year, value)| Kpi {
                column: column.to_string(),
                year,
                value,
            }))
        })
        .filter_map(|kpi| kpi.transpose())
        .collect()
}

// ============================================================================
// HISTOGRAM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<Bin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Equal-width bins over the column's range. The last bin is closed on the
/// right so the maximum is counted. A constant column yields a single bin.
pub fn histogram(table: &CanonicalTable, column: &str, bins: usize) -> Result<Histogram> {
    if !table.has_column(column) {
        return Err(unknown(column));
    }
    if bins > MAX_HISTOGRAM_BINS {
        return Err(PipelineError::InvalidArgument {
            name: "bin count".to_string(),
            reason: format!("{} exceeds the maximum of {}", bins, MAX_HISTOGRAM_BINS),
        });
    }
    let values = table.present_values(column);
    let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Err(PipelineError::EmptyResult {
            dataset: column.to_string(),
            stage: "histogram".to_string(),
        });
    };

    if min == max || bins <= 1 {
        return Ok(Histogram {
            column: column.to_string(),
            bins: vec![Bin {
                lower: min,
                upper: max,
                count: values.len(),
            }],
        });
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in &values {
        let slot = (((v - min) / width) as usize).min(bins - 1);
        counts[slot] += 1;
    }

    Ok(Histogram {
        column: column.to_string(),
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| Bin {
                lower: min + width * i as f64,
                upper: if i == bins - 1 { max } else { min + width * (i + 1) as f64 },
                count,
            })
            .collect(),
    })
}

// ============================================================================
// BOX PLOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub column: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl BoxSummary {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

pub fn box_summary(table: &CanonicalTable, column: &str) -> Result<BoxSummary> {
    if !table.has_column(column) {
        return Err(unknown(column));
    }
    let values = table.present_values(column);
    let empty = || PipelineError::EmptyResult {
        dataset: column.to_string(),
        stage: "box summary".to_string(),
    };

    Ok(BoxSummary {
        column: column.to_string(),
        count: values.len(),
        min: stats::quantile(&values, 0.0).ok_or_else(empty)?,
        q1: stats::quantile(&values, 0.25).ok_or_else(empty)?,
        median: stats::quantile(&values, 0.5).ok_or_else(empty)?,
        q3: stats::quantile(&values, 0.75).ok_or_else(empty)?,
        max: stats::quantile(&values, 1.0).ok_or_else(empty)?,
    })
}

// ============================================================================
// SERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub column: String,
    /// (year, value), ascending by year
    pub points: Vec<(i64, f64)>,
}

/// One line per column for year-on-year charts
pub fn trend_series(table: &CanonicalTable, time_column: &str, columns: &[&str]) -> Result<Vec<TrendSeries>> {
    let years = years(table, time_column)?;

    columns
        .iter()
        .map(|column| {
            let values = table.numeric_column(column).ok_or_else(|| unknown(column))?;
            let mut points: Vec<(i64, f64)> = years
                .iter()
                .zip(values)
                .filter_map(|(year, value)| Some(((*year)?, value?)))
                .collect();
            points.sort_by_key(|(year, _)| *year);
            Ok(TrendSeries {
                column: column.to_string(),
                points,
            })
        })
        .collect()
}

/// Pairwise-complete (x, y) points for a scatter chart
pub fn scatter_points(table: &CanonicalTable, x: &str, y: &str) -> Result<Vec<(f64, f64)>> {
    let xs = table.numeric_column(x).ok_or_else(|| unknown(x))?;
    let ys = table.numeric_column(y).ok_or_else(|| unknown(y))?;
    Ok(xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table() -> Table {
        Table::from_rows(
            vec!["Year".to_string(), "Internet Users".to_string(), "Unemployment Rate".to_string()],
            vec![
                vec![Value::Integer(2001), Value::Number(6.0), Value::Number(29.0)],
                vec![Value::Integer(1999), Value::Number(5.0), Value::Number(25.0)],
                vec![Value::Integer(2000), Value::Number(5.5), Value::Missing],
                vec![Value::Missing, Value::Number(99.0), Value::Number(1.0)],
            ],
        )
    }

    #[test]
    fn test_year_range_and_filter() {
        let t = table();
        assert_eq!(YearRange::of(&t, "Year"), Some(YearRange::new(1999, 2001)));
        assert_eq!(YearRange::new(2005, 2000), YearRange::new(2000, 2005));

        let filtered = filter_years(&t, "Year", YearRange::new(2000, 2001)).unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filter_years(&t, "Time", YearRange::new(2000, 2001)).is_err());
    }

    #[test]
    fn test_latest_kpis_skip_missing_values() {
        let kpis = latest_kpis(&table(), "Year", &["Internet Users", "Unemployment Rate", "Gini Index"]).unwrap();
        assert_eq!(kpis.len(), 2);
        assert_eq!(kpis[0], Kpi { column: "Internet Users".to_string(), year: 2001, value: 6.0 });
        assert_eq!(kpis[1].year, 2001);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let t = Table::from_rows(
            vec!["v".to_string()],
            (0..=30).map(|i| vec![Value::Number(i as f64)]).collect(),
        );
        let hist = histogram(&t, "v", DEFAULT_HISTOGRAM_BINS).unwrap();

        assert_eq!(hist.bins.len(), 15);
        assert_eq!(hist.total(), 31);
        assert_eq!(hist.bins[0].lower, 0.0);
        assert_eq!(hist.bins[14].upper, 30.0);
        // 28, 29, 30 land in the closed last bin
        assert_eq!(hist.bins[14].count, 3);
    }

    #[test]
    fn test_histogram_constant_and_empty_columns() {
        let t = Table::from_rows(
            vec!["v".to_string(), "w".to_string()],
            vec![vec![Value::Number(4.0)], vec![Value::Number(4.0)]],
        );
        let hist = histogram(&t, "v", 15).unwrap();
        assert_eq!(hist.bins.len(), 1);
        assert_eq!(hist.bins[0].count, 2);

        assert!(matches!(histogram(&t, "w", 15), Err(PipelineError::EmptyResult { .. })));
        assert!(matches!(histogram(&t, "x", 15), Err(PipelineError::UnknownColumn { .. })));
    }

    #[test]
    fn test_histogram_rejects_oversized_bin_counts() {
        let t = Table::from_rows(
            vec!["v".to_string()],
            vec![vec![Value::Number(1.0)], vec![Value::Number(2.0)]],
        );
        assert!(matches!(
            histogram(&t, "v", usize::MAX),
            Err(PipelineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            histogram(&t, "v", MAX_HISTOGRAM_BINS + 1),
            Err(PipelineError::InvalidArgument { .. })
        ));
        assert_eq!(histogram(&t, "v", MAX_HISTOGRAM_BINS).unwrap().bins.len(), MAX_HISTOGRAM_BINS);
    }

    #[test]
    fn test_box_summary_uses_linear_quantiles() {
        let t = Table::from_rows(
            vec!["v".to_string()],
            [10.0, 20.0, 30.0, 40.0].iter().map(|v| vec![Value::Number(*v)]).collect(),
        );
        let summary = box_summary(&t, "v").unwrap();
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.q1, 17.5);
        assert_eq!(summary.median, 25.0);
        assert_eq!(summary.q3, 32.5);
        assert_eq!(summary.max, 40.0);
        assert_eq!(summary.iqr(), 15.0);
    }

    #[test]
    fn test_trend_series_sorted_by_year() {
        let series = trend_series(&table(), "Year", &["Internet Users"]).unwrap();
        assert_eq!(series[0].points, vec![(1999, 5.0), (2000, 5.5), (2001, 6.0)]);

        let points = scatter_points(&table(), "Internet Users", "Unemployment Rate").unwrap();
        assert_eq!(points.len(), 3);
    }
}
