// 💾 Exporter - CSV and spreadsheet output
//
// CSV output is lossless: headers are written verbatim and floats use the
// shortest representation that parses back to the same value.
//
// Spreadsheet highlighting is declared as `FormatRule`s. Every rule is
// resolved against the table the same way (column lookup, threshold
// computation) before it is written, and rules naming an absent column are
// skipped.

use crate::error::{PipelineError, Result};
use crate::stats;
use crate::table::{Table, Value};
use rust_xlsxwriter::{
    Color, ConditionalFormat3ColorScale, ConditionalFormatCell, ConditionalFormatCellRule,
    ConditionalFormatDataBar, Format, Workbook, XlsxError,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const SHEET_NAME: &str = "cleaned";

/// Worksheet limits (rows include the header)
pub const MAX_SHEET_ROWS: usize = 1_048_576;
pub const MAX_SHEET_COLUMNS: usize = 16_384;

// ============================================================================
// FORMAT RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Fill cells above the column's `quantile` with an RGB background
    Threshold { quantile: f64, color: u32 },
    /// Three-color scale relative to the column range
    ColorScale,
    /// In-cell data bar relative to the column range
    DataBar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRule {
    pub column: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl FormatRule {
    pub fn threshold(column: &str, quantile: f64, color: u32) -> Self {
        FormatRule {
            column: column.to_string(),
            kind: RuleKind::Threshold { quantile, color },
        }
    }

    pub fn color_scale(column: &str) -> Self {
        FormatRule {
            column: column.to_string(),
            kind: RuleKind::ColorScale,
        }
    }

    pub fn data_bar(column: &str) -> Self {
        FormatRule {
            column: column.to_string(),
            kind: RuleKind::DataBar,
        }
    }
}

/// A rule bound to a concrete table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRule {
    pub rule: FormatRule,
    pub column_index: usize,
    /// Computed cut-off for threshold rules
    pub threshold: Option<f64>,
    /// Rows whose value exceeds the threshold
    pub flagged_rows: Vec<usize>,
}

/// Bind rules to `table`; rules for absent or empty columns are dropped
pub fn resolve_rules(table: &Table, rules: &[FormatRule]) -> Vec<ResolvedRule> {
    rules
        .iter()
        .filter_map(|rule| {
            let Some(column_index) = table.column_index(&rule.column) else {
                warn!(column = %rule.column, "format rule skipped: column not in table");
                return None;
            };

            let (threshold, flagged_rows) = match rule.kind {
                RuleKind::Threshold { quantile, .. } => {
                    let values = table.present_values(&rule.column);
                    let Some(cut) = stats::quantile(&values, quantile) else {
                        warn!(column = %rule.column, "threshold rule skipped: no values");
                        return None;
                    };
                    let flagged = table
                        .rows
                        .iter()
                        .enumerate()
                        .filter(|(_, row)| row[column_index].as_f64().is_some_and(|v| v > cut))
                        .map(|(i, _)| i)
                        .collect();
                    (Some(cut), flagged)
                }
                RuleKind::ColorScale | RuleKind::DataBar => (None, Vec::new()),
            };

            Some(ResolvedRule {
                rule: rule.clone(),
                column_index,
                threshold,
                flagged_rows,
            })
        })
        .collect()
}

// ============================================================================
// CSV
// ============================================================================

/// Write `table` as UTF-8 CSV with a header row
pub fn export_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    write_csv(table, &mut writer)?;
    writer.flush()?;
    info!(path = %path.display(), rows = table.len(), "📄 CSV written");
    Ok(())
}

/// CSV bytes for download responses
pub fn csv_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_csv(table, &mut writer)?;
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

fn write_csv<W: std::io::Write>(table: &Table, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// SPREADSHEET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadsheetSummary {
    pub rows: usize,
    pub rules: Vec<ResolvedRule>,
}

impl SpreadsheetSummary {
    pub fn flagged_cells(&self) -> usize {
        self.rules.iter().map(|r| r.flagged_rows.len()).sum()
    }
}

/// Write `table` to a one-sheet workbook with column-scoped conditional formats
pub fn export_spreadsheet(table: &Table, rules: &[FormatRule], path: &Path) -> Result<SpreadsheetSummary> {
    if table.columns.len() > MAX_SHEET_COLUMNS || table.len() + 1 > MAX_SHEET_ROWS {
        return Err(XlsxError::RowColumnLimitError.into());
    }
    let resolved = resolve_rules(table, rules);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header = Format::new().set_bold();
    for (c, name) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, sheet_col(c)?, name, &header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let excel_row = sheet_row(r + 1)?;
        for (c, cell) in row.iter().enumerate() {
            let col = sheet_col(c)?;
            match cell {
                Value::Number(v) => {
                    worksheet.write_number(excel_row, col, *v)?;
                }
                Value::Integer(v) => {
                    worksheet.write_number(excel_row, col, *v as f64)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(excel_row, col, s)?;
                }
                Value::Missing => {}
            }
        }
    }

    if !table.is_empty() {
        let last_row = sheet_row(table.len())?;
        for rule in &resolved {
            let col = sheet_col(rule.column_index)?;
            match (&rule.rule.kind, rule.threshold) {
                (RuleKind::Threshold { color, .. }, Some(cut)) => {
                    let format = Format::new().set_background_color(Color::RGB(*color));
                    let cf = ConditionalFormatCell::new()
                        .set_rule(ConditionalFormatCellRule::GreaterThan(cut))
                        .set_format(format);
                    worksheet.add_conditional_format(1, col, last_row, col, &cf)?;
                }
                (RuleKind::Threshold { .. }, None) => {}
                (RuleKind::ColorScale, _) => {
                    let cf = ConditionalFormat3ColorScale::new();
                    worksheet.add_conditional_format(1, col, last_row, col, &cf)?;
                }
                (RuleKind::DataBar, _) => {
                    let cf = ConditionalFormatDataBar::new();
                    worksheet.add_conditional_format(1, col, last_row, col, &cf)?;
                }
            }
        }
    }

    workbook.save(path)?;

    let summary = SpreadsheetSummary {
        rows: table.len(),
        rules: resolved,
    };
    info!(
        path = %path.display(),
        rules = summary.rules.len(),
        flagged = summary.flagged_cells(),
        "📗 spreadsheet written"
    );
    Ok(summary)
}

fn sheet_row(r: usize) -> Result<u32> {
    u32::try_from(r)
        .ok()
        .filter(|r| (*r as usize) < MAX_SHEET_ROWS)
        .ok_or_else(|| XlsxError::RowColumnLimitError.into())
}

fn sheet_col(c: usize) -> Result<u16> {
    u16::try_from(c)
        .ok()
        .filter(|c| (*c as usize) < MAX_SHEET_COLUMNS)
        .ok_or_else(|| XlsxError::RowColumnLimitError.into())
}

// ============================================================================
// TESTS
// ============================================================================
