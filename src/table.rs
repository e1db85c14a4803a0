// 📋 In-memory tables shared by every pipeline stage
//
// A RawTable (as loaded) and a CanonicalTable (as cleaned) share one shape:
// ordered column names plus rows of typed cells. The loader only produces
// Text cells; the cleaner turns them into Number/Integer/Missing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// CELL VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Explicit missing marker (serialized as null)
    Missing,
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell; text is not parsed here
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Stable encoding used for full-row equality fingerprints
    fn fingerprint_into(&self, hasher: &mut Sha256) {
        match self {
            Value::Missing => hasher.update(b"M;"),
            Value::Integer(v) => hasher.update(format!("I{};", v)),
            Value::Number(v) => {
                // 0.0 == -0.0 under PartialEq, so they must hash alike
                let v = if *v == 0.0 { 0.0f64 } else { *v };
                hasher.update(format!("N{:x};", v.to_bits()))
            }
            Value::Text(s) => hasher.update(format!("T{}:{};", s.len(), s)),
        }
    }
}

/// Renders the cell the way it is written to CSV. Floats use the shortest
/// representation that parses back to the same bits.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Table as read from a source file (verbose headers, text cells)
pub type RawTable = Table;

/// Table after cleaning (canonical headers, typed cells)
pub type CanonicalTable = Table;

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names and rows, padding short rows with Missing
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Numeric view of one column; non-numeric cells are None
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_f64()).collect())
    }

    /// Non-missing numeric values of one column
    pub fn present_values(&self, name: &str) -> Vec<f64> {
        self.numeric_column(name)
            .map(|col| col.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn missing_count(&self, name: &str) -> usize {
        self.column(name)
            .map(|col| col.iter().filter(|v| v.is_missing()).count())
            .unwrap_or(0)
    }

    /// Keep only the rows matching the predicate, preserving order
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[Value]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Projection onto the given columns (absent columns are skipped)
    pub fn select(&self, names: &[&str]) -> Table {
        let indices: Vec<(usize, &str)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (i, *n)))
            .collect();

        Table {
            columns: indices.iter().map(|(_, n)| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|(i, _)| row[*i].clone()).collect())
                .collect(),
        }
    }

    /// SHA-256 fingerprint of a full row, used for duplicate detection
    pub fn row_fingerprint(row: &[Value]) -> String {
        let mut hasher = Sha256::new();
        for cell in row {
            cell.fingerprint_into(&mut hasher);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec!["Year".to_string(), "Gini Index".to_string(), "Country".to_string()],
            vec![
                vec![Value::Integer(2000), Value::Number(57.8), Value::text("South Africa")],
                vec![Value::Integer(2001), Value::Missing, Value::text("South Africa")],
                vec![Value::Integer(2002)],
            ],
        )
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.rows[2].len(), 3);
        assert!(table.rows[2][2].is_missing());
    }

    #[test]
    fn test_column_access() {
        let table = sample();
        assert_eq!(table.column_index("Gini Index"), Some(1));
        assert_eq!(table.present_values("Gini Index"), vec![57.8]);
        assert_eq!(table.missing_count("Gini Index"), 2);
        assert_eq!(table.numeric_column("Year").unwrap()[1], Some(2001.0));
        assert!(table.numeric_column("Unknown").is_none());
    }

    #[test]
    fn test_select_skips_absent_columns() {
        let table = sample();
        let projected = table.select(&["Country", "Nope", "Year"]);
        assert_eq!(projected.columns, vec!["Country", "Year"]);
        assert_eq!(projected.rows[0][1], Value::Integer(2000));
    }

    #[test]
    fn test_fingerprint_matches_equality() {
        let a = vec![Value::Number(0.0), Value::text("x")];
        let b = vec![Value::Number(-0.0), Value::text("x")];
        let c = vec![Value::Number(0.0), Value::text("y")];
        assert_eq!(Table::row_fingerprint(&a), Table::row_fingerprint(&b));
        assert_ne!(Table::row_fingerprint(&a), Table::row_fingerprint(&c));

        // Text/number ambiguity must not collide
        let d = vec![Value::text("1")];
        let e = vec![Value::Integer(1)];
        assert_ne!(Table::row_fingerprint(&d), Table::row_fingerprint(&e));
    }

    #[test]
    fn test_display_is_csv_ready() {
        assert_eq!(Value::Missing.to_string(), "");
        assert_eq!(Value::Number(62.404).to_string(), "62.404");
        assert_eq!(Value::Integer(1998).to_string(), "1998");
        assert_eq!(Value::Number(0.1 + 0.2).to_string().parse::<f64>().unwrap(), 0.1 + 0.2);
    }
}
