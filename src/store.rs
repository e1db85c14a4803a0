// 🗄️ Relational Store - idempotent seeding and read-only aggregate queries
//
// Every operation opens its own short-lived connection. Seeding runs in one
// transaction: the table is either left untouched (already populated, or an
// error rolled everything back) or fully written together with its audit
// event. Queries open the database read-only.

use crate::error::{PipelineError, Result};
use crate::schema::{quote_ident, DatasetSchema, StoreColumn, StoreLayout};
use crate::stats::{round_to, snake_case};
use crate::table::{Table, Value};
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EVENTS_TABLE: &str = "pipeline_events";
const SEED_ACTOR: &str = "urban_insights_seeder";
const STORED_DECIMALS: u32 = 3;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeedOutcome {
    /// Table was empty; this many rows were written
    Inserted { rows: usize, skipped_without_key: usize },
    /// Table already held rows; nothing was written
    Skipped { existing: i64 },
}

impl fmt::Display for SeedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedOutcome::Inserted {
                rows,
                skipped_without_key,
            } => write!(f, "inserted {} rows ({} without a year skipped)", rows, skipped_without_key),
            SeedOutcome::Skipped { existing } => {
                write!(f, "already seeded ({} rows), nothing written", existing)
            }
        }
    }
}

/// Audit row written alongside every successful seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub table_name: String,
    pub row_count: i64,
    pub actor: String,
}

/// Read-only aggregate queries over a seeded table.
/// Column names may be given in canonical or store form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum StoreQuery {
    /// Mean of every value column, rounded to 2 places
    Averages,
    /// Year holding the highest (or lowest) value of a column
    Extreme { column: String, highest: bool },
    /// Both extremes of a column, labelled
    HighestAndLowest { column: String },
    /// max − min of a column with the first and last year on record
    Growth { column: String },
    /// Years where a column exceeds `threshold`
    AboveThreshold { column: String, threshold: f64 },
    /// Row count and rounded averages per decade
    ByDecade,
    /// Every row with values rounded to whole numbers
    Rounded,
    AllRows,
}

impl StoreQuery {
    /// Build a query from its short name plus optional column/threshold
    /// arguments (as given on the command line or in a URL).
    pub fn from_name(
        name: &str,
        column: Option<&str>,
        threshold: Option<f64>,
    ) -> std::result::Result<Self, String> {
        let need_column = || {
            column
                .map(str::to_string)
                .ok_or_else(|| format!("query '{}' needs a column", name))
        };

        match name.to_lowercase().as_str() {
            "averages" | "avg" => Ok(StoreQuery::Averages),
            "highest" | "max" => Ok(StoreQuery::Extreme {
                column: need_column()?,
                highest: true,
            }),
            "lowest" | "min" => Ok(StoreQuery::Extreme {
                column: need_column()?,
                highest: false,
            }),
            "extremes" => Ok(StoreQuery::HighestAndLowest {
                column: need_column()?,
            }),
            "growth" => Ok(StoreQuery::Growth {
                column: need_column()?,
            }),
            "above" => Ok(StoreQuery::AboveThreshold {
                column: need_column()?,
                threshold: threshold.ok_or_else(|| "query 'above' needs a threshold".to_string())?,
            }),
            "decades" | "by_decade" => Ok(StoreQuery::ByDecade),
            "rounded" => Ok(StoreQuery::Rounded),
            "all" | "rows" => Ok(StoreQuery::AllRows),
            other => Err(format!("unknown query '{}'", other)),
        }
    }

    pub fn names() -> &'static [&'static str] {
        &[
            "averages", "highest", "lowest", "extremes", "growth", "above", "decades", "rounded",
            "all",
        ]
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Store { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.path).map_err(|source| PipelineError::StoreConnection {
            path: self.path.clone(),
            source,
        })
    }

    fn open_read_only(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| PipelineError::StoreConnection {
            path: self.path.clone(),
            source,
        })
    }

    /// Write `table` into the dataset's relational table, but only if that
    /// table is still empty. Values are stored rounded to 3 places; rows
    /// without a year are skipped.
    pub fn seed(&self, schema: &DatasetSchema, table: &Table) -> Result<SeedOutcome> {
        let layout = &schema.store;
        let mut conn = self.open()?;
        setup_store(&conn, layout)?;

        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&layout.table)),
            [],
            |row| row.get(0),
        )?;
        if existing > 0 {
            info!(table = %layout.table, existing, "store already seeded, skipping");
            return Ok(SeedOutcome::Skipped { existing });
        }

        let key_idx = table
            .column_index(&layout.key.canonical)
            .ok_or_else(|| PipelineError::UnknownColumn {
                table: layout.table.clone(),
                column: layout.key.canonical.clone(),
            })?;
        let value_idx: Vec<Option<usize>> = layout
            .values
            .iter()
            .map(|c| table.column_index(&c.canonical))
            .collect();
        for (col, idx) in layout.values.iter().zip(&value_idx) {
            if idx.is_none() {
                warn!(table = %layout.table, column = %col.canonical, "column absent, stored as NULL");
            }
        }

        let mut columns = vec![quote_ident(&layout.key.store)];
        columns.extend(layout.values.iter().map(|c| quote_ident(&c.store)));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&layout.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut inserted = 0usize;
        let mut skipped = 0usize;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in &table.rows {
                let Some(year) = row[key_idx].as_i64() else {
                    skipped += 1;
                    continue;
                };

                let mut values = vec![SqlValue::Integer(year)];
                values.extend(value_idx.iter().map(|idx| {
                    match idx.and_then(|i| row[i].as_f64()) {
                        Some(v) => SqlValue::Real(round_to(v, STORED_DECIMALS)),
                        None => SqlValue::Null,
                    }
                }));
                stmt.execute(params_from_iter(values))?;
                inserted += 1;
            }
        }

        if skipped > 0 {
            warn!(table = %layout.table, skipped, "rows without a year were not stored");
        }

        tx.execute(
            &format!(
                "INSERT INTO {EVENTS_TABLE} (event_id, timestamp, event_type, table_name, row_count, actor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                Utc::now().to_rfc3339(),
                "store_seeded",
                layout.table,
                inserted as i64,
                SEED_ACTOR,
            ],
        )?;
        tx.commit()?;

        info!(table = %layout.table, inserted, "🌱 store seeded");
        Ok(SeedOutcome::Inserted {
            rows: inserted,
            skipped_without_key: skipped,
        })
    }

    /// Rows currently in the dataset's table (0 if it was never created)
    pub fn row_count(&self, layout: &StoreLayout) -> Result<i64> {
        let conn = self.open_read_only()?;
        if !table_exists(&conn, &layout.table)? {
            return Ok(0);
        }
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&layout.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Seed audit trail, newest first
    pub fn events(&self) -> Result<Vec<SeedEvent>> {
        let conn = self.open_read_only()?;
        if !table_exists(&conn, EVENTS_TABLE)? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT event_id, timestamp, table_name, row_count, actor
             FROM {EVENTS_TABLE}
             ORDER BY id DESC"
        ))?;

        let events = stmt
            .query_map([], |row| {
                let timestamp: String = row.get(1)?;
                Ok(SeedEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?
                        .with_timezone(&Utc),
                    table_name: row.get(2)?,
                    row_count: row.get(3)?,
                    actor: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Run a read-only query and return its result as a table
    pub fn query(&self, layout: &StoreLayout, query: &StoreQuery) -> Result<Table> {
        let (sql, args) = build_query(layout, query)?;
        debug!(sql = %sql, "store query");

        let conn = self.open_read_only()?;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(cell_from_sql))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Table::from_rows(columns, rows))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn setup_store(conn: &Connection, layout: &StoreLayout) -> Result<()> {
    conn.execute(&layout.create_sql(), [])?;
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {EVENTS_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                table_name TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                actor TEXT NOT NULL
            )"
        ),
        [],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn cell_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Missing,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Number(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Missing,
    }
}

/// Resolve a canonical or store-side name to one of the layout's value columns
fn value_column<'a>(layout: &'a StoreLayout, name: &str) -> Result<&'a StoreColumn> {
    layout
        .values
        .iter()
        .find(|c| c.canonical == name || c.store == name)
        .ok_or_else(|| PipelineError::UnknownColumn {
            table: layout.table.clone(),
            column: name.to_string(),
        })
}

fn build_query(layout: &StoreLayout, query: &StoreQuery) -> Result<(String, Vec<SqlValue>)> {
    let table = quote_ident(&layout.table);
    let key = quote_ident(&layout.key.store);

    let averages = |prefix: &str| -> Vec<String> {
        layout
            .values
            .iter()
            .map(|c| {
                format!(
                    "ROUND(AVG({}), 2) AS {}",
                    quote_ident(&c.store),
                    quote_ident(&format!("{}{}", prefix, snake_case(&c.store)))
                )
            })
            .collect()
    };

    let built = match query {
        StoreQuery::Averages => (
            format!("SELECT {} FROM {}", averages("avg_").join(", "), table),
            Vec::new(),
        ),
        StoreQuery::Extreme { column, highest } => {
            let col = quote_ident(&value_column(layout, column)?.store);
            let order = if *highest { "DESC" } else { "ASC" };
            (
                format!(
                    "SELECT {key}, {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY {col} {order}, {key} LIMIT 1"
                ),
                Vec::new(),
            )
        }
        StoreQuery::HighestAndLowest { column } => {
            let col = quote_ident(&value_column(layout, column)?.store);
            (
                // Every tied year is returned for each extreme
                format!(
                    "SELECT CASE WHEN {col} = (SELECT MAX({col}) FROM {table}) \
                     THEN 'highest' ELSE 'lowest' END AS position, {key}, {col} \
                     FROM {table} \
                     WHERE {col} = (SELECT MAX({col}) FROM {table}) \
                     OR {col} = (SELECT MIN({col}) FROM {table}) \
                     ORDER BY position, {key}"
                ),
                Vec::new(),
            )
        }
        StoreQuery::Growth { column } => {
            let col = quote_ident(&value_column(layout, column)?.store);
            (
                format!(
                    "SELECT ROUND(MAX({col}) - MIN({col}), 3) AS growth, \
                     MIN({key}) AS first_year, MAX({key}) AS last_year \
                     FROM {table} WHERE {col} IS NOT NULL"
                ),
                Vec::new(),
            )
        }
        StoreQuery::AboveThreshold { column, threshold } => {
            let col = quote_ident(&value_column(layout, column)?.store);
            (
                format!("SELECT {key}, {col} FROM {table} WHERE {col} > ?1 ORDER BY {key}"),
                vec![SqlValue::Real(*threshold)],
            )
        }
        StoreQuery::ByDecade => (
            format!(
                "SELECT ({key} / 10) * 10 AS decade, COUNT(*) AS row_count, {} \
                 FROM {table} GROUP BY decade ORDER BY decade",
                averages("avg_").join(", ")
            ),
            Vec::new(),
        ),
        StoreQuery::Rounded => {
            let rounded: Vec<String> = layout
                .values
                .iter()
                .map(|c| {
                    let col = quote_ident(&c.store);
                    format!("CAST(ROUND({col}) AS INTEGER) AS {col}")
                })
                .collect();
            (
                format!("SELECT {key}, {} FROM {table} ORDER BY {key}", rounded.join(", ")),
                Vec::new(),
            )
        }
        StoreQuery::AllRows => (format!("SELECT * FROM {table} ORDER BY {key}"), Vec::new()),
    };

    Ok(built)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, DatasetSchema};

    fn trends_table() -> Table {
        Table::from_rows(
            vec![
                schema::YEAR.to_string(),
                schema::COUNTRY.to_string(),
                schema::URBAN_POPULATION.to_string(),
                schema::UNEMPLOYMENT_RATE.to_string(),
                schema::INTERNET_USERS.to_string(),
            ],
            vec![
                vec![
                    Value::Integer(1998),
                    Value::text("South Africa"),
                    Value::Number(50.0),
                    Value::Number(20.0),
                    Value::Number(10.0),
                ],
                vec![
                    Value::Integer(1999),
                    Value::text("South Africa"),
                    Value::Number(51.0),
                    Value::Number(19.0),
                    Value::Number(15.0),
                ],
                vec![
                    Value::Integer(2010),
                    Value::text("South Africa"),
                    Value::Number(62.2222),
                    Value::Number(34.5),
                    Value::Number(24.0),
                ],
            ],
        )
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("sa_trends.db"));
        (dir, store)
    }

    #[test]
    fn test_seed_twice_keeps_row_count() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();

        let first = store.seed(&schema, &trends_table()).unwrap();
        assert_eq!(
            first,
            SeedOutcome::Inserted {
                rows: 3,
                skipped_without_key: 0
            }
        );

        let second = store.seed(&schema, &trends_table()).unwrap();
        assert_eq!(second, SeedOutcome::Skipped { existing: 3 });
        assert_eq!(store.row_count(&schema.store).unwrap(), 3);

        let events = store.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].table_name, "SA_TrendsData");
        assert_eq!(events[0].row_count, 3);
        println!("✅ Idempotent seeding test PASSED");
    }

    #[test]
    fn test_seed_rounds_and_skips_keyless_rows() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();
        let mut table = trends_table();
        table.rows[1][0] = Value::Missing;

        let outcome = store.seed(&schema, &table).unwrap();
        assert_eq!(
            outcome,
            SeedOutcome::Inserted {
                rows: 2,
                skipped_without_key: 1
            }
        );

        let rows = store.query(&schema.store, &StoreQuery::AllRows).unwrap();
        assert_eq!(rows.columns[0], "year");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(1, "urban_population").unwrap().as_f64(), Some(62.222));
    }

    #[test]
    fn test_highest_and_lowest_keep_ties() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();
        let mut table = trends_table();
        // 1998 now ties 2010 for the highest internet usage
        table.rows[0][4] = Value::Number(24.0);
        store.seed(&schema, &table).unwrap();

        let both = store
            .query(
                &schema.store,
                &StoreQuery::HighestAndLowest {
                    column: schema::INTERNET_USERS.to_string(),
                },
            )
            .unwrap();
        assert_eq!(both.len(), 3);
        assert_eq!(both.rows[0][0], Value::text("highest"));
        assert_eq!(both.rows[0][1], Value::Integer(1998));
        assert_eq!(both.rows[1][0], Value::text("highest"));
        assert_eq!(both.rows[1][1], Value::Integer(2010));
        assert_eq!(both.rows[2][0], Value::text("lowest"));
        assert_eq!(both.rows[2][1], Value::Integer(1999));
    }

    #[test]
    fn test_failed_seed_rolls_back() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();
        let mut table = trends_table();
        // Same year twice violates the primary key
        table.rows[1][0] = Value::Integer(1998);

        let err = store.seed(&schema, &table).unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)), "{err}");
        assert_eq!(store.row_count(&schema.store).unwrap(), 0);
        assert!(store.events().unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_queries() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();
        store.seed(&schema, &trends_table()).unwrap();
        let layout = &schema.store;

        let avg = store.query(layout, &StoreQuery::Averages).unwrap();
        assert_eq!(avg.columns, vec!["avg_urban_population", "avg_unemployment_rate", "avg_internet_usage"]);
        assert_eq!(avg.rows[0][1].as_f64(), Some(24.5));

        let top = store
            .query(
                layout,
                &StoreQuery::Extreme {
                    column: schema::UNEMPLOYMENT_RATE.to_string(),
                    highest: true,
                },
            )
            .unwrap();
        assert_eq!(top.rows[0][0], Value::Integer(2010));

        let both = store
            .query(
                layout,
                &StoreQuery::HighestAndLowest {
                    column: "unemployment_rate".to_string(),
                },
            )
            .unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both.rows[1][0], Value::text("lowest"));
        assert_eq!(both.rows[1][1], Value::Integer(1999));

        let growth = store
            .query(
                layout,
                &StoreQuery::Growth {
                    column: schema::INTERNET_USERS.to_string(),
                },
            )
            .unwrap();
        assert_eq!(growth.get(0, "growth").unwrap().as_f64(), Some(14.0));
        assert_eq!(growth.get(0, "first_year"), Some(&Value::Integer(1998)));
        assert_eq!(growth.get(0, "last_year"), Some(&Value::Integer(2010)));

        let above = store
            .query(
                layout,
                &StoreQuery::AboveThreshold {
                    column: schema::UNEMPLOYMENT_RATE.to_string(),
                    threshold: 30.0,
                },
            )
            .unwrap();
        assert_eq!(above.len(), 1);

        let decades = store.query(layout, &StoreQuery::ByDecade).unwrap();
        assert_eq!(decades.len(), 2);
        assert_eq!(decades.get(0, "decade"), Some(&Value::Integer(1990)));
        assert_eq!(decades.get(0, "row_count"), Some(&Value::Integer(2)));
        assert_eq!(decades.get(0, "avg_urban_population").unwrap().as_f64(), Some(50.5));

        let rounded = store.query(layout, &StoreQuery::Rounded).unwrap();
        assert_eq!(rounded.get(2, "urban_population"), Some(&Value::Integer(62)));

        // Queries never change what is stored
        assert_eq!(store.row_count(layout).unwrap(), 3);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let (_dir, store) = temp_store();
        let schema = DatasetSchema::trends();
        store.seed(&schema, &trends_table()).unwrap();

        let err = store
            .query(
                &schema.store,
                &StoreQuery::Growth {
                    column: "\"; DROP TABLE SA_TrendsData; --".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn { .. }));
    }

    #[test]
    fn test_unreachable_store() {
        let store = Store::new("/definitely/not/a/dir/store.db");
        let schema = DatasetSchema::trends();

        let err = store.seed(&schema, &trends_table()).unwrap_err();
        assert!(err.is_store_unavailable(), "{err}");

        let err = store.query(&schema.store, &StoreQuery::AllRows).unwrap_err();
        assert!(err.is_store_unavailable(), "{err}");
    }

    #[test]
    fn test_query_from_name() {
        assert_eq!(StoreQuery::from_name("averages", None, None), Ok(StoreQuery::Averages));
        assert_eq!(
            StoreQuery::from_name("above", Some("Gini Index"), Some(60.0)),
            Ok(StoreQuery::AboveThreshold {
                column: "Gini Index".to_string(),
                threshold: 60.0
            })
        );
        assert!(StoreQuery::from_name("growth", None, None).is_err());
        assert!(StoreQuery::from_name("above", Some("Gini Index"), None).is_err());
        assert!(StoreQuery::from_name("delete", None, None).is_err());
    }
}
