// 🧭 Dashboard - one entry point for every presenter
//
// Owns the source-file cache, the settings and the store handle. Each call
// is synchronous: load (cached) → clean → derive, blocking until done.

use crate::cleaner::{self, Cleaned};
use crate::config::Settings;
use crate::error::Result;
use crate::export::{self, SpreadsheetSummary};
use crate::loader::TableCache;
use crate::schema::{DatasetKind, DatasetSchema, SchemaCoverage};
use crate::stats::{self, DecadeAggregate, SummaryStats};
use crate::store::{SeedOutcome, Store, StoreQuery};
use crate::table::{RawTable, Table};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a page needs for one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub kind: DatasetKind,
    pub cleaned: Cleaned,
    pub coverage: SchemaCoverage,
    pub summary: SummaryStats,
    /// Absent when the table has no time column
    pub decades: Option<DecadeAggregate>,
}

impl DatasetView {
    /// Numeric schema columns this table actually carries
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.summary.columns.iter().map(|c| c.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub spreadsheet: PathBuf,
    pub spreadsheet_summary: SpreadsheetSummary,
}

pub struct Dashboard {
    settings: Settings,
    cache: TableCache,
    store: Store,
}

impl Dashboard {
    pub fn new(settings: Settings) -> Self {
        let store = Store::new(settings.store.path.clone());
        Dashboard {
            settings,
            cache: TableCache::new(),
            store,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Source file as loaded (served from the cache when unchanged)
    pub fn raw(&mut self, kind: DatasetKind) -> Result<Arc<RawTable>> {
        let path = self.settings.source_path(kind).to_path_buf();
        self.cache.get_or_load(&path)
    }

    pub fn clean(&mut self, kind: DatasetKind) -> Result<Cleaned> {
        let raw = self.raw(kind)?;
        let spec = kind
            .schema()
            .cleaning
            .with_policy(self.settings.policy_for(kind));
        Ok(cleaner::clean(&raw, &spec))
    }

    /// Cleaned table plus its statistics and decade roll-up
    pub fn view(&mut self, kind: DatasetKind) -> Result<DatasetView> {
        let schema = kind.schema();
        let cleaned = self.clean(kind)?;
        let table = cleaned.ensure_rows()?;

        let coverage = schema.coverage(table);
        let numeric = present_numeric(&schema, table);
        let summary = stats::summarize(table, &numeric)?;

        let decades = match schema.time_column() {
            Some(time) if table.has_column(time) => Some(stats::aggregate_by_decade(table, time, &numeric)?),
            _ => None,
        };

        if !coverage.missing.is_empty() {
            warn!(dataset = %kind, missing = ?coverage.missing, "schema columns absent from source");
        }

        Ok(DatasetView {
            kind,
            cleaned,
            coverage,
            summary,
            decades,
        })
    }

    /// Write the cleaned table as CSV and as a highlighted spreadsheet
    pub fn export(&mut self, kind: DatasetKind) -> Result<ExportPaths> {
        let schema = kind.schema();
        let cleaned = self.clean(kind)?;
        let table = cleaned.ensure_rows()?;

        std::fs::create_dir_all(&self.settings.export.dir)?;
        let csv = self.settings.csv_export_path(kind);
        let spreadsheet = self.settings.spreadsheet_export_path(kind);

        export::export_csv(table, &csv)?;
        let spreadsheet_summary = export::export_spreadsheet(table, &schema.format_rules, &spreadsheet)?;

        info!(dataset = %kind, csv = %csv.display(), xlsx = %spreadsheet.display(), "exports written");
        Ok(ExportPaths {
            csv,
            spreadsheet,
            spreadsheet_summary,
        })
    }

    /// Seed the dataset's relational table (no-op if already populated)
    pub fn seed(&mut self, kind: DatasetKind) -> Result<SeedOutcome> {
        let cleaned = self.clean(kind)?;
        let table = cleaned.ensure_rows()?;
        self.store.seed(&kind.schema(), table)
    }

    pub fn query(&self, kind: DatasetKind, query: &StoreQuery) -> Result<Table> {
        self.store.query(&kind.schema().store, query)
    }
}

fn present_numeric<'a>(schema: &'a DatasetSchema, table: &Table) -> Vec<&'a str> {
    schema
        .numeric_columns()
        .into_iter()
        .filter(|c| table.has_column(c))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
