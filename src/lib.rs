// Urban Insights - Core Library
// Load → clean → aggregate → export pipeline for the World Bank indicator
// datasets, shared by the CLI, the terminal dashboard and the API server.

pub mod error;
pub mod table;
pub mod schema;     // Dataset vocabularies, policies, store layouts
pub mod loader;     // Source files + mtime-validated cache
pub mod cleaner;
pub mod stats;      // Summary statistics, correlation, decades
pub mod export;     // CSV + highlighted spreadsheet
pub mod store;      // Relational seeding and read-only queries
pub mod views;      // Presenter data: KPIs, histograms, box plots
pub mod config;
pub mod dashboard;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use table::{CanonicalTable, RawTable, Table, Value};
pub use schema::{
    ColumnMapping, CleaningSpec, DatasetKind, DatasetSchema, FillStrategy, MissingPolicy,
    SchemaCoverage, StoreLayout,
};
pub use loader::{load, TableCache};
pub use cleaner::{clean, Cleaned, CleaningReport};
pub use stats::{aggregate_by_decade, summarize, DecadeAggregate, SummaryStats};
pub use export::{export_csv, export_spreadsheet, FormatRule, RuleKind};
pub use store::{SeedEvent, SeedOutcome, Store, StoreQuery};
pub use views::{BoxSummary, Histogram, Kpi, TrendSeries, YearRange};
pub use config::Settings;
pub use dashboard::{Dashboard, DatasetView};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
