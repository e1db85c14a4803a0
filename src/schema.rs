// 📐 Shape Layer - Fixed dataset schemas
//
// Each source file has a known header vocabulary. The schema says how those
// headers map to canonical names, which columns are numeric, how missing
// values are resolved, how the columns are highlighted on export, and how the
// table is laid out in the relational store.
//
// Columns outside the schema pass through untouched. Schema columns absent
// from a file are reported, never invented.

use crate::export::FormatRule;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CANONICAL COLUMN NAMES
// ============================================================================

pub const YEAR: &str = "Year";
pub const COUNTRY: &str = "Country";

pub const URBAN_POPULATION: &str = "Urban Population";
pub const UNEMPLOYMENT_RATE: &str = "Unemployment Rate";
pub const INTERNET_USERS: &str = "Internet Users";

pub const SECONDARY_ENROLLMENT: &str = "Secondary Enrollment";
pub const GINI_INDEX: &str = "Gini Index";
pub const FEMALE_LABOR_PARTICIPATION: &str = "Female Labor Force Participation";

/// World Bank indicator headers as they appear in the source exports
pub mod source_headers {
    pub const URBAN_POPULATION: &str =
        "Urban population (% of total population) [SP.URB.TOTL.IN.ZS]";
    pub const UNEMPLOYMENT_RATE: &str =
        "Unemployment, total (% of total labor force) (national estimate) [SL.UEM.TOTL.NE.ZS]";
    pub const INTERNET_USERS: &str =
        "Individuals using the Internet (% of population) [IT.NET.USER.ZS]";
    pub const SECONDARY_ENROLLMENT: &str = "School enrollment, secondary (% net) [SE.SEC.NENR]";
    pub const GINI_INDEX: &str = "Gini index [SI.POV.GINI]";
    pub const FEMALE_LABOR_PARTICIPATION: &str = "Labor force participation rate, female (% of female population ages 15+) (national estimate) [SL.TLF.CACT.FE.NE.ZS]";
    pub const TIME: &str = "Time";
    pub const COUNTRY_NAME: &str = "Country Name";
    pub const COUNTRY_NAME_COMPACT: &str = "CountryName";
}

// ============================================================================
// DATASET KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Urban population, unemployment, internet usage
    Trends,
    /// Secondary enrollment, Gini index, female labor participation
    Social,
}

impl DatasetKind {
    pub fn all() -> [DatasetKind; 2] {
        [DatasetKind::Trends, DatasetKind::Social]
    }

    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            DatasetKind::Trends => "Urban & Digital Trends",
            DatasetKind::Social => "Education & Social Indicators",
        }
    }

    /// Short code used in paths, URLs and file names
    pub fn code(&self) -> &str {
        match self {
            DatasetKind::Trends => "trends",
            DatasetKind::Social => "social",
        }
    }

    pub fn schema(&self) -> DatasetSchema {
        match self {
            DatasetKind::Trends => DatasetSchema::trends(),
            DatasetKind::Social => DatasetSchema::social(),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trends" | "dataset1" | "primary" => Ok(DatasetKind::Trends),
            "social" | "dataset2" | "secondary" => Ok(DatasetKind::Social),
            other => Err(format!("unknown dataset '{}' (expected trends or social)", other)),
        }
    }
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

/// Ordered old-name → canonical-name pairs. Only exact header matches rename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        ColumnMapping {
            entries: pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }

    pub fn canonical_for(&self, header: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(from, _)| from == header)
            .map(|(_, to)| to.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// MISSING-VALUE POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    Mean,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop rows where any core column is missing
    DropMissing,
    /// Fill numeric columns with a statistic of their present values
    Fill(FillStrategy),
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingPolicy::DropMissing => f.write_str("drop rows missing core columns"),
            MissingPolicy::Fill(FillStrategy::Mean) => f.write_str("fill with column mean"),
            MissingPolicy::Fill(FillStrategy::Median) => f.write_str("fill with column median"),
        }
    }
}

/// Everything the cleaner needs to turn a raw table into a canonical one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningSpec {
    /// Label used in logs and reports
    pub dataset: String,
    pub mapping: ColumnMapping,
    /// Time column, coerced to integer when present
    pub time_column: Option<String>,
    /// Columns coerced to floating point
    pub numeric_columns: Vec<String>,
    /// Columns whose missingness drops the row under `DropMissing`
    pub core_columns: Vec<String>,
    pub policy: MissingPolicy,
}

impl CleaningSpec {
    /// Same spec with a different policy (callers may override per run)
    pub fn with_policy(mut self, policy: MissingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

// ============================================================================
// STORE LAYOUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreColumn {
    /// Column name in the canonical table
    pub canonical: String,
    /// Column name in the relational table
    pub store: String,
}

impl StoreColumn {
    fn new(canonical: &str, store: &str) -> Self {
        StoreColumn {
            canonical: canonical.to_string(),
            store: store.to_string(),
        }
    }
}

/// Relational layout: integer primary key on the time column, one
/// DECIMAL(6,3) column per numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreLayout {
    pub table: String,
    pub key: StoreColumn,
    pub values: Vec<StoreColumn>,
}

impl StoreLayout {
    pub fn create_sql(&self) -> String {
        let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote_ident(&self.key.store))];
        columns.extend(
            self.values
                .iter()
                .map(|c| format!("{} DECIMAL(6,3)", quote_ident(&c.store))),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.table),
            columns.join(",\n    ")
        )
    }

    /// Store column name for a canonical or store-side name
    pub fn store_column(&self, name: &str) -> Option<&str> {
        std::iter::once(&self.key)
            .chain(self.values.iter())
            .find(|c| c.canonical == name || c.store == name)
            .map(|c| c.store.as_str())
    }
}

/// Double-quote an SQL identifier (names here come from the fixed layout)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// DATASET SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub kind: DatasetKind,
    pub cleaning: CleaningSpec,
    pub format_rules: Vec<FormatRule>,
    pub store: StoreLayout,
}

/// Which schema columns a concrete table actually carries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCoverage {
    pub present: Vec<String>,
    pub missing: Vec<String>,
    /// Columns unknown to the schema, kept as-is
    pub passthrough: Vec<String>,
}

impl DatasetSchema {
    /// Urban population / unemployment / internet usage.
    /// Policy: drop rows missing the year or any indicator.
    pub fn trends() -> Self {
        let mapping = ColumnMapping::new([
            (source_headers::URBAN_POPULATION, URBAN_POPULATION),
            (source_headers::UNEMPLOYMENT_RATE, UNEMPLOYMENT_RATE),
            (source_headers::INTERNET_USERS, INTERNET_USERS),
            (source_headers::TIME, YEAR),
            (source_headers::COUNTRY_NAME, COUNTRY),
            (COUNTRY, COUNTRY),
            (source_headers::COUNTRY_NAME_COMPACT, COUNTRY),
        ]);

        let numeric = vec![
            URBAN_POPULATION.to_string(),
            UNEMPLOYMENT_RATE.to_string(),
            INTERNET_USERS.to_string(),
        ];
        let mut core = vec![YEAR.to_string()];
        core.extend(numeric.iter().cloned());

        DatasetSchema {
            kind: DatasetKind::Trends,
            cleaning: CleaningSpec {
                dataset: DatasetKind::Trends.code().to_string(),
                mapping,
                time_column: Some(YEAR.to_string()),
                numeric_columns: numeric,
                core_columns: core,
                policy: MissingPolicy::DropMissing,
            },
            format_rules: vec![
                FormatRule::threshold(UNEMPLOYMENT_RATE, 0.75, 0xFFC7CE),
                FormatRule::data_bar(UNEMPLOYMENT_RATE),
                FormatRule::threshold(INTERNET_USERS, 0.75, 0xC6EFCE),
                FormatRule::color_scale(INTERNET_USERS),
                FormatRule::color_scale(URBAN_POPULATION),
            ],
            store: StoreLayout {
                table: "SA_TrendsData".to_string(),
                key: StoreColumn::new(YEAR, "year"),
                values: vec![
                    StoreColumn::new(URBAN_POPULATION, "urban_population"),
                    StoreColumn::new(UNEMPLOYMENT_RATE, "unemployment_rate"),
                    StoreColumn::new(INTERNET_USERS, "internet_usage"),
                ],
            },
        }
    }

    /// Secondary enrollment / Gini index / female labor participation.
    /// Policy: fill gaps with the column mean (the Gini series is sparse, so
    /// dropping would discard most years).
    pub fn social() -> Self {
        let mapping = ColumnMapping::new([
            (source_headers::SECONDARY_ENROLLMENT, SECONDARY_ENROLLMENT),
            (source_headers::GINI_INDEX, GINI_INDEX),
            (
                source_headers::FEMALE_LABOR_PARTICIPATION,
                FEMALE_LABOR_PARTICIPATION,
            ),
            (source_headers::TIME, YEAR),
            (source_headers::COUNTRY_NAME, COUNTRY),
            (COUNTRY, COUNTRY),
            (source_headers::COUNTRY_NAME_COMPACT, COUNTRY),
        ]);

        let numeric = vec![
            SECONDARY_ENROLLMENT.to_string(),
            GINI_INDEX.to_string(),
            FEMALE_LABOR_PARTICIPATION.to_string(),
        ];

        DatasetSchema {
            kind: DatasetKind::Social,
            cleaning: CleaningSpec {
                dataset: DatasetKind::Social.code().to_string(),
                mapping,
                time_column: Some(YEAR.to_string()),
                numeric_columns: numeric.clone(),
                core_columns: numeric,
                policy: MissingPolicy::Fill(FillStrategy::Mean),
            },
            format_rules: vec![
                FormatRule::color_scale(SECONDARY_ENROLLMENT),
                FormatRule::color_scale(GINI_INDEX),
                FormatRule::data_bar(FEMALE_LABOR_PARTICIPATION),
            ],
            store: StoreLayout {
                table: "SA_SocialData".to_string(),
                key: StoreColumn::new(YEAR, "Year"),
                values: vec![
                    StoreColumn::new(SECONDARY_ENROLLMENT, "Secondary Enrollment"),
                    StoreColumn::new(GINI_INDEX, "Gini Index"),
                    StoreColumn::new(
                        FEMALE_LABOR_PARTICIPATION,
                        "Female Labor Force Participation",
                    ),
                ],
            },
        }
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.cleaning
            .numeric_columns
            .iter()
            .map(|c| c.as_str())
            .collect()
    }

    pub fn time_column(&self) -> Option<&str> {
        self.cleaning.time_column.as_deref()
    }

    /// Compare a (cleaned) table's columns against this schema
    pub fn coverage(&self, table: &Table) -> SchemaCoverage {
        let mut known: Vec<&str> = self.numeric_columns();
        if let Some(time) = self.time_column() {
            known.insert(0, time);
        }

        let mut coverage = SchemaCoverage::default();
        for name in &known {
            if table.has_column(name) {
                coverage.present.push(name.to_string());
            } else {
                coverage.missing.push(name.to_string());
            }
        }
        coverage.passthrough = table
            .columns
            .iter()
            .filter(|c| !known.contains(&c.as_str()))
            .cloned()
            .collect();
        coverage
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_exact_match_only() {
        let schema = DatasetSchema::trends();
        let mapping = &schema.cleaning.mapping;

        assert_eq!(
            mapping.canonical_for(source_headers::URBAN_POPULATION),
            Some(URBAN_POPULATION)
        );
        assert_eq!(mapping.canonical_for("Time"), Some(YEAR));
        assert_eq!(mapping.canonical_for("CountryName"), Some(COUNTRY));
        // Header drift is not matched
        assert_eq!(
            mapping.canonical_for("Urban population (% of total population)"),
            None
        );
        assert_eq!(mapping.canonical_for("Time Code"), None);
    }

    #[test]
    fn test_store_layouts_match_expected_schema() {
        let trends = DatasetSchema::trends().store.create_sql();
        assert!(trends.contains("\"SA_TrendsData\""));
        assert!(trends.contains("\"year\" INTEGER PRIMARY KEY"));
        assert!(trends.contains("\"internet_usage\" DECIMAL(6,3)"));

        let social = DatasetSchema::social().store.create_sql();
        assert!(social.contains("\"Year\" INTEGER PRIMARY KEY"));
        assert!(social.contains("\"Female Labor Force Participation\" DECIMAL(6,3)"));
    }

    #[test]
    fn test_store_column_lookup() {
        let layout = DatasetSchema::trends().store;
        assert_eq!(layout.store_column(UNEMPLOYMENT_RATE), Some("unemployment_rate"));
        assert_eq!(layout.store_column("unemployment_rate"), Some("unemployment_rate"));
        assert_eq!(layout.store_column(YEAR), Some("year"));
        assert_eq!(layout.store_column("gdp"), None);
    }

    #[test]
    fn test_policies_per_dataset() {
        assert_eq!(DatasetSchema::trends().cleaning.policy, MissingPolicy::DropMissing);
        assert_eq!(
            DatasetSchema::social().cleaning.policy,
            MissingPolicy::Fill(FillStrategy::Mean)
        );
    }

    #[test]
    fn test_coverage_reports_missing_and_passthrough() {
        let schema = DatasetSchema::social();
        let table = Table::new(vec![
            "Year".to_string(),
            "Time Code".to_string(),
            GINI_INDEX.to_string(),
        ]);

        let coverage = schema.coverage(&table);
        assert_eq!(coverage.present, vec!["Year", GINI_INDEX]);
        assert_eq!(
            coverage.missing,
            vec![SECONDARY_ENROLLMENT, FEMALE_LABOR_PARTICIPATION]
        );
        assert_eq!(coverage.passthrough, vec!["Time Code"]);
    }

    #[test]
    fn test_dataset_kind_parsing() {
        assert_eq!("trends".parse::<DatasetKind>(), Ok(DatasetKind::Trends));
        assert_eq!("Dataset2".parse::<DatasetKind>(), Ok(DatasetKind::Social));
        assert!("gdp".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("Gini Index"), "\"Gini Index\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
