// ⚙️ Settings - source paths, store location, export directory, server bind
//
// Layering (lowest to highest): built-in defaults, optional TOML file,
// environment variables prefixed with URBAN_INSIGHTS (nested keys joined by
// `__`, e.g. URBAN_INSIGHTS__STORE__PATH=/tmp/sa.db).

use crate::error::{PipelineError, Result};
use crate::schema::{DatasetKind, MissingPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "urban_insights.toml";
pub const ENV_PREFIX: &str = "URBAN_INSIGHTS";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub store: StoreSettings,
    pub export: ExportSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub trends_path: PathBuf,
    pub social_path: PathBuf,
    /// Override the built-in missing-value policy per dataset
    pub trends_policy: Option<MissingPolicy>,
    pub social_policy: Option<MissingPolicy>,
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            trends_path: PathBuf::from("datasets.csv"),
            social_path: PathBuf::from("dataset2.csv"),
            trends_policy: None,
            social_policy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: PathBuf::from("sa_trends.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            dir: PathBuf::from("exports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings. A missing file is fine; a malformed one is an error.
    pub fn load(file: Option<&Path>) -> Result<Settings> {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let builder = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        builder
            .try_deserialize::<Settings>()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn source_path(&self, kind: DatasetKind) -> &Path {
        match kind {
            DatasetKind::Trends => &self.data.trends_path,
            DatasetKind::Social => &self.data.social_path,
        }
    }

    /// Policy for `kind`: the configured override, else the dataset default
    pub fn policy_for(&self, kind: DatasetKind) -> MissingPolicy {
        let configured = match kind {
            DatasetKind::Trends => self.data.trends_policy,
            DatasetKind::Social => self.data.social_policy,
        };
        configured.unwrap_or_else(|| kind.schema().cleaning.policy)
    }

    pub fn csv_export_path(&self, kind: DatasetKind) -> PathBuf {
        self.export.dir.join(format!("{}_cleaned.csv", kind.code()))
    }

    pub fn spreadsheet_export_path(&self, kind: DatasetKind) -> PathBuf {
        self.export.dir.join(format!("{}_formatted.xlsx", kind.code()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
