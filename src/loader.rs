// 📂 Loader - delimited source files → RawTable
//
// Reading never mutates anything. Repeated loads of an unchanged file return
// structurally identical tables. `TableCache` memoizes loads per path and
// invalidates an entry as soon as the file's modification time changes.

use crate::error::{PipelineError, Result};
use crate::table::{RawTable, Table, Value};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

const UTF8_BOM: char = '\u{feff}';

/// Read a comma-separated file with a header row into a RawTable.
///
/// Rows shorter than the header (e.g. the "Data from database" footer lines
/// in World Bank exports) are padded with missing cells.
pub fn load(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| parse_error(path, &e))?
        .clone();

    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::Parse {
            path: path.to_path_buf(),
            line: 1,
            reason: "missing header row".to_string(),
        });
    }

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            // Headers are kept verbatim so renaming only matches exact text
            let h = if i == 0 { h.trim_start_matches(UTF8_BOM) } else { h };
            h.to_string()
        })
        .collect();

    let mut table = Table::new(columns);
    let width = table.columns.len();

    for result in reader.records() {
        let record = result.map_err(|e| parse_error(path, &e))?;
        if record.len() > width {
            return Err(PipelineError::Parse {
                path: path.to_path_buf(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                reason: format!("{} fields in a {}-column file", record.len(), width),
            });
        }
        table.push_row(record.iter().map(Value::text).collect());
    }

    debug!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.len(),
        "loaded raw table"
    );

    Ok(table)
}

fn parse_error(path: &Path, err: &csv::Error) -> PipelineError {
    PipelineError::Parse {
        path: path.to_path_buf(),
        line: err.position().map(|p| p.line()).unwrap_or(0),
        reason: err.to_string(),
    }
}

// ============================================================================
// TABLE CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CachedTable {
    modified: SystemTime,
    len: u64,
    table: Arc<RawTable>,
}

/// Explicit per-process cache of loaded source files, keyed by path and
/// validated against the file's modification time on every lookup.
#[derive(Debug, Default)]
pub struct TableCache {
    entries: HashMap<PathBuf, CachedTable>,
    hits: u64,
    misses: u64,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for `path`, reloading if the file changed
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<RawTable>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries.remove(path);
                return Err(PipelineError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified()?;
        let len = metadata.len();

        if let Some(entry) = self.entries.get(path) {
            if entry.modified == modified && entry.len == len {
                self.hits += 1;
                return Ok(Arc::clone(&entry.table));
            }
            info!(path = %path.display(), "source changed on disk, reloading");
        }

        self.misses += 1;
        let table = Arc::new(load(path)?);
        self.entries.insert(
            path.to_path_buf(),
            CachedTable {
                modified,
                len,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Drop one entry; the next lookup reloads from disk
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_world_bank_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datasets.csv",
            "\u{feff}Time,Time Code,Country Name,Country Code,Gini index [SI.POV.GINI]\n\
             1993,YR1993,South Africa,ZAF,59.3\n\
             1994,YR1994,South Africa,ZAF,..\n\
             \n\
             Data from database: World Development Indicators\n",
        );

        let table = load(&path).unwrap();
        assert_eq!(table.columns[0], "Time");
        assert_eq!(table.columns[4], "Gini index [SI.POV.GINI]");
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[1][4], Value::text(".."));
        // Footer line is padded
        assert!(table.rows[2][1].is_missing());
    }

    #[test]
    fn test_load_keeps_header_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "padded.csv", " Time,Country Name \n2001,South Africa\n");

        let table = load(&path).unwrap();
        assert_eq!(table.columns, vec![" Time".to_string(), "Country Name ".to_string()]);

        let cleaned = crate::cleaner::clean(&table, &crate::schema::DatasetSchema::trends().cleaning);
        assert!(cleaned.table.has_column(" Time"));
        assert!(!cleaned.table.has_column(crate::schema::YEAR));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_rejects_overlong_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.csv", "a,b\n1,2\n1,2,3\n");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_load_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.csv", "");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "Year,Value\n2000,1.5\n2001,2.5\n");

        assert_eq!(load(&path).unwrap(), load(&path).unwrap());
    }

    #[test]
    fn test_cache_hits_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "Year,Value\n2000,1.5\n");

        let mut cache = TableCache::new();
        let first = cache.get_or_load(&path).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));

        // Different length forces a reload even on coarse mtime filesystems
        write_file(dir.path(), "a.csv", "Year,Value\n2000,1.5\n2001,2.5\n");
        let third = cache.get_or_load(&path).unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn test_cache_invalidate_and_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "Year\n2000\n");

        let mut cache = TableCache::new();
        cache.get_or_load(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate(&path));
        assert!(cache.is_empty());

        cache.get_or_load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        let err = cache.get_or_load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
        assert!(cache.is_empty());
    }
}
