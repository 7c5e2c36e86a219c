//! Run configuration
//!
//! A job file is JSON describing where the forms, mapping and output spec
//! live and where results go:
//!
//! ```json
//! {
//!   "index": "forms/index.txt",
//!   "mapping": "mapping.csv",
//!   "output_spec": "output_spec.csv",
//!   "output_dir": "out",
//!   "log_path": "error_log.txt",
//!   "format": "csv",
//!   "options": { "symmetric_date_window": false }
//! }
//! ```

use crate::diagnostics::DiagnosticSink;
use crate::engine::{reconcile, RunStats};
use crate::error::{Error, Result};
use crate::output::{export, ExportFormat};
use crate::scanner::{load_sources, scan_directory, SourceIndex};
use crate::schema::Catalog;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default name of the diagnostic log
pub const DEFAULT_LOG: &str = "error_log.txt";

/// Knobs that change reconciliation results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Compare dates by absolute distance instead of `candidate - current`
    #[serde(default)]
    pub symmetric_date_window: bool,
}

/// A complete reconciliation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Source index file (`name|form_id|file_path` lines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<PathBuf>,
    /// Directories scanned for form CSVs when no index is given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_dirs: Vec<PathBuf>,
    /// Mapping table
    pub mapping: PathBuf,
    /// Output spec table
    pub output_spec: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_log")]
    pub log_path: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub options: ReconcileOptions,
}

fn default_log() -> PathBuf {
    PathBuf::from(DEFAULT_LOG)
}

/// Summary of a finished job
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub files_written: Vec<PathBuf>,
    pub error_count: usize,
}

impl RunConfig {
    /// A job skeleton pointing at conventional file names
    pub fn template(source_dirs: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        let index = source_dirs.is_empty().then(|| PathBuf::from("index.txt"));
        Self {
            index,
            source_dirs,
            mapping: PathBuf::from("mapping.csv"),
            output_spec: PathBuf::from("output_spec.csv"),
            output_dir,
            log_path: default_log(),
            format: ExportFormat::Csv,
            options: ReconcileOptions::default(),
        }
    }

    /// Load a job file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the job file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content).map_err(|e| Error::FileWrite {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// The source index, read from file or discovered by scanning
    pub fn source_index(&self) -> Result<SourceIndex> {
        match (&self.index, self.source_dirs.is_empty()) {
            (Some(index), _) => SourceIndex::load(index),
            (None, false) => scan_directory(&self.source_dirs),
            (None, true) => Err(Error::Config(
                "either a source index or at least one source directory is required".to_string(),
            )),
        }
    }

    /// Run the job. Nothing is written unless every table reconciles.
    pub fn execute(&self, sink: &mut dyn DiagnosticSink) -> Result<RunReport> {
        let catalog = Catalog::load(&self.mapping, &self.output_spec)?;
        info!(
            "loaded {} mappings for {} output tables",
            catalog.mappings().len(),
            catalog.output_tables().len()
        );

        let sources = load_sources(&self.source_index()?)?;
        let outcome = reconcile(catalog, sources, self.options.clone(), sink)?;
        let exported = export(&outcome, &self.output_dir, self.format)?;
        sink.flush()?;

        Ok(RunReport {
            stats: outcome.stats,
            files_written: exported.files_written,
            error_count: sink.error_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_file_defaults() {
        let job: RunConfig = serde_json::from_str(
            r#"{"index": "index.txt", "mapping": "m.csv", "output_spec": "s.csv", "output_dir": "out"}"#,
        )
        .unwrap();

        assert_eq!(job.log_path, PathBuf::from(DEFAULT_LOG));
        assert_eq!(job.format, ExportFormat::Csv);
        assert!(!job.options.symmetric_date_window);
        assert!(job.source_dirs.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");

        let mut job = RunConfig::template(vec![dir.path().to_path_buf()], PathBuf::from("out"));
        job.format = ExportFormat::Json;
        job.options.symmetric_date_window = true;
        job.save(&path).unwrap();

        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded, job);
        assert!(loaded.index.is_none());
    }

    #[test]
    fn test_no_sources_is_config_error() {
        let job = RunConfig::template(Vec::new(), PathBuf::from("out"));
        let job = RunConfig { index: None, ..job };
        assert!(matches!(job.source_index(), Err(Error::Config(_))));
    }
}
