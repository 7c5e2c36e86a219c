//! Source discovery: the `name|form_id|file_path` index and directory scans

use crate::error::{Error, Result};
use crate::parser::parse_csv_as;
use crate::table::SourceTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One line of a source index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Human-readable form name
    pub name: String,
    /// Form id the mapping table refers to
    pub form_id: String,
    /// Path to the form's CSV export
    pub path: PathBuf,
}

/// The list of source forms for a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceIndex {
    pub entries: Vec<IndexEntry>,
}

impl SourceIndex {
    /// Load an index file; relative paths resolve against the index's directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let index = Self::parse(&content, base);

        if index.entries.is_empty() {
            return Err(Error::SourceIndex {
                path: path.to_path_buf(),
                message: "no 'name|form_id|file_path' lines found".to_string(),
            });
        }
        Ok(index)
    }

    /// Parse index text. Lines without exactly three fields are skipped.
    pub fn parse(content: &str, base: &Path) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').map(str::trim).collect();
                if parts.len() != 3 {
                    if !line.trim().is_empty() {
                        debug!("skipping index line '{}'", line);
                    }
                    return None;
                }
                let file = PathBuf::from(parts[2]);
                let path = if file.is_relative() { base.join(file) } else { file };
                Some(IndexEntry {
                    name: parts[0].to_string(),
                    form_id: parts[1].to_string(),
                    path,
                })
            })
            .collect();

        Self { entries }
    }

    /// Find an entry by form id
    pub fn find_form(&self, form_id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.form_id == form_id)
    }

    /// Get all form ids
    pub fn form_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.form_id.as_str()).collect()
    }
}

/// Scan one or more directories for CSV files; each file becomes a form
/// whose id is the file stem. Entries are sorted by form id.
pub fn scan_directory<P: AsRef<Path>>(roots: &[P]) -> Result<SourceIndex> {
    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();

    for root in roots {
        for entry in WalkDir::new(root.as_ref()).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some(previous) = found.insert(stem.to_string(), path.to_path_buf()) {
                        warn!(
                            "form '{}' found twice, {} replaces {}",
                            stem,
                            path.display(),
                            previous.display()
                        );
                    }
                }
            }
        }
    }

    let entries = found
        .into_iter()
        .map(|(form_id, path)| IndexEntry {
            name: form_id.clone(),
            form_id,
            path,
        })
        .collect();

    Ok(SourceIndex { entries })
}

/// All loaded source tables, keyed by form id
#[derive(Debug, Clone, Default)]
pub struct Sources {
    tables: BTreeMap<String, SourceTable>,
}

impl Sources {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name, replacing any previous one
    pub fn insert(&mut self, table: SourceTable) -> Option<SourceTable> {
        self.tables.insert(table.name.clone(), table)
    }

    pub fn get(&self, form_id: &str) -> Option<&SourceTable> {
        self.tables.get(form_id)
    }

    pub fn get_mut(&mut self, form_id: &str) -> Option<&mut SourceTable> {
        self.tables.get_mut(form_id)
    }

    pub fn contains(&self, form_id: &str) -> bool {
        self.tables.contains_key(form_id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn form_ids(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl FromIterator<SourceTable> for Sources {
    fn from_iter<I: IntoIterator<Item = SourceTable>>(iter: I) -> Self {
        let mut sources = Sources::new();
        for table in iter {
            sources.insert(table);
        }
        sources
    }
}

/// Read every form listed in the index
pub fn load_sources(index: &SourceIndex) -> Result<Sources> {
    let mut sources = Sources::new();

    for entry in &index.entries {
        let table = parse_csv_as(&entry.path, entry.form_id.clone())?;
        info!(
            "loaded form '{}' ({}): {} rows, {} columns",
            entry.form_id,
            entry.name,
            table.row_count(),
            table.column_count()
        );
        if sources.insert(table).is_some() {
            warn!("form id '{}' listed more than once, keeping the later file", entry.form_id);
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_lines() {
        let text = "Vitals|vitals|data/vitals.csv\nbad line\n\nLabs|labs|/abs/labs.csv\n";
        let index = SourceIndex::parse(text, Path::new("/run"));

        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].name, "Vitals");
        assert_eq!(index.entries[0].form_id, "vitals");
        assert_eq!(index.entries[0].path, PathBuf::from("/run/data/vitals.csv"));
        assert_eq!(index.entries[1].path, PathBuf::from("/abs/labs.csv"));
    }

    #[test]
    fn test_parse_index_skips_wrong_field_count() {
        let text = "a|b\na|b|c|d\nName|id|f.csv";
        let index = SourceIndex::parse(text, Path::new(""));

        assert_eq!(index.form_ids(), vec!["id"]);
        assert!(index.find_form("id").is_some());
        assert!(index.find_form("b").is_none());
    }

    #[test]
    fn test_index_serializes_entries() {
        let index = SourceIndex::parse("Labs|labs|/abs/labs.csv\n", Path::new(""));
        let value = serde_json::to_value(&index).unwrap();

        assert_eq!(value["entries"][0]["form_id"], "labs");
        assert_eq!(value["entries"][0]["path"], "/abs/labs.csv");
    }

    #[test]
    fn test_scan_directory_finds_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("enroll.csv"), "id\n1\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("visit.csv"), "id\n1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let index = scan_directory(&[dir.path()]).unwrap();
        assert_eq!(index.form_ids(), vec!["enroll", "visit"]);
    }

    #[test]
    fn test_load_sources_uses_form_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export_2020.csv");
        fs::write(&file, "id,x\n1,a\n").unwrap();

        let index = SourceIndex {
            entries: vec![IndexEntry {
                name: "Export".to_string(),
                form_id: "f1".to_string(),
                path: file,
            }],
        };
        let sources = load_sources(&index).unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources.get("f1").unwrap().row_count(), 1);
    }
}
