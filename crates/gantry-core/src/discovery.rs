//! Local artifact discovery.
//!
//! Scans a folder for module archives and turns each one into a `Pending`
//! module record. File names carry the only version information available
//! locally, as a trailing `-<version>` suffix.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::tracker::ModuleRecord;

/// Version portion of an artifact file stem (`patient-1.0.4` → `1.0.4`).
///
/// Split on the last hyphen only, so `client-sync-2.1.7` yields `2.1.7`.
/// A stem without a hyphen has no version to offer and yields `"?"`.
pub fn version_from_stem(stem: &str) -> String {
    match stem.rsplit_once('-') {
        Some((_, version)) => version.to_string(),
        None => "?".to_string(),
    }
}

/// Scan `dir` for `.jar` artifacts, ordered by file name.
///
/// The ordering is the discovery order every later lookup depends on, so it
/// must be stable across runs.
pub fn scan_modules_dir(dir: &Path) -> Result<Vec<ModuleRecord>> {
    if !dir.is_dir() {
        bail!("modules directory {} does not exist", dir.display());
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read modules directory {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_archive = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
        if is_archive {
            paths.push(path);
        }
    }
    paths.sort();

    let records: Vec<ModuleRecord> = paths
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            let version = version_from_stem(&stem);
            Some(ModuleRecord::new(stem, path, version))
        })
        .collect();

    tracing::debug!(
        count = records.len(),
        dir = %dir.display(),
        "discovered local module artifacts"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_version_from_stem() {
        assert_eq!(version_from_stem("patient-1.0.4"), "1.0.4");
        assert_eq!(version_from_stem("client-sync-2.1.7"), "2.1.7");
        assert_eq!(version_from_stem("backup"), "?");
        assert_eq!(version_from_stem("patient-"), "");
    }

    #[test]
    fn test_scan_orders_by_file_name_and_parses_versions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "triage-0.9.2.jar");
        touch(dir.path(), "patient-1.0.4.jar");
        touch(dir.path(), "hiv-2.0.1.jar");

        let records = scan_modules_dir(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["hiv-2.0.1", "patient-1.0.4", "triage-0.9.2"]);
        assert_eq!(records[1].local_version, "1.0.4");
        assert_eq!(records[1].artifact_path, dir.path().join("patient-1.0.4.jar"));
    }

    #[test]
    fn test_scan_ignores_non_archives_and_subdirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "patient-1.0.4.jar");
        touch(dir.path(), "README.txt");
        touch(dir.path(), "notes.jar.bak");
        fs::create_dir(dir.path().join("nested.jar")).unwrap();

        let records = scan_modules_dir(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "patient-1.0.4");
    }

    #[test]
    fn test_scan_accepts_uppercase_extension() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "BACKUP-3.1.0.JAR");

        let records = scan_modules_dir(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].local_version, "3.1.0");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nowhere");
        let err = scan_modules_dir(&missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
