//! Fuzzy name matching between graph keys, local artifact names, and the
//! names the server reports.
//!
//! Artifacts are named by file stem (`hiv-2.0.1`), graph keys are short
//! (`HIV`), and the server may decorate its names (`HIVModule`). None of
//! these agree exactly, so the bridge is deliberately loose: a
//! case-insensitive substring test in either direction, first match in
//! discovery order. Loose matching is compatibility behavior and must stay
//! exactly this loose.

use crate::tracker::ModuleRecord;

/// True when either name contains the other, ignoring case.
pub fn names_overlap(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a)
}

/// Index of the first record whose name overlaps `key`, in discovery order.
///
/// Returns at most one record and never disambiguates by version; callers
/// that need determinism rely on the discovery order being stable.
pub fn find_record_index(key: &str, records: &[ModuleRecord]) -> Option<usize> {
    records
        .iter()
        .position(|record| names_overlap(key, &record.name))
}

/// First record whose name overlaps `key`, in discovery order.
pub fn find_record<'a>(key: &str, records: &'a [ModuleRecord]) -> Option<&'a ModuleRecord> {
    find_record_index(key, records).map(|index| &records[index])
}
