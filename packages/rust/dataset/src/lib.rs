//! Local medicine dataset: CSV loading and first-match lookup.
//!
//! The dataset is loaded once at startup and never mutated. Lookup is a pure
//! function of the record table and the query, so it can be called any number
//! of times with the same result. Formatting a hit lives in [`format`] so the
//! lookup stays independently testable.

mod format;

use std::io::Read;
use std::path::Path;

use medinfo_shared::{MedicineRecord, MedinfoError, Result};
use tracing::{debug, info, instrument};

pub use format::format_record;

/// Columns every dataset file must carry.
const REQUIRED_COLUMNS: [&str; 9] = [
    "Medicine Name",
    "Composition",
    "Uses",
    "Side_effects",
    "Image URL",
    "Manufacturer",
    "Excellent Review %",
    "Average Review %",
    "Poor Review %",
];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Trim and lowercase a raw query. Returns `None` for empty input.
fn normalize_query(query: &str) -> Option<String> {
    let normalized = query.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Return the first record whose lowercased name contains the normalized query.
///
/// Empty or whitespace-only queries never match.
pub fn lookup_medicine<'a>(query: &str, records: &'a [MedicineRecord]) -> Option<&'a MedicineRecord> {
    let needle = normalize_query(query)?;
    records
        .iter()
        .find(|record| record.name.to_lowercase().contains(&needle))
}

// ---------------------------------------------------------------------------
// MedicineDataset
// ---------------------------------------------------------------------------

/// Immutable, in-memory medicine table.
#[derive(Debug, Clone, Default)]
pub struct MedicineDataset {
    records: Vec<MedicineRecord>,
}

impl MedicineDataset {
    /// Build a dataset from already-parsed records (table order is preserved).
    pub fn new(records: Vec<MedicineRecord>) -> Self {
        Self { records }
    }

    /// Load the dataset from a CSV file. Any failure is fatal to startup.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| MedinfoError::io(path, e))?;
        let dataset = Self::from_reader(file)?;
        info!(records = dataset.len(), "medicine dataset loaded");
        Ok(dataset)
    }

    /// Parse CSV from any reader. Columns are resolved by header name.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| MedinfoError::dataset(format!("failed to read header row: {e}")))?
            .clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(MedinfoError::dataset(format!("missing column `{column}`")));
            }
        }

        let mut records = Vec::new();
        for (i, row) in rdr.deserialize::<MedicineRecord>().enumerate() {
            // Header is line 1, so data row i sits on line i + 2.
            let line = i + 2;
            let record =
                row.map_err(|e| MedinfoError::dataset(format!("unreadable row at line {line}: {e}")))?;
            validate_record(&record, line)?;
            records.push(record);
        }

        debug!(records = records.len(), "parsed medicine rows");
        Ok(Self { records })
    }

    /// First-match lookup (see [`lookup_medicine`]).
    pub fn lookup(&self, query: &str) -> Option<&MedicineRecord> {
        lookup_medicine(query, &self.records)
    }

    /// All records matching `query`, in table order.
    ///
    /// An empty query lists every record, which is what a browser wants.
    pub fn filter(&self, query: &str) -> Vec<&MedicineRecord> {
        match normalize_query(query) {
            Some(needle) => self
                .records
                .iter()
                .filter(|r| r.name.to_lowercase().contains(&needle))
                .collect(),
            None => self.records.iter().collect(),
        }
    }

    pub fn records(&self) -> &[MedicineRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reject rows whose review percentages fall outside 0-100.
fn validate_record(record: &MedicineRecord, line: usize) -> Result<()> {
    for (label, pct) in ["Excellent", "Average", "Poor"].iter().zip(record.reviews()) {
        if !(0.0..=100.0).contains(&pct) {
            return Err(MedinfoError::dataset(format!(
                "line {line} ({}): {label} review {pct}% is outside 0-100",
                record.name
            )));
        }
    }
    Ok(())
}
