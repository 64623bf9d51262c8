use crate::error::{MatchError, RowFailure};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of one processed row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Found {
        page: u32,
        receipt: PathBuf,
        output: PathBuf,
    },
    NotFound(RowFailure),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// (sheet row number, outcome) in processing order.
    pub outcomes: Vec<(u32, RowOutcome)>,
    /// Blank rows left untouched.
    pub skipped: usize,
    /// Where the spreadsheet was written.
    pub spreadsheet: Option<PathBuf>,
}

impl RunSummary {
    pub fn record(&mut self, row: u32, outcome: RowOutcome) {
        self.outcomes.push((row, outcome));
    }

    pub fn found_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RowOutcome::Found { .. }))
            .count()
    }

    pub fn not_found_count(&self) -> usize {
        self.outcomes.len() - self.found_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (u32, &RowFailure)> {
        self.outcomes.iter().filter_map(|(row, o)| match o {
            RowOutcome::NotFound(f) => Some((*row, f)),
            RowOutcome::Found { .. } => None,
        })
    }

    fn to_report(&self) -> JsonReport {
        JsonReport {
            found: self.found_count(),
            not_found: self.not_found_count(),
            skipped: self.skipped,
            spreadsheet: self.spreadsheet.clone(),
            rows: self
                .outcomes
                .iter()
                .map(|(row, outcome)| match outcome {
                    RowOutcome::Found {
                        page,
                        receipt,
                        output,
                    } => JsonRow {
                        row: *row,
                        found: true,
                        page: Some(*page),
                        receipt: Some(receipt.clone()),
                        output: Some(output.clone()),
                        reason: None,
                    },
                    RowOutcome::NotFound(failure) => JsonRow {
                        row: *row,
                        found: false,
                        page: None,
                        receipt: None,
                        output: None,
                        reason: Some(failure.to_string()),
                    },
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON with one entry per processed row.
    pub fn write_json(&self, path: &Path) -> Result<(), MatchError> {
        let json = serde_json::to_string_pretty(&self.to_report()).map_err(|e| MatchError::write(path, e))?;
        fs::write(path, json).map_err(|e| MatchError::write(path, e))
    }
}

#[derive(Serialize)]
struct JsonReport {
    found: usize,
    not_found: usize,
    skipped: usize,
    spreadsheet: Option<PathBuf>,
    rows: Vec<JsonRow>,
}

#[derive(Serialize)]
struct JsonRow {
    row: u32,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Found: {}  Not found: {}  (of {} rows)",
            self.found_count(),
            self.not_found_count(),
            self.outcomes.len()
        )?;
        if self.skipped > 0 {
            writeln!(f, "Blank rows skipped: {}", self.skipped)?;
        }
        for (row, failure) in self.failures() {
            writeln!(f, "  row {row}: {failure}")?;
        }
        if let Some(path) = &self.spreadsheet {
            writeln!(f, "Spreadsheet updated: {}", path.display())?;
        }
        Ok(())
    }
}
