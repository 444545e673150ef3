use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::pipeline::{PipelineError, TableProbe};

/// Post-load integrity check: the transformed file is on disk and the
/// warehouse table holds the expected rows.
#[derive(Debug, Clone)]
pub struct IntegrityCheck {
    transformed_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub transformed_file_exists: bool,
    pub warehouse_rows: i64,
    /// Rows the load stage reported; `None` when checking standalone.
    pub expected_rows: Option<u64>,
}

impl VerificationReport {
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.transformed_file_exists {
            out.push("transformed file is missing".to_string());
        }
        if self.warehouse_rows <= 0 {
            out.push("warehouse table is empty".to_string());
        }
        if let Some(expected) = self.expected_rows {
            if self.warehouse_rows > 0 && self.warehouse_rows as u64 != expected {
                out.push(format!(
                    "warehouse holds {} rows, expected {expected}",
                    self.warehouse_rows
                ));
            }
        }
        out
    }

    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failures();
        if failures.is_empty() {
            write!(f, "all checks passed ({} rows)", self.warehouse_rows)
        } else {
            f.write_str(&failures.join("; "))
        }
    }
}

impl IntegrityCheck {
    pub fn new<P: Into<PathBuf>>(transformed_path: P) -> Self {
        Self {
            transformed_path: transformed_path.into(),
        }
    }

    pub fn transformed_path(&self) -> &Path {
        &self.transformed_path
    }

    /// Gather the report. A failed check is still `Ok`; only an unreadable
    /// destination is an error.
    pub async fn run<P>(&self, probe: &P, expected_rows: Option<u64>) -> Result<VerificationReport, PipelineError>
    where
        P: TableProbe + ?Sized,
    {
        let transformed_file_exists = tokio::fs::try_exists(&self.transformed_path)
            .await
            .map_err(|e| {
                PipelineError::Verify(format!(
                    "cannot stat {}: {e}",
                    self.transformed_path.display()
                ))
            })?;

        let warehouse_rows = probe
            .row_count()
            .await
            .map_err(|e| PipelineError::Verify(format!("warehouse row count failed: {e}")))?;

        let report = VerificationReport {
            transformed_file_exists,
            warehouse_rows,
            expected_rows,
        };

        if report.passed() {
            tracing::info!(rows = warehouse_rows, "integrity check passed");
        } else {
            for failure in report.failures() {
                tracing::warn!(%failure, "integrity check failed");
            }
        }

        Ok(report)
    }
}
