use std::{future::Future, path::PathBuf, time::Instant};

use energy_client::domain::EnergyReading;

use crate::{
    sources::DatasetError,
    transform::EnergyTransform,
    verify::{IntegrityCheck, VerificationReport},
};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("extract error: {0}")]
    Extract(#[from] DatasetError),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("load error: {0}")]
    Load(String),
    #[error("verify error: {0}")]
    Verify(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extract(_) => "extract",
            Self::Transform(_) => "transform",
            Self::Load(_) => "load",
            Self::Verify(_) => "verify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A new archive was downloaded and unpacked.
    Downloaded { files: Vec<PathBuf>, bytes: u64 },
    /// The local copy already matches the published dataset.
    UpToDate,
}

impl std::fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downloaded { files, bytes } => write!(f, "downloaded {bytes} bytes, {} file(s)", files.len()),
            Self::UpToDate => f.write_str("already up to date"),
        }
    }
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self) -> Result<FetchOutcome, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T: Sync>: Send + Sync {
    /// Replace the destination's contents with `rows`, returning rows written.
    async fn replace(&self, rows: &[T]) -> Result<u64, PipelineError>;
}

/// Read-only view of the destination used by post-load checks.
#[async_trait::async_trait]
pub trait TableProbe: Send + Sync {
    /// Count stored rows over a fresh connection.
    async fn row_count(&self) -> Result<i64, PipelineError>;
}

pub struct Pipeline<S, K> {
    pub source: S,
    pub transform: EnergyTransform,
    pub sink: K,
    pub check: IntegrityCheck,
}

#[derive(Debug)]
pub struct RunReport {
    pub fetch: FetchOutcome,
    pub rows_transformed: usize,
    pub rows_loaded: u64,
    pub verification: VerificationReport,
}

impl<S, K> Pipeline<S, K>
where
    S: Source,
    K: Sink<EnergyReading> + TableProbe,
{
    /// Fetch, transform, load, verify. The first failing stage ends the run.
    pub async fn run(self) -> Result<RunReport, PipelineError> {
        let raw_path = self.transform.input_path().to_path_buf();
        let fetch = timed("extract", async {
            let outcome = self.source.fetch().await?;
            if !tokio::fs::try_exists(&raw_path).await.unwrap_or(false) {
                return Err(PipelineError::from(DatasetError::MissingRawFile(raw_path.clone())));
            }
            tracing::info!(outcome = %outcome, path = %raw_path.display(), "raw dataset ready");
            Ok::<_, PipelineError>(outcome)
        })
        .await?;

        let transform = self.transform.clone();
        let rows = timed("transform", async move {
            let rows = tokio::task::spawn_blocking(move || transform.run())
                .await
                .map_err(|e| PipelineError::Transform(format!("transform task failed: {e}")))??;
            // Loading an empty table would wipe the previous contents.
            if rows.is_empty() {
                return Err(PipelineError::Transform(
                    "raw dataset has no rows; warehouse table left untouched".to_string(),
                ));
            }
            Ok(rows)
        })
        .await?;
        metrics::counter!("etl_rows_transformed_total").increment(rows.len() as u64);

        let rows_loaded = timed("load", self.sink.replace(&rows)).await?;
        metrics::counter!("etl_rows_loaded_total").increment(rows_loaded);

        let expected = rows.len() as u64;
        let verification = timed("verify", async {
            let report = self.check.run(&self.sink, Some(expected)).await?;
            if report.passed() {
                Ok(report)
            } else {
                Err(PipelineError::Verify(report.to_string()))
            }
        })
        .await?;

        Ok(RunReport {
            fetch,
            rows_transformed: rows.len(),
            rows_loaded,
            verification,
        })
    }
}

async fn timed<F, T>(stage: &'static str, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    let started = Instant::now();
    tracing::info!(stage, "stage started");

    let res = fut.await;
    let elapsed = started.elapsed();
    metrics::histogram!("etl_stage_duration_seconds", "stage" => stage).record(elapsed.as_secs_f64());

    match &res {
        Ok(_) => tracing::info!(stage, elapsed_ms = elapsed.as_millis() as u64, "stage completed"),
        Err(e) => {
            metrics::counter!("etl_stage_failures_total", "stage" => stage).increment(1);
            tracing::error!(stage, error = %e, "stage failed, aborting run");
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{raw_csv, SATURDAY_ROW, WEEKDAY_ROW};
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    /// Writes a fixed raw CSV, standing in for the dataset API.
    struct FixtureSource {
        raw_path: PathBuf,
        contents: String,
    }

    #[async_trait::async_trait]
    impl Source for FixtureSource {
        async fn fetch(&self) -> Result<FetchOutcome, PipelineError> {
            std::fs::write(&self.raw_path, &self.contents).map_err(DatasetError::from)?;
            Ok(FetchOutcome::Downloaded {
                files: vec![self.raw_path.clone()],
                bytes: self.contents.len() as u64,
            })
        }
    }

    struct UnreachableSource;

    #[async_trait::async_trait]
    impl Source for UnreachableSource {
        async fn fetch(&self) -> Result<FetchOutcome, PipelineError> {
            Err(DatasetError::Unreachable {
                url: "http://127.0.0.1:1".to_string(),
                reason: "connection refused".to_string(),
            }
            .into())
        }
    }

    /// Source that reports success without producing any file.
    struct SilentSource;

    #[async_trait::async_trait]
    impl Source for SilentSource {
        async fn fetch(&self) -> Result<FetchOutcome, PipelineError> {
            Ok(FetchOutcome::UpToDate)
        }
    }

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<EnergyReading>>,
        replaces: AtomicUsize,
        drop_writes: bool,
    }

    #[async_trait::async_trait]
    impl Sink<EnergyReading> for MemorySink {
        async fn replace(&self, rows: &[EnergyReading]) -> Result<u64, PipelineError> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            let mut stored = self.rows.lock().unwrap();
            stored.clear();
            if !self.drop_writes {
                stored.extend_from_slice(rows);
            }
            Ok(rows.len() as u64)
        }
    }

    #[async_trait::async_trait]
    impl TableProbe for MemorySink {
        async fn row_count(&self) -> Result<i64, PipelineError> {
            Ok(self.rows.lock().unwrap().len() as i64)
        }
    }

    /// Lets a test inspect the sink after `run` consumed the pipeline.
    struct Shared(Arc<MemorySink>);

    #[async_trait::async_trait]
    impl Sink<EnergyReading> for Shared {
        async fn replace(&self, rows: &[EnergyReading]) -> Result<u64, PipelineError> {
            self.0.replace(rows).await
        }
    }

    #[async_trait::async_trait]
    impl TableProbe for Shared {
        async fn row_count(&self) -> Result<i64, PipelineError> {
            self.0.row_count().await
        }
    }

    fn pipeline<S: Source>(dir: &Path, source: S, sink: MemorySink) -> Pipeline<S, MemorySink> {
        let transformed = dir.join("transformed.csv");
        Pipeline {
            source,
            transform: EnergyTransform::new(dir.join("raw.csv"), &transformed, true),
            sink,
            check: IntegrityCheck::new(&transformed),
        }
    }

    fn fixture(dir: &Path) -> FixtureSource {
        FixtureSource {
            raw_path: dir.join("raw.csv"),
            contents: raw_csv(&[SATURDAY_ROW, WEEKDAY_ROW, WEEKDAY_ROW]),
        }
    }

    #[tokio::test]
    async fn full_run_loads_every_transformed_row() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), fixture(dir.path()), MemorySink::default());

        let report = p.run().await.unwrap();

        assert_eq!(report.rows_transformed, 3);
        assert_eq!(report.rows_loaded, 3);
        assert_eq!(report.verification.warehouse_rows, 3);
        assert!(report.verification.passed());
        assert!(dir.path().join("transformed.csv").exists());
    }

    #[tokio::test]
    async fn running_twice_converges_to_the_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            let transformed = dir.path().join("transformed.csv");
            let p = Pipeline {
                source: fixture(dir.path()),
                transform: EnergyTransform::new(dir.path().join("raw.csv"), &transformed, true),
                sink: Shared(sink.clone()),
                check: IntegrityCheck::new(&transformed),
            };
            let report = p.run().await.unwrap();
            assert_eq!(report.verification.warehouse_rows, 3);
            snapshots.push(sink.rows.lock().unwrap().clone());
        }

        assert_eq!(sink.replaces.load(Ordering::SeqCst), 2);
        assert_eq!(snapshots[0], snapshots[1]);
    }

    #[tokio::test]
    async fn fetch_failure_stops_before_transform() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), UnreachableSource, MemorySink::default());

        let err = p.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Extract(DatasetError::Unreachable { .. })));
        assert_eq!(err.stage(), "extract");
        assert!(!dir.path().join("transformed.csv").exists());
    }

    #[tokio::test]
    async fn missing_raw_file_after_fetch_is_an_extract_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), SilentSource, MemorySink::default());

        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Extract(DatasetError::MissingRawFile(_))));
    }

    #[tokio::test]
    async fn empty_destination_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink {
            drop_writes: true,
            ..MemorySink::default()
        };
        let p = pipeline(dir.path(), fixture(dir.path()), sink);

        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Verify(_)), "got {err}");
    }

    #[tokio::test]
    async fn missing_columns_fail_the_transform_stage() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource {
            raw_path: dir.path().join("raw.csv"),
            contents: "Timestamp,Temperature\n2024-01-06 14:00:00,20.5\n".to_string(),
        };
        let p = pipeline(dir.path(), source, MemorySink::default());

        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
        assert!(!dir.path().join("transformed.csv").exists());
    }

    #[tokio::test]
    async fn header_only_dataset_never_reaches_the_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let transformed = dir.path().join("transformed.csv");
        let run_with = |contents: String| Pipeline {
            source: FixtureSource {
                raw_path: dir.path().join("raw.csv"),
                contents,
            },
            transform: EnergyTransform::new(dir.path().join("raw.csv"), &transformed, true),
            sink: Shared(sink.clone()),
            check: IntegrityCheck::new(&transformed),
        };

        run_with(raw_csv(&[SATURDAY_ROW, WEEKDAY_ROW, WEEKDAY_ROW])).run().await.unwrap();
        let err = run_with(raw_csv(&[])).run().await.unwrap_err();

        assert!(matches!(err, PipelineError::Transform(_)), "got {err}");
        assert_eq!(err.stage(), "transform");
        assert_eq!(sink.replaces.load(Ordering::SeqCst), 1);
        assert_eq!(sink.rows.lock().unwrap().len(), 3);
    }
}
