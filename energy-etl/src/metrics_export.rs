use std::path::PathBuf;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Prometheus recorder whose output is written to a textfile when the job
/// ends, for pickup by a node exporter textfile collector.
pub struct TextfileExporter {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl TextfileExporter {
    pub fn write(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so the collector never reads a partial file.
        let tmp = self.path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.handle.render())
            .with_context(|| format!("failed to write metrics to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move metrics into {}", self.path.display()))?;
        Ok(())
    }
}

/// Install the global recorder when a textfile path is configured.
///
/// Without it the `metrics` macros stay no-ops.
pub fn init(cfg: Option<&MetricsConfig>) -> anyhow::Result<Option<TextfileExporter>> {
    let Some(cfg) = cfg else {
        return Ok(None);
    };

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;

    Ok(Some(TextfileExporter {
        handle,
        path: cfg.textfile_path.clone(),
    }))
}
