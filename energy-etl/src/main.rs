use anyhow::Result;
use energy_etl::{
    config::AppConfig,
    metrics_export,
    observability,
    pipeline::Pipeline,
    sinks::WarehouseSink,
    sources::KaggleDatasetSource,
    transform::EnergyTransform,
    verify::IntegrityCheck,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let exporter = metrics_export::init(cfg.metrics.as_ref())?;

    let transformed_path = cfg.dataset.transformed_path();
    let pipeline = Pipeline {
        source: KaggleDatasetSource::new(&cfg.dataset)?,
        transform: EnergyTransform::new(
            cfg.dataset.raw_path(),
            &transformed_path,
            cfg.transform.strict_categories,
        ),
        sink: WarehouseSink::new(&cfg.warehouse)?,
        check: IntegrityCheck::new(&transformed_path),
    };

    tracing::info!(
        dataset = %cfg.dataset.id,
        table = %format!("{}.{}.{}", cfg.warehouse.database, cfg.warehouse.schema, cfg.warehouse.table),
        "starting energy consumption ETL run"
    );
    let result = pipeline.run().await;

    if let Some(exporter) = &exporter {
        if let Err(e) = exporter.write() {
            tracing::warn!(error = %e, "failed to write metrics textfile");
        }
    }

    let report = result?;
    tracing::info!(
        fetch = %report.fetch,
        rows_transformed = report.rows_transformed,
        rows_loaded = report.rows_loaded,
        verification = %report.verification,
        "ETL run finished"
    );

    Ok(())
}
