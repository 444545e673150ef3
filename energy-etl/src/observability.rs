use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "energy_etl=info,energy_client=info,warn";

/// `RUST_LOG` wins when set; otherwise the job logs its own stages at info.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
