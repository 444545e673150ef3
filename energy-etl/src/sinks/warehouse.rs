use std::time::Duration;

use energy_client::{
    db::{self, TableRef, TableSummary},
    domain::EnergyReading,
};
use sqlx::{postgres::PgConnectOptions, Connection, PgConnection};

use crate::{
    config::WarehouseConfig,
    pipeline::{PipelineError, Sink, TableProbe},
};

const DEFAULT_PORT: u16 = 5432;

/// SQLSTATE for "database does not exist".
const INVALID_CATALOG_NAME: &str = "3D000";

/// Split `host[:port]`.
pub fn parse_account(account: &str) -> Result<(String, u16), String> {
    let account = account.trim();
    match account.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse()
                .map_err(|e| format!("invalid port in warehouse account '{account}': {e}"))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(format!("missing host in warehouse account '{account}'")),
        None if account.is_empty() => Err("warehouse account must not be empty".to_string()),
        None => Ok((account.to_string(), DEFAULT_PORT)),
    }
}

fn is_missing_database(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(INVALID_CATALOG_NAME))
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close warehouse connection cleanly");
    }
}

/// Replaces the contents of the energy table in one transaction.
///
/// Each call opens its own connection and closes it before returning,
/// whatever the outcome.
pub struct WarehouseSink {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    application_name: String,
    database: String,
    maintenance_database: String,
    table: TableRef,
    batch_size: usize,
    connect_timeout: Duration,
}

impl WarehouseSink {
    pub fn new(cfg: &WarehouseConfig) -> Result<Self, PipelineError> {
        let (host, port) = parse_account(&cfg.account).map_err(PipelineError::Load)?;
        let table = TableRef::new(&cfg.schema, &cfg.table).map_err(|e| PipelineError::Load(e.to_string()))?;
        db::validate_identifier(&cfg.database).map_err(|e| PipelineError::Load(e.to_string()))?;
        db::validate_identifier(&cfg.maintenance_database).map_err(|e| PipelineError::Load(e.to_string()))?;

        Ok(Self {
            host,
            port,
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            application_name: cfg.warehouse.clone(),
            // Unquoted DDL folds to lower case, while connecting matches the
            // name exactly, so both sides must use the folded spelling.
            database: cfg.database.to_ascii_lowercase(),
            maintenance_database: cfg.maintenance_database.to_ascii_lowercase(),
            table,
            batch_size: cfg.batch_size.max(1),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Target database name as it is stored in the catalog.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(database)
            .application_name(&self.application_name);
        if let Some(password) = &self.password {
            opts = opts.password(password);
        }
        opts
    }

    async fn try_connect(&self, database: &str) -> Result<PgConnection, sqlx::Error> {
        let opts = self.connect_options(database);
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&opts)).await {
            Ok(res) => res,
            Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no connection within {:?}", self.connect_timeout),
            ))),
        }
    }

    async fn connect(&self, database: &str) -> Result<PgConnection, PipelineError> {
        self.try_connect(database).await.map_err(|e| {
            PipelineError::Load(format!(
                "failed to connect to warehouse {}:{}/{database}: {e}",
                self.host, self.port
            ))
        })
    }

    /// Connect to the target database, creating it first if it is missing.
    async fn connect_target(&self) -> Result<PgConnection, PipelineError> {
        match self.try_connect(&self.database).await {
            Ok(conn) => Ok(conn),
            Err(e) if is_missing_database(&e) => {
                self.create_database().await?;
                self.connect(&self.database).await
            }
            Err(e) => Err(PipelineError::Load(format!(
                "failed to connect to warehouse {}:{}/{}: {e}",
                self.host, self.port, self.database
            ))),
        }
    }

    async fn create_database(&self) -> Result<(), PipelineError> {
        let mut conn = self.connect(&self.maintenance_database).await?;

        let res = async {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(&self.database)
                .fetch_one(&mut conn)
                .await?;
            if !exists {
                sqlx::query(&format!("CREATE DATABASE {}", self.database))
                    .execute(&mut conn)
                    .await?;
                tracing::info!(database = %self.database, "created warehouse database");
            }
            Ok::<_, sqlx::Error>(())
        }
        .await;

        close(conn).await;
        res.map_err(|e| PipelineError::Load(format!("failed to create database {}: {e}", self.database)))
    }

    async fn ensure_schema(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(&self.table.create_schema_sql()).execute(&mut *conn).await?;
        sqlx::query(&self.table.create_table_sql()).execute(&mut *conn).await?;
        tracing::debug!(table = %self.table, "schema and table ensured");
        Ok(())
    }

    /// Delete everything and bulk insert `rows` inside one transaction, so
    /// readers never see an empty table and a failure keeps the old rows.
    async fn replace_rows(&self, conn: &mut PgConnection, rows: &[EnergyReading]) -> anyhow::Result<u64> {
        self.ensure_schema(conn).await?;

        let mut tx = conn.begin().await?;
        let deleted = sqlx::query(&self.table.delete_all_sql())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted: u64 = 0;
        for chunk in rows.chunks(self.batch_size) {
            inserted += db::insert_readings(&mut *tx, &self.table, chunk).await?;
        }

        if inserted != rows.len() as u64 {
            // Dropping `tx` rolls back.
            anyhow::bail!("inserted {inserted} rows but {} were supplied", rows.len());
        }

        tx.commit().await?;
        tracing::info!(table = %self.table, deleted, inserted, "warehouse table replaced");
        Ok(inserted)
    }

    pub async fn summary(&self) -> Result<TableSummary, PipelineError> {
        let mut conn = self.connect(&self.database).await?;
        let res = db::table_summary(&mut conn, &self.table).await;
        close(conn).await;
        res.map_err(|e| PipelineError::Load(format!("failed to summarise {}: {e:#}", self.table)))
    }
}

#[async_trait::async_trait]
impl Sink<EnergyReading> for WarehouseSink {
    async fn replace(&self, rows: &[EnergyReading]) -> Result<u64, PipelineError> {
        let mut conn = self.connect_target().await?;
        let res = self.replace_rows(&mut conn, rows).await;
        close(conn).await;

        match res {
            Ok(inserted) => Ok(inserted),
            Err(e) => {
                metrics::counter!("etl_warehouse_errors_total").increment(1);
                Err(PipelineError::Load(format!("failed to replace {}: {e:#}", self.table)))
            }
        }
    }
}

#[async_trait::async_trait]
impl TableProbe for WarehouseSink {
    async fn row_count(&self) -> Result<i64, PipelineError> {
        let mut conn = self.connect(&self.database).await?;
        let res = db::row_count(&mut conn, &self.table).await;
        close(conn).await;
        res.map_err(|e| PipelineError::Load(format!("failed to count rows in {}: {e:#}", self.table)))
    }
}
