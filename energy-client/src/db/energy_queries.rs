use anyhow::Result;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::domain::EnergyReading;

/// Warehouse layout of the energy consumption table, in insert order.
///
/// Names are upper case and always emitted unquoted so the warehouse folds
/// them with its own case-insensitive identifier rules.
pub const COLUMNS: [(&str, &str); 12] = [
    ("TIMESTAMP", "TIMESTAMP"),
    ("TEMPERATURE", "DOUBLE PRECISION"),
    ("HUMIDITY", "DOUBLE PRECISION"),
    ("SQUAREFOOTAGE", "DOUBLE PRECISION"),
    ("OCCUPANCY", "INT"),
    ("HVACUSAGE", "INT"),
    ("LIGHTINGUSAGE", "INT"),
    ("RENEWABLEENERGY", "DOUBLE PRECISION"),
    ("HOLIDAY", "INT"),
    ("HOUR", "INT"),
    ("WEEKEND", "INT"),
    ("ENERGYCONSUMPTION", "DOUBLE PRECISION"),
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid identifier '{0}': expected letters, digits and underscores, not starting with a digit")]
pub struct InvalidIdentifier(pub String);

/// Reject anything that cannot be used as a bare SQL identifier.
pub fn validate_identifier(name: &str) -> Result<(), InvalidIdentifier> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(InvalidIdentifier(name.to_string()))
    }
}

/// Schema-qualified name of the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Result<Self, InvalidIdentifier> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.to_ascii_uppercase(),
            table: table.to_ascii_uppercase(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema)
    }

    pub fn create_table_sql(&self) -> String {
        let columns = COLUMNS
            .iter()
            .map(|(name, ty)| format!("    {name} {ty}"))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{columns}\n)", self.qualified())
    }

    pub fn delete_all_sql(&self) -> String {
        format!("DELETE FROM {}", self.qualified())
    }

    fn insert_prefix(&self) -> String {
        let names = COLUMNS.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ");
        format!("INSERT INTO {} ({names}) ", self.qualified())
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TableSummary {
    pub row_count: i64,
    pub first_ts: Option<PrimitiveDateTime>,
    pub last_ts: Option<PrimitiveDateTime>,
}

/// Insert one chunk of readings as a single multi-row `INSERT`.
///
/// Callers keep chunks small enough to stay under the wire protocol's bind
/// parameter limit (12 binds per row).
pub async fn insert_readings(
    conn: &mut PgConnection,
    table: &TableRef,
    rows: &[EnergyReading],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(table.insert_prefix());
    builder.push_values(rows, |mut b, r| {
        b.push_bind(r.ts)
            .push_bind(r.temperature)
            .push_bind(r.humidity)
            .push_bind(r.square_footage)
            .push_bind(r.occupancy)
            .push_bind(r.hvac_usage)
            .push_bind(r.lighting_usage)
            .push_bind(r.renewable_energy)
            .push_bind(r.holiday)
            .push_bind(r.hour)
            .push_bind(r.weekend)
            .push_bind(r.energy_consumption);
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn row_count(conn: &mut PgConnection, table: &TableRef) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.qualified());
    let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut *conn).await?;
    Ok(count)
}

/// Row count plus the covered time range.
pub async fn table_summary(conn: &mut PgConnection, table: &TableRef) -> Result<TableSummary> {
    // Qualify TIMESTAMP so it is never read as a type keyword.
    let sql = format!(
        r#"
        SELECT
            COUNT(*)          AS row_count,
            MIN(t.TIMESTAMP)  AS first_ts,
            MAX(t.TIMESTAMP)  AS last_ts
        FROM {} AS t
        "#,
        table.qualified()
    );

    let summary = sqlx::query_as::<_, TableSummary>(&sql)
        .fetch_one(&mut *conn)
        .await?;

    Ok(summary)
}
