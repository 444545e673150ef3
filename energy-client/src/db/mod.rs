pub mod energy_queries;

pub use energy_queries::{
    insert_readings, row_count, table_summary, validate_identifier, InvalidIdentifier, TableRef, TableSummary,
    COLUMNS,
};
