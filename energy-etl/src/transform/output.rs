use std::{fs::File, path::Path};

use energy_client::domain::EnergyReading;
use time::{macros::format_description, PrimitiveDateTime};

use super::raw::{column_indexes, field, parse_count, parse_f64, parse_timestamp};
use crate::pipeline::PipelineError;

/// Header of the transformed file: raw order without `DayOfWeek`, derived
/// columns appended.
pub const TRANSFORMED_COLUMNS: [&str; 12] = [
    "Timestamp",
    "Temperature",
    "Humidity",
    "SquareFootage",
    "Occupancy",
    "HVACUsage",
    "LightingUsage",
    "RenewableEnergy",
    "Holiday",
    "EnergyConsumption",
    "Hour",
    "Weekend",
];

fn transform_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Transform(e.to_string())
}

fn format_timestamp(ts: PrimitiveDateTime) -> Result<String, PipelineError> {
    let formatted = if ts.nanosecond() == 0 {
        ts.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
    } else {
        ts.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"))
    };
    formatted.map_err(|e| PipelineError::Transform(format!("failed to format timestamp: {e}")))
}

fn format_optional(v: Option<i32>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Write the transformed table as CSV, replacing any previous file.
///
/// Rows go to a sibling temp file first so a failed write never leaves a
/// truncated table behind.
pub fn write_transformed(path: &Path, rows: &[EnergyReading]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::Transform(format!("failed to create {}: {e}", parent.display())))?;
    }

    let tmp = path.with_extension("csv.tmp");
    let mut wtr = csv::Writer::from_path(&tmp)
        .map_err(|e| PipelineError::Transform(format!("failed to create {}: {e}", tmp.display())))?;

    wtr.write_record(TRANSFORMED_COLUMNS).map_err(transform_err)?;
    for r in rows {
        wtr.write_record([
            format_timestamp(r.ts)?,
            r.temperature.to_string(),
            r.humidity.to_string(),
            r.square_footage.to_string(),
            r.occupancy.to_string(),
            format_optional(r.hvac_usage),
            format_optional(r.lighting_usage),
            r.renewable_energy.to_string(),
            format_optional(r.holiday),
            r.energy_consumption.to_string(),
            r.hour.to_string(),
            r.weekend.to_string(),
        ])
        .map_err(transform_err)?;
    }
    wtr.flush().map_err(transform_err)?;
    drop(wtr);

    std::fs::rename(&tmp, path)
        .map_err(|e| PipelineError::Transform(format!("failed to move output into {}: {e}", path.display())))?;

    Ok(())
}

fn parse_optional_code(value: &str, name: &str, line: u64) -> Result<Option<i32>, PipelineError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|e| PipelineError::Transform(format!("line {line}: invalid {name} '{value}': {e}")))
}

/// Read a transformed CSV back into memory.
pub fn read_transformed(path: &Path) -> Result<Vec<EnergyReading>, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::Transform(format!("failed to open {}: {e}", path.display())))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers().map_err(transform_err)?.clone();
    let idx = column_indexes(&headers, TRANSFORMED_COLUMNS)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(transform_err)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let get = |i: usize| field(&record, idx[i], TRANSFORMED_COLUMNS[i], line);
        let int = |i: usize| -> Result<i32, PipelineError> {
            let v = get(i)?;
            parse_count(v).ok_or_else(|| {
                PipelineError::Transform(format!("line {line}: invalid {} '{v}'", TRANSFORMED_COLUMNS[i]))
            })
        };

        let ts_str = get(0)?;
        let ts = parse_timestamp(ts_str)
            .ok_or_else(|| PipelineError::Transform(format!("line {line}: invalid Timestamp '{ts_str}'")))?;

        rows.push(EnergyReading {
            ts,
            temperature: parse_f64(get(1)?, TRANSFORMED_COLUMNS[1], line)?,
            humidity: parse_f64(get(2)?, TRANSFORMED_COLUMNS[2], line)?,
            square_footage: parse_f64(get(3)?, TRANSFORMED_COLUMNS[3], line)?,
            occupancy: int(4)?,
            hvac_usage: parse_optional_code(get(5)?, TRANSFORMED_COLUMNS[5], line)?,
            lighting_usage: parse_optional_code(get(6)?, TRANSFORMED_COLUMNS[6], line)?,
            renewable_energy: parse_f64(get(7)?, TRANSFORMED_COLUMNS[7], line)?,
            holiday: parse_optional_code(get(8)?, TRANSFORMED_COLUMNS[8], line)?,
            energy_consumption: parse_f64(get(9)?, TRANSFORMED_COLUMNS[9], line)?,
            hour: int(10)?,
            weekend: int(11)?,
        });
    }

    Ok(rows)
}
