use std::{fs::File, path::Path};

use csv::StringRecord;
use energy_client::domain::RawReading;
use time::{macros::format_description, Date, PrimitiveDateTime};

use crate::pipeline::PipelineError;

/// Columns of the published CSV, looked up by header name.
pub const RAW_COLUMNS: [&str; 11] = [
    "Timestamp",
    "Temperature",
    "Humidity",
    "SquareFootage",
    "Occupancy",
    "HVACUsage",
    "LightingUsage",
    "RenewableEnergy",
    "DayOfWeek",
    "Holiday",
    "EnergyConsumption",
];

/// A parsed raw row and the CSV line it came from.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: u64,
    pub reading: RawReading,
}

/// Parse a timezone-naive wall-clock timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS[.fff]]`, the same with a `T` separator, and a
/// bare date (midnight).
pub fn parse_timestamp(s: &str) -> Option<PrimitiveDateTime> {
    let s = s.trim();
    let formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];

    formats
        .into_iter()
        .find_map(|f| PrimitiveDateTime::parse(s, f).ok())
        .or_else(|| {
            Date::parse(s, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(Date::midnight)
        })
}

/// Integer count; tolerates float-formatted integers such as `5.0`.
pub fn parse_count(s: &str) -> Option<i32> {
    let s = s.trim();
    s.parse::<i32>().ok().or_else(|| {
        let f: f64 = s.parse().ok()?;
        (f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX)).then_some(f as i32)
    })
}

pub(crate) fn column_indexes<const N: usize>(
    headers: &StringRecord,
    names: [&str; N],
) -> Result<[usize; N], PipelineError> {
    let mut idx = [0usize; N];
    for (slot, name) in idx.iter_mut().zip(names) {
        *slot = headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
            .ok_or_else(|| PipelineError::Transform(format!("missing column '{name}' in CSV header")))?;
    }
    Ok(idx)
}

pub(crate) fn field<'r>(record: &'r StringRecord, idx: usize, name: &str, line: u64) -> Result<&'r str, PipelineError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| PipelineError::Transform(format!("line {line}: missing value for column '{name}'")))
}

pub(crate) fn parse_f64(value: &str, name: &str, line: u64) -> Result<f64, PipelineError> {
    value
        .parse()
        .map_err(|e| PipelineError::Transform(format!("line {line}: invalid {name} '{value}': {e}")))
}

fn record_to_raw_reading(record: &StringRecord, idx: &[usize; 11], line: u64) -> Result<RawReading, PipelineError> {
    let get = |i: usize| field(record, idx[i], RAW_COLUMNS[i], line);

    let ts_str = get(0)?;
    let ts = parse_timestamp(ts_str)
        .ok_or_else(|| PipelineError::Transform(format!("line {line}: invalid Timestamp '{ts_str}'")))?;

    let occupancy_str = get(4)?;
    let occupancy = parse_count(occupancy_str)
        .ok_or_else(|| PipelineError::Transform(format!("line {line}: invalid Occupancy '{occupancy_str}'")))?;

    Ok(RawReading {
        ts,
        temperature: parse_f64(get(1)?, RAW_COLUMNS[1], line)?,
        humidity: parse_f64(get(2)?, RAW_COLUMNS[2], line)?,
        square_footage: parse_f64(get(3)?, RAW_COLUMNS[3], line)?,
        occupancy,
        hvac_usage: get(5)?.to_string(),
        lighting_usage: get(6)?.to_string(),
        renewable_energy: parse_f64(get(7)?, RAW_COLUMNS[7], line)?,
        day_of_week: get(8)?.to_string(),
        holiday: get(9)?.to_string(),
        energy_consumption: parse_f64(get(10)?, RAW_COLUMNS[10], line)?,
    })
}

/// Read every row of the raw CSV. Any malformed row fails the whole read.
pub fn read_raw_readings(path: &Path) -> Result<Vec<RawRow>, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::Transform(format!("failed to open {}: {e}", path.display())))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::Transform(format!("failed to read CSV headers: {e}")))?
        .clone();
    let idx = column_indexes(&headers, RAW_COLUMNS)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::Transform(format!("failed to read CSV record: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let reading = record_to_raw_reading(&record, &idx, line)?;
        rows.push(RawRow { line, reading });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{raw_csv, SATURDAY_ROW, WEEKDAY_ROW};
    use time::macros::datetime;

    #[test]
    fn timestamps_are_parsed_as_wall_clock() {
        assert_eq!(parse_timestamp("2024-01-06 14:00:00"), Some(datetime!(2024-01-06 14:00:00)));
        assert_eq!(parse_timestamp("2024-01-06T14:05:09"), Some(datetime!(2024-01-06 14:05:09)));
        assert_eq!(parse_timestamp("2024-01-06 14:00:00.250").map(|t| t.millisecond()), Some(250));
        assert_eq!(parse_timestamp("2024-01-06 23:59"), Some(datetime!(2024-01-06 23:59:00)));
        assert_eq!(parse_timestamp(" 2024-01-06 "), Some(datetime!(2024-01-06 00:00:00)));
        assert_eq!(parse_timestamp("06/01/2024"), None);
        assert_eq!(parse_timestamp("2024-13-01 00:00:00"), None);
    }

    #[test]
    fn occupancy_accepts_integral_floats_only() {
        assert_eq!(parse_count("5"), Some(5));
        assert_eq!(parse_count("5.0"), Some(5));
        assert_eq!(parse_count("5.5"), None);
        assert_eq!(parse_count("many"), None);
    }

    #[test]
    fn reads_rows_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, raw_csv(&[SATURDAY_ROW, WEEKDAY_ROW])).unwrap();

        let rows = read_raw_readings(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 3);
        let r = &rows[0].reading;
        assert_eq!(r.ts, datetime!(2024-01-06 14:00:00));
        assert_eq!(r.occupancy, 5);
        assert_eq!(r.hvac_usage, "On");
        assert_eq!(r.day_of_week, "Saturday");
        assert_eq!(r.energy_consumption, 75.36);
    }

    #[test]
    fn column_order_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let csv = "EnergyConsumption,DayOfWeek,Holiday,Timestamp,Temperature,Humidity,SquareFootage,Occupancy,HVACUsage,LightingUsage,RenewableEnergy\n\
                   70.1,Sunday,No,2024-01-07 03:00:00,20,40,1000,2,Off,Off,1.5\n";
        std::fs::write(&path, csv).unwrap();

        let rows = read_raw_readings(&path).unwrap();
        assert_eq!(rows[0].reading.day_of_week, "Sunday");
        assert_eq!(rows[0].reading.energy_consumption, 70.1);
    }

    #[test]
    fn missing_column_is_named_in_the_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, "Timestamp,Temperature\n2024-01-06 14:00:00,20.5\n").unwrap();

        let err = read_raw_readings(&path).unwrap_err();
        assert!(err.to_string().contains("missing column 'Humidity'"), "{err}");
    }

    #[test]
    fn bad_number_reports_line_and_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let bad = SATURDAY_ROW.replace("25.13", "warm");
        std::fs::write(&path, raw_csv(&[WEEKDAY_ROW, bad.as_str()])).unwrap();

        let err = read_raw_readings(&path).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{err}");
        assert!(err.contains("Temperature"), "{err}");
    }

    #[test]
    fn missing_file_is_a_transform_error() {
        let err = read_raw_readings(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Transform(_)));
    }
}
