pub mod output;
pub mod raw;

use std::path::{Path, PathBuf};

use energy_client::domain::{EnergyReading, RawReading};

use crate::pipeline::PipelineError;

pub use output::{read_transformed, write_transformed, TRANSFORMED_COLUMNS};
pub use raw::{read_raw_readings, RAW_COLUMNS};

/// Two-valued categorical columns and their `(1, 0)` spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `On` / `Off`
    Switch,
    /// `Yes` / `No`
    Flag,
}

impl Category {
    pub fn codes(self) -> (&'static str, &'static str) {
        match self {
            Self::Switch => ("On", "Off"),
            Self::Flag => ("Yes", "No"),
        }
    }

    pub fn recode(self, value: &str) -> Option<i32> {
        let (one, zero) = self.codes();
        match value.trim() {
            v if v == one => Some(1),
            v if v == zero => Some(0),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected value '{value}' in column {column} (expected {one}/{zero})")]
pub struct UnknownCategory {
    pub column: &'static str,
    pub value: String,
    pub one: &'static str,
    pub zero: &'static str,
}

fn recode_column(
    category: Category,
    column: &'static str,
    value: &str,
    strict: bool,
) -> Result<Option<i32>, UnknownCategory> {
    match category.recode(value) {
        Some(code) => Ok(Some(code)),
        None if strict => {
            let (one, zero) = category.codes();
            Err(UnknownCategory {
                column,
                value: value.to_string(),
                one,
                zero,
            })
        }
        None => Ok(None),
    }
}

pub fn is_weekend(day_of_week: &str) -> bool {
    matches!(day_of_week.trim(), "Saturday" | "Sunday")
}

/// Derive `Hour` and `Weekend`, recode the categorical columns and drop
/// `DayOfWeek`.
///
/// With `strict` unset an unrecognised category becomes `None` instead of an
/// error.
pub fn transform_reading(raw: &RawReading, strict: bool) -> Result<EnergyReading, UnknownCategory> {
    Ok(EnergyReading {
        ts: raw.ts,
        temperature: raw.temperature,
        humidity: raw.humidity,
        square_footage: raw.square_footage,
        occupancy: raw.occupancy,
        hvac_usage: recode_column(Category::Switch, "HVACUsage", &raw.hvac_usage, strict)?,
        lighting_usage: recode_column(Category::Switch, "LightingUsage", &raw.lighting_usage, strict)?,
        renewable_energy: raw.renewable_energy,
        holiday: recode_column(Category::Flag, "Holiday", &raw.holiday, strict)?,
        hour: i32::from(raw.ts.hour()),
        weekend: i32::from(is_weekend(&raw.day_of_week)),
        energy_consumption: raw.energy_consumption,
    })
}

/// Raw CSV in, transformed CSV out.
#[derive(Debug, Clone)]
pub struct EnergyTransform {
    input: PathBuf,
    output: PathBuf,
    strict_categories: bool,
}

impl EnergyTransform {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q, strict_categories: bool) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            strict_categories,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Transform every raw row, persist the result and return it.
    ///
    /// Row count is preserved; nothing is filtered.
    pub fn run(&self) -> Result<Vec<EnergyReading>, PipelineError> {
        let raw = read_raw_readings(&self.input)?;

        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            let reading = transform_reading(&row.reading, self.strict_categories)
                .map_err(|e| PipelineError::Transform(format!("line {}: {e}", row.line)))?;
            rows.push(reading);
        }

        let nulled = rows
            .iter()
            .filter(|r| r.hvac_usage.is_none() || r.lighting_usage.is_none() || r.holiday.is_none())
            .count();
        if nulled > 0 {
            tracing::warn!(rows = nulled, "unrecognised categories stored as NULL");
        }

        write_transformed(&self.output, &rows)?;
        tracing::info!(
            input = %self.input.display(),
            output = %self.output.display(),
            rows = rows.len(),
            "transformed dataset written"
        );

        Ok(rows)
    }
}
