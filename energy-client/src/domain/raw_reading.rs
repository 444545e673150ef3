use time::PrimitiveDateTime;

/// One row of the source CSV as published by the dataset host.
///
/// Categorical columns are kept as the original strings; recoding happens in
/// the transform step.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub ts: PrimitiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub square_footage: f64,
    pub occupancy: i32,
    pub hvac_usage: String,
    pub lighting_usage: String,
    pub renewable_energy: f64,
    pub day_of_week: String,
    pub holiday: String,
    pub energy_consumption: f64,
}
