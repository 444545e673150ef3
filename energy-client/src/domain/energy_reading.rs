use time::PrimitiveDateTime;

/// A transformed observation, one row of the warehouse table.
///
/// The recoded flags are optional: an unrecognised category is stored as NULL
/// when the transform runs in lenient mode.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyReading {
    pub ts: PrimitiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub square_footage: f64,
    pub occupancy: i32,
    pub hvac_usage: Option<i32>,
    pub lighting_usage: Option<i32>,
    pub renewable_energy: f64,
    pub holiday: Option<i32>,
    pub hour: i32,
    pub weekend: i32,
    pub energy_consumption: f64,
}
