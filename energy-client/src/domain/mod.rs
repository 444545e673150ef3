pub mod energy_reading;
pub mod raw_reading;

pub use energy_reading::EnergyReading;
pub use raw_reading::RawReading;
