//! Raw CSV fixtures shared by unit tests.

pub const RAW_HEADER: &str = "Timestamp,Temperature,Humidity,SquareFootage,Occupancy,HVACUsage,LightingUsage,RenewableEnergy,DayOfWeek,Holiday,EnergyConsumption";

pub const SATURDAY_ROW: &str = "2024-01-06 14:00:00,25.13,43.43,1565.69,5,On,Off,2.77,Saturday,No,75.36";
pub const WEEKDAY_ROW: &str = "2024-01-01 09:00:00,27.73,54.22,1411.06,1,Off,On,21.83,Monday,Yes,83.40";

pub fn raw_csv(rows: &[&str]) -> String {
    let mut out = String::from(RAW_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}
