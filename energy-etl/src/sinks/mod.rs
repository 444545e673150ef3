pub mod warehouse;

pub use warehouse::WarehouseSink;
