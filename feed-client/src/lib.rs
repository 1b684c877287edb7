pub mod domain;
pub mod table;

pub use domain::{CompositeKey, EnergyRecord, FeatureValue, MasterTable, WideRow, WideTable};
