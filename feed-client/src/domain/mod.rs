pub mod energy_record;
pub mod forecast;

pub use energy_record::{
    canonical_location_id, cmp_begin_date_nulls_last, CompositeKey, EnergyRecord, MasterTable,
};
pub use forecast::{FeatureValue, WideRow, WideTable};
