pub mod costs;
pub mod usage;
