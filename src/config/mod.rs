//! Jaskier Shared Pattern — config
//! Data model (`types`) plus the copy-on-write store (`store`) that backs
//! the Config Store contract (spec.md §4.1).

pub mod store;
pub mod types;

pub use store::{resolve_rule, ConfigSnapshot, ConfigStore};
pub use types::{
    ApiStyle, AuthDetail, Provider, Rule, ScenarioFlagKey, Service, SmartRoute, Stats,
    UsageSample, GLOBAL_SCENARIO,
};
