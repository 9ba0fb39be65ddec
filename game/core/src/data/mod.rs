//! The persistent record layer: plain serde records, one JSON document per
//! record under `<data_root>/<kind>/<uid>.json`, cached in memory and
//! accessed through `immutable`/`mutable` closures.

pub mod model;
pub mod store;

pub use model::*;
pub use store::{DataStore, Registry, SharedStore};
