//! Query engine for docrud.
//!
//! This module turns find requests into authorization-scoped, type-cast store
//! reads and resolves relation paths into populated documents.

pub mod caster;
mod executor;
pub mod filter;
mod planner;
mod populate;

pub use caster::ConditionCaster;
pub use executor::QueryExecutor;
pub use filter::FilterEvaluator;
pub use planner::{FetchNode, PopulatePlanner};
pub use populate::Populator;
