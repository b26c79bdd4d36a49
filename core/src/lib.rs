//! Household survey ETL: agency spreadsheets in, a dimension/fact model and
//! two derived views (burn rate, spending inequality) out.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod extractor;
pub mod loader;
pub mod normalizer;
pub mod notation;
pub mod pipeline;
pub mod sheet;
pub mod store;
pub mod types;
