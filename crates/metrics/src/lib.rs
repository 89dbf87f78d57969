//! Metric names for parley, plus a re-export of the `metrics` facade.
//!
//! Crates record through the facade macros behind their own optional
//! `metrics` feature. Installing a recorder/exporter is left to the host
//! process; without one every macro call is a no-op.
//!
//! ```rust,ignore
//! use parley_metrics::{counter, dispatch, labels};
//!
//! counter!(dispatch::FRAGMENTS_DELIVERED_TOTAL, labels::CHANNEL => "telegram").increment(1);
//! ```

mod definitions;

pub use {
    definitions::*,
    metrics::{counter, gauge, histogram},
};
