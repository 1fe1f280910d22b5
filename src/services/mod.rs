//! Service layer: aggregation and classification routing.

pub mod aggregation;
pub mod classification;

pub use aggregation::{AccountError, AggregateOutcome, AggregateStats, AggregationService};
pub use classification::ClassificationService;
