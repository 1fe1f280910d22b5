//! inlet - multi-provider mailbox acquisition and token lifecycle
//!
//! This crate connects Google, Microsoft and plain-IMAP mailboxes for a
//! tenant, keeps their OAuth tokens fresh, and aggregates their recent
//! messages into one normalized, deduplicated, classified list.

pub mod auth;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;

pub use services::{AggregateOutcome, AggregationService, ClassificationService};
