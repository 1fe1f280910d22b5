//! Query modules, one per table.

pub mod credentials;
pub mod owners;
