//! External provider integrations: mailboxes and AI classification.

pub mod ai;
pub mod mail;
