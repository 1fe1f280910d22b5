//! Mail provider adapters.
//!
//! One adapter per mailbox kind, all normalizing into
//! [`CanonicalMessage`](crate::domain::CanonicalMessage).

mod google;
mod imap;
mod outlook;
mod traits;

pub use google::GoogleMailProvider;
pub use imap::{parse_raw_message, ImapMailProvider};
pub use outlook::OutlookMailProvider;
pub use traits::{FetchError, MailProvider, Result};
