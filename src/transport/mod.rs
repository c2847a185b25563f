//! Outbound transports: casts and push notifications.
//!
//! Both clients share the same dry-run discipline: with dry-run enabled no
//! network I/O happens and the would-be request is echoed back,
//! deterministically derived from the input.

mod cast;
mod notify;

pub use cast::{CastClient, CastReceipt, DeleteReceipt};
pub use notify::{
    NotificationClient, NotificationContent, NotificationFilters, NotificationReceipt,
};

use std::time::Duration;

/// Outbound request timeout; a hung API call becomes a normal dispatch
/// failure feeding the backoff path.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
