//! Mail intake — blocking IMAP client plus the async polling monitor.

pub mod imap;
pub mod poller;

pub use imap::{FetchedMail, check_inbox, fetch_since, strip_html};
pub use poller::spawn_mail_monitor;
