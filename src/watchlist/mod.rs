//! Watched wallet addresses
//!
//! The session manager only sees the [`WatchlistSource`] trait: a pull-style
//! snapshot query plus a `watch` receiver that always holds the latest
//! snapshot. A change published while the session is busy overwrites the
//! pending value instead of queueing behind it, so the session catches up to
//! the newest list in one step.
//!
//! [`WatchlistStore`] is the file-backed implementation used by the binary.

pub mod store;

pub use store::{reload_task, WatchlistError, WatchlistStore, MAX_LABEL_LEN};

use tokio::sync::watch;

pub trait WatchlistSource: Send + Sync {
    /// Current watched addresses
    fn addresses(&self) -> Vec<String>;

    /// Receiver notified with the full address list after every change
    fn subscribe(&self) -> watch::Receiver<Vec<String>>;
}
