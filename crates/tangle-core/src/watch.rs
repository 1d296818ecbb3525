use tokio::sync::broadcast::Receiver;

use crate::model::Uri;

/// A filesystem change relayed by the host's watcher. The core consumes
/// these; watch mechanics (debouncing, glob filters, editor hooks) stay
/// on the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(Uri),
    Changed(Uri),
    Deleted(Uri),
}

/// Source of watch events. Implementations wrap whatever notification
/// machinery the host has and fan events out on a broadcast channel.
pub trait Watcher: Send + Sync {
    fn subscribe(&self) -> Receiver<WatchEvent>;
}
