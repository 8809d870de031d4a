mod marker;
mod tail;
mod watcher;

pub use marker::{ReadinessMarker, APPLICATION_MARKER, DATABASE_MARKER};
pub use watcher::{Readiness, ReadinessError, ReadinessWatcher, WatchSession};
