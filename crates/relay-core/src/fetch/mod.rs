//! Fetch engine: resolves a magnet locator, lets the caller pick files,
//! transfers them, and reports progress.

pub mod engine;
pub mod locate;
pub mod progress;

pub use engine::{FetchEngine, FetchSettings};
pub use progress::{EditThrottle, FeedEnd, ProgressFeed};
