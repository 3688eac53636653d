pub mod downloader;
pub mod engine;

pub use downloader::{Downloader, MAX_CONCURRENT_PER_QUEUE, SIZE_THRESHOLD, TICK_INTERVAL};
pub use engine::{SyncEngine, SYNC_INTERVAL};
