pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod playback;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use download::{DownloadState, INDETERMINATE, ProgressBoard, filename_for_url, run_download};
pub use error::{DownloadError, FeedError, StoreError};
pub use feed::{EpisodeMetadata, FeedCache, FeedStatus, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use playback::{PlaybackSession, PositionTracker, resume_position};
pub use store::{DownloadRecord, DownloadStore};
pub use view::{EpisodeRow, ViewComposer, compose};
