mod cache;
mod parse;

pub use cache::{FeedCache, FeedStatus};
pub use parse::{EpisodeMetadata, parse_feed};
