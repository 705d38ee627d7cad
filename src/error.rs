use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or parsing the RSS feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feed at {url} returned an empty response")]
    EmptyResponse { url: String },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors that can occur while downloading an enclosure
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Episode '{title}' has no enclosure URL and cannot be downloaded")]
    NotDownloadable { title: String },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to record completed download: {0}")]
    RecordFailed(#[from] StoreError),
}

/// Errors that can occur in the downloads database
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open downloads database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
