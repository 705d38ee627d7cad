mod filename;
mod state;
mod transfer;

pub use filename::filename_for_url;
pub use state::{DownloadState, INDETERMINATE, ProgressBoard, fraction};
pub use transfer::run_download;
