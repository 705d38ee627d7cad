use std::collections::HashMap;

use tokio::sync::watch;

/// Sentinel progress fraction for downloads with unknown total size
pub const INDETERMINATE: f32 = -1.0;

/// Lifecycle of one download, keyed by enclosure URL.
///
/// `Idle → Requested → InProgress → Completed | Failed`. Fractions are
/// monotonically non-decreasing within one attempt. A failed attempt leaves
/// no download record; the item simply shows as not downloaded again.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Idle,
    Requested,
    /// In-flight fraction in 0.0..=1.0, or [`INDETERMINATE`]
    InProgress(f32),
    Completed {
        local_ref: String,
    },
    Failed,
}

impl DownloadState {
    /// Displayed progress for this state (0.0 when idle, requested or failed)
    pub fn progress_fraction(&self) -> f32 {
        match self {
            DownloadState::Idle | DownloadState::Requested | DownloadState::Failed => 0.0,
            DownloadState::InProgress(fraction) => *fraction,
            DownloadState::Completed { .. } => 1.0,
        }
    }
}

/// Compute the progress fraction for a byte count against an optional total.
///
/// Capped at 1.0 when servers understate the content length; without a total
/// the fraction is the indeterminate sentinel.
pub fn fraction(bytes_downloaded: u64, total_bytes: Option<u64>) -> f32 {
    match total_bytes {
        Some(total) if total > 0 => (bytes_downloaded as f64 / total as f64).min(1.0) as f32,
        _ => INDETERMINATE,
    }
}

/// Shared in-memory view of every in-flight download's state.
///
/// Each download mutates only its own key, so concurrent downloads never
/// cross-contaminate. Snapshots are republished on every change.
pub struct ProgressBoard {
    states_tx: watch::Sender<HashMap<String, DownloadState>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        let (states_tx, _) = watch::channel(HashMap::new());
        Self { states_tx }
    }

    /// Subscribe to snapshots of all live download states
    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, DownloadState>> {
        self.states_tx.subscribe()
    }

    /// Publish a new state for one key
    pub fn set(&self, enclosure_url: &str, state: DownloadState) {
        self.states_tx.send_modify(|states| {
            states.insert(enclosure_url.to_string(), state);
        });
    }

    /// Current state for a key; absent keys are `Idle`
    pub fn state_of(&self, enclosure_url: &str) -> DownloadState {
        self.states_tx
            .borrow()
            .get(enclosure_url)
            .cloned()
            .unwrap_or(DownloadState::Idle)
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}
