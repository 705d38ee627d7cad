use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;

use crate::error::StoreError;
use crate::store::DownloadStore;

/// How often the current position is written while audio is playing
pub const SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to an active playback session.
///
/// Implementations wrap whatever actually renders audio. The tracker takes
/// this handle explicitly; there is no ambient global player to reach for.
pub trait PlaybackSession: Send + Sync {
    /// Current playback offset from the start of the media
    fn position(&self) -> Duration;

    /// Playing/paused signal; publishes every transition
    fn playing(&self) -> watch::Receiver<bool>;
}

/// Look up where playback of an episode should resume.
///
/// Zero when the episode was never played (or never downloaded), so a fresh
/// session simply starts at the beginning.
pub async fn resume_position(
    store: &DownloadStore,
    enclosure_url: &str,
) -> Result<Duration, StoreError> {
    Ok(store
        .get(enclosure_url)
        .await?
        .and_then(|record| record.last_played_position())
        .unwrap_or(Duration::ZERO))
}

/// Periodically saves the playback position of one episode.
///
/// Writes immediately when playback starts, then on a fixed interval while
/// the playing signal stays up, and once more when it goes down, so a
/// resumed session lands within a few seconds of where it stopped. The
/// interval stops rescheduling while paused; the task ends when the session
/// goes away.
pub struct PositionTracker {
    session: Arc<dyn PlaybackSession>,
    store: Arc<DownloadStore>,
    enclosure_url: String,
    interval: Duration,
}

impl PositionTracker {
    pub fn new(
        session: Arc<dyn PlaybackSession>,
        store: Arc<DownloadStore>,
        enclosure_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            store,
            enclosure_url: enclosure_url.into(),
            interval: SAVE_INTERVAL,
        }
    }

    /// Override the save interval, mainly for tests
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self) {
        let mut playing = self.session.playing();

        loop {
            // Wait for playback to start
            while !*playing.borrow_and_update() {
                if playing.changed().await.is_err() {
                    return;
                }
            }

            debug!("tracking playback position for {}", self.enclosure_url);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.save_position().await,
                    changed = playing.changed() => match changed {
                        Ok(()) if *playing.borrow() => {}
                        Ok(()) => {
                            // Paused or stopped: one final write, then idle
                            self.save_position().await;
                            break;
                        }
                        Err(_) => {
                            self.save_position().await;
                            return;
                        }
                    },
                }
            }
        }
    }

    async fn save_position(&self) {
        let position = self.session.position();
        if let Err(e) = self
            .store
            .update_last_played_at(&self.enclosure_url, position)
            .await
        {
            // Non-fatal: the next tick retries, playback is unaffected
            warn!(
                "could not save playback position for {}: {e}",
                self.enclosure_url
            );
        }
    }
}
