use std::collections::HashMap;

use tokio::sync::watch;

use crate::download::DownloadState;
use crate::feed::EpisodeMetadata;
use crate::store::DownloadRecord;

/// One render-ready row: feed metadata joined with download state.
///
/// Derived and republished on every input change, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRow {
    pub episode: EpisodeMetadata,
    pub is_downloaded: bool,
    pub local_ref: Option<String>,
    /// 1.0 when downloaded, else the live in-flight fraction
    /// ([`crate::download::INDETERMINATE`] for unknown totals), else 0.0
    pub progress: f32,
}

/// Join feed items with download records and live download state.
///
/// Produces one row per feed item (not only downloaded ones), matched by
/// enclosure URL. Pure: identical inputs always yield identical rows.
pub fn compose(
    items: &[EpisodeMetadata],
    records: &[DownloadRecord],
    live: &HashMap<String, DownloadState>,
) -> Vec<EpisodeRow> {
    let by_url: HashMap<&str, &DownloadRecord> = records
        .iter()
        .map(|record| (record.enclosure_url.as_str(), record))
        .collect();

    items
        .iter()
        .map(|episode| {
            let record = episode
                .enclosure_url
                .as_deref()
                .and_then(|url| by_url.get(url).copied());
            let is_downloaded = record.is_some_and(|r| r.is_downloaded);

            let progress = if is_downloaded {
                1.0
            } else {
                episode
                    .enclosure_url
                    .as_deref()
                    .and_then(|url| live.get(url))
                    .map(DownloadState::progress_fraction)
                    .unwrap_or(0.0)
            };

            EpisodeRow {
                episode: episode.clone(),
                is_downloaded,
                local_ref: record.map(|r| r.local_ref.clone()),
                progress,
            }
        })
        .collect()
}

/// Recomputes and republishes rows whenever any input changes.
///
/// Combine-latest semantics: every emission joins the newest snapshot of all
/// three inputs. The task ends when any input channel closes.
pub struct ViewComposer {
    items: watch::Receiver<Vec<EpisodeMetadata>>,
    records: watch::Receiver<Vec<DownloadRecord>>,
    live: watch::Receiver<HashMap<String, DownloadState>>,
    rows_tx: watch::Sender<Vec<EpisodeRow>>,
}

impl ViewComposer {
    pub fn new(
        items: watch::Receiver<Vec<EpisodeMetadata>>,
        records: watch::Receiver<Vec<DownloadRecord>>,
        live: watch::Receiver<HashMap<String, DownloadState>>,
    ) -> (Self, watch::Receiver<Vec<EpisodeRow>>) {
        let (rows_tx, rows_rx) = watch::channel(Vec::new());
        (
            Self {
                items,
                records,
                live,
                rows_tx,
            },
            rows_rx,
        )
    }

    pub async fn run(mut self) {
        loop {
            let rows = {
                let items = self.items.borrow_and_update();
                let records = self.records.borrow_and_update();
                let live = self.live.borrow_and_update();
                compose(&items, &records, &live)
            };
            self.rows_tx.send_replace(rows);

            tokio::select! {
                changed = self.items.changed() => if changed.is_err() { break },
                changed = self.records.changed() => if changed.is_err() { break },
                changed = self.live.changed() => if changed.is_err() { break },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::INDETERMINATE;

    fn episode(url: Option<&str>) -> EpisodeMetadata {
        EpisodeMetadata {
            title: Some("Episode".to_string()),
            description: None,
            enclosure_url: url.map(String::from),
            declared_length: None,
        }
    }

    fn completed_record(url: &str, local_ref: &str) -> DownloadRecord {
        DownloadRecord {
            enclosure_url: url.to_string(),
            local_ref: local_ref.to_string(),
            bytes_expected: Some(100),
            bytes_completed: Some(100),
            is_downloaded: true,
            created_at: 1_700_000_000_000,
            last_played_at: None,
        }
    }

    #[test]
    fn untouched_episode_has_zero_progress() {
        let items = vec![episode(Some("https://example.com/a.mp3"))];
        let rows = compose(&items, &[], &HashMap::new());

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_downloaded);
        assert!(rows[0].local_ref.is_none());
        assert_eq!(rows[0].progress, 0.0);
    }

    #[test]
    fn completed_record_yields_full_progress() {
        let url = "https://example.com/a.mp3";
        let items = vec![episode(Some(url))];
        let records = vec![completed_record(url, "/x/a.mp3")];

        let rows = compose(&items, &records, &HashMap::new());

        assert!(rows[0].is_downloaded);
        assert_eq!(rows[0].local_ref.as_deref(), Some("/x/a.mp3"));
        assert_eq!(rows[0].progress, 1.0);
    }

    #[test]
    fn in_flight_fraction_shows_while_not_downloaded() {
        let url = "https://example.com/a.mp3";
        let items = vec![episode(Some(url))];
        let mut live = HashMap::new();
        live.insert(url.to_string(), DownloadState::InProgress(0.42));

        let rows = compose(&items, &[], &live);
        assert!(!rows[0].is_downloaded);
        assert_eq!(rows[0].progress, 0.42);
    }

    #[test]
    fn indeterminate_sentinel_passes_through() {
        let url = "https://example.com/a.mp3";
        let items = vec![episode(Some(url))];
        let mut live = HashMap::new();
        live.insert(url.to_string(), DownloadState::InProgress(INDETERMINATE));

        let rows = compose(&items, &[], &live);
        assert_eq!(rows[0].progress, INDETERMINATE);
    }

    #[test]
    fn failed_download_reads_as_not_downloaded() {
        let url = "https://example.com/a.mp3";
        let items = vec![episode(Some(url))];
        let mut live = HashMap::new();
        live.insert(url.to_string(), DownloadState::Failed);

        let rows = compose(&items, &[], &live);
        assert!(!rows[0].is_downloaded);
        assert_eq!(rows[0].progress, 0.0);
    }

    #[test]
    fn item_without_enclosure_never_matches_records() {
        let items = vec![episode(None)];
        let records = vec![completed_record("https://example.com/a.mp3", "/x/a.mp3")];

        let rows = compose(&items, &records, &HashMap::new());
        assert!(!rows[0].is_downloaded);
        assert!(rows[0].local_ref.is_none());
        assert_eq!(rows[0].progress, 0.0);
        assert!(!rows[0].episode.is_downloadable());
    }

    #[test]
    fn rows_follow_feed_order_and_cover_every_item() {
        let items = vec![
            episode(Some("https://example.com/a.mp3")),
            episode(None),
            episode(Some("https://example.com/b.mp3")),
        ];
        let records = vec![completed_record("https://example.com/b.mp3", "/x/b.mp3")];

        let rows = compose(&items, &records, &HashMap::new());
        assert_eq!(rows.len(), 3);
        assert!(!rows[0].is_downloaded);
        assert!(!rows[1].is_downloaded);
        assert!(rows[2].is_downloaded);
    }

    #[test]
    fn compose_is_deterministic_for_identical_inputs() {
        let url = "https://example.com/a.mp3";
        let items = vec![episode(Some(url)), episode(None)];
        let records = vec![completed_record(url, "/x/a.mp3")];
        let mut live = HashMap::new();
        live.insert(url.to_string(), DownloadState::InProgress(0.5));

        assert_eq!(
            compose(&items, &records, &live),
            compose(&items, &records, &live)
        );
    }

    #[tokio::test]
    async fn composer_republishes_on_any_input_change() {
        let url = "https://example.com/a.mp3";
        let (items_tx, items_rx) = watch::channel(vec![episode(Some(url))]);
        let (records_tx, records_rx) = watch::channel(Vec::new());
        let (live_tx, live_rx) = watch::channel(HashMap::new());

        let (composer, mut rows_rx) = ViewComposer::new(items_rx, records_rx, live_rx);
        let task = tokio::spawn(composer.run());

        // Initial composition from the current snapshots
        rows_rx.changed().await.unwrap();
        assert_eq!(rows_rx.borrow_and_update().len(), 1);
        assert!(!rows_rx.borrow()[0].is_downloaded);

        // Record side changes
        records_tx
            .send(vec![completed_record(url, "/x/a.mp3")])
            .unwrap();
        rows_rx.changed().await.unwrap();
        assert!(rows_rx.borrow_and_update()[0].is_downloaded);

        // Feed side changes
        items_tx
            .send(vec![episode(Some(url)), episode(None)])
            .unwrap();
        rows_rx.changed().await.unwrap();
        assert_eq!(rows_rx.borrow_and_update().len(), 2);

        // Live progress side changes
        live_tx
            .send(HashMap::from([(
                "https://example.com/other.mp3".to_string(),
                DownloadState::InProgress(0.1),
            )]))
            .unwrap();
        rows_rx.changed().await.unwrap();

        drop(items_tx);
        task.await.unwrap();
    }
}
