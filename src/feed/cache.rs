use log::warn;
use tokio::sync::watch;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{EpisodeMetadata, parse_feed};

/// High-level state of the last refresh attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    Loading,
    Ready,
    Error { message: String },
}

/// In-memory cache of the most recently fetched episode list.
///
/// `refresh()` replaces the published list wholesale on success. On failure
/// only the status changes; the previous list stays published so the caller
/// can keep showing stale data next to the error.
pub struct FeedCache {
    feed_url: String,
    items_tx: watch::Sender<Vec<EpisodeMetadata>>,
    status_tx: watch::Sender<FeedStatus>,
}

impl FeedCache {
    pub fn new(feed_url: impl Into<String>) -> Self {
        let (items_tx, _) = watch::channel(Vec::new());
        let (status_tx, _) = watch::channel(FeedStatus::Loading);

        Self {
            feed_url: feed_url.into(),
            items_tx,
            status_tx,
        }
    }

    /// Subscribe to the published episode list
    pub fn items(&self) -> watch::Receiver<Vec<EpisodeMetadata>> {
        self.items_tx.subscribe()
    }

    /// Subscribe to the refresh status
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status_tx.subscribe()
    }

    /// Fetch and parse the feed, replacing the published list on success.
    ///
    /// Returns the number of items published. There is no retry policy;
    /// callers trigger another `refresh()` themselves.
    pub async fn refresh<C: HttpClient>(&self, client: &C) -> Result<usize, FeedError> {
        self.status_tx.send_replace(FeedStatus::Loading);

        match self.fetch_and_parse(client).await {
            Ok(items) => {
                let count = items.len();
                self.items_tx.send_replace(items);
                self.status_tx.send_replace(FeedStatus::Ready);
                Ok(count)
            }
            Err(e) => {
                warn!("feed refresh failed for {}: {e}", self.feed_url);
                self.status_tx.send_replace(FeedStatus::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn fetch_and_parse<C: HttpClient>(
        &self,
        client: &C,
    ) -> Result<Vec<EpisodeMetadata>, FeedError> {
        let xml = client
            .get_text(&self.feed_url)
            .await
            .map_err(|e| FeedError::FetchFailed {
                url: self.feed_url.clone(),
                source: e,
            })?;

        if xml.trim().is_empty() {
            return Err(FeedError::EmptyResponse {
                url: self.feed_url.clone(),
            });
        }

        parse_feed(&xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpResponse};
    use async_trait::async_trait;
    use bytes::Bytes;

    struct MockHttpClient {
        response: String,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_text(&self, _url: &str) -> Result<String, reqwest::Error> {
            Ok(self.response.clone())
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            let data = self.response.clone().into_bytes();
            let stream: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));
            Ok(HttpResponse {
                status: 200,
                content_length: None,
                body: stream,
            })
        }
    }

    const SAMPLE_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>Test</description>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://example.com/ep1.mp3" length="1000" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn refresh_publishes_items_and_ready_status() {
        let cache = FeedCache::new("https://example.com/feed.xml");
        let client = MockHttpClient {
            response: SAMPLE_FEED.to_string(),
        };

        let count = cache.refresh(&client).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(cache.items().borrow().len(), 2);
        assert_eq!(*cache.status().borrow(), FeedStatus::Ready);
    }

    #[tokio::test]
    async fn refresh_replaces_previous_items_wholesale() {
        let cache = FeedCache::new("https://example.com/feed.xml");

        cache
            .refresh(&MockHttpClient {
                response: SAMPLE_FEED.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(cache.items().borrow().len(), 2);

        let single_item_feed = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <title>Only Episode</title>
      <enclosure url="https://example.com/only.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        cache
            .refresh(&MockHttpClient {
                response: single_item_feed.to_string(),
            })
            .await
            .unwrap();

        let items = cache.items().borrow().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Only Episode"));
    }

    #[tokio::test]
    async fn refresh_failure_keeps_stale_items() {
        let cache = FeedCache::new("https://example.com/feed.xml");

        cache
            .refresh(&MockHttpClient {
                response: SAMPLE_FEED.to_string(),
            })
            .await
            .unwrap();

        let result = cache
            .refresh(&MockHttpClient {
                response: "   ".to_string(),
            })
            .await;

        assert!(matches!(result, Err(FeedError::EmptyResponse { .. })));
        // Previous list is still published next to the error status
        assert_eq!(cache.items().borrow().len(), 2);
        assert!(matches!(
            *cache.status().borrow(),
            FeedStatus::Error { .. }
        ));
    }

    #[tokio::test]
    async fn refresh_reports_parse_errors() {
        let cache = FeedCache::new("https://example.com/feed.xml");

        let result = cache
            .refresh(&MockHttpClient {
                response: "<rss><channel>".to_string(),
            })
            .await;

        assert!(matches!(result, Err(FeedError::ParseFailed(_))));
        assert!(matches!(
            *cache.status().borrow(),
            FeedStatus::Error { .. }
        ));
        assert!(cache.items().borrow().is_empty());
    }
}
