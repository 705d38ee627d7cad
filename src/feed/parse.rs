// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::FeedError;

/// Metadata for a single feed item, re-derived in bulk on every refresh.
///
/// The enclosure URL is the stable identity key used to match items against
/// download records. Items without one are still listed but cannot be
/// downloaded or played.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Identity key when present
    pub enclosure_url: Option<String>,
    /// Byte length declared by the feed's enclosure element
    pub declared_length: Option<u64>,
}

impl EpisodeMetadata {
    /// Whether this item carries an enclosure URL and can be downloaded
    pub fn is_downloadable(&self) -> bool {
        self.enclosure_url.is_some()
    }

    /// Title for display and log messages
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// Parse RSS feed text into episode metadata, in document order.
///
/// Every well-formed `<item>` yields one entry; duplicates are not collapsed
/// here since the downloads table is keyed by enclosure URL anyway.
pub fn parse_feed(xml: &str) -> Result<Vec<EpisodeMetadata>, FeedError> {
    let channel = rss::Channel::read_from(xml.as_bytes())?;

    Ok(channel.items().iter().map(episode_from_item).collect())
}

fn episode_from_item(item: &rss::Item) -> EpisodeMetadata {
    let enclosure = item.enclosure();

    EpisodeMetadata {
        title: item.title().map(String::from),
        description: item.description().map(String::from),
        enclosure_url: enclosure
            .map(|e| e.url().to_string())
            .filter(|url| !url.is_empty()),
        declared_length: enclosure.and_then(|e| e.length().parse().ok()),
    }
}
