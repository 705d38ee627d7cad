use chrono::Utc;
use url::Url;

/// Derive a destination filename from an enclosure URL.
///
/// Uses the last path segment when it yields a usable name, otherwise falls
/// back to a timestamped default so every download gets a distinct file.
pub fn filename_for_url(enclosure_url: &str) -> String {
    let candidate = Url::parse(enclosure_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(String::from))
        })
        .unwrap_or_default();

    let sanitized = sanitize_filename::sanitize(candidate);
    if sanitized.is_empty() {
        format!("audio_{}.mp3", Utc::now().timestamp_millis())
    } else {
        sanitized
    }
}
