use std::path::{Path, PathBuf};

use futures::StreamExt;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::EpisodeMetadata;
use crate::http::HttpClient;
use crate::store::DownloadStore;

use super::filename::filename_for_url;
use super::state::{DownloadState, ProgressBoard, fraction};

/// Download an episode's enclosure and record the completion.
///
/// Drives the per-key state on the board through
/// `Requested → InProgress → Completed | Failed`. The body streams to a
/// `.partial` file that is renamed once everything is flushed; only then is
/// the download recorded. Any failure removes the partial file and writes no
/// record, so the item shows as not downloaded again. There is no retry.
pub async fn run_download<C: HttpClient>(
    client: &C,
    episode: &EpisodeMetadata,
    dest_dir: &Path,
    store: &DownloadStore,
    board: &ProgressBoard,
) -> Result<PathBuf, DownloadError> {
    let url = episode
        .enclosure_url
        .as_deref()
        .ok_or_else(|| DownloadError::NotDownloadable {
            title: episode.display_title().to_string(),
        })?;

    // A completed record means the bytes are already on disk; nothing to do.
    if let Ok(Some(record)) = store.get(url).await
        && record.is_downloaded
    {
        debug!("{url} already downloaded to {}", record.local_ref);
        return Ok(PathBuf::from(record.local_ref));
    }

    board.set(url, DownloadState::Requested);

    match transfer(client, episode, url, dest_dir, board).await {
        Ok((final_path, bytes_expected)) => {
            let local_ref = final_path.to_string_lossy().into_owned();
            match store
                .upsert_completed(url, &local_ref, Some(bytes_expected as i64))
                .await
            {
                Ok(()) => {
                    board.set(url, DownloadState::Completed { local_ref });
                    Ok(final_path)
                }
                Err(e) => {
                    // The row is the source of truth for "downloaded"; without
                    // it the item must not show as complete.
                    warn!("transfer of {url} finished but could not be recorded: {e}");
                    board.set(url, DownloadState::Failed);
                    Err(DownloadError::RecordFailed(e))
                }
            }
        }
        Err(e) => {
            warn!("download failed for {url}: {e}");
            board.set(url, DownloadState::Failed);
            Err(e)
        }
    }
}

/// Stream the enclosure body to disk, reporting progress per chunk.
///
/// Returns the final path and the byte count recorded as expected (the
/// Content-Length when the server sent one, else the bytes actually written).
async fn transfer<C: HttpClient>(
    client: &C,
    episode: &EpisodeMetadata,
    url: &str,
    dest_dir: &Path,
    board: &ProgressBoard,
) -> Result<(PathBuf, u64), DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    // Prefer the live Content-Length; the feed's declared length is a fallback.
    let total_bytes = response.content_length.or(episode.declared_length);

    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

    let name = filename_for_url(url);
    let final_path = dest_dir.join(&name);
    let partial_path = dest_dir.join(format!("{name}.partial"));

    let mut file =
        fs::File::create(&partial_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: partial_path.clone(),
                source: e,
            })?;

    let mut stream = response.body;
    let mut bytes_downloaded: u64 = 0;

    let written: Result<(), DownloadError> = async {
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
                url: url.to_string(),
                source: e,
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::FileWriteFailed {
                    path: partial_path.clone(),
                    source: e,
                })?;

            bytes_downloaded += chunk.len() as u64;
            board.set(
                url,
                DownloadState::InProgress(fraction(bytes_downloaded, total_bytes)),
            );
        }

        // All bytes must hit durable storage before the completion is recorded
        file.flush()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial_path.clone(),
                source: e,
            })?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial_path.clone(),
                source: e,
            })?;
        Ok(())
    }
    .await;

    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&partial_path).await;
        return Err(e);
    }

    fs::rename(&partial_path, &final_path)
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: final_path.clone(),
            source: e,
        })?;

    Ok((final_path, total_bytes.unwrap_or(bytes_downloaded)))
}
