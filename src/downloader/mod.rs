use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

use crate::camera::{Camera, VodFile};
use crate::config::DownloadJob;
use crate::utils::*;

/// Returned when Ctrl+C interrupts a run.
#[derive(Debug)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Download cancelled by user")
    }
}

impl std::error::Error for Cancelled {}

/// Downloads every recording of `job` and returns how many were saved.
///
/// The camera session is logged out on every exit path, including errors
/// and Ctrl+C.
pub async fn download_videos(camera: &mut Camera, job: &DownloadJob) -> Result<usize> {
    create_output_dir(&job.output_dir).await?;

    log::info!("Connecting to camera at {}...", camera.host());
    let result = tokio::select! {
        result = fetch_recordings(camera, job) => result,
        Ok(()) = tokio::signal::ctrl_c() => Err(anyhow::Error::new(Cancelled)),
    };

    camera.logout().await;
    result
}

async fn fetch_recordings(camera: &mut Camera, job: &DownloadJob) -> Result<usize> {
    camera
        .get_host_data()
        .await
        .context("Failed to connect to camera")?;
    log::info!("Successfully connected to camera: {}", camera.nvr_name());

    if camera.channels().is_empty() {
        log::error!("Error: No channels found on camera");
        return Ok(0);
    }
    let channel = match job.channel {
        Some(wanted) if camera.channels().contains(&wanted) => wanted,
        Some(wanted) => bail!(
            "Channel {} is not available on camera (available: {:?})",
            wanted,
            camera.channels()
        ),
        None => camera.channels()[0],
    };
    log::info!("Using channel: {}", channel);

    let vod_files = collect_vod_files(camera, channel, job).await?;
    if vod_files.is_empty() {
        log::info!("No recordings found in the specified date range");
        return Ok(0);
    }

    let total = vod_files.len();
    log::info!("Total found: {} recording(s)", total);

    for (idx, vod_file) in vod_files.iter().enumerate() {
        let idx = idx + 1;
        let output_filename = output_filename(vod_file, idx);
        let output_path = job.output_dir.join(&output_filename);

        log::info!("Downloading [{}/{}]: {}...", idx, total, output_filename);
        save_recording(camera, vod_file, &output_path)
            .await
            .with_context(|| format!("Failed to download {}", vod_file.file_name))?;
        log::info!("  Saved to: {}", output_path.display());
    }

    log::info!(
        "Successfully downloaded {} video(s) to {}",
        total,
        job.output_dir.display()
    );
    Ok(total)
}

/// Walks the recording calendar day by day and gathers the files of each day
/// that overlaps the requested range.
async fn collect_vod_files(
    camera: &Camera,
    channel: u8,
    job: &DownloadJob,
) -> Result<Vec<VodFile>> {
    log::info!(
        "Searching for recordings from {} to {}...",
        job.start,
        job.end
    );
    let (status_list, _) = camera
        .request_vod_files(channel, job.start, job.end, job.stream, true)
        .await?;

    let mut all_files = Vec::new();
    if status_list.is_empty() {
        return Ok(all_files);
    }

    for status in &status_list {
        for &day in &status.days {
            let Some(date) = NaiveDate::from_ymd_opt(status.year, status.month, day) else {
                log::warn!(
                    "Skipping invalid recording day {}-{:02}-{:02}",
                    status.year,
                    status.month,
                    day
                );
                continue;
            };
            let Some((from, to)) = day_window(date, job.start, job.end) else {
                continue;
            };

            log::info!("Checking {}...", date.format("%Y-%m-%d"));
            let (_, day_files) = camera
                .request_vod_files(channel, from, to, job.stream, false)
                .await?;

            if !day_files.is_empty() {
                log::info!("  Found {} file(s)", day_files.len());
                all_files.extend(day_files);
            }
        }
    }

    Ok(all_files)
}

/// Clips the whole of `date` to `[start, end]`, or `None` when they don't overlap.
pub fn day_window(
    date: NaiveDate,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let day_start = date.and_hms_opt(0, 0, 0)?;
    let day_end = date.and_hms_opt(23, 59, 59)?;

    if day_start > end || day_end < start {
        return None;
    }
    Some((day_start.max(start), day_end.min(end)))
}

/// Local name for a recording: `<start timestamp>_<camera file name>.mp4`.
pub fn output_filename(vod_file: &VodFile, idx: usize) -> String {
    let base_name = vod_file
        .file_name
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let clean_name = if base_name.is_empty() {
        format!("recording_{}", idx)
    } else {
        base_name
            .strip_suffix(".mp4")
            .unwrap_or(base_name)
            .to_string()
    };

    let timestamp = match vod_file.start_time {
        Some(start) => start.format("%Y%m%d_%H%M%S").to_string(),
        None => format!("recording_{}", idx),
    };

    format!("{}_{}.mp4", timestamp, clean_name)
}

async fn save_recording(camera: &Camera, vod_file: &VodFile, output_path: &Path) -> Result<()> {
    log::debug!(
        "Requesting {} ({} stream, ends {:?})",
        vod_file.file_name,
        vod_file.stream,
        vod_file.end_time
    );
    let download = camera.download_vod(&vod_file.file_name).await?;
    let content_length = download.content_length();

    let written = write_stream(download.into_stream(), output_path).await?;

    if let Some(expected) = content_length.or(vod_file.size) {
        if expected != written {
            log::warn!(
                "Size mismatch for {}: expected {} bytes, wrote {}",
                output_path.display(),
                expected,
                written
            );
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        let hash = sha256_file(output_path).await?;
        log::debug!(
            "Wrote {} bytes to {}, sha256 {}",
            written,
            output_path.display(),
            hash
        );
    }

    Ok(())
}
