use std::path::Path;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use futures::{Stream, StreamExt};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::CameraTarget;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parses a camera-local date or date and time.
///
/// Accepts `YYYY-MM-DD [HH:MM[:SS]]` and `YYYY/MM/DD [HH:MM[:SS]]`; a bare
/// date means midnight.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Some(parsed) = NaiveDate::parse_from_str(trimmed, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok(parsed);
        }
    }

    Err(anyhow!(
        "Unable to parse date '{}'. Supported formats: YYYY-MM-DD [HH:MM[:SS]] or YYYY/MM/DD [HH:MM[:SS]]",
        input
    ))
}

/// Builds the shared client. The request timeout is applied per API call so
/// long recording downloads are not cut off.
pub fn build_http_client(target: &CameraTarget) -> Result<Client> {
    Client::builder()
        .connect_timeout(target.timeout())
        .danger_accept_invalid_certs(target.insecure())
        .build()
        .context("Failed to build HTTP client")
}

pub async fn create_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// Writes `stream` to `path` chunk by chunk and returns the number of bytes written.
pub async fn write_stream<S, E>(stream: S, path: &Path) -> Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut file = File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut stream = std::pin::pin!(stream);
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read recording data")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write to {}", path.display()))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(written)
}

pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "reolink-vod-dl-utils-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parses_every_supported_format() {
        let cases = [
            ("2024-01-01 14:30:15", "2024-01-01 14:30:15"),
            ("2024-01-01 14:30", "2024-01-01 14:30:00"),
            ("2024-01-01", "2024-01-01 00:00:00"),
            ("2024/01/01 14:30:15", "2024-01-01 14:30:15"),
            ("2024/01/01 14:30", "2024-01-01 14:30:00"),
            ("  2024/01/01 ", "2024-01-01 00:00:00"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_datetime(input).unwrap().to_string(), expected, "{input}");
        }
    }

    #[test]
    fn rejects_unknown_formats() {
        for input in ["01/02/2024", "2024-13-01", "2024-01-01T10:00:00", ""] {
            let err = parse_datetime(input).unwrap_err();
            assert!(
                err.to_string()
                    .starts_with(&format!("Unable to parse date '{}'.", input)),
                "{err}"
            );
        }
    }

    #[tokio::test]
    async fn write_stream_keeps_chunk_order() {
        let dir = scratch_dir("order");
        let path = dir.join("out.mp4");
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"ftyp")),
            Ok(Bytes::from_static(b"moov")),
            Ok(Bytes::from_static(b"mdat")),
        ];

        let written = write_stream(futures::stream::iter(chunks), &path)
            .await
            .unwrap();

        assert_eq!(written, 12);
        assert_eq!(std::fs::read(&path).unwrap(), b"ftypmoovmdat");
    }

    #[tokio::test]
    async fn write_stream_reports_broken_transfer() {
        let dir = scratch_dir("broken");
        let path = dir.join("out.mp4");
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"ftyp")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];

        let err = write_stream(futures::stream::iter(chunks), &path)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read recording data"));
    }

    #[tokio::test]
    async fn sha256_of_saved_file() {
        let dir = scratch_dir("sha");
        let path = dir.join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
