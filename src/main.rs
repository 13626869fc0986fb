use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod camera;
mod config;
mod downloader;
mod utils;

use camera::{ApiError, Camera, StreamType};
use config::{CameraTarget, DownloadJob};

/// Download videos from a Reolink camera within a specified date range.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Args {
    #[clap(long, help = "Camera IP address")]
    ip: String,
    #[clap(long, help = "Camera username")]
    username: String,
    #[clap(long, help = "Camera password")]
    password: String,
    #[clap(
        long,
        help = "Start date/time (e.g., '2024-01-01' or '2024-01-01 14:30:00')"
    )]
    start_time: String,
    #[clap(
        long,
        help = "End date/time (e.g., '2024-01-02' or '2024-01-02 14:30:00')"
    )]
    end_time: String,
    #[clap(
        long,
        default_value = "./downloads",
        help = "Output directory for downloaded videos"
    )]
    output: PathBuf,
    #[clap(long, help = "HTTP(S) port [default: 80, or 443 with --https]")]
    port: Option<u16>,
    #[clap(long, help = "Use HTTPS instead of HTTP")]
    https: bool,
    #[clap(long, help = "Accept self-signed TLS certificates")]
    insecure: bool,
    #[clap(long, help = "Channel to download from [default: first channel]")]
    channel: Option<u8>,
    #[clap(long, value_enum, default_value_t = StreamType::Main, help = "Recording stream")]
    stream: StreamType,
    #[clap(long, default_value_t = 30, help = "Timeout for API requests in seconds")]
    timeout_secs: u64,
    #[clap(long, help = "Enable debug mode")]
    debug: bool,
}

fn build_job(args: &Args) -> Result<DownloadJob> {
    let start = utils::parse_datetime(&args.start_time)?;
    let end = utils::parse_datetime(&args.end_time)?;
    if start >= end {
        anyhow::bail!("start-time must be before end-time");
    }
    Ok(DownloadJob {
        start,
        end,
        output_dir: args.output.clone(),
        channel: args.channel,
        stream: args.stream,
    })
}

fn prepare(args: &Args) -> Result<(DownloadJob, CameraTarget)> {
    Ok((build_job(args)?, CameraTarget::from_args(args)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let (job, target) = match prepare(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::error!("Error: {}", err);
            process::exit(1);
        }
    };

    let client = match utils::build_http_client(&target) {
        Ok(client) => client,
        Err(err) => {
            log::error!("Fatal error: {:#}", err);
            process::exit(1);
        }
    };
    let mut camera = Camera::new(client, target);

    if let Err(err) = downloader::download_videos(&mut camera, &job).await {
        if err.is::<downloader::Cancelled>() {
            log::error!("Download cancelled by user");
        } else {
            log::error!("Fatal error: {:#}", err);
            if let Some(api) = err.downcast_ref::<ApiError>() {
                if api.cmd == "Login" {
                    log::error!("Check the camera username and password");
                }
            }
        }
        process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec![
            "reolink-vod-dl",
            "--ip",
            "10.0.0.5",
            "--username",
            "admin",
            "--password",
            "pw",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = parse(&["--start-time", "2024-01-01", "--end-time", "2024-01-02"]).unwrap();
        assert_eq!(args.output, PathBuf::from("./downloads"));
        assert_eq!(args.port, None);
        assert_eq!(args.stream, StreamType::Main);
        assert_eq!(args.timeout_secs, 30);
        assert!(!args.https && !args.insecure && !args.debug);

        let job = build_job(&args).unwrap();
        assert_eq!(job.start.to_string(), "2024-01-01 00:00:00");
        assert_eq!(job.end.to_string(), "2024-01-02 00:00:00");
        assert_eq!(job.channel, None);
    }

    #[test]
    fn required_flags_are_enforced() {
        assert!(parse(&["--start-time", "2024-01-01"]).is_err());
        assert!(Args::try_parse_from(["reolink-vod-dl", "--ip", "x"]).is_err());
    }

    #[test]
    fn sub_stream_and_channel_are_forwarded() {
        let args = parse(&[
            "--start-time",
            "2024/01/01 08:00",
            "--end-time",
            "2024/01/01 09:00",
            "--stream",
            "sub",
            "--channel",
            "2",
            "--output",
            "/tmp/clips",
        ])
        .unwrap();
        let job = build_job(&args).unwrap();
        assert_eq!(job.stream, StreamType::Sub);
        assert_eq!(job.channel, Some(2));
        assert_eq!(job.output_dir, PathBuf::from("/tmp/clips"));
    }

    #[test]
    fn range_must_move_forward() {
        let same = parse(&["--start-time", "2024-01-01", "--end-time", "2024-01-01 00:00:00"]).unwrap();
        assert_eq!(
            build_job(&same).unwrap_err().to_string(),
            "start-time must be before end-time"
        );

        let reversed = parse(&["--start-time", "2024-01-02", "--end-time", "2024-01-01"]).unwrap();
        assert!(build_job(&reversed).is_err());
    }

    #[test]
    fn unparseable_date_reports_supported_formats() {
        let args = parse(&["--start-time", "yesterday", "--end-time", "2024-01-01"]).unwrap();
        let err = build_job(&args).unwrap_err().to_string();
        assert!(err.starts_with("Unable to parse date 'yesterday'."));
        assert!(err.contains("YYYY/MM/DD"));
    }
}
