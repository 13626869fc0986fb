use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDateTime;

use crate::camera::StreamType;
use crate::Args;

const API_PATH: &str = "/cgi-bin/api.cgi";

#[derive(Debug, Clone)]
pub struct CameraTarget {
    host: String,
    port: u16,
    https: bool,
    insecure: bool,
    username: String,
    password: String,
    timeout: Duration,
}

impl CameraTarget {
    pub fn from_args(args: &Args) -> Result<Self> {
        let host = args.ip.trim().to_string();
        if host.is_empty() {
            bail!("ip is required");
        }
        let port = args
            .port
            .unwrap_or(if args.https { 443 } else { 80 });
        Ok(Self {
            host,
            port,
            https: args.https,
            insecure: args.insecure,
            username: args.username.clone(),
            password: args.password.clone(),
            timeout: Duration::from_secs(args.timeout_secs),
        })
    }

    #[cfg(test)]
    pub fn local(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            https: false,
            insecure: false,
            username: "admin".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn api_endpoint(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, API_PATH)
    }

    pub fn credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// What to fetch once connected.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub output_dir: PathBuf,
    pub channel: Option<u8>,
    pub stream: StreamType,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "reolink-vod-dl",
            "--ip",
            " 192.168.1.20 ",
            "--username",
            "admin",
            "--password",
            "pw",
            "--start-time",
            "2024-01-01",
            "--end-time",
            "2024-01-02",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn default_port_follows_scheme() {
        let plain = CameraTarget::from_args(&args(&[])).unwrap();
        assert_eq!(plain.host(), "192.168.1.20");
        assert_eq!(plain.api_endpoint(), "http://192.168.1.20:80/cgi-bin/api.cgi");

        let tls = CameraTarget::from_args(&args(&["--https"])).unwrap();
        assert_eq!(tls.api_endpoint(), "https://192.168.1.20:443/cgi-bin/api.cgi");

        let custom = CameraTarget::from_args(&args(&["--https", "--port", "8443"])).unwrap();
        assert_eq!(
            custom.api_endpoint(),
            "https://192.168.1.20:8443/cgi-bin/api.cgi"
        );
    }

    #[test]
    fn blank_host_is_rejected() {
        let mut a = args(&[]);
        a.ip = "   ".to_string();
        assert!(CameraTarget::from_args(&a).is_err());
    }
}
