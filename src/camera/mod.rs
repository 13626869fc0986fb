//! Client for the Reolink HTTP API.
//!
//! Every command is a JSON array posted to `/cgi-bin/api.cgi`; a session token
//! obtained from `Login` is passed as a query parameter on later calls.
//! Recordings are fetched with a plain `GET` of the `Download` command, whose
//! body is the MP4 file itself.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::NaiveDateTime;
use futures::Stream;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CameraTarget;

mod types;

pub use types::{ApiError, StreamType, VodFile, VodSearchStatus};
use types::*;

pub struct Camera {
    client: Client,
    target: CameraTarget,
    token: Option<String>,
    device: Option<DeviceInfo>,
    channels: Vec<u8>,
}

impl Camera {
    pub fn new(client: Client, target: CameraTarget) -> Self {
        Self {
            client,
            target,
            token: None,
            device: None,
            channels: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        self.target.host()
    }

    pub fn nvr_name(&self) -> &str {
        self.device.as_ref().map(|d| d.name.as_str()).unwrap_or("")
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    async fn send<P, T>(&self, cmd: &str, param: P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let body = [Command {
            cmd,
            action: 0,
            param,
        }];

        let mut request = self
            .client
            .post(self.target.api_endpoint())
            .timeout(self.target.timeout())
            .query(&[("cmd", cmd)]);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", cmd))?;

        if !response.status().is_success() {
            bail!("{} returned status code {}", cmd, response.status());
        }

        let responses: Vec<CommandResponse> = response
            .json()
            .await
            .with_context(|| format!("Failed to read {} response", cmd))?;

        into_value(responses, cmd)
    }

    pub async fn login(&mut self) -> Result<()> {
        let (user_name, password) = self.target.credentials();
        let param = LoginParam {
            user: LoginUser {
                version: "0",
                user_name,
                password,
            },
        };

        // a stale token would be sent along with Login
        self.token = None;
        let value: LoginValue = self.send("Login", param).await?;
        log::debug!(
            "Logged in to {}, token lease {}s",
            self.target.host(),
            value.token.lease_time
        );
        self.token = Some(value.token.name);
        Ok(())
    }

    /// Authenticates if needed and loads device info and the channel list.
    pub async fn get_host_data(&mut self) -> Result<()> {
        if self.token.is_none() {
            self.login().await?;
        }

        let value: DevInfoValue = self
            .send("GetDevInfo", serde_json::json!({}))
            .await
            .context("Failed to query device info")?;
        let device = value.dev_info;
        log::debug!(
            "Device {:?}: model {}, firmware {}, {} channel(s)",
            device.name,
            device.model,
            device.firmware,
            device.channel_count
        );

        self.channels = if device.channel_count > 1 {
            let status: ChannelStatusValue = self
                .send("GetChannelstatus", serde_json::json!({}))
                .await
                .context("Failed to query channel status")?;
            status
                .status
                .into_iter()
                .filter(|c| c.online == 1)
                .map(|c| c.channel)
                .collect()
        } else {
            vec![0]
        };
        self.device = Some(device);
        Ok(())
    }

    /// Searches the recording index of `channel` between `start` and `end`.
    ///
    /// With `status_only` the camera answers with the per-month calendar of
    /// days that hold recordings and no file list.
    pub async fn request_vod_files(
        &self,
        channel: u8,
        start: NaiveDateTime,
        end: NaiveDateTime,
        stream: StreamType,
        status_only: bool,
    ) -> Result<(Vec<VodSearchStatus>, Vec<VodFile>)> {
        let param = SearchParam {
            search: SearchQuery {
                channel,
                only_status: u8::from(status_only),
                stream_type: stream.as_str(),
                start_time: start.into(),
                end_time: end.into(),
            },
        };

        let value: SearchValue = self
            .send("Search", param)
            .await
            .context("Failed to search recordings")?;

        let status = value.result.status.into_iter().map(Into::into).collect();
        let files = value.result.files.into_iter().map(Into::into).collect();
        Ok((status, files))
    }

    pub async fn download_vod(&self, file_name: &str) -> Result<VodDownload> {
        let token = self
            .token
            .as_deref()
            .context("Not logged in to camera")?;

        let response = self
            .client
            .get(self.target.api_endpoint())
            .query(&[
                ("cmd", "Download"),
                ("source", file_name),
                ("output", file_name),
                ("token", token),
            ])
            .send()
            .await
            .context("Failed to send Download request")?;

        if !response.status().is_success() {
            bail!("Download returned status code {}", response.status());
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/json") || value.starts_with("text/"))
            .unwrap_or(false);
        if is_json {
            let text = response
                .text()
                .await
                .context("Failed to read Download response")?;
            return Err(download_rejection(&text));
        }

        Ok(VodDownload { response })
    }

    /// Ends the session. Failures are only logged.
    pub async fn logout(&mut self) {
        if self.token.is_none() {
            return;
        }
        let result: Result<serde_json::Value> = self.send("Logout", serde_json::json!({})).await;
        if let Err(err) = result {
            log::warn!("Logout failed: {:#}", err);
        }
        self.token = None;
    }
}

fn download_rejection(text: &str) -> anyhow::Error {
    match serde_json::from_str::<Vec<CommandResponse>>(text) {
        Ok(responses) => match into_value::<serde_json::Value>(responses, "Download") {
            Err(err) => err,
            Ok(_) => anyhow::anyhow!("Camera answered Download without video data"),
        },
        Err(_) => anyhow::anyhow!("Camera answered Download with: {}", text.trim()),
    }
}

/// An open recording transfer. Dropping it releases the connection.
pub struct VodDownload {
    response: Response,
}

impl VodDownload {
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> {
        self.response.bytes_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_surfaces_camera_error() {
        let text = r#"[{"cmd":"Download","code":1,"error":{"detail":"please login first","rspCode":-6}}]"#;
        let err = download_rejection(text);
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.rsp_code, -6);
        assert_eq!(api.detail, "please login first");
    }

    #[test]
    fn rejection_keeps_non_json_body() {
        let err = download_rejection("  file not found\n");
        assert_eq!(
            err.to_string(),
            "Camera answered Download with: file not found"
        );
    }

    #[test]
    fn fresh_camera_has_no_session() {
        let camera = Camera::new(Client::new(), CameraTarget::local(80));
        assert_eq!(camera.nvr_name(), "");
        assert!(camera.channels().is_empty());
        assert_eq!(camera.host(), "127.0.0.1");
    }
}
