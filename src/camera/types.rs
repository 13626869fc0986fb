//! Wire types of the `/cgi-bin/api.cgi` JSON API and the models built from them.

use std::fmt;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Recording stream a search or download refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamType {
    Main,
    Sub,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Main => "main",
            StreamType::Sub => "sub",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Command<'a, P> {
    pub cmd: &'a str,
    pub action: u8,
    pub param: P,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommandResponse {
    pub cmd: String,
    pub code: i64,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: String,
    #[serde(rename = "rspCode", default)]
    pub rsp_code: i64,
}

/// A command the camera answered with a non-zero code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub cmd: String,
    pub code: i64,
    pub rsp_code: i64,
    pub detail: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "camera rejected {}: {} (code {}, rspCode {})",
            self.cmd, self.detail, self.code, self.rsp_code
        )
    }
}

impl std::error::Error for ApiError {}

/// Picks the answer to `cmd` out of a response array and decodes its `value`.
pub(crate) fn into_value<T: DeserializeOwned>(
    responses: Vec<CommandResponse>,
    cmd: &str,
) -> Result<T> {
    let response = responses
        .into_iter()
        .find(|r| r.cmd == cmd)
        .with_context(|| format!("No response to {} in camera reply", cmd))?;

    if response.code != 0 {
        let (detail, rsp_code) = response
            .error
            .map(|e| (e.detail, e.rsp_code))
            .unwrap_or_else(|| ("unknown error".to_string(), 0));
        return Err(ApiError {
            cmd: response.cmd,
            code: response.code,
            rsp_code,
            detail,
        }
        .into());
    }

    let value = response.value.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).with_context(|| format!("Malformed {} response", cmd))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ApiTime {
    pub year: i32,
    pub mon: u32,
    pub day: u32,
    pub hour: u32,
    pub min: u32,
    pub sec: u32,
}

impl From<NaiveDateTime> for ApiTime {
    fn from(t: NaiveDateTime) -> Self {
        Self {
            year: t.year(),
            mon: t.month(),
            day: t.day(),
            hour: t.hour(),
            min: t.minute(),
            sec: t.second(),
        }
    }
}

impl ApiTime {
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.mon, self.day)?.and_hms_opt(
            self.hour,
            self.min,
            self.sec,
        )
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginParam<'a> {
    #[serde(rename = "User")]
    pub user: LoginUser<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginUser<'a> {
    #[serde(rename = "Version")]
    pub version: &'a str,
    #[serde(rename = "userName")]
    pub user_name: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginValue {
    #[serde(rename = "Token")]
    pub token: Token,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Token {
    pub name: String,
    #[serde(rename = "leaseTime", default)]
    pub lease_time: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DevInfoValue {
    #[serde(rename = "DevInfo")]
    pub dev_info: DeviceInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "firmVer", default)]
    pub firmware: String,
    #[serde(rename = "channelNum", default)]
    pub channel_count: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelStatusValue {
    #[serde(default)]
    pub status: Vec<ChannelStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelStatus {
    pub channel: u8,
    #[serde(default)]
    pub online: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchParam<'a> {
    #[serde(rename = "Search")]
    pub search: SearchQuery<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchQuery<'a> {
    pub channel: u8,
    #[serde(rename = "onlyStatus")]
    pub only_status: u8,
    #[serde(rename = "streamType")]
    pub stream_type: &'a str,
    #[serde(rename = "StartTime")]
    pub start_time: ApiTime,
    #[serde(rename = "EndTime")]
    pub end_time: ApiTime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchValue {
    #[serde(rename = "SearchResult")]
    pub result: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResult {
    #[serde(rename = "Status", default)]
    pub status: Vec<StatusEntry>,
    #[serde(rename = "File", default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusEntry {
    pub year: i32,
    pub mon: u32,
    #[serde(default)]
    pub table: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(rename = "StartTime", default)]
    pub start_time: Option<ApiTime>,
    #[serde(rename = "EndTime", default)]
    pub end_time: Option<ApiTime>,
    #[serde(rename = "type", default)]
    pub stream: String,
}

/// Firmwares disagree on whether `size` is a number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Size {
    Number(u64),
    Text(String),
}

impl Size {
    fn bytes(&self) -> Option<u64> {
        match self {
            Size::Number(n) => Some(*n),
            Size::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Days of one month that hold recordings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodSearchStatus {
    pub year: i32,
    pub month: u32,
    pub days: Vec<u32>,
}

impl From<StatusEntry> for VodSearchStatus {
    fn from(entry: StatusEntry) -> Self {
        // one character per day of the month, '1' when something was recorded
        let days = entry
            .table
            .chars()
            .zip(1..)
            .filter(|(flag, _)| *flag == '1')
            .map(|(_, day)| day)
            .collect();
        Self {
            year: entry.year,
            month: entry.mon,
            days,
        }
    }
}

/// A single recording on the camera's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodFile {
    pub file_name: String,
    pub size: Option<u64>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub stream: String,
}

impl From<FileEntry> for VodFile {
    fn from(entry: FileEntry) -> Self {
        Self {
            size: entry.size.as_ref().and_then(Size::bytes),
            start_time: entry.start_time.and_then(ApiTime::to_naive),
            end_time: entry.end_time.and_then(ApiTime::to_naive),
            file_name: entry.name,
            stream: entry.stream,
        }
    }
}
