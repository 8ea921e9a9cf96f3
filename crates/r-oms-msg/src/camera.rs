//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Parsers for camera metadata replies. The camera controller reports
//! fields under several historical names depending on firmware generation,
//! so each field is resolved through an ordered key list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn field(row: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| {
            row.get(*key).and_then(|value| match value {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
        })
        .unwrap_or_default()
}

/// Static camera metadata from a GetCameraInfo reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Camera address.
    pub ip: String,
    /// Camera model.
    pub model: String,
    /// Device UUID.
    pub uuid: String,
    /// Firmware version.
    pub firmware: String,
    /// White balance setting.
    pub white_balance: String,
    /// ISO setting.
    pub iso: String,
    /// Shutter speed setting.
    pub shutter: String,
    /// Aperture setting.
    pub aperture: String,
    /// Focus mode.
    pub focus_mode: String,
}

/// Stream format metadata from a GetVideoFormat reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Camera address.
    pub ip: String,
    /// Camera model.
    pub model: String,
    /// Stream type.
    pub stream: String,
    /// Main video format.
    pub format: String,
    /// Codec in use.
    pub codec: String,
    /// Main stream bitrate.
    pub bitrate: String,
    /// GOP length.
    pub gop: String,
}

/// Parse a GetCameraInfo reply; rows without an address are discarded.
pub fn parse_camera_info(resp: &Value) -> Vec<CameraInfo> {
    let Some(rows) = resp.get("Cameras").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let ip = field(row, &["IPAddress", "IP", "ip"]);
            if ip.is_empty() {
                return None;
            }
            Some(CameraInfo {
                ip,
                model: field(row, &["ModelName", "Model", "CameraModel"]),
                uuid: field(row, &["UUID"]),
                firmware: field(row, &["FirmwareVersion", "FW"]),
                white_balance: field(row, &["WhiteBalance", "WB"]),
                iso: field(row, &["ISO"]),
                shutter: field(row, &["ShutterSpeed", "Shutter"]),
                aperture: field(row, &["Aperture"]),
                focus_mode: field(row, &["FocusMode"]),
            })
        })
        .collect()
}

/// Parse a GetVideoFormat reply; rows without an address are discarded.
pub fn parse_video_format(resp: &Value) -> Vec<VideoFormat> {
    let Some(rows) = resp.get("Cameras").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let ip = field(row, &["IPAddress", "IP", "ip"]);
            if ip.is_empty() {
                return None;
            }
            Some(VideoFormat {
                ip,
                model: field(row, &["ModelName", "Model", "CameraModel"]),
                stream: field(row, &["StreamType", "Stream"]),
                format: field(row, &["VideoFormatMain", "Format"]),
                codec: field(row, &["Codec"]),
                bitrate: field(row, &["VideoBitrateMain", "Bitrate"]),
                gop: field(row, &["VideoGopMain", "VideoGop"]),
            })
        })
        .collect()
}
