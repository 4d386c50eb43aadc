// ── adb output parsing ──
//
// Decoders for what the adb executable prints: length-prefixed tracker
// frames, `adb devices` listings, `getprop` dumps, and `ip addr` lines.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::bridge::DeviceEntry;
use crate::error::BridgeError;
use crate::model::{DeviceProperties, NOT_AVAILABLE, NetworkInterface};

/// Properties read from a device to fill its descriptor.
pub const DEVICE_PROPERTIES: [&str; 6] = [
    "ro.product.cpu.abi",
    "ro.product.manufacturer",
    "ro.product.model",
    "ro.build.version.release",
    "ro.build.version.sdk",
    "wifi.interface",
];

const HEADER_LEN: usize = 4;

// ── Tracker frames ──────────────────────────────────────────────────

/// Incremental decoder for `adb track-devices` output.
///
/// Each frame is four hex digits giving the payload length, followed by
/// the payload: one `serial\tstate` line per attached device.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, if one is buffered.
    pub(crate) fn next_frame(&mut self) -> Result<Option<String>, BridgeError> {
        let Some(header) = self.buf.get(..HEADER_LEN) else {
            return Ok(None);
        };

        let header = std::str::from_utf8(header).map_err(|_| BridgeError::Protocol {
            message: "non-ASCII frame header".into(),
        })?;
        let len = usize::from_str_radix(header, 16).map_err(|_| BridgeError::Protocol {
            message: format!("invalid frame length {header:?}"),
        })?;

        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len);
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| BridgeError::Protocol {
                message: "frame payload is not UTF-8".into(),
            })
    }
}

// ── Device listings ─────────────────────────────────────────────────

/// Parse a device list, either a tracker frame payload or the output of
/// `adb devices`.
pub(crate) fn parse_device_list(text: &str) -> Vec<DeviceEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let id = parts.next()?;
            let state = parts.next()?;
            Some(DeviceEntry::new(id, state))
        })
        .collect()
}

// ── Properties ──────────────────────────────────────────────────────

/// Parse `getprop` output (`[key]: [value]` per line).
pub(crate) fn parse_getprop(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once("]: [")?;
            let key = key.strip_prefix('[')?;
            let value = value.strip_suffix(']')?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

pub(crate) fn properties_from(props: &HashMap<String, String>) -> DeviceProperties {
    let get = |key: &str| {
        props
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    };

    DeviceProperties {
        manufacturer: get("ro.product.manufacturer"),
        model: get("ro.product.model"),
        os_version: get("ro.build.version.release"),
        sdk_version: get("ro.build.version.sdk"),
        cpu_abi: get("ro.product.cpu.abi"),
        wifi_interface: props.get("wifi.interface").cloned().unwrap_or_default(),
    }
}

// ── Interfaces ──────────────────────────────────────────────────────

/// Parse `ip -4 -o addr show` output, skipping loopback.
pub(crate) fn parse_ip_addr(output: &str) -> Vec<NetworkInterface> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let name = tokens.get(1)?.trim_end_matches(':');
            let name = name.split('@').next().unwrap_or(name);
            let inet = tokens.iter().position(|t| *t == "inet")?;
            let address = tokens.get(inet + 1)?.split('/').next()?;
            (name != "lo").then(|| NetworkInterface {
                name: name.to_owned(),
                ipv4: address.to_owned(),
            })
        })
        .collect()
}
