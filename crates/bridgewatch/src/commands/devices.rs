//! Device listing handlers.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tabled::Tabled;

use bridgewatch_core::{ControlCenter, DeviceDescriptor, NO_PID, Snapshot};

use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct DeviceRow {
    #[tabled(rename = "UDID")]
    udid: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Android")]
    os_version: String,
    #[tabled(rename = "SDK")]
    sdk: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl DeviceRow {
    pub(crate) fn new(d: &DeviceDescriptor, color: bool) -> Self {
        Self {
            udid: d.udid.clone(),
            state: output::state_label(&d.state, color),
            model: d.model.clone(),
            manufacturer: d.manufacturer.clone(),
            os_version: d.os_version.clone(),
            sdk: d.sdk_version.clone(),
            ipv4: d
                .interfaces
                .iter()
                .map(|i| i.ipv4.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            pid: pid_label(d.pid),
            updated: local_time(d.last_update_timestamp, "%H:%M:%S"),
        }
    }
}

fn pid_label(pid: i32) -> String {
    if pid == NO_PID {
        "-".into()
    } else {
        pid.to_string()
    }
}

pub(crate) fn local_time(millis: i64, fmt: &str) -> String {
    DateTime::from_timestamp_millis(millis).map_or_else(
        || "-".into(),
        |t| t.with_timezone(&Local).format(fmt).to_string(),
    )
}

fn detail(d: &Arc<DeviceDescriptor>) -> String {
    let mut lines = vec![
        format!("UDID:         {}", d.udid),
        format!("State:        {}", d.state),
        format!("Model:        {}", d.model),
        format!("Manufacturer: {}", d.manufacturer),
        format!("Android:      {} (SDK {})", d.os_version, d.sdk_version),
        format!("CPU ABI:      {}", d.cpu_abi),
        format!("WiFi:         {}", d.wifi_interface),
        format!("Server PID:   {}", pid_label(d.pid)),
    ];
    for iface in &d.interfaces {
        lines.push(format!("  {:<10} {}", iface.name, iface.ipv4));
    }
    lines.push(format!(
        "Updated:      {}",
        local_time(d.last_update_timestamp, "%Y-%m-%d %H:%M:%S")
    ));
    lines.join("\n")
}

/// Run the registry for the settle window and take a snapshot.
async fn settled_snapshot(center: &ControlCenter, settings: &Settings) -> Snapshot<DeviceDescriptor> {
    center.start();
    tokio::time::sleep(settings.settle).await;
    let snap = center.devices();
    center.release().await;
    snap
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(center: &ControlCenter, settings: &Settings) -> Result<(), CliError> {
    let snap = settled_snapshot(center, settings).await;
    let out = output::render_list(
        &settings.output,
        snap.as_slice(),
        |d| DeviceRow::new(d, settings.color),
        |d| d.udid.clone(),
    )?;
    output::print_output(&out, settings.quiet);
    Ok(())
}

pub async fn get(center: &ControlCenter, udid: &str, settings: &Settings) -> Result<(), CliError> {
    let snap = settled_snapshot(center, settings).await;
    let Some(found) = snap.iter().find(|d| d.udid == udid) else {
        return Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: udid.into(),
            list_command: "devices".into(),
        });
    };
    let out = output::render_single(&settings.output, found, detail, |d| d.udid.clone())?;
    output::print_output(&out, settings.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgewatch_core::{ConnectivityState, NetworkInterface};

    #[test]
    fn row_shows_sentinels_as_dashes() {
        let mut d = DeviceDescriptor::placeholder("10.0.0.5", ConnectivityState::Disconnected);
        d.model = "Pixel".into();
        let row = DeviceRow::new(&d, false);
        assert_eq!(row.state, "disconnected");
        assert_eq!(row.pid, "-");
        assert_eq!(row.ipv4, "");
    }

    #[test]
    fn detail_lists_interfaces() {
        let mut d = DeviceDescriptor::placeholder("emulator-5554", ConnectivityState::Connected);
        d.pid = 812;
        d.interfaces = vec![NetworkInterface {
            name: "wlan0".into(),
            ipv4: "192.168.1.42".into(),
        }];
        let text = detail(&Arc::new(d));
        assert!(text.contains("State:        device"));
        assert!(text.contains("Server PID:   812"));
        assert!(text.contains("wlan0"));
    }
}
