// ── Operator-declared devices ──

use serde::{Deserialize, Serialize};

/// A device declared in the devices config file.
///
/// `ip` is matched against live device ids; a device connected over
/// TCP shows up on the bridge under its `ip:port` or `ip` address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredDevice {
    pub id: String,
    pub ip: String,
    pub name: String,
}

/// On-disk shape of the devices config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub devices: Vec<ConfiguredDevice>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn devices_key_is_required() {
        assert!(serde_json::from_str::<DevicesConfig>("{}").is_err());
    }

    #[test]
    fn parses_declared_devices() {
        let cfg: DevicesConfig = serde_json::from_str(
            r#"{"devices":[{"id":"a","ip":"10.0.0.5","name":"Pixel"}]}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.devices,
            vec![ConfiguredDevice {
                id: "a".into(),
                ip: "10.0.0.5".into(),
                name: "Pixel".into(),
            }]
        );
    }
}
