//! Locating the clock by its stored MAC address.

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use regex::Regex;
use tokio::time::timeout;

use crate::device::constants::SCAN_TIMEOUT;
use crate::error::{Error, Result};

pub struct DeviceScanner {
    adapter: Adapter,
}

impl DeviceScanner {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Resolves the device with the given MAC address, checking already
    /// connected devices first and falling back to an advertisement scan.
    pub async fn find_by_address(&self, address: &str) -> Result<Device> {
        let target = normalize_address(address);

        info!("Looking for {target} among connected devices");
        let connected = self
            .adapter
            .connected_devices()
            .await
            .map_err(|e| Error::Connection(format!("listing connected devices failed: {e}")))?;
        for device in connected {
            if Self::matches(&device, &target) {
                info!("Device {target} is already connected");
                return Ok(device);
            }
        }

        info!("Scanning for {target}");
        let mut scan = self
            .adapter
            .scan(&[])
            .await
            .map_err(|e| Error::Connection(format!("scan failed to start: {e}")))?;

        let found = timeout(SCAN_TIMEOUT, async {
            while let Some(discovered) = scan.next().await {
                let device = discovered.device;
                debug!(
                    "Found device {} (rssi {:?})",
                    device.id(),
                    discovered.rssi
                );
                if Self::matches(&device, &target) {
                    return Some(device);
                }
            }
            None
        })
        .await;

        match found {
            Ok(Some(device)) => Ok(device),
            Ok(None) => Err(Error::Connection(format!(
                "scan ended without finding {target}"
            ))),
            Err(_) => Err(Error::Connection(format!(
                "device {target} not found within {}s",
                SCAN_TIMEOUT.as_secs()
            ))),
        }
    }

    fn matches(device: &Device, target: &str) -> bool {
        extract_mac_address(&device.id().to_string())
            .map(|mac| mac == target)
            .unwrap_or(false)
    }
}

/// Pulls a MAC address out of a platform device id. BlueZ ids are D-Bus
/// paths with an underscore-separated MAC (`/org/bluez/hci0/dev_XX_...`),
/// Windows ids embed a dash- or colon-separated one. On macOS ids are opaque
/// UUIDs without one, in which case the device cannot be matched by address.
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| normalize_address(m.as_str()))
}

fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase().replace(['-', '_'], ":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mac_from_platform_ids() {
        // BlueZ D-Bus path
        assert_eq!(
            extract_mac_address("/org/bluez/hci0/dev_58_AB_cd_EF_AB_CD").as_deref(),
            Some("58:AB:CD:EF:AB:CD")
        );
        assert_eq!(
            extract_mac_address("58:ab:cd:ef:ab:cd").as_deref(),
            Some("58:AB:CD:EF:AB:CD")
        );
        assert_eq!(
            extract_mac_address("BluetoothDevice (58-AB-CD-EF-AB-CD)").as_deref(),
            Some("58:AB:CD:EF:AB:CD")
        );
        // macOS opaque UUID, no MAC to extract
        assert_eq!(extract_mac_address("0D39A7F0-9A3E-4618"), None);
    }

    #[test]
    fn bluez_device_path_matches_the_stored_address() {
        let extracted =
            extract_mac_address("/org/bluez/hci0/dev_58_AB_CD_EF_AB_CD").unwrap();
        assert_eq!(extracted, normalize_address("58:ab:cd:ef:ab:cd"));
    }

    #[test]
    fn normalizes_case_and_separator() {
        assert_eq!(normalize_address(" 58-ab-cd-ef-ab-cd "), "58:AB:CD:EF:AB:CD");
    }
}
