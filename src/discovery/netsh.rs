//! Discovery via `netsh.exe` on Windows.

use super::{DiscoveryBackend, tool_on_path};
use anyhow::{Context, Result};
use regex::Regex;

pub struct Netsh;

impl DiscoveryBackend for Netsh {
    fn name(&self) -> &str {
        "netsh"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "windows") && tool_on_path("netsh.exe")
    }

    fn connected_networks(&self) -> Result<Vec<String>> {
        let output = std::process::Command::new("netsh.exe")
            .args(["wlan", "show", "interfaces"])
            .output()
            .context("failed to run netsh.exe")?;

        if !output.status.success() {
            return Ok(Vec::new());
        }

        parse_interfaces(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_interfaces(stdout: &str) -> Result<Vec<String>> {
    // Anchored so the BSSID line cannot match.
    let ssid_line = Regex::new(r"^\s*SSID\s*:\s*(.+?)\s*$").context("compiling ssid pattern")?;

    Ok(stdout
        .lines()
        .filter_map(|line| ssid_line.captures(line))
        .map(|caps| caps[1].to_string())
        .collect())
}
