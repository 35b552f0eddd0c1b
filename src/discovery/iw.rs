//! Discovery via the `iw` wireless tool.

use super::{DiscoveryBackend, tool_on_path};
use anyhow::{Context, Result};
use regex::Regex;

pub struct Iw;

impl DiscoveryBackend for Iw {
    fn name(&self) -> &str {
        "iw"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && tool_on_path("iw")
    }

    fn connected_networks(&self) -> Result<Vec<String>> {
        let output = std::process::Command::new("iw")
            .arg("dev")
            .output()
            .context("failed to run iw")?;

        if !output.status.success() {
            return Ok(Vec::new());
        }

        parse_iw_dev(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_iw_dev(stdout: &str) -> Result<Vec<String>> {
    let ssid_line = Regex::new(r"^\s+ssid (.+)$").context("compiling ssid pattern")?;

    Ok(stdout
        .lines()
        .filter_map(|line| ssid_line.captures(line))
        .map(|caps| caps[1].to_string())
        .collect())
}
