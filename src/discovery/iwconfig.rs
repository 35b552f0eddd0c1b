//! Discovery via the legacy `iwconfig` tool.

use super::{DiscoveryBackend, tool_on_path};
use anyhow::{Context, Result};
use regex::Regex;

pub struct IwConfig;

impl DiscoveryBackend for IwConfig {
    fn name(&self) -> &str {
        "iwconfig"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && tool_on_path("iwconfig")
    }

    fn connected_networks(&self) -> Result<Vec<String>> {
        let output = std::process::Command::new("iwconfig")
            .output()
            .context("failed to run iwconfig")?;

        if !output.status.success() {
            return Ok(Vec::new());
        }

        parse_iwconfig(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_iwconfig(stdout: &str) -> Result<Vec<String>> {
    let essid = Regex::new(r#"ESSID:"(.+?)""#).context("compiling essid pattern")?;

    Ok(stdout
        .lines()
        .filter_map(|line| essid.captures(line))
        .map(|caps| caps[1].to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_associated_interface() {
        let stdout = concat!(
            "wlan0     IEEE 802.11  ESSID:\"Coffee Wifi\"\n",
            "          Mode:Managed  Frequency:5.18 GHz\n",
            "lo        no wireless extensions.\n",
        );
        assert_eq!(parse_iwconfig(stdout).unwrap(), vec!["Coffee Wifi"]);
    }

    #[test]
    fn unassociated_interface_yields_nothing() {
        let stdout = "wlan0     IEEE 802.11  ESSID:off/any\n";
        assert!(parse_iwconfig(stdout).unwrap().is_empty());
    }
}
