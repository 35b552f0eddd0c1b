//! NetworkManager discovery via the `nmcli` command line tool.
//!
//! Snapshots come from `nmcli -t` terse output; change streaming rides
//! on a spawned `nmcli monitor` child whose stdout reports connection
//! state transitions as they happen.

use super::{ChangeCallback, DiscoveryBackend, WatchHandle, tool_on_path};
use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

pub struct NmCli;

impl DiscoveryBackend for NmCli {
    fn name(&self) -> &str {
        "nmcli"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && tool_on_path("nmcli")
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn connected_networks(&self) -> Result<Vec<String>> {
        let output = std::process::Command::new("nmcli")
            .args(["-t", "-f", "active,ssid", "dev", "wifi"])
            .output()
            .context("failed to run nmcli")?;

        if !output.status.success() {
            anyhow::bail!("nmcli exited with {}", output.status);
        }

        Ok(parse_active_ssids(&String::from_utf8_lossy(&output.stdout)))
    }

    fn is_connected_to_vpn(&self) -> bool {
        let output = std::process::Command::new("nmcli")
            .args(["-t", "-f", "type", "connection", "show", "--active"])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .any(|line| matches!(line.trim(), "vpn" | "wireguard"))
            }
            _ => false,
        }
    }

    fn watch_changes(&self, on_change: ChangeCallback) -> Result<WatchHandle> {
        let mut child = tokio::process::Command::new("nmcli")
            .arg("monitor")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn nmcli monitor")?;

        let stdout = child
            .stdout
            .take()
            .context("nmcli monitor exposes no stdout")?;

        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::debug!("Watching nmcli monitor for connection changes");
            let mut lines = BufReader::new(stdout).lines();

            loop {
                let line = tokio::select! {
                    _ = cancel_rx.changed() => break,
                    line = lines.next_line() => line,
                };

                match line {
                    Ok(Some(line)) => {
                        tracing::trace!("nmcli monitor: {}", line);
                        if is_connection_event(&line) {
                            on_change();
                        }
                    }
                    Ok(None) => {
                        tracing::warn!("nmcli monitor exited");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!("Reading nmcli monitor failed: {:#}", err);
                        break;
                    }
                }
            }

            let _ = child.kill().await;
        });

        Ok(WatchHandle::new(cancel_tx, task))
    }
}

fn parse_active_ssids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("yes:"))
        .filter(|ssid| !ssid.is_empty())
        .map(str::to_string)
        .collect()
}

/// `nmcli monitor` narrates everything NetworkManager does; only device
/// activations matter here.
fn is_connection_event(line: &str) -> bool {
    let line = line.trim();
    line.ends_with(": connected") || line.contains("using connection")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terse_wifi_listing() {
        let stdout = "no:Neighbors Wifi\nyes:Coffee Wifi\nno:\nyes:Office\n";
        assert_eq!(parse_active_ssids(stdout), vec!["Coffee Wifi", "Office"]);
    }

    #[test]
    fn ignores_inactive_and_hidden_entries() {
        assert!(parse_active_ssids("no:Somewhere\nyes:\n").is_empty());
    }

    #[test]
    fn recognizes_connection_events() {
        assert!(is_connection_event("wlan0: connected"));
        assert!(is_connection_event(
            "wlan0: using connection 'Coffee Wifi'"
        ));
        assert!(!is_connection_event("wlan0: disconnected"));
        assert!(!is_connection_event("Connectivity is now 'full'"));
    }
}
