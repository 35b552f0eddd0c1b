//! Polling adapter presenting a snapshot-only backend as streaming.
//!
//! The watch loop keeps the last observed connected set and fires the
//! change callback once per poll in which new names appeared; removals
//! are deliberately silent. Cancellation is checked before each sleep
//! and also interrupts one in progress.

use super::{ChangeCallback, DiscoveryBackend, WatchHandle};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct PollingWatcher {
    inner: Arc<dyn DiscoveryBackend>,
    poll_interval: Duration,
    name: String,
}

impl PollingWatcher {
    pub fn new(inner: Box<dyn DiscoveryBackend>, poll_interval: Duration) -> Self {
        let name = format!("{} (polled)", inner.name());
        Self {
            inner: Arc::from(inner),
            poll_interval,
            name,
        }
    }
}

impl DiscoveryBackend for PollingWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn connected_networks(&self) -> Result<Vec<String>> {
        self.inner.connected_networks()
    }

    fn is_connected_to_vpn(&self) -> bool {
        self.inner.is_connected_to_vpn()
    }

    fn watch_changes(&self, on_change: ChangeCallback) -> Result<WatchHandle> {
        let backend = self.inner.clone();
        let interval = self.poll_interval;

        // Seed the last-observed set so pre-existing connections do not
        // fire a change on the first poll.
        let seed: HashSet<String> = match backend.connected_networks() {
            Ok(networks) => networks.into_iter().collect(),
            Err(err) => {
                tracing::warn!("Initial snapshot failed, starting empty: {:#}", err);
                HashSet::new()
            }
        };

        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::debug!(
                "Starting polling wrapper around {} for connection tracking",
                backend.name()
            );
            let mut last_seen = seed;

            loop {
                if *cancel_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let current: HashSet<String> = match backend.connected_networks() {
                    Ok(networks) => networks.into_iter().collect(),
                    Err(err) => {
                        tracing::warn!("Snapshot failed, skipping poll: {:#}", err);
                        continue;
                    }
                };

                let appeared = current.difference(&last_seen).count();
                last_seen = current;

                if appeared > 0 {
                    on_change();
                }
            }
        });

        Ok(WatchHandle::new(cancel_tx, task))
    }
}
