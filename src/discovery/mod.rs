//! Network discovery backends
//!
//! Each backend knows one platform-specific way to learn which networks
//! the machine is connected to. Some can push change notifications
//! natively ("streaming"); the rest are adapted by the polling wrapper
//! in [`poller`]. Selection happens once at startup by availability
//! probing, never by runtime type inspection.

pub mod iw;
pub mod iwconfig;
pub mod netsh;
pub mod nmcli;
pub mod poller;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Invoked once per relevant connection-state transition. Deduplication
/// is the caller's business, not the backend's.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

pub trait DiscoveryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Environment probe: platform applies and the required tool or bus
    /// is reachable. Nothing else may be called when this is false.
    fn is_available(&self) -> bool;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Snapshot of currently connected network names.
    fn connected_networks(&self) -> Result<Vec<String>>;

    fn is_connected_to_vpn(&self) -> bool {
        false
    }

    /// Install a change subscription. Only meaningful when
    /// `supports_streaming` is true.
    fn watch_changes(&self, _on_change: ChangeCallback) -> Result<WatchHandle> {
        anyhow::bail!("backend {} does not support change watching", self.name())
    }
}

/// Running change watcher. Dropping the handle leaks the watcher; call
/// [`WatchHandle::shutdown`] to stop it deterministically.
pub struct WatchHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn new(cancel: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    /// Signal the watcher to stop and wait until it has. A clean,
    /// cancellation-induced exit is swallowed; a panicked watcher is
    /// reported.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.cancel.send(true);

        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(anyhow::anyhow!("change watcher failed: {}", err)),
        }
    }
}

/// All compiled-in backends, in preference order. Platform filtering
/// happens through each backend's availability probe.
fn compiled_backends() -> Vec<Box<dyn DiscoveryBackend>> {
    vec![
        Box::new(nmcli::NmCli),
        Box::new(iw::Iw),
        Box::new(iwconfig::IwConfig),
        Box::new(netsh::Netsh),
    ]
}

fn first_available(
    mut backends: Vec<Box<dyn DiscoveryBackend>>,
    streaming_only: bool,
) -> Option<Box<dyn DiscoveryBackend>> {
    let position = backends.iter().position(|backend| {
        if !backend.is_available() {
            tracing::debug!("Backend {} is not available", backend.name());
            return false;
        }
        !streaming_only || backend.supports_streaming()
    })?;

    let backend = backends.swap_remove(position);
    tracing::debug!("Found available backend: {}", backend.name());
    Some(backend)
}

/// Best backend for one-shot use: first available, streaming or not.
pub fn interactive_backend() -> Option<Box<dyn DiscoveryBackend>> {
    first_available(compiled_backends(), false)
}

/// Best backend for long-running use: first available streaming backend,
/// else the first available one behind the polling wrapper.
pub fn daemon_backend(poll_interval: Duration) -> Option<Box<dyn DiscoveryBackend>> {
    if let Some(backend) = first_available(compiled_backends(), true) {
        return Some(backend);
    }

    let fallback = first_available(compiled_backends(), false)?;
    Some(Box::new(poller::PollingWatcher::new(fallback, poll_interval)))
}

/// True when `tool` resolves through `PATH`.
pub(crate) fn tool_on_path(tool: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Backend double that panics if its snapshot is taken while it
    /// claims to be unavailable.
    pub(crate) struct FakeBackend {
        pub name: &'static str,
        pub available: bool,
        pub streaming: bool,
        pub networks: Vec<String>,
    }

    impl DiscoveryBackend for FakeBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn supports_streaming(&self) -> bool {
            self.streaming
        }

        fn connected_networks(&self) -> Result<Vec<String>> {
            assert!(
                self.available,
                "connected_networks called on unavailable backend {}",
                self.name
            );
            Ok(self.networks.clone())
        }
    }

    fn fake(name: &'static str, available: bool, streaming: bool) -> Box<dyn DiscoveryBackend> {
        Box::new(FakeBackend {
            name,
            available,
            streaming,
            networks: vec!["net".to_string()],
        })
    }

    #[test]
    fn selector_skips_unavailable_backends() {
        let picked = first_available(
            vec![fake("broken", false, true), fake("working", true, false)],
            false,
        )
        .unwrap();

        assert_eq!(picked.name(), "working");
        picked.connected_networks().unwrap();
    }

    #[test]
    fn selector_prefers_streaming_for_daemon_use() {
        let picked = first_available(
            vec![
                fake("polling-only", true, false),
                fake("streaming", true, true),
            ],
            true,
        )
        .unwrap();

        assert_eq!(picked.name(), "streaming");
    }

    #[test]
    fn selector_reports_when_nothing_fits() {
        assert!(first_available(vec![fake("broken", false, false)], false).is_none());
        assert!(first_available(vec![fake("polling-only", true, false)], true).is_none());
    }
}
