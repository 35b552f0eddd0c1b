//! Long-running mode: react to network changes as the discovery backend
//! reports them.
//!
//! Change notifications funnel through a bounded channel and a login
//! gate enforcing the at-most-one-concurrent-login policy: whatever
//! arrives while an attempt is underway is logged and dropped, never
//! queued. A failed login abandons that network's attempt only; the
//! daemon itself keeps running until interrupted.

use crate::Args;
use crate::config::{Config, ConfigHandle, HookWhen};
use crate::connectivity::ConnectivityProbe;
use crate::discovery::{self, DiscoveryBackend};
use crate::engine::Engine;
use crate::hooks::{self, HookPhase};
use crate::webdriver::WebDriverProvider;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mutual-exclusion gate around "login in progress".
#[derive(Clone, Default)]
pub struct LoginGate {
    busy: Arc<AtomicBool>,
}

impl LoginGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. `None` means another login attempt holds it.
    pub fn try_enter(&self) -> Option<GateGuard> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return None;
        }

        Some(GateGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct GateGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub async fn run(mut config: ConfigHandle, args: &Args) -> Result<()> {
    let poll_interval = Duration::from_secs(config.current().daemon.poll_interval);
    let backend =
        discovery::daemon_backend(poll_interval).context("failed to find a valid backend")?;
    tracing::info!("Using backend {}", backend.name());

    let (notify_tx, mut notify_rx) = mpsc::channel::<()>(1);
    let gate = LoginGate::new();

    let callback_gate = gate.clone();
    let watch = backend.watch_changes(Arc::new(move || {
        if callback_gate.is_busy() {
            tracing::info!("Skipping login due to existing login attempt");
            return;
        }
        if notify_tx.try_send(()).is_err() {
            tracing::debug!("Change notification already pending, dropping");
        }
    }))?;

    tracing::info!("Launched background change watcher...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Quitting...");
                break;
            }
            received = notify_rx.recv() => {
                if received.is_none() {
                    break;
                }

                let Some(_guard) = gate.try_enter() else {
                    tracing::info!("Skipping login due to existing login attempt");
                    continue;
                };

                if let Err(err) =
                    handle_change(config.current(), backend.as_ref(), args.skip_check).await
                {
                    tracing::error!("Failed to handle network change: {:#}", err);
                }
            }
        }
    }

    watch.shutdown().await
}

async fn handle_change(
    config: &Config,
    backend: &dyn DiscoveryBackend,
    skip_check: bool,
) -> Result<()> {
    let probe = ConnectivityProbe::new()?;
    let provider = WebDriverProvider::new(&config.webdriver.url)?;
    let engine = Engine::new(config, &provider, &probe);
    let no_env = HashMap::new();

    for network in backend.connected_networks()? {
        tracing::info!("New connection to {}", network);

        let Some(profile) = config.profile_for(&network) else {
            tracing::info!("No network configuration found for {}, ignoring", network);
            continue;
        };

        // Pre-login hooks run before the connectivity check so they can
        // adjust the network environment first.
        hooks::run_hooks(config, profile, HookPhase::PreLogin, HookWhen::Always, &no_env).await;

        if !skip_check && !probe.needs_login(config, profile).await {
            tracing::info!("No login required, ignoring");

            if profile.always_run_hooks {
                hooks::run_hooks(config, profile, HookPhase::Login, HookWhen::Success, &no_env)
                    .await;
                hooks::run_hooks(
                    config,
                    profile,
                    HookPhase::PostLogin,
                    HookWhen::Success,
                    &no_env,
                )
                .await;
            }
            continue;
        }

        tracing::info!("Logging in...");
        if let Err(err) = engine.login(profile).await {
            tracing::error!("Login attempt for {} failed: {:#}", network, err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_holder_at_a_time() {
        let gate = LoginGate::new();

        let guard = gate.try_enter().expect("gate starts free");
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none(), "second entry must be refused");

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some(), "gate frees up on guard drop");
    }

    #[tokio::test]
    async fn concurrent_notifications_yield_one_login_and_one_skip() {
        let gate = LoginGate::new();
        let logins = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let skips = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut attempts = Vec::new();
        for _ in 0..2 {
            let gate = gate.clone();
            let logins = logins.clone();
            let skips = skips.clone();
            attempts.push(tokio::spawn(async move {
                match gate.try_enter() {
                    Some(_guard) => {
                        // Hold the gate across the simulated login.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        logins.fetch_add(1, Ordering::SeqCst);
                    }
                    None => {
                        skips.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
            // Ensure the first attempt claims the gate before the second.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for attempt in attempts {
            attempt.await.unwrap();
        }

        assert_eq!(logins.load(Ordering::SeqCst), 1);
        assert_eq!(skips.load(Ordering::SeqCst), 1);
    }
}
