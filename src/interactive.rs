//! One-shot invocation: log in to (and optionally read quota from) a
//! single network, then exit with the outcome.

use crate::Args;
use crate::config::{Config, HookWhen};
use crate::connectivity::ConnectivityProbe;
use crate::discovery;
use crate::engine::Engine;
use crate::hooks::{self, HookPhase};
use crate::webdriver::WebDriverProvider;
use anyhow::{Context, Result};
use std::collections::HashMap;

pub async fn run(config: &Config, args: &Args) -> Result<()> {
    let network_name = resolve_network_name(args)?;
    tracing::debug!("Using network: {}", network_name);

    let profile = config
        .profile_for(&network_name)
        .with_context(|| format!("no network configuration found for {network_name}"))?;

    let probe = ConnectivityProbe::new()?;
    let provider = WebDriverProvider::new(&config.webdriver.url)?;
    let engine = Engine::new(config, &provider, &probe);
    let no_env = HashMap::new();

    if !args.no_login {
        // Pre-login hooks run before the connectivity check so they can
        // adjust the network environment first.
        hooks::run_hooks(config, profile, HookPhase::PreLogin, HookWhen::Always, &no_env).await;

        if args.skip_check || probe.needs_login(config, profile).await {
            engine.login(profile).await?;
        } else {
            tracing::info!("No login necessary, skipping.");
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
        }
    }

    if args.data && !profile.has_data() {
        tracing::info!("No data actions configured for network, skipping.");
    } else if args.data {
        if let Some(data) = engine.read_data(profile).await? {
            if data.is_infinite() {
                tracing::info!("Network reports no data limit");
            } else if let Some(available) = data.remaining_mb() {
                tracing::info!("{:.0} MB of data available", available);
            }
        }
    }

    Ok(())
}

fn resolve_network_name(args: &Args) -> Result<String> {
    if let Some(name) = &args.network {
        return Ok(name.clone());
    }

    if args.auto {
        let backend =
            discovery::interactive_backend().context("no usable network discovery backend")?;
        tracing::info!("Using backend {}", backend.name());

        if backend.is_connected_to_vpn() {
            tracing::info!("Connected to VPN");
        }

        return backend
            .connected_networks()?
            .into_iter()
            .next()
            .context("not connected to any network");
    }

    anyhow::bail!("need a network name (--network) or autodetection (--auto)")
}
