//! Lifecycle hook pipeline
//!
//! Runs the ordered, conditional shell commands configured for a phase.
//! A network without its own list for a phase inherits the `[fallback]`
//! list wholesale; an explicitly empty list disables the phase.

use crate::config::{Config, Hook, HookSet, HookWhen, NetworkProfile};
use std::collections::HashMap;
use tokio::process::Command;

/// Marker variable present in every hook's environment.
pub const MARKER_VAR: &str = "AUTOPORTAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreLogin,
    Login,
    PostLogin,
    Data,
    Error,
}

impl HookPhase {
    fn list(self, set: &HookSet) -> Option<&[Hook]> {
        let list = match self {
            HookPhase::PreLogin => &set.pre_login,
            HookPhase::Login => &set.login,
            HookPhase::PostLogin => &set.post_login,
            HookPhase::Data => &set.data,
            HookPhase::Error => &set.error,
        };
        list.as_deref()
    }
}

/// Run the hooks of one phase for a network.
///
/// `filter` is the invocation outcome: hooks whose `when` matches neither
/// it nor `always` are skipped. Entries from `extra` win over configured
/// environment on key collisions.
pub async fn run_hooks(
    config: &Config,
    profile: &NetworkProfile,
    phase: HookPhase,
    filter: HookWhen,
    extra: &HashMap<String, String>,
) {
    let hooks = phase
        .list(&profile.hooks)
        .or_else(|| phase.list(&config.fallback.hooks))
        .unwrap_or(&[]);

    if hooks.is_empty() {
        return;
    }

    let mut env = HashMap::new();
    env.insert(MARKER_VAR.to_string(), "1".to_string());
    env.insert(
        "NETWORK".to_string(),
        profile.ssid.clone().unwrap_or_default(),
    );
    for (key, value) in &config.fallback.env {
        env.insert(key.clone(), value.clone());
    }
    for (key, value) in extra {
        env.insert(key.clone(), value.clone());
    }

    for hook in hooks {
        let when = hook.when();
        if when != filter && when != HookWhen::Always && filter != HookWhen::Always {
            continue;
        }

        if let Some(guard) = hook.guard_if() {
            if !run_command(guard, &env).await {
                continue;
            }
        }

        if let Some(guard) = hook.guard_unless() {
            if run_command(guard, &env).await {
                continue;
            }
        }

        if run_command(hook.command(), &env).await && hook.is_final() {
            tracing::debug!("Final hook succeeded, stopping hook processing");
            break;
        }
    }
}

async fn run_command(command: &str, env: &HashMap<String, String>) -> bool {
    tracing::debug!("> {}", command);

    match Command::new("sh").arg("-c").arg(command).envs(env).status().await {
        Ok(status) => status.success(),
        Err(err) => {
            tracing::warn!("Failed to spawn hook command: {:#}", err);
            false
        }
    }
}
