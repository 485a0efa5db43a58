//! CLI-aware configuration: flag overrides on top of `carelink-config`.
//!
//! Core never sees these types -- it receives a pre-built `ChannelConfig`
//! and `Identity`.

use std::time::Duration;

use secrecy::SecretString;

use carelink_config::{Config, Profile};
use carelink_core::{ChannelConfig, Identity};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use carelink_config::{config_path, load_config_or_default, save_config};

/// Everything `listen` needs to start a manager.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub channel: ChannelConfig,
    pub identity: Identity,
    pub connect_timeout: Duration,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build the channel config and identity from the config file, the active
/// profile and CLI overrides (flag > env > profile).
pub fn resolve_channel(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        // No profile: run from flags / env alone.
        None if global.endpoint.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    // 1. Endpoint
    let raw_endpoint = global.endpoint.as_deref().unwrap_or(&profile.endpoint);
    let endpoint = carelink_config::parse_endpoint(raw_endpoint)?;

    // 2. Tuning
    let channel = carelink_config::channel_config(endpoint, &profile, &cfg.defaults)?;

    // 3. Identity
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => carelink_config::resolve_token(&profile, &profile_name)?,
    };
    let tenant = global.tenant.as_deref().unwrap_or(&profile.tenant_id);
    let user = global.user.as_deref().unwrap_or(&profile.user_id);
    let identity = carelink_config::identity(tenant, user, token)?;

    Ok(Resolved {
        profile_name,
        channel,
        identity,
        connect_timeout: cfg.defaults.connect_timeout(),
    })
}
