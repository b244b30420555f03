//! Everything between process start and a running session: where the
//! vault lives, which port to use, and which line settings to use on it.

use minitel_core::{SessionError, SessionSettings, SettingsStore, ThrottlePolicy};
use minitel_io::{BaudRate, Link, LinkConfig, LinkProbe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_PROBE_CYCLES: usize = 3;
pub const VAULT_FILE: &str = "minitel-gpt.db";

/// Printed when no link could be established.
pub const DIAGNOSTIC: &[&str] = &[
    "Aucune liaison avec le Minitel. Verifier:",
    "  - le port serie choisi (--port)",
    "  - le cable et la prise DIN du Minitel",
    "  - que le Minitel est allume",
    "  - que le Minitel est en mode peri-informatique",
];

pub fn vault_path(explicit: Option<&Path>, data_dir: Option<&Path>) -> PathBuf {
    match (explicit, data_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => dir.join(VAULT_FILE),
        (None, None) => PathBuf::from(VAULT_FILE),
    }
}

/// `--port`, else the saved port if it is still there, else the first one found.
///
/// A saved port is kept when enumeration found nothing at all, since some
/// adapters do not enumerate.
pub fn choose_port(
    requested: Option<&str>,
    saved: Option<&str>,
    available: &[String],
) -> Option<String> {
    if let Some(port) = requested {
        return Some(port.to_string());
    }
    if let Some(port) = saved {
        if available.is_empty() || available.iter().any(|p| p == port) {
            return Some(port.to_string());
        }
        warn!("Saved port {} is gone", port);
    }
    available.first().cloned()
}

/// Settings for the console stand-in: standard line, no pacing, the console echoes.
pub fn simulated_settings(mut settings: SessionSettings) -> SessionSettings {
    settings.link = LinkConfig::seven_e_one(BaudRate::B1200).confirm();
    settings.port = None;
    settings.throttle = ThrottlePolicy::immediate();
    settings.local_echo = false;
    settings
}

/// Settle `settings.link`: a saved confirmed configuration is used as is,
/// otherwise the probe runs and its result is saved.
pub fn resolve_link<L: Link + ?Sized>(
    link: &mut L,
    saved: Option<LinkConfig>,
    probe: &mut LinkProbe,
    max_cycles: usize,
    settings: &mut SessionSettings,
    store: &mut dyn SettingsStore,
) -> Result<LinkConfig, SessionError> {
    if let Some(config) = saved.filter(|c| c.confirmed) {
        info!("Using saved link settings {}", config.label());
        settings.link = config;
        return Ok(config);
    }

    info!(
        "Probing {} with {} candidate(s)",
        link.name(),
        probe.candidates().len()
    );
    let outcome = probe.run(link, max_cycles)?;
    info!(
        "Link confirmed: {} (cycle {})",
        outcome.config.label(),
        outcome.cycle
    );

    settings.link = outcome.config;
    if let Err(e) = store.save_settings(settings) {
        warn!("{}", SessionError::collaborator("settings store", e));
    }
    Ok(outcome.config)
}
