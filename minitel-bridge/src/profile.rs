//! The system prompt sent ahead of every conversation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PROFILE_FILE: &str = "system_profile.txt";

pub const DEFAULT_PROFILE: &str = "Tu es un assistant affiche sur un Minitel: \
un ecran de 40 colonnes et 24 lignes, sans couleur. Reponds en francais, \
brievement, en texte brut: pas de markdown, pas de tableaux, pas d'emoji.";

/// `--profile` if given, else the file in the config directory, else the
/// working directory.
pub fn profile_path(explicit: Option<&Path>, config_dir: Option<&Path>) -> PathBuf {
    match (explicit, config_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => dir.join(PROFILE_FILE),
        (None, None) => PathBuf::from(PROFILE_FILE),
    }
}

/// Read the profile, falling back to the built-in one.
pub fn load_profile(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            info!("System profile: {}", path.display());
            text.trim().to_string()
        }
        Ok(_) => {
            warn!("System profile {} is empty, using the default", path.display());
            DEFAULT_PROFILE.to_string()
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No system profile at {}, using the default", path.display());
            DEFAULT_PROFILE.to_string()
        }
        Err(e) => {
            warn!("Cannot read system profile {}: {}", path.display(), e);
            DEFAULT_PROFILE.to_string()
        }
    }
}
