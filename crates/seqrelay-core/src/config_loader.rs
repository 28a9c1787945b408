//! Configuration file discovery and loading.
//!
//! The discovery order is:
//! 1. `SEQRELAY_CONFIG` environment variable.
//! 2. `./seqrelay.json`
//! 3. `~/.seqrelay/config.json`
//! 4. If none is found, [`RelayConfig::default`].
//!
//! After parsing, `SEQRELAY_MAX_WINDOW`, `SEQRELAY_DEADLINE_MS` and
//! `SEQRELAY_WORKERS` override the file, and the result is validated.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use seqrelay_types::config::RelayConfig;
use seqrelay_types::error::{RelayError, Result};

use crate::env::Environment;

pub const CONFIG_ENV: &str = "SEQRELAY_CONFIG";
pub const MAX_WINDOW_ENV: &str = "SEQRELAY_MAX_WINDOW";
pub const DEADLINE_MS_ENV: &str = "SEQRELAY_DEADLINE_MS";
pub const WORKERS_ENV: &str = "SEQRELAY_WORKERS";

/// Find the config file to load, if any.
///
/// A path named by `SEQRELAY_CONFIG` is returned even if it does not exist,
/// so that loading reports the mistake instead of silently using defaults.
pub fn discover_config_path(
    env: &dyn Environment,
    cwd: Option<&Path>,
    home_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = env.get_var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    if let Some(cwd) = cwd {
        let local = cwd.join("seqrelay.json");
        if local.exists() {
            return Some(local);
        }
    }

    if let Some(home) = home_dir {
        let user = home.join(".seqrelay").join("config.json");
        if user.exists() {
            return Some(user);
        }
    }

    None
}

/// Read and parse one config file.
pub async fn load_config_file(path: &Path) -> Result<RelayConfig> {
    debug!(path = %path.display(), "loading config file");
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        RelayError::ConfigInvalid {
            reason: format!("failed to read {}: {e}", path.display()),
        }
    })?;
    serde_json::from_str(&contents).map_err(|e| RelayError::ConfigInvalid {
        reason: format!("failed to parse {}: {e}", path.display()),
    })
}

/// Resolve the effective configuration.
///
/// `explicit` (a `--config` flag) wins over discovery.
pub async fn load_config(env: &dyn Environment, explicit: Option<&Path>) -> Result<RelayConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().ok();
            discover_config_path(env, cwd.as_deref(), dirs::home_dir().as_deref())
        }
    };

    let mut config = match path {
        Some(path) => load_config_file(&path).await?,
        None => {
            info!("no config file found, using defaults");
            RelayConfig::default()
        }
    };

    apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Apply `SEQRELAY_*` overrides to `config`.
pub fn apply_env_overrides(config: &mut RelayConfig, env: &dyn Environment) -> Result<()> {
    if let Some(window) = parse_var::<usize>(env, MAX_WINDOW_ENV)? {
        config.sequencer.max_window = window;
    }
    if let Some(deadline) = parse_var::<u64>(env, DEADLINE_MS_ENV)? {
        config.sequencer.per_item_deadline_ms = deadline;
    }
    if let Some(workers) = parse_var::<usize>(env, WORKERS_ENV)? {
        config.stages.event_to_text.workers = workers;
        config.stages.text_to_speech.workers = workers;
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(env: &dyn Environment, name: &str) -> Result<Option<T>> {
    let Some(raw) = env.get_var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!(var = name, value = %raw, "config override from environment");
            Ok(Some(value))
        }
        Err(_) => {
            warn!(var = name, value = %raw, "unparseable config override");
            Err(RelayError::ConfigInvalid {
                reason: format!("{name} must be a non-negative integer, got {raw:?}"),
            })
        }
    }
}
