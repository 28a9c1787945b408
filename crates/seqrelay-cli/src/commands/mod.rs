//! CLI command implementations for `seqrelay`.
//!
//! - [`run`] -- The speech relay demo.
//! - [`config_cmd`] -- Configuration display and validation.

pub mod config_cmd;
pub mod run;

use std::path::Path;

use seqrelay_core::config_loader;
use seqrelay_core::env::NativeEnvironment;
use seqrelay_types::config::RelayConfig;

/// Load configuration from the given path override or via auto-discovery.
///
/// Discovery order: `SEQRELAY_CONFIG`, `./seqrelay.json`,
/// `~/.seqrelay/config.json`, then defaults. `SEQRELAY_*` environment
/// overrides are applied on top and the result is validated.
pub async fn load_config(config_override: Option<&Path>) -> anyhow::Result<RelayConfig> {
    if let Some(path) = config_override
        && !path.exists()
    {
        anyhow::bail!("config file not found: {}", path.display());
    }
    Ok(config_loader::load_config(&NativeEnvironment, config_override).await?)
}
