//! `seqrelay config` -- display and validate resolved configuration.
//!
//! # Examples
//!
//! ```text
//! seqrelay config show
//! seqrelay config validate --config relay.json
//! ```

use seqrelay_types::config::RelayConfig;

/// Print the resolved configuration as formatted JSON.
pub fn config_show(config: &RelayConfig) -> anyhow::Result<()> {
    println!("{}", render(config)?);
    Ok(())
}

/// Report whether configuration loading and validation succeeded.
pub fn config_validate(loaded: anyhow::Result<RelayConfig>) -> anyhow::Result<()> {
    let config = loaded?;
    println!(
        "config ok: window {}, deadline {}ms, {} + {} workers",
        config.sequencer.max_window,
        config.sequencer.per_item_deadline_ms,
        config.stages.event_to_text.workers,
        config.stages.text_to_speech.workers,
    );
    Ok(())
}

fn render(config: &RelayConfig) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}
