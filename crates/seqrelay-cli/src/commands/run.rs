//! `seqrelay run` -- run the speech relay demo.
//!
//! Feeds bursts of events through event-to-text and text-to-speech worker
//! pools and plays the clips back in submission order. Stops after the
//! configured number of events or on Ctrl+C, then prints final statistics.

use clap::Args;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use seqrelay_core::stages::{DemoReport, SpeechRelay};
use seqrelay_types::config::RelayConfig;
use seqrelay_types::event::Ack;

/// Arguments for `seqrelay run`.
#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many events (overrides `source.total_events`).
    #[arg(short = 'n', long)]
    pub events: Option<u64>,

    /// Print the final report as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Run the demo until the event limit or Ctrl+C.
pub async fn run(args: RunArgs, config: RelayConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining relay");
            on_signal.cancel();
        }
    });

    if args.events.is_none() && config.source.total_events.is_none() {
        info!("no event limit set, running until Ctrl+C");
    }

    let report = SpeechRelay::start(&config)
        .run(&config, args.events, cancel, log_ack)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report_table(&report));
    }
    Ok(())
}

fn log_ack(ack: &Ack) {
    if ack.success {
        info!(seq = ack.seq, message = %ack.message, "ack");
    } else {
        warn!(seq = ack.seq, message = %ack.message, "nack");
    }
}

fn report_table(report: &DemoReport) -> Table {
    let seq = &report.relay.sequencer;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    let rows: [(&str, String); 10] = [
        ("events submitted", report.source.submitted.to_string()),
        ("events shed", report.source.shed.to_string()),
        ("clips played", report.playback.played.to_string()),
        ("tombstones acked", report.playback.skipped.to_string()),
        ("released in order", seq.released.to_string()),
        ("expired", seq.expired.to_string()),
        ("abandoned at shutdown", seq.abandoned.to_string()),
        ("duplicate signals", seq.duplicates.to_string()),
        ("text stage errors", report.text_errors.to_string()),
        (
            "avg source interval",
            format!("{:.3}s", report.source.extraction.average_interval_secs),
        ),
    ];
    for (metric, value) in rows {
        table.add_row(vec![metric.to_string(), value]);
    }
    for stage in &report.relay.stages {
        table.add_row(vec![
            format!("{} ok/failed", stage.stage),
            format!("{}/{}", stage.succeeded, stage.failed),
        ]);
    }
    table
}
