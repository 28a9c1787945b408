//! # seqrelay-core
//!
//! Ordered relay engine for seqrelay.
//!
//! Events enter through the [`sequencer::Tagger`], which numbers them in
//! submission order inside a bounded window. They then flow through chains of
//! [`pipeline::StageWorkerPool`]s that may finish in any order. The
//! [`sequencer::ReorderBuffer`] releases them to a [`sink::Sink`] strictly in
//! number order, turning failures and expired items into tombstones so the
//! stream never stalls.
//!
//! [`stages`] holds the speech relay built from these parts, and
//! [`config_loader`] resolves its configuration.

pub mod config_loader;
pub mod env;
pub mod pipeline;
pub mod sequencer;
pub mod sink;
pub mod stages;

pub use pipeline::{Relay, RelayStats, Stage, StageOutput, StageWorkerPool};
pub use sequencer::{ReorderBuffer, Sequencer, SequencerStats, Tagger};
pub use sink::{CollectingSink, Sink, SinkQueue, handoff};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn core_types_are_send_sync() {
        assert_send_sync::<ReorderBuffer<String>>();
        assert_send_sync::<Sequencer<String>>();
        assert_send_sync::<Tagger<String>>();
        assert_send_sync::<StageWorkerPool<String, String>>();
        assert_send_sync::<Relay<String, String>>();
        assert_send_sync::<CollectingSink<String>>();
    }
}
