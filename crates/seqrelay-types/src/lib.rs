//! # seqrelay-types
//!
//! Core type definitions for the seqrelay ordered relay pipeline.
//!
//! This crate is the foundation of the dependency graph -- the engine and
//! the CLI both depend on it. It contains:
//!
//! - **[`error`]** -- [`RelayError`] and [`StageError`] error types
//! - **[`config`]** -- Configuration schema for the sequencer, stages and sink
//! - **[`sequence`]** -- Sequence numbers, item status, tombstones, deliveries
//! - **[`event`]** -- Relay payloads (events, speech clips) and playback acks

pub mod config;
pub mod error;
pub mod event;
pub mod sequence;

pub use error::{RelayError, Result, StageError};
pub use sequence::{Delivery, FailureReason, ItemStatus, SequenceNumber};
